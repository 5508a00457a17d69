//! Pool allocation into named buckets.
//!
//! ## Key Invariants
//! - An allocation always sums to exactly the deposited amount
//! - Flooring residue lands in `Company`
//! - Bucket balances never go negative

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use unilevel_types::{
    apply_bps, AllocationPreset, AllocationTable, Allocation, Amount, Bps, BucketBalances,
    LevelTable, PoolBucket, PresetTables, BPS_DENOMINATOR,
};

use crate::config::AllocationConfig;
use crate::errors::{LedgerError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolAllocator {
    active: AllocationPreset,
    beta: PresetTables,
    permanent: PresetTables,
    emergency_reserve_bps: Bps,
    balances: BucketBalances,
}

impl PoolAllocator {
    pub fn new(config: &AllocationConfig) -> Result<Self> {
        config.beta.validate()?;
        config.permanent.validate()?;
        if config.emergency_reserve_bps as u128 > BPS_DENOMINATOR {
            return Err(LedgerError::InvalidParameter(
                "emergency reserve share exceeds 10000 bps".into(),
            ));
        }
        Ok(Self {
            active: config.preset,
            beta: config.beta,
            permanent: config.permanent,
            emergency_reserve_bps: config.emergency_reserve_bps,
            balances: BucketBalances::default(),
        })
    }

    pub fn active_preset(&self) -> AllocationPreset {
        self.active
    }

    pub fn tables(&self, preset: AllocationPreset) -> &PresetTables {
        match preset {
            AllocationPreset::Beta => &self.beta,
            AllocationPreset::Permanent => &self.permanent,
        }
    }

    pub fn active_tables(&self) -> &PresetTables {
        self.tables(self.active)
    }

    pub fn level_table(&self) -> &LevelTable {
        &self.active_tables().levels
    }

    pub fn balances(&self) -> &BucketBalances {
        &self.balances
    }

    pub fn balance(&self, bucket: PoolBucket) -> Amount {
        self.balances.get(bucket)
    }

    /// Switch presets. Balances are untouched.
    pub fn set_preset(&mut self, preset: AllocationPreset) {
        if self.active != preset {
            info!(
                target: "treasury",
                from = %self.active,
                to = %preset,
                "Allocation preset switched"
            );
        }
        self.active = preset;
    }

    /// Replace the bucket table of a preset after validating it.
    pub fn set_bucket_table(
        &mut self,
        preset: AllocationPreset,
        table: AllocationTable,
    ) -> Result<()> {
        table.validate()?;
        match preset {
            AllocationPreset::Beta => self.beta.buckets = table,
            AllocationPreset::Permanent => self.permanent.buckets = table,
        }
        Ok(())
    }

    /// Split `amount` with the active table. Pure.
    pub fn allocate(&self, amount: Amount) -> Result<Allocation> {
        let table = &self.active_tables().buckets;
        let share = |bps: Bps| {
            apply_bps(amount, bps).ok_or(LedgerError::ArithmeticOverflow("allocation"))
        };

        let liquidity_gross = share(table.liquidity_bps)?;
        let emergency_reserve = apply_bps(liquidity_gross, self.emergency_reserve_bps)
            .ok_or(LedgerError::ArithmeticOverflow("emergency reserve"))?;

        let mut allocation = Allocation {
            liquidity: liquidity_gross - emergency_reserve,
            infrastructure: share(table.infrastructure_bps)?,
            company: share(table.company_bps)?,
            mlm_distributed: share(table.mlm_distributed_bps)?,
            mlm_locked: share(table.mlm_locked_bps)?,
            emergency_reserve,
        };
        // bps sum to 10000, so floors never exceed the amount
        let residue = amount - allocation.total();
        allocation.company += residue;
        Ok(allocation)
    }

    /// Allocate `amount` and add it to the bucket balances.
    pub fn deposit(&mut self, amount: Amount) -> Result<Allocation> {
        let allocation = self.allocate(amount)?;
        let mut next = self.balances;
        for bucket in PoolBucket::ALL {
            let slot = next.get_mut(bucket);
            *slot = slot
                .checked_add(allocation.get(bucket))
                .ok_or(LedgerError::ArithmeticOverflow("bucket balance"))?;
        }
        self.balances = next;
        debug!(target: "treasury", amount, ?allocation, "Deposit allocated");
        Ok(allocation)
    }

    pub fn credit(&mut self, bucket: PoolBucket, amount: Amount) -> Result<()> {
        let slot = self.balances.get_mut(bucket);
        *slot = slot
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow("bucket balance"))?;
        Ok(())
    }

    pub fn debit(&mut self, bucket: PoolBucket, amount: Amount) -> Result<()> {
        let slot = self.balances.get_mut(bucket);
        if *slot < amount {
            return Err(LedgerError::InsufficientBucketBalance {
                bucket,
                available: *slot,
                requested: amount,
            });
        }
        *slot -= amount;
        Ok(())
    }
}
