//! Pool buckets, allocation tables and the commission level tables.
//!
//! A deposit is split across buckets by an [`AllocationTable`] (basis points
//! summing to exactly 10,000). The MLM share is then paid up the sponsor tree
//! using a [`LevelTable`]. Both tables travel together as a [`PresetTables`]
//! under one of the two named [`AllocationPreset`]s.

use crate::units::{Amount, Bps, BPS_DENOMINATOR, MAX_LEVELS};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors raised while validating percentage tables.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    #[error("bucket table sums to {0} bps, expected 10000")]
    BucketSumMismatch(u32),
    #[error("level table sums to {0} bps, must not exceed 10000")]
    LevelSumTooLarge(u32),
}

// =============================================================================
// BUCKETS
// =============================================================================

/// Named ledger bucket holding part of the system's funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolBucket {
    Liquidity,
    Infrastructure,
    Company,
    MlmDistributed,
    MlmLocked,
    /// Carved out of the liquidity share; only spendable through governance.
    EmergencyReserve,
}

impl PoolBucket {
    pub const ALL: [PoolBucket; 6] = [
        PoolBucket::Liquidity,
        PoolBucket::Infrastructure,
        PoolBucket::Company,
        PoolBucket::MlmDistributed,
        PoolBucket::MlmLocked,
        PoolBucket::EmergencyReserve,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolBucket::Liquidity => "liquidity",
            PoolBucket::Infrastructure => "infrastructure",
            PoolBucket::Company => "company",
            PoolBucket::MlmDistributed => "mlm_distributed",
            PoolBucket::MlmLocked => "mlm_locked",
            PoolBucket::EmergencyReserve => "emergency_reserve",
        }
    }
}

impl fmt::Display for PoolBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Balance of every bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketBalances {
    pub liquidity: Amount,
    pub infrastructure: Amount,
    pub company: Amount,
    pub mlm_distributed: Amount,
    pub mlm_locked: Amount,
    pub emergency_reserve: Amount,
}

impl BucketBalances {
    pub fn get(&self, bucket: PoolBucket) -> Amount {
        match bucket {
            PoolBucket::Liquidity => self.liquidity,
            PoolBucket::Infrastructure => self.infrastructure,
            PoolBucket::Company => self.company,
            PoolBucket::MlmDistributed => self.mlm_distributed,
            PoolBucket::MlmLocked => self.mlm_locked,
            PoolBucket::EmergencyReserve => self.emergency_reserve,
        }
    }

    pub fn get_mut(&mut self, bucket: PoolBucket) -> &mut Amount {
        match bucket {
            PoolBucket::Liquidity => &mut self.liquidity,
            PoolBucket::Infrastructure => &mut self.infrastructure,
            PoolBucket::Company => &mut self.company,
            PoolBucket::MlmDistributed => &mut self.mlm_distributed,
            PoolBucket::MlmLocked => &mut self.mlm_locked,
            PoolBucket::EmergencyReserve => &mut self.emergency_reserve,
        }
    }

    /// Sum over all buckets (saturating).
    pub fn total(&self) -> Amount {
        PoolBucket::ALL
            .iter()
            .fold(0u128, |acc, b| acc.saturating_add(self.get(*b)))
    }
}

// =============================================================================
// TABLES
// =============================================================================

/// Percentage split of a deposit across the five revenue buckets.
///
/// The emergency reserve is not listed here: it is carved from the liquidity
/// share after the split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationTable {
    pub liquidity_bps: Bps,
    pub infrastructure_bps: Bps,
    pub company_bps: Bps,
    pub mlm_distributed_bps: Bps,
    pub mlm_locked_bps: Bps,
}

impl AllocationTable {
    /// 5% liquidity / 12% infrastructure / 23% company / 60% MLM
    pub const BETA: AllocationTable = AllocationTable {
        liquidity_bps: 500,
        infrastructure_bps: 1200,
        company_bps: 2300,
        mlm_distributed_bps: 6000,
        mlm_locked_bps: 0,
    };

    /// 5% liquidity / 15% infrastructure / 35% company / 30% MLM / 15% locked MLM
    pub const PERMANENT: AllocationTable = AllocationTable {
        liquidity_bps: 500,
        infrastructure_bps: 1500,
        company_bps: 3500,
        mlm_distributed_bps: 3000,
        mlm_locked_bps: 1500,
    };

    pub fn sum_bps(&self) -> u32 {
        self.liquidity_bps as u32
            + self.infrastructure_bps as u32
            + self.company_bps as u32
            + self.mlm_distributed_bps as u32
            + self.mlm_locked_bps as u32
    }

    pub fn validate(&self) -> Result<(), TableError> {
        let sum = self.sum_bps();
        if sum as u128 != BPS_DENOMINATOR {
            return Err(TableError::BucketSumMismatch(sum));
        }
        Ok(())
    }
}

/// Per-level commission percentages applied to the MLM pool, level 1 first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LevelTable(pub [Bps; MAX_LEVELS]);

impl LevelTable {
    /// L1 6%, L2 3%, L3 2.5%, L4 2%, L5-L10 1% (20.5% total)
    pub const BETA: LevelTable = LevelTable([600, 300, 250, 200, 100, 100, 100, 100, 100, 100]);

    /// L1 4%, L2 2%, L3 1.5%, L4-L10 1% (14.5% total)
    pub const PERMANENT: LevelTable =
        LevelTable([400, 200, 150, 100, 100, 100, 100, 100, 100, 100]);

    /// Percentage for a 1-indexed level; 0 outside 1..=10.
    pub fn level_bps(&self, level: usize) -> Bps {
        if level == 0 || level > MAX_LEVELS {
            return 0;
        }
        self.0[level - 1]
    }

    pub fn sum_bps(&self) -> u32 {
        self.0.iter().map(|b| *b as u32).sum()
    }

    pub fn validate(&self) -> Result<(), TableError> {
        let sum = self.sum_bps();
        if sum as u128 > BPS_DENOMINATOR {
            return Err(TableError::LevelSumTooLarge(sum));
        }
        Ok(())
    }
}

// =============================================================================
// PRESETS
// =============================================================================

/// Which of the two configured percentage presets is in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPreset {
    #[default]
    Beta,
    Permanent,
}

impl fmt::Display for AllocationPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationPreset::Beta => f.write_str("beta"),
            AllocationPreset::Permanent => f.write_str("permanent"),
        }
    }
}

/// Bucket split plus level table for one preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetTables {
    pub buckets: AllocationTable,
    pub levels: LevelTable,
}

impl PresetTables {
    pub const BETA: PresetTables = PresetTables {
        buckets: AllocationTable::BETA,
        levels: LevelTable::BETA,
    };

    pub const PERMANENT: PresetTables = PresetTables {
        buckets: AllocationTable::PERMANENT,
        levels: LevelTable::PERMANENT,
    };

    pub fn validate(&self) -> Result<(), TableError> {
        self.buckets.validate()?;
        self.levels.validate()
    }
}

/// Result of splitting one deposit across the buckets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub liquidity: Amount,
    pub infrastructure: Amount,
    pub company: Amount,
    pub mlm_distributed: Amount,
    pub mlm_locked: Amount,
    pub emergency_reserve: Amount,
}

impl Allocation {
    pub fn total(&self) -> Amount {
        self.liquidity
            + self.infrastructure
            + self.company
            + self.mlm_distributed
            + self.mlm_locked
            + self.emergency_reserve
    }

    pub fn get(&self, bucket: PoolBucket) -> Amount {
        match bucket {
            PoolBucket::Liquidity => self.liquidity,
            PoolBucket::Infrastructure => self.infrastructure,
            PoolBucket::Company => self.company,
            PoolBucket::MlmDistributed => self.mlm_distributed,
            PoolBucket::MlmLocked => self.mlm_locked,
            PoolBucket::EmergencyReserve => self.emergency_reserve,
        }
    }
}
