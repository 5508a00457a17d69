//! Weekly epochs and resumable batch distribution.
//!
//! A deposit opens an epoch holding the week's payers, each with the
//! performance fee it paid and the MLM pool carved from that fee.
//! Commissions are then paid out over as many `process_next` calls as
//! needed, each bounded by `batch_size`.
//!
//! ## Key Invariants
//! - Epoch numbers start at 1 and increase by one per deposit
//! - `processed_users` only moves forward and stops at `total_users`
//! - Each payer is visited at most once per epoch
//! - A failing payer is recorded and skipped; the cursor still advances

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};
use unilevel_types::{AccountId, Allocation, Amount, Timestamp, WeekNumber, BPS_DENOMINATOR};

use crate::errors::{LedgerError, Result};

// =============================================================================
// EPOCH STATE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub total_users: u32,
    pub processed_users: u32,
    pub created_at: Timestamp,
    pub last_progress_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl BatchProgress {
    fn new(total_users: u32, now: Timestamp) -> Self {
        Self {
            total_users,
            processed_users: 0,
            created_at: now,
            last_progress_at: now,
            completed_at: (total_users == 0).then_some(now),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.processed_users >= self.total_users
    }

    /// Unfinished and idle for longer than `threshold`.
    pub fn is_stalled(&self, now: Timestamp, threshold: Timestamp) -> bool {
        !self.is_complete() && now.saturating_sub(self.last_progress_at) > threshold
    }

    pub fn percent_bps(&self) -> u64 {
        if self.total_users == 0 {
            return BPS_DENOMINATOR as u64;
        }
        self.processed_users as u64 * BPS_DENOMINATOR as u64 / self.total_users as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedUser {
    pub user: AccountId,
    pub reason: String,
}

/// One payer's line in a weekly deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochPayer {
    pub account: AccountId,
    /// Performance fee attributed to this account
    pub performance: Amount,
    /// MLM share of `performance`, paid up this account's sponsor chain
    pub mlm_pool: Amount,
}

/// One weekly performance deposit and its distribution job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyEpoch {
    pub week_number: WeekNumber,
    pub total_deposited: Amount,
    pub report_hash: Vec<u8>,
    pub allocation: Allocation,
    /// Deposit order
    pub payers: Vec<EpochPayer>,
    pub batch: BatchProgress,
    pub total_credited: Amount,
    pub skipped_users: Vec<SkippedUser>,
}

/// Result of one `process_next` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub week: WeekNumber,
    /// Payers visited by this call
    pub visited: u32,
    pub processed_users: u32,
    pub total_users: u32,
    /// Amount credited by this call
    pub credited: Amount,
    pub skipped: Vec<SkippedUser>,
    pub completed: bool,
}

/// Read-only progress summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgressView {
    pub week: WeekNumber,
    pub total_users: u32,
    pub processed_users: u32,
    pub percent_bps: u64,
    pub is_stalled: bool,
    pub is_complete: bool,
    /// Sum of the payers' MLM pools
    pub mlm_pools: Amount,
    pub total_credited: Amount,
    pub skipped_users: u32,
}

// =============================================================================
// SCHEDULER
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchScheduler {
    epochs: BTreeMap<WeekNumber, WeeklyEpoch>,
    current_week: WeekNumber,
    batch_size: u32,
    stall_threshold: Timestamp,
}

impl BatchScheduler {
    pub fn new(batch_size: u32, stall_threshold: Timestamp) -> Result<Self> {
        if batch_size == 0 {
            return Err(LedgerError::InvalidParameter("batch size must be positive".into()));
        }
        Ok(Self {
            epochs: BTreeMap::new(),
            current_week: 0,
            batch_size,
            stall_threshold,
        })
    }

    pub fn current_week(&self) -> WeekNumber {
        self.current_week
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<()> {
        if batch_size == 0 {
            return Err(LedgerError::InvalidParameter("batch size must be positive".into()));
        }
        self.batch_size = batch_size;
        Ok(())
    }

    pub fn epoch(&self, week: WeekNumber) -> Option<&WeeklyEpoch> {
        self.epochs.get(&week)
    }

    pub fn epochs(&self) -> impl Iterator<Item = &WeeklyEpoch> {
        self.epochs.values()
    }

    /// Open the next epoch for `payers`.
    ///
    /// The payers' MLM pools may not exceed the allocation's MLM bucket;
    /// whatever they leave over is never paid out.
    pub fn open_epoch(
        &mut self,
        amount: Amount,
        report_hash: Vec<u8>,
        allocation: Allocation,
        payers: Vec<EpochPayer>,
        now: Timestamp,
    ) -> Result<&WeeklyEpoch> {
        let total_users = u32::try_from(payers.len())
            .map_err(|_| LedgerError::InvalidParameter("too many payers".into()))?;
        let pools = payers
            .iter()
            .try_fold(0 as Amount, |acc, p| acc.checked_add(p.mlm_pool))
            .ok_or(LedgerError::ArithmeticOverflow("payer pools"))?;
        if pools > allocation.mlm_distributed {
            return Err(LedgerError::InvalidParameter(format!(
                "payer pools {pools} exceed the MLM allocation {}",
                allocation.mlm_distributed
            )));
        }
        let week = self
            .current_week
            .checked_add(1)
            .ok_or(LedgerError::ArithmeticOverflow("week number"))?;

        let epoch = WeeklyEpoch {
            week_number: week,
            total_deposited: amount,
            report_hash,
            allocation,
            payers,
            batch: BatchProgress::new(total_users, now),
            total_credited: 0,
            skipped_users: Vec::new(),
        };
        self.current_week = week;

        info!(
            target: "treasury",
            week,
            amount,
            payers = total_users,
            mlm_pools = pools,
            "Weekly epoch opened"
        );
        Ok(self.epochs.entry(week).or_insert(epoch))
    }

    /// Run `credit` for the next `batch_size` payers of `week`.
    ///
    /// `credit` receives the payer and its MLM pool and returns the amount
    /// actually credited.
    pub fn process_next<F>(
        &mut self,
        week: WeekNumber,
        now: Timestamp,
        mut credit: F,
    ) -> Result<BatchOutcome>
    where
        F: FnMut(&AccountId, Amount) -> Result<Amount>,
    {
        let batch_size = self.batch_size;
        let epoch = match self.epochs.get_mut(&week) {
            Some(epoch) if !epoch.batch.is_complete() => epoch,
            _ => return Err(LedgerError::NoWorkPending(week)),
        };

        let start = epoch.batch.processed_users as usize;
        let end = (start + batch_size as usize).min(epoch.payers.len());
        let mut credited: Amount = 0;
        let mut skipped = Vec::new();

        for payer in &epoch.payers[start..end] {
            let user = &payer.account;
            match credit(user, payer.mlm_pool) {
                Ok(amount) => credited = credited.saturating_add(amount),
                Err(err) => {
                    warn!(
                        target: "treasury",
                        week,
                        user = %user,
                        error = %err,
                        "Skipping payer credit"
                    );
                    skipped.push(SkippedUser {
                        user: *user,
                        reason: err.to_string(),
                    });
                }
            }
        }

        epoch.batch.processed_users = end as u32;
        epoch.batch.last_progress_at = now;
        epoch.total_credited = epoch.total_credited.saturating_add(credited);
        epoch.skipped_users.extend(skipped.iter().cloned());

        let completed = epoch.batch.is_complete();
        if completed {
            epoch.batch.completed_at = Some(now);
            info!(
                target: "treasury",
                week,
                total_credited = epoch.total_credited,
                skipped = epoch.skipped_users.len(),
                "Weekly epoch distribution complete"
            );
        }

        Ok(BatchOutcome {
            week,
            visited: (end - start) as u32,
            processed_users: epoch.batch.processed_users,
            total_users: epoch.batch.total_users,
            credited,
            skipped,
            completed,
        })
    }

    pub fn progress_view(&self, week: WeekNumber, now: Timestamp) -> Option<BatchProgressView> {
        let epoch = self.epochs.get(&week)?;
        Some(BatchProgressView {
            week,
            total_users: epoch.batch.total_users,
            processed_users: epoch.batch.processed_users,
            percent_bps: epoch.batch.percent_bps(),
            is_stalled: epoch.batch.is_stalled(now, self.stall_threshold),
            is_complete: epoch.batch.is_complete(),
            mlm_pools: epoch.payers.iter().map(|p| p.mlm_pool).sum(),
            total_credited: epoch.total_credited,
            skipped_users: epoch.skipped_users.len() as u32,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
