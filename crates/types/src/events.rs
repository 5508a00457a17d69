//! Audit events emitted by the ledger engine.
//!
//! Every state transition that moves value or changes a safety flag pushes
//! one of these onto the engine's event log. External indexers drain the log
//! and publish it next to the epoch's report hash.

use crate::account::AccountId;
use crate::pool::{AllocationPreset, PoolBucket};
use crate::units::{Amount, Timestamp, WeekNumber};
use serde::{Deserialize, Serialize};

/// Where an emergency reserve spend sends its funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "bucket")]
pub enum ReserveDestination {
    /// Moved into another bucket; value stays in the system.
    Bucket(PoolBucket),
    /// Transferred out to an external recipient.
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    Registered {
        user: AccountId,
        sponsor: Option<AccountId>,
        at: Timestamp,
    },
    LicenseActivated {
        user: AccountId,
        fee_paid: Amount,
        months: u32,
        active_until: Timestamp,
    },
    SponsorBonusPaid {
        sponsor: AccountId,
        from: AccountId,
        amount: Amount,
    },
    LockedEarningsReleased {
        user: AccountId,
        amount: Amount,
    },
    LevelCapChanged {
        user: AccountId,
        old_cap: u8,
        new_cap: u8,
    },
    PerformanceDeposited {
        week: WeekNumber,
        amount: Amount,
        payers: u32,
        report_hash: Vec<u8>,
    },
    CommissionCredited {
        week: Option<WeekNumber>,
        payer: AccountId,
        ancestor: AccountId,
        level: u8,
        amount: Amount,
    },
    CommissionLocked {
        week: Option<WeekNumber>,
        payer: AccountId,
        ancestor: AccountId,
        level: u8,
        amount: Amount,
    },
    UserCreditSkipped {
        week: WeekNumber,
        user: AccountId,
        reason: String,
    },
    BatchProcessed {
        week: WeekNumber,
        processed_users: u32,
        total_users: u32,
        credited: Amount,
    },
    EpochCompleted {
        week: WeekNumber,
        total_credited: Amount,
    },
    Withdrawal {
        user: AccountId,
        amount: Amount,
    },
    InternalTransfer {
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
    WithdrawalScheduled {
        id: u64,
        bucket: PoolBucket,
        amount: Amount,
        executable_at: Timestamp,
    },
    WithdrawalExecuted {
        id: u64,
        bucket: PoolBucket,
        amount: Amount,
        recipient: AccountId,
    },
    WithdrawalCancelled {
        id: u64,
    },
    ReserveSpendProposed {
        id: u64,
        amount: Amount,
        destination: ReserveDestination,
        executable_at: Timestamp,
    },
    ReserveSpendExecuted {
        id: u64,
        amount: Amount,
        destination: ReserveDestination,
    },
    ReserveSpendCancelled {
        id: u64,
    },
    CircuitBreakerToggled {
        active: bool,
        ratio_bps: u64,
        manual: bool,
    },
    PresetChanged {
        preset: AllocationPreset,
    },
    PauseChanged {
        paused: bool,
    },
    ParameterUpdated {
        name: String,
        value: String,
    },
}
