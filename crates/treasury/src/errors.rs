use thiserror::Error;
use unilevel_types::{AccountId, Amount, PoolBucket, Timestamp, WeekNumber};

use crate::auth::Role;

/// Broad class of a ledger failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Structural,
    Financial,
    Lifecycle,
    Safety,
    Authorization,
    Validation,
}

/// Errors that can occur while operating the commission ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("account {0} is already registered")]
    AlreadyRegistered(AccountId),

    #[error("sponsor {0} is not registered")]
    SponsorNotRegistered(AccountId),

    #[error("account {0} cannot sponsor itself")]
    SelfSponsorship(AccountId),

    #[error("account {0} is not registered")]
    NotRegistered(AccountId),

    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: Amount, requested: Amount },

    #[error("bucket {bucket} holds {available}, requested {requested}")]
    InsufficientBucketBalance {
        bucket: PoolBucket,
        available: Amount,
        requested: Amount,
    },

    #[error("payment failed: {0}")]
    PaymentFailed(String),

    #[error("outbound transfer failed: {0}")]
    TransferFailed(String),

    #[error("withdrawal of {requested} is below the minimum of {minimum}")]
    BelowMinimumWithdrawal { minimum: Amount, requested: Amount },

    #[error("withdrawal of {requested} exceeds the limit ({remaining} remaining)")]
    WithdrawalLimitExceeded { remaining: Amount, requested: Amount },

    #[error("treasury payout of {requested} exceeds the daily limit ({remaining} remaining)")]
    TreasuryLimitExceeded { remaining: Amount, requested: Amount },

    #[error("arithmetic overflow while computing {0}")]
    ArithmeticOverflow(&'static str),

    #[error("request {0} is already finalized")]
    AlreadyFinalized(u64),

    #[error("request {id} is executable at {executable_at}, now is {now}")]
    TimelockNotExpired {
        id: u64,
        executable_at: Timestamp,
        now: Timestamp,
    },

    #[error("no distribution work pending for week {0}")]
    NoWorkPending(WeekNumber),

    #[error("unknown request {0}")]
    UnknownRequest(u64),

    #[error("circuit breaker is active: withdrawals are suspended")]
    CircuitBreakerActive,

    #[error("solvency would fall to {ratio_bps} bps, below the {threshold_bps} bps floor")]
    SolvencyBreach { ratio_bps: u64, threshold_bps: u64 },

    #[error("ledger is paused")]
    Paused,

    #[error("a transfer for {0} is already in flight")]
    ReentrantCall(AccountId),

    #[error("caller {caller} lacks the {role:?} role")]
    NotAuthorized { caller: AccountId, role: Role },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl LedgerError {
    pub fn category(&self) -> ErrorCategory {
        use LedgerError::*;
        match self {
            AlreadyRegistered(_) | SponsorNotRegistered(_) | SelfSponsorship(_)
            | NotRegistered(_) => ErrorCategory::Structural,
            InsufficientBalance { .. }
            | InsufficientBucketBalance { .. }
            | PaymentFailed(_)
            | TransferFailed(_)
            | BelowMinimumWithdrawal { .. }
            | WithdrawalLimitExceeded { .. }
            | TreasuryLimitExceeded { .. }
            | ArithmeticOverflow(_) => ErrorCategory::Financial,
            AlreadyFinalized(_) | TimelockNotExpired { .. } | NoWorkPending(_)
            | UnknownRequest(_) => ErrorCategory::Lifecycle,
            CircuitBreakerActive | SolvencyBreach { .. } | Paused | ReentrantCall(_) => {
                ErrorCategory::Safety
            }
            NotAuthorized { .. } => ErrorCategory::Authorization,
            InvalidParameter(_) => ErrorCategory::Validation,
        }
    }
}

impl From<unilevel_types::TableError> for LedgerError {
    fn from(err: unilevel_types::TableError) -> Self {
        LedgerError::InvalidParameter(err.to_string())
    }
}

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;
