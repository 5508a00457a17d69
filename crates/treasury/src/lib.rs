//! Unilevel treasury engine
//!
//! Weekly performance deposits are split into pool buckets and paid out as
//! multi-level commissions over a sponsor tree, in resumable batches. Earned
//! balances leave the system through rate-limited withdrawals guarded by a
//! solvency circuit breaker; treasury buckets leave through timelocked
//! requests and a governed emergency reserve.

pub mod account_ledger;
pub mod auth;
pub mod batch;
pub mod commission;
pub mod config;
pub mod emergency;
pub mod engine;
pub mod errors;
pub mod limits;
pub mod pool_allocator;
pub mod solvency;
pub mod sponsor_graph;
mod state;
pub mod subscription;
pub mod timelock;
pub mod transfer;

pub use account_ledger::{
    AccountBalance, BalanceLedger, DebitKind, InMemoryBalanceLedger, MockBalanceLedger,
};
pub use auth::{AuthorizationPolicy, Role, RoleRegistry};
pub use batch::{BatchOutcome, BatchProgressView, EpochPayer, WeeklyEpoch};
pub use commission::{CommissionEngine, Distribution};
pub use config::EngineConfig;
pub use engine::{AccountDashboard, CommissionLedger, SystemState};
pub use errors::{ErrorCategory, LedgerError, Result};
pub use sponsor_graph::SponsorGraph;
pub use transfer::{InMemoryValueTransfer, TransferError, ValueTransfer};
