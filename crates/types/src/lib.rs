//! Unilevel shared types
//!
//! Account identifiers, canonical units, pool buckets with their percentage
//! tables, and the audit event vocabulary used by the treasury engine.

pub mod account;
pub mod events;
pub mod pool;
pub mod units;

pub use account::*;
pub use events::*;
pub use pool::*;
pub use units::*;
