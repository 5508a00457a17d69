//! Governed access to the emergency reserve bucket.
//!
//! Spends go through the same timelock as bucket withdrawals. They remain
//! possible while the circuit breaker is active, but never if they would push
//! the solvency ratio under the activation floor.

use serde::{Deserialize, Serialize};
use tracing::info;
use unilevel_types::{AccountId, Amount, PoolBucket, ReserveDestination, Timestamp};

use crate::errors::{LedgerError, Result};
use crate::pool_allocator::PoolAllocator;
use crate::timelock::{Timelocked, TimelockQueue};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveSpend {
    pub amount: Amount,
    pub justification: String,
    pub destination: ReserveDestination,
    /// Required for external spends
    pub recipient: Option<AccountId>,
}

impl ReserveSpend {
    /// Only external spends take value off the system account.
    pub fn reduces_assets(&self) -> bool {
        matches!(self.destination, ReserveDestination::External)
    }
}

pub type ReserveProposal = Timelocked<ReserveSpend>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyReserveGovernor {
    queue: TimelockQueue<ReserveSpend>,
}

impl EmergencyReserveGovernor {
    pub fn new(delay: Timestamp) -> Self {
        Self {
            queue: TimelockQueue::new(delay),
        }
    }

    pub fn set_delay(&mut self, delay: Timestamp) {
        self.queue.set_delay(delay);
    }

    pub fn proposal(&self, id: u64) -> Option<&ReserveProposal> {
        self.queue.get(id)
    }

    pub fn pending(&self) -> impl Iterator<Item = &ReserveProposal> {
        self.queue.pending()
    }

    pub fn propose(&mut self, spend: ReserveSpend, now: Timestamp) -> Result<&ReserveProposal> {
        if spend.amount == 0 {
            return Err(LedgerError::InvalidParameter("reserve spend must be positive".into()));
        }
        if spend.justification.trim().is_empty() {
            return Err(LedgerError::InvalidParameter("justification is required".into()));
        }
        match spend.destination {
            ReserveDestination::External if spend.recipient.is_none() => {
                return Err(LedgerError::InvalidParameter(
                    "external spends need a recipient".into(),
                ));
            }
            ReserveDestination::Bucket(PoolBucket::EmergencyReserve) => {
                return Err(LedgerError::InvalidParameter(
                    "cannot move the reserve into itself".into(),
                ));
            }
            _ => {}
        }

        let proposal = self.queue.schedule(spend, now)?;
        info!(
            target: "treasury",
            id = proposal.id,
            amount = proposal.payload.amount,
            destination = ?proposal.payload.destination,
            executable_at = proposal.executable_at,
            "Reserve spend proposed"
        );
        Ok(proposal)
    }

    pub fn ensure_executable(&self, id: u64, now: Timestamp) -> Result<&ReserveSpend> {
        self.queue.ensure_executable(id, now).map(|p| &p.payload)
    }

    /// Move the funds out of the reserve and mark the proposal executed.
    /// Bucket destinations are final here; external ones still need the
    /// transfer, with [`Self::rollback`] on failure.
    pub fn begin_execute(
        &mut self,
        pools: &mut PoolAllocator,
        id: u64,
        now: Timestamp,
    ) -> Result<ReserveSpend> {
        let spend = self.ensure_executable(id, now)?.clone();
        pools.debit(PoolBucket::EmergencyReserve, spend.amount)?;
        if let ReserveDestination::Bucket(bucket) = spend.destination {
            if let Err(err) = pools.credit(bucket, spend.amount) {
                pools.credit(PoolBucket::EmergencyReserve, spend.amount)?;
                return Err(err);
            }
        }
        self.queue.mark_executed(id)?;
        Ok(spend)
    }

    pub fn rollback(&mut self, pools: &mut PoolAllocator, id: u64) -> Result<()> {
        let amount = self
            .queue
            .get(id)
            .map(|p| p.payload.amount)
            .ok_or(LedgerError::UnknownRequest(id))?;
        pools.credit(PoolBucket::EmergencyReserve, amount)?;
        self.queue.revert_to_pending(id)
    }

    pub fn cancel(&mut self, id: u64) -> Result<()> {
        self.queue.cancel(id)?;
        info!(target: "treasury", id, "Reserve spend cancelled");
        Ok(())
    }
}
