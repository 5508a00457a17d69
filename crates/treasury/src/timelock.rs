//! Timelocked treasury releases.
//!
//! [`TimelockQueue`] is the shared primitive: an entry is scheduled with an
//! `executable_at` deadline and moves once from `Pending` to either `Executed`
//! or `Cancelled`. [`TimelockWithdrawal`] uses it for bucket withdrawals; the
//! emergency reserve governor uses it for reserve spends.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;
use unilevel_types::{AccountId, Amount, PoolBucket, Timestamp};

use crate::errors::{LedgerError, Result};
use crate::pool_allocator::PoolAllocator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelockState {
    Pending,
    Executed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timelocked<P> {
    pub id: u64,
    pub payload: P,
    pub requested_at: Timestamp,
    pub executable_at: Timestamp,
    pub state: TimelockState,
}

impl<P> Timelocked<P> {
    pub fn is_pending(&self) -> bool {
        self.state == TimelockState::Pending
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelockQueue<P> {
    entries: BTreeMap<u64, Timelocked<P>>,
    next_id: u64,
    delay: Timestamp,
}

impl<P> TimelockQueue<P> {
    pub fn new(delay: Timestamp) -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: 1,
            delay,
        }
    }

    pub fn delay(&self) -> Timestamp {
        self.delay
    }

    /// Applies to entries scheduled after the change.
    pub fn set_delay(&mut self, delay: Timestamp) {
        self.delay = delay;
    }

    pub fn schedule(&mut self, payload: P, now: Timestamp) -> Result<&Timelocked<P>> {
        let executable_at = now
            .checked_add(self.delay)
            .ok_or(LedgerError::ArithmeticOverflow("timelock deadline"))?;
        let id = self.next_id;
        self.next_id += 1;
        Ok(self.entries.entry(id).or_insert(Timelocked {
            id,
            payload,
            requested_at: now,
            executable_at,
            state: TimelockState::Pending,
        }))
    }

    pub fn get(&self, id: u64) -> Option<&Timelocked<P>> {
        self.entries.get(&id)
    }

    /// Pending and past its deadline, or the reason it is not.
    pub fn ensure_executable(&self, id: u64, now: Timestamp) -> Result<&Timelocked<P>> {
        let entry = self.entries.get(&id).ok_or(LedgerError::UnknownRequest(id))?;
        if !entry.is_pending() {
            return Err(LedgerError::AlreadyFinalized(id));
        }
        if now < entry.executable_at {
            return Err(LedgerError::TimelockNotExpired {
                id,
                executable_at: entry.executable_at,
                now,
            });
        }
        Ok(entry)
    }

    pub fn mark_executed(&mut self, id: u64) -> Result<()> {
        self.transition(id, TimelockState::Executed)
    }

    pub fn cancel(&mut self, id: u64) -> Result<()> {
        self.transition(id, TimelockState::Cancelled)
    }

    /// Return an executed entry to `Pending` after its payout failed.
    pub fn revert_to_pending(&mut self, id: u64) -> Result<()> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(LedgerError::UnknownRequest(id))?;
        entry.state = TimelockState::Pending;
        Ok(())
    }

    pub fn pending(&self) -> impl Iterator<Item = &Timelocked<P>> {
        self.entries.values().filter(|e| e.is_pending())
    }

    fn transition(&mut self, id: u64, to: TimelockState) -> Result<()> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(LedgerError::UnknownRequest(id))?;
        if !entry.is_pending() {
            return Err(LedgerError::AlreadyFinalized(id));
        }
        entry.state = to;
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Bucket withdrawals
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalPayload {
    pub bucket: PoolBucket,
    pub amount: Amount,
    pub recipient: AccountId,
}

pub type WithdrawalRequest = Timelocked<WithdrawalPayload>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelockWithdrawal {
    queue: TimelockQueue<WithdrawalPayload>,
}

impl TimelockWithdrawal {
    pub fn new(delay: Timestamp) -> Self {
        Self {
            queue: TimelockQueue::new(delay),
        }
    }

    pub fn queue(&self) -> &TimelockQueue<WithdrawalPayload> {
        &self.queue
    }

    pub fn set_delay(&mut self, delay: Timestamp) {
        self.queue.set_delay(delay);
    }

    pub fn request(&self, id: u64) -> Option<&WithdrawalRequest> {
        self.queue.get(id)
    }

    /// Queue a withdrawal. The bucket must cover the amount now, but nothing
    /// is reserved until execution.
    pub fn schedule(
        &mut self,
        pools: &PoolAllocator,
        bucket: PoolBucket,
        amount: Amount,
        recipient: AccountId,
        now: Timestamp,
    ) -> Result<&WithdrawalRequest> {
        if amount == 0 {
            return Err(LedgerError::InvalidParameter("withdrawal amount must be positive".into()));
        }
        if bucket == PoolBucket::EmergencyReserve {
            return Err(LedgerError::InvalidParameter(
                "the emergency reserve is only spendable through governance".into(),
            ));
        }
        let held = pools.balance(bucket);
        if held < amount {
            return Err(LedgerError::InsufficientBucketBalance {
                bucket,
                available: held,
                requested: amount,
            });
        }

        let request = self.queue.schedule(
            WithdrawalPayload {
                bucket,
                amount,
                recipient,
            },
            now,
        )?;
        info!(
            target: "treasury",
            id = request.id,
            bucket = %bucket,
            amount,
            executable_at = request.executable_at,
            "Bucket withdrawal scheduled"
        );
        Ok(request)
    }

    pub fn ensure_executable(&self, id: u64, now: Timestamp) -> Result<WithdrawalPayload> {
        self.queue.ensure_executable(id, now).map(|r| r.payload)
    }

    /// Debit the bucket and mark the request executed. The caller performs
    /// the external transfer and calls [`Self::rollback`] if it fails.
    pub fn begin_execute(
        &mut self,
        pools: &mut PoolAllocator,
        id: u64,
        now: Timestamp,
    ) -> Result<WithdrawalPayload> {
        let payload = self.ensure_executable(id, now)?;
        pools.debit(payload.bucket, payload.amount)?;
        self.queue.mark_executed(id)?;
        Ok(payload)
    }

    pub fn rollback(&mut self, pools: &mut PoolAllocator, id: u64) -> Result<()> {
        let payload = self
            .queue
            .get(id)
            .map(|r| r.payload)
            .ok_or(LedgerError::UnknownRequest(id))?;
        pools.credit(payload.bucket, payload.amount)?;
        self.queue.revert_to_pending(id)
    }

    pub fn cancel(&mut self, id: u64) -> Result<()> {
        self.queue.cancel(id)?;
        info!(target: "treasury", id, "Bucket withdrawal cancelled");
        Ok(())
    }
}
