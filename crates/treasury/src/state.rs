//! Aggregate ledger state owned by [`crate::engine::CommissionLedger`].

use std::collections::{HashSet, VecDeque};
use tracing::{debug, warn};
use unilevel_types::{AccountId, LedgerEvent, Timestamp};

use crate::account_ledger::InMemoryBalanceLedger;
use crate::batch::BatchScheduler;
use crate::commission::{CapChange, CommissionEngine};
use crate::config::EngineConfig;
use crate::emergency::EmergencyReserveGovernor;
use crate::errors::{LedgerError, Result};
use crate::limits::{TreasuryPayoutLimiter, WithdrawalLimiter};
use crate::pool_allocator::PoolAllocator;
use crate::solvency::SolvencyMonitor;
use crate::sponsor_graph::SponsorGraph;
use crate::subscription::SubscriptionLedger;
use crate::timelock::TimelockWithdrawal;

/// Everything the engine mutates. Fields are public to the crate so the
/// engine can borrow components disjointly within one operation.
#[derive(Debug)]
pub struct LedgerState {
    pub(crate) graph: SponsorGraph,
    pub(crate) subscriptions: SubscriptionLedger,
    pub(crate) pools: PoolAllocator,
    pub(crate) commissions: CommissionEngine,
    pub(crate) batches: BatchScheduler,
    pub(crate) balances: InMemoryBalanceLedger,
    pub(crate) withdrawals: TimelockWithdrawal,
    pub(crate) solvency: SolvencyMonitor,
    pub(crate) reserve: EmergencyReserveGovernor,
    pub(crate) limits: WithdrawalLimiter,
    pub(crate) treasury_limit: TreasuryPayoutLimiter,
    pub(crate) paused: bool,
    /// Accounts with an outbound payout between commit and confirmation
    pub(crate) in_flight: HashSet<AccountId>,
    /// Undrained audit events, oldest first
    pub(crate) events: VecDeque<LedgerEvent>,
    pub(crate) max_buffered_events: usize,
    /// Events dropped since the last drain
    pub(crate) dropped_events: u64,
}

impl LedgerState {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| LedgerError::InvalidParameter(format!("{e:#}")))?;

        Ok(Self {
            graph: SponsorGraph::new(),
            subscriptions: SubscriptionLedger::new(config.license.clone()),
            pools: PoolAllocator::new(&config.allocation)?,
            commissions: CommissionEngine::new(config.commission.lock_inactive_earnings),
            batches: BatchScheduler::new(
                config.batch.batch_size,
                config.batch.stall_threshold_secs,
            )?,
            balances: InMemoryBalanceLedger::new(),
            withdrawals: TimelockWithdrawal::new(config.timelock.delay_secs),
            solvency: SolvencyMonitor::new(&config.solvency)?,
            reserve: EmergencyReserveGovernor::new(config.timelock.delay_secs),
            limits: WithdrawalLimiter::new(config.withdrawal.clone()),
            treasury_limit: TreasuryPayoutLimiter::new(config.treasury.clone()),
            paused: false,
            in_flight: HashSet::new(),
            events: VecDeque::new(),
            max_buffered_events: config.events.max_buffered,
            dropped_events: 0,
        })
    }

    /// Buffer `event`, dropping the oldest one once the buffer is full.
    pub(crate) fn emit(&mut self, event: LedgerEvent) {
        debug!(target: "treasury", ?event, "Ledger event");
        while self.events.len() >= self.max_buffered_events.max(1) {
            self.events.pop_front();
            self.dropped_events += 1;
            if self.dropped_events == 1 {
                warn!(
                    target: "treasury",
                    capacity = self.max_buffered_events,
                    "Event buffer full, dropping oldest events until drained"
                );
            }
        }
        self.events.push_back(event);
    }

    pub(crate) fn drain_events(&mut self) -> Vec<LedgerEvent> {
        if self.dropped_events > 0 {
            warn!(target: "treasury", dropped = self.dropped_events, "Events lost before drain");
            self.dropped_events = 0;
        }
        self.events.drain(..).collect()
    }

    pub(crate) fn ensure_not_paused(&self) -> Result<()> {
        if self.paused {
            return Err(LedgerError::Paused);
        }
        Ok(())
    }

    pub(crate) fn ensure_registered(&self, user: &AccountId) -> Result<()> {
        if !self.graph.contains(user) {
            return Err(LedgerError::NotRegistered(*user));
        }
        Ok(())
    }

    /// Recompute and store `user`'s cap, logging a change event.
    pub(crate) fn refresh_level_cap(&mut self, user: &AccountId, now: Timestamp) {
        let directs = self.graph.direct_referral_count(user);
        let (old_cap, new_cap) = self.subscriptions.recompute_level_cap(user, directs, now);
        if old_cap != new_cap {
            self.emit_cap_change(CapChange {
                account: *user,
                old_cap,
                new_cap,
            });
        }
    }

    pub(crate) fn emit_cap_change(&mut self, change: CapChange) {
        self.emit(LedgerEvent::LevelCapChanged {
            user: change.account,
            old_cap: change.old_cap,
            new_cap: change.new_cap,
        });
    }
}
