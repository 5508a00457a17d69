//! Multi-level commission computation.
//!
//! For a paying account, walk up to ten sponsors and pay each a fixed
//! percentage of the MLM pool. Whether an ancestor is paid, and whether the
//! payment is withdrawable or parked, depends on its level cap at `now`:
//!
//! 1. `level <= cap`: credited to `available`
//! 2. `cap == 0` with locking enabled and `level <= 5`: credited to `locked`
//! 3. anything else: not paid
//!
//! Unpaid levels and rounding residue stay in `MlmDistributed`.

use serde::{Deserialize, Serialize};
use tracing::debug;
use unilevel_types::{apply_bps, AccountId, Amount, PoolBucket, Timestamp, MAX_LEVELS};

use crate::account_ledger::BalanceLedger;
use crate::errors::{LedgerError, Result};
use crate::pool_allocator::PoolAllocator;
use crate::sponsor_graph::SponsorGraph;
use crate::subscription::{SubscriptionLedger, BASIC_DEPTH_CAP};

/// One planned or applied level payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionCredit {
    pub ancestor: AccountId,
    pub level: u8,
    pub amount: Amount,
    pub locked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapChange {
    pub account: AccountId,
    pub old_cap: u8,
    pub new_cap: u8,
}

/// Outcome of one distribution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub credits: Vec<CommissionCredit>,
    pub total_available: Amount,
    pub total_locked: Amount,
    pub cap_changes: Vec<CapChange>,
}

impl Distribution {
    pub fn total(&self) -> Amount {
        self.total_available + self.total_locked
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionEngine {
    lock_inactive_earnings: bool,
}

impl CommissionEngine {
    pub fn new(lock_inactive_earnings: bool) -> Self {
        Self {
            lock_inactive_earnings,
        }
    }

    /// Work out who gets what without touching any state. Ancestors whose
    /// cap at `now` differs from the stored one are listed in `cap_changes`.
    pub fn plan(
        &self,
        graph: &SponsorGraph,
        subscriptions: &SubscriptionLedger,
        pools: &PoolAllocator,
        payer: &AccountId,
        mlm_pool: Amount,
        now: Timestamp,
    ) -> Result<Distribution> {
        if !graph.contains(payer) {
            return Err(LedgerError::NotRegistered(*payer));
        }
        let levels = pools.level_table();
        let mut plan = Distribution::default();

        for (level, ancestor) in graph.ancestors_of(payer, MAX_LEVELS) {
            let directs = graph.direct_referral_count(&ancestor);
            let old_cap = subscriptions.stored_level_cap(&ancestor);
            let cap = subscriptions.level_cap_at(&ancestor, directs, now);
            if old_cap != cap {
                plan.cap_changes.push(CapChange {
                    account: ancestor,
                    old_cap,
                    new_cap: cap,
                });
            }

            let locked = if level <= cap as usize {
                false
            } else if cap == 0 && self.lock_inactive_earnings && level <= BASIC_DEPTH_CAP as usize
            {
                true
            } else {
                continue;
            };

            let amount = apply_bps(mlm_pool, levels.level_bps(level))
                .ok_or(LedgerError::ArithmeticOverflow("level commission"))?;
            if amount == 0 {
                continue;
            }
            if locked {
                plan.total_locked += amount;
            } else {
                plan.total_available += amount;
            }
            plan.credits.push(CommissionCredit {
                ancestor,
                level: level as u8,
                amount,
                locked,
            });
        }
        Ok(plan)
    }

    /// Plan, then apply: credit every ancestor, debit `MlmDistributed` by
    /// the total and store the refreshed caps. Either everything is applied
    /// or nothing is.
    #[allow(clippy::too_many_arguments)]
    pub fn distribute(
        &self,
        graph: &SponsorGraph,
        subscriptions: &mut SubscriptionLedger,
        pools: &mut PoolAllocator,
        balances: &mut dyn BalanceLedger,
        payer: &AccountId,
        mlm_pool: Amount,
        now: Timestamp,
    ) -> Result<Distribution> {
        let plan = self.plan(graph, subscriptions, pools, payer, mlm_pool, now)?;

        let held = pools.balance(PoolBucket::MlmDistributed);
        if held < plan.total() {
            return Err(LedgerError::InsufficientBucketBalance {
                bucket: PoolBucket::MlmDistributed,
                available: held,
                requested: plan.total(),
            });
        }

        for (applied, credit) in plan.credits.iter().enumerate() {
            let outcome = if credit.locked {
                balances.credit_locked(&credit.ancestor, credit.amount)
            } else {
                balances.credit_available(&credit.ancestor, credit.amount)
            };
            if let Err(err) = outcome {
                for undo in plan.credits[..applied].iter().rev() {
                    balances.revert_credit(&undo.ancestor, undo.amount, undo.locked)?;
                }
                return Err(err);
            }
            debug!(
                target: "treasury",
                payer = %payer.short(),
                ancestor = %credit.ancestor.short(),
                level = credit.level,
                amount = credit.amount,
                locked = credit.locked,
                "Commission credited"
            );
        }

        pools.debit(PoolBucket::MlmDistributed, plan.total())?;
        for change in &plan.cap_changes {
            let directs = graph.direct_referral_count(&change.account);
            subscriptions.recompute_level_cap(&change.account, directs, now);
        }
        Ok(plan)
    }
}
