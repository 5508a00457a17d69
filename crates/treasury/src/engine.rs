//! Commission ledger facade.
//!
//! [`CommissionLedger`] is the only public mutation surface. It owns the
//! aggregate [`LedgerState`] behind a single `RwLock`, so operations are
//! serialized and never observe a half-applied change.
//!
//! ## Transfers
//! - Inbound payments (licenses, weekly deposits) are collected before the
//!   ledger is touched and refunded if the mutation is then rejected
//! - Outbound payouts commit the ledger change and mark the account or
//!   request in flight, release the lock, transfer, then re-acquire the lock
//!   to confirm or roll back

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};
use unilevel_types::{
    AccountId, AllocationPreset, AllocationTable, Amount, Bps, BucketBalances, LedgerEvent,
    PoolBucket, ReserveDestination, Timestamp, WeekNumber, WEEK_SECS,
};

use crate::account_ledger::{AccountBalance, BalanceLedger, DebitKind};
use crate::auth::{AuthorizationPolicy, Role};
use crate::batch::{BatchOutcome, BatchProgressView, EpochPayer, WeeklyEpoch};
use crate::config::{EngineConfig, TreasuryConfig, WithdrawalConfig};
use crate::emergency::{ReserveProposal, ReserveSpend};
use crate::errors::{LedgerError, Result};
use crate::solvency::{BreakerTransition, SolvencyMonitor};
use crate::state::LedgerState;
use crate::timelock::WithdrawalRequest;
use crate::transfer::ValueTransfer;

/// Per-account read view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDashboard {
    pub user: AccountId,
    pub sponsor: Option<AccountId>,
    pub registered_at: Timestamp,
    pub balance: AccountBalance,
    pub license_active: bool,
    pub license_active_until: Timestamp,
    pub level_cap: u8,
    pub direct_referrals: u32,
    pub monthly_volume: Amount,
}

/// System-wide read view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemState {
    pub buckets: BucketBalances,
    pub bucket_total: Amount,
    pub total_available: Amount,
    pub total_locked: Amount,
    pub system_assets: Amount,
    pub current_week: WeekNumber,
    pub total_users: u32,
    pub active_users: u32,
    pub solvency_ratio_bps: u64,
    pub circuit_breaker_active: bool,
    pub paused: bool,
    pub preset: AllocationPreset,
}

pub struct CommissionLedger {
    state: RwLock<LedgerState>,
    rail: Arc<dyn ValueTransfer>,
    auth: Arc<dyn AuthorizationPolicy>,
    system_account: AccountId,
}

impl std::fmt::Debug for CommissionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommissionLedger")
            .field("system_account", &self.system_account)
            .finish_non_exhaustive()
    }
}

impl CommissionLedger {
    pub fn new(
        config: &EngineConfig,
        system_account: AccountId,
        rail: Arc<dyn ValueTransfer>,
        auth: Arc<dyn AuthorizationPolicy>,
    ) -> Result<Self> {
        let state = LedgerState::new(config)?;
        info!(
            target: "treasury",
            system_account = %system_account,
            preset = %config.allocation.preset,
            "Commission ledger initialized"
        );
        Ok(Self {
            state: RwLock::new(state),
            rail,
            auth,
            system_account,
        })
    }

    pub fn system_account(&self) -> AccountId {
        self.system_account
    }

    // =========================================================================
    // REGISTRATION & LICENSES
    // =========================================================================

    pub fn register(
        &self,
        user: AccountId,
        sponsor: Option<AccountId>,
        now: Timestamp,
    ) -> Result<()> {
        let mut state = self.state.write();
        state.ensure_not_paused()?;
        state.graph.register(user, sponsor, now)?;
        state.emit(LedgerEvent::Registered {
            user,
            sponsor,
            at: now,
        });
        if let Some(sponsor) = sponsor {
            state.refresh_level_cap(&sponsor, now);
        }
        Ok(())
    }

    /// Buy `months` of license, paid over the rail by `user`.
    pub fn activate_license(
        &self,
        user: AccountId,
        months: u32,
        now: Timestamp,
    ) -> Result<Timestamp> {
        let cost = {
            let state = self.state.read();
            state.ensure_not_paused()?;
            state.ensure_registered(&user)?;
            state.subscriptions.license_cost(months)?
        };
        self.collect(&user, cost)?;

        let result = {
            let mut state = self.state.write();
            state
                .ensure_not_paused()
                .and_then(|_| Self::apply_license(&mut state, user, months, cost, now))
        };
        if result.is_err() {
            self.refund(&user, cost);
        }
        result
    }

    /// Buy `months` of license out of `user`'s available balance.
    pub fn activate_license_with_balance(
        &self,
        user: AccountId,
        months: u32,
        now: Timestamp,
    ) -> Result<Timestamp> {
        let mut state = self.state.write();
        state.ensure_not_paused()?;
        state.ensure_registered(&user)?;
        let cost = state.subscriptions.license_cost(months)?;

        state.balances.debit_available(&user, cost, DebitKind::Purchase)?;
        match Self::apply_license(&mut state, user, months, cost, now) {
            Ok(active_until) => Ok(active_until),
            Err(err) => {
                state.balances.revert_debit(&user, cost, DebitKind::Purchase)?;
                Err(err)
            }
        }
    }

    fn apply_license(
        state: &mut LedgerState,
        user: AccountId,
        months: u32,
        paid: Amount,
        now: Timestamp,
    ) -> Result<Timestamp> {
        state.ensure_registered(&user)?;
        let sponsor = state.graph.sponsor_of(&user);

        let settlement = state
            .subscriptions
            .settle_payment(sponsor.as_ref(), paid, &mut state.balances)?;
        let undo_bonus = |state: &mut LedgerState| -> Result<()> {
            match sponsor {
                Some(s) if settlement.sponsor_bonus > 0 => {
                    state.balances.revert_credit(&s, settlement.sponsor_bonus, false)
                }
                _ => Ok(()),
            }
        };
        if let Err(err) = state.pools.credit(PoolBucket::Company, settlement.company_share) {
            undo_bonus(&mut *state)?;
            return Err(err);
        }
        let active_until = match state.subscriptions.activate(user, months, now) {
            Ok(until) => until,
            Err(err) => {
                state.pools.debit(PoolBucket::Company, settlement.company_share)?;
                undo_bonus(&mut *state)?;
                return Err(err);
            }
        };

        state.emit(LedgerEvent::LicenseActivated {
            user,
            fee_paid: paid,
            months,
            active_until,
        });
        if let Some(sponsor) = sponsor {
            if settlement.sponsor_bonus > 0 {
                state.emit(LedgerEvent::SponsorBonusPaid {
                    sponsor,
                    from: user,
                    amount: settlement.sponsor_bonus,
                });
            }
        }

        let released = state.balances.release_locked(&user)?;
        if released > 0 {
            info!(target: "treasury", user = %user, released, "Locked earnings released");
            state.emit(LedgerEvent::LockedEarningsReleased {
                user,
                amount: released,
            });
        }
        state.refresh_level_cap(&user, now);
        Ok(active_until)
    }

    pub fn update_monthly_volume(
        &self,
        caller: &AccountId,
        user: AccountId,
        volume: Amount,
        now: Timestamp,
    ) -> Result<()> {
        self.auth.ensure(caller, Role::Updater)?;
        let mut state = self.state.write();
        state.ensure_registered(&user)?;
        state.subscriptions.set_monthly_volume(user, volume);
        state.refresh_level_cap(&user, now);
        Ok(())
    }

    // =========================================================================
    // WEEKLY DISTRIBUTION
    // =========================================================================

    /// Collect the week's performance fees from `caller`, allocate their sum
    /// and open the next epoch with one entry per payer.
    pub fn deposit_weekly_performance(
        &self,
        caller: &AccountId,
        performances: Vec<(AccountId, Amount)>,
        report_hash: Vec<u8>,
        now: Timestamp,
    ) -> Result<WeekNumber> {
        self.auth.ensure(caller, Role::Distributor)?;
        if performances.is_empty() {
            return Err(LedgerError::InvalidParameter("no payers in deposit".into()));
        }
        if report_hash.is_empty() {
            return Err(LedgerError::InvalidParameter("report hash is required".into()));
        }
        let mut seen = HashSet::with_capacity(performances.len());
        let mut amount: Amount = 0;
        for (payer, fee) in &performances {
            if *fee == 0 {
                return Err(LedgerError::InvalidParameter(format!(
                    "performance fee for {payer} must be positive"
                )));
            }
            if !seen.insert(*payer) {
                return Err(LedgerError::InvalidParameter(format!("duplicate payer {payer}")));
            }
            amount = amount
                .checked_add(*fee)
                .ok_or(LedgerError::ArithmeticOverflow("weekly deposit"))?;
        }
        {
            let state = self.state.read();
            state.ensure_not_paused()?;
            for (payer, _) in &performances {
                state.ensure_registered(payer)?;
            }
        }
        self.collect(caller, amount)?;

        let result = {
            let mut state = self.state.write();
            Self::open_epoch(&mut state, amount, performances, report_hash, now)
        };
        if result.is_err() {
            self.refund(caller, amount);
        }
        result
    }

    fn open_epoch(
        state: &mut LedgerState,
        amount: Amount,
        performances: Vec<(AccountId, Amount)>,
        report_hash: Vec<u8>,
        now: Timestamp,
    ) -> Result<WeekNumber> {
        state.ensure_not_paused()?;
        // allocate is pure; apply it only once the epoch can be opened
        let allocation = state.pools.allocate(amount)?;
        let payers = performances
            .into_iter()
            .map(|(account, performance)| {
                state.ensure_registered(&account)?;
                Ok(EpochPayer {
                    account,
                    performance,
                    mlm_pool: state.pools.allocate(performance)?.mlm_distributed,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let epoch = state
            .batches
            .open_epoch(amount, report_hash.clone(), allocation, payers, now)?;
        let week = epoch.week_number;
        let payers = epoch.batch.total_users;
        state.pools.deposit(amount)?;

        state.emit(LedgerEvent::PerformanceDeposited {
            week,
            amount,
            payers,
            report_hash,
        });
        Ok(week)
    }

    /// Pay commissions for the next chunk of `week`'s payers.
    pub fn process_distribution_batch(
        &self,
        week: WeekNumber,
        now: Timestamp,
    ) -> Result<BatchOutcome> {
        let mut guard = self.state.write();
        guard.ensure_not_paused()?;
        let state = &mut *guard;

        let LedgerState {
            graph,
            subscriptions,
            pools,
            commissions,
            batches,
            balances,
            ..
        } = &mut *state;

        let mut events = Vec::new();
        let outcome = batches.process_next(week, now, |payer, pool| {
            let dist =
                commissions.distribute(graph, subscriptions, pools, balances, payer, pool, now)?;
            for change in &dist.cap_changes {
                events.push(LedgerEvent::LevelCapChanged {
                    user: change.account,
                    old_cap: change.old_cap,
                    new_cap: change.new_cap,
                });
            }
            for credit in &dist.credits {
                let (week, payer, ancestor, level, amount) =
                    (Some(week), *payer, credit.ancestor, credit.level, credit.amount);
                events.push(if credit.locked {
                    LedgerEvent::CommissionLocked {
                        week,
                        payer,
                        ancestor,
                        level,
                        amount,
                    }
                } else {
                    LedgerEvent::CommissionCredited {
                        week,
                        payer,
                        ancestor,
                        level,
                        amount,
                    }
                });
            }
            Ok(dist.total())
        })?;

        for event in events {
            state.emit(event);
        }
        for skipped in &outcome.skipped {
            state.emit(LedgerEvent::UserCreditSkipped {
                week,
                user: skipped.user,
                reason: skipped.reason.clone(),
            });
        }
        state.emit(LedgerEvent::BatchProcessed {
            week,
            processed_users: outcome.processed_users,
            total_users: outcome.total_users,
            credited: outcome.credited,
        });
        if outcome.completed {
            let total_credited = state
                .batches
                .epoch(week)
                .map(|e| e.total_credited)
                .unwrap_or(outcome.credited);
            state.emit(LedgerEvent::EpochCompleted {
                week,
                total_credited,
            });
        }
        Ok(outcome)
    }

    // =========================================================================
    // USER WITHDRAWALS
    // =========================================================================

    /// Pay `amount` of `user`'s available balance out over the rail.
    pub fn withdraw(&self, user: AccountId, amount: Amount, now: Timestamp) -> Result<()> {
        let previous_usage = {
            let mut state = self.state.write();
            state.ensure_not_paused()?;
            state.solvency.ensure_withdrawals_allowed()?;
            if state.in_flight.contains(&user) {
                return Err(LedgerError::ReentrantCall(user));
            }
            state.ensure_registered(&user)?;
            state.limits.check(&user, amount, now)?;

            state.balances.debit_available(&user, amount, DebitKind::Withdrawal)?;
            let previous = state.limits.record(user, amount, now);
            state.in_flight.insert(user);
            previous
        };

        let transfer = self.rail.transfer(&self.system_account, &user, amount);

        let mut state = self.state.write();
        state.in_flight.remove(&user);
        match transfer {
            Ok(()) => {
                info!(target: "treasury", user = %user, amount, "Withdrawal paid");
                state.emit(LedgerEvent::Withdrawal { user, amount });
                Ok(())
            }
            Err(err) => {
                warn!(
                    target: "treasury",
                    user = %user,
                    amount,
                    error = %err,
                    "Withdrawal transfer failed"
                );
                state.balances.revert_debit(&user, amount, DebitKind::Withdrawal)?;
                state.limits.restore(user, previous_usage);
                Err(LedgerError::TransferFailed(err.to_string()))
            }
        }
    }

    /// Move `amount` of `from`'s available balance to `to`. Nothing leaves
    /// the system, so total liabilities are unchanged.
    pub fn transfer_balance(&self, from: AccountId, to: AccountId, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Err(LedgerError::InvalidParameter("transfer amount must be positive".into()));
        }
        if to.is_zero() {
            return Err(LedgerError::InvalidParameter("transfer to the zero account".into()));
        }
        if to == from {
            return Err(LedgerError::InvalidParameter("transfer to self".into()));
        }
        let mut state = self.state.write();
        state.ensure_not_paused()?;
        if state.in_flight.contains(&from) {
            return Err(LedgerError::ReentrantCall(from));
        }
        state.ensure_registered(&from)?;
        state.ensure_registered(&to)?;

        state.balances.move_available(&from, &to, amount)?;
        info!(target: "treasury", from = %from, to = %to, amount, "Internal transfer");
        state.emit(LedgerEvent::InternalTransfer { from, to, amount });
        Ok(())
    }

    // =========================================================================
    // SOLVENCY
    // =========================================================================

    pub fn check_and_update_circuit_breaker(&self, now: Timestamp) -> Option<BreakerTransition> {
        let assets = self.rail.balance_of(&self.system_account);
        let mut state = self.state.write();
        let liabilities = state.balances.total_liabilities();
        let transition = state.solvency.check_and_update(assets, liabilities, now)?;
        state.emit(LedgerEvent::CircuitBreakerToggled {
            active: transition.active,
            ratio_bps: transition.ratio_bps,
            manual: false,
        });
        Some(transition)
    }

    pub fn force_circuit_breaker(&self, caller: &AccountId, active: bool) -> Result<()> {
        self.auth.ensure(caller, Role::Governor)?;
        let mut state = self.state.write();
        if let Some(transition) = state.solvency.force_set(active) {
            state.emit(LedgerEvent::CircuitBreakerToggled {
                active: transition.active,
                ratio_bps: transition.ratio_bps,
                manual: true,
            });
        }
        Ok(())
    }

    // =========================================================================
    // TIMELOCKED BUCKET WITHDRAWALS
    // =========================================================================

    pub fn schedule_withdrawal(
        &self,
        caller: &AccountId,
        bucket: PoolBucket,
        amount: Amount,
        recipient: AccountId,
        now: Timestamp,
    ) -> Result<u64> {
        self.auth.ensure(caller, Role::Treasury)?;
        let mut state = self.state.write();
        let state = &mut *state;
        let request = state
            .withdrawals
            .schedule(&state.pools, bucket, amount, recipient, now)?;
        let (id, executable_at) = (request.id, request.executable_at);
        state.emit(LedgerEvent::WithdrawalScheduled {
            id,
            bucket,
            amount,
            executable_at,
        });
        Ok(id)
    }

    pub fn execute_withdrawal(&self, caller: &AccountId, id: u64, now: Timestamp) -> Result<()> {
        self.auth.ensure(caller, Role::Treasury)?;
        let (payload, previous_usage) = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let pending = state.withdrawals.ensure_executable(id, now)?;
            state.solvency.ensure_withdrawals_allowed()?;
            state.treasury_limit.check(pending.amount, now)?;
            let payload = state.withdrawals.begin_execute(&mut state.pools, id, now)?;
            (payload, state.treasury_limit.record(payload.amount, now))
        };

        let transfer = self
            .rail
            .transfer(&self.system_account, &payload.recipient, payload.amount);

        let mut guard = self.state.write();
        let state = &mut *guard;
        match transfer {
            Ok(()) => {
                info!(
                    target: "treasury",
                    id,
                    bucket = %payload.bucket,
                    amount = payload.amount,
                    "Bucket withdrawal executed"
                );
                state.emit(LedgerEvent::WithdrawalExecuted {
                    id,
                    bucket: payload.bucket,
                    amount: payload.amount,
                    recipient: payload.recipient,
                });
                Ok(())
            }
            Err(err) => {
                warn!(target: "treasury", id, error = %err, "Bucket withdrawal transfer failed");
                state.treasury_limit.restore(previous_usage);
                state.withdrawals.rollback(&mut state.pools, id)?;
                Err(LedgerError::TransferFailed(err.to_string()))
            }
        }
    }

    pub fn cancel_withdrawal(&self, caller: &AccountId, id: u64) -> Result<()> {
        self.auth.ensure(caller, Role::Treasury)?;
        let mut state = self.state.write();
        state.withdrawals.cancel(id)?;
        state.emit(LedgerEvent::WithdrawalCancelled { id });
        Ok(())
    }

    // =========================================================================
    // EMERGENCY RESERVE
    // =========================================================================

    pub fn propose_reserve_spend(
        &self,
        caller: &AccountId,
        amount: Amount,
        justification: impl Into<String>,
        destination: ReserveDestination,
        recipient: Option<AccountId>,
        now: Timestamp,
    ) -> Result<u64> {
        self.auth.ensure(caller, Role::Governor)?;
        let mut state = self.state.write();
        let proposal = state.reserve.propose(
            ReserveSpend {
                amount,
                justification: justification.into(),
                destination,
                recipient,
            },
            now,
        )?;
        let (id, executable_at) = (proposal.id, proposal.executable_at);
        state.emit(LedgerEvent::ReserveSpendProposed {
            id,
            amount,
            destination,
            executable_at,
        });
        Ok(id)
    }

    /// Execute a matured reserve spend. Allowed while the breaker is active.
    pub fn execute_reserve_spend(
        &self,
        caller: &AccountId,
        id: u64,
        now: Timestamp,
    ) -> Result<()> {
        self.auth.ensure(caller, Role::Governor)?;
        let assets = self.rail.balance_of(&self.system_account);
        let spend = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let pending = state.reserve.ensure_executable(id, now)?;
            if pending.reduces_assets() {
                let liabilities = state.balances.total_liabilities();
                state
                    .solvency
                    .ensure_spend_keeps_solvency(assets, liabilities, pending.amount)?;
            }
            let spend = state.reserve.begin_execute(&mut state.pools, id, now)?;
            if !spend.reduces_assets() {
                state.emit(LedgerEvent::ReserveSpendExecuted {
                    id,
                    amount: spend.amount,
                    destination: spend.destination,
                });
                return Ok(());
            }
            spend
        };

        let recipient = spend.recipient.ok_or_else(|| {
            LedgerError::InvalidParameter("external spend without recipient".into())
        })?;
        let transfer = self.rail.transfer(&self.system_account, &recipient, spend.amount);

        let mut guard = self.state.write();
        let state = &mut *guard;
        match transfer {
            Ok(()) => {
                warn!(target: "treasury", id, amount = spend.amount, "Emergency reserve paid out");
                state.emit(LedgerEvent::ReserveSpendExecuted {
                    id,
                    amount: spend.amount,
                    destination: spend.destination,
                });
                Ok(())
            }
            Err(err) => {
                warn!(target: "treasury", id, error = %err, "Reserve spend transfer failed");
                state.reserve.rollback(&mut state.pools, id)?;
                Err(LedgerError::TransferFailed(err.to_string()))
            }
        }
    }

    pub fn cancel_reserve_spend(&self, caller: &AccountId, id: u64) -> Result<()> {
        self.auth.ensure(caller, Role::Governor)?;
        let mut state = self.state.write();
        state.reserve.cancel(id)?;
        state.emit(LedgerEvent::ReserveSpendCancelled { id });
        Ok(())
    }

    // =========================================================================
    // ADMINISTRATION
    // =========================================================================

    pub fn pause(&self, caller: &AccountId) -> Result<()> {
        self.set_paused(caller, true)
    }

    pub fn unpause(&self, caller: &AccountId) -> Result<()> {
        self.set_paused(caller, false)
    }

    fn set_paused(&self, caller: &AccountId, paused: bool) -> Result<()> {
        self.auth.ensure(caller, Role::Admin)?;
        let mut state = self.state.write();
        if state.paused != paused {
            state.paused = paused;
            warn!(target: "treasury", paused, "Ledger pause state changed");
            state.emit(LedgerEvent::PauseChanged { paused });
        }
        Ok(())
    }

    pub fn set_preset(&self, caller: &AccountId, preset: AllocationPreset) -> Result<()> {
        self.auth.ensure(caller, Role::Admin)?;
        let mut state = self.state.write();
        state.pools.set_preset(preset);
        state.emit(LedgerEvent::PresetChanged { preset });
        Ok(())
    }

    pub fn update_bucket_table(
        &self,
        caller: &AccountId,
        preset: AllocationPreset,
        table: AllocationTable,
    ) -> Result<()> {
        self.auth.ensure(caller, Role::Admin)?;
        let mut state = self.state.write();
        state.pools.set_bucket_table(preset, table)?;
        Self::parameter_updated(
            &mut state,
            format!("bucket_table.{preset}"),
            format!("{table:?}"),
        );
        Ok(())
    }

    pub fn update_batch_size(&self, caller: &AccountId, batch_size: u32) -> Result<()> {
        self.auth.ensure(caller, Role::Admin)?;
        let mut state = self.state.write();
        state.batches.set_batch_size(batch_size)?;
        Self::parameter_updated(&mut state, "batch_size", batch_size.to_string());
        Ok(())
    }

    /// Applies to requests scheduled after the change.
    pub fn update_timelock_delay(&self, caller: &AccountId, delay_secs: Timestamp) -> Result<()> {
        self.auth.ensure(caller, Role::Admin)?;
        if delay_secs > 4 * WEEK_SECS {
            return Err(LedgerError::InvalidParameter(
                "timelock delay cannot exceed four weeks".into(),
            ));
        }
        let mut state = self.state.write();
        state.withdrawals.set_delay(delay_secs);
        state.reserve.set_delay(delay_secs);
        Self::parameter_updated(&mut state, "timelock_delay_secs", delay_secs.to_string());
        Ok(())
    }

    pub fn update_solvency_thresholds(
        &self,
        caller: &AccountId,
        activation_bps: u64,
        recovery_bps: u64,
    ) -> Result<()> {
        self.auth.ensure(caller, Role::Admin)?;
        let mut state = self.state.write();
        state.solvency.set_thresholds(activation_bps, recovery_bps)?;
        Self::parameter_updated(
            &mut state,
            "solvency_thresholds",
            format!("{activation_bps}/{recovery_bps}"),
        );
        Ok(())
    }

    pub fn update_sponsor_bonus(&self, caller: &AccountId, bps: Bps) -> Result<()> {
        self.auth.ensure(caller, Role::Admin)?;
        let mut state = self.state.write();
        state.subscriptions.set_sponsor_bonus_bps(bps)?;
        Self::parameter_updated(&mut state, "sponsor_bonus_bps", bps.to_string());
        Ok(())
    }

    pub fn update_withdrawal_limits(
        &self,
        caller: &AccountId,
        limits: WithdrawalConfig,
    ) -> Result<()> {
        self.auth.ensure(caller, Role::Admin)?;
        let mut state = self.state.write();
        let rendered = format!(
            "min={} per_tx={} per_window={} window_secs={}",
            limits.min_withdrawal, limits.max_per_tx, limits.max_per_window, limits.window_secs
        );
        state.limits.set_config(limits)?;
        Self::parameter_updated(&mut state, "withdrawal_limits", rendered);
        Ok(())
    }

    pub fn update_treasury_limit(&self, caller: &AccountId, limit: TreasuryConfig) -> Result<()> {
        self.auth.ensure(caller, Role::Admin)?;
        let mut state = self.state.write();
        let rendered = format!(
            "per_window={} window_secs={}",
            limit.max_payout_per_window, limit.window_secs
        );
        state.treasury_limit.set_config(limit)?;
        Self::parameter_updated(&mut state, "treasury_limit", rendered);
        Ok(())
    }

    fn parameter_updated(state: &mut LedgerState, name: impl Into<String>, value: String) {
        let name = name.into();
        info!(target: "treasury", name = %name, value = %value, "Parameter updated");
        state.emit(LedgerEvent::ParameterUpdated { name, value });
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub fn account_dashboard(
        &self,
        user: &AccountId,
        now: Timestamp,
    ) -> Result<AccountDashboard> {
        let state = self.state.read();
        let node = state.graph.node(user).ok_or(LedgerError::NotRegistered(*user))?;
        let license = state.subscriptions.license(user).cloned().unwrap_or_default();
        Ok(AccountDashboard {
            user: *user,
            sponsor: node.sponsor,
            registered_at: node.registered_at,
            balance: state.balances.balance_of(user),
            license_active: license.active_until > now,
            license_active_until: license.active_until,
            level_cap: state
                .subscriptions
                .level_cap_at(user, node.direct_referral_count, now),
            direct_referrals: node.direct_referral_count,
            monthly_volume: license.monthly_volume,
        })
    }

    pub fn system_state(&self, now: Timestamp) -> SystemState {
        let assets = self.rail.balance_of(&self.system_account);
        let state = self.state.read();
        let buckets = *state.pools.balances();
        let liabilities = state.balances.total_liabilities();
        SystemState {
            bucket_total: buckets.total(),
            buckets,
            total_available: state.balances.total_available(),
            total_locked: state.balances.total_locked(),
            system_assets: assets,
            current_week: state.batches.current_week(),
            total_users: state.graph.len() as u32,
            active_users: state.subscriptions.active_count(now) as u32,
            solvency_ratio_bps: SolvencyMonitor::ratio_bps(assets, liabilities),
            circuit_breaker_active: state.solvency.is_active(),
            paused: state.paused,
            preset: state.pools.active_preset(),
        }
    }

    pub fn batch_progress(&self, week: WeekNumber, now: Timestamp) -> Option<BatchProgressView> {
        self.state.read().batches.progress_view(week, now)
    }

    pub fn epoch(&self, week: WeekNumber) -> Option<WeeklyEpoch> {
        self.state.read().batches.epoch(week).cloned()
    }

    pub fn withdrawal_request(&self, id: u64) -> Option<WithdrawalRequest> {
        self.state.read().withdrawals.request(id).cloned()
    }

    pub fn reserve_proposal(&self, id: u64) -> Option<ReserveProposal> {
        self.state.read().reserve.proposal(id).cloned()
    }

    pub fn direct_referrals(&self, user: &AccountId) -> Vec<AccountId> {
        self.state.read().graph.direct_referrals(user).to_vec()
    }

    pub fn top_earners(&self, limit: usize) -> Vec<(AccountId, AccountBalance)> {
        self.state.read().balances.top_earners(limit)
    }

    /// Take every buffered event. The buffer holds at most
    /// `events.max_buffered` entries, so callers are expected to drain it
    /// regularly; older events are dropped once it is full.
    pub fn drain_events(&self) -> Vec<LedgerEvent> {
        self.state.write().drain_events()
    }

    // =========================================================================
    // RAIL
    // =========================================================================

    fn collect(&self, from: &AccountId, amount: Amount) -> Result<()> {
        self.rail
            .transfer(from, &self.system_account, amount)
            .map_err(|e| LedgerError::PaymentFailed(e.to_string()))
    }

    fn refund(&self, to: &AccountId, amount: Amount) {
        if let Err(err) = self.rail.transfer(&self.system_account, to, amount) {
            error!(target: "treasury", account = %to, amount, error = %err, "Refund failed");
        }
    }
}
