//! Commission Ledger Smoke Test
//!
//! End-to-end scenarios through the public `CommissionLedger` surface:
//! - Registration, licensing and the unconditional sponsor bonus
//! - Weekly deposit, bucket allocation and batched commission payout
//! - Locked earnings for lapsed sponsors, released on renewal
//! - Withdrawal limits, rail failures, reentrancy and internal transfers
//! - Circuit breaker hysteresis, timelocked bucket withdrawals under the daily
//!   treasury limit, emergency reserve
//! - Bounded event buffer
//! - Value conservation: rail assets == buckets + balances after every step
//!
//! Run with: cargo test -p unilevel-treasury --test ledger_smoke -- --nocapture

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use unilevel_treasury::{
    CommissionLedger, EngineConfig, InMemoryValueTransfer, LedgerError, RoleRegistry,
    TransferError, ValueTransfer,
};
use unilevel_types::{
    format_usd, usd, AccountId, Amount, LedgerEvent, PoolBucket, ReserveDestination, Timestamp,
    DAY_SECS,
};

// =============================================================================
// TEST HELPERS
// =============================================================================

const T0: Timestamp = 1_700_000_000;

struct Harness {
    ledger: Arc<CommissionLedger>,
    rail: Arc<InMemoryValueTransfer>,
    owner: AccountId,
    system: AccountId,
}

fn harness() -> Harness {
    harness_with(EngineConfig::default())
}

fn harness_with(config: EngineConfig) -> Harness {
    let rail = Arc::new(InMemoryValueTransfer::new());
    let owner = AccountId::from_label("owner");
    let system = AccountId::from_label("system");
    rail.mint(owner, usd(10_000_000));

    let ledger = CommissionLedger::new(
        &config,
        system,
        rail.clone(),
        Arc::new(RoleRegistry::with_owner(owner)),
    )
    .unwrap();

    Harness {
        ledger: Arc::new(ledger),
        rail,
        owner,
        system,
    }
}

/// Register `label` under `sponsor` and buy one month of license.
fn join(h: &Harness, label: &str, sponsor: Option<AccountId>, now: Timestamp) -> AccountId {
    let user = AccountId::from_label(label);
    h.rail.mint(user, usd(1_000));
    h.ledger.register(user, sponsor, now).unwrap();
    h.ledger.activate_license(user, 1, now).unwrap();
    user
}

fn deposit(h: &Harness, payers: &[(AccountId, Amount)], now: Timestamp) -> u64 {
    h.ledger
        .deposit_weekly_performance(&h.owner, payers.to_vec(), b"weekly-report".to_vec(), now)
        .unwrap()
}

fn run_epoch(h: &Harness, week: u64, now: Timestamp) {
    loop {
        let outcome = h.ledger.process_distribution_batch(week, now).unwrap();
        if outcome.completed {
            break;
        }
    }
}

fn available(h: &Harness, user: &AccountId) -> Amount {
    h.ledger.account_dashboard(user, T0).unwrap().balance.available
}

fn set_system_assets(h: &Harness, target: Amount) {
    let current = h.rail.balance_of(&h.system);
    if target < current {
        h.rail.burn(&h.system, current - target);
    } else {
        h.rail.mint(h.system, target - current);
    }
}

fn assert_conserved(h: &Harness) {
    let s = h.ledger.system_state(T0);
    assert_eq!(
        s.system_assets,
        s.bucket_total + s.total_available + s.total_locked,
        "system assets must equal buckets plus balances"
    );
}

// =============================================================================
// TEST 1: REGISTRATION AND SPONSOR BONUS
// =============================================================================

#[test]
fn test_license_pays_sponsor_bonus() {
    println!("\n=== TEST 1: License Activation and Sponsor Bonus ===");
    let h = harness();

    let a = join(&h, "alice", None, T0);
    let b = AccountId::from_label("bob");
    h.rail.mint(b, usd(100));
    h.ledger.register(b, Some(a), T0).unwrap();

    let until = h.ledger.activate_license(b, 1, T0).unwrap();
    println!("  bob active until {until}");
    assert_eq!(until, T0 + 30 * DAY_SECS);

    let bonus = available(&h, &a);
    println!("  alice bonus: {}", format_usd(bonus));
    assert_eq!(bonus, 4_750_000);
    assert_eq!(h.rail.balance_of(&b), usd(81));

    // alice's fee plus bob's fee minus the bonus
    let company = h.ledger.system_state(T0).buckets.company;
    assert_eq!(company, usd(19) + 14_250_000);
    assert_conserved(&h);

    let dashboard = h.ledger.account_dashboard(&a, T0).unwrap();
    assert_eq!(dashboard.direct_referrals, 1);
    assert_eq!(dashboard.level_cap, 5);
    assert_eq!(h.ledger.direct_referrals(&a), vec![b]);
    println!("✓ Sponsor bonus credited, remainder booked to company");
}

#[test]
fn test_registration_rejections() {
    println!("\n=== TEST 1b: Registration Rejections ===");
    let h = harness();
    let a = join(&h, "alice", None, T0);
    let ghost = AccountId::from_label("ghost");
    let carol = AccountId::from_label("carol");

    assert_eq!(
        h.ledger.register(a, None, T0),
        Err(LedgerError::AlreadyRegistered(a))
    );
    assert_eq!(
        h.ledger.register(carol, Some(carol), T0),
        Err(LedgerError::SelfSponsorship(carol))
    );
    assert_eq!(
        h.ledger.register(carol, Some(ghost), T0),
        Err(LedgerError::SponsorNotRegistered(ghost))
    );
    assert_eq!(
        h.ledger.activate_license(ghost, 1, T0),
        Err(LedgerError::NotRegistered(ghost))
    );

    // no funds on the rail: payment fails and nothing changes
    h.ledger.register(carol, Some(a), T0).unwrap();
    let before = available(&h, &a);
    assert!(matches!(
        h.ledger.activate_license(carol, 1, T0),
        Err(LedgerError::PaymentFailed(_))
    ));
    assert_eq!(available(&h, &a), before);
    assert!(!h.ledger.account_dashboard(&carol, T0).unwrap().license_active);
    assert_conserved(&h);
    println!("✓ Invalid registrations and unpaid licenses leave no trace");
}

// =============================================================================
// TEST 2: WEEKLY DISTRIBUTION
// =============================================================================

#[test]
fn test_weekly_distribution_over_chain() {
    println!("\n=== TEST 2: Weekly Distribution A <- B <- C ===");
    let h = harness();
    let a = join(&h, "alice", None, T0);
    let b = join(&h, "bob", Some(a), T0);
    let c = join(&h, "carol", Some(b), T0);

    let week = deposit(&h, &[(c, usd(1_000))], T0 + 10);
    assert_eq!(week, 1);
    let epoch = h.ledger.epoch(week).unwrap();
    println!("  allocation: {:?}", epoch.allocation);
    assert_eq!(epoch.allocation.mlm_distributed, usd(600));
    assert_eq!(epoch.payers.len(), 1);
    assert_eq!(epoch.payers[0].account, c);
    assert_eq!(epoch.payers[0].mlm_pool, usd(600));

    run_epoch(&h, week, T0 + 20);

    // carol's $600 pool pays bob 6% and alice 3%
    let bonus = 4_750_000;
    assert_eq!(available(&h, &b), bonus + usd(36));
    assert_eq!(available(&h, &a), bonus + usd(18));
    assert_eq!(available(&h, &c), 0);

    let state = h.ledger.system_state(T0 + 20);
    assert_eq!(state.buckets.mlm_distributed, usd(600) - usd(54));
    println!("  dust left in MLM bucket: {}", format_usd(state.buckets.mlm_distributed));
    assert_conserved(&h);

    let progress = h.ledger.batch_progress(week, T0 + 20).unwrap();
    assert!(progress.is_complete);
    assert_eq!(progress.percent_bps, 10_000);
    assert_eq!(progress.mlm_pools, usd(600));
    assert_eq!(progress.total_credited, usd(54));

    let events = h.ledger.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, LedgerEvent::EpochCompleted { week: 1, total_credited } if *total_credited == usd(54))));
    assert!(h.ledger.drain_events().is_empty());
    println!("✓ Commissions credited level by level, residue stays in bucket");
}

#[test]
fn test_each_payer_funds_its_own_chain() {
    println!("\n=== TEST 2b: Per-Payer Pools ===");
    let h = harness();
    let a = join(&h, "alice", None, T0);
    let b = join(&h, "bob", Some(a), T0);
    let c = join(&h, "carol", Some(b), T0);

    let week = deposit(&h, &[(b, usd(500)), (c, usd(1_000))], T0);
    let epoch = h.ledger.epoch(week).unwrap();
    assert_eq!(epoch.total_deposited, usd(1_500));
    assert_eq!(epoch.allocation.mlm_distributed, usd(900));
    let pools: Vec<_> = epoch.payers.iter().map(|p| p.mlm_pool).collect();
    assert_eq!(pools, vec![usd(300), usd(600)]);
    run_epoch(&h, week, T0);

    // alice: 6% of bob's $300 plus 3% of carol's $600
    let bonus = 4_750_000;
    assert_eq!(available(&h, &a), bonus + usd(18) + usd(18));
    assert_eq!(available(&h, &b), bonus + usd(36));
    assert_eq!(h.ledger.epoch(week).unwrap().total_credited, usd(72));
    assert_conserved(&h);
    println!("✓ A payer's fee only pays its own sponsor chain");
}

#[test]
fn test_batches_resume_across_calls() {
    println!("\n=== TEST 3: Resumable Batches ===");
    let h = harness();
    let root = join(&h, "root", None, T0);
    let mut payers = vec![(root, usd(200))];
    for i in 0..4 {
        payers.push((join(&h, &format!("member-{i}"), Some(root), T0), usd(200)));
    }
    h.ledger.update_batch_size(&h.owner, 2).unwrap();

    let week = deposit(&h, &payers, T0);
    let mut last = 0;
    let mut calls = 0;
    loop {
        let outcome = h.ledger.process_distribution_batch(week, T0 + calls).unwrap();
        calls += 1;
        println!("  call {calls}: {}/{}", outcome.processed_users, outcome.total_users);
        assert!(outcome.processed_users > last);
        last = outcome.processed_users;
        if outcome.completed {
            break;
        }
    }
    assert_eq!(calls, 3);
    assert_eq!(
        h.ledger.process_distribution_batch(week, T0),
        Err(LedgerError::NoWorkPending(week))
    );
    assert_eq!(
        h.ledger.process_distribution_batch(99, T0),
        Err(LedgerError::NoWorkPending(99))
    );
    assert_conserved(&h);
    println!("✓ Progress is monotonic and finishes exactly once");
}

#[test]
fn test_failed_payer_is_skipped() {
    println!("\n=== TEST 4: Skip and Continue ===");
    let mut config = EngineConfig::default();
    config.timelock.delay_secs = 0;
    let h = harness_with(config);
    let a = join(&h, "alice", None, T0);
    let b = join(&h, "bob", Some(a), T0);
    let c = join(&h, "carol", Some(b), T0);

    // bob's $120 pool needs $7.20, carol's $480 pool needs $43.20
    let week = deposit(&h, &[(b, usd(200)), (c, usd(800))], T0);
    // drain the MLM bucket to $15 before the batch runs
    let ops = AccountId::from_label("ops");
    let id = h
        .ledger
        .schedule_withdrawal(&h.owner, PoolBucket::MlmDistributed, usd(585), ops, T0)
        .unwrap();
    h.ledger.execute_withdrawal(&h.owner, id, T0).unwrap();

    let outcome = h.ledger.process_distribution_batch(week, T0).unwrap();
    println!("  skipped: {:?}", outcome.skipped);
    assert!(outcome.completed);
    assert_eq!(outcome.credited, 7_200_000);
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].user, c);
    assert_eq!(available(&h, &b), 4_750_000);

    let events = h.ledger.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, LedgerEvent::UserCreditSkipped { user, .. } if *user == c)));
    assert_conserved(&h);
    println!("✓ One failing payer does not block the epoch");
}

#[test]
fn test_deposit_validation() {
    println!("\n=== TEST 5: Deposit Validation ===");
    let h = harness();
    let a = join(&h, "alice", None, T0);
    let ghost = AccountId::from_label("ghost");
    let owner_funds = h.rail.balance_of(&h.owner);
    let report = || b"r".to_vec();

    let rejected = [
        (vec![], report()),
        (vec![(a, 0)], report()),
        (vec![(a, usd(1)), (a, usd(2))], report()),
        (vec![(a, usd(1))], Vec::new()),
    ];
    for (payers, hash) in rejected {
        assert!(matches!(
            h.ledger.deposit_weekly_performance(&h.owner, payers, hash, T0),
            Err(LedgerError::InvalidParameter(_))
        ));
    }
    assert_eq!(
        h.ledger
            .deposit_weekly_performance(&h.owner, vec![(a, usd(1)), (ghost, usd(1))], report(), T0),
        Err(LedgerError::NotRegistered(ghost))
    );
    assert!(matches!(
        h.ledger.deposit_weekly_performance(&a, vec![(a, usd(1))], report(), T0),
        Err(LedgerError::NotAuthorized { .. })
    ));
    assert_eq!(h.rail.balance_of(&h.owner), owner_funds);
    assert_eq!(h.ledger.system_state(T0).current_week, 0);

    // a root payer has nobody to pay; its whole pool stays in the bucket
    let week = deposit(&h, &[(a, usd(500))], T0);
    let outcome = h.ledger.process_distribution_batch(week, T0).unwrap();
    assert!(outcome.completed);
    assert_eq!(outcome.credited, 0);
    assert_eq!(h.ledger.system_state(T0).buckets.mlm_distributed, usd(300));
    assert_conserved(&h);
    println!("✓ Malformed deposits collect nothing");
}

// =============================================================================
// TEST 6: LOCKED EARNINGS
// =============================================================================

#[test]
fn test_locked_earnings_released_on_renewal() {
    println!("\n=== TEST 6: Locked Earnings for Lapsed Sponsor ===");
    let h = harness();
    let a = join(&h, "alice", None, T0);
    let b = join(&h, "bob", Some(a), T0);

    let later = T0 + 31 * DAY_SECS;
    h.ledger.activate_license(b, 1, later).unwrap();
    assert!(!h.ledger.account_dashboard(&a, later).unwrap().license_active);

    let week = deposit(&h, &[(b, usd(1_000))], later);
    run_epoch(&h, week, later);

    let dash = h.ledger.account_dashboard(&a, later).unwrap();
    println!("  alice locked: {}", format_usd(dash.balance.locked));
    assert_eq!(dash.balance.locked, usd(36));
    assert_eq!(dash.balance.available, 2 * 4_750_000);
    assert_conserved(&h);

    h.ledger.activate_license(a, 1, later + 1).unwrap();
    let dash = h.ledger.account_dashboard(&a, later + 1).unwrap();
    assert_eq!(dash.balance.locked, 0);
    assert_eq!(dash.balance.available, usd(36) + 2 * 4_750_000);

    let events = h.ledger.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        LedgerEvent::LockedEarningsReleased { user, amount } if *user == a && *amount == usd(36)
    )));
    assert_conserved(&h);
    println!("✓ Locked earnings move to available on renewal");
}

#[test]
fn test_license_paid_from_balance() {
    println!("\n=== TEST 7: License Paid From Earnings ===");
    let h = harness();
    let a = join(&h, "alice", None, T0);
    for i in 0..4 {
        join(&h, &format!("referral-{i}"), Some(a), T0);
    }
    // four bonuses of $4.75
    assert_eq!(available(&h, &a), usd(19));

    let until = h
        .ledger
        .activate_license_with_balance(a, 1, T0 + 5 * DAY_SECS)
        .unwrap();
    assert_eq!(until, T0 + 35 * DAY_SECS);
    assert_eq!(available(&h, &a), 0);
    let balance = h.ledger.account_dashboard(&a, T0).unwrap().balance;
    assert_eq!(balance.total_withdrawn, 0);
    assert_eq!(balance.total_earned, usd(19));
    assert_eq!(
        h.ledger.activate_license_with_balance(a, 1, T0),
        Err(LedgerError::InsufficientBalance {
            available: 0,
            requested: usd(19)
        })
    );
    assert!(matches!(
        h.ledger.activate_license(a, 2, T0),
        Err(LedgerError::InvalidParameter(_))
    ));
    assert_conserved(&h);
    println!("✓ Balance-funded renewal keeps the books balanced");
}

// =============================================================================
// TEST 8: WITHDRAWALS
// =============================================================================

/// alice root, bob under her; $50k from bob leaves alice with $1,804.75.
fn funded_pair(h: &Harness) -> (AccountId, AccountId) {
    let a = join(h, "alice", None, T0);
    let b = join(h, "bob", Some(a), T0);
    let week = deposit(h, &[(b, usd(50_000))], T0 + 10);
    run_epoch(h, week, T0 + 10);
    assert_eq!(available(h, &a), 1_804_750_000);
    (a, b)
}

#[test]
fn test_withdrawal_limits_and_rollback() {
    println!("\n=== TEST 8: Withdrawals ===");
    let h = harness();
    let (a, _) = funded_pair(&h);
    let now = T0 + 20;

    assert!(matches!(
        h.ledger.withdraw(a, usd(49), now),
        Err(LedgerError::BelowMinimumWithdrawal { .. })
    ));
    assert!(matches!(
        h.ledger.withdraw(a, usd(10_001), now),
        Err(LedgerError::WithdrawalLimitExceeded { .. })
    ));

    h.ledger.withdraw(a, usd(100), now).unwrap();
    assert_eq!(h.rail.balance_of(&a), usd(1_081));
    assert_conserved(&h);

    h.rail.fail_next(1);
    assert!(matches!(
        h.ledger.withdraw(a, usd(100), now),
        Err(LedgerError::TransferFailed(_))
    ));
    assert_eq!(available(&h, &a), 1_704_750_000);
    assert_conserved(&h);

    h.ledger.withdraw(a, 1_704_750_000, now).unwrap();
    assert_eq!(
        h.ledger.withdraw(a, usd(50), now),
        Err(LedgerError::InsufficientBalance {
            available: 0,
            requested: usd(50)
        })
    );
    let dash = h.ledger.account_dashboard(&a, now).unwrap();
    assert_eq!(dash.balance.total_withdrawn, 1_804_750_000);
    assert_conserved(&h);
    println!("✓ Limits enforced, failed transfer rolled back");
}

struct ReentrantRail {
    inner: InMemoryValueTransfer,
    ledger: Mutex<Option<Arc<CommissionLedger>>>,
    target: AccountId,
    armed: AtomicBool,
    nested: Mutex<Option<Result<(), LedgerError>>>,
}

impl ValueTransfer for ReentrantRail {
    fn balance_of(&self, account: &AccountId) -> Amount {
        self.inner.balance_of(account)
    }

    fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TransferError> {
        if *to == self.target && self.armed.swap(false, Ordering::SeqCst) {
            let ledger = self.ledger.lock().clone();
            if let Some(ledger) = ledger {
                *self.nested.lock() = Some(ledger.withdraw(*to, amount, T0 + 30));
            }
        }
        self.inner.transfer(from, to, amount)
    }
}

#[test]
fn test_reentrant_withdrawal_is_rejected() {
    println!("\n=== TEST 9: Reentrancy ===");
    let alice = AccountId::from_label("alice");
    let rail = Arc::new(ReentrantRail {
        inner: InMemoryValueTransfer::new(),
        ledger: Mutex::new(None),
        target: alice,
        armed: AtomicBool::new(false),
        nested: Mutex::new(None),
    });
    let owner = AccountId::from_label("owner");
    rail.inner.mint(owner, usd(1_000_000));
    rail.inner.mint(alice, usd(100));

    let ledger = Arc::new(
        CommissionLedger::new(
            &EngineConfig::default(),
            AccountId::from_label("system"),
            rail.clone(),
            Arc::new(RoleRegistry::with_owner(owner)),
        )
        .unwrap(),
    );
    *rail.ledger.lock() = Some(ledger.clone());

    let bob = AccountId::from_label("bob");
    rail.inner.mint(bob, usd(100));
    ledger.register(alice, None, T0).unwrap();
    ledger.activate_license(alice, 1, T0).unwrap();
    ledger.register(bob, Some(alice), T0).unwrap();
    ledger.activate_license(bob, 1, T0).unwrap();
    let week = ledger
        .deposit_weekly_performance(&owner, vec![(bob, usd(50_000))], b"r".to_vec(), T0)
        .unwrap();
    ledger.process_distribution_batch(week, T0).unwrap();

    rail.armed.store(true, Ordering::SeqCst);
    ledger.withdraw(alice, usd(100), T0 + 30).unwrap();

    let nested = rail.nested.lock().clone();
    println!("  nested call result: {nested:?}");
    assert_eq!(nested, Some(Err(LedgerError::ReentrantCall(alice))));
    let dash = ledger.account_dashboard(&alice, T0 + 30).unwrap();
    assert_eq!(dash.balance.available, 1_704_750_000);

    // break the Arc cycle
    rail.ledger.lock().take();
    println!("✓ Nested withdrawal during payout rejected");
}

#[test]
fn test_internal_transfer_moves_balance() {
    println!("\n=== TEST 9b: Internal Transfer ===");
    let h = harness();
    let (a, b) = funded_pair(&h);
    let before = h.ledger.system_state(T0);
    let b_before = available(&h, &b);

    h.ledger.transfer_balance(a, b, usd(500)).unwrap();
    assert_eq!(available(&h, &a), 1_304_750_000);
    assert_eq!(available(&h, &b), b_before + usd(500));

    let after = h.ledger.system_state(T0);
    assert_eq!(after.total_available, before.total_available);
    assert_eq!(after.system_assets, before.system_assets);
    let sender = h.ledger.account_dashboard(&a, T0).unwrap().balance;
    assert_eq!(sender.total_withdrawn, 0);
    assert_eq!(sender.total_earned, 1_804_750_000);
    assert_eq!(h.ledger.account_dashboard(&b, T0).unwrap().balance.total_earned, b_before);

    let events = h.ledger.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        LedgerEvent::InternalTransfer { from, to, amount }
            if *from == a && *to == b && *amount == usd(500)
    )));

    let ghost = AccountId::from_label("ghost");
    for (to, amount) in [(b, 0), (AccountId::ZERO, usd(1)), (a, usd(1))] {
        assert!(matches!(
            h.ledger.transfer_balance(a, to, amount),
            Err(LedgerError::InvalidParameter(_))
        ));
    }
    assert_eq!(
        h.ledger.transfer_balance(a, ghost, usd(1)),
        Err(LedgerError::NotRegistered(ghost))
    );
    assert_eq!(
        h.ledger.transfer_balance(a, b, usd(2_000)),
        Err(LedgerError::InsufficientBalance {
            available: 1_304_750_000,
            requested: usd(2_000)
        })
    );
    h.ledger.pause(&h.owner).unwrap();
    assert_eq!(h.ledger.transfer_balance(b, a, usd(1)), Err(LedgerError::Paused));
    assert_conserved(&h);
    println!("✓ Balance moves between members, liabilities unchanged");
}

// =============================================================================
// TEST 10: CIRCUIT BREAKER
// =============================================================================

#[test]
fn test_circuit_breaker_hysteresis() {
    println!("\n=== TEST 10: Circuit Breaker Hysteresis ===");
    let h = harness();
    let a = join(&h, "alice", None, T0);
    join(&h, "bob", Some(a), T0);
    // liabilities are alice's $4.75 bonus
    let liabilities: Amount = 4_750_000;

    let steps: [(Amount, Option<bool>); 4] = [
        (5_462_500, Some(true)),  // 115%
        (5_937_500, None),        // 125%
        (6_887_500, None),        // 145%
        (7_362_500, Some(false)), // 155%
    ];
    for (assets, expected) in steps {
        set_system_assets(&h, assets);
        let transition = h.ledger.check_and_update_circuit_breaker(T0);
        let ratio = h.ledger.system_state(T0).solvency_ratio_bps;
        println!("  ratio {ratio} bps -> {transition:?}");
        assert_eq!(ratio as u128, assets * 10_000 / liabilities);
        assert_eq!(transition.map(|t| t.active), expected);
        if expected == Some(true) {
            assert_eq!(
                h.ledger.withdraw(a, usd(50), T0),
                Err(LedgerError::CircuitBreakerActive)
            );
        }
    }
    assert!(!h.ledger.system_state(T0).circuit_breaker_active);

    h.ledger.force_circuit_breaker(&h.owner, true).unwrap();
    assert!(h.ledger.system_state(T0).circuit_breaker_active);
    assert!(h.ledger.check_and_update_circuit_breaker(T0).is_some());
    assert!(!h.ledger.system_state(T0).circuit_breaker_active);
    println!("✓ Trips below 120%, recovers at 150%");
}

// =============================================================================
// TEST 11: TIMELOCKED BUCKET WITHDRAWALS
// =============================================================================

#[test]
fn test_timelocked_bucket_withdrawal() {
    println!("\n=== TEST 11: Timelocked Bucket Withdrawal ===");
    let h = harness();
    let payer = join(&h, "payer", None, T0);
    deposit(&h, &[(payer, usd(100_000))], T0);
    let ops = AccountId::from_label("ops");

    let id = h
        .ledger
        .schedule_withdrawal(&h.owner, PoolBucket::Infrastructure, usd(500), ops, T0)
        .unwrap();
    let request = h.ledger.withdrawal_request(id).unwrap();
    assert_eq!(request.executable_at, T0 + 2 * DAY_SECS);

    assert!(matches!(
        h.ledger.execute_withdrawal(&h.owner, id, T0 + DAY_SECS),
        Err(LedgerError::TimelockNotExpired { .. })
    ));

    h.rail.fail_next(1);
    assert!(matches!(
        h.ledger.execute_withdrawal(&h.owner, id, T0 + 2 * DAY_SECS),
        Err(LedgerError::TransferFailed(_))
    ));
    assert_eq!(h.ledger.system_state(T0).buckets.infrastructure, usd(12_000));
    assert_conserved(&h);

    h.ledger.execute_withdrawal(&h.owner, id, T0 + 2 * DAY_SECS).unwrap();
    assert_eq!(h.rail.balance_of(&ops), usd(500));
    assert_eq!(h.ledger.system_state(T0).buckets.infrastructure, usd(11_500));
    assert_eq!(
        h.ledger.execute_withdrawal(&h.owner, id, T0 + 3 * DAY_SECS),
        Err(LedgerError::AlreadyFinalized(id))
    );

    let second = h
        .ledger
        .schedule_withdrawal(&h.owner, PoolBucket::Company, usd(10), ops, T0)
        .unwrap();
    h.ledger.cancel_withdrawal(&h.owner, second).unwrap();
    assert_eq!(
        h.ledger.cancel_withdrawal(&h.owner, second),
        Err(LedgerError::AlreadyFinalized(second))
    );
    assert_eq!(
        h.ledger.execute_withdrawal(&h.owner, 77, T0),
        Err(LedgerError::UnknownRequest(77))
    );
    assert!(matches!(
        h.ledger
            .schedule_withdrawal(&h.owner, PoolBucket::EmergencyReserve, 1, ops, T0),
        Err(LedgerError::InvalidParameter(_))
    ));

    h.ledger.force_circuit_breaker(&h.owner, true).unwrap();
    let third = h
        .ledger
        .schedule_withdrawal(&h.owner, PoolBucket::Company, usd(10), ops, T0)
        .unwrap();
    assert_eq!(
        h.ledger.execute_withdrawal(&h.owner, third, T0 + 2 * DAY_SECS),
        Err(LedgerError::CircuitBreakerActive)
    );
    assert_conserved(&h);
    println!("✓ Executes once after the delay, rolls back on rail failure");
}

#[test]
fn test_daily_treasury_limit() {
    println!("\n=== TEST 11b: Daily Treasury Limit ===");
    let mut config = EngineConfig::default();
    config.timelock.delay_secs = 0;
    let h = harness_with(config);
    let payer = join(&h, "payer", None, T0);
    deposit(&h, &[(payer, usd(1_000_000))], T0);
    let ops = AccountId::from_label("ops");
    let schedule = |amount: Amount| {
        h.ledger
            .schedule_withdrawal(&h.owner, PoolBucket::Company, amount, ops, T0)
            .unwrap()
    };

    // a failed payout does not use up the limit
    let full = schedule(usd(50_000));
    h.rail.fail_next(1);
    assert!(matches!(
        h.ledger.execute_withdrawal(&h.owner, full, T0),
        Err(LedgerError::TransferFailed(_))
    ));
    h.ledger.execute_withdrawal(&h.owner, full, T0).unwrap();

    let extra = schedule(usd(1));
    assert_eq!(
        h.ledger.execute_withdrawal(&h.owner, extra, T0 + DAY_SECS - 1),
        Err(LedgerError::TreasuryLimitExceeded {
            remaining: 0,
            requested: usd(1)
        })
    );
    assert!(h.ledger.withdrawal_request(extra).unwrap().is_pending());

    h.ledger.execute_withdrawal(&h.owner, extra, T0 + DAY_SECS).unwrap();
    assert_eq!(h.rail.balance_of(&ops), usd(50_001));

    let raised = unilevel_treasury::config::TreasuryConfig {
        max_payout_per_window: usd(100_000),
        ..Default::default()
    };
    h.ledger.update_treasury_limit(&h.owner, raised).unwrap();
    let more = schedule(usd(60_000));
    h.ledger.execute_withdrawal(&h.owner, more, T0 + DAY_SECS).unwrap();
    assert_conserved(&h);
    println!("✓ Treasury payouts capped per rolling day");
}

// =============================================================================
// TEST 12: EMERGENCY RESERVE
// =============================================================================

#[test]
fn test_emergency_reserve_governance() {
    println!("\n=== TEST 12: Emergency Reserve ===");
    let mut config = EngineConfig::default();
    config.timelock.delay_secs = DAY_SECS;
    let h = harness_with(config);
    let a = join(&h, "alice", None, T0);
    let b = join(&h, "bob", Some(a), T0);
    deposit(&h, &[(b, usd(10_000))], T0);
    assert_eq!(h.ledger.system_state(T0).buckets.emergency_reserve, usd(100));

    // breaker does not block reserve spending
    h.ledger.force_circuit_breaker(&h.owner, true).unwrap();
    let internal = h
        .ledger
        .propose_reserve_spend(
            &h.owner,
            usd(40),
            "top up liquidity",
            ReserveDestination::Bucket(PoolBucket::Liquidity),
            None,
            T0,
        )
        .unwrap();
    assert!(matches!(
        h.ledger.execute_reserve_spend(&h.owner, internal, T0),
        Err(LedgerError::TimelockNotExpired { .. })
    ));
    h.ledger
        .execute_reserve_spend(&h.owner, internal, T0 + DAY_SECS)
        .unwrap();
    let buckets = h.ledger.system_state(T0).buckets;
    assert_eq!(buckets.emergency_reserve, usd(60));
    assert_eq!(buckets.liquidity, usd(440));
    assert_conserved(&h);

    let mm = AccountId::from_label("market-maker");
    let external = h
        .ledger
        .propose_reserve_spend(&h.owner, usd(20), "market making", ReserveDestination::External, Some(mm), T0)
        .unwrap();
    h.ledger
        .execute_reserve_spend(&h.owner, external, T0 + DAY_SECS)
        .unwrap();
    assert_eq!(h.rail.balance_of(&mm), usd(20));
    assert_conserved(&h);

    let risky = h
        .ledger
        .propose_reserve_spend(&h.owner, usd(20), "drain", ReserveDestination::External, Some(mm), T0)
        .unwrap();
    // leave assets just above the liabilities
    set_system_assets(&h, usd(25));
    assert!(matches!(
        h.ledger.execute_reserve_spend(&h.owner, risky, T0 + DAY_SECS),
        Err(LedgerError::SolvencyBreach { .. })
    ));
    assert!(h.ledger.reserve_proposal(risky).unwrap().is_pending());
    h.ledger.cancel_reserve_spend(&h.owner, risky).unwrap();

    let stranger = AccountId::from_label("stranger");
    assert!(matches!(
        h.ledger.propose_reserve_spend(&stranger, 1, "x", ReserveDestination::External, Some(mm), T0),
        Err(LedgerError::NotAuthorized { .. })
    ));
    println!("✓ Governed, timelocked and solvency-checked");
}

// =============================================================================
// TEST 13: ADMINISTRATION
// =============================================================================

#[test]
fn test_pause_and_admin_controls() {
    println!("\n=== TEST 13: Pause and Admin ===");
    let h = harness();
    let a = join(&h, "alice", None, T0);
    let stranger = AccountId::from_label("stranger");

    assert!(matches!(
        h.ledger.pause(&stranger),
        Err(LedgerError::NotAuthorized { .. })
    ));
    h.ledger.pause(&h.owner).unwrap();
    assert_eq!(
        h.ledger.register(stranger, Some(a), T0),
        Err(LedgerError::Paused)
    );
    assert_eq!(h.ledger.activate_license(a, 1, T0), Err(LedgerError::Paused));
    assert_eq!(
        h.ledger
            .deposit_weekly_performance(&h.owner, vec![(a, usd(1))], b"r".to_vec(), T0),
        Err(LedgerError::Paused)
    );
    assert_eq!(h.ledger.withdraw(a, usd(50), T0), Err(LedgerError::Paused));
    assert!(h.ledger.system_state(T0).paused);

    h.ledger.unpause(&h.owner).unwrap();
    h.ledger.register(stranger, Some(a), T0).unwrap();

    h.ledger
        .set_preset(&h.owner, unilevel_types::AllocationPreset::Permanent)
        .unwrap();
    let week = deposit(&h, &[(a, usd(1_000))], T0);
    let epoch = h.ledger.epoch(week).unwrap();
    assert_eq!(epoch.allocation.mlm_distributed, usd(300));
    assert_eq!(epoch.allocation.mlm_locked, usd(150));

    assert!(h.ledger.update_batch_size(&h.owner, 0).is_err());
    assert!(h.ledger.update_solvency_thresholds(&h.owner, 16_000, 15_000).is_err());
    assert!(h.ledger.update_timelock_delay(&h.owner, 30 * DAY_SECS).is_err());
    h.ledger.update_sponsor_bonus(&h.owner, 1_000).unwrap();

    let mut table = unilevel_types::AllocationTable::BETA;
    table.company_bps += 5_000;
    assert!(h
        .ledger
        .update_bucket_table(&h.owner, unilevel_types::AllocationPreset::Beta, table)
        .is_err());

    assert!(matches!(
        h.ledger.withdraw(a, usd(20), T0),
        Err(LedgerError::BelowMinimumWithdrawal { .. })
    ));
    let limits = unilevel_treasury::config::WithdrawalConfig {
        min_withdrawal: usd(10),
        ..Default::default()
    };
    h.ledger.update_withdrawal_limits(&h.owner, limits).unwrap();
    assert_eq!(
        h.ledger.withdraw(a, usd(20), T0),
        Err(LedgerError::InsufficientBalance {
            available: 0,
            requested: usd(20)
        })
    );

    h.ledger
        .update_monthly_volume(&h.owner, a, usd(5_000), T0)
        .unwrap();
    assert!(matches!(
        h.ledger.update_monthly_volume(&stranger, a, 0, T0),
        Err(LedgerError::NotAuthorized { .. })
    ));

    let events = h.ledger.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, LedgerEvent::PauseChanged { paused: true })));
    assert!(events
        .iter()
        .any(|e| matches!(e, LedgerEvent::ParameterUpdated { name, .. } if name == "sponsor_bonus_bps")));
    println!("✓ Pause gates user flows, admin changes are role-gated and logged");
}

#[test]
fn test_full_depth_cap_requires_directs_and_volume() {
    println!("\n=== TEST 14: Full Depth Cap ===");
    let h = harness();
    let leader = join(&h, "leader", None, T0);
    for i in 0..5 {
        join(&h, &format!("direct-{i}"), Some(leader), T0);
    }
    assert_eq!(h.ledger.account_dashboard(&leader, T0).unwrap().level_cap, 5);

    h.ledger
        .update_monthly_volume(&h.owner, leader, usd(5_000), T0)
        .unwrap();
    assert_eq!(h.ledger.account_dashboard(&leader, T0).unwrap().level_cap, 10);

    let events = h.ledger.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        LedgerEvent::LevelCapChanged { user, new_cap: 10, .. } if *user == leader
    )));
    println!("✓ Cap reaches 10 with five directs and $5,000 volume");
}

// =============================================================================
// TEST 15: READ VIEWS
// =============================================================================

#[test]
fn test_read_views_serialize() {
    println!("\n=== TEST 15: Read Views ===");
    let h = harness();
    let a = join(&h, "alice", None, T0);
    join(&h, "bob", Some(a), T0);

    let dashboard = h.ledger.account_dashboard(&a, T0).unwrap();
    let json = serde_json::to_value(&dashboard).unwrap();
    println!("  {json}");
    assert_eq!(json["user"], serde_json::json!(a.to_string()));
    assert_eq!(json["balance"]["available"], serde_json::json!(4_750_000u64));

    let state = h.ledger.system_state(T0);
    assert_eq!(state.total_users, 2);
    assert_eq!(state.active_users, 2);
    assert_eq!(state.current_week, 0);
    let json = serde_json::to_value(&state).unwrap();
    assert_eq!(json["preset"], serde_json::json!("beta"));

    let earners = h.ledger.top_earners(5);
    assert_eq!(earners.len(), 1);
    assert_eq!(earners[0].0, a);
    assert_eq!(
        h.ledger.account_dashboard(&AccountId::from_label("nobody"), T0),
        Err(LedgerError::NotRegistered(AccountId::from_label("nobody")))
    );
    println!("✓ Dashboards and system state render as JSON");
}

// =============================================================================
// TEST 16: EVENT BUFFER
// =============================================================================

#[test]
fn test_event_buffer_is_bounded() {
    println!("\n=== TEST 16: Bounded Event Buffer ===");
    let mut config = EngineConfig::default();
    config.events.max_buffered = 3;
    let h = harness_with(config);

    let users: Vec<_> = (0..5).map(|i| AccountId::from_label(&format!("u{i}"))).collect();
    for user in &users {
        h.ledger.register(*user, None, T0).unwrap();
    }
    let events = h.ledger.drain_events();
    println!("  kept {} events", events.len());
    let kept: Vec<_> = events
        .iter()
        .map(|e| match e {
            LedgerEvent::Registered { user, .. } => *user,
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(kept, users[2..].to_vec());
    assert!(h.ledger.drain_events().is_empty());
    println!("✓ Oldest events dropped once the buffer is full");
}
