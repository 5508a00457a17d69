//! Unilevel Ledger Simulator
//!
//! Builds a random sponsor tree, licenses every member, runs weekly
//! performance deposits through the commission ledger and prints a JSON
//! summary of where the money went.

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use unilevel_treasury::{
    CommissionLedger, EngineConfig, InMemoryValueTransfer, LedgerError, RoleRegistry,
};
use unilevel_types::{
    format_usd, usd, AccountId, Amount, LedgerEvent, PoolBucket, Timestamp, WEEK_SECS,
};

/// Simulation start, 2024-01-01T00:00:00Z
const GENESIS: Timestamp = 1_704_067_200;

#[derive(Parser, Debug)]
#[command(name = "unilevel-sim")]
#[command(about = "Simulate weekly commission distribution over a random sponsor tree")]
#[command(version)]
struct Cli {
    /// Engine configuration file (TOML); defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of members in the tree
    #[arg(short, long, default_value = "1000")]
    users: usize,

    /// Maximum direct referrals per sponsor
    #[arg(long, default_value = "20")]
    max_directs: usize,

    /// Weeks to simulate
    #[arg(short, long, default_value = "4")]
    weeks: u64,

    /// Weekly performance fees in whole USD, spread over the members
    #[arg(short, long, default_value = "100000")]
    deposit: u64,

    /// RNG seed for the tree shape and volumes
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Default, Serialize)]
struct LevelTotals {
    credits: u64,
    credited: String,
    locked_credits: u64,
    locked: String,
    #[serde(skip)]
    credited_raw: Amount,
    #[serde(skip)]
    locked_raw: Amount,
}

#[derive(Debug, Serialize)]
struct Earner {
    account: String,
    total_earned: String,
    available: String,
    locked: String,
}

#[derive(Debug, Serialize)]
struct Summary {
    users: usize,
    weeks: u64,
    seed: u64,
    preset: String,
    total_deposited: String,
    license_fees: String,
    sponsor_bonuses: String,
    commissions_credited: String,
    commissions_locked: String,
    skipped_credits: usize,
    per_level: BTreeMap<u8, LevelTotals>,
    dust_in_mlm_bucket: String,
    buckets: BTreeMap<String, String>,
    liabilities: String,
    system_assets: String,
    solvency_ratio_bps: u64,
    circuit_breaker_active: bool,
    top_earners: Vec<Earner>,
}

#[derive(Debug, Default)]
struct Tally {
    deposited: Amount,
    license_fees: Amount,
    sponsor_bonuses: Amount,
    credited: Amount,
    locked: Amount,
    skipped: usize,
    per_level: BTreeMap<u8, LevelTotals>,
}

impl Tally {
    fn absorb(&mut self, events: Vec<LedgerEvent>) {
        for event in events {
            match event {
                LedgerEvent::LicenseActivated { fee_paid, .. } => {
                    self.license_fees += fee_paid;
                }
                LedgerEvent::SponsorBonusPaid { amount, .. } => {
                    self.sponsor_bonuses += amount;
                }
                LedgerEvent::CommissionCredited { level, amount, .. } => {
                    self.credited += amount;
                    let totals = self.per_level.entry(level).or_default();
                    totals.credits += 1;
                    totals.credited_raw += amount;
                }
                LedgerEvent::CommissionLocked { level, amount, .. } => {
                    self.locked += amount;
                    let totals = self.per_level.entry(level).or_default();
                    totals.locked_credits += 1;
                    totals.locked_raw += amount;
                }
                LedgerEvent::UserCreditSkipped { .. } => self.skipped += 1,
                _ => {}
            }
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if cli.users == 0 || cli.max_directs == 0 {
        anyhow::bail!("--users and --max-directs must be positive");
    }

    let summary = run(&cli, &config)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("Failed to render summary")?
    );
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(cli: &Cli, config: &EngineConfig) -> Result<Summary> {
    let mut rng = StdRng::seed_from_u64(cli.seed);
    let rail = Arc::new(InMemoryValueTransfer::new());
    let operator = AccountId::from_label("sim-operator");
    let system = AccountId::from_label("sim-system");

    let weekly_deposit = usd(cli.deposit);
    rail.mint(operator, weekly_deposit * cli.weeks as Amount);

    let ledger = CommissionLedger::new(
        config,
        system,
        rail.clone(),
        Arc::new(RoleRegistry::with_owner(operator)),
    )
    .context("Failed to build commission ledger")?;

    let fee_budget = config
        .license
        .monthly_fee
        .saturating_mul(cli.weeks as Amount / 4 + 2);
    let members = build_tree(&ledger, &rail, &operator, fee_budget, &mut rng, cli)?;
    info!(users = members.len(), "Sponsor tree built");

    let mut tally = Tally::default();
    for week in 0..cli.weeks {
        let now = GENESIS + week * WEEK_SECS;
        renew_lapsed(&ledger, &members, now)?;
        tally.absorb(ledger.drain_events());

        let report = format!("sim-{}-week-{week}", cli.seed).into_bytes();
        let payers = weekly_payers(&members, weekly_deposit, &mut rng);
        let paid: Amount = payers.iter().map(|(_, fee)| fee).sum();
        let week_number = ledger
            .deposit_weekly_performance(&operator, payers, report, now)
            .context("Weekly deposit rejected")?;
        tally.deposited += paid;

        loop {
            match ledger.process_distribution_batch(week_number, now) {
                Ok(outcome) if outcome.completed => break,
                Ok(_) => continue,
                Err(LedgerError::NoWorkPending(_)) => break,
                Err(err) => return Err(err).context("Batch processing failed"),
            }
        }
        if let Some(transition) = ledger.check_and_update_circuit_breaker(now) {
            warn!(
                week = week_number,
                active = transition.active,
                ratio_bps = transition.ratio_bps,
                "Circuit breaker toggled"
            );
        }
        tally.absorb(ledger.drain_events());
        info!(week = week_number, credited = %format_usd(tally.credited), "Week settled");
    }

    let end = GENESIS + cli.weeks * WEEK_SECS;
    Ok(summarize(cli, &ledger, tally, end))
}

/// Attach each new member to a random earlier member with free direct slots.
fn build_tree(
    ledger: &CommissionLedger,
    rail: &InMemoryValueTransfer,
    operator: &AccountId,
    fee_budget: Amount,
    rng: &mut StdRng,
    cli: &Cli,
) -> Result<Vec<AccountId>> {
    let mut members: Vec<AccountId> = Vec::with_capacity(cli.users);
    let mut directs: Vec<usize> = Vec::with_capacity(cli.users);
    let mut open: Vec<usize> = Vec::new();

    for i in 0..cli.users {
        let user = AccountId::from_label(&format!("sim-user-{}-{i}", cli.seed));
        let sponsor = if open.is_empty() {
            None
        } else {
            let slot = rng.gen_range(0..open.len());
            let idx = open[slot];
            directs[idx] += 1;
            if directs[idx] >= cli.max_directs {
                open.swap_remove(slot);
            }
            Some(members[idx])
        };

        // enough for a renewal every month plus one spare
        rail.mint(user, fee_budget);
        ledger
            .register(user, sponsor, GENESIS)
            .with_context(|| format!("Failed to register member {i}"))?;
        members.push(user);
        directs.push(0);
        open.push(i);
    }

    for user in &members {
        ledger
            .activate_license(*user, 1, GENESIS)
            .with_context(|| format!("Failed to license {user}"))?;
        // a quarter of the network reports enough volume for full depth
        if rng.gen_bool(0.25) {
            let volume = usd(rng.gen_range(5_000..50_000));
            ledger.update_monthly_volume(operator, *user, volume, GENESIS)?;
        }
    }
    Ok(members)
}

/// Split `budget` over the members by random weight. Members whose share
/// rounds to zero report no fee that week.
fn weekly_payers(
    members: &[AccountId],
    budget: Amount,
    rng: &mut StdRng,
) -> Vec<(AccountId, Amount)> {
    let weights: Vec<Amount> = members.iter().map(|_| rng.gen_range(1..=100)).collect();
    let total: Amount = weights.iter().sum();
    members
        .iter()
        .zip(weights)
        .filter_map(|(member, weight)| {
            let fee = budget * weight / total;
            (fee > 0).then_some((*member, fee))
        })
        .collect()
}

fn renew_lapsed(ledger: &CommissionLedger, members: &[AccountId], now: Timestamp) -> Result<()> {
    let mut renewed = 0usize;
    for user in members {
        let dashboard = ledger.account_dashboard(user, now)?;
        if !dashboard.license_active {
            ledger.activate_license(*user, 1, now)?;
            renewed += 1;
        }
    }
    if renewed > 0 {
        info!(renewed, "Licenses renewed");
    }
    Ok(())
}

fn summarize(cli: &Cli, ledger: &CommissionLedger, mut tally: Tally, now: Timestamp) -> Summary {
    let state = ledger.system_state(now);
    for totals in tally.per_level.values_mut() {
        totals.credited = format_usd(totals.credited_raw);
        totals.locked = format_usd(totals.locked_raw);
    }

    let buckets = PoolBucket::ALL
        .iter()
        .map(|bucket| (bucket.to_string(), format_usd(state.buckets.get(*bucket))))
        .collect();
    let top_earners = ledger
        .top_earners(10)
        .into_iter()
        .map(|(account, balance)| Earner {
            account: account.to_string(),
            total_earned: format_usd(balance.total_earned),
            available: format_usd(balance.available),
            locked: format_usd(balance.locked),
        })
        .collect();

    Summary {
        users: cli.users,
        weeks: cli.weeks,
        seed: cli.seed,
        preset: state.preset.to_string(),
        total_deposited: format_usd(tally.deposited),
        license_fees: format_usd(tally.license_fees),
        sponsor_bonuses: format_usd(tally.sponsor_bonuses),
        commissions_credited: format_usd(tally.credited),
        commissions_locked: format_usd(tally.locked),
        skipped_credits: tally.skipped,
        per_level: tally.per_level,
        dust_in_mlm_bucket: format_usd(state.buckets.mlm_distributed),
        buckets,
        liabilities: format_usd(state.total_available + state.total_locked),
        system_assets: format_usd(state.system_assets),
        solvency_ratio_bps: state.solvency_ratio_bps,
        circuit_breaker_active: state.circuit_breaker_active,
        top_earners,
    }
}
