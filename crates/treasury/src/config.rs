//! Engine configuration.
//!
//! Defaults mirror the production deployment: $19 license for 30 days, 25%
//! sponsor bonus, Beta preset active, 2-day timelock, breaker at 120% with
//! recovery at 150%.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;
use unilevel_types::{
    usd, AllocationPreset, Amount, Bps, PresetTables, Timestamp, BPS_DENOMINATOR, DAY_SECS,
    WEEK_SECS,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// Preset in force at startup
    pub preset: AllocationPreset,
    pub beta: PresetTables,
    pub permanent: PresetTables,
    /// Share of the liquidity allocation carved into the emergency reserve
    pub emergency_reserve_bps: Bps,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            preset: AllocationPreset::Beta,
            beta: PresetTables::BETA,
            permanent: PresetTables::PERMANENT,
            emergency_reserve_bps: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommissionConfig {
    /// Park commissions for inactive ancestors in their locked balance
    pub lock_inactive_earnings: bool,
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            lock_inactive_earnings: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Monthly license price
    pub monthly_fee: Amount,
    /// Seconds of access bought per month
    pub duration_secs: Timestamp,
    /// Share of the paid fee credited to the direct sponsor
    pub sponsor_bonus_bps: Bps,
    /// Monthly volume needed for the full 10-level cap
    pub volume_threshold: Amount,
    /// Direct referrals needed for the full 10-level cap
    pub min_directs_for_full_depth: u32,
    /// Multi-month discounts as (months, discount bps)
    pub discounts: Vec<(u32, Bps)>,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            monthly_fee: usd(19),
            duration_secs: 30 * DAY_SECS,
            sponsor_bonus_bps: 2500,
            volume_threshold: usd(5000),
            min_directs_for_full_depth: 5,
            discounts: vec![(1, 0), (3, 500), (6, 1000), (12, 1500)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Users processed per `process_distribution_batch` call
    pub batch_size: u32,
    /// Seconds without progress before an unfinished epoch counts as stalled
    pub stall_threshold_secs: Timestamp,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            stall_threshold_secs: DAY_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelockConfig {
    pub delay_secs: Timestamp,
}

impl Default for TimelockConfig {
    fn default() -> Self {
        Self {
            delay_secs: 2 * DAY_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolvencyConfig {
    /// Breaker trips below this ratio
    pub activation_bps: u64,
    /// Breaker resets at or above this ratio
    pub recovery_bps: u64,
}

impl Default for SolvencyConfig {
    fn default() -> Self {
        Self {
            activation_bps: 12_000,
            recovery_bps: 15_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WithdrawalConfig {
    pub min_withdrawal: Amount,
    pub max_per_tx: Amount,
    pub max_per_window: Amount,
    pub window_secs: Timestamp,
}

impl Default for WithdrawalConfig {
    fn default() -> Self {
        Self {
            min_withdrawal: usd(50),
            max_per_tx: usd(10_000),
            max_per_window: usd(30_000),
            window_secs: 30 * DAY_SECS,
        }
    }
}

/// Rolling cap on bucket payouts through timelocked withdrawals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreasuryConfig {
    pub max_payout_per_window: Amount,
    pub window_secs: Timestamp,
}

impl Default for TreasuryConfig {
    fn default() -> Self {
        Self {
            max_payout_per_window: usd(50_000),
            window_secs: DAY_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Undrained events kept before the oldest are dropped
    pub max_buffered: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            max_buffered: 10_000,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub allocation: AllocationConfig,
    pub commission: CommissionConfig,
    pub license: LicenseConfig,
    pub batch: BatchConfig,
    pub timelock: TimelockConfig,
    pub solvency: SolvencyConfig,
    pub withdrawal: WithdrawalConfig,
    pub treasury: TreasuryConfig,
    pub events: EventConfig,
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(content).context("Failed to parse engine config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(target: "treasury", "Loading engine configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.allocation
            .beta
            .validate()
            .map_err(|e| anyhow!("beta preset: {e}"))?;
        self.allocation
            .permanent
            .validate()
            .map_err(|e| anyhow!("permanent preset: {e}"))?;
        if self.allocation.emergency_reserve_bps as u128 > BPS_DENOMINATOR {
            return Err(anyhow!("emergency_reserve_bps cannot exceed 10000"));
        }

        let license = &self.license;
        if license.monthly_fee == 0 {
            return Err(anyhow!("license monthly_fee must be positive"));
        }
        if license.duration_secs < DAY_SECS {
            return Err(anyhow!("license duration must be at least one day"));
        }
        if license.sponsor_bonus_bps as u128 > BPS_DENOMINATOR {
            return Err(anyhow!("sponsor_bonus_bps cannot exceed 10000"));
        }
        if license.discounts.is_empty() {
            return Err(anyhow!("at least one license term must be configured"));
        }
        for (months, discount) in &license.discounts {
            if *months == 0 || *discount as u128 >= BPS_DENOMINATOR {
                return Err(anyhow!("invalid license term ({months} months, {discount} bps)"));
            }
        }

        if self.batch.batch_size == 0 {
            return Err(anyhow!("batch_size must be positive"));
        }
        if self.timelock.delay_secs > 4 * WEEK_SECS {
            return Err(anyhow!("timelock delay cannot exceed four weeks"));
        }
        if self.solvency.recovery_bps < self.solvency.activation_bps {
            return Err(anyhow!(
                "recovery threshold {} below activation threshold {}",
                self.solvency.recovery_bps,
                self.solvency.activation_bps
            ));
        }

        let w = &self.withdrawal;
        if w.max_per_tx < w.min_withdrawal || w.max_per_window < w.max_per_tx {
            return Err(anyhow!("withdrawal limits must satisfy min <= per_tx <= per_window"));
        }
        if w.window_secs == 0 {
            return Err(anyhow!("withdrawal window must be positive"));
        }
        if self.treasury.window_secs == 0 {
            return Err(anyhow!("treasury payout window must be positive"));
        }
        if self.events.max_buffered == 0 {
            return Err(anyhow!("event buffer must hold at least one event"));
        }
        Ok(())
    }
}
