//! Solvency monitor and circuit breaker.
//!
//! Ratio = assets held by the system account / internal liabilities, in bps.
//! The breaker trips below `activation_bps` and only resets once the ratio
//! recovers to `recovery_bps`; the gap between the two prevents flapping.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use unilevel_types::{ratio_bps, Amount, Timestamp};

use crate::config::SolvencyConfig;
use crate::errors::{LedgerError, Result};

/// Change produced by a breaker evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerTransition {
    pub active: bool,
    pub ratio_bps: u64,
    pub manual: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolvencyMonitor {
    activation_bps: u64,
    recovery_bps: u64,
    active: bool,
    last_ratio_bps: Option<u64>,
    last_checked_at: Option<Timestamp>,
}

impl SolvencyMonitor {
    pub fn new(config: &SolvencyConfig) -> Result<Self> {
        let mut monitor = Self {
            activation_bps: 0,
            recovery_bps: 0,
            active: false,
            last_ratio_bps: None,
            last_checked_at: None,
        };
        monitor.set_thresholds(config.activation_bps, config.recovery_bps)?;
        Ok(monitor)
    }

    pub fn set_thresholds(&mut self, activation_bps: u64, recovery_bps: u64) -> Result<()> {
        if recovery_bps < activation_bps {
            return Err(LedgerError::InvalidParameter(format!(
                "recovery threshold {recovery_bps} below activation threshold {activation_bps}"
            )));
        }
        self.activation_bps = activation_bps;
        self.recovery_bps = recovery_bps;
        Ok(())
    }

    pub fn ratio_bps(assets: Amount, liabilities: Amount) -> u64 {
        ratio_bps(assets, liabilities)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn activation_bps(&self) -> u64 {
        self.activation_bps
    }

    pub fn recovery_bps(&self) -> u64 {
        self.recovery_bps
    }

    pub fn last_ratio_bps(&self) -> Option<u64> {
        self.last_ratio_bps
    }

    pub fn last_checked_at(&self) -> Option<Timestamp> {
        self.last_checked_at
    }

    /// Evaluate the breaker against current assets and liabilities.
    pub fn check_and_update(
        &mut self,
        assets: Amount,
        liabilities: Amount,
        now: Timestamp,
    ) -> Option<BreakerTransition> {
        let ratio = Self::ratio_bps(assets, liabilities);
        self.last_ratio_bps = Some(ratio);
        self.last_checked_at = Some(now);

        let flip_to = if !self.active && ratio < self.activation_bps {
            true
        } else if self.active && ratio >= self.recovery_bps {
            false
        } else {
            return None;
        };

        self.active = flip_to;
        if flip_to {
            warn!(
                target: "treasury",
                ratio_bps = ratio,
                threshold_bps = self.activation_bps,
                "Circuit breaker activated"
            );
        } else {
            info!(
                target: "treasury",
                ratio_bps = ratio,
                threshold_bps = self.recovery_bps,
                "Circuit breaker recovered"
            );
        }
        Some(BreakerTransition {
            active: flip_to,
            ratio_bps: ratio,
            manual: false,
        })
    }

    /// Manual override; holds until the next automatic evaluation.
    pub fn force_set(&mut self, active: bool) -> Option<BreakerTransition> {
        if self.active == active {
            return None;
        }
        self.active = active;
        warn!(target: "treasury", active, "Circuit breaker forced");
        Some(BreakerTransition {
            active,
            ratio_bps: self.last_ratio_bps.unwrap_or(u64::MAX),
            manual: true,
        })
    }

    pub fn ensure_withdrawals_allowed(&self) -> Result<()> {
        if self.active {
            return Err(LedgerError::CircuitBreakerActive);
        }
        Ok(())
    }

    /// Reject a spend that would leave the ratio below the activation floor.
    pub fn ensure_spend_keeps_solvency(
        &self,
        assets: Amount,
        liabilities: Amount,
        spend: Amount,
    ) -> Result<()> {
        let after = Self::ratio_bps(assets.saturating_sub(spend), liabilities);
        if after < self.activation_bps {
            return Err(LedgerError::SolvencyBreach {
                ratio_bps: after,
                threshold_bps: self.activation_bps,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> SolvencyMonitor {
        SolvencyMonitor::new(&SolvencyConfig::default()).unwrap()
    }

    #[test]
    fn hysteresis() {
        let mut m = monitor();
        let liabilities = 1_000;

        let t = m.check_and_update(1_150, liabilities, 1).unwrap();
        assert!(t.active);
        assert_eq!(t.ratio_bps, 11_500);

        assert!(m.check_and_update(1_250, liabilities, 2).is_none());
        assert!(m.check_and_update(1_450, liabilities, 3).is_none());
        assert!(m.is_active());

        let t = m.check_and_update(1_550, liabilities, 4).unwrap();
        assert!(!t.active);
        assert!(m.ensure_withdrawals_allowed().is_ok());
    }

    #[test]
    fn boundaries() {
        let mut m = monitor();
        assert!(m.check_and_update(1_200, 1_000, 0).is_none());
        assert!(m.check_and_update(1_199, 1_000, 0).is_some());
        assert!(m.check_and_update(1_499, 1_000, 0).is_none());
        assert!(m.check_and_update(1_500, 1_000, 0).is_some());
    }

    #[test]
    fn no_liabilities_is_solvent() {
        let mut m = monitor();
        assert!(m.check_and_update(0, 0, 0).is_none());
        assert_eq!(m.last_ratio_bps(), Some(u64::MAX));
    }

    #[test]
    fn manual_override_until_next_check() {
        let mut m = monitor();
        assert!(m.force_set(true).unwrap().manual);
        assert_eq!(m.ensure_withdrawals_allowed(), Err(LedgerError::CircuitBreakerActive));
        assert!(m.force_set(true).is_none());

        let t = m.check_and_update(2_000, 1_000, 5).unwrap();
        assert!(!t.active && !t.manual);
    }

    #[test]
    fn spend_guard() {
        let m = monitor();
        assert!(m.ensure_spend_keeps_solvency(1_500, 1_000, 300).is_ok());
        assert_eq!(
            m.ensure_spend_keeps_solvency(1_500, 1_000, 301),
            Err(LedgerError::SolvencyBreach {
                ratio_bps: 11_990,
                threshold_bps: 12_000
            })
        );
    }

    #[test]
    fn inverted_thresholds_rejected() {
        let mut m = monitor();
        assert!(m.set_thresholds(15_000, 12_000).is_err());
        assert_eq!(m.activation_bps(), 12_000);
    }
}
