//! Payout limits over rolling windows: per account for user withdrawals,
//! system-wide for treasury bucket payouts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use unilevel_types::{AccountId, Amount, Timestamp};

use crate::config::{TreasuryConfig, WithdrawalConfig};
use crate::errors::{LedgerError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowUsage {
    pub window_start: Timestamp,
    pub used: Amount,
}

impl WindowUsage {
    /// `entry` as it applies at `now`; an expired window reads as empty.
    fn current(entry: Option<&WindowUsage>, window_secs: Timestamp, now: Timestamp) -> Self {
        match entry {
            Some(u) if now < u.window_start.saturating_add(window_secs) => *u,
            _ => WindowUsage {
                window_start: now,
                used: 0,
            },
        }
    }

    fn plus(self, amount: Amount) -> Self {
        WindowUsage {
            used: self.used.saturating_add(amount),
            ..self
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalLimiter {
    config: WithdrawalConfig,
    usage: HashMap<AccountId, WindowUsage>,
}

impl WithdrawalLimiter {
    pub fn new(config: WithdrawalConfig) -> Self {
        Self {
            config,
            usage: HashMap::new(),
        }
    }

    pub fn config(&self) -> &WithdrawalConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: WithdrawalConfig) -> Result<()> {
        if config.max_per_tx < config.min_withdrawal
            || config.max_per_window < config.max_per_tx
            || config.window_secs == 0
        {
            return Err(LedgerError::InvalidParameter(
                "withdrawal limits must satisfy min <= per_tx <= per_window".into(),
            ));
        }
        self.config = config;
        Ok(())
    }

    pub fn usage_at(&self, user: &AccountId, now: Timestamp) -> WindowUsage {
        WindowUsage::current(self.usage.get(user), self.config.window_secs, now)
    }

    pub fn check(&self, user: &AccountId, amount: Amount, now: Timestamp) -> Result<()> {
        if amount < self.config.min_withdrawal {
            return Err(LedgerError::BelowMinimumWithdrawal {
                minimum: self.config.min_withdrawal,
                requested: amount,
            });
        }
        if amount > self.config.max_per_tx {
            return Err(LedgerError::WithdrawalLimitExceeded {
                remaining: self.config.max_per_tx,
                requested: amount,
            });
        }
        let usage = self.usage_at(user, now);
        let remaining = self.config.max_per_window.saturating_sub(usage.used);
        if amount > remaining {
            return Err(LedgerError::WithdrawalLimitExceeded {
                remaining,
                requested: amount,
            });
        }
        Ok(())
    }

    /// Record a withdrawal. Returns the previous entry for [`Self::restore`].
    pub fn record(
        &mut self,
        user: AccountId,
        amount: Amount,
        now: Timestamp,
    ) -> Option<WindowUsage> {
        let next = self.usage_at(&user, now).plus(amount);
        self.usage.insert(user, next)
    }

    pub fn restore(&mut self, user: AccountId, previous: Option<WindowUsage>) {
        match previous {
            Some(prev) => {
                self.usage.insert(user, prev);
            }
            None => {
                self.usage.remove(&user);
            }
        }
    }
}

/// System-wide cap on bucket payouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreasuryPayoutLimiter {
    config: TreasuryConfig,
    usage: Option<WindowUsage>,
}

impl TreasuryPayoutLimiter {
    pub fn new(config: TreasuryConfig) -> Self {
        Self {
            config,
            usage: None,
        }
    }

    pub fn config(&self) -> &TreasuryConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: TreasuryConfig) -> Result<()> {
        if config.window_secs == 0 {
            return Err(LedgerError::InvalidParameter(
                "treasury payout window must be positive".into(),
            ));
        }
        self.config = config;
        Ok(())
    }

    pub fn usage_at(&self, now: Timestamp) -> WindowUsage {
        WindowUsage::current(self.usage.as_ref(), self.config.window_secs, now)
    }

    pub fn check(&self, amount: Amount, now: Timestamp) -> Result<()> {
        let remaining = self
            .config
            .max_payout_per_window
            .saturating_sub(self.usage_at(now).used);
        if amount > remaining {
            return Err(LedgerError::TreasuryLimitExceeded {
                remaining,
                requested: amount,
            });
        }
        Ok(())
    }

    /// Record a payout. Returns the previous entry for [`Self::restore`].
    pub fn record(&mut self, amount: Amount, now: Timestamp) -> Option<WindowUsage> {
        let next = self.usage_at(now).plus(amount);
        self.usage.replace(next)
    }

    pub fn restore(&mut self, previous: Option<WindowUsage>) {
        self.usage = previous;
    }
}
