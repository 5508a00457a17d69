//! License subscriptions and network depth caps.
//!
//! A paid license keeps an account eligible for commissions until
//! `active_until`. The cap decides how many levels below the account it may
//! receive from: 10 for active accounts with enough direct referrals and
//! monthly volume, 5 for any other active account, 0 when the license has
//! lapsed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};
use unilevel_types::{apply_bps, AccountId, Amount, Bps, Timestamp, BPS_DENOMINATOR};

use crate::account_ledger::BalanceLedger;
use crate::config::LicenseConfig;
use crate::errors::{LedgerError, Result};

pub const FULL_DEPTH_CAP: u8 = 10;
pub const BASIC_DEPTH_CAP: u8 = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseState {
    pub active_until: Timestamp,
    pub monthly_volume: Amount,
    /// Cap as of the last recompute
    pub level_cap: u8,
    pub months_purchased: u32,
}

/// Split of a license payment between the sponsor and the company bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseSettlement {
    pub paid: Amount,
    pub sponsor_bonus: Amount,
    pub company_share: Amount,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionLedger {
    config: LicenseConfig,
    licenses: HashMap<AccountId, LicenseState>,
}

impl SubscriptionLedger {
    pub fn new(config: LicenseConfig) -> Self {
        Self {
            config,
            licenses: HashMap::new(),
        }
    }

    pub fn config(&self) -> &LicenseConfig {
        &self.config
    }

    pub fn set_sponsor_bonus_bps(&mut self, bps: Bps) -> Result<()> {
        if bps as u128 > BPS_DENOMINATOR {
            return Err(LedgerError::InvalidParameter(format!(
                "sponsor bonus {bps} bps exceeds 10000"
            )));
        }
        self.config.sponsor_bonus_bps = bps;
        Ok(())
    }

    /// Price of a `months`-long license after the configured discount.
    pub fn license_cost(&self, months: u32) -> Result<Amount> {
        let discount = self
            .config
            .discounts
            .iter()
            .find(|(m, _)| *m == months)
            .map(|(_, bps)| *bps)
            .ok_or_else(|| {
                LedgerError::InvalidParameter(format!("no license term of {months} months"))
            })?;

        let gross = self
            .config
            .monthly_fee
            .checked_mul(months as Amount)
            .ok_or(LedgerError::ArithmeticOverflow("license cost"))?;
        apply_bps(gross, (BPS_DENOMINATOR as Bps) - discount)
            .ok_or(LedgerError::ArithmeticOverflow("license discount"))
    }

    pub fn sponsor_bonus(&self, paid: Amount) -> Result<Amount> {
        apply_bps(paid, self.config.sponsor_bonus_bps)
            .ok_or(LedgerError::ArithmeticOverflow("sponsor bonus"))
    }

    /// Start or renew a license. Renewal restarts from `now`.
    pub fn activate(&mut self, user: AccountId, months: u32, now: Timestamp) -> Result<Timestamp> {
        let span = (months as u64)
            .checked_mul(self.config.duration_secs)
            .ok_or(LedgerError::ArithmeticOverflow("license duration"))?;
        let active_until = now
            .checked_add(span)
            .ok_or(LedgerError::ArithmeticOverflow("license expiry"))?;

        let state = self.licenses.entry(user).or_default();
        state.active_until = active_until;
        state.months_purchased = state.months_purchased.saturating_add(months);

        info!(
            target: "treasury",
            user = %user,
            months,
            active_until,
            "License activated"
        );
        Ok(active_until)
    }

    /// Pay the sponsor bonus out of `paid` and return what is left for the
    /// company bucket.
    pub fn settle_payment(
        &self,
        sponsor: Option<&AccountId>,
        paid: Amount,
        balances: &mut dyn BalanceLedger,
    ) -> Result<LicenseSettlement> {
        let sponsor_bonus = match sponsor {
            Some(sponsor) => {
                let bonus = self.sponsor_bonus(paid)?;
                if bonus > 0 {
                    balances.credit_available(sponsor, bonus)?;
                }
                bonus
            }
            None => 0,
        };
        Ok(LicenseSettlement {
            paid,
            sponsor_bonus,
            company_share: paid - sponsor_bonus,
        })
    }

    pub fn is_active(&self, user: &AccountId, now: Timestamp) -> bool {
        self.licenses
            .get(user)
            .map(|l| l.active_until > now)
            .unwrap_or(false)
    }

    pub fn license(&self, user: &AccountId) -> Option<&LicenseState> {
        self.licenses.get(user)
    }

    pub fn set_monthly_volume(&mut self, user: AccountId, volume: Amount) {
        self.licenses.entry(user).or_default().monthly_volume = volume;
        debug!(target: "treasury", user = %user, volume, "Monthly volume updated");
    }

    /// Effective cap at `now` without touching stored state.
    pub fn level_cap_at(&self, user: &AccountId, direct_referrals: u32, now: Timestamp) -> u8 {
        let Some(state) = self.licenses.get(user) else {
            return 0;
        };
        if state.active_until <= now {
            0
        } else if direct_referrals >= self.config.min_directs_for_full_depth
            && state.monthly_volume >= self.config.volume_threshold
        {
            FULL_DEPTH_CAP
        } else {
            BASIC_DEPTH_CAP
        }
    }

    /// Cap as of the last recompute.
    pub fn stored_level_cap(&self, user: &AccountId) -> u8 {
        self.licenses.get(user).map_or(0, |l| l.level_cap)
    }

    /// Recompute and store the cap. Returns `(old, new)`.
    pub fn recompute_level_cap(
        &mut self,
        user: &AccountId,
        direct_referrals: u32,
        now: Timestamp,
    ) -> (u8, u8) {
        let new_cap = self.level_cap_at(user, direct_referrals, now);
        let state = self.licenses.entry(*user).or_default();
        let old_cap = state.level_cap;
        state.level_cap = new_cap;
        (old_cap, new_cap)
    }

    pub fn active_count(&self, now: Timestamp) -> usize {
        self.licenses.values().filter(|l| l.active_until > now).count()
    }
}
