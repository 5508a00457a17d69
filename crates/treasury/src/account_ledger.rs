//! Balance ledger for commission earnings
//!
//! Tracks the internal, withdrawable (`available`) and parked (`locked`)
//! balances owed to each account. Every balance here is a liability of the
//! system account on the value-transfer rail.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use unilevel_types::{AccountId, Amount};

use crate::errors::{LedgerError, Result};

/// Per-account balance record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub available: Amount,
    pub locked: Amount,
    /// Lifetime credits (available and locked)
    pub total_earned: Amount,
    /// Paid out over the rail; balance spent inside the ledger is not counted
    pub total_withdrawn: Amount,
}

/// Why available funds leave an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebitKind {
    /// Paid out to the account holder
    Withdrawal,
    /// Spent inside the ledger, e.g. on a license
    Purchase,
}

/// Interface for balance ledger operations.
pub trait BalanceLedger: Send + Sync {
    /// Credit withdrawable funds.
    fn credit_available(&mut self, account: &AccountId, amount: Amount) -> Result<()>;

    /// Park funds that become withdrawable only after a later release.
    fn credit_locked(&mut self, account: &AccountId, amount: Amount) -> Result<()>;

    /// Remove withdrawable funds. Only [`DebitKind::Withdrawal`] counts
    /// towards `total_withdrawn`.
    fn debit_available(
        &mut self,
        account: &AccountId,
        amount: Amount,
        kind: DebitKind,
    ) -> Result<()>;

    /// Move available funds between accounts. Neither lifetime total changes.
    fn move_available(&mut self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<()>;

    /// Move everything locked into available. Returns the amount moved.
    fn release_locked(&mut self, account: &AccountId) -> Result<Amount>;

    /// Undo an earlier credit of `amount`, including its lifetime earnings.
    fn revert_credit(&mut self, account: &AccountId, amount: Amount, locked: bool) -> Result<()>;

    /// Undo an earlier `debit_available`, e.g. after a failed payout.
    fn revert_debit(&mut self, account: &AccountId, amount: Amount, kind: DebitKind) -> Result<()>;

    fn balance_of(&self, account: &AccountId) -> AccountBalance;

    /// Sum of available and locked across all accounts.
    fn total_liabilities(&self) -> Amount;
}

// -----------------------------------------------------------------------------
// In-memory implementation
// -----------------------------------------------------------------------------
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryBalanceLedger {
    balances: HashMap<AccountId, AccountBalance>,
    total_available: Amount,
    total_locked: Amount,
}

impl InMemoryBalanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_available(&self) -> Amount {
        self.total_available
    }

    pub fn total_locked(&self) -> Amount {
        self.total_locked
    }

    /// Accounts ordered by lifetime earnings, highest first.
    pub fn top_earners(&self, limit: usize) -> Vec<(AccountId, AccountBalance)> {
        let mut all: Vec<_> = self.balances.iter().map(|(k, v)| (*k, *v)).collect();
        all.sort_by(|a, b| b.1.total_earned.cmp(&a.1.total_earned).then(a.0.cmp(&b.0)));
        all.truncate(limit);
        all
    }
}

impl BalanceLedger for InMemoryBalanceLedger {
    fn credit_available(&mut self, account: &AccountId, amount: Amount) -> Result<()> {
        let current = self.balances.get(account).copied().unwrap_or_default();
        let next = AccountBalance {
            available: checked(current.available.checked_add(amount), "available balance")?,
            total_earned: checked(current.total_earned.checked_add(amount), "total earned")?,
            ..current
        };
        let total = checked(self.total_available.checked_add(amount), "total available")?;

        self.balances.insert(*account, next);
        self.total_available = total;
        Ok(())
    }

    fn credit_locked(&mut self, account: &AccountId, amount: Amount) -> Result<()> {
        let current = self.balances.get(account).copied().unwrap_or_default();
        let next = AccountBalance {
            locked: checked(current.locked.checked_add(amount), "locked balance")?,
            total_earned: checked(current.total_earned.checked_add(amount), "total earned")?,
            ..current
        };
        let total = checked(self.total_locked.checked_add(amount), "total locked")?;

        self.balances.insert(*account, next);
        self.total_locked = total;
        Ok(())
    }

    fn debit_available(
        &mut self,
        account: &AccountId,
        amount: Amount,
        kind: DebitKind,
    ) -> Result<()> {
        let current = self.balances.get(account).copied().unwrap_or_default();
        if current.available < amount {
            return Err(LedgerError::InsufficientBalance {
                available: current.available,
                requested: amount,
            });
        }
        let mut next = AccountBalance {
            available: current.available - amount,
            ..current
        };
        if kind == DebitKind::Withdrawal {
            next.total_withdrawn = current.total_withdrawn.saturating_add(amount);
        }
        self.balances.insert(*account, next);
        self.total_available -= amount;
        Ok(())
    }

    fn move_available(&mut self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<()> {
        let sender = self.balances.get(from).copied().unwrap_or_default();
        if sender.available < amount {
            return Err(LedgerError::InsufficientBalance {
                available: sender.available,
                requested: amount,
            });
        }
        if from == to {
            return Ok(());
        }
        let receiver = self.balances.get(to).copied().unwrap_or_default();
        let received = AccountBalance {
            available: checked(receiver.available.checked_add(amount), "available balance")?,
            ..receiver
        };

        self.balances.insert(
            *from,
            AccountBalance {
                available: sender.available - amount,
                ..sender
            },
        );
        self.balances.insert(*to, received);
        Ok(())
    }

    fn release_locked(&mut self, account: &AccountId) -> Result<Amount> {
        let Some(current) = self.balances.get(account).copied() else {
            return Ok(0);
        };
        if current.locked == 0 {
            return Ok(0);
        }
        let moved = current.locked;
        let next = AccountBalance {
            available: checked(current.available.checked_add(moved), "available balance")?,
            locked: 0,
            ..current
        };
        let total = checked(self.total_available.checked_add(moved), "total available")?;

        self.balances.insert(*account, next);
        self.total_available = total;
        self.total_locked -= moved;
        Ok(moved)
    }

    fn revert_credit(&mut self, account: &AccountId, amount: Amount, locked: bool) -> Result<()> {
        let current = self.balances.get(account).copied().unwrap_or_default();
        let held = if locked { current.locked } else { current.available };
        if held < amount || current.total_earned < amount {
            return Err(LedgerError::InsufficientBalance {
                available: held,
                requested: amount,
            });
        }
        let mut next = AccountBalance {
            total_earned: current.total_earned - amount,
            ..current
        };
        if locked {
            next.locked -= amount;
            self.total_locked -= amount;
        } else {
            next.available -= amount;
            self.total_available -= amount;
        }
        self.balances.insert(*account, next);
        Ok(())
    }

    fn revert_debit(&mut self, account: &AccountId, amount: Amount, kind: DebitKind) -> Result<()> {
        let current = self.balances.get(account).copied().unwrap_or_default();
        let mut next = AccountBalance {
            available: checked(current.available.checked_add(amount), "available balance")?,
            ..current
        };
        if kind == DebitKind::Withdrawal {
            next.total_withdrawn = current.total_withdrawn.saturating_sub(amount);
        }
        let total = checked(self.total_available.checked_add(amount), "total available")?;

        self.balances.insert(*account, next);
        self.total_available = total;
        Ok(())
    }

    fn balance_of(&self, account: &AccountId) -> AccountBalance {
        self.balances.get(account).copied().unwrap_or_default()
    }

    fn total_liabilities(&self) -> Amount {
        self.total_available.saturating_add(self.total_locked)
    }
}

fn checked(value: Option<Amount>, what: &'static str) -> Result<Amount> {
    value.ok_or(LedgerError::ArithmeticOverflow(what))
}

// -----------------------------------------------------------------------------
// Mock ledger (records calls for assertions)
// -----------------------------------------------------------------------------
#[derive(Debug, Clone, Default)]
pub struct MockBalanceLedger {
    inner: InMemoryBalanceLedger,
    credit_calls: Vec<(AccountId, Amount, bool)>,
    debit_calls: Vec<(AccountId, Amount, DebitKind)>,
    /// Accounts whose credits are rejected
    rejecting: Vec<AccountId>,
}

impl MockBalanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every credit to `account` fail with `ArithmeticOverflow`.
    pub fn reject_credits_for(&mut self, account: AccountId) {
        self.rejecting.push(account);
    }

    /// Recorded credits as `(account, amount, locked)`.
    pub fn credit_calls(&self) -> &[(AccountId, Amount, bool)] {
        &self.credit_calls
    }

    pub fn debit_calls(&self) -> &[(AccountId, Amount, DebitKind)] {
        &self.debit_calls
    }

    pub fn clear_calls(&mut self) {
        self.credit_calls.clear();
        self.debit_calls.clear();
    }
}

impl BalanceLedger for MockBalanceLedger {
    fn credit_available(&mut self, account: &AccountId, amount: Amount) -> Result<()> {
        if self.rejecting.contains(account) {
            return Err(LedgerError::ArithmeticOverflow("mock rejection"));
        }
        self.credit_calls.push((*account, amount, false));
        self.inner.credit_available(account, amount)
    }

    fn credit_locked(&mut self, account: &AccountId, amount: Amount) -> Result<()> {
        if self.rejecting.contains(account) {
            return Err(LedgerError::ArithmeticOverflow("mock rejection"));
        }
        self.credit_calls.push((*account, amount, true));
        self.inner.credit_locked(account, amount)
    }

    fn debit_available(
        &mut self,
        account: &AccountId,
        amount: Amount,
        kind: DebitKind,
    ) -> Result<()> {
        self.debit_calls.push((*account, amount, kind));
        self.inner.debit_available(account, amount, kind)
    }

    fn move_available(&mut self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<()> {
        self.inner.move_available(from, to, amount)
    }

    fn release_locked(&mut self, account: &AccountId) -> Result<Amount> {
        self.inner.release_locked(account)
    }

    fn revert_credit(&mut self, account: &AccountId, amount: Amount, locked: bool) -> Result<()> {
        self.inner.revert_credit(account, amount, locked)
    }

    fn revert_debit(&mut self, account: &AccountId, amount: Amount, kind: DebitKind) -> Result<()> {
        self.inner.revert_debit(account, amount, kind)
    }

    fn balance_of(&self, account: &AccountId) -> AccountBalance {
        self.inner.balance_of(account)
    }

    fn total_liabilities(&self) -> Amount {
        self.inner.total_liabilities()
    }
}
