//! External value-transfer rail.
//!
//! Stand-in for a token or payment network. The engine only needs a balance
//! query and a transfer that can fail; everything chain-specific lives behind
//! this trait.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use unilevel_types::{AccountId, Amount};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("insufficient funds: {account} holds {available}, needs {requested}")]
    InsufficientFunds {
        account: AccountId,
        available: Amount,
        requested: Amount,
    },
    #[error("transfer rejected: {0}")]
    Rejected(String),
}

/// Payment rail collaborator. Implementations must be callable from behind a
/// shared reference because the engine holds them as `Arc<dyn ValueTransfer>`.
pub trait ValueTransfer: Send + Sync {
    fn balance_of(&self, account: &AccountId) -> Amount;

    fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TransferError>;
}

#[derive(Debug, Default)]
struct RailState {
    balances: HashMap<AccountId, Amount>,
    frozen: HashSet<AccountId>,
    fail_next: u32,
    transfers: Vec<(AccountId, AccountId, Amount)>,
}

/// In-memory rail for tests and simulation.
#[derive(Debug, Default)]
pub struct InMemoryValueTransfer {
    state: Mutex<RailState>,
}

impl InMemoryValueTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create funds out of thin air (test faucet).
    pub fn mint(&self, account: AccountId, amount: Amount) {
        let mut state = self.state.lock();
        let balance = state.balances.entry(account).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    /// Remove funds without a counterparty, e.g. to simulate an exploit drain.
    pub fn burn(&self, account: &AccountId, amount: Amount) {
        let mut state = self.state.lock();
        if let Some(balance) = state.balances.get_mut(account) {
            *balance = balance.saturating_sub(amount);
        }
    }

    /// Reject every transfer touching `account` until unfrozen.
    pub fn freeze(&self, account: AccountId) {
        self.state.lock().frozen.insert(account);
    }

    pub fn unfreeze(&self, account: &AccountId) {
        self.state.lock().frozen.remove(account);
    }

    /// Make the next `count` transfers fail.
    pub fn fail_next(&self, count: u32) {
        self.state.lock().fail_next = count;
    }

    pub fn transfer_log(&self) -> Vec<(AccountId, AccountId, Amount)> {
        self.state.lock().transfers.clone()
    }
}

impl ValueTransfer for InMemoryValueTransfer {
    fn balance_of(&self, account: &AccountId) -> Amount {
        self.state.lock().balances.get(account).copied().unwrap_or(0)
    }

    fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TransferError> {
        let mut state = self.state.lock();

        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(TransferError::Rejected("rail unavailable".into()));
        }
        if state.frozen.contains(from) || state.frozen.contains(to) {
            return Err(TransferError::Rejected("account frozen".into()));
        }

        let available = state.balances.get(from).copied().unwrap_or(0);
        if available < amount {
            return Err(TransferError::InsufficientFunds {
                account: *from,
                available,
                requested: amount,
            });
        }

        state.balances.insert(*from, available - amount);
        let credited = state.balances.entry(*to).or_insert(0);
        *credited = credited.saturating_add(amount);
        state.transfers.push((*from, *to, amount));
        Ok(())
    }
}
