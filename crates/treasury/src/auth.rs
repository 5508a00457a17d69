//! Authorization policy for admin and governance calls.
//!
//! The engine never inspects signatures or multisig thresholds itself. It asks
//! an [`AuthorizationPolicy`] whether a caller holds a [`Role`] before any
//! privileged mutation.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::info;
use unilevel_types::AccountId;

use crate::errors::{LedgerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Pause, presets, tables and limits.
    Admin,
    /// Deposits weekly performance.
    Distributor,
    /// Schedules and executes bucket withdrawals.
    Treasury,
    /// Emergency reserve and manual circuit breaker.
    Governor,
    /// Reports monthly volume.
    Updater,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Admin,
        Role::Distributor,
        Role::Treasury,
        Role::Governor,
        Role::Updater,
    ];
}

/// Capability check consulted before every privileged mutation.
pub trait AuthorizationPolicy: Send + Sync {
    fn is_authorized(&self, caller: &AccountId, role: Role) -> bool;

    fn ensure(&self, caller: &AccountId, role: Role) -> Result<()> {
        if self.is_authorized(caller, role) {
            Ok(())
        } else {
            Err(LedgerError::NotAuthorized {
                caller: *caller,
                role,
            })
        }
    }
}

/// Role membership table.
#[derive(Debug, Default)]
pub struct RoleRegistry {
    members: RwLock<HashMap<Role, HashSet<AccountId>>>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry where `owner` holds every role.
    pub fn with_owner(owner: AccountId) -> Self {
        let registry = Self::new();
        for role in Role::ALL {
            registry.grant(role, owner);
        }
        registry
    }

    pub fn grant(&self, role: Role, account: AccountId) {
        self.members.write().entry(role).or_default().insert(account);
        info!(target: "treasury", role = ?role, account = %account, "Role granted");
    }

    pub fn revoke(&self, role: Role, account: &AccountId) -> bool {
        let removed = self
            .members
            .write()
            .get_mut(&role)
            .map(|set| set.remove(account))
            .unwrap_or(false);
        if removed {
            info!(target: "treasury", role = ?role, account = %account, "Role revoked");
        }
        removed
    }
}

impl AuthorizationPolicy for RoleRegistry {
    fn is_authorized(&self, caller: &AccountId, role: Role) -> bool {
        self.members
            .read()
            .get(&role)
            .map(|set| set.contains(caller))
            .unwrap_or(false)
    }
}
