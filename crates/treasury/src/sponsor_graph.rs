//! Referral tree.
//!
//! Every account points at most once to the sponsor that introduced it. The
//! sponsor must already exist when the child registers, so edges always point
//! to older nodes and the structure is a forest. Walks upward are therefore
//! finite, and they are additionally bounded by the caller's `max_depth`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;
use unilevel_types::{AccountId, Timestamp};

use crate::errors::{LedgerError, Result};

/// One registered account in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SponsorNode {
    pub sponsor: Option<AccountId>,
    pub registered_at: Timestamp,
    pub direct_referral_count: u32,
    /// Direct referrals in registration order
    pub children: Vec<AccountId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SponsorGraph {
    nodes: HashMap<AccountId, SponsorNode>,
    /// Canonical registration order, used for batch snapshots
    order: Vec<AccountId>,
}

impl SponsorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `user` under `sponsor`. Nothing changes on error.
    pub fn register(
        &mut self,
        user: AccountId,
        sponsor: Option<AccountId>,
        now: Timestamp,
    ) -> Result<()> {
        if self.nodes.contains_key(&user) {
            return Err(LedgerError::AlreadyRegistered(user));
        }
        if let Some(sponsor) = sponsor {
            if sponsor == user {
                return Err(LedgerError::SelfSponsorship(user));
            }
            let parent = self
                .nodes
                .get_mut(&sponsor)
                .ok_or(LedgerError::SponsorNotRegistered(sponsor))?;
            parent.direct_referral_count = parent.direct_referral_count.saturating_add(1);
            parent.children.push(user);
        }

        self.nodes.insert(
            user,
            SponsorNode {
                sponsor,
                registered_at: now,
                direct_referral_count: 0,
                children: Vec::new(),
            },
        );
        self.order.push(user);

        info!(
            target: "treasury",
            user = %user,
            sponsor = ?sponsor.map(|s| s.short()),
            "Account registered"
        );
        Ok(())
    }

    pub fn contains(&self, user: &AccountId) -> bool {
        self.nodes.contains_key(user)
    }

    pub fn node(&self, user: &AccountId) -> Option<&SponsorNode> {
        self.nodes.get(user)
    }

    pub fn sponsor_of(&self, user: &AccountId) -> Option<AccountId> {
        self.nodes.get(user).and_then(|n| n.sponsor)
    }

    pub fn direct_referral_count(&self, user: &AccountId) -> u32 {
        self.nodes
            .get(user)
            .map(|n| n.direct_referral_count)
            .unwrap_or(0)
    }

    pub fn direct_referrals(&self, user: &AccountId) -> &[AccountId] {
        self.nodes
            .get(user)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Lazily walk up to `max_depth` sponsors above `user`, nearest first.
    pub fn ancestors_of(&self, user: &AccountId, max_depth: usize) -> Ancestors<'_> {
        Ancestors {
            graph: self,
            next: self.sponsor_of(user),
            level: 0,
            max_depth,
        }
    }

    /// Accounts in registration order.
    pub fn accounts(&self) -> impl Iterator<Item = &AccountId> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Upward walk yielding `(level, ancestor)` with `level` starting at 1.
#[derive(Debug, Clone)]
pub struct Ancestors<'a> {
    graph: &'a SponsorGraph,
    next: Option<AccountId>,
    level: usize,
    max_depth: usize,
}

impl Iterator for Ancestors<'_> {
    type Item = (usize, AccountId);

    fn next(&mut self) -> Option<Self::Item> {
        if self.level >= self.max_depth {
            return None;
        }
        let current = self.next.take()?;
        self.level += 1;
        self.next = self.graph.sponsor_of(&current);
        Some((self.level, current))
    }
}
