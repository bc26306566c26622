//! # Wallet Roles
//!
//! An entity does not withdraw with its owner key. It names wallets:
//!
//! - a **Treasury** wallet is an allowed withdrawal *destination*;
//! - an **Assistant** wallet is an allowed withdrawal *initiator*.
//!
//! Assignments can be entity-wide (`scope = None`) or scoped to one of the
//! entity's roles. The ledger only ever asks the yes/no question in
//! [`WalletRoleResolver`]; [`WalletBook`] is the in-process answer.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use super::address::Address;
use super::registry::EntityId;
use super::roles::RoleKind;

/// Kind of authorized wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletKind {
    /// Permitted withdrawal destination.
    Treasury,
    /// Permitted withdrawal initiator.
    Assistant,
}

impl fmt::Display for WalletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletKind::Treasury => write!(f, "treasury"),
            WalletKind::Assistant => write!(f, "assistant"),
        }
    }
}

/// Answers wallet-role membership questions.
pub trait WalletRoleResolver {
    /// Returns `true` if `wallet` holds `kind` for `entity` under `scope`.
    ///
    /// With `strict = false`, an entity-wide assignment also satisfies a
    /// scoped query. With `strict = true` only an exact-scope assignment
    /// counts.
    fn has_wallet_role(
        &self,
        entity: EntityId,
        wallet: &Address,
        scope: Option<RoleKind>,
        kind: WalletKind,
        strict: bool,
    ) -> bool;
}

type WalletKey = (EntityId, Option<RoleKind>, WalletKind);

/// In-memory wallet assignments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBook {
    assignments: HashMap<WalletKey, BTreeSet<Address>>,
}

impl WalletBook {
    /// Creates an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns `wallet`. Returns `false` if it was already assigned.
    pub fn assign(
        &mut self,
        entity: EntityId,
        scope: Option<RoleKind>,
        kind: WalletKind,
        wallet: Address,
    ) -> bool {
        self.assignments
            .entry((entity, scope, kind))
            .or_default()
            .insert(wallet)
    }

    /// Revokes `wallet`. Returns `false` if it was not assigned.
    pub fn revoke(
        &mut self,
        entity: EntityId,
        scope: Option<RoleKind>,
        kind: WalletKind,
        wallet: &Address,
    ) -> bool {
        let key = (entity, scope, kind);
        let Some(set) = self.assignments.get_mut(&key) else {
            return false;
        };
        let removed = set.remove(wallet);
        if set.is_empty() {
            self.assignments.remove(&key);
        }
        removed
    }

    /// Wallets assigned under an exact (entity, scope, kind) key.
    pub fn wallets(
        &self,
        entity: EntityId,
        scope: Option<RoleKind>,
        kind: WalletKind,
    ) -> Vec<Address> {
        self.assignments
            .get(&(entity, scope, kind))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    fn holds(&self, key: &WalletKey, wallet: &Address) -> bool {
        self.assignments
            .get(key)
            .map_or(false, |set| set.contains(wallet))
    }
}

impl WalletRoleResolver for WalletBook {
    fn has_wallet_role(
        &self,
        entity: EntityId,
        wallet: &Address,
        scope: Option<RoleKind>,
        kind: WalletKind,
        strict: bool,
    ) -> bool {
        if self.holds(&(entity, scope, kind), wallet) {
            return true;
        }
        !strict && scope.is_some() && self.holds(&(entity, None, kind), wallet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity() -> EntityId {
        EntityId::new(1)
    }

    #[test]
    fn unassigned_wallet_has_no_role() {
        let book = WalletBook::new();
        let w = Address::derive(b"w");
        assert!(!book.has_wallet_role(entity(), &w, None, WalletKind::Treasury, true));
    }

    #[test]
    fn kinds_are_independent() {
        let mut book = WalletBook::new();
        let w = Address::derive(b"w");
        book.assign(entity(), None, WalletKind::Treasury, w);
        assert!(book.has_wallet_role(entity(), &w, None, WalletKind::Treasury, true));
        assert!(!book.has_wallet_role(entity(), &w, None, WalletKind::Assistant, true));
    }

    #[test]
    fn entity_wide_assignment_satisfies_lenient_scoped_query() {
        let mut book = WalletBook::new();
        let w = Address::derive(b"w");
        book.assign(entity(), None, WalletKind::Assistant, w);

        let scope = Some(RoleKind::Provider);
        assert!(book.has_wallet_role(entity(), &w, scope, WalletKind::Assistant, false));
        assert!(!book.has_wallet_role(entity(), &w, scope, WalletKind::Assistant, true));
    }

    #[test]
    fn scoped_assignment_does_not_leak_to_other_scopes() {
        let mut book = WalletBook::new();
        let w = Address::derive(b"w");
        book.assign(entity(), Some(RoleKind::Issuer), WalletKind::Treasury, w);
        assert!(!book.has_wallet_role(entity(), &w, None, WalletKind::Treasury, false));
        assert!(!book.has_wallet_role(
            entity(),
            &w,
            Some(RoleKind::Auditor),
            WalletKind::Treasury,
            false
        ));
    }

    #[test]
    fn assign_and_revoke_report_changes() {
        let mut book = WalletBook::new();
        let w = Address::derive(b"w");
        assert!(book.assign(entity(), None, WalletKind::Treasury, w));
        assert!(!book.assign(entity(), None, WalletKind::Treasury, w));
        assert!(book.revoke(entity(), None, WalletKind::Treasury, &w));
        assert!(!book.revoke(entity(), None, WalletKind::Treasury, &w));
        assert!(book.wallets(entity(), None, WalletKind::Treasury).is_empty());
    }
}
