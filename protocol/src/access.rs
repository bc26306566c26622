//! # Access Gates
//!
//! Two questions the ledger asks before acting, and never answers itself:
//!
//! - **Is this region paused?** ([`PauseGate`]) Governance can freeze entity
//!   mutations or fund movements independently.
//! - **Does this address hold a global capability?** ([`AccessControl`])
//!   Today the only one is [`GlobalRole::FeeCollector`], which may withdraw
//!   protocol-owned balances.
//!
//! [`Governance`] is the in-process implementation of both, seeded from
//! [`LedgerConfig`]. Deployments with on-chain governance plug in their own.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::config::LedgerConfig;
use crate::identity::Address;

/// Independently pausable slices of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    /// Entity registration, update and removal, plus wallet assignment.
    Entities,
    /// Deposits, withdrawals and fee routing.
    Funds,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Entities => write!(f, "entities"),
            Region::Funds => write!(f, "funds"),
        }
    }
}

/// Global (not entity-scoped) capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalRole {
    /// May withdraw balances booked against the protocol entity.
    FeeCollector,
}

/// Reports whether a region is paused.
pub trait PauseGate: Send + Sync {
    /// Returns `true` if operations in `region` must be refused.
    fn is_paused(&self, region: Region) -> bool;
}

/// Answers global capability checks.
pub trait AccessControl: Send + Sync {
    /// Returns `true` if `who` holds `role`.
    fn has_role(&self, role: GlobalRole, who: &Address) -> bool;
}

/// In-memory pause flags and capability grants.
#[derive(Debug, Default)]
pub struct Governance {
    paused: RwLock<HashSet<Region>>,
    grants: RwLock<HashSet<(GlobalRole, Address)>>,
}

impl Governance {
    /// Creates a gate with nothing paused and nothing granted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds pause flags and fee collectors from configuration.
    pub fn from_config(config: &LedgerConfig) -> Self {
        let gov = Self::new();
        for region in &config.paused_regions {
            gov.pause(*region);
        }
        for collector in &config.fee_collectors {
            gov.grant(GlobalRole::FeeCollector, *collector);
        }
        gov
    }

    /// Pauses `region`. Returns `false` if it was already paused.
    pub fn pause(&self, region: Region) -> bool {
        let changed = self.paused.write().insert(region);
        if changed {
            tracing::info!(%region, "region paused");
        }
        changed
    }

    /// Unpauses `region`. Returns `false` if it was not paused.
    pub fn unpause(&self, region: Region) -> bool {
        let changed = self.paused.write().remove(&region);
        if changed {
            tracing::info!(%region, "region unpaused");
        }
        changed
    }

    /// Grants `role` to `who`.
    pub fn grant(&self, role: GlobalRole, who: Address) -> bool {
        self.grants.write().insert((role, who))
    }

    /// Revokes `role` from `who`.
    pub fn revoke(&self, role: GlobalRole, who: &Address) -> bool {
        self.grants.write().remove(&(role, *who))
    }

    /// Currently paused regions.
    pub fn paused_regions(&self) -> Vec<Region> {
        let mut regions: Vec<Region> = self.paused.read().iter().copied().collect();
        regions.sort_by_key(|r| *r as u8);
        regions
    }
}

impl PauseGate for Governance {
    fn is_paused(&self, region: Region) -> bool {
        self.paused.read().contains(&region)
    }
}

impl AccessControl for Governance {
    fn has_role(&self, role: GlobalRole, who: &Address) -> bool {
        self.grants.read().contains(&(role, *who))
    }
}
