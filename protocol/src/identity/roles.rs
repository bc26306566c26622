//! # Roles & the Compact Role Mask
//!
//! Every registered entity holds one or more [`RoleKind`]s. On the wire and
//! at rest a set of roles is a single integer: bit `i` is set when the entity
//! holds the role with index `i`.
//!
//! ```text
//! [Provider, Auditor, Provider]  --encode-->  0b0010_0001
//! 0b0010_0001                    --decode-->  [Provider, Auditor]
//! ```
//!
//! Encoding is an OR-fold, so duplicates collapse and input order is
//! irrelevant. Decoding always returns roles in ascending index order.
//! `decode(encode(x))` is therefore a *set* match of `x`, not a sequence
//! match.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ROLE_MASK_BITS;
use crate::error::{LedgerError, LedgerResult};

/// Integer representation of a role set.
pub type RoleMask = u32;

/// Closed enumeration of the capabilities an entity can hold.
///
/// The discriminant is the bit index in the role mask. Appending a variant
/// is backwards compatible; reordering is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RoleKind {
    /// Offers services or liquidity to the network.
    Provider = 0,
    /// Consumes services and pays fees.
    Consumer = 1,
    /// Attests to the validity of settlements.
    Validator = 2,
    /// Forwards messages and settlements between networks.
    Relayer = 3,
    /// Resolves disputes between other entities.
    Arbiter = 4,
    /// Reads and certifies ledger activity.
    Auditor = 5,
    /// Issues fungible assets.
    Issuer = 6,
    /// Holds assets on behalf of others.
    Custodian = 7,
}

impl RoleKind {
    /// Number of roles in the enumeration.
    pub const COUNT: usize = 8;

    /// Every role, in ascending index order.
    pub const ALL: [RoleKind; RoleKind::COUNT] = [
        RoleKind::Provider,
        RoleKind::Consumer,
        RoleKind::Validator,
        RoleKind::Relayer,
        RoleKind::Arbiter,
        RoleKind::Auditor,
        RoleKind::Issuer,
        RoleKind::Custodian,
    ];

    /// Mask with every role bit set.
    pub const FULL_MASK: RoleMask = ((1u64 << RoleKind::COUNT) - 1) as RoleMask;

    /// Bit index of this role in the mask.
    pub const fn index(self) -> u32 {
        self as u32
    }

    /// Single-bit mask for this role.
    pub const fn bit(self) -> RoleMask {
        1 << self.index()
    }

    /// Returns the role with the given bit index, if any.
    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }
}

// The enumeration must fit the mask type, or bits silently fall off the end.
const _: () = assert!(RoleKind::COUNT as u32 <= ROLE_MASK_BITS);

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoleKind::Provider => "provider",
            RoleKind::Consumer => "consumer",
            RoleKind::Validator => "validator",
            RoleKind::Relayer => "relayer",
            RoleKind::Arbiter => "arbiter",
            RoleKind::Auditor => "auditor",
            RoleKind::Issuer => "issuer",
            RoleKind::Custodian => "custodian",
        };
        write!(f, "{}", name)
    }
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Folds a role list into its mask.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidRoleSet`] if `roles` is empty.
pub fn encode(roles: &[RoleKind]) -> LedgerResult<RoleMask> {
    if roles.is_empty() {
        return Err(LedgerError::InvalidRoleSet);
    }
    Ok(roles.iter().fold(0, |mask, role| mask | role.bit()))
}

/// Expands a mask into its roles, ascending by index.
///
/// Bits beyond the enumeration are ignored.
pub fn decode(mask: RoleMask) -> Vec<RoleKind> {
    if mask == RoleKind::FULL_MASK {
        return RoleKind::ALL.to_vec();
    }

    let mut roles = Vec::with_capacity(mask.count_ones() as usize);
    for role in RoleKind::ALL {
        if mask & role.bit() != 0 {
            roles.push(role);
        }
    }
    roles
}

// ---------------------------------------------------------------------------
// RoleSet
// ---------------------------------------------------------------------------

/// A set of roles backed by a [`RoleMask`].
///
/// The empty set is representable (it is what a removed entity holds) but
/// never stored for a live entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleSet(RoleMask);

impl RoleSet {
    /// The empty set.
    pub const EMPTY: RoleSet = RoleSet(0);

    /// The set of every role.
    pub const FULL: RoleSet = RoleSet(RoleKind::FULL_MASK);

    /// Builds a non-empty set from a role list.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidRoleSet`] if `roles` is empty.
    pub fn from_roles(roles: &[RoleKind]) -> LedgerResult<Self> {
        encode(roles).map(RoleSet)
    }

    /// Wraps a mask, rejecting bits outside the enumeration.
    pub fn from_mask(mask: RoleMask) -> Option<Self> {
        if mask & !RoleKind::FULL_MASK != 0 {
            return None;
        }
        Some(RoleSet(mask))
    }

    /// The underlying mask.
    pub fn mask(&self) -> RoleMask {
        self.0
    }

    /// Membership test.
    pub fn contains(&self, role: RoleKind) -> bool {
        self.0 & role.bit() != 0
    }

    /// Adds a role. Re-granting a held role is a no-op.
    pub fn insert(&mut self, role: RoleKind) {
        self.0 |= role.bit();
    }

    /// Set union.
    pub fn union(&self, other: &RoleSet) -> RoleSet {
        RoleSet(self.0 | other.0)
    }

    /// Returns `true` if no role is held.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Number of roles held.
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// The held roles, ascending by index.
    pub fn to_vec(&self) -> Vec<RoleKind> {
        decode(self.0)
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.to_vec().iter().map(|r| r.to_string()).collect();
        write!(f, "{{{}}}", names.join(","))
    }
}
