//! # Identity Module
//!
//! Who exists on the ledger and what they are allowed to do.
//!
//! The identity stack is layered:
//!
//! 1. **Address**: a Bech32-encoded BLAKE3 digest with the `nova` HRP. Every
//!    caller, depositor and wallet is one.
//! 2. **Roles**: a closed enumeration of capabilities, stored as a compact
//!    bitmask (see [`roles`]).
//! 3. **Registry**: one entity per address, with a dense numeric id, a role
//!    set and a metadata URI.
//! 4. **Wallets**: per-entity Treasury and Assistant wallets that gate
//!    withdrawals.
//!
//! ## Design Decisions
//!
//! - Bech32 (not Bech32m) for addresses, same as the rest of NOVA. The
//!   checksum catches fat-fingered copy-paste.
//! - Role sets are integers, not `Vec`s. Membership, union and re-grant are
//!   single bit operations and the stored form is four bytes.
//! - Registration and update share one write path, so "a live entity never
//!   holds an empty role set" is enforced in exactly one place.

pub mod address;
pub mod registry;
pub mod roles;
pub mod wallets;

pub use address::{Address, AddressError};
pub use registry::{EntityId, EntityInfo, EntityRecord, EntityRegistry};
pub use roles::{RoleKind, RoleMask, RoleSet};
pub use wallets::{WalletBook, WalletKind, WalletRoleResolver};
