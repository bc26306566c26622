// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # NOVA Ledger: Core Library
//!
//! The accounting and identity core of the NOVA protocol. It tracks which
//! participants ("entities") exist, what roles each one holds, and how much
//! of every asset each entity can withdraw.
//!
//! Two subsystems do the heavy lifting:
//!
//! - a compact role model: a closed enumeration of roles stored as a bitmask,
//!   with exact set semantics (union, membership, idempotent re-grant);
//! - a funds ledger where money in equals money out, a withdrawal can never
//!   exceed what was recorded, and a failed external transfer never leaves
//!   the books out of sync with custody.
//!
//! ## Architecture
//!
//! - **identity**: addresses, roles, the entity registry and wallet roles.
//! - **funds**: asset ids, the balance book and the withdrawal pipeline.
//! - **service**: the atomic, lock-guarded entry point for every operation.
//! - **access**: pause gate and global capabilities (fee collector).
//! - **transfer**: the custody boundary: deposits in, withdrawals out.
//! - **events**: notifications, published only after a call commits.
//! - **storage**: full-state persistence over sled plus a Merkle state root.
//! - **config**: constants and deployment knobs.
//!
//! ## Design Philosophy
//!
//! 1. Check everything, then mutate. A failed call has no effects.
//! 2. No float, no division, no unchecked arithmetic on balances.
//! 3. If it touches money, it has tests. Plural.

pub mod access;
pub mod config;
pub mod error;
pub mod events;
pub mod funds;
pub mod identity;
pub mod service;
pub mod storage;
pub mod transfer;

pub use access::{AccessControl, GlobalRole, Governance, PauseGate, Region};
pub use config::LedgerConfig;
pub use error::{LedgerError, LedgerResult};
pub use events::{EventBatch, EventLog, EventRecord, EventSink, LedgerEvent, NullSink};
pub use funds::{Amount, AssetId, FundsLedger};
pub use identity::{Address, EntityId, EntityInfo, EntityRegistry, RoleKind, RoleSet, WalletBook, WalletKind};
pub use service::{Collaborators, LedgerService};
pub use storage::{LedgerDb, LedgerState};
pub use transfer::{CustodySnapshot, CustodyVault, Transfer, TransferError, TransferGateway};
