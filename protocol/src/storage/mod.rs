//! # Storage Module
//!
//! Ledger state and its persistence.
//!
//! ## Architecture
//!
//! ```text
//! state.rs: LedgerState (registry + ledger + wallets) and its Merkle root
//! db.rs: sled persistence with one tree per kind of record
//! ```
//!
//! ## Design Decisions
//!
//! 1. **BLAKE3 for the state root.** Same hash as addresses and asset ids,
//!    and fast enough to recompute after every save.
//!
//! 2. **One sled tree per record kind.** Entities, the reverse index,
//!    balances and asset lists each get their own keyspace, so counts and
//!    scans never decode unrelated records.
//!
//! 3. **Bincode for on-disk serialization.** Compact, fast, deterministic.
//!    JSON is for APIs and debugging; bincode is for storage.

pub mod db;
pub mod state;

pub use db::{DbError, DbResult, LedgerDb};
pub use state::LedgerState;
