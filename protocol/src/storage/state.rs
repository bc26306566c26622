//! # Ledger State & State Root
//!
//! [`LedgerState`] is everything a ledger instance owns: the entity
//! registry, the balance book and the wallet assignments. The service keeps
//! it behind one lock; storage persists and reloads it.
//!
//! ## State Root
//!
//! A BLAKE3 Merkle root over every piece of state, so two nodes (or one node
//! before and after a restart) can compare state with a single hash:
//!
//! ```text
//! leaves = sort([ BLAKE3(tag || key || value) for every stored entry ])
//! root   = merkle_root(leaves)
//! ```
//!
//! Leaves are sorted, so insertion order and `HashMap` iteration order do
//! not matter. An odd node at any level is paired with itself. Empty state
//! has the all-zero root.

use serde::{Deserialize, Serialize};

use crate::funds::FundsLedger;
use crate::identity::{EntityRegistry, WalletBook};

const TAG_COUNTER: &[u8] = b"counter";
const TAG_INDEX: &[u8] = b"index";
const TAG_ENTITY: &[u8] = b"entity";
const TAG_BALANCE: &[u8] = b"balance";
const TAG_ASSETS: &[u8] = b"assets";

/// Full mutable state of one ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    /// Entities and their roles.
    pub registry: EntityRegistry,
    /// Balances and asset lists.
    pub ledger: FundsLedger,
    /// Treasury and assistant wallet assignments.
    pub wallets: WalletBook,
}

impl LedgerState {
    /// Creates empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes the Merkle root of the registry and ledger.
    ///
    /// Wallet assignments are authorization data, not accounting data, and
    /// are left out.
    pub fn state_root(&self) -> [u8; 32] {
        let mut leaves: Vec<[u8; 32]> = Vec::new();

        if self.registry.counter() > 0 {
            leaves.push(leaf(TAG_COUNTER, &[], &self.registry.counter().to_be_bytes()));
        }
        for (address, id) in self.registry.index() {
            leaves.push(leaf(TAG_INDEX, address.as_bytes(), &id.get().to_be_bytes()));
        }
        for (id, record) in self.registry.records() {
            let mut value = record.roles.mask().to_be_bytes().to_vec();
            value.extend_from_slice(record.metadata_uri.as_bytes());
            leaves.push(leaf(TAG_ENTITY, &id.get().to_be_bytes(), &value));
        }
        for ((id, asset), amount) in self.ledger.balances() {
            let mut key = id.get().to_be_bytes().to_vec();
            key.extend_from_slice(asset.as_bytes());
            leaves.push(leaf(TAG_BALANCE, &key, &amount.to_be_bytes()));
        }
        for (id, assets) in self.ledger.asset_lists() {
            let value: Vec<u8> = assets.iter().flat_map(|a| a.as_bytes().to_vec()).collect();
            leaves.push(leaf(TAG_ASSETS, &id.get().to_be_bytes(), &value));
        }

        merkle_root(leaves)
    }
}

fn leaf(tag: &[u8], key: &[u8], value: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(tag);
    hasher.update(&[0x00]);
    hasher.update(key);
    hasher.update(&[0x00]);
    hasher.update(value);
    *hasher.finalize().as_bytes()
}

fn merkle_root(mut level: Vec<[u8; 32]>) -> [u8; 32] {
    if level.is_empty() {
        return [0u8; 32];
    }
    level.sort_unstable();

    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        for chunk in level.chunks(2) {
            let right = chunk.get(1).unwrap_or(&chunk[0]);
            let mut hasher = blake3::Hasher::new();
            hasher.update(&chunk[0]);
            hasher.update(right);
            next.push(*hasher.finalize().as_bytes());
        }
        level = next;
    }
    level[0]
}
