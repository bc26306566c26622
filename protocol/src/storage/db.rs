//! # LedgerDb: Persistent Storage Engine
//!
//! The persistence layer for ledger state, built on sled's embedded
//! key-value store. All on-disk data flows through this module.
//!
//! ## Tree Layout
//!
//! | Tree           | Key                           | Value                     |
//! |----------------|-------------------------------|---------------------------|
//! | `meta`         | key (UTF-8)                   | value (bytes)             |
//! | `entity_index` | `address` (32B)               | `entity_id` (8B BE)       |
//! | `entities`     | `entity_id` (8B BE)           | `bincode(EntityRecord)`   |
//! | `balances`     | `entity_id` (8B BE) ‖ `asset` | `amount` (16B BE)         |
//! | `asset_lists`  | `entity_id` (8B BE)           | `bincode(Vec<AssetId>)`   |
//!
//! Entity ids are stored big-endian so sled's lexicographic ordering matches
//! numeric ordering, and a prefix scan over `balances` yields one entity's
//! balances. The entity counter, the state format version, the wallet book,
//! the custody image and the last state root live in `meta`.
//!
//! ## Snapshots
//!
//! The node persists the full state after every successful mutation. One
//! snapshot is one sled transaction spanning all five trees, so a crash
//! leaves either the previous snapshot or the new one. The stored state
//! root still lets [`LedgerDb::load_state`] reject a store edited by hand.

use parking_lot::Mutex;
use sled::transaction::{TransactionError, TransactionResult};
use sled::{Batch, Db, Transactional, Tree};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use super::state::LedgerState;
use crate::config::{ADDRESS_LENGTH, ASSET_ID_LENGTH, LEDGER_STATE_VERSION};
use crate::funds::{Amount, AssetId, FundsLedger};
use crate::identity::{Address, EntityId, EntityRecord, EntityRegistry, WalletBook};
use crate::transfer::CustodySnapshot;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unsupported state version {found}, expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("state root mismatch after load: stored {stored}, computed {computed}")]
    CorruptState { stored: String, computed: String },
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

const META_VERSION: &[u8] = b"state_version";
const META_COUNTER: &[u8] = b"entity_counter";
const META_WALLETS: &[u8] = b"wallet_book";
const META_STATE_ROOT: &[u8] = b"state_root";
const META_CUSTODY: &[u8] = b"custody";

// ---------------------------------------------------------------------------
// LedgerDb
// ---------------------------------------------------------------------------

/// Persistent storage for one ledger.
///
/// sled is thread-safe, so a `LedgerDb` can be cloned or shared behind an
/// `Arc`. Saves are serialized across clones: each one clears the keys it
/// saw before its transaction starts.
#[derive(Debug, Clone)]
pub struct LedgerDb {
    db: Db,
    write_lock: Arc<Mutex<()>>,
    meta: Tree,
    entity_index: Tree,
    entities: Tree,
    balances: Tree,
    asset_lists: Tree,
}

impl LedgerDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when dropped.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        Ok(Self {
            meta: db.open_tree("meta")?,
            entity_index: db.open_tree("entity_index")?,
            entities: db.open_tree("entities")?,
            balances: db.open_tree("balances")?,
            asset_lists: db.open_tree("asset_lists")?,
            write_lock: Arc::new(Mutex::new(())),
            db,
        })
    }

    /// Writes the whole state, replacing whatever was stored before.
    ///
    /// A custody image saved earlier is left as it is.
    pub fn save_state(&self, state: &LedgerState) -> DbResult<()> {
        self.write_snapshot(state, None)
    }

    /// Writes the state and the custody image backing it in one transaction.
    pub fn save_with_custody(&self, state: &LedgerState, custody: &CustodySnapshot) -> DbResult<()> {
        self.write_snapshot(state, Some(custody))
    }

    fn write_snapshot(&self, state: &LedgerState, custody: Option<&CustodySnapshot>) -> DbResult<()> {
        let _guard = self.write_lock.lock();
        let registry = &state.registry;
        let ledger = &state.ledger;

        let mut index_batch = clearing_batch(&self.entity_index)?;
        for (address, id) in registry.index() {
            index_batch.insert(address.as_bytes().to_vec(), id.get().to_be_bytes().to_vec());
        }

        let mut entity_batch = clearing_batch(&self.entities)?;
        for (id, record) in registry.records() {
            entity_batch.insert(id.get().to_be_bytes().to_vec(), encode(record)?);
        }

        let mut balance_batch = clearing_batch(&self.balances)?;
        for ((id, asset), amount) in ledger.balances() {
            balance_batch.insert(balance_key(*id, asset), amount.to_be_bytes().to_vec());
        }

        let mut list_batch = clearing_batch(&self.asset_lists)?;
        for (id, assets) in ledger.asset_lists() {
            list_batch.insert(id.get().to_be_bytes().to_vec(), encode(assets)?);
        }

        let mut meta_batch = Batch::default();
        meta_batch.insert(META_VERSION, LEDGER_STATE_VERSION.to_be_bytes().to_vec());
        meta_batch.insert(META_COUNTER, registry.counter().to_be_bytes().to_vec());
        meta_batch.insert(META_WALLETS, encode(&state.wallets)?);
        meta_batch.insert(META_STATE_ROOT, state.state_root().to_vec());
        if let Some(custody) = custody {
            meta_batch.insert(META_CUSTODY, encode(custody)?);
        }

        let outcome: TransactionResult<(), ()> = (
            &self.entity_index,
            &self.entities,
            &self.balances,
            &self.asset_lists,
            &self.meta,
        )
            .transaction(|(index, entities, balances, lists, meta)| {
                index.apply_batch(&index_batch)?;
                entities.apply_batch(&entity_batch)?;
                balances.apply_batch(&balance_batch)?;
                lists.apply_batch(&list_batch)?;
                meta.apply_batch(&meta_batch)?;
                Ok(())
            });
        match outcome {
            Ok(()) => {}
            Err(TransactionError::Storage(e)) => return Err(DbError::Sled(e)),
            Err(TransactionError::Abort(())) => {
                return Err(DbError::Serialization("snapshot transaction aborted".to_string()))
            }
        }

        self.db.flush()?;
        Ok(())
    }

    /// The custody image stored with the last [`save_with_custody`](Self::save_with_custody).
    pub fn load_custody(&self) -> DbResult<Option<CustodySnapshot>> {
        match self.meta.get(META_CUSTODY)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Reads the stored state back.
    ///
    /// Returns `None` for a database that has never been written.
    pub fn load_state(&self) -> DbResult<Option<LedgerState>> {
        let Some(version) = self.meta.get(META_VERSION)? else {
            return Ok(None);
        };
        let version = u32::from_be_bytes(fixed(&version, "state version")?);
        if version != LEDGER_STATE_VERSION {
            return Err(DbError::VersionMismatch {
                found: version,
                expected: LEDGER_STATE_VERSION,
            });
        }

        let counter = match self.meta.get(META_COUNTER)? {
            Some(bytes) => u64::from_be_bytes(fixed(&bytes, "entity counter")?),
            None => 0,
        };

        let mut index = HashMap::new();
        for item in self.entity_index.iter() {
            let (key, value) = item?;
            let address = Address::from_bytes(fixed::<ADDRESS_LENGTH>(&key, "address key")?);
            let id = EntityId::new(u64::from_be_bytes(fixed(&value, "entity id")?));
            index.insert(address, id);
        }

        let mut records = BTreeMap::new();
        for item in self.entities.iter() {
            let (key, value) = item?;
            let id = EntityId::new(u64::from_be_bytes(fixed(&key, "entity key")?));
            let record: EntityRecord = decode(&value)?;
            records.insert(id, record);
        }

        let mut balances = HashMap::new();
        for item in self.balances.iter() {
            let (key, value) = item?;
            if key.len() != 8 + ASSET_ID_LENGTH {
                return Err(DbError::Serialization("invalid balance key".to_string()));
            }
            let id = EntityId::new(u64::from_be_bytes(fixed(&key[..8], "balance entity")?));
            let asset = AssetId::from_bytes(fixed(&key[8..], "balance asset")?);
            let amount = Amount::from_be_bytes(fixed(&value, "balance amount")?);
            balances.insert((id, asset), amount);
        }

        let mut assets = HashMap::new();
        for item in self.asset_lists.iter() {
            let (key, value) = item?;
            let id = EntityId::new(u64::from_be_bytes(fixed(&key, "asset list key")?));
            let list: Vec<AssetId> = decode(&value)?;
            assets.insert(id, list);
        }

        let wallets: WalletBook = match self.meta.get(META_WALLETS)? {
            Some(bytes) => decode(&bytes)?,
            None => WalletBook::default(),
        };

        let state = LedgerState {
            registry: EntityRegistry::from_parts(counter, index, records),
            ledger: FundsLedger::from_parts(balances, assets),
            wallets,
        };

        if let Some(stored) = self.meta.get(META_STATE_ROOT)? {
            let computed = state.state_root();
            if stored.as_ref() != computed.as_slice() {
                return Err(DbError::CorruptState {
                    stored: hex::encode(stored),
                    computed: hex::encode(computed),
                });
            }
        }

        Ok(Some(state))
    }

    /// The state root recorded by the last save.
    pub fn stored_state_root(&self) -> DbResult<Option<[u8; 32]>> {
        match self.meta.get(META_STATE_ROOT)? {
            Some(bytes) => Ok(Some(fixed(&bytes, "state root")?)),
            None => Ok(None),
        }
    }

    /// Number of allocated entity slots on disk.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Number of stored balance entries.
    pub fn balance_count(&self) -> usize {
        self.balances.len()
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn balance_key(id: EntityId, asset: &AssetId) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + ASSET_ID_LENGTH);
    key.extend_from_slice(&id.get().to_be_bytes());
    key.extend_from_slice(asset.as_bytes());
    key
}

/// A batch that starts by removing every key currently in `tree`.
fn clearing_batch(tree: &Tree) -> DbResult<Batch> {
    let mut batch = Batch::default();
    for key in tree.iter().keys() {
        batch.remove(key?);
    }
    Ok(batch)
}

fn encode<T: serde::Serialize + ?Sized>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

fn fixed<const N: usize>(bytes: &[u8], what: &str) -> DbResult<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| DbError::Serialization(format!("invalid {what} bytes")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBatch;
    use crate::identity::{RoleKind, WalletKind};

    fn alice() -> Address {
        Address::derive(b"alice")
    }

    fn bob() -> Address {
        Address::derive(b"bob")
    }

    fn sample_state() -> LedgerState {
        let mut state = LedgerState::new();
        let mut events = EventBatch::new();
        let a = state
            .registry
            .register(alice(), &[RoleKind::Provider, RoleKind::Issuer], "ipfs://a", &mut events)
            .unwrap();
        state
            .registry
            .register(bob(), &[RoleKind::Consumer], "ipfs://b", &mut events)
            .unwrap();
        state.registry.remove(bob(), &mut events).unwrap();

        state
            .ledger
            .credit(a, AssetId::NATIVE, 100, alice(), &mut events)
            .unwrap();
        state
            .ledger
            .credit(a, AssetId::derive("nUSD", "i"), 5, alice(), &mut events)
            .unwrap();
        state.ledger.debit(a, AssetId::NATIVE, 100).unwrap();

        state
            .wallets
            .assign(a, None, WalletKind::Treasury, Address::derive(b"t"));
        state
    }

    #[test]
    fn open_temporary_database() {
        let db = LedgerDb::open_temporary().expect("should create temp db");
        assert_eq!(db.entity_count(), 0);
        assert!(db.load_state().unwrap().is_none());
        assert!(db.stored_state_root().unwrap().is_none());
    }

    #[test]
    fn save_and_load_round_trips_everything() {
        let db = LedgerDb::open_temporary().unwrap();
        let state = sample_state();
        db.save_state(&state).unwrap();

        let loaded = db.load_state().unwrap().expect("state should exist");
        assert_eq!(loaded, state);
        assert_eq!(db.stored_state_root().unwrap(), Some(state.state_root()));
        assert_eq!(db.entity_count(), 2);
    }

    #[test]
    fn orphaned_slot_and_zero_balance_survive_reload() {
        let db = LedgerDb::open_temporary().unwrap();
        db.save_state(&sample_state()).unwrap();
        let loaded = db.load_state().unwrap().unwrap();

        assert_eq!(loaded.registry.counter(), 2);
        assert!(!loaded.registry.is_live(EntityId::new(2)));
        let a = EntityId::new(1);
        assert_eq!(loaded.ledger.balance_of(a, AssetId::NATIVE), 0);
        assert_eq!(loaded.ledger.list_assets(a)[0], AssetId::NATIVE);
    }

    #[test]
    fn second_save_replaces_first() {
        let db = LedgerDb::open_temporary().unwrap();
        db.save_state(&sample_state()).unwrap();
        db.save_state(&LedgerState::new()).unwrap();

        let loaded = db.load_state().unwrap().unwrap();
        assert_eq!(loaded, LedgerState::new());
        assert_eq!(db.balance_count(), 0);
    }

    #[test]
    fn persistent_database_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = sample_state();
        {
            let db = LedgerDb::open(dir.path()).expect("should open db");
            db.save_state(&state).unwrap();
        }
        let db = LedgerDb::open(dir.path()).expect("should reopen db");
        assert_eq!(db.load_state().unwrap(), Some(state));
    }

    #[test]
    fn tampered_balance_is_detected() {
        let db = LedgerDb::open_temporary().unwrap();
        db.save_state(&sample_state()).unwrap();

        let key = balance_key(EntityId::new(1), &AssetId::NATIVE);
        db.balances
            .insert(key, 999u128.to_be_bytes().to_vec())
            .unwrap();

        assert!(matches!(db.load_state(), Err(DbError::CorruptState { .. })));
    }

    #[test]
    fn custody_image_saved_with_state() {
        let db = LedgerDb::open_temporary().unwrap();
        assert!(db.load_custody().unwrap().is_none());

        let custody = CustodySnapshot {
            reserves: vec![(AssetId::NATIVE, 100)],
            holders: vec![(alice(), AssetId::derive("nUSD", "i"), 7)],
        };
        db.save_with_custody(&sample_state(), &custody).unwrap();
        assert_eq!(db.load_custody().unwrap(), Some(custody.clone()));

        // A plain state save keeps the last custody image.
        db.save_state(&sample_state()).unwrap();
        assert_eq!(db.load_custody().unwrap(), Some(custody));
    }

    #[test]
    fn interrupted_snapshot_leaves_previous_state() {
        use sled::transaction::ConflictableTransactionError;

        let db = LedgerDb::open_temporary().unwrap();
        let before = sample_state();
        db.save_state(&before).unwrap();

        // Half of a newer snapshot lands, then the write dies.
        let key = balance_key(EntityId::new(1), &AssetId::NATIVE);
        let outcome: TransactionResult<(), ()> =
            (&db.balances, &db.meta).transaction(|(balances, meta)| {
                balances.insert(key.clone(), 55u128.to_be_bytes().to_vec())?;
                meta.insert(META_COUNTER, 9u64.to_be_bytes().to_vec())?;
                Err(ConflictableTransactionError::Abort(()))
            });
        assert!(matches!(outcome, Err(TransactionError::Abort(()))));

        assert_eq!(db.load_state().unwrap(), Some(before));
    }

    #[test]
    fn concurrent_saves_never_tear() {
        let db = LedgerDb::open_temporary().unwrap();
        let full = sample_state();
        let empty = LedgerState::new();

        std::thread::scope(|scope| {
            for i in 0..4 {
                let db = db.clone();
                let state = if i % 2 == 0 { full.clone() } else { empty.clone() };
                scope.spawn(move || {
                    for _ in 0..10 {
                        db.save_state(&state).unwrap();
                    }
                });
            }
        });

        let loaded = db.load_state().unwrap().unwrap();
        assert!(loaded == full || loaded == empty);
    }

    #[test]
    fn unknown_version_rejected() {
        let db = LedgerDb::open_temporary().unwrap();
        db.meta
            .insert(META_VERSION, 99u32.to_be_bytes().to_vec())
            .unwrap();
        assert!(matches!(
            db.load_state(),
            Err(DbError::VersionMismatch { found: 99, .. })
        ));
    }
}
