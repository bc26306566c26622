//! # Entity Registry
//!
//! Maps participant addresses to entity records. The registry enforces two
//! invariants:
//!
//! 1. **One entity per address.** A reverse index `address -> id` is the
//!    only way to reach a record, and registration refuses an address that
//!    already has one.
//! 2. **Live entities never hold an empty role set.** Registration and
//!    update share [`EntityRegistry::store`], the single place where roles
//!    are written, and it rejects empty sets.
//!
//! Ids are dense and monotonically increasing. Id 0 belongs to the protocol
//! and is never handed out. Removing an entity clears its record and its
//! index entry but keeps the numeric slot, so ids are never reused.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use super::address::Address;
use super::roles::{RoleKind, RoleSet};
use crate::config::PROTOCOL_ENTITY_ID;
use crate::error::{LedgerError, LedgerResult};
use crate::events::{EventBatch, LedgerEvent};

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// Numeric entity identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// The protocol's own account. Holds fee balances.
    pub const PROTOCOL: EntityId = EntityId(PROTOCOL_ENTITY_ID);

    /// Wraps a raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric id.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns `true` for the reserved protocol id.
    pub fn is_protocol(self) -> bool {
        self == Self::PROTOCOL
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EntityRecord
// ---------------------------------------------------------------------------

/// Stored state of one entity slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Held roles. Empty only for removed (orphaned) slots.
    pub roles: RoleSet,
    /// Opaque descriptive URI.
    pub metadata_uri: String,
}

impl EntityRecord {
    /// Returns `true` if the slot belongs to a registered entity.
    pub fn is_live(&self) -> bool {
        !self.roles.is_empty()
    }
}

/// Public view of a live entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInfo {
    /// The entity's id.
    pub id: EntityId,
    /// Held roles, ascending by index.
    pub roles: Vec<RoleKind>,
    /// Opaque descriptive URI.
    pub metadata_uri: String,
}

// ---------------------------------------------------------------------------
// EntityRegistry
// ---------------------------------------------------------------------------

/// The address -> entity mapping plus every entity slot ever allocated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRegistry {
    /// Last id handed out. Pre-incremented, so the first entity gets 1.
    counter: u64,
    /// Reverse lookup for live entities.
    index: HashMap<Address, EntityId>,
    /// Every allocated slot, live or orphaned.
    records: BTreeMap<EntityId, EntityRecord>,
}

impl EntityRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a registry from persisted parts.
    pub fn from_parts(
        counter: u64,
        index: HashMap<Address, EntityId>,
        records: BTreeMap<EntityId, EntityRecord>,
    ) -> Self {
        Self {
            counter,
            index,
            records,
        }
    }

    /// Registers a new entity for `caller`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::EntityAlreadyExists`] if `caller` already has
    /// an entity, or [`LedgerError::InvalidRoleSet`] if `roles` is empty.
    pub fn register(
        &mut self,
        caller: Address,
        roles: &[RoleKind],
        metadata_uri: &str,
        events: &mut EventBatch,
    ) -> LedgerResult<EntityId> {
        if self.index.contains_key(&caller) {
            return Err(LedgerError::EntityAlreadyExists(caller));
        }

        // Validate before touching the counter so a bad role set leaves no trace.
        let role_set = RoleSet::from_roles(roles)?;

        self.counter += 1;
        let id = EntityId(self.counter);
        self.index.insert(caller, id);

        let record = self.records.entry(id).or_default();
        Self::store(caller, record, role_set, metadata_uri, events);
        Ok(id)
    }

    /// Replaces the roles and metadata of `caller`'s entity.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NoSuchEntity`] if `caller` has no entity, or
    /// [`LedgerError::InvalidRoleSet`] if `roles` is empty.
    pub fn update(
        &mut self,
        caller: Address,
        roles: &[RoleKind],
        metadata_uri: &str,
        events: &mut EventBatch,
    ) -> LedgerResult<EntityId> {
        let id = self.require_id(&caller)?;
        let role_set = RoleSet::from_roles(roles)?;

        let record = self.records.entry(id).or_default();
        Self::store(caller, record, role_set, metadata_uri, events);
        Ok(id)
    }

    /// Removes `caller`'s entity. The id stays allocated as an orphan.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NoSuchEntity`] if `caller` has no entity.
    pub fn remove(&mut self, caller: Address, events: &mut EventBatch) -> LedgerResult<EntityId> {
        let id = self.require_id(&caller)?;

        if let Some(record) = self.records.get_mut(&id) {
            record.roles = RoleSet::EMPTY;
            record.metadata_uri.clear();
        }
        self.index.remove(&caller);

        events.push(LedgerEvent::EntityRemoved {
            entity: id,
            address: caller,
        });
        Ok(id)
    }

    /// Returns the roles and metadata of `address`'s entity.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NoSuchEntity`] if `address` has no entity.
    pub fn get(&self, address: &Address) -> LedgerResult<EntityInfo> {
        let id = self.require_id(address)?;
        self.info(id).ok_or(LedgerError::NoSuchEntity(*address))
    }

    /// Looks up a live entity by id.
    pub fn info(&self, id: EntityId) -> Option<EntityInfo> {
        self.records
            .get(&id)
            .filter(|r| r.is_live())
            .map(|r| EntityInfo {
                id,
                roles: r.roles.to_vec(),
                metadata_uri: r.metadata_uri.clone(),
            })
    }

    /// The id bound to `address`, if any.
    pub fn entity_id(&self, address: &Address) -> Option<EntityId> {
        self.index.get(address).copied()
    }

    /// Returns `true` if `id` is a registered, not removed, entity.
    pub fn is_live(&self, id: EntityId) -> bool {
        self.records.get(&id).map_or(false, EntityRecord::is_live)
    }

    /// Number of live entities.
    pub fn live_count(&self) -> usize {
        self.index.len()
    }

    /// Last id handed out.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Reverse index entries.
    pub fn index(&self) -> &HashMap<Address, EntityId> {
        &self.index
    }

    /// All allocated slots, including orphans.
    pub fn records(&self) -> &BTreeMap<EntityId, EntityRecord> {
        &self.records
    }

    fn require_id(&self, address: &Address) -> LedgerResult<EntityId> {
        self.entity_id(address)
            .ok_or(LedgerError::NoSuchEntity(*address))
    }

    /// Shared write path for register and update.
    fn store(
        subject: Address,
        record: &mut EntityRecord,
        roles: RoleSet,
        metadata_uri: &str,
        events: &mut EventBatch,
    ) {
        record.roles = roles;
        record.metadata_uri = metadata_uri.to_string();

        events.push(LedgerEvent::EntityStored {
            address: subject,
            roles: roles.to_vec(),
            metadata_uri: metadata_uri.to_string(),
        });
    }
}
