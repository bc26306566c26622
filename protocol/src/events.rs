//! # Ledger Events
//!
//! Notifications the ledger emits for the outside world. Delivery is
//! fire-and-forget: the core never reads anything back from a sink.
//!
//! Events are collected into an [`EventBatch`] while an operation runs and
//! handed to the [`EventSink`] only after the operation has committed. A
//! call that fails publishes nothing.
//!
//! Deletion has its own variant, [`LedgerEvent::EntityRemoved`]. Consumers
//! never have to guess whether an empty role list means "removed".

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::funds::asset::{Amount, AssetId};
use crate::identity::{Address, EntityId, RoleKind};

/// Something the ledger did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// An entity was registered or updated.
    EntityStored {
        /// Owner address.
        address: Address,
        /// Roles after the write, ascending.
        roles: Vec<RoleKind>,
        /// Metadata URI after the write.
        metadata_uri: String,
    },
    /// An entity was removed; its id is now orphaned.
    EntityRemoved {
        /// The orphaned id.
        entity: EntityId,
        /// The address that owned it.
        address: Address,
    },
    /// Funds were credited to an entity.
    AvailableFundsIncreased {
        /// Credited entity.
        entity: EntityId,
        /// Credited asset.
        asset: AssetId,
        /// Credited amount.
        amount: Amount,
        /// Who paid.
        depositor: Address,
    },
    /// Funds left the ledger.
    FundsWithdrawn {
        /// Debited entity.
        entity: EntityId,
        /// Where the funds went.
        destination: Address,
        /// Withdrawn asset.
        asset: AssetId,
        /// Withdrawn amount.
        amount: Amount,
        /// Who initiated the withdrawal.
        executor: Address,
    },
    /// A fee moved from an entity to the protocol account.
    FeeRouted {
        /// Paying entity.
        from: EntityId,
        /// Fee asset.
        asset: AssetId,
        /// Fee amount.
        amount: Amount,
    },
}

impl LedgerEvent {
    /// Short name used in logs and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::EntityStored { .. } => "entity_stored",
            LedgerEvent::EntityRemoved { .. } => "entity_removed",
            LedgerEvent::AvailableFundsIncreased { .. } => "available_funds_increased",
            LedgerEvent::FundsWithdrawn { .. } => "funds_withdrawn",
            LedgerEvent::FeeRouted { .. } => "fee_routed",
        }
    }
}

/// A published event with its delivery metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique id of this delivery.
    pub id: Uuid,
    /// Commit time of the operation that produced the event.
    pub committed_at: DateTime<Utc>,
    /// The event itself.
    pub event: LedgerEvent,
}

/// Events buffered by one in-flight operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBatch {
    events: Vec<LedgerEvent>,
}

impl EventBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers an event.
    pub fn push(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }

    /// Number of buffered events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The most recently buffered event.
    pub fn last(&self) -> Option<&LedgerEvent> {
        self.events.last()
    }

    /// Iterates buffered events in emission order.
    pub fn iter(&self) -> impl Iterator<Item = &LedgerEvent> {
        self.events.iter()
    }

    /// Stamps every event with one commit time and fresh ids.
    pub fn seal(self) -> Vec<EventRecord> {
        let committed_at = Utc::now();
        self.events
            .into_iter()
            .map(|event| EventRecord {
                id: Uuid::new_v4(),
                committed_at,
                event,
            })
            .collect()
    }
}

/// Receiver of committed events.
pub trait EventSink: Send + Sync {
    /// Delivers one event. Must not fail back into the ledger.
    fn publish(&self, record: &EventRecord);
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _record: &EventRecord) {}
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct EventLog {
    records: Mutex<Vec<EventRecord>>,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every event received so far.
    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().clone()
    }

    /// Snapshot of the bare events, without delivery metadata.
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.records.lock().iter().map(|r| r.event.clone()).collect()
    }

    /// Number of events received.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns `true` if nothing was received.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl EventSink for EventLog {
    fn publish(&self, record: &EventRecord) {
        self.records.lock().push(record.clone());
    }
}
