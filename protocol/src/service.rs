//! # Ledger Service
//!
//! The entry point for every externally triggered operation. A
//! [`LedgerService`] owns the [`LedgerState`] and the collaborators the core
//! consults but does not implement: the pause gate, the global capability
//! check, the transfer gateway and the event sink.
//!
//! ## Atomicity
//!
//! Each public operation is one unit of work:
//!
//! 1. The state lock is taken for the whole call, so no two operations
//!    interleave their reads and writes.
//! 2. Every precondition is checked before the first mutation. Where an
//!    external effect sits in the middle (deposits pull funds, withdrawals
//!    settle a batch), everything that could fail afterwards is checked
//!    before the external call.
//! 3. Events are buffered and published only after the call succeeded.
//!
//! A failed call leaves balances, asset lists and the registry exactly as
//! they were, and publishes nothing.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::access::{AccessControl, GlobalRole, PauseGate, Region};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::events::{EventBatch, EventSink, LedgerEvent};
use crate::funds::withdrawal::{self, WithdrawalRequest};
use crate::funds::{Amount, AssetId};
use crate::identity::{Address, EntityId, EntityInfo, RoleKind, WalletKind};
use crate::storage::LedgerState;
use crate::transfer::{check_payment_shape, TransferGateway};

/// External collaborators of a ledger.
#[derive(Clone)]
pub struct Collaborators {
    /// Region pause flags.
    pub pause: Arc<dyn PauseGate>,
    /// Global capability checks.
    pub access: Arc<dyn AccessControl>,
    /// Custody and transfers.
    pub gateway: Arc<dyn TransferGateway>,
    /// Receiver of committed events.
    pub sink: Arc<dyn EventSink>,
}

/// Thread-safe handle to one ledger.
pub struct LedgerService {
    state: Mutex<LedgerState>,
    collaborators: Collaborators,
    config: LedgerConfig,
}

impl LedgerService {
    /// Creates a service over existing state.
    pub fn new(config: LedgerConfig, state: LedgerState, collaborators: Collaborators) -> Self {
        Self {
            state: Mutex::new(state),
            collaborators,
            config,
        }
    }

    /// Deployment configuration.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // -- Entities -----------------------------------------------------------

    /// Registers an entity for `caller`.
    pub fn register(&self, caller: Address, roles: &[RoleKind], metadata_uri: &str) -> LedgerResult<EntityId> {
        self.ensure_active(Region::Entities)?;
        let id = self.commit(|state, events| state.registry.register(caller, roles, metadata_uri, events))?;
        tracing::debug!(%caller, entity = %id, "entity registered");
        Ok(id)
    }

    /// Replaces roles and metadata of `caller`'s entity.
    pub fn update(&self, caller: Address, roles: &[RoleKind], metadata_uri: &str) -> LedgerResult<EntityId> {
        self.ensure_active(Region::Entities)?;
        let id = self.commit(|state, events| state.registry.update(caller, roles, metadata_uri, events))?;
        tracing::debug!(%caller, entity = %id, "entity updated");
        Ok(id)
    }

    /// Removes `caller`'s entity.
    ///
    /// Balances and wallet assignments stay where they are; the entity's
    /// treasury and assistant wallets can still withdraw them.
    pub fn remove(&self, caller: Address) -> LedgerResult<EntityId> {
        self.ensure_active(Region::Entities)?;
        let id = self.commit(|state, events| state.registry.remove(caller, events))?;
        tracing::debug!(%caller, entity = %id, "entity removed");
        Ok(id)
    }

    /// Roles and metadata of `address`'s entity.
    pub fn get_entity(&self, address: &Address) -> LedgerResult<EntityInfo> {
        self.state.lock().registry.get(address)
    }

    /// Looks up a live entity by id.
    pub fn entity_by_id(&self, id: EntityId) -> LedgerResult<EntityInfo> {
        self.state
            .lock()
            .registry
            .info(id)
            .ok_or(LedgerError::UnknownEntityId(id))
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.state.lock().registry.live_count()
    }

    // -- Wallets ------------------------------------------------------------

    /// Assigns a wallet of `caller`'s entity. Returns `false` if it already
    /// held the assignment.
    pub fn assign_wallet(
        &self,
        caller: Address,
        scope: Option<RoleKind>,
        kind: WalletKind,
        wallet: Address,
    ) -> LedgerResult<bool> {
        self.ensure_active(Region::Entities)?;
        let mut state = self.state.lock();
        let entity = owned_entity(&state, &caller)?;
        let changed = state.wallets.assign(entity, scope, kind, wallet);
        tracing::debug!(%entity, %wallet, %kind, changed, "wallet assigned");
        Ok(changed)
    }

    /// Revokes a wallet of `caller`'s entity. Returns `false` if it was not
    /// assigned.
    pub fn revoke_wallet(
        &self,
        caller: Address,
        scope: Option<RoleKind>,
        kind: WalletKind,
        wallet: &Address,
    ) -> LedgerResult<bool> {
        self.ensure_active(Region::Entities)?;
        let mut state = self.state.lock();
        let entity = owned_entity(&state, &caller)?;
        let changed = state.wallets.revoke(entity, scope, kind, wallet);
        tracing::debug!(%entity, %wallet, %kind, changed, "wallet revoked");
        Ok(changed)
    }

    /// Wallets assigned to `entity` under an exact scope and kind.
    pub fn wallets(&self, entity: EntityId, scope: Option<RoleKind>, kind: WalletKind) -> Vec<Address> {
        self.state.lock().wallets.wallets(entity, scope, kind)
    }

    // -- Funds --------------------------------------------------------------

    /// Deposits `amount` of `asset` for `entity` and returns the new balance.
    ///
    /// `attached_native` is the native value carried by the call. Entity id
    /// 0 accepts deposits on behalf of the protocol.
    pub fn deposit(
        &self,
        depositor: Address,
        entity: EntityId,
        asset: AssetId,
        amount: Amount,
        attached_native: Amount,
    ) -> LedgerResult<Amount> {
        self.ensure_active(Region::Funds)?;
        if amount == 0 {
            return Err(LedgerError::ZeroDepositNotAllowed);
        }

        let balance = self.commit(|state, events| {
            if !entity.is_protocol() && !state.registry.is_live(entity) {
                return Err(LedgerError::UnknownEntityId(entity));
            }
            check_payment_shape(asset, amount, attached_native)?;

            // The pull below is external; nothing after it may fail.
            state
                .ledger
                .balance_of(entity, asset)
                .checked_add(amount)
                .ok_or(LedgerError::Overflow { entity, asset })?;

            self.collaborators
                .gateway
                .transfer_in(asset, &depositor, amount)?;
            state.ledger.credit(entity, asset, amount, depositor, events)
        })?;
        tracing::debug!(%entity, %asset, amount, balance, "deposit credited");
        Ok(balance)
    }

    /// Withdraws from `entity` to `destination` on behalf of `caller`.
    ///
    /// `destination` must be a treasury wallet and `caller` an assistant
    /// wallet of the entity. Empty lists sweep every non-zero balance.
    /// Returns the line items actually transferred.
    pub fn withdraw(
        &self,
        caller: Address,
        entity: EntityId,
        destination: Address,
        tokens: &[AssetId],
        amounts: &[Amount],
    ) -> LedgerResult<Vec<(AssetId, Amount)>> {
        self.ensure_active(Region::Funds)?;
        let request = WithdrawalRequest {
            entity,
            destination,
            executor: caller,
            tokens,
            amounts,
        };

        let result = self.commit(|state, events| {
            withdrawal::authorize(&state.wallets, entity, &destination, &caller)?;
            withdrawal::execute(&mut state.ledger, self.collaborators.gateway.as_ref(), &request, events)
        });
        match &result {
            Ok(lines) => tracing::debug!(%entity, %destination, lines = lines.len(), "withdrawal settled"),
            Err(err) => tracing::warn!(%entity, %caller, error = %err, "withdrawal rejected"),
        }
        result
    }

    /// Withdraws protocol-owned balances to the configured fee treasury.
    ///
    /// Requires the fee-collector capability. The destination is never
    /// chosen by the caller.
    pub fn withdraw_protocol_fees(
        &self,
        caller: Address,
        tokens: &[AssetId],
        amounts: &[Amount],
    ) -> LedgerResult<Vec<(AssetId, Amount)>> {
        self.ensure_active(Region::Funds)?;
        if !self
            .collaborators
            .access
            .has_role(GlobalRole::FeeCollector, &caller)
        {
            tracing::warn!(%caller, "fee withdrawal by non-collector refused");
            return Err(LedgerError::Unauthorized(caller));
        }

        let request = WithdrawalRequest {
            entity: EntityId::PROTOCOL,
            destination: self.config.fee_treasury,
            executor: caller,
            tokens,
            amounts,
        };

        let result = self.commit(|state, events| {
            withdrawal::execute(&mut state.ledger, self.collaborators.gateway.as_ref(), &request, events)
        });
        match &result {
            Ok(lines) => tracing::debug!(%caller, lines = lines.len(), "protocol fees collected"),
            Err(err) => tracing::warn!(%caller, error = %err, "fee withdrawal rejected"),
        }
        result
    }

    /// Moves `amount` of `entity`'s balance to the protocol account.
    pub fn route_fee(&self, entity: EntityId, asset: AssetId, amount: Amount) -> LedgerResult<()> {
        self.ensure_active(Region::Funds)?;
        self.commit(|state, events| {
            state
                .ledger
                .move_funds(entity, EntityId::PROTOCOL, asset, amount)?;
            events.push(LedgerEvent::FeeRouted {
                from: entity,
                asset,
                amount,
            });
            Ok(())
        })?;
        tracing::debug!(%entity, %asset, amount, "fee routed");
        Ok(())
    }

    /// Recorded balance of `entity` in `asset`.
    pub fn balance_of(&self, entity: EntityId, asset: AssetId) -> Amount {
        self.state.lock().ledger.balance_of(entity, asset)
    }

    /// Every asset ever credited to `entity`.
    pub fn list_assets(&self, entity: EntityId) -> Vec<AssetId> {
        self.state.lock().ledger.list_assets(entity).to_vec()
    }

    /// A window of [`list_assets`](Self::list_assets).
    pub fn list_assets_paginated(&self, entity: EntityId, limit: usize, offset: usize) -> Vec<AssetId> {
        self.state
            .lock()
            .ledger
            .list_assets_paginated(entity, limit, offset)
    }

    // -- State --------------------------------------------------------------

    /// Merkle root of the current state.
    pub fn state_root(&self) -> [u8; 32] {
        self.state.lock().state_root()
    }

    /// Runs `f` against a consistent view of the state.
    ///
    /// The state lock is held while `f` runs, so keep it short.
    pub fn with_state<R>(&self, f: impl FnOnce(&LedgerState) -> R) -> R {
        f(&self.state.lock())
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> LedgerState {
        self.state.lock().clone()
    }

    // -- Internals ----------------------------------------------------------

    fn ensure_active(&self, region: Region) -> LedgerResult<()> {
        if self.collaborators.pause.is_paused(region) {
            return Err(LedgerError::RegionPaused(region));
        }
        Ok(())
    }

    /// Runs one operation under the state lock and publishes its events if
    /// it succeeded.
    fn commit<T>(
        &self,
        op: impl FnOnce(&mut LedgerState, &mut EventBatch) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let mut state = self.state.lock();
        let mut events = EventBatch::new();
        let out = op(&mut state, &mut events)?;

        // Published under the lock so sinks observe commit order.
        for record in events.seal() {
            self.collaborators.sink.publish(&record);
        }
        Ok(out)
    }
}

fn owned_entity(state: &LedgerState, caller: &Address) -> LedgerResult<EntityId> {
    state
        .registry
        .entity_id(caller)
        .ok_or(LedgerError::NoSuchEntity(*caller))
}
