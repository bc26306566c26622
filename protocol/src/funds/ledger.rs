//! # Funds Ledger
//!
//! Available balances per `(entity, asset)`, plus an ordered list of the
//! assets each entity has ever been credited with.
//!
//! ## Invariants
//!
//! - Balances never go negative: a debit larger than the balance fails and
//!   changes nothing.
//! - Conservation: for every `(entity, asset)`, the balance equals the sum of
//!   credits minus the sum of successful debits.
//! - The asset list is append-only. The first credit of an asset appends it;
//!   draining a balance to zero leaves the entry in place. A zero entry in the
//!   list therefore means "held at some point", not "held now".
//!
//! Pagination reads the live list. Nothing pins a snapshot between two page
//! requests, so an append between them can shift what an offset addresses.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::asset::{Amount, AssetId};
use crate::error::{LedgerError, LedgerResult};
use crate::events::{EventBatch, LedgerEvent};
use crate::identity::{Address, EntityId};

/// Balance book for every entity and asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundsLedger {
    /// Recorded balances. An entry exists once the pair has been credited.
    balances: HashMap<(EntityId, AssetId), Amount>,
    /// Discoverable assets per entity, in first-credit order.
    assets: HashMap<EntityId, Vec<AssetId>>,
}

impl FundsLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a ledger from persisted parts.
    pub fn from_parts(
        balances: HashMap<(EntityId, AssetId), Amount>,
        assets: HashMap<EntityId, Vec<AssetId>>,
    ) -> Self {
        Self { balances, assets }
    }

    /// Credits `amount` of `asset` to `entity` and returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ZeroAmount`] for a zero credit and
    /// [`LedgerError::Overflow`] if the balance would exceed `u128::MAX`.
    pub fn credit(
        &mut self,
        entity: EntityId,
        asset: AssetId,
        amount: Amount,
        depositor: Address,
        events: &mut EventBatch,
    ) -> LedgerResult<Amount> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }

        let new_balance = self.apply_credit(entity, asset, amount)?;

        events.push(LedgerEvent::AvailableFundsIncreased {
            entity,
            asset,
            amount,
            depositor,
        });
        Ok(new_balance)
    }

    /// Debits `amount` of `asset` from `entity` and returns the new balance.
    ///
    /// The balance may reach exactly zero; the asset stays listed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientFunds`] if `amount` exceeds the
    /// recorded balance. The balance is left untouched.
    pub fn debit(&mut self, entity: EntityId, asset: AssetId, amount: Amount) -> LedgerResult<Amount> {
        let available = self.balance_of(entity, asset);
        if amount > available {
            return Err(LedgerError::InsufficientFunds {
                entity,
                asset,
                available,
                requested: amount,
            });
        }
        if amount == 0 {
            return Ok(available);
        }

        let remaining = available - amount;
        self.balances.insert((entity, asset), remaining);
        Ok(remaining)
    }

    /// Moves `amount` between two entities without leaving the ledger.
    ///
    /// Both legs are validated before either is applied.
    pub fn move_funds(
        &mut self,
        from: EntityId,
        to: EntityId,
        asset: AssetId,
        amount: Amount,
    ) -> LedgerResult<()> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        if from == to {
            // Still enforce availability so self-moves cannot mask a shortfall.
            self.ensure_available(from, asset, amount)?;
            return Ok(());
        }

        self.ensure_available(from, asset, amount)?;
        self.balance_of(to, asset)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow { entity: to, asset })?;

        self.debit(from, asset, amount)?;
        self.apply_credit(to, asset, amount)?;
        Ok(())
    }

    /// Fails with [`LedgerError::InsufficientFunds`] unless `amount` is
    /// covered by the current balance.
    pub fn ensure_available(&self, entity: EntityId, asset: AssetId, amount: Amount) -> LedgerResult<()> {
        let available = self.balance_of(entity, asset);
        if amount > available {
            return Err(LedgerError::InsufficientFunds {
                entity,
                asset,
                available,
                requested: amount,
            });
        }
        Ok(())
    }

    /// Recorded balance; zero if never credited.
    pub fn balance_of(&self, entity: EntityId, asset: AssetId) -> Amount {
        self.balances.get(&(entity, asset)).copied().unwrap_or(0)
    }

    /// Every asset ever credited to `entity`, in first-credit order.
    pub fn list_assets(&self, entity: EntityId) -> &[AssetId] {
        self.assets.get(&entity).map(Vec::as_slice).unwrap_or(&[])
    }

    /// A window of [`list_assets`](Self::list_assets).
    ///
    /// Returns nothing when `offset` is past the end and clamps the window
    /// to the entries that exist; never an error.
    pub fn list_assets_paginated(&self, entity: EntityId, limit: usize, offset: usize) -> Vec<AssetId> {
        let all = self.list_assets(entity);
        if offset >= all.len() {
            return Vec::new();
        }
        let end = offset.saturating_add(limit).min(all.len());
        all[offset..end].to_vec()
    }

    /// Sum of every entity's balance in `asset`.
    pub fn total_of(&self, asset: AssetId) -> Amount {
        self.balances
            .iter()
            .filter(|((_, a), _)| *a == asset)
            .fold(0u128, |acc, (_, v)| acc.saturating_add(*v))
    }

    /// All recorded balances.
    pub fn balances(&self) -> &HashMap<(EntityId, AssetId), Amount> {
        &self.balances
    }

    /// All asset lists.
    pub fn asset_lists(&self) -> &HashMap<EntityId, Vec<AssetId>> {
        &self.assets
    }

    fn apply_credit(&mut self, entity: EntityId, asset: AssetId, amount: Amount) -> LedgerResult<Amount> {
        let current = self.balances.get(&(entity, asset)).copied();
        let new_balance = current
            .unwrap_or(0)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow { entity, asset })?;

        if current.is_none() {
            self.assets.entry(entity).or_default().push(asset);
        }
        self.balances.insert((entity, asset), new_balance);
        Ok(new_balance)
    }
}
