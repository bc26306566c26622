//! # Transfer Capability
//!
//! The ledger books balances; it never holds assets. Moving value across the
//! ledger boundary goes through a [`TransferGateway`]:
//!
//! - `transfer_in` pulls a deposit into custody before the ledger credits it;
//! - `settle_out` pays a whole withdrawal batch out of custody.
//!
//! Settlement is **all-or-nothing per batch**. A gateway either moves every
//! line of the batch or none of them and reports why. The withdrawal path
//! relies on this to keep the ledger and custody in lockstep: debits are
//! staged, the batch is settled, and debits are committed only on success.
//!
//! [`CustodyVault`] is the in-memory gateway used by the node and the tests.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::error::{LedgerError, LedgerResult};
use crate::funds::asset::{Amount, AssetId};
use crate::funds::FundsLedger;
use crate::identity::Address;

/// Failures reported by a transfer gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// The gateway refused the transfer outright.
    #[error("transfer rejected: {0}")]
    Rejected(String),

    /// Custody does not hold enough of the asset to pay out.
    #[error("custody reserves for {asset} too low: available {available}, requested {requested}")]
    InsufficientReserves {
        /// Asset being paid out.
        asset: AssetId,
        /// Reserves held.
        available: Amount,
        /// Amount requested across the batch.
        requested: Amount,
    },

    /// The depositor does not hold enough of the token to pull.
    #[error("{holder} holds {available} of {asset}, deposit needs {requested}")]
    InsufficientHolderFunds {
        /// Depositing address.
        holder: Address,
        /// Token being pulled.
        asset: AssetId,
        /// Holder balance.
        available: Amount,
        /// Amount to pull.
        requested: Amount,
    },

    /// Crediting the receiving side would overflow.
    #[error("custody overflow in {0}")]
    Overflow(AssetId),
}

/// One outbound line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Asset to move.
    pub asset: AssetId,
    /// Receiving address.
    pub destination: Address,
    /// Amount to move.
    pub amount: Amount,
}

/// Moves assets across the ledger boundary.
pub trait TransferGateway: Send + Sync {
    /// Pulls `amount` of `asset` from `from` into custody.
    ///
    /// For the native asset the value arrives with the call itself, so the
    /// gateway only books it. For tokens the gateway pulls exactly `amount`
    /// from the holder.
    fn transfer_in(&self, asset: AssetId, from: &Address, amount: Amount) -> Result<(), TransferError>;

    /// Pays out every transfer in `batch`, or none of them.
    fn settle_out(&self, batch: &[Transfer]) -> Result<(), TransferError>;
}

/// Checks that a deposit carries value in the right form.
///
/// A native deposit must attach exactly `amount` of native value. A token
/// deposit must attach none; its value moves through the token pull.
pub fn check_payment_shape(asset: AssetId, amount: Amount, attached_native: Amount) -> LedgerResult<()> {
    let expected = if asset.is_native() { amount } else { 0 };
    if attached_native != expected {
        return Err(LedgerError::PaymentMismatch {
            asset,
            amount,
            attached: attached_native,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CustodyVault
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct VaultState {
    /// What custody holds per asset.
    reserves: HashMap<AssetId, Amount>,
    /// Balances of external addresses, outside the ledger.
    holders: HashMap<(Address, AssetId), Amount>,
    /// Assets whose outbound transfers are refused.
    frozen: HashSet<AssetId>,
}

/// Serializable image of a vault's balances, sorted so equal vaults encode
/// to equal bytes. Freezes are operational and are not captured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodySnapshot {
    /// Reserves per asset.
    pub reserves: Vec<(AssetId, Amount)>,
    /// External holder balances.
    pub holders: Vec<(Address, AssetId, Amount)>,
}

/// In-memory custody.
///
/// Tracks custody reserves plus a simple balance sheet for external holders
/// so token pulls and payouts have somewhere to come from and go to.
///
/// A vault lives next to the ledger it backs. Persist it with
/// [`snapshot`](Self::snapshot) in the same write as the ledger state and
/// rebuild it with [`from_snapshot`](Self::from_snapshot).
#[derive(Debug, Default)]
pub struct CustodyVault {
    state: Mutex<VaultState>,
}

impl CustodyVault {
    /// Creates an empty vault.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a vault from a stored snapshot.
    pub fn from_snapshot(snapshot: CustodySnapshot) -> Self {
        let state = VaultState {
            reserves: snapshot.reserves.into_iter().collect(),
            holders: snapshot
                .holders
                .into_iter()
                .map(|(holder, asset, amount)| ((holder, asset), amount))
                .collect(),
            frozen: HashSet::new(),
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// A vault whose reserves equal the ledger's per-asset totals.
    ///
    /// For ledgers persisted without a custody image. Holder balances
    /// start empty.
    pub fn backed_by(ledger: &FundsLedger) -> Self {
        let mut reserves: HashMap<AssetId, Amount> = HashMap::new();
        for ((_, asset), amount) in ledger.balances() {
            let slot = reserves.entry(*asset).or_insert(0);
            *slot = slot.saturating_add(*amount);
        }
        Self {
            state: Mutex::new(VaultState {
                reserves,
                ..VaultState::default()
            }),
        }
    }

    /// Current reserves and holder balances.
    pub fn snapshot(&self) -> CustodySnapshot {
        let state = self.state.lock();
        let mut reserves: Vec<(AssetId, Amount)> =
            state.reserves.iter().map(|(a, v)| (*a, *v)).collect();
        reserves.sort_unstable();
        let mut holders: Vec<(Address, AssetId, Amount)> = state
            .holders
            .iter()
            .map(|((h, a), v)| (*h, *a, *v))
            .collect();
        holders.sort_unstable_by(|x, y| (x.0.as_bytes(), x.1).cmp(&(y.0.as_bytes(), y.1)));
        CustodySnapshot { reserves, holders }
    }

    /// Assets whose reserves fall short of what `ledger` owes, with the
    /// reserve and the ledger total.
    pub fn shortfalls(&self, ledger: &FundsLedger) -> Vec<(AssetId, Amount, Amount)> {
        let owed = Self::backed_by(ledger).snapshot().reserves;
        let state = self.state.lock();
        owed.into_iter()
            .filter_map(|(asset, total)| {
                let held = state.reserves.get(&asset).copied().unwrap_or(0);
                (held < total).then_some((asset, held, total))
            })
            .collect()
    }

    /// Gives `holder` an external token balance to deposit from.
    pub fn fund_holder(&self, holder: Address, asset: AssetId, amount: Amount) {
        let mut state = self.state.lock();
        let slot = state.holders.entry((holder, asset)).or_insert(0);
        *slot = slot.saturating_add(amount);
    }

    /// External balance of `holder`.
    pub fn holder_balance(&self, holder: &Address, asset: AssetId) -> Amount {
        self.state
            .lock()
            .holders
            .get(&(*holder, asset))
            .copied()
            .unwrap_or(0)
    }

    /// Custody reserves of `asset`.
    pub fn reserves(&self, asset: AssetId) -> Amount {
        self.state.lock().reserves.get(&asset).copied().unwrap_or(0)
    }

    /// Refuses every outbound transfer of `asset` until thawed.
    pub fn freeze(&self, asset: AssetId) {
        self.state.lock().frozen.insert(asset);
    }

    /// Lifts a freeze.
    pub fn thaw(&self, asset: AssetId) {
        self.state.lock().frozen.remove(&asset);
    }
}

impl TransferGateway for CustodyVault {
    fn transfer_in(&self, asset: AssetId, from: &Address, amount: Amount) -> Result<(), TransferError> {
        let mut state = self.state.lock();

        let reserve = state.reserves.get(&asset).copied().unwrap_or(0);
        let new_reserve = reserve
            .checked_add(amount)
            .ok_or(TransferError::Overflow(asset))?;

        if !asset.is_native() {
            let held = state.holders.get(&(*from, asset)).copied().unwrap_or(0);
            if held < amount {
                return Err(TransferError::InsufficientHolderFunds {
                    holder: *from,
                    asset,
                    available: held,
                    requested: amount,
                });
            }
            state.holders.insert((*from, asset), held - amount);
        }

        state.reserves.insert(asset, new_reserve);
        Ok(())
    }

    fn settle_out(&self, batch: &[Transfer]) -> Result<(), TransferError> {
        let mut state = self.state.lock();

        // Validate the whole batch before moving anything.
        let mut needed: HashMap<AssetId, Amount> = HashMap::new();
        for t in batch {
            if state.frozen.contains(&t.asset) {
                return Err(TransferError::Rejected(format!("asset {} is frozen", t.asset)));
            }
            let slot = needed.entry(t.asset).or_insert(0);
            *slot = slot
                .checked_add(t.amount)
                .ok_or(TransferError::Overflow(t.asset))?;
        }
        for (asset, requested) in &needed {
            let available = state.reserves.get(asset).copied().unwrap_or(0);
            if available < *requested {
                return Err(TransferError::InsufficientReserves {
                    asset: *asset,
                    available,
                    requested: *requested,
                });
            }
        }

        for t in batch {
            if let Some(reserve) = state.reserves.get_mut(&t.asset) {
                *reserve -= t.amount;
            }
            let slot = state.holders.entry((t.destination, t.asset)).or_insert(0);
            *slot = slot.saturating_add(t.amount);
        }
        Ok(())
    }
}
