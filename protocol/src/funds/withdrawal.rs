//! # Withdrawal Orchestration
//!
//! A withdrawal runs through a fixed pipeline and stops at the first failure:
//!
//! ```text
//! authorize -> check shape -> resolve lines -> stage -> settle -> commit
//! ```
//!
//! Staging is the important part. Nothing is debited while the external
//! transfer is outstanding. [`WithdrawalPlan::stage`] validates every line
//! against the current balances (aggregating repeated assets, so
//! `[native, native]` cannot spend the same balance twice), the batch is
//! settled through the gateway, and only then does
//! [`WithdrawalPlan::commit`] apply the debits. A gateway failure leaves the
//! ledger exactly as it was.
//!
//! ## Sweep Mode
//!
//! Empty token and amount lists mean "withdraw everything". The sweep walks
//! the entity's asset list and skips stale zero-balance entries, so no
//! zero-amount transfer is ever attempted. A sweep with nothing non-zero to
//! move fails with [`LedgerError::NothingToWithdraw`].

use std::collections::BTreeMap;

use super::asset::{Amount, AssetId};
use super::ledger::FundsLedger;
use crate::error::{LedgerError, LedgerResult};
use crate::events::{EventBatch, LedgerEvent};
use crate::identity::{Address, EntityId, WalletKind, WalletRoleResolver};
use crate::transfer::{Transfer, TransferGateway};

/// Checks the two-wallet rule for an entity-initiated withdrawal.
///
/// `destination` must be an entity-wide Treasury wallet and `caller` an
/// Assistant wallet of `entity`. The treasury check runs first.
pub fn authorize<R: WalletRoleResolver + ?Sized>(
    resolver: &R,
    entity: EntityId,
    destination: &Address,
    caller: &Address,
) -> LedgerResult<()> {
    if !resolver.has_wallet_role(entity, destination, None, WalletKind::Treasury, true) {
        return Err(LedgerError::NotEntityTreasury {
            entity,
            destination: *destination,
        });
    }
    if !resolver.has_wallet_role(entity, caller, None, WalletKind::Assistant, true) {
        return Err(LedgerError::NotEntityAssistant {
            entity,
            caller: *caller,
        });
    }
    Ok(())
}

/// Rejects token and amount lists of different lengths.
pub fn check_shape(tokens: &[AssetId], amounts: &[Amount]) -> LedgerResult<()> {
    if tokens.len() != amounts.len() {
        return Err(LedgerError::ArrayLengthMismatch {
            tokens: tokens.len(),
            amounts: amounts.len(),
        });
    }
    Ok(())
}

/// Turns a request into concrete `(asset, amount)` lines.
///
/// Explicit mode keeps the caller's order and fails on any zero amount.
/// Sweep mode (both lists empty) takes every non-zero listed balance.
pub fn resolve_lines(
    ledger: &FundsLedger,
    entity: EntityId,
    tokens: &[AssetId],
    amounts: &[Amount],
) -> LedgerResult<Vec<(AssetId, Amount)>> {
    check_shape(tokens, amounts)?;

    if !tokens.is_empty() {
        if amounts.iter().any(|a| *a == 0) {
            return Err(LedgerError::NothingToWithdraw(entity));
        }
        return Ok(tokens.iter().copied().zip(amounts.iter().copied()).collect());
    }

    let lines: Vec<(AssetId, Amount)> = ledger
        .list_assets(entity)
        .iter()
        .map(|asset| (*asset, ledger.balance_of(entity, *asset)))
        .filter(|(_, balance)| *balance > 0)
        .collect();

    if lines.is_empty() {
        return Err(LedgerError::NothingToWithdraw(entity));
    }
    Ok(lines)
}

/// A validated withdrawal waiting for settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalPlan {
    entity: EntityId,
    destination: Address,
    executor: Address,
    lines: Vec<(AssetId, Amount)>,
    debits: BTreeMap<AssetId, Amount>,
}

impl WithdrawalPlan {
    /// Validates `lines` against the entity's balances without debiting.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InsufficientFunds`] if the total requested for any
    /// asset exceeds its balance, [`LedgerError::Overflow`] if that total
    /// does not fit in an [`Amount`].
    pub fn stage(
        ledger: &FundsLedger,
        entity: EntityId,
        destination: Address,
        executor: Address,
        lines: Vec<(AssetId, Amount)>,
    ) -> LedgerResult<Self> {
        let mut debits: BTreeMap<AssetId, Amount> = BTreeMap::new();
        for (asset, amount) in &lines {
            let slot = debits.entry(*asset).or_insert(0);
            *slot = slot
                .checked_add(*amount)
                .ok_or(LedgerError::Overflow { entity, asset: *asset })?;
        }
        for (asset, total) in &debits {
            ledger.ensure_available(entity, *asset, *total)?;
        }

        Ok(Self {
            entity,
            destination,
            executor,
            lines,
            debits,
        })
    }

    /// Entity being withdrawn from.
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// Line items in request order.
    pub fn lines(&self) -> &[(AssetId, Amount)] {
        &self.lines
    }

    /// Outbound batch for the gateway.
    pub fn transfers(&self) -> Vec<Transfer> {
        self.lines
            .iter()
            .map(|(asset, amount)| Transfer {
                asset: *asset,
                destination: self.destination,
                amount: *amount,
            })
            .collect()
    }

    /// Applies the staged debits and records one event per line.
    ///
    /// Must only run after the batch settled. The ledger must not have
    /// changed since [`stage`](Self::stage).
    pub fn commit(self, ledger: &mut FundsLedger, events: &mut EventBatch) -> LedgerResult<()> {
        for (asset, total) in &self.debits {
            ledger.debit(self.entity, *asset, *total)?;
        }
        for (asset, amount) in self.lines {
            events.push(LedgerEvent::FundsWithdrawn {
                entity: self.entity,
                destination: self.destination,
                asset,
                amount,
                executor: self.executor,
            });
        }
        Ok(())
    }
}

/// One withdrawal as submitted by a caller.
#[derive(Debug, Clone, Copy)]
pub struct WithdrawalRequest<'a> {
    /// Entity whose balances are debited.
    pub entity: EntityId,
    /// Where the funds go.
    pub destination: Address,
    /// Who initiated the withdrawal.
    pub executor: Address,
    /// Explicit assets, or empty for a sweep.
    pub tokens: &'a [AssetId],
    /// Explicit amounts, parallel to `tokens`.
    pub amounts: &'a [Amount],
}

/// Resolves, stages, settles and commits one withdrawal.
///
/// Authorization is the caller's job; this covers steps two onward.
pub fn execute<G: TransferGateway + ?Sized>(
    ledger: &mut FundsLedger,
    gateway: &G,
    request: &WithdrawalRequest<'_>,
    events: &mut EventBatch,
) -> LedgerResult<Vec<(AssetId, Amount)>> {
    let entity = request.entity;
    let lines = resolve_lines(ledger, entity, request.tokens, request.amounts)?;
    let plan = WithdrawalPlan::stage(ledger, entity, request.destination, request.executor, lines)?;

    if let Err(err) = gateway.settle_out(&plan.transfers()) {
        tracing::warn!(
            %entity,
            destination = %request.destination,
            error = %err,
            "settlement failed; withdrawal discarded"
        );
        return Err(err.into());
    }

    let lines = plan.lines().to_vec();
    plan.commit(ledger, events)?;
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::WalletBook;
    use crate::transfer::{CustodyVault, TransferError};

    fn e() -> EntityId {
        EntityId::new(1)
    }

    fn treasury() -> Address {
        Address::derive(b"treasury")
    }

    fn assistant() -> Address {
        Address::derive(b"assistant")
    }

    fn usd() -> AssetId {
        AssetId::derive("nUSD", "issuer")
    }

    fn funded(native: Amount, tokens: Amount) -> (FundsLedger, CustodyVault) {
        let mut ledger = FundsLedger::new();
        let vault = CustodyVault::new();
        let payer = Address::derive(b"payer");
        let mut events = EventBatch::new();
        if native > 0 {
            ledger.credit(e(), AssetId::NATIVE, native, payer, &mut events).unwrap();
            vault.transfer_in(AssetId::NATIVE, &payer, native).unwrap();
        }
        if tokens > 0 {
            ledger.credit(e(), usd(), tokens, payer, &mut events).unwrap();
            vault.fund_holder(payer, usd(), tokens);
            vault.transfer_in(usd(), &payer, tokens).unwrap();
        }
        (ledger, vault)
    }

    #[test]
    fn authorize_checks_treasury_then_assistant() {
        let mut book = WalletBook::new();
        let err = authorize(&book, e(), &treasury(), &assistant()).unwrap_err();
        assert!(matches!(err, LedgerError::NotEntityTreasury { .. }));

        book.assign(e(), None, WalletKind::Treasury, treasury());
        let err = authorize(&book, e(), &treasury(), &assistant()).unwrap_err();
        assert!(matches!(err, LedgerError::NotEntityAssistant { .. }));

        book.assign(e(), None, WalletKind::Assistant, assistant());
        assert!(authorize(&book, e(), &treasury(), &assistant()).is_ok());
    }

    #[test]
    fn mismatched_lists_rejected() {
        let ledger = FundsLedger::new();
        let err = resolve_lines(&ledger, e(), &[AssetId::NATIVE], &[]).unwrap_err();
        assert_eq!(err, LedgerError::ArrayLengthMismatch { tokens: 1, amounts: 0 });
    }

    #[test]
    fn explicit_zero_amount_is_nothing_to_withdraw() {
        let (ledger, _) = funded(100, 0);
        let err = resolve_lines(&ledger, e(), &[AssetId::NATIVE], &[0]).unwrap_err();
        assert_eq!(err, LedgerError::NothingToWithdraw(e()));
    }

    #[test]
    fn sweep_of_empty_list_is_nothing_to_withdraw() {
        let ledger = FundsLedger::new();
        assert_eq!(
            resolve_lines(&ledger, e(), &[], &[]).unwrap_err(),
            LedgerError::NothingToWithdraw(e())
        );
    }

    #[test]
    fn sweep_skips_zero_balances() {
        let (mut ledger, _) = funded(100, 20);
        ledger.debit(e(), AssetId::NATIVE, 100).unwrap();
        let lines = resolve_lines(&ledger, e(), &[], &[]).unwrap();
        assert_eq!(lines, vec![(usd(), 20)]);

        ledger.debit(e(), usd(), 20).unwrap();
        assert_eq!(
            resolve_lines(&ledger, e(), &[], &[]).unwrap_err(),
            LedgerError::NothingToWithdraw(e())
        );
    }

    #[test]
    fn repeated_assets_are_aggregated_when_staging() {
        let (ledger, _) = funded(100, 0);
        let lines = vec![(AssetId::NATIVE, 60), (AssetId::NATIVE, 60)];
        let err = WithdrawalPlan::stage(&ledger, e(), treasury(), assistant(), lines).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { requested: 120, .. }));
    }

    #[test]
    fn aggregate_past_amount_max_is_overflow() {
        let (ledger, _) = funded(100, 0);
        let lines = vec![(AssetId::NATIVE, Amount::MAX), (AssetId::NATIVE, 1)];
        let err = WithdrawalPlan::stage(&ledger, e(), treasury(), assistant(), lines).unwrap_err();
        assert_eq!(
            err,
            LedgerError::Overflow {
                entity: e(),
                asset: AssetId::NATIVE
            }
        );
    }

    #[test]
    fn execute_debits_and_emits_per_line() {
        let (mut ledger, vault) = funded(100, 0);
        let mut events = EventBatch::new();
        let request = WithdrawalRequest {
            entity: e(),
            destination: treasury(),
            executor: assistant(),
            tokens: &[AssetId::NATIVE],
            amounts: &[40],
        };
        execute(&mut ledger, &vault, &request, &mut events).unwrap();

        assert_eq!(ledger.balance_of(e(), AssetId::NATIVE), 60);
        assert_eq!(vault.holder_balance(&treasury(), AssetId::NATIVE), 40);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn settlement_failure_leaves_every_balance_untouched() {
        let (mut ledger, vault) = funded(100, 50);
        vault.freeze(usd());
        let mut events = EventBatch::new();

        let tokens = [AssetId::NATIVE, usd()];
        let request = WithdrawalRequest {
            entity: e(),
            destination: treasury(),
            executor: assistant(),
            tokens: &tokens,
            amounts: &[10, 10],
        };
        let err = execute(&mut ledger, &vault, &request, &mut events).unwrap_err();

        assert!(matches!(err, LedgerError::TransferFailed(TransferError::Rejected(_))));
        assert_eq!(ledger.balance_of(e(), AssetId::NATIVE), 100);
        assert_eq!(ledger.balance_of(e(), usd()), 50);
        assert!(events.is_empty());
    }
}
