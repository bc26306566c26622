//! # Ledger Errors
//!
//! One error enum for every operation the ledger exposes. Each variant is a
//! named condition a caller can match on; none of them is recovered from
//! inside the core. When an operation returns an error, its whole effect
//! set has been discarded.

use thiserror::Error;

use crate::access::Region;
use crate::funds::asset::{Amount, AssetId};
use crate::identity::{Address, EntityId};
use crate::transfer::TransferError;

/// Result alias used throughout the crate.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors surfaced by registry, ledger and withdrawal operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The caller already owns a registered entity.
    #[error("entity already exists for {0}")]
    EntityAlreadyExists(Address),

    /// No live entity is bound to the given address.
    #[error("no entity registered for {0}")]
    NoSuchEntity(Address),

    /// No live entity carries the given id.
    #[error("no live entity with id {0}")]
    UnknownEntityId(EntityId),

    /// A role set was empty (or decoded to nothing).
    #[error("role set must contain at least one role")]
    InvalidRoleSet,

    /// The governance gate has paused the region this operation belongs to.
    #[error("region {0} is paused")]
    RegionPaused(Region),

    /// A ledger credit of zero was requested.
    #[error("zero-amount credits are not permitted")]
    ZeroAmount,

    /// A deposit of zero was requested.
    #[error("zero-amount deposits are not permitted")]
    ZeroDepositNotAllowed,

    /// The attached native value does not match the deposit shape.
    #[error("payment mismatch for {asset}: amount {amount}, attached native value {attached}")]
    PaymentMismatch {
        /// Asset being deposited.
        asset: AssetId,
        /// Declared deposit amount.
        amount: Amount,
        /// Native value carried by the call.
        attached: Amount,
    },

    /// Token and amount lists differ in length.
    #[error("array length mismatch: {tokens} tokens, {amounts} amounts")]
    ArrayLengthMismatch {
        /// Number of tokens supplied.
        tokens: usize,
        /// Number of amounts supplied.
        amounts: usize,
    },

    /// The withdrawal destination is not a treasury wallet of the entity.
    #[error("{destination} is not a treasury wallet of entity {entity}")]
    NotEntityTreasury {
        /// Entity being withdrawn from.
        entity: EntityId,
        /// Requested destination.
        destination: Address,
    },

    /// The caller is not an assistant wallet of the entity.
    #[error("{caller} is not an assistant wallet of entity {entity}")]
    NotEntityAssistant {
        /// Entity being withdrawn from.
        entity: EntityId,
        /// Calling address.
        caller: Address,
    },

    /// The withdrawal resolved to nothing to move.
    #[error("nothing to withdraw for entity {0}")]
    NothingToWithdraw(EntityId),

    /// A debit exceeds the recorded balance.
    #[error("insufficient funds for entity {entity} in {asset}: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Entity being debited.
        entity: EntityId,
        /// Asset being debited.
        asset: AssetId,
        /// Recorded balance.
        available: Amount,
        /// Requested debit.
        requested: Amount,
    },

    /// Arithmetic overflow while crediting.
    ///
    /// If you're hitting this, someone is crediting more than `u128::MAX`
    /// base units. That's either a bug or an attack.
    #[error("balance overflow for entity {entity} in {asset}")]
    Overflow {
        /// Entity being credited.
        entity: EntityId,
        /// Asset being credited.
        asset: AssetId,
    },

    /// The external transfer capability reported failure.
    #[error("transfer failed: {0}")]
    TransferFailed(#[from] TransferError),

    /// The caller lacks the global fee-collector capability.
    #[error("{0} is not authorized to collect protocol fees")]
    Unauthorized(Address),
}

impl LedgerError {
    /// Stable, machine-readable name of the error kind.
    ///
    /// Used by operator surfaces (HTTP bodies, metrics labels) so clients
    /// can branch on the kind without parsing display strings.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::EntityAlreadyExists(_) => "EntityAlreadyExists",
            LedgerError::NoSuchEntity(_) | LedgerError::UnknownEntityId(_) => "NoSuchEntity",
            LedgerError::InvalidRoleSet => "InvalidRoleSet",
            LedgerError::RegionPaused(_) => "RegionPaused",
            LedgerError::ZeroAmount => "ZeroAmount",
            LedgerError::ZeroDepositNotAllowed => "ZeroDepositNotAllowed",
            LedgerError::PaymentMismatch { .. } => "PaymentMismatch",
            LedgerError::ArrayLengthMismatch { .. } => "ArrayLengthMismatch",
            LedgerError::NotEntityTreasury { .. } => "NotEntityTreasury",
            LedgerError::NotEntityAssistant { .. } => "NotEntityAssistant",
            LedgerError::NothingToWithdraw(_) => "NothingToWithdraw",
            LedgerError::InsufficientFunds { .. } => "InsufficientFunds",
            LedgerError::Overflow { .. } => "Overflow",
            LedgerError::TransferFailed(_) => "TransferFailed",
            LedgerError::Unauthorized(_) => "Unauthorized",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_id_reports_as_no_such_entity() {
        assert_eq!(
            LedgerError::UnknownEntityId(EntityId::new(7)).kind(),
            "NoSuchEntity"
        );
    }

    #[test]
    fn transfer_error_converts() {
        let err: LedgerError = TransferError::Rejected("custody offline".into()).into();
        assert_eq!(err.kind(), "TransferFailed");
        assert!(err.to_string().contains("custody offline"));
    }
}
