//! # Funds Module
//!
//! Per-entity, per-asset balance accounting.
//!
//! - [`asset`]: asset identifiers and the [`Amount`] type.
//! - [`ledger`]: the balance book: credit, debit, listing and pagination.
//! - [`withdrawal`]: the staged withdrawal pipeline that keeps the ledger
//!   and external custody in sync.
//!
//! Money in equals money out. Every balance equals its credits minus its
//! successful debits, a debit can never drive a balance below zero, and a
//! withdrawal either moves every line it names or none of them.

pub mod asset;
pub mod ledger;
pub mod withdrawal;

pub use asset::{Amount, AssetId};
pub use ledger::FundsLedger;
pub use withdrawal::{WithdrawalPlan, WithdrawalRequest};
