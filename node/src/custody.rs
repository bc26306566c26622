//! # Custody
//!
//! Builds the node's [`CustodyVault`] at boot.
//!
//! The vault is persisted with the ledger state in the same transaction, so
//! a restart normally restores it as saved. A database written without a
//! custody image gets reserves equal to the ledger's per-asset totals.
//!
//! On a fresh custody image the `[custody]` table seeds external holder
//! balances, which is how token deposits get something to pull from:
//!
//! ```toml
//! [[custody.holders]]
//! holder = "nova1..."
//! asset = "<64 hex chars>"
//! amount = 1000000
//! ```
//!
//! Seeds are applied once. After the first save they live in the stored
//! image and later config edits do not touch them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use nova_ledger::{Address, Amount, AssetId, CustodyVault, LedgerDb, LedgerState};

/// `[custody]` table of the node config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustodyConfig {
    /// External balances to seed into a new vault.
    pub holders: Vec<HolderSeed>,
}

/// One seeded external balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderSeed {
    pub holder: Address,
    pub asset: AssetId,
    /// TOML integers are 64-bit.
    pub amount: u64,
}

/// Restores the vault from `db`, or builds one backing `state`.
pub fn restore_custody(db: &LedgerDb, state: &LedgerState, config: &CustodyConfig) -> Result<CustodyVault> {
    if let Some(snapshot) = db.load_custody().context("failed to read custody image")? {
        let vault = CustodyVault::from_snapshot(snapshot);
        for (asset, held, owed) in vault.shortfalls(&state.ledger) {
            tracing::warn!(%asset, held, owed, "custody reserves below ledger total");
        }
        tracing::info!("custody restored");
        return Ok(vault);
    }

    let vault = CustodyVault::backed_by(&state.ledger);
    for seed in &config.holders {
        vault.fund_holder(seed.holder, seed.asset, Amount::from(seed.amount));
        tracing::info!(holder = %seed.holder, asset = %seed.asset, amount = seed.amount, "holder seeded");
    }
    Ok(vault)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nova_ledger::{EntityId, EventBatch};

    fn usd() -> AssetId {
        AssetId::derive("nUSD", "nova:issuer")
    }

    fn seeds() -> CustodyConfig {
        CustodyConfig {
            holders: vec![HolderSeed {
                holder: Address::derive(b"holder"),
                asset: usd(),
                amount: 500,
            }],
        }
    }

    #[test]
    fn fresh_database_seeds_holders() {
        let db = LedgerDb::open_temporary().unwrap();
        let vault = restore_custody(&db, &LedgerState::new(), &seeds()).unwrap();
        assert_eq!(vault.holder_balance(&Address::derive(b"holder"), usd()), 500);
    }

    #[test]
    fn stored_image_wins_over_seeds() {
        let db = LedgerDb::open_temporary().unwrap();
        let vault = CustodyVault::new();
        vault.fund_holder(Address::derive(b"holder"), usd(), 7);
        db.save_with_custody(&LedgerState::new(), &vault.snapshot())
            .unwrap();

        let restored = restore_custody(&db, &LedgerState::new(), &seeds()).unwrap();
        assert_eq!(restored.holder_balance(&Address::derive(b"holder"), usd()), 7);
    }

    #[test]
    fn ledger_without_image_is_backed() {
        let db = LedgerDb::open_temporary().unwrap();
        let mut state = LedgerState::new();
        state
            .ledger
            .credit(EntityId::new(1), usd(), 80, Address::derive(b"payer"), &mut EventBatch::new())
            .unwrap();

        let vault = restore_custody(&db, &state, &CustodyConfig::default()).unwrap();
        assert_eq!(vault.reserves(usd()), 80);
    }

    #[test]
    fn seeds_parse_from_toml() {
        let holder = Address::derive(b"holder");
        let text = format!(
            r#"
            [[holders]]
            holder = "{holder}"
            asset = "{}"
            amount = 1000000
            "#,
            usd()
        );
        let cfg: CustodyConfig = toml::from_str(&text).unwrap();
        assert_eq!(cfg.holders[0].holder, holder);
        assert_eq!(cfg.holders[0].amount, 1_000_000);
    }
}
