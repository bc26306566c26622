//! # Ledger Configuration & Constants
//!
//! Every magic number of the ledger lives here, next to the runtime
//! [`LedgerConfig`] that operators tune per deployment. If you're hardcoding
//! a constant somewhere else, you're doing it wrong and you owe the team
//! coffee.
//!
//! Constants below are part of the persisted format (mask width, native
//! sentinel, address HRP). Changing them after launch means migrating every
//! stored record, so treat them as frozen.

use serde::{Deserialize, Serialize};

use crate::access::Region;
use crate::identity::Address;

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// Version of the ledger state format. Bumped whenever the persisted layout
/// in [`crate::storage`] changes shape.
pub const LEDGER_STATE_VERSION: u32 = 1;

/// Human-readable version string for status endpoints.
pub const LEDGER_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Bech32 human-readable prefix for participant addresses.
pub const ADDRESS_HRP: &str = "nova";

/// Length of a participant address in bytes (a BLAKE3 digest).
pub const ADDRESS_LENGTH: usize = 32;

/// Entity id reserved for the protocol itself. Never handed out by
/// registration; protocol fee balances are booked against it.
pub const PROTOCOL_ENTITY_ID: u64 = 0;

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Width of the role mask in bits. The role enumeration must fit inside it,
/// which is asserted at compile time in [`crate::identity::roles`].
pub const ROLE_MASK_BITS: u32 = u32::BITS;

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

/// Length of an asset identifier in bytes.
pub const ASSET_ID_LENGTH: usize = 32;

/// Raw bytes of the native base asset sentinel. All zeroes, so it can never
/// collide with a BLAKE3-derived token id in practice.
pub const NATIVE_ASSET_BYTES: [u8; ASSET_ID_LENGTH] = [0u8; ASSET_ID_LENGTH];

/// Display label for the native base asset.
pub const NATIVE_ASSET_LABEL: &str = "native";

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// Page size used by operator surfaces when the caller does not pass one.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Hard upper bound on a single asset-list page.
pub const MAX_PAGE_SIZE: usize = 500;

// ---------------------------------------------------------------------------
// Runtime configuration
// ---------------------------------------------------------------------------

/// Seed for the default protocol fee treasury address. Deployments are
/// expected to override it.
const DEFAULT_FEE_TREASURY_SEED: &[u8] = b"nova:protocol-fee-treasury";

/// Deployment-level knobs for a ledger instance.
///
/// Deserialized from the `[ledger]` table of the node config file. Every
/// field has a default so a partial table is fine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Destination of protocol fee withdrawals. Fee collectors never choose
    /// the destination themselves.
    pub fee_treasury: Address,
    /// Addresses granted the global fee-collector capability at boot.
    pub fee_collectors: Vec<Address>,
    /// Regions that start paused.
    pub paused_regions: Vec<Region>,
    /// Upper bound applied to paginated asset listings.
    pub max_page_size: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            fee_treasury: Address::derive(DEFAULT_FEE_TREASURY_SEED),
            fee_collectors: Vec::new(),
            paused_regions: Vec::new(),
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

impl LedgerConfig {
    /// Clamps a requested page size to `[1, max_page_size]`.
    pub fn clamp_page_size(&self, requested: usize) -> usize {
        requested.clamp(1, self.max_page_size.max(1))
    }
}
