//! # Asset Identifiers
//!
//! The ledger books balances per asset. An asset is either the network's
//! native base asset or a fungible token. Both are 32-byte [`AssetId`]s; the
//! native asset is the all-zero sentinel [`AssetId::NATIVE`].
//!
//! Token ids are content-addressed, the same way NOVA derives token ids
//! everywhere else:
//!
//! ```text
//! AssetId = BLAKE3(symbol || 0x00 || issuer)
//! ```
//!
//! The separator keeps `("AB", "C")` and `("A", "BC")` apart.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::{ASSET_ID_LENGTH, NATIVE_ASSET_BYTES, NATIVE_ASSET_LABEL};

/// Amount in the asset's smallest unit. The ledger never divides.
pub type Amount = u128;

/// Identifier of a ledger asset.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId([u8; ASSET_ID_LENGTH]);

impl AssetId {
    /// The native base asset.
    pub const NATIVE: AssetId = AssetId(NATIVE_ASSET_BYTES);

    /// Wraps raw id bytes.
    pub const fn from_bytes(bytes: [u8; ASSET_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Derives a token id from its symbol and issuer.
    pub fn derive(symbol: &str, issuer: &str) -> Self {
        let mut preimage = Vec::with_capacity(symbol.len() + issuer.len() + 1);
        preimage.extend_from_slice(symbol.as_bytes());
        preimage.push(0x00);
        preimage.extend_from_slice(issuer.as_bytes());
        Self(*blake3::hash(&preimage).as_bytes())
    }

    /// Returns `true` for the native sentinel.
    pub fn is_native(&self) -> bool {
        *self == Self::NATIVE
    }

    /// Raw id bytes.
    pub fn as_bytes(&self) -> &[u8; ASSET_ID_LENGTH] {
        &self.0
    }

    /// Hex encoding of the raw bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a hex-encoded id.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != ASSET_ID_LENGTH {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; ASSET_ID_LENGTH];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_native() {
            write!(f, "{}", NATIVE_ASSET_LABEL)
        } else {
            write!(f, "{}", self.to_hex())
        }
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_native() {
            write!(f, "AssetId(native)")
        } else {
            write!(f, "AssetId({}...)", &self.to_hex()[..12])
        }
    }
}

impl FromStr for AssetId {
    type Err = hex::FromHexError;

    /// Accepts `native` or 64 hex characters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case(NATIVE_ASSET_LABEL) {
            return Ok(Self::NATIVE);
        }
        Self::from_hex(s)
    }
}

impl Serialize for AssetId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for AssetId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            let bytes = <[u8; ASSET_ID_LENGTH]>::deserialize(deserializer)?;
            Ok(Self(bytes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_displays_as_label() {
        assert_eq!(AssetId::NATIVE.to_string(), "native");
        assert_eq!("native".parse::<AssetId>().unwrap(), AssetId::NATIVE);
        assert_eq!("NATIVE".parse::<AssetId>().unwrap(), AssetId::NATIVE);
    }

    #[test]
    fn derived_ids_are_not_native() {
        let usd = AssetId::derive("nUSD", "nova:issuer");
        assert!(!usd.is_native());
        assert_eq!(usd, AssetId::derive("nUSD", "nova:issuer"));
    }

    #[test]
    fn separator_prevents_ambiguity() {
        assert_ne!(AssetId::derive("AB", "C"), AssetId::derive("A", "BC"));
    }

    #[test]
    fn hex_roundtrip() {
        let brl = AssetId::derive("nBRL", "nova:issuer");
        assert_eq!(brl.to_string().parse::<AssetId>().unwrap(), brl);
    }

    #[test]
    fn bad_hex_rejected() {
        assert!("zz".parse::<AssetId>().is_err());
        assert!("abcd".parse::<AssetId>().is_err());
    }

    #[test]
    fn json_roundtrip_uses_strings() {
        let ids = vec![AssetId::NATIVE, AssetId::derive("nUSD", "i")];
        let json = serde_json::to_string(&ids).unwrap();
        assert!(json.contains("\"native\""));
        let back: Vec<AssetId> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ids);
    }
}
