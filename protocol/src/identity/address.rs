//! # Participant Addresses
//!
//! An [`Address`] is the identity of whoever invokes a ledger operation: an
//! entity owner, one of its wallets, a depositor, or a fee collector. It is a
//! 32-byte BLAKE3 digest rendered as Bech32 with the `nova` prefix:
//!
//! ```text
//! seed / public key bytes
//!     -> BLAKE3(bytes) -> 32 bytes
//!     -> Bech32("nova", hash) -> nova1qw508d6qe...
//! ```
//!
//! The ledger never looks inside an address. It only compares them, so any
//! scheme that produces stable 32-byte identifiers plugs in.

use bech32::{Bech32, Hrp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::{ADDRESS_HRP, ADDRESS_LENGTH};

/// Errors produced when parsing an address string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// The Bech32 string could not be decoded.
    #[error("bech32 decode error: {0}")]
    Bech32Decode(String),

    /// The decoded address carries another human-readable prefix.
    #[error("invalid HRP: expected '{expected}', got '{got}'")]
    InvalidHrp {
        /// The expected HRP.
        expected: String,
        /// The HRP that was actually found.
        got: String,
    },

    /// The decoded payload has the wrong length.
    #[error("invalid address data length: expected {expected} bytes, got {got}")]
    InvalidDataLength {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes.
        got: usize,
    },
}

/// A participant address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// Wraps raw address bytes.
    pub const fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Derives an address from arbitrary seed bytes (typically a public key).
    pub fn derive(seed: &[u8]) -> Self {
        Self(*blake3::hash(seed).as_bytes())
    }

    /// Returns the raw 32 bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Encodes the address as `nova1...`.
    pub fn to_bech32(&self) -> String {
        let hrp = Hrp::parse(ADDRESS_HRP).expect("static HRP is valid");
        bech32::encode::<Bech32>(hrp, &self.0)
            .expect("encoding a 32-byte payload should never fail")
    }

    /// Parses a Bech32 `nova1...` string.
    pub fn from_bech32(s: &str) -> Result<Self, AddressError> {
        let (hrp, data) =
            bech32::decode(s).map_err(|e| AddressError::Bech32Decode(e.to_string()))?;

        let expected = Hrp::parse(ADDRESS_HRP).expect("static HRP is valid");
        if hrp != expected {
            return Err(AddressError::InvalidHrp {
                expected: ADDRESS_HRP.to_string(),
                got: hrp.to_string(),
            });
        }

        if data.len() != ADDRESS_LENGTH {
            return Err(AddressError::InvalidDataLength {
                expected: ADDRESS_LENGTH,
                got: data.len(),
            });
        }

        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&data);
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_bech32())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_bech32())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bech32(s)
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_bech32())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_bech32(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes = <[u8; ADDRESS_LENGTH]>::deserialize(deserializer)?;
            Ok(Self(bytes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic() {
        assert_eq!(Address::derive(b"alice"), Address::derive(b"alice"));
        assert_ne!(Address::derive(b"alice"), Address::derive(b"bob"));
    }

    #[test]
    fn bech32_roundtrip() {
        let addr = Address::derive(b"alice");
        let encoded = addr.to_bech32();
        assert!(encoded.starts_with("nova1"));
        assert_eq!(encoded.parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn wrong_hrp_rejected() {
        let hrp = Hrp::parse("tnova").unwrap();
        let foreign = bech32::encode::<Bech32>(hrp, &[7u8; 32]).unwrap();
        assert!(matches!(
            Address::from_bech32(&foreign),
            Err(AddressError::InvalidHrp { .. })
        ));
    }

    #[test]
    fn short_payload_rejected() {
        let hrp = Hrp::parse(ADDRESS_HRP).unwrap();
        let short = bech32::encode::<Bech32>(hrp, &[7u8; 20]).unwrap();
        assert!(matches!(
            Address::from_bech32(&short),
            Err(AddressError::InvalidDataLength { got: 20, .. })
        ));
    }

    #[test]
    fn json_uses_bech32_string() {
        let addr = Address::derive(b"carol");
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", addr));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn bincode_uses_raw_bytes() {
        let addr = Address::derive(b"dave");
        let bytes = bincode::serialize(&addr).unwrap();
        assert_eq!(bytes.len(), ADDRESS_LENGTH);
        let back: Address = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, addr);
    }
}
