//! BLAKE3 content addressing
//!
//! A chunk's address is the BLAKE3 digest of its *ciphertext*, so identical
//! plaintext encrypted under fresh nonces yields unrelated addresses and no
//! cross-upload deduplication is possible.

use chaff_core::ChaffError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of a hex-encoded address
pub const ADDRESS_HEX_LEN: usize = 64;

/// A 32-byte BLAKE3 digest, displayed and serialized as 64 lowercase hex chars
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentAddress([u8; 32]);

impl ContentAddress {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }

    /// Parse a 64-char hex string
    pub fn from_hex(hex: &str) -> Result<Self, ChaffError> {
        if hex.len() != ADDRESS_HEX_LEN {
            return Err(ChaffError::Protocol(format!(
                "content address must be {ADDRESS_HEX_LEN} hex chars, got {}",
                hex.len()
            )));
        }
        blake3::Hash::from_hex(hex)
            .map(|h| Self(*h.as_bytes()))
            .map_err(|e| ChaffError::Protocol(format!("invalid content address '{hex}': {e}")))
    }

    /// True if `data` hashes to this address
    pub fn matches(&self, data: &[u8]) -> bool {
        // blake3::Hash equality is constant-time
        blake3::hash(data) == blake3::Hash::from(self.0)
    }
}

/// Address of a ciphertext blob
pub fn address_of(ciphertext: &[u8]) -> ContentAddress {
    ContentAddress(*blake3::hash(ciphertext).as_bytes())
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentAddress({})", self.to_hex())
    }
}

impl FromStr for ContentAddress {
    type Err = ChaffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for ContentAddress {
    type Error = ChaffError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<ContentAddress> for String {
    fn from(value: ContentAddress) -> Self {
        value.to_hex()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_address_is_deterministic() {
        assert_eq!(address_of(b""), address_of(b""));
    }

    #[test]
    fn address_hex_roundtrip() {
        let a = address_of(b"hello chaff");
        let hex = a.to_hex();
        assert_eq!(hex.len(), ADDRESS_HEX_LEN);
        assert_eq!(ContentAddress::from_hex(&hex).unwrap(), a);
        assert_eq!(a.to_string(), hex);
    }

    #[test]
    fn different_content_different_address() {
        assert_ne!(address_of(b"foo"), address_of(b"bar"));
    }

    #[test]
    fn matches_detects_tamper() {
        let mut data = b"ciphertext bytes".to_vec();
        let a = address_of(&data);
        assert!(a.matches(&data));
        data[0] ^= 1;
        assert!(!a.matches(&data));
    }

    #[test]
    fn reject_bad_hex() {
        assert!(ContentAddress::from_hex("abc").is_err());
        assert!(ContentAddress::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn serde_as_hex_string_and_map_key() {
        let a = address_of(b"x");
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, format!("\"{}\"", a.to_hex()));

        let mut map = std::collections::BTreeMap::new();
        map.insert(a, 1u8);
        let json = serde_json::to_string(&map).unwrap();
        let back: std::collections::BTreeMap<ContentAddress, u8> =
            serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(&a), Some(&1));
    }

    proptest! {
        #[test]
        fn address_is_deterministic(data in proptest::collection::vec(any::<u8>(), 0..=4096)) {
            prop_assert_eq!(address_of(&data), address_of(&data));
        }
    }
}
