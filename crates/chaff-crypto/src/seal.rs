//! Per-entry AES-128-GCM sealing and opening
//!
//! Stored entry format (binary): `[N bytes: ciphertext][16 bytes: GCM tag]`.
//! The 12-byte nonce is not stored with the entry; it lives in the manifest's
//! `nonces` map under the entry's address.
//!
//! One file key seals many entries, so every nonce handed out by a `Sealer`
//! is recorded in its `NonceLedger` and a repeat is redrawn.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes128Gcm, Key,
};
use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chaff_chunks::{address_of, ContentAddress};
use chaff_core::ChaffError;
use rand::RngCore;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::keys::SymmetricKey;
use crate::{NONCE_SIZE, TAG_SIZE};

/// A 96-bit AES-GCM nonce, serialized as base64
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

impl TryFrom<String> for Nonce {
    type Error = ChaffError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let raw = STANDARD
            .decode(value.as_bytes())
            .map_err(|e| ChaffError::Protocol(format!("nonce is not base64: {e}")))?;
        let bytes: [u8; NONCE_SIZE] = raw.as_slice().try_into().map_err(|_| {
            ChaffError::Protocol(format!(
                "nonce must be {NONCE_SIZE} bytes, got {}",
                raw.len()
            ))
        })?;
        Ok(Nonce(bytes))
    }
}

impl From<Nonce> for String {
    fn from(value: Nonce) -> Self {
        STANDARD.encode(value.0)
    }
}

/// Tracks every nonce issued under one file key.
#[derive(Debug, Default)]
pub struct NonceLedger {
    seen: HashSet<[u8; NONCE_SIZE]>,
}

impl NonceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw a random nonce never issued before by this ledger.
    pub fn fresh(&mut self) -> Nonce {
        let mut rng = rand::thread_rng();
        loop {
            let mut bytes = [0u8; NONCE_SIZE];
            rng.fill_bytes(&mut bytes);
            if self.seen.insert(bytes) {
                return Nonce(bytes);
            }
            tracing::warn!("random nonce repeated under one key; redrawing");
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// One sealed entry: what gets stored under `address`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherEntry {
    pub address: ContentAddress,
    /// Ciphertext with the GCM tag appended
    pub ciphertext: Vec<u8>,
    pub nonce: Nonce,
}

/// Seals compressed payloads under one file key.
pub struct Sealer {
    cipher: Aes128Gcm,
    ledger: NonceLedger,
}

impl Sealer {
    pub fn new(key: &SymmetricKey) -> Self {
        Self {
            cipher: Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key.as_bytes())),
            ledger: NonceLedger::new(),
        }
    }

    /// Seal one payload with a fresh nonce.
    pub fn seal(&mut self, payload: &[u8]) -> Result<CipherEntry> {
        let nonce = self.ledger.fresh();
        seal_with(&self.cipher, nonce, payload)
    }

    /// Seal many payloads in parallel; output order matches input order.
    ///
    /// Nonces are drawn from the ledger up front, before any worker runs.
    pub fn seal_all<P>(&mut self, payloads: &[P]) -> Result<Vec<CipherEntry>>
    where
        P: AsRef<[u8]> + Sync,
    {
        let nonces: Vec<Nonce> = (0..payloads.len()).map(|_| self.ledger.fresh()).collect();
        let cipher = &self.cipher;
        payloads
            .par_iter()
            .zip(nonces.into_par_iter())
            .map(|(payload, nonce)| seal_with(cipher, nonce, payload.as_ref()))
            .collect()
    }

    /// Number of nonces issued so far under this key
    pub fn nonces_issued(&self) -> usize {
        self.ledger.len()
    }
}

fn seal_with(cipher: &Aes128Gcm, nonce: Nonce, payload: &[u8]) -> Result<CipherEntry> {
    let ciphertext = cipher
        .encrypt(aes_gcm::Nonce::from_slice(nonce.as_bytes()), payload)
        .map_err(|e| anyhow::anyhow!("entry encryption failed: {e}"))?;
    Ok(CipherEntry {
        address: address_of(&ciphertext),
        ciphertext,
        nonce,
    })
}

/// Opens entries sealed under one file key.
pub struct Opener {
    cipher: Aes128Gcm,
}

impl Opener {
    pub fn new(key: &SymmetricKey) -> Self {
        Self {
            cipher: Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key.as_bytes())),
        }
    }

    /// Verify the tag and decrypt. Any failure is an `Integrity` error naming `address`.
    pub fn open(
        &self,
        address: &ContentAddress,
        nonce: &Nonce,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, ChaffError> {
        if ciphertext.len() < TAG_SIZE {
            return Err(ChaffError::Integrity {
                address: address.to_hex(),
            });
        }
        self.cipher
            .decrypt(aes_gcm::Nonce::from_slice(nonce.as_bytes()), ciphertext)
            .map_err(|_| ChaffError::Integrity {
                address: address.to_hex(),
            })
    }
}

/// One-shot open of a single entry.
pub fn open_entry(
    key: &SymmetricKey,
    address: &ContentAddress,
    nonce: &Nonce,
    ciphertext: &[u8],
) -> Result<Vec<u8>, ChaffError> {
    Opener::new(key).open(address, nonce, ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_symmetric_key;
    use proptest::prelude::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let key = generate_symmetric_key();
        let mut sealer = Sealer::new(&key);
        let entry = sealer.seal(b"hello, encrypted world!").unwrap();

        let plain = open_entry(&key, &entry.address, &entry.nonce, &entry.ciphertext).unwrap();
        assert_eq!(plain, b"hello, encrypted world!");
    }

    #[test]
    fn test_address_is_hash_of_ciphertext() {
        let key = generate_symmetric_key();
        let entry = Sealer::new(&key).seal(b"payload").unwrap();
        assert_eq!(entry.address, address_of(&entry.ciphertext));
    }

    #[test]
    fn test_sealed_size() {
        let key = generate_symmetric_key();
        let entry = Sealer::new(&key).seal(&[0u8; 1000]).unwrap();
        // plaintext (1000) + tag (16); nonce is kept out of band
        assert_eq!(entry.ciphertext.len(), 1000 + TAG_SIZE);
    }

    #[test]
    fn test_same_payload_different_addresses() {
        let key = generate_symmetric_key();
        let mut sealer = Sealer::new(&key);
        let a = sealer.seal(b"same bytes").unwrap();
        let b = sealer.seal(b"same bytes").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.address, b.address, "fresh nonces defeat deduplication");
    }

    #[test]
    fn test_open_wrong_key() {
        let key1 = generate_symmetric_key();
        let key2 = generate_symmetric_key();
        let entry = Sealer::new(&key1).seal(b"secret data").unwrap();

        let result = open_entry(&key2, &entry.address, &entry.nonce, &entry.ciphertext);
        assert!(matches!(result, Err(ChaffError::Integrity { .. })));
    }

    #[test]
    fn test_open_wrong_nonce() {
        let key = generate_symmetric_key();
        let mut sealer = Sealer::new(&key);
        let a = sealer.seal(b"one").unwrap();
        let b = sealer.seal(b"two").unwrap();

        let result = open_entry(&key, &a.address, &b.nonce, &a.ciphertext);
        assert!(matches!(result, Err(ChaffError::Integrity { .. })));
    }

    #[test]
    fn test_every_bit_flip_detected() {
        let key = generate_symmetric_key();
        let entry = Sealer::new(&key).seal(b"tamper me").unwrap();
        for bit in 0..entry.ciphertext.len() * 8 {
            let mut tampered = entry.ciphertext.clone();
            tampered[bit / 8] ^= 1 << (bit % 8);
            let result = open_entry(&key, &entry.address, &entry.nonce, &tampered);
            assert!(
                matches!(result, Err(ChaffError::Integrity { .. })),
                "bit {bit} flip must fail"
            );
        }
    }

    #[test]
    fn test_truncated_ciphertext() {
        let key = generate_symmetric_key();
        let entry = Sealer::new(&key).seal(b"x").unwrap();
        let result = open_entry(&key, &entry.address, &entry.nonce, &entry.ciphertext[..4]);
        assert!(matches!(result, Err(ChaffError::Integrity { .. })));
    }

    #[test]
    fn test_seal_all_preserves_order_and_unique_nonces() {
        let key = generate_symmetric_key();
        let mut sealer = Sealer::new(&key);
        let payloads: Vec<Vec<u8>> = (0u8..64).map(|i| vec![i; 100]).collect();
        let entries = sealer.seal_all(&payloads).unwrap();

        assert_eq!(entries.len(), 64);
        assert_eq!(sealer.nonces_issued(), 64);
        let opener = Opener::new(&key);
        for (i, e) in entries.iter().enumerate() {
            let plain = opener.open(&e.address, &e.nonce, &e.ciphertext).unwrap();
            assert_eq!(plain, payloads[i]);
        }
        let unique: HashSet<_> = entries.iter().map(|e| e.nonce).collect();
        assert_eq!(unique.len(), entries.len());
    }

    #[test]
    fn test_nonce_base64_roundtrip() {
        let nonce = NonceLedger::new().fresh();
        let s: String = nonce.into();
        assert_eq!(Nonce::try_from(s).unwrap(), nonce);
    }

    #[test]
    fn test_nonce_wrong_length_rejected() {
        let sixteen = STANDARD.encode([0u8; 16]);
        assert!(matches!(
            Nonce::try_from(sixteen),
            Err(ChaffError::Protocol(_))
        ));
        assert!(Nonce::try_from("***".to_string()).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn open_inverts_seal(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let key = generate_symmetric_key();
            let entry = Sealer::new(&key).seal(&payload).unwrap();
            prop_assert!(entry.address.matches(&entry.ciphertext));
            let plain = open_entry(&key, &entry.address, &entry.nonce, &entry.ciphertext).unwrap();
            prop_assert_eq!(plain, payload);
        }
    }
}
