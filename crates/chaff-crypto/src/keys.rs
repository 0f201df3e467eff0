//! Per-file symmetric key

use rand::RngCore;
use zeroize::Zeroize;

use crate::KEY_SIZE;

/// A per-file 128-bit encryption key. Zeroized on drop.
///
/// Exists unwrapped only for the duration of one encode or decode call.
#[derive(Clone)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for SymmetricKey {}

/// Generate a random 128-bit file key.
pub fn generate_symmetric_key() -> SymmetricKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    SymmetricKey::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        let k1 = generate_symmetric_key();
        let k2 = generate_symmetric_key();
        assert_ne!(k1.as_bytes(), k2.as_bytes(), "random keys must differ");
    }

    #[test]
    fn test_debug_redacts() {
        let k = SymmetricKey::from_bytes([0x41; KEY_SIZE]);
        let dbg = format!("{k:?}");
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains("65"));
    }
}
