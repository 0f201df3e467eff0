//! Hybrid encryption of the per-file key with the recipient's RSA keypair
//!
//! Wrapped key format: the raw RSA-OAEP (SHA-256) ciphertext, 256 bytes for a
//! 2048-bit modulus. Public keys travel as SubjectPublicKeyInfo PEM, private
//! keys as PKCS#8 PEM.

use anyhow::{Context, Result};
use chaff_core::ChaffError;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::keys::SymmetricKey;
use crate::{KEY_SIZE, RSA_BITS};

/// Recipient keypair. The private half never leaves this struct except as PEM.
#[derive(Clone)]
pub struct Keypair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl Keypair {
    /// Generate a fresh 2048-bit keypair.
    pub fn generate() -> Result<Self> {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), RSA_BITS)
            .context("generating RSA keypair")?;
        Ok(Self::from_private(private))
    }

    pub fn from_private(private: RsaPrivateKey) -> Self {
        let public = RsaPublicKey::from(&private);
        Self { private, public }
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    pub fn private_key_pem(&self) -> Result<Zeroizing<String>> {
        self.private
            .to_pkcs8_pem(LineEnding::LF)
            .context("encoding private key PEM")
    }

    pub fn public_key_pem(&self) -> Result<String> {
        public_key_to_pem(&self.public)
    }

    pub fn from_private_key_pem(pem: &str) -> Result<Self> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem).context("parsing private key PEM")?;
        Ok(Self::from_private(private))
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("private", &"[REDACTED]")
            .finish()
    }
}

pub fn public_key_to_pem(key: &RsaPublicKey) -> Result<String> {
    key.to_public_key_pem(LineEnding::LF)
        .context("encoding public key PEM")
}

pub fn public_key_from_pem(pem: &str) -> Result<RsaPublicKey, ChaffError> {
    RsaPublicKey::from_public_key_pem(pem)
        .map_err(|e| ChaffError::Protocol(format!("invalid public key PEM: {e}")))
}

/// Wrap (encrypt) a file key for the holder of `public`.
pub fn wrap_key(public: &RsaPublicKey, key: &SymmetricKey) -> Result<Vec<u8>> {
    public
        .encrypt(&mut rand::thread_rng(), Oaep::new::<Sha256>(), key.as_bytes())
        .map_err(|e| anyhow::anyhow!("key wrapping failed: {e}"))
}

/// Unwrap (decrypt) a file key. Any padding failure or wrong-length result
/// is `KeyMismatch`; no partial key material is returned.
pub fn unwrap_key(private: &RsaPrivateKey, wrapped: &[u8]) -> Result<SymmetricKey, ChaffError> {
    let mut plaintext = private
        .decrypt(Oaep::new::<Sha256>(), wrapped)
        .map_err(|_| ChaffError::KeyMismatch)?;

    if plaintext.len() != KEY_SIZE {
        plaintext.zeroize();
        return Err(ChaffError::KeyMismatch);
    }

    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(&plaintext);
    plaintext.zeroize();
    Ok(SymmetricKey::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_symmetric_key;
    use std::sync::OnceLock;

    /// RSA key generation is slow; share keypairs across tests in this binary.
    fn test_keypair() -> &'static Keypair {
        static KP: OnceLock<Keypair> = OnceLock::new();
        KP.get_or_init(|| Keypair::generate().unwrap())
    }

    fn other_keypair() -> &'static Keypair {
        static KP: OnceLock<Keypair> = OnceLock::new();
        KP.get_or_init(|| Keypair::generate().unwrap())
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let kp = test_keypair();
        let key = generate_symmetric_key();

        let wrapped = wrap_key(kp.public_key(), &key).unwrap();
        assert_eq!(wrapped.len(), RSA_BITS / 8);
        let unwrapped = unwrap_key(kp.private_key(), &wrapped).unwrap();
        assert_eq!(unwrapped, key);
    }

    #[test]
    fn test_unwrap_with_unrelated_key_fails() {
        let key = generate_symmetric_key();
        let wrapped = wrap_key(test_keypair().public_key(), &key).unwrap();

        let result = unwrap_key(other_keypair().private_key(), &wrapped);
        assert!(matches!(result, Err(ChaffError::KeyMismatch)));
    }

    #[test]
    fn test_unwrap_corrupted_fails() {
        let kp = test_keypair();
        let mut wrapped = wrap_key(kp.public_key(), &generate_symmetric_key()).unwrap();
        wrapped[10] ^= 0x01;
        assert!(matches!(
            unwrap_key(kp.private_key(), &wrapped),
            Err(ChaffError::KeyMismatch)
        ));
        assert!(matches!(
            unwrap_key(kp.private_key(), b"short"),
            Err(ChaffError::KeyMismatch)
        ));
    }

    #[test]
    fn test_wrapping_is_randomized() {
        let kp = test_keypair();
        let key = generate_symmetric_key();
        let a = wrap_key(kp.public_key(), &key).unwrap();
        let b = wrap_key(kp.public_key(), &key).unwrap();
        assert_ne!(a, b, "OAEP padding must be randomized");
    }

    #[test]
    fn test_pem_roundtrip() {
        let kp = test_keypair();
        let priv_pem = kp.private_key_pem().unwrap();
        let pub_pem = kp.public_key_pem().unwrap();
        assert!(pub_pem.starts_with("-----BEGIN PUBLIC KEY-----"));

        let restored = Keypair::from_private_key_pem(&priv_pem).unwrap();
        assert_eq!(restored.public_key(), kp.public_key());
        assert_eq!(&public_key_from_pem(&pub_pem).unwrap(), kp.public_key());
    }

    #[test]
    fn test_bad_public_pem_is_protocol_error() {
        assert!(matches!(
            public_key_from_pem("not a key"),
            Err(ChaffError::Protocol(_))
        ));
    }
}
