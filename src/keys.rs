//! RSA key generation and encoding.

use crate::error::{Result, SignError};
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroizing;

/// Default RSA modulus size.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Smallest modulus accepted for new keys.
pub const MIN_KEY_BITS: usize = 2048;

/// An RSA keypair for signing documents. Lives only in memory; persist the
/// private half through [`crate::custody::encrypt_private_key`].
#[derive(Clone)]
pub struct KeyPair {
    private_key: RsaPrivateKey,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("bits", &self.bits())
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generate a new random 2048-bit keypair.
    pub fn generate() -> Result<Self> {
        Self::generate_with_bits(DEFAULT_KEY_BITS)
    }

    /// Generate a new random keypair with the given modulus size.
    pub fn generate_with_bits(bits: usize) -> Result<Self> {
        if bits < MIN_KEY_BITS {
            return Err(SignError::InvalidInput(format!(
                "RSA keys must be at least {} bits, got {}",
                MIN_KEY_BITS, bits
            )));
        }
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|_| SignError::InvalidKey("RSA key generation failed".to_string()))?;
        Ok(Self { private_key })
    }

    /// Load a keypair from PKCS#8 PEM bytes.
    pub fn from_pkcs8_pem(pem: &[u8]) -> Result<Self> {
        let pem = std::str::from_utf8(pem)
            .map_err(|_| SignError::InvalidKey("private key PEM is not UTF-8".to_string()))?;
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|_| SignError::InvalidKey("malformed PKCS#8 private key".to_string()))?;
        Ok(Self { private_key })
    }

    /// Export the private key as PKCS#8 PEM. The buffer is wiped on drop.
    pub fn private_key_pem(&self) -> Result<Zeroizing<Vec<u8>>> {
        let pem = self
            .private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|_| SignError::InvalidKey("PKCS#8 encoding failed".to_string()))?;
        Ok(Zeroizing::new(pem.as_bytes().to_vec()))
    }

    /// Get the public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: self.private_key.to_public_key(),
        }
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.private_key.size() * 8
    }

    pub(crate) fn rsa(&self) -> &RsaPrivateKey {
        &self.private_key
    }
}

/// An RSA public key for verifying signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    inner: RsaPublicKey,
}

impl PublicKey {
    /// Parse a public key from SPKI PEM or DER bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(SignError::InvalidKey("public key is empty".to_string()));
        }
        let parsed = match std::str::from_utf8(bytes) {
            Ok(text) if text.trim_start().starts_with("-----BEGIN") => {
                RsaPublicKey::from_public_key_pem(text.trim())
            }
            _ => RsaPublicKey::from_public_key_der(bytes),
        };
        let inner =
            parsed.map_err(|_| SignError::InvalidKey("malformed SPKI public key".to_string()))?;
        Ok(Self { inner })
    }

    /// Encode as SPKI PEM.
    pub fn to_pem(&self) -> Result<String> {
        self.inner
            .to_public_key_pem(LineEnding::LF)
            .map_err(|_| SignError::InvalidKey("SPKI encoding failed".to_string()))
    }

    /// Encode as SPKI DER.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        let der = self
            .inner
            .to_public_key_der()
            .map_err(|_| SignError::InvalidKey("SPKI encoding failed".to_string()))?;
        Ok(der.as_bytes().to_vec())
    }

    /// SHA-256 over the SPKI DER encoding, hex encoded.
    pub fn fingerprint(&self) -> Result<String> {
        Ok(hex::encode(Sha256::digest(self.to_der()?)))
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.inner.size() * 8
    }

    pub(crate) fn rsa(&self) -> &RsaPublicKey {
        &self.inner
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::KeyPair;
    use std::sync::OnceLock;

    /// Keys shared across unit tests; generation is the slowest step.
    pub fn alice() -> &'static KeyPair {
        static KEY: OnceLock<KeyPair> = OnceLock::new();
        KEY.get_or_init(|| KeyPair::generate().unwrap())
    }

    pub fn bob() -> &'static KeyPair {
        static KEY: OnceLock<KeyPair> = OnceLock::new();
        KEY.get_or_init(|| KeyPair::generate().unwrap())
    }
}
