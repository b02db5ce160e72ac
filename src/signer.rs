//! RSA-PSS signing over canonical content.
//!
//! The digest is a protocol parameter: it is taken from the record's
//! [`SchemaVersion`], never hard-coded at the call site, so that legacy
//! SHA-1 records keep verifying while new records use SHA-256.

use crate::error::{Result, SignError};
use crate::keys::{KeyPair, PublicKey};
use crate::protocol::{DigestAlgorithm, SchemaVersion};
use base64::Engine;
use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::Pss;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;

/// A detached signature. Text form is standard base64.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.0)
    }

    pub fn from_base64(s: &str) -> Result<Self> {
        Ok(Self(base64::engine::general_purpose::STANDARD.decode(s)?))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({} bytes)", self.0.len())
    }
}

/// Salt length and pre-hashed message for a digest algorithm.
fn pss_params(
    digest: DigestAlgorithm,
    public_key: &rsa::RsaPublicKey,
    content: &[u8],
) -> Result<(Pss, Vec<u8>)> {
    match digest {
        DigestAlgorithm::Sha256 => Ok((Pss::new::<Sha256>(), Sha256::digest(content).to_vec())),
        DigestAlgorithm::Sha1 => {
            // Legacy records use the maximum salt: emLen - hLen - 2.
            let em_len = (public_key.n().bits() - 1 + 7) / 8;
            let salt_len = em_len
                .checked_sub(Sha1::output_size() + 2)
                .ok_or_else(|| SignError::InvalidKey("RSA modulus too small".to_string()))?;
            Ok((
                Pss::new_with_salt::<Sha1>(salt_len),
                Sha1::digest(content).to_vec(),
            ))
        }
    }
}

/// Sign `content` under the current protocol version.
pub fn sign(keypair: &KeyPair, content: &[u8]) -> Result<Signature> {
    sign_with_version(keypair, content, SchemaVersion::CURRENT)
}

/// Sign `content` under an explicit protocol version.
pub fn sign_with_version(
    keypair: &KeyPair,
    content: &[u8],
    version: SchemaVersion,
) -> Result<Signature> {
    let public_key = keypair.rsa().to_public_key();
    let (padding, hashed) = pss_params(version.digest(), &public_key, content)?;
    let bytes = keypair
        .rsa()
        .sign_with_rng(&mut OsRng, padding, &hashed)
        .map_err(|_| SignError::InvalidKey("RSA-PSS signing failed".to_string()))?;
    Ok(Signature(bytes))
}

/// Sign with a PKCS#8 PEM private key, as decrypted from custody.
pub fn sign_with_pem(private_key_pem: &[u8], content: &[u8]) -> Result<Signature> {
    let keypair = KeyPair::from_pkcs8_pem(private_key_pem)?;
    sign(&keypair, content)
}

/// Check `signature` over `content` under the rules of `version`.
///
/// Fails with [`SignError::SignatureInvalid`] on mismatch.
pub fn verify_signature(
    public_key: &PublicKey,
    content: &[u8],
    signature: &Signature,
    version: SchemaVersion,
) -> Result<()> {
    let (padding, hashed) = pss_params(version.digest(), public_key.rsa(), content)?;
    public_key
        .rsa()
        .verify(padding, &hashed, signature.as_bytes())
        .map_err(|_| SignError::SignatureInvalid)
}
