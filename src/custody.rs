//! Key custody: envelope encryption of private keys.
//!
//! A private key is stored as PKCS#8 PEM encrypted with AES-256-GCM under a
//! key derived from the master secret with PBKDF2-HMAC-SHA256. Salt and nonce
//! are drawn fresh for every encryption. A wrong secret or any corruption of
//! the envelope fails the GCM tag check and surfaces as
//! [`SignError::Decryption`], never as wrong plaintext.

use crate::config::{
    EngineConfig, MasterSecret, DEFAULT_KDF_ITERATIONS, MAX_KDF_ITERATIONS, MIN_KDF_ITERATIONS,
};
use crate::error::{Result, SignError};
use crate::keys::{KeyPair, PublicKey};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

mod b64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(text)
            .map_err(serde::de::Error::custom)
    }
}

fn default_iterations() -> u32 {
    DEFAULT_KDF_ITERATIONS
}

/// A private key encrypted under the master secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPrivateKey {
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "b64")]
    pub salt: Vec<u8>,
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
    #[serde(default = "default_iterations")]
    pub kdf_iterations: u32,
}

fn derive_key(secret: &MasterSecret, salt: &[u8], iterations: u32) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(secret.expose(), salt, iterations, &mut key[..]);
    key
}

fn check_iterations(iterations: u32) -> Result<()> {
    if !(MIN_KDF_ITERATIONS..=MAX_KDF_ITERATIONS).contains(&iterations) {
        return Err(SignError::InvalidInput(format!(
            "kdf iterations {} outside {}..={}",
            iterations, MIN_KDF_ITERATIONS, MAX_KDF_ITERATIONS
        )));
    }
    Ok(())
}

/// Encrypt PEM private key bytes with the default iteration count.
pub fn encrypt_private_key(
    private_key_pem: &[u8],
    secret: &MasterSecret,
) -> Result<EncryptedPrivateKey> {
    encrypt_private_key_with(private_key_pem, secret, DEFAULT_KDF_ITERATIONS)
}

/// Encrypt PEM private key bytes with an explicit iteration count.
pub fn encrypt_private_key_with(
    private_key_pem: &[u8],
    secret: &MasterSecret,
    kdf_iterations: u32,
) -> Result<EncryptedPrivateKey> {
    if private_key_pem.is_empty() {
        return Err(SignError::InvalidInput("private key is empty".to_string()));
    }
    check_iterations(kdf_iterations)?;

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let key = derive_key(secret, &salt, kdf_iterations);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), private_key_pem)
        .map_err(|_| SignError::InvalidInput("private key encryption failed".to_string()))?;

    debug!(kdf_iterations, "encrypted private key");
    Ok(EncryptedPrivateKey {
        ciphertext,
        salt: salt.to_vec(),
        nonce: nonce.to_vec(),
        kdf_iterations,
    })
}

/// Decrypt an envelope back to PEM private key bytes.
pub fn decrypt_private_key(
    envelope: &EncryptedPrivateKey,
    secret: &MasterSecret,
) -> Result<Zeroizing<Vec<u8>>> {
    check_iterations(envelope.kdf_iterations)?;
    if envelope.salt.len() != SALT_LEN || envelope.nonce.len() != NONCE_LEN {
        warn!("envelope salt or nonce has the wrong length");
        return Err(SignError::Decryption);
    }

    let key = derive_key(secret, &envelope.salt, envelope.kdf_iterations);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));
    cipher
        .decrypt(
            Nonce::from_slice(&envelope.nonce),
            envelope.ciphertext.as_slice(),
        )
        .map(Zeroizing::new)
        .map_err(|_| {
            warn!("private key envelope failed authentication");
            SignError::Decryption
        })
}

/// What a persistence layer stores per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub user_id: String,
    pub public_key_pem: String,
    pub encrypted_private_key: EncryptedPrivateKey,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl KeyRecord {
    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_bytes(self.public_key_pem.as_bytes())
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Whether the key was already revoked at `at`.
    pub fn revoked_by(&self, at: DateTime<Utc>) -> bool {
        self.revoked_at.is_some_and(|revoked| at >= revoked)
    }

    /// Mark the key revoked. Returns a new record.
    pub fn revoke(&self, at: DateTime<Utc>) -> KeyRecord {
        KeyRecord {
            revoked_at: Some(self.revoked_at.map_or(at, |prev| prev.min(at))),
            ..self.clone()
        }
    }
}

/// Lookup of key records by user id.
pub trait KeyDirectory {
    fn key_record(&self, user_id: &str) -> Option<&KeyRecord>;
}

impl KeyDirectory for HashMap<String, KeyRecord> {
    fn key_record(&self, user_id: &str) -> Option<&KeyRecord> {
        self.get(user_id)
    }
}

/// Generate a keypair for `user_id` and seal its private half.
///
/// Returns the record to persist and the live keypair.
pub fn enroll(user_id: &str, config: &EngineConfig) -> Result<(KeyRecord, KeyPair)> {
    config.validate()?;
    if user_id.is_empty() {
        return Err(SignError::InvalidInput("user id is empty".to_string()));
    }
    let keypair = KeyPair::generate_with_bits(config.rsa_key_bits)?;
    let pem = keypair.private_key_pem()?;
    let encrypted_private_key =
        encrypt_private_key_with(&pem, &config.master_secret, config.kdf_iterations)?;
    let record = KeyRecord {
        user_id: user_id.to_string(),
        public_key_pem: keypair.public_key().to_pem()?,
        encrypted_private_key,
        created_at: Utc::now(),
        revoked_at: None,
    };
    info!(user_id, bits = keypair.bits(), "enrolled signing key");
    Ok((record, keypair))
}

/// Decrypt the signing key of `user_id` from `directory`.
pub fn unlock<D: KeyDirectory + ?Sized>(
    directory: &D,
    user_id: &str,
    secret: &MasterSecret,
) -> Result<KeyPair> {
    let record = directory
        .key_record(user_id)
        .ok_or_else(|| SignError::KeyNotFound(user_id.to_string()))?;
    if record.is_revoked() {
        return Err(SignError::KeyRevoked(user_id.to_string()));
    }
    let pem = decrypt_private_key(&record.encrypted_private_key, secret)?;
    KeyPair::from_pkcs8_pem(&pem)
}
