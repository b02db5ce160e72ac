//! Engine configuration.
//!
//! The master secret is operator-held configuration. It is read from the
//! environment, kept in a zeroizing buffer and never printed.

use crate::error::{Result, SignError};
use crate::keys::{DEFAULT_KEY_BITS, MIN_KEY_BITS};
use std::fmt;
use zeroize::Zeroizing;

/// Default PBKDF2 iteration count for new envelopes.
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

/// Smallest PBKDF2 iteration count accepted on encrypt or decrypt.
pub const MIN_KDF_ITERATIONS: u32 = 100_000;

/// Largest PBKDF2 iteration count accepted. Bounds the work a corrupted
/// envelope can demand before decryption fails.
pub const MAX_KDF_ITERATIONS: u32 = 10_000_000;

pub const ENV_MASTER_SECRET: &str = "DOCSTAMP_MASTER_SECRET";
pub const ENV_KDF_ITERATIONS: &str = "DOCSTAMP_KDF_ITERATIONS";
pub const ENV_RSA_KEY_BITS: &str = "DOCSTAMP_RSA_KEY_BITS";

/// The server-held secret private keys are encrypted under.
#[derive(Clone)]
pub struct MasterSecret(Zeroizing<String>);

impl MasterSecret {
    pub fn new<S: Into<String>>(secret: S) -> Self {
        Self(Zeroizing::new(secret.into()))
    }

    pub fn expose(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSecret(<redacted>)")
    }
}

impl From<&str> for MasterSecret {
    fn from(secret: &str) -> Self {
        Self::new(secret)
    }
}

/// Configuration for key custody and signing.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub master_secret: MasterSecret,
    pub kdf_iterations: u32,
    pub rsa_key_bits: usize,
}

impl EngineConfig {
    /// Defaults for everything but the secret.
    pub fn new(master_secret: MasterSecret) -> Self {
        Self {
            master_secret,
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            rsa_key_bits: DEFAULT_KEY_BITS,
        }
    }

    /// Read configuration from `DOCSTAMP_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let secret = std::env::var(ENV_MASTER_SECRET)
            .map_err(|_| SignError::Config(format!("{} is not set", ENV_MASTER_SECRET)))?;

        let kdf_iterations = match std::env::var(ENV_KDF_ITERATIONS) {
            Ok(raw) => raw.trim().parse().map_err(|_| {
                SignError::Config(format!("{} must be an integer", ENV_KDF_ITERATIONS))
            })?,
            Err(_) => DEFAULT_KDF_ITERATIONS,
        };
        let rsa_key_bits = match std::env::var(ENV_RSA_KEY_BITS) {
            Ok(raw) => raw.trim().parse().map_err(|_| {
                SignError::Config(format!("{} must be an integer", ENV_RSA_KEY_BITS))
            })?,
            Err(_) => DEFAULT_KEY_BITS,
        };

        let config = Self {
            master_secret: MasterSecret::new(secret),
            kdf_iterations,
            rsa_key_bits,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check protocol minimums.
    pub fn validate(&self) -> Result<()> {
        if self.master_secret.is_empty() {
            return Err(SignError::Config("master secret is empty".to_string()));
        }
        if !(MIN_KDF_ITERATIONS..=MAX_KDF_ITERATIONS).contains(&self.kdf_iterations) {
            return Err(SignError::Config(format!(
                "kdf_iterations must be between {} and {}",
                MIN_KDF_ITERATIONS, MAX_KDF_ITERATIONS
            )));
        }
        if self.rsa_key_bits < MIN_KEY_BITS {
            return Err(SignError::Config(format!(
                "rsa_key_bits must be at least {}",
                MIN_KEY_BITS
            )));
        }
        Ok(())
    }
}
