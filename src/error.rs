//! Error types for the docstamp library.
//!
//! Every variant maps to a stable [`ErrorCode`]. Display messages are safe to
//! show to end users: they never carry upstream crypto error text, key
//! material or the master secret.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// What a rejected stamp placement collided with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum OverlapTarget {
    /// An existing stamp recorded in the ledger.
    Stamp { signer_id: String, index: usize },
    /// Document content that earlier signatures cover.
    Content,
}

impl fmt::Display for OverlapTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stamp { signer_id, index } => {
                write!(f, "stamp #{} of signer '{}'", index, signer_id)
            }
            Self::Content => f.write_str("document content"),
        }
    }
}

/// The main error type for docstamp operations.
#[derive(Error, Debug)]
pub enum SignError {
    /// Malformed input: empty document, bad encoding, out-of-order record.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A placement rect refers to a missing page or does not fit the page.
    #[error("Invalid placement: {0}")]
    InvalidPlacement(String),

    /// Wrong master secret or corrupted envelope.
    #[error("Private key decryption failed")]
    Decryption,

    /// The requested stamp collides with something already on the page.
    #[error("Stamp placement on page {page} overlaps {target}")]
    Overlap { page: u32, target: OverlapTarget },

    /// Document content changed after signing.
    #[error("Content modified: expected hash {expected}, got {actual}")]
    ContentModified { expected: String, actual: String },

    /// Cryptographic signature check failed.
    #[error("Signature verification failed")]
    SignatureInvalid,

    /// Key bytes could not be parsed or used.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// No key on file for the user.
    #[error("No key on file for user '{0}'")]
    KeyNotFound(String),

    /// The user's key has been revoked.
    #[error("Key for user '{0}' has been revoked")]
    KeyRevoked(String),

    /// Engine configuration is missing or below protocol minimums.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error reading or writing ledger files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable, machine-checkable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidInput,
    InvalidPlacement,
    DecryptionFailed,
    Overlap,
    ContentModified,
    InvalidSignature,
    InvalidKey,
    KeyNotFound,
    KeyRevoked,
    Config,
    Io,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "INVALID_INPUT",
            Self::InvalidPlacement => "INVALID_PLACEMENT",
            Self::DecryptionFailed => "DECRYPTION_FAILED",
            Self::Overlap => "OVERLAP",
            Self::ContentModified => "CONTENT_MODIFIED",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::InvalidKey => "INVALID_KEY",
            Self::KeyNotFound => "KEY_NOT_FOUND",
            Self::KeyRevoked => "KEY_REVOKED",
            Self::Config => "CONFIG",
            Self::Io => "IO",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SignError {
    /// The stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidInput(_) => ErrorCode::InvalidInput,
            Self::InvalidPlacement(_) => ErrorCode::InvalidPlacement,
            Self::Decryption => ErrorCode::DecryptionFailed,
            Self::Overlap { .. } => ErrorCode::Overlap,
            Self::ContentModified { .. } => ErrorCode::ContentModified,
            Self::SignatureInvalid => ErrorCode::InvalidSignature,
            Self::InvalidKey(_) => ErrorCode::InvalidKey,
            Self::KeyNotFound(_) => ErrorCode::KeyNotFound,
            Self::KeyRevoked(_) => ErrorCode::KeyRevoked,
            Self::Config(_) => ErrorCode::Config,
            Self::Io(_) => ErrorCode::Io,
        }
    }
}

impl From<serde_json::Error> for SignError {
    fn from(err: serde_json::Error) -> Self {
        // Position only; serde messages can echo input fragments.
        SignError::InvalidInput(format!(
            "malformed JSON at line {} column {}",
            err.line(),
            err.column()
        ))
    }
}

impl From<base64::DecodeError> for SignError {
    fn from(_: base64::DecodeError) -> Self {
        SignError::InvalidInput("malformed base64".to_string())
    }
}

impl From<hex::FromHexError> for SignError {
    fn from(_: hex::FromHexError) -> Self {
        SignError::InvalidInput("malformed hex".to_string())
    }
}

/// Result type alias for docstamp operations.
pub type Result<T> = std::result::Result<T, SignError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(SignError::Decryption.code().as_str(), "DECRYPTION_FAILED");
        assert_eq!(
            SignError::KeyNotFound("bob".into()).code(),
            ErrorCode::KeyNotFound
        );
        let overlap = SignError::Overlap {
            page: 1,
            target: OverlapTarget::Content,
        };
        assert_eq!(overlap.code().to_string(), "OVERLAP");
    }

    #[test]
    fn test_decryption_is_distinct_from_not_found() {
        assert_ne!(
            SignError::Decryption.code(),
            SignError::KeyNotFound("alice".into()).code()
        );
    }

    #[test]
    fn test_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::ContentModified).unwrap();
        assert_eq!(json, "\"CONTENT_MODIFIED\"");
    }

    #[test]
    fn test_json_error_hides_input() {
        let err: SignError = serde_json::from_str::<u32>("\"secret-ish\"")
            .unwrap_err()
            .into();
        assert!(!err.to_string().contains("secret-ish"));
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }
}
