//! # docstamp
//!
//! Sign documents with RSA keys held encrypted at rest, stamp them with a
//! visible mark after signing, and verify later that their content is
//! unchanged.
//!
//! ## Features
//!
//! - **Key custody**: private keys sealed with AES-256-GCM under a
//!   PBKDF2-derived key from an operator-held master secret
//! - **Canonical content**: signatures cover the document with every stamp
//!   region removed, so stamps can be drawn after signing
//! - **Multiple signatures** with non-overlapping stamp placement
//! - **Tamper evidence**: verification recomputes the content hash and checks
//!   the RSA-PSS signature
//! - **Versioned protocol**: each record names the digest and exclusion rule
//!   it was made under
//!
//! ## Quick Start
//!
//! ### Enroll a Signer
//!
//! ```rust
//! use docstamp::{custody, EngineConfig, MasterSecret};
//!
//! let config = EngineConfig::new(MasterSecret::new("operator secret"));
//! let (record, _keypair) = custody::enroll("alice", &config).unwrap();
//! // Persist `record`; only the encrypted private key is stored.
//! println!("{}", serde_json::to_string(&record).unwrap());
//! ```
//!
//! ### Sign and Verify a Document
//!
//! ```rust
//! use docstamp::{Anchor, Document, KeyPair, Ledger, Page, SignerIdentity, StampPlacer, Verifier};
//!
//! let keypair = KeyPair::generate().unwrap();
//! let document = Document::new(vec![
//!     Page::letter().with_text(72.0, 720.0, 300.0, 14.0, "Important document content"),
//! ]);
//!
//! let placed = StampPlacer::new(&keypair, SignerIdentity::new("alice", "Alice"))
//!     .place(&document, Anchor::new(1, 100.0, 300.0), &Ledger::new())
//!     .unwrap();
//!
//! let public_key = keypair.public_key().to_pem().unwrap();
//! let result = Verifier::verify(&placed.document, &placed.ledger, None, public_key.as_bytes())
//!     .unwrap();
//! assert!(result.valid);
//! ```
//!
//! ### Multiple Signatures
//!
//! ```rust
//! use docstamp::{Anchor, Document, KeyPair, Ledger, Page, SignerIdentity, StampPlacer};
//!
//! let alice = KeyPair::generate().unwrap();
//! let bob = KeyPair::generate().unwrap();
//! let document = Document::new(vec![
//!     Page::letter().with_text(72.0, 720.0, 300.0, 14.0, "Contract requiring two signatures"),
//! ]);
//!
//! let first = StampPlacer::new(&alice, SignerIdentity::new("alice", "Alice"))
//!     .place(&document, Anchor::new(1, 72.0, 200.0), &Ledger::new())
//!     .unwrap();
//! let second = StampPlacer::new(&bob, SignerIdentity::new("bob", "Bob"))
//!     .place(&first.document, Anchor::new(1, 320.0, 200.0), &first.ledger)
//!     .unwrap();
//!
//! assert_eq!(second.ledger.len(), 2);
//! ```

pub mod config;
pub mod content;
pub mod custody;
pub mod document;
pub mod error;
pub mod geometry;
pub mod hash;
pub mod keys;
pub mod ledger;
pub mod placer;
pub mod protocol;
pub mod signer;
pub mod stamp;
pub mod verifier;

// Re-export main types for convenience
pub use config::{EngineConfig, MasterSecret};
pub use content::{extract_clean_content, extract_signed_content};
pub use custody::{
    decrypt_private_key, encrypt_private_key, EncryptedPrivateKey, KeyDirectory, KeyRecord,
};
pub use document::{Document, Page, TextFragment};
pub use error::{ErrorCode, OverlapTarget, Result, SignError};
pub use geometry::{Anchor, Rect};
pub use hash::{hash_content, ContentHash};
pub use keys::{KeyPair, PublicKey};
pub use ledger::{Ledger, SignatureRecord};
pub use placer::{sign_embedded, PlacedSignature, PlacementStage, SignerIdentity, StampPlacer};
pub use protocol::SchemaVersion;
pub use signer::{sign, verify_signature, Signature};
pub use verifier::{
    verify, verify_embedded, LedgerVerification, VerificationCode, VerificationResult, Verifier,
};
