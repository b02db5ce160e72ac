//! Signature verification.
//!
//! Verification recomputes a record's canonical content from the document as
//! it is now, compares its SHA-256 against the recorded hash and then checks
//! the RSA-PSS signature. Expected outcomes (tampering, wrong key, unknown
//! signer) are reported as [`VerificationResult`] values; `Err` is reserved
//! for input that cannot be processed at all.

use crate::content::extract_signed_content;
use crate::custody::KeyDirectory;
use crate::document::Document;
use crate::error::{Result, SignError};
use crate::geometry::Rect;
use crate::hash::{hash_content, ContentHash};
use crate::keys::PublicKey;
use crate::ledger::{Ledger, SignatureRecord};
use crate::signer::verify_signature;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Outcome codes of a verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationCode {
    Verified,
    NoSignatures,
    SignatureNotFound,
    ContentModified,
    InvalidSignature,
    InvalidKey,
    KeyNotFound,
    KeyRevoked,
}

impl VerificationCode {
    fn message(&self) -> &'static str {
        match self {
            Self::Verified => "signature is valid",
            Self::NoSignatures => "document carries no signatures",
            Self::SignatureNotFound => "no signature from the requested signer",
            Self::ContentModified => "document content changed after signing",
            Self::InvalidSignature => "signature does not match the content",
            Self::InvalidKey => "public key is missing or malformed",
            Self::KeyNotFound => "no key on file for the signer",
            Self::KeyRevoked => "signer's key was revoked before signing",
        }
    }
}

/// Result of verifying one signature record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Whether the signature is valid.
    pub valid: bool,

    /// Machine-checkable outcome.
    pub code: VerificationCode,

    /// Human-readable outcome.
    pub message: String,

    /// Index of the checked record in the ledger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,

    /// The signer ID of the checked record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<Rect>,

    /// Hash of the verified content. Set only when valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<ContentHash>,

    /// Recorded hash, reported on content mismatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_hash: Option<ContentHash>,

    /// Recomputed hash, reported on content mismatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_hash: Option<ContentHash>,
}

impl VerificationResult {
    fn bare(code: VerificationCode) -> Self {
        Self {
            valid: code == VerificationCode::Verified,
            code,
            message: code.message().to_string(),
            index: None,
            signer: None,
            signer_display_name: None,
            signed_at: None,
            placement: None,
            content_hash: None,
            original_hash: None,
            current_hash: None,
        }
    }

    fn for_record(code: VerificationCode, index: usize, record: &SignatureRecord) -> Self {
        Self {
            index: Some(index),
            signer: Some(record.signer_id.clone()),
            signer_display_name: Some(record.signer_display_name.clone()),
            signed_at: Some(record.signed_at),
            placement: Some(record.placement),
            ..Self::bare(code)
        }
    }

    /// Whether the record was verified.
    pub fn is_verified(&self) -> bool {
        self.valid
    }

    /// Turn a failed outcome into the matching [`SignError`].
    pub fn ensure_verified(self) -> Result<Self> {
        let signer = self.signer.clone().unwrap_or_default();
        let err = match self.code {
            VerificationCode::Verified => return Ok(self),
            VerificationCode::ContentModified => SignError::ContentModified {
                expected: self.original_hash.map(|h| h.to_hex()).unwrap_or_default(),
                actual: self
                    .current_hash
                    .map(|h| h.to_hex())
                    .unwrap_or_else(|| "unavailable".to_string()),
            },
            VerificationCode::InvalidSignature => SignError::SignatureInvalid,
            VerificationCode::InvalidKey => SignError::InvalidKey(self.message.clone()),
            VerificationCode::KeyNotFound => SignError::KeyNotFound(signer),
            VerificationCode::KeyRevoked => SignError::KeyRevoked(signer),
            VerificationCode::NoSignatures | VerificationCode::SignatureNotFound => {
                SignError::InvalidInput(self.message.clone())
            }
        };
        Err(err)
    }
}

/// Result of verifying every record on a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerVerification {
    /// Whether there is at least one record and all are valid.
    pub all_valid: bool,

    /// Results for each record, in ledger order.
    pub signatures: Vec<VerificationResult>,
}

impl LedgerVerification {
    /// How many records verified.
    pub fn valid_count(&self) -> usize {
        self.signatures.iter().filter(|s| s.valid).count()
    }

    /// How many records failed, for any reason.
    pub fn invalid_count(&self) -> usize {
        self.signatures.iter().filter(|s| !s.valid).count()
    }

    /// Signer ids of the verified records, in ledger order.
    pub fn valid_signers(&self) -> Vec<String> {
        self.signatures
            .iter()
            .filter(|s| s.valid)
            .filter_map(|s| s.signer.clone())
            .collect()
    }
}

/// Recompute the canonical content record `index` was signed over.
///
/// Later placements did not exist at signing time. Only the stamp text those
/// records drew is dropped; anything else written into their rects counts.
fn record_content(
    document: &Document,
    ledger: &Ledger,
    index: usize,
    record: &SignatureRecord,
) -> Result<Vec<u8>> {
    let version = record.schema_version;
    let placements = ledger.placements();
    let exclusions = version.exclusion_set(&record.placement, &placements[..=index]);
    let later_marks: Vec<_> = if version.drops_later_stamps() {
        ledger.records()[index + 1..]
            .iter()
            .map(SignatureRecord::stamp_mark)
            .collect()
    } else {
        Vec::new()
    };
    extract_signed_content(document, &exclusions, &later_marks)
}

/// Check record `index` of `ledger` against `document`. `key` is consulted
/// only once the content hash matches.
fn check_record<K>(
    document: &Document,
    ledger: &Ledger,
    index: usize,
    key: K,
) -> Result<VerificationResult>
where
    K: FnOnce(&SignatureRecord) -> std::result::Result<PublicKey, VerificationCode>,
{
    let record = ledger
        .get(index)
        .ok_or_else(|| SignError::InvalidInput(format!("no ledger record at {}", index)))?;
    let result = |code| VerificationResult::for_record(code, index, record);

    let content = match record_content(document, ledger, index, record) {
        Ok(content) => content,
        // A recorded stamp sits on a page the document no longer has.
        Err(SignError::InvalidPlacement(_)) => {
            return Ok(VerificationResult {
                original_hash: Some(record.content_hash),
                ..result(VerificationCode::ContentModified)
            });
        }
        Err(err) => return Err(err),
    };

    let current_hash = hash_content(&content);
    if current_hash != record.content_hash {
        debug!(
            index,
            expected = %record.content_hash,
            actual = %current_hash,
            "content hash mismatch"
        );
        return Ok(VerificationResult {
            original_hash: Some(record.content_hash),
            current_hash: Some(current_hash),
            ..result(VerificationCode::ContentModified)
        });
    }

    let public_key = match key(record) {
        Ok(public_key) => public_key,
        Err(code) => return Ok(result(code)),
    };
    let signature = match record.signature_bytes() {
        Ok(signature) => signature,
        Err(_) => return Ok(result(VerificationCode::InvalidSignature)),
    };
    match verify_signature(&public_key, &content, &signature, record.schema_version) {
        Ok(()) => Ok(VerificationResult {
            content_hash: Some(current_hash),
            ..result(VerificationCode::Verified)
        }),
        Err(SignError::SignatureInvalid) => Ok(result(VerificationCode::InvalidSignature)),
        Err(SignError::InvalidKey(_)) => Ok(result(VerificationCode::InvalidKey)),
        Err(err) => Err(err),
    }
}

/// Verifier for stamped documents.
pub struct Verifier;

impl Verifier {
    /// Verify one record: the latest record of `target_signer_id` if given,
    /// else the most recent record. `public_key` is SPKI PEM or DER.
    pub fn verify(
        document: &Document,
        ledger: &Ledger,
        target_signer_id: Option<&str>,
        public_key: &[u8],
    ) -> Result<VerificationResult> {
        if ledger.is_empty() {
            return Ok(VerificationResult::bare(VerificationCode::NoSignatures));
        }
        let index = match target_signer_id {
            Some(signer_id) => match ledger.latest_by(signer_id) {
                Some((index, _)) => index,
                None => {
                    return Ok(VerificationResult {
                        signer: Some(signer_id.to_string()),
                        ..VerificationResult::bare(VerificationCode::SignatureNotFound)
                    })
                }
            },
            None => ledger.len() - 1,
        };

        let result = check_record(document, ledger, index, |_| {
            PublicKey::from_bytes(public_key).map_err(|_| VerificationCode::InvalidKey)
        })?;
        info!(index, code = ?result.code, "verified signature record");
        Ok(result)
    }

    /// Verify the record at `index` with an already parsed key.
    pub fn verify_record(
        document: &Document,
        ledger: &Ledger,
        index: usize,
        public_key: &PublicKey,
    ) -> Result<VerificationResult> {
        check_record(document, ledger, index, |_| Ok(public_key.clone()))
    }

    /// Verify every record, each with its signer's key from `directory`.
    pub fn verify_all<D: KeyDirectory + ?Sized>(
        document: &Document,
        ledger: &Ledger,
        directory: &D,
    ) -> Result<LedgerVerification> {
        let mut signatures = Vec::with_capacity(ledger.len());
        for index in 0..ledger.len() {
            let result = check_record(document, ledger, index, |record| {
                let key_record = directory
                    .key_record(&record.signer_id)
                    .ok_or(VerificationCode::KeyNotFound)?;
                if key_record.revoked_by(record.signed_at) {
                    return Err(VerificationCode::KeyRevoked);
                }
                key_record
                    .public_key()
                    .map_err(|_| VerificationCode::InvalidKey)
            })?;
            signatures.push(result);
        }
        let all_valid = !signatures.is_empty() && signatures.iter().all(|s| s.valid);
        info!(records = signatures.len(), all_valid, "verified ledger");
        Ok(LedgerVerification {
            all_valid,
            signatures,
        })
    }

    /// Like [`Verifier::verify`], but any outcome other than VERIFIED is an
    /// error.
    pub fn verify_strict(
        document: &Document,
        ledger: &Ledger,
        target_signer_id: Option<&str>,
        public_key: &[u8],
    ) -> Result<VerificationResult> {
        Self::verify(document, ledger, target_signer_id, public_key)?.ensure_verified()
    }

    /// Quick check that the most recent signature is valid.
    pub fn is_valid(document: &Document, ledger: &Ledger, public_key: &[u8]) -> bool {
        Self::verify(document, ledger, None, public_key)
            .map(|r| r.valid)
            .unwrap_or(false)
    }
}

/// Convenience function to verify a document against its ledger.
pub fn verify(
    document: &Document,
    ledger: &Ledger,
    target_signer_id: Option<&str>,
    public_key: &[u8],
) -> Result<VerificationResult> {
    Verifier::verify(document, ledger, target_signer_id, public_key)
}

/// Verify document bytes whose ledger is embedded in their metadata.
pub fn verify_embedded(
    document_bytes: &[u8],
    target_signer_id: Option<&str>,
    public_key: &[u8],
) -> Result<VerificationResult> {
    let document = Document::from_bytes(document_bytes)?;
    let ledger = Ledger::from_document(&document)?;
    Verifier::verify(&document, &ledger, target_signer_id, public_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::extract_clean_content;
    use crate::document::Page;
    use crate::geometry::Anchor;
    use crate::keys::fixtures::{alice, bob};
    use crate::placer::{SignerIdentity, StampPlacer};
    use crate::protocol::SchemaVersion;
    use crate::signer::sign_with_version;
    use crate::stamp::Stamp;
    use chrono::TimeZone;

    fn contract() -> Document {
        Document::new(vec![Page::letter()
            .with_text(72.0, 740.0, 300.0, 14.0, "Purchase Order")
            .with_text(72.0, 600.0, 450.0, 12.0, "Quantity: 10 units")])
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 2, 8, minute, 0).unwrap()
    }

    fn pem(key: &crate::keys::KeyPair) -> Vec<u8> {
        key.public_key().to_pem().unwrap().into_bytes()
    }

    fn signed_by_alice() -> (Document, Ledger) {
        let placed = StampPlacer::new(alice(), SignerIdentity::new("alice", "Alice"))
            .with_timestamp(at(0))
            .place(&contract(), Anchor::new(1, 100.0, 300.0), &Ledger::new())
            .unwrap();
        (placed.document, placed.ledger)
    }

    #[test]
    fn test_verify_valid_signature() {
        let (doc, ledger) = signed_by_alice();
        let result = Verifier::verify(&doc, &ledger, None, &pem(alice())).unwrap();
        assert!(result.valid);
        assert_eq!(result.code, VerificationCode::Verified);
        assert_eq!(result.signer.as_deref(), Some("alice"));
        assert_eq!(result.content_hash, Some(ledger.records()[0].content_hash));
    }

    #[test]
    fn test_no_signatures() {
        let result = Verifier::verify(&contract(), &Ledger::new(), None, &pem(alice())).unwrap();
        assert!(!result.valid);
        assert_eq!(result.code, VerificationCode::NoSignatures);
    }

    #[test]
    fn test_signature_not_found() {
        let (doc, ledger) = signed_by_alice();
        let result = Verifier::verify(&doc, &ledger, Some("bob"), &pem(bob())).unwrap();
        assert_eq!(result.code, VerificationCode::SignatureNotFound);
    }

    #[test]
    fn test_tampered_content() {
        let (mut doc, ledger) = signed_by_alice();
        doc.pages[0].fragments[1].text = "Quantity: 99 units".to_string();
        let result = Verifier::verify(&doc, &ledger, None, &pem(alice())).unwrap();
        assert_eq!(result.code, VerificationCode::ContentModified);
        assert_eq!(result.original_hash, Some(ledger.records()[0].content_hash));
        assert!(result.current_hash.is_some());
        assert!(result.content_hash.is_none());
    }

    #[test]
    fn test_edits_inside_stamp_are_ignored() {
        let (mut doc, ledger) = signed_by_alice();
        let stamp_text = doc.pages[0]
            .fragments
            .iter_mut()
            .find(|f| f.text.starts_with("Signed by"))
            .unwrap();
        stamp_text.text = "Signed by: Mallory".to_string();
        let result = Verifier::verify(&doc, &ledger, None, &pem(alice())).unwrap();
        assert!(result.valid);
    }

    #[test]
    fn test_wrong_key() {
        let (doc, ledger) = signed_by_alice();
        let result = Verifier::verify(&doc, &ledger, None, &pem(bob())).unwrap();
        assert_eq!(result.code, VerificationCode::InvalidSignature);
    }

    #[test]
    fn test_malformed_key() {
        let (doc, ledger) = signed_by_alice();
        for key in [&b""[..], &b"garbage"[..]] {
            let result = Verifier::verify(&doc, &ledger, None, key).unwrap();
            assert_eq!(result.code, VerificationCode::InvalidKey);
        }
    }

    #[test]
    fn test_missing_page_is_content_modified() {
        let (mut doc, ledger) = signed_by_alice();
        doc.pages.push(Page::letter());
        let placed = StampPlacer::new(bob(), SignerIdentity::new("bob", "Bob"))
            .with_timestamp(at(1))
            .place(&doc, Anchor::new(2, 100.0, 300.0), &ledger)
            .unwrap();
        let mut truncated = placed.document.clone();
        truncated.pages.truncate(1);
        let result = Verifier::verify(&truncated, &placed.ledger, Some("alice"), &pem(alice()))
            .unwrap();
        assert_eq!(result.code, VerificationCode::ContentModified);
    }

    #[test]
    fn test_legacy_record_verifies_with_own_stamp_rule() {
        let doc = contract();
        let rect = Anchor::new(1, 100.0, 300.0).to_stamp_rect().unwrap();
        let content = extract_clean_content(&doc, &[rect]).unwrap();
        let signature = sign_with_version(alice(), &content, SchemaVersion::V1).unwrap();
        let mut stamped = doc.clone();
        stamped.pages[0]
            .fragments
            .extend(Stamp::new("Alice", at(0)).render(&rect));
        let record = SignatureRecord {
            schema_version: SchemaVersion::V1,
            signer_id: "alice".to_string(),
            signer_display_name: "Alice".to_string(),
            signed_at: at(0),
            content_hash: hash_content(&content),
            placement: rect,
            signature: signature.to_base64(),
        };
        let ledger = Ledger::new().appended(record).unwrap();
        let result = Verifier::verify(&stamped, &ledger, None, &pem(alice())).unwrap();
        assert_eq!(result.code, VerificationCode::Verified);
    }

    fn directory() -> std::collections::HashMap<String, crate::custody::KeyRecord> {
        [("alice", alice()), ("bob", bob())]
            .into_iter()
            .map(|(id, key)| {
                let record = crate::custody::KeyRecord {
                    user_id: id.to_string(),
                    public_key_pem: key.public_key().to_pem().unwrap(),
                    encrypted_private_key: crate::custody::EncryptedPrivateKey {
                        ciphertext: vec![0; 16],
                        salt: vec![0; 16],
                        nonce: vec![0; 12],
                        kdf_iterations: 100_000,
                    },
                    created_at: at(0),
                    revoked_at: None,
                };
                (id.to_string(), record)
            })
            .collect()
    }

    #[test]
    fn test_cosigned_document_keeps_earlier_signature() {
        let (doc, ledger) = signed_by_alice();
        let placed = StampPlacer::new(bob(), SignerIdentity::new("bob", "Bob"))
            .with_timestamp(at(1))
            .place(&doc, Anchor::new(1, 350.0, 300.0), &ledger)
            .unwrap();
        let all = Verifier::verify_all(&placed.document, &placed.ledger, &directory()).unwrap();
        assert!(all.all_valid);
        assert_eq!(all.valid_signers(), vec!["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn test_text_under_later_unsigned_record_detected() {
        let (mut doc, ledger) = signed_by_alice();
        let rect = Anchor::new(1, 350.0, 300.0).to_stamp_rect().unwrap();
        let forged = SignatureRecord {
            schema_version: SchemaVersion::V2,
            signer_id: "mallory".to_string(),
            signer_display_name: "Mallory".to_string(),
            signed_at: at(1),
            content_hash: hash_content(b""),
            placement: rect,
            signature: "AAAA".to_string(),
        };
        let ledger = ledger.appended(forged.clone()).unwrap();
        doc.pages[0]
            .fragments
            .extend(Stamp::new("Mallory", at(1)).render(&rect));

        // The forged stamp alone does not disturb alice's content.
        let result = Verifier::verify(&doc, &ledger, Some("alice"), &pem(alice())).unwrap();
        assert_eq!(result.code, VerificationCode::Verified);

        doc.pages[0].fragments.push(crate::document::TextFragment::new(
            360.0,
            260.0,
            150.0,
            10.0,
            "ALSO: buyer owes 1,000,000",
        ));
        let result = Verifier::verify(&doc, &ledger, Some("alice"), &pem(alice())).unwrap();
        assert!(!result.valid);
        assert_eq!(result.code, VerificationCode::ContentModified);
    }

    #[test]
    fn test_mixed_version_ledger() {
        let (doc, ledger) = signed_by_alice();
        let rect = Anchor::new(1, 350.0, 300.0).to_stamp_rect().unwrap();
        let content = extract_clean_content(&doc, &[rect]).unwrap();
        let legacy = SignatureRecord {
            schema_version: SchemaVersion::V1,
            signer_id: "bob".to_string(),
            signer_display_name: "Bob".to_string(),
            signed_at: at(1),
            content_hash: hash_content(&content),
            placement: rect,
            signature: sign_with_version(bob(), &content, SchemaVersion::V1)
                .unwrap()
                .to_base64(),
        };
        let ledger = ledger.appended(legacy).unwrap();
        let mut doc = doc;
        doc.pages[0]
            .fragments
            .extend(Stamp::new("Bob", at(1)).render(&rect));

        let all = Verifier::verify_all(&doc, &ledger, &directory()).unwrap();
        assert!(all.all_valid);

        // Text written into bob's rect is outside bob's content but inside
        // alice's.
        doc.pages[0].fragments.push(crate::document::TextFragment::new(
            360.0,
            260.0,
            150.0,
            10.0,
            "Void after 30 days",
        ));
        let all = Verifier::verify_all(&doc, &ledger, &directory()).unwrap();
        assert_eq!(all.signatures[0].code, VerificationCode::ContentModified);
        assert_eq!(all.signatures[1].code, VerificationCode::Verified);
    }

    #[test]
    fn test_verify_strict() {
        let (mut doc, ledger) = signed_by_alice();
        let result = Verifier::verify_strict(&doc, &ledger, None, &pem(alice())).unwrap();
        assert!(result.valid);

        let err = Verifier::verify_strict(&doc, &ledger, None, &pem(bob())).unwrap_err();
        assert!(matches!(err, SignError::SignatureInvalid));

        doc.pages[0].fragments[1].text = "Quantity: 99 units".to_string();
        let err = Verifier::verify_strict(&doc, &ledger, None, &pem(alice())).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::ContentModified);
        match err {
            SignError::ContentModified { expected, actual } => {
                assert_eq!(expected, ledger.records()[0].content_hash.to_hex());
                assert_ne!(expected, actual);
            }
            other => panic!("expected content modified, got {other:?}"),
        }
    }

    #[test]
    fn test_verify_record_by_index() {
        let (doc, ledger) = signed_by_alice();
        let result = Verifier::verify_record(&doc, &ledger, 0, &alice().public_key()).unwrap();
        assert!(result.valid);
        assert!(Verifier::verify_record(&doc, &ledger, 5, &alice().public_key()).is_err());
    }

    #[test]
    fn test_is_valid_convenience() {
        let (doc, ledger) = signed_by_alice();
        assert!(Verifier::is_valid(&doc, &ledger, &pem(alice())));
        assert!(!Verifier::is_valid(&doc, &ledger, &pem(bob())));
    }

    #[test]
    fn test_result_serializes_codes() {
        let (doc, ledger) = signed_by_alice();
        let result = Verifier::verify(&doc, &ledger, None, &pem(alice())).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["code"], "VERIFIED");
        assert_eq!(json["signer"], "alice");
        assert!(json.get("current_hash").is_none());
    }
}
