//! Sign-and-place: add a visible stamp and a signature record to a document.
//!
//! Placement runs as a fixed sequence of [`PlacementStage`]s. All work
//! happens on copies; the caller's document and ledger are only replaced by
//! the returned values once every stage has succeeded, so a failure at any
//! stage commits nothing.
//!
//! Placing two stamps on the same document concurrently is a read-then-write
//! race on its ledger; callers must serialize placements per document.

use crate::content::{extract_clean_content, is_excluded};
use crate::document::Document;
use crate::error::{OverlapTarget, Result, SignError};
use crate::geometry::{Anchor, Rect};
use crate::hash::hash_content;
use crate::keys::KeyPair;
use crate::ledger::{Ledger, SignatureRecord};
use crate::protocol::SchemaVersion;
use crate::signer::sign_with_version;
use crate::stamp::Stamp;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Who is signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerIdentity {
    pub id: String,
    pub display_name: String,
}

impl SignerIdentity {
    pub fn new<I: Into<String>, N: Into<String>>(id: I, display_name: N) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Stages of a placement, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementStage {
    ValidatingInput,
    ComputingPlacement,
    CheckingOverlap,
    ExtractingContent,
    Signing,
    RenderingStamp,
    AppendingRecord,
    Done,
}

/// The outcome of a successful placement.
#[derive(Debug, Clone)]
pub struct PlacedSignature {
    /// The document with the stamp drawn on it.
    pub document: Document,
    /// The record describing the new signature.
    pub record: SignatureRecord,
    /// The ledger with `record` appended.
    pub ledger: Ledger,
}

/// A builder for placing a signature stamp.
#[derive(Debug)]
pub struct StampPlacer<'a> {
    keypair: &'a KeyPair,
    identity: SignerIdentity,
    signed_at: Option<DateTime<Utc>>,
}

impl<'a> StampPlacer<'a> {
    /// Create a placer for `identity` signing with `keypair`.
    pub fn new(keypair: &'a KeyPair, identity: SignerIdentity) -> Self {
        Self {
            keypair,
            identity,
            signed_at: None,
        }
    }

    /// Use a fixed signing time instead of the current time.
    pub fn with_timestamp(mut self, signed_at: DateTime<Utc>) -> Self {
        self.signed_at = Some(signed_at);
        self
    }

    /// Sign `document` and stamp it at `anchor`.
    pub fn place(
        &self,
        document: &Document,
        anchor: Anchor,
        ledger: &Ledger,
    ) -> Result<PlacedSignature> {
        let mut stage = PlacementStage::ValidatingInput;
        match self.run(document, anchor, ledger, &mut stage) {
            Ok(placed) => {
                info!(
                    signer_id = %self.identity.id,
                    page = placed.record.placement.page,
                    records = placed.ledger.len(),
                    "placed signature"
                );
                Ok(placed)
            }
            Err(err) => {
                warn!(
                    signer_id = %self.identity.id,
                    page = anchor.page,
                    stage = ?stage,
                    code = %err.code(),
                    "signature placement aborted"
                );
                Err(err)
            }
        }
    }

    fn run(
        &self,
        document: &Document,
        anchor: Anchor,
        ledger: &Ledger,
        stage: &mut PlacementStage,
    ) -> Result<PlacedSignature> {
        *stage = PlacementStage::ValidatingInput;
        document.validate()?;
        if self.identity.id.is_empty() {
            return Err(SignError::InvalidInput("signer id is empty".to_string()));
        }
        let signed_at = self.signed_at.unwrap_or_else(Utc::now);
        if let Some(last) = ledger.latest() {
            if signed_at < last.signed_at {
                return Err(SignError::InvalidInput(
                    "signature timestamp precedes the latest ledger entry".to_string(),
                ));
            }
        }
        if let Some((index, legacy)) = ledger
            .records()
            .iter()
            .enumerate()
            .find(|(_, r)| !r.schema_version.drops_later_stamps())
        {
            return Err(SignError::InvalidInput(format!(
                "record #{} of signer '{}' uses schema version {}, which covers later stamps",
                index,
                legacy.signer_id,
                legacy.schema_version.as_u32()
            )));
        }
        let probe = Rect::new(anchor.page, 0.0, 0.0, 0.0, 0.0);
        document.check_page(&probe)?;

        *stage = PlacementStage::ComputingPlacement;
        let rect = anchor.to_stamp_rect()?;
        let page = document.check_page(&rect)?;
        if !rect.fits_within(page.width, page.height) {
            return Err(SignError::InvalidPlacement(format!(
                "stamp at ({}, {}) does not fit on page {}",
                anchor.x, anchor.y, anchor.page
            )));
        }
        debug!(page = rect.page, x = rect.x, y = rect.y, "normalized stamp rect");

        *stage = PlacementStage::CheckingOverlap;
        check_overlap(document, &rect, ledger)?;

        *stage = PlacementStage::ExtractingContent;
        let version = SchemaVersion::CURRENT;
        let mut placements = ledger.placements();
        placements.push(rect);
        let exclusions = version.exclusion_set(&rect, &placements);
        let content = extract_clean_content(document, &exclusions)?;
        let content_hash = hash_content(&content);

        *stage = PlacementStage::Signing;
        let signature = sign_with_version(self.keypair, &content, version)?;

        *stage = PlacementStage::RenderingStamp;
        let stamp = Stamp::new(self.identity.display_name.clone(), signed_at);
        let mut stamped = document.clone();
        stamped
            .page_mut(rect.page)
            .ok_or_else(|| SignError::InvalidPlacement(format!("page {} vanished", rect.page)))?
            .fragments
            .extend(stamp.render(&rect));

        *stage = PlacementStage::AppendingRecord;
        let record = SignatureRecord {
            schema_version: version,
            signer_id: self.identity.id.clone(),
            signer_display_name: self.identity.display_name.clone(),
            signed_at,
            content_hash,
            placement: rect,
            signature: signature.to_base64(),
        };
        let ledger = ledger.appended(record.clone())?;

        *stage = PlacementStage::Done;
        Ok(PlacedSignature {
            document: stamped,
            record,
            ledger,
        })
    }
}

/// Reject a stamp that would collide with an existing stamp or cover content.
fn check_overlap(document: &Document, rect: &Rect, ledger: &Ledger) -> Result<()> {
    if let Some((index, record)) = ledger
        .records()
        .iter()
        .enumerate()
        .find(|(_, r)| r.placement.overlaps(rect))
    {
        return Err(SignError::Overlap {
            page: rect.page,
            target: OverlapTarget::Stamp {
                signer_id: record.signer_id.clone(),
                index,
            },
        });
    }

    // Content under an earlier stamp is already outside every signature.
    let existing = ledger.placements();
    let covers_content = document
        .page(rect.page)
        .map(|page| {
            page.fragments.iter().any(|f| {
                is_excluded(f, rect.page, std::slice::from_ref(rect))
                    && !is_excluded(f, rect.page, &existing)
            })
        })
        .unwrap_or(false);
    if covers_content {
        return Err(SignError::Overlap {
            page: rect.page,
            target: OverlapTarget::Content,
        });
    }
    Ok(())
}

/// Sign a document whose ledger is embedded in its metadata.
///
/// Returns the new document bytes, with the stamp drawn and the ledger
/// updated, plus the new record.
pub fn sign_embedded(
    document_bytes: &[u8],
    keypair: &KeyPair,
    identity: SignerIdentity,
    anchor: Anchor,
) -> Result<(Vec<u8>, SignatureRecord)> {
    let document = Document::from_bytes(document_bytes)?;
    let ledger = Ledger::from_document(&document)?;
    let placed = StampPlacer::new(keypair, identity).place(&document, anchor, &ledger)?;
    let bytes = placed.ledger.embed_into(&placed.document)?.to_bytes()?;
    Ok((bytes, placed.record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Page;
    use crate::keys::fixtures::{alice, bob};
    use chrono::TimeZone;

    fn contract() -> Document {
        Document::new(vec![
            Page::letter()
                .with_text(72.0, 740.0, 300.0, 14.0, "Lease Agreement")
                .with_text(72.0, 500.0, 450.0, 12.0, "Tenant pays rent monthly."),
            Page::letter().with_text(72.0, 700.0, 300.0, 12.0, "Annex A"),
        ])
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, minute, 0).unwrap()
    }

    fn alice_placer() -> StampPlacer<'static> {
        StampPlacer::new(alice(), SignerIdentity::new("alice", "Alice")).with_timestamp(at(0))
    }

    #[test]
    fn test_place_adds_stamp_and_record() {
        let doc = contract();
        let placed = alice_placer()
            .place(&doc, Anchor::new(1, 100.0, 300.0), &Ledger::new())
            .unwrap();
        assert_eq!(placed.ledger.len(), 1);
        assert_eq!(placed.record.placement, Rect::new(1, 100.0, 250.0, 180.0, 50.0));
        assert_eq!(placed.record.schema_version, SchemaVersion::V2);
        assert_eq!(
            placed.document.pages[0].fragments.len(),
            doc.pages[0].fragments.len() + 2
        );
        // Canonical content is unchanged by the stamp.
        let before = extract_clean_content(&doc, &[placed.record.placement]).unwrap();
        let after = extract_clean_content(&placed.document, &[placed.record.placement]).unwrap();
        assert_eq!(before, after);
        assert_eq!(hash_content(&after), placed.record.content_hash);
    }

    #[test]
    fn test_out_of_range_page() {
        let err = alice_placer()
            .place(&contract(), Anchor::new(3, 100.0, 300.0), &Ledger::new())
            .unwrap_err();
        assert!(matches!(err, SignError::InvalidPlacement(_)));
    }

    #[test]
    fn test_stamp_must_fit_page() {
        let err = alice_placer()
            .place(&contract(), Anchor::new(1, 500.0, 300.0), &Ledger::new())
            .unwrap_err();
        assert!(matches!(err, SignError::InvalidPlacement(_)));
    }

    #[test]
    fn test_overlap_with_existing_stamp() {
        let doc = contract();
        let first = alice_placer()
            .place(&doc, Anchor::new(1, 100.0, 300.0), &Ledger::new())
            .unwrap();
        let err = StampPlacer::new(bob(), SignerIdentity::new("bob", "Bob"))
            .with_timestamp(at(1))
            .place(&first.document, Anchor::new(1, 150.0, 320.0), &first.ledger)
            .unwrap_err();
        match err {
            SignError::Overlap {
                page: 1,
                target: OverlapTarget::Stamp { signer_id, index: 0 },
            } => assert_eq!(signer_id, "alice"),
            other => panic!("expected stamp overlap, got {other:?}"),
        }
    }

    #[test]
    fn test_non_overlapping_placements_succeed() {
        let doc = contract();
        let first = alice_placer()
            .place(&doc, Anchor::new(1, 100.0, 300.0), &Ledger::new())
            .unwrap();
        let bob_placer =
            StampPlacer::new(bob(), SignerIdentity::new("bob", "Bob")).with_timestamp(at(1));
        let same_page = bob_placer
            .place(&first.document, Anchor::new(1, 350.0, 300.0), &first.ledger)
            .unwrap();
        assert_eq!(same_page.ledger.len(), 2);
        let other_page = bob_placer
            .place(&first.document, Anchor::new(2, 100.0, 300.0), &first.ledger)
            .unwrap();
        assert_eq!(other_page.record.placement.page, 2);
    }

    #[test]
    fn test_stamp_over_content_rejected() {
        let err = alice_placer()
            .place(&contract(), Anchor::new(1, 100.0, 520.0), &Ledger::new())
            .unwrap_err();
        assert!(matches!(
            err,
            SignError::Overlap {
                target: OverlapTarget::Content,
                ..
            }
        ));
    }

    #[test]
    fn test_failure_leaves_inputs_untouched() {
        let doc = contract();
        let first = alice_placer()
            .place(&doc, Anchor::new(1, 100.0, 300.0), &Ledger::new())
            .unwrap();
        let doc_before = first.document.clone();
        let ledger_before = first.ledger.clone();
        let _ = StampPlacer::new(bob(), SignerIdentity::new("bob", "Bob"))
            .with_timestamp(at(1))
            .place(&first.document, Anchor::new(1, 110.0, 300.0), &first.ledger)
            .unwrap_err();
        assert_eq!(first.document, doc_before);
        assert_eq!(first.ledger, ledger_before);
    }

    #[test]
    fn test_timestamp_before_latest_rejected() {
        let first = StampPlacer::new(alice(), SignerIdentity::new("alice", "Alice"))
            .with_timestamp(at(10))
            .place(&contract(), Anchor::new(1, 100.0, 300.0), &Ledger::new())
            .unwrap();
        let err = StampPlacer::new(bob(), SignerIdentity::new("bob", "Bob"))
            .with_timestamp(at(5))
            .place(&first.document, Anchor::new(2, 100.0, 300.0), &first.ledger)
            .unwrap_err();
        assert!(matches!(err, SignError::InvalidInput(_)));
    }

    #[test]
    fn test_cosigning_legacy_ledger_rejected() {
        let doc = contract();
        let rect = Anchor::new(1, 100.0, 300.0).to_stamp_rect().unwrap();
        let content = extract_clean_content(&doc, &[rect]).unwrap();
        let legacy = SignatureRecord {
            schema_version: SchemaVersion::V1,
            signer_id: "alice".to_string(),
            signer_display_name: "Alice".to_string(),
            signed_at: at(0),
            content_hash: hash_content(&content),
            placement: rect,
            signature: sign_with_version(alice(), &content, SchemaVersion::V1)
                .unwrap()
                .to_base64(),
        };
        let ledger = Ledger::new().appended(legacy).unwrap();
        let err = StampPlacer::new(bob(), SignerIdentity::new("bob", "Bob"))
            .with_timestamp(at(1))
            .place(&doc, Anchor::new(1, 350.0, 300.0), &ledger)
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::InvalidInput);
        assert!(err.to_string().contains("schema version 1"));
    }

    #[test]
    fn test_sign_embedded() {
        let bytes = contract().to_bytes().unwrap();
        let (signed, record) = sign_embedded(
            &bytes,
            alice(),
            SignerIdentity::new("alice", "Alice"),
            Anchor::new(1, 100.0, 300.0),
        )
        .unwrap();
        let doc = Document::from_bytes(&signed).unwrap();
        let ledger = Ledger::from_document(&doc).unwrap();
        assert_eq!(ledger.records(), std::slice::from_ref(&record));
    }
}
