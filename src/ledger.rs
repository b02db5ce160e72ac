//! Signature records and the append-only per-document ledger.

use crate::document::Document;
use crate::error::{Result, SignError};
use crate::geometry::Rect;
use crate::hash::ContentHash;
use crate::protocol::SchemaVersion;
use crate::signer::Signature;
use crate::stamp::{Stamp, StampMark};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// The current version of the ledger container format.
pub const LEDGER_FORMAT_VERSION: u32 = 1;

/// Document metadata key the ledger is embedded under.
pub const LEDGER_METADATA_KEY: &str = "docstamp.ledger";

/// One signing operation on a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureRecord {
    /// Protocol version the record was produced under.
    pub schema_version: SchemaVersion,

    /// Opaque identifier of the signer.
    pub signer_id: String,

    /// Name shown on the stamp.
    pub signer_display_name: String,

    /// When the signature was made.
    pub signed_at: DateTime<Utc>,

    /// SHA-256 of the canonical content that was signed.
    pub content_hash: ContentHash,

    /// Where the visible stamp sits.
    pub placement: Rect,

    /// RSA-PSS signature bytes (base64 encoded).
    pub signature: String,
}

impl SignatureRecord {
    /// Decode the signature bytes.
    pub fn signature_bytes(&self) -> Result<Signature> {
        Signature::from_base64(&self.signature)
    }

    /// Parse a record from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the record to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// The stamp this record drew on the document.
    pub fn stamp_mark(&self) -> StampMark {
        Stamp::new(self.signer_display_name.clone(), self.signed_at).mark(self.placement)
    }

    /// Serialize the record to a field map, for row-style storage.
    pub fn to_map(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            _ => Err(SignError::InvalidInput(
                "record did not serialize to an object".to_string(),
            )),
        }
    }

    /// Rebuild a record from a field map.
    pub fn from_map(map: serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        Ok(serde_json::from_value(serde_json::Value::Object(map))?)
    }
}

/// The ordered, append-only list of signature records of one document.
///
/// Records are only reachable through shared references; appending returns a
/// new ledger and leaves the original untouched. Deserializing checks the
/// format version and record order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredLedger")]
pub struct Ledger {
    format_version: u32,
    records: Vec<SignatureRecord>,
}

#[derive(Deserialize)]
struct StoredLedger {
    format_version: u32,
    records: Vec<SignatureRecord>,
}

impl TryFrom<StoredLedger> for Ledger {
    type Error = SignError;

    fn try_from(stored: StoredLedger) -> Result<Self> {
        let ledger = Ledger {
            format_version: stored.format_version,
            records: stored.records,
        };
        ledger.validate()?;
        Ok(ledger)
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// An empty ledger.
    pub fn new() -> Self {
        Self {
            format_version: LEDGER_FORMAT_VERSION,
            records: Vec::new(),
        }
    }

    /// Build a ledger from stored records, checking order.
    pub fn from_records(records: Vec<SignatureRecord>) -> Result<Self> {
        let ledger = Self {
            format_version: LEDGER_FORMAT_VERSION,
            records,
        };
        ledger.validate()?;
        Ok(ledger)
    }

    pub fn records(&self) -> &[SignatureRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SignatureRecord> {
        self.records.get(index)
    }

    /// The most recent record.
    pub fn latest(&self) -> Option<&SignatureRecord> {
        self.records.last()
    }

    /// The most recent record of `signer_id`, with its index.
    pub fn latest_by(&self, signer_id: &str) -> Option<(usize, &SignatureRecord)> {
        self.records
            .iter()
            .enumerate()
            .rev()
            .find(|(_, r)| r.signer_id == signer_id)
    }

    /// Look a record up by its identity.
    pub fn find(&self, signer_id: &str, signed_at: DateTime<Utc>) -> Option<&SignatureRecord> {
        self.records
            .iter()
            .find(|r| r.signer_id == signer_id && r.signed_at == signed_at)
    }

    /// Every stamp placement, in record order.
    pub fn placements(&self) -> Vec<Rect> {
        self.records.iter().map(|r| r.placement).collect()
    }

    /// A new ledger with `record` appended.
    pub fn appended(&self, record: SignatureRecord) -> Result<Ledger> {
        if let Some(last) = self.latest() {
            if record.signed_at < last.signed_at {
                return Err(SignError::InvalidInput(
                    "signature timestamp precedes the latest ledger entry".to_string(),
                ));
            }
        }
        let mut records = self.records.clone();
        records.push(record);
        Ok(Ledger {
            format_version: self.format_version,
            records,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.format_version != LEDGER_FORMAT_VERSION {
            return Err(SignError::InvalidInput(format!(
                "unsupported ledger format version {}",
                self.format_version
            )));
        }
        let ordered = self
            .records
            .windows(2)
            .all(|w| w[0].signed_at <= w[1].signed_at);
        if !ordered {
            return Err(SignError::InvalidInput(
                "ledger records are not in chronological order".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse a ledger from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the ledger to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Save the ledger to a JSON file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Load a ledger from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Read the ledger embedded in a document's metadata. A document without
    /// one has an empty ledger.
    pub fn from_document(document: &Document) -> Result<Self> {
        match document.metadata.get(LEDGER_METADATA_KEY) {
            Some(json) => Self::from_json(json),
            None => Ok(Self::new()),
        }
    }

    /// A copy of `document` with this ledger embedded in its metadata.
    pub fn embed_into(&self, document: &Document) -> Result<Document> {
        let mut embedded = document.clone();
        embedded
            .metadata
            .insert(LEDGER_METADATA_KEY.to_string(), serde_json::to_string(self)?);
        Ok(embedded)
    }
}
