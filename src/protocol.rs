//! Versioned signing protocol parameters.
//!
//! A [`SchemaVersion`] fixes the digest used for RSA-PSS and which stamp
//! rects are removed from canonical content. Every record carries its
//! version, and verification always applies the rules of that version.

use crate::error::{Result, SignError};
use crate::geometry::Rect;
use serde::{Deserialize, Serialize};

/// Digest algorithm used for RSA-PSS signing and MGF1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DigestAlgorithm {
    /// Legacy. Accepted for verification only.
    Sha1,
    Sha256,
}

/// Which stamp rects are excluded when computing a record's canonical content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionRule {
    /// Only the record's own placement.
    OwnStamp,
    /// Every placement up to and including the record's own. Stamps placed
    /// by later records are dropped by their text lines only.
    AllStamps,
}

/// Protocol version tag stored in every signature record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum SchemaVersion {
    /// RSA-PSS over SHA-1 with maximum salt length, own-stamp exclusion.
    V1,
    /// RSA-PSS over SHA-256 with digest-length salt, all-stamps exclusion.
    V2,
}

impl SchemaVersion {
    /// The version new signatures are produced with.
    pub const CURRENT: SchemaVersion = SchemaVersion::V2;

    pub fn as_u32(self) -> u32 {
        match self {
            Self::V1 => 1,
            Self::V2 => 2,
        }
    }

    pub fn digest(self) -> DigestAlgorithm {
        match self {
            Self::V1 => DigestAlgorithm::Sha1,
            Self::V2 => DigestAlgorithm::Sha256,
        }
    }

    pub fn exclusion_rule(self) -> ExclusionRule {
        match self {
            Self::V1 => ExclusionRule::OwnStamp,
            Self::V2 => ExclusionRule::AllStamps,
        }
    }

    /// Whether new signatures may be produced under this version.
    pub fn can_sign(self) -> bool {
        self == Self::CURRENT
    }

    /// The exclusion set for a record placed at `own`, given the ledger's
    /// placements up to and including `own`.
    pub fn exclusion_set(self, own: &Rect, placements_through_own: &[Rect]) -> Vec<Rect> {
        match self.exclusion_rule() {
            ExclusionRule::OwnStamp => vec![*own],
            ExclusionRule::AllStamps => placements_through_own.to_vec(),
        }
    }

    /// Whether stamps of records placed after this one are left out of its
    /// content. A legacy record covers them, so nothing may be stamped after it.
    pub fn drops_later_stamps(self) -> bool {
        self.exclusion_rule() == ExclusionRule::AllStamps
    }
}

impl TryFrom<u32> for SchemaVersion {
    type Error = SignError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            other => Err(SignError::InvalidInput(format!(
                "unknown schema version {}",
                other
            ))),
        }
    }
}

impl From<SchemaVersion> for u32 {
    fn from(version: SchemaVersion) -> u32 {
        version.as_u32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_is_sha256() {
        assert_eq!(SchemaVersion::CURRENT.digest(), DigestAlgorithm::Sha256);
        assert!(SchemaVersion::CURRENT.can_sign());
        assert!(!SchemaVersion::V1.can_sign());
    }

    #[test]
    fn test_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&SchemaVersion::V2).unwrap(), "2");
        let v: SchemaVersion = serde_json::from_str("1").unwrap();
        assert_eq!(v, SchemaVersion::V1);
        assert!(serde_json::from_str::<SchemaVersion>("9").is_err());
    }

    #[test]
    fn test_exclusion_sets() {
        let own = Rect::new(1, 0.0, 0.0, 10.0, 10.0);
        let other = Rect::new(2, 0.0, 0.0, 10.0, 10.0);
        let all = [other, own];
        assert_eq!(SchemaVersion::V1.exclusion_set(&own, &all), vec![own]);
        assert_eq!(SchemaVersion::V2.exclusion_set(&own, &all), all.to_vec());
        assert!(SchemaVersion::V2.drops_later_stamps());
        assert!(!SchemaVersion::V1.drops_later_stamps());
    }
}
