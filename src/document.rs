//! Positioned-text document model.
//!
//! A document is a list of pages, each holding text fragments placed in
//! bottom-left-origin page coordinates, plus a free-form metadata map. Raw
//! document bytes are the JSON encoding of [`Document`]; encoding is
//! deterministic, so equal documents always produce equal bytes.

use crate::error::{Result, SignError};
use crate::geometry::Rect;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The current document format version.
pub const DOCUMENT_FORMAT_VERSION: u32 = 1;

/// US Letter, in points.
pub const LETTER_WIDTH: f64 = 612.0;
pub const LETTER_HEIGHT: f64 = 792.0;

/// A run of text occupying a box on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub text: String,
}

impl TextFragment {
    pub fn new<S: Into<String>>(x: f64, y: f64, width: f64, height: f64, text: S) -> Self {
        Self {
            x,
            y,
            width,
            height,
            text: text.into(),
        }
    }

    /// The fragment's box as a rect on `page`.
    pub fn rect(&self, page: u32) -> Rect {
        Rect::new(page, self.x, self.y, self.width, self.height)
    }
}

/// A single page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub fragments: Vec<TextFragment>,
}

impl Page {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            fragments: Vec::new(),
        }
    }

    /// A blank US Letter page.
    pub fn letter() -> Self {
        Self::new(LETTER_WIDTH, LETTER_HEIGHT)
    }

    /// Add a text fragment.
    pub fn with_text<S: Into<String>>(
        mut self,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        text: S,
    ) -> Self {
        self.fragments.push(TextFragment::new(x, y, width, height, text));
        self
    }
}

/// A document: pages plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub format_version: u32,
    pub pages: Vec<Page>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    /// Create a document from pages.
    pub fn new(pages: Vec<Page>) -> Self {
        Self {
            format_version: DOCUMENT_FORMAT_VERSION,
            pages,
            metadata: BTreeMap::new(),
        }
    }

    /// Parse and validate raw document bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(SignError::InvalidInput("empty document".to_string()));
        }
        let doc: Self = serde_json::from_slice(bytes)?;
        doc.validate()?;
        Ok(doc)
    }

    /// Encode the document to its raw bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Look up a 1-based page.
    pub fn page(&self, number: u32) -> Option<&Page> {
        let index = usize::try_from(number).ok()?.checked_sub(1)?;
        self.pages.get(index)
    }

    pub(crate) fn page_mut(&mut self, number: u32) -> Option<&mut Page> {
        let index = usize::try_from(number).ok()?.checked_sub(1)?;
        self.pages.get_mut(index)
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.format_version != DOCUMENT_FORMAT_VERSION {
            return Err(SignError::InvalidInput(format!(
                "unsupported document format version {}",
                self.format_version
            )));
        }
        if self.pages.is_empty() {
            return Err(SignError::InvalidInput(
                "document has no pages".to_string(),
            ));
        }
        for (i, page) in self.pages.iter().enumerate() {
            let number = i + 1;
            let size_ok = page.width.is_finite()
                && page.height.is_finite()
                && page.width > 0.0
                && page.height > 0.0;
            if !size_ok {
                return Err(SignError::InvalidInput(format!(
                    "page {} has an invalid size",
                    number
                )));
            }
            if let Some(j) = page
                .fragments
                .iter()
                .position(|f| !f.rect(0).is_well_formed())
            {
                return Err(SignError::InvalidInput(format!(
                    "fragment {} on page {} has invalid geometry",
                    j, number
                )));
            }
        }
        Ok(())
    }

    /// Check that `rect` targets an existing page.
    pub fn check_page(&self, rect: &Rect) -> Result<&Page> {
        self.page(rect.page).ok_or_else(|| {
            SignError::InvalidPlacement(format!(
                "page {} is outside the document (1..={})",
                rect.page,
                self.page_count()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document::new(vec![
            Page::letter().with_text(72.0, 700.0, 200.0, 12.0, "Title"),
            Page::letter(),
        ])
    }

    #[test]
    fn test_bytes_roundtrip_is_stable() {
        let doc = sample();
        let bytes = doc.to_bytes().unwrap();
        let back = Document::from_bytes(&bytes).unwrap();
        assert_eq!(back, doc);
        assert_eq!(back.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_empty_bytes_rejected() {
        let err = Document::from_bytes(b"").unwrap_err();
        assert!(matches!(err, SignError::InvalidInput(_)));
    }

    #[test]
    fn test_no_pages_rejected() {
        let bytes = Document::new(vec![]).to_bytes().unwrap();
        assert!(matches!(
            Document::from_bytes(&bytes),
            Err(SignError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_bad_fragment_rejected() {
        let doc = Document::new(vec![Page::letter().with_text(0.0, 0.0, -1.0, 5.0, "x")]);
        assert!(doc.validate().is_err());
    }

    #[test]
    fn test_page_lookup_is_one_based() {
        let doc = sample();
        assert!(doc.page(0).is_none());
        assert_eq!(doc.page(1).unwrap().fragments.len(), 1);
        assert!(doc.page(2).is_some());
        assert!(doc.page(3).is_none());
        let err = doc.check_page(&Rect::new(3, 0.0, 0.0, 1.0, 1.0)).unwrap_err();
        assert!(matches!(err, SignError::InvalidPlacement(_)));
    }
}
