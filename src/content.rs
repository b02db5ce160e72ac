//! Canonical content extraction.
//!
//! The canonical content of a document is the text of every fragment that
//! does not touch an excluded region, in page-then-position order, joined by
//! [`FRAGMENT_SEPARATOR`]. It is the exact input to signing and verification,
//! which is what lets a visible stamp be drawn onto a page after signing: the
//! stamp's rect is excluded again when the content is recomputed.

use crate::document::{Document, TextFragment};
use crate::error::{Result, SignError};
use crate::geometry::{Rect, STAMP_PADDING};
use crate::stamp::StampMark;
use std::cmp::Ordering;

/// Separator between extracted fragments.
pub const FRAGMENT_SEPARATOR: u8 = b'\n';

/// Whether `fragment` on `page` touches any padded exclusion rect.
pub(crate) fn is_excluded(fragment: &TextFragment, page: u32, exclusions: &[Rect]) -> bool {
    let rect = fragment.rect(page);
    exclusions
        .iter()
        .filter(|r| r.page == page)
        .any(|r| r.padded(STAMP_PADDING).intersects_box(&rect))
}

/// Reading order: top edge descending, then left to right. Remaining ties are
/// broken on every field so the order never depends on storage order.
fn reading_order(a: &TextFragment, b: &TextFragment) -> Ordering {
    (b.y + b.height)
        .total_cmp(&(a.y + a.height))
        .then_with(|| a.x.total_cmp(&b.x))
        .then_with(|| a.y.total_cmp(&b.y))
        .then_with(|| a.text.cmp(&b.text))
        .then_with(|| a.width.total_cmp(&b.width))
        .then_with(|| a.height.total_cmp(&b.height))
}

/// Derive the canonical content of `document` with `exclusions` removed.
///
/// Fails with [`SignError::InvalidPlacement`] when an exclusion rect names a
/// page the document does not have. A fully excluded document yields empty
/// content.
pub fn extract_clean_content(document: &Document, exclusions: &[Rect]) -> Result<Vec<u8>> {
    extract_signed_content(document, exclusions, &[])
}

/// Like [`extract_clean_content`], but also drops the text lines of
/// `stamp_marks`. Any other text inside a marked rect is kept.
pub fn extract_signed_content(
    document: &Document,
    exclusions: &[Rect],
    stamp_marks: &[StampMark],
) -> Result<Vec<u8>> {
    for rect in exclusions {
        document.check_page(rect)?;
        if !rect.is_well_formed() {
            return Err(SignError::InvalidPlacement(format!(
                "exclusion rect on page {} has invalid geometry",
                rect.page
            )));
        }
    }

    let mut out = Vec::new();
    let mut first = true;
    for (index, page) in document.pages.iter().enumerate() {
        let number = u32::try_from(index + 1)
            .map_err(|_| SignError::InvalidInput("too many pages".to_string()))?;
        let mut kept: Vec<&TextFragment> = page
            .fragments
            .iter()
            .filter(|f| !is_excluded(f, number, exclusions))
            .filter(|f| !stamp_marks.iter().any(|m| m.matches(f, number)))
            .collect();
        kept.sort_by(|a, b| reading_order(a, b));

        for fragment in kept {
            if !first {
                out.push(FRAGMENT_SEPARATOR);
            }
            out.extend_from_slice(fragment.text.as_bytes());
            first = false;
        }
    }
    Ok(out)
}
