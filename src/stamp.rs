//! Visible stamp rendering.

use crate::document::TextFragment;
use crate::geometry::{Rect, STAMP_PADDING};
use chrono::{DateTime, Utc};

/// Inset between the stamp border and its text.
pub const STAMP_INSET: f64 = 6.0;

/// Format used for the stamp's date line.
pub const STAMP_DATE_FORMAT: &str = "%d/%m/%Y %H:%M";

/// The human-visible mark drawn at signing time.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamp {
    pub signer_display_name: String,
    pub signed_at: DateTime<Utc>,
}

impl Stamp {
    pub fn new<S: Into<String>>(signer_display_name: S, signed_at: DateTime<Utc>) -> Self {
        Self {
            signer_display_name: signer_display_name.into(),
            signed_at,
        }
    }

    pub fn lines(&self) -> [String; 2] {
        [
            format!("Signed by: {}", self.signer_display_name),
            format!("Date: {}", self.signed_at.format(STAMP_DATE_FORMAT)),
        ]
    }

    /// Lay the stamp text out as fragments strictly inside `rect`.
    pub fn render(&self, rect: &Rect) -> Vec<TextFragment> {
        let lines = self.lines();
        let inner_width = (rect.width - 2.0 * STAMP_INSET).max(0.0);
        let line_height = ((rect.height - 2.0 * STAMP_INSET) / lines.len() as f64).max(0.0);
        let top = rect.top() - STAMP_INSET;

        lines
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let y = top - line_height * (i + 1) as f64;
                TextFragment::new(rect.x + STAMP_INSET, y, inner_width, line_height, text)
            })
            .collect()
    }

    /// The stamp as drawn at `placement`.
    pub fn mark(&self, placement: Rect) -> StampMark {
        StampMark {
            placement,
            lines: self.lines(),
        }
    }
}

/// What a recorded stamp put on the page: its rect and its text lines.
///
/// Used to drop a later record's stamp text from an earlier record's content
/// without hiding anything else written into the later rect.
#[derive(Debug, Clone, PartialEq)]
pub struct StampMark {
    pub placement: Rect,
    pub lines: [String; 2],
}

impl StampMark {
    /// Whether `fragment` on `page` is one of this stamp's own lines.
    pub fn matches(&self, fragment: &TextFragment, page: u32) -> bool {
        page == self.placement.page
            && self.lines.contains(&fragment.text)
            && self
                .placement
                .padded(STAMP_PADDING)
                .intersects_box(&fragment.rect(page))
    }
}
