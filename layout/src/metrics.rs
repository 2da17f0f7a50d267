//! Font metrics: the only glyph service shaping needs.
//!
//! Fragments never hold a reference to the editor or its font machinery; they
//! receive this narrow capability while being shaped.
use crate::{
    document::{is_high_surrogate, is_low_surrogate},
    model::FontStyle,
};
use rustc_hash::FxHashSet;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

pub trait FontMetrics {
    fn line_height(&self) -> f32;

    /// Advance of a space in the plain style; the unit for tab stops and virtual space.
    fn space_width(&self) -> f32;

    /// Upper bound on any single character advance, used for quick width estimates.
    fn max_char_width(&self) -> f32;

    /// Advance of one character, or `None` when it cannot be laid out.
    fn char_width(&self, ch: char, style: FontStyle) -> Option<f32>;

    /// Advances for shaped `text`, one entry per UTF-16 unit. Units continuing a
    /// cluster get zero. `None` when any glyph cannot be laid out.
    fn shape(&self, text: &[u16], style: FontStyle, rtl: bool) -> Option<Vec<f32>>;
}

/// Cell-grid metrics: every character is one or two cells wide according to
/// its East Asian width.
#[derive(Debug, Clone)]
pub struct MonospaceMetrics {
    cell_width: f32,
    line_height: f32,
    missing: FxHashSet<char>,
}

impl MonospaceMetrics {
    pub fn new(cell_width: f32, line_height: f32) -> Self {
        Self {
            cell_width,
            line_height,
            missing: FxHashSet::default(),
        }
    }

    /// Characters in `missing` fail to lay out, exercising the approximate fallback.
    pub fn with_missing_glyphs(mut self, missing: impl IntoIterator<Item = char>) -> Self {
        self.missing.extend(missing);
        self
    }

    pub fn cell_width(&self) -> f32 {
        self.cell_width
    }
}

impl Default for MonospaceMetrics {
    fn default() -> Self {
        Self::new(8.0, 16.0)
    }
}

impl FontMetrics for MonospaceMetrics {
    fn line_height(&self) -> f32 {
        self.line_height
    }

    fn space_width(&self) -> f32 {
        self.cell_width
    }

    fn max_char_width(&self) -> f32 {
        self.cell_width * 2.0
    }

    fn char_width(&self, ch: char, _style: FontStyle) -> Option<f32> {
        if self.missing.contains(&ch) {
            return None;
        }
        let cells = ch.width().unwrap_or(1);
        Some(cells as f32 * self.cell_width)
    }

    fn shape(&self, text: &[u16], _style: FontStyle, _rtl: bool) -> Option<Vec<f32>> {
        let decoded = String::from_utf16_lossy(text);
        if decoded.chars().any(|ch| self.missing.contains(&ch)) {
            return None;
        }

        let mut advances = Vec::with_capacity(text.len());
        for cluster in decoded.graphemes(true) {
            let units = cluster.encode_utf16().count();
            let cells = cluster.width().max(usize::from(!cluster.is_empty()));
            advances.push(cells as f32 * self.cell_width);
            advances.extend(std::iter::repeat_n(0.0, units - 1));
        }
        debug_assert_eq!(advances.len(), text.len());
        Some(advances)
    }
}

/// Advances for `text` when nothing better is known: one space per code point.
pub(crate) fn approximate_advances(text: &[u16], metrics: &dyn FontMetrics) -> Vec<f32> {
    let space = metrics.space_width();
    text.iter()
        .enumerate()
        .map(|(ix, unit)| {
            if ix > 0 && is_low_surrogate(*unit) && is_high_surrogate(text[ix - 1]) {
                0.0
            } else {
                space
            }
        })
        .collect()
}
