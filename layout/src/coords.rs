//! Coordinate types for the four spaces the engine maps between.
//!
//! ```text
//! offset (usize)           UTF-16 index into the document
//!   | Document line index + LogicalColumnCache
//! LogicalPosition          (line, tab/surrogate-aware column)
//!   | folds, soft wraps, inlays, bidi reordering
//! VisualPosition           (visual line, visual column)
//!   | fragment widths, line height, block inlays
//! PixelPoint               (x, y)
//! ```
//!
//! The spaces are distinct types so they cannot be mixed up.

/// A position in document terms: logical line plus a column in which tabs
/// expand to the next tab stop and a surrogate pair counts once.
///
/// `leans_forward` says which neighbouring character the position belongs to
/// when that matters (bidi boundaries, inlays, folds): `true` associates it with
/// the character that follows, `false` with the one before.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct LogicalPosition {
    pub line: usize,
    pub column: usize,
    pub leans_forward: bool,
}

impl LogicalPosition {
    pub fn new(line: usize, column: usize) -> Self {
        Self {
            line,
            column,
            leans_forward: false,
        }
    }

    pub fn leaning_forward(mut self, leans_forward: bool) -> Self {
        self.leans_forward = leans_forward;
        self
    }
}

/// A position on screen in character cells: visual line plus visual column
/// after folding, soft wrapping, inline decorations and bidi reordering.
///
/// `leans_right` selects the glyph on the right of the column boundary
/// (`true`) or the one on its left (`false`).
///
/// # Example
///
/// ```text
/// Document:  fn main() {    body    }
/// Folded:    fn main() {...}
///                       ^^^
///                       placeholder occupies visual columns 11..14
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct VisualPosition {
    pub line: usize,
    pub column: usize,
    pub leans_right: bool,
}

impl VisualPosition {
    pub fn new(line: usize, column: usize) -> Self {
        Self {
            line,
            column,
            leans_right: false,
        }
    }

    pub fn leaning_right(mut self, leans_right: bool) -> Self {
        self.leans_right = leans_right;
        self
    }
}

/// Pixel coordinates relative to the top-left corner of the text area.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PixelPoint {
    pub x: f32,
    pub y: f32,
}

impl PixelPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}
