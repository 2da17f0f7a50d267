//! The document text collaborator.
//!
//! The engine never owns or mutates text. It reads an immutable snapshot
//! through [`Document`] and learns about edits from a
//! [`BeforeTextChange`](crate::LayoutEvent::BeforeTextChange) /
//! [`TextChanged`](crate::LayoutEvent::TextChanged) pair carrying a [`TextChange`].
//!
//! Offsets count UTF-16 code units. Lines are separated by `\n`; the separator
//! belongs to the line it terminates but is excluded from [`Document::line_end`].
use std::{ops::Range, sync::Arc};

/// Read access to one immutable snapshot of the document text.
pub trait Document {
    /// Total length in UTF-16 units.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of lines. An empty document has one empty line.
    fn line_count(&self) -> usize;

    /// Offset of the first unit of `line`.
    fn line_start(&self, line: usize) -> usize;

    /// Offset just past the last unit of `line`, excluding the line separator.
    fn line_end(&self, line: usize) -> usize;

    /// Line containing `offset`, clamped to the last line.
    fn line_at_offset(&self, offset: usize) -> usize;

    /// Text in `range`, clamped to the document.
    fn text(&self, range: Range<usize>) -> &[u16];

    fn line_text(&self, line: usize) -> &[u16] {
        self.text(self.line_start(line)..self.line_end(line))
    }
}

/// An edit delivered as a before/after pair: `old_len` units at `offset` were
/// replaced by `new_len` units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextChange {
    pub offset: usize,
    pub old_len: usize,
    pub new_len: usize,
}

impl TextChange {
    pub fn new(offset: usize, old_len: usize, new_len: usize) -> Self {
        Self {
            offset,
            old_len,
            new_len,
        }
    }

    pub fn old_range(&self) -> Range<usize> {
        self.offset..self.offset + self.old_len
    }

    pub fn new_range(&self) -> Range<usize> {
        self.offset..self.offset + self.new_len
    }
}

/// Immutable, cheaply clonable UTF-16 text with a line-start index.
#[derive(Clone)]
pub struct TextSnapshot {
    text: Arc<[u16]>,
    /// Never empty: line 0 starts at 0.
    line_starts: Arc<[usize]>,
}

impl Default for TextSnapshot {
    fn default() -> Self {
        Self::from_units(Vec::new())
    }
}

impl TextSnapshot {
    pub fn new(text: &str) -> Self {
        Self::from_units(text.encode_utf16().collect())
    }

    pub fn from_units(units: Vec<u16>) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            units
                .iter()
                .enumerate()
                .filter(|(_, unit)| **unit == u16::from(b'\n'))
                .map(|(ix, _)| ix + 1),
        );
        Self {
            text: units.into(),
            line_starts: line_starts.into(),
        }
    }

    /// Replace `old_len` units at `offset` with `new_text`, returning the new
    /// snapshot and the change to announce.
    pub fn edit(&self, offset: usize, old_len: usize, new_text: &str) -> (Self, TextChange) {
        let offset = offset.min(self.text.len());
        let old_len = old_len.min(self.text.len() - offset);
        let inserted: Vec<u16> = new_text.encode_utf16().collect();

        let mut units = Vec::with_capacity(self.text.len() - old_len + inserted.len());
        units.extend_from_slice(&self.text[..offset]);
        units.extend_from_slice(&inserted);
        units.extend_from_slice(&self.text[offset + old_len..]);

        let change = TextChange::new(offset, old_len, inserted.len());
        (Self::from_units(units), change)
    }

    pub fn units(&self) -> &[u16] {
        &self.text
    }
}

impl std::fmt::Display for TextSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&String::from_utf16_lossy(&self.text))
    }
}

impl std::fmt::Debug for TextSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextSnapshot")
            .field("len", &self.text.len())
            .field("lines", &self.line_starts.len())
            .finish()
    }
}

impl Document for TextSnapshot {
    fn len(&self) -> usize {
        self.text.len()
    }

    fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    fn line_start(&self, line: usize) -> usize {
        let line = line.min(self.line_starts.len() - 1);
        self.line_starts[line]
    }

    fn line_end(&self, line: usize) -> usize {
        let line = line.min(self.line_starts.len() - 1);
        match self.line_starts.get(line + 1) {
            Some(next) => next - 1,
            None => self.text.len(),
        }
    }

    fn line_at_offset(&self, offset: usize) -> usize {
        let offset = offset.min(self.text.len());
        self.line_starts.partition_point(|start| *start <= offset) - 1
    }

    fn text(&self, range: Range<usize>) -> &[u16] {
        let end = range.end.min(self.text.len());
        let start = range.start.min(end);
        &self.text[start..end]
    }
}

/// True for the first unit of a surrogate pair.
pub(crate) fn is_high_surrogate(unit: u16) -> bool {
    (0xD800..0xDC00).contains(&unit)
}

/// True for the second unit of a surrogate pair.
pub(crate) fn is_low_surrogate(unit: u16) -> bool {
    (0xDC00..0xE000).contains(&unit)
}

/// True when `offset` falls strictly between the two units of a surrogate pair.
pub(crate) fn splits_surrogate_pair(text: &[u16], offset: usize) -> bool {
    offset > 0
        && offset < text.len()
        && is_high_surrogate(text[offset - 1])
        && is_low_surrogate(text[offset])
}
