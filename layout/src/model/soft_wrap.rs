//! Soft wraps and the soft-wrap collaborator.
//!
//! A soft wrap at offset `w` starts a new visual line at `w` without changing
//! the document. The continuation line is indented by the wrap's indent.
use crate::{
    document::{splits_surrogate_pair, Document, TextChange},
    model::FoldingModel,
};
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftWrap {
    pub offset: usize,
    pub indent_pixels: f32,
    pub indent_columns: usize,
}

impl SoftWrap {
    pub fn new(offset: usize) -> Self {
        Self {
            offset,
            indent_pixels: 0.0,
            indent_columns: 0,
        }
    }

    pub fn with_indent(mut self, columns: usize, pixels: f32) -> Self {
        self.indent_columns = columns;
        self.indent_pixels = pixels;
        self
    }
}

/// Read access to registered soft wraps.
///
/// Implementations never register a wrap at a logical line start, at a line
/// end, inside a surrogate pair, or strictly inside a collapsed fold region.
pub trait SoftWrapModel {
    /// Registered wraps sorted by offset.
    fn soft_wraps(&self) -> &[SoftWrap];

    /// Index of the wrap at `offset`, or the insertion point, like
    /// [`slice::binary_search`].
    fn soft_wrap_index(&self, offset: usize) -> Result<usize, usize> {
        self.soft_wraps()
            .binary_search_by_key(&offset, |wrap| wrap.offset)
    }

    /// Number of wraps at or before `offset`.
    fn wraps_up_to(&self, offset: usize) -> usize {
        self.soft_wraps().partition_point(|wrap| wrap.offset <= offset)
    }

    fn soft_wrap_at(&self, offset: usize) -> Option<&SoftWrap> {
        self.soft_wrap_index(offset)
            .ok()
            .map(|ix| &self.soft_wraps()[ix])
    }
}

/// In-memory soft-wrap model over a sorted `Vec`.
#[derive(Debug, Clone, Default)]
pub struct SoftWrapStore {
    wraps: Vec<SoftWrap>,
}

impl SoftWrapStore {
    pub fn new(doc: &dyn Document, wraps: impl IntoIterator<Item = SoftWrap>) -> Self {
        let mut wraps: Vec<SoftWrap> = wraps
            .into_iter()
            .filter(|wrap| is_valid_wrap(doc, wrap.offset))
            .collect();
        wraps.sort_by_key(|wrap| wrap.offset);
        wraps.dedup_by_key(|wrap| wrap.offset);
        Self { wraps }
    }

    /// Wrap every logical line after each `columns` UTF-16 units, the way a
    /// fixed-width viewport without word boundaries would.
    pub fn wrap_at_columns(doc: &dyn Document, columns: usize, indent: usize, indent_pixels: f32) -> Self {
        let columns = columns.max(1);
        let mut wraps = Vec::new();
        for line in 0..doc.line_count() {
            let start = doc.line_start(line);
            let end = doc.line_end(line);
            let mut offset = start + columns;
            while offset < end {
                wraps.push(SoftWrap::new(offset).with_indent(indent, indent_pixels));
                offset += columns;
            }
        }
        Self::new(doc, wraps)
    }

    /// Replace all wraps inside `range` with `wraps`, returning the range to
    /// announce as recalculated.
    pub fn replace_range(
        &mut self,
        doc: &dyn Document,
        range: Range<usize>,
        wraps: impl IntoIterator<Item = SoftWrap>,
    ) -> Range<usize> {
        self.wraps
            .retain(|wrap| wrap.offset < range.start || wrap.offset >= range.end);
        self.wraps.extend(
            wraps
                .into_iter()
                .filter(|wrap| range.contains(&wrap.offset) && is_valid_wrap(doc, wrap.offset)),
        );
        self.wraps.sort_by_key(|wrap| wrap.offset);
        self.wraps.dedup_by_key(|wrap| wrap.offset);
        range
    }

    /// Drop wraps strictly inside collapsed regions.
    pub fn remove_inside(&mut self, folds: &dyn FoldingModel) {
        self.wraps.retain(|wrap| {
            folds
                .collapsed_region_at(wrap.offset)
                .is_none_or(|region| region.range.start == wrap.offset)
        });
    }

    /// Shift wraps past an edit and drop those inside the replaced text.
    pub fn apply_change(&mut self, doc: &dyn Document, change: &TextChange) {
        let old_end = change.offset + change.old_len;
        self.wraps.retain_mut(|wrap| {
            if wrap.offset < change.offset {
                true
            } else if wrap.offset > old_end || (wrap.offset == old_end && change.old_len > 0) {
                wrap.offset = wrap.offset - change.old_len + change.new_len;
                true
            } else {
                false
            }
        });
        self.wraps.retain(|wrap| is_valid_wrap(doc, wrap.offset));
    }
}

impl SoftWrapModel for SoftWrapStore {
    fn soft_wraps(&self) -> &[SoftWrap] {
        &self.wraps
    }
}

fn is_valid_wrap(doc: &dyn Document, offset: usize) -> bool {
    if offset == 0 || offset >= doc.len() {
        return false;
    }
    let line = doc.line_at_offset(offset);
    let start = doc.line_start(line);
    let end = doc.line_end(line);
    offset != start
        && offset != end
        && !splits_surrogate_pair(doc.text(start..end), offset - start)
}
