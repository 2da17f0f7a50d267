//! Typed change events and the listener seam the caches share.
//!
//! Every collaborator change reaches the engine as a [`LayoutEvent`]. The
//! engine reconciles events into a single [`Invalidation`] per change (or per
//! outermost batch) and hands it to each [`LayoutListener`].
use crate::{
    document::TextChange,
    model::{InlayPlacement, LayoutContext},
};
use std::ops::Range;

#[derive(Debug, Clone, PartialEq)]
pub enum LayoutEvent {
    /// Sent before the document changes, while it still holds the old text.
    BeforeTextChange(TextChange),
    /// Sent after the document changed. Must match the preceding
    /// [`BeforeTextChange`](Self::BeforeTextChange).
    TextChanged(TextChange),
    /// A fold region was collapsed, expanded, added or removed. The range is in
    /// current document offsets.
    FoldChanged { range: Range<usize> },
    InlayChanged {
        offset: usize,
        placement: InlayPlacement,
        flags: InlayChangeFlags,
    },
    /// Soft wraps inside `range` were recalculated.
    SoftWrapsRecalculated { range: Range<usize> },
    BatchStarted(BatchKind),
    BatchFinished(BatchKind),
    TabSizeChanged(u32),
    /// Font or line metrics changed; every width is stale.
    MetricsChanged,
}

/// Kinds of bulk operations during which invalidation is deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchKind {
    Document,
    Folding,
    Inlays,
}

/// What changed about an inlay. Adding or removing an inline inlay changes the
/// width of its line and should set `width_changed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InlayChangeFlags {
    pub width_changed: bool,
    pub height_changed: bool,
}

impl InlayChangeFlags {
    pub const WIDTH: Self = Self {
        width_changed: true,
        height_changed: false,
    };
    pub const HEIGHT: Self = Self {
        width_changed: false,
        height_changed: true,
    };
}

/// A reconciled invalidation: offsets `start..=end` in current document
/// coordinates must be recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invalidation {
    pub start: usize,
    pub end: usize,
    /// Text changed, so per-logical-line caches must splice.
    pub text_changed: bool,
    /// Logical line count before the first text change, for cross-checking
    /// cache lengths.
    pub old_line_count: Option<usize>,
}

impl Invalidation {
    /// Invalidation for an applied edit. `affected` is the range the edit
    /// disturbed in offsets before it, at least the replaced text; its end is
    /// moved past the edit.
    pub fn text(change: &TextChange, affected: Range<usize>, old_line_count: usize) -> Self {
        let old_end = change.offset + change.old_len;
        let affected_end = affected.end.max(old_end) - change.old_len + change.new_len;
        Self {
            start: change.offset.min(affected.start),
            end: affected_end,
            text_changed: true,
            old_line_count: Some(old_line_count),
        }
    }

    pub fn layout(range: Range<usize>) -> Self {
        Self {
            start: range.start,
            end: range.end.max(range.start),
            text_changed: false,
            old_line_count: None,
        }
    }
}

/// A cache that reacts to reconciled invalidations.
pub trait LayoutListener {
    fn invalidate(&mut self, invalidation: &Invalidation, ctx: &LayoutContext<'_>);

    /// Forget everything; entries are rebuilt on demand.
    fn reset(&mut self);
}

/// Resize `entries` to `target_len` by inserting or removing entries at
/// `start`, then replace `start..=end` with fresh entries. Returns every entry
/// removed or replaced. Entries outside the window keep their values.
pub(crate) fn splice_lines<T>(
    entries: &mut Vec<T>,
    start: usize,
    end: usize,
    target_len: usize,
    fill: impl Fn() -> T,
) -> Vec<T> {
    let mut removed = Vec::new();
    let start = start.min(entries.len());
    if target_len > entries.len() {
        let count = target_len - entries.len();
        entries.splice(start..start, std::iter::repeat_with(&fill).take(count));
    } else if target_len < entries.len() {
        let count = entries.len() - target_len;
        let drain_end = (start + count).min(entries.len());
        let drain_start = drain_end - count;
        removed.extend(entries.drain(drain_start..drain_end));
    }

    if let Some(last) = entries.len().checked_sub(1) {
        let start = start.min(last);
        let end = end.min(last);
        if start <= end {
            for entry in &mut entries[start..=end] {
                removed.push(std::mem::replace(entry, fill()));
            }
        }
    }
    removed
}
