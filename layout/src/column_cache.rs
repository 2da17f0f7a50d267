//! Sparse offset ⇄ logical column index per line.
//!
//! Columns count code points, with a tab advancing to the next multiple of
//! the tab size. For each line the cache keeps the column at every
//! `column_checkpoint_interval`-th unit, so a query binary-searches a
//! checkpoint and scans at most one interval. Lines with neither tabs nor
//! surrogate pairs are [`LineData::Trivial`]: offset and column coincide.
use crate::{
    config::LayoutConfig,
    document::{is_high_surrogate, is_low_surrogate, splits_surrogate_pair, Document},
    error::invariant_violation,
    events::{splice_lines, Invalidation, LayoutListener},
    model::LayoutContext,
};
use std::cell::RefCell;

const TAB: u16 = b'\t' as u16;

#[derive(Debug, Clone, PartialEq, Eq)]
enum LineData {
    Trivial,
    /// Column at unit `i * interval`, for every `i` up to the line length.
    Checkpoints(Box<[u32]>),
}

#[derive(Debug)]
pub struct LogicalColumnCache {
    lines: RefCell<Vec<Option<LineData>>>,
    tab_size: usize,
    interval: usize,
    strict: bool,
}

impl LogicalColumnCache {
    pub fn new(config: &LayoutConfig) -> Self {
        Self {
            lines: RefCell::new(Vec::new()),
            tab_size: config.tab_size.max(1) as usize,
            interval: config.column_checkpoint_interval.max(2),
            strict: config.strict_invariants,
        }
    }

    pub fn tab_size(&self) -> usize {
        self.tab_size
    }

    /// Change the tab size, dropping every line.
    pub fn set_tab_size(&mut self, tab_size: usize) {
        self.tab_size = tab_size.max(1);
        self.reset();
    }

    /// Column of document `offset` on `line`. Offsets past the line end clamp to
    /// it; an offset inside a surrogate pair reports the pair's column.
    pub fn offset_to_column(&self, doc: &dyn Document, line: usize, offset: usize) -> usize {
        let start = doc.line_start(line);
        let text = doc.line_text(line);
        let mut rel = offset.clamp(start, start + text.len()) - start;
        if splits_surrogate_pair(text, rel) {
            rel -= 1;
        }
        self.with_line(doc, line, text, |data| match data {
            LineData::Trivial => rel,
            LineData::Checkpoints(checkpoints) => {
                let ix = rel / self.interval;
                scan_to_offset(
                    text,
                    ix * self.interval,
                    checkpoints[ix] as usize,
                    rel,
                    self.tab_size,
                )
            },
        })
    }

    /// Document offset of `column` on `line`. Columns past the line end clamp to
    /// the line end; a column inside a tab maps to the tab. Never returns an
    /// offset inside a surrogate pair.
    pub fn column_to_offset(&self, doc: &dyn Document, line: usize, column: usize) -> usize {
        let start = doc.line_start(line);
        let text = doc.line_text(line);
        let rel = self.with_line(doc, line, text, |data| match data {
            LineData::Trivial => column.min(text.len()),
            LineData::Checkpoints(checkpoints) => {
                let ix = checkpoints
                    .partition_point(|checkpoint| *checkpoint as usize <= column)
                    .saturating_sub(1);
                scan_to_column(
                    text,
                    ix * self.interval,
                    checkpoints[ix] as usize,
                    column,
                    self.tab_size,
                )
            },
        });
        start + rel
    }

    /// Number of lines with computed data.
    pub fn cached_lines(&self) -> usize {
        self.lines.borrow().iter().filter(|line| line.is_some()).count()
    }

    fn with_line<R>(
        &self,
        doc: &dyn Document,
        line: usize,
        text: &[u16],
        query: impl FnOnce(&LineData) -> R,
    ) -> R {
        let line_count = doc.line_count();
        let mut lines = self.lines.borrow_mut();
        if lines.len() != line_count {
            if !lines.is_empty() {
                invariant_violation(
                    self.strict,
                    format_args!(
                        "column cache holds {} lines, document has {line_count}",
                        lines.len()
                    ),
                );
                lines.clear();
            }
            lines.resize(line_count, None);
        }
        let line = line.min(line_count - 1);
        let data = lines[line].get_or_insert_with(|| self.build(text));
        query(data)
    }

    fn build(&self, text: &[u16]) -> LineData {
        let trivial = !text
            .iter()
            .any(|unit| *unit == TAB || is_high_surrogate(*unit) || is_low_surrogate(*unit));
        if trivial {
            return LineData::Trivial;
        }

        let mut checkpoints = Vec::with_capacity(text.len() / self.interval + 1);
        checkpoints.push(0u32);
        let mut column = 0;
        for (ix, unit) in text.iter().enumerate() {
            column = advance(text, ix, *unit, column, self.tab_size);
            if (ix + 1) % self.interval == 0 {
                checkpoints.push(u32::try_from(column).unwrap_or(u32::MAX));
            }
        }
        LineData::Checkpoints(checkpoints.into_boxed_slice())
    }
}

impl LayoutListener for LogicalColumnCache {
    fn invalidate(&mut self, invalidation: &Invalidation, ctx: &LayoutContext<'_>) {
        if !invalidation.text_changed {
            return;
        }
        let doc = ctx.document;
        let lines = self.lines.get_mut();
        if lines.is_empty() {
            return;
        }
        if let Some(old) = invalidation.old_line_count.filter(|old| *old != lines.len()) {
            invariant_violation(
                self.strict,
                format_args!("column cache held {} lines before an edit of a {old}-line document", lines.len()),
            );
            lines.clear();
            return;
        }
        let start = doc.line_at_offset(invalidation.start);
        let end = doc.line_at_offset(invalidation.end);
        splice_lines(lines, start, end, doc.line_count(), || None);
        tracing::trace!(start, end, "spliced column cache");
    }

    fn reset(&mut self) {
        self.lines.get_mut().clear();
    }
}

/// Where column queries go: the shared cache, or a plain scan for detached
/// readers that must not touch it.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ColumnLookup<'a> {
    Cached(&'a LogicalColumnCache),
    Scan { tab_size: usize },
}

impl ColumnLookup<'_> {
    pub(crate) fn offset_to_column(&self, doc: &dyn Document, line: usize, offset: usize) -> usize {
        match self {
            Self::Cached(cache) => cache.offset_to_column(doc, line, offset),
            Self::Scan { tab_size } => {
                let start = doc.line_start(line);
                column_of(doc.line_text(line), offset.saturating_sub(start), *tab_size)
            },
        }
    }

    pub(crate) fn column_to_offset(&self, doc: &dyn Document, line: usize, column: usize) -> usize {
        match self {
            Self::Cached(cache) => cache.column_to_offset(doc, line, column),
            Self::Scan { tab_size } => {
                doc.line_start(line) + offset_of(doc.line_text(line), column, *tab_size)
            },
        }
    }
}

/// Column after the unit at `ix`, given the column before it.
fn advance(text: &[u16], ix: usize, unit: u16, column: usize, tab_size: usize) -> usize {
    if unit == TAB {
        (column / tab_size + 1) * tab_size
    } else if is_low_surrogate(unit) && ix > 0 && is_high_surrogate(text[ix - 1]) {
        column
    } else {
        column + 1
    }
}

/// Column at `target`, scanning from a checkpoint at `from` with column `column`.
fn scan_to_offset(text: &[u16], from: usize, mut column: usize, target: usize, tab_size: usize) -> usize {
    for ix in from..target {
        column = advance(text, ix, text[ix], column, tab_size);
    }
    column
}

/// Offset of `target` column, scanning from a checkpoint at `from`.
fn scan_to_column(text: &[u16], from: usize, mut column: usize, target: usize, tab_size: usize) -> usize {
    let mut ix = from;
    if splits_surrogate_pair(text, ix) {
        ix += 1;
    }
    while ix < text.len() {
        if column >= target {
            return ix;
        }
        let unit = text[ix];
        let pair = is_high_surrogate(unit) && text.get(ix + 1).copied().is_some_and(is_low_surrogate);
        let next = if unit == TAB {
            (column / tab_size + 1) * tab_size
        } else {
            column + 1
        };
        if next > target {
            return ix;
        }
        column = next;
        ix += if pair { 2 } else { 1 };
    }
    text.len()
}

/// Column of `offset` within `text` by a full scan. Used where no cache may be
/// touched.
pub(crate) fn column_of(text: &[u16], offset: usize, tab_size: usize) -> usize {
    let mut offset = offset.min(text.len());
    if splits_surrogate_pair(text, offset) {
        offset -= 1;
    }
    scan_to_offset(text, 0, 0, offset, tab_size.max(1))
}

/// Offset of `column` within `text` by a full scan.
pub(crate) fn offset_of(text: &[u16], column: usize, tab_size: usize) -> usize {
    scan_to_column(text, 0, 0, column, tab_size.max(1))
}
