//! Visual lines: displayed lines derived from logical lines, collapsed folds and
//! soft wraps.
//!
//! Visual lines are never materialized. A visual line starts at a visible
//! logical line start or at a soft wrap and runs to the next one. A collapsed
//! region joins every logical line it spans into the line holding its start:
//!
//! ```text
//! vl(o) = line_at(o) - folded_lines_before(o) + wraps_up_to(o)
//! ```
//!
//! Y coordinates stack each visual line's block inlays and custom fold heights
//! on top of the uniform line height.
use crate::model::{is_hidden, visible_block_height, Inlay, InlayPlacement, LayoutContext, SoftWrap};
use smallvec::SmallVec;

/// Offset and Y arithmetic over visual lines. Holds no state besides the
/// collaborators, so it is valid for exactly one snapshot.
#[derive(Debug, Clone, Copy)]
pub struct VisualLineMap<'a> {
    ctx: LayoutContext<'a>,
}

impl<'a> VisualLineMap<'a> {
    pub fn new(ctx: LayoutContext<'a>) -> Self {
        Self { ctx }
    }

    /// Clamp `offset` to the document and move it out of a collapsed region:
    /// offsets strictly inside one map to the region start.
    pub fn normalize(&self, offset: usize) -> usize {
        let offset = offset.min(self.ctx.document.len());
        match self.ctx.folds.collapsed_region_at(offset) {
            Some(region) if region.start() < offset => region.start(),
            _ => offset,
        }
    }

    /// Visual line containing `offset`. An offset at a soft wrap belongs to the
    /// line the wrap starts.
    pub fn offset_to_visual_line(&self, offset: usize) -> usize {
        let offset = self.normalize(offset);
        let ctx = &self.ctx;
        ctx.document.line_at_offset(offset) - ctx.folds.folded_lines_before(offset)
            + ctx.soft_wraps.wraps_up_to(offset)
    }

    pub fn visual_line_count(&self) -> usize {
        self.offset_to_visual_line(self.ctx.document.len()) + 1
    }

    /// Start offset of visual line `line`, clamped to the last line.
    pub fn visual_line_start(&self, line: usize) -> usize {
        let ctx = &self.ctx;
        let doc = ctx.document;
        let line = line.min(self.visual_line_count() - 1);

        let (mut lo, mut hi) = (0, doc.line_count() - 1);
        while lo < hi {
            let mid = (lo + hi).div_ceil(2);
            if self.offset_to_visual_line(doc.line_start(mid)) <= line {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }

        let mut base = doc.line_start(lo);
        while let Some(region) = base.checked_sub(1).and_then(|o| ctx.folds.collapsed_region_at(o)) {
            base = doc.line_start(doc.line_at_offset(region.start()));
        }

        let base_line = self.offset_to_visual_line(base);
        if base_line >= line {
            return base;
        }
        let wraps = ctx.soft_wraps.soft_wraps();
        let first = wraps.partition_point(|wrap| wrap.offset <= base);
        wraps
            .get(first + (line - base_line - 1))
            .map_or(base, |wrap| wrap.offset)
    }

    /// Exclusive end of the offsets whose inlays belong to `line`: the next
    /// line's start, or one past the document end for the last line.
    fn visual_line_bound(&self, line: usize) -> usize {
        if line + 1 < self.visual_line_count() {
            self.visual_line_start(line + 1)
        } else {
            self.ctx.document.len() + 1
        }
    }

    fn blocks_before(&self, offset: usize) -> f32 {
        let ctx = &self.ctx;
        let line_height = ctx.metrics.line_height();
        visible_block_height(ctx.inlays, ctx.folds, InlayPlacement::BlockAbove, 0..offset)
            + visible_block_height(ctx.inlays, ctx.folds, InlayPlacement::BlockBelow, 0..offset)
            + ctx.folds.custom_height_excess_before(offset, line_height)
    }

    /// Y of the top of `line`, above its block-above inlays.
    pub fn visual_line_top(&self, line: usize) -> f32 {
        let line = line.min(self.visual_line_count() - 1);
        let start = self.visual_line_start(line);
        line as f32 * self.ctx.metrics.line_height() + self.blocks_before(start)
    }

    /// Y of the text of `line`, below its block-above inlays.
    pub fn visual_line_to_y(&self, line: usize) -> f32 {
        let line = line.min(self.visual_line_count() - 1);
        let start = self.visual_line_start(line);
        let ctx = &self.ctx;
        line as f32 * ctx.metrics.line_height()
            + self.blocks_before(start)
            + visible_block_height(
                ctx.inlays,
                ctx.folds,
                InlayPlacement::BlockAbove,
                start..self.visual_line_bound(line),
            )
    }

    /// Visual line whose vertical extent, block inlays included, contains `y`.
    /// Clamps above the first and below the last line.
    pub fn y_to_visual_line(&self, y: f32) -> usize {
        let (mut lo, mut hi) = (0, self.visual_line_count() - 1);
        while lo < hi {
            let mid = (lo + hi).div_ceil(2);
            if self.visual_line_top(mid) <= y {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        lo
    }

    /// Total height: every visual line, every visible block inlay and the
    /// excess of custom fold regions.
    pub fn document_height(&self) -> f32 {
        self.visual_line_count() as f32 * self.ctx.metrics.line_height()
            + self.blocks_before(self.ctx.document.len() + 1)
    }
}

/// One visual line as produced by [`VisualLineIterator`].
#[derive(Debug, Clone, PartialEq)]
pub struct VisualLine<'a> {
    pub index: usize,
    pub start_offset: usize,
    /// Offset where the line's text ends: the logical line end, or the wrap
    /// starting the next visual line.
    pub end_offset: usize,
    pub start_logical_line: usize,
    pub end_logical_line: usize,
    /// Top of the line, above its block-above inlays.
    pub y: f32,
    /// Top of the text.
    pub text_y: f32,
    /// Height of the text row, custom fold excess included.
    pub height: f32,
    pub blocks_above: SmallVec<[&'a Inlay; 2]>,
    pub blocks_below: SmallVec<[&'a Inlay; 2]>,
    /// The wrap this line continues from, if it starts at one.
    pub soft_wrap: Option<&'a SoftWrap>,
    /// The line ends at a logical line end rather than a soft wrap.
    pub ends_logical_line: bool,
}

impl VisualLine<'_> {
    /// Y just below the line's block-below inlays.
    pub fn bottom(&self) -> f32 {
        self.text_y + self.height + self.blocks_below.iter().map(|inlay| inlay.height).sum::<f32>()
    }

    /// Start X of the text, after the soft-wrap indent.
    pub fn indent_pixels(&self) -> f32 {
        self.soft_wrap.map_or(0.0, |wrap| wrap.indent_pixels)
    }

    pub fn indent_columns(&self) -> usize {
        self.soft_wrap.map_or(0, |wrap| wrap.indent_columns)
    }
}

/// Forward iterator over visual lines starting at an arbitrary index.
///
/// The fold and wrap cursors only move forward, so each step costs amortized
/// O(1) lookups besides the inlay queries.
pub struct VisualLineIterator<'a> {
    ctx: LayoutContext<'a>,
    index: usize,
    pos: usize,
    y: f32,
    fold_ix: usize,
    wrap_ix: usize,
    done: bool,
}

impl<'a> VisualLineIterator<'a> {
    pub fn new(ctx: LayoutContext<'a>, start_line: usize) -> Self {
        let map = VisualLineMap::new(ctx);
        let index = start_line.min(map.visual_line_count() - 1);
        let pos = map.visual_line_start(index);
        Self {
            ctx,
            index,
            pos,
            y: map.visual_line_top(index),
            fold_ix: ctx
                .folds
                .collapsed_regions()
                .partition_point(|region| region.end() <= pos),
            wrap_ix: ctx.soft_wraps.wraps_up_to(pos),
            done: false,
        }
    }

    fn visible_blocks(&self, placement: InlayPlacement, range: std::ops::Range<usize>) -> SmallVec<[&'a Inlay; 2]> {
        let folds = self.ctx.folds;
        self.ctx
            .inlays
            .inlays_in(placement, range)
            .iter()
            .filter(|inlay| !is_hidden(inlay, folds))
            .collect()
    }
}

impl<'a> Iterator for VisualLineIterator<'a> {
    type Item = VisualLine<'a>;

    fn next(&mut self) -> Option<VisualLine<'a>> {
        if self.done {
            return None;
        }
        Some(self.advance())
    }
}

impl<'a> VisualLineIterator<'a> {
    /// Produce the current line and step past it. A fresh iterator always has
    /// a current line.
    pub(crate) fn advance(&mut self) -> VisualLine<'a> {
        let ctx = self.ctx;
        let doc = ctx.document;
        let regions = ctx.folds.collapsed_regions();
        let wraps = ctx.soft_wraps.soft_wraps();
        let line_height = ctx.metrics.line_height();

        let start = self.pos;
        let soft_wrap = self
            .wrap_ix
            .checked_sub(1)
            .map(|ix| &wraps[ix])
            .filter(|wrap| wrap.offset == start);

        let mut pos = start;
        let mut excess = 0.0;
        let (end, next, ends_logical_line) = loop {
            let line_end = doc.line_end(doc.line_at_offset(pos));
            let wrap = wraps
                .get(self.wrap_ix)
                .map(|wrap| wrap.offset)
                .filter(|offset| *offset <= line_end);
            let fold = regions
                .get(self.fold_ix)
                .filter(|region| region.start() <= line_end && wrap.is_none_or(|offset| region.start() < offset));
            if let Some(region) = fold {
                if let Some(size) = region.custom {
                    excess += (size.height - line_height).max(0.0);
                }
                pos = region.end();
                self.fold_ix += 1;
                continue;
            }
            match wrap {
                Some(offset) => {
                    self.wrap_ix += 1;
                    break (offset, offset, false);
                },
                None => break (line_end, line_end + 1, true),
            }
        };

        let bound = next.min(doc.len() + 1);
        let blocks_above = self.visible_blocks(InlayPlacement::BlockAbove, start..bound);
        let blocks_below = self.visible_blocks(InlayPlacement::BlockBelow, start..bound);
        let y = self.y;
        let text_y = y + blocks_above.iter().map(|inlay| inlay.height).sum::<f32>();
        let line = VisualLine {
            index: self.index,
            start_offset: start,
            end_offset: end,
            start_logical_line: doc.line_at_offset(start),
            end_logical_line: doc.line_at_offset(end),
            y,
            text_y,
            height: line_height + excess,
            blocks_above,
            blocks_below,
            soft_wrap,
            ends_logical_line,
        };

        self.y = line.bottom();
        self.index += 1;
        self.pos = next;
        self.done = next > doc.len();
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metrics::FontMetrics,
        model::{FoldRegion, SoftWrap},
        test_support::Fixture,
    };

    fn spans(fixture: &Fixture) -> Vec<(usize, usize, usize)> {
        VisualLineIterator::new(fixture.ctx(), 0)
            .map(|line| (line.index, line.start_offset, line.end_offset))
            .collect()
    }

    #[test]
    fn plain_lines_map_one_to_one() {
        let fixture = Fixture::new("ab\ncd\n\nef");
        let map = VisualLineMap::new(fixture.ctx());
        assert_eq!(map.visual_line_count(), 4);
        assert_eq!(map.offset_to_visual_line(4), 1);
        assert_eq!(map.visual_line_start(2), 6);
        assert_eq!(spans(&fixture), vec![(0, 0, 2), (1, 3, 5), (2, 6, 6), (3, 7, 9)]);
    }

    #[test]
    fn empty_document_has_one_line() {
        let fixture = Fixture::new("");
        let map = VisualLineMap::new(fixture.ctx());
        assert_eq!(map.visual_line_count(), 1);
        assert_eq!(map.visual_line_start(5), 0);
        assert_eq!(spans(&fixture), vec![(0, 0, 0)]);
    }

    #[test]
    fn collapsed_fold_joins_lines() {
        // 0: "fn a() {" 1: "  body" 2: "}" 3: "fn b()"
        let mut fixture = Fixture::new("fn a() {\n  body\n}\nfn b()");
        fixture.fold(FoldRegion::new(8..16, "..."));
        let map = VisualLineMap::new(fixture.ctx());
        assert_eq!(map.visual_line_count(), 2);
        assert_eq!(map.normalize(12), 8);
        assert_eq!(map.offset_to_visual_line(12), 0);
        assert_eq!(map.offset_to_visual_line(18), 1);
        assert_eq!(map.visual_line_start(1), 18);
        assert_eq!(spans(&fixture), vec![(0, 0, 17), (1, 18, 24)]);
    }

    #[test]
    fn soft_wraps_split_lines() {
        let mut fixture = Fixture::new("abcdefgh\nij");
        fixture.wrap([SoftWrap::new(3), SoftWrap::new(6).with_indent(2, 10.0)]);
        let map = VisualLineMap::new(fixture.ctx());
        assert_eq!(map.visual_line_count(), 4);
        assert_eq!(map.offset_to_visual_line(3), 1);
        assert_eq!(map.offset_to_visual_line(2), 0);
        assert_eq!(map.visual_line_start(2), 6);
        assert_eq!(map.visual_line_start(3), 9);

        let lines: Vec<_> = VisualLineIterator::new(fixture.ctx(), 1).collect();
        assert_eq!(lines.len(), 3);
        assert!(!lines[0].ends_logical_line);
        assert_eq!(lines[1].indent_pixels(), 10.0);
        assert_eq!(lines[1].indent_columns(), 2);
        assert!(lines[2].ends_logical_line);
        assert_eq!(lines[2].start_logical_line, 1);
    }

    #[test]
    fn wrap_after_fold_on_same_line() {
        let mut fixture = Fixture::new("ab{\n}cdefg\nxy");
        fixture.fold(FoldRegion::new(2..5, "{}"));
        fixture.wrap([SoftWrap::new(7)]);
        let map = VisualLineMap::new(fixture.ctx());
        assert_eq!(map.visual_line_count(), 3);
        assert_eq!(map.visual_line_start(1), 7);
        assert_eq!(map.visual_line_start(2), 11);
        assert_eq!(spans(&fixture), vec![(0, 0, 7), (1, 7, 10), (2, 11, 13)]);
    }

    #[test]
    fn y_accounts_for_blocks_and_custom_folds() {
        let mut fixture = Fixture::new("a\nb\nc\nd");
        let line_height = fixture.metrics.line_height();
        fixture.inlay(Inlay::block_above(2, 30.0, 7.0));
        fixture.inlay(Inlay::block_below(2, 30.0, 5.0));
        fixture.fold(FoldRegion::custom(4..5, 40.0, line_height + 11.0));
        let map = VisualLineMap::new(fixture.ctx());

        assert_eq!(map.visual_line_top(1), line_height);
        assert_eq!(map.visual_line_to_y(1), line_height + 7.0);
        assert_eq!(map.visual_line_top(2), 2.0 * line_height + 12.0);
        assert_eq!(map.visual_line_top(3), 3.0 * line_height + 23.0);
        assert_eq!(map.document_height(), 4.0 * line_height + 23.0);

        let lines: Vec<_> = VisualLineIterator::new(fixture.ctx(), 0).collect();
        for line in &lines {
            assert_eq!(line.y, map.visual_line_top(line.index));
            assert_eq!(line.text_y, map.visual_line_to_y(line.index));
        }
        assert_eq!(lines[2].height, line_height + 11.0);
        assert_eq!(lines[1].blocks_below.len(), 1);

        assert_eq!(map.y_to_visual_line(-5.0), 0);
        assert_eq!(map.y_to_visual_line(line_height + 3.0), 1);
        assert_eq!(map.y_to_visual_line(2.0 * line_height + 11.0), 1);
        assert_eq!(map.y_to_visual_line(1e9), 3);
    }

    #[test]
    fn blocks_inside_folds_are_hidden() {
        let mut fixture = Fixture::new("a{\nb\n}c");
        fixture.inlay(Inlay::block_above(3, 10.0, 9.0));
        fixture.fold(FoldRegion::new(1..7, "{}"));
        let map = VisualLineMap::new(fixture.ctx());
        let line_height = fixture.metrics.line_height();
        assert_eq!(map.visual_line_count(), 1);
        assert_eq!(map.document_height(), line_height);
        let line = VisualLineIterator::new(fixture.ctx(), 0).next().unwrap();
        assert!(line.blocks_above.is_empty());
    }

    #[test]
    fn iterator_starts_mid_document() {
        let fixture = Fixture::new(&"line\n".repeat(50));
        let line = VisualLineIterator::new(fixture.ctx(), 30).next().unwrap();
        assert_eq!(line.start_offset, 150);
        assert_eq!(line.y, 30.0 * fixture.metrics.line_height());
        assert_eq!(VisualLineIterator::new(fixture.ctx(), 30).count(), 21);
    }
}
