//! Fragments of one visual line in visual order.
//!
//! A visual line interleaves three sources: inline inlays, fold placeholders
//! and the [`LineLayout`] fragments of the text between them. Each fold or
//! inlay boundary ends the current text segment, so text fragments never span
//! one. After-line-end inlays close the visual line that ends a logical line.
//!
//! Every fragment carries its document offsets, logical and visual columns and
//! pixel extent, which is all [`CoordinateMapper`](crate::CoordinateMapper)
//! needs to convert between coordinate spaces.
use crate::{
    column_cache::ColumnLookup,
    config::LayoutConfig,
    coords::LogicalPosition,
    document::{is_high_surrogate, is_low_surrogate},
    line_layout::{Fragment, LineLayout, LineLayoutCache, ShapingContext, VisualFragments},
    model::{is_hidden, FoldRegion, Inlay, InlayPlacement, LayoutContext, TextAttributes},
    visual_line::VisualLine,
};
use smallvec::SmallVec;
use std::rc::Rc;

/// A fragment either shared with the chunk it was shaped in or built for the
/// visual line alone.
#[derive(Debug, Clone)]
pub enum FragmentRef {
    Shared(Rc<[Fragment]>, usize),
    Owned(Fragment),
}

impl FragmentRef {
    pub fn get(&self) -> &Fragment {
        match self {
            Self::Shared(fragments, index) => &fragments[*index],
            Self::Owned(fragment) => fragment,
        }
    }
}

/// One positioned fragment of a visual line.
#[derive(Debug, Clone)]
pub struct VisualLineFragment<'a> {
    fragment: FragmentRef,
    /// Document text covered; empty for placeholders and inlays.
    pub text: &'a [u16],
    pub start_offset: usize,
    pub end_offset: usize,
    pub start_logical_line: usize,
    pub end_logical_line: usize,
    pub start_logical_column: usize,
    pub end_logical_column: usize,
    pub start_visual_column: usize,
    pub end_visual_column: usize,
    pub start_x: f32,
    pub end_x: f32,
    /// Document offset of the logical line the text was shaped from.
    line_start: usize,
}

impl VisualLineFragment<'_> {
    pub fn fragment(&self) -> &Fragment {
        self.fragment.get()
    }

    pub fn is_rtl(&self) -> bool {
        self.fragment().is_rtl()
    }

    pub fn width(&self) -> f32 {
        self.end_x - self.start_x
    }

    pub fn visual_columns(&self) -> usize {
        self.end_visual_column - self.start_visual_column
    }

    /// Offset `count` code points past the fragment start, clamped to its end.
    fn offset_after_code_points(&self, count: usize) -> usize {
        let text = self.text;
        let mut ix = 0;
        for _ in 0..count {
            if ix >= text.len() {
                break;
            }
            let pair = is_high_surrogate(text[ix]) && text.get(ix + 1).copied().is_some_and(is_low_surrogate);
            ix += if pair { 2 } else { 1 };
        }
        self.start_offset + ix
    }

    fn code_points_before(&self, offset: usize) -> usize {
        let end = offset.clamp(self.start_offset, self.end_offset) - self.start_offset;
        char::decode_utf16(self.text[..end].iter().copied()).count()
    }

    /// X of the unit boundary at document `offset`, clamped to the fragment.
    pub fn offset_to_x(&self, offset: usize) -> f32 {
        let offset = offset.clamp(self.start_offset, self.end_offset);
        let fragment = self.fragment();
        match fragment {
            Fragment::SimpleText { range, .. } | Fragment::ComplexText { range, .. } => {
                let base = self.line_start + range.start;
                let advance = fragment.advance_to(offset - base) - fragment.advance_to(self.start_offset - base);
                if fragment.is_rtl() {
                    self.end_x - advance
                } else {
                    self.start_x + advance
                }
            },
            _ if offset <= self.start_offset => self.start_x,
            _ => self.end_x,
        }
    }

    /// Visual column of the boundary at `offset`. Offsets strictly inside a
    /// placeholder report its start.
    pub fn offset_to_visual_column(&self, offset: usize) -> usize {
        match self.fragment() {
            Fragment::SimpleText { .. } | Fragment::ComplexText { .. } => {
                let count = self.code_points_before(offset);
                if self.is_rtl() {
                    self.end_visual_column - count
                } else {
                    self.start_visual_column + count
                }
            },
            Fragment::Inlay { .. } => self.start_visual_column,
            _ if offset >= self.end_offset => self.end_visual_column,
            _ => self.start_visual_column,
        }
    }

    /// X of `column`. Columns inside a tab, placeholder, inlay or special
    /// character snap to its nearer edge, the start on a tie.
    pub fn x_at_visual_column(&self, column: usize) -> f32 {
        let column = column.clamp(self.start_visual_column, self.end_visual_column);
        let from_start = column - self.start_visual_column;
        let to_end = self.end_visual_column - column;
        match self.fragment() {
            Fragment::SimpleText { .. } | Fragment::ComplexText { .. } => {
                let count = if self.is_rtl() { to_end } else { from_start };
                self.offset_to_x(self.offset_after_code_points(count))
            },
            _ if from_start <= to_end => self.start_x,
            _ => self.end_x,
        }
    }

    /// Document offset and logical position of `column`. `leans_right` picks
    /// the side of a boundary; it is only consulted at fragment edges.
    pub fn logical_at_visual_column(&self, column: usize, leans_right: bool) -> (usize, LogicalPosition) {
        let column = column.clamp(self.start_visual_column, self.end_visual_column);
        let from_start = column - self.start_visual_column;
        let to_end = self.end_visual_column - column;
        let at_start = |leans_forward| {
            (
                self.start_offset,
                LogicalPosition::new(self.start_logical_line, self.start_logical_column)
                    .leaning_forward(leans_forward),
            )
        };
        let at_end = |leans_forward| {
            (
                self.end_offset,
                LogicalPosition::new(self.end_logical_line, self.end_logical_column)
                    .leaning_forward(leans_forward),
            )
        };
        match self.fragment() {
            Fragment::SimpleText { .. } | Fragment::ComplexText { .. } => {
                let (count, leans_forward) = if self.is_rtl() {
                    (to_end, !leans_right)
                } else {
                    (from_start, leans_right)
                };
                let offset = self.offset_after_code_points(count);
                let position = LogicalPosition::new(
                    self.start_logical_line,
                    self.start_logical_column + self.code_points_before(offset),
                )
                .leaning_forward(leans_forward);
                (offset, position)
            },
            Fragment::Tab { .. } | Fragment::SpecialChar { .. } => {
                let offset = if to_end == 0 {
                    self.end_offset
                } else {
                    self.start_offset
                };
                let position = LogicalPosition::new(
                    self.start_logical_line,
                    self.start_logical_column + from_start,
                )
                .leaning_forward(leans_right);
                (offset, position)
            },
            Fragment::FoldPlaceholder { .. } => {
                if from_start <= to_end {
                    at_start(true)
                } else {
                    at_end(false)
                }
            },
            Fragment::Inlay { .. } => at_start(from_start > 0),
        }
    }

    /// Column boundary nearest to `x` and whether `x` lies to its right.
    pub fn visual_column_at_x(&self, x: f32) -> (usize, bool) {
        match self.fragment() {
            Fragment::SimpleText { .. } | Fragment::ComplexText { .. } => {
                let rtl = self.is_rtl();
                let mut best = (0, self.offset_to_x(self.start_offset));
                let mut count = 0;
                let mut offset = self.start_offset;
                while offset < self.end_offset {
                    count += 1;
                    offset = self.offset_after_code_points(count);
                    let boundary = self.offset_to_x(offset);
                    if (boundary - x).abs() < (best.1 - x).abs() {
                        best = (count, boundary);
                    }
                }
                let column = if rtl {
                    self.end_visual_column - best.0
                } else {
                    self.start_visual_column + best.0
                };
                (column, x >= best.1)
            },
            _ if x - self.start_x <= self.end_x - x => (self.start_visual_column, true),
            _ => (self.end_visual_column, false),
        }
    }
}

struct Segment<'a> {
    fragments: VisualFragments<'a>,
    logical_line: usize,
    line_start: usize,
    end: usize,
}

/// Fragments of one visual line in visual order, positioned from the line's
/// indent. Single-pass; construct a new iterator to restart.
pub struct VisualLineFragmentsIterator<'a> {
    ctx: LayoutContext<'a>,
    config: &'a LayoutConfig,
    layouts: Option<&'a LineLayoutCache>,
    columns: ColumnLookup<'a>,
    end: usize,
    pos: usize,
    x: f32,
    visual_column: usize,
    regions: &'a [FoldRegion],
    inline: SmallVec<[&'a Inlay; 4]>,
    inline_ix: usize,
    after_line_end: SmallVec<[&'a Inlay; 2]>,
    after_ix: usize,
    segment: Option<Segment<'a>>,
}

impl<'a> VisualLineFragmentsIterator<'a> {
    pub(crate) fn new(
        ctx: LayoutContext<'a>,
        config: &'a LayoutConfig,
        layouts: Option<&'a LineLayoutCache>,
        columns: ColumnLookup<'a>,
        line: &VisualLine<'a>,
    ) -> Self {
        let start = line.start_offset;
        let end = line.end_offset;
        let inline_end = if line.ends_logical_line { end + 1 } else { end };
        let folds = ctx.folds;
        let inline = ctx
            .inlays
            .inlays_in(InlayPlacement::Inline, start..inline_end)
            .iter()
            .filter(|inlay| !is_hidden(inlay, folds))
            .collect();
        let after_line_end = if line.ends_logical_line {
            ctx.inlays
                .inlays_in(InlayPlacement::AfterLineEnd, start..end + 1)
                .iter()
                .filter(|inlay| !is_hidden(inlay, folds))
                .collect()
        } else {
            SmallVec::new()
        };
        let regions = folds.collapsed_regions();
        let first = regions.partition_point(|region| region.start() < start);
        let last = regions.partition_point(|region| region.start() < end);
        Self {
            ctx,
            config,
            layouts,
            columns,
            end,
            pos: start,
            x: line.indent_pixels(),
            visual_column: line.indent_columns(),
            regions: &regions[first..last],
            inline,
            inline_ix: 0,
            after_line_end,
            after_ix: 0,
            segment: None,
        }
    }

    fn layout(&self, line: usize) -> Rc<LineLayout> {
        match self.layouts {
            Some(layouts) => layouts.layout(line, &self.ctx, self.config),
            None => Rc::new(LineLayout::new(
                self.ctx.document.line_text(line),
                self.ctx.syntax,
                self.config,
            )),
        }
    }

    fn shaping(&self, line: usize) -> ShapingContext<'a> {
        match self.layouts {
            Some(layouts) => layouts.shaping(line, &self.ctx, self.config),
            None => ShapingContext {
                text: self.ctx.document.line_text(line),
                base_offset: self.ctx.document.line_start(line),
                attributes: self.ctx.attributes,
                metrics: self.ctx.metrics,
                config: self.config,
                chunks: None,
            },
        }
    }

    fn placeholder_width(&self, region: &FoldRegion) -> f32 {
        if let Some(size) = region.custom {
            return size.width;
        }
        match self.layouts {
            Some(layouts) => layouts
                .placeholder(&region.placeholder, &self.ctx, self.config)
                .width(),
            None => LineLayout::for_text(
                &region.placeholder,
                TextAttributes::default(),
                self.ctx.metrics,
                self.config,
            )
            .width(),
        }
    }

    fn column(&self, line: usize, offset: usize) -> usize {
        self.columns
            .offset_to_column(self.ctx.document, line, offset)
    }

    /// Emit a fragment at the running position.
    fn emit(
        &mut self,
        fragment: FragmentRef,
        offsets: (usize, usize),
        lines: (usize, usize),
        visual_columns: usize,
        width: f32,
        line_start: usize,
    ) -> VisualLineFragment<'a> {
        let doc = self.ctx.document;
        let text = match fragment.get() {
            Fragment::FoldPlaceholder { .. } | Fragment::Inlay { .. } => &[],
            _ => doc.text(offsets.0..offsets.1),
        };
        let item = VisualLineFragment {
            fragment,
            text,
            start_offset: offsets.0,
            end_offset: offsets.1,
            start_logical_line: lines.0,
            end_logical_line: lines.1,
            start_logical_column: self.column(lines.0, offsets.0),
            end_logical_column: self.column(lines.1, offsets.1),
            start_visual_column: self.visual_column,
            end_visual_column: self.visual_column + visual_columns,
            start_x: self.x,
            end_x: self.x + width,
            line_start,
        };
        self.visual_column = item.end_visual_column;
        self.x = item.end_x;
        item
    }

    fn inlay_fragment(&mut self, inlay: &Inlay) -> VisualLineFragment<'a> {
        let line = self.ctx.document.line_at_offset(inlay.offset);
        let columns = usize::from(inlay.placement == InlayPlacement::Inline);
        self.emit(
            FragmentRef::Owned(Fragment::Inlay {
                offset: inlay.offset,
                placement: inlay.placement,
                width: inlay.width,
            }),
            (inlay.offset, inlay.offset),
            (line, line),
            columns,
            inlay.width,
            self.ctx.document.line_start(line),
        )
    }
}

impl<'a> Iterator for VisualLineFragmentsIterator<'a> {
    type Item = VisualLineFragment<'a>;

    fn next(&mut self) -> Option<VisualLineFragment<'a>> {
        loop {
            if let Some(segment) = &mut self.segment {
                if let Some(positioned) = segment.fragments.next() {
                    let line_start = segment.line_start;
                    let line = segment.logical_line;
                    let (fragments, index) = positioned.shared();
                    let offsets = (line_start + positioned.range.start, line_start + positioned.range.end);
                    let columns = self.column(line, offsets.1) - self.column(line, offsets.0);
                    let visual_columns = match &fragments[index] {
                        Fragment::SpecialChar { .. } => 1,
                        _ => columns,
                    };
                    return Some(self.emit(
                        FragmentRef::Shared(fragments, index),
                        offsets,
                        (line, line),
                        visual_columns,
                        positioned.width(),
                        line_start,
                    ));
                }
                self.pos = segment.end;
                self.segment = None;
            }

            if let Some(inlay) = self
                .inline
                .get(self.inline_ix)
                .copied()
                .filter(|inlay| inlay.offset <= self.pos)
            {
                self.inline_ix += 1;
                return Some(self.inlay_fragment(inlay));
            }

            if let Some((region, rest)) = self
                .regions
                .split_first()
                .filter(|(region, _)| region.start() <= self.pos)
            {
                self.regions = rest;
                let doc = self.ctx.document;
                let start_line = doc.line_at_offset(region.start());
                let end_line = doc.line_at_offset(region.end());
                while self
                    .inline
                    .get(self.inline_ix)
                    .is_some_and(|inlay| inlay.offset < region.end())
                {
                    self.inline_ix += 1;
                }
                self.pos = region.end();
                let width = self.placeholder_width(region);
                return Some(self.emit(
                    FragmentRef::Owned(Fragment::FoldPlaceholder {
                        range: region.range.clone(),
                        placeholder: region.placeholder.clone(),
                        width,
                        columns: region.placeholder_columns(),
                    }),
                    (region.start(), region.end()),
                    (start_line, end_line),
                    region.placeholder_columns(),
                    width,
                    doc.line_start(start_line),
                ));
            }

            if self.pos < self.end {
                let doc = self.ctx.document;
                let line = doc.line_at_offset(self.pos);
                let line_start = doc.line_start(line);
                let mut end = self.end.min(doc.line_end(line));
                if let Some(region) = self.regions.first() {
                    end = end.min(region.start());
                }
                if let Some(inlay) = self.inline.get(self.inline_ix) {
                    end = end.min(inlay.offset);
                }
                if end > self.pos {
                    let layout = self.layout(line);
                    let fragments = layout.fragments_in_visual_order(
                        self.pos - line_start..end - line_start,
                        self.x,
                        self.shaping(line),
                    );
                    self.segment = Some(Segment {
                        fragments,
                        logical_line: line,
                        line_start,
                        end,
                    });
                    continue;
                }
                self.pos = self.end;
            }

            if let Some(inlay) = self.after_line_end.get(self.after_ix).copied() {
                self.after_ix += 1;
                return Some(self.inlay_fragment(inlay));
            }
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        column_cache::LogicalColumnCache,
        model::SoftWrap,
        test_support::Fixture,
        visual_line::VisualLineIterator,
    };

    fn dump(fixture: &Fixture, line: usize) -> Vec<String> {
        let config = LayoutConfig::default();
        let columns = LogicalColumnCache::new(&config);
        let ctx = fixture.ctx();
        let visual_line = VisualLineIterator::new(ctx, line).next().unwrap();
        VisualLineFragmentsIterator::new(ctx, &config, None, ColumnLookup::Cached(&columns), &visual_line)
            .map(|f| {
                let kind = match f.fragment() {
                    Fragment::SimpleText { .. } => "text",
                    Fragment::ComplexText { rtl: true, .. } => "rtl",
                    Fragment::ComplexText { .. } => "complex",
                    Fragment::Tab { .. } => "tab",
                    Fragment::SpecialChar { .. } => "special",
                    Fragment::FoldPlaceholder { .. } => "fold",
                    Fragment::Inlay { .. } => "inlay",
                };
                format!(
                    "{kind} {}..{} lc {}..{} vc {}..{} x {}..{}",
                    f.start_offset,
                    f.end_offset,
                    f.start_logical_column,
                    f.end_logical_column,
                    f.start_visual_column,
                    f.end_visual_column,
                    f.start_x,
                    f.end_x
                )
            })
            .collect()
    }

    #[test]
    fn text_and_tab() {
        stoat_log::test();
        let fixture = Fixture::new("ab\tc");
        insta::assert_debug_snapshot!(dump(&fixture, 0), @r#"
        [
            "text 0..2 lc 0..2 vc 0..2 x 0..20",
            "tab 2..3 lc 2..4 vc 2..4 x 20..40",
            "text 3..4 lc 4..5 vc 4..5 x 40..50",
        ]
        "#);
    }

    #[test]
    fn fold_placeholder_replaces_text() {
        let mut fixture = Fixture::new("if {\n  x\n} else");
        fixture.fold(FoldRegion::new(3..10, "{...}"));
        insta::assert_debug_snapshot!(dump(&fixture, 0), @r#"
        [
            "text 0..3 lc 0..3 vc 0..3 x 0..30",
            "fold 3..10 lc 3..1 vc 3..8 x 30..80",
            "text 10..15 lc 1..6 vc 8..13 x 80..130",
        ]
        "#);
    }

    #[test]
    fn inlays_take_their_place() {
        let mut fixture = Fixture::new("abc\nd");
        fixture.inlay(Inlay::inline(1, 15.0));
        fixture.inlay(Inlay::after_line_end(3, 25.0));
        insta::assert_debug_snapshot!(dump(&fixture, 0), @r#"
        [
            "text 0..1 lc 0..1 vc 0..1 x 0..10",
            "inlay 1..1 lc 1..1 vc 1..2 x 10..25",
            "text 1..3 lc 1..3 vc 2..4 x 25..45",
            "inlay 3..3 lc 3..3 vc 4..4 x 45..70",
        ]
        "#);
    }

    #[test]
    fn inlays_inside_folds_are_skipped() {
        let mut fixture = Fixture::new("a{bc}d");
        fixture.inlay(Inlay::inline(3, 15.0));
        fixture.inlay(Inlay::inline(1, 5.0));
        fixture.fold(FoldRegion::new(1..5, "~"));
        insta::assert_debug_snapshot!(dump(&fixture, 0), @r#"
        [
            "text 0..1 lc 0..1 vc 0..1 x 0..10",
            "inlay 1..1 lc 1..1 vc 1..2 x 10..15",
            "fold 1..5 lc 1..5 vc 2..3 x 15..25",
            "text 5..6 lc 5..6 vc 3..4 x 25..35",
        ]
        "#);
    }

    #[test]
    fn wrapped_line_starts_at_indent() {
        let mut fixture = Fixture::new("abcdef");
        fixture.wrap([SoftWrap::new(4).with_indent(2, 20.0)]);
        insta::assert_debug_snapshot!(dump(&fixture, 1), @r#"
        [
            "text 4..6 lc 4..6 vc 2..4 x 20..40",
        ]
        "#);
    }

    #[test]
    fn hebrew_segment_in_visual_order() {
        let fixture = Fixture::new("ab \u{5d0}\u{5d1}");
        let dumped = dump(&fixture, 0);
        assert_eq!(dumped.len(), 2);
        assert!(dumped[1].starts_with("rtl 3..5 lc 3..5 vc 3..5"));
    }

    #[test]
    fn column_and_x_helpers() {
        let fixture = Fixture::new("a\u{5d0}\u{5d1}\u{5d2}");
        let config = LayoutConfig::default();
        let columns = LogicalColumnCache::new(&config);
        let ctx = fixture.ctx();
        let line = VisualLineIterator::new(ctx, 0).next().unwrap();
        let fragments: Vec<_> =
            VisualLineFragmentsIterator::new(ctx, &config, None, ColumnLookup::Cached(&columns), &line)
                .collect();
        let rtl = &fragments[1];
        assert!(rtl.is_rtl());
        assert_eq!((rtl.start_visual_column, rtl.end_visual_column), (1, 4));
        // Logical start of the RTL run sits at its right edge.
        assert_eq!(rtl.offset_to_visual_column(1), 4);
        assert_eq!(rtl.offset_to_visual_column(4), 1);
        assert_eq!(rtl.offset_to_x(1), rtl.end_x);
        assert_eq!(rtl.x_at_visual_column(3), rtl.offset_to_x(2));
        let (offset, position) = rtl.logical_at_visual_column(3, true);
        assert_eq!(offset, 2);
        assert_eq!(position.column, 2);
        assert!(!position.leans_forward);
        assert_eq!(rtl.visual_column_at_x(rtl.start_x + 1.0), (1, true));
    }

    #[test]
    fn columns_inside_a_tab_snap_to_its_edges() {
        let fixture = Fixture::new("\tx");
        let config = LayoutConfig::default();
        let columns = LogicalColumnCache::new(&config);
        let ctx = fixture.ctx();
        let line = VisualLineIterator::new(ctx, 0).next().unwrap();
        let fragments: Vec<_> =
            VisualLineFragmentsIterator::new(ctx, &config, None, ColumnLookup::Cached(&columns), &line)
                .collect();
        let tab = &fragments[0];
        assert_eq!((tab.start_visual_column, tab.end_visual_column), (0, 4));

        let xs: Vec<f32> = (0..=4).map(|column| tab.x_at_visual_column(column)).collect();
        assert_eq!(xs, [0.0, 0.0, 0.0, 40.0, 40.0]);
        assert_eq!(tab.visual_column_at_x(15.0), (0, true));
        assert_eq!(tab.visual_column_at_x(25.0), (4, false));
        assert_eq!(fragments[1].x_at_visual_column(5), 50.0);
    }
}
