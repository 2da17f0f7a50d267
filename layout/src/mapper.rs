//! Conversions between offsets, logical positions, visual positions and pixels.
//!
//! The mapper keeps no state of its own. Each query walks the fragments of
//! the one visual line involved, reading line layouts and logical columns from
//! the engine caches when it has them.
//!
//! Positions at an ambiguous boundary (a bidi direction change, a fold edge,
//! an inlay or a soft wrap) resolve through their lean flag, so exactly one of
//! the two adjacent visual positions is returned for each flag value.
use crate::{
    column_cache::{ColumnLookup, LogicalColumnCache},
    config::LayoutConfig,
    coords::{LogicalPosition, PixelPoint, VisualPosition},
    document::splits_surrogate_pair,
    fragments::{VisualLineFragment, VisualLineFragmentsIterator},
    line_layout::{Fragment, LineLayout, LineLayoutCache},
    model::{InlayPlacement, LayoutContext},
    visual_line::{VisualLine, VisualLineIterator, VisualLineMap},
};
use std::rc::Rc;

/// Translates between the four coordinate spaces for one snapshot of
/// [`LayoutContext`].
#[derive(Clone, Copy)]
pub struct CoordinateMapper<'a> {
    ctx: LayoutContext<'a>,
    config: &'a LayoutConfig,
    layouts: Option<&'a LineLayoutCache>,
    columns: ColumnLookup<'a>,
}

impl std::fmt::Debug for CoordinateMapper<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinateMapper")
            .field("ctx", &self.ctx)
            .field("detached", &self.is_detached())
            .finish_non_exhaustive()
    }
}

/// A visual line together with its fragments.
struct LineFragments<'a> {
    line: VisualLine<'a>,
    fragments: Vec<VisualLineFragment<'a>>,
}

impl<'a> LineFragments<'a> {
    /// Fragments that occupy columns, i.e. everything but after-line-end inlays.
    fn columned(&self) -> impl DoubleEndedIterator<Item = &VisualLineFragment<'a>> + '_ {
        self.fragments.iter().filter(|fragment| {
            !matches!(
                fragment.fragment(),
                Fragment::Inlay {
                    placement: InlayPlacement::AfterLineEnd,
                    ..
                }
            )
        })
    }

    fn end_column(&self) -> usize {
        self.columned()
            .map(|fragment| fragment.end_visual_column)
            .max()
            .unwrap_or_else(|| self.line.indent_columns())
    }

    fn start_column(&self) -> usize {
        self.columned()
            .map(|fragment| fragment.start_visual_column)
            .min()
            .unwrap_or_else(|| self.line.indent_columns())
    }

    /// X where virtual space starts: after every fragment, after-line-end
    /// inlays included.
    fn end_x(&self) -> f32 {
        self.fragments
            .last()
            .map_or(self.line.indent_pixels(), |fragment| fragment.end_x)
    }

    /// Fragment owning visual `column`: the one to its right when leaning right,
    /// the one to its left otherwise, falling back to the other side.
    fn fragment_at_column(&self, column: usize, leans_right: bool) -> Option<&VisualLineFragment<'a>> {
        let right = || {
            self.columned()
                .find(|f| f.start_visual_column <= column && column < f.end_visual_column)
        };
        let left = || {
            self.columned()
                .rev()
                .find(|f| f.start_visual_column < column && column <= f.end_visual_column)
        };
        if leans_right {
            right().or_else(left)
        } else {
            left().or_else(right)
        }
    }
}

impl<'a> CoordinateMapper<'a> {
    /// A mapper reading and filling the engine caches.
    pub fn new(
        ctx: LayoutContext<'a>,
        config: &'a LayoutConfig,
        layouts: &'a LineLayoutCache,
        columns: &'a LogicalColumnCache,
    ) -> Self {
        Self {
            ctx,
            config,
            layouts: Some(layouts),
            columns: ColumnLookup::Cached(columns),
        }
    }

    /// A read-only mapper that touches no cache. Layouts and columns are
    /// recomputed per query, so it is usable on a snapshot from any thread that
    /// owns the collaborators.
    pub fn detached(ctx: LayoutContext<'a>, config: &'a LayoutConfig) -> Self {
        Self {
            ctx,
            config,
            layouts: None,
            columns: ColumnLookup::Scan {
                tab_size: config.tab_size as usize,
            },
        }
    }

    pub fn is_detached(&self) -> bool {
        self.layouts.is_none()
    }

    pub fn context(&self) -> LayoutContext<'a> {
        self.ctx
    }

    pub fn config(&self) -> &'a LayoutConfig {
        self.config
    }

    pub fn visual_lines(&self) -> VisualLineMap<'a> {
        VisualLineMap::new(self.ctx)
    }

    pub fn visual_line_count(&self) -> usize {
        self.visual_lines().visual_line_count()
    }

    /// Visual lines from `start_line` on.
    pub fn visual_line_iter(&self, start_line: usize) -> VisualLineIterator<'a> {
        VisualLineIterator::new(self.ctx, start_line)
    }

    /// Visual line `line`, clamped to the last one.
    pub fn visual_line(&self, line: usize) -> VisualLine<'a> {
        self.visual_line_iter(line).advance()
    }

    /// Fragments of `line` in visual order.
    pub fn fragments(&self, line: &VisualLine<'a>) -> VisualLineFragmentsIterator<'a> {
        VisualLineFragmentsIterator::new(self.ctx, self.config, self.layouts, self.columns, line)
    }

    /// Layout of logical line `line`; cached unless the mapper is detached.
    pub fn line_layout(&self, line: usize) -> Rc<LineLayout> {
        match self.layouts {
            Some(layouts) => layouts.layout(line, &self.ctx, self.config),
            None => Rc::new(LineLayout::new(
                self.ctx.document.line_text(line),
                self.ctx.syntax,
                self.config,
            )),
        }
    }

    pub fn is_layout_computed(&self, line: usize) -> bool {
        self.layouts.is_some_and(|layouts| layouts.is_computed(line))
    }

    fn line_fragments(&self, line: usize) -> LineFragments<'a> {
        let line = self.visual_line(line);
        let fragments = self.fragments(&line).collect();
        LineFragments { line, fragments }
    }

    /// Clamp `offset` to the document and off the low half of a surrogate pair.
    fn clamp_offset(&self, offset: usize) -> usize {
        let doc = self.ctx.document;
        let offset = offset.min(doc.len());
        let line = doc.line_at_offset(offset);
        let start = doc.line_start(line);
        if splits_surrogate_pair(doc.line_text(line), offset - start) {
            offset - 1
        } else {
            offset
        }
    }

    pub fn offset_to_logical(&self, offset: usize, leans_forward: bool) -> LogicalPosition {
        let offset = self.clamp_offset(offset);
        let doc = self.ctx.document;
        let line = doc.line_at_offset(offset);
        LogicalPosition::new(line, self.columns.offset_to_column(doc, line, offset))
            .leaning_forward(leans_forward)
    }

    /// Offset of a logical position. Columns beyond the line end clamp to it;
    /// a column inside a tab maps to the tab.
    pub fn logical_to_offset(&self, position: LogicalPosition) -> usize {
        let doc = self.ctx.document;
        let line = position.line.min(doc.line_count() - 1);
        self.columns.column_to_offset(doc, line, position.column)
    }

    /// Visual line of `offset`. A soft-wrap offset leaning backward stays on
    /// the line the wrap ends.
    pub fn offset_to_visual_line(&self, offset: usize, leans_forward: bool) -> usize {
        let map = self.visual_lines();
        let offset = self.clamp_offset(offset);
        let normalized = map.normalize(offset);
        let line = map.offset_to_visual_line(normalized);
        let at_wrap = normalized == offset && self.ctx.soft_wraps.soft_wrap_at(offset).is_some();
        if at_wrap && !leans_forward && line > 0 {
            line - 1
        } else {
            line
        }
    }

    pub fn offset_to_visual(&self, offset: usize, leans_forward: bool) -> VisualPosition {
        let offset = self.clamp_offset(offset);
        let normalized = self.visual_lines().normalize(offset);
        // Offsets hidden by a fold lean into the placeholder.
        let leans_forward = leans_forward || normalized != offset;
        let line = self.offset_to_visual_line(normalized, leans_forward);
        let line = self.line_fragments(line);
        let (column, leans_right) = locate(&line, normalized, leans_forward);
        VisualPosition::new(line.line.index, column).leaning_right(leans_right)
    }

    /// Document offset and logical position of a visual position.
    fn resolve_visual(&self, position: VisualPosition) -> (usize, LogicalPosition) {
        let line = self.line_fragments(position.line);
        let column = position.column;
        if let Some(fragment) = line.fragment_at_column(column, position.leans_right) {
            return fragment.logical_at_visual_column(column, position.leans_right);
        }

        let doc = self.ctx.document;
        let visual = &line.line;
        if column < line.start_column() {
            let logical_line = visual.start_logical_line;
            let logical = LogicalPosition::new(
                logical_line,
                self.columns
                    .offset_to_column(doc, logical_line, visual.start_offset),
            )
            .leaning_forward(true);
            return (visual.start_offset, logical);
        }

        let logical_line = visual.end_logical_line;
        let end_column = self
            .columns
            .offset_to_column(doc, logical_line, visual.end_offset);
        let excess = if visual.ends_logical_line {
            column.saturating_sub(line.end_column())
        } else {
            0
        };
        let logical = LogicalPosition::new(logical_line, end_column + excess)
            .leaning_forward(excess > 0 && position.leans_right);
        (visual.end_offset, logical)
    }

    pub fn visual_to_logical(&self, position: VisualPosition) -> LogicalPosition {
        self.resolve_visual(position).1
    }

    pub fn visual_to_offset(&self, position: VisualPosition) -> usize {
        self.resolve_visual(position).0
    }

    /// Visual position of a logical one. Columns inside a tab keep their
    /// distance from the tab start; columns beyond the line end continue into
    /// virtual space.
    pub fn logical_to_visual(&self, position: LogicalPosition) -> VisualPosition {
        let doc = self.ctx.document;
        let line = position.line.min(doc.line_count() - 1);
        let offset = self.columns.column_to_offset(doc, line, position.column);
        let excess = position
            .column
            .saturating_sub(self.columns.offset_to_column(doc, line, offset));
        let visual = self.offset_to_visual(offset, position.leans_forward);
        if excess == 0 {
            return visual;
        }
        if offset == doc.line_end(line) {
            let fragments = self.line_fragments(visual.line);
            VisualPosition::new(visual.line, fragments.end_column() + excess)
                .leaning_right(position.leans_forward)
        } else {
            VisualPosition::new(visual.line, visual.column + excess).leaning_right(position.leans_forward)
        }
    }

    pub fn visual_to_xy(&self, position: VisualPosition) -> PixelPoint {
        let line = self.line_fragments(position.line);
        let column = position.column;
        let y = line.line.text_y;
        if let Some(fragment) = line.fragment_at_column(column, position.leans_right) {
            return PixelPoint::new(fragment.x_at_visual_column(column), y);
        }
        let end_column = line.end_column();
        if column >= end_column {
            let space = self.ctx.metrics.space_width();
            return PixelPoint::new(line.end_x() + (column - end_column) as f32 * space, y);
        }
        let indent_columns = line.line.indent_columns();
        let x = match indent_columns {
            0 => 0.0,
            columns => line.line.indent_pixels() * column.min(columns) as f32 / columns as f32,
        };
        PixelPoint::new(x, y)
    }

    pub fn xy_to_visual(&self, point: PixelPoint) -> VisualPosition {
        let index = self.visual_lines().y_to_visual_line(point.y);
        let line = self.line_fragments(index);
        let x = point.x;
        let hit = line
            .fragments
            .iter()
            .find(|fragment| fragment.start_x <= x && x < fragment.end_x);
        let (column, leans_right) = match hit {
            Some(fragment)
                if !matches!(
                    fragment.fragment(),
                    Fragment::Inlay {
                        placement: InlayPlacement::AfterLineEnd,
                        ..
                    }
                ) =>
            {
                fragment.visual_column_at_x(x)
            },
            Some(_) => (line.end_column(), false),
            None if x >= line.end_x() => {
                let space = self.ctx.metrics.space_width();
                let steps = if space > 0.0 {
                    ((x - line.end_x()) / space).round() as usize
                } else {
                    0
                };
                let column = line.end_column() + steps;
                let boundary = line.end_x() + steps as f32 * space;
                (column, x >= boundary)
            },
            None => (line.start_column(), true),
        };
        VisualPosition::new(index, column).leaning_right(leans_right)
    }

    pub fn offset_to_xy(&self, offset: usize, leans_forward: bool) -> PixelPoint {
        self.visual_to_xy(self.offset_to_visual(offset, leans_forward))
    }

    pub fn xy_to_offset(&self, point: PixelPoint) -> usize {
        self.visual_to_offset(self.xy_to_visual(point))
    }

    pub fn logical_to_xy(&self, position: LogicalPosition) -> PixelPoint {
        self.visual_to_xy(self.logical_to_visual(position))
    }

    pub fn xy_to_logical(&self, point: PixelPoint) -> LogicalPosition {
        self.visual_to_logical(self.xy_to_visual(point))
    }

    /// Y of the text of visual line `line`.
    pub fn visual_line_to_y(&self, line: usize) -> f32 {
        self.visual_lines().visual_line_to_y(line)
    }

    pub fn y_to_visual_line(&self, y: f32) -> usize {
        self.visual_lines().y_to_visual_line(y)
    }

    pub fn document_height(&self) -> f32 {
        self.visual_lines().document_height()
    }

    /// Width of `line`: the right edge of its last fragment, after-line-end
    /// inlays included.
    pub fn measure_visual_line(&self, line: &VisualLine<'a>) -> f32 {
        self.fragments(line)
            .last()
            .map_or(line.indent_pixels(), |fragment| fragment.end_x)
    }
}

/// Visual column of `offset` on `line` and the side it leans to.
fn locate(line: &LineFragments<'_>, offset: usize, leans_forward: bool) -> (usize, bool) {
    let inline_at = |fragment: &&VisualLineFragment<'_>| {
        matches!(
            fragment.fragment(),
            Fragment::Inlay {
                placement: InlayPlacement::Inline,
                ..
            }
        ) && fragment.start_offset == offset
    };
    // An inline inlay at the offset: its right edge leaning forward, its left
    // edge otherwise.
    if leans_forward {
        if let Some(inlay) = line.columned().filter(inline_at).last() {
            return (inlay.end_visual_column, true);
        }
    } else if let Some(inlay) = line.columned().find(inline_at) {
        return (inlay.start_visual_column, false);
    }

    let lean = |fragment: &VisualLineFragment<'_>| {
        if fragment.is_rtl() {
            !leans_forward
        } else {
            leans_forward
        }
    };
    let placed = || {
        line.columned()
            .filter(|fragment| !matches!(fragment.fragment(), Fragment::Inlay { .. }))
    };

    // The fragment holding the character the offset leans to.
    let owner = if leans_forward {
        Some(offset)
    } else {
        offset.checked_sub(1)
    };
    if let Some(owner) = owner {
        if let Some(fragment) = placed().find(|f| f.start_offset <= owner && owner < f.end_offset) {
            let column = match fragment.fragment() {
                Fragment::FoldPlaceholder { .. } if leans_forward => fragment.start_visual_column,
                Fragment::FoldPlaceholder { .. } => fragment.end_visual_column,
                _ => fragment.offset_to_visual_column(offset),
            };
            return (column, lean(fragment));
        }
    }

    // No character on that side within the line: the offset sits on a
    // fragment edge and leans into that fragment.
    if let Some(fragment) = placed().find(|f| f.start_offset <= offset && offset <= f.end_offset) {
        let column = fragment.offset_to_visual_column(offset);
        return (column, column == fragment.start_visual_column && fragment.visual_columns() > 0);
    }
    (line.line.indent_columns(), leans_forward)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        document::Document,
        metrics::FontMetrics,
        model::{FoldRegion, Inlay, SoftWrap},
        test_support::Fixture,
    };

    struct Caches {
        config: LayoutConfig,
        layouts: LineLayoutCache,
        columns: LogicalColumnCache,
    }

    impl Caches {
        fn new() -> Self {
            let config = LayoutConfig::default();
            Self {
                layouts: LineLayoutCache::new(&config),
                columns: LogicalColumnCache::new(&config),
                config,
            }
        }

        fn mapper<'a>(&'a self, fixture: &'a Fixture) -> CoordinateMapper<'a> {
            CoordinateMapper::new(fixture.ctx(), &self.config, &self.layouts, &self.columns)
        }
    }

    fn vp(line: usize, column: usize, leans_right: bool) -> VisualPosition {
        VisualPosition::new(line, column).leaning_right(leans_right)
    }

    #[test]
    fn tab_scenario_columns() {
        let fixture = Fixture::new("abc\tdef");
        let caches = Caches::new();
        let mapper = caches.mapper(&fixture);
        let columns: Vec<_> = (0..=7)
            .map(|offset| mapper.offset_to_logical(offset, false).column)
            .collect();
        assert_eq!(columns, vec![0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(mapper.offset_to_visual(4, true), vp(0, 4, true));
        assert_eq!(mapper.logical_to_offset(LogicalPosition::new(0, 4)), 4);
    }

    #[test]
    fn empty_document_maps_to_origin() {
        let fixture = Fixture::new("");
        let caches = Caches::new();
        let mapper = caches.mapper(&fixture);
        assert_eq!(mapper.offset_to_visual(10, true), vp(0, 0, true));
        assert_eq!(mapper.offset_to_logical(3, false), LogicalPosition::new(0, 0));
        assert_eq!(mapper.visual_to_offset(vp(4, 9, false)), 0);
        assert_eq!(mapper.offset_to_xy(0, false), PixelPoint::new(0.0, 0.0));
    }

    #[test]
    fn fold_scenario() {
        // Fifty hidden characters behind a 12px placeholder.
        let text = format!("ab\n{}\ncd", "x".repeat(50));
        let mut fixture = Fixture::new(&text);
        let line_height = fixture.metrics.line_height();
        fixture.fold(FoldRegion::custom(3..53, 12.0, line_height));
        let caches = Caches::new();
        let mapper = caches.mapper(&fixture);

        let line = mapper.visual_line(1);
        let fragments: Vec<_> = mapper.fragments(&line).collect();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].width(), 12.0);
        let (start, end) = (fragments[0].start_visual_column, fragments[0].end_visual_column);

        for column in start..=end {
            for leans_right in [false, true] {
                let offset = mapper.visual_to_offset(vp(1, column, leans_right));
                assert!(
                    offset == 3 || offset == 53,
                    "column {column} mapped to interior offset {offset}"
                );
            }
        }
        assert_eq!(mapper.offset_to_visual(3, true), vp(1, start, true));
        assert_eq!(mapper.offset_to_visual(53, false), vp(1, end, false));
        assert_eq!(mapper.offset_to_visual(30, false), vp(1, start, true));
        assert_eq!(mapper.offset_to_visual(53, true), vp(1, end, false));
        assert_eq!(mapper.visual_to_offset(vp(1, end, false)), 53);
    }

    #[test]
    fn surrogate_scenario() {
        let fixture = Fixture::new("abcde\u{1F600}fg");
        let caches = Caches::new();
        let mapper = caches.mapper(&fixture);
        for column in 0..12 {
            for leans_right in [false, true] {
                let offset = mapper.visual_to_offset(vp(0, column, leans_right));
                assert_ne!(offset, 6);
            }
        }
        assert_eq!(mapper.offset_to_visual(6, false), mapper.offset_to_visual(5, false));
    }

    #[test]
    fn soft_wrap_lean() {
        let mut fixture = Fixture::new("abcdef");
        fixture.wrap([SoftWrap::new(3).with_indent(1, 10.0)]);
        let caches = Caches::new();
        let mapper = caches.mapper(&fixture);
        assert_eq!(mapper.offset_to_visual(3, false), vp(0, 3, false));
        assert_eq!(mapper.offset_to_visual(3, true), vp(1, 1, true));
        assert_eq!(mapper.visual_to_offset(vp(0, 3, false)), 3);
        assert_eq!(mapper.visual_to_offset(vp(0, 9, true)), 3);
        assert_eq!(mapper.visual_to_offset(vp(1, 0, true)), 3);
        assert_eq!(mapper.offset_to_xy(4, true).x, 20.0);
    }

    #[test]
    fn bidi_boundary_has_one_position_per_lean() {
        let fixture = Fixture::new("ab \u{5d0}\u{5d1}");
        let caches = Caches::new();
        let mapper = caches.mapper(&fixture);
        // Offset 3 ends the LTR run and starts the RTL run, whose logical start
        // is drawn at its right edge.
        assert_eq!(mapper.offset_to_visual(3, false), vp(0, 3, false));
        assert_eq!(mapper.offset_to_visual(3, true), vp(0, 5, false));
        assert_eq!(mapper.offset_to_visual(5, false), vp(0, 3, true));
        for leans_forward in [false, true] {
            for offset in 0..=5 {
                let visual = mapper.offset_to_visual(offset, leans_forward);
                assert_eq!(mapper.visual_to_offset(visual), offset, "{visual:?}");
            }
        }
    }

    #[test]
    fn inline_inlay_edges() {
        let mut fixture = Fixture::new("abcd");
        fixture.inlay(Inlay::inline(2, 15.0));
        let caches = Caches::new();
        let mapper = caches.mapper(&fixture);
        assert_eq!(mapper.offset_to_visual(2, false), vp(0, 2, false));
        assert_eq!(mapper.offset_to_visual(2, true), vp(0, 3, true));
        assert_eq!(mapper.visual_to_offset(vp(0, 2, true)), 2);
        assert_eq!(mapper.offset_to_visual(3, false), vp(0, 4, false));
        assert_eq!(mapper.offset_to_xy(3, false).x, 45.0);
    }

    #[test]
    fn virtual_space_beyond_line_end() {
        let mut fixture = Fixture::new("ab\ncd");
        fixture.inlay(Inlay::after_line_end(2, 30.0));
        let caches = Caches::new();
        let mapper = caches.mapper(&fixture);
        let logical = mapper.visual_to_logical(vp(0, 6, true));
        assert_eq!((logical.line, logical.column), (0, 6));
        assert_eq!(mapper.visual_to_offset(vp(0, 6, true)), 2);
        assert_eq!(mapper.logical_to_visual(LogicalPosition::new(0, 6)).column, 6);
        // Virtual space starts after the after-line-end inlay.
        assert_eq!(mapper.visual_to_xy(vp(0, 4, false)).x, 20.0 + 30.0 + 20.0);
        assert_eq!(mapper.xy_to_visual(PixelPoint::new(70.0, 1.0)), vp(0, 4, true));
    }

    #[test]
    fn pixels_round_trip_on_character_boundaries() {
        let mut fixture = Fixture::new("fn x() {\n\tlet y = 1;\n}");
        fixture.inlay(Inlay::block_above(9, 40.0, 6.0));
        let caches = Caches::new();
        let mapper = caches.mapper(&fixture);
        let line_height = fixture.metrics.line_height();
        for offset in 0..fixture.doc.len() {
            let point = mapper.offset_to_xy(offset, true);
            assert_eq!(mapper.xy_to_offset(point), offset, "offset {offset} at {point:?}");
        }
        assert_eq!(mapper.offset_to_xy(9, true).y, line_height + 6.0);
        assert_eq!(mapper.offset_to_xy(10, true).x, 40.0);
        assert_eq!(mapper.document_height(), 3.0 * line_height + 6.0);
    }

    #[test]
    fn detached_mapper_matches_cached_one() {
        let mut fixture = Fixture::new("a\tb \u{5d0}\u{5d1} c\nsecond line");
        fixture.fold(FoldRegion::new(5..9, "#"));
        let caches = Caches::new();
        let cached = caches.mapper(&fixture);
        let detached = CoordinateMapper::detached(fixture.ctx(), &caches.config);
        for offset in 0..=fixture.doc.len() {
            for leans_forward in [false, true] {
                assert_eq!(
                    cached.offset_to_visual(offset, leans_forward),
                    detached.offset_to_visual(offset, leans_forward)
                );
                assert_eq!(
                    cached.offset_to_xy(offset, leans_forward),
                    detached.offset_to_xy(offset, leans_forward)
                );
            }
        }
        assert!(detached.is_detached());
        assert!(!detached.is_layout_computed(0));
        assert!(cached.is_layout_computed(0));
    }
}
