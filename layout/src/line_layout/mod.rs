//! Per-line text layout.
//!
//! ```text
//! line text ──bidi──▶ BidiRun* ──split──▶ Chunk* ──shape (lazy)──▶ Fragment*
//! ```
//!
//! Runs partition the line in logical order. Chunks bound the shaping work an
//! edit or eviction can cause to `chunk_size` units. Fragments are produced
//! only when a chunk is first walked and are cached in a [`ChunkCache`].
mod bidi;
mod cache;
mod chunk;
mod fragment;

pub use cache::LineLayoutCache;
pub use chunk::{Chunk, ChunkCache, SlotHandle};
pub use fragment::{special_char_label, tab_width, Fragment, ShapingContext};

use crate::{
    config::LayoutConfig,
    metrics::FontMetrics,
    model::{PlainAttributes, PlainSyntax, SyntaxContext, TextAttributes},
};
use smallvec::SmallVec;
use std::{ops::Range, rc::Rc};

/// A maximal span of one line at one embedding level.
#[derive(Debug)]
pub struct BidiRun {
    level: u8,
    range: Range<usize>,
    tab: bool,
    chunks: Box<[Chunk]>,
}

impl BidiRun {
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Range relative to the line start.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn is_rtl(&self) -> bool {
        self.level % 2 == 1
    }

    pub fn is_tab(&self) -> bool {
        self.tab
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }
}

/// Layout of one line: its bidi runs and their lazily shaped chunks.
#[derive(Debug, Default)]
pub struct LineLayout {
    runs: Box<[BidiRun]>,
}

impl LineLayout {
    /// Segment `text` (one line, no separator) into runs and chunks.
    pub fn new(text: &[u16], syntax: &dyn SyntaxContext, config: &LayoutConfig) -> Self {
        if text.is_empty() {
            return Self::default();
        }
        let analyze = text.len() <= config.bidi_max_line_length && bidi::requires_bidi(text);
        let tokens = if analyze {
            syntax.line_tokens(text)
        } else {
            SmallVec::new()
        };
        let runs = bidi::segment(text, &tokens, analyze)
            .into_iter()
            .map(|span| BidiRun {
                chunks: chunk::chunk_ranges(text, span.range.clone(), config.chunk_size)
                    .into_iter()
                    .map(Chunk::new)
                    .collect(),
                level: span.level,
                range: span.range,
                tab: span.tab,
            })
            .collect();
        Self { runs }
    }

    /// Lay out a string that is not part of the document, such as a fold
    /// placeholder, and measure it once.
    pub fn for_text(
        text: &str,
        attributes: TextAttributes,
        metrics: &dyn FontMetrics,
        config: &LayoutConfig,
    ) -> WithSize {
        let units: Box<[u16]> = text.encode_utf16().collect();
        let layout = Rc::new(Self::new(&units, &PlainSyntax, config));
        let provider = PlainAttributes(attributes);
        let shaping = ShapingContext {
            text: &units,
            base_offset: 0,
            attributes: &provider,
            metrics,
            config,
            chunks: None,
        };
        let width = layout.width(&shaping);
        WithSize {
            layout,
            text: units,
            attributes,
            width,
        }
    }

    pub fn runs(&self) -> &[BidiRun] {
        &self.runs
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// True when no run is right-to-left.
    pub fn is_ltr(&self) -> bool {
        self.runs.iter().all(|run| !run.is_rtl())
    }

    /// Line length in units.
    pub fn len(&self) -> usize {
        self.runs.last().map_or(0, |run| run.range.end)
    }

    /// Width of the whole line laid out from x = 0.
    pub fn width(self: &Rc<Self>, shaping: &ShapingContext<'_>) -> f32 {
        self.fragments_in_visual_order(0..self.len(), 0.0, *shaping)
            .last()
            .map_or(0.0, |fragment| fragment.end_x)
    }

    /// Fragments covering `range` (line-relative) in visual order, positioned
    /// from `start_x`. Fragments crossing the range ends are clipped.
    pub fn fragments_in_visual_order<'a>(
        self: &Rc<Self>,
        range: Range<usize>,
        start_x: f32,
        shaping: ShapingContext<'a>,
    ) -> VisualFragments<'a> {
        let touched: SmallVec<[usize; 8]> = self
            .runs
            .iter()
            .enumerate()
            .filter(|(_, run)| run.range.start < range.end && range.start < run.range.end)
            .map(|(ix, _)| ix)
            .collect();
        let levels: SmallVec<[u8; 8]> = touched.iter().map(|ix| self.runs[*ix].level).collect();
        let runs = bidi::visual_order(&levels)
            .into_iter()
            .map(|ix| touched[ix])
            .collect();
        let mut fragments = VisualFragments {
            layout: self.clone(),
            shaping,
            range,
            runs,
            run_pos: 0,
            chunks: 0..0,
            current: None,
            x: start_x,
        };
        fragments.enter_run();
        fragments
    }

    fn run_at(&self, unit: usize) -> Option<&BidiRun> {
        let ix = self.runs.partition_point(|run| run.range.end <= unit);
        self.runs.get(ix).filter(|run| run.range.start <= unit)
    }

    /// Whether the character a position at `offset` belongs to is right-to-left:
    /// the one at `offset` when leaning forward, the one before otherwise.
    pub fn is_rtl_location(&self, offset: usize, leans_forward: bool) -> bool {
        let unit = if leans_forward {
            Some(offset)
        } else {
            offset.checked_sub(1)
        };
        unit.and_then(|unit| self.run_at(unit))
            .is_some_and(BidiRun::is_rtl)
    }

    /// Nearest offset at or beyond `offset` in the given direction where text
    /// direction changes. The line edges count when the adjacent run is RTL.
    pub fn find_nearest_direction_boundary(&self, offset: usize, look_forward: bool) -> Option<usize> {
        let mut boundaries: SmallVec<[usize; 8]> = SmallVec::new();
        let mut previous_rtl = false;
        for run in self.runs.iter() {
            if run.is_rtl() != previous_rtl {
                boundaries.push(run.range.start);
            }
            previous_rtl = run.is_rtl();
        }
        if previous_rtl {
            boundaries.push(self.len());
        }

        if look_forward {
            boundaries.into_iter().find(|boundary| *boundary >= offset)
        } else {
            boundaries.into_iter().rev().find(|boundary| *boundary <= offset)
        }
    }

    pub(crate) fn release_chunks(&self, cache: &ChunkCache) {
        for chunk in self.runs.iter().flat_map(|run| run.chunks.iter()) {
            chunk.release(cache);
        }
    }
}

/// A [`LineLayout`] for non-document text together with its measured width.
#[derive(Debug)]
pub struct WithSize {
    layout: Rc<LineLayout>,
    text: Box<[u16]>,
    attributes: TextAttributes,
    width: f32,
}

impl WithSize {
    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn layout(&self) -> &Rc<LineLayout> {
        &self.layout
    }

    pub fn text(&self) -> &[u16] {
        &self.text
    }

    pub fn attributes(&self) -> TextAttributes {
        self.attributes
    }
}

/// One fragment positioned on a line, possibly clipped to a sub-range.
#[derive(Debug, Clone)]
pub struct LineFragment {
    fragments: Rc<[Fragment]>,
    index: usize,
    /// Units covered, relative to the line start.
    pub range: Range<usize>,
    pub start_x: f32,
    pub end_x: f32,
}

impl LineFragment {
    pub fn fragment(&self) -> &Fragment {
        &self.fragments[self.index]
    }

    pub(crate) fn shared(&self) -> (Rc<[Fragment]>, usize) {
        (self.fragments.clone(), self.index)
    }

    pub fn width(&self) -> f32 {
        self.end_x - self.start_x
    }
}

/// Iterator returned by [`LineLayout::fragments_in_visual_order`]. Lazy: a
/// chunk is shaped only when the walk reaches it. A fresh iterator can start at
/// any range; a running one is forward-only.
pub struct VisualFragments<'a> {
    layout: Rc<LineLayout>,
    shaping: ShapingContext<'a>,
    range: Range<usize>,
    runs: SmallVec<[usize; 8]>,
    run_pos: usize,
    /// Remaining chunk indices of the current run.
    chunks: Range<usize>,
    /// Fragments of the current chunk and the indices still to visit.
    current: Option<(Rc<[Fragment]>, Range<usize>)>,
    x: f32,
}

impl VisualFragments<'_> {
    fn current_run(&self) -> Option<&BidiRun> {
        self.runs
            .get(self.run_pos)
            .map(|ix| &self.layout.runs[*ix])
    }

    fn enter_run(&mut self) -> bool {
        let Some(run) = self.current_run() else {
            return false;
        };
        let chunks = &run.chunks;
        let first = chunks.partition_point(|chunk| chunk.range().end <= self.range.start);
        let last = chunks.partition_point(|chunk| chunk.range().start < self.range.end);
        self.chunks = first..last.max(first);
        true
    }
}

impl Iterator for VisualFragments<'_> {
    type Item = LineFragment;

    fn next(&mut self) -> Option<LineFragment> {
        loop {
            let (rtl, tab_run) = {
                let run = self.current_run()?;
                (run.is_rtl(), run.tab)
            };

            if let Some((fragments, indices)) = &mut self.current {
                let next = if rtl { indices.next_back() } else { indices.next() };
                if let Some(index) = next {
                    let fragment = &fragments[index];
                    let start = fragment.start().max(self.range.start);
                    let end = (fragment.start() + fragment.len()).min(self.range.end);
                    if start >= end {
                        continue;
                    }
                    let width = match fragment {
                        Fragment::Tab { .. } => {
                            tab_width(self.x, self.shaping.config, self.shaping.metrics)
                        },
                        Fragment::SimpleText { .. } | Fragment::ComplexText { .. } => {
                            let offset = fragment.start();
                            fragment.advance_to(end - offset) - fragment.advance_to(start - offset)
                        },
                        other => other.fixed_width().unwrap_or(0.0),
                    };
                    let positioned = LineFragment {
                        fragments: fragments.clone(),
                        index,
                        range: start..end,
                        start_x: self.x,
                        end_x: self.x + width,
                    };
                    self.x += width;
                    return Some(positioned);
                }
                self.current = None;
            }

            let next_chunk = if rtl {
                self.chunks.next_back()
            } else {
                self.chunks.next()
            };
            if let Some(chunk_ix) = next_chunk {
                let run = self.current_run()?;
                let fragments = run.chunks[chunk_ix].fragments(rtl, tab_run, &self.shaping);
                let len = fragments.len();
                self.current = Some((fragments, 0..len));
                continue;
            }

            self.run_pos += 1;
            if !self.enter_run() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{metrics::MonospaceMetrics, model::PlainAttributes};

    fn units(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    fn dump(text: &str, range: Option<Range<usize>>, config: &LayoutConfig) -> String {
        let units = units(text);
        let layout = Rc::new(LineLayout::new(&units, &PlainSyntax, config));
        let metrics = MonospaceMetrics::new(10.0, 20.0);
        let attributes = PlainAttributes::default();
        let shaping = ShapingContext {
            text: &units,
            base_offset: 0,
            attributes: &attributes,
            metrics: &metrics,
            config,
            chunks: None,
        };
        let range = range.unwrap_or(0..units.len());
        layout
            .fragments_in_visual_order(range, 0.0, shaping)
            .map(|fragment| {
                let kind = match fragment.fragment() {
                    Fragment::SimpleText { .. } => "text",
                    Fragment::ComplexText { rtl: true, .. } => "rtl",
                    Fragment::ComplexText { .. } => "complex",
                    Fragment::Tab { .. } => "tab",
                    Fragment::SpecialChar { .. } => "special",
                    Fragment::FoldPlaceholder { .. } | Fragment::Inlay { .. } => "other",
                };
                format!(
                    "{kind} {}..{} x {}..{}",
                    fragment.range.start, fragment.range.end, fragment.start_x, fragment.end_x
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn empty_line_has_no_runs() {
        let layout = LineLayout::new(&[], &PlainSyntax, &LayoutConfig::default());
        assert!(layout.is_empty());
        assert!(!layout.is_rtl_location(0, true));
        assert_eq!(layout.find_nearest_direction_boundary(0, true), None);
    }

    #[test]
    fn tab_expands_to_stop() {
        insta::assert_snapshot!(dump("abc\tdef", None, &LayoutConfig::default()), @r"
        text 0..3 x 0..30
        tab 3..4 x 30..40
        text 4..7 x 40..70
        ");
    }

    #[test]
    fn hebrew_run_follows_latin_run() {
        let text = units("abc שלום");
        let layout = LineLayout::new(&text, &PlainSyntax, &LayoutConfig::default());
        assert_eq!(layout.runs().len(), 2);
        assert!(!layout.runs()[0].is_rtl());
        assert!(layout.runs()[1].is_rtl());

        insta::assert_snapshot!(dump("abc שלום", None, &LayoutConfig::default()), @r"
        text 0..4 x 0..40
        rtl 4..8 x 40..80
        ");
    }

    #[test]
    fn rtl_chunks_are_visited_right_to_left() {
        let config = LayoutConfig {
            chunk_size: 2,
            ..LayoutConfig::default()
        };
        insta::assert_snapshot!(dump("שלום", None, &config), @r"
        rtl 2..4 x 0..20
        rtl 0..2 x 20..40
        ");
    }

    #[test]
    fn clipped_range_reorders_only_touched_runs() {
        insta::assert_snapshot!(dump("ab שלום cd", Some(1..5), &LayoutConfig::default()), @r"
        text 1..3 x 0..20
        rtl 3..5 x 20..40
        ");
    }

    #[test]
    fn direction_queries() {
        let text = units("ab שלום cd");
        let layout = LineLayout::new(&text, &PlainSyntax, &LayoutConfig::default());
        assert!(!layout.is_rtl_location(3, false));
        assert!(layout.is_rtl_location(3, true));
        assert!(layout.is_rtl_location(7, false));
        assert!(!layout.is_rtl_location(7, true));

        assert_eq!(layout.find_nearest_direction_boundary(0, true), Some(3));
        assert_eq!(layout.find_nearest_direction_boundary(4, true), Some(7));
        assert_eq!(layout.find_nearest_direction_boundary(6, false), Some(3));
        assert_eq!(layout.find_nearest_direction_boundary(8, true), None);
    }

    #[test]
    fn long_lines_skip_bidi() {
        let config = LayoutConfig {
            bidi_max_line_length: 4,
            ..LayoutConfig::default()
        };
        let text = units("abc שלום");
        let layout = LineLayout::new(&text, &PlainSyntax, &config);
        assert!(layout.is_ltr());
        assert_eq!(layout.runs().len(), 1);
    }

    #[test]
    fn placeholder_width_is_measured_once() {
        let metrics = MonospaceMetrics::new(10.0, 20.0);
        let sized = LineLayout::for_text("{...}", TextAttributes::default(), &metrics, &LayoutConfig::default());
        assert_eq!(sized.width(), 50.0);
        assert_eq!(sized.text().len(), 5);
    }
}
