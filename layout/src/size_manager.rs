//! Preferred size tracking.
//!
//! Every visual line has one cached width entry:
//!
//! ```text
//! UNKNOWN (i32::MAX)   not measured, or invalidated
//! w >= 0               precise width in pixels
//! w < 0                approximate width -w, an upper bound estimated from
//!                      the column count
//! ```
//!
//! Invalidation splices entries by the visual-line delta and marks the
//! affected window unknown. The preferred width is then recomputed either from
//! the few lines in that window or, when the window is wide or held the widest
//! line, by a scan over the whole cache that measures only unknown entries.
use crate::{
    cancel::{Cancelled, CancellationToken},
    config::{LayoutConfig, SizePolicy},
    error::invariant_violation,
    events::{splice_lines, Invalidation, LayoutListener},
    mapper::CoordinateMapper,
    model::{InlayPlacement, LayoutContext},
    visual_line::{VisualLine, VisualLineIterator, VisualLineMap},
};

const UNKNOWN: i32 = i32::MAX;

/// Decoded cache entry, as reported by [`SizeManager::line_width_entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineWidth {
    Unknown,
    Approximate(i32),
    Precise(i32),
}

impl LineWidth {
    fn decode(entry: i32) -> Self {
        match entry {
            UNKNOWN => Self::Unknown,
            w if w < 0 => Self::Approximate(-w),
            w => Self::Precise(w),
        }
    }

    pub fn pixels(self) -> Option<i32> {
        match self {
            Self::Unknown => None,
            Self::Approximate(w) | Self::Precise(w) => Some(w),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PreferredWidth {
    pixels: i32,
    widest_line: usize,
}

/// Incremental cache of visual line widths and the document's preferred size.
#[derive(Debug)]
pub struct SizeManager {
    line_widths: Vec<i32>,
    width: Option<PreferredWidth>,
    /// Visual lines invalidated since the width was last computed.
    invalid: Option<(usize, usize)>,
    /// The document changed while we were not listening; start over.
    dirty: bool,
    revalidate_requested: bool,
    policy: SizePolicy,
    precise_width_max_line_length: usize,
    strict: bool,
}

impl SizeManager {
    pub fn new(config: &LayoutConfig) -> Self {
        Self {
            line_widths: Vec::new(),
            width: None,
            invalid: None,
            dirty: false,
            revalidate_requested: false,
            policy: config.size.clone(),
            precise_width_max_line_length: config.precise_width_max_line_length,
            strict: config.strict_invariants,
        }
    }

    /// Raw entries, for diffing cache state.
    pub fn line_widths(&self) -> &[i32] {
        &self.line_widths
    }

    pub fn line_width_entry(&self, line: usize) -> LineWidth {
        self.line_widths
            .get(line)
            .map_or(LineWidth::Unknown, |entry| LineWidth::decode(*entry))
    }

    /// Last computed preferred width, if it is still valid.
    pub fn cached_preferred_width(&self) -> Option<f32> {
        match (self.width, self.invalid, self.dirty) {
            (Some(width), None, false) => Some(width.pixels as f32),
            _ => None,
        }
    }

    /// Flag the cache as stale; the next access rebuilds it from scratch.
    pub fn mark_stale(&mut self) {
        self.dirty = true;
    }

    /// True once if a precise measurement exceeded its estimate since the
    /// last call, meaning the host should re-run layout.
    pub fn take_revalidate_request(&mut self) -> bool {
        std::mem::take(&mut self.revalidate_requested)
    }

    pub fn preferred_height(&self, mapper: &CoordinateMapper<'_>) -> f32 {
        mapper.document_height()
    }

    /// Preferred width: the widest visual line or the widest block inlay.
    /// Unknown lines are measured, approximately where the fast path applies.
    /// A cancelled scan keeps what it measured and resumes on the next call.
    pub fn preferred_width(
        &mut self,
        mapper: &CoordinateMapper<'_>,
        token: &CancellationToken,
    ) -> Result<f32, Cancelled> {
        self.sync(mapper);
        let ctx = mapper.context();
        let block_width = ctx.inlays.max_block_width().ceil();

        match (self.width, self.invalid) {
            (Some(_), None) => {},
            (Some(width), Some((start, end)))
                if end - start < self.policy.specific_lines_recalc_threshold
                    && !(start..=end).contains(&width.widest_line) =>
            {
                let mut best = width;
                for line in VisualLineIterator::new(ctx, start).take(end - start + 1) {
                    let pixels = self.width_at(&line, mapper, true);
                    if pixels > best.pixels {
                        best = PreferredWidth {
                            pixels,
                            widest_line: line.index,
                        };
                    }
                }
                tracing::trace!(start, end, pixels = best.pixels, "recomputed width window");
                self.width = Some(best);
                self.invalid = None;
            },
            _ => {
                self.width = None;
                let width = self.scan(mapper, token)?;
                self.width = Some(width);
                self.invalid = None;
            },
        }
        let pixels = self.width.map_or(0, |width| width.pixels);
        Ok((pixels as f32).max(block_width))
    }

    /// Width of visual line `line`. With `allow_approximate` unset an estimate
    /// is replaced by a precise measurement.
    pub fn visual_line_width(
        &mut self,
        line: usize,
        allow_approximate: bool,
        mapper: &CoordinateMapper<'_>,
    ) -> f32 {
        self.sync(mapper);
        let visual = mapper.visual_line(line);
        self.width_at(&visual, mapper, allow_approximate) as f32
    }

    /// Confirm approximate widths of logical lines whose layout was just
    /// computed. A line that turns out wider than its estimate beyond the
    /// tolerance requests revalidation.
    pub fn text_layout_performed(&mut self, logical_lines: &[usize], mapper: &CoordinateMapper<'_>) {
        if logical_lines.is_empty() || self.line_widths.is_empty() || mapper.is_detached() {
            return;
        }
        self.sync(mapper);
        let ctx = mapper.context();
        let map = VisualLineMap::new(ctx);
        for &logical in logical_lines {
            if logical >= ctx.document.line_count() {
                continue;
            }
            let index = map.offset_to_visual_line(ctx.document.line_start(logical));
            let Some(approximate) = self
                .line_widths
                .get(index)
                .filter(|entry| **entry < 0)
                .map(|entry| -entry)
            else {
                continue;
            };

            let line = mapper.visual_line(index);
            let precise = measure(&line, mapper);
            self.line_widths[index] = precise;
            if precise > approximate + self.policy.approximation_tolerance {
                tracing::debug!(line = index, approximate, precise, "width estimate too small");
                self.revalidate_requested = true;
            }
            match self.width {
                Some(width) if precise > width.pixels => {
                    self.width = Some(PreferredWidth {
                        pixels: precise,
                        widest_line: index,
                    });
                },
                Some(width) if width.widest_line == index && precise < width.pixels => {
                    self.width = None;
                },
                _ => {},
            }
        }
    }

    /// Bring the entry count in line with the document, rebuilding after
    /// [`mark_stale`](Self::mark_stale) or an inconsistency.
    fn sync(&mut self, mapper: &CoordinateMapper<'_>) {
        let count = mapper.visual_line_count();
        if self.dirty {
            tracing::debug!("size cache was stale, rebuilding");
            self.reset();
        }
        if self.line_widths.len() != count {
            if !self.line_widths.is_empty() {
                invariant_violation(
                    self.strict,
                    format_args!(
                        "size cache holds {} visual lines, document has {count}",
                        self.line_widths.len()
                    ),
                );
                self.reset();
            }
            self.line_widths.resize(count, UNKNOWN);
        }
    }

    /// Cached width of `line`, measuring it if unknown (or approximate when
    /// that is not allowed). Detached mappers never write back.
    fn width_at<'a>(&mut self, line: &VisualLine<'a>, mapper: &CoordinateMapper<'a>, allow_approximate: bool) -> i32 {
        let entry = self.line_widths.get(line.index).copied().unwrap_or(UNKNOWN);
        match LineWidth::decode(entry) {
            LineWidth::Precise(pixels) => return pixels,
            LineWidth::Approximate(pixels) if allow_approximate => return pixels,
            _ => {},
        }
        let computed = if allow_approximate {
            self.calculate(line, mapper)
        } else {
            measure(line, mapper)
        };
        if !mapper.is_detached() {
            if let Some(slot) = self.line_widths.get_mut(line.index) {
                *slot = computed;
            }
        }
        computed.abs()
    }

    /// Estimate or measure one line. The estimate `columns * max_char_width`
    /// applies to lines without folds, wraps or inline inlays whose layout is
    /// not computed yet, or that are too long to shape precisely.
    fn calculate<'a>(&self, line: &VisualLine<'a>, mapper: &CoordinateMapper<'a>) -> i32 {
        let ctx = mapper.context();
        let logical = line.start_logical_line;
        let long = ctx.document.line_end(logical) - ctx.document.line_start(logical)
            > self.precise_width_max_line_length;
        let fast = !mapper.is_detached()
            && is_simple(line, &ctx)
            && (long || !mapper.is_layout_computed(logical));
        if !fast {
            return measure(line, mapper);
        }
        let columns = mapper.offset_to_logical(line.end_offset, false).column;
        let estimate = (columns as f32 * ctx.metrics.max_char_width()).ceil() as i32;
        -estimate
    }

    /// Measure every unknown line, starting at the first one, and return the
    /// widest.
    fn scan(&mut self, mapper: &CoordinateMapper<'_>, token: &CancellationToken) -> Result<PreferredWidth, Cancelled> {
        let interval = self.policy.cancellation_check_interval.max(1);
        if let Some(first) = self.line_widths.iter().position(|entry| *entry == UNKNOWN) {
            tracing::debug!(first, lines = self.line_widths.len(), "scanning for preferred width");
            for (ix, line) in VisualLineIterator::new(mapper.context(), first).enumerate() {
                if ix % interval == 0 {
                    token.check()?;
                }
                if self.line_widths.get(line.index) == Some(&UNKNOWN) {
                    self.width_at(&line, mapper, true);
                }
            }
        }

        let mut best = PreferredWidth {
            pixels: 0,
            widest_line: 0,
        };
        for (index, entry) in self.line_widths.iter().enumerate() {
            if let Some(pixels) = LineWidth::decode(*entry).pixels() {
                if pixels > best.pixels {
                    best = PreferredWidth {
                        pixels,
                        widest_line: index,
                    };
                }
            }
        }
        Ok(best)
    }
}

fn measure<'a>(line: &VisualLine<'a>, mapper: &CoordinateMapper<'a>) -> i32 {
    mapper.measure_visual_line(line).ceil() as i32
}

/// A visual line that is exactly one logical line with nothing but text on it.
fn is_simple(line: &VisualLine<'_>, ctx: &LayoutContext<'_>) -> bool {
    let range = line.start_offset..line.end_offset + 1;
    line.soft_wrap.is_none()
        && line.ends_logical_line
        && line.start_logical_line == line.end_logical_line
        && ctx.inlays.inlays_in(InlayPlacement::Inline, range.clone()).is_empty()
        && ctx.inlays.inlays_in(InlayPlacement::AfterLineEnd, range).is_empty()
        && ctx
            .folds
            .collapsed_region_at(line.start_offset)
            .is_none_or(|region| region.start() > line.end_offset)
        && ctx
            .folds
            .last_collapsed_before(line.end_offset + 1)
            .is_none_or(|ix| ctx.folds.collapsed_regions()[ix].end() <= line.start_offset)
}

impl LayoutListener for SizeManager {
    fn invalidate(&mut self, invalidation: &Invalidation, ctx: &LayoutContext<'_>) {
        if self.line_widths.is_empty() {
            return;
        }
        let map = VisualLineMap::new(*ctx);
        let count = map.visual_line_count();
        let start = map.offset_to_visual_line(invalidation.start);
        let end = map.offset_to_visual_line(invalidation.end).max(start);
        let delta = count as isize - self.line_widths.len() as isize;
        // The replaced window in old line numbers.
        let old_end = (end as isize - delta).max(start as isize) as usize;

        splice_lines(&mut self.line_widths, start, end, count, || UNKNOWN);

        let shift = |line: usize| -> usize {
            if line > old_end {
                (line as isize + delta).max(0) as usize
            } else {
                line.min(end)
            }
        };
        self.invalid = Some(match self.invalid {
            Some((s, e)) => (shift(s).min(start), shift(e).max(end)),
            None => (start, end),
        });
        if let Some(width) = self.width {
            if (start..=old_end).contains(&width.widest_line) {
                self.width = None;
            } else {
                self.width = Some(PreferredWidth {
                    widest_line: shift(width.widest_line),
                    ..width
                });
            }
        }
        tracing::trace!(start, end, delta, "invalidated line widths");
    }

    fn reset(&mut self) {
        self.line_widths.clear();
        self.width = None;
        self.invalid = None;
        self.dirty = false;
    }
}
