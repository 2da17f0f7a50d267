//! The engine facade: owns the caches and keeps them consistent with the
//! collaborators through [`LayoutEvent`]s.
//!
//! ```text
//! LayoutEvent ──▶ LayoutEngine ──Invalidation──▶ LogicalColumnCache
//!                     │                         ├▶ LineLayoutCache
//!                     │                         └▶ SizeManager
//!                     └──mapper()──▶ CoordinateMapper (reads all three)
//! ```
//!
//! Outside batches each event is flushed immediately. Inside a batch the
//! invalidations coalesce into one range that is flushed when the outermost
//! batch finishes.
use crate::{
    cancel::{Cancelled, CancellationToken},
    column_cache::LogicalColumnCache,
    config::LayoutConfig,
    document::TextChange,
    error::{ChangeInProgressSnafu, Result, UnbalancedBatchSnafu, UnbalancedChangeSnafu},
    events::{BatchKind, Invalidation, LayoutEvent, LayoutListener},
    line_layout::LineLayoutCache,
    mapper::CoordinateMapper,
    model::{FoldingModel, InlayPlacement, LayoutContext},
    size_manager::SizeManager,
};
use snafu::ensure;
use std::ops::Range;

#[derive(Debug, Clone)]
struct OpenChange {
    change: TextChange,
    old_line_count: usize,
    /// Offsets before the edit whose visual lines it disturbs.
    affected: Range<usize>,
}

/// Layout state for one editor view.
#[derive(Debug)]
pub struct LayoutEngine {
    config: LayoutConfig,
    layouts: LineLayoutCache,
    columns: LogicalColumnCache,
    sizes: SizeManager,
    change: Option<OpenChange>,
    batches: Vec<BatchKind>,
    pending: Option<Invalidation>,
    last_preferred_width: f32,
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self::new(LayoutConfig::default())
    }
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            layouts: LineLayoutCache::new(&config),
            columns: LogicalColumnCache::new(&config),
            sizes: SizeManager::new(&config),
            config,
            change: None,
            batches: Vec::new(),
            pending: None,
            last_preferred_width: 0.0,
        }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn sizes(&self) -> &SizeManager {
        &self.sizes
    }

    pub fn layouts(&self) -> &LineLayoutCache {
        &self.layouts
    }

    pub fn columns(&self) -> &LogicalColumnCache {
        &self.columns
    }

    /// True between a `BeforeTextChange` and its `TextChanged`, or inside a batch.
    pub fn is_changing(&self) -> bool {
        self.change.is_some() || !self.batches.is_empty()
    }

    /// Apply one collaborator event. `ctx` describes the collaborators as they
    /// are when the event is sent: before the edit for
    /// [`LayoutEvent::BeforeTextChange`], after it for everything else.
    pub fn handle(&mut self, event: &LayoutEvent, ctx: &LayoutContext<'_>) -> Result<()> {
        tracing::trace!(?event, "layout event");
        match event {
            LayoutEvent::BeforeTextChange(change) => {
                if let Some(open) = &self.change {
                    return UnbalancedChangeSnafu {
                        detail: format!("{change:?} started while {:?} is open", open.change),
                    }
                    .fail();
                }
                self.change = Some(OpenChange {
                    change: *change,
                    old_line_count: ctx.document.line_count(),
                    affected: affected_range(change, ctx.folds),
                });
            },
            LayoutEvent::TextChanged(change) => {
                let open = match self.change.take() {
                    Some(open) if open.change == *change => open,
                    Some(open) => {
                        let detail = format!("{change:?} does not match open {:?}", open.change);
                        self.change = Some(open);
                        return UnbalancedChangeSnafu { detail }.fail();
                    },
                    None => {
                        return UnbalancedChangeSnafu {
                            detail: format!("{change:?} without BeforeTextChange"),
                        }
                        .fail();
                    },
                };
                ensure!(
                    change.offset + change.new_len <= ctx.document.len(),
                    UnbalancedChangeSnafu {
                        detail: format!("{change:?} ends past the document ({} units)", ctx.document.len()),
                    }
                );
                let invalidation = Invalidation::text(change, open.affected, open.old_line_count);
                self.record(invalidation, Some(change), ctx);
            },
            LayoutEvent::FoldChanged { range } | LayoutEvent::SoftWrapsRecalculated { range } => {
                self.record(Invalidation::layout(range.clone()), None, ctx);
            },
            LayoutEvent::InlayChanged {
                offset,
                placement,
                flags,
            } => {
                // Block inlays only move lines vertically, which is computed on
                // demand. Their width is read directly from the inlay model.
                let affects_line = matches!(placement, InlayPlacement::Inline | InlayPlacement::AfterLineEnd);
                if affects_line && flags.width_changed {
                    self.record(Invalidation::layout(*offset..*offset), None, ctx);
                }
            },
            LayoutEvent::BatchStarted(kind) => {
                self.batches.push(*kind);
            },
            LayoutEvent::BatchFinished(kind) => {
                ensure!(self.batches.last() == Some(kind), UnbalancedBatchSnafu { kind: *kind });
                self.batches.pop();
                if self.batches.is_empty() {
                    self.flush(ctx);
                }
            },
            LayoutEvent::TabSizeChanged(tab_size) => {
                let tab_size = (*tab_size).max(1);
                tracing::debug!(tab_size, "tab size changed, resetting caches");
                self.config.tab_size = tab_size;
                self.columns.set_tab_size(tab_size as usize);
                self.reset_all();
            },
            LayoutEvent::MetricsChanged => {
                tracing::debug!("font metrics changed, resetting caches");
                self.reset_all();
            },
        }
        Ok(())
    }

    /// A mapper over the current caches. Refused while a change or batch is
    /// open, since the caches may not match `ctx` yet.
    pub fn mapper<'a>(&'a self, ctx: LayoutContext<'a>) -> Result<CoordinateMapper<'a>> {
        ensure!(!self.is_changing(), ChangeInProgressSnafu);
        Ok(CoordinateMapper::new(ctx, &self.config, &self.layouts, &self.columns))
    }

    /// Preferred width of the document. While a change is open the last
    /// computed width is returned.
    pub fn preferred_width(&mut self, ctx: LayoutContext<'_>, token: &CancellationToken) -> Result<f32, Cancelled> {
        if self.is_changing() {
            return Ok(self.last_preferred_width);
        }
        let mapper = CoordinateMapper::new(ctx, &self.config, &self.layouts, &self.columns);
        let laid_out = self.layouts.take_laid_out();
        self.sizes.text_layout_performed(&laid_out, &mapper);
        let width = self.sizes.preferred_width(&mapper, token)?;
        self.last_preferred_width = width;
        Ok(width)
    }

    pub fn preferred_height(&self, ctx: LayoutContext<'_>) -> Result<f32> {
        Ok(self.mapper(ctx)?.document_height())
    }

    pub fn visual_line_width(&mut self, ctx: LayoutContext<'_>, line: usize, allow_approximate: bool) -> Result<f32> {
        ensure!(!self.is_changing(), ChangeInProgressSnafu);
        let mapper = CoordinateMapper::new(ctx, &self.config, &self.layouts, &self.columns);
        Ok(self.sizes.visual_line_width(line, allow_approximate, &mapper))
    }

    /// Select the chunk cache limit for a focused or background view.
    pub fn set_active(&self, active: bool) {
        self.layouts.set_active(active);
    }

    /// The document changed while the view was not listening.
    pub fn mark_stale(&mut self) {
        self.sizes.mark_stale();
    }

    pub fn take_revalidate_request(&mut self) -> bool {
        self.sizes.take_revalidate_request()
    }

    fn record(&mut self, invalidation: Invalidation, change: Option<&TextChange>, ctx: &LayoutContext<'_>) {
        self.pending = Some(match (self.pending.take(), change) {
            (None, _) => invalidation,
            (Some(pending), Some(change)) => merge(shift_past(pending, change), invalidation),
            (Some(pending), None) => merge(pending, invalidation),
        });
        if self.batches.is_empty() {
            self.flush(ctx);
        }
    }

    fn flush(&mut self, ctx: &LayoutContext<'_>) {
        let Some(invalidation) = self.pending.take() else {
            return;
        };
        tracing::debug!(
            start = invalidation.start,
            end = invalidation.end,
            text = invalidation.text_changed,
            "flushing invalidation"
        );
        self.columns.invalidate(&invalidation, ctx);
        self.layouts.invalidate(&invalidation, ctx);
        self.sizes.invalidate(&invalidation, ctx);
    }

    fn reset_all(&mut self) {
        self.pending = None;
        self.columns.reset();
        self.layouts.reset();
        self.sizes.reset();
    }
}

/// The replaced range widened to every collapsed fold it touches. An edit at
/// or across a fold boundary drops the fold, so all of its lines reappear.
fn affected_range(change: &TextChange, folds: &dyn FoldingModel) -> Range<usize> {
    let old_end = change.offset + change.old_len;
    let regions = folds.collapsed_regions();
    let first = regions.partition_point(|region| region.range.end < change.offset);
    regions[first..]
        .iter()
        .take_while(|region| region.range.start <= old_end)
        .fold(change.offset..old_end, |range, region| {
            range.start.min(region.range.start)..range.end.max(region.range.end)
        })
}

/// Move a pending range into the coordinates after `change`.
fn shift_past(pending: Invalidation, change: &TextChange) -> Invalidation {
    let old_end = change.offset + change.old_len;
    let map = |offset: usize| {
        if offset >= old_end {
            offset - change.old_len + change.new_len
        } else {
            offset.min(change.offset + change.new_len)
        }
    };
    let end = if pending.end >= old_end {
        map(pending.end)
    } else {
        pending.end.max(change.offset + change.new_len)
    };
    Invalidation {
        start: map(pending.start).min(change.offset),
        end,
        ..pending
    }
}

fn merge(a: Invalidation, b: Invalidation) -> Invalidation {
    Invalidation {
        start: a.start.min(b.start),
        end: a.end.max(b.end),
        text_changed: a.text_changed || b.text_changed,
        old_line_count: a.old_line_count.or(b.old_line_count),
    }
}
