//! Cache of per-line layouts and shaped chunks.
use super::{ChunkCache, LineLayout, ShapingContext, WithSize};
use crate::{
    config::LayoutConfig,
    error::invariant_violation,
    events::{splice_lines, Invalidation, LayoutListener},
    model::{LayoutContext, TextAttributes},
};
use compact_str::CompactString;
use rustc_hash::FxHashMap;
use std::{cell::RefCell, rc::Rc};

/// Line layouts indexed by logical line, plus the chunk cache their fragments
/// live in and measured placeholder layouts.
///
/// Reads go through `&self` so a [`CoordinateMapper`](crate::CoordinateMapper)
/// can fill the cache while it walks lines.
#[derive(Debug)]
pub struct LineLayoutCache {
    lines: RefCell<Vec<Option<Rc<LineLayout>>>>,
    chunks: ChunkCache,
    placeholders: RefCell<FxHashMap<CompactString, Rc<WithSize>>>,
    /// Lines laid out since the last [`take_laid_out`](Self::take_laid_out).
    laid_out: RefCell<Vec<usize>>,
    active_limit: usize,
    inactive_limit: usize,
    strict: bool,
}

impl LineLayoutCache {
    pub fn new(config: &LayoutConfig) -> Self {
        Self {
            lines: RefCell::new(Vec::new()),
            chunks: ChunkCache::new(config.chunk_cache_active_limit),
            placeholders: RefCell::new(FxHashMap::default()),
            laid_out: RefCell::new(Vec::new()),
            active_limit: config.chunk_cache_active_limit,
            inactive_limit: config.chunk_cache_inactive_limit,
            strict: config.strict_invariants,
        }
    }

    /// Layout of `line`, computed and cached on first request.
    pub fn layout(&self, line: usize, ctx: &LayoutContext<'_>, config: &LayoutConfig) -> Rc<LineLayout> {
        let line_count = ctx.document.line_count();
        let mut lines = self.lines.borrow_mut();
        if lines.len() != line_count {
            if !lines.is_empty() {
                invariant_violation(
                    self.strict,
                    format_args!(
                        "line layout cache holds {} lines, document has {line_count}",
                        lines.len()
                    ),
                );
                for layout in lines.drain(..).flatten() {
                    layout.release_chunks(&self.chunks);
                }
            }
            lines.resize(line_count, None);
        }

        let line = line.min(line_count - 1);
        if let Some(layout) = &lines[line] {
            return layout.clone();
        }
        let layout = Rc::new(LineLayout::new(
            ctx.document.line_text(line),
            ctx.syntax,
            config,
        ));
        lines[line] = Some(layout.clone());
        self.laid_out.borrow_mut().push(line);
        layout
    }

    pub fn is_computed(&self, line: usize) -> bool {
        self.lines
            .borrow()
            .get(line)
            .is_some_and(Option::is_some)
    }

    /// Measured layout of a fold placeholder, keyed by its text.
    pub fn placeholder(&self, text: &str, ctx: &LayoutContext<'_>, config: &LayoutConfig) -> Rc<WithSize> {
        if let Some(layout) = self.placeholders.borrow().get(text) {
            return layout.clone();
        }
        let layout = Rc::new(LineLayout::for_text(
            text,
            TextAttributes::default(),
            ctx.metrics,
            config,
        ));
        self.placeholders
            .borrow_mut()
            .insert(CompactString::new(text), layout.clone());
        layout
    }

    /// Shaping context for `line` backed by this cache's chunk store.
    pub fn shaping<'a>(
        &'a self,
        line: usize,
        ctx: &LayoutContext<'a>,
        config: &'a LayoutConfig,
    ) -> ShapingContext<'a> {
        ShapingContext {
            text: ctx.document.line_text(line),
            base_offset: ctx.document.line_start(line),
            attributes: ctx.attributes,
            metrics: ctx.metrics,
            config,
            chunks: Some(&self.chunks),
        }
    }

    /// Drain the logical lines laid out since the previous call.
    pub fn take_laid_out(&self) -> Vec<usize> {
        std::mem::take(&mut *self.laid_out.borrow_mut())
    }

    pub fn chunk_cache(&self) -> &ChunkCache {
        &self.chunks
    }

    /// Switch the chunk cache between its active and background limits.
    pub fn set_active(&self, active: bool) {
        let limit = if active {
            self.active_limit
        } else {
            self.inactive_limit
        };
        self.chunks.set_limit(limit);
    }

    pub fn cached_lines(&self) -> usize {
        self.lines.borrow().iter().filter(|line| line.is_some()).count()
    }
}

impl LayoutListener for LineLayoutCache {
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
                format_args!("line layout cache held {} lines before an edit of a {old}-line document", lines.len()),
            );
            self.reset();
            return;
        }

        let start = doc.line_at_offset(invalidation.start);
        let end = doc.line_at_offset(invalidation.end);
        let dropped = splice_lines(lines, start, end, doc.line_count(), || None);
        tracing::trace!(start, end, dropped = dropped.len(), "spliced line layouts");
        for layout in dropped.into_iter().flatten() {
            layout.release_chunks(&self.chunks);
        }
        self.laid_out
            .get_mut()
            .retain(|line| *line < start);
    }

    fn reset(&mut self) {
        for layout in self.lines.get_mut().drain(..).flatten() {
            layout.release_chunks(&self.chunks);
        }
        self.chunks.clear();
        self.placeholders.get_mut().clear();
        self.laid_out.get_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;

    #[test]
    fn layouts_are_cached_and_reported_once() {
        let fixture = Fixture::new("one\ntwo\nthree");
        let ctx = fixture.ctx();
        let config = LayoutConfig::default();
        let cache = LineLayoutCache::new(&config);

        let first = cache.layout(1, &ctx, &config);
        let again = cache.layout(1, &ctx, &config);
        assert!(Rc::ptr_eq(&first, &again));
        assert!(cache.is_computed(1));
        assert!(!cache.is_computed(0));
        assert_eq!(cache.take_laid_out(), vec![1]);
        assert!(cache.take_laid_out().is_empty());
    }

    #[test]
    fn invalidation_splices_lines() {
        let mut fixture = Fixture::new("a\nb\nc\nd");
        let config = LayoutConfig::default();
        let mut cache = LineLayoutCache::new(&config);
        {
            let ctx = fixture.ctx();
            for line in 0..4 {
                cache.layout(line, &ctx, &config);
            }
        }

        let change = fixture.edit(2, 0, "x\ny\n");
        let ctx = fixture.ctx();
        cache.invalidate(&Invalidation::text(&change, change.old_range(), 4), &ctx);

        assert!(cache.is_computed(0));
        assert!(!cache.is_computed(1));
        assert!(!cache.is_computed(2));
        assert!(!cache.is_computed(3));
        assert!(cache.is_computed(4));
        assert!(cache.is_computed(5));
        assert_eq!(cache.cached_lines(), 3);
    }

    #[test]
    fn background_limit_evicts_shaped_chunks() {
        let fixture = Fixture::new("abcd\nefgh\nijkl\nmnop");
        let ctx = fixture.ctx();
        let config = LayoutConfig {
            chunk_size: 2,
            chunk_cache_active_limit: 6,
            chunk_cache_inactive_limit: 2,
            ..LayoutConfig::default()
        };
        let cache = LineLayoutCache::new(&config);
        let width = |line: usize| {
            let layout = cache.layout(line, &ctx, &config);
            layout.width(&cache.shaping(line, &ctx, &config))
        };

        for line in 0..4 {
            assert_eq!(width(line), 4.0 * fixture.metrics.cell_width());
        }
        let chunks = cache.chunk_cache();
        assert_eq!(chunks.limit(), 6);
        assert_eq!(chunks.len(), 6);
        assert_eq!(chunks.evictions(), 2);

        cache.set_active(false);
        assert_eq!(chunks.limit(), 2);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks.evictions(), 6);

        // Line 0 lost its chunks and is shaped again.
        assert_eq!(width(0), 4.0 * fixture.metrics.cell_width());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks.evictions(), 8);

        cache.set_active(true);
        assert_eq!(chunks.limit(), 6);
        assert_eq!(chunks.len(), 2);
        assert_eq!(cache.cached_lines(), 4);
    }

    #[test]
    fn placeholders_are_keyed_by_text() {
        let fixture = Fixture::new("abc");
        let ctx = fixture.ctx();
        let config = LayoutConfig::default();
        let cache = LineLayoutCache::new(&config);

        let a = cache.placeholder("...", &ctx, &config);
        let b = cache.placeholder("...", &ctx, &config);
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(a.width(), 3.0 * fixture.metrics.cell_width());
    }
}
