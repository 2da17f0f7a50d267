//! Text layout and coordinate mapping for Stoat.
//!
//! This crate keeps four coordinate spaces consistent over a live document:
//!
//! ```text
//! offset (UTF-16 index)
//!   | Document line index, LogicalColumnCache
//! LogicalPosition (line, column)
//!   | folds, soft wraps, inline inlays, bidi reordering
//! VisualPosition (visual line, visual column)
//!   | fragment widths, line height, block inlays
//! PixelPoint (x, y)
//! ```
//!
//! # Architecture
//!
//! - [`LineLayout`] splits one line into bidi runs, runs into chunks, and
//!   shapes chunks lazily into [`Fragment`]s held by a bounded LRU.
//! - [`LogicalColumnCache`] stores sparse column checkpoints per line so column
//!   lookups never rescan a whole line.
//! - [`SizeManager`] caches per-visual-line widths and the preferred size.
//! - [`VisualLineIterator`] and [`VisualLineFragmentsIterator`] walk visual
//!   lines and their fragments without materializing the document layout.
//! - [`CoordinateMapper`] composes all of the above into conversions.
//!
//! Folds, soft wraps, inlays, text attributes, syntax and font metrics are
//! collaborators owned by the host and read through the traits in [`model`]
//! and [`FontMetrics`]. The host reports every change to [`LayoutEngine`] as a
//! [`LayoutEvent`] so the caches stay in step.
//!
//! # Usage
//!
//! ```ignore
//! let mut engine = LayoutEngine::new(LayoutConfig::default());
//! let mapper = engine.mapper(ctx)?;
//! let visual = mapper.offset_to_visual(offset, true);
//! let point = mapper.visual_to_xy(visual);
//! ```
mod cancel;
mod column_cache;
mod config;
mod coords;
mod document;
mod engine;
mod error;
mod events;
mod fragments;
pub mod line_layout;
mod mapper;
mod metrics;
pub mod model;
mod size_manager;
mod visual_line;

pub use cancel::{Cancelled, CancellationToken};
pub use column_cache::LogicalColumnCache;
pub use config::{LayoutConfig, SizePolicy};
pub use coords::{LogicalPosition, PixelPoint, VisualPosition};
pub use document::{Document, TextChange, TextSnapshot};
pub use engine::LayoutEngine;
pub use error::{Error, Result};
pub use events::{BatchKind, InlayChangeFlags, Invalidation, LayoutEvent, LayoutListener};
pub use fragments::{VisualLineFragment, VisualLineFragmentsIterator};
pub use line_layout::{Fragment, LineLayout, LineLayoutCache};
pub use mapper::CoordinateMapper;
pub use metrics::{FontMetrics, MonospaceMetrics};
pub use model::{
    FoldModel, FoldRegion, FoldingModel, Inlay, InlayModel, InlayPlacement, InlayStore,
    LayoutContext, SoftWrap, SoftWrapModel, SoftWrapStore,
};
pub use size_manager::{LineWidth, SizeManager};
pub use visual_line::{VisualLine, VisualLineIterator, VisualLineMap};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{
        document::{TextChange, TextSnapshot},
        metrics::MonospaceMetrics,
        model::{
            FoldModel, FoldRegion, Inlay, InlayStore, LayoutContext, PlainAttributes, PlainSyntax,
            SoftWrap, SoftWrapStore,
        },
    };

    /// A document with in-memory collaborators on a 10x20 cell grid.
    pub(crate) struct Fixture {
        pub doc: TextSnapshot,
        pub folds: FoldModel,
        pub wraps: SoftWrapStore,
        pub inlays: InlayStore,
        pub attributes: PlainAttributes,
        pub syntax: PlainSyntax,
        pub metrics: MonospaceMetrics,
    }

    impl Fixture {
        pub(crate) fn new(text: &str) -> Self {
            Self {
                doc: TextSnapshot::new(text),
                folds: FoldModel::default(),
                wraps: SoftWrapStore::default(),
                inlays: InlayStore::default(),
                attributes: PlainAttributes::default(),
                syntax: PlainSyntax,
                metrics: MonospaceMetrics::new(10.0, 20.0),
            }
        }

        pub(crate) fn ctx(&self) -> LayoutContext<'_> {
            LayoutContext {
                document: &self.doc,
                folds: &self.folds,
                soft_wraps: &self.wraps,
                inlays: &self.inlays,
                attributes: &self.attributes,
                syntax: &self.syntax,
                metrics: &self.metrics,
            }
        }

        /// Edit the text and shift every collaborator past the change.
        pub(crate) fn edit(&mut self, offset: usize, old_len: usize, text: &str) -> TextChange {
            let (doc, change) = self.doc.edit(offset, old_len, text);
            self.doc = doc;
            self.folds.apply_change(&self.doc, &change);
            self.wraps.apply_change(&self.doc, &change);
            self.inlays.apply_change(&change);
            change
        }

        pub(crate) fn fold(&mut self, region: FoldRegion) {
            assert!(self.folds.add(&self.doc, region), "overlapping fold region");
            self.wraps.remove_inside(&self.folds);
        }

        pub(crate) fn wrap(&mut self, wraps: impl IntoIterator<Item = SoftWrap>) {
            self.wraps = SoftWrapStore::new(&self.doc, wraps);
            self.wraps.remove_inside(&self.folds);
        }

        pub(crate) fn inlay(&mut self, inlay: Inlay) {
            self.inlays.insert(inlay);
        }
    }
}
