//! Collaborators the engine reads from but never owns.
//!
//! Each collaborator is a trait with a small in-memory implementation so the
//! engine can be driven standalone. Hosts plug in their own models and bundle
//! them into a [`LayoutContext`] for every call.
mod attributes;
mod fold;
mod inlay;
mod soft_wrap;
mod syntax;

pub use attributes::{
    AttributeProvider, AttributeRun, AttributeRuns, FontStyle, HighlightAttributes,
    PlainAttributes, TextAttributes,
};
pub use fold::{CustomFoldSize, FoldModel, FoldRegion, FoldingModel};
pub use inlay::{is_hidden, visible_block_height, Inlay, InlayModel, InlayPlacement, InlayStore};
pub use soft_wrap::{SoftWrap, SoftWrapModel, SoftWrapStore};
pub use syntax::{LexicalToken, LineCommentSyntax, LineTokens, PlainSyntax, SyntaxContext};

use crate::{document::Document, metrics::FontMetrics};

/// Borrowed view of every collaborator for one snapshot of editor state.
///
/// All references must describe the same document snapshot. The engine
/// assumes folds, wraps and inlays are already adjusted for the latest edit
/// when it receives the matching [`LayoutEvent`](crate::LayoutEvent).
#[derive(Clone, Copy)]
pub struct LayoutContext<'a> {
    pub document: &'a dyn Document,
    pub folds: &'a dyn FoldingModel,
    pub soft_wraps: &'a dyn SoftWrapModel,
    pub inlays: &'a dyn InlayModel,
    pub attributes: &'a dyn AttributeProvider,
    pub syntax: &'a dyn SyntaxContext,
    pub metrics: &'a dyn FontMetrics,
}

impl std::fmt::Debug for LayoutContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutContext")
            .field("len", &self.document.len())
            .field("lines", &self.document.line_count())
            .field("collapsed_folds", &self.folds.collapsed_regions().len())
            .field("soft_wraps", &self.soft_wraps.soft_wraps().len())
            .finish_non_exhaustive()
    }
}
