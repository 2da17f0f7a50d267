//! A host editor for integration tests: in-memory collaborators plus a
//! [`LayoutEngine`] that is told about every change.
#![allow(dead_code)]

use stoat_layout::{
    model::{PlainAttributes, PlainSyntax},
    BatchKind, CancellationToken, CoordinateMapper, Document, FoldModel, FoldRegion, Inlay,
    InlayChangeFlags, InlayStore, LayoutConfig, LayoutContext, LayoutEngine, LayoutEvent,
    MonospaceMetrics, SoftWrap, SoftWrapStore, TextSnapshot,
};

pub struct Model {
    pub doc: TextSnapshot,
    pub folds: FoldModel,
    pub wraps: SoftWrapStore,
    pub inlays: InlayStore,
    pub attributes: PlainAttributes,
    pub syntax: PlainSyntax,
    pub metrics: MonospaceMetrics,
}

impl Model {
    pub fn ctx(&self) -> LayoutContext<'_> {
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
}

pub struct Editor {
    pub model: Model,
    pub engine: LayoutEngine,
}

impl Editor {
    pub fn new(text: &str) -> Self {
        Self::with_config(text, LayoutConfig::default())
    }

    pub fn with_config(text: &str, config: LayoutConfig) -> Self {
        stoat_log::test();
        Self {
            model: Model {
                doc: TextSnapshot::new(text),
                folds: FoldModel::default(),
                wraps: SoftWrapStore::default(),
                inlays: InlayStore::default(),
                attributes: PlainAttributes::default(),
                syntax: PlainSyntax,
                metrics: MonospaceMetrics::new(10.0, 20.0),
            },
            engine: LayoutEngine::new(config),
        }
    }

    pub fn mapper(&self) -> CoordinateMapper<'_> {
        self.engine.mapper(self.model.ctx()).unwrap()
    }

    pub fn send(&mut self, event: LayoutEvent) {
        self.engine.handle(&event, &self.model.ctx()).unwrap();
    }

    /// Replace `old_len` units at `offset` with `text`, sending the
    /// before/after pair around the edit.
    pub fn edit(&mut self, offset: usize, old_len: usize, text: &str) {
        let (doc, change) = self.model.doc.edit(offset, old_len, text);
        self.send(LayoutEvent::BeforeTextChange(change));
        self.model.doc = doc;
        self.model.folds.apply_change(&self.model.doc, &change);
        self.model.wraps.apply_change(&self.model.doc, &change);
        self.model.inlays.apply_change(&change);
        self.send(LayoutEvent::TextChanged(change));
    }

    pub fn fold(&mut self, region: FoldRegion) {
        let range = region.range.clone();
        assert!(self.model.folds.add(&self.model.doc, region));
        let range = self
            .model
            .folds
            .regions()
            .iter()
            .find(|region| region.range.start <= range.start && range.start < region.range.end)
            .map_or(range, |region| region.range.clone());
        self.model.wraps.remove_inside(&self.model.folds);
        self.send(LayoutEvent::FoldChanged { range });
    }

    pub fn unfold(&mut self, start: usize) {
        let range = self
            .model
            .folds
            .set_collapsed(&self.model.doc, start, false)
            .unwrap();
        self.send(LayoutEvent::FoldChanged { range });
    }

    pub fn wrap(&mut self, wraps: impl IntoIterator<Item = SoftWrap>) {
        let len = self.model.doc.len();
        self.model.wraps.replace_range(&self.model.doc, 0..len, wraps);
        self.model.wraps.remove_inside(&self.model.folds);
        self.send(LayoutEvent::SoftWrapsRecalculated { range: 0..len });
    }

    pub fn inlay(&mut self, inlay: Inlay) {
        self.model.inlays.insert(inlay);
        self.send(LayoutEvent::InlayChanged {
            offset: inlay.offset,
            placement: inlay.placement,
            flags: InlayChangeFlags {
                width_changed: true,
                height_changed: inlay.placement.is_block(),
            },
        });
    }

    pub fn batch(&mut self, kind: BatchKind, f: impl FnOnce(&mut Self)) {
        self.send(LayoutEvent::BatchStarted(kind));
        f(self);
        self.send(LayoutEvent::BatchFinished(kind));
    }

    pub fn preferred_width(&mut self) -> f32 {
        self.engine
            .preferred_width(self.model.ctx(), &CancellationToken::never())
            .unwrap()
    }

    pub fn line_widths(&self) -> Vec<i32> {
        self.engine.sizes().line_widths().to_vec()
    }
}
