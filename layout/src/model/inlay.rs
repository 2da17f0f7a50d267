//! Inlays: non-text visual elements anchored to document offsets.
use crate::{
    document::TextChange,
    model::FoldingModel,
};
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InlayPlacement {
    /// Between two characters, one visual column wide.
    Inline,
    /// After the last fragment of the logical line.
    AfterLineEnd,
    /// A block above the visual line containing the anchor.
    BlockAbove,
    /// A block below the visual line containing the anchor.
    BlockBelow,
}

impl InlayPlacement {
    pub fn is_block(self) -> bool {
        matches!(self, Self::BlockAbove | Self::BlockBelow)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inlay {
    pub offset: usize,
    pub placement: InlayPlacement,
    pub width: f32,
    pub height: f32,
}

impl Inlay {
    pub fn inline(offset: usize, width: f32) -> Self {
        Self {
            offset,
            placement: InlayPlacement::Inline,
            width,
            height: 0.0,
        }
    }

    pub fn after_line_end(offset: usize, width: f32) -> Self {
        Self {
            offset,
            placement: InlayPlacement::AfterLineEnd,
            width,
            height: 0.0,
        }
    }

    pub fn block_above(offset: usize, width: f32, height: f32) -> Self {
        Self {
            offset,
            placement: InlayPlacement::BlockAbove,
            width,
            height,
        }
    }

    pub fn block_below(offset: usize, width: f32, height: f32) -> Self {
        Self {
            offset,
            placement: InlayPlacement::BlockBelow,
            width,
            height,
        }
    }
}

/// Read access to inlays.
pub trait InlayModel {
    /// Inlays of `placement` anchored in `range`, in offset order. Inlays
    /// sharing an offset keep their insertion order.
    fn inlays_in(&self, placement: InlayPlacement, range: Range<usize>) -> &[Inlay];

    /// Summed height of the inlays of `placement` anchored in `range`.
    fn total_height(&self, placement: InlayPlacement, range: Range<usize>) -> f32 {
        self.inlays_in(placement, range)
            .iter()
            .map(|inlay| inlay.height)
            .sum()
    }

    /// Width of the widest block inlay.
    fn max_block_width(&self) -> f32;
}

/// Height of the block inlays of `placement` anchored in `range`, excluding
/// those strictly inside a collapsed fold region.
///
/// Costs one subtraction per collapsed region overlapping `range`.
pub fn visible_block_height(
    inlays: &dyn InlayModel,
    folds: &dyn FoldingModel,
    placement: InlayPlacement,
    range: Range<usize>,
) -> f32 {
    if range.is_empty() {
        return 0.0;
    }
    let mut height = inlays.total_height(placement, range.clone());
    let regions = folds.collapsed_regions();
    let first = regions.partition_point(|region| region.range.end <= range.start);
    for region in regions[first..]
        .iter()
        .take_while(|region| region.range.start < range.end)
    {
        let hidden_start = (region.range.start + 1).max(range.start);
        let hidden_end = region.range.end.min(range.end);
        if hidden_start < hidden_end {
            height -= inlays.total_height(placement, hidden_start..hidden_end);
        }
    }
    height.max(0.0)
}

/// True when `inlay` is hidden by a collapsed fold region.
pub fn is_hidden(inlay: &Inlay, folds: &dyn FoldingModel) -> bool {
    folds
        .collapsed_region_at(inlay.offset)
        .is_some_and(|region| region.range.start < inlay.offset)
}

/// In-memory inlay model keeping one sorted `Vec` per placement plus prefix
/// sums of block heights.
#[derive(Debug, Clone)]
pub struct InlayStore {
    inline: Vec<Inlay>,
    after_line_end: Vec<Inlay>,
    above: Vec<Inlay>,
    below: Vec<Inlay>,
    /// Prefix sums, one longer than the matching block list.
    above_heights: Vec<f32>,
    below_heights: Vec<f32>,
}

impl Default for InlayStore {
    fn default() -> Self {
        Self {
            inline: Vec::new(),
            after_line_end: Vec::new(),
            above: Vec::new(),
            below: Vec::new(),
            above_heights: vec![0.0],
            below_heights: vec![0.0],
        }
    }
}

impl InlayStore {
    pub fn new(inlays: impl IntoIterator<Item = Inlay>) -> Self {
        let mut store = Self::default();
        for inlay in inlays {
            store.insert_sorted(inlay);
        }
        store.rebuild_heights();
        store
    }

    pub fn insert(&mut self, inlay: Inlay) {
        self.insert_sorted(inlay);
        self.rebuild_heights();
    }

    /// Remove the first inlay of `placement` at `offset`.
    pub fn remove(&mut self, placement: InlayPlacement, offset: usize) -> Option<Inlay> {
        let list = self.list_mut(placement);
        let ix = list.iter().position(|inlay| inlay.offset == offset)?;
        let inlay = list.remove(ix);
        self.rebuild_heights();
        Some(inlay)
    }

    /// Resize the first inlay of `placement` at `offset`. Returns `false` if none exists.
    pub fn resize(&mut self, placement: InlayPlacement, offset: usize, width: f32, height: f32) -> bool {
        let Some(inlay) = self
            .list_mut(placement)
            .iter_mut()
            .find(|inlay| inlay.offset == offset)
        else {
            return false;
        };
        inlay.width = width;
        inlay.height = height;
        self.rebuild_heights();
        true
    }

    /// Shift inlays past an edit. Inlays inside replaced text move to its start.
    pub fn apply_change(&mut self, change: &TextChange) {
        let old_end = change.offset + change.old_len;
        for list in [
            &mut self.inline,
            &mut self.after_line_end,
            &mut self.above,
            &mut self.below,
        ] {
            for inlay in list.iter_mut() {
                if inlay.offset >= old_end && (inlay.offset > change.offset || change.old_len > 0) {
                    inlay.offset = inlay.offset - change.old_len + change.new_len;
                } else if inlay.offset > change.offset {
                    inlay.offset = change.offset;
                }
            }
        }
        self.rebuild_heights();
    }

    fn insert_sorted(&mut self, inlay: Inlay) {
        let list = self.list_mut(inlay.placement);
        let ix = list.partition_point(|existing| existing.offset <= inlay.offset);
        list.insert(ix, inlay);
    }

    fn list(&self, placement: InlayPlacement) -> &[Inlay] {
        match placement {
            InlayPlacement::Inline => &self.inline,
            InlayPlacement::AfterLineEnd => &self.after_line_end,
            InlayPlacement::BlockAbove => &self.above,
            InlayPlacement::BlockBelow => &self.below,
        }
    }

    fn list_mut(&mut self, placement: InlayPlacement) -> &mut Vec<Inlay> {
        match placement {
            InlayPlacement::Inline => &mut self.inline,
            InlayPlacement::AfterLineEnd => &mut self.after_line_end,
            InlayPlacement::BlockAbove => &mut self.above,
            InlayPlacement::BlockBelow => &mut self.below,
        }
    }

    fn rebuild_heights(&mut self) {
        fn prefix(inlays: &[Inlay]) -> Vec<f32> {
            let mut sums = Vec::with_capacity(inlays.len() + 1);
            let mut total = 0.0;
            sums.push(total);
            for inlay in inlays {
                total += inlay.height;
                sums.push(total);
            }
            sums
        }
        self.above_heights = prefix(&self.above);
        self.below_heights = prefix(&self.below);
    }

    fn index_range(&self, placement: InlayPlacement, range: &Range<usize>) -> Range<usize> {
        let list = self.list(placement);
        let start = list.partition_point(|inlay| inlay.offset < range.start);
        let end = list.partition_point(|inlay| inlay.offset < range.end);
        start..end.max(start)
    }
}

impl InlayModel for InlayStore {
    fn inlays_in(&self, placement: InlayPlacement, range: Range<usize>) -> &[Inlay] {
        let ixs = self.index_range(placement, &range);
        &self.list(placement)[ixs]
    }

    fn total_height(&self, placement: InlayPlacement, range: Range<usize>) -> f32 {
        let sums = match placement {
            InlayPlacement::BlockAbove => &self.above_heights,
            InlayPlacement::BlockBelow => &self.below_heights,
            InlayPlacement::Inline | InlayPlacement::AfterLineEnd => return 0.0,
        };
        let ixs = self.index_range(placement, &range);
        sums[ixs.end] - sums[ixs.start]
    }

    fn max_block_width(&self) -> f32 {
        self.above
            .iter()
            .chain(&self.below)
            .map(|inlay| inlay.width)
            .fold(0.0, f32::max)
    }
}
