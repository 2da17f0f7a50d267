//! Fold regions and the folding collaborator.
//!
//! Folding hides a document range behind a placeholder. A collapsed region
//! whose range spans newlines joins logical lines into one visual line:
//!
//! ```text
//! Document:              Visual lines:
//! 0: fn example() {      0: fn example() {...}
//! 1:     body            1: fn another()
//! 2: }
//! 3: fn another()
//! ```
//!
//! A logical line start `s` is hidden when a collapsed region has
//! `start < s <= end`. The engine only reads fold state; the host owns it.
use crate::document::{Document, TextChange};
use compact_str::CompactString;
use std::ops::Range;

/// Fixed placeholder geometry for a custom region, decoupled from any text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CustomFoldSize {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoldRegion {
    pub range: Range<usize>,
    pub placeholder: CompactString,
    pub collapsed: bool,
    /// Custom regions span whole logical lines and render at a fixed size.
    pub custom: Option<CustomFoldSize>,
}

impl FoldRegion {
    /// A collapsed region showing `placeholder`.
    pub fn new(range: Range<usize>, placeholder: impl Into<CompactString>) -> Self {
        Self {
            range,
            placeholder: placeholder.into(),
            collapsed: true,
            custom: None,
        }
    }

    /// A collapsed custom region. The range is widened to whole lines when the
    /// region is added to a [`FoldModel`].
    pub fn custom(range: Range<usize>, width: f32, height: f32) -> Self {
        Self {
            range,
            placeholder: CompactString::default(),
            collapsed: true,
            custom: Some(CustomFoldSize { width, height }),
        }
    }

    pub fn expanded(mut self) -> Self {
        self.collapsed = false;
        self
    }

    pub fn start(&self) -> usize {
        self.range.start
    }

    pub fn end(&self) -> usize {
        self.range.end
    }

    /// Number of visual columns the placeholder occupies.
    pub fn placeholder_columns(&self) -> usize {
        match self.custom {
            Some(_) => 1,
            None => self.placeholder.chars().count().max(1),
        }
    }
}

/// Read access to the collapsed top-level fold regions.
pub trait FoldingModel {
    /// Collapsed top-level regions, sorted by start and non-overlapping.
    fn collapsed_regions(&self) -> &[FoldRegion];

    /// Number of logical line starts hidden by collapsed regions ending at or
    /// before `offset`.
    fn folded_lines_before(&self, offset: usize) -> usize;

    /// Height that custom regions starting before `offset` add beyond `line_height`.
    fn custom_height_excess_before(&self, offset: usize, line_height: f32) -> f32 {
        self.collapsed_regions()
            .iter()
            .take_while(|region| region.range.start < offset)
            .filter_map(|region| region.custom)
            .map(|size| (size.height - line_height).max(0.0))
            .sum()
    }

    /// Collapsed region with `start <= offset < end`.
    fn collapsed_region_at(&self, offset: usize) -> Option<&FoldRegion> {
        let regions = self.collapsed_regions();
        let ix = regions.partition_point(|region| region.range.start <= offset);
        ix.checked_sub(1)
            .map(|ix| &regions[ix])
            .filter(|region| offset < region.range.end)
    }

    /// Index of the last collapsed region ending at or before `offset`.
    fn last_collapsed_before(&self, offset: usize) -> Option<usize> {
        self.collapsed_regions()
            .partition_point(|region| region.range.end <= offset)
            .checked_sub(1)
    }
}

/// In-memory folding model over a sorted `Vec`.
///
/// Nested regions are not tracked; a region overlapping one already present is
/// rejected.
#[derive(Debug, Clone)]
pub struct FoldModel {
    regions: Vec<FoldRegion>,
    collapsed: Vec<FoldRegion>,
    /// `hidden_lines[i]` is the number of line starts hidden by `collapsed[..i]`.
    /// Always one longer than `collapsed`.
    hidden_lines: Vec<usize>,
}

impl Default for FoldModel {
    fn default() -> Self {
        Self {
            regions: Vec::new(),
            collapsed: Vec::new(),
            hidden_lines: vec![0],
        }
    }
}

impl FoldModel {
    pub fn new(doc: &dyn Document, regions: impl IntoIterator<Item = FoldRegion>) -> Self {
        let mut model = Self::default();
        for region in regions {
            model.add(doc, region);
        }
        model.rebuild(doc);
        model
    }

    /// All top-level regions, collapsed or not.
    pub fn regions(&self) -> &[FoldRegion] {
        &self.regions
    }

    /// Insert a region. Returns `false` if it is empty or overlaps an existing one.
    pub fn add(&mut self, doc: &dyn Document, mut region: FoldRegion) -> bool {
        let len = doc.len();
        region.range.end = region.range.end.min(len);
        if region.custom.is_some() {
            let start_line = doc.line_at_offset(region.range.start);
            let end_line = doc.line_at_offset(region.range.end);
            region.range = doc.line_start(start_line)..doc.line_end(end_line);
        }
        if region.range.start >= region.range.end {
            return false;
        }

        let ix = self
            .regions
            .partition_point(|existing| existing.range.start < region.range.start);
        let overlaps_prev = ix > 0 && self.regions[ix - 1].range.end > region.range.start;
        let overlaps_next = self
            .regions
            .get(ix)
            .is_some_and(|next| next.range.start < region.range.end);
        if overlaps_prev || overlaps_next {
            tracing::trace!(range = ?region.range, "rejecting overlapping fold region");
            return false;
        }

        self.regions.insert(ix, region);
        self.rebuild(doc);
        true
    }

    /// Remove the region starting at `start`.
    pub fn remove(&mut self, doc: &dyn Document, start: usize) -> Option<FoldRegion> {
        let ix = self
            .regions
            .iter()
            .position(|region| region.range.start == start)?;
        let region = self.regions.remove(ix);
        self.rebuild(doc);
        Some(region)
    }

    /// Collapse or expand the region starting at `start`, returning its range.
    pub fn set_collapsed(
        &mut self,
        doc: &dyn Document,
        start: usize,
        collapsed: bool,
    ) -> Option<Range<usize>> {
        let region = self
            .regions
            .iter_mut()
            .find(|region| region.range.start == start)?;
        region.collapsed = collapsed;
        let range = region.range.clone();
        self.rebuild(doc);
        Some(range)
    }

    /// Shift regions past an edit. Regions whose boundary the edit touches are
    /// dropped; an edit strictly inside a region resizes it. `doc` is the text
    /// after the edit.
    pub fn apply_change(&mut self, doc: &dyn Document, change: &TextChange) {
        let old_end = change.offset + change.old_len;
        self.regions.retain_mut(|region| {
            if region.range.end <= change.offset {
                true
            } else if region.range.start >= old_end {
                region.range.start = region.range.start - change.old_len + change.new_len;
                region.range.end = region.range.end - change.old_len + change.new_len;
                true
            } else if region.range.start < change.offset && old_end < region.range.end {
                region.range.end = region.range.end - change.old_len + change.new_len;
                true
            } else {
                false
            }
        });
        self.rebuild(doc);
    }

    fn rebuild(&mut self, doc: &dyn Document) {
        self.collapsed = self
            .regions
            .iter()
            .filter(|region| region.collapsed)
            .cloned()
            .collect();

        self.hidden_lines.clear();
        self.hidden_lines.push(0);
        let mut total = 0;
        for region in &self.collapsed {
            total += doc.line_at_offset(region.range.end) - doc.line_at_offset(region.range.start);
            self.hidden_lines.push(total);
        }
    }
}

impl FoldingModel for FoldModel {
    fn collapsed_regions(&self) -> &[FoldRegion] {
        &self.collapsed
    }

    fn folded_lines_before(&self, offset: usize) -> usize {
        let ix = self
            .collapsed
            .partition_point(|region| region.range.end <= offset);
        self.hidden_lines[ix]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TextSnapshot;

    fn doc() -> TextSnapshot {
        TextSnapshot::new("fn a() {\n    x\n}\nfn b()\n")
    }

    #[test]
    fn empty_model_hides_nothing() {
        let doc = doc();
        let folds = FoldModel::default();

        for offset in 0..=doc.len() {
            assert_eq!(folds.folded_lines_before(offset), 0);
            assert!(folds.collapsed_region_at(offset).is_none());
        }
        assert_eq!(folds.last_collapsed_before(doc.len()), None);
    }

    #[test]
    fn counts_hidden_line_starts() {
        let doc = doc();
        let folds = FoldModel::new(&doc, [FoldRegion::new(7..16, "{...}")]);

        assert_eq!(folds.folded_lines_before(7), 0);
        assert_eq!(folds.folded_lines_before(15), 0);
        assert_eq!(folds.folded_lines_before(16), 2);
        assert_eq!(folds.folded_lines_before(doc.len()), 2);
    }

    #[test]
    fn region_lookup_is_half_open() {
        let doc = doc();
        let folds = FoldModel::new(&doc, [FoldRegion::new(7..16, "{...}")]);

        assert!(folds.collapsed_region_at(6).is_none());
        assert_eq!(folds.collapsed_region_at(7).map(FoldRegion::start), Some(7));
        assert_eq!(folds.collapsed_region_at(15).map(FoldRegion::start), Some(7));
        assert!(folds.collapsed_region_at(16).is_none());

        assert_eq!(folds.last_collapsed_before(15), None);
        assert_eq!(folds.last_collapsed_before(16), Some(0));
    }

    #[test]
    fn expanded_regions_are_not_collapsed() {
        let doc = doc();
        let mut folds = FoldModel::new(&doc, [FoldRegion::new(7..16, "{...}").expanded()]);
        assert!(folds.collapsed_regions().is_empty());

        assert_eq!(folds.set_collapsed(&doc, 7, true), Some(7..16));
        assert_eq!(folds.collapsed_regions().len(), 1);
    }

    #[test]
    fn rejects_overlapping_regions() {
        let doc = doc();
        let mut folds = FoldModel::new(&doc, [FoldRegion::new(7..16, "{...}")]);
        assert!(!folds.add(&doc, FoldRegion::new(10..20, "..")));
        assert!(!folds.add(&doc, FoldRegion::new(3..3, "..")));
        assert!(folds.add(&doc, FoldRegion::new(19..22, "..")));
        assert_eq!(folds.regions().len(), 2);
    }

    #[test]
    fn custom_regions_span_whole_lines() {
        let doc = doc();
        let folds = FoldModel::new(&doc, [FoldRegion::custom(11..12, 40.0, 30.0)]);
        let region = &folds.collapsed_regions()[0];
        assert_eq!(region.range, 9..14);
        assert_eq!(folds.custom_height_excess_before(10, 20.0), 10.0);
        assert_eq!(folds.custom_height_excess_before(9, 20.0), 0.0);
    }

    #[test]
    fn edits_shift_or_drop_regions() {
        let doc = doc();
        let mut folds = FoldModel::new(
            &doc,
            [FoldRegion::new(7..16, "{...}"), FoldRegion::new(17..21, "..")],
        );

        let (doc, change) = doc.edit(0, 0, "pub ");
        folds.apply_change(&doc, &change);
        assert_eq!(folds.regions()[0].range, 11..20);
        assert_eq!(folds.regions()[1].range, 21..25);

        let (doc, change) = doc.edit(20, 2, "");
        folds.apply_change(&doc, &change);
        assert_eq!(folds.regions().len(), 1);
    }
}
