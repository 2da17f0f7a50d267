//! Text attributes consumed by fragment shaping.
//!
//! The engine never decides what attributes apply; it only splits fragments
//! where the provider reports a change of font style or foreground color.
use smallvec::{smallvec, SmallVec};
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FontStyle {
    #[default]
    Plain,
    Bold,
    Italic,
    BoldItalic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextAttributes {
    pub style: FontStyle,
    /// Foreground color as `0xAARRGGBB`.
    pub color: u32,
}

impl TextAttributes {
    pub fn new(style: FontStyle, color: u32) -> Self {
        Self { style, color }
    }
}

/// A maximal span sharing one set of attributes, in document offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRun {
    pub range: Range<usize>,
    pub attributes: TextAttributes,
}

pub type AttributeRuns = SmallVec<[AttributeRun; 4]>;

pub trait AttributeProvider {
    /// Runs covering `range` contiguously, in offset order.
    fn attribute_runs(&self, range: Range<usize>) -> AttributeRuns;
}

/// The same attributes everywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainAttributes(pub TextAttributes);

impl AttributeProvider for PlainAttributes {
    fn attribute_runs(&self, range: Range<usize>) -> AttributeRuns {
        smallvec![AttributeRun {
            range,
            attributes: self.0,
        }]
    }
}

/// Sorted, non-overlapping highlighted ranges over base attributes.
#[derive(Debug, Clone, Default)]
pub struct HighlightAttributes {
    base: TextAttributes,
    highlights: Vec<AttributeRun>,
}

impl HighlightAttributes {
    pub fn new(base: TextAttributes, highlights: impl IntoIterator<Item = AttributeRun>) -> Self {
        let mut highlights: Vec<_> = highlights
            .into_iter()
            .filter(|run| !run.range.is_empty())
            .collect();
        highlights.sort_by_key(|run| run.range.start);
        let mut end = 0;
        highlights.retain(|run| {
            let keep = run.range.start >= end;
            if keep {
                end = run.range.end;
            }
            keep
        });
        Self { base, highlights }
    }
}

impl AttributeProvider for HighlightAttributes {
    fn attribute_runs(&self, range: Range<usize>) -> AttributeRuns {
        let mut runs = AttributeRuns::new();
        let mut push = |range: Range<usize>, attributes: TextAttributes| {
            if range.is_empty() {
                return;
            }
            match runs.last_mut() {
                Some(last) if last.attributes == attributes && last.range.end == range.start => {
                    last.range.end = range.end;
                },
                _ => runs.push(AttributeRun { range, attributes }),
            }
        };

        let first = self
            .highlights
            .partition_point(|run| run.range.end <= range.start);
        let mut pos = range.start;
        for run in self.highlights[first..]
            .iter()
            .take_while(|run| run.range.start < range.end)
        {
            let start = run.range.start.max(range.start);
            let end = run.range.end.min(range.end);
            push(pos..start, self.base);
            push(start..end, run.attributes);
            pos = end;
        }
        push(pos..range.end, self.base);
        runs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYWORD: TextAttributes = TextAttributes {
        style: FontStyle::Bold,
        color: 0xFF0000FF,
    };

    #[test]
    fn plain_attributes_cover_whole_range() {
        let runs = PlainAttributes::default().attribute_runs(3..9);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].range, 3..9);
    }

    #[test]
    fn highlights_split_runs_and_fill_gaps() {
        let attrs = HighlightAttributes::new(
            TextAttributes::default(),
            [
                AttributeRun {
                    range: 2..4,
                    attributes: KEYWORD,
                },
                AttributeRun {
                    range: 8..12,
                    attributes: KEYWORD,
                },
            ],
        );
        let runs = attrs.attribute_runs(0..10);
        let ranges: Vec<_> = runs.iter().map(|run| run.range.clone()).collect();
        assert_eq!(ranges, vec![0..2, 2..4, 4..8, 8..10]);
        assert_eq!(runs[3].attributes, KEYWORD);
    }

    #[test]
    fn adjacent_equal_runs_merge() {
        let attrs = HighlightAttributes::new(
            TextAttributes::default(),
            [AttributeRun {
                range: 0..3,
                attributes: TextAttributes::default(),
            }],
        );
        let runs = attrs.attribute_runs(0..6);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].range, 0..6);
    }
}
