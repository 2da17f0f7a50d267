//! Fragments: the immutable, already-shaped units of a laid-out line.
use crate::{
    config::LayoutConfig,
    document::{is_high_surrogate, is_low_surrogate},
    metrics::{approximate_advances, FontMetrics},
    model::{AttributeProvider, FontStyle, InlayPlacement, TextAttributes},
};
use compact_str::CompactString;
use std::ops::Range;
use unicode_segmentation::UnicodeSegmentation;

const TAB: u16 = b'\t' as u16;

/// A shaped unit. Text, tab and special-character fragments come out of a
/// line's chunks with ranges relative to the line start. Fold placeholders and
/// inlays are produced while walking a visual line and carry document offsets.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// One advance per character, no reordering.
    SimpleText {
        range: Range<usize>,
        attributes: TextAttributes,
        /// Cumulative advance after each UTF-16 unit of `range`.
        x_offsets: Box<[f32]>,
        /// Advances are estimates because a glyph failed to lay out.
        approximate: bool,
    },
    /// Glyph-shaped text: RTL, clusters, complex scripts, ligatures or grid snapping.
    ComplexText {
        range: Range<usize>,
        attributes: TextAttributes,
        /// Cumulative advance after each unit, in logical order. For RTL text
        /// the distance is measured from the fragment's right edge.
        x_offsets: Box<[f32]>,
        rtl: bool,
        approximate: bool,
    },
    /// A tab; its width depends on where it starts.
    Tab { offset: usize },
    /// A control character drawn as a label.
    SpecialChar {
        offset: usize,
        label: CompactString,
        width: f32,
    },
    /// The placeholder standing in for a collapsed fold region.
    FoldPlaceholder {
        range: Range<usize>,
        placeholder: CompactString,
        width: f32,
        columns: usize,
    },
    Inlay {
        offset: usize,
        placement: InlayPlacement,
        width: f32,
    },
}

impl Fragment {
    /// Units covered, relative to the fragment's own start.
    pub fn len(&self) -> usize {
        match self {
            Self::SimpleText { range, .. } | Self::ComplexText { range, .. } => range.len(),
            Self::Tab { .. } | Self::SpecialChar { .. } => 1,
            Self::FoldPlaceholder { range, .. } => range.len(),
            Self::Inlay { .. } => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_rtl(&self) -> bool {
        matches!(self, Self::ComplexText { rtl: true, .. })
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::SimpleText { .. } | Self::ComplexText { .. })
    }

    pub fn is_approximate(&self) -> bool {
        matches!(
            self,
            Self::SimpleText {
                approximate: true,
                ..
            } | Self::ComplexText {
                approximate: true,
                ..
            }
        )
    }

    /// Start of the covered range: line-relative for text, tabs and special
    /// characters, a document offset for placeholders and inlays.
    pub fn start(&self) -> usize {
        match self {
            Self::SimpleText { range, .. }
            | Self::ComplexText { range, .. }
            | Self::FoldPlaceholder { range, .. } => range.start,
            Self::Tab { offset } | Self::SpecialChar { offset, .. } | Self::Inlay { offset, .. } => *offset,
        }
    }

    /// Advance from the fragment's logical start to the unit boundary `unit`
    /// (relative to the fragment start). Zero for non-text fragments.
    pub fn advance_to(&self, unit: usize) -> f32 {
        match self {
            Self::SimpleText { x_offsets, .. } | Self::ComplexText { x_offsets, .. } => {
                match unit.min(x_offsets.len()) {
                    0 => 0.0,
                    unit => x_offsets[unit - 1],
                }
            },
            _ => 0.0,
        }
    }

    /// Width independent of position; `None` for tabs.
    pub fn fixed_width(&self) -> Option<f32> {
        match self {
            Self::SimpleText { x_offsets, .. } | Self::ComplexText { x_offsets, .. } => {
                Some(x_offsets.last().copied().unwrap_or(0.0))
            },
            Self::Tab { .. } => None,
            Self::SpecialChar { width, .. }
            | Self::FoldPlaceholder { width, .. }
            | Self::Inlay { width, .. } => Some(*width),
        }
    }
}

/// Width of a tab starting at `x`: up to the next tab stop.
pub fn tab_width(x: f32, config: &LayoutConfig, metrics: &dyn FontMetrics) -> f32 {
    let stop = config.tab_size as f32 * metrics.space_width();
    if stop <= 0.0 {
        return 0.0;
    }
    let next = ((x / stop).floor() + 1.0) * stop;
    next - x
}

/// Display label for a character rendered as a special-character fragment.
pub fn special_char_label(unit: u16) -> Option<&'static str> {
    const C0: [&str; 32] = [
        "NUL", "SOH", "STX", "ETX", "EOT", "ENQ", "ACK", "BEL", "BS", "HT", "LF", "VT", "FF",
        "CR", "SO", "SI", "DLE", "DC1", "DC2", "DC3", "DC4", "NAK", "SYN", "ETB", "CAN", "EM",
        "SUB", "ESC", "FS", "GS", "RS", "US",
    ];
    match unit {
        TAB => None,
        0..=0x1F => Some(C0[usize::from(unit)]),
        0x7F => Some("DEL"),
        0x2028 => Some("LSEP"),
        0x2029 => Some("PSEP"),
        _ => None,
    }
}

/// Everything shaping a chunk needs besides the chunk itself.
#[derive(Clone, Copy)]
pub struct ShapingContext<'a> {
    /// The whole line.
    pub text: &'a [u16],
    /// Document offset of `text[0]`, for attribute lookups.
    pub base_offset: usize,
    pub attributes: &'a dyn AttributeProvider,
    pub metrics: &'a dyn FontMetrics,
    pub config: &'a LayoutConfig,
    pub chunks: Option<&'a super::ChunkCache>,
}

/// Shape the units in `range` of a run. Never fails: glyphs that cannot be laid
/// out produce approximate fragments.
pub(crate) fn shape_chunk(range: Range<usize>, rtl: bool, tab_run: bool, shaping: &ShapingContext<'_>) -> Vec<Fragment> {
    if tab_run {
        return range.map(|offset| Fragment::Tab { offset }).collect();
    }

    let text = shaping.text;
    let base = shaping.base_offset;
    let mut fragments = Vec::new();
    for run in shaping
        .attributes
        .attribute_runs(base + range.start..base + range.end)
    {
        let start = run.range.start.saturating_sub(base).max(range.start);
        let end = run.range.end.saturating_sub(base).min(range.end);
        let mut segment_start = start;
        for ix in start..end {
            let Some(label) = special_char_label(text[ix]) else {
                continue;
            };
            if segment_start < ix {
                fragments.push(text_fragment(segment_start..ix, run.attributes, rtl, shaping));
            }
            fragments.push(special_char_fragment(ix, label, shaping.metrics));
            segment_start = ix + 1;
        }
        if segment_start < end {
            fragments.push(text_fragment(segment_start..end, run.attributes, rtl, shaping));
        }
    }
    fragments
}

fn special_char_fragment(offset: usize, label: &str, metrics: &dyn FontMetrics) -> Fragment {
    let width = label
        .chars()
        .map(|ch| {
            metrics
                .char_width(ch, FontStyle::Plain)
                .unwrap_or_else(|| metrics.space_width())
        })
        .sum();
    Fragment::SpecialChar {
        offset,
        label: CompactString::new(label),
        width,
    }
}

fn text_fragment(
    range: Range<usize>,
    attributes: TextAttributes,
    rtl: bool,
    shaping: &ShapingContext<'_>,
) -> Fragment {
    let units = &shaping.text[range.clone()];
    let config = shaping.config;
    let complex = rtl
        || config.use_ligatures
        || config.grid_cell_width.is_some()
        || needs_shaping(units);

    let (advances, approximate) = if complex {
        match shaping.metrics.shape(units, attributes.style, rtl) {
            Some(advances) if advances.len() == units.len() => {
                (snap_to_grid(advances, config.grid_cell_width), false)
            },
            _ => {
                tracing::trace!(?range, "glyph shaping failed, using approximate advances");
                (approximate_advances(units, shaping.metrics), true)
            },
        }
    } else {
        match simple_advances(units, attributes.style, shaping.metrics) {
            Some(advances) => (advances, false),
            None => {
                tracing::trace!(?range, "missing glyph, using approximate advances");
                (approximate_advances(units, shaping.metrics), true)
            },
        }
    };

    let mut total = 0.0;
    let x_offsets = advances
        .into_iter()
        .map(|advance| {
            total += advance;
            total
        })
        .collect();

    if complex {
        Fragment::ComplexText {
            range,
            attributes,
            x_offsets,
            rtl,
            approximate,
        }
    } else {
        Fragment::SimpleText {
            range,
            attributes,
            x_offsets,
            approximate,
        }
    }
}

fn simple_advances(units: &[u16], style: FontStyle, metrics: &dyn FontMetrics) -> Option<Vec<f32>> {
    let mut advances = Vec::with_capacity(units.len());
    for ch in char::decode_utf16(units.iter().copied()) {
        let ch = ch.unwrap_or(char::REPLACEMENT_CHARACTER);
        advances.push(metrics.char_width(ch, style)?);
        if ch.len_utf16() == 2 {
            advances.push(0.0);
        }
    }
    Some(advances)
}

fn snap_to_grid(mut advances: Vec<f32>, cell: Option<f32>) -> Vec<f32> {
    if let Some(cell) = cell {
        for advance in advances.iter_mut().filter(|advance| **advance > 0.0) {
            *advance = (*advance / cell).ceil() * cell;
        }
    }
    advances
}

/// True when `units` need real glyph shaping: multi-character clusters or
/// scripts whose glyphs join or reorder.
fn needs_shaping(units: &[u16]) -> bool {
    let mut has_pair = false;
    for (ix, unit) in units.iter().enumerate() {
        match *unit {
            0x0300..=0x036F
            | 0x0590..=0x08FF
            | 0x0900..=0x0DFF
            | 0x0E00..=0x0FFF
            | 0x1000..=0x109F
            | 0x1780..=0x17FF
            | 0x200C..=0x200F
            | 0xFB1D..=0xFDFF
            | 0xFE00..=0xFE0F
            | 0xFE70..=0xFEFF => return true,
            unit if is_high_surrogate(unit) && units.get(ix + 1).copied().is_some_and(is_low_surrogate) => {
                has_pair = true;
            },
            _ => {},
        }
    }
    has_pair && {
        let decoded = String::from_utf16_lossy(units);
        decoded
            .graphemes(true)
            .any(|cluster| cluster.chars().nth(1).is_some())
    }
}
