//! Bidi segmentation of one line into directional runs.
//!
//! The line is first cut into lexical regions (adjacent tokens sharing a bidi
//! region id, with comment markers on their own). Each region is resolved
//! independently with the Unicode bidi algorithm using an LTR paragraph level,
//! then tabs are cut out into level-0 runs of their own and neighbouring level-0
//! text runs are merged.
use crate::model::LexicalToken;
use smallvec::SmallVec;
use std::ops::Range;
use unicode_bidi::{bidi_class, BidiClass, BidiInfo, Level};

const TAB: u16 = b'\t' as u16;

/// One directional run, relative to the line start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunSpan {
    pub range: Range<usize>,
    pub level: u8,
    pub tab: bool,
}

/// Quick check for characters that can make any part of a line right-to-left.
pub(crate) fn requires_bidi(text: &[u16]) -> bool {
    char::decode_utf16(text.iter().copied())
        .filter_map(Result::ok)
        .any(|ch| {
            u32::from(ch) >= 0x0590
                && matches!(
                    bidi_class(ch),
                    BidiClass::R
                        | BidiClass::AL
                        | BidiClass::AN
                        | BidiClass::RLE
                        | BidiClass::RLO
                        | BidiClass::RLI
                        | BidiClass::FSI
                )
        })
}

/// Split `text` into runs covering `[0, text.len())` in logical order.
pub(crate) fn segment(text: &[u16], tokens: &[LexicalToken], analyze: bool) -> Vec<RunSpan> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut spans = Vec::new();
    if analyze {
        for region in regions(tokens, text.len()) {
            resolve_region(text, region, &mut spans);
        }
    } else {
        spans.push(RunSpan {
            range: 0..text.len(),
            level: 0,
            tab: false,
        });
    }
    split_tabs_and_merge(text, spans)
}

/// Lexical regions covering `[0, len)`.
fn regions(tokens: &[LexicalToken], len: usize) -> SmallVec<[Range<usize>; 4]> {
    let mut regions: SmallVec<[(Range<usize>, Option<u32>); 4]> = SmallVec::new();
    let mut push = |range: Range<usize>, key: Option<u32>| {
        if range.is_empty() {
            return;
        }
        match regions.last_mut() {
            Some((last, Some(last_key)))
                if key == Some(*last_key) && last.end == range.start =>
            {
                last.end = range.end;
            },
            _ => regions.push((range, key)),
        }
    };

    let mut pos = 0;
    for token in tokens {
        let start = token.range.start.clamp(pos, len);
        let end = token.range.end.clamp(start, len);
        push(pos..start, None);

        let body_start = (start + token.comment_prefix).min(end);
        let body_end = end.saturating_sub(token.comment_suffix).max(body_start);
        push(start..body_start, None);
        push(body_start..body_end, Some(token.bidi_region));
        push(body_end..end, None);
        pos = end;
    }
    push(pos..len, None);

    regions.into_iter().map(|(range, _)| range).collect()
}

fn resolve_region(text: &[u16], region: Range<usize>, spans: &mut Vec<RunSpan>) {
    let decoded = String::from_utf16_lossy(&text[region.clone()]);
    let info = BidiInfo::new(&decoded, Some(Level::ltr()));

    let mut current: Option<RunSpan> = None;
    let mut unit = region.start;
    for (byte_ix, ch) in decoded.char_indices() {
        let level = info.levels[byte_ix].number();
        let end = unit + ch.len_utf16();
        match &mut current {
            Some(run) if run.level == level => run.range.end = end,
            _ => {
                spans.extend(current.take());
                current = Some(RunSpan {
                    range: unit..end,
                    level,
                    tab: false,
                });
            },
        }
        unit = end;
    }
    spans.extend(current);
}

fn split_tabs_and_merge(text: &[u16], spans: Vec<RunSpan>) -> Vec<RunSpan> {
    let mut runs: Vec<RunSpan> = Vec::with_capacity(spans.len());
    let mut push = |span: RunSpan| {
        if span.range.is_empty() {
            return;
        }
        match runs.last_mut() {
            Some(last)
                if !span.tab
                    && !last.tab
                    && span.level == 0
                    && last.level == 0
                    && last.range.end == span.range.start =>
            {
                last.range.end = span.range.end;
            },
            _ => runs.push(span),
        }
    };

    for span in spans {
        let mut start = span.range.start;
        for ix in span.range.clone() {
            if text[ix] == TAB {
                push(RunSpan {
                    range: start..ix,
                    level: span.level,
                    tab: false,
                });
                push(RunSpan {
                    range: ix..ix + 1,
                    level: 0,
                    tab: true,
                });
                start = ix + 1;
            }
        }
        push(RunSpan {
            range: start..span.range.end,
            level: span.level,
            tab: false,
        });
    }
    runs
}

/// Visual order of runs with the given embedding levels, per rule L2 of the
/// Unicode bidi algorithm: from the highest level down to the lowest odd level,
/// reverse every maximal sequence at that level or higher.
pub(crate) fn visual_order(levels: &[u8]) -> SmallVec<[usize; 8]> {
    let mut order: SmallVec<[usize; 8]> = (0..levels.len()).collect();
    let Some(&max) = levels.iter().max() else {
        return order;
    };
    let Some(min_odd) = levels.iter().copied().filter(|level| level % 2 == 1).min() else {
        return order;
    };

    for level in (min_odd..=max).rev() {
        let mut ix = 0;
        while ix < order.len() {
            if levels[order[ix]] < level {
                ix += 1;
                continue;
            }
            let start = ix;
            while ix < order.len() && levels[order[ix]] >= level {
                ix += 1;
            }
            order[start..ix].reverse();
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LineCommentSyntax, PlainSyntax, SyntaxContext};

    fn units(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    fn runs(s: &str) -> Vec<(Range<usize>, u8)> {
        let text = units(s);
        let tokens = PlainSyntax.line_tokens(&text);
        segment(&text, &tokens, requires_bidi(&text))
            .into_iter()
            .map(|run| (run.range, run.level))
            .collect()
    }

    #[test]
    fn detects_rtl_text() {
        assert!(!requires_bidi(&units("plain ascii\t123")));
        assert!(requires_bidi(&units("abc שלום")));
        assert!(requires_bidi(&units("مرحبا")));
    }

    #[test]
    fn latin_then_hebrew_is_two_runs() {
        assert_eq!(runs("abc שלום"), vec![(0..4, 0), (4..8, 1)]);
    }

    #[test]
    fn tabs_get_their_own_runs() {
        let text = units("ab\tcd");
        let tokens = PlainSyntax.line_tokens(&text);
        let spans = segment(&text, &tokens, false);
        assert_eq!(spans.len(), 3);
        assert!(spans[1].tab);
        assert_eq!(spans[1].range, 2..3);
        assert_eq!(spans[2].range, 3..5);
    }

    #[test]
    fn runs_partition_the_line() {
        for line in ["", "a", "abc שלום def", "\t\tx", "שלום\tעולם", "x = 1; // שלום"] {
            let text = units(line);
            let tokens = LineCommentSyntax::default().line_tokens(&text);
            let spans = segment(&text, &tokens, true);
            let mut pos = 0;
            for span in &spans {
                assert_eq!(span.range.start, pos, "gap in {line:?}");
                assert!(span.range.end > span.range.start);
                pos = span.range.end;
            }
            assert_eq!(pos, text.len());
        }
    }

    #[test]
    fn comment_marker_is_not_mixed_into_rtl_comment() {
        let text = units("// שלום");
        let tokens = LineCommentSyntax::default().line_tokens(&text);
        let spans = segment(&text, &tokens, true);
        assert_eq!(spans[0].range, 0..3);
        assert_eq!(spans[0].level, 0);
        assert_eq!(spans[1].level, 1);
    }

    #[test]
    fn level_zero_runs_merge_across_regions() {
        let text = units("a = 1; // b");
        let tokens = LineCommentSyntax::default().line_tokens(&text);
        let spans = segment(&text, &tokens, true);
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn reorders_rtl_sequences() {
        assert_eq!(visual_order(&[0, 1, 1, 0]).as_slice(), &[0, 2, 1, 3]);
        assert_eq!(visual_order(&[1, 2, 1]).as_slice(), &[2, 1, 0]);
        assert_eq!(visual_order(&[0, 0]).as_slice(), &[0, 1]);
    }
}
