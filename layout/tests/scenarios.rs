//! End-to-end scenarios driven through the engine facade.

mod common;

use common::Editor;
use stoat_layout::{
    model::PlainSyntax, FoldRegion, LayoutConfig, LineLayout, LineWidth, LogicalPosition,
    VisualPosition,
};

fn vp(line: usize, column: usize, leans_right: bool) -> VisualPosition {
    VisualPosition::new(line, column).leaning_right(leans_right)
}

#[test]
fn tab_expands_to_the_next_stop() {
    let editor = Editor::new("abc\tdef");
    let mapper = editor.mapper();

    let columns: Vec<_> = (0..=4)
        .map(|offset| mapper.offset_to_logical(offset, false).column)
        .collect();
    assert_eq!(columns, vec![0, 1, 2, 3, 4]);
    // The tab spans columns 3..4 and `d` starts at 4.
    assert_eq!(mapper.logical_to_offset(LogicalPosition::new(0, 4)), 4);
    assert_eq!(mapper.offset_to_xy(4, true).x, 40.0);
    assert_eq!(mapper.offset_to_xy(7, false).x, 70.0);
}

#[test]
fn latin_then_hebrew_makes_two_runs() {
    let text: Vec<u16> = "abc \u{5e9}\u{5dc}\u{5d5}\u{5dd}".encode_utf16().collect();
    let layout = LineLayout::new(&text, &PlainSyntax, &LayoutConfig::default());
    let runs = layout.runs();
    assert_eq!(runs.len(), 2);
    assert_eq!((runs[0].range(), runs[0].is_rtl()), (0..4, false));
    assert_eq!((runs[1].range(), runs[1].is_rtl()), (4..8, true));

    let editor = Editor::new("abc \u{5e9}\u{5dc}\u{5d5}\u{5dd}");
    let mapper = editor.mapper();
    let line = mapper.visual_line(0);
    let fragments: Vec<_> = mapper.fragments(&line).collect();
    let hebrew = fragments
        .iter()
        .find(|fragment| fragment.is_rtl())
        .expect("rtl fragment");
    // Logical order 4, 5, 6, 7 is drawn right to left.
    let xs: Vec<f32> = (4..=8).map(|offset| hebrew.offset_to_x(offset)).collect();
    assert!(xs.windows(2).all(|pair| pair[0] > pair[1]), "{xs:?}");
    assert_eq!(xs[0], hebrew.end_x);
    assert_eq!(xs[4], hebrew.start_x);
}

#[test]
fn paste_into_large_document_only_touches_edited_lines() {
    let text: String = (0..10_000).map(|line| format!("line {line}\n")).collect();
    let mut editor = Editor::new(text.trim_end_matches('\n'));
    editor.preferred_width();
    let before = editor.line_widths();
    assert_eq!(before.len(), 10_000);

    let pasted: String = (0..100).map(|line| format!("pasted {line}\n")).collect();
    let offset = editor.mapper().logical_to_offset(LogicalPosition::new(5_000, 0));
    editor.edit(offset, 0, &pasted);

    let after = editor.line_widths();
    assert_eq!(after.len(), 10_100);
    assert_eq!(after[..5_000], before[..5_000]);
    assert_eq!(after[5_101..], before[5_001..]);
    let unknown = after.iter().filter(|width| **width == i32::MAX).count();
    assert_eq!(unknown, 101);

    editor.preferred_width();
    assert!(editor
        .engine
        .sizes()
        .line_widths()
        .iter()
        .all(|width| *width != i32::MAX));
    assert_eq!(
        editor.engine.sizes().line_width_entry(10_099),
        LineWidth::Approximate(9 * 20)
    );
}

#[test]
fn custom_fold_collapses_fifty_characters() {
    let text = format!("ab\n{}\ncd", "x".repeat(50));
    let mut editor = Editor::new(&text);
    editor.fold(FoldRegion::custom(3..53, 12.0, 20.0));
    let mapper = editor.mapper();

    let line = mapper.visual_line(1);
    let fragments: Vec<_> = mapper.fragments(&line).collect();
    assert_eq!(fragments.len(), 1);
    assert_eq!(fragments[0].width(), 12.0);
    assert_eq!((fragments[0].start_offset, fragments[0].end_offset), (3, 53));

    let (start, end) = (fragments[0].start_visual_column, fragments[0].end_visual_column);
    for column in start..=end {
        for leans_right in [false, true] {
            let offset = mapper.visual_to_offset(vp(1, column, leans_right));
            assert!(offset == 3 || offset == 53, "column {column} gave {offset}");
        }
    }
    for hidden in 4..53 {
        assert_eq!(mapper.offset_to_visual(hidden, false), vp(1, start, true));
    }
}

#[test]
fn surrogate_pair_is_never_split() {
    let editor = Editor::new("abcde\u{1F600}fg");
    let mapper = editor.mapper();

    for column in 0..12 {
        for leans_right in [false, true] {
            assert_ne!(mapper.visual_to_offset(vp(0, column, leans_right)), 6);
        }
        assert_ne!(mapper.logical_to_offset(LogicalPosition::new(0, column)), 6);
    }
    assert_eq!(
        mapper.offset_to_logical(6, false).column,
        mapper.offset_to_logical(5, false).column
    );
    let line = mapper.visual_line(0);
    for fragment in mapper.fragments(&line) {
        assert_ne!(fragment.start_offset, 6);
        assert_ne!(fragment.end_offset, 6);
    }
}
