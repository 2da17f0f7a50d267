//! Lexical context for bidi segmentation.
//!
//! Bidi analysis never crosses a lexical region boundary, so an identifier
//! next to an RTL string literal keeps its own direction. Comment markers are
//! split off as their own regions so `//` is not pulled into RTL comment text.
use smallvec::{smallvec, SmallVec};
use std::ops::Range;

/// One lexical token of a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexicalToken {
    /// Range relative to the line start, in UTF-16 units.
    pub range: Range<usize>,
    /// Adjacent tokens with the same region id are analyzed together.
    pub bidi_region: u32,
    /// Length of a leading comment marker.
    pub comment_prefix: usize,
    /// Length of a trailing comment marker.
    pub comment_suffix: usize,
}

impl LexicalToken {
    pub fn new(range: Range<usize>, bidi_region: u32) -> Self {
        Self {
            range,
            bidi_region,
            comment_prefix: 0,
            comment_suffix: 0,
        }
    }
}

pub type LineTokens = SmallVec<[LexicalToken; 4]>;

pub trait SyntaxContext {
    /// Tokens covering `text` (one line) contiguously.
    fn line_tokens(&self, text: &[u16]) -> LineTokens;
}

/// The whole line is one region.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainSyntax;

impl SyntaxContext for PlainSyntax {
    fn line_tokens(&self, text: &[u16]) -> LineTokens {
        smallvec![LexicalToken::new(0..text.len(), 0)]
    }
}

/// Code followed by an optional line comment introduced by `marker`.
#[derive(Debug, Clone)]
pub struct LineCommentSyntax {
    marker: Box<[u16]>,
}

impl LineCommentSyntax {
    pub fn new(marker: &str) -> Self {
        Self {
            marker: marker.encode_utf16().collect(),
        }
    }
}

impl Default for LineCommentSyntax {
    fn default() -> Self {
        Self::new("//")
    }
}

impl SyntaxContext for LineCommentSyntax {
    fn line_tokens(&self, text: &[u16]) -> LineTokens {
        let found = (!self.marker.is_empty())
            .then(|| {
                text.windows(self.marker.len())
                    .position(|window| *window == *self.marker)
            })
            .flatten();
        match found {
            Some(start) => {
                let mut tokens = LineTokens::new();
                if start > 0 {
                    tokens.push(LexicalToken::new(0..start, 0));
                }
                tokens.push(LexicalToken {
                    range: start..text.len(),
                    bidi_region: 1,
                    comment_prefix: self.marker.len(),
                    comment_suffix: 0,
                });
                tokens
            },
            None => PlainSyntax.line_tokens(text),
        }
    }
}
