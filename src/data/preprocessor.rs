// ============================================================
// Layer 4 — Text Preprocessor
// ============================================================
// Splits questions and passages into word tokens while keeping
// track of where every token sits in the original string.
//
// Why keep offsets?
//   Dataset answers are character spans [start, end) into a
//   passage, and predictions must be reported the same way so the
//   pretty-printer can highlight them. The model itself works on
//   token positions, so we need both directions:
//
//     char span  → token span   (building training targets)
//     token span → char span    (decoding predictions)
//
// Splitting uses the `tokenizers` Whitespace pre-tokenizer
// (\w+|[^\w\s]+) with character offsets into the original text.
// Lowercasing is applied to the token text only, never to offsets.

use tokenizers::pre_tokenizers::whitespace::Whitespace;
use tokenizers::{OffsetReferential, OffsetType, PreTokenizedString, PreTokenizer};

use crate::error::{ReaderError, Result};

/// One word token with character offsets [start, end) into its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text:  String,
    pub start: usize,
    pub end:   usize,
}

#[derive(Debug, Clone)]
pub struct Preprocessor {
    lowercase: bool,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Preprocessor {
    pub fn new(lowercase: bool) -> Self {
        Self { lowercase }
    }

    /// Split `text` into tokens with character offsets.
    pub fn tokenize(&self, text: &str) -> Result<Vec<Token>> {
        let mut pretokenized = PreTokenizedString::from(text);
        Whitespace::default()
            .pre_tokenize(&mut pretokenized)
            .map_err(|e| ReaderError::InvalidArgument(format!("tokenisation failed: {e}")))?;

        let tokens = pretokenized
            .get_splits(OffsetReferential::Original, OffsetType::Char)
            .into_iter()
            .map(|(piece, (start, end), _)| Token {
                text: if self.lowercase { piece.to_lowercase() } else { piece.to_string() },
                start,
                end,
            })
            .collect();
        Ok(tokens)
    }

    /// Token texts only.
    pub fn words(&self, text: &str) -> Result<Vec<String>> {
        Ok(self.tokenize(text)?.into_iter().map(|t| t.text).collect())
    }
}

/// Inclusive token range covering the character span [start, end).
/// None if no token overlaps the span.
pub fn char_span_to_tokens(tokens: &[Token], start: usize, end: usize) -> Option<(usize, usize)> {
    let first = tokens.iter().position(|t| t.end > start)?;
    let last  = tokens.iter().rposition(|t| t.start < end)?;
    (first <= last).then_some((first, last))
}

/// Character span [start, end) covered by the inclusive token range.
pub fn tokens_to_char_span(tokens: &[Token], first: usize, last: usize) -> Option<(usize, usize)> {
    Some((tokens.get(first)?.start, tokens.get(last)?.end))
}

/// The characters [start, end) of `text`.
pub fn slice_chars(text: &str, start: usize, end: usize) -> String {
    text.chars().skip(start).take(end.saturating_sub(start)).collect()
}
