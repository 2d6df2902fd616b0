//! The chunker (spec.md §4.1).
//!
//! A single linear pass over the normalized source that classifies maximal
//! spans as [`Comment`](ChunkKind::Comment), [`QuotedString`](ChunkKind::QuotedString)
//! or [`Text`](ChunkKind::Text), tracking brace balance along the way. This
//! lets the parser skip over comments and strings without re-scanning them
//! with a regex, and keeps most regex matches anchored to a single chunk
//! rather than the whole source.

use crate::error::{ChunkError, Location};
use crate::config::ChunkLevel;

/// The classification of a [`Chunk`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChunkKind {
    /// A maximal `//...\n` or `/*...*/` span.
    Comment,
    /// A maximal `"..."` or `'...'` span.
    QuotedString,
    /// Everything else.
    Text,
}

/// A classified, contiguous span of the normalized source.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Chunk {
    /// The kind of span this chunk covers.
    pub kind: ChunkKind,
    /// Byte offset of the first byte of the chunk.
    pub start: usize,
    /// Byte offset one past the last byte of the chunk.
    pub end: usize,
    /// For `Text` chunks, whether this chunk was closed by a `}` (i.e. it is
    /// the last text chunk inside some brace level).
    pub is_final: bool,
}

impl Chunk {
    fn text(start: usize, end: usize, is_final: bool) -> Self {
        Self { kind: ChunkKind::Text, start, end, is_final }
    }

    fn comment(start: usize, end: usize) -> Self {
        Self { kind: ChunkKind::Comment, start, end, is_final: false }
    }

    fn quoted(start: usize, end: usize) -> Self {
        Self { kind: ChunkKind::QuotedString, start, end, is_final: false }
    }

    /// The text of this chunk within `source`.
    pub fn text_of<'s>(&self, source: &'s str) -> &'s str {
        &source[self.start..self.end]
    }
}

/// Normalizes `\r\n` to `\n` and partitions the result into chunks according
/// to `level`.
///
/// Returns the normalized source alongside the chunk list; the parser's
/// cursor advances within this normalized string, not the original input.
pub fn chunk(source: &str, level: ChunkLevel, file: Option<&str>) -> Result<(String, Vec<Chunk>), ChunkError> {
    let normalized = normalize_line_endings(source);

    if level == ChunkLevel::None {
        let end = normalized.len();
        return Ok((normalized, vec![Chunk::text(0, end, false)]));
    }

    let chunks = chunk_text(&normalized, file)?;
    Ok((normalized, chunks))
}

/// Replaces every `\r\n` with `\n`. `\r` alone is left untouched, matching
/// the conservative normalization most LESS implementations apply.
fn normalize_line_endings(source: &str) -> String {
    if !source.as_bytes().contains(&b'\r') {
        return source.to_string();
    }
    source.replace("\r\n", "\n")
}

fn chunk_text(source: &str, file: Option<&str>) -> Result<Vec<Chunk>, ChunkError> {
    let bytes = source.as_bytes();
    let len = bytes.len();
    let mut chunks = Vec::new();
    let mut brace_level: i32 = 0;
    let mut paren_depth: i32 = 0;
    let mut text_start = 0usize;
    let mut i = 0usize;

    while i < len {
        match bytes[i] {
            b'(' => {
                paren_depth += 1;
                i += 1;
            }
            b')' => {
                paren_depth = paren_depth.saturating_sub(1);
                i += 1;
            }
            // Inside a `(...)` argument list, `//` does not start a
            // line comment — this is what lets `url(http://example.com)`
            // pass through untouched.
            b'/' if paren_depth == 0 && matches(bytes, i + 1, b'/') => {
                if i > text_start {
                    chunks.push(Chunk::text(text_start, i, false));
                }
                let start = i;
                i += 2;
                while i < len && bytes[i] != b'\n' {
                    i += 1;
                }
                chunks.push(Chunk::comment(start, i));
                text_start = i;
            }
            b'/' if matches(bytes, i + 1, b'*') => {
                if i > text_start {
                    chunks.push(Chunk::text(text_start, i, false));
                }
                let start = i;
                i += 2;
                let mut closed = false;
                while i + 1 < len {
                    if bytes[i] == b'*' && bytes[i + 1] == b'/' {
                        i += 2;
                        closed = true;
                        break;
                    }
                    i += 1;
                }
                if !closed {
                    return Err(ChunkError::UnterminatedComment(Location::new(start, file)));
                }
                chunks.push(Chunk::comment(start, i));
                text_start = i;
            }
            q @ (b'"' | b'\'') => {
                if i > text_start {
                    chunks.push(Chunk::text(text_start, i, false));
                }
                let start = i;
                i += 1;
                let mut closed = false;
                while i < len {
                    if bytes[i] == b'\\' && i + 1 < len {
                        i += 2;
                        continue;
                    }
                    if bytes[i] == q {
                        i += 1;
                        closed = true;
                        break;
                    }
                    i += 1;
                }
                if !closed {
                    return Err(ChunkError::UnterminatedString(Location::new(start, file)));
                }
                chunks.push(Chunk::quoted(start, i));
                text_start = i;
            }
            b'{' => {
                brace_level += 1;
                i += 1;
            }
            b'}' => {
                if brace_level == 0 {
                    return Err(ChunkError::UnbalancedBraces(Location::new(i, file)));
                }
                brace_level -= 1;
                i += 1;
                chunks.push(Chunk::text(text_start, i, true));
                text_start = i;
            }
            _ => i += 1,
        }
    }

    if brace_level != 0 {
        return Err(ChunkError::UnbalancedBraces(Location::new(len, file)));
    }

    if text_start < len {
        chunks.push(Chunk::text(text_start, len, false));
    }

    Ok(chunks)
}

fn matches(bytes: &[u8], index: usize, want: u8) -> bool {
    index < bytes.len() && bytes[index] == want
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(chunks: &[Chunk]) -> Vec<ChunkKind> {
        chunks.iter().map(|c| c.kind).collect()
    }

    #[test]
    fn plain_text_is_one_chunk() {
        let (src, chunks) = chunk(".a { color: red; }", ChunkLevel::Chunked, None).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text_of(&src), ".a { color: red; }");
        assert!(chunks[0].is_final);
    }

    #[test]
    fn line_comment_is_isolated() {
        let (src, chunks) = chunk("a: 1; // comment\nb: 2;", ChunkLevel::Chunked, None).unwrap();
        assert_eq!(kinds(&chunks), vec![ChunkKind::Text, ChunkKind::Comment, ChunkKind::Text]);
        assert_eq!(chunks[1].text_of(&src), "// comment");
    }

    #[test]
    fn block_comment_is_isolated() {
        let (_src, chunks) = chunk("a: 1; /* c */ b: 2;", ChunkLevel::Chunked, None).unwrap();
        assert_eq!(kinds(&chunks), vec![ChunkKind::Text, ChunkKind::Comment, ChunkKind::Text]);
    }

    #[test]
    fn quoted_string_is_isolated() {
        let (src, chunks) = chunk("content: \"a // b\";", ChunkLevel::Chunked, None).unwrap();
        assert_eq!(kinds(&chunks), vec![ChunkKind::Text, ChunkKind::QuotedString, ChunkKind::Text]);
        assert_eq!(chunks[1].text_of(&src), "\"a // b\"");
    }

    #[test]
    fn slash_slash_inside_parens_is_not_a_comment() {
        let (_src, chunks) = chunk("url(http://example.com/a.png)", ChunkLevel::Chunked, None).unwrap();
        assert_eq!(kinds(&chunks), vec![ChunkKind::Text]);
    }

    #[test]
    fn unterminated_comment_fails() {
        let err = chunk("a { /* oops", ChunkLevel::Chunked, None).unwrap_err();
        assert!(matches!(err, ChunkError::UnterminatedComment(_)));
    }

    #[test]
    fn unterminated_string_fails() {
        let err = chunk("a: \"oops", ChunkLevel::Chunked, None).unwrap_err();
        assert!(matches!(err, ChunkError::UnterminatedString(_)));
    }

    #[test]
    fn unbalanced_closing_brace_fails() {
        let err = chunk("a }", ChunkLevel::Chunked, None).unwrap_err();
        assert!(matches!(err, ChunkError::UnbalancedBraces(_)));
    }

    #[test]
    fn unbalanced_open_brace_fails() {
        let err = chunk(".a {", ChunkLevel::Chunked, None).unwrap_err();
        assert!(matches!(err, ChunkError::UnbalancedBraces(_)));
    }

    #[test]
    fn crlf_is_normalized() {
        let (src, _) = chunk("a: 1;\r\nb: 2;\r\n", ChunkLevel::Chunked, None).unwrap();
        assert!(!src.contains('\r'));
    }

    #[test]
    fn level_none_is_single_chunk() {
        let (_src, chunks) = chunk(".a { /* x */ b: 1; }", ChunkLevel::None, None).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Text);
    }

    #[test]
    fn final_flag_marks_block_close() {
        let (_src, chunks) = chunk(".a { b: 1; }", ChunkLevel::Chunked, None).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_final);
    }
}
