//! The tokenizer (spec.md §4.2).
//!
//! A cursor over the chunked, normalized source offering the small set of
//! primitives the recursive-descent parser is built from: literal/regex
//! matching gated to `Text` chunks, direct consumption of `Comment`/
//! `QuotedString` chunks, lookahead, and atomic snapshot/restore for
//! backtracking.

use crate::chunk::{Chunk, ChunkKind};
use regex::Regex;

/// An atomically saveable/restorable cursor position.
///
/// `chunk_id` is the index of the chunk containing `index`; it is cached
/// alongside the byte offset purely as an optimization so [`Tokenizer::recall`]
/// does not need to re-binary-search the chunk list.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Mark {
    /// Byte offset into the normalized source.
    pub index: usize,
    /// Index of the chunk containing `index`.
    pub chunk_id: usize,
}

/// A cursor over the chunked source.
pub struct Tokenizer<'s> {
    source: &'s str,
    chunks: &'s [Chunk],
    file: Option<&'s str>,
    index: usize,
    chunk_id: usize,
    /// Whether the most recent successful match consumed at least one
    /// whitespace byte as its trailing skip. Every `match_*`/`get_*`
    /// primitive eats trailing whitespace as part of matching, which is
    /// right for most of the grammar but throws away a bit the selector
    /// grammar actually needs: `.a.b` (compound) and `.a .b` (descendant)
    /// are different selectors, and by the time the parser asks for the
    /// next simple selector the whitespace between them, if any, is
    /// already gone. This flag is how the parser recovers that bit.
    had_trailing_whitespace: bool,
}

impl<'s> Tokenizer<'s> {
    /// Creates a tokenizer positioned at the start of `source`.
    pub fn new(source: &'s str, chunks: &'s [Chunk], file: Option<&'s str>) -> Self {
        Self { source, chunks, file, index: 0, chunk_id: 0, had_trailing_whitespace: false }
    }

    /// Whether the match that most recently succeeded was followed by at
    /// least one whitespace byte before the cursor's current position.
    pub fn had_trailing_whitespace(&self) -> bool {
        self.had_trailing_whitespace
    }

    fn skip_trailing_whitespace(&mut self) {
        self.had_trailing_whitespace = self.consume_whitespace() > 0;
    }

    /// The file name hint supplied with the source, if any.
    pub fn file(&self) -> Option<&'s str> {
        self.file
    }

    /// The full normalized source.
    pub fn source(&self) -> &'s str {
        self.source
    }

    /// The current absolute byte index, for error reporting.
    pub fn get_node_location(&self) -> usize {
        self.index
    }

    /// Snapshots the current cursor.
    pub fn remember(&self) -> Mark {
        Mark { index: self.index, chunk_id: self.chunk_id }
    }

    /// Restores a previously saved cursor.
    pub fn recall(&mut self, mark: Mark) {
        self.index = mark.index;
        self.chunk_id = mark.chunk_id;
    }

    /// Whether the cursor has reached the end of the source.
    pub fn eof(&self) -> bool {
        self.index >= self.source.len()
    }

    fn current_chunk(&mut self) -> Option<&Chunk> {
        while self.chunk_id < self.chunks.len() && self.chunks[self.chunk_id].end <= self.index {
            self.chunk_id += 1;
        }
        self.chunks.get(self.chunk_id)
    }

    /// The end of the longest run of contiguous `Text` chunks starting at
    /// the chunk containing the cursor, or the cursor's own position if it
    /// is not inside a `Text` chunk.
    fn text_run_end(&mut self) -> usize {
        let Some(chunk) = self.current_chunk() else { return self.index };
        if chunk.kind != ChunkKind::Text {
            return self.index;
        }
        let mut end = chunk.end;
        let mut id = self.chunk_id + 1;
        while let Some(next) = self.chunks.get(id) {
            if next.kind != ChunkKind::Text || next.start != end {
                break;
            }
            end = next.end;
            id += 1;
        }
        end
    }

    /// Consumes whitespace under the cursor, returning how many bytes were
    /// skipped. Does not cross into a non-`Text` chunk.
    pub fn consume_whitespace(&mut self) -> usize {
        let end = self.text_run_end();
        let start = self.index;
        let bytes = self.source.as_bytes();
        while self.index < end && bytes[self.index].is_ascii_whitespace() {
            self.index += 1;
        }
        self.index - start
    }

    /// Matches a single literal character at the cursor, inside a `Text`
    /// chunk, consuming trailing whitespace on success.
    pub fn match_char(&mut self, ch: char) -> bool {
        let end = self.text_run_end();
        let rest = &self.source[self.index..end];
        if let Some(stripped) = rest.strip_prefix(ch) {
            self.index += rest.len() - stripped.len();
            self.skip_trailing_whitespace();
            true
        } else {
            false
        }
    }

    /// Matches an exact literal string at the cursor (case-sensitive),
    /// inside a `Text` chunk, consuming trailing whitespace on success.
    pub fn match_exact(&mut self, text: &str) -> bool {
        let end = self.text_run_end();
        let rest = &self.source[self.index..end];
        if rest.starts_with(text) {
            self.index += text.len();
            self.skip_trailing_whitespace();
            true
        } else {
            false
        }
    }

    /// Matches `text` case-insensitively (used for keywords like `!important`).
    pub fn match_exact_ci(&mut self, text: &str) -> bool {
        let end = self.text_run_end();
        let rest = &self.source[self.index..end];
        if rest.len() >= text.len() && rest[..text.len()].eq_ignore_ascii_case(text) {
            self.index += text.len();
            self.skip_trailing_whitespace();
            true
        } else {
            false
        }
    }

    /// Matches `re` anchored at the cursor, inside a `Text` chunk, returning
    /// the matched text and consuming trailing whitespace on success.
    ///
    /// `re` is expected to begin with `^` (or otherwise only match at the
    /// start of the given slice); the tokenizer does not anchor it itself so
    /// callers can also express "must NOT match here" lookaheads.
    pub fn match_regex(&mut self, re: &Regex) -> Option<&'s str> {
        let end = self.text_run_end();
        let rest = &self.source[self.index..end];
        let m = re.find(rest)?;
        if m.start() != 0 {
            return None;
        }
        let matched = &rest[..m.end()];
        self.index += m.end();
        self.skip_trailing_whitespace();
        Some(matched)
    }

    /// Hand-rolled numeric scanner: optional leading sign, digits, optional
    /// `.digits`. Does not itself consume a trailing unit.
    pub fn match_number(&mut self, allow_decimals: bool, allow_operator: bool) -> Option<&'s str> {
        let end = self.text_run_end();
        let rest = &self.source[self.index..end];
        let bytes = rest.as_bytes();
        let mut i = 0;
        if allow_operator && i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
            i += 1;
        }
        let digits_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let mut has_digits = i > digits_start;
        if allow_decimals && i < bytes.len() && bytes[i] == b'.' {
            let dot = i;
            let mut j = i + 1;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            if j > dot + 1 {
                i = j;
                has_digits = true;
            }
        }
        if !has_digits {
            return None;
        }
        let matched = &rest[..i];
        self.index += i;
        self.skip_trailing_whitespace();
        Some(matched)
    }

    /// Hand-rolled identifier/variable scanner: `[@@?]?[A-Za-z0-9_-]+`, with
    /// rules on the first character.
    pub fn match_keyword(&mut self, require_at: bool, allow_leading_digit: bool) -> Option<&'s str> {
        let end = self.text_run_end();
        let rest = &self.source[self.index..end];
        let bytes = rest.as_bytes();
        let mut i = 0;
        if i < bytes.len() && bytes[i] == b'@' {
            i += 1;
            if i < bytes.len() && bytes[i] == b'@' {
                i += 1;
            }
        } else if require_at {
            return None;
        }
        let body_start = i;
        while i < bytes.len() {
            let c = bytes[i];
            let ok = c.is_ascii_alphanumeric() || c == b'_' || c == b'-';
            if !ok {
                break;
            }
            if i == body_start && c.is_ascii_digit() && !allow_leading_digit {
                break;
            }
            i += 1;
        }
        if i == body_start {
            return None;
        }
        let matched = &rest[..i];
        self.index += i;
        self.skip_trailing_whitespace();
        Some(matched)
    }

    /// Scans until `ch` is found (options select delimiter-inclusion and
    /// "last instance" behavior), without crossing a non-`Text` chunk
    /// boundary.
    pub fn match_until(&mut self, ch: char, opts: MatchUntilOptions) -> Option<&'s str> {
        let end = self.text_run_end();
        let rest = &self.source[self.index..end];
        let found = if opts.last_instance {
            rest.rfind(ch)
        } else {
            rest.find(ch)
        }?;
        let take = if opts.include_delimiter { found + ch.len_utf8() } else { found };
        let matched = &rest[..take];
        self.index += take;
        self.skip_trailing_whitespace();
        Some(matched)
    }

    /// Returns the chunk text if the cursor sits exactly at the start of a
    /// `Comment` chunk, consuming it.
    pub fn get_comment(&mut self) -> Option<&'s str> {
        let (kind, start, end) = {
            let chunk = self.current_chunk()?;
            if chunk.kind != ChunkKind::Comment || chunk.start != self.index {
                return None;
            }
            (chunk.kind, chunk.start, chunk.end)
        };
        debug_assert_eq!(kind, ChunkKind::Comment);
        let text = &self.source[start..end];
        self.index = end;
        self.skip_trailing_whitespace();
        Some(text)
    }

    /// Returns the chunk text if the cursor sits exactly at the start of a
    /// `QuotedString` chunk, consuming it.
    pub fn get_quoted_string(&mut self) -> Option<&'s str> {
        let (kind, start, end) = {
            let chunk = self.current_chunk()?;
            if chunk.kind != ChunkKind::QuotedString || chunk.start != self.index {
                return None;
            }
            (chunk.kind, chunk.start, chunk.end)
        };
        debug_assert_eq!(kind, ChunkKind::QuotedString);
        let text = &self.source[start..end];
        self.index = end;
        self.skip_trailing_whitespace();
        Some(text)
    }

    /// Peeks the character at `offset` bytes past the cursor, without
    /// advancing.
    pub fn peek_char(&self, offset: usize) -> Option<char> {
        self.source[self.index..].get(offset..)?.chars().next()
    }

    /// Peeks whether `ch` is the next character, without advancing.
    pub fn peek(&self, ch: char) -> bool {
        self.source[self.index..].starts_with(ch)
    }

    /// Peeks whether `text` is the next literal string, without advancing.
    pub fn peek_str(&self, text: &str) -> bool {
        self.source[self.index..].starts_with(text)
    }

    /// Peeks whether `ch` follows, skipping over any run of comments and
    /// whitespace first, without advancing the real cursor.
    pub fn peek_after_comments(&mut self, ch: char) -> bool {
        let mark = self.remember();
        loop {
            if self.consume_whitespace() == 0 && self.get_comment().is_none() {
                break;
            }
        }
        let found = self.peek(ch);
        self.recall(mark);
        found
    }
}

/// Options controlling [`Tokenizer::match_until`].
#[derive(Clone, Copy, Debug, Default)]
pub struct MatchUntilOptions {
    /// Include the delimiter character in the returned match.
    pub include_delimiter: bool,
    /// Match the last instance of the delimiter rather than the first.
    pub last_instance: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk as do_chunk;
    use crate::config::ChunkLevel;

    fn tokenizer(source: &str) -> (String, Vec<Chunk>) {
        do_chunk(source, ChunkLevel::Chunked, None).unwrap()
    }

    #[test]
    fn match_char_skips_trailing_whitespace() {
        let (src, chunks) = tokenizer(": rest");
        let mut t = Tokenizer::new(&src, &chunks, None);
        assert!(t.match_char(':'));
        assert_eq!(t.get_node_location(), 2);
    }

    #[test]
    fn match_number_basic() {
        let (src, chunks) = tokenizer("12.5px");
        let mut t = Tokenizer::new(&src, &chunks, None);
        let n = t.match_number(true, false).unwrap();
        assert_eq!(n, "12.5");
    }

    #[test]
    fn match_keyword_variable() {
        let (src, chunks) = tokenizer("@my-var: 1;");
        let mut t = Tokenizer::new(&src, &chunks, None);
        let kw = t.match_keyword(false, false).unwrap();
        assert_eq!(kw, "@my-var");
    }

    #[test]
    fn remember_recall_roundtrips() {
        let (src, chunks) = tokenizer("a b c");
        let mut t = Tokenizer::new(&src, &chunks, None);
        t.match_char('a');
        let mark = t.remember();
        t.match_char('b');
        assert!(t.peek('c'));
        t.recall(mark);
        assert!(t.peek('b'));
    }

    #[test]
    fn get_comment_only_matches_at_boundary() {
        let (src, chunks) = tokenizer("a: 1; // hi\nb: 2;");
        let mut t = Tokenizer::new(&src, &chunks, None);
        assert!(t.get_comment().is_none());
        t.match_until(';', MatchUntilOptions { include_delimiter: true, last_instance: false });
        assert_eq!(t.get_comment(), Some("// hi"));
    }

    #[test]
    fn match_regex_does_not_cross_into_comment() {
        let (src, chunks) = tokenizer("abc/*x*/def");
        let mut t = Tokenizer::new(&src, &chunks, None);
        let re = Regex::new("^[a-z]+").unwrap();
        assert_eq!(t.match_regex(&re), Some("abc"));
    }
}
