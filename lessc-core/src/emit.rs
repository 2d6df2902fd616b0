//! The emitter (spec.md §4.5).
//!
//! `Output` owns a stack of text-fragment buffers. Nodes are turned into CSS
//! by calling [`AppendCss::append_css`] which writes into whichever buffer is
//! currently on top; callers push a fresh buffer before emitting something
//! they may want to post-process (trim, re-indent, or discard) as a unit.

use std::fmt::Write as _;

/// A stack of text-fragment buffers.
#[derive(Default)]
pub struct Output {
    frames: Vec<String>,
}

impl Output {
    /// Creates an output with one empty frame already on the stack.
    pub fn new() -> Self {
        Self { frames: vec![String::new()] }
    }

    /// Starts a fresh, empty frame.
    pub fn push(&mut self) {
        self.frames.push(String::new());
    }

    /// Removes and returns the top frame.
    pub fn pop(&mut self) -> String {
        self.frames.pop().unwrap_or_default()
    }

    /// Pops the top frame and appends it to the (new) top frame.
    pub fn pop_and_append(&mut self) {
        let popped = self.pop();
        self.append_str(&popped);
    }

    /// Appends raw text to the current frame.
    pub fn append_str(&mut self, text: &str) {
        if let Some(top) = self.frames.last_mut() {
            top.push_str(text);
        }
    }

    /// Appends a single character to the current frame.
    pub fn append_char(&mut self, ch: char) {
        if let Some(top) = self.frames.last_mut() {
            top.push(ch);
        }
    }

    /// Appends `value` using its `Display` implementation.
    pub fn append(&mut self, value: impl std::fmt::Display) {
        if let Some(top) = self.frames.last_mut() {
            let _ = write!(top, "{value}");
        }
    }

    /// Appends every item in `items`, joined by `separator`. The separator
    /// is only written between items, never trailing.
    pub fn append_many<T>(&mut self, items: &[T], separator: &str, mut each: impl FnMut(&mut Self, &T)) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.append_str(separator);
            }
            each(self, item);
        }
    }

    /// Re-indents every line of the current frame by prefixing `prefix`
    /// after each newline (and once at the very start, if the frame is
    /// non-empty).
    pub fn indent(&mut self, prefix: &str) {
        if let Some(top) = self.frames.last_mut() {
            if top.is_empty() {
                return;
            }
            let reindented = top.replace('\n', &format!("\n{prefix}"));
            *top = format!("{prefix}{reindented}");
        }
    }

    /// Trims `ch` (default: ASCII whitespace) from both ends of the current
    /// frame.
    pub fn trim(&mut self, ch: Option<char>) {
        self.trim_left(ch);
        self.trim_right(ch);
    }

    /// Trims `ch` from the start of the current frame.
    pub fn trim_left(&mut self, ch: Option<char>) {
        if let Some(top) = self.frames.last_mut() {
            *top = match ch {
                Some(c) => top.trim_start_matches(c).to_string(),
                None => top.trim_start().to_string(),
            };
        }
    }

    /// Trims `ch` from the end of the current frame.
    pub fn trim_right(&mut self, ch: Option<char>) {
        if let Some(top) = self.frames.last_mut() {
            *top = match ch {
                Some(c) => top.trim_end_matches(c).to_string(),
                None => top.trim_end().to_string(),
            };
        }
    }

    /// Replaces the current frame's contents wholesale — used for post-hoc
    /// whitespace compression once a fragment is fully assembled.
    pub fn reset(&mut self, s: impl Into<String>) {
        if let Some(top) = self.frames.last_mut() {
            *top = s.into();
        }
    }

    /// Consumes the output, returning the bottom (root) frame. Panics if
    /// any pushed frame was never popped — a bug in the caller, not a user
    /// error.
    pub fn finish(mut self) -> String {
        assert_eq!(self.frames.len(), 1, "unbalanced Output push/pop");
        self.frames.pop().unwrap()
    }
}

/// Collapses runs of ASCII whitespace to a single space, and drops spaces
/// immediately after a comma — the whitespace half of `Compress` (spec.md
/// §4.5); punctuation tightening (`: ` -> `:`, trailing `;` elision) is
/// applied by each node's own `append_css` when `Env::compress` is set.
pub fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            if ch != ',' && out.ends_with(", ") {
                out.truncate(out.len() - 1);
            }
            out.push(ch);
            last_was_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_and_append_merges_into_parent() {
        let mut out = Output::new();
        out.append_str("a");
        out.push();
        out.append_str("b");
        out.pop_and_append();
        out.append_str("c");
        assert_eq!(out.finish(), "abc");
    }

    #[test]
    fn append_many_has_no_trailing_separator() {
        let mut out = Output::new();
        out.append_many(&["1", "2", "3"], ", ", |out, item| out.append_str(item));
        assert_eq!(out.finish(), "1, 2, 3");
    }

    #[test]
    fn collapse_whitespace_squashes_runs() {
        assert_eq!(collapse_whitespace("a   b\n\tc"), "a b c");
    }

    #[test]
    fn collapse_whitespace_drops_space_after_comma() {
        assert_eq!(collapse_whitespace("1, 2,  3"), "1,2,3");
    }
}
