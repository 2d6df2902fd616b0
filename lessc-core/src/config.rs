//! Compiler configuration.

use crate::importer::Importer;

/// How aggressively the chunker pre-passes the source (spec.md §4.1).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ChunkLevel {
    /// No pre-pass: the entire input is a single `Text` chunk.
    None,
    /// Full comment/string/brace-balance classification.
    #[default]
    Chunked,
}

/// Compiler configuration, threaded by reference through the compile entry
/// point rather than carried in any global or thread-local state.
pub struct Config<'a> {
    /// Collapse whitespace and elide redundant punctuation in the emitted
    /// CSS (spec.md §4.5).
    pub compress: bool,
    /// Arithmetic operators are only honored inside parentheses (spec.md
    /// §4.3's `operation` production).
    pub strict_math: bool,
    /// Chunking strategy.
    pub optimization: ChunkLevel,
    /// Preserve `/* */` comments (subject to their own visibility rules) in
    /// the emitted CSS.
    pub keep_comments: bool,
    /// The capability used to resolve `@import` paths. `None` means
    /// `@import` fails fast rather than silently no-op'ing.
    pub importer: Option<&'a dyn Importer>,
}

impl<'a> Config<'a> {
    /// A configuration with defaults matching the reference LESS compiler:
    /// chunked parsing, non-strict math, comments kept, no compression, and
    /// no importer (so imports fail unless one is supplied).
    pub fn new() -> Self {
        Self::default()
    }
}

impl<'a> Default for Config<'a> {
    fn default() -> Self {
        Self {
            compress: false,
            strict_math: false,
            optimization: ChunkLevel::default(),
            keep_comments: true,
            importer: None,
        }
    }
}
