//! The importer capability (spec.md §6).
//!
//! Import resolution I/O is explicitly out of scope for the core; hosts
//! supply an implementation of [`Importer`] (a filesystem resolver, a
//! virtual-FS for tests, a network fetcher, ...).

/// The result of resolving an `@import` path.
#[derive(Clone, Debug)]
pub struct Imported {
    /// The resolved source text.
    pub source: String,
    /// A canonical, importer-defined identifier for the resolved resource,
    /// used to implement `@import (once)` deduplication.
    pub canonical_path: String,
    /// Whether this exact canonical path has already been imported earlier
    /// in the same compilation.
    pub already_imported: bool,
}

/// An error raised while resolving an import. The core only needs the
/// message; hosts may carry richer error data of their own behind this.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{0}")]
pub struct ImportError(pub String);

/// A capability for resolving `@import` paths to source text.
///
/// Implementations are free to cache, memoize "already imported" state, or
/// reject paths outside some sandbox; the core only relies on the contract
/// below.
pub trait Importer {
    /// Resolves `path` (as it appeared in the `@import` statement) relative
    /// to `current_file` (the file name hint of the importing source, if
    /// any), returning its source text and canonical identity.
    fn import(&self, path: &str, current_file: Option<&str>) -> Result<Imported, ImportError>;
}
