//! Error type for corpus scanning.

use std::path::PathBuf;

/// Typed error for corpus listing and selection workflows.
///
/// Per-file read failures are not errors; only a missing or unlistable
/// corpus root aborts a scan.
#[derive(Debug, thiserror::Error)]
pub enum CoverageError {
    /// The corpus root does not exist or is not a directory.
    #[error("corpus directory '{}' does not exist", .0.display())]
    CorpusNotFound(PathBuf),

    /// Filesystem I/O failure while listing the corpus root.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
