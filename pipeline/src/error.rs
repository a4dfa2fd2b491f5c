//! Error type for pipeline runs.

use std::path::PathBuf;

use corpus_lab_core::OutputError;
use corpus_lab_coverage::error::CoverageError;

/// Typed error for conditions that stop a batch before or after the
/// per-item work.
///
/// Anything that goes wrong for a single item (no entrypoint, timeout,
/// non-zero exit, unreadable report, worker panic) is recorded in that
/// item's [`RunResult`](crate::runner::RunResult) instead.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The converter executable does not exist.
    #[error("converter not found: {}", .0.display())]
    ConverterNotFound(PathBuf),

    /// The selection file is valid JSON but lists no `selected` or `dirs`.
    #[error("unsupported selection format in '{}'", .0.display())]
    UnsupportedSelection(PathBuf),

    /// Corpus listing failed.
    #[error(transparent)]
    Corpus(#[from] CoverageError),

    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parse failure for a selection file.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Worker pool construction failure.
    #[error("failed to create thread pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    /// CSV export failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Artifact serialization or write failure.
    #[error(transparent)]
    Output(#[from] OutputError),
}
