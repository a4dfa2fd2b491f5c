//! Batch converter regression runs over a corpus.
//!
//! For each item in a worklist the runner picks an entrypoint
//! ([`entrypoint`]), drives the converter through a stage chain
//! ([`stage`], [`invoke`]) inside a bounded worker pool ([`runner`]), and
//! leaves a run directory with the converted output, loss reports, an
//! append-only `run.log` and a [`stamp::RunStamp`]. The aggregator
//! ([`aggregate`]) then reads every report ([`loss`]) and ranks losses
//! across the batch; [`export`] writes the summary.
//!
//! Only pre-flight problems are errors. A bad item never aborts the batch.

pub mod aggregate;
pub mod entrypoint;
pub mod error;
pub mod export;
pub mod invoke;
pub mod loss;
pub mod runner;
pub mod stage;
pub mod stamp;
pub mod worklist;

use corpus_lab_core::Item;

use aggregate::{RunSummary, aggregate};
use error::PipelineError;
use runner::{PipelineRunner, RunResult, RunnerConfig};

/// Output of [`run_pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub results: Vec<RunResult>,
    pub summary: RunSummary,
}

/// Runs `items` through the converter and aggregates their reports.
///
/// # Errors
///
/// Fails before any item runs if the converter is missing or the output
/// directory cannot be created, and if the worker pool cannot be built.
pub fn run_pipeline(config: RunnerConfig, items: &[Item]) -> Result<PipelineOutcome, PipelineError> {
    let runner = PipelineRunner::new(config)?;
    let results = runner.run_batch(items)?;
    let summary = aggregate(runner.config().kind, &runner.stage_names(), &results);
    Ok(PipelineOutcome { results, summary })
}
