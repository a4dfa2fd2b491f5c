//! Batch execution: one converter chain per item on a bounded worker pool.

use std::fs;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use corpus_lab_core::{Item, LabConfig, SkipReason, SourceKind, TIMEOUT_EXIT_CODE};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::entrypoint::find_entrypoint;
use crate::error::PipelineError;
use crate::invoke::{open_log, run_logged};
use crate::stage::{StageSpec, stage_names, stage_plan};
use crate::stamp::{RunStamp, file_digest, sources_digest};
use crate::worklist::unique_items;

/// Per-item log file inside the run directory.
pub const LOG_FILE: &str = "run.log";

/// Directory the converter runs in: the item root, or the entrypoint's
/// directory for single-file items. A bare file name runs in `.`.
fn working_dir(root: &Path, entrypoint: &Path) -> PathBuf {
    if root.is_dir() {
        return root.to_path_buf();
    }
    entrypoint
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Runner settings resolved from configuration and flags.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    pub converter: PathBuf,
    pub out_dir: PathBuf,
    pub kind: SourceKind,
    pub timeout: Duration,
    pub jobs: usize,
    pub skip_existing: bool,
    pub verify_stamp: bool,
    pub reverse: bool,
}

impl RunnerConfig {
    pub fn from_lab_config(config: &LabConfig, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            converter: config.pipeline.converter.clone(),
            out_dir: out_dir.into(),
            kind: config.kind,
            timeout: Duration::from_secs(config.pipeline.timeout_secs),
            jobs: config.pipeline.jobs,
            skip_existing: config.pipeline.skip_existing,
            verify_stamp: config.pipeline.verify_stamp,
            reverse: config.reverse_enabled(),
        }
    }
}

/// What happened to one stage of an item's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRun {
    pub stage: String,
    /// `None` if the stage was not attempted or its output was reused.
    pub exit_code: Option<i32>,
    pub output_path: PathBuf,
    pub report_path: PathBuf,
}

impl StageRun {
    fn planned(spec: &StageSpec, run_dir: &Path) -> Self {
        Self {
            stage: spec.name.to_string(),
            exit_code: None,
            output_path: run_dir.join(spec.output_file),
            report_path: run_dir.join(spec.report_file),
        }
    }
}

/// Outcome for one item. Every item in a batch yields exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub item: Item,
    pub entrypoint: Option<PathBuf>,
    pub run_dir: PathBuf,
    pub stages: Vec<StageRun>,
    /// No conversion was attempted.
    pub skipped: bool,
    pub skip_reason: Option<SkipReason>,
    pub skip_detail: Option<String>,
    /// Reports were taken from a previous run.
    pub reused: bool,
}

impl RunResult {
    fn skipped(
        item: &Item,
        run_dir: PathBuf,
        stages: Vec<StageRun>,
        reason: SkipReason,
        detail: Option<String>,
    ) -> Self {
        Self {
            item: item.clone(),
            entrypoint: None,
            run_dir,
            stages,
            skipped: true,
            skip_reason: Some(reason),
            skip_detail: detail,
            reused: false,
        }
    }

    /// Returns `true` if any stage was killed for exceeding the timeout.
    pub fn timed_out(&self) -> bool {
        self.stages
            .iter()
            .any(|stage| stage.exit_code == Some(TIMEOUT_EXIT_CODE))
    }

    /// Returns `true` if every planned stage ran and exited zero, or the
    /// result was reused.
    pub fn succeeded(&self) -> bool {
        !self.skipped
            && (self.reused || self.stages.iter().all(|stage| stage.exit_code == Some(0)))
    }
}

fn append_log_line(log_path: &Path, line: &str) -> io::Result<()> {
    let mut log = open_log(log_path)?;
    writeln!(log, "{line}")
}

fn remove_stale(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

/// Drives the converter over a worklist.
///
/// Construction performs the only fatal check: the converter must exist.
/// Everything after that is isolated per item.
#[derive(Debug)]
pub struct PipelineRunner {
    config: RunnerConfig,
    converter: PathBuf,
    converter_sha256: String,
    plan: Vec<StageSpec>,
}

impl PipelineRunner {
    /// Validates the converter and prepares the output directory.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ConverterNotFound`] if the converter path is
    /// not a file, and [`PipelineError::Io`] if it cannot be hashed or the
    /// output directory cannot be created.
    pub fn new(config: RunnerConfig) -> Result<Self, PipelineError> {
        if !config.converter.is_file() {
            return Err(PipelineError::ConverterNotFound(config.converter.clone()));
        }
        let converter = fs::canonicalize(&config.converter)?;
        let converter_sha256 = file_digest(&converter)?;
        // The converter runs inside each item directory, so every path
        // handed to it must be absolute.
        fs::create_dir_all(&config.out_dir)?;
        let out_dir = fs::canonicalize(&config.out_dir)?;
        let config = RunnerConfig { out_dir, ..config };
        let plan = stage_plan(config.kind, config.reverse);
        debug!(
            converter = %converter.display(),
            stages = ?stage_names(&plan),
            "Prepared pipeline runner"
        );
        Ok(Self {
            config,
            converter,
            converter_sha256,
            plan,
        })
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// The stage chain every item goes through.
    pub fn plan(&self) -> &[StageSpec] {
        &self.plan
    }

    pub fn stage_names(&self) -> Vec<String> {
        stage_names(&self.plan)
    }

    fn run_dir(&self, item: &Item) -> PathBuf {
        self.config.out_dir.join(&item.id)
    }

    fn planned_stages(&self, run_dir: &Path) -> Vec<StageRun> {
        self.plan
            .iter()
            .map(|spec| StageRun::planned(spec, run_dir))
            .collect()
    }

    fn current_stamp(&self, item: &Item) -> RunStamp {
        RunStamp::new(
            self.converter_sha256.clone(),
            sources_digest(&item.root, self.config.kind),
            self.stage_names(),
        )
    }

    /// Prior output can stand in for a run when the final report exists and,
    /// if verification is on, the stored stamp matches.
    fn reusable(&self, item: &Item, run_dir: &Path, stages: &[StageRun]) -> bool {
        let Some(last) = stages.last() else {
            return false;
        };
        if !last.report_path.exists() {
            return false;
        }
        if !self.config.verify_stamp {
            return true;
        }
        match RunStamp::load(run_dir) {
            Some(stored) if stored.matches(&self.current_stamp(item)) => true,
            Some(_) => {
                info!(item = %item.id, "Run stamp changed, re-running");
                false
            }
            None => {
                info!(item = %item.id, "No run stamp, re-running");
                false
            }
        }
    }

    /// Processes one item. Never fails; problems are recorded in the result.
    pub fn run_item(&self, item: &Item) -> RunResult {
        let run_dir = self.run_dir(item);
        let mut stages = self.planned_stages(&run_dir);

        if let Err(err) = fs::create_dir_all(&run_dir) {
            warn!(item = %item.id, error = %err, "Cannot create run directory");
            return RunResult::skipped(item, run_dir, stages, SkipReason::Io, Some(err.to_string()));
        }

        if self.config.skip_existing && self.reusable(item, &run_dir, &stages) {
            debug!(item = %item.id, "Reusing existing reports");
            return RunResult {
                item: item.clone(),
                entrypoint: None,
                run_dir,
                stages,
                skipped: false,
                skip_reason: None,
                skip_detail: None,
                reused: true,
            };
        }

        let log_path = run_dir.join(LOG_FILE);
        let Some(entrypoint) = find_entrypoint(&item.root, self.config.kind) else {
            let message = format!("ERROR: no .{} entrypoint found", self.config.kind.extension());
            if let Err(err) = append_log_line(&log_path, &message) {
                debug!(item = %item.id, error = %err, "Cannot write run log");
            }
            info!(item = %item.id, "No entrypoint");
            return RunResult::skipped(item, run_dir, stages, SkipReason::NoEntrypoint, None);
        };

        if let Err(err) = self.execute(item, &entrypoint, &run_dir, &log_path, &mut stages) {
            warn!(item = %item.id, error = %err, "Run directory I/O failed");
            return RunResult::skipped(item, run_dir, stages, SkipReason::Io, Some(err.to_string()));
        }

        if let Err(err) = self.current_stamp(item).save(&run_dir) {
            debug!(item = %item.id, error = %err, "Cannot write run stamp");
        }

        let exit_codes: Vec<Option<i32>> = stages.iter().map(|stage| stage.exit_code).collect();
        info!(item = %item.id, exit_codes = ?exit_codes, "Item finished");

        RunResult {
            item: item.clone(),
            entrypoint: Some(entrypoint),
            run_dir,
            stages,
            skipped: false,
            skip_reason: None,
            skip_detail: None,
            reused: false,
        }
    }

    /// Runs the stage chain. Each later stage consumes the previous stage's
    /// output and only runs if that stage exited zero and produced it.
    fn execute(
        &self,
        item: &Item,
        entrypoint: &Path,
        run_dir: &Path,
        log_path: &Path,
        stages: &mut [StageRun],
    ) -> io::Result<()> {
        for stage in stages.iter() {
            remove_stale(&stage.output_path)?;
            remove_stale(&stage.report_path)?;
        }
        append_log_line(log_path, &format!("# {} {}", item.id, Utc::now().to_rfc3339()))?;

        let cwd = working_dir(&item.root, entrypoint);
        let mut input = entrypoint
            .strip_prefix(&cwd)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| entrypoint.to_path_buf());

        for (spec, stage) in self.plan.iter().zip(stages.iter_mut()) {
            let args = spec.args(&input, &stage.output_path, &stage.report_path);
            let code = run_logged(&self.converter, &args, &cwd, log_path, self.config.timeout)?;
            stage.exit_code = Some(code);
            if code != 0 || !stage.output_path.exists() {
                debug!(item = %item.id, stage = spec.name, exit_code = code, "Stopping chain");
                break;
            }
            input = stage.output_path.clone();
        }
        debug!(item = %item.id, run_dir = %run_dir.display(), "Chain complete");
        Ok(())
    }

    fn run_item_isolated(&self, item: &Item) -> RunResult {
        panic::catch_unwind(AssertUnwindSafe(|| self.run_item(item))).unwrap_or_else(|payload| {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|text| text.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned());
            warn!(item = %item.id, detail = ?detail, "Worker panicked");
            let run_dir = self.run_dir(item);
            let stages = self.planned_stages(&run_dir);
            RunResult::skipped(item, run_dir, stages, SkipReason::WorkerPanic, detail)
        })
    }

    /// Runs every item and returns one result per item, sorted by id.
    ///
    /// Items are first passed through [`unique_items`] so no two share a run
    /// directory. With `jobs <= 1` items run sequentially on the calling
    /// thread.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Pool`] if the worker pool cannot be built.
    pub fn run_batch(&self, items: &[Item]) -> Result<Vec<RunResult>, PipelineError> {
        let items = unique_items(items.to_vec());
        let jobs = self.config.jobs.max(1).min(items.len().max(1));
        info!(items = items.len(), jobs, kind = %self.config.kind, "Starting batch");

        let mut results: Vec<RunResult> = if jobs == 1 {
            items.iter().map(|item| self.run_item_isolated(item)).collect()
        } else {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?;
            pool.install(|| {
                items
                    .par_iter()
                    .map(|item| self.run_item_isolated(item))
                    .collect()
            })
        };

        // Sort by id for deterministic output.
        results.sort_by(|a, b| a.item.id.cmp(&b.item.id));

        let timed_out = results.iter().filter(|result| result.timed_out()).count();
        let skipped = results.iter().filter(|result| result.skipped).count();
        info!(items = results.len(), timed_out, skipped, "Batch finished");
        Ok(results)
    }
}
