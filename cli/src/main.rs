use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use corpus_lab_core::{LabConfig, OutputFormat, SourceKind, WeightPolicy, write_artifact};
use corpus_lab_coverage::features::FeatureExtractor;
use corpus_lab_coverage::select_corpus;
use corpus_lab_pipeline::error::PipelineError;
use corpus_lab_pipeline::export::write_summary;
use corpus_lab_pipeline::run_pipeline;
use corpus_lab_pipeline::runner::RunnerConfig;
use corpus_lab_pipeline::worklist::load_worklist;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// CLI-specific output format enum with clap argument parsing support.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliOutputFormat {
    Json,
    Yaml,
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(fmt: CliOutputFormat) -> Self {
        match fmt {
            CliOutputFormat::Json => Self::Json,
            CliOutputFormat::Yaml => Self::Yaml,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliSourceKind {
    Latex,
    Typst,
}

impl From<CliSourceKind> for SourceKind {
    fn from(kind: CliSourceKind) -> Self {
        match kind {
            CliSourceKind::Latex => Self::Latex,
            CliSourceKind::Typst => Self::Typst,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliWeight {
    Uniform,
    Log,
    Sqrt,
}

impl From<CliWeight> for WeightPolicy {
    fn from(weight: CliWeight) -> Self {
        match weight {
            CliWeight::Uniform => Self::Uniform,
            CliWeight::Log => Self::Log,
            CliWeight::Sqrt => Self::Sqrt,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "corpus-lab")]
#[command(about = "Corpus feature scans, diversity selection and converter regression runs")]
#[command(version)]
struct Cli {
    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the structural feature tags of a source file or directory.
    Features(FeaturesArgs),
    /// Pick a feature-diverse subset of a corpus.
    Select(SelectArgs),
    /// Run the converter over a corpus and rank the reported losses.
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct FeaturesArgs {
    /// Source file or item directory.
    path: PathBuf,
    /// Corpus flavour (default: latex).
    #[arg(long)]
    kind: Option<CliSourceKind>,
    /// Maximum directory depth below the item root.
    #[arg(long)]
    max_depth: Option<usize>,
}

#[derive(Debug, Args)]
struct SelectArgs {
    /// Corpus root whose first-level directories are items.
    #[arg(long)]
    corpus_dir: PathBuf,
    /// Path of the selection artifact to write.
    #[arg(long)]
    out: PathBuf,
    /// Number of most frequent features to target.
    #[arg(long)]
    top_features: Option<usize>,
    /// Number of least frequent features to target.
    #[arg(long)]
    rare_features: Option<usize>,
    /// Maximum number of items to select.
    #[arg(long)]
    select: Option<usize>,
    /// Feature weighting policy.
    #[arg(long)]
    weight: Option<CliWeight>,
    /// Ignore features seen in fewer items than this.
    #[arg(long)]
    min_feature_freq: Option<usize>,
    /// Corpus flavour.
    #[arg(long)]
    kind: Option<CliSourceKind>,
    /// YAML configuration file; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output format for the selection artifact.
    #[arg(long, default_value = "json")]
    format: CliOutputFormat,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Corpus root.
    #[arg(long)]
    corpus_dir: PathBuf,
    /// Selection artifact listing the items to run.
    #[arg(long)]
    selection: Option<PathBuf>,
    /// Comma-separated template root directories (Typst corpora).
    #[arg(long)]
    roots: Option<String>,
    /// Directory receiving one run directory per item plus the summary.
    #[arg(long, default_value = "corpus-runs")]
    out_dir: PathBuf,
    /// Converter executable.
    #[arg(long)]
    converter: Option<PathBuf>,
    /// Per-invocation timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,
    /// Number of items processed concurrently.
    #[arg(long)]
    jobs: Option<usize>,
    /// Reuse reports from earlier runs.
    #[arg(long)]
    skip_existing: bool,
    /// With --skip-existing, reuse reports even if the run stamp is stale.
    #[arg(long)]
    trust_existing: bool,
    /// Run only the forward stage.
    #[arg(long, conflicts_with = "with_reverse")]
    forward_only: bool,
    /// Chain the reverse stage after a successful forward stage.
    #[arg(long)]
    with_reverse: bool,
    /// Corpus flavour.
    #[arg(long)]
    kind: Option<CliSourceKind>,
    /// YAML configuration file; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output format for the summary artifact.
    #[arg(long, default_value = "json")]
    format: CliOutputFormat,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let result = match cli.command {
        Command::Features(args) => run_features(args),
        Command::Select(args) => run_select(args),
        Command::Run(args) => run_run(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

/// Installs the stderr subscriber. `RUST_LOG` wins over `--log-level`.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<LabConfig, String> {
    match path {
        Some(path) => LabConfig::load(path)
            .map_err(|err| format!("Failed to load config '{}': {err}", path.display())),
        None => Ok(LabConfig::default()),
    }
}

fn parse_csv_list(raw: Option<String>) -> Option<Vec<String>> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    })
}

fn run_features(args: FeaturesArgs) -> Result<(), String> {
    if !args.path.exists() {
        return Err(format!("'{}' does not exist", args.path.display()));
    }
    let kind = args.kind.map(SourceKind::from).unwrap_or_default();
    let extractor = FeatureExtractor::new(kind).with_max_depth(args.max_depth);
    for tag in extractor.extract_item(&args.path) {
        println!("{tag}");
    }
    Ok(())
}

fn run_select(args: SelectArgs) -> Result<(), String> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(kind) = args.kind {
        config.kind = kind.into();
    }
    let selection = &mut config.selection;
    if let Some(top) = args.top_features {
        selection.top_features = top;
    }
    if let Some(rare) = args.rare_features {
        selection.rare_features = rare;
    }
    if let Some(select) = args.select {
        selection.select = select;
    }
    if let Some(weight) = args.weight {
        selection.weight = weight.into();
    }
    if let Some(min) = args.min_feature_freq {
        selection.min_feature_freq = min;
    }
    config.validate().map_err(|err| err.to_string())?;

    let report = select_corpus(&args.corpus_dir, config.kind, &config.selection)
        .map_err(|err| err.to_string())?;
    write_artifact(&args.out, &report, args.format.into()).map_err(|err| err.to_string())?;

    println!(
        "Selected {} of {} items; covered {}/{} target features ({:.1}%) -> {}",
        report.selected_count,
        report.items_scanned,
        report.covered_count,
        report.features_considered,
        report.coverage_ratio * 100.0,
        args.out.display()
    );
    Ok(())
}

fn run_run(args: RunArgs) -> Result<(), String> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(kind) = args.kind {
        config.kind = kind.into();
    }
    let pipeline = &mut config.pipeline;
    if let Some(converter) = args.converter {
        pipeline.converter = converter;
    }
    if let Some(timeout) = args.timeout {
        pipeline.timeout_secs = timeout;
    }
    if let Some(jobs) = args.jobs {
        pipeline.jobs = jobs;
    }
    if args.skip_existing {
        pipeline.skip_existing = true;
    }
    if args.trust_existing {
        pipeline.verify_stamp = false;
    }
    if args.forward_only {
        pipeline.reverse = Some(false);
    } else if args.with_reverse {
        pipeline.reverse = Some(true);
    }
    if let Some(roots) = parse_csv_list(args.roots) {
        pipeline.roots = roots;
    }
    config.validate().map_err(|err| err.to_string())?;

    if !config.pipeline.converter.is_file() {
        return Err(PipelineError::ConverterNotFound(config.pipeline.converter.clone()).to_string());
    }

    let items = load_worklist(
        &args.corpus_dir,
        args.selection.as_deref(),
        config.kind,
        &config.pipeline.roots,
    )
    .map_err(|err| err.to_string())?;
    debug!(items = items.len(), "Loaded worklist");

    let runner_config = RunnerConfig::from_lab_config(&config, &args.out_dir);
    let outcome = run_pipeline(runner_config, &items).map_err(|err| err.to_string())?;
    let summary_path = write_summary(&outcome.summary, &args.out_dir, args.format.into())
        .map_err(|err| err.to_string())?;

    let results = &outcome.results;
    let ok = results.iter().filter(|r| r.succeeded()).count();
    let skipped = results.iter().filter(|r| r.skipped).count();
    let timed_out = results.iter().filter(|r| r.timed_out()).count();
    let reused = results.iter().filter(|r| r.reused).count();
    let failed = results.len() - ok - skipped;
    println!(
        "Processed {} items: {ok} ok, {failed} failed ({timed_out} timed out), {skipped} skipped, {reused} reused -> {}",
        results.len(),
        summary_path.display()
    );
    Ok(())
}
