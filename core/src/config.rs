//! YAML configuration for selection and pipeline runs.
//!
//! Every field has a default, so a partial file is valid and an absent file
//! is equivalent to [`LabConfig::default()`]. Command-line flags override
//! individual fields after loading.
//!
//! # Example YAML
//!
//! ```yaml
//! kind: latex
//! selection:
//!   top_features: 200
//!   rare_features: 50
//!   select: 20
//!   weight: log
//!   min_feature_freq: 2
//!   exclude_dirs: [src, pkg]
//! pipeline:
//!   converter: target/release/t2l
//!   timeout_secs: 120
//!   jobs: 4
//!   skip_existing: true
//!   verify_stamp: true
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::types::{SourceKind, WeightPolicy};

/// Bounds for diversity selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Number of most frequent features admitted to the target set.
    pub top_features: usize,
    /// Number of least frequent (but above threshold) features admitted.
    pub rare_features: usize,
    /// Maximum number of items to select.
    pub select: usize,
    /// Frequency-to-weight policy.
    pub weight: WeightPolicy,
    /// Features seen in fewer items than this are never targeted.
    pub min_feature_freq: usize,
    /// First-level directory names that are not corpus items.
    pub exclude_dirs: Vec<String>,
    /// Depth cap for the per-item source walk (`None` = unbounded).
    pub max_depth: Option<usize>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            top_features: 200,
            rare_features: 50,
            select: 20,
            weight: WeightPolicy::Log,
            min_feature_freq: 2,
            exclude_dirs: vec!["src".to_string(), "pkg".to_string()],
            max_depth: None,
        }
    }
}

/// Settings for driving the converter across a worklist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Path to the converter executable.
    pub converter: PathBuf,
    /// Wall-clock limit per converter invocation, in seconds.
    pub timeout_secs: u64,
    /// Number of items processed concurrently.
    pub jobs: usize,
    /// Reuse prior reports instead of re-running the converter.
    pub skip_existing: bool,
    /// Chain the reverse stage after a successful forward stage.
    /// `None` follows the corpus kind's default.
    pub reverse: Option<bool>,
    /// Only reuse prior reports whose run stamp matches the current
    /// converter binary and sources.
    pub verify_stamp: bool,
    /// Template root directories (Typst corpora).
    pub roots: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            converter: PathBuf::from("target/release/t2l"),
            timeout_secs: 120,
            jobs: 1,
            skip_existing: false,
            reverse: None,
            verify_stamp: true,
            roots: vec![
                "typst-templates".to_string(),
                "ml-templates".to_string(),
                "package-templates-abs".to_string(),
            ],
        }
    }
}

/// Top-level configuration.
///
/// # Examples
///
/// ```
/// # let yaml = "kind: typst\npipeline:\n  jobs: 8\n";
/// let config: corpus_lab_core::LabConfig = serde_yaml::from_str(yaml).unwrap();
/// assert_eq!(config.kind, corpus_lab_core::SourceKind::Typst);
/// assert_eq!(config.pipeline.jobs, 8);
/// assert_eq!(config.selection.select, 20);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    pub kind: SourceKind,
    pub selection: SelectionConfig,
    pub pipeline: PipelineConfig,
}

impl LabConfig {
    /// Loads and validates configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::IoError`] if the file cannot be read,
    /// [`ConfigError::YamlError`] if parsing fails, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config: Self = serde_yaml::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Checks value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.jobs == 0 {
            return Err(ConfigError::Invalid("pipeline.jobs must be >= 1".to_string()));
        }
        if self.pipeline.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.timeout_secs must be >= 1".to_string(),
            ));
        }
        if self.selection.min_feature_freq == 0 {
            return Err(ConfigError::Invalid(
                "selection.min_feature_freq must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether the reverse stage runs, resolving the kind default.
    ///
    /// LaTeX corpora round-trip by default; Typst corpora only run forward.
    pub fn reverse_enabled(&self) -> bool {
        self.pipeline
            .reverse
            .unwrap_or(matches!(self.kind, SourceKind::Latex))
    }
}
