//! Core types shared by corpus curation and converter regression runs.
//!
//! This crate defines the vocabulary the other workspace crates speak:
//!
//! - [`Item`]: one corpus entry (a directory of sources or a single file).
//! - [`FeatureSet`]: the opaque structural tags extracted from an item.
//! - [`SourceKind`]: which document flavour a corpus holds (LaTeX or Typst).
//! - [`WeightPolicy`]: how feature frequency maps to selection weight.
//! - [`SkipReason`] / [`ReportStatus`]: per-item outcome classifications.
//! - [`LabConfig`]: YAML configuration for selection and pipeline runs.
//!
//! # Example
//!
//! ```
//! use corpus_lab_core::*;
//!
//! let item = Item::from_path("corpus/2401.00001");
//! assert_eq!(item.id, "2401.00001");
//!
//! assert_eq!(WeightPolicy::Uniform.weight(40), 1.0);
//! assert_eq!(WeightPolicy::Log.weight(3), 2.0);
//! assert!(SourceKind::Latex.is_source_file(std::path::Path::new("paper/main.TEX")));
//! ```

mod config;
mod error;
mod output;
mod types;

pub use config::{LabConfig, PipelineConfig, SelectionConfig};
pub use error::{ConfigError, Result};
pub use output::{OutputError, OutputFormat, render_artifact, write_artifact};
pub use types::*;
