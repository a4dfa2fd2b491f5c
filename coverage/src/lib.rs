//! Structural feature extraction and diversity selection for document
//! corpora.
//!
//! The pipeline is leaf-first:
//!
//! 1. [`features::FeatureExtractor`] scans each item's sources, strips line
//!    comments with escape accounting ([`scan`]), and emits namespaced tags.
//! 2. [`corpus::Population`] collects per-item feature sets and the
//!    population-wide frequency table.
//! 3. [`select::DiversitySelector`] runs weighted greedy maximum coverage
//!    over a target feature set.
//! 4. [`report::SelectionReport`] is the serializable artifact.
//!
//! [`select_corpus`] wires all four together.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use corpus_lab_core::{SelectionConfig, SourceKind};
//!
//! let report = corpus_lab_coverage::select_corpus(
//!     Path::new("arxiv-corpus"),
//!     SourceKind::Latex,
//!     &SelectionConfig::default(),
//! )
//! .unwrap();
//! println!("covered {}/{}", report.covered_count, report.features_considered);
//! ```

pub mod corpus;
pub mod error;
pub mod features;
pub mod report;
pub mod scan;
pub mod select;

use std::path::Path;

use corpus_lab_core::{SelectionConfig, SourceKind};

use corpus::{Population, list_items};
use error::CoverageError;
use features::FeatureExtractor;
use report::SelectionReport;
use select::{DiversitySelector, SelectionParams};

/// Lists, scans and selects from the corpus at `corpus_dir`.
///
/// # Errors
///
/// Fails only if the corpus root is missing or cannot be listed.
pub fn select_corpus(
    corpus_dir: &Path,
    kind: SourceKind,
    config: &SelectionConfig,
) -> Result<SelectionReport, CoverageError> {
    let items = list_items(corpus_dir, &config.exclude_dirs)?;
    let extractor = FeatureExtractor::new(kind).with_max_depth(config.max_depth);
    let population = Population::scan(&extractor, &items);
    let result = DiversitySelector::new(SelectionParams::from(config)).select(&population);
    Ok(SelectionReport::build(
        &corpus_dir.display().to_string(),
        kind,
        config.weight,
        &result,
    ))
}
