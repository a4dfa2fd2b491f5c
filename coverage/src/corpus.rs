//! Corpus listing and population-wide feature scans.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use corpus_lab_core::{FeatureSet, Item};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::CoverageError;
use crate::features::FeatureExtractor;

/// Mapping from feature tag to the number of items exhibiting it.
pub type FeatureFrequency = BTreeMap<String, usize>;

/// Lists first-level directories of `corpus_dir` as items, sorted by name.
///
/// Plain files and directories named in `exclude` are ignored.
pub fn list_items(corpus_dir: &Path, exclude: &[String]) -> Result<Vec<Item>, CoverageError> {
    if !corpus_dir.is_dir() {
        return Err(CoverageError::CorpusNotFound(corpus_dir.to_path_buf()));
    }

    let mut items = Vec::new();
    for entry in fs::read_dir(corpus_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if exclude.iter().any(|skip| *skip == name) {
            continue;
        }
        items.push(Item::from_path(path));
    }
    items.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(items)
}

/// Per-item feature sets plus the frequency table built from them.
#[derive(Debug, Clone, Default)]
pub struct Population {
    /// Items with at least one feature, keyed by identifier.
    pub items: BTreeMap<String, (Item, FeatureSet)>,
    /// Number of items exhibiting each feature. An item counts at most once
    /// per feature.
    pub frequencies: FeatureFrequency,
}

impl Population {
    /// Builds a population from precomputed feature sets.
    ///
    /// Items without features are dropped; a repeated identifier keeps its
    /// first occurrence.
    pub fn from_features(entries: impl IntoIterator<Item = (Item, FeatureSet)>) -> Self {
        let mut population = Self::default();
        for (item, features) in entries {
            if features.is_empty() {
                debug!(item = %item.id, "Item has no features, excluded from selection");
                continue;
            }
            if population.items.contains_key(&item.id) {
                warn!(item = %item.id, "Duplicate item identifier, keeping first occurrence");
                continue;
            }
            for feature in &features {
                *population.frequencies.entry(feature.clone()).or_insert(0) += 1;
            }
            population.items.insert(item.id.clone(), (item, features));
        }
        population
    }

    /// Extracts features for every item in parallel and builds the
    /// population.
    pub fn scan(extractor: &FeatureExtractor, items: &[Item]) -> Self {
        let scanned: Vec<(Item, FeatureSet)> = items
            .par_iter()
            .map(|item| (item.clone(), extractor.extract_item(&item.root)))
            .collect();
        let population = Self::from_features(scanned);
        info!(
            listed = items.len(),
            scanned = population.items.len(),
            features = population.frequencies.len(),
            "Scanned corpus features"
        );
        population
    }

    /// Number of items that contributed features.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
