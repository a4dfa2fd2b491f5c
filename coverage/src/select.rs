//! Weighted greedy maximum-coverage selection.
//!
//! The target feature set is the union of the `top_features` most frequent
//! and the `rare_features` least frequent tags among those seen in at least
//! `min_feature_freq` items. Each round picks the unselected item whose
//! still-uncovered target features carry the largest total weight. Ties go
//! to the lexicographically smallest item identifier. Selection stops when
//! the budget is spent or no item adds coverage.
//!
//! This is the standard greedy approximation; it does not search for the
//! optimal subset.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use corpus_lab_core::{Item, SelectionConfig, WeightPolicy};
use tracing::{debug, info};

use crate::corpus::{FeatureFrequency, Population};

/// Bounds and weighting for one selection run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionParams {
    pub top_features: usize,
    pub rare_features: usize,
    pub min_feature_freq: usize,
    pub max_select: usize,
    pub weight: WeightPolicy,
}

impl Default for SelectionParams {
    fn default() -> Self {
        Self::from(&SelectionConfig::default())
    }
}

impl From<&SelectionConfig> for SelectionParams {
    fn from(config: &SelectionConfig) -> Self {
        Self {
            top_features: config.top_features,
            rare_features: config.rare_features,
            min_feature_freq: config.min_feature_freq,
            max_select: config.select,
            weight: config.weight,
        }
    }
}

/// Features the selection tries to cover, with their weights.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetFeatures {
    /// Most frequent features, descending by count then ascending by name.
    pub common: Vec<(String, usize)>,
    /// Least frequent features, ascending by count then by name.
    pub rare: Vec<(String, usize)>,
    /// Weight of every target feature; always positive.
    pub weights: BTreeMap<String, f64>,
}

impl TargetFeatures {
    /// Filters `frequencies` by the minimum frequency and picks the common
    /// and rare tails.
    pub fn build(frequencies: &FeatureFrequency, params: &SelectionParams) -> Self {
        let min_freq = params.min_feature_freq.max(1);
        let filtered: Vec<(String, usize)> = frequencies
            .iter()
            .filter(|(_, count)| **count >= min_freq)
            .map(|(feature, count)| (feature.clone(), *count))
            .collect();

        let mut common = filtered.clone();
        common.sort_by(|(fa, ca), (fb, cb)| cb.cmp(ca).then_with(|| fa.cmp(fb)));
        common.truncate(params.top_features);

        let mut rare = filtered;
        rare.sort_by(|(fa, ca), (fb, cb)| ca.cmp(cb).then_with(|| fa.cmp(fb)));
        rare.truncate(params.rare_features);

        let weights = common
            .iter()
            .chain(rare.iter())
            .map(|(feature, count)| (feature.clone(), params.weight.weight(*count)))
            .collect();

        Self {
            common,
            rare,
            weights,
        }
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn contains(&self, feature: &str) -> bool {
        self.weights.contains_key(feature)
    }

    /// Weight of `feature`, or `0.0` if it is not a target.
    pub fn weight(&self, feature: &str) -> f64 {
        self.weights.get(feature).copied().unwrap_or(0.0)
    }
}

/// One pick of the greedy loop.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedItem {
    pub item: Item,
    /// Target features this item covered first, sorted.
    pub new_features: Vec<String>,
    /// Summed weight of `new_features`.
    pub gain: f64,
    /// Covered target features after this pick.
    pub covered_after: usize,
    /// Total features the item exhibits (targeted or not).
    pub total_features: usize,
}

/// Outcome of a selection run.
#[derive(Debug, Clone, Default)]
pub struct SelectionResult {
    pub selected: Vec<SelectedItem>,
    pub covered: BTreeSet<String>,
    pub target: TargetFeatures,
    /// Items that contributed at least one feature.
    pub items_scanned: usize,
    /// Full per-feature frequency table, before filtering.
    pub frequencies: FeatureFrequency,
}

impl SelectionResult {
    /// Fraction of target features covered; `0.0` for an empty target.
    pub fn coverage_ratio(&self) -> f64 {
        self.covered.len() as f64 / self.target.len().max(1) as f64
    }
}

/// Runs weighted greedy maximum coverage over a [`Population`].
///
/// # Examples
///
/// ```
/// use corpus_lab_core::{FeatureSet, Item, WeightPolicy};
/// use corpus_lab_coverage::corpus::Population;
/// use corpus_lab_coverage::select::{DiversitySelector, SelectionParams};
///
/// fn set(tags: &[&str]) -> FeatureSet {
///     tags.iter().map(|t| t.to_string()).collect()
/// }
///
/// let population = Population::from_features(vec![
///     (Item::from_path("c/a"), set(&["A", "B"])),
///     (Item::from_path("c/b"), set(&["B", "C"])),
///     (Item::from_path("c/c"), set(&["C", "D"])),
/// ]);
/// let params = SelectionParams {
///     top_features: 10,
///     rare_features: 0,
///     min_feature_freq: 1,
///     max_select: 2,
///     weight: WeightPolicy::Uniform,
/// };
/// let result = DiversitySelector::new(params).select(&population);
/// let ids: Vec<&str> = result.selected.iter().map(|s| s.item.id.as_str()).collect();
/// assert_eq!(ids, vec!["a", "c"]);
/// assert_eq!(result.coverage_ratio(), 1.0);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct DiversitySelector {
    params: SelectionParams,
}

impl DiversitySelector {
    pub fn new(params: SelectionParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SelectionParams {
        &self.params
    }

    pub fn select(&self, population: &Population) -> SelectionResult {
        let target = TargetFeatures::build(&population.frequencies, &self.params);
        let mut covered: BTreeSet<String> = BTreeSet::new();
        let mut chosen: HashSet<&str> = HashSet::new();
        let mut selected = Vec::new();

        for round in 0..self.params.max_select {
            let mut best: Option<(&Item, Vec<String>, f64)> = None;

            // BTreeMap iteration is ascending by id; strict `>` keeps the
            // first (smallest) id on equal gain.
            for (id, (item, features)) in &population.items {
                if chosen.contains(id.as_str()) {
                    continue;
                }
                let new: Vec<String> = features
                    .iter()
                    .filter(|feature| target.contains(feature) && !covered.contains(*feature))
                    .cloned()
                    .collect();
                if new.is_empty() {
                    continue;
                }
                let gain: f64 = new.iter().map(|feature| target.weight(feature)).sum();
                let better = best
                    .as_ref()
                    .is_none_or(|(_, _, best_gain)| gain > *best_gain);
                if better {
                    best = Some((item, new, gain));
                }
            }

            let Some((item, new_features, gain)) = best else {
                debug!(round, "Coverage plateaued, stopping selection");
                break;
            };

            chosen.insert(item.id.as_str());
            covered.extend(new_features.iter().cloned());
            let total_features = population
                .items
                .get(&item.id)
                .map_or(0, |(_, features)| features.len());
            debug!(
                round,
                item = %item.id,
                gain,
                new = new_features.len(),
                covered = covered.len(),
                "Selected item"
            );
            selected.push(SelectedItem {
                item: item.clone(),
                new_features,
                gain,
                covered_after: covered.len(),
                total_features,
            });
        }

        let result = SelectionResult {
            selected,
            covered,
            target,
            items_scanned: population.len(),
            frequencies: population.frequencies.clone(),
        };
        info!(
            selected = result.selected.len(),
            covered = result.covered.len(),
            considered = result.target.len(),
            ratio = result.coverage_ratio(),
            "Diversity selection finished"
        );
        result
    }
}
