//! Serializable selection artifact.

use std::collections::BTreeMap;

use corpus_lab_core::{SourceKind, WeightPolicy};
use serde::{Deserialize, Serialize};

use crate::select::SelectionResult;

/// Number of common/rare frequency pairs echoed in the artifact header.
pub const FREQUENCY_PREVIEW_LEN: usize = 50;

/// One selected item as written to the artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionEntry {
    pub id: String,
    /// Item path, as listed under the corpus root.
    pub dir: String,
    pub new_features: Vec<String>,
    pub new_feature_count: usize,
    pub total_features: usize,
    pub gain: f64,
    /// Covered target features after this pick.
    pub covered_after: usize,
}

/// Selection artifact consumed by pipeline worklists.
///
/// Contains no timestamps so identical inputs render to identical bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionReport {
    pub corpus_dir: String,
    pub kind: SourceKind,
    pub weight: WeightPolicy,
    pub items_scanned: usize,
    pub features_total: usize,
    pub features_considered: usize,
    pub selected_count: usize,
    pub covered_count: usize,
    pub coverage_ratio: f64,
    pub feature_frequencies_top: Vec<(String, usize)>,
    pub feature_frequencies_rare: Vec<(String, usize)>,
    /// Complete frequency table for offline inspection.
    pub feature_frequencies: BTreeMap<String, usize>,
    pub selected: Vec<SelectionEntry>,
}

impl SelectionReport {
    pub fn build(
        corpus_dir: &str,
        kind: SourceKind,
        weight: WeightPolicy,
        result: &SelectionResult,
    ) -> Self {
        let selected = result
            .selected
            .iter()
            .map(|pick| SelectionEntry {
                id: pick.item.id.clone(),
                dir: pick.item.root.display().to_string(),
                new_features: pick.new_features.clone(),
                new_feature_count: pick.new_features.len(),
                total_features: pick.total_features,
                gain: pick.gain,
                covered_after: pick.covered_after,
            })
            .collect::<Vec<_>>();

        Self {
            corpus_dir: corpus_dir.to_string(),
            kind,
            weight,
            items_scanned: result.items_scanned,
            features_total: result.frequencies.len(),
            features_considered: result.target.len(),
            selected_count: selected.len(),
            covered_count: result.covered.len(),
            coverage_ratio: result.coverage_ratio(),
            feature_frequencies_top: preview(&result.target.common),
            feature_frequencies_rare: preview(&result.target.rare),
            feature_frequencies: result.frequencies.clone(),
            selected,
        }
    }
}

fn preview(pairs: &[(String, usize)]) -> Vec<(String, usize)> {
    pairs.iter().take(FREQUENCY_PREVIEW_LEN).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Population;
    use crate::select::{DiversitySelector, SelectionParams};
    use corpus_lab_core::{FeatureSet, Item};

    fn population() -> Population {
        let set = |tags: [&str; 2]| tags.iter().map(|t| t.to_string()).collect::<FeatureSet>();
        Population::from_features(vec![
            (Item::from_path("corpus/a"), set(["class:article", "import:amsmath"])),
            (Item::from_path("corpus/b"), set(["class:article", "import:tikz"])),
        ])
    }

    #[test]
    fn test_report_fields() {
        let params = SelectionParams {
            min_feature_freq: 1,
            ..SelectionParams::default()
        };
        let result = DiversitySelector::new(params).select(&population());
        let report = SelectionReport::build("corpus", SourceKind::Latex, params.weight, &result);

        assert_eq!(report.items_scanned, 2);
        assert_eq!(report.features_total, 3);
        assert_eq!(report.features_considered, 3);
        assert_eq!(report.selected_count, 2);
        assert_eq!(report.covered_count, 3);
        assert_eq!(report.coverage_ratio, 1.0);
        assert_eq!(report.feature_frequencies.get("class:article"), Some(&2));
        assert_eq!(report.feature_frequencies_top[0], ("class:article".to_string(), 2));
        assert_eq!(report.selected[0].dir, "corpus/a");
        assert_eq!(report.selected[0].new_feature_count, 2);
        assert_eq!(report.selected[1].new_features, vec!["import:tikz"]);
    }

    #[test]
    fn test_report_serializes_identically_across_runs() {
        let params = SelectionParams {
            min_feature_freq: 1,
            ..SelectionParams::default()
        };
        let render = || {
            let result = DiversitySelector::new(params).select(&population());
            let report = SelectionReport::build("corpus", SourceKind::Latex, params.weight, &result);
            serde_json::to_string_pretty(&report).unwrap()
        };
        assert_eq!(render(), render());
    }

    #[test]
    fn test_frequency_pairs_serialize_as_arrays() {
        let result = DiversitySelector::new(SelectionParams::default()).select(&population());
        let report = SelectionReport::build("corpus", SourceKind::Latex, WeightPolicy::Log, &result);
        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["feature_frequencies_top"][0][0], "class:article");
        assert_eq!(json["feature_frequencies_top"][0][1], 2);
        assert_eq!(json["kind"], "latex");
    }
}
