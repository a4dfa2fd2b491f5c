//! Data model for corpus items and run outcomes.
//!
//! Everything here is serializable with [`serde`] so that selection and run
//! artifacts can embed these values directly.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Set of opaque structural tags for one item, e.g. `class:article` or
/// `import:amsmath`.
///
/// Ordered so that iteration (and anything serialized from it) is stable.
pub type FeatureSet = BTreeSet<String>;

/// Exit code recorded when the runner kills a converter that outlived its
/// timeout. Mirrors the POSIX `timeout(1)` convention.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// One corpus entry.
///
/// The identifier names the item's run directory, so it must be unique within
/// a worklist. [`Item::from_path`] uses the final path component; worklists
/// that can repeat a name build ids with [`Item::with_id`]. Items are
/// immutable once discovered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub root: PathBuf,
}

impl Item {
    /// Builds an item from a directory or file path, deriving its identifier
    /// from the final path component.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let root = path.into();
        let id = item_id(&root);
        Self { id, root }
    }

    /// Builds an item with an explicit identifier.
    pub fn with_id(id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            root: root.into(),
        }
    }
}

fn item_id(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Document flavour held by a corpus.
///
/// Determines which files count as sources, how comments are marked and how
/// the converter is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Latex,
    Typst,
}

impl SourceKind {
    /// Source file extension, without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Latex => "tex",
            Self::Typst => "typ",
        }
    }

    /// Returns `true` if `path` has this kind's source extension
    /// (case-insensitive).
    pub fn is_source_file(self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(self.extension()))
    }

    /// Line-comment marker for this kind's sources.
    pub fn comment_marker(self) -> &'static str {
        match self {
            Self::Latex => "%",
            Self::Typst => "//",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latex => write!(f, "latex"),
            Self::Typst => write!(f, "typst"),
        }
    }
}

/// Weighting applied to each target feature during diversity selection.
///
/// `Log` and `Sqrt` damp ubiquitous features so that covering rarer ones
/// still pays off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightPolicy {
    Uniform,
    #[default]
    Log,
    Sqrt,
}

impl WeightPolicy {
    /// Weight for a feature observed in `frequency` items.
    pub fn weight(self, frequency: usize) -> f64 {
        let freq = frequency as f64;
        match self {
            Self::Uniform => 1.0,
            Self::Log => (freq + 1.0).log2(),
            Self::Sqrt => freq.sqrt(),
        }
    }
}

impl fmt::Display for WeightPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uniform => write!(f, "uniform"),
            Self::Log => write!(f, "log"),
            Self::Sqrt => write!(f, "sqrt"),
        }
    }
}

/// Why an item produced no conversion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No source file qualified as an entrypoint.
    NoEntrypoint,
    /// The per-item run directory or log could not be prepared.
    Io,
    /// The worker processing this item panicked.
    WorkerPanic,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoEntrypoint => write!(f, "no_entrypoint"),
            Self::Io => write!(f, "io"),
            Self::WorkerPanic => write!(f, "worker_panic"),
        }
    }
}

/// State of a diagnostic report after an attempted read.
///
/// `Missing` and `Malformed` both contribute zero losses; keeping them apart
/// from `Parsed` lets summaries tell "no losses found" from "no report".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Parsed,
    #[default]
    Missing,
    Malformed,
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parsed => write!(f, "parsed"),
            Self::Missing => write!(f, "missing"),
            Self::Malformed => write!(f, "malformed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_id_is_final_component() {
        let item = Item::from_path("/data/arxiv-corpus/2401.12345");
        assert_eq!(item.id, "2401.12345");
        assert_eq!(item.root, PathBuf::from("/data/arxiv-corpus/2401.12345"));

        let trailing = Item::from_path("corpus/paper-a/");
        assert_eq!(trailing.id, "paper-a");
    }

    #[test]
    fn test_source_kind_matches_extension_case_insensitively() {
        assert!(SourceKind::Latex.is_source_file(Path::new("a/Main.TeX")));
        assert!(!SourceKind::Latex.is_source_file(Path::new("a/main.typ")));
        assert!(SourceKind::Typst.is_source_file(Path::new("template.typ")));
        assert!(!SourceKind::Typst.is_source_file(Path::new("README")));
    }

    #[test]
    fn test_weight_policies() {
        assert_eq!(WeightPolicy::Uniform.weight(1000), 1.0);
        assert_eq!(WeightPolicy::Log.weight(1), 1.0);
        assert_eq!(WeightPolicy::Log.weight(7), 3.0);
        assert_eq!(WeightPolicy::Sqrt.weight(16), 4.0);
        for policy in [WeightPolicy::Uniform, WeightPolicy::Log, WeightPolicy::Sqrt] {
            assert!(policy.weight(1) > 0.0, "{policy} must be positive");
        }
    }

    #[test]
    fn test_skip_reason_display_matches_serde() {
        let reasons = [
            (SkipReason::NoEntrypoint, "no_entrypoint"),
            (SkipReason::Io, "io"),
            (SkipReason::WorkerPanic, "worker_panic"),
        ];

        for (reason, expected) in reasons {
            assert_eq!(reason.to_string(), expected);
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{expected}\""));
        }
    }

    #[test]
    fn test_report_status_and_kind_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&ReportStatus::Malformed).unwrap(),
            "\"malformed\""
        );
        let kind: SourceKind = serde_json::from_str("\"typst\"").unwrap();
        assert_eq!(kind, SourceKind::Typst);
        let weight: WeightPolicy = serde_json::from_str("\"sqrt\"").unwrap();
        assert_eq!(weight, WeightPolicy::Sqrt);
    }
}
