//! Converter loss reports.
//!
//! A report is a JSON object whose `losses` array lists every construct the
//! converter dropped or approximated. Readers here never fail: a missing or
//! unparsable report reads as zero losses with a [`ReportStatus`] that says
//! why.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use corpus_lab_core::ReportStatus;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Per-loss-name counts for one report.
pub type LossCounts = BTreeMap<String, usize>;

/// Key for entries that carry neither a name nor a kind.
pub const UNKNOWN_LOSS: &str = "unknown";

/// One lossy construct reported by the converter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LossEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Everything else the converter attached (messages, spans, snippets).
    #[serde(flatten)]
    pub metadata: BTreeMap<String, Value>,
}

/// Renders a `name`/`kind` field as a key. Blank strings, zero, `false`,
/// null and containers count as absent; other scalars use their JSON text.
fn entry_label(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Number(number) if number.as_f64() != Some(0.0) => Some(number.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

impl LossEntry {
    /// Builds an entry from arbitrary JSON.
    ///
    /// Numeric and boolean `name`/`kind` fields become their JSON text. Blank,
    /// zero and structured values are treated as absent, and non-object
    /// values become an entry with no name.
    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };
        let metadata: BTreeMap<String, Value> = object
            .iter()
            .filter(|(key, _)| key.as_str() != "name" && key.as_str() != "kind")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Self {
            name: entry_label(object.get("name")),
            kind: entry_label(object.get("kind")),
            metadata,
        }
    }

    /// Aggregation key: the name, else the kind, else `"unknown"`.
    pub fn key(&self) -> &str {
        self.name
            .as_deref()
            .or(self.kind.as_deref())
            .unwrap_or(UNKNOWN_LOSS)
    }
}

/// A parsed loss report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LossReport {
    #[serde(default)]
    pub losses: Vec<LossEntry>,
}

impl LossReport {
    /// Parses report JSON.
    ///
    /// A missing `losses` key is an empty report. A top level that is not an
    /// object, or a `losses` value that is not an array, is an error.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let top: Map<String, Value> = serde_json::from_str(raw)?;
        let losses = match top.get("losses") {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => {
                let entries: Vec<Value> = serde_json::from_value(value.clone())?;
                entries.iter().map(LossEntry::from_value).collect()
            }
        };
        Ok(Self { losses })
    }

    /// Occurrence count per [`LossEntry::key`].
    pub fn counts(&self) -> LossCounts {
        let mut counts = LossCounts::new();
        for entry in &self.losses {
            *counts.entry(entry.key().to_string()).or_default() += 1;
        }
        counts
    }
}

/// Outcome of reading one report file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportRead {
    pub status: ReportStatus,
    pub counts: LossCounts,
}

impl ReportRead {
    /// Total loss occurrences.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

/// Reads and counts the report at `path`.
pub fn read_report(path: &Path) -> ReportRead {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return ReportRead {
                status: ReportStatus::Missing,
                counts: LossCounts::new(),
            };
        }
        Err(err) => {
            debug!(path = %path.display(), error = %err, "Unreadable loss report");
            return ReportRead {
                status: ReportStatus::Malformed,
                counts: LossCounts::new(),
            };
        }
    };
    match LossReport::parse(&raw) {
        Ok(report) => ReportRead {
            status: ReportStatus::Parsed,
            counts: report.counts(),
        },
        Err(err) => {
            debug!(path = %path.display(), error = %err, "Malformed loss report");
            ReportRead {
                status: ReportStatus::Malformed,
                counts: LossCounts::new(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_precedence() {
        let report = LossReport::parse(
            r#"{"losses": [
                {"name": "tikz", "kind": "figure"},
                {"kind": "macro", "message": "dropped \\foo"},
                {"message": "no label"},
                {"name": "  ", "kind": "spacing"},
                {"name": ["list"], "kind": "table"},
                "bare string"
            ]}"#,
        )
        .unwrap();

        let keys: Vec<&str> = report.losses.iter().map(LossEntry::key).collect();
        assert_eq!(
            keys,
            vec!["tikz", "macro", "unknown", "spacing", "table", "unknown"]
        );
        assert_eq!(
            report.losses[1].metadata.get("message"),
            Some(&Value::String("dropped \\foo".into()))
        );
    }

    #[test]
    fn test_scalar_names_use_json_text() {
        let report = LossReport::parse(
            r#"{"losses": [
                {"name": 42},
                {"name": 1.5},
                {"name": true},
                {"name": 0, "kind": 7},
                {"name": false, "kind": null}
            ]}"#,
        )
        .unwrap();

        let keys: Vec<&str> = report.losses.iter().map(LossEntry::key).collect();
        assert_eq!(keys, vec!["42", "1.5", "true", "7", "unknown"]);
        assert_eq!(report.counts().get("42"), Some(&1));
    }

    #[test]
    fn test_counts_per_key() {
        let report = LossReport::parse(
            r#"{"losses": [{"name": "X"}, {"name": "X"}, {"name": "Y"}, {"name": "X"}]}"#,
        )
        .unwrap();
        let counts = report.counts();
        assert_eq!(counts.get("X"), Some(&3));
        assert_eq!(counts.get("Y"), Some(&1));
    }

    #[test]
    fn test_parse_shapes() {
        assert!(LossReport::parse("{}").unwrap().losses.is_empty());
        assert!(LossReport::parse(r#"{"losses": null}"#).unwrap().losses.is_empty());
        assert!(LossReport::parse("[]").is_err());
        assert!(LossReport::parse(r#"{"losses": "many"}"#).is_err());
        assert!(LossReport::parse("{not json").is_err());
    }

    #[test]
    fn test_read_report_statuses() {
        let dir = tempfile::tempdir().unwrap();

        let missing = read_report(&dir.path().join("absent.json"));
        assert_eq!(missing.status, ReportStatus::Missing);
        assert_eq!(missing.total(), 0);

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{\"losses\": [").unwrap();
        let malformed = read_report(&bad);
        assert_eq!(malformed.status, ReportStatus::Malformed);
        assert!(malformed.counts.is_empty());

        let good = dir.path().join("good.json");
        fs::write(&good, r#"{"losses": [{"name": "A"}, {"kind": "B"}]}"#).unwrap();
        let parsed = read_report(&good);
        assert_eq!(parsed.status, ReportStatus::Parsed);
        assert_eq!(parsed.total(), 2);
    }

    #[test]
    fn test_entry_serializes_flat() {
        let entry = LossEntry::from_value(&serde_json::json!({"name": "n", "line": 3}));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json, serde_json::json!({"name": "n", "line": 3}));
    }
}
