//! Writing the batch summary and its flattened loss table.

use std::io::Write;
use std::path::{Path, PathBuf};

use corpus_lab_core::{OutputFormat, write_artifact};
use serde::Serialize;

use crate::aggregate::RunSummary;
use crate::error::PipelineError;

/// Stem of the summary artifact; the extension follows the format.
pub const SUMMARY_STEM: &str = "summary";

/// File name of the flattened loss table.
pub const SUMMARY_CSV: &str = "summary.csv";

/// One row of the loss table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LossRow<'a> {
    pub stage: &'a str,
    pub loss: &'a str,
    pub total: usize,
    pub items: usize,
}

/// Rows in stage order, then rank order.
pub fn loss_rows(summary: &RunSummary) -> Vec<LossRow<'_>> {
    summary
        .stages
        .iter()
        .flat_map(|stage| {
            stage.losses.iter().map(|loss| LossRow {
                stage: &stage.stage,
                loss: &loss.loss,
                total: loss.total,
                items: loss.items,
            })
        })
        .collect()
}

/// Writes the loss table as CSV with a `stage,loss,total,items` header.
///
/// The header is written even when there are no rows.
pub fn write_loss_csv<W: Write>(summary: &RunSummary, writer: W) -> Result<(), PipelineError> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(["stage", "loss", "total", "items"])?;
    for row in loss_rows(summary) {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes `summary.<ext>` and `summary.csv` into `out_dir`.
///
/// Returns the path of the summary artifact.
pub fn write_summary(
    summary: &RunSummary,
    out_dir: &Path,
    format: OutputFormat,
) -> Result<PathBuf, PipelineError> {
    let artifact = out_dir.join(format!("{SUMMARY_STEM}.{}", format.extension()));
    write_artifact(&artifact, summary, format)?;

    let file = std::fs::File::create(out_dir.join(SUMMARY_CSV))?;
    write_loss_csv(summary, file)?;
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{ItemObservation, StageObservation, summarize};
    use corpus_lab_core::{ReportStatus, SourceKind};

    fn sample() -> RunSummary {
        let observe = |id: &str, counts: Vec<(&str, usize)>| ItemObservation {
            id: id.to_string(),
            dir: format!("corpus/{id}"),
            entrypoint: None,
            run_dir: format!("runs/{id}"),
            skipped: false,
            skip_reason: None,
            reused: false,
            stages: vec![StageObservation {
                stage: "l2t".to_string(),
                exit_code: Some(0),
                report: ReportStatus::Parsed,
                counts: counts
                    .into_iter()
                    .map(|(loss, count)| (loss.to_string(), count))
                    .collect(),
            }],
        };
        summarize(
            SourceKind::Latex,
            &["l2t".to_string()],
            vec![
                observe("A", vec![("X", 3), ("Y", 1)]),
                observe("B", vec![("X", 1)]),
            ],
        )
    }

    #[test]
    fn test_csv_rows_follow_rank() {
        let mut buf = Vec::new();
        write_loss_csv(&sample(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "stage,loss,total,items\nl2t,X,4,2\nl2t,Y,1,1\n");
    }

    #[test]
    fn test_csv_header_for_empty_summary() {
        let empty = summarize(SourceKind::Latex, &["l2t".to_string()], Vec::new());
        let mut buf = Vec::new();
        write_loss_csv(&empty, &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "stage,loss,total,items\n");
    }

    #[test]
    fn test_write_summary_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_summary(&sample(), dir.path(), OutputFormat::Json).unwrap();
        assert_eq!(path, dir.path().join("summary.json"));

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["kind"], "latex");
        assert_eq!(parsed["stages"][0]["losses"][0]["loss"], "X");
        assert_eq!(parsed["stages"][0]["metrics"]["items"], 2);
        assert!(dir.path().join(SUMMARY_CSV).exists());

        let yaml = write_summary(&sample(), dir.path(), OutputFormat::Yaml).unwrap();
        assert_eq!(yaml, dir.path().join("summary.yaml"));
    }
}
