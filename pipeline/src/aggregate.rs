//! Loss aggregation and ranking across a batch.
//!
//! [`ItemObservation`] is the per-item input: what each stage exited with
//! and what its report said. [`summarize`] is a pure reduction over
//! observations, so it yields identical output for identical input in any
//! order.

use std::collections::{BTreeMap, BTreeSet};

use corpus_lab_core::{ReportStatus, SkipReason, SourceKind};
use serde::{Deserialize, Serialize};

use crate::loss::{LossCounts, read_report};
use crate::runner::RunResult;

/// Example items listed per ranked loss.
pub const EXAMPLE_ITEMS: usize = 5;

/// Items listed in each stage's worst-offender table.
pub const WORST_ITEMS: usize = 20;

/// One stage as seen for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageObservation {
    pub stage: String,
    pub exit_code: Option<i32>,
    pub report: ReportStatus,
    pub counts: LossCounts,
}

/// Everything the aggregator needs to know about one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemObservation {
    pub id: String,
    pub dir: String,
    pub entrypoint: Option<String>,
    pub run_dir: String,
    pub skipped: bool,
    pub skip_reason: Option<SkipReason>,
    pub reused: bool,
    pub stages: Vec<StageObservation>,
}

impl ItemObservation {
    /// Reads every stage report of a run result.
    ///
    /// Skipped items have no reports worth reading and record `Missing`.
    pub fn from_run(result: &RunResult) -> Self {
        let stages = result
            .stages
            .iter()
            .map(|stage| {
                let read = if result.skipped {
                    Default::default()
                } else {
                    read_report(&stage.report_path)
                };
                StageObservation {
                    stage: stage.stage.clone(),
                    exit_code: stage.exit_code,
                    report: read.status,
                    counts: read.counts,
                }
            })
            .collect();
        Self {
            id: result.item.id.clone(),
            dir: result.item.root.display().to_string(),
            entrypoint: result
                .entrypoint
                .as_ref()
                .map(|path| path.display().to_string()),
            run_dir: result.run_dir.display().to_string(),
            skipped: result.skipped,
            skip_reason: result.skip_reason,
            reused: result.reused,
            stages,
        }
    }
}

/// One loss name, ranked by how many items it touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedLoss {
    pub loss: String,
    /// Occurrences across all items.
    pub total: usize,
    /// Distinct items with at least one occurrence.
    pub items: usize,
    /// Up to [`EXAMPLE_ITEMS`] affected item ids, ascending.
    pub example_items: Vec<String>,
}

/// Distribution of per-item loss totals for one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossMetrics {
    /// Items that were not skipped.
    pub items: usize,
    pub zero: usize,
    pub lte_5: usize,
    pub lte_10: usize,
    pub mean: f64,
    pub max: usize,
    /// Items whose report was missing or malformed.
    pub missing_reports: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorstItem {
    pub id: String,
    pub losses: usize,
    pub run_dir: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: String,
    pub losses: Vec<RankedLoss>,
    pub metrics: LossMetrics,
    pub worst_items: Vec<WorstItem>,
}

/// Per-stage figures for one item in the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStageSummary {
    pub stage: String,
    pub exit_code: Option<i32>,
    pub losses: usize,
    pub report: ReportStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub id: String,
    pub dir: String,
    pub entrypoint: Option<String>,
    pub run_dir: String,
    pub skipped: bool,
    pub skip_reason: Option<SkipReason>,
    pub reused: bool,
    pub stages: Vec<ItemStageSummary>,
}

/// The batch artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub kind: SourceKind,
    pub items: Vec<ItemSummary>,
    pub stages: Vec<StageSummary>,
    /// Skipped item count per reason.
    pub skipped: BTreeMap<String, usize>,
}

impl RunSummary {
    pub fn stage(&self, name: &str) -> Option<&StageSummary> {
        self.stages.iter().find(|stage| stage.stage == name)
    }

    /// Items that were not skipped.
    pub fn processed(&self) -> usize {
        self.items.iter().filter(|item| !item.skipped).count()
    }
}

/// Orders ranked losses by affected items desc, occurrences desc, name asc.
pub fn rank_losses(losses: &mut [RankedLoss]) {
    losses.sort_by(|a, b| {
        b.items
            .cmp(&a.items)
            .then_with(|| b.total.cmp(&a.total))
            .then_with(|| a.loss.cmp(&b.loss))
    });
}

#[derive(Default)]
struct StageTally {
    totals: BTreeMap<String, usize>,
    affected: BTreeMap<String, BTreeSet<String>>,
    per_item: Vec<(String, usize, String)>,
    missing_reports: usize,
}

impl StageTally {
    fn observe(&mut self, id: &str, run_dir: &str, stage: &StageObservation) {
        let mut item_total = 0;
        for (loss, count) in &stage.counts {
            *self.totals.entry(loss.clone()).or_default() += count;
            if *count > 0 {
                self.affected
                    .entry(loss.clone())
                    .or_default()
                    .insert(id.to_string());
            }
            item_total += count;
        }
        if stage.report != ReportStatus::Parsed {
            self.missing_reports += 1;
        }
        self.per_item
            .push((id.to_string(), item_total, run_dir.to_string()));
    }

    fn finish(self, stage: String) -> StageSummary {
        let mut losses: Vec<RankedLoss> = self
            .totals
            .into_iter()
            .map(|(loss, total)| {
                let affected = self.affected.get(&loss);
                RankedLoss {
                    items: affected.map_or(0, BTreeSet::len),
                    example_items: affected
                        .map(|ids| ids.iter().take(EXAMPLE_ITEMS).cloned().collect())
                        .unwrap_or_default(),
                    loss,
                    total,
                }
            })
            .collect();
        rank_losses(&mut losses);

        let items = self.per_item.len();
        let sum: usize = self.per_item.iter().map(|(_, total, _)| total).sum();
        let metrics = LossMetrics {
            items,
            zero: self.per_item.iter().filter(|(_, t, _)| *t == 0).count(),
            lte_5: self.per_item.iter().filter(|(_, t, _)| *t <= 5).count(),
            lte_10: self.per_item.iter().filter(|(_, t, _)| *t <= 10).count(),
            mean: if items == 0 { 0.0 } else { sum as f64 / items as f64 },
            max: self.per_item.iter().map(|(_, t, _)| *t).max().unwrap_or(0),
            missing_reports: self.missing_reports,
        };

        let mut worst: Vec<WorstItem> = self
            .per_item
            .into_iter()
            .filter(|(_, total, _)| *total > 0)
            .map(|(id, losses, run_dir)| WorstItem {
                id,
                losses,
                run_dir,
            })
            .collect();
        worst.sort_by(|a, b| b.losses.cmp(&a.losses).then_with(|| a.id.cmp(&b.id)));
        worst.truncate(WORST_ITEMS);

        StageSummary {
            stage,
            losses,
            metrics,
            worst_items: worst,
        }
    }
}

/// Reduces observations into a [`RunSummary`].
///
/// `stage_names` fixes which stages appear and in what order. Skipped items
/// appear in `items` and `skipped` but contribute nothing to stage figures.
///
/// # Examples
///
/// ```
/// use corpus_lab_core::{ReportStatus, SourceKind};
/// use corpus_lab_pipeline::aggregate::{ItemObservation, StageObservation, summarize};
///
/// fn observe(id: &str, counts: &[(&str, usize)]) -> ItemObservation {
///     ItemObservation {
///         id: id.to_string(),
///         dir: format!("corpus/{id}"),
///         entrypoint: None,
///         run_dir: format!("runs/{id}"),
///         skipped: false,
///         skip_reason: None,
///         reused: false,
///         stages: vec![StageObservation {
///             stage: "l2t".to_string(),
///             exit_code: Some(0),
///             report: ReportStatus::Parsed,
///             counts: counts.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
///         }],
///     }
/// }
///
/// let summary = summarize(
///     SourceKind::Latex,
///     &["l2t".to_string()],
///     vec![observe("A", &[("X", 3), ("Y", 1)]), observe("B", &[("X", 1)])],
/// );
/// let top = &summary.stages[0].losses[0];
/// assert_eq!((top.loss.as_str(), top.total, top.items), ("X", 4, 2));
/// ```
pub fn summarize(
    kind: SourceKind,
    stage_names: &[String],
    mut observations: Vec<ItemObservation>,
) -> RunSummary {
    observations.sort_by(|a, b| a.id.cmp(&b.id));

    let mut tallies: Vec<StageTally> = stage_names.iter().map(|_| StageTally::default()).collect();
    let mut skipped: BTreeMap<String, usize> = BTreeMap::new();
    let mut items = Vec::with_capacity(observations.len());

    for observation in observations {
        if observation.skipped {
            let reason = observation
                .skip_reason
                .map(|reason| reason.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            *skipped.entry(reason).or_default() += 1;
        } else {
            for (name, tally) in stage_names.iter().zip(tallies.iter_mut()) {
                let stage = observation
                    .stages
                    .iter()
                    .find(|stage| &stage.stage == name)
                    .cloned()
                    .unwrap_or_else(|| StageObservation {
                        stage: name.clone(),
                        exit_code: None,
                        report: ReportStatus::Missing,
                        counts: LossCounts::new(),
                    });
                tally.observe(&observation.id, &observation.run_dir, &stage);
            }
        }

        items.push(ItemSummary {
            stages: observation
                .stages
                .iter()
                .map(|stage| ItemStageSummary {
                    stage: stage.stage.clone(),
                    exit_code: stage.exit_code,
                    losses: stage.counts.values().sum(),
                    report: stage.report,
                })
                .collect(),
            id: observation.id,
            dir: observation.dir,
            entrypoint: observation.entrypoint,
            run_dir: observation.run_dir,
            skipped: observation.skipped,
            skip_reason: observation.skip_reason,
            reused: observation.reused,
        });
    }

    let stages = stage_names
        .iter()
        .cloned()
        .zip(tallies)
        .map(|(name, tally)| tally.finish(name))
        .collect();

    RunSummary {
        kind,
        items,
        stages,
        skipped,
    }
}

/// Reads every run's reports and summarizes the batch.
pub fn aggregate(kind: SourceKind, stage_names: &[String], results: &[RunResult]) -> RunSummary {
    let observations = results.iter().map(ItemObservation::from_run).collect();
    summarize(kind, stage_names, observations)
}
