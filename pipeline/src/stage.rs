//! Converter stages and the per-kind stage chain.

use std::ffi::OsString;
use std::fmt;
use std::path::Path;

use corpus_lab_core::SourceKind;
use serde::{Deserialize, Serialize};

/// Conversion direction passed to the converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// LaTeX to Typst.
    L2t,
    /// Typst to LaTeX.
    T2l,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::L2t => write!(f, "l2t"),
            Self::T2l => write!(f, "t2l"),
        }
    }
}

/// One converter invocation in an item's chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSpec {
    /// Stable name used in summaries and run stamps.
    pub name: &'static str,
    pub direction: Direction,
    /// Route the conversion through the intermediate representation.
    pub ir: bool,
    /// Converted document, relative to the run directory.
    pub output_file: &'static str,
    /// Loss report, relative to the run directory.
    pub report_file: &'static str,
}

const LATEX_TO_TYPST: StageSpec = StageSpec {
    name: "l2t",
    direction: Direction::L2t,
    ir: false,
    output_file: "out.typ",
    report_file: "l2t_loss.json",
};

const TYPST_TO_LATEX: StageSpec = StageSpec {
    name: "t2l_ir",
    direction: Direction::T2l,
    ir: true,
    output_file: "out.tex",
    report_file: "t2l_ir_loss.json",
};

const TYPST_ROUNDTRIP: StageSpec = StageSpec {
    name: "l2t",
    direction: Direction::L2t,
    ir: false,
    output_file: "roundtrip.typ",
    report_file: "l2t_loss.json",
};

impl StageSpec {
    /// Converter arguments for this stage.
    ///
    /// `input` is relative to the converter's working directory; `output`
    /// and `report` should be absolute.
    pub fn args(&self, input: &Path, output: &Path, report: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            input.into(),
            "--full-document".into(),
            "--direction".into(),
            self.direction.to_string().into(),
        ];
        if self.ir {
            args.push("--ir".into());
        }
        args.push("--output".into());
        args.push(output.into());
        args.push("--loss-log".into());
        args.push(report.into());
        args
    }
}

/// Ordered stages for `kind`.
///
/// The forward stage always runs; the reverse stage is appended when
/// `reverse` is set and consumes the forward stage's output.
pub fn stage_plan(kind: SourceKind, reverse: bool) -> Vec<StageSpec> {
    let (forward, back) = match kind {
        SourceKind::Latex => (LATEX_TO_TYPST, TYPST_TO_LATEX),
        SourceKind::Typst => (TYPST_TO_LATEX, TYPST_ROUNDTRIP),
    };
    if reverse {
        vec![forward, back]
    } else {
        vec![forward]
    }
}

/// Stage names in plan order.
pub fn stage_names(plan: &[StageSpec]) -> Vec<String> {
    plan.iter().map(|stage| stage.name.to_string()).collect()
}
