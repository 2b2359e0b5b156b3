use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    compare::comparator::ComparisonResult,
    foundation::core::{CaseId, NodeId},
    foundation::error::{StageCheckError, StageCheckResult},
    sync::analyzer::SyncReport,
};

/// Lifecycle of a [`ValidationRun`]: `Pending -> Running -> {Completed, Aborted, Cancelled}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Aborted,
    Cancelled,
}

impl RunState {
    pub fn is_final(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Cancelled)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseVerdict {
    Pass,
    Fail,
    Inconclusive,
    Aborted,
    Skipped,
    Cancelled,
}

impl CaseVerdict {
    pub fn name(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Inconclusive => "inconclusive",
            Self::Aborted => "aborted",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CaseVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunVerdict {
    Pass,
    Fail,
    Inconclusive,
}

impl RunVerdict {
    /// Fold case verdicts: any `Fail` fails the run; anything not `Pass` makes it inconclusive.
    pub fn aggregate<'a>(verdicts: impl IntoIterator<Item = &'a CaseVerdict>) -> Self {
        let mut out = Self::Pass;
        for v in verdicts {
            match v {
                CaseVerdict::Fail => return Self::Fail,
                CaseVerdict::Pass => {}
                _ => out = Self::Inconclusive,
            }
        }
        out
    }
}

/// How one node fared within a case.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeContribution {
    pub node: NodeId,
    pub verdict: CaseVerdict,
    pub frames_compared: u32,
    pub frames_failed: u32,
    pub frames_missing: u32,
    pub diagnostics: Vec<String>,
}

impl NodeContribution {
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            verdict: CaseVerdict::Inconclusive,
            frames_compared: 0,
            frames_failed: 0,
            frames_missing: 0,
            diagnostics: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaseReport {
    pub case: CaseId,
    pub name: String,
    pub description: String,
    pub verdict: CaseVerdict,
    /// Ordered by timestamp, then declared node order.
    pub comparisons: Vec<ComparisonResult>,
    pub sync: Option<SyncReport>,
    pub nodes: Vec<NodeContribution>,
    pub diagnostics: Vec<String>,
    pub warnings: Vec<String>,
}

impl CaseReport {
    pub fn new(case: CaseId, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            case,
            name: name.into(),
            description: description.into(),
            verdict: CaseVerdict::Inconclusive,
            comparisons: Vec::new(),
            sync: None,
            nodes: Vec::new(),
            diagnostics: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn skipped(case: CaseId, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            verdict: CaseVerdict::Skipped,
            ..Self::new(case, name, description)
        }
    }

    pub fn node(&self, node: &NodeId) -> Option<&NodeContribution> {
        self.nodes.iter().find(|c| &c.node == node)
    }

    /// One-line summary used in report rows.
    pub fn message(&self) -> String {
        if let Some(first) = self.diagnostics.first() {
            return first.clone();
        }
        match self.verdict {
            CaseVerdict::Pass => {
                let frames = self.comparisons.len();
                if self.warnings.is_empty() {
                    format!("{frames} frame comparisons within tolerance")
                } else {
                    format!(
                        "{frames} frame comparisons within tolerance, {} warning(s)",
                        self.warnings.len()
                    )
                }
            }
            CaseVerdict::Skipped => "not executed".to_owned(),
            other => other.name().to_owned(),
        }
    }
}

/// Flattened report line: `(name, description, result, message)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    pub name: String,
    pub description: String,
    pub result: String,
    pub message: String,
}

/// Aggregate of every case executed in one run.
///
/// Finalized exactly once; a finalized run rejects further mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationRun {
    state: RunState,
    verdict: Option<RunVerdict>,
    cases: Vec<CaseReport>,
    abort_reason: Option<String>,
}

impl Default for ValidationRun {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationRun {
    pub fn new() -> Self {
        Self {
            state: RunState::Pending,
            verdict: None,
            cases: Vec::new(),
            abort_reason: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// `None` until finalized.
    pub fn verdict(&self) -> Option<RunVerdict> {
        self.verdict
    }

    pub fn cases(&self) -> &[CaseReport] {
        &self.cases
    }

    pub fn case(&self, id: &CaseId) -> Option<&CaseReport> {
        self.cases.iter().find(|c| &c.case == id)
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    pub fn is_finalized(&self) -> bool {
        self.state.is_final()
    }

    pub fn start(&mut self) -> StageCheckResult<()> {
        if self.state != RunState::Pending {
            return Err(StageCheckError::run_state(format!(
                "cannot start a run in state {:?}",
                self.state
            )));
        }
        self.state = RunState::Running;
        Ok(())
    }

    pub fn record(&mut self, report: CaseReport) -> StageCheckResult<()> {
        if self.state != RunState::Running {
            return Err(StageCheckError::run_state(format!(
                "cannot record case '{}' in state {:?}",
                report.case, self.state
            )));
        }
        self.cases.push(report);
        Ok(())
    }

    /// Freeze the run in `outcome` and compute its verdict.
    pub fn finalize(&mut self, outcome: RunState, reason: Option<String>) -> StageCheckResult<()> {
        if self.state.is_final() {
            return Err(StageCheckError::run_state(format!(
                "run already finalized as {:?}",
                self.state
            )));
        }
        if !outcome.is_final() {
            return Err(StageCheckError::run_state(format!(
                "{outcome:?} is not a final state"
            )));
        }
        if self.state != RunState::Running {
            return Err(StageCheckError::run_state(format!(
                "cannot finalize a run in state {:?}",
                self.state
            )));
        }
        self.state = outcome;
        self.abort_reason = reason;
        self.verdict = Some(RunVerdict::aggregate(self.cases.iter().map(|c| &c.verdict)));
        Ok(())
    }

    /// Flattened rows in case order; empty until the run is finalized.
    pub fn report_rows(&self) -> Vec<ReportRow> {
        if !self.is_finalized() {
            return Vec::new();
        }
        self.cases
            .iter()
            .map(|c| ReportRow {
                name: c.name.clone(),
                description: c.description.clone(),
                result: c.verdict.name().to_owned(),
                message: c.message(),
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/validation/run.rs"]
mod tests;
