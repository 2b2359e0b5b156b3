use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::{
    foundation::error::{StageCheckError, StageCheckResult},
    validation::run::ValidationRun,
};

/// Receives the finished run.
///
/// `emit` is called once per run, after finalization, with the full ordered snapshot.
pub trait ReportSink: Send {
    fn emit(&mut self, run: &ValidationRun) -> StageCheckResult<()>;
}

/// In-memory sink for tests and debugging.
#[derive(Debug, Default)]
pub struct InMemoryReportSink {
    /// Runs in emission order.
    pub runs: Vec<ValidationRun>,
}

impl InMemoryReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&ValidationRun> {
        self.runs.last()
    }
}

impl ReportSink for InMemoryReportSink {
    fn emit(&mut self, run: &ValidationRun) -> StageCheckResult<()> {
        self.runs.push(run.clone());
        Ok(())
    }
}

/// Writes the run as pretty-printed JSON, replacing any existing file.
#[derive(Debug, Clone)]
pub struct JsonReportSink {
    path: PathBuf,
}

impl JsonReportSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportSink for JsonReportSink {
    fn emit(&mut self, run: &ValidationRun) -> StageCheckResult<()> {
        if !run.is_finalized() {
            return Err(StageCheckError::run_state("cannot emit a run that is not finalized"));
        }
        let json =
            serde_json::to_vec_pretty(run).map_err(|e| StageCheckError::serde(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create report dir '{}'", parent.display()))?;
        }
        std::fs::write(&self.path, json)
            .with_context(|| format!("write report '{}'", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/validation/report.rs"]
mod tests;
