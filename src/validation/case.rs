use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    cluster::coordinator::{Quorum, SessionPolicy},
    foundation::core::{CaseId, Fps, FrameIndex, NodeId},
    foundation::error::{StageCheckError, StageCheckResult},
    media::source::MediaHandle,
    sync::analyzer::SyncTolerance,
};

/// Production workflow a case applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Workflow {
    Icvfx,
    VrScouting,
    Simulcam,
    Vad,
}

impl Workflow {
    pub const ALL: [Workflow; 4] = [
        Workflow::Icvfx,
        Workflow::VrScouting,
        Workflow::Simulcam,
        Workflow::Vad,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Icvfx => "icvfx",
            Self::VrScouting => "vr_scouting",
            Self::Simulcam => "simulcam",
            Self::Vad => "vad",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|w| w.name() == s)
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pass/fail limits for one case.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToleranceProfile {
    /// Threshold on the comparator metric, in 8-bit code values (or Delta E).
    pub max_color_delta: f64,
    pub max_sync_skew_us: u64,
    pub max_dropped_frames: u32,
    pub capture_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub quorum: Quorum,
}

impl Default for ToleranceProfile {
    fn default() -> Self {
        Self {
            max_color_delta: 2.0,
            max_sync_skew_us: 1_000,
            max_dropped_frames: 0,
            capture_timeout_ms: 2_000,
            connect_timeout_ms: 5_000,
            quorum: Quorum::ALL,
        }
    }
}

impl ToleranceProfile {
    pub fn validate(&self) -> StageCheckResult<()> {
        if !self.max_color_delta.is_finite() || self.max_color_delta < 0.0 {
            return Err(StageCheckError::config(format!(
                "max_color_delta must be a non-negative number, got {}",
                self.max_color_delta
            )));
        }
        if self.capture_timeout_ms == 0 {
            return Err(StageCheckError::config("capture_timeout_ms must be > 0"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(StageCheckError::config("connect_timeout_ms must be > 0"));
        }
        Quorum::new(self.quorum.num, self.quorum.den)?;
        Ok(())
    }

    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            capture_timeout: Duration::from_millis(self.capture_timeout_ms),
            quorum: self.quorum,
        }
    }

    pub fn sync_tolerance(&self) -> SyncTolerance {
        SyncTolerance {
            max_skew: Duration::from_micros(self.max_sync_skew_us),
            max_dropped_frames: self.max_dropped_frames,
        }
    }
}

/// One unit of validation: play `media` on `nodes` at `timestamps` and check the output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationCase {
    pub id: CaseId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub media: MediaHandle,
    pub timestamps: Vec<FrameIndex>,
    #[serde(default)]
    pub tolerance: ToleranceProfile,
    pub nodes: Vec<NodeId>,
    /// Project frame rate the media must be compatible with.
    #[serde(default)]
    pub project_fps: Option<Fps>,
    /// Empty means the case applies to every workflow.
    #[serde(default)]
    pub workflows: Vec<Workflow>,
}

impl ValidationCase {
    pub fn new(
        id: impl Into<String>,
        media: MediaHandle,
        nodes: impl IntoIterator<Item = NodeId>,
        timestamps: impl IntoIterator<Item = u64>,
    ) -> Self {
        Self {
            id: CaseId::new(id),
            name: String::new(),
            description: String::new(),
            media,
            timestamps: timestamps.into_iter().map(FrameIndex).collect(),
            tolerance: ToleranceProfile::default(),
            nodes: nodes.into_iter().collect(),
            project_fps: None,
            workflows: Vec::new(),
        }
    }

    pub fn with_tolerance(mut self, tolerance: ToleranceProfile) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_project_fps(mut self, fps: Fps) -> Self {
        self.project_fps = Some(fps);
        self
    }

    pub fn with_workflows(mut self, workflows: impl IntoIterator<Item = Workflow>) -> Self {
        self.workflows = workflows.into_iter().collect();
        self
    }

    /// Name for reports; falls back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            self.id.as_str()
        } else {
            &self.name
        }
    }

    pub fn applies_to(&self, workflow: Workflow) -> bool {
        self.workflows.is_empty() || self.workflows.contains(&workflow)
    }

    /// Structural checks that need no media access.
    pub fn validate(&self) -> StageCheckResult<()> {
        let ctx = |msg: String| StageCheckError::config(format!("case '{}': {msg}", self.id));

        if self.id.as_str().trim().is_empty() {
            return Err(StageCheckError::config("case id must not be empty"));
        }
        if self.nodes.is_empty() {
            return Err(ctx("node set is empty".to_owned()));
        }
        let mut seen = BTreeSet::new();
        for n in &self.nodes {
            if !seen.insert(n) {
                return Err(ctx(format!("node '{n}' listed twice")));
            }
        }
        if self.timestamps.is_empty() {
            return Err(ctx("no timestamps".to_owned()));
        }
        if let Some(w) = self.timestamps.windows(2).find(|w| w[1] <= w[0]) {
            return Err(ctx(format!(
                "timestamps must strictly increase, got {} after {}",
                w[1].0, w[0].0
            )));
        }
        if let Some(fps) = self.project_fps {
            Fps::new(fps.num, fps.den).map_err(|e| ctx(format!("project_fps: {e}")))?;
        }
        self.tolerance.validate().map_err(|e| ctx(e.to_string()))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/validation/case.rs"]
mod tests;
