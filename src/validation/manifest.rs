use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{
    cluster::{
        coordinator::{CoordinatorOpts, Quorum},
        simulated::{SimNodeSpec, SimulatedCluster},
    },
    compare::comparator::ComparatorOpts,
    foundation::core::{CaseId, Fps, FrameIndex, NodeId},
    foundation::error::{StageCheckError, StageCheckResult},
    media::source::MediaHandle,
    validation::{
        case::{ToleranceProfile, ValidationCase, Workflow},
        orchestrator::OrchestratorOpts,
    },
};

/// Per-case tolerance fields; unset fields inherit the manifest defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToleranceOverrides {
    pub max_color_delta: Option<f64>,
    pub max_sync_skew_us: Option<u64>,
    pub max_dropped_frames: Option<u32>,
    pub capture_timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub quorum: Option<Quorum>,
}

impl ToleranceOverrides {
    pub fn apply(&self, base: &ToleranceProfile) -> ToleranceProfile {
        ToleranceProfile {
            max_color_delta: self.max_color_delta.unwrap_or(base.max_color_delta),
            max_sync_skew_us: self.max_sync_skew_us.unwrap_or(base.max_sync_skew_us),
            max_dropped_frames: self.max_dropped_frames.unwrap_or(base.max_dropped_frames),
            capture_timeout_ms: self.capture_timeout_ms.unwrap_or(base.capture_timeout_ms),
            connect_timeout_ms: self.connect_timeout_ms.unwrap_or(base.connect_timeout_ms),
            quorum: self.quorum.unwrap_or(base.quorum),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestCase {
    pub id: CaseId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub media: MediaHandle,
    pub timestamps: Vec<FrameIndex>,
    pub nodes: Vec<NodeId>,
    #[serde(default)]
    pub tolerance: ToleranceOverrides,
    #[serde(default)]
    pub project_fps: Option<Fps>,
    #[serde(default)]
    pub workflows: Vec<Workflow>,
}

/// Rehearsal cluster played back in-process instead of real render nodes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulatedClusterSpec {
    pub nodes: Vec<SimNodeSpec>,
}

/// JSON run description loaded by the CLI.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    /// Relative paths are resolved against the manifest's directory by [`RunManifest::load`].
    #[serde(default)]
    pub media_root: Option<PathBuf>,
    #[serde(default)]
    pub comparator: ComparatorOpts,
    #[serde(default)]
    pub defaults: ToleranceProfile,
    #[serde(default)]
    pub workflow: Option<Workflow>,
    #[serde(default)]
    pub cluster: Option<SimulatedClusterSpec>,
    pub cases: Vec<ManifestCase>,
}

impl RunManifest {
    pub fn from_json(json: &str) -> StageCheckResult<Self> {
        serde_json::from_str(json).map_err(|e| StageCheckError::serde(e.to_string()))
    }

    pub fn load(path: &Path) -> StageCheckResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read manifest '{}'", path.display()))?;
        let mut manifest = Self::from_json(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        manifest.media_root = Some(match manifest.media_root.take() {
            Some(root) if root.is_relative() => base.join(root),
            Some(root) => root,
            None => base.to_path_buf(),
        });
        Ok(manifest)
    }

    pub fn cases(&self) -> Vec<ValidationCase> {
        self.cases
            .iter()
            .map(|c| ValidationCase {
                id: c.id.clone(),
                name: c.name.clone(),
                description: c.description.clone(),
                media: c.media.clone(),
                timestamps: c.timestamps.clone(),
                tolerance: c.tolerance.apply(&self.defaults),
                nodes: c.nodes.clone(),
                project_fps: c.project_fps,
                workflows: c.workflows.clone(),
            })
            .collect()
    }

    /// Checks that span cases and the cluster description. Per-case checks run at run start.
    pub fn validate(&self) -> StageCheckResult<()> {
        if self.cases.is_empty() {
            return Err(StageCheckError::config("manifest has no cases"));
        }
        self.defaults
            .validate()
            .map_err(|e| StageCheckError::config(format!("defaults: {e}")))?;

        let Some(cluster) = &self.cluster else {
            return Ok(());
        };
        let mut declared = BTreeSet::new();
        for node in &cluster.nodes {
            if !declared.insert(&node.id) {
                return Err(StageCheckError::config(format!(
                    "cluster node '{}' declared twice",
                    node.id
                )));
            }
        }
        for case in &self.cases {
            if let Some(missing) = case.nodes.iter().find(|n| !declared.contains(n)) {
                return Err(StageCheckError::config(format!(
                    "case '{}': node '{missing}' is not part of the cluster",
                    case.id
                )));
            }
        }
        Ok(())
    }

    pub fn orchestrator_opts(&self, workflow: Option<Workflow>) -> OrchestratorOpts {
        OrchestratorOpts {
            media_root: self.media_root.clone().unwrap_or_else(|| PathBuf::from(".")),
            comparator: self.comparator.clone(),
            coordinator: CoordinatorOpts::default(),
            workflow: workflow.or(self.workflow),
        }
    }

    pub fn simulated_cluster(&self) -> Option<SimulatedCluster> {
        self.cluster
            .as_ref()
            .map(|c| SimulatedCluster::new(c.nodes.iter().cloned()))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/validation/manifest.rs"]
mod tests;
