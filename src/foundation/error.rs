use std::time::Duration;

use crate::foundation::core::{CaseId, FrameIndex, NodeId};

/// Convenience result alias used throughout the crate.
pub type StageCheckResult<T> = Result<T, StageCheckError>;

/// Errors produced while validating media playback across a cluster.
///
/// Per-node and per-frame variants (`NodeUnreachable`, `CaptureTimeout`) are absorbed by the
/// orchestrator and folded into case verdicts. Run-level variants (`SessionConflict`,
/// `QuorumNotMet`, `Infrastructure`, `Config`) stop the run.
#[derive(thiserror::Error, Debug)]
pub enum StageCheckError {
    /// Reference media could not be opened or decoded.
    #[error("media decode error for '{media}': {reason}")]
    MediaDecode {
        /// Media handle description (path or pattern).
        media: String,
        /// Human readable cause.
        reason: String,
    },

    /// A node could not be contacted.
    #[error("node '{node}' unreachable: {reason}")]
    NodeUnreachable {
        /// Node that failed.
        node: NodeId,
        /// Human readable cause.
        reason: String,
    },

    /// A node did not deliver a frame before the capture deadline.
    #[error("capture timeout on node '{node}' at frame {} after {timeout:?}", .timestamp.0)]
    CaptureTimeout {
        /// Node that failed.
        node: NodeId,
        /// Presentation timestamp being captured.
        timestamp: FrameIndex,
        /// Deadline that elapsed.
        timeout: Duration,
    },

    /// Reference and captured frame dimensions differ.
    #[error(
        "frame shape mismatch: reference {}x{}, captured {}x{}",
        reference.0, reference.1, captured.0, captured.1
    )]
    FrameShapeMismatch {
        /// Reference `(width, height)`.
        reference: (u32, u32),
        /// Captured `(width, height)`.
        captured: (u32, u32),
    },

    /// A session is already open against one of the requested nodes.
    #[error("session conflict: nodes {nodes:?} already owned by an open session")]
    SessionConflict {
        /// Nodes that are already claimed.
        nodes: Vec<NodeId>,
    },

    /// Too few nodes responded for the case to be conclusive.
    #[error("quorum not met for case '{case}': {responded} of {total} nodes responded, {required} required")]
    QuorumNotMet {
        /// Case being executed.
        case: CaseId,
        /// Nodes that responded.
        responded: usize,
        /// Nodes that were required.
        required: usize,
        /// Nodes in the target set.
        total: usize,
    },

    /// Cluster transport failure that prevents further progress.
    #[error("infrastructure fault: {0}")]
    Infrastructure(String),

    /// Malformed run configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Illegal run state transition.
    #[error("run state error: {0}")]
    RunState(String),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Passthrough for contextual errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StageCheckError {
    /// Build a [`StageCheckError::MediaDecode`].
    pub fn media_decode(media: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MediaDecode {
            media: media.into(),
            reason: reason.into(),
        }
    }

    /// Build a [`StageCheckError::NodeUnreachable`].
    pub fn node_unreachable(node: &NodeId, reason: impl Into<String>) -> Self {
        Self::NodeUnreachable {
            node: node.clone(),
            reason: reason.into(),
        }
    }

    /// Build a [`StageCheckError::Infrastructure`].
    pub fn infrastructure(msg: impl Into<String>) -> Self {
        Self::Infrastructure(msg.into())
    }

    /// Build a [`StageCheckError::Config`].
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`StageCheckError::RunState`].
    pub fn run_state(msg: impl Into<String>) -> Self {
        Self::RunState(msg.into())
    }

    /// Build a [`StageCheckError::Serde`].
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Node this error is attributed to, if any.
    pub fn node(&self) -> Option<&NodeId> {
        match self {
            Self::NodeUnreachable { node, .. } | Self::CaptureTimeout { node, .. } => Some(node),
            _ => None,
        }
    }

    /// Whether the error stops the whole run rather than one node, frame or case.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            Self::SessionConflict { .. }
                | Self::QuorumNotMet { .. }
                | Self::Infrastructure(_)
                | Self::Config(_)
        )
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
