use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    foundation::core::{CaseId, ClockInstant, FrameIndex, NodeId},
    foundation::error::StageCheckResult,
    media::{frame::Frame, source::MediaHandle},
};

/// What a node needs to know to join a playback session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionInfo {
    pub case: CaseId,
    pub media: MediaHandle,
    pub media_root: PathBuf,
}

/// Synchronized playback cue: present `timestamp` at `present_at` on the common clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cue {
    pub timestamp: FrameIndex,
    pub present_at: ClockInstant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CueAck {
    pub timestamp: FrameIndex,
    pub scheduled_for: ClockInstant,
}

/// Rendered output fetched back from a node.
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedFrame {
    pub timestamp: FrameIndex,
    pub presented_at: ClockInstant,
    pub frame: Frame,
}

/// Command/response channel to the render nodes of a display cluster.
///
/// Implementations do not enforce timeouts; the coordinator bounds every call.
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    /// Current instant on the clock shared by every node.
    fn now(&self) -> ClockInstant;

    async fn connect(&self, node: &NodeId, session: &SessionInfo) -> StageCheckResult<()>;

    async fn cue(&self, node: &NodeId, cue: Cue) -> StageCheckResult<CueAck>;

    /// Output for the most recently presented cue.
    async fn capture(&self, node: &NodeId) -> StageCheckResult<CapturedFrame>;

    async fn disconnect(&self, node: &NodeId) -> StageCheckResult<()>;
}
