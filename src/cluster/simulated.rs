use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep};
use tracing::trace;

use crate::{
    cluster::transport::{CapturedFrame, ClusterTransport, Cue, CueAck, SessionInfo},
    foundation::core::{ClockInstant, FrameIndex, NodeId},
    foundation::error::{StageCheckError, StageCheckResult},
    media::{
        color::ColorTag,
        frame::Frame,
        source::{FrameSource, open_media},
    },
};

/// Behavior of one simulated render node.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimNodeSpec {
    pub id: NodeId,
    /// Refuse every connection.
    pub unreachable: bool,
    pub connect_latency_ms: u64,
    pub cue_latency_ms: u64,
    pub capture_latency_ms: u64,
    /// Per-frame capture latency, keyed by frame index.
    pub capture_latency_overrides: BTreeMap<u64, u64>,
    /// Signed presentation offset from the cued instant, in microseconds.
    pub present_offset_us: i64,
    /// Frames this node never delivers; captures hang until the caller's deadline.
    pub drop_frames: Vec<u64>,
    /// Added to every RGB channel of the rendered output.
    pub tint: [i16; 3],
    /// Color tag reported on captured frames instead of the media's own.
    pub color: Option<ColorTag>,
    /// Frame index from which the node stops answering cues.
    pub partition_at: Option<u64>,
}

impl SimNodeSpec {
    pub fn healthy(id: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(id),
            ..Self::default()
        }
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn dropping(mut self, frames: impl IntoIterator<Item = u64>) -> Self {
        self.drop_frames.extend(frames);
        self
    }

    pub fn offset_us(mut self, offset: i64) -> Self {
        self.present_offset_us = offset;
        self
    }

    pub fn tinted(mut self, tint: [i16; 3]) -> Self {
        self.tint = tint;
        self
    }

    pub fn capture_latency(mut self, ms: u64) -> Self {
        self.capture_latency_ms = ms;
        self
    }

    pub fn partitioned_at(mut self, frame: u64) -> Self {
        self.partition_at = Some(frame);
        self
    }

    fn partitioned(&self, ts: FrameIndex) -> bool {
        self.partition_at.is_some_and(|p| ts.0 >= p)
    }
}

struct NodeState {
    source: Arc<dyn FrameSource>,
    last_cue: Option<Cue>,
}

/// In-process cluster that plays reference media back with configurable faults.
///
/// Latencies use `tokio::time`, so tests under a paused clock run instantly.
pub struct SimulatedCluster {
    epoch: Instant,
    specs: BTreeMap<NodeId, SimNodeSpec>,
    state: Mutex<BTreeMap<NodeId, NodeState>>,
}

impl SimulatedCluster {
    pub fn new(specs: impl IntoIterator<Item = SimNodeSpec>) -> Self {
        Self {
            epoch: Instant::now(),
            specs: specs.into_iter().map(|s| (s.id.clone(), s)).collect(),
            state: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.specs.keys().cloned().collect()
    }

    /// Nodes currently holding a connection.
    pub fn connected(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<NodeId, NodeState>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn spec(&self, node: &NodeId) -> StageCheckResult<&SimNodeSpec> {
        self.specs
            .get(node)
            .ok_or_else(|| StageCheckError::node_unreachable(node, "unknown node"))
    }
}

fn tint_frame(frame: &Frame, tint: [i16; 3]) -> StageCheckResult<Frame> {
    if tint == [0, 0, 0] {
        return Ok(frame.clone());
    }
    let mut data = frame.rgba8.to_vec();
    for px in data.chunks_exact_mut(4) {
        for (c, t) in px.iter_mut().zip(tint) {
            *c = (i16::from(*c) + t).clamp(0, 255) as u8;
        }
    }
    Frame::new(frame.width, frame.height, frame.color.clone(), data)
}

#[async_trait]
impl ClusterTransport for SimulatedCluster {
    fn now(&self) -> ClockInstant {
        ClockInstant::from_duration(self.epoch.elapsed())
    }

    async fn connect(&self, node: &NodeId, session: &SessionInfo) -> StageCheckResult<()> {
        let spec = self.spec(node)?;
        sleep(Duration::from_millis(spec.connect_latency_ms)).await;
        if spec.unreachable {
            return Err(StageCheckError::node_unreachable(node, "connection refused"));
        }
        let source: Arc<dyn FrameSource> = Arc::from(open_media(&session.media, &session.media_root)?);
        self.lock().insert(
            node.clone(),
            NodeState {
                source,
                last_cue: None,
            },
        );
        trace!(node = %node, case = %session.case, "sim node connected");
        Ok(())
    }

    async fn cue(&self, node: &NodeId, cue: Cue) -> StageCheckResult<CueAck> {
        let spec = self.spec(node)?;
        if spec.partitioned(cue.timestamp) {
            return Err(StageCheckError::node_unreachable(
                node,
                format!("partitioned since frame {}", spec.partition_at.unwrap_or_default()),
            ));
        }
        sleep(Duration::from_millis(spec.cue_latency_ms)).await;
        let mut state = self.lock();
        let st = state
            .get_mut(node)
            .ok_or_else(|| StageCheckError::node_unreachable(node, "not connected"))?;
        st.last_cue = Some(cue);
        Ok(CueAck {
            timestamp: cue.timestamp,
            scheduled_for: cue.present_at,
        })
    }

    async fn capture(&self, node: &NodeId) -> StageCheckResult<CapturedFrame> {
        let spec = self.spec(node)?;
        let (source, cue) = {
            let state = self.lock();
            let st = state
                .get(node)
                .ok_or_else(|| StageCheckError::node_unreachable(node, "not connected"))?;
            let cue = st.last_cue.ok_or_else(|| {
                StageCheckError::run_state(format!("node '{node}' captured before any cue"))
            })?;
            (Arc::clone(&st.source), cue)
        };

        if spec.drop_frames.contains(&cue.timestamp.0) {
            std::future::pending::<()>().await;
        }
        let latency = spec
            .capture_latency_overrides
            .get(&cue.timestamp.0)
            .copied()
            .unwrap_or(spec.capture_latency_ms);
        sleep(Duration::from_millis(latency)).await;

        let mut frame = tint_frame(&source.frame_at(cue.timestamp)?, spec.tint)?;
        if let Some(tag) = &spec.color {
            frame = frame.with_color(tag.clone());
        }
        Ok(CapturedFrame {
            timestamp: cue.timestamp,
            presented_at: ClockInstant(
                cue.present_at
                    .0
                    .saturating_add(spec.present_offset_us.saturating_mul(1_000)),
            ),
            frame,
        })
    }

    async fn disconnect(&self, node: &NodeId) -> StageCheckResult<()> {
        self.lock().remove(node);
        trace!(node = %node, "sim node disconnected");
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cluster/simulated.rs"]
mod tests;
