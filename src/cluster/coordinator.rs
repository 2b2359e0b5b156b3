use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::{
    cluster::{
        session::{SessionLease, SessionRegistry},
        transport::{ClusterTransport, Cue, SessionInfo},
    },
    foundation::core::{CaseId, FrameIndex, NodeId},
    foundation::error::{StageCheckError, StageCheckResult},
    media::frame::FrameSample,
};

/// Minimum fraction of a node set that must respond, as an exact ratio.
///
/// Deserializes from a number (`0.5`) or a ratio string (`"2/3"`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Quorum {
    pub num: u32,
    pub den: u32,
}

impl Quorum {
    pub const ALL: Quorum = Quorum { num: 1, den: 1 };

    pub fn new(num: u32, den: u32) -> StageCheckResult<Self> {
        if den == 0 || num == 0 || num > den {
            return Err(StageCheckError::config(format!(
                "quorum must be in (0, 1], got {num}/{den}"
            )));
        }
        Ok(Self { num, den })
    }

    pub fn from_fraction(f: f64) -> StageCheckResult<Self> {
        if !(f > 0.0 && f <= 1.0) {
            return Err(StageCheckError::config(format!(
                "quorum must be in (0, 1], got {f}"
            )));
        }
        const SCALE: u32 = 1_000_000;
        let num = ((f * f64::from(SCALE)).round() as u32).max(1);
        Self::new(num, SCALE)
    }

    /// Nodes required out of `total`; always at least one.
    pub fn required(self, total: usize) -> usize {
        let total = total as u64;
        let need = (total * u64::from(self.num)).div_ceil(u64::from(self.den));
        (need as usize).max(1)
    }

    pub fn is_met(self, responded: usize, total: usize) -> bool {
        responded >= self.required(total)
    }
}

impl Default for Quorum {
    fn default() -> Self {
        Self::ALL
    }
}

impl fmt::Display for Quorum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl<'de> Deserialize<'de> for Quorum {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Fraction(f64),
            Ratio(String),
            Obj { num: u32, den: u32 },
        }

        match Repr::deserialize(deserializer)? {
            Repr::Fraction(f) => Quorum::from_fraction(f).map_err(serde::de::Error::custom),
            Repr::Ratio(s) => {
                let (n, d) = s
                    .split_once('/')
                    .ok_or_else(|| serde::de::Error::custom("quorum ratio must be \"n/d\""))?;
                let n = n.trim().parse::<u32>().map_err(serde::de::Error::custom)?;
                let d = d.trim().parse::<u32>().map_err(serde::de::Error::custom)?;
                Quorum::new(n, d).map_err(serde::de::Error::custom)
            }
            Repr::Obj { num, den } => Quorum::new(num, den).map_err(serde::de::Error::custom),
        }
    }
}

/// Per-session limits taken from a case's tolerance profile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionPolicy {
    pub connect_timeout: Duration,
    pub capture_timeout: Duration,
    pub quorum: Quorum,
}

#[derive(Clone, Debug)]
pub struct CoordinatorOpts {
    /// How far ahead of "now" a cue is scheduled to present.
    pub cue_lead: Duration,
    /// Bound on each node's cue acknowledgement.
    pub cue_timeout: Duration,
}

impl Default for CoordinatorOpts {
    fn default() -> Self {
        Self {
            cue_lead: Duration::from_millis(50),
            cue_timeout: Duration::from_secs(1),
        }
    }
}

/// Opens synchronized playback sessions against a cluster transport.
#[derive(Clone)]
pub struct Coordinator {
    transport: Arc<dyn ClusterTransport>,
    registry: SessionRegistry,
    opts: CoordinatorOpts,
}

impl Coordinator {
    pub fn new(transport: Arc<dyn ClusterTransport>, opts: CoordinatorOpts) -> Self {
        Self {
            transport,
            registry: SessionRegistry::new(),
            opts,
        }
    }

    /// Share an existing registry, e.g. between coordinators over the same cluster.
    pub fn with_registry(mut self, registry: SessionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Claim `nodes` and connect to each of them concurrently.
    ///
    /// Unreachable nodes are recorded on the session as degraded. If fewer than the quorum connect,
    /// the reachable nodes are disconnected again and `QuorumNotMet` is returned.
    #[tracing::instrument(skip(self, info, policy), fields(case = %info.case))]
    pub async fn begin_session(
        &self,
        info: SessionInfo,
        nodes: &[NodeId],
        policy: SessionPolicy,
    ) -> StageCheckResult<ClusterSession> {
        let lease = self.registry.acquire(nodes)?;
        let transport = self.transport.as_ref();

        let attempts = join_all(nodes.iter().map(|node| {
            let info = &info;
            async move {
                match timeout(policy.connect_timeout, transport.connect(node, info)).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(StageCheckError::NodeUnreachable { node, reason })) => {
                        Err(StageCheckError::NodeUnreachable { node, reason })
                    }
                    Ok(Err(e)) => Err(StageCheckError::node_unreachable(node, e.to_string())),
                    Err(_) => Err(StageCheckError::node_unreachable(
                        node,
                        format!("no connection within {:?}", policy.connect_timeout),
                    )),
                }
            }
        }))
        .await;

        let mut active = Vec::new();
        let mut unreachable = Vec::new();
        for (node, attempt) in nodes.iter().zip(attempts) {
            match attempt {
                Ok(()) => active.push(node.clone()),
                Err(e) => {
                    warn!(node = %node, error = %e, "node unreachable");
                    unreachable.push(e);
                }
            }
        }

        let required = policy.quorum.required(nodes.len());
        if active.len() < required {
            disconnect_all(transport, &active, policy.connect_timeout).await;
            drop(lease);
            return Err(StageCheckError::QuorumNotMet {
                case: info.case,
                responded: active.len(),
                required,
                total: nodes.len(),
            });
        }

        debug!(active = active.len(), total = nodes.len(), "session open");
        Ok(ClusterSession {
            case: info.case,
            transport: Arc::clone(&self.transport),
            opts: self.opts.clone(),
            policy,
            nodes: nodes.to_vec(),
            active,
            unreachable,
            cued: Vec::new(),
            last_cue: None,
            lease: Some(lease),
        })
    }
}

async fn disconnect_all(transport: &dyn ClusterTransport, nodes: &[NodeId], limit: Duration) {
    let results = join_all(
        nodes
            .iter()
            .map(|node| async move { timeout(limit, transport.disconnect(node)).await }),
    )
    .await;
    for (node, r) in nodes.iter().zip(results) {
        match r {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(node = %node, error = %e, "disconnect failed"),
            Err(_) => warn!(node = %node, "disconnect timed out"),
        }
    }
}

/// Result of broadcasting one cue.
#[derive(Debug)]
pub struct PlayReport {
    pub cue: Cue,
    /// Nodes that acknowledged, in declared order.
    pub acked: Vec<NodeId>,
    pub failed: Vec<StageCheckError>,
}

/// One node's contribution to a capture fan-out.
#[derive(Debug)]
pub struct NodeCapture {
    pub node: NodeId,
    pub result: StageCheckResult<FrameSample>,
}

/// An open synchronized playback session over a node set.
///
/// Call [`ClusterSession::end`] to disconnect. If a session is dropped without `end`, the node
/// claim is released immediately and disconnects are spawned on the current runtime.
pub struct ClusterSession {
    case: CaseId,
    transport: Arc<dyn ClusterTransport>,
    opts: CoordinatorOpts,
    policy: SessionPolicy,
    nodes: Vec<NodeId>,
    active: Vec<NodeId>,
    unreachable: Vec<StageCheckError>,
    cued: Vec<NodeId>,
    last_cue: Option<Cue>,
    lease: Option<SessionLease>,
}

impl ClusterSession {
    pub fn case(&self) -> &CaseId {
        &self.case
    }

    /// Every node of the target set, in declared order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Nodes that connected.
    pub fn active(&self) -> &[NodeId] {
        &self.active
    }

    /// Connection failures for degraded nodes.
    pub fn unreachable(&self) -> &[StageCheckError] {
        &self.unreachable
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    pub fn last_cue(&self) -> Option<Cue> {
        self.last_cue
    }

    /// Broadcast a cue for `timestamp` to every active node.
    ///
    /// Timestamps must be strictly increasing within a session.
    #[tracing::instrument(skip(self), fields(case = %self.case, ts = timestamp.0))]
    pub async fn play(&mut self, timestamp: FrameIndex) -> StageCheckResult<PlayReport> {
        if let Some(prev) = self.last_cue
            && timestamp <= prev.timestamp
        {
            return Err(StageCheckError::config(format!(
                "case '{}': cue for frame {} after frame {}",
                self.case, timestamp.0, prev.timestamp.0
            )));
        }
        if self.active.is_empty() {
            return Err(StageCheckError::infrastructure(format!(
                "case '{}': no connected nodes to cue",
                self.case
            )));
        }

        let cue = Cue {
            timestamp,
            present_at: self.transport.now().saturating_add(self.opts.cue_lead),
        };
        let transport = self.transport.as_ref();
        let cue_timeout = self.opts.cue_timeout;
        let acks = join_all(self.active.iter().map(|node| async move {
            match timeout(cue_timeout, transport.cue(node, cue)).await {
                Ok(r) => r,
                Err(_) => Err(StageCheckError::node_unreachable(
                    node,
                    format!("cue for frame {} not acknowledged within {cue_timeout:?}", timestamp.0),
                )),
            }
        }))
        .await;

        let mut acked = Vec::new();
        let mut failed = Vec::new();
        for (node, ack) in self.active.iter().zip(acks) {
            match ack {
                Ok(_) => acked.push(node.clone()),
                Err(e) => {
                    warn!(node = %node, error = %e, "cue failed");
                    failed.push(e);
                }
            }
        }

        self.cued = acked.clone();
        self.last_cue = Some(cue);
        Ok(PlayReport { cue, acked, failed })
    }

    /// Fetch `node`'s output for the most recent cue.
    pub async fn capture_frame(&self, node: &NodeId) -> StageCheckResult<FrameSample> {
        let cue = self.last_cue.ok_or_else(|| {
            StageCheckError::run_state(format!("case '{}': capture before any cue", self.case))
        })?;
        let deadline = self.policy.capture_timeout;
        let timed_out = || StageCheckError::CaptureTimeout {
            node: node.clone(),
            timestamp: cue.timestamp,
            timeout: deadline,
        };

        let captured = timeout(deadline, self.transport.capture(node))
            .await
            .map_err(|_| timed_out())??;
        if captured.timestamp != cue.timestamp {
            // Stale output: the cued frame never became available.
            debug!(node = %node, got = captured.timestamp.0, want = cue.timestamp.0, "stale capture");
            return Err(timed_out());
        }

        Ok(FrameSample {
            node: node.clone(),
            timestamp: captured.timestamp,
            presented_at: captured.presented_at,
            frame: captured.frame,
        })
    }

    /// Capture from every node that acknowledged the last cue, concurrently.
    ///
    /// Results are returned in declared node order regardless of arrival order.
    pub async fn capture_all(&self) -> Vec<NodeCapture> {
        let results = join_all(self.cued.iter().map(|node| self.capture_frame(node))).await;
        self.cued
            .iter()
            .cloned()
            .zip(results)
            .map(|(node, result)| NodeCapture { node, result })
            .collect()
    }

    /// Disconnect every connected node and release the node claim.
    #[tracing::instrument(skip(self), fields(case = %self.case))]
    pub async fn end(mut self) {
        let active = std::mem::take(&mut self.active);
        disconnect_all(self.transport.as_ref(), &active, self.policy.connect_timeout).await;
        self.lease.take();
        debug!("session closed");
    }
}

impl Drop for ClusterSession {
    fn drop(&mut self) {
        if self.lease.take().is_none() {
            return;
        }
        let active = std::mem::take(&mut self.active);
        warn!(case = %self.case, nodes = active.len(), "session dropped without end");
        if active.is_empty() {
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let transport = Arc::clone(&self.transport);
            let limit = self.policy.connect_timeout;
            handle.spawn(async move {
                disconnect_all(transport.as_ref(), &active, limit).await;
            });
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cluster/coordinator.rs"]
mod tests;
