use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::foundation::core::{ClockInstant, FrameIndex, NodeId};

/// Limits a case's presentation timing must stay within.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncTolerance {
    pub max_skew: Duration,
    pub max_dropped_frames: u32,
}

/// One node's presentation at one timestamp, relative to the cued instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeOffset {
    pub timestamp: FrameIndex,
    /// `presented - expected` in nanoseconds; `None` when the frame was dropped.
    pub offset_ns: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTiming {
    pub node: NodeId,
    pub offsets: Vec<NodeOffset>,
    pub dropped: u32,
}

/// Inter-node spread (latest minus earliest presentation) at one timestamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampSpread {
    pub timestamp: FrameIndex,
    /// `None` when fewer than two nodes presented.
    pub spread_ns: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkewViolation {
    pub timestamp: FrameIndex,
    pub spread_ns: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub nodes: Vec<NodeTiming>,
    pub spreads: Vec<TimestampSpread>,
    pub worst_skew_ns: u64,
    pub skew_violations: Vec<SkewViolation>,
    pub max_sync_skew_ns: u64,
    pub max_dropped_frames: u32,
    pub passed: bool,
}

impl SyncReport {
    pub fn timing(&self, node: &NodeId) -> Option<&NodeTiming> {
        self.nodes.iter().find(|t| &t.node == node)
    }

    /// Nodes whose dropped count exceeds the tolerance.
    pub fn over_dropped(&self) -> impl Iterator<Item = &NodeTiming> {
        self.nodes
            .iter()
            .filter(move |t| t.dropped > self.max_dropped_frames)
    }
}

/// Accumulates per-timestamp presentations for one case and derives a [`SyncReport`].
///
/// A presentation further than `frame_window` from the expected instant counts as dropped, as does
/// a missing one.
#[derive(Clone, Debug)]
pub struct SyncAnalyzer {
    tolerance: SyncTolerance,
    frame_window: Duration,
    nodes: Vec<NodeTiming>,
    spreads: Vec<TimestampSpread>,
    violations: Vec<SkewViolation>,
    worst_skew_ns: u64,
}

impl SyncAnalyzer {
    pub fn new(nodes: &[NodeId], tolerance: SyncTolerance, frame_window: Duration) -> Self {
        Self {
            tolerance,
            frame_window,
            nodes: nodes
                .iter()
                .map(|n| NodeTiming {
                    node: n.clone(),
                    offsets: Vec::new(),
                    dropped: 0,
                })
                .collect(),
            spreads: Vec::new(),
            violations: Vec::new(),
            worst_skew_ns: 0,
        }
    }

    /// Record one timestamp. Nodes absent from `presentations` are treated as not presenting.
    pub fn observe(
        &mut self,
        timestamp: FrameIndex,
        expected: ClockInstant,
        presentations: &[(NodeId, Option<ClockInstant>)],
    ) {
        let window = i64::try_from(self.frame_window.as_nanos()).unwrap_or(i64::MAX);
        let mut earliest: Option<ClockInstant> = None;
        let mut latest: Option<ClockInstant> = None;
        let mut presenting = 0usize;

        for timing in &mut self.nodes {
            let presented = presentations
                .iter()
                .find(|(n, _)| *n == timing.node)
                .and_then(|(_, at)| *at)
                .filter(|at| at.offset_from(expected).abs() <= window);

            match presented {
                Some(at) => {
                    timing.offsets.push(NodeOffset {
                        timestamp,
                        offset_ns: Some(at.offset_from(expected)),
                    });
                    earliest = Some(earliest.map_or(at, |e| e.min(at)));
                    latest = Some(latest.map_or(at, |l| l.max(at)));
                    presenting += 1;
                }
                None => {
                    timing.offsets.push(NodeOffset {
                        timestamp,
                        offset_ns: None,
                    });
                    timing.dropped += 1;
                }
            }
        }

        let spread_ns = match (earliest, latest) {
            (Some(e), Some(l)) if presenting >= 2 => Some(l.offset_from(e).unsigned_abs()),
            _ => None,
        };
        if let Some(spread) = spread_ns {
            self.worst_skew_ns = self.worst_skew_ns.max(spread);
            if Duration::from_nanos(spread) > self.tolerance.max_skew {
                self.violations.push(SkewViolation {
                    timestamp,
                    spread_ns: spread,
                });
            }
        }
        self.spreads.push(TimestampSpread {
            timestamp,
            spread_ns,
        });
    }

    pub fn finish(self) -> SyncReport {
        let max_dropped = self.tolerance.max_dropped_frames;
        let passed = self.violations.is_empty() && self.nodes.iter().all(|t| t.dropped <= max_dropped);
        SyncReport {
            nodes: self.nodes,
            spreads: self.spreads,
            worst_skew_ns: self.worst_skew_ns,
            skew_violations: self.violations,
            max_sync_skew_ns: u64::try_from(self.tolerance.max_skew.as_nanos()).unwrap_or(u64::MAX),
            max_dropped_frames: max_dropped,
            passed,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/sync/analyzer.rs"]
mod tests;
