use std::fmt;
use std::time::Duration;

use crate::foundation::error::{StageCheckError, StageCheckResult};

/// Presentation timestamp expressed as a frame index on the media timeline.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct FrameIndex(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameRange {
    pub start: FrameIndex,
    pub end: FrameIndex, // exclusive
}

impl FrameRange {
    pub fn new(start: FrameIndex, end: FrameIndex) -> StageCheckResult<Self> {
        if start.0 > end.0 {
            return Err(StageCheckError::config("FrameRange start must be <= end"));
        }
        Ok(Self { start, end })
    }

    pub fn len_frames(self) -> u64 {
        self.end.0.saturating_sub(self.start.0)
    }

    pub fn is_empty(self) -> bool {
        self.start.0 == self.end.0
    }

    pub fn contains(self, f: FrameIndex) -> bool {
        self.start.0 <= f.0 && f.0 < self.end.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    pub num: u32,
    pub den: u32, // must be > 0
}

/// Outcome of checking a media frame rate against a project frame rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameRateMatch {
    Valid,
    ValidMultiple,
    Invalid,
}

impl Fps {
    pub fn new(num: u32, den: u32) -> StageCheckResult<Self> {
        if den == 0 {
            return Err(StageCheckError::config("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(StageCheckError::config("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    pub fn frame_duration(self) -> Duration {
        Duration::from_nanos(1_000_000_000 * u64::from(self.den) / u64::from(self.num).max(1))
    }

    /// Classify `self` (media rate) against `project`.
    ///
    /// Rates are compared as exact rationals: 48/1 against 24/1 is a valid multiple, 24000/1001
    /// against 24/1 is invalid.
    pub fn compatibility(self, project: Fps) -> FrameRateMatch {
        // self = a/b, project = c/d; compare a*d against c*b.
        let lhs = u64::from(self.num) * u64::from(project.den);
        let rhs = u64::from(project.num) * u64::from(self.den);
        if lhs == 0 || rhs == 0 {
            return FrameRateMatch::Invalid;
        }
        if lhs == rhs {
            FrameRateMatch::Valid
        } else if lhs % rhs == 0 || rhs % lhs == 0 {
            FrameRateMatch::ValidMultiple
        } else {
            FrameRateMatch::Invalid
        }
    }
}

impl fmt::Display for Fps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}fps", self.num)
        } else {
            write!(f, "{}/{}fps", self.num, self.den)
        }
    }
}

/// Identifier of a render node in the cluster.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a validation case.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct CaseId(pub String);

impl CaseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Instant on the cluster's common logical clock, in nanoseconds since the clock epoch.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct ClockInstant(pub i64);

impl ClockInstant {
    pub fn from_duration(since_epoch: Duration) -> Self {
        Self(i64::try_from(since_epoch.as_nanos()).unwrap_or(i64::MAX))
    }

    pub fn saturating_add(self, d: Duration) -> Self {
        let nanos = i64::try_from(d.as_nanos()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(nanos))
    }

    /// Signed offset `self - earlier`, in nanoseconds.
    pub fn offset_from(self, earlier: ClockInstant) -> i64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Absolute distance between two instants.
    pub fn abs_diff(self, other: ClockInstant) -> Duration {
        Duration::from_nanos(self.0.abs_diff(other.0))
    }
}

/// Axis-aligned pixel rectangle, `x1`/`y1` exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PixelRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelRect {
    pub fn point(x: u32, y: u32) -> Self {
        Self {
            x0: x,
            y0: y,
            x1: x + 1,
            y1: y + 1,
        }
    }

    pub fn union(self, other: PixelRect) -> Self {
        Self {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    pub fn width(self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
