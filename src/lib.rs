//! stagecheck validates synchronized media playback across a multi-node display cluster.
//!
//! A run plays reference media on a set of render nodes, captures what each node presented and
//! checks it two ways:
//!
//! - color-managed frame comparison against the reference ([`Comparator`])
//! - inter-node presentation skew and dropped frames ([`SyncAnalyzer`])
//!
//! The [`Orchestrator`] drives cases through a [`ClusterTransport`] and folds the results into a
//! [`ValidationRun`], which a [`ReportSink`] receives once finalized.
#![forbid(unsafe_code)]

mod foundation;

pub(crate) mod cluster;
pub(crate) mod compare;
pub(crate) mod media;
pub(crate) mod sync;
pub(crate) mod validation;

pub use crate::foundation::core::{
    CaseId, ClockInstant, Fps, FrameIndex, FrameRange, FrameRateMatch, NodeId, PixelRect,
};
pub use crate::foundation::error::{StageCheckError, StageCheckResult};

pub use crate::cluster::coordinator::{
    ClusterSession, Coordinator, CoordinatorOpts, NodeCapture, PlayReport, Quorum, SessionPolicy,
};
pub use crate::cluster::session::{SessionLease, SessionRegistry};
pub use crate::cluster::simulated::{SimNodeSpec, SimulatedCluster};
pub use crate::cluster::transport::{CapturedFrame, ClusterTransport, Cue, CueAck, SessionInfo};
pub use crate::compare::comparator::{Comparator, ComparatorOpts, ComparisonResult, FrameDelta};
pub use crate::compare::metric::DeltaMetric;
pub use crate::media::color::{
    ColorSpace, ColorTag, ColorTransform, LabConverter, Mat3, encode_linear, linear_to_lab,
};
pub use crate::media::decode::{decode_image, decode_image_file};
pub use crate::media::frame::{Frame, FrameSample};
pub use crate::media::source::{
    FrameCursor, FrameSource, ImageSequenceSource, MediaHandle, MediaInfo, SolidColorSource,
    StillImageSource, open_media,
};
pub use crate::sync::analyzer::{
    NodeOffset, NodeTiming, SkewViolation, SyncAnalyzer, SyncReport, SyncTolerance,
    TimestampSpread,
};
pub use crate::validation::case::{ToleranceProfile, ValidationCase, Workflow};
pub use crate::validation::manifest::{
    ManifestCase, RunManifest, SimulatedClusterSpec, ToleranceOverrides,
};
pub use crate::validation::orchestrator::{Orchestrator, OrchestratorOpts};
pub use crate::validation::report::{InMemoryReportSink, JsonReportSink, ReportSink};
pub use crate::validation::run::{
    CaseReport, CaseVerdict, NodeContribution, ReportRow, RunState, RunVerdict, ValidationRun,
};
