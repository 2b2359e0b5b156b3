use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    cluster::{
        coordinator::{Coordinator, CoordinatorOpts},
        session::SessionRegistry,
        transport::{ClusterTransport, SessionInfo},
    },
    compare::comparator::{Comparator, ComparatorOpts},
    foundation::core::{CaseId, FrameRateMatch, NodeId},
    foundation::error::{StageCheckError, StageCheckResult},
    media::source::{FrameSource, open_media},
    sync::analyzer::{SyncAnalyzer, SyncReport},
    validation::{
        case::{ValidationCase, Workflow},
        report::ReportSink,
        run::{CaseReport, CaseVerdict, NodeContribution, RunState, ValidationRun},
    },
};

#[derive(Clone, Debug)]
pub struct OrchestratorOpts {
    /// Directory media handle paths are resolved against.
    pub media_root: PathBuf,
    pub comparator: ComparatorOpts,
    pub coordinator: CoordinatorOpts,
    /// Only run cases tagged with this workflow (untagged cases always run).
    pub workflow: Option<Workflow>,
}

impl Default for OrchestratorOpts {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("."),
            comparator: ComparatorOpts::default(),
            coordinator: CoordinatorOpts::default(),
            workflow: None,
        }
    }
}

enum CaseOutcome {
    Finished(CaseReport),
    Cancelled(CaseReport),
    /// The case ran into a run-level fault; the run must stop.
    Fatal(CaseReport, StageCheckError),
}

/// Drives validation runs: cases execute sequentially, node I/O within a timestamp concurrently.
pub struct Orchestrator {
    coordinator: Coordinator,
    comparator: Comparator,
    media_root: PathBuf,
    workflow: Option<Workflow>,
}

impl Orchestrator {
    pub fn new(transport: Arc<dyn ClusterTransport>, opts: OrchestratorOpts) -> Self {
        Self {
            coordinator: Coordinator::new(transport, opts.coordinator),
            comparator: Comparator::new(opts.comparator),
            media_root: opts.media_root,
            workflow: opts.workflow,
        }
    }

    pub fn with_registry(mut self, registry: SessionRegistry) -> Self {
        self.coordinator = self.coordinator.with_registry(registry);
        self
    }

    pub fn registry(&self) -> &SessionRegistry {
        self.coordinator.registry()
    }

    /// Run `cases` and hand the finalized run to `sink`.
    pub async fn run_with_sink(
        &self,
        cases: &[ValidationCase],
        cancel: &CancellationToken,
        sink: &mut dyn ReportSink,
    ) -> StageCheckResult<ValidationRun> {
        let run = self.run(cases, cancel).await?;
        sink.emit(&run)?;
        Ok(run)
    }

    /// Validate and execute `cases` in order.
    ///
    /// Configuration problems return `Err` before anything runs. Once running, every fault is
    /// folded into the returned run, which is always finalized.
    #[tracing::instrument(skip_all, fields(cases = cases.len()))]
    pub async fn run(
        &self,
        cases: &[ValidationCase],
        cancel: &CancellationToken,
    ) -> StageCheckResult<ValidationRun> {
        let selected: Vec<&ValidationCase> = cases
            .iter()
            .filter(|c| self.workflow.is_none_or(|w| c.applies_to(w)))
            .collect();
        if selected.len() < cases.len() {
            debug!(
                kept = selected.len(),
                workflow = ?self.workflow,
                "cases filtered by workflow"
            );
        }
        let sources = self.prepare(&selected)?;

        let mut run = ValidationRun::new();
        run.start()?;
        info!(cases = selected.len(), "run started");

        let mut outcome = RunState::Completed;
        let mut reason = None;
        for (i, (case, source)) in selected.iter().zip(&sources).enumerate() {
            if cancel.is_cancelled() {
                outcome = RunState::Cancelled;
                reason = Some(format!("cancelled before case '{}'", case.id));
                skip_remaining(&mut run, &selected[i..])?;
                break;
            }
            match self.execute_case(case, source.as_ref(), cancel).await {
                CaseOutcome::Finished(report) => run.record(report)?,
                CaseOutcome::Cancelled(report) => {
                    run.record(report)?;
                    outcome = RunState::Cancelled;
                    reason = Some(format!("cancelled during case '{}'", case.id));
                    skip_remaining(&mut run, &selected[i + 1..])?;
                    break;
                }
                CaseOutcome::Fatal(report, err) => {
                    warn!(case = %case.id, error = %err, "run aborted");
                    run.record(report)?;
                    outcome = RunState::Aborted;
                    reason = Some(err.to_string());
                    skip_remaining(&mut run, &selected[i + 1..])?;
                    break;
                }
            }
        }

        run.finalize(outcome, reason)?;
        info!(state = ?run.state(), verdict = ?run.verdict(), "run finalized");
        Ok(run)
    }

    /// Check every case and open its media before the run starts.
    fn prepare(&self, cases: &[&ValidationCase]) -> StageCheckResult<Vec<Box<dyn FrameSource>>> {
        let mut ids: BTreeSet<&CaseId> = BTreeSet::new();
        let mut sources = Vec::with_capacity(cases.len());
        for case in cases {
            case.validate()?;
            if !ids.insert(&case.id) {
                return Err(StageCheckError::config(format!(
                    "duplicate case id '{}'",
                    case.id
                )));
            }
            let source = open_media(&case.media, &self.media_root).map_err(|e| {
                StageCheckError::config(format!("case '{}': {e}", case.id))
            })?;
            let media = source.info();
            if media.fps.num == 0 || media.fps.den == 0 {
                return Err(StageCheckError::config(format!(
                    "case '{}': media frame rate {}/{} is invalid",
                    case.id, media.fps.num, media.fps.den
                )));
            }
            if let Some(last) = case.timestamps.last()
                && last.0 >= media.frame_count
            {
                return Err(StageCheckError::config(format!(
                    "case '{}': frame {} beyond media length {}",
                    case.id, last.0, media.frame_count
                )));
            }
            sources.push(source);
        }
        Ok(sources)
    }

    #[tracing::instrument(skip_all, fields(case = %case.id))]
    async fn execute_case(
        &self,
        case: &ValidationCase,
        source: &dyn FrameSource,
        cancel: &CancellationToken,
    ) -> CaseOutcome {
        let mut report = CaseReport::new(
            case.id.clone(),
            case.display_name(),
            case.description.clone(),
        );
        let media_fps = source.info().fps;
        if let Some(project) = case.project_fps {
            match media_fps.compatibility(project) {
                FrameRateMatch::Valid => {}
                FrameRateMatch::ValidMultiple => report.warnings.push(format!(
                    "media frame rate {media_fps} is a multiple of project rate {project}"
                )),
                FrameRateMatch::Invalid => {
                    report.verdict = CaseVerdict::Fail;
                    report.diagnostics.push(format!(
                        "media frame rate {media_fps} is incompatible with project rate {project}"
                    ));
                    return CaseOutcome::Finished(report);
                }
            }
        }

        let tol = &case.tolerance;
        let policy = tol.session_policy();
        let info = SessionInfo {
            case: case.id.clone(),
            media: case.media.clone(),
            media_root: self.media_root.clone(),
        };
        let mut session = match self.coordinator.begin_session(info, &case.nodes, policy).await {
            Ok(s) => s,
            Err(e) => {
                report.verdict = CaseVerdict::Aborted;
                report.diagnostics.push(e.to_string());
                return CaseOutcome::Fatal(report, e);
            }
        };

        let mut tally: BTreeMap<NodeId, NodeContribution> = case
            .nodes
            .iter()
            .map(|n| (n.clone(), NodeContribution::new(n.clone())))
            .collect();
        let mut degraded = BTreeSet::new();
        for e in session.unreachable() {
            if let Some(node) = e.node() {
                degraded.insert(node.clone());
                contribution(&mut tally, node).diagnostics.push(e.to_string());
            }
            report.warnings.push(format!("degraded: {e}"));
        }

        let mut analyzer = SyncAnalyzer::new(
            session.active(),
            tol.sync_tolerance(),
            media_fps.frame_duration(),
        );
        let required = policy.quorum.required(case.nodes.len());
        let mut acquired = 0usize;
        let mut shape_failure = false;
        let mut media_error = None;
        let mut fatal = None;
        let mut cancelled = false;

        for &ts in &case.timestamps {
            let reference = match source.frame_at(ts) {
                Ok(frame) => frame,
                Err(e) => {
                    media_error = Some(e);
                    break;
                }
            };
            let play = match session.play(ts).await {
                Ok(p) => p,
                Err(e) => {
                    fatal = Some(e);
                    break;
                }
            };
            for e in &play.failed {
                if let Some(node) = e.node() {
                    let c = contribution(&mut tally, node);
                    c.frames_missing += 1;
                    c.diagnostics.push(e.to_string());
                }
            }

            let captures = session.capture_all().await;
            let delivered = captures.iter().filter(|c| c.result.is_ok()).count();
            let mut presentations = Vec::with_capacity(captures.len());
            for capture in captures {
                let c = contribution(&mut tally, &capture.node);
                match capture.result {
                    Ok(sample) => {
                        acquired += 1;
                        presentations.push((capture.node.clone(), Some(sample.presented_at)));
                        match self.comparator.compare(&reference, &sample, tol.max_color_delta) {
                            Ok(result) => {
                                c.frames_compared += 1;
                                if !result.passed {
                                    c.frames_failed += 1;
                                    c.diagnostics.push(format!(
                                        "frame {}: {} {:.3} exceeds {}",
                                        ts.0,
                                        result.metric.name(),
                                        result.value,
                                        result.threshold
                                    ));
                                }
                                for w in &result.warnings {
                                    push_unique(
                                        &mut report.warnings,
                                        format!("node '{}': {w}", capture.node),
                                    );
                                }
                                report.comparisons.push(result);
                            }
                            Err(e) => {
                                shape_failure = true;
                                c.frames_failed += 1;
                                c.diagnostics.push(format!("frame {}: {e}", ts.0));
                            }
                        }
                    }
                    Err(e) => {
                        c.frames_missing += 1;
                        c.diagnostics.push(e.to_string());
                        presentations.push((capture.node, None));
                    }
                }
            }
            analyzer.observe(ts, play.cue.present_at, &presentations);

            // Captures only run on nodes that acked the cue, so this also covers cue failures.
            if delivered < required {
                warn!(ts = ts.0, delivered, required, "quorum lost");
                fatal = Some(StageCheckError::QuorumNotMet {
                    case: case.id.clone(),
                    responded: delivered,
                    required,
                    total: case.nodes.len(),
                });
                break;
            }
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
        }
        session.end().await;

        let comparison_failed = shape_failure || report.comparisons.iter().any(|r| !r.passed);

        if let Some(e) = fatal {
            report.verdict = CaseVerdict::Aborted;
            report.diagnostics.push(e.to_string());
            report.nodes = finish_contributions(case, tally, &degraded, None);
            return CaseOutcome::Fatal(report, e);
        }

        if acquired == 0 {
            report.verdict = if cancelled {
                CaseVerdict::Cancelled
            } else {
                CaseVerdict::Inconclusive
            };
            match media_error {
                Some(e) => report.diagnostics.push(format!("reference media: {e}")),
                None if !cancelled => report
                    .diagnostics
                    .push("no frames captured from any node".to_owned()),
                None => {}
            }
            report.nodes = finish_contributions(case, tally, &degraded, None);
            return if cancelled {
                CaseOutcome::Cancelled(report)
            } else {
                CaseOutcome::Finished(report)
            };
        }

        let sync = analyzer.finish();
        for v in &sync.skew_violations {
            report.diagnostics.push(format!(
                "frame {}: inter-node skew {}us exceeds {}us",
                v.timestamp.0,
                v.spread_ns / 1_000,
                tol.max_sync_skew_us
            ));
        }
        for t in sync.over_dropped() {
            report.diagnostics.push(format!(
                "node '{}' dropped {} frame(s), {} allowed",
                t.node, t.dropped, tol.max_dropped_frames
            ));
        }
        report.nodes = finish_contributions(case, tally, &degraded, Some(&sync));
        for n in report.nodes.iter().filter(|n| n.frames_failed > 0) {
            report.diagnostics.push(format!(
                "node '{}': {} frame(s) out of tolerance",
                n.node, n.frames_failed
            ));
        }
        if let Some(e) = &media_error {
            report.diagnostics.push(format!("reference media: {e}"));
        }

        report.verdict = if cancelled {
            CaseVerdict::Cancelled
        } else if comparison_failed || !sync.passed {
            CaseVerdict::Fail
        } else if media_error.is_some() {
            CaseVerdict::Inconclusive
        } else {
            CaseVerdict::Pass
        };
        report.sync = Some(sync);

        if report.verdict == CaseVerdict::Fail {
            warn!(diagnostics = report.diagnostics.len(), "case failed");
        } else {
            debug!(verdict = %report.verdict, "case finished");
        }

        if cancelled {
            CaseOutcome::Cancelled(report)
        } else {
            CaseOutcome::Finished(report)
        }
    }
}

fn contribution<'a>(
    tally: &'a mut BTreeMap<NodeId, NodeContribution>,
    node: &NodeId,
) -> &'a mut NodeContribution {
    tally
        .entry(node.clone())
        .or_insert_with(|| NodeContribution::new(node.clone()))
}

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}

/// Assign per-node verdicts and return contributions in declared node order.
fn finish_contributions(
    case: &ValidationCase,
    mut tally: BTreeMap<NodeId, NodeContribution>,
    degraded: &BTreeSet<NodeId>,
    sync: Option<&SyncReport>,
) -> Vec<NodeContribution> {
    case.nodes
        .iter()
        .filter_map(|n| tally.remove(n))
        .map(|mut c| {
            let over_dropped = sync
                .and_then(|s| s.timing(&c.node))
                .is_some_and(|t| t.dropped > case.tolerance.max_dropped_frames);
            c.verdict = if degraded.contains(&c.node) {
                CaseVerdict::Inconclusive
            } else if c.frames_failed > 0 || over_dropped {
                CaseVerdict::Fail
            } else if c.frames_compared == 0 {
                CaseVerdict::Inconclusive
            } else {
                CaseVerdict::Pass
            };
            c
        })
        .collect()
}

fn skip_remaining(run: &mut ValidationRun, cases: &[&ValidationCase]) -> StageCheckResult<()> {
    for case in cases {
        run.record(CaseReport::skipped(
            case.id.clone(),
            case.display_name(),
            case.description.clone(),
        ))?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/validation/orchestrator.rs"]
mod tests;
