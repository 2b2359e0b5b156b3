use super::*;
use crate::cluster::coordinator::Quorum;
use crate::cluster::simulated::{SimNodeSpec, SimulatedCluster};
use crate::foundation::core::Fps;
use crate::media::color::ColorSpace;
use crate::media::source::MediaHandle;

fn solid(frames: u64, fps: Fps) -> MediaHandle {
    MediaHandle::Solid {
        width: 16,
        height: 9,
        rgba: [255, 0, 0, 255],
        frames,
        fps,
        color: ColorSpace::Srgb.into(),
    }
}

fn nodes(names: &[&str]) -> Vec<NodeId> {
    names.iter().map(|n| NodeId::new(*n)).collect()
}

fn orchestrator(specs: Vec<SimNodeSpec>, workflow: Option<Workflow>) -> Orchestrator {
    Orchestrator::new(
        Arc::new(SimulatedCluster::new(specs)),
        OrchestratorOpts {
            workflow,
            ..OrchestratorOpts::default()
        },
    )
}

const FPS24: Fps = Fps { num: 24, den: 1 };

#[tokio::test(start_paused = true)]
async fn healthy_case_passes_with_sync_report() {
    let orch = orchestrator(vec![SimNodeSpec::healthy("a"), SimNodeSpec::healthy("b")], None);
    let case = ValidationCase::new("ok", solid(10, FPS24), nodes(&["a", "b"]), [0, 4, 9]);
    let run = orch.run(&[case], &CancellationToken::new()).await.unwrap();

    assert_eq!(run.state(), RunState::Completed);
    let report = &run.cases()[0];
    assert_eq!(report.verdict, CaseVerdict::Pass);
    assert_eq!(report.comparisons.len(), 6);
    let order: Vec<_> = report
        .comparisons
        .iter()
        .map(|c| (c.timestamp.0, c.node.as_str().to_owned()))
        .collect();
    assert_eq!(
        order,
        [(0u64, "a"), (0, "b"), (4, "a"), (4, "b"), (9, "a"), (9, "b")]
            .map(|(t, n)| (t, n.to_owned()))
    );
    let sync = report.sync.as_ref().unwrap();
    assert!(sync.passed);
    assert_eq!(sync.spreads.len(), 3);
    assert!(report.nodes.iter().all(|n| n.verdict == CaseVerdict::Pass));
}

#[tokio::test(start_paused = true)]
async fn tinted_node_fails_the_case() {
    let orch = orchestrator(
        vec![SimNodeSpec::healthy("a"), SimNodeSpec::healthy("b").tinted([0, 0, 60])],
        None,
    );
    let case = ValidationCase::new("tint", solid(4, FPS24), nodes(&["a", "b"]), [0, 1]);
    let run = orch.run(&[case], &CancellationToken::new()).await.unwrap();
    let report = &run.cases()[0];
    assert_eq!(report.verdict, CaseVerdict::Fail);
    assert_eq!(report.node(&NodeId::new("a")).unwrap().verdict, CaseVerdict::Pass);
    let b = report.node(&NodeId::new("b")).unwrap();
    assert_eq!(b.verdict, CaseVerdict::Fail);
    assert_eq!(b.frames_failed, 2);
}

#[tokio::test(start_paused = true)]
async fn skewed_node_breaks_sync_tolerance() {
    let orch = orchestrator(
        vec![SimNodeSpec::healthy("a"), SimNodeSpec::healthy("b").offset_us(3_000)],
        None,
    );
    let case = ValidationCase::new("skew", solid(4, FPS24), nodes(&["a", "b"]), [0, 1]);
    let run = orch.run(&[case], &CancellationToken::new()).await.unwrap();
    let report = &run.cases()[0];
    assert_eq!(report.verdict, CaseVerdict::Fail);
    let sync = report.sync.as_ref().unwrap();
    assert_eq!(sync.skew_violations.len(), 2);
    assert_eq!(sync.worst_skew_ns, 3_000_000);
}

#[tokio::test(start_paused = true)]
async fn dropped_frames_within_budget_pass() {
    let orch = orchestrator(
        vec![SimNodeSpec::healthy("a"), SimNodeSpec::healthy("b").dropping([1])],
        None,
    );
    let mut case = ValidationCase::new("drop", solid(4, FPS24), nodes(&["a", "b"]), [0, 1, 2]);
    case.tolerance.max_dropped_frames = 1;
    case.tolerance.capture_timeout_ms = 200;
    case.tolerance.quorum = Quorum::new(1, 2).unwrap();
    let run = orch.run(&[case.clone()], &CancellationToken::new()).await.unwrap();
    let report = &run.cases()[0];
    assert_eq!(report.verdict, CaseVerdict::Pass);
    let b = report.node(&NodeId::new("b")).unwrap();
    assert_eq!(b.frames_missing, 1);
    assert_eq!(report.comparisons.len(), 5);

    case.tolerance.max_dropped_frames = 0;
    let run = orch.run(&[case], &CancellationToken::new()).await.unwrap();
    assert_eq!(run.cases()[0].verdict, CaseVerdict::Fail);
}

#[tokio::test(start_paused = true)]
async fn incompatible_frame_rate_fails_without_a_session() {
    let cluster = Arc::new(SimulatedCluster::new([SimNodeSpec::healthy("a")]));
    let orch = Orchestrator::new(cluster.clone(), OrchestratorOpts::default());
    let bad = ValidationCase::new("bad", solid(4, Fps { num: 25, den: 1 }), nodes(&["a"]), [0])
        .with_project_fps(FPS24);
    let multiple = ValidationCase::new("double", solid(4, Fps { num: 48, den: 1 }), nodes(&["a"]), [0])
        .with_project_fps(FPS24);

    let run = orch.run(&[bad, multiple], &CancellationToken::new()).await.unwrap();
    assert_eq!(run.cases()[0].verdict, CaseVerdict::Fail);
    assert!(run.cases()[0].comparisons.is_empty());
    assert!(run.cases()[0].sync.is_none());
    assert_eq!(run.cases()[1].verdict, CaseVerdict::Pass);
    assert_eq!(run.cases()[1].warnings.len(), 1);
    assert_eq!(cluster.connected(), 0);
}

#[tokio::test(start_paused = true)]
async fn unknown_capture_tag_warns_but_passes() {
    let mut spec = SimNodeSpec::healthy("a");
    spec.color = Some(crate::media::color::ColorTag::parse("studio-log"));
    let orch = orchestrator(vec![spec], None);
    let case = ValidationCase::new("tag", solid(2, FPS24), nodes(&["a"]), [0, 1]);
    let run = orch.run(&[case], &CancellationToken::new()).await.unwrap();
    let report = &run.cases()[0];
    assert_eq!(report.verdict, CaseVerdict::Pass);
    assert_eq!(report.warnings.len(), 1, "{:?}", report.warnings);
    assert!(report.warnings[0].contains("studio-log"));
}

#[tokio::test(start_paused = true)]
async fn workflow_filter_selects_cases() {
    let orch = orchestrator(vec![SimNodeSpec::healthy("a")], Some(Workflow::Vad));
    let cases = [
        ValidationCase::new("icvfx", solid(2, FPS24), nodes(&["a"]), [0])
            .with_workflows([Workflow::Icvfx]),
        ValidationCase::new("any", solid(2, FPS24), nodes(&["a"]), [0]),
        ValidationCase::new("vad", solid(2, FPS24), nodes(&["a"]), [0])
            .with_workflows([Workflow::Vad, Workflow::Simulcam]),
    ];
    let run = orch.run(&cases, &CancellationToken::new()).await.unwrap();
    let ids: Vec<_> = run.cases().iter().map(|c| c.case.as_str()).collect();
    assert_eq!(ids, ["any", "vad"]);
}

#[tokio::test(start_paused = true)]
async fn malformed_configuration_never_starts() {
    let orch = orchestrator(vec![SimNodeSpec::healthy("a")], None);
    let cancel = CancellationToken::new();

    let dup = [
        ValidationCase::new("x", solid(2, FPS24), nodes(&["a"]), [0]),
        ValidationCase::new("x", solid(2, FPS24), nodes(&["a"]), [1]),
    ];
    assert!(matches!(orch.run(&dup, &cancel).await, Err(StageCheckError::Config(_))));

    let too_long = [ValidationCase::new("long", solid(2, FPS24), nodes(&["a"]), [0, 2])];
    let err = orch.run(&too_long, &cancel).await.unwrap_err().to_string();
    assert!(err.contains("beyond media length"), "{err}");

    let missing = [ValidationCase::new(
        "missing",
        MediaHandle::Still {
            path: "target/does/not/exist.png".into(),
            frames: 1,
            fps: FPS24,
            color: Default::default(),
        },
        nodes(&["a"]),
        [0],
    )];
    assert!(matches!(orch.run(&missing, &cancel).await, Err(StageCheckError::Config(_))));
}

#[tokio::test(start_paused = true)]
async fn cancel_before_start_skips_everything() {
    let orch = orchestrator(vec![SimNodeSpec::healthy("a")], None);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let cases = [
        ValidationCase::new("one", solid(2, FPS24), nodes(&["a"]), [0]),
        ValidationCase::new("two", solid(2, FPS24), nodes(&["a"]), [0]),
    ];
    let run = orch.run(&cases, &cancel).await.unwrap();
    assert_eq!(run.state(), RunState::Cancelled);
    assert!(run.cases().iter().all(|c| c.verdict == CaseVerdict::Skipped));
    assert_eq!(
        run.verdict(),
        Some(crate::validation::run::RunVerdict::Inconclusive)
    );
}

#[tokio::test(start_paused = true)]
async fn one_dropped_frame_under_full_quorum_aborts() {
    let orch = orchestrator(
        vec![SimNodeSpec::healthy("a"), SimNodeSpec::healthy("b").dropping([1])],
        None,
    );
    let mut case = ValidationCase::new("strict", solid(4, FPS24), nodes(&["a", "b"]), [0, 1, 2]);
    case.tolerance.max_dropped_frames = 3;
    case.tolerance.capture_timeout_ms = 100;
    let run = orch.run(&[case], &CancellationToken::new()).await.unwrap();
    assert_eq!(run.state(), RunState::Aborted);
    let report = &run.cases()[0];
    assert_eq!(report.verdict, CaseVerdict::Aborted);
    assert_eq!(report.comparisons.len(), 3);
    assert!(report.diagnostics.iter().any(|d| d.contains("1 of 2 nodes")));
}

fn broken_sequence(name: &str) -> PathBuf {
    let root = PathBuf::from("target").join("unit_orchestrator").join(name);
    let plate = root.join("plate");
    let _ = std::fs::remove_dir_all(&root);
    std::fs::create_dir_all(&plate).unwrap();
    image::RgbaImage::from_pixel(4, 4, image::Rgba([90, 90, 90, 255]))
        .save(plate.join("f_000.png"))
        .unwrap();
    std::fs::write(plate.join("f_001.png"), b"\x89PNG truncated").unwrap();
    root
}

fn sequence_case(id: &str) -> ValidationCase {
    ValidationCase::new(
        id,
        MediaHandle::Sequence {
            dir: "plate".into(),
            fps: FPS24,
            color: ColorSpace::Srgb.into(),
        },
        nodes(&["a"]),
        [0, 1],
    )
}

#[tokio::test(start_paused = true)]
async fn reference_decode_failure_ends_only_that_case() {
    let orch = Orchestrator::new(
        Arc::new(SimulatedCluster::new([SimNodeSpec::healthy("a")])),
        OrchestratorOpts {
            media_root: broken_sequence("inconclusive"),
            ..OrchestratorOpts::default()
        },
    );
    let cases = [
        sequence_case("broken"),
        ValidationCase::new("after", solid(2, FPS24), nodes(&["a"]), [0, 1]),
    ];
    let run = orch.run(&cases, &CancellationToken::new()).await.unwrap();

    assert_eq!(run.state(), RunState::Completed);
    let broken = &run.cases()[0];
    assert_eq!(broken.verdict, CaseVerdict::Inconclusive);
    assert_eq!(broken.comparisons.len(), 1);
    assert!(broken.diagnostics.iter().any(|d| d.contains("reference media")));
    assert_eq!(run.cases()[1].verdict, CaseVerdict::Pass);
    assert_eq!(
        run.verdict(),
        Some(crate::validation::run::RunVerdict::Inconclusive)
    );
}

#[tokio::test(start_paused = true)]
async fn reference_decode_failure_after_a_bad_frame_fails() {
    let orch = Orchestrator::new(
        Arc::new(SimulatedCluster::new([SimNodeSpec::healthy("a").tinted([80, 0, 0])])),
        OrchestratorOpts {
            media_root: broken_sequence("fail"),
            ..OrchestratorOpts::default()
        },
    );
    let run = orch
        .run(&[sequence_case("broken")], &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(run.state(), RunState::Completed);
    assert_eq!(run.cases()[0].verdict, CaseVerdict::Fail);
    assert!(run.cases()[0].diagnostics.iter().any(|d| d.contains("reference media")));
}
