use super::*;

fn media() -> MediaHandle {
    MediaHandle::Solid {
        width: 4,
        height: 4,
        rgba: [0, 0, 0, 255],
        frames: 10,
        fps: Fps { num: 24, den: 1 },
        color: Default::default(),
    }
}

fn case() -> ValidationCase {
    ValidationCase::new("c1", media(), [NodeId::new("a"), NodeId::new("b")], [0, 1, 2])
}

#[test]
fn well_formed_case_validates() {
    assert!(case().validate().is_ok());
    assert_eq!(case().display_name(), "c1");
}

#[test]
fn structural_errors_are_config_errors() {
    let mut c = case();
    c.nodes.clear();
    assert!(matches!(c.validate(), Err(StageCheckError::Config(_))));

    let mut c = case();
    c.nodes.push(NodeId::new("a"));
    let err = c.validate().unwrap_err().to_string();
    assert!(err.contains("listed twice"), "{err}");

    let mut c = case();
    c.timestamps = vec![FrameIndex(0), FrameIndex(2), FrameIndex(2)];
    let err = c.validate().unwrap_err().to_string();
    assert!(err.contains("strictly increase"), "{err}");

    let mut c = case();
    c.timestamps.clear();
    assert!(c.validate().is_err());
}

#[test]
fn tolerance_values_are_checked() {
    let mut t = ToleranceProfile::default();
    t.max_color_delta = -1.0;
    assert!(case().with_tolerance(t).validate().is_err());

    let mut t = ToleranceProfile::default();
    t.capture_timeout_ms = 0;
    assert!(case().with_tolerance(t).validate().is_err());

    let mut t = ToleranceProfile::default();
    t.quorum = Quorum { num: 0, den: 3 };
    assert!(case().with_tolerance(t).validate().is_err());
}

#[test]
fn tolerance_maps_to_policies() {
    let t = ToleranceProfile {
        max_sync_skew_us: 750,
        capture_timeout_ms: 120,
        connect_timeout_ms: 900,
        quorum: Quorum::new(2, 3).unwrap(),
        ..ToleranceProfile::default()
    };
    let p = t.session_policy();
    assert_eq!(p.capture_timeout, Duration::from_millis(120));
    assert_eq!(p.connect_timeout, Duration::from_millis(900));
    assert_eq!(p.quorum.required(3), 2);
    assert_eq!(t.sync_tolerance().max_skew, Duration::from_micros(750));
}

#[test]
fn workflow_filter_and_names() {
    let c = case().with_workflows([Workflow::Icvfx]);
    assert!(c.applies_to(Workflow::Icvfx));
    assert!(!c.applies_to(Workflow::Vad));
    assert!(case().applies_to(Workflow::Vad));
    assert_eq!(Workflow::from_name("VR-Scouting"), Some(Workflow::VrScouting));
    assert_eq!(Workflow::from_name("nope"), None);
}

#[test]
fn case_parses_from_json_with_defaults() {
    let c: ValidationCase = serde_json::from_str(
        r#"{
            "id": "wall-red",
            "media": { "kind": "solid", "width": 8, "height": 8, "rgba": [255, 0, 0, 255],
                       "frames": 4, "fps": { "num": 24, "den": 1 }, "color": "srgb" },
            "timestamps": [0, 1, 3],
            "nodes": ["n1", "n2"],
            "tolerance": { "max_color_delta": 0.5, "quorum": "1/2" },
            "workflows": ["icvfx", "simulcam"]
        }"#,
    )
    .unwrap();
    assert!(c.validate().is_ok());
    assert_eq!(c.tolerance.max_color_delta, 0.5);
    assert_eq!(c.tolerance.capture_timeout_ms, 2_000);
    assert_eq!(c.tolerance.quorum, Quorum { num: 1, den: 2 });
    assert_eq!(c.workflows, vec![Workflow::Icvfx, Workflow::Simulcam]);
    assert_eq!(c.project_fps, None);
}
