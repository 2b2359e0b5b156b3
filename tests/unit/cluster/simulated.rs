use super::*;
use crate::foundation::core::{CaseId, Fps};
use crate::media::color::ColorSpace;
use crate::media::source::MediaHandle;

fn info() -> SessionInfo {
    SessionInfo {
        case: CaseId::new("sim"),
        media: MediaHandle::Solid {
            width: 4,
            height: 4,
            rgba: [100, 100, 100, 255],
            frames: 10,
            fps: Fps { num: 24, den: 1 },
            color: ColorSpace::Srgb.into(),
        },
        media_root: std::path::PathBuf::from("."),
    }
}

fn cue_at(cluster: &SimulatedCluster, ts: u64) -> Cue {
    Cue {
        timestamp: FrameIndex(ts),
        present_at: cluster.now().saturating_add(Duration::from_millis(50)),
    }
}

#[tokio::test(start_paused = true)]
async fn healthy_node_plays_back_reference() {
    let cluster = SimulatedCluster::new([SimNodeSpec::healthy("a").offset_us(250)]);
    let a = NodeId::new("a");
    cluster.connect(&a, &info()).await.unwrap();
    assert_eq!(cluster.connected(), 1);

    let cue = cue_at(&cluster, 3);
    let ack = cluster.cue(&a, cue).await.unwrap();
    assert_eq!(ack.timestamp, FrameIndex(3));

    let got = cluster.capture(&a).await.unwrap();
    assert_eq!(got.timestamp, FrameIndex(3));
    assert_eq!(got.presented_at.offset_from(cue.present_at), 250_000);
    assert_eq!(got.frame.pixel(0, 0), Some([100, 100, 100, 255]));

    cluster.disconnect(&a).await.unwrap();
    assert_eq!(cluster.connected(), 0);
}

#[tokio::test(start_paused = true)]
async fn unreachable_and_unknown_nodes_refuse() {
    let cluster = SimulatedCluster::new([SimNodeSpec::healthy("a").unreachable()]);
    let err = cluster.connect(&NodeId::new("a"), &info()).await.unwrap_err();
    assert!(matches!(err, StageCheckError::NodeUnreachable { .. }));
    let err = cluster.connect(&NodeId::new("zz"), &info()).await.unwrap_err();
    assert!(matches!(err, StageCheckError::NodeUnreachable { .. }));
    assert_eq!(cluster.connected(), 0);
}

#[tokio::test(start_paused = true)]
async fn tint_is_applied_and_clamped() {
    let cluster = SimulatedCluster::new([SimNodeSpec::healthy("a").tinted([200, -150, 5])]);
    let a = NodeId::new("a");
    cluster.connect(&a, &info()).await.unwrap();
    cluster.cue(&a, cue_at(&cluster, 0)).await.unwrap();
    let got = cluster.capture(&a).await.unwrap();
    assert_eq!(got.frame.pixel(1, 1), Some([255, 0, 105, 255]));
}

#[tokio::test(start_paused = true)]
async fn dropped_frame_never_arrives() {
    let cluster = SimulatedCluster::new([SimNodeSpec::healthy("a").dropping([2])]);
    let a = NodeId::new("a");
    cluster.connect(&a, &info()).await.unwrap();
    cluster.cue(&a, cue_at(&cluster, 2)).await.unwrap();
    let r = tokio::time::timeout(Duration::from_secs(5), cluster.capture(&a)).await;
    assert!(r.is_err());
}

#[tokio::test(start_paused = true)]
async fn partition_stops_cues_from_given_frame() {
    let cluster = SimulatedCluster::new([SimNodeSpec::healthy("a").partitioned_at(4)]);
    let a = NodeId::new("a");
    cluster.connect(&a, &info()).await.unwrap();
    assert!(cluster.cue(&a, cue_at(&cluster, 3)).await.is_ok());
    assert!(cluster.cue(&a, cue_at(&cluster, 4)).await.is_err());
}

#[test]
fn node_spec_parses_from_json_with_defaults() {
    let spec: SimNodeSpec =
        serde_json::from_str(r#"{ "id": "wall-1", "drop_frames": [5], "color": "rec709" }"#)
            .unwrap();
    assert_eq!(spec.id, NodeId::new("wall-1"));
    assert_eq!(spec.drop_frames, vec![5]);
    assert_eq!(spec.color, Some(ColorSpace::Rec709.into()));
    assert!(!spec.unreachable);
    assert_eq!(spec.tint, [0, 0, 0]);
}
