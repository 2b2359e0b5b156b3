use super::*;

fn assert_close(a: [f64; 3], b: [f64; 3], eps: f64) {
    for i in 0..3 {
        assert!((a[i] - b[i]).abs() < eps, "{a:?} vs {b:?}");
    }
}

#[test]
fn parses_names_and_aliases() {
    assert_eq!(ColorSpace::from_name("sRGB"), Some(ColorSpace::Srgb));
    assert_eq!(ColorSpace::from_name("bt2020nc"), Some(ColorSpace::Rec2020));
    assert_eq!(ColorSpace::from_name("ACEScg"), Some(ColorSpace::AcesCg));
    assert_eq!(ColorSpace::from_name("Display-P3"), Some(ColorSpace::DisplayP3));
    assert_eq!(ColorSpace::from_name("xyz"), None);

    for space in ColorSpace::ALL {
        assert_eq!(ColorSpace::from_name(space.name()), Some(space));
    }
}

#[test]
fn tag_resolution_warns_on_fallback() {
    let (space, warn) = ColorTag::Known(ColorSpace::Rec709).resolve(ColorSpace::Srgb);
    assert_eq!(space, ColorSpace::Rec709);
    assert!(warn.is_none());

    let (space, warn) = ColorTag::parse("log-c").resolve(ColorSpace::Srgb);
    assert_eq!(space, ColorSpace::Srgb);
    assert!(warn.unwrap().contains("log-c"));

    let (_, warn) = ColorTag::parse("").resolve(ColorSpace::Srgb);
    assert!(warn.unwrap().contains("missing"));
}

#[test]
fn tag_serde_uses_names_and_null() {
    let tag: ColorTag = serde_json::from_value(serde_json::json!("rec709")).unwrap();
    assert_eq!(tag, ColorTag::Known(ColorSpace::Rec709));
    let tag: ColorTag = serde_json::from_value(serde_json::json!(null)).unwrap();
    assert_eq!(tag, ColorTag::Untagged);
    let tag: ColorTag = serde_json::from_value(serde_json::json!("mystery")).unwrap();
    assert_eq!(tag, ColorTag::Unrecognized("mystery".to_owned()));

    assert_eq!(
        serde_json::to_value(ColorTag::Known(ColorSpace::AcesCg)).unwrap(),
        serde_json::json!("acescg")
    );
}

#[test]
fn same_primaries_use_identity_matrix() {
    let t = ColorTransform::new(ColorSpace::Srgb, ColorSpace::LinearSrgb);
    assert_eq!(t.matrix(), Mat3::IDENTITY);
    assert_close(t.apply_rgb8([255, 0, 0]), [1.0, 0.0, 0.0], 1e-12);
}

#[test]
fn srgb_red_in_acescg_matches_reference_matrix() {
    let t = ColorTransform::new(ColorSpace::Srgb, ColorSpace::AcesCg);
    let red = t.apply_rgb8([255, 0, 0]);
    assert_close(red, [0.6131, 0.0702, 0.0206], 1e-3);
}

#[test]
fn conversions_round_trip_between_spaces() {
    for a in ColorSpace::ALL {
        for b in ColorSpace::ALL {
            let there = ColorTransform::new(a, b).matrix();
            let back = ColorTransform::new(b, a).matrix();
            let id = there.mul(back);
            for i in 0..3 {
                for j in 0..3 {
                    let expect = if i == j { 1.0 } else { 0.0 };
                    assert!((id.0[i][j] - expect).abs() < 1e-9, "{a} <-> {b}");
                }
            }
        }
    }
}

#[test]
fn transfer_encode_inverts_decode() {
    for space in [ColorSpace::Srgb, ColorSpace::Rec709, ColorSpace::AcesCg] {
        let t = ColorTransform::new(space, space);
        let lin = t.apply([0.25, 0.5, 0.75]);
        assert_close(encode_linear(space, lin), [0.25, 0.5, 0.75], 1e-9);
    }
}

#[test]
fn white_maps_to_lab_l100() {
    let lab = linear_to_lab(ColorSpace::AcesCg, [1.0, 1.0, 1.0]);
    assert_close(lab, [100.0, 0.0, 0.0], 1e-6);
    let black = linear_to_lab(ColorSpace::AcesCg, [0.0, 0.0, 0.0]);
    assert_close(black, [0.0, 0.0, 0.0], 1e-9);
}

#[test]
fn lab_converter_matches_one_shot_conversion() {
    let lab = LabConverter::new(ColorSpace::Rec2020);
    for rgb in [[0.2, 0.4, 0.6], [1.0, 0.0, 0.5], [0.0, 0.0, 0.0]] {
        assert_eq!(lab.to_lab(rgb), linear_to_lab(ColorSpace::Rec2020, rgb));
    }
}
