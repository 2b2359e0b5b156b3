use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of color spaces the comparator understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorSpace {
    Srgb,
    LinearSrgb,
    Rec709,
    Rec2020,
    DisplayP3,
    #[serde(rename = "acescg", alias = "aces_cg")]
    AcesCg,
    Aces2065_1,
}

impl ColorSpace {
    pub const ALL: [ColorSpace; 7] = [
        ColorSpace::Srgb,
        ColorSpace::LinearSrgb,
        ColorSpace::Rec709,
        ColorSpace::Rec2020,
        ColorSpace::DisplayP3,
        ColorSpace::AcesCg,
        ColorSpace::Aces2065_1,
    ];

    /// Canonical tag name used in manifests and reports.
    pub fn name(self) -> &'static str {
        match self {
            Self::Srgb => "srgb",
            Self::LinearSrgb => "linear_srgb",
            Self::Rec709 => "rec709",
            Self::Rec2020 => "rec2020",
            Self::DisplayP3 => "display_p3",
            Self::AcesCg => "acescg",
            Self::Aces2065_1 => "aces2065_1",
        }
    }

    /// Parse a tag name, accepting common aliases (case-insensitive).
    pub fn from_name(s: &str) -> Option<Self> {
        let key = s.trim().to_ascii_lowercase().replace(['-', ' ', '.'], "_");
        let space = match key.as_str() {
            "srgb" | "srgb_texture" => Self::Srgb,
            "linear_srgb" | "lin_srgb" | "linear" | "linear_rec709" => Self::LinearSrgb,
            "rec709" | "bt709" | "rec_709" => Self::Rec709,
            "rec2020" | "bt2020" | "bt2020nc" | "rec_2020" => Self::Rec2020,
            "display_p3" | "p3" | "p3_d65" => Self::DisplayP3,
            "acescg" | "aces_cg" | "ap1" => Self::AcesCg,
            "aces2065_1" | "aces" | "ap0" => Self::Aces2065_1,
            _ => return None,
        };
        Some(space)
    }

    fn primaries(self) -> Primaries {
        match self {
            Self::Srgb | Self::LinearSrgb | Self::Rec709 => Primaries {
                r: (0.64, 0.33),
                g: (0.30, 0.60),
                b: (0.15, 0.06),
                white: D65,
            },
            Self::Rec2020 => Primaries {
                r: (0.708, 0.292),
                g: (0.170, 0.797),
                b: (0.131, 0.046),
                white: D65,
            },
            Self::DisplayP3 => Primaries {
                r: (0.680, 0.320),
                g: (0.265, 0.690),
                b: (0.150, 0.060),
                white: D65,
            },
            Self::AcesCg => Primaries {
                r: (0.713, 0.293),
                g: (0.165, 0.830),
                b: (0.128, 0.044),
                white: ACES_WHITE,
            },
            Self::Aces2065_1 => Primaries {
                r: (0.7347, 0.2653),
                g: (0.0, 1.0),
                b: (0.0001, -0.0770),
                white: ACES_WHITE,
            },
        }
    }

    fn transfer(self) -> Transfer {
        match self {
            Self::Srgb | Self::DisplayP3 => Transfer::Srgb,
            Self::Rec709 | Self::Rec2020 => Transfer::Bt709,
            Self::LinearSrgb | Self::AcesCg | Self::Aces2065_1 => Transfer::Linear,
        }
    }

    /// White point of this space in XYZ with `Y = 1`.
    pub fn white_xyz(self) -> [f64; 3] {
        xy_to_xyz(self.primaries().white)
    }

    /// Matrix taking linear RGB in this space to CIE XYZ.
    pub fn rgb_to_xyz(self) -> Mat3 {
        self.primaries().rgb_to_xyz()
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Color-space tag attached to a frame.
///
/// `Unrecognized` keeps the raw name so reports can say what was seen.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum ColorTag {
    Known(ColorSpace),
    Unrecognized(String),
    #[default]
    Untagged,
}

impl ColorTag {
    pub fn parse(s: &str) -> Self {
        if s.trim().is_empty() {
            return Self::Untagged;
        }
        match ColorSpace::from_name(s) {
            Some(space) => Self::Known(space),
            None => Self::Unrecognized(s.to_owned()),
        }
    }

    pub fn known(&self) -> Option<ColorSpace> {
        match self {
            Self::Known(space) => Some(*space),
            _ => None,
        }
    }

    /// Resolve to a concrete space, returning a warning when the fallback is used.
    pub fn resolve(&self, fallback: ColorSpace) -> (ColorSpace, Option<String>) {
        match self {
            Self::Known(space) => (*space, None),
            Self::Unrecognized(name) => (
                fallback,
                Some(format!(
                    "unrecognized color space tag \"{name}\", assumed {fallback}"
                )),
            ),
            Self::Untagged => (
                fallback,
                Some(format!("missing color space tag, assumed {fallback}")),
            ),
        }
    }
}

impl From<ColorSpace> for ColorTag {
    fn from(space: ColorSpace) -> Self {
        Self::Known(space)
    }
}

impl fmt::Display for ColorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(space) => f.write_str(space.name()),
            Self::Unrecognized(name) => f.write_str(name),
            Self::Untagged => f.write_str("untagged"),
        }
    }
}

impl Serialize for ColorTag {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Known(space) => serializer.serialize_str(space.name()),
            Self::Unrecognized(name) => serializer.serialize_str(name),
            Self::Untagged => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for ColorTag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Self::parse).unwrap_or_default())
    }
}

const D65: (f64, f64) = (0.3127, 0.3290);
const ACES_WHITE: (f64, f64) = (0.32168, 0.33767);

#[derive(Clone, Copy, Debug)]
struct Primaries {
    r: (f64, f64),
    g: (f64, f64),
    b: (f64, f64),
    white: (f64, f64),
}

impl Primaries {
    fn rgb_to_xyz(self) -> Mat3 {
        let [rx, ry, rz] = xy_to_xyz(self.r);
        let [gx, gy, gz] = xy_to_xyz(self.g);
        let [bx, by, bz] = xy_to_xyz(self.b);
        let p = Mat3([[rx, gx, bx], [ry, gy, by], [rz, gz, bz]]);
        let s = p.inverse().mul_vec(xy_to_xyz(self.white));
        p.mul(Mat3::diag(s))
    }
}

fn xy_to_xyz((x, y): (f64, f64)) -> [f64; 3] {
    [x / y, 1.0, (1.0 - x - y) / y]
}

/// Row-major 3x3 matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mat3(pub [[f64; 3]; 3]);

impl Mat3 {
    pub const IDENTITY: Mat3 = Mat3([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);

    pub fn diag(v: [f64; 3]) -> Self {
        Mat3([[v[0], 0.0, 0.0], [0.0, v[1], 0.0], [0.0, 0.0, v[2]]])
    }

    pub fn mul(self, rhs: Mat3) -> Mat3 {
        let a = self.0;
        let b = rhs.0;
        let mut out = [[0.0; 3]; 3];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
            }
        }
        Mat3(out)
    }

    pub fn mul_vec(self, v: [f64; 3]) -> [f64; 3] {
        let m = self.0;
        [
            m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
            m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
            m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
        ]
    }

    pub fn inverse(self) -> Mat3 {
        let m = self.0;
        let c00 = m[1][1] * m[2][2] - m[1][2] * m[2][1];
        let c01 = m[1][2] * m[2][0] - m[1][0] * m[2][2];
        let c02 = m[1][0] * m[2][1] - m[1][1] * m[2][0];
        let det = m[0][0] * c00 + m[0][1] * c01 + m[0][2] * c02;
        // Every matrix built here comes from linearly independent primaries.
        let inv_det = 1.0 / det;
        Mat3([
            [
                c00 * inv_det,
                (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
                (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
            ],
            [
                c01 * inv_det,
                (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
                (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
            ],
            [
                c02 * inv_det,
                (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
                (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
            ],
        ])
    }
}

const BRADFORD: Mat3 = Mat3([
    [0.8951, 0.2664, -0.1614],
    [-0.7502, 1.7135, 0.0367],
    [0.0389, -0.0685, 1.0296],
]);

fn bradford_adapt(src_white: [f64; 3], dst_white: [f64; 3]) -> Mat3 {
    let src = BRADFORD.mul_vec(src_white);
    let dst = BRADFORD.mul_vec(dst_white);
    let scale = Mat3::diag([dst[0] / src[0], dst[1] / src[1], dst[2] / src[2]]);
    BRADFORD.inverse().mul(scale).mul(BRADFORD)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Transfer {
    Linear,
    Srgb,
    Bt709,
}

impl Transfer {
    fn decode(self, v: f64) -> f64 {
        match self {
            Self::Linear => v,
            Self::Srgb => {
                if v <= 0.04045 {
                    v / 12.92
                } else {
                    ((v + 0.055) / 1.055).powf(2.4)
                }
            }
            Self::Bt709 => {
                if v < 0.081 {
                    v / 4.5
                } else {
                    ((v + 0.099) / 1.099).powf(1.0 / 0.45)
                }
            }
        }
    }

    fn encode(self, v: f64) -> f64 {
        match self {
            Self::Linear => v,
            Self::Srgb => {
                if v <= 0.0031308 {
                    v * 12.92
                } else {
                    1.055 * v.powf(1.0 / 2.4) - 0.055
                }
            }
            Self::Bt709 => {
                if v < 0.018 {
                    v * 4.5
                } else {
                    1.099 * v.powf(0.45) - 0.099
                }
            }
        }
    }
}

/// Conversion from encoded RGB in a source space to linear RGB in a target space.
#[derive(Clone, Debug)]
pub struct ColorTransform {
    source: ColorSpace,
    target: ColorSpace,
    matrix: Mat3,
    decode_lut: [f64; 256],
}

impl ColorTransform {
    pub fn new(source: ColorSpace, target: ColorSpace) -> Self {
        let matrix = if source.primaries().r == target.primaries().r
            && source.primaries().g == target.primaries().g
            && source.primaries().b == target.primaries().b
            && source.primaries().white == target.primaries().white
        {
            Mat3::IDENTITY
        } else {
            let adapt = bradford_adapt(source.white_xyz(), target.white_xyz());
            target
                .rgb_to_xyz()
                .inverse()
                .mul(adapt)
                .mul(source.rgb_to_xyz())
        };

        let transfer = source.transfer();
        let mut decode_lut = [0.0; 256];
        for (code, slot) in decode_lut.iter_mut().enumerate() {
            *slot = transfer.decode(code as f64 / 255.0);
        }

        Self {
            source,
            target,
            matrix,
            decode_lut,
        }
    }

    pub fn source(&self) -> ColorSpace {
        self.source
    }

    pub fn target(&self) -> ColorSpace {
        self.target
    }

    pub fn matrix(&self) -> Mat3 {
        self.matrix
    }

    /// Encoded 8-bit RGB in the source space to linear RGB in the target space.
    pub fn apply_rgb8(&self, rgb: [u8; 3]) -> [f64; 3] {
        let lin = [
            self.decode_lut[usize::from(rgb[0])],
            self.decode_lut[usize::from(rgb[1])],
            self.decode_lut[usize::from(rgb[2])],
        ];
        self.matrix.mul_vec(lin)
    }

    /// Encoded normalized RGB in the source space to linear RGB in the target space.
    pub fn apply(&self, rgb: [f64; 3]) -> [f64; 3] {
        let transfer = self.source.transfer();
        self.matrix.mul_vec([
            transfer.decode(rgb[0]),
            transfer.decode(rgb[1]),
            transfer.decode(rgb[2]),
        ])
    }
}

/// Apply the transfer function of `space` to linear RGB.
pub fn encode_linear(space: ColorSpace, rgb: [f64; 3]) -> [f64; 3] {
    let t = space.transfer();
    [t.encode(rgb[0]), t.encode(rgb[1]), t.encode(rgb[2])]
}

/// Linear RGB in `space` to CIELAB relative to the space's own white point.
///
/// Builds a [`LabConverter`] per call; use one directly when converting many pixels.
pub fn linear_to_lab(space: ColorSpace, rgb: [f64; 3]) -> [f64; 3] {
    LabConverter::new(space).to_lab(rgb)
}

/// Linear RGB to CIELAB for one space, with the XYZ matrix and white point resolved up front.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LabConverter {
    to_xyz: Mat3,
    white: [f64; 3],
}

impl LabConverter {
    pub fn new(space: ColorSpace) -> Self {
        Self {
            to_xyz: space.rgb_to_xyz(),
            white: space.white_xyz(),
        }
    }

    pub fn to_lab(&self, rgb: [f64; 3]) -> [f64; 3] {
        fn f(t: f64) -> f64 {
            const DELTA: f64 = 6.0 / 29.0;
            if t > DELTA * DELTA * DELTA {
                t.cbrt()
            } else {
                t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
            }
        }

        let xyz = self.to_xyz.mul_vec(rgb);
        let fx = f(xyz[0] / self.white[0]);
        let fy = f(xyz[1] / self.white[1]);
        let fz = f(xyz[2] / self.white[2]);
        [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
    }
}

#[cfg(test)]
#[path = "../../tests/unit/media/color.rs"]
mod tests;
