use serde::{Deserialize, Serialize};

use crate::media::color::LabConverter;

/// How two frames are reduced to a single difference value.
///
/// Channel metrics are expressed in 8-bit code values of the linear working space, so a
/// threshold of `1.0` means "one code value".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaMetric {
    #[default]
    MaxChannel,
    MeanChannel,
    DeltaE76,
}

impl DeltaMetric {
    pub fn name(self) -> &'static str {
        match self {
            Self::MaxChannel => "max_channel",
            Self::MeanChannel => "mean_channel",
            Self::DeltaE76 => "delta_e76",
        }
    }
}

/// Per-pixel difference between two working-space pixels (linear RGB plus straight alpha).
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct PixelDelta {
    pub(crate) channel_sum: f64,
    pub(crate) channel_max: f64,
    pub(crate) delta_e: Option<f64>,
}

impl PixelDelta {
    pub(crate) fn measure(
        metric: DeltaMetric,
        lab: &LabConverter,
        a: [f64; 3],
        a_alpha: u8,
        b: [f64; 3],
        b_alpha: u8,
    ) -> Self {
        let dr = (a[0] - b[0]).abs() * 255.0;
        let dg = (a[1] - b[1]).abs() * 255.0;
        let db = (a[2] - b[2]).abs() * 255.0;
        let da = f64::from(a_alpha.abs_diff(b_alpha));

        let delta_e = match metric {
            DeltaMetric::DeltaE76 => {
                let la = lab.to_lab(a);
                let lb = lab.to_lab(b);
                let d0 = la[0] - lb[0];
                let d1 = la[1] - lb[1];
                let d2 = la[2] - lb[2];
                Some((d0 * d0 + d1 * d1 + d2 * d2).sqrt())
            }
            DeltaMetric::MaxChannel | DeltaMetric::MeanChannel => None,
        };

        Self {
            channel_sum: dr + dg + db + da,
            channel_max: dr.max(dg).max(db).max(da),
            delta_e,
        }
    }

    /// Value compared against the threshold when building the offending region.
    pub(crate) fn score(self, metric: DeltaMetric) -> f64 {
        match metric {
            DeltaMetric::MaxChannel | DeltaMetric::MeanChannel => self.channel_max,
            DeltaMetric::DeltaE76 => self.delta_e.unwrap_or(0.0),
        }
    }
}
