use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    compare::metric::{DeltaMetric, PixelDelta},
    foundation::core::{FrameIndex, NodeId, PixelRect},
    foundation::error::{StageCheckError, StageCheckResult},
    media::{
        color::{ColorSpace, ColorTransform, LabConverter},
        frame::{Frame, FrameSample},
    },
};

/// Comparator configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparatorOpts {
    /// Linear space both frames are converted into before differencing.
    pub working_space: ColorSpace,
    /// Space assumed for frames whose tag is missing or unrecognized.
    pub fallback_space: ColorSpace,
    pub metric: DeltaMetric,
}

impl Default for ComparatorOpts {
    fn default() -> Self {
        Self {
            working_space: ColorSpace::AcesCg,
            fallback_space: ColorSpace::Srgb,
            metric: DeltaMetric::MaxChannel,
        }
    }
}

/// Raw difference between two frames, before attribution to a node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameDelta {
    pub metric: DeltaMetric,
    pub value: f64,
    pub mean_channel_delta: f64,
    pub max_channel_delta: f64,
    pub max_delta_e: Option<f64>,
    pub region: Option<PixelRect>,
    pub warnings: Vec<String>,
}

/// Outcome of comparing one captured frame against its reference.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub node: NodeId,
    pub timestamp: FrameIndex,
    pub metric: DeltaMetric,
    pub value: f64,
    pub threshold: f64,
    pub passed: bool,
    pub mean_channel_delta: f64,
    pub max_channel_delta: f64,
    pub max_delta_e: Option<f64>,
    /// Bounding box of pixels whose own delta exceeds the threshold.
    pub region: Option<PixelRect>,
    pub warnings: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default)]
struct RowStats {
    channel_sum: f64,
    channel_max: f64,
    delta_e_max: f64,
    region: Option<PixelRect>,
}

#[derive(Clone, Debug, Default)]
pub struct Comparator {
    opts: ComparatorOpts,
}

impl Comparator {
    pub fn new(opts: ComparatorOpts) -> Self {
        Self { opts }
    }

    pub fn opts(&self) -> &ComparatorOpts {
        &self.opts
    }

    /// Compare a captured sample against its reference frame.
    pub fn compare(
        &self,
        reference: &Frame,
        captured: &FrameSample,
        max_delta: f64,
    ) -> StageCheckResult<ComparisonResult> {
        let delta = self.compare_frames(reference, &captured.frame, max_delta)?;
        Ok(ComparisonResult {
            node: captured.node.clone(),
            timestamp: captured.timestamp,
            metric: delta.metric,
            passed: delta.value <= max_delta,
            value: delta.value,
            threshold: max_delta,
            mean_channel_delta: delta.mean_channel_delta,
            max_channel_delta: delta.max_channel_delta,
            max_delta_e: delta.max_delta_e,
            region: delta.region,
            warnings: delta.warnings,
        })
    }

    /// Difference two frames in the working space.
    ///
    /// Rows are processed in parallel; row statistics are reduced in row order so the result is
    /// bit-identical across runs and thread counts.
    pub fn compare_frames(
        &self,
        reference: &Frame,
        captured: &Frame,
        max_delta: f64,
    ) -> StageCheckResult<FrameDelta> {
        reference.check_buffer()?;
        captured.check_buffer()?;
        if reference.dimensions() != captured.dimensions() {
            return Err(StageCheckError::FrameShapeMismatch {
                reference: reference.dimensions(),
                captured: captured.dimensions(),
            });
        }

        let mut warnings = Vec::new();
        let (ref_space, ref_warn) = reference.color.resolve(self.opts.fallback_space);
        if let Some(w) = ref_warn {
            warnings.push(format!("reference: {w}"));
        }
        let (cap_space, cap_warn) = captured.color.resolve(self.opts.fallback_space);
        if let Some(w) = cap_warn {
            warnings.push(format!("captured: {w}"));
        }

        let working = self.opts.working_space;
        let metric = self.opts.metric;
        let ref_xf = ColorTransform::new(ref_space, working);
        let cap_xf = ColorTransform::new(cap_space, working);
        let lab = LabConverter::new(working);

        let width = reference.width as usize;
        let stride = width * 4;
        let ref_px = reference.rgba8.as_slice();
        let cap_px = captured.rgba8.as_slice();

        let rows: Vec<RowStats> = (0..reference.height)
            .into_par_iter()
            .map(|y| {
                let start = y as usize * stride;
                let ref_row = &ref_px[start..start + stride];
                let cap_row = &cap_px[start..start + stride];

                let mut stats = RowStats::default();
                for (x, (a, b)) in ref_row
                    .chunks_exact(4)
                    .zip(cap_row.chunks_exact(4))
                    .enumerate()
                {
                    let la = ref_xf.apply_rgb8([a[0], a[1], a[2]]);
                    let lb = cap_xf.apply_rgb8([b[0], b[1], b[2]]);
                    let d = PixelDelta::measure(metric, &lab, la, a[3], lb, b[3]);

                    stats.channel_sum += d.channel_sum;
                    stats.channel_max = stats.channel_max.max(d.channel_max);
                    if let Some(de) = d.delta_e {
                        stats.delta_e_max = stats.delta_e_max.max(de);
                    }
                    if d.score(metric) > max_delta {
                        let px = PixelRect::point(x as u32, y);
                        stats.region = Some(stats.region.map_or(px, |r| r.union(px)));
                    }
                }
                stats
            })
            .collect();

        let mut channel_sum = 0.0;
        let mut channel_max: f64 = 0.0;
        let mut delta_e_max: f64 = 0.0;
        let mut region: Option<PixelRect> = None;
        for row in &rows {
            channel_sum += row.channel_sum;
            channel_max = channel_max.max(row.channel_max);
            delta_e_max = delta_e_max.max(row.delta_e_max);
            if let Some(r) = row.region {
                region = Some(region.map_or(r, |acc| acc.union(r)));
            }
        }

        let samples = reference.width as u64 * reference.height as u64 * 4;
        let mean = if samples == 0 {
            0.0
        } else {
            channel_sum / samples as f64
        };
        let max_delta_e = (metric == DeltaMetric::DeltaE76).then_some(delta_e_max);
        let value = match metric {
            DeltaMetric::MaxChannel => channel_max,
            DeltaMetric::MeanChannel => mean,
            DeltaMetric::DeltaE76 => delta_e_max,
        };

        Ok(FrameDelta {
            metric,
            value,
            mean_channel_delta: mean,
            max_channel_delta: channel_max,
            max_delta_e,
            region,
            warnings,
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compare/comparator.rs"]
mod tests;
