//! Threshold segmentation.
//!
//! The filtered channel is binarised by a [`Binarization`] rule and the
//! mask is passed through the shared component pipeline:
//!
//! noise removal -> exclusion -> binarisation -> hole closing ->
//! component labeling -> size cutoff -> smoothing -> convex fill ->
//! exclusion merge.

use ndarray::ArrayView3;
use serde::{Deserialize, Serialize};

use crate::algorithm::{
    PreviewParameters, SegmentationAlgorithm, SegmentationInput, ThresholdParameters,
};
use crate::diagnostics::{Phase, PhaseRecorder, StageMetrics};
use crate::label::{Connectivity, label_where};
use crate::pipeline::{self, Exclusion, Region, count_foreground};
use crate::types::{Mask, SegmentationError, SegmentationResult};

/// How voxel intensities become foreground.
///
/// All comparisons are strict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Binarization {
    /// Foreground where `value > threshold`.
    Lower { threshold: f64 },
    /// Foreground where `value < threshold`.
    Upper { threshold: f64 },
    /// Foreground where `lower < value < upper`.
    Range { lower: f64, upper: f64 },
    /// Foreground where `value > threshold`, with `threshold` raised to the
    /// darkest voxel of the maximum-connected-components region.
    Auto { threshold: f64, suggested_size: usize },
}

impl Default for Binarization {
    fn default() -> Self {
        Self::Lower {
            threshold: crate::schema::THRESHOLD.default,
        }
    }
}

impl Binarization {
    /// User-facing name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Lower { .. } => "Lower threshold",
            Self::Upper { .. } => "Upper threshold",
            Self::Range { .. } => "Range threshold",
            Self::Auto { .. } => "Auto threshold",
        }
    }

    /// Check thresholds against their declared ranges.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::InvalidParameter`] for an out-of-range
    /// value or a range whose lower bound exceeds its upper bound.
    pub fn validate(&self) -> Result<(), SegmentationError> {
        use crate::schema::{SUGGESTED_SIZE, THRESHOLD};
        match *self {
            Self::Lower { threshold } | Self::Upper { threshold } => THRESHOLD.check(threshold),
            Self::Range { lower, upper } => {
                THRESHOLD.check(lower)?;
                THRESHOLD.check(upper)?;
                if lower > upper {
                    return Err(SegmentationError::InvalidParameter(format!(
                        "range lower bound {lower} exceeds upper bound {upper}"
                    )));
                }
                Ok(())
            }
            Self::Auto {
                threshold,
                suggested_size,
            } => {
                THRESHOLD.check(threshold)?;
                SUGGESTED_SIZE.check_count(suggested_size)
            }
        }
    }

    /// Binarise `volume`, returning the mask and, for [`Self::Auto`], the
    /// threshold actually applied.
    #[must_use]
    pub fn apply(&self, volume: ArrayView3<'_, f32>) -> (Mask, Option<f64>) {
        match *self {
            Self::Lower { threshold } => (above(volume, threshold), None),
            Self::Upper { threshold } => {
                (volume.mapv(|v| u8::from(f64::from(v) < threshold)), None)
            }
            Self::Range { lower, upper } => (
                volume.mapv(|v| {
                    let v = f64::from(v);
                    u8::from(lower < v && v < upper)
                }),
                None,
            ),
            Self::Auto {
                threshold,
                suggested_size,
            } => {
                let applied = auto_threshold(volume, threshold, suggested_size);
                (above(volume, applied), Some(applied))
            }
        }
    }

    /// Manual threshold value used for reporting.
    const fn reported_threshold(&self) -> f64 {
        match *self {
            Self::Lower { threshold }
            | Self::Upper { threshold }
            | Self::Auto { threshold, .. } => threshold,
            Self::Range { lower, .. } => lower,
        }
    }
}

fn above(volume: ArrayView3<'_, f32>, threshold: f64) -> Mask {
    volume.mapv(|v| u8::from(f64::from(v) > threshold))
}

const MAX_SEARCH_ITERATIONS: usize = 64;

/// Threshold maximising the number of large components.
///
/// Searches `[min, max]` of `volume` for the level `t` at which the
/// face-connected regions of `value >= t` contain the most components of at
/// least `minimum_object_size` voxels, by repeatedly comparing the counts
/// at the quarter points of the bracket and keeping the better half.
#[must_use]
pub fn maximum_components_threshold(
    volume: ArrayView3<'_, f32>,
    minimum_object_size: usize,
) -> f64 {
    let (lo, hi) = volume
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(f64::from(v)), hi.max(f64::from(v)))
        });
    if !lo.is_finite() {
        return 0.0;
    }
    let count = |t: f64| {
        label_where(volume, Connectivity::Face, |&v| f64::from(v) >= t)
            .sizes
            .iter()
            .skip(1)
            .filter(|&&s| s >= minimum_object_size)
            .count()
    };

    let (mut lower, mut upper) = (lo, hi);
    for _ in 0..MAX_SEARCH_ITERATIONS {
        if upper - lower <= 2.0 {
            break;
        }
        let mid = f64::midpoint(lower, upper);
        let left = f64::midpoint(lower, mid);
        let right = f64::midpoint(mid, upper);
        if count(right) >= count(left) {
            lower = left;
        } else {
            upper = right;
        }
    }
    f64::midpoint(lower, upper)
}

/// Raise `manual` to the darkest voxel selected by the automatic search.
///
/// The manual value is never lowered.
#[must_use]
pub fn auto_threshold(volume: ArrayView3<'_, f32>, manual: f64, suggested_size: usize) -> f64 {
    let level = maximum_components_threshold(volume, suggested_size);
    let darkest = volume
        .iter()
        .map(|&v| f64::from(v))
        .filter(|&v| v >= level)
        .fold(f64::INFINITY, f64::min);
    if darkest.is_finite() && darkest > manual {
        log::debug!("auto threshold raised {manual} to {darkest}");
        darkest
    } else {
        manual
    }
}

/// Run the threshold engine.
pub(crate) fn run(
    parameters: &ThresholdParameters,
    input: &SegmentationInput<'_>,
    report: &mut dyn FnMut(&str, usize),
) -> Result<SegmentationResult, SegmentationError> {
    let channel = input.channel(parameters.channel)?;
    let spacing = input.image.spacing();
    let exclusion = Exclusion::new(input.exclusion, channel.shape())?;
    let region = Region::new(input.mask, channel.shape())?;

    let mut recorder = PhaseRecorder::new(report);
    let mut volume =
        pipeline::remove_noise(&mut recorder, channel, &parameters.noise_removal, &spacing)?;
    pipeline::apply_exclusion(&mut recorder, &mut volume, exclusion.as_ref())?;

    let binarization = parameters.binarization;
    let (mask, applied) = recorder.run(Phase::Threshold, || {
        let (mut mask, applied) = binarization.apply(volume.view());
        pipeline::restrict(&mut mask, exclusion.as_ref(), region.as_ref());
        let metrics = StageMetrics::Threshold {
            threshold: applied.unwrap_or_else(|| binarization.reported_threshold()),
            foreground_voxels: count_foreground(&mask),
        };
        Ok(((mask, applied), metrics))
    })?;

    let options = &parameters.components;
    let mask = pipeline::close_holes(&mut recorder, mask, options)?;
    let components = pipeline::components(&mut recorder, &mask, options)?;
    let labels = pipeline::finish(
        &mut recorder,
        components.labels,
        options,
        &spacing,
        exclusion.as_ref(),
    )?;

    let (sizes, summary) = pipeline::summarize(&labels);
    let algorithm = SegmentationAlgorithm::Threshold(parameters.clone());
    let diagnostics = recorder.finish(algorithm.name(), summary);
    Ok(SegmentationResult {
        segmentation: labels,
        sizes,
        applied_threshold: applied,
        parameters: algorithm,
        diagnostics,
    })
}

/// Run the threshold preview: binarisation only, no component analysis.
///
/// With an exclusion, the foreground takes the id one above the largest
/// excluded id and excluded voxels keep their ids.
pub(crate) fn run_preview(
    parameters: &PreviewParameters,
    input: &SegmentationInput<'_>,
    report: &mut dyn FnMut(&str, usize),
) -> Result<SegmentationResult, SegmentationError> {
    let channel = input.channel(parameters.channel)?;
    let spacing = input.image.spacing();
    let exclusion = Exclusion::new(input.exclusion, channel.shape())?;
    let region = Region::new(input.mask, channel.shape())?;

    let mut recorder = PhaseRecorder::new(report);
    let volume =
        pipeline::remove_noise(&mut recorder, channel, &parameters.noise_removal, &spacing)?;

    let threshold = parameters.threshold;
    let labels = recorder.run(Phase::Threshold, || {
        let mut mask = above(volume.view(), threshold);
        pipeline::restrict(&mut mask, None, region.as_ref());
        let metrics = StageMetrics::Threshold {
            threshold,
            foreground_voxels: count_foreground(&mask),
        };
        Ok((mask.mapv(u32::from), metrics))
    })?;

    let labels = match &exclusion {
        None => labels,
        Some(exclusion) => recorder.run(Phase::ExclusionMerge, || {
            let mut merged = labels;
            exclusion.merge(&mut merged);
            let metrics = StageMetrics::ExclusionMerge {
                label_offset: exclusion.max(),
            };
            Ok((merged, metrics))
        })?,
    };

    let (sizes, summary) = pipeline::summarize(&labels);
    let algorithm = SegmentationAlgorithm::ThresholdPreview(parameters.clone());
    let diagnostics = recorder.finish(algorithm.name(), summary);
    Ok(SegmentationResult {
        segmentation: labels,
        sizes,
        applied_threshold: None,
        parameters: algorithm,
        diagnostics,
    })
}
