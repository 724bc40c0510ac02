//! Stages shared by the threshold and flow engines.
//!
//! Each stage runs through a [`PhaseRecorder`], which reports the phase to
//! the caller's progress callback and records its duration and metrics.
//! Stages allocate new arrays; caller-supplied arrays are only read.

use ndarray::{Array3, ArrayView3, Zip};

use crate::algorithm::ComponentOptions;
use crate::convex::convex_fill;
use crate::cutoff::filter_components;
use crate::diagnostics::{Phase, PhaseRecorder, SegmentationSummary, StageMetrics};
use crate::label::{Components, label_components, label_sizes, relabel_by_size};
use crate::morphology::fill_holes;
use crate::noise::{NoiseRemoval, NoiseRemovalKind};
use crate::smoothing::{BorderSmoothing, BorderSmoothingKind};
use crate::types::{Labels, Mask, RadiusType, SegmentationError, Spacing, Volume, ensure_same_shape};

/// Voxels already claimed by an earlier segmentation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Exclusion<'a> {
    labels: ArrayView3<'a, u32>,
    max: u32,
}

impl<'a> Exclusion<'a> {
    /// Wrap an optional exclusion array, checking it against `shape`.
    ///
    /// An all-zero array excludes nothing and is treated as absent.
    pub(crate) fn new(
        labels: Option<ArrayView3<'a, u32>>,
        shape: &[usize],
    ) -> Result<Option<Self>, SegmentationError> {
        let Some(labels) = labels else {
            return Ok(None);
        };
        ensure_same_shape(shape, labels.shape())?;
        let max = labels.iter().copied().max().unwrap_or(0);
        Ok((max > 0).then_some(Self { labels, max }))
    }

    /// Largest excluded id; new labels are shifted above it.
    pub(crate) const fn max(&self) -> u32 {
        self.max
    }

    /// Set excluded voxels of `volume` to zero; returns how many were excluded.
    pub(crate) fn zero_volume(&self, volume: &mut Volume) -> usize {
        let mut excluded = 0;
        Zip::from(volume).and(&self.labels).for_each(|v, &e| {
            if e != 0 {
                *v = 0.0;
                excluded += 1;
            }
        });
        excluded
    }

    /// Remove excluded voxels from `mask`.
    pub(crate) fn clear_mask(&self, mask: &mut Mask) {
        Zip::from(mask).and(&self.labels).for_each(|m, &e| {
            if e != 0 {
                *m = 0;
            }
        });
    }

    /// Shift every label above the excluded ids and overlay the exclusion.
    pub(crate) fn merge(&self, labels: &mut Labels) {
        let offset = self.max;
        Zip::from(labels).and(&self.labels).for_each(|l, &e| {
            if e != 0 {
                *l = e;
            } else if *l != 0 {
                *l = l.saturating_add(offset);
            }
        });
    }
}

/// Region an engine is restricted to.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Region<'a> {
    mask: ArrayView3<'a, u8>,
}

impl<'a> Region<'a> {
    /// Wrap an optional region mask, checking it against `shape`.
    pub(crate) fn new(
        mask: Option<ArrayView3<'a, u8>>,
        shape: &[usize],
    ) -> Result<Option<Self>, SegmentationError> {
        let Some(mask) = mask else {
            return Ok(None);
        };
        ensure_same_shape(shape, mask.shape())?;
        Ok(Some(Self { mask }))
    }

    /// Remove foreground outside the region; returns how many were removed.
    pub(crate) fn clear_outside(&self, mask: &mut Mask) -> usize {
        let mut removed = 0;
        Zip::from(mask).and(&self.mask).for_each(|m, &r| {
            if r == 0 && *m != 0 {
                *m = 0;
                removed += 1;
            }
        });
        removed
    }
}

/// Clear excluded voxels and voxels outside the region from a fresh mask.
pub(crate) fn restrict(
    mask: &mut Mask,
    exclusion: Option<&Exclusion<'_>>,
    region: Option<&Region<'_>>,
) {
    if let Some(exclusion) = exclusion {
        exclusion.clear_mask(mask);
    }
    if let Some(region) = region {
        let removed = region.clear_outside(mask);
        log::trace!("{removed} voxels outside the mask region");
    }
}

// ───────────────────────── Noise removal ──────────────────────────

pub(crate) fn remove_noise(
    recorder: &mut PhaseRecorder<'_>,
    channel: ArrayView3<'_, f32>,
    noise_removal: &NoiseRemovalKind,
    spacing: &Spacing,
) -> Result<Volume, SegmentationError> {
    recorder.run(Phase::NoiseRemoval, || {
        let filtered = noise_removal.remove(channel, spacing)?;
        let metrics = StageMetrics::NoiseRemoval {
            filter: noise_removal.name().to_string(),
        };
        Ok((filtered, metrics))
    })
}

/// Zero excluded voxels of the filtered channel.
pub(crate) fn apply_exclusion(
    recorder: &mut PhaseRecorder<'_>,
    volume: &mut Volume,
    exclusion: Option<&Exclusion<'_>>,
) -> Result<(), SegmentationError> {
    let Some(exclusion) = exclusion else {
        return Ok(());
    };
    recorder.run(Phase::Exclusion, || {
        let excluded_voxels = exclusion.zero_volume(volume);
        Ok(((), StageMetrics::Exclusion { excluded_voxels }))
    })
}

// ───────────────────────── Components ──────────────────────────

pub(crate) fn close_holes(
    recorder: &mut PhaseRecorder<'_>,
    mask: Mask,
    options: &ComponentOptions,
) -> Result<Mask, SegmentationError> {
    if !options.close_holes {
        return Ok(mask);
    }
    recorder.run(Phase::HoleClosing, || {
        let closed = fill_holes(mask.view(), RadiusType::R3D, options.close_holes_size)?;
        let metrics = StageMetrics::HoleClosing {
            max_hole_size: options.close_holes_size,
            filled_voxels: count_foreground(&closed) - count_foreground(&mask),
        };
        Ok((closed, metrics))
    })
}

/// Label `mask` and drop components below the minimum size.
pub(crate) fn components(
    recorder: &mut PhaseRecorder<'_>,
    mask: &Mask,
    options: &ComponentOptions,
) -> Result<Components, SegmentationError> {
    recorder.run(Phase::Components, || {
        let labelled = label_components(mask.view(), options.connectivity());
        let found = labelled.count();
        let kept = filter_components(labelled, options.minimum_size);
        let metrics = StageMetrics::Components {
            found,
            kept: kept.count(),
            minimum_size: options.minimum_size,
        };
        Ok((kept, metrics))
    })
}

/// Smoothing, convex fill and exclusion merge, in that order.
///
/// Labels are renumbered by descending size after every stage that can
/// change region sizes, before the exclusion offset is applied.
pub(crate) fn finish(
    recorder: &mut PhaseRecorder<'_>,
    mut labels: Labels,
    options: &ComponentOptions,
    spacing: &Spacing,
    exclusion: Option<&Exclusion<'_>>,
) -> Result<Labels, SegmentationError> {
    if options.smooth_border != BorderSmoothingKind::None {
        labels = recorder.run(Phase::Smoothing, || {
            let before = count_foreground(&labels);
            let smoothed = relabel_by_size(&options.smooth_border.smooth(&labels, spacing)?).labels;
            let metrics = StageMetrics::Smoothing {
                strategy: options.smooth_border.name().to_string(),
                removed_voxels: before - count_foreground(&smoothed),
            };
            Ok((smoothed, metrics))
        })?;
    }

    if options.use_convex {
        labels = recorder.run(Phase::ConvexFill, || {
            let before = count_foreground(&labels);
            let filled = relabel_by_size(&convex_fill(&labels)).labels;
            let metrics = StageMetrics::ConvexFill {
                filled_voxels: count_foreground(&filled) - before,
            };
            Ok((filled, metrics))
        })?;
    }

    if let Some(exclusion) = exclusion {
        recorder.run(Phase::ExclusionMerge, || {
            exclusion.merge(&mut labels);
            Ok((
                (),
                StageMetrics::ExclusionMerge {
                    label_offset: exclusion.max(),
                },
            ))
        })?;
    }
    Ok(labels)
}

/// Size histogram and summary of a finished label volume.
pub(crate) fn summarize(labels: &Labels) -> (Vec<usize>, SegmentationSummary) {
    let sizes = label_sizes(labels);
    let summary = SegmentationSummary {
        voxel_count: labels.len(),
        foreground_voxels: labels.len() - sizes[0],
        component_count: sizes.iter().skip(1).filter(|&&s| s > 0).count(),
    };
    (sizes, summary)
}

pub(crate) fn count_foreground<T: Copy + Default + PartialEq>(array: &Array3<T>) -> usize {
    let zero = T::default();
    array.iter().filter(|&&v| v != zero).count()
}
