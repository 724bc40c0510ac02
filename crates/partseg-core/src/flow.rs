//! Flow (sprawl) segmentation.
//!
//! A strict core threshold seeds components and a loose base threshold
//! bounds how far they may grow. Cores are labelled and size filtered,
//! grown inside the base mask by a [`SprawlStrategy`], then passed through
//! the same smoothing, convex fill and exclusion merge as the threshold
//! engine.

use ndarray::ArrayView3;
use serde::{Deserialize, Serialize};

use crate::algorithm::{FlowParameters, SegmentationAlgorithm, SegmentationInput};
use crate::diagnostics::{Phase, PhaseRecorder, StageMetrics};
use crate::label::relabel_by_size;
use crate::pipeline::{self, Exclusion, Region, count_foreground};
use crate::sprawl::SprawlStrategy;
use crate::types::{Mask, SegmentationError, SegmentationResult};

/// Which side of a threshold counts as foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlowDirection {
    /// Bright objects: foreground where `value > threshold`.
    #[default]
    Lower,
    /// Dark objects: foreground where `value < threshold`.
    Upper,
}

impl FlowDirection {
    /// Binarise `volume` against `threshold`.
    #[must_use]
    pub fn mask(self, volume: ArrayView3<'_, f32>, threshold: f64) -> Mask {
        match self {
            Self::Lower => volume.mapv(|v| u8::from(f64::from(v) > threshold)),
            Self::Upper => volume.mapv(|v| u8::from(f64::from(v) < threshold)),
        }
    }

    /// Check that the core threshold selects a subset of the base.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::InvalidParameter`] if the core
    /// threshold is looser than the base threshold.
    pub fn check_nesting(self, core: f64, base: f64) -> Result<(), SegmentationError> {
        let nested = match self {
            Self::Lower => core >= base,
            Self::Upper => core <= base,
        };
        if nested {
            Ok(())
        } else {
            Err(SegmentationError::InvalidParameter(format!(
                "{self:?} flow: core threshold {core} is looser than base threshold {base}"
            )))
        }
    }
}

/// Run the flow engine.
pub(crate) fn run(
    parameters: &FlowParameters,
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

    let direction = parameters.direction;
    let (core, base) = recorder.run(Phase::Threshold, || {
        let mut core = direction.mask(volume.view(), parameters.core_threshold);
        let mut base = direction.mask(volume.view(), parameters.base_threshold);
        pipeline::restrict(&mut core, exclusion.as_ref(), region.as_ref());
        pipeline::restrict(&mut base, exclusion.as_ref(), region.as_ref());
        let metrics = StageMetrics::Threshold {
            threshold: parameters.core_threshold,
            foreground_voxels: count_foreground(&core),
        };
        Ok(((core, base), metrics))
    })?;

    let options = &parameters.components;
    let base = pipeline::close_holes(&mut recorder, base, options)?;
    let cores = pipeline::components(&mut recorder, &core, options)?;

    let sprawl = parameters.sprawl;
    let grown = recorder.run(Phase::Sprawl, || {
        let seeded = count_foreground(&cores.labels);
        let grown = sprawl.grow(
            &cores.labels,
            base.view(),
            volume.view(),
            &spacing,
            options.connectivity(),
        )?;
        let grown = relabel_by_size(&grown).labels;
        let metrics = StageMetrics::Sprawl {
            strategy: sprawl.name().to_string(),
            grown_voxels: count_foreground(&grown).saturating_sub(seeded),
        };
        Ok((grown, metrics))
    })?;

    let labels = pipeline::finish(&mut recorder, grown, options, &spacing, exclusion.as_ref())?;

    let (sizes, summary) = pipeline::summarize(&labels);
    let algorithm = SegmentationAlgorithm::Flow(parameters.clone());
    let diagnostics = recorder.finish(algorithm.name(), summary);
    Ok(SegmentationResult {
        segmentation: labels,
        sizes,
        applied_threshold: None,
        parameters: algorithm,
        diagnostics,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Volume;

    #[test]
    fn direction_masks() {
        let volume = Volume::from_shape_vec((1, 1, 3), vec![1.0, 5.0, 9.0]).unwrap();
        assert_eq!(FlowDirection::Lower.mask(volume.view(), 5.0).as_slice().unwrap(), &[0, 0, 1]);
        assert_eq!(FlowDirection::Upper.mask(volume.view(), 5.0).as_slice().unwrap(), &[1, 0, 0]);
    }

    #[test]
    fn nesting_depends_on_direction() {
        assert!(FlowDirection::Lower.check_nesting(55.0, 45.0).is_ok());
        assert!(FlowDirection::Lower.check_nesting(45.0, 55.0).is_err());
        assert!(FlowDirection::Upper.check_nesting(45.0, 55.0).is_ok());
        assert!(FlowDirection::Upper.check_nesting(55.0, 45.0).is_err());
        assert!(FlowDirection::Upper.check_nesting(50.0, 50.0).is_ok());
    }
}
