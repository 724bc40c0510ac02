//! Chained segmentations.
//!
//! A [`SegmentationPipeline`] runs a list of masking steps and then a final
//! segmentation. Each step segments the image inside the current mask and
//! turns its result into the next mask with [`calculate_mask`], so a coarse
//! first pass (a whole cell, say) can confine a finer second one (its
//! nucleus).
//!
//! Progress from every inner run is forwarded with a per-step offset, so
//! step indices stay strictly increasing across the whole chain.

use ndarray::ArrayView3;
use serde::{Deserialize, Serialize};

use crate::algorithm::{SegmentationAlgorithm, SegmentationInput};
use crate::diagnostics::Phase;
use crate::mask::{MaskProperty, calculate_mask};
use crate::types::{Image, Mask, SegmentationError, SegmentationResult};

/// Progress phase reported after each step's segmentation.
pub const MASK_CREATION: &str = "Mask creation";

/// Progress indices used by one step: its engine phases plus mask creation.
const STEP_STRIDE: usize = Phase::Done.step() + 2;

/// One masking step: segment, then build the next mask from the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub algorithm: SegmentationAlgorithm,
    pub mask_property: MaskProperty,
}

/// Masking steps followed by a final segmentation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationPipeline {
    pub steps: Vec<PipelineStep>,
    /// Runs inside the mask built by the last step.
    pub segmentation: SegmentationAlgorithm,
}

/// What one masking step produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryElement {
    pub result: SegmentationResult,
    /// Mask the step ran under, `None` for an unmasked first step.
    pub mask: Option<Mask>,
    pub mask_property: MaskProperty,
}

/// Outcome of a whole pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    /// The final segmentation.
    pub result: SegmentationResult,
    /// Mask the final segmentation ran under.
    pub mask: Option<Mask>,
    /// One entry per masking step, in order.
    pub history: Vec<HistoryElement>,
}

impl SegmentationPipeline {
    /// Check every algorithm before any array work.
    ///
    /// # Errors
    ///
    /// Returns the first [`SegmentationError::InvalidParameter`] found.
    pub fn validate(&self) -> Result<(), SegmentationError> {
        for step in &self.steps {
            step.algorithm.validate()?;
        }
        self.segmentation.validate()
    }

    /// Run every step and the final segmentation on frame 0 of `image`.
    ///
    /// `mask`, if given, confines the first step. Built masks are binary;
    /// `save_components` only affects hole filling.
    ///
    /// # Errors
    ///
    /// Returns the first error of any step, of mask creation, or of the
    /// final segmentation. [`SegmentationError::ShapeMismatch`] if `mask`
    /// does not match the image.
    pub fn run(
        &self,
        image: &Image,
        mask: Option<ArrayView3<'_, u8>>,
        report: &mut dyn FnMut(&str, usize),
    ) -> Result<PipelineResult, SegmentationError> {
        self.validate()?;
        let spacing = image.spacing();
        let mut current = mask.map(|m| m.to_owned());
        let mut history = Vec::with_capacity(self.steps.len());

        for (index, step) in self.steps.iter().enumerate() {
            let offset = index * STEP_STRIDE;
            let result = run_masked(&step.algorithm, image, current.as_ref(), &mut |phase, s| {
                report(phase, offset + s);
            })?;
            report(MASK_CREATION, offset + Phase::Done.step() + 1);
            let labels = calculate_mask(
                &step.mask_property,
                result.segmentation.view(),
                current.as_ref().map(Mask::view),
                &spacing,
            )?;
            let next: Mask = labels.mapv(|v| u8::from(v != 0));
            log::debug!(
                "pipeline step {index} ({}) built a mask of {} voxels",
                step.algorithm.name(),
                next.iter().filter(|&&v| v != 0).count()
            );
            history.push(HistoryElement {
                result,
                mask: current.take(),
                mask_property: step.mask_property,
            });
            current = Some(next);
        }

        let offset = self.steps.len() * STEP_STRIDE;
        let result = run_masked(&self.segmentation, image, current.as_ref(), &mut |phase, s| {
            report(phase, offset + s);
        })?;
        Ok(PipelineResult {
            result,
            mask: current,
            history,
        })
    }
}

fn run_masked(
    algorithm: &SegmentationAlgorithm,
    image: &Image,
    mask: Option<&Mask>,
    report: &mut dyn FnMut(&str, usize),
) -> Result<SegmentationResult, SegmentationError> {
    let input = SegmentationInput::new(image);
    let input = match mask {
        Some(mask) => input.with_mask(mask.view()),
        None => input,
    };
    algorithm.run(&input, report)
}
