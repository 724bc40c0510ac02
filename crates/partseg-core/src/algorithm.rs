//! Algorithm registry: parameter bundles and dispatch to the engines.
//!
//! [`SegmentationAlgorithm`] is the closed set of segmentation algorithms.
//! Each variant carries its complete parameter bundle, so a serialized
//! value fully describes how a result was produced.

use ndarray::ArrayView3;
use serde::{Deserialize, Serialize};

use crate::flow::FlowDirection;
use crate::label::Connectivity;
use crate::noise::NoiseRemovalKind;
use crate::schema::{
    self, AUTO_THRESHOLD_FIELDS, BASE_THRESHOLD, CHANNEL, CLOSE_HOLES_SIZE, CORE_THRESHOLD,
    FLOW_FIELDS, FieldDescription, GAUSS_RADIUS, MINIMUM_SIZE, PREVIEW_FIELDS, PREVIEW_THRESHOLD,
    THRESHOLD_FIELDS,
};
use crate::smoothing::BorderSmoothingKind;
use crate::sprawl::SprawlKind;
use crate::threshold::Binarization;
use crate::types::{Image, SegmentationError, SegmentationResult};

/// Options for turning a foreground mask into filtered components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentOptions {
    /// Components smaller than this are dropped.
    pub minimum_size: usize,
    /// Group voxels through shared faces only.
    pub side_connection: bool,
    /// Fill enclosed background before labeling.
    pub close_holes: bool,
    /// Largest hole filled, `0` for no limit.
    pub close_holes_size: usize,
    pub smooth_border: BorderSmoothingKind,
    /// Fill each component's per-slice convex hull.
    pub use_convex: bool,
}

impl Default for ComponentOptions {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn default() -> Self {
        Self {
            minimum_size: MINIMUM_SIZE.default as usize,
            side_connection: false,
            close_holes: true,
            close_holes_size: CLOSE_HOLES_SIZE.default as usize,
            smooth_border: BorderSmoothingKind::Opening {
                radius: schema::SMOOTH_BORDER_RADIUS.default,
            },
            use_convex: false,
        }
    }
}

impl ComponentOptions {
    /// Neighbourhood used to group voxels into components.
    #[must_use]
    pub const fn connectivity(&self) -> Connectivity {
        Connectivity::from_side_connection(self.side_connection)
    }

    /// # Errors
    ///
    /// Returns [`SegmentationError::InvalidParameter`] for an out-of-range
    /// field.
    pub fn validate(&self) -> Result<(), SegmentationError> {
        MINIMUM_SIZE.check_count(self.minimum_size)?;
        CLOSE_HOLES_SIZE.check_count(self.close_holes_size)?;
        self.smooth_border.validate()
    }
}

/// Parameters of the threshold preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewParameters {
    pub channel: usize,
    pub noise_removal: NoiseRemovalKind,
    /// Foreground where `value > threshold`.
    pub threshold: f64,
}

impl Default for PreviewParameters {
    fn default() -> Self {
        Self {
            channel: 0,
            noise_removal: NoiseRemovalKind::None,
            threshold: PREVIEW_THRESHOLD.default,
        }
    }
}

/// Parameters of the threshold engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdParameters {
    pub channel: usize,
    pub noise_removal: NoiseRemovalKind,
    pub binarization: Binarization,
    pub components: ComponentOptions,
}

/// Parameters of the flow engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowParameters {
    pub channel: usize,
    pub noise_removal: NoiseRemovalKind,
    pub direction: FlowDirection,
    /// Threshold selecting the seed cores.
    pub core_threshold: f64,
    /// Threshold bounding growth.
    pub base_threshold: f64,
    pub sprawl: SprawlKind,
    pub components: ComponentOptions,
}

impl Default for FlowParameters {
    fn default() -> Self {
        Self {
            channel: 0,
            noise_removal: NoiseRemovalKind::None,
            direction: FlowDirection::Lower,
            core_threshold: CORE_THRESHOLD.default,
            base_threshold: BASE_THRESHOLD.default,
            sprawl: SprawlKind::Euclidean,
            components: ComponentOptions::default(),
        }
    }
}

/// Everything an engine reads besides its parameters.
#[derive(Debug, Clone, Copy)]
pub struct SegmentationInput<'a> {
    pub image: &'a Image,
    /// Time frame to segment.
    pub frame: usize,
    /// Labels claimed by an earlier segmentation, `(z, y, x)`.
    pub exclusion: Option<ArrayView3<'a, u32>>,
    /// Region to segment in, `(z, y, x)`; voxels where it is 0 never
    /// become foreground.
    pub mask: Option<ArrayView3<'a, u8>>,
}

impl<'a> SegmentationInput<'a> {
    /// Segment frame 0 of `image` with no exclusion and no mask.
    #[must_use]
    pub const fn new(image: &'a Image) -> Self {
        Self {
            image,
            frame: 0,
            exclusion: None,
            mask: None,
        }
    }

    #[must_use]
    pub const fn with_frame(mut self, frame: usize) -> Self {
        self.frame = frame;
        self
    }

    #[must_use]
    pub fn with_exclusion(mut self, exclusion: ArrayView3<'a, u32>) -> Self {
        self.exclusion = Some(exclusion);
        self
    }

    #[must_use]
    pub fn with_mask(mut self, mask: ArrayView3<'a, u8>) -> Self {
        self.mask = Some(mask);
        self
    }

    /// The selected frame of one channel.
    pub(crate) fn channel(&self, channel: usize) -> Result<ArrayView3<'a, f32>, SegmentationError> {
        let volume = self.image.volume(self.frame, channel)?;
        if volume.is_empty() {
            return Err(SegmentationError::EmptyInput);
        }
        Ok(volume)
    }
}

/// The closed set of segmentation algorithms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SegmentationAlgorithm {
    /// Binarisation only.
    ThresholdPreview(PreviewParameters),
    /// Lower, upper, range or auto threshold with component analysis.
    Threshold(ThresholdParameters),
    /// Core growth within a base mask.
    Flow(FlowParameters),
}

impl Default for SegmentationAlgorithm {
    fn default() -> Self {
        Self::Threshold(ThresholdParameters::default())
    }
}

impl SegmentationAlgorithm {
    /// User-facing name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ThresholdPreview(_) => "Only Threshold",
            Self::Threshold(p) => p.binarization.name(),
            Self::Flow(p) => match p.direction {
                FlowDirection::Lower => "Lower threshold flow",
                FlowDirection::Upper => "Upper threshold flow",
            },
        }
    }

    /// Declared numeric fields of this algorithm.
    #[must_use]
    pub const fn fields(&self) -> &'static [FieldDescription] {
        match self {
            Self::ThresholdPreview(_) => PREVIEW_FIELDS,
            Self::Threshold(ThresholdParameters {
                binarization: Binarization::Auto { .. },
                ..
            }) => AUTO_THRESHOLD_FIELDS,
            Self::Threshold(_) => THRESHOLD_FIELDS,
            Self::Flow(_) => FLOW_FIELDS,
        }
    }

    /// Check every parameter before any array work.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::InvalidParameter`] describing the
    /// first offending field.
    pub fn validate(&self) -> Result<(), SegmentationError> {
        match self {
            Self::ThresholdPreview(p) => {
                CHANNEL.check_count(p.channel)?;
                check_noise(&p.noise_removal)?;
                PREVIEW_THRESHOLD.check(p.threshold)
            }
            Self::Threshold(p) => {
                CHANNEL.check_count(p.channel)?;
                check_noise(&p.noise_removal)?;
                p.binarization.validate()?;
                p.components.validate()
            }
            Self::Flow(p) => {
                CHANNEL.check_count(p.channel)?;
                check_noise(&p.noise_removal)?;
                CORE_THRESHOLD.check(p.core_threshold)?;
                BASE_THRESHOLD.check(p.base_threshold)?;
                p.direction.check_nesting(p.core_threshold, p.base_threshold)?;
                p.components.validate()
            }
        }
    }

    /// Validate the parameters and run the algorithm.
    ///
    /// `report` receives `(phase name, step index)` before each phase and
    /// once more with "Calculation done".
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::InvalidParameter`] for invalid
    /// parameters or spacing, [`SegmentationError::FrameOutOfRange`] /
    /// [`SegmentationError::ChannelOutOfRange`] for a missing frame or
    /// channel, [`SegmentationError::EmptyInput`] for an image without
    /// voxels, and [`SegmentationError::ShapeMismatch`] if the exclusion
    /// or mask does not match the image. An empty segmentation is not an error.
    pub fn run(
        &self,
        input: &SegmentationInput<'_>,
        report: &mut dyn FnMut(&str, usize),
    ) -> Result<SegmentationResult, SegmentationError> {
        self.validate()?;
        input.image.spacing().validate()?;
        log::debug!("running {}", self.name());
        match self {
            Self::ThresholdPreview(p) => crate::threshold::run_preview(p, input, report),
            Self::Threshold(p) => crate::threshold::run(p, input, report),
            Self::Flow(p) => crate::flow::run(p, input, report),
        }
    }
}

fn check_noise(noise_removal: &NoiseRemovalKind) -> Result<(), SegmentationError> {
    match *noise_removal {
        NoiseRemovalKind::None => Ok(()),
        NoiseRemovalKind::Gauss { radius, .. } => GAUSS_RADIUS.check(radius),
    }
}
