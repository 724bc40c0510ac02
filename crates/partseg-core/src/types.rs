//! Shared types for the partseg segmentation core.

use ndarray::{Array3, Array5, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

use crate::algorithm::SegmentationAlgorithm;
use crate::diagnostics::SegmentationDiagnostics;

/// Intensity volume, axes `(z, y, x)`.
pub type Volume = Array3<f32>;

/// Binary (or foreground-id) mask, axes `(z, y, x)`.
pub type Mask = Array3<u8>;

/// Label volume, axes `(z, y, x)`. `0` is background.
pub type Labels = Array3<u32>;

/// Physical size of one voxel along each spatial axis, in `(z, y, x)` order.
///
/// Every component is strictly positive; use [`Spacing::new`] to get a
/// validated value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spacing([f64; 3]);

impl Spacing {
    /// Create a validated spacing vector.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::InvalidParameter`] if any component is
    /// not a finite, strictly positive number.
    pub fn new(z: f64, y: f64, x: f64) -> Result<Self, SegmentationError> {
        let spacing = Self([z, y, x]);
        spacing.validate()?;
        Ok(spacing)
    }

    /// Check the positivity invariant.
    ///
    /// Deserialized values bypass [`Spacing::new`], so engines call this
    /// at entry.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::InvalidParameter`] on a non-positive or
    /// non-finite component.
    pub fn validate(&self) -> Result<(), SegmentationError> {
        for (axis, value) in self.0.iter().enumerate() {
            if !value.is_finite() || *value <= 0.0 {
                return Err(SegmentationError::InvalidParameter(format!(
                    "spacing[{axis}] must be positive, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Per-axis values as an array.
    #[must_use]
    pub const fn as_array(&self) -> [f64; 3] {
        self.0
    }

    /// Spacing along one axis (`0 = z`, `1 = y`, `2 = x`).
    #[must_use]
    pub const fn axis(&self, axis: usize) -> f64 {
        self.0[axis]
    }
}

impl Default for Spacing {
    fn default() -> Self {
        Self([1.0, 1.0, 1.0])
    }
}

/// How a radius is applied to a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RadiusType {
    /// Operation disabled.
    #[default]
    No,
    /// Per z-slice, in the `(y, x)` plane only.
    R2D,
    /// Full 3-D neighbourhood.
    R3D,
}

/// A multi-channel, time-resolved image.
///
/// Axes of `data` are `(time, z, y, x, channel)`. A plain 2-D image has
/// one frame, `z = 1` and one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    data: Array5<f32>,
    spacing: Spacing,
}

impl Image {
    /// Wrap raw data with its voxel spacing.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::EmptyInput`] if any axis has length 0,
    /// or [`SegmentationError::InvalidParameter`] for a bad spacing.
    pub fn new(data: Array5<f32>, spacing: Spacing) -> Result<Self, SegmentationError> {
        if data.is_empty() {
            return Err(SegmentationError::EmptyInput);
        }
        spacing.validate()?;
        Ok(Self { data, spacing })
    }

    /// Convenience constructor for a single-frame, single-channel volume.
    ///
    /// # Errors
    ///
    /// Same as [`Image::new`].
    pub fn from_volume(volume: Volume, spacing: Spacing) -> Result<Self, SegmentationError> {
        let data = volume.insert_axis(Axis(0)).insert_axis(Axis(4));
        Self::new(data, spacing)
    }

    #[must_use]
    pub const fn spacing(&self) -> Spacing {
        self.spacing
    }

    #[must_use]
    pub fn frames(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    #[must_use]
    pub fn channels(&self) -> usize {
        self.data.len_of(Axis(4))
    }

    /// Spatial shape `(z, y, x)`.
    #[must_use]
    pub fn spatial_shape(&self) -> [usize; 3] {
        let shape = self.data.shape();
        [shape[1], shape[2], shape[3]]
    }

    /// Borrow one channel of one time frame as a `(z, y, x)` volume.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::FrameOutOfRange`] or
    /// [`SegmentationError::ChannelOutOfRange`] for a bad index.
    pub fn volume(
        &self,
        frame: usize,
        channel: usize,
    ) -> Result<ArrayView3<'_, f32>, SegmentationError> {
        if frame >= self.frames() {
            return Err(SegmentationError::FrameOutOfRange {
                frame,
                frames: self.frames(),
            });
        }
        if channel >= self.channels() {
            return Err(SegmentationError::ChannelOutOfRange {
                channel,
                channels: self.channels(),
            });
        }
        Ok(self
            .data
            .index_axis(Axis(0), frame)
            .index_axis_move(Axis(3), channel))
    }

    /// Reinterpret time frames as z-slices and vice versa.
    ///
    /// Used for files whose writer stored a z-stack as a time series. The
    /// z and time spacing are not known separately, so spacing is kept.
    #[must_use]
    pub fn swap_time_and_stack(&self) -> Self {
        let mut data = self.data.clone();
        data.swap_axes(0, 1);
        Self {
            data: data.as_standard_layout().into_owned(),
            spacing: self.spacing,
        }
    }
}

/// Output of one segmentation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationResult {
    /// Label volume; `0` is background.
    pub segmentation: Labels,
    /// Voxel count per label id, index-aligned; `sizes[0]` is background.
    pub sizes: Vec<usize>,
    /// Threshold actually applied, when an engine adjusted the manual value.
    pub applied_threshold: Option<f64>,
    /// Parameters the result was computed with.
    pub parameters: SegmentationAlgorithm,
    /// Per-phase timings and metrics.
    pub diagnostics: SegmentationDiagnostics,
}

impl SegmentationResult {
    /// Number of foreground labels.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.sizes.len().saturating_sub(1)
    }

    /// Borrow the segmentation, failing if it has no foreground.
    ///
    /// Engines produce all-zero results without error; consumers that need
    /// something to export call this instead.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::NoSegmentation`] when every voxel is 0.
    pub fn require_segmentation(&self) -> Result<&Labels, SegmentationError> {
        if self.segmentation.iter().all(|&v| v == 0) {
            return Err(SegmentationError::NoSegmentation);
        }
        Ok(&self.segmentation)
    }

    /// Inclusive-exclusive extent `[(start, end); 3]` of non-zero voxels,
    /// or `None` for an empty result.
    #[must_use]
    pub fn bounding_box(&self) -> Option<[(usize, usize); 3]> {
        let mut bounds: Option<[(usize, usize); 3]> = None;
        for ((z, y, x), &v) in self.segmentation.indexed_iter() {
            if v == 0 {
                continue;
            }
            let idx = [z, y, x];
            let b = bounds.get_or_insert([(z, z + 1), (y, y + 1), (x, x + 1)]);
            for axis in 0..3 {
                b[axis].0 = b[axis].0.min(idx[axis]);
                b[axis].1 = b[axis].1.max(idx[axis] + 1);
            }
        }
        bounds
    }
}

/// Errors that can occur during segmentation.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum SegmentationError {
    /// A parameter is out of its declared range or otherwise unusable.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// An input array has no voxels.
    #[error("input array is empty")]
    EmptyInput,

    /// Two arrays that must align spatially do not.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Requested channel does not exist.
    #[error("channel {channel} out of range (image has {channels})")]
    ChannelOutOfRange { channel: usize, channels: usize },

    /// Requested time frame does not exist.
    #[error("frame {frame} out of range (image has {frames})")]
    FrameOutOfRange { frame: usize, frames: usize },

    /// A consumer required a non-empty segmentation.
    #[error("no segmentation")]
    NoSegmentation,
}

/// Fail with [`SegmentationError::ShapeMismatch`] unless both shapes agree.
pub(crate) fn ensure_same_shape(
    expected: &[usize],
    actual: &[usize],
) -> Result<(), SegmentationError> {
    if expected == actual {
        Ok(())
    } else {
        Err(SegmentationError::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        })
    }
}
