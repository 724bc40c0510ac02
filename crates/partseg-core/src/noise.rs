//! Noise removal applied to a channel before binarisation.
//!
//! This module defines the [`NoiseRemoval`] trait for pluggable filters and
//! the [`NoiseRemovalKind`] enum for selecting one at runtime.

use image::Luma;
use imageproc::definitions::Image;
use imageproc::filter;
use ndarray::{ArrayView3, Axis};
use serde::{Deserialize, Serialize};

use crate::spacing::operation_radius;
use crate::types::{RadiusType, SegmentationError, Spacing, Volume};

/// Selects which noise filter runs before thresholding.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum NoiseRemovalKind {
    /// Pass the channel through unchanged.
    #[default]
    None,
    /// Separable Gaussian blur.
    ///
    /// `radius` is the sigma in voxels of the finest axis; coarser axes get
    /// a proportionally smaller sigma. [`RadiusType::R2D`] blurs each
    /// z-slice independently.
    Gauss { radius_type: RadiusType, radius: f64 },
}

/// Trait for noise-removal strategies.
///
/// Output has the same shape as the input.
pub trait NoiseRemoval {
    /// Filter one channel.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::InvalidParameter`] for unusable
    /// parameters.
    fn remove(
        &self,
        channel: ArrayView3<'_, f32>,
        spacing: &Spacing,
    ) -> Result<Volume, SegmentationError>;
}

impl NoiseRemoval for NoiseRemovalKind {
    fn remove(
        &self,
        channel: ArrayView3<'_, f32>,
        spacing: &Spacing,
    ) -> Result<Volume, SegmentationError> {
        match *self {
            Self::None => Ok(channel.to_owned()),
            Self::Gauss { radius_type, radius } => {
                if !radius.is_finite() || radius < 0.0 {
                    return Err(SegmentationError::InvalidParameter(format!(
                        "gauss radius must be non-negative, got {radius}"
                    )));
                }
                let sigma = operation_radius(radius, spacing, radius_type)?;
                match radius_type {
                    RadiusType::R2D => gaussian_blur_slices(channel, [sigma[1], sigma[2]]),
                    RadiusType::R3D | RadiusType::No => Ok(gaussian_blur_3d(channel, sigma)),
                }
            }
        }
    }
}

impl NoiseRemovalKind {
    /// User-facing name of the filter.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Gauss { .. } => "Gauss",
        }
    }
}

/// Gaussian blur of every z-slice on its own, with `(y, x)` sigma.
///
/// Each slice goes through [`imageproc::filter::separable_filter`]; borders
/// are clamped. Non-positive sigmas return the volume unchanged.
///
/// # Errors
///
/// Returns [`SegmentationError::InvalidParameter`] if a slice is too large
/// for an image buffer.
pub fn gaussian_blur_slices(
    volume: ArrayView3<'_, f32>,
    sigma: [f64; 2],
) -> Result<Volume, SegmentationError> {
    let (_, ny, nx) = volume.dim();
    let mut out = volume.to_owned();
    if sigma.iter().all(|&s| s <= 0.0) || ny == 0 || nx == 0 {
        return Ok(out);
    }
    let too_large = || SegmentationError::InvalidParameter(format!("slice {ny}x{nx} is too large"));
    let width = u32::try_from(nx).map_err(|_| too_large())?;
    let height = u32::try_from(ny).map_err(|_| too_large())?;
    let v_kernel = slice_kernel(sigma[0]);
    let h_kernel = slice_kernel(sigma[1]);
    for mut plane in out.axis_iter_mut(Axis(0)) {
        let slice: Image<Luma<f32>> =
            Image::from_fn(width, height, |x, y| Luma([plane[[y as usize, x as usize]]]));
        let blurred = filter::separable_filter(&slice, &h_kernel, &v_kernel);
        for (x, y, pixel) in blurred.enumerate_pixels() {
            plane[[y as usize, x as usize]] = pixel.0[0];
        }
    }
    Ok(out)
}

/// Single-precision kernel; identity for a non-positive sigma.
fn slice_kernel(sigma: f64) -> Vec<f32> {
    if sigma <= 0.0 {
        return vec![1.0];
    }
    #[allow(clippy::cast_possible_truncation)]
    gaussian_kernel(sigma).into_iter().map(|w| w as f32).collect()
}

/// Separable Gaussian blur with per-axis sigma and clamped borders.
///
/// Axes with a non-positive sigma are left untouched.
#[must_use = "returns the blurred volume"]
pub fn gaussian_blur_3d(volume: ArrayView3<'_, f32>, sigma: [f64; 3]) -> Volume {
    let mut out = volume.to_owned();
    for (axis, &s) in sigma.iter().enumerate() {
        if s <= 0.0 || out.len_of(Axis(axis)) < 2 {
            continue;
        }
        let kernel = gaussian_kernel(s);
        let mut line = Vec::with_capacity(out.len_of(Axis(axis)));
        for mut lane in out.lanes_mut(Axis(axis)) {
            line.clear();
            line.extend(lane.iter().copied());
            for (i, v) in lane.iter_mut().enumerate() {
                *v = convolve_at(&line, &kernel, i);
            }
        }
    }
    out
}

/// Normalised kernel truncated at `4 * sigma`.
fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let half = (4.0 * sigma).ceil().max(1.0) as usize;
    let weights: Vec<f64> = (0..=2 * half)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let d = i as f64 - half as f64;
            (-d * d / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

#[allow(clippy::cast_possible_truncation)]
fn convolve_at(line: &[f32], kernel: &[f64], i: usize) -> f32 {
    let half = kernel.len() / 2;
    let last = line.len() - 1;
    kernel
        .iter()
        .enumerate()
        .map(|(k, &w)| {
            let j = (i + k).saturating_sub(half).min(last);
            w * f64::from(line[j])
        })
        .sum::<f64>() as f32
}
