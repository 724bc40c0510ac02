//! Conversion of physical radii into per-axis voxel radii.
//!
//! Voxels are usually anisotropic (z spacing several times the in-plane
//! spacing), so one physical radius becomes a different number of voxels
//! along each axis.

use crate::types::{RadiusType, SegmentationError, Spacing};

/// Convert a physical radius into per-axis integer voxel radii.
///
/// Each axis gets `round(physical_radius / spacing[axis])`, never less than
/// `base_radius`.
///
/// # Errors
///
/// Returns [`SegmentationError::InvalidParameter`] if `physical_radius` is
/// negative or not finite, or if `spacing` has a non-positive component.
pub fn pixel_radius(
    physical_radius: f64,
    spacing: &Spacing,
    base_radius: usize,
) -> Result<[usize; 3], SegmentationError> {
    spacing.validate()?;
    if !physical_radius.is_finite() || physical_radius < 0.0 {
        return Err(SegmentationError::InvalidParameter(format!(
            "physical radius must be non-negative, got {physical_radius}"
        )));
    }
    Ok(spacing
        .as_array()
        .map(|s| to_voxels((physical_radius / s).round()).max(base_radius)))
}

/// Per-axis radii for an operation expressed in voxels of the finest axis.
///
/// A radius of `r` means `r` voxels along the axis with the smallest
/// spacing; coarser axes get proportionally fewer voxels. With
/// [`RadiusType::R2D`] only the `(y, x)` plane is considered and the z
/// radius is `0`; with [`RadiusType::No`] every radius is `0`.
///
/// The result is fractional and serves as a per-axis Gaussian sigma;
/// structuring elements use [`structuring_radius`] instead.
///
/// # Errors
///
/// Returns [`SegmentationError::InvalidParameter`] for a non-finite radius
/// or an invalid spacing.
pub fn operation_radius(
    radius: f64,
    spacing: &Spacing,
    radius_type: RadiusType,
) -> Result<[f64; 3], SegmentationError> {
    spacing.validate()?;
    if !radius.is_finite() {
        return Err(SegmentationError::InvalidParameter(format!(
            "radius must be finite, got {radius}"
        )));
    }
    let s = spacing.as_array();
    let radius = radius.abs();
    Ok(match radius_type {
        RadiusType::No => [0.0; 3],
        RadiusType::R2D => {
            let min = s[1].min(s[2]);
            [0.0, radius * min / s[1], radius * min / s[2]]
        }
        RadiusType::R3D => {
            let min = s[0].min(s[1]).min(s[2]);
            s.map(|axis| radius * min / axis)
        }
    })
}

/// Integer per-axis radii of a structuring element `radius` voxels wide
/// along the finest axis in use.
///
/// The radius becomes a physical length on that axis and every axis then
/// gets its own voxel count through [`pixel_radius`]. The sign of `radius`
/// is ignored; the z radius is `0` for [`RadiusType::R2D`] and every radius
/// is `0` for [`RadiusType::No`].
///
/// # Errors
///
/// Returns [`SegmentationError::InvalidParameter`] for a non-finite radius
/// or an invalid spacing.
pub fn structuring_radius(
    radius: f64,
    spacing: &Spacing,
    radius_type: RadiusType,
) -> Result<[usize; 3], SegmentationError> {
    spacing.validate()?;
    let s = spacing.as_array();
    let finest = match radius_type {
        RadiusType::No => return Ok([0; 3]),
        RadiusType::R2D => s[1].min(s[2]),
        RadiusType::R3D => s[0].min(s[1]).min(s[2]),
    };
    let mut voxels = pixel_radius(radius.abs() * finest, spacing, 0)?;
    if radius_type == RadiusType::R2D {
        voxels[0] = 0;
    }
    Ok(voxels)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_voxels(value: f64) -> usize {
    if value <= 0.0 { 0 } else { value as usize }
}
