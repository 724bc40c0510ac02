//! Mask creation from an existing segmentation.
//!
//! A finished segmentation is turned into a mask for the next analysis
//! pass: optionally collapsed to a single foreground value, grown or shrunk,
//! with holes filled, and clipped to the mask the segmentation itself was
//! computed under.

use ndarray::ArrayView3;
use serde::{Deserialize, Serialize};

use crate::morphology::{clip_to_mask, dilate_signed, fill_holes_by_components};
use crate::types::{Labels, RadiusType, SegmentationError, Spacing};

/// Parameters for [`calculate_mask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskProperty {
    /// Plane or volume neighbourhood for dilation; [`RadiusType::No`]
    /// disables it.
    pub dilate: RadiusType,
    /// Signed radius in voxels of the finest axis: positive dilates,
    /// negative erodes.
    pub dilate_radius: i32,
    /// Plane or volume hole filling; [`RadiusType::No`] disables it.
    pub fill_holes: RadiusType,
    /// Largest hole filled, `0` for no limit.
    pub max_holes_size: usize,
    /// Keep distinct component ids instead of a binary mask.
    pub save_components: bool,
    /// Intersect with the previous mask.
    pub clip_to_mask: bool,
}

impl Default for MaskProperty {
    fn default() -> Self {
        Self {
            dilate: RadiusType::No,
            dilate_radius: 0,
            fill_holes: RadiusType::No,
            max_holes_size: 0,
            save_components: false,
            clip_to_mask: false,
        }
    }
}

/// Build a mask from `segmentation`.
///
/// Steps, in order: binarise (unless `save_components`), dilate or erode,
/// fill holes (per component when `save_components`), clip to `old_mask`.
/// `old_mask` is ignored unless `clip_to_mask` is set.
///
/// # Errors
///
/// Returns [`SegmentationError::EmptyInput`] for an empty segmentation,
/// [`SegmentationError::ShapeMismatch`] if `old_mask` does not match, and
/// [`SegmentationError::InvalidParameter`] for an invalid spacing.
pub fn calculate_mask(
    property: &MaskProperty,
    segmentation: ArrayView3<'_, u32>,
    old_mask: Option<ArrayView3<'_, u8>>,
    spacing: &Spacing,
) -> Result<Labels, SegmentationError> {
    if segmentation.is_empty() {
        return Err(SegmentationError::EmptyInput);
    }
    spacing.validate()?;

    let mut mask: Labels = if property.save_components {
        segmentation.to_owned()
    } else {
        segmentation.mapv(|v| u32::from(v != 0))
    };

    if property.dilate != RadiusType::No && property.dilate_radius != 0 {
        mask = dilate_signed(
            mask.view(),
            f64::from(property.dilate_radius),
            spacing,
            property.dilate,
        )?;
    }

    if property.fill_holes != RadiusType::No {
        // A binary mask is a single component with id 1.
        mask = fill_holes_by_components(&mask, property.fill_holes, property.max_holes_size)?;
    }

    if property.clip_to_mask
        && let Some(old_mask) = old_mask
    {
        mask = clip_to_mask(mask.view(), old_mask)?;
    }

    Ok(mask)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ndarray::s;

    use super::*;
    use crate::types::Mask;

    fn build(property: &MaskProperty, seg: &Labels) -> Result<Labels, SegmentationError> {
        calculate_mask(property, seg.view(), None, &Spacing::default())
    }

    #[test]
    fn default_is_identity_on_binary() {
        let mut seg = Labels::zeros((4, 6, 6));
        seg.slice_mut(s![1..3, 1..5, 1..5]).fill(1);
        let out = build(&MaskProperty::default(), &seg).unwrap();
        assert_eq!(out, seg);
    }

    #[test]
    fn collapses_labels_unless_saving_components() {
        let mut seg = Labels::zeros((1, 4, 4));
        seg[[0, 0, 0]] = 1;
        seg[[0, 3, 3]] = 5;
        let collapsed = build(&MaskProperty::default(), &seg).unwrap();
        assert_eq!(collapsed[[0, 3, 3]], 1);
        let property = MaskProperty {
            save_components: true,
            ..MaskProperty::default()
        };
        let kept = calculate_mask(&property, seg.view(), None, &Spacing::default()).unwrap();
        assert_eq!(kept, seg);
    }

    #[test]
    fn old_mask_ignored_without_clip() {
        let seg = Labels::ones((1, 2, 2));
        let old = Mask::zeros((1, 2, 2));
        let property = MaskProperty::default();
        let spacing = Spacing::default();
        let out = calculate_mask(&property, seg.view(), Some(old.view()), &spacing).unwrap();
        assert_eq!(out, seg);
    }

    #[test]
    fn clip_shape_mismatch_is_error() {
        let seg = Labels::ones((1, 2, 2));
        let old = Mask::zeros((1, 3, 2));
        let property = MaskProperty {
            clip_to_mask: true,
            ..MaskProperty::default()
        };
        assert!(matches!(
            calculate_mask(&property, seg.view(), Some(old.view()), &Spacing::default()),
            Err(SegmentationError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn empty_segmentation_is_error() {
        let seg = Labels::zeros((0, 2, 2));
        assert_eq!(
            build(&MaskProperty::default(), &seg).unwrap_err(),
            SegmentationError::EmptyInput
        );
    }

    #[test]
    fn property_deserializes_with_defaults() {
        let json = r#"{"dilate": "R3D", "dilate_radius": -2}"#;
        let property: MaskProperty = serde_json::from_str(json).unwrap();
        assert_eq!(property.dilate, RadiusType::R3D);
        assert_eq!(property.dilate_radius, -2);
        assert!(!property.save_components);
    }
}
