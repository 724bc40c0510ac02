//! Integration test: building a follow-up mask from a segmentation.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use ndarray::{Array3, s};
use partseg_core::{Labels, MaskProperty, RadiusType, Spacing, calculate_mask};

fn unit() -> Spacing {
    Spacing::new(1.0, 1.0, 1.0).unwrap()
}

fn mask(property: &MaskProperty, segmentation: &Labels, spacing: &Spacing) -> Labels {
    calculate_mask(property, segmentation.view(), None, spacing).expect("mask should build")
}

fn filling(fill_holes: RadiusType, max_holes_size: usize, save_components: bool) -> MaskProperty {
    MaskProperty {
        fill_holes,
        max_holes_size,
        save_components,
        ..MaskProperty::default()
    }
}

fn dilation(dilate: RadiusType, dilate_radius: i32) -> MaskProperty {
    MaskProperty {
        dilate,
        dilate_radius,
        ..MaskProperty::default()
    }
}

#[test]
fn binary_unless_saving_components() {
    let mut base = Labels::zeros((10, 20, 20));
    base.slice_mut(s![3..7, 6..14, 6..14]).fill(1);
    let property = MaskProperty::default();
    assert_eq!(mask(&property, &base, &unit()), base);

    let mut labelled = base.clone();
    labelled.slice_mut(s![4..6, 8..12, 8..12]).fill(2);
    assert_eq!(mask(&property, &labelled, &unit()), base);

    let keep = MaskProperty {
        save_components: true,
        ..MaskProperty::default()
    };
    assert_eq!(mask(&keep, &labelled, &unit()), labelled);
}

#[test]
fn fill_holes_plane_and_volume() {
    let mut base = Labels::zeros((20, 30, 30));
    base.slice_mut(s![4..16, 8..22, 8..22]).fill(1);
    let mut tunnel = base.clone();
    tunnel.slice_mut(s![4..16, 10..15, 10..15]).fill(0);

    // The tunnel runs through every slice: a hole per plane, open in 3-D.
    assert_eq!(mask(&filling(RadiusType::R2D, 0, false), &tunnel, &unit()), base);
    let volume = filling(RadiusType::R3D, 0, false);
    assert_eq!(mask(&volume, &tunnel, &unit()), tunnel);

    let mut cavity = tunnel.clone();
    cavity.slice_mut(s![5..15, 10..15, 17..20]).fill(0);
    assert_eq!(mask(&volume, &cavity, &unit()), tunnel);
}

#[test]
fn fill_holes_per_component() {
    let mut segmentation = Labels::zeros((20, 30, 30));
    segmentation.slice_mut(s![4..16, 6..15, 6..24]).fill(1);
    segmentation.slice_mut(s![4..16, 15..24, 6..24]).fill(2);
    let binary = segmentation.mapv(|v| u32::from(v > 0));
    let mut labelled = segmentation.clone();
    segmentation.slice_mut(s![6..14, 8..12, 8..22]).fill(0);
    segmentation.slice_mut(s![6..14, 18..22, 8..22]).fill(0);

    let merged = filling(RadiusType::R3D, 0, false);
    let separate = filling(RadiusType::R3D, 0, true);
    assert_eq!(mask(&merged, &segmentation, &unit()), binary);
    assert_eq!(mask(&separate, &segmentation, &unit()), labelled);

    // A gap along the shared face is a hole of the union only.
    segmentation.slice_mut(s![6..14, 14..16, 8..22]).fill(0);
    labelled.slice_mut(s![6..14, 14..16, 8..22]).fill(0);
    assert_eq!(mask(&merged, &segmentation, &unit()), binary);
    assert_eq!(mask(&separate, &segmentation, &unit()), labelled);
}

#[test]
fn fill_holes_respects_size_limit() {
    let mut base = Labels::zeros((20, 20, 40));
    base.slice_mut(s![2..18, 2..18, 4..36]).fill(1);
    base.slice_mut(s![4..16, 4..16, 6..18]).fill(0);
    let mut small_cavity = base.clone();
    small_cavity.slice_mut(s![6..14, 6..14, 24..32]).fill(0);

    // 8×8 per plane and 512 in volume fit; the 12×12 cavity never does.
    let plane = filling(RadiusType::R2D, 70, false);
    let volume = filling(RadiusType::R3D, 530, true);
    assert_eq!(mask(&plane, &base, &unit()), base);
    assert_eq!(mask(&volume, &base, &unit()), base);
    assert_eq!(mask(&plane, &small_cavity, &unit()), base);
    assert_eq!(mask(&volume, &small_cavity, &unit()), base);
}

#[test]
fn erode_and_dilate_cube() {
    let mut base = Labels::zeros((30, 30, 30));
    base.slice_mut(s![10..20, 10..20, 10..20]).fill(1);

    let mut expected = Labels::zeros((30, 30, 30));
    expected.slice_mut(s![10..20, 11..19, 11..19]).fill(1);
    assert_eq!(mask(&dilation(RadiusType::R2D, -1), &base, &unit()), expected);

    let mut expected = Labels::zeros((30, 30, 30));
    expected.slice_mut(s![11..19, 11..19, 11..19]).fill(1);
    assert_eq!(mask(&dilation(RadiusType::R3D, -1), &base, &unit()), expected);

    let mut expected = Labels::zeros((30, 30, 30));
    expected.slice_mut(s![10..20, 9..21, 9..21]).fill(1);
    assert_eq!(mask(&dilation(RadiusType::R2D, 1), &base, &unit()), expected);

    let mut expected = Labels::zeros((30, 30, 30));
    expected.slice_mut(s![9..21, 9..21, 9..21]).fill(1);
    for z in [9, 20] {
        for y in [9, 20] {
            for x in [9, 20] {
                expected[[z, y, x]] = 0;
            }
        }
    }
    assert_eq!(mask(&dilation(RadiusType::R3D, 1), &base, &unit()), expected);
}

#[test]
fn erosion_scales_with_anisotropic_spacing() {
    let spacing = Spacing::new(3.0, 1.0, 1.0).unwrap();
    let mut base = Labels::zeros((30, 30, 30));
    base.slice_mut(s![10..20, 5..25, 5..25]).fill(1);

    let cases = [
        (-1, s![10..20, 6..24, 6..24]),
        (-2, s![11..19, 7..23, 7..23]),
        (-3, s![11..19, 8..22, 8..22]),
    ];
    for (radius, kept) in cases {
        let mut expected = Labels::zeros((30, 30, 30));
        expected.slice_mut(kept).fill(1);
        let eroded = mask(&dilation(RadiusType::R3D, radius), &base, &spacing);
        assert_eq!(eroded, expected, "radius {radius}");
    }
}

#[test]
fn clip_only_when_requested() {
    let mut base = Labels::zeros((30, 30, 30));
    base.slice_mut(s![10..20, 10..20, 10..20]).fill(1);
    let mut previous = base.mapv(|v| u8::try_from(v).unwrap());
    previous.slice_mut(s![13..17, 13..17, 13..17]).fill(0);

    let property = MaskProperty::default();
    let unclipped = calculate_mask(&property, base.view(), Some(previous.view()), &unit()).unwrap();
    assert_eq!(unclipped, base);

    let clip = MaskProperty {
        clip_to_mask: true,
        ..MaskProperty::default()
    };
    let clipped = calculate_mask(&clip, base.view(), Some(previous.view()), &unit()).unwrap();
    assert_eq!(clipped, previous.mapv(u32::from));
}

#[test]
fn empty_segmentation_is_rejected() {
    let empty = Array3::<u32>::zeros((0, 4, 4));
    assert!(calculate_mask(&MaskProperty::default(), empty.view(), None, &unit()).is_err());
}
