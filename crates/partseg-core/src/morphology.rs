//! Binary and label-preserving mask morphology.
//!
//! Dilation and erosion use the shift-and-combine strategy: for each offset
//! of the structuring element the whole volume is shifted and merged into
//! the output with `ndarray::Zip`, so the inner loops run over contiguous
//! slices instead of per-voxel neighbourhoods.
//!
//! The structuring element is a discrete ellipsoid with per-axis radii,
//! built the same way as a standard morphological ball: offset `d` is
//! included iff `Σ (d_i / (r_i + 0.5))² ≤ 1`. Under anisotropic spacing the
//! radii differ per axis (see [`crate::spacing::structuring_radius`]).

use image::{GrayImage, Luma};
use imageproc::region_labelling::{self, Connectivity as PlaneConnectivity};
use ndarray::{Array3, ArrayView2, ArrayView3, ArrayViewMut2, ArrayViewMut3, Axis, Zip, s};

use crate::label::{Connectivity, label_where};
use crate::spacing::structuring_radius;
use crate::types::{Labels, Mask, RadiusType, SegmentationError, Spacing, ensure_same_shape};

/// Offsets of the ellipsoidal structuring element with the given per-axis
/// radii, centre included.
///
/// Only offsets that can land inside a volume of shape `extent` are built:
/// each axis stops at `extent - 1`, while the ellipsoid keeps its full
/// radii. A radius far larger than the volume therefore costs no more
/// than one spanning the whole volume.
#[must_use]
pub fn ball_offsets(radius: [usize; 3], extent: [usize; 3]) -> Vec<[isize; 3]> {
    let r = radius.map(|r| isize::try_from(r).unwrap_or(isize::MAX / 4));
    let reach: [isize; 3] = std::array::from_fn(|axis| {
        let span = isize::try_from(extent[axis].saturating_sub(1)).unwrap_or(isize::MAX / 4);
        r[axis].min(span)
    });
    let mut offsets = Vec::new();
    for dz in -reach[0]..=reach[0] {
        for dy in -reach[1]..=reach[1] {
            for dx in -reach[2]..=reach[2] {
                let d = [dz, dy, dx];
                let dist: f64 = (0..3)
                    .map(|axis| {
                        #[allow(clippy::cast_precision_loss)]
                        let q = d[axis] as f64 / (r[axis] as f64 + 0.5);
                        q * q
                    })
                    .sum();
                if dist <= 1.0 {
                    offsets.push(d);
                }
            }
        }
    }
    offsets
}

fn extent_of<T>(input: &ArrayView3<'_, T>) -> [usize; 3] {
    let (nz, ny, nx) = input.dim();
    [nz, ny, nx]
}

/// Per-axis `(dst_start, src_start, len)` such that `src = dst + offset`.
fn overlap(offset: isize, size: usize) -> Option<(usize, usize, usize)> {
    let shift = offset.unsigned_abs();
    if shift >= size {
        return None;
    }
    let len = size - shift;
    Some(if offset >= 0 { (0, shift, len) } else { (shift, 0, len) })
}

/// Visit every offset of `kernel` with the output window, the input at the
/// same window and the input shifted by the offset.
fn for_each_shift<T: Copy>(
    input: ArrayView3<'_, T>,
    output: &mut Array3<T>,
    kernel: &[[isize; 3]],
    mut f: impl FnMut(&mut T, T, T),
) {
    let (nz, ny, nx) = input.dim();
    for off in kernel {
        let (Some(z), Some(y), Some(x)) = (
            overlap(off[0], nz),
            overlap(off[1], ny),
            overlap(off[2], nx),
        ) else {
            continue;
        };
        let dst = s![z.0..z.0 + z.2, y.0..y.0 + y.2, x.0..x.0 + x.2];
        let src = s![z.1..z.1 + z.2, y.1..y.1 + y.2, x.1..x.1 + x.2];
        Zip::from(output.slice_mut(dst))
            .and(input.slice(dst))
            .and(input.slice(src))
            .for_each(|out, &here, &there| f(out, here, there));
    }
}

/// Grow foreground by the structuring element.
///
/// Foreground voxels keep their value; a background voxel reached by the
/// element takes the largest value among the foreground voxels that reach
/// it. On a binary mask this is plain dilation.
#[must_use]
pub fn dilate<T: Copy + Ord + Default>(input: ArrayView3<'_, T>, radius: [usize; 3]) -> Array3<T> {
    let zero = T::default();
    let mut output = input.to_owned();
    let kernel = ball_offsets(radius, extent_of(&input));
    for_each_shift(input, &mut output, &kernel, |out, here, there| {
        if here == zero && there > *out {
            *out = there;
        }
    });
    output
}

/// Shrink foreground by the structuring element.
///
/// A voxel keeps its value only if every element neighbour inside the
/// array carries the same value. Positions outside the array do not erode,
/// so foreground touching the border is not eaten from that side.
#[must_use]
pub fn erode<T: Copy + Ord + Default>(input: ArrayView3<'_, T>, radius: [usize; 3]) -> Array3<T> {
    let zero = T::default();
    let mut output = input.to_owned();
    let kernel = ball_offsets(radius, extent_of(&input));
    for_each_shift(input, &mut output, &kernel, |out, here, there| {
        if there != here {
            *out = zero;
        }
    });
    output
}

/// Dilate (`radius > 0`) or erode (`radius < 0`) by a radius expressed in
/// voxels of the finest axis.
///
/// # Errors
///
/// Returns [`SegmentationError::InvalidParameter`] for an invalid spacing or
/// non-finite radius.
pub fn dilate_signed<T: Copy + Ord + Default>(
    input: ArrayView3<'_, T>,
    radius: f64,
    spacing: &Spacing,
    mode: RadiusType,
) -> Result<Array3<T>, SegmentationError> {
    let voxels = structuring_radius(radius, spacing, mode)?;
    if voxels == [0, 0, 0] {
        return Ok(input.to_owned());
    }
    log::debug!("{} by {voxels:?}", if radius > 0.0 { "dilate" } else { "erode" });
    Ok(if radius > 0.0 {
        dilate(input, voxels)
    } else {
        erode(input, voxels)
    })
}

/// Voxels belonging to enclosed background regions of `array`.
///
/// A hole is a face-connected background region that does not touch the
/// array border (the slice border in [`RadiusType::R2D`] mode). With a
/// non-zero `max_holes_size` only holes of at most that many voxels
/// (pixels per slice in 2-D mode) are reported.
fn hole_voxels<T>(
    array: ArrayView3<'_, T>,
    is_foreground: impl Fn(&T) -> bool + Copy,
    mode: RadiusType,
    max_holes_size: usize,
) -> Result<Array3<bool>, SegmentationError> {
    let fits = |size: usize| max_holes_size == 0 || size <= max_holes_size;
    match mode {
        RadiusType::No => Ok(Array3::from_elem(array.dim(), false)),
        RadiusType::R3D => {
            let background = label_where(array, Connectivity::Face, |v| !is_foreground(v));
            let dims = background.labels.dim();
            let mut open = vec![false; background.sizes.len()];
            for ((z, y, x), &l) in background.labels.indexed_iter() {
                let on_border = z == 0 || y == 0 || x == 0;
                if on_border || z + 1 == dims.0 || y + 1 == dims.1 || x + 1 == dims.2 {
                    open[l as usize] = true;
                }
            }
            Ok(background.labels.mapv(|l| {
                let l = l as usize;
                l != 0 && !open[l] && fits(background.sizes[l])
            }))
        }
        RadiusType::R2D => {
            let mut holes = Array3::from_elem(array.dim(), false);
            for (plane, mut out) in array.axis_iter(Axis(0)).zip(holes.axis_iter_mut(Axis(0))) {
                plane_holes(plane, is_foreground, &fits, &mut out)?;
            }
            Ok(holes)
        }
    }
}

fn plane_holes<T>(
    plane: ArrayView2<'_, T>,
    is_foreground: impl Fn(&T) -> bool,
    fits: &impl Fn(usize) -> bool,
    out: &mut ArrayViewMut2<'_, bool>,
) -> Result<(), SegmentationError> {
    let (ny, nx) = plane.dim();
    let too_large = || {
        SegmentationError::InvalidParameter(format!("slice {ny}x{nx} too large for hole filling"))
    };
    let width = u32::try_from(nx).map_err(|_| too_large())?;
    let height = u32::try_from(ny).map_err(|_| too_large())?;

    let inverted = GrayImage::from_fn(width, height, |x, y| {
        if is_foreground(&plane[[y as usize, x as usize]]) {
            Luma([0])
        } else {
            Luma([255])
        }
    });
    let regions =
        region_labelling::connected_components(&inverted, PlaneConnectivity::Four, Luma([0]));

    let count = regions.pixels().map(|p| p[0]).max().unwrap_or(0) as usize;
    let mut sizes = vec![0_usize; count + 1];
    let mut open = vec![false; count + 1];
    for (x, y, p) in regions.enumerate_pixels() {
        let l = p[0] as usize;
        sizes[l] += 1;
        if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
            open[l] = true;
        }
    }
    for (x, y, p) in regions.enumerate_pixels() {
        let l = p[0] as usize;
        if l != 0 && !open[l] && fits(sizes[l]) {
            out[[y as usize, x as usize]] = true;
        }
    }
    Ok(())
}

/// Fill enclosed background in a binary mask.
///
/// Filled voxels are set to `1`; existing values are kept. `max_holes_size
/// == 0` fills holes of any size.
///
/// # Errors
///
/// Returns [`SegmentationError::InvalidParameter`] if a slice is too large
/// to rasterise in 2-D mode.
pub fn fill_holes(
    mask: ArrayView3<'_, u8>,
    mode: RadiusType,
    max_holes_size: usize,
) -> Result<Mask, SegmentationError> {
    let holes = hole_voxels(mask, |&v| v != 0, mode, max_holes_size)?;
    let mut out = mask.to_owned();
    Zip::from(&mut out).and(&holes).for_each(|v, &hole| {
        if hole {
            *v = 1;
        }
    });
    Ok(out)
}

/// Fill holes of every label independently.
///
/// Each label is examined inside its bounding box padded by one voxel, with
/// all other labels treated as background, so a cavity shared between two
/// components is not a hole of either. Filled voxels take the label and
/// only voxels that are `0` are written. Labels are processed in ascending
/// order.
///
/// # Errors
///
/// Same as [`fill_holes`].
pub fn fill_holes_by_components(
    labels: &Labels,
    mode: RadiusType,
    max_holes_size: usize,
) -> Result<Labels, SegmentationError> {
    let mut out = labels.clone();
    let dims = labels.dim();
    let dims = [dims.0, dims.1, dims.2];
    for (label, bounds) in label_bounds(labels).into_iter().enumerate() {
        let Some(bounds) = bounds else { continue };
        let label = u32::try_from(label).unwrap_or(u32::MAX);
        let lo: [usize; 3] = std::array::from_fn(|a| bounds[a].0.saturating_sub(1));
        let hi: [usize; 3] = std::array::from_fn(|a| (bounds[a].1 + 1).min(dims[a]));
        let window = s![lo[0]..hi[0], lo[1]..hi[1], lo[2]..hi[2]];
        let holes = hole_voxels(labels.slice(window), |&v| v == label, mode, max_holes_size)?;
        Zip::from(out.slice_mut(window)).and(&holes).for_each(|v, &hole| {
            if hole && *v == 0 {
                *v = label;
            }
        });
    }
    Ok(out)
}

/// Half-open bounding box of every label id, indexed by id.
fn label_bounds(labels: &Labels) -> Vec<Option<[(usize, usize); 3]>> {
    let max = labels.iter().copied().max().unwrap_or(0) as usize;
    let mut bounds: Vec<Option<[(usize, usize); 3]>> = vec![None; max + 1];
    for ((z, y, x), &l) in labels.indexed_iter() {
        if l == 0 {
            continue;
        }
        let idx = [z, y, x];
        let b = bounds[l as usize].get_or_insert([(z, z + 1), (y, y + 1), (x, x + 1)]);
        for axis in 0..3 {
            b[axis].0 = b[axis].0.min(idx[axis]);
            b[axis].1 = b[axis].1.max(idx[axis] + 1);
        }
    }
    bounds
}

/// Zero every voxel outside `reference`.
///
/// # Errors
///
/// Returns [`SegmentationError::ShapeMismatch`] if the shapes differ.
pub fn clip_to_mask<T: Copy + Default>(
    array: ArrayView3<'_, T>,
    reference: ArrayView3<'_, u8>,
) -> Result<Array3<T>, SegmentationError> {
    ensure_same_shape(array.shape(), reference.shape())?;
    let mut out = array.to_owned();
    clip_in_place(out.view_mut(), reference);
    Ok(out)
}

fn clip_in_place<T: Copy + Default>(
    mut array: ArrayViewMut3<'_, T>,
    reference: ArrayView3<'_, u8>,
) {
    Zip::from(&mut array).and(&reference).for_each(|v, &r| {
        if r == 0 {
            *v = T::default();
        }
    });
}
