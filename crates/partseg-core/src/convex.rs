//! Convex-hull filling of components.

use geo::{ConvexHull, Intersects, MultiPoint, Point};

use crate::types::Labels;

/// Fill each component's per-slice convex hull.
///
/// For every label and every z-slice the 2-D convex hull of the label's
/// voxel centres is rasterised; background voxels whose centre lies inside
/// or on the hull take the label. Voxels of other labels are never
/// overwritten. Labels are processed in ascending order, so a background
/// voxel inside two hulls goes to the lower label.
#[must_use]
pub fn convex_fill(labels: &Labels) -> Labels {
    let (nz, _, _) = labels.dim();
    let max = labels.iter().copied().max().unwrap_or(0) as usize;
    // points[label][z] = voxel centres (x, y)
    let mut points: Vec<Vec<Vec<Point<f64>>>> = vec![vec![Vec::new(); nz]; max + 1];
    for ((z, y, x), &l) in labels.indexed_iter() {
        if l != 0 {
            #[allow(clippy::cast_precision_loss)]
            points[l as usize][z].push(Point::new(x as f64, y as f64));
        }
    }

    let mut out = labels.clone();
    let mut filled = 0_usize;
    for (label, slices) in points.into_iter().enumerate().skip(1) {
        let label = u32::try_from(label).unwrap_or(u32::MAX);
        for (z, slice) in slices.into_iter().enumerate() {
            if slice.len() < 3 {
                continue;
            }
            let (x_range, y_range) = pixel_bounds(&slice);
            let hull = MultiPoint::from(slice).convex_hull();
            for y in y_range.0..=y_range.1 {
                for x in x_range.0..=x_range.1 {
                    let v = &mut out[[z, y, x]];
                    #[allow(clippy::cast_precision_loss)]
                    let inside = *v == 0 && hull.intersects(&Point::new(x as f64, y as f64));
                    if inside {
                        *v = label;
                        filled += 1;
                    }
                }
            }
        }
    }
    log::debug!("convex fill added {filled} voxels");
    out
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn pixel_bounds(points: &[Point<f64>]) -> ((usize, usize), (usize, usize)) {
    let fold = |f: fn(&Point<f64>) -> f64| {
        points
            .iter()
            .map(f)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
    };
    let (x0, x1) = fold(|p| p.x());
    let (y0, y1) = fold(|p| p.y());
    ((x0 as usize, x1 as usize), (y0 as usize, y1 as usize))
}
