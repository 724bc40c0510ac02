//! Connected-component labeling with size-ordered label ids.
//!
//! Components are discovered with a raster-scan union-find and then
//! renumbered so that label 1 is the largest component, label 2 the next
//! largest and so on. Components of equal size keep raster order: the one
//! whose first voxel (in `(z, y, x)` row-major order) comes first gets the
//! lower id. [`crate::cutoff`] relies on this ordering.

use std::cmp::Reverse;

use ndarray::{Array3, ArrayView3};
use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};

use crate::types::Labels;

/// Which neighbours count as adjacent for component grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Connectivity {
    /// Only voxels sharing a face (6 neighbours in 3-D).
    Face,
    /// Voxels sharing a face, edge or vertex (26 neighbours in 3-D).
    #[default]
    Full,
}

impl Connectivity {
    /// Map the user-facing `side_connection` flag: when set, components
    /// may only touch through faces.
    #[must_use]
    pub const fn from_side_connection(side_connection: bool) -> Self {
        if side_connection { Self::Face } else { Self::Full }
    }

    /// All neighbour offsets `(dz, dy, dx)` for this connectivity.
    #[must_use]
    pub fn offsets(self) -> Vec<[isize; 3]> {
        let mut offsets = Vec::with_capacity(26);
        for dz in -1..=1_isize {
            for dy in -1..=1_isize {
                for dx in -1..=1_isize {
                    let nonzero = [dz, dy, dx].iter().filter(|&&d| d != 0).count();
                    let keep = match self {
                        Self::Face => nonzero == 1,
                        Self::Full => nonzero > 0,
                    };
                    if keep {
                        offsets.push([dz, dy, dx]);
                    }
                }
            }
        }
        offsets
    }

    /// Offsets of neighbours already visited by a row-major scan.
    fn backward_offsets(self) -> Vec<[isize; 3]> {
        self.offsets()
            .into_iter()
            .filter(|off| *off < [0, 0, 0])
            .collect()
    }
}

/// A label volume together with its size histogram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Components {
    /// Label ids, `0` for background, `1..=N` in descending size order.
    pub labels: Labels,
    /// Voxel count per id; `sizes[0]` is the background count.
    pub sizes: Vec<usize>,
}

impl Components {
    /// Number of foreground components.
    #[must_use]
    pub fn count(&self) -> usize {
        self.sizes.len().saturating_sub(1)
    }
}

/// Neighbour of `idx` at `offset`, or `None` if it falls outside `dims`.
#[must_use]
pub(crate) fn neighbour(
    idx: [usize; 3],
    offset: [isize; 3],
    dims: [usize; 3],
) -> Option<[usize; 3]> {
    let mut out = [0; 3];
    for axis in 0..3 {
        let moved = idx[axis].checked_add_signed(offset[axis])?;
        if moved >= dims[axis] {
            return None;
        }
        out[axis] = moved;
    }
    Some(out)
}

pub(crate) const fn flat_index(idx: [usize; 3], dims: [usize; 3]) -> usize {
    (idx[0] * dims[1] + idx[1]) * dims[2] + idx[2]
}

pub(crate) fn dims_of<T>(array: &ArrayView3<'_, T>) -> [usize; 3] {
    let (z, y, x) = array.dim();
    [z, y, x]
}

/// Label every non-zero voxel of `mask`.
#[must_use]
pub fn label_components(mask: ArrayView3<'_, u8>, connectivity: Connectivity) -> Components {
    label_where(mask, connectivity, |&v| v != 0)
}

/// Label the voxels of `array` selected by `is_foreground`.
#[must_use]
pub fn label_where<T>(
    array: ArrayView3<'_, T>,
    connectivity: Connectivity,
    is_foreground: impl Fn(&T) -> bool,
) -> Components {
    let dims = dims_of(&array);
    let foreground: Vec<bool> = array.iter().map(is_foreground).collect();
    let n = foreground.len();
    let backward = connectivity.backward_offsets();

    let mut uf = UnionFind::<usize>::new(n);
    for (flat, idx) in raster(dims).enumerate() {
        if !foreground[flat] {
            continue;
        }
        for &off in &backward {
            if let Some(nb) = neighbour(idx, off, dims) {
                let nb_flat = flat_index(nb, dims);
                if foreground[nb_flat] {
                    uf.union(flat, nb_flat);
                }
            }
        }
    }

    // Provisional ids in order of first appearance.
    let mut provisional = vec![usize::MAX; n];
    let mut counts: Vec<usize> = Vec::new();
    let mut ids = vec![0_usize; n];
    for flat in 0..n {
        if !foreground[flat] {
            continue;
        }
        let root = uf.find_mut(flat);
        if provisional[root] == usize::MAX {
            provisional[root] = counts.len();
            counts.push(0);
        }
        let id = provisional[root];
        counts[id] += 1;
        ids[flat] = id + 1;
    }

    let background = n - counts.iter().sum::<usize>();
    let (remap, sizes) = descending_order(&counts, background);
    let labels = Array3::from_shape_fn((dims[0], dims[1], dims[2]), |(z, y, x)| {
        let id = ids[flat_index([z, y, x], dims)];
        if id == 0 { 0 } else { remap[id - 1] }
    });
    log::trace!("labelled {} components ({connectivity:?})", sizes.len() - 1);
    Components { labels, sizes }
}

/// Renumber an existing label volume by descending region size.
///
/// Regions keep their voxels; only ids change. Connectivity is not
/// recomputed, so a region split into several pieces stays one label.
/// Ties are resolved by the raster position of each region's first voxel.
#[must_use]
pub fn relabel_by_size(labels: &Labels) -> Components {
    let max = labels.iter().copied().max().unwrap_or(0) as usize;
    let mut first_seen = vec![usize::MAX; max + 1];
    let mut order: Vec<usize> = Vec::new();
    let mut counts_by_label = vec![0_usize; max + 1];
    for &v in labels {
        let v = v as usize;
        counts_by_label[v] += 1;
        if v != 0 && first_seen[v] == usize::MAX {
            first_seen[v] = order.len();
            order.push(v);
        }
    }
    let counts: Vec<usize> = order.iter().map(|&l| counts_by_label[l]).collect();
    let (remap, sizes) = descending_order(&counts, counts_by_label[0]);
    let relabelled = labels.mapv(|v| {
        if v == 0 {
            0
        } else {
            remap[first_seen[v as usize]]
        }
    });
    Components {
        labels: relabelled,
        sizes,
    }
}

/// Voxel count per label id (`bincount`).
#[must_use]
pub fn label_sizes(labels: &Labels) -> Vec<usize> {
    let max = labels.iter().copied().max().unwrap_or(0) as usize;
    let mut sizes = vec![0; max + 1];
    for &v in labels {
        sizes[v as usize] += 1;
    }
    sizes
}

/// Given per-id counts in first-appearance order, return the new id for
/// each provisional id and the size histogram in new-id order.
fn descending_order(counts: &[usize], background: usize) -> (Vec<u32>, Vec<usize>) {
    let mut order: Vec<usize> = (0..counts.len()).collect();
    // Stable sort keeps first-appearance order among equal sizes.
    order.sort_by_key(|&id| Reverse(counts[id]));

    let mut remap = vec![0_u32; counts.len()];
    let mut sizes = Vec::with_capacity(counts.len() + 1);
    sizes.push(background);
    for (rank, &id) in order.iter().enumerate() {
        remap[id] = u32::try_from(rank + 1).unwrap_or(u32::MAX);
        sizes.push(counts[id]);
    }
    (remap, sizes)
}

fn raster(dims: [usize; 3]) -> impl Iterator<Item = [usize; 3]> {
    (0..dims[0]).flat_map(move |z| {
        (0..dims[1]).flat_map(move |y| (0..dims[2]).map(move |x| [z, y, x]))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ndarray::{Array3, s};

    use super::*;

    #[test]
    fn offsets_counts() {
        assert_eq!(Connectivity::Face.offsets().len(), 6);
        assert_eq!(Connectivity::Full.offsets().len(), 26);
        assert_eq!(Connectivity::Face.backward_offsets().len(), 3);
        assert_eq!(Connectivity::Full.backward_offsets().len(), 13);
    }

    #[test]
    fn side_connection_maps_to_face() {
        assert_eq!(Connectivity::from_side_connection(true), Connectivity::Face);
        assert_eq!(Connectivity::from_side_connection(false), Connectivity::Full);
    }

    #[test]
    fn empty_mask_has_no_components() {
        let mask = Array3::<u8>::zeros((3, 4, 5));
        let c = label_components(mask.view(), Connectivity::Full);
        assert_eq!(c.count(), 0);
        assert_eq!(c.sizes, vec![60]);
        assert!(c.labels.iter().all(|&v| v == 0));
    }

    #[test]
    fn largest_component_gets_label_one() {
        let mut mask = Array3::<u8>::zeros((1, 10, 10));
        mask.slice_mut(s![.., 0..2, 0..2]).fill(1); // 4 voxels, scanned first
        mask.slice_mut(s![.., 5..9, 5..9]).fill(1); // 16 voxels
        let c = label_components(mask.view(), Connectivity::Full);
        assert_eq!(c.sizes, vec![80, 16, 4]);
        assert_eq!(c.labels[[0, 6, 6]], 1);
        assert_eq!(c.labels[[0, 0, 0]], 2);
    }

    #[test]
    fn equal_sizes_keep_raster_order() {
        let mut mask = Array3::<u8>::zeros((1, 5, 9));
        mask.slice_mut(s![.., 3..5, 0..2]).fill(1);
        mask.slice_mut(s![.., 0..2, 6..8]).fill(1);
        let c = label_components(mask.view(), Connectivity::Face);
        assert_eq!(c.sizes[1..], [4, 4]);
        // (0, 0, 6) precedes (0, 3, 0) in row-major order.
        assert_eq!(c.labels[[0, 0, 6]], 1);
        assert_eq!(c.labels[[0, 3, 0]], 2);
    }

    #[test]
    fn diagonal_touch_depends_on_connectivity() {
        let mut mask = Array3::<u8>::zeros((2, 2, 2));
        mask[[0, 0, 0]] = 1;
        mask[[1, 1, 1]] = 1;
        assert_eq!(label_components(mask.view(), Connectivity::Face).count(), 2);
        assert_eq!(label_components(mask.view(), Connectivity::Full).count(), 1);
    }

    #[test]
    fn u_shape_merges_in_one_component() {
        // Two arms joined only at the bottom row; a raster scan sees them
        // as separate until the join.
        let mut mask = Array3::<u8>::zeros((1, 4, 5));
        mask.slice_mut(s![.., 0..4, 0]).fill(1);
        mask.slice_mut(s![.., 0..4, 4]).fill(1);
        mask.slice_mut(s![.., 3, ..]).fill(1);
        let c = label_components(mask.view(), Connectivity::Face);
        assert_eq!(c.count(), 1);
        assert_eq!(c.sizes[1], 11);
    }

    #[test]
    fn sizes_are_non_increasing() {
        let mut mask = Array3::<u8>::zeros((4, 12, 12));
        mask.slice_mut(s![0, 0..1, 0..3]).fill(1);
        mask.slice_mut(s![1..3, 4..8, 4..8]).fill(1);
        mask.slice_mut(s![3, 10..12, 0..12]).fill(1);
        mask.slice_mut(s![0, 8..10, 8..10]).fill(1);
        let c = label_components(mask.view(), Connectivity::Face);
        assert!(c.sizes[1..].windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(c.sizes[1..], [32, 24, 4, 3]);
    }

    #[test]
    fn label_where_selects_background() {
        let mut mask = Array3::<u8>::ones((1, 3, 3));
        mask[[0, 1, 1]] = 0;
        let c = label_where(mask.view(), Connectivity::Face, |&v| v == 0);
        assert_eq!(c.sizes, vec![8, 1]);
    }

    #[test]
    fn relabel_by_size_reorders_without_splitting() {
        let mut labels = Labels::zeros((1, 3, 6));
        labels[[0, 0, 0]] = 1;
        labels.slice_mut(s![.., 2, ..]).fill(2);
        labels[[0, 0, 5]] = 2; // disconnected piece of region 2
        let c = relabel_by_size(&labels);
        assert_eq!(c.sizes, vec![10, 7, 1]);
        assert_eq!(c.labels[[0, 0, 5]], 1);
        assert_eq!(c.labels[[0, 2, 0]], 1);
        assert_eq!(c.labels[[0, 0, 0]], 2);
    }

    #[test]
    fn label_sizes_is_bincount() {
        let mut labels = Labels::zeros((1, 2, 2));
        labels[[0, 0, 0]] = 3;
        assert_eq!(label_sizes(&labels), vec![3, 0, 0, 1]);
    }

    #[test]
    fn neighbour_respects_bounds() {
        assert_eq!(neighbour([0, 0, 0], [-1, 0, 0], [2, 2, 2]), None);
        assert_eq!(neighbour([1, 1, 1], [0, 0, 1], [2, 2, 2]), None);
        assert_eq!(neighbour([1, 1, 0], [0, -1, 1], [2, 2, 2]), Some([1, 0, 1]));
    }
}
