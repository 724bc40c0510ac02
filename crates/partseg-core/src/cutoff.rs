//! Minimum-size filtering of size-ordered components.
//!
//! Because [`crate::label`] numbers components by descending size, the
//! surviving components always form a prefix `1..=k` of the id space and
//! `k` can be found by binary search.

use crate::label::Components;
use crate::types::Labels;

/// Largest label id `k` such that every label in `1..=k` has at least
/// `minimum_size` voxels, or `0` if none does.
///
/// `sizes` is a histogram as returned by the labeler: `sizes[0]` is
/// background and `sizes[1..]` is non-increasing.
#[must_use]
pub fn size_cutoff(sizes: &[usize], minimum_size: usize) -> usize {
    sizes
        .get(1..)
        .map_or(0, |foreground| foreground.partition_point(|&s| s >= minimum_size))
}

/// Zero every label above `cutoff` in place.
pub fn apply_cutoff(labels: &mut Labels, cutoff: usize) {
    let cutoff = u32::try_from(cutoff).unwrap_or(u32::MAX);
    labels.mapv_inplace(|v| if v > cutoff { 0 } else { v });
}

/// Drop components smaller than `minimum_size`, keeping ids and sizes
/// consistent.
#[must_use]
pub fn filter_components(mut components: Components, minimum_size: usize) -> Components {
    let k = size_cutoff(&components.sizes, minimum_size);
    if k < components.count() {
        let removed: usize = components.sizes[k + 1..].iter().sum();
        apply_cutoff(&mut components.labels, k);
        components.sizes.truncate(k + 1);
        components.sizes[0] += removed;
    }
    log::debug!("size cutoff {minimum_size}: kept {k} components");
    components
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ndarray::{Array3, s};

    use super::*;
    use crate::label::{Connectivity, label_components};

    #[test]
    fn all_pass() {
        assert_eq!(size_cutoff(&[0, 10, 9, 8], 8), 3);
    }

    #[test]
    fn none_pass() {
        assert_eq!(size_cutoff(&[5, 3, 2], 4), 0);
    }

    #[test]
    fn boundary_is_inclusive() {
        assert_eq!(size_cutoff(&[0, 100, 50, 50, 49, 1], 50), 3);
    }

    #[test]
    fn empty_histogram() {
        assert_eq!(size_cutoff(&[], 1), 0);
        assert_eq!(size_cutoff(&[42], 1), 0);
    }

    #[test]
    fn cutoff_agrees_with_linear_scan() {
        let sizes = [7, 90, 60, 60, 33, 20, 20, 5, 1];
        for minimum in 0..100 {
            let k = size_cutoff(&sizes, minimum);
            assert!(sizes[1..=k].iter().all(|&s| s >= minimum));
            if k + 1 < sizes.len() {
                assert!(sizes[k + 1] < minimum);
            }
        }
    }

    #[test]
    fn filter_components_zeroes_small_labels() {
        let mut mask = Array3::<u8>::zeros((1, 6, 6));
        mask.slice_mut(s![.., 0..3, 0..3]).fill(1);
        mask[[0, 5, 5]] = 1;
        let components = label_components(mask.view(), Connectivity::Full);
        let filtered = filter_components(components, 2);
        assert_eq!(filtered.sizes, vec![27, 9]);
        assert_eq!(filtered.labels[[0, 5, 5]], 0);
        assert_eq!(filtered.labels[[0, 1, 1]], 1);
    }
}
