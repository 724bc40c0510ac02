//! Growth of labelled cores inside a looser base mask.
//!
//! This module defines the [`SprawlStrategy`] trait for pluggable growth
//! algorithms and the [`SprawlKind`] enum for selecting one at runtime.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ndarray::ArrayView3;
use serde::{Deserialize, Serialize};

use crate::label::{Connectivity, dims_of, flat_index, neighbour};
use crate::types::{Labels, SegmentationError, Spacing, ensure_same_shape};

/// Selects which growth algorithm expands the cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SprawlKind {
    /// Geodesic nearest-core assignment with physical step lengths.
    ///
    /// Every base voxel reachable from a core through base voxels takes
    /// the label of the core with the shortest path to it, where a step
    /// between neighbours costs its length in physical units. At equal
    /// distance the lower core label wins.
    #[default]
    Euclidean,
    /// Keep the cores as they are.
    None,
}

/// Trait for sprawl growth strategies.
pub trait SprawlStrategy {
    /// Grow `cores` within `base`.
    ///
    /// Returns labels where every base voxel reachable from a core carries
    /// that core's id. Nothing outside `base` is labelled, except core
    /// voxels themselves.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::ShapeMismatch`] if the arrays disagree.
    fn grow(
        &self,
        cores: &Labels,
        base: ArrayView3<'_, u8>,
        intensity: ArrayView3<'_, f32>,
        spacing: &Spacing,
        connectivity: Connectivity,
    ) -> Result<Labels, SegmentationError>;
}

impl SprawlStrategy for SprawlKind {
    fn grow(
        &self,
        cores: &Labels,
        base: ArrayView3<'_, u8>,
        intensity: ArrayView3<'_, f32>,
        spacing: &Spacing,
        connectivity: Connectivity,
    ) -> Result<Labels, SegmentationError> {
        ensure_same_shape(cores.shape(), base.shape())?;
        ensure_same_shape(cores.shape(), intensity.shape())?;
        match *self {
            Self::Euclidean => Ok(euclidean_sprawl(cores, base, spacing, connectivity)),
            Self::None => Ok(cores.clone()),
        }
    }
}

impl SprawlKind {
    /// User-facing name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Euclidean => "Euclidean sprawl",
            Self::None => "None",
        }
    }
}

/// Entry of the propagation front.
///
/// Ordered so that [`BinaryHeap`] pops the smallest distance first, then
/// the smallest label, then the earliest voxel.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Front {
    distance: f64,
    label: u32,
    index: usize,
}

impl Eq for Front {}

impl Ord for Front {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.label.cmp(&self.label))
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for Front {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn euclidean_sprawl(
    cores: &Labels,
    base: ArrayView3<'_, u8>,
    spacing: &Spacing,
    connectivity: Connectivity,
) -> Labels {
    let dims = dims_of(&cores.view());
    let n = cores.len();
    let s = spacing.as_array();
    let steps: Vec<([isize; 3], f64)> = connectivity
        .offsets()
        .into_iter()
        .map(|off| {
            #[allow(clippy::cast_precision_loss)]
            let length = (0..3)
                .map(|a| (off[a] as f64 * s[a]).powi(2))
                .sum::<f64>()
                .sqrt();
            (off, length)
        })
        .collect();

    let mut distance = vec![f64::INFINITY; n];
    let mut settled = vec![false; n];
    let mut out = Labels::zeros(cores.dim());
    let mut heap = BinaryHeap::new();

    for ((z, y, x), &label) in cores.indexed_iter() {
        if label != 0 {
            let index = flat_index([z, y, x], dims);
            distance[index] = 0.0;
            heap.push(Front {
                distance: 0.0,
                label,
                index,
            });
        }
    }
    log::trace!("euclidean sprawl: {} seed voxels", heap.len());

    let unflatten = |index: usize| {
        [
            index / (dims[1] * dims[2]),
            (index / dims[2]) % dims[1],
            index % dims[2],
        ]
    };

    while let Some(front) = heap.pop() {
        if settled[front.index] {
            continue;
        }
        settled[front.index] = true;
        let idx = unflatten(front.index);
        out[idx] = front.label;
        for &(off, length) in &steps {
            let Some(nb) = neighbour(idx, off, dims) else {
                continue;
            };
            let nb_index = flat_index(nb, dims);
            if settled[nb_index] || base[nb] == 0 {
                continue;
            }
            let candidate = front.distance + length;
            if candidate <= distance[nb_index] {
                distance[nb_index] = candidate;
                heap.push(Front {
                    distance: candidate,
                    label: front.label,
                    index: nb_index,
                });
            }
        }
    }
    out
}
