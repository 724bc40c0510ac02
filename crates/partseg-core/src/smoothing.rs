//! Border smoothing of label volumes.
//!
//! The vote smoothers remove foreground voxels that have too little
//! foreground support in their neighbourhood. A pass is computed entirely
//! against its input snapshot, so removal never propagates within a pass;
//! the iterative variant advances the eroding front by at most one layer
//! per step.
//!
//! Positions outside the array count as background. A 2-D image is a
//! volume with one z-slice, so its neighbourhoods reduce to the in-plane
//! 4- or 8-neighbourhood automatically.

use ndarray::{Array3, ArrayView3, Zip};
use serde::{Deserialize, Serialize};

use crate::label::{dims_of, neighbour};
use crate::morphology::{dilate, erode};
use crate::schema::{MAX_STEPS, SMOOTH_BORDER_RADIUS, SUPPORT_LEVEL};
use crate::spacing::structuring_radius;
use crate::types::{Labels, RadiusType, SegmentationError, Spacing};

/// Neighbourhood used for voting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NeighType {
    /// Face neighbours (6 in 3-D, 4 in 2-D).
    #[default]
    Sides,
    /// Face and edge neighbours (18 in 3-D, 8 in 2-D).
    Edges,
    /// Face, edge and vertex neighbours (26 in 3-D, 8 in 2-D).
    Vertex,
}

impl NeighType {
    /// Neighbour offsets `(dz, dy, dx)`.
    #[must_use]
    pub fn offsets(self) -> Vec<[isize; 3]> {
        let max_nonzero = match self {
            Self::Sides => 1,
            Self::Edges => 2,
            Self::Vertex => 3,
        };
        let mut offsets = Vec::with_capacity(26);
        for dz in -1..=1_isize {
            for dy in -1..=1_isize {
                for dx in -1..=1_isize {
                    let nonzero = [dz, dy, dx].iter().filter(|&&d| d != 0).count();
                    if (1..=max_nonzero).contains(&nonzero) {
                        offsets.push([dz, dy, dx]);
                    }
                }
            }
        }
        offsets
    }
}

/// Largest support level a voxel can still meet (full 26-neighbourhood).
/// Any higher level clears every voxel.
pub const MAX_SUPPORT_LEVEL: usize = 26;

fn check_support(support_level: usize) -> Result<(), SegmentationError> {
    SUPPORT_LEVEL.check_count(support_level)
}

/// Count of non-zero neighbours for every voxel.
fn foreground_votes(labels: ArrayView3<'_, u32>, offsets: &[[isize; 3]]) -> Array3<u8> {
    let dims = dims_of(&labels);
    let mut votes = Array3::<u8>::zeros(labels.dim());
    for ((z, y, x), count) in votes.indexed_iter_mut() {
        if labels[[z, y, x]] == 0 {
            continue;
        }
        let mut n = 0_u8;
        for &off in offsets {
            if let Some(nb) = neighbour([z, y, x], off, dims)
                && labels[nb] != 0
            {
                n += 1;
            }
        }
        *count = n;
    }
    votes
}

/// One vote pass, returning the result and the number of removed voxels.
fn vote_pass(
    labels: ArrayView3<'_, u32>,
    offsets: &[[isize; 3]],
    support_level: usize,
) -> (Labels, usize) {
    let votes = foreground_votes(labels, offsets);
    let mut removed = 0;
    let mut out = labels.to_owned();
    Zip::from(&mut out).and(&votes).for_each(|v, &count| {
        if *v != 0 && usize::from(count) < support_level {
            *v = 0;
            removed += 1;
        }
    });
    (out, removed)
}

/// Single vote pass.
///
/// A foreground voxel keeps its label iff at least `support_level` of its
/// neighbours are foreground (any non-zero label). Background never
/// becomes foreground.
///
/// # Errors
///
/// Returns [`SegmentationError::InvalidParameter`] if `support_level` is 0.
pub fn vote_smooth(
    labels: &Labels,
    neigh_type: NeighType,
    support_level: usize,
) -> Result<Labels, SegmentationError> {
    check_support(support_level)?;
    let (out, removed) = vote_pass(labels.view(), &neigh_type.offsets(), support_level);
    log::debug!("vote smoothing ({neigh_type:?}, {support_level}) removed {removed} voxels");
    Ok(out)
}

/// Repeated vote passes until nothing changes or `max_steps` passes ran.
///
/// Each pass votes against the previous pass's output.
///
/// # Errors
///
/// Returns [`SegmentationError::InvalidParameter`] if `support_level` or
/// `max_steps` is 0.
pub fn iterative_vote_smooth(
    labels: &Labels,
    neigh_type: NeighType,
    support_level: usize,
    max_steps: usize,
) -> Result<Labels, SegmentationError> {
    check_support(support_level)?;
    if max_steps == 0 {
        return Err(SegmentationError::InvalidParameter("max_steps must be at least 1".into()));
    }
    let offsets = neigh_type.offsets();
    let mut current = labels.clone();
    for step in 0..max_steps {
        let (next, removed) = vote_pass(current.view(), &offsets, support_level);
        log::trace!("vote step {step}: removed {removed} voxels");
        if removed == 0 {
            break;
        }
        current = next;
    }
    Ok(current)
}

/// Morphological opening that never moves voxels between labels.
///
/// Each label is eroded and then dilated by the same ball; a voxel
/// survives only if the dilation restores its original label.
///
/// # Errors
///
/// Returns [`SegmentationError::InvalidParameter`] for an invalid radius or
/// spacing.
pub fn opening(
    labels: &Labels,
    radius: f64,
    spacing: &Spacing,
) -> Result<Labels, SegmentationError> {
    let voxels = structuring_radius(radius, spacing, RadiusType::R3D)?;
    let reopened = dilate(erode(labels.view(), voxels).view(), voxels);
    let mut out = labels.clone();
    Zip::from(&mut out).and(&reopened).for_each(|v, &r| {
        if r != *v {
            *v = 0;
        }
    });
    Ok(out)
}

/// Selects which border smoothing runs after size filtering.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum BorderSmoothingKind {
    /// No smoothing.
    #[default]
    None,
    /// Label-preserving opening with a ball of `radius` voxels of the
    /// finest axis.
    Opening { radius: f64 },
    /// One vote pass.
    Vote {
        neighbourhood_type: NeighType,
        support_level: usize,
    },
    /// Vote passes until stable or `max_steps` reached.
    IterativeVote {
        neighbourhood_type: NeighType,
        support_level: usize,
        max_steps: usize,
    },
}

/// Trait for border smoothing strategies.
pub trait BorderSmoothing {
    /// Smooth a label volume.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::InvalidParameter`] for unusable
    /// parameters.
    fn smooth(&self, labels: &Labels, spacing: &Spacing) -> Result<Labels, SegmentationError>;
}

impl BorderSmoothing for BorderSmoothingKind {
    fn smooth(&self, labels: &Labels, spacing: &Spacing) -> Result<Labels, SegmentationError> {
        match *self {
            Self::None => Ok(labels.clone()),
            Self::Opening { radius } => opening(labels, radius, spacing),
            Self::Vote {
                neighbourhood_type,
                support_level,
            } => vote_smooth(labels, neighbourhood_type, support_level),
            Self::IterativeVote {
                neighbourhood_type,
                support_level,
                max_steps,
            } => iterative_vote_smooth(labels, neighbourhood_type, support_level, max_steps),
        }
    }
}

impl BorderSmoothingKind {
    /// User-facing name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Opening { .. } => "Opening",
            Self::Vote { .. } => "Vote",
            Self::IterativeVote { .. } => "Iterative Vote",
        }
    }

    /// Check parameters without running.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::InvalidParameter`] on a bad value.
    pub fn validate(&self) -> Result<(), SegmentationError> {
        match *self {
            Self::None => Ok(()),
            Self::Opening { radius } => SMOOTH_BORDER_RADIUS.check(radius),
            Self::Vote { support_level, .. } => check_support(support_level),
            Self::IterativeVote {
                support_level,
                max_steps,
                ..
            } => {
                check_support(support_level)?;
                MAX_STEPS.check_count(max_steps)
            }
        }
    }
}
