//! Integration test: vote smoothing of cubes and squares for every
//! neighbourhood and support level that changes the result.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::ops::RangeInclusive;

use ndarray::s;
use partseg_core::smoothing::{iterative_vote_smooth, vote_smooth};
use partseg_core::{BorderSmoothing, BorderSmoothingKind, Labels, NeighType, Spacing};

fn cube() -> Labels {
    let mut labels = Labels::zeros((50, 50, 50));
    labels.slice_mut(s![2..48, 2..48, 2..48]).fill(1);
    labels
}

fn square() -> Labels {
    let mut labels = Labels::zeros((1, 50, 50));
    labels.slice_mut(s![0, 2..48, 2..48]).fill(1);
    labels
}

fn shrunk_cube(by: usize) -> Labels {
    let mut labels = Labels::zeros((50, 50, 50));
    labels.slice_mut(s![2 + by..48 - by, 2 + by..48 - by, 2 + by..48 - by]).fill(1);
    labels
}

fn without_corners(mut labels: Labels) -> Labels {
    for z in [2, 47] {
        for y in [2, 47] {
            for x in [2, 47] {
                labels[[z, y, x]] = 0;
            }
        }
    }
    labels
}

fn without_edges(mut labels: Labels) -> Labels {
    for a in [2_usize, 47] {
        for b in [2_usize, 47] {
            labels.slice_mut(s![a, b, ..]).fill(0);
            labels.slice_mut(s![a, .., b]).fill(0);
            labels.slice_mut(s![.., a, b]).fill(0);
        }
    }
    labels
}

fn square_without_corners() -> Labels {
    let mut labels = square();
    for y in [2, 47] {
        for x in [2, 47] {
            labels[[0, y, x]] = 0;
        }
    }
    labels
}

fn shrunk_square() -> Labels {
    let mut labels = Labels::zeros((1, 50, 50));
    labels.slice_mut(s![0, 3..47, 3..47]).fill(1);
    labels
}

fn vote(labels: &Labels, neigh: NeighType, support: usize) -> Labels {
    vote_smooth(labels, neigh, support).unwrap()
}

fn assert_levels(labels: &Labels, neigh: NeighType, expected: &[(RangeInclusive<usize>, &Labels)]) {
    for (levels, result) in expected {
        for support in levels.clone() {
            assert_eq!(&vote(labels, neigh, support), *result, "{neigh:?} support {support}");
        }
    }
}

#[test]
fn cube_sides() {
    let base = cube();
    assert_levels(
        &base,
        NeighType::Sides,
        &[
            (1..=3, &base),
            (4..=4, &without_corners(base.clone())),
            (5..=5, &without_edges(base.clone())),
            (6..=6, &shrunk_cube(1)),
        ],
    );
}

#[test]
fn cube_edges() {
    let base = cube();
    assert_levels(
        &base,
        NeighType::Edges,
        &[
            (1..=6, &base),
            (7..=9, &without_corners(base.clone())),
            (10..=13, &without_edges(base.clone())),
            (14..=18, &shrunk_cube(1)),
        ],
    );
}

#[test]
fn cube_vertex() {
    let base = cube();
    assert_levels(
        &base,
        NeighType::Vertex,
        &[
            (1..=7, &base),
            (8..=11, &without_corners(base.clone())),
            (12..=17, &without_edges(base.clone())),
            (18..=26, &shrunk_cube(1)),
        ],
    );
}

#[test]
fn square_sides() {
    let base = square();
    assert_levels(
        &base,
        NeighType::Sides,
        &[
            (1..=2, &base),
            (3..=3, &square_without_corners()),
            (4..=4, &shrunk_square()),
        ],
    );
}

#[test]
fn square_edges_and_vertex() {
    let base = square();
    for neigh in [NeighType::Edges, NeighType::Vertex] {
        assert_levels(
            &base,
            neigh,
            &[
                (1..=3, &base),
                (4..=5, &square_without_corners()),
                (6..=8, &shrunk_square()),
            ],
        );
    }
}

#[test]
fn single_step_matches_single_pass() {
    let base = cube();
    for neigh in [NeighType::Sides, NeighType::Edges, NeighType::Vertex] {
        for support in [4, 9, 14] {
            assert_eq!(
                iterative_vote_smooth(&base, neigh, support, 1).unwrap(),
                vote(&base, neigh, support),
                "{neigh:?} support {support}"
            );
        }
    }
}

#[test]
fn full_support_peels_one_layer_per_step() {
    let base = cube();
    for steps in 2..8 {
        let result = iterative_vote_smooth(&base, NeighType::Sides, 6, steps).unwrap();
        assert_eq!(result, shrunk_cube(steps), "steps {steps}");
    }
}

#[test]
fn corner_erosion_advances_one_diagonal_per_step() {
    let base = cube();
    // L1 distance from the nearest cube corner.
    let corner_distance = |z: usize, y: usize, x: usize| -> usize {
        [z, y, x].iter().map(|&v| (v - 2).min(47 - v)).sum()
    };
    for steps in 1..6 {
        let mut expected = base.clone();
        for ((z, y, x), v) in expected.indexed_iter_mut() {
            if *v != 0 && corner_distance(z, y, x) < steps {
                *v = 0;
            }
        }
        let result = iterative_vote_smooth(&base, NeighType::Sides, 4, steps).unwrap();
        assert_eq!(result, expected, "steps {steps}");
    }
}

#[test]
fn iteration_stops_when_stable() {
    let base = cube();
    let once = iterative_vote_smooth(&base, NeighType::Sides, 3, 1).unwrap();
    let many = iterative_vote_smooth(&base, NeighType::Sides, 3, 100).unwrap();
    assert_eq!(once, base);
    assert_eq!(many, base);
}

#[test]
fn labels_are_preserved() {
    let mut labels = cube();
    labels.slice_mut(s![25..48, .., ..]).mapv_inplace(|v| v * 2);
    let smoothed = vote(&labels, NeighType::Sides, 6);
    assert_eq!(smoothed[[10, 10, 10]], 1);
    assert_eq!(smoothed[[40, 10, 10]], 2);
    // Different labels still support each other.
    assert_eq!(smoothed[[24, 10, 10]], 1);
    assert_eq!(smoothed[[25, 10, 10]], 2);
}

#[test]
fn kind_dispatches_to_vote() {
    let base = cube();
    let kind = BorderSmoothingKind::Vote {
        neighbourhood_type: NeighType::Sides,
        support_level: 4,
    };
    let smoothed = kind.smooth(&base, &Spacing::default()).unwrap();
    assert_eq!(smoothed, without_corners(base));
}

#[test]
fn zero_parameters_are_rejected() {
    let base = square();
    assert!(vote_smooth(&base, NeighType::Sides, 0).is_err());
    assert!(iterative_vote_smooth(&base, NeighType::Sides, 1, 0).is_err());
}

#[test]
fn support_above_neighbourhood_clears_everything() {
    let empty = Labels::zeros((1, 50, 50));
    assert_eq!(vote(&square(), NeighType::Sides, 27), empty);
    assert_eq!(vote(&square(), NeighType::Vertex, 27), empty);
    let kind = BorderSmoothingKind::Vote {
        neighbourhood_type: NeighType::Vertex,
        support_level: 1000,
    };
    assert!(kind.validate().is_ok());
    assert_eq!(kind.smooth(&cube(), &Spacing::default()).unwrap(), Labels::zeros((50, 50, 50)));
}

#[test]
fn many_steps_run_to_fixed_point() {
    // Peeling one layer per step empties the 46-voxel cube after 23 steps.
    let base = cube();
    let result = iterative_vote_smooth(&base, NeighType::Sides, 6, 101).unwrap();
    assert_eq!(result, Labels::zeros((50, 50, 50)));
    let stable = iterative_vote_smooth(&base, NeighType::Sides, 3, 101).unwrap();
    assert_eq!(stable, base);
    let kind = BorderSmoothingKind::IterativeVote {
        neighbourhood_type: NeighType::Sides,
        support_level: 6,
        max_steps: 101,
    };
    assert!(kind.validate().is_ok());
}
