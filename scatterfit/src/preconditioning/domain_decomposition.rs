/////////////////////////////////////////////////////////////////////////////////////////////
//
// Builds a multi-level overlapping domain decomposition hierarchy for Schwarz preconditioning.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # domain_decomposition
//!
//! Builds a multi-level overlapping domain decomposition (DDM) of a point set.
//!
//! Each fine level bisects its active points at the median of the longest axis until
//! the leaves are small enough, then grows every leaf with the nearest internal points
//! of other leaves. A few well spread points of every leaf are promoted to the next,
//! coarser level. Once few enough points remain they form a single coarse domain.
//!
//! # References
//! 1.  R. K. Beatson, W. A. Light, and S. Billings. Fast solution of the radial basis
//!     function interpolation equations: domain decomposition methods. SIAM J. Sci.
//!     Comput., 22(5):1717–1740 (electronic), 2000.
//! 2.  Haase, G., Martin, D., Schiffmann, P., Offner, G. (2018). A Domain Decomposition
//!     Multilevel Preconditioner for Interpolation with Radial Basis Functions.
//!     In: Lirkov, I., Margenov, S. (eds) Large-Scale Scientific Computing. LSSC 2017.

use super::domain::Domain;
use crate::{
    common,
    config::DDMParams,
    kdtree::{KdTree, SpatialIndex},
    zip_sort::zip_sort,
};
use faer::{Mat, RowRef};
use log::{debug, warn};
use rayon::prelude::*;
use scatterfit_kernels::{
    RbfKernel, argmax, argmin, get_distance, get_pointarray_extents, select_mat_rows,
};
use std::collections::VecDeque;

/// A single level in the DDM.
#[derive(Debug)]
pub struct Level {
    /// Union of internal point indices of all domains in the level, sorted.
    pub point_indices: Vec<usize>,

    /// Overlapping domains.
    pub domains: Vec<Domain>,
}

/// A multi-level DDM hierarchy from finest (index 0) to coarsest (last).
#[derive(Debug)]
pub struct DDMTree {
    pub levels: Vec<Level>,
}

impl DDMTree {
    /// Builds and factorises the hierarchy over `points`.
    ///
    /// # Arguments
    /// * `points` - Global point set.
    /// * `kernel` - Kernel of the global system.
    /// * `design` - Global trend design matrix, `N x M`.
    /// * `params` - Decomposition parameters.
    pub fn new<K: RbfKernel>(
        points: &Mat<f64>,
        kernel: &K,
        design: &Mat<f64>,
        params: &DDMParams,
    ) -> Self {
        let mut levels: Vec<Level> = Vec::new();
        let mut active: Vec<usize> = (0..points.nrows()).collect();

        while active.len() > params.coarse_threshold.max(1) {
            let mut level = build_fine_level(points, &active, params);

            level.domains.par_iter_mut().for_each(|domain| {
                domain.factorise(points, kernel, design, false);
            });

            let next = select_coarse_points(points, &level, active.len(), params);

            debug!(
                "DDM level {}: {} points in {} domains, {} promoted",
                levels.len(),
                active.len(),
                level.domains.len(),
                next.len()
            );

            levels.push(level);

            if next.len() >= active.len() {
                warn!("coarse ratio does not reduce the active set, stopping refinement");
                active = next;
                break;
            }
            active = next;
        }

        let mut coarse = Domain::new(active.clone());
        coarse.factorise(points, kernel, design, design.ncols() > 0);

        debug!("DDM coarse level: {} points", active.len());

        levels.push(Level {
            point_indices: active,
            domains: vec![coarse],
        });

        Self { levels }
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// The single domain of the coarsest level.
    pub fn coarse_domain(&self) -> &Domain {
        &self.levels[self.levels.len() - 1].domains[0]
    }
}

/// Bisects `active` into leaves and adds overlap to each of them.
fn build_fine_level(points: &Mat<f64>, active: &[usize], params: &DDMParams) -> Level {
    let dimension = points.ncols();

    let active_points = select_mat_rows(points, active);
    let mut root = Domain::new(active.to_vec());
    root.extents = get_pointarray_extents(&active_points);

    let mut pending: VecDeque<Domain> = VecDeque::from([root]);
    let mut leaves: Vec<Domain> = Vec::new();

    while let Some(current) = pending.pop_front() {
        let num_domain_points = current.num_points();
        if num_domain_points < 2 {
            leaves.push(current);
            continue;
        }

        let current_points = select_mat_rows(points, &current.point_indices);
        let point_extents = get_pointarray_extents(&current_points);
        let axis_lengths: Vec<f64> = (0..dimension)
            .map(|axis| point_extents[axis + dimension] - point_extents[axis])
            .collect();
        let split_axis = argmax(&axis_lengths).unwrap_or(0);

        let mut coordinates: Vec<f64> = current_points.col(split_axis).iter().copied().collect();
        let mut sorted = current.point_indices.clone();
        zip_sort(&mut coordinates, &mut sorted, |a, b| {
            a.0.total_cmp(b.0).then(a.1.cmp(b.1))
        });

        let mid = sorted.len() / 2;
        let split_value = coordinates[mid];

        let mut left_indices = sorted[..mid].to_vec();
        left_indices.sort_unstable();
        let mut right_indices = sorted[mid..].to_vec();
        right_indices.sort_unstable();

        let mut left = Domain::new(left_indices);
        left.extents = current.extents.clone();
        left.extents[split_axis + dimension] = split_value;

        let mut right = Domain::new(right_indices);
        right.extents = current.extents.clone();
        right.extents[split_axis] = split_value;

        // Keep splitting while the children would still exceed the leaf size once
        // overlap is added.
        let with_overlap = num_domain_points as f64 * (1.0 + params.overlap_quota);
        if with_overlap >= 2.0 * params.leaf_threshold as f64 {
            pending.extend([left, right]);
        } else {
            leaves.extend([left, right]);
        }
    }

    add_overlap(points, active, &mut leaves, params);

    let mut point_indices = active.to_vec();
    point_indices.sort_unstable();

    Level {
        point_indices,
        domains: leaves,
    }
}

/// Grows each leaf with the internal points of other leaves closest to its box.
///
/// Candidates come from a nearest neighbour query around the box centre and are
/// ranked by their distance to the box. Each leaf takes
/// `ceil(2 * internal * overlap_quota)` of them.
fn add_overlap(points: &Mat<f64>, active: &[usize], leaves: &mut [Domain], params: &DDMParams) {
    let dimension = points.ncols();
    let active_points = select_mat_rows(points, active);
    let index = KdTree::new(&active_points);

    let position: std::collections::HashMap<usize, usize> =
        active.iter().enumerate().map(|(local, &global)| (global, local)).collect();

    let mut owner = vec![usize::MAX; active.len()];
    for (d, leaf) in leaves.iter().enumerate() {
        for global in &leaf.point_indices {
            owner[position[global]] = d;
        }
    }

    let overlaps: Vec<Vec<usize>> = leaves
        .par_iter()
        .enumerate()
        .map(|(d, leaf)| {
            let num_internal = leaf.num_points();
            let num_overlap = (2.0 * num_internal as f64 * params.overlap_quota).ceil() as usize;
            if num_overlap == 0 {
                return Vec::new();
            }

            let (box_min, box_max) = leaf.extents.split_at(dimension);
            let centre: Vec<f64> = box_min
                .iter()
                .zip(box_max)
                .map(|(lo, hi)| 0.5 * (lo + hi))
                .collect();

            let k = (num_internal + 2 * num_overlap).min(active.len());
            let (neighbours, _) = index.knn_search(RowRef::from_slice(&centre), k);

            let mut candidates: Vec<usize> =
                neighbours.into_iter().filter(|&local| owner[local] != d).collect();
            let mut distances: Vec<f64> = candidates
                .iter()
                .map(|&local| {
                    let point = active_points.row(local);
                    let clipped: Vec<f64> = point
                        .iter()
                        .enumerate()
                        .map(|(axis, x)| x.min(box_max[axis]).max(box_min[axis]))
                        .collect();
                    get_distance(point, RowRef::from_slice(&clipped))
                })
                .collect();

            zip_sort(&mut distances, &mut candidates, |a, b| {
                a.0.total_cmp(b.0).then(a.1.cmp(b.1))
            });

            candidates
                .into_iter()
                .take(num_overlap)
                .map(|local| active[local])
                .collect()
        })
        .collect();

    for (leaf, overlap) in leaves.iter_mut().zip(overlaps) {
        leaf.add_overlap(&overlap);
    }
}

/// Promotes per leaf the point closest to the internal centroid, followed by farthest
/// point samples, to the next level.
fn select_coarse_points(
    points: &Mat<f64>,
    level: &Level,
    num_active: usize,
    params: &DDMParams,
) -> Vec<usize> {
    let num_domains = level.domains.len().max(1);
    let num_coarse = ((num_active as f64 * params.coarse_ratio).ceil() / num_domains as f64)
        .ceil() as usize;

    let mut promoted: Vec<usize> = level
        .domains
        .par_iter()
        .flat_map_iter(|domain| {
            let internal = domain.internal_indices();
            let internal_points = select_mat_rows(points, &internal);

            let centre = get_centroid(&internal_points);
            let distances: Vec<f64> = internal_points
                .row_iter()
                .map(|row| get_distance(RowRef::from_slice(&centre), row))
                .collect();

            let selected = match argmin(&distances) {
                Some(seed) => common::farthest_point_sampling(&internal_points, num_coarse, seed),
                None => Vec::new(),
            };

            selected.into_iter().map(move |local| internal[local])
        })
        .collect();

    promoted.sort_unstable();
    promoted
}

/// Computes the centroid of a point matrix.
fn get_centroid(points: &Mat<f64>) -> Vec<f64> {
    let num_points = points.nrows().max(1) as f64;
    points
        .col_iter()
        .map(|column| column.iter().sum::<f64>() / num_points)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate_random_points;
    use scatterfit_kernels::kernels::CovExponential;
    use std::collections::HashSet;

    fn build(n: usize, dim: usize, params: DDMParams) -> DDMTree {
        let points = generate_random_points(n, dim, Some(42));
        let kernel = CovExponential::new(1.0, 0.5).with_nugget(1e-3);
        DDMTree::new(&points, &kernel, &Mat::zeros(n, 0), &params)
    }

    fn run_union_test(dim: usize) {
        let params = DDMParams {
            leaf_threshold: 5,
            overlap_quota: 0.5,
            coarse_ratio: 0.5,
            coarse_threshold: 10,
        };
        let ddm = build(100, dim, params);

        for (lvl_idx, level) in ddm.levels.iter().enumerate() {
            let mut union_internal: Vec<usize> = level
                .domains
                .iter()
                .flat_map(|dom| dom.internal_indices())
                .collect();
            union_internal.sort_unstable();

            assert_eq!(
                union_internal, level.point_indices,
                "dim={dim} level={lvl_idx}: union(internal) must equal level.point_indices"
            );
        }
    }

    #[test]
    fn union_match_1d() {
        run_union_test(1);
    }
    #[test]
    fn union_match_2d() {
        run_union_test(2);
    }
    #[test]
    fn union_match_3d() {
        run_union_test(3);
    }

    fn run_disjointness_test(dim: usize) {
        let params = DDMParams {
            leaf_threshold: 8,
            overlap_quota: 0.25,
            coarse_ratio: 0.3,
            coarse_threshold: 12,
        };
        let ddm = build(96, dim, params);

        for (lvl_idx, level) in ddm.levels.iter().enumerate() {
            let mut seen = HashSet::<usize>::new();
            for (d_idx, dom) in level.domains.iter().enumerate() {
                for gi in dom.internal_indices() {
                    assert!(
                        seen.insert(gi),
                        "dim={dim} level={lvl_idx} domain={d_idx}: internal index {gi} appears in multiple domains"
                    );
                }
            }
        }
    }

    #[test]
    fn disjoint_internal_2d() {
        run_disjointness_test(2);
    }
    #[test]
    fn disjoint_internal_3d() {
        run_disjointness_test(3);
    }

    #[test]
    fn overlap_is_bounded_and_borrowed_from_the_level() {
        let params = DDMParams {
            leaf_threshold: 9,
            overlap_quota: 0.25,
            coarse_ratio: 0.3,
            coarse_threshold: 14,
        };
        let ddm = build(80, 3, params);
        let level = &ddm.levels[0];
        let level_set: HashSet<usize> = level.point_indices.iter().copied().collect();

        for dom in &level.domains {
            let internal = dom.internal_mask.iter().filter(|&&b| b).count();
            let overlap = dom.internal_mask.len() - internal;
            let bound = ((2.0 * internal as f64) * params.overlap_quota).ceil() as usize;

            assert!(overlap > 0 && overlap <= bound, "overlap {overlap}, bound {bound}");

            let first_borrowed = dom.internal_mask.iter().position(|&b| !b).unwrap();
            assert!(dom.internal_mask[first_borrowed..].iter().all(|&b| !b));

            let internal_set: HashSet<usize> = dom.internal_indices().into_iter().collect();
            for &gi in &dom.point_indices[first_borrowed..] {
                assert!(level_set.contains(&gi));
                assert!(!internal_set.contains(&gi));
            }
        }
    }

    #[test]
    fn levels_shrink_to_a_single_coarse_domain() {
        let params = DDMParams {
            leaf_threshold: 8,
            overlap_quota: 0.2,
            coarse_ratio: 0.25,
            coarse_threshold: 16,
        };
        let ddm = build(96, 2, params);
        assert!(ddm.num_levels() > 1);

        for w in ddm.levels.windows(2) {
            let a: HashSet<_> = w[0].point_indices.iter().copied().collect();
            assert!(w[1].point_indices.len() < w[0].point_indices.len());
            assert!(w[1].point_indices.iter().all(|gi| a.contains(gi)));
        }

        let coarse = ddm.levels.last().unwrap();
        assert_eq!(coarse.domains.len(), 1);
        assert!(coarse.point_indices.len() <= params.coarse_threshold);
        assert!(ddm.coarse_domain().internal_mask.iter().all(|&b| b));
    }

    #[test]
    fn small_point_sets_only_have_a_coarse_level() {
        let params = DDMParams {
            leaf_threshold: 8,
            overlap_quota: 0.2,
            coarse_ratio: 0.5,
            coarse_threshold: 25,
        };
        let ddm = build(25, 2, params);
        assert_eq!(ddm.num_levels(), 1);
        assert_eq!(ddm.levels[0].domains.len(), 1);
    }

    #[test]
    fn empty_point_set_builds_an_empty_coarse_level() {
        let ddm = build(0, 3, DDMParams::default());
        assert_eq!(ddm.num_levels(), 1);
        assert_eq!(ddm.coarse_domain().num_points(), 0);
    }
}
