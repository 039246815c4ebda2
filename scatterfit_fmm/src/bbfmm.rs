/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements the uniform octree Black Box Fast Multipole Method (BBFMM) and its passes.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::{
    chebyshev::ChebyshevBasis,
    geometry::BoundingBox3,
    traits::KernelFunction,
    uniform_tree::{CellCoords, TreeLists, UniformTree, octant},
};
use faer::{Mat, MatRef};
use log::debug;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Deepest tree supported. Cell coordinates are stored as `i64`, the limit keeps
/// the number of cells per axis well inside that range.
pub const MAX_TREE_HEIGHT: usize = 16;

/// Errors that can occur during FMM tree operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FmmError {
    /// A point could not be assigned to any cell in the tree
    /// because it lies outside the tree extents.
    #[error("point at row {point_index} lies outside the tree extents")]
    PointOutsideTree { point_index: usize },

    #[error("tree height {height} exceeds the supported maximum of {max}")]
    TreeTooDeep { height: usize, max: usize },

    #[error("bounding box must have finite, positive extents on every axis")]
    DegenerateBoundingBox,

    #[error("interpolation order must be at least 1")]
    InvalidInterpolationOrder,

    #[error("points must have 3 columns, got {0}")]
    UnsupportedDimension(usize),

    #[error("expected {expected} weight rows, got {found}")]
    WeightCountMismatch { expected: usize, found: usize },
}

/// Key of a cached M2L operator: the tree level and the source offset in cell widths.
type M2LKey = (usize, CellCoords);

/// Fast summation of a smooth kernel over a set of source points.
///
/// The tree geometry (bounding box and height) is fixed at construction. Points are
/// attached with [`FmmTree::set_points`], which may be called repeatedly; M2L operators
/// only depend on the geometry and are reused between point sets.
///
/// [`FmmTree::evaluate`] computes `y_i = sum_j K(x_i, x_j) w_j` for every attached point,
/// for each column of the weights.
#[derive(Debug)]
pub struct FmmTree<K: KernelFunction> {
    kernel: K,

    tree: UniformTree,

    basis: ChebyshevBasis,

    /// Attached points, shape (N, 3).
    source_points: Mat<f64>,

    /// Cell hierarchy and lists for the attached points.
    lists: TreeLists,

    /// Cell-to-cell far field operators, `order^3 x order^3`, rows indexed by target nodes.
    m2l_operators: HashMap<M2LKey, Mat<f64>>,
}

impl<K: KernelFunction + Send + Sync> FmmTree<K> {
    /// Creates a tree with no attached points.
    ///
    /// # Arguments
    /// * `kernel`: Kernel function used for all interactions.
    /// * `bbox`: Extents of the root cell. Every point attached later must lie inside it.
    /// * `tree_height`: Number of subdivisions from the root to the leaves. Heights below 2
    ///   have no well separated cells, so every interaction is computed directly.
    /// * `interpolation_order`: Number of Chebyshev nodes per axis in each cell.
    pub fn new(
        kernel: K,
        bbox: BoundingBox3,
        tree_height: usize,
        interpolation_order: usize,
    ) -> Result<Self, FmmError> {
        if !bbox.is_valid() {
            return Err(FmmError::DegenerateBoundingBox);
        }
        if interpolation_order == 0 {
            return Err(FmmError::InvalidInterpolationOrder);
        }
        if tree_height > MAX_TREE_HEIGHT {
            return Err(FmmError::TreeTooDeep {
                height: tree_height,
                max: MAX_TREE_HEIGHT,
            });
        }

        Ok(Self {
            kernel,
            tree: UniformTree {
                bbox,
                height: tree_height,
            },
            basis: ChebyshevBasis::new(interpolation_order),
            source_points: Mat::zeros(0, 3),
            lists: TreeLists::default(),
            m2l_operators: HashMap::new(),
        })
    }

    /// Attaches a new set of points, replacing any previous set.
    ///
    /// On error the previously attached points are kept.
    pub fn set_points(&mut self, points: &Mat<f64>) -> Result<(), FmmError> {
        if points.ncols() != 3 && points.nrows() > 0 {
            return Err(FmmError::UnsupportedDimension(points.ncols()));
        }

        let lists = self.tree.build_lists(points)?;

        let missing: HashSet<M2LKey> = (2..=self.tree.height)
            .flat_map(|level| {
                lists.levels[level]
                    .interactions
                    .iter()
                    .flatten()
                    .map(move |(_, offset)| (level, *offset))
            })
            .filter(|key| !self.m2l_operators.contains_key(key))
            .collect();

        let computed: Vec<(M2LKey, Mat<f64>)> = missing
            .into_par_iter()
            .map(|key| (key, self.m2l_operator(key)))
            .collect();

        self.m2l_operators.extend(computed);

        self.source_points = points.clone();
        self.lists = lists;

        debug!(
            "FMM tree attached {} points to {} leaves at height {}; {} M2L operators cached",
            self.source_points.nrows(),
            self.lists.leaf_points.len(),
            self.tree.height,
            self.m2l_operators.len()
        );

        Ok(())
    }

    /// Number of attached points.
    pub fn num_points(&self) -> usize {
        self.source_points.nrows()
    }

    pub fn source_points(&self) -> &Mat<f64> {
        &self.source_points
    }

    pub fn height(&self) -> usize {
        self.tree.height
    }

    pub fn bbox(&self) -> &BoundingBox3 {
        &self.tree.bbox
    }

    pub fn interpolation_order(&self) -> usize {
        self.basis.order
    }

    /// Evaluates the kernel sum at every attached point.
    ///
    /// # Arguments
    /// * `weights`: Matrix of shape (N, K), one row per attached point and one column per
    ///   right-hand side.
    ///
    /// # Returns
    /// * Matrix of shape (N, K) with the potential at each attached point.
    pub fn evaluate(&self, weights: MatRef<f64>) -> Result<Mat<f64>, FmmError> {
        let num_points = self.source_points.nrows();
        if weights.nrows() != num_points {
            return Err(FmmError::WeightCountMismatch {
                expected: num_points,
                found: weights.nrows(),
            });
        }

        let nrhs = weights.ncols();
        let mut values = Mat::<f64>::zeros(num_points, nrhs);
        if num_points == 0 || nrhs == 0 {
            return Ok(values);
        }

        let locals = if self.tree.height >= 2 {
            let multipoles = self.upward_pass(weights);
            Some(self.downward_pass(&multipoles, nrhs))
        } else {
            None
        };

        let leaf_values: Vec<Mat<f64>> = (0..self.lists.leaf_points.len())
            .into_par_iter()
            .map(|leaf_idx| {
                let far = locals.as_ref().map(|l| &l[self.tree.height][leaf_idx]);
                self.leaf_pass(leaf_idx, far, weights)
            })
            .collect();

        for (indices, leaf) in self.lists.leaf_points.iter().zip(leaf_values.iter()) {
            for (row, &point_idx) in indices.iter().enumerate() {
                for col in 0..nrhs {
                    values[(point_idx, col)] = leaf[(row, col)];
                }
            }
        }

        Ok(values)
    }

    /// Far field operator between a target cell and a source cell at `offset`, both at `level`.
    fn m2l_operator(&self, (level, offset): M2LKey) -> Mat<f64> {
        let width = self.tree.cell_width(level);
        let half = [0.5 * width[0], 0.5 * width[1], 0.5 * width[2]];
        let nodes = &self.basis.tensor_nodes;
        let num_nodes = self.basis.num_nodes();

        // Target cell centred on the origin.
        let targets = Mat::from_fn(num_nodes, 3, |a, axis| half[axis] * nodes[(a, axis)]);
        let sources = Mat::from_fn(num_nodes, 3, |b, axis| {
            offset[axis] as f64 * width[axis] + half[axis] * nodes[(b, axis)]
        });

        Mat::from_fn(num_nodes, num_nodes, |a, b| {
            self.kernel.evaluate(targets.row(a), sources.row(b))
        })
    }

    /// Anterpolation matrix of a leaf, `order^3 x n_leaf`.
    fn leaf_interpolation(&self, leaf_idx: usize) -> Mat<f64> {
        let leaf = self.lists.levels[self.tree.height].cells[leaf_idx];
        let local = self.tree.to_reference(
            &self.source_points,
            &self.lists.leaf_points[leaf_idx],
            leaf,
        );
        self.basis.tensor_weights(&local)
    }

    /// Performs the upward pass of the tree:
    /// * `P2M`: Maps point weights to multipole expansions at the Chebyshev nodes of each leaf.
    /// * `M2M`: Aggregates child multipole expansions into their parents, level by level,
    ///   stopping at level 2.
    ///
    /// Returns multipole coefficients indexed by level then cell, empty above level 2.
    fn upward_pass(&self, weights: MatRef<f64>) -> Vec<Vec<Mat<f64>>> {
        let height = self.tree.height;
        let nrhs = weights.ncols();
        let mut multipoles: Vec<Vec<Mat<f64>>> = vec![Vec::new(); height + 1];

        multipoles[height] = self
            .lists
            .leaf_points
            .par_iter()
            .enumerate()
            .map(|(leaf_idx, indices)| {
                let leaf_weights =
                    Mat::from_fn(indices.len(), nrhs, |i, col| weights[(indices[i], col)]);
                self.leaf_interpolation(leaf_idx) * &leaf_weights
            })
            .collect();

        for level in (2..height).rev() {
            let (upper, lower) = multipoles.split_at_mut(level + 1);
            let children_multipoles = &lower[0];
            let current = &self.lists.levels[level];
            let child_level = &self.lists.levels[level + 1];

            upper[level] = current
                .children
                .par_iter()
                .map(|children| {
                    let mut multipole = Mat::<f64>::zeros(self.basis.num_nodes(), nrhs);
                    for &child_idx in children {
                        let m2m = &self.basis.m2m[octant(child_level.cells[child_idx])];
                        multipole += m2m * &children_multipoles[child_idx];
                    }
                    multipole
                })
                .collect();
        }

        multipoles
    }

    /// Performs the downward pass of the tree:
    /// * `M2L`: Converts multipole expansions of well separated cells into local expansions.
    /// * `L2L`: Shifts each parent's local expansion onto its children.
    ///
    /// Returns local coefficients indexed by level then cell, empty above level 2.
    fn downward_pass(&self, multipoles: &[Vec<Mat<f64>>], nrhs: usize) -> Vec<Vec<Mat<f64>>> {
        let height = self.tree.height;
        let mut locals: Vec<Vec<Mat<f64>>> = vec![Vec::new(); height + 1];

        for level in 2..=height {
            let current = &self.lists.levels[level];
            let parent_locals = &locals[level - 1];

            let level_locals: Vec<Mat<f64>> = (0..current.cells.len())
                .into_par_iter()
                .map(|cell_idx| {
                    let mut local = Mat::<f64>::zeros(self.basis.num_nodes(), nrhs);

                    for (source_idx, offset) in &current.interactions[cell_idx] {
                        if let Some(m2l) = self.m2l_operators.get(&(level, *offset)) {
                            local += m2l * &multipoles[level][*source_idx];
                        }
                    }

                    if level > 2 {
                        let l2l = self.basis.m2m[octant(current.cells[cell_idx])].transpose();
                        local += l2l * &parent_locals[current.parents[cell_idx]];
                    }

                    local
                })
                .collect();

            locals[level] = level_locals;
        }

        locals
    }

    /// Leaf evaluation:
    /// * `L2P`: Interpolates the leaf's local expansion onto its points.
    /// * `P2P`: Adds direct interactions with every point in adjacent leaves.
    ///
    /// Returns values for the leaf's points in the order of its point list.
    fn leaf_pass(
        &self,
        leaf_idx: usize,
        local: Option<&Mat<f64>>,
        weights: MatRef<f64>,
    ) -> Mat<f64> {
        let targets = &self.lists.leaf_points[leaf_idx];
        let nrhs = weights.ncols();

        let mut values = match local {
            Some(local) => self.leaf_interpolation(leaf_idx).transpose() * local,
            None => Mat::<f64>::zeros(targets.len(), nrhs),
        };

        // Without a far field every leaf interacts directly with every other.
        let near: Vec<usize> = match local {
            Some(_) => self.lists.near[leaf_idx].clone(),
            None => (0..self.lists.leaf_points.len()).collect(),
        };

        for (row, &target_idx) in targets.iter().enumerate() {
            let target = self.source_points.row(target_idx);
            for &neighbour in &near {
                for &source_idx in &self.lists.leaf_points[neighbour] {
                    let k = self
                        .kernel
                        .evaluate(target, self.source_points.row(source_idx));
                    for col in 0..nrhs {
                        values[(row, col)] += k * weights[(source_idx, col)];
                    }
                }
            }
        }

        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::{RowRef, mat};
    use rand::{Rng, SeedableRng, rngs::StdRng};

    #[derive(Debug)]
    struct ExponentialKernel;

    impl KernelFunction for ExponentialKernel {
        #[inline(always)]
        fn evaluate(&self, target: RowRef<f64>, source: RowRef<f64>) -> f64 {
            let mut dist = 0.0;
            for (t, s) in target.iter().zip(source.iter()) {
                let diff = t - s;
                dist += diff * diff;
            }
            (-dist.sqrt() / 0.5).exp()
        }
    }

    fn direct_sum(points: &Mat<f64>, weights: &Mat<f64>) -> Mat<f64> {
        Mat::from_fn(points.nrows(), weights.ncols(), |i, col| {
            (0..points.nrows())
                .map(|j| {
                    ExponentialKernel.evaluate(points.row(i), points.row(j)) * weights[(j, col)]
                })
                .sum()
        })
    }

    fn relative_error(approx: &Mat<f64>, exact: &Mat<f64>) -> f64 {
        (approx - exact).norm_l2() / exact.norm_l2()
    }

    fn random_problem(n: usize, nrhs: usize, seed: u64) -> (Mat<f64>, Mat<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let points = Mat::from_fn(n, 3, |_, _| rng.random_range(0.0..1.0));
        let weights = Mat::from_fn(n, nrhs, |_, _| rng.random_range(-1.0..1.0));
        (points, weights)
    }

    fn unit_box() -> BoundingBox3 {
        BoundingBox3::new([0.0; 3], [1.0; 3])
    }

    #[test]
    fn fmm_matches_direct_summation() {
        let (points, weights) = random_problem(1000, 2, 42);

        let mut tree = FmmTree::new(ExponentialKernel, unit_box(), 3, 6).unwrap();
        tree.set_points(&points).unwrap();

        let approx = tree.evaluate(weights.as_ref()).unwrap();
        let exact = direct_sum(&points, &weights);

        let err = relative_error(&approx, &exact);
        assert!(err < 1e-3, "relative error {err}");
    }

    #[test]
    fn shallow_tree_is_exact() {
        let (points, weights) = random_problem(200, 1, 3);

        let mut tree = FmmTree::new(ExponentialKernel, unit_box(), 1, 4).unwrap();
        tree.set_points(&points).unwrap();

        let approx = tree.evaluate(weights.as_ref()).unwrap();
        let exact = direct_sum(&points, &weights);

        assert!(relative_error(&approx, &exact) < 1e-12);
    }

    #[test]
    fn points_can_be_replaced() {
        let (first, _) = random_problem(300, 1, 5);
        let (second, weights) = random_problem(400, 1, 6);

        let mut tree = FmmTree::new(ExponentialKernel, unit_box(), 2, 6).unwrap();
        tree.set_points(&first).unwrap();
        tree.set_points(&second).unwrap();
        assert_eq!(tree.num_points(), 400);

        let approx = tree.evaluate(weights.as_ref()).unwrap();
        let exact = direct_sum(&second, &weights);
        assert!(relative_error(&approx, &exact) < 1e-3);
    }

    #[test]
    fn set_points_returns_error_for_point_outside_extents() {
        let mut tree = FmmTree::new(ExponentialKernel, unit_box(), 2, 3).unwrap();
        let points = mat![[0.5, 0.5, 0.5], [10.0, 0.5, 0.5]];

        match tree.set_points(&points) {
            Err(FmmError::PointOutsideTree { point_index }) => assert_eq!(point_index, 1),
            other => panic!("Expected PointOutsideTree error, got {:?}", other),
        }
        assert_eq!(tree.num_points(), 0);
    }

    #[test]
    fn evaluate_checks_weight_rows() {
        let (points, _) = random_problem(10, 1, 1);
        let mut tree = FmmTree::new(ExponentialKernel, unit_box(), 2, 3).unwrap();
        tree.set_points(&points).unwrap();

        let err = tree.evaluate(Mat::<f64>::zeros(9, 1).as_ref()).unwrap_err();
        assert_eq!(
            err,
            FmmError::WeightCountMismatch {
                expected: 10,
                found: 9
            }
        );
    }

    #[test]
    fn empty_tree_evaluates_to_empty() {
        let tree = FmmTree::new(ExponentialKernel, unit_box(), 3, 4).unwrap();
        let values = tree.evaluate(Mat::<f64>::zeros(0, 2).as_ref()).unwrap();
        assert_eq!(values.shape(), (0, 2));
    }

    #[test]
    fn invalid_construction_is_rejected() {
        assert_eq!(
            FmmTree::new(ExponentialKernel, unit_box(), 3, 0).unwrap_err(),
            FmmError::InvalidInterpolationOrder
        );
        assert_eq!(
            FmmTree::new(ExponentialKernel, unit_box(), 17, 4).unwrap_err(),
            FmmError::TreeTooDeep { height: 17, max: 16 }
        );
        let inverted = BoundingBox3::new([1.0; 3], [0.0; 3]);
        assert_eq!(
            FmmTree::new(ExponentialKernel, inverted, 2, 4).unwrap_err(),
            FmmError::DegenerateBoundingBox
        );
    }
}
