/////////////////////////////////////////////////////////////////////////////////////////////
//
// Measures the true interpolation misfit of a candidate solution at the sample points.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::{
    SolverError,
    config::FmmParams,
    direct_evaluator::kernel_sum,
    polynomials::validate_degree,
    rbf_operator::{Summation, build_trend, validate_dimension, validate_points},
};
use faer::{Mat, MatRef};
use scatterfit_fmm::{BoundingBox3, FmmTree};
use scatterfit_kernels::{FmmKernel, RbfKernel};

/// Number of sample points used to estimate the tree summation error.
const ERROR_SAMPLES: usize = 64;

/// Reconstructs `K w + nugget w + P c` at the sample points and compares it to the
/// sample values.
///
/// The evaluator owns its own kernel summation. In tree mode it runs at
/// [`FmmParams::evaluator_interpolation_order`], so its answer does not share the
/// approximation error of the operator the Krylov solver iterates with. Its own error
/// is estimated by [`ResidualEvaluator::summation_error`].
#[derive(Debug)]
pub struct ResidualEvaluator<K: RbfKernel> {
    kernel: K,
    dimension: usize,
    degree: i32,
    points: Mat<f64>,
    summation: Summation<K>,
    design: Mat<f64>,
}

impl<K: RbfKernel + Clone> ResidualEvaluator<K> {
    pub fn new(
        kernel: K,
        dimension: usize,
        degree: i32,
        points: &Mat<f64>,
        fmm_params: &FmmParams,
        direct_threshold: usize,
    ) -> Result<Self, SolverError> {
        validate_points(points, dimension)?;
        validate_degree(degree)?;

        let summation = Summation::for_points(
            &kernel,
            points,
            fmm_params.evaluator_interpolation_order,
            fmm_params,
            direct_threshold,
        )?;
        let (_, design) = build_trend(dimension, degree, points)?;

        Ok(Self {
            kernel,
            dimension,
            degree,
            points: points.clone(),
            summation,
            design,
        })
    }

    /// Tree-mode evaluator with no points attached.
    pub fn with_tree(
        kernel: K,
        dimension: usize,
        degree: i32,
        tree_height: usize,
        bbox: BoundingBox3,
        fmm_params: &FmmParams,
    ) -> Result<Self, SolverError> {
        validate_dimension(dimension)?;
        validate_degree(degree)?;

        let tree = FmmTree::new(
            FmmKernel(kernel.clone()),
            bbox,
            tree_height,
            fmm_params.evaluator_interpolation_order,
        )?;
        let (_, design) = build_trend(dimension, degree, &Mat::zeros(0, 3))?;

        Ok(Self {
            kernel,
            dimension,
            degree,
            points: Mat::zeros(0, 3),
            summation: Summation::Tree(tree),
            design,
        })
    }

    /// Replaces the points. On error the evaluator is unchanged.
    pub fn set_points(&mut self, points: &Mat<f64>) -> Result<(), SolverError> {
        validate_points(points, self.dimension)?;

        let (_, design) = build_trend(self.dimension, self.degree, points)?;
        if let Summation::Tree(tree) = &mut self.summation {
            tree.set_points(points)?;
        }

        self.points = points.clone();
        self.design = design;
        Ok(())
    }

    pub fn num_points(&self) -> usize {
        self.points.nrows()
    }

    /// Reproduced values `K w + nugget w + P c` at every sample point.
    pub fn reproduce(&self, solution: MatRef<f64>) -> Mat<f64> {
        let n = self.num_points();
        let m = self.design.ncols();
        assert_eq!(solution.nrows(), n + m, "solution has the wrong length");

        let weights = solution.subrows(0, n);
        let mut values = self.summation.apply(&self.kernel, &self.points, weights, None);
        if m > 0 {
            values += &self.design * solution.subrows(n, m);
        }

        let nugget = self.kernel.nugget();
        if nugget != 0.0 {
            values += Mat::from_fn(n, weights.ncols(), |i, j| nugget * weights[(i, j)]);
        }
        values
    }

    /// Estimated error of the kernel sums for the weights of `solution`: the largest
    /// difference between the tree sums and direct sums at a sample of the points.
    /// Zero for direct summation.
    pub fn summation_error(&self, solution: MatRef<f64>) -> f64 {
        let n = self.num_points();
        if n == 0 || matches!(self.summation, Summation::Direct) {
            return 0.0;
        }

        let stride = n.div_ceil(ERROR_SAMPLES);
        let rows: Vec<usize> = (0..n).step_by(stride).collect();
        let weights = solution.subrows(0, n);

        let tree = self.summation.apply(&self.kernel, &self.points, weights, Some(&rows));
        let direct = kernel_sum(&self.kernel, &self.points, weights, &self.points, Some(&rows));
        (&tree - &direct).norm_max()
    }

    /// Largest absolute misfit between the reproduced and the sample values, and whether
    /// it is within `absolute_tolerance`. An empty point set is trivially converged.
    pub fn converged(
        &self,
        values: MatRef<f64>,
        solution: MatRef<f64>,
        absolute_tolerance: f64,
    ) -> (bool, f64) {
        if self.num_points() == 0 {
            return (true, 0.0);
        }

        let misfit = self.reproduce(solution) - values;
        let residual = misfit.norm_max();

        (residual <= absolute_tolerance, residual)
    }
}
