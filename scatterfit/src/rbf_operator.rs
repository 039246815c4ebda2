/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements the augmented RBF system operator [K + nugget I, P; P^T, 0].
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # rbf_operator
//!
//! Applies the interpolation system matrix
//!
//! ```text
//! | K + nugget I   P |
//! | P^T            0 |
//! ```
//!
//! to a vector of `N` point weights followed by `M` trend coefficients, where `K` is the
//! signed kernel matrix and `P` the orthonormal trend design matrix on the points.
//!
//! Kernel sums use direct summation for small point sets and the FMM otherwise.

use crate::{
    SolverError,
    config::FmmParams,
    direct_evaluator::kernel_sum,
    polynomials::{OrthonormalBasis, basis_size, validate_degree},
};
use faer::{Mat, MatRef};
use log::debug;
use scatterfit_fmm::{BoundingBox3, FmmTree};
use scatterfit_kernels::{FmmKernel, RbfKernel};

/// Relative padding applied to the bounding box of a point set before building a tree.
pub(crate) const TREE_BOX_PADDING: f64 = 1e-3;

/// How the kernel block is summed.
#[derive(Debug)]
pub(crate) enum Summation<K: RbfKernel> {
    Direct,
    Tree(FmmTree<FmmKernel<K>>),
}

impl<K: RbfKernel + Clone> Summation<K> {
    /// Direct for point sets up to `direct_threshold`, otherwise a tree sized for the points.
    pub(crate) fn for_points(
        kernel: &K,
        points: &Mat<f64>,
        interpolation_order: usize,
        fmm_params: &FmmParams,
        direct_threshold: usize,
    ) -> Result<Self, SolverError> {
        if points.nrows() <= direct_threshold || points.ncols() != 3 {
            return Ok(Summation::Direct);
        }

        let bbox = BoundingBox3::from_points(points)
            .ok_or(SolverError::UnsupportedDimension(points.ncols()))?
            .padded(TREE_BOX_PADDING);
        let height = fmm_params.tree_height_for(points.nrows());

        let mut tree = FmmTree::new(FmmKernel(kernel.clone()), bbox, height, interpolation_order)?;
        tree.set_points(points)?;

        Ok(Summation::Tree(tree))
    }

    /// Kernel sum at the selected target rows of the attached points.
    pub(crate) fn apply(
        &self,
        kernel: &K,
        points: &Mat<f64>,
        weights: MatRef<f64>,
        targets: Option<&[usize]>,
    ) -> Mat<f64> {
        match self {
            Summation::Direct => kernel_sum(kernel, points, weights, points, targets),
            Summation::Tree(tree) => {
                let all = tree.evaluate(weights).unwrap_or_else(|err| {
                    panic!("FMM evaluation failed on attached points: {err}")
                });
                match targets {
                    None => all,
                    Some(rows) => Mat::from_fn(rows.len(), all.ncols(), |i, col| {
                        all[(rows[i], col)]
                    }),
                }
            }
        }
    }
}

/// The augmented interpolation system operator.
#[derive(Debug)]
pub struct RbfOperator<K: RbfKernel> {
    kernel: K,
    dimension: usize,
    degree: i32,
    points: Mat<f64>,
    summation: Summation<K>,
    trend: Option<OrthonormalBasis>,

    /// Orthonormal trend design matrix on the points, `N x M`.
    design: Mat<f64>,
}

pub(crate) fn validate_dimension(dimension: usize) -> Result<(), SolverError> {
    match (1..=3).contains(&dimension) {
        true => Ok(()),
        false => Err(SolverError::UnsupportedDimension(dimension)),
    }
}

/// Points need between `dimension` and 3 coordinates; the trend uses the leading
/// `dimension` of them.
pub(crate) fn validate_points(points: &Mat<f64>, dimension: usize) -> Result<(), SolverError> {
    validate_dimension(dimension)?;
    if points.nrows() > 0 && !(dimension..=3).contains(&points.ncols()) {
        return Err(SolverError::UnsupportedDimension(points.ncols()));
    }
    Ok(())
}

/// Builds the orthonormal trend basis and its design matrix on `points`.
/// No basis is built for an empty point set.
pub(crate) fn build_trend(
    dimension: usize,
    degree: i32,
    points: &Mat<f64>,
) -> Result<(Option<OrthonormalBasis>, Mat<f64>), SolverError> {
    let size = basis_size(dimension, degree);
    if size == 0 || points.nrows() == 0 {
        return Ok((None, Mat::zeros(points.nrows(), size)));
    }

    let basis = OrthonormalBasis::new(dimension, degree, points)?;
    let design = basis.evaluate_points(points);
    Ok((Some(basis), design))
}

impl<K: RbfKernel + Clone> RbfOperator<K> {
    /// Builds the operator on `points`, choosing direct summation when there are at
    /// most `direct_threshold` points and tree summation otherwise.
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
            fmm_params.interpolation_order,
            fmm_params,
            direct_threshold,
        )?;
        let (trend, design) = build_trend(dimension, degree, points)?;

        debug!(
            "RBF operator built on {} points ({} summation, {} trend terms)",
            points.nrows(),
            match summation {
                Summation::Direct => "direct",
                Summation::Tree(_) => "tree",
            },
            design.ncols()
        );

        Ok(Self {
            kernel,
            dimension,
            degree,
            points: points.clone(),
            summation,
            trend,
            design,
        })
    }

    /// Builds a tree-mode operator with a fixed geometry and no points. Points are
    /// attached with [`RbfOperator::set_points`]; until then the operator acts on an
    /// empty system.
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
            fmm_params.interpolation_order,
        )?;

        Ok(Self {
            kernel,
            dimension,
            degree,
            points: Mat::zeros(0, 3),
            summation: Summation::Tree(tree),
            trend: None,
            design: Mat::zeros(0, basis_size(dimension, degree)),
        })
    }

    /// Replaces the points. In tree mode the geometry and cached far field operators
    /// are kept and only the point lists are rebuilt. On error the operator is unchanged.
    pub fn set_points(&mut self, points: &Mat<f64>) -> Result<(), SolverError> {
        validate_points(points, self.dimension)?;

        let (trend, design) = build_trend(self.dimension, self.degree, points)?;

        if let Summation::Tree(tree) = &mut self.summation {
            tree.set_points(points)?;
        }

        self.points = points.clone();
        self.trend = trend;
        self.design = design;

        Ok(())
    }

    pub fn num_points(&self) -> usize {
        self.points.nrows()
    }

    pub fn num_polynomials(&self) -> usize {
        self.design.ncols()
    }

    pub fn points(&self) -> &Mat<f64> {
        &self.points
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn degree(&self) -> i32 {
        self.degree
    }

    /// Orthonormal trend design matrix on the points, `N x M`.
    pub fn design_matrix(&self) -> &Mat<f64> {
        &self.design
    }

    /// Trend basis built on the current points. `None` without a trend or without points.
    pub fn trend_basis(&self) -> Option<&OrthonormalBasis> {
        self.trend.as_ref()
    }

    pub fn is_tree_mode(&self) -> bool {
        matches!(self.summation, Summation::Tree(_))
    }

    /// Applies the system matrix to `w` (`(N + M) x 1`).
    ///
    /// # Panics
    /// If `w` does not have `N + M` rows.
    pub fn apply(&self, w: MatRef<f64>) -> Mat<f64> {
        self.apply_impl(w, None)
    }

    /// Like [`RbfOperator::apply`], but the top block is only evaluated at `targets`;
    /// the remaining top rows are zero. The bottom block is always complete.
    pub fn apply_partial(&self, w: MatRef<f64>, targets: &[usize]) -> Mat<f64> {
        self.apply_impl(w, Some(targets))
    }

    fn apply_impl(&self, w: MatRef<f64>, targets: Option<&[usize]>) -> Mat<f64> {
        let n = self.num_points();
        let m = self.num_polynomials();
        assert_eq!(w.nrows(), n + m, "operator applied to a vector of the wrong length");

        let nrhs = w.ncols();
        let w_points = w.subrows(0, n);
        let w_trend = w.subrows(n, m);

        let mut y = Mat::<f64>::zeros(n + m, nrhs);
        if n == 0 {
            return y;
        }

        let sums = self.summation.apply(&self.kernel, &self.points, w_points, targets);
        let trend_part = &self.design * w_trend;
        let nugget = self.kernel.nugget();

        let rows: Vec<usize> = match targets {
            Some(rows) => rows.to_vec(),
            None => (0..n).collect(),
        };

        for (k, &i) in rows.iter().enumerate() {
            for col in 0..nrhs {
                y[(i, col)] = sums[(k, col)] + nugget * w_points[(i, col)] + trend_part[(i, col)];
            }
        }

        if m > 0 {
            let moments = self.design.transpose() * w_points;
            y.subrows_mut(n, m).copy_from(&moments);
        }

        y
    }
}
