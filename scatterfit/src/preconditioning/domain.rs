/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements overlapping subdomains and their local direct solvers.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # domain
//!
//! One overlapping subproblem of the domain decomposition preconditioner. A [`Domain`]
//! holds a subset of the global points, assembles the local interpolation system on
//! them and factorises it once, so every preconditioner application is a pair of
//! triangular solves per domain.
//!
//! With a trend, the local system is the saddle point system
//!
//! ```text
//! | A_loc + nugget I   P_loc |
//! | P_loc^T            0     |
//! ```
//!
//! where `P_loc` holds the linearly independent columns of the global design matrix
//! restricted to the domain. Keeping the constraint rows makes the local system
//! nonsingular for conditionally positive definite kernels. Columns that are dependent
//! on the domain (for example all points on a plane) are dropped with a rank revealing
//! QR.

use faer::{Mat, MatRef, Side, linalg::solvers::{Llt, PartialPivLu, Solve}};
use log::warn;
use scatterfit_kernels::{RbfKernel, select_mat_rows, symmetric_kernel_matrix};

/// Relative threshold below which a pivot of the trend QR is treated as zero.
const TREND_RANK_TOLERANCE: f64 = 1e-10;

pub(crate) enum DomainSolver {
    Llt(Llt<f64>),
    Lu(PartialPivLu<f64>),
}

impl DomainSolver {
    /// Cholesky for symmetric positive definite systems, partial pivot LU otherwise.
    fn new(lhs: Mat<f64>, try_cholesky: bool) -> Self {
        if try_cholesky {
            if let Ok(llt) = lhs.llt(Side::Lower) {
                return DomainSolver::Llt(llt);
            }
            warn!(
                "local system of size {} is not positive definite, falling back to LU",
                lhs.nrows()
            );
        }
        DomainSolver::Lu(lhs.partial_piv_lu())
    }

    fn solve(&self, rhs: &Mat<f64>) -> Mat<f64> {
        match self {
            DomainSolver::Llt(s) => s.solve(rhs),
            DomainSolver::Lu(s) => s.solve(rhs),
        }
    }
}

impl std::fmt::Debug for DomainSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DomainSolver::Llt(_) => f.write_str("Llt"),
            DomainSolver::Lu(_) => f.write_str("Lu"),
        }
    }
}

/// Result of a local solve.
#[derive(Debug)]
pub struct LocalSolution {
    /// Weights of every domain point, in the order of [`Domain::point_indices`].
    pub weights: Mat<f64>,

    /// Trend coefficients in the global trend basis, `M x nrhs`. Only present for
    /// domains factorised with `solve_for_trend`.
    pub trend: Option<Mat<f64>>,
}

/// A single domain of the decomposition.
#[derive(Debug, Default)]
pub struct Domain {
    /// Global indices of all points in the domain, internal points first.
    pub point_indices: Vec<usize>,

    /// `true` for internal points, `false` for points borrowed from neighbouring domains.
    pub internal_mask: Vec<bool>,

    /// Bounding box of the internal points `[min_0, .., min_d, max_0, .., max_d]`.
    pub extents: Vec<f64>,

    solve_for_trend: bool,
    solver: Option<DomainSolver>,

    /// Global design matrix columns kept in the local system.
    trend_columns: Vec<usize>,

    /// Norms the kept columns were divided by.
    trend_scales: Vec<f64>,

    /// Total number of trend terms of the global system.
    num_trend_terms: usize,
}

impl Domain {
    /// A domain whose points are all internal.
    pub fn new(point_indices: Vec<usize>) -> Self {
        let internal_mask = vec![true; point_indices.len()];
        Self {
            point_indices,
            internal_mask,
            ..Default::default()
        }
    }

    pub fn num_points(&self) -> usize {
        self.point_indices.len()
    }

    pub fn solve_for_trend(&self) -> bool {
        self.solve_for_trend
    }

    /// Global indices of the internal points.
    pub fn internal_indices(&self) -> Vec<usize> {
        self.point_indices
            .iter()
            .zip(&self.internal_mask)
            .filter_map(|(&index, &internal)| internal.then_some(index))
            .collect()
    }

    /// Appends overlapping points borrowed from neighbours.
    pub(crate) fn add_overlap(&mut self, indices: &[usize]) {
        self.point_indices.extend_from_slice(indices);
        self.internal_mask.extend(std::iter::repeat_n(false, indices.len()));
    }

    /// Assembles and factorises the local system.
    ///
    /// # Arguments
    /// * `points` - Global point set.
    /// * `kernel` - Kernel of the global system, nugget included.
    /// * `design` - Global trend design matrix `N x M`, possibly with no columns.
    /// * `solve_for_trend` - Whether [`Domain::solve`] reports trend coefficients.
    pub fn factorise<K: RbfKernel>(
        &mut self,
        points: &Mat<f64>,
        kernel: &K,
        design: &Mat<f64>,
        solve_for_trend: bool,
    ) {
        let n = self.num_points();
        let local_points = select_mat_rows(points, &self.point_indices);
        let a = symmetric_kernel_matrix(&local_points, kernel);

        self.solve_for_trend = solve_for_trend;
        self.num_trend_terms = design.ncols();
        self.trend_columns.clear();
        self.trend_scales.clear();

        if n == 0 {
            self.solver = None;
            return;
        }
        if design.ncols() == 0 {
            self.solver = Some(DomainSolver::new(a, true));
            return;
        }

        let local_design = select_mat_rows(design, &self.point_indices);
        self.select_trend_columns(&local_design);

        let k = self.trend_columns.len();
        let p = Mat::from_fn(n, k, |i, j| {
            local_design[(i, self.trend_columns[j])] / self.trend_scales[j]
        });

        let lhs = Mat::from_fn(n + k, n + k, |i, j| match (i < n, j < n) {
            (true, true) => a[(i, j)],
            (true, false) => p[(i, j - n)],
            (false, true) => p[(j, i - n)],
            (false, false) => 0.0,
        });

        self.solver = Some(DomainSolver::new(lhs, false));
    }

    /// Chooses linearly independent design columns on this domain with a column
    /// pivoted QR, and records their norms.
    fn select_trend_columns(&mut self, local_design: &Mat<f64>) {
        if local_design.nrows() == 0 {
            return;
        }

        let qr = local_design.col_piv_qr();
        let r = qr.thin_R();
        let (forward, _) = qr.P().arrays();

        let leading = r[(0, 0)].abs();
        let rank = (0..r.nrows().min(r.ncols()))
            .take_while(|&i| leading > 0.0 && r[(i, i)].abs() > TREND_RANK_TOLERANCE * leading)
            .count();

        let mut columns: Vec<usize> = forward[..rank].to_vec();
        columns.sort_unstable();

        if rank < local_design.ncols() {
            warn!(
                "domain of {} points only supports {rank} of {} trend terms",
                local_design.nrows(),
                local_design.ncols()
            );
        }

        self.trend_scales = columns
            .iter()
            .map(|&col| local_design.col(col).norm_l2())
            .collect();
        self.trend_columns = columns;
    }

    /// Solves the local system for the global `residual` gathered at the domain points.
    ///
    /// # Panics
    /// If the domain has not been factorised.
    pub fn solve(&self, residual: MatRef<f64>) -> LocalSolution {
        let n = self.num_points();
        let k = self.trend_columns.len();
        let nrhs = residual.ncols();

        if n == 0 {
            return LocalSolution {
                weights: Mat::zeros(0, nrhs),
                trend: self
                    .solve_for_trend
                    .then(|| Mat::zeros(self.num_trend_terms, nrhs)),
            };
        }

        let solver = self.solver.as_ref().expect("domain solved before factorisation");

        let rhs = Mat::from_fn(n + k, nrhs, |i, col| match i < n {
            true => residual[(self.point_indices[i], col)],
            false => 0.0,
        });

        let x = solver.solve(&rhs);
        let weights = x.subrows(0, n).to_owned();

        let trend = self.solve_for_trend.then(|| {
            let mut coefficients = Mat::<f64>::zeros(self.num_trend_terms, nrhs);
            let columns = self.trend_columns.iter().zip(&self.trend_scales);
            for (j, (&column, &scale)) in columns.enumerate() {
                for col in 0..nrhs {
                    coefficients[(column, col)] = x[(n + j, col)] / scale;
                }
            }
            coefficients
        });

        LocalSolution { weights, trend }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{generate_random_points, polynomials::OrthonormalBasis};
    use scatterfit_kernels::kernels::{CovExponential, LinearVariogram};

    #[test]
    fn covariance_domain_uses_cholesky_and_solves_exactly() {
        let points = generate_random_points(50, 3, Some(31));
        let kernel = CovExponential::new(1.0, 0.5).with_nugget(0.01);
        let indices: Vec<usize> = (10..40).collect();

        let mut domain = Domain::new(indices.clone());
        domain.factorise(&points, &kernel, &Mat::zeros(50, 0), false);
        assert!(matches!(domain.solver, Some(DomainSolver::Llt(_))));

        let residual = generate_random_points(50, 1, Some(32));
        let solution = domain.solve(residual.as_ref());
        assert!(solution.trend.is_none());

        let local_points = select_mat_rows(&points, &indices);
        let reproduced = symmetric_kernel_matrix(&local_points, &kernel) * &solution.weights;
        for (i, &g) in indices.iter().enumerate() {
            assert!((reproduced[(i, 0)] - residual[(g, 0)]).abs() < 1e-9);
        }
    }

    #[test]
    fn trend_domain_reproduces_residual_and_constraints() {
        let points = generate_random_points(40, 2, Some(33));
        let kernel = LinearVariogram::new(1.0);
        let basis = OrthonormalBasis::new(2, 1, &points).unwrap();
        let design = basis.evaluate_points(&points);

        let mut domain = Domain::new((0..40).collect());
        domain.factorise(&points, &kernel, &design, true);

        let residual = generate_random_points(40, 1, Some(34));
        let solution = domain.solve(residual.as_ref());
        let trend = solution.trend.unwrap();
        assert_eq!(trend.nrows(), 3);

        let reproduced =
            symmetric_kernel_matrix(&points, &kernel) * &solution.weights + &design * &trend;
        assert!((&reproduced - &residual).norm_max() < 1e-8);

        let moments = design.transpose() * &solution.weights;
        assert!(moments.norm_max() < 1e-8);
    }

    #[test]
    fn dependent_trend_columns_are_dropped() {
        // every point on the line y = x
        let points = Mat::from_fn(20, 2, |i, _| i as f64 / 19.0);
        let design = Mat::from_fn(20, 3, |i, j| match j {
            0 => 1.0,
            _ => i as f64 / 19.0,
        });

        let mut domain = Domain::new((0..20).collect());
        domain.factorise(&points, &LinearVariogram::new(1.0), &design, true);
        assert_eq!(domain.trend_columns.len(), 2);

        let residual = Mat::from_fn(20, 1, |i, _| (i as f64).sin());
        let trend = domain.solve(residual.as_ref()).trend.unwrap();
        assert_eq!(trend.nrows(), 3);
        assert!(trend.col(0).iter().all(|v| v.is_finite()));
    }

    #[test]
    fn overlap_points_are_not_internal() {
        let mut domain = Domain::new(vec![4, 2, 9]);
        domain.add_overlap(&[1, 7]);
        assert_eq!(domain.point_indices, vec![4, 2, 9, 1, 7]);
        assert_eq!(domain.internal_indices(), vec![4, 2, 9]);
    }
}
