/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements an overlapping Schwarz preconditioner built on the domain decomposition hierarchy.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # schwarz
//!
//! Overlapping Schwarz preconditioner for the augmented RBF system.
//!
//! Within a level the corrections are combined with Restricted Additive Schwarz: every
//! domain solves on all of its points but only writes back the weights of its internal
//! points. Levels are combined multiplicatively, with the coarse domain used as a
//! smoother after every fine level, as described in Section 4 of [1].
//!
//! # References
//! 1.  R. K. Beatson, W. A. Light, and S. Billings. Fast solution of the radial basis
//!     function interpolation equations: domain decomposition methods. SIAM J. Sci.
//!     Comput., 22(5):1717–1740 (electronic), 2000.
//! 2.  Haase, G., Martin, D., Schiffmann, P., Offner, G. (2018). A Domain Decomposition
//!     Multilevel Preconditioner for Interpolation with Radial Basis Functions.
//!     In: Lirkov, I., Margenov, S. (eds) Large-Scale Scientific Computing. LSSC 2017.

use super::domain_decomposition::DDMTree;
use crate::{config::DDMParams, polynomials::orthogonalise};
use faer::{Mat, MatRef};
use rayon::prelude::*;
use scatterfit_kernels::RbfKernel;

/// Approximate inverse of the augmented system, applied as a right preconditioner.
///
/// Built once per point set. Applying it requires partial products of the system
/// operator, supplied by the caller as `matvec_partial(w, targets)`, which must
/// return the operator applied to `w` with the top block evaluated only at `targets`.
#[derive(Debug)]
pub struct RasPreconditioner {
    ddm: DDMTree,
    design: Mat<f64>,
}

impl RasPreconditioner {
    /// Decomposes `points` and factorises every domain.
    pub fn new<K: RbfKernel>(
        points: &Mat<f64>,
        kernel: &K,
        design: &Mat<f64>,
        params: &DDMParams,
    ) -> Self {
        Self {
            ddm: DDMTree::new(points, kernel, design, params),
            design: design.clone(),
        }
    }

    pub fn ddm_tree(&self) -> &DDMTree {
        &self.ddm
    }

    /// Computes `z ~ A^-1 v`. `v` is not modified and a zero `v` gives a zero `z`.
    pub fn apply<F>(&self, v: MatRef<f64>, matvec_partial: F) -> Mat<f64>
    where
        F: Fn(MatRef<f64>, &[usize]) -> Mat<f64>,
    {
        let mut z = Mat::<f64>::zeros(v.nrows(), v.ncols());

        let coarse_idx = self.ddm.levels.len() - 1;
        let coarse_points = &self.ddm.levels[coarse_idx].point_indices;

        if coarse_idx == 0 {
            let residual = v - matvec_partial(z.as_ref(), coarse_points);
            z += self.solve_coarse_level(residual.as_ref(), true);
            return z;
        }

        for level in 0..coarse_idx {
            let level_points = &self.ddm.levels[level].point_indices;

            let residual = v - matvec_partial(z.as_ref(), level_points);
            z += self.solve_fine_level(residual.as_ref(), level);

            // Only the last smoothing pass contributes trend coefficients.
            let residual = v - matvec_partial(z.as_ref(), coarse_points);
            z += self.solve_coarse_level(residual.as_ref(), level == coarse_idx - 1);
        }

        z
    }

    fn solve_fine_level(&self, residual: MatRef<f64>, level: usize) -> Mat<f64> {
        let mut correction = Mat::<f64>::zeros(residual.nrows(), residual.ncols());

        let solutions: Vec<_> = self.ddm.levels[level]
            .domains
            .par_iter()
            .map(|domain| (domain, domain.solve(residual)))
            .collect();

        for (domain, solution) in solutions {
            for (local, &global) in domain.point_indices.iter().enumerate() {
                if domain.internal_mask[local] {
                    for col in 0..residual.ncols() {
                        correction[(global, col)] = solution.weights[(local, col)];
                    }
                }
            }
        }

        let num_trend = self.design.ncols();
        if num_trend != 0 {
            let num_points = self.design.nrows();
            orthogonalise(correction.subrows_mut(0, num_points), self.design.as_ref());
        }

        correction
    }

    fn solve_coarse_level(&self, residual: MatRef<f64>, add_trend: bool) -> Mat<f64> {
        let mut correction = Mat::<f64>::zeros(residual.nrows(), residual.ncols());
        let coarse = self.ddm.coarse_domain();

        let solution = coarse.solve(residual);
        for (local, &global) in coarse.point_indices.iter().enumerate() {
            correction.row_mut(global).copy_from(solution.weights.row(local));
        }

        if let (true, Some(trend)) = (add_trend, solution.trend.as_ref()) {
            let num_points = self.design.nrows();
            correction
                .subrows_mut(num_points, trend.nrows())
                .copy_from(trend);
        }

        correction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::FmmParams, generate_random_points, rbf_operator::RbfOperator};
    use scatterfit_kernels::kernels::{CovExponential, LinearVariogram};

    fn preconditioner_for<K: RbfKernel + Clone>(
        op: &RbfOperator<K>,
        params: &DDMParams,
    ) -> RasPreconditioner {
        RasPreconditioner::new(op.points(), op.kernel(), op.design_matrix(), params)
    }

    #[test]
    fn zero_vector_maps_to_zero() {
        let points = generate_random_points(200, 3, Some(41));
        let op =
            RbfOperator::new(LinearVariogram::new(1.0), 3, 1, &points, &FmmParams::default(), 4096)
                .unwrap();
        let params = DDMParams {
            leaf_threshold: 32,
            overlap_quota: 0.5,
            coarse_ratio: 0.25,
            coarse_threshold: 40,
        };
        let precon = preconditioner_for(&op, &params);
        assert!(precon.ddm_tree().num_levels() > 1);

        let v = Mat::<f64>::zeros(204, 1);
        let z = precon.apply(v.as_ref(), |w, targets| op.apply_partial(w, targets));
        assert_eq!(z.norm_max(), 0.0);
    }

    #[test]
    fn single_coarse_domain_is_an_exact_inverse() {
        let points = generate_random_points(60, 2, Some(42));
        let op =
            RbfOperator::new(LinearVariogram::new(1.0), 2, 1, &points, &FmmParams::default(), 4096)
                .unwrap();
        let precon = preconditioner_for(&op, &DDMParams::default());
        assert_eq!(precon.ddm_tree().num_levels(), 1);

        let mut v = Mat::<f64>::zeros(63, 1);
        v.subrows_mut(0, 60).copy_from(generate_random_points(60, 1, Some(43)));

        let z = precon.apply(v.as_ref(), |w, targets| op.apply_partial(w, targets));
        let back = op.apply(z.as_ref());
        assert!((&back - &v).norm_max() < 1e-8);
    }

    #[test]
    fn multilevel_application_reduces_the_residual() {
        let points = generate_random_points(400, 3, Some(44));
        let kernel = CovExponential::new(1.0, 0.3).with_nugget(1e-4);
        let op = RbfOperator::new(kernel, 3, -1, &points, &FmmParams::default(), 4096).unwrap();
        let params = DDMParams {
            leaf_threshold: 64,
            overlap_quota: 0.5,
            coarse_ratio: 0.25,
            coarse_threshold: 64,
        };
        let precon = preconditioner_for(&op, &params);

        let v = generate_random_points(400, 1, Some(45));
        let v_copy = v.clone();
        let z = precon.apply(v.as_ref(), |w, targets| op.apply_partial(w, targets));
        assert_eq!(v, v_copy);

        let residual = &v - op.apply(z.as_ref());
        assert!(residual.norm_l2() < v.norm_l2());
    }
}
