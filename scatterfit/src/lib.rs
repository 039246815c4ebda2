/////////////////////////////////////////////////////////////////////////////////////////////
//
// Exposes the public API and high-level documentation for iterative RBF interpolation.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Iterative global Radial Basis Function (RBF) interpolation.
//!
//! Fitting an RBF interpolant means solving the saddle point system
//!
//! ```text
//! | K + nugget I   P | | w |   | values |
//! | P^T            0 | | c | = | 0      |
//! ```
//!
//! where `K` is the kernel matrix of the sample points and `P` a low degree polynomial
//! trend evaluated at them. Direct solvers need **O(N²)** memory and **O(N³)**
//! operations. This crate solves the system iteratively instead:
//!
//! - **FGMRES**, a GMRES variant that tolerates a preconditioner that is not a fixed
//!   linear operator.
//! - **Domain decomposition** following `1` and `2`, used as a multilevel restricted
//!   additive Schwarz right preconditioner.
//! - **The black box FMM** from [`scatterfit_fmm`] for the kernel sums of large 3D
//!   point sets, with direct summation for small ones.
//!
//! Convergence is judged on the true misfit at the sample points, measured by a
//! separate, more accurate evaluator, not on the Krylov residual.
//!
//! # Examples
//!
//! ```
//! use scatterfit::{InterpolantSolver, SolveStatus, SolverParams, generate_random_points};
//! use scatterfit_kernels::kernels::CovExponential;
//!
//! let points = generate_random_points(500, 3, Some(42));
//! let values = faer::Mat::from_fn(500, 1, |i, _| {
//!     points[(i, 0)] * points[(i, 1)] + points[(i, 2)].cos()
//! });
//!
//! let kernel = CovExponential::new(1.0, 0.5).with_nugget(1e-6);
//! let solver = InterpolantSolver::new(kernel, 3, 0, &points, SolverParams::default()).unwrap();
//!
//! let report = solver.solve(&values, 1e-6).unwrap();
//! assert_eq!(report.status, SolveStatus::Converged);
//!
//! let fitted = solver.evaluate(report.solution.as_ref(), &points).unwrap();
//! let weights = report.weights();
//! let max_diff = (0..500)
//!     .map(|i| (fitted[(i, 0)] + 1e-6 * weights[(i, 0)] - values[(i, 0)]).abs())
//!     .fold(0.0, f64::max);
//! assert!(max_diff <= 1e-6 * 1.01);
//! ```
//!
//! # References
//! 1.  R. K. Beatson, W. A. Light, and S. Billings. Fast solution of the radial basis
//!     function interpolation equations: domain decomposition methods. SIAM J. Sci.
//!     Comput., 22(5):1717–1740 (electronic), 2000.
//! 2.  Haase, G., Martin, D., Schiffmann, P., Offner, G. (2018). A Domain Decomposition
//!     Multilevel Preconditioner for Interpolation with Radial Basis Functions.
//!     In: Lirkov, I., Margenov, S. (eds) Large-Scale Scientific Computing. LSSC 2017.
//! 3.  Y. Saad. A flexible inner-outer preconditioned GMRES algorithm. SIAM J. Sci.
//!     Comput., 14(2):461–469, 1993.

pub mod config;

mod common;

pub mod direct_evaluator;

mod error;

pub mod iterative_solvers;

pub mod kdtree;

pub mod polynomials;

pub mod preconditioning;

pub mod progress;

pub mod rbf_operator;

pub mod rbf_solver;

pub mod residual_evaluator;

pub mod zip_sort;

pub use {
    common::{
        farthest_point_sampling, generate_random_points, generate_spherical_points,
        get_cheb_cube_scaling_factors, scale_points,
    },
    config::{DDMParams, FmmParams, SolverParams, SolverParamsBuilder},
    direct_evaluator::DirectEvaluator,
    error::SolverError,
    iterative_solvers::{Fgmres, FgmresState, LinearOperator},
    kdtree::{KdTree, SpatialIndex},
    polynomials::{OrthonormalBasis, basis_size},
    preconditioning::RasPreconditioner,
    progress::{ClosureSink, ProgressMsg, ProgressSink, closure_sink},
    rbf_operator::RbfOperator,
    rbf_solver::{InterpolantSolver, SolveReport, SolveStatus},
    residual_evaluator::ResidualEvaluator,
};
