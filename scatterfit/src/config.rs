/////////////////////////////////////////////////////////////////////////////////////////////
//
// Declares configuration types for domain decomposition, FMM summation and solver options.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Declares configuration types for domain decomposition, FMM summation and solver options.
use serde::{Deserialize, Serialize};

/// Parameters controlling construction of the **domain decomposition hierarchy**.
///
/// The preconditioner recursively partitions the point cloud into a hierarchy of
/// overlapping subdomains. Local systems are solved directly on each subdomain and
/// combined with restricted additive Schwarz.
///
/// Increasing subdomain overlap and coarse ratio usually reduces the iteration count,
/// at the cost of more memory and slower factorisation.
///
/// ### Default Values
/// - `leaf_threshold`: `1024`
/// - `overlap_quota`: `0.5`
/// - `coarse_ratio`: `0.125`
/// - `coarse_threshold`: `4096`
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct DDMParams {
    /// Target maximum number of points (internal + overlapping)
    /// within a leaf domain.
    pub leaf_threshold: usize,

    /// Overlap fraction. Larger fraction will add more overlapping
    /// points to each leaf domain.
    pub overlap_quota: f64,

    /// Fraction of **internal** points per leaf promoted to the next
    /// coarser level.
    pub coarse_ratio: f64,

    /// Maximum number of points in the coarsest level.
    pub coarse_threshold: usize,
}

impl Default for DDMParams {
    fn default() -> Self {
        DDMParams {
            leaf_threshold: 1024,
            overlap_quota: 0.5,
            coarse_ratio: 0.125,
            coarse_threshold: 4096,
        }
    }
}

/// Parameters of the tree-mode kernel summation.
///
/// The operator's interpolation order limits how far a single Krylov run can reduce the
/// misfit. [`crate::InterpolantSolver`] gets past that limit by restarting from the misfit
/// measured by the residual evaluator (see [`SolverParams::refresh_tolerance`]), so the
/// attainable accuracy is set by `evaluator_interpolation_order`. The remaining error is
/// reported as [`crate::SolveReport::summation_error`].
///
/// ### Default Values
/// - `interpolation_order`: `5`
/// - `evaluator_interpolation_order`: `7`
/// - `leaf_size`: `64`
/// - `max_tree_height`: `7`
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
pub struct FmmParams {
    /// Number of Chebyshev interpolation nodes per axis used by the operator.
    pub interpolation_order: usize,

    /// Interpolation order used by the residual evaluator. Kept higher than
    /// `interpolation_order` so the convergence test is not fooled by the
    /// approximation error of the operator.
    pub evaluator_interpolation_order: usize,

    /// Average number of points per leaf used to pick the tree height from a point set.
    pub leaf_size: usize,

    /// Upper bound for the automatically chosen tree height.
    pub max_tree_height: usize,
}

impl Default for FmmParams {
    fn default() -> Self {
        Self {
            interpolation_order: 5,
            evaluator_interpolation_order: 7,
            leaf_size: 64,
            max_tree_height: 7,
        }
    }
}

impl FmmParams {
    /// Smallest height whose leaves hold about `leaf_size` points on average for
    /// a point set of `num_points`, clamped to `1..=max_tree_height`.
    pub fn tree_height_for(&self, num_points: usize) -> usize {
        let leaf_size = self.leaf_size.max(1);
        let mut height = 1;
        let mut leaves = 8usize;
        while height < self.max_tree_height && num_points > leaves.saturating_mul(leaf_size) {
            height += 1;
            leaves = leaves.saturating_mul(8);
        }
        height.min(self.max_tree_height.max(1))
    }
}

/// Options of [`crate::InterpolantSolver`].
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct SolverParams {
    /// Maximum number of FGMRES iterations per solve.
    pub max_iterations: usize,

    /// Restart length of FGMRES. `None` keeps every basis vector.
    pub restart: Option<usize>,

    /// Tree mode only. Once a Krylov run has reduced its own residual by this factor,
    /// the solver recomputes the misfit with the residual evaluator and continues from
    /// there, which removes the operator's summation error from the solution.
    pub refresh_tolerance: f64,

    /// Point count at or below which kernel sums are evaluated directly
    /// instead of with the FMM.
    pub direct_threshold: usize,

    /// Parameters controlling domain decomposition preconditioning.
    pub ddm_params: DDMParams,

    /// Parameters controlling the fast multipole method (FMM).
    pub fmm_params: FmmParams,
}

impl Default for SolverParams {
    fn default() -> Self {
        SolverParams::builder().build()
    }
}

impl SolverParams {
    /// Returns a new [`SolverParamsBuilder`] populated with defaults.
    pub fn builder() -> SolverParamsBuilder {
        SolverParamsBuilder::new()
    }
}

/// A convenience builder for constructing a [`SolverParams`] instance.
///
/// See [`SolverParams`] for details on each field.
#[derive(Debug, Clone)]
pub struct SolverParamsBuilder {
    max_iterations: usize,
    restart: Option<usize>,
    refresh_tolerance: f64,
    direct_threshold: usize,
    ddm_params: DDMParams,
    fmm_params: FmmParams,
}

impl SolverParamsBuilder {
    fn new() -> Self {
        Self {
            max_iterations: 32,
            restart: None,
            refresh_tolerance: 1e-3,
            direct_threshold: 4096,
            ddm_params: DDMParams::default(),
            fmm_params: FmmParams::default(),
        }
    }

    /// Sets the maximum number of iterations.
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the FGMRES restart length.
    pub fn restart(mut self, restart: Option<usize>) -> Self {
        self.restart = restart;
        self
    }

    /// Sets the relative Krylov residual at which tree-mode solves refresh the misfit.
    pub fn refresh_tolerance(mut self, refresh_tolerance: f64) -> Self {
        self.refresh_tolerance = refresh_tolerance;
        self
    }

    /// Sets the threshold for switching to direct kernel summation.
    pub fn direct_threshold(mut self, direct_threshold: usize) -> Self {
        self.direct_threshold = direct_threshold;
        self
    }

    /// Sets the domain decomposition parameters.
    pub fn ddm_params(mut self, ddm_params: DDMParams) -> Self {
        self.ddm_params = ddm_params;
        self
    }

    /// Sets the FMM parameters.
    pub fn fmm_params(mut self, fmm_params: FmmParams) -> Self {
        self.fmm_params = fmm_params;
        self
    }

    /// Builds and returns a [`SolverParams`] instance.
    pub fn build(self) -> SolverParams {
        SolverParams {
            max_iterations: self.max_iterations,
            restart: self.restart,
            refresh_tolerance: self.refresh_tolerance,
            direct_threshold: self.direct_threshold,
            ddm_params: self.ddm_params,
            fmm_params: self.fmm_params,
        }
    }
}
