/////////////////////////////////////////////////////////////////////////////////////////////
//
// Re-exports kernels, constants and helper functions used across the scatterfit crates.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Kernels and dense utilities for the `scatterfit` crate
//!
//! Kernels implement [`RbfKernel`]. Covariances enter the interpolation system with
//! their value `C(r)`, variograms with `-γ(r)`; see [`RbfKernel::system_value`].
mod constants;
mod covariance;
mod kernel_model;
mod traits;
mod utils;
mod variogram;

/// Implemented kernels.
pub mod kernels {
    pub use super::covariance::*;
    pub use super::variogram::*;
}

pub use {
    constants::{SPHEROIDAL_CONSTANTS_THREE, SpheroidalConstants},
    kernel_model::{FmmKernel, KernelModel},
    traits::{KernelKind, RbfKernel},
    utils::{
        argmax, argmin, get_distance, get_distance_sq, get_pointarray_extents,
        kernel_matrix, select_mat_rows, symmetric_kernel_matrix,
    },
};
