/////////////////////////////////////////////////////////////////////////////////////////////
//
// Declares the radial kernel capability shared by the operator, evaluators and preconditioner.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Whether a kernel describes a covariance or a variogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelKind {
    /// Value decreases with distance, `C(0)` is the sill.
    Covariance,

    /// Value increases with distance from `γ(0) = 0`.
    Variogram,
}

/// A radial model usable as an interpolation kernel.
///
/// Implementors provide the raw model value. The interpolation system never uses the
/// raw value directly: it uses [`RbfKernel::system_value`], which is `+C(r)` for a
/// covariance and `-γ(r)` for a variogram, plus [`RbfKernel::nugget`] on the diagonal.
pub trait RbfKernel: Debug + Send + Sync {
    /// Raw model value at distance `r`: `C(r)` or `γ(r)`.
    fn evaluate(&self, r: f64) -> f64;

    /// Gradient of the raw model value with respect to the offset `(x, y, z)`, where
    /// `r` is the length of the offset. Zero at `r = 0`.
    fn evaluate_gradient(&self, x: f64, y: f64, z: f64, r: f64) -> [f64; 3];

    /// Model parameters in declaration order.
    fn parameters(&self) -> Vec<f64>;

    /// Diagonal regularisation added to the kernel block.
    fn nugget(&self) -> f64;

    fn kind(&self) -> KernelKind;

    /// Order of conditional positive definiteness of the signed kernel. Zero for
    /// positive definite kernels.
    fn cpd_order(&self) -> i32;

    /// Short name used in log output.
    fn name(&self) -> &'static str;

    /// Value of the kernel as it enters the interpolation matrix.
    #[inline(always)]
    fn system_value(&self, r: f64) -> f64 {
        match self.kind() {
            KernelKind::Covariance => self.evaluate(r),
            KernelKind::Variogram => -self.evaluate(r),
        }
    }
}

impl<K: RbfKernel + ?Sized> RbfKernel for &K {
    #[inline(always)]
    fn evaluate(&self, r: f64) -> f64 {
        (**self).evaluate(r)
    }

    #[inline(always)]
    fn evaluate_gradient(&self, x: f64, y: f64, z: f64, r: f64) -> [f64; 3] {
        (**self).evaluate_gradient(x, y, z, r)
    }

    fn parameters(&self) -> Vec<f64> {
        (**self).parameters()
    }

    #[inline(always)]
    fn nugget(&self) -> f64 {
        (**self).nugget()
    }

    #[inline(always)]
    fn kind(&self) -> KernelKind {
        (**self).kind()
    }

    fn cpd_order(&self) -> i32 {
        (**self).cpd_order()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Scales the radial derivative `d/dr` into a gradient along the offset.
#[inline(always)]
pub(crate) fn radial_gradient(d_dr: f64, x: f64, y: f64, z: f64, r: f64) -> [f64; 3] {
    match r > 0.0 {
        true => {
            let c = d_dr / r;
            [c * x, c * y, c * z]
        }
        false => [0.0; 3],
    }
}
