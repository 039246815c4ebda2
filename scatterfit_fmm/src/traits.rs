/////////////////////////////////////////////////////////////////////////////////////////////
//
// Declares the kernel evaluation trait used by the FMM tree for black-box kernels.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use faer::RowRef;

/// Evaluates a kernel function between a target and source point.
///
/// Both arguments are rows of length 3. The kernel must be smooth away from the
/// origin for the far field approximation to converge.
pub trait KernelFunction {
    fn evaluate(&self, target: RowRef<f64>, source: RowRef<f64>) -> f64;
}

impl<K: KernelFunction + ?Sized> KernelFunction for &K {
    #[inline(always)]
    fn evaluate(&self, target: RowRef<f64>, source: RowRef<f64>) -> f64 {
        (**self).evaluate(target, source)
    }
}
