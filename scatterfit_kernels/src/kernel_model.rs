/////////////////////////////////////////////////////////////////////////////////////////////
//
// Provides a runtime selectable kernel model and the adapter onto the FMM kernel trait.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::{
    traits::{KernelKind, RbfKernel},
    utils::get_distance,
};
use faer::RowRef;
use scatterfit_fmm::KernelFunction;
use serde::{Deserialize, Serialize};

/// Presents an [`RbfKernel`] to the FMM as a point-pair kernel.
///
/// Evaluates the signed system value. The nugget is not included: it only applies
/// on the diagonal and is added by the caller.
#[derive(Debug, Clone, Copy)]
pub struct FmmKernel<K: RbfKernel>(pub K);

impl<K: RbfKernel> KernelFunction for FmmKernel<K> {
    #[inline(always)]
    fn evaluate(&self, target: RowRef<f64>, source: RowRef<f64>) -> f64 {
        self.0.system_value(get_distance(target, source))
    }
}

// Dispatcher generated from the kernel registry below.
macro_rules! for_each_kernel {
    ( registry = [ $( ($V:ident, $Kty:path) ),* $(,)? ] ) => {

        /// Runtime kernel selector built from the kernel registry, for callers that
        /// read the kernel from configuration and don't want to be generic over it.
        #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "model", rename_all = "snake_case")]
        pub enum KernelModel {
            $( $V($Kty), )*
        }

        $(
            impl From<$Kty> for KernelModel {
                fn from(kernel: $Kty) -> Self {
                    KernelModel::$V(kernel)
                }
            }
        )*

        impl RbfKernel for KernelModel {
            #[inline(always)]
            fn evaluate(&self, r: f64) -> f64 {
                match self {
                    $( Self::$V(k) => k.evaluate(r), )*
                }
            }

            #[inline(always)]
            fn evaluate_gradient(&self, x: f64, y: f64, z: f64, r: f64) -> [f64; 3] {
                match self {
                    $( Self::$V(k) => k.evaluate_gradient(x, y, z, r), )*
                }
            }

            fn parameters(&self) -> Vec<f64> {
                match self {
                    $( Self::$V(k) => k.parameters(), )*
                }
            }

            #[inline(always)]
            fn nugget(&self) -> f64 {
                match self {
                    $( Self::$V(k) => k.nugget(), )*
                }
            }

            #[inline(always)]
            fn kind(&self) -> KernelKind {
                match self {
                    $( Self::$V(k) => k.kind(), )*
                }
            }

            fn cpd_order(&self) -> i32 {
                match self {
                    $( Self::$V(k) => k.cpd_order(), )*
                }
            }

            fn name(&self) -> &'static str {
                match self {
                    $( Self::$V(k) => k.name(), )*
                }
            }
        }
    };
}

for_each_kernel! {
    registry = [
        (CovExponential,  crate::kernels::CovExponential),
        (CovGaussian,     crate::kernels::CovGaussian),
        (CovSpheroidal,   crate::kernels::CovSpheroidal),
        (LinearVariogram, crate::kernels::LinearVariogram),
        (CubicVariogram,  crate::kernels::CubicVariogram),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::{CovExponential, LinearVariogram};
    use faer::mat;

    #[test]
    fn model_dispatches_to_inner_kernel() {
        let inner = LinearVariogram::new(0.5).with_nugget(0.1);
        let model = KernelModel::from(inner);

        assert_eq!(model.evaluate(2.0), 1.0);
        assert_eq!(model.system_value(2.0), -1.0);
        assert_eq!(model.nugget(), 0.1);
        assert_eq!(model.cpd_order(), 1);
        assert_eq!(model.name(), "linear_variogram");
    }

    #[test]
    fn fmm_kernel_uses_signed_value_without_nugget() {
        let points = mat![[0.0, 0.0, 0.0], [3.0, 4.0, 0.0f64]];

        let variogram = FmmKernel(LinearVariogram::new(1.0).with_nugget(9.0));
        assert_eq!(variogram.evaluate(points.row(0), points.row(1)), -5.0);
        assert_eq!(variogram.evaluate(points.row(0), points.row(0)), 0.0);

        let covariance = FmmKernel(CovExponential::new(1.0, 1.0).with_nugget(9.0));
        assert_eq!(covariance.evaluate(points.row(1), points.row(1)), 1.0);
    }
}
