/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements the power law variogram kernels: linear and cubic.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::traits::{KernelKind, RbfKernel, radial_gradient};
use serde::{Deserialize, Serialize};

/// Linear variogram `γ(r) = slope * r`.
///
/// The signed kernel `-r` is conditionally positive definite of order 1, so a
/// trend of degree 0 or higher is required.
#[derive(Clone, Debug, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearVariogram {
    pub slope: f64,
    #[serde(default)]
    pub nugget: f64,
}

impl LinearVariogram {
    pub fn new(slope: f64) -> Self {
        Self { slope, nugget: 0.0 }
    }

    pub fn with_nugget(mut self, nugget: f64) -> Self {
        self.nugget = nugget;
        self
    }
}

impl RbfKernel for LinearVariogram {
    #[inline(always)]
    fn evaluate(&self, r: f64) -> f64 {
        self.slope * r
    }

    #[inline(always)]
    fn evaluate_gradient(&self, x: f64, y: f64, z: f64, r: f64) -> [f64; 3] {
        radial_gradient(self.slope, x, y, z, r)
    }

    fn parameters(&self) -> Vec<f64> {
        vec![self.slope]
    }

    #[inline(always)]
    fn nugget(&self) -> f64 {
        self.nugget
    }

    #[inline(always)]
    fn kind(&self) -> KernelKind {
        KernelKind::Variogram
    }

    fn cpd_order(&self) -> i32 {
        1
    }

    fn name(&self) -> &'static str {
        "linear_variogram"
    }
}

/// Cubic variogram `γ(r) = slope * r^3`. Requires a linear trend or higher.
#[derive(Clone, Debug, Copy, PartialEq, Serialize, Deserialize)]
pub struct CubicVariogram {
    pub slope: f64,
    #[serde(default)]
    pub nugget: f64,
}

impl CubicVariogram {
    pub fn new(slope: f64) -> Self {
        Self { slope, nugget: 0.0 }
    }

    pub fn with_nugget(mut self, nugget: f64) -> Self {
        self.nugget = nugget;
        self
    }
}

impl RbfKernel for CubicVariogram {
    #[inline(always)]
    fn evaluate(&self, r: f64) -> f64 {
        self.slope * r * r * r
    }

    #[inline(always)]
    fn evaluate_gradient(&self, x: f64, y: f64, z: f64, r: f64) -> [f64; 3] {
        let c = 3.0 * self.slope * r;
        [c * x, c * y, c * z]
    }

    fn parameters(&self) -> Vec<f64> {
        vec![self.slope]
    }

    #[inline(always)]
    fn nugget(&self) -> f64 {
        self.nugget
    }

    #[inline(always)]
    fn kind(&self) -> KernelKind {
        KernelKind::Variogram
    }

    fn cpd_order(&self) -> i32 {
        2
    }

    fn name(&self) -> &'static str {
        "cubic_variogram"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_value_is_negated_variogram() {
        let k = LinearVariogram::new(1.0);
        assert_eq!(k.evaluate(0.2), 0.2);
        assert_eq!(k.system_value(0.2), -0.2);

        let k = CubicVariogram::new(2.0);
        assert!((k.system_value(0.5) + 0.25).abs() < 1e-15);
    }

    #[test]
    fn gradients_point_along_offset() {
        let (x, y, z) = (0.3, -0.4, 0.0);
        let r = 0.5;

        let g = LinearVariogram::new(2.0).evaluate_gradient(x, y, z, r);
        assert!((g[0] - 1.2).abs() < 1e-15);
        assert!((g[1] + 1.6).abs() < 1e-15);
        assert_eq!(g[2], 0.0);

        let g = CubicVariogram::new(1.0).evaluate_gradient(x, y, z, r);
        // 3 r^2 * (x / r) = 3 r x
        assert!((g[0] - 0.45).abs() < 1e-15);
    }

    #[test]
    fn cpd_orders() {
        assert_eq!(LinearVariogram::new(1.0).cpd_order(), 1);
        assert_eq!(CubicVariogram::new(1.0).cpd_order(), 2);
        assert_eq!(LinearVariogram::new(1.0).kind(), KernelKind::Variogram);
    }
}
