/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements the covariance kernels: exponential, gaussian and spheroidal.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::{
    constants::{SPHEROIDAL_CONSTANTS_THREE, SPHEROIDAL_THREE_POW},
    traits::{KernelKind, RbfKernel, radial_gradient},
};
use serde::{Deserialize, Serialize};

/// Exponential covariance `C(r) = psill * exp(-r / range)`.
#[derive(Clone, Debug, Copy, PartialEq, Serialize, Deserialize)]
pub struct CovExponential {
    pub psill: f64,
    pub range: f64,
    #[serde(default)]
    pub nugget: f64,
}

impl CovExponential {
    pub fn new(psill: f64, range: f64) -> Self {
        Self {
            psill,
            range,
            nugget: 0.0,
        }
    }

    pub fn with_nugget(mut self, nugget: f64) -> Self {
        self.nugget = nugget;
        self
    }
}

impl RbfKernel for CovExponential {
    #[inline(always)]
    fn evaluate(&self, r: f64) -> f64 {
        self.psill * (-r / self.range).exp()
    }

    #[inline(always)]
    fn evaluate_gradient(&self, x: f64, y: f64, z: f64, r: f64) -> [f64; 3] {
        let d_dr = -self.psill * (-r / self.range).exp() / self.range;
        radial_gradient(d_dr, x, y, z, r)
    }

    fn parameters(&self) -> Vec<f64> {
        vec![self.psill, self.range]
    }

    #[inline(always)]
    fn nugget(&self) -> f64 {
        self.nugget
    }

    #[inline(always)]
    fn kind(&self) -> KernelKind {
        KernelKind::Covariance
    }

    fn cpd_order(&self) -> i32 {
        0
    }

    fn name(&self) -> &'static str {
        "cov_exponential"
    }
}

/// Gaussian covariance `C(r) = psill * exp(-(r / range)^2)`.
#[derive(Clone, Debug, Copy, PartialEq, Serialize, Deserialize)]
pub struct CovGaussian {
    pub psill: f64,
    pub range: f64,
    #[serde(default)]
    pub nugget: f64,
}

impl CovGaussian {
    pub fn new(psill: f64, range: f64) -> Self {
        Self {
            psill,
            range,
            nugget: 0.0,
        }
    }

    pub fn with_nugget(mut self, nugget: f64) -> Self {
        self.nugget = nugget;
        self
    }
}

impl RbfKernel for CovGaussian {
    #[inline(always)]
    fn evaluate(&self, r: f64) -> f64 {
        let q = r / self.range;
        self.psill * (-q * q).exp()
    }

    #[inline(always)]
    fn evaluate_gradient(&self, x: f64, y: f64, z: f64, r: f64) -> [f64; 3] {
        // d/dr = -2 r / range^2 * C(r), the 1/r of the chain rule cancels.
        let c = -2.0 * self.evaluate(r) / (self.range * self.range);
        [c * x, c * y, c * z]
    }

    fn parameters(&self) -> Vec<f64> {
        vec![self.psill, self.range]
    }

    #[inline(always)]
    fn nugget(&self) -> f64 {
        self.nugget
    }

    #[inline(always)]
    fn kind(&self) -> KernelKind {
        KernelKind::Covariance
    }

    fn cpd_order(&self) -> i32 {
        0
    }

    fn name(&self) -> &'static str {
        "cov_gaussian"
    }
}

/// Order-3 spheroidal covariance.
///
/// Linear near the origin, then a heavy inverse power tail:
///
/// - `C(r) = psill * (1 - linear_slope * s * r)` while `s r <= inflexion_point`
/// - `C(r) = psill * inv_y_intercept / (t * sqrt(t))` with `t = 1 + (s r)^2` otherwise
///
/// where `s = range_scaling / range`.
#[derive(Clone, Debug, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "SpheroidalParams", into = "SpheroidalParams")]
pub struct CovSpheroidal {
    pub psill: f64,
    pub range: f64,
    pub nugget: f64,

    // derived (computed once)
    s2: f64,
    ip2: f64,
    near_slope: f64,
    far_coef: f64,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
struct SpheroidalParams {
    psill: f64,
    range: f64,
    #[serde(default)]
    nugget: f64,
}

impl From<SpheroidalParams> for CovSpheroidal {
    fn from(p: SpheroidalParams) -> Self {
        CovSpheroidal::new(p.psill, p.range).with_nugget(p.nugget)
    }
}

impl From<CovSpheroidal> for SpheroidalParams {
    fn from(k: CovSpheroidal) -> Self {
        SpheroidalParams {
            psill: k.psill,
            range: k.range,
            nugget: k.nugget,
        }
    }
}

impl CovSpheroidal {
    pub fn new(psill: f64, range: f64) -> Self {
        let c = &SPHEROIDAL_CONSTANTS_THREE;
        let s = c.range_scaling / range;
        Self {
            psill,
            range,
            nugget: 0.0,
            s2: s * s,
            ip2: c.inflexion_point * c.inflexion_point,
            near_slope: psill * c.linear_slope * s,
            far_coef: psill * c.inv_y_intercept,
        }
    }

    pub fn with_nugget(mut self, nugget: f64) -> Self {
        self.nugget = nugget;
        self
    }
}

impl RbfKernel for CovSpheroidal {
    #[inline(always)]
    fn evaluate(&self, r: f64) -> f64 {
        let sr2 = self.s2 * r * r;
        if sr2 <= self.ip2 {
            self.psill - self.near_slope * r
        } else {
            let t = 1.0 + sr2;
            self.far_coef / (t.powi(SPHEROIDAL_THREE_POW) * t.sqrt())
        }
    }

    #[inline(always)]
    fn evaluate_gradient(&self, x: f64, y: f64, z: f64, r: f64) -> [f64; 3] {
        let sr2 = self.s2 * r * r;
        let d_dr = if sr2 <= self.ip2 {
            -self.near_slope
        } else {
            let t = 1.0 + sr2;
            let exponent = SPHEROIDAL_THREE_POW as f64 + 0.5;
            -exponent * self.far_coef * t.powf(-exponent - 1.0) * 2.0 * self.s2 * r
        };
        radial_gradient(d_dr, x, y, z, r)
    }

    fn parameters(&self) -> Vec<f64> {
        vec![self.psill, self.range]
    }

    #[inline(always)]
    fn nugget(&self) -> f64 {
        self.nugget
    }

    #[inline(always)]
    fn kind(&self) -> KernelKind {
        KernelKind::Covariance
    }

    fn cpd_order(&self) -> i32 {
        0
    }

    fn name(&self) -> &'static str {
        "cov_spheroidal"
    }
}
