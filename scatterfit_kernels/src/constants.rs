/////////////////////////////////////////////////////////////////////////////////////////////
//
// Defines the calibrated constants of the spheroidal covariance profile.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

/// Tunable parameters that define a spheroidal covariance profile.
///
/// The profile is linear up to the inflexion point and decays as an inverse power
/// of `1 + (s r)^2` beyond it. The constants make the two pieces meet with matching
/// value and slope at the inflexion point.
#[derive(Clone, Debug, Copy)]
pub struct SpheroidalConstants {
    pub inflexion_point: f64,
    pub linear_slope: f64,
    pub range_scaling: f64,
    pub inv_y_intercept: f64,
}

/// Calibrated constants for the order-3 spheroidal profile.
pub const SPHEROIDAL_CONSTANTS_THREE: SpheroidalConstants = SpheroidalConstants {
    inflexion_point: 0.5000000000,
    linear_slope: 0.7500000000,
    range_scaling: 2.6798340586,
    inv_y_intercept: 0.8734640537,
};

/// Exponent of `1 + (s r)^2` in the far piece of the order-3 profile is `-(POW + 1/2)`.
pub const SPHEROIDAL_THREE_POW: i32 = 1;
