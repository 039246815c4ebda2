/////////////////////////////////////////////////////////////////////////////////////////////
//
// Evaluates the monomial and orthonormal polynomial bases used for trend terms.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::{SolverError, common};
use faer::linalg::triangular_solve::solve_upper_triangular_in_place;
use faer::{Mat, MatMut, MatRef, Par, unzip, zip};

/// Largest supported trend degree.
pub const MAX_DEGREE: i32 = 2;

/// Number of monomials of total degree at most `degree` in `dimension` variables.
///
/// Degree `-1` means no trend and gives zero.
pub fn basis_size(dimension: usize, degree: i32) -> usize {
    match degree {
        d if d < 0 => 0,
        0 => 1,
        1 => 1 + dimension,
        _ => 1 + dimension + dimension * (dimension + 1) / 2,
    }
}

pub(crate) fn validate_degree(degree: i32) -> Result<(), SolverError> {
    match (-1..=MAX_DEGREE).contains(&degree) {
        true => Ok(()),
        false => Err(SolverError::UnsupportedTrendDegree(degree)),
    }
}

/// Evaluates `[1, x_i, x_i x_j (i <= j)]` up to `degree` after mapping the points with
/// `(x - translation_factor) / scale_factor`.
pub fn evaluate_monomials(
    points: &Mat<f64>,
    degree: i32,
    basis_size: usize,
    translation_factor: &[f64],
    scale_factor: &[f64],
) -> Mat<f64> {
    // Scale the domain points to the [-1, 1]^d hypercube for monomial evaluation.
    let mut scaled_points = points.clone();

    common::scale_points(&mut scaled_points, translation_factor, scale_factor);

    let (n, d) = scaled_points.shape();
    let mut monomials = Mat::<f64>::zeros(n, basis_size);

    if basis_size == 0 {
        return monomials;
    }

    // constant column
    monomials.col_mut(0).fill(1.0);

    // linear columns
    if degree >= 1 {
        monomials
            .subcols_mut(1, d)
            .copy_from(&scaled_points.as_ref());
    }

    // quadratic columns
    if degree == 2 {
        let start = 1 + d;
        let mut k = 0usize;

        for i in 0..d {
            let xi = scaled_points.col(i);
            for j in i..d {
                let xj = scaled_points.col(j);
                let mut dst = monomials.col_mut(start + k);

                // elementwise product of points columns
                zip!(&mut dst, &xi, &xj).for_each(|unzip!(dst, xi, xj)| {
                    *dst = xi * xj;
                });

                k += 1;
            }
        }
    }

    monomials
}

/// Leading `dimension` coordinates of `points`, the ones a trend is defined on.
fn trend_coordinates(points: &Mat<f64>, dimension: usize) -> Mat<f64> {
    points.subcols(0, dimension.min(points.ncols())).to_owned()
}

/// Monomial basis over the first `dimension` coordinates, with a scaling to `[-1, 1]^d`
/// fixed at construction.
#[derive(Debug, Clone)]
pub struct MonomialBasis {
    dimension: usize,
    degree: i32,
    translation_factor: Vec<f64>,
    scale_factor: Vec<f64>,
}

impl MonomialBasis {
    /// Fixes the scaling from the extents of `points`.
    pub fn new(dimension: usize, degree: i32, points: &Mat<f64>) -> Self {
        let (translation_factor, scale_factor) =
            common::get_cheb_cube_scaling_factors(&trend_coordinates(points, dimension));
        Self {
            dimension,
            degree,
            translation_factor,
            scale_factor,
        }
    }

    pub fn basis_size(&self) -> usize {
        basis_size(self.dimension, self.degree)
    }

    pub fn degree(&self) -> i32 {
        self.degree
    }

    /// Evaluates the monomials at `points`, one row per point. Coordinates past the
    /// basis dimension are ignored.
    pub fn evaluate_points(&self, points: &Mat<f64>) -> Mat<f64> {
        evaluate_monomials(
            &trend_coordinates(points, self.dimension),
            self.degree,
            self.basis_size(),
            &self.translation_factor,
            &self.scale_factor,
        )
    }
}

/// Polynomial basis whose columns are orthonormal on the construction points.
///
/// With `M = monomials(x)` at the construction points and the thin factorisation
/// `M = Q R`, the basis evaluates `monomials(y) R^{-1}`, which equals `Q` at the
/// construction points.
#[derive(Debug, Clone)]
pub struct OrthonormalBasis {
    monomials: MonomialBasis,
    r_inv: Mat<f64>,
}

impl OrthonormalBasis {
    /// Builds the basis on `points`.
    ///
    /// Returns [`SolverError::DegeneratePointSet`] when the points cannot determine a
    /// trend of the requested degree (too few points, or all on a lower dimensional set).
    pub fn new(dimension: usize, degree: i32, points: &Mat<f64>) -> Result<Self, SolverError> {
        validate_degree(degree)?;

        let monomials = MonomialBasis::new(dimension, degree, points);
        let size = monomials.basis_size();

        let degenerate = SolverError::DegeneratePointSet {
            degree,
            num_points: points.nrows(),
        };

        if size == 0 {
            return Ok(Self {
                monomials,
                r_inv: Mat::zeros(0, 0),
            });
        }
        if points.nrows() < size {
            return Err(degenerate);
        }

        let m = monomials.evaluate_points(points);
        let qr = m.qr();
        let r = qr.thin_R();

        let max_diag = (0..size).map(|i| r[(i, i)].abs()).fold(0.0, f64::max);
        let rank_tolerance = max_diag * 1e-10 * (points.nrows() as f64).sqrt();
        if (0..size).any(|i| r[(i, i)].abs() <= rank_tolerance) {
            return Err(degenerate);
        }

        let mut r_inv = Mat::<f64>::identity(size, size);
        solve_upper_triangular_in_place(r, r_inv.as_mut(), Par::Seq);

        Ok(Self { monomials, r_inv })
    }

    pub fn basis_size(&self) -> usize {
        self.monomials.basis_size()
    }

    pub fn degree(&self) -> i32 {
        self.monomials.degree()
    }

    /// Evaluates the basis at `points`, one row per point.
    pub fn evaluate_points(&self, points: &Mat<f64>) -> Mat<f64> {
        if self.basis_size() == 0 {
            return Mat::zeros(points.nrows(), 0);
        }
        self.monomials.evaluate_points(points) * &self.r_inv
    }
}

/// Removes the components of each column of `weights` along the columns of `p`, one
/// column of `p` at a time. `p` is expected to have orthonormal columns, in which case
/// the operation is idempotent.
pub fn orthogonalise(mut weights: MatMut<f64>, p: MatRef<f64>) {
    let nrows = weights.nrows();
    for q in p.col_iter() {
        for j in 0..weights.ncols() {
            let mut dot = 0.0;
            for i in 0..nrows {
                dot += q[i] * weights[(i, j)];
            }
            for i in 0..nrows {
                weights[(i, j)] -= dot * q[i];
            }
        }
    }
}
