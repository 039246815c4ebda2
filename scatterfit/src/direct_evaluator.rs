/////////////////////////////////////////////////////////////////////////////////////////////
//
// Evaluates RBF expansions by direct pairwise summation.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::{SolverError, polynomials::OrthonormalBasis};
use faer::{Mat, MatRef};
use rayon::prelude::*;
use scatterfit_kernels::{RbfKernel, get_distance};

/// Computes `out[t] = sum_j K(|y_t - x_j|) w_j` for the selected targets, in parallel
/// over targets. Sources with zero weight are skipped.
///
/// `targets` selects rows of `target_points`; `None` means every row. The output has
/// one row per selected target, in selection order.
pub(crate) fn kernel_sum<K: RbfKernel>(
    kernel: &K,
    source_points: &Mat<f64>,
    weights: MatRef<f64>,
    target_points: &Mat<f64>,
    targets: Option<&[usize]>,
) -> Mat<f64> {
    let nrhs = weights.ncols();

    let active_sources: Vec<usize> = (0..source_points.nrows())
        .filter(|&j| (0..nrhs).any(|col| weights[(j, col)] != 0.0))
        .collect();

    let target_rows: Vec<usize> = match targets {
        Some(rows) => rows.to_vec(),
        None => (0..target_points.nrows()).collect(),
    };

    let sums: Vec<Vec<f64>> = target_rows
        .par_iter()
        .map(|&t| {
            let target = target_points.row(t);
            let mut acc = vec![0.0; nrhs];
            for &j in &active_sources {
                let k = kernel.system_value(get_distance(target, source_points.row(j)));
                for (col, a) in acc.iter_mut().enumerate() {
                    *a += k * weights[(j, col)];
                }
            }
            acc
        })
        .collect();

    Mat::from_fn(target_rows.len(), nrhs, |i, col| sums[i][col])
}

/// Evaluates an interpolant `s(y) = sum_j K(|y - x_j|) w_j + p(y) c` by direct summation.
///
/// The trend `p` uses the same orthonormal basis the solver used, so the trend
/// coefficients of a solution can be applied directly.
#[derive(Debug, Clone)]
pub struct DirectEvaluator<K: RbfKernel> {
    kernel: K,
    source_points: Mat<f64>,
    trend: Option<OrthonormalBasis>,
}

impl<K: RbfKernel> DirectEvaluator<K> {
    pub fn new(kernel: K, source_points: Mat<f64>, trend: Option<OrthonormalBasis>) -> Self {
        Self {
            kernel,
            source_points,
            trend,
        }
    }

    pub fn num_points(&self) -> usize {
        self.source_points.nrows()
    }

    pub fn num_polynomials(&self) -> usize {
        self.trend.as_ref().map_or(0, |t| t.basis_size())
    }

    fn check_solution(&self, solution: MatRef<f64>) -> Result<(), SolverError> {
        let expected = self.num_points() + self.num_polynomials();
        match solution.nrows() == expected {
            true => Ok(()),
            false => Err(SolverError::SolutionLength {
                expected,
                found: solution.nrows(),
            }),
        }
    }

    fn add_trend(&self, values: &mut Mat<f64>, solution: MatRef<f64>, targets: &Mat<f64>) {
        if let Some(trend) = &self.trend {
            let coefficients = solution.subrows(self.num_points(), trend.basis_size());
            *values += trend.evaluate_points(targets) * coefficients;
        }
    }

    /// Evaluates the interpolant at arbitrary `target_points`.
    ///
    /// # Arguments
    /// * `solution`: weights followed by trend coefficients, `(N + M) x 1`.
    /// * `target_points`: one point per row, same dimension as the source points.
    pub fn evaluate(
        &self,
        solution: MatRef<f64>,
        target_points: &Mat<f64>,
    ) -> Result<Mat<f64>, SolverError> {
        self.check_solution(solution)?;
        if target_points.nrows() > 0 && target_points.ncols() != self.source_points.ncols() {
            return Err(SolverError::UnsupportedDimension(target_points.ncols()));
        }

        let weights = solution.subrows(0, self.num_points());
        let mut values =
            kernel_sum(&self.kernel, &self.source_points, weights, target_points, None);
        self.add_trend(&mut values, solution, target_points);

        Ok(values)
    }

    /// Evaluates the interpolant at the source points. With `include_nugget` the
    /// diagonal term `nugget * w_i` is added, giving the fitted values of the system.
    pub fn evaluate_at_sources(
        &self,
        solution: MatRef<f64>,
        include_nugget: bool,
    ) -> Result<Mat<f64>, SolverError> {
        let mut values = self.evaluate(solution, &self.source_points)?;

        if include_nugget {
            let nugget = self.kernel.nugget();
            let weights = solution.subrows(0, self.num_points());
            values += Mat::from_fn(weights.nrows(), weights.ncols(), |i, col| {
                nugget * weights[(i, col)]
            });
        }

        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate_random_points;
    use faer::Mat;
    use scatterfit_kernels::{kernel_matrix, kernels::CovGaussian};

    #[test]
    fn kernel_sum_matches_dense_product() {
        let points = generate_random_points(60, 3, Some(1));
        let weights = generate_random_points(60, 2, Some(2));
        let kernel = CovGaussian::new(1.0, 0.3);

        let dense = kernel_matrix(&points, &points, &kernel) * &weights;
        let summed = kernel_sum(&kernel, &points, weights.as_ref(), &points, None);

        assert!((&dense - &summed).norm_max() < 1e-12);
    }

    #[test]
    fn kernel_sum_respects_target_selection() {
        let points = generate_random_points(30, 2, Some(3));
        let weights = generate_random_points(30, 1, Some(4));
        let kernel = CovGaussian::new(1.0, 0.3);

        let all = kernel_sum(&kernel, &points, weights.as_ref(), &points, None);
        let some = kernel_sum(&kernel, &points, weights.as_ref(), &points, Some(&[4, 0, 17]));

        assert_eq!(some.nrows(), 3);
        assert_eq!(some[(0, 0)], all[(4, 0)]);
        assert_eq!(some[(1, 0)], all[(0, 0)]);
        assert_eq!(some[(2, 0)], all[(17, 0)]);
    }

    #[test]
    fn nugget_only_applies_at_sources() {
        let points = generate_random_points(10, 3, Some(5));
        let kernel = CovGaussian::new(1.0, 0.3).with_nugget(0.5);
        let evaluator = DirectEvaluator::new(kernel, points.clone(), None);

        let solution = Mat::from_fn(10, 1, |i, _| if i == 3 { 1.0 } else { 0.0 });
        let without = evaluator.evaluate_at_sources(solution.as_ref(), false).unwrap();
        let with = evaluator.evaluate_at_sources(solution.as_ref(), true).unwrap();

        assert!((with[(3, 0)] - without[(3, 0)] - 0.5).abs() < 1e-15);
        assert_eq!(with[(2, 0)], without[(2, 0)]);
    }

    #[test]
    fn solution_length_is_checked() {
        let points = generate_random_points(10, 3, Some(5));
        let evaluator = DirectEvaluator::new(CovGaussian::new(1.0, 0.3), points.clone(), None);

        let err = evaluator
            .evaluate(Mat::<f64>::zeros(9, 1).as_ref(), &points)
            .unwrap_err();
        assert_eq!(err, SolverError::SolutionLength { expected: 10, found: 9 });
    }
}
