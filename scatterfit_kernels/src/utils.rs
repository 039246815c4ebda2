/////////////////////////////////////////////////////////////////////////////////////////////
//
// Supplies general-purpose utilities for matrices, distances and dense kernel matrices.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::traits::RbfKernel;
use faer::{Mat, RowRef};

/// Returns an owned `Mat<T>` from a subset of row indices.
///
/// # Examples
///
/// ```
/// use faer::mat;
/// use scatterfit_kernels::select_mat_rows;
///
/// let matrix = mat![
///     [0.0, 1.0],
///     [1.0, 1.0],
///     [2.0, 2.0],
///     [3.0, 3.0f64],
/// ];
///
/// let sub_matrix = select_mat_rows(&matrix, &[0, 2]);
///
/// assert_eq!(
///     sub_matrix,
///     mat![
///         [0.0, 1.0],
///         [2.0, 2.0f64],
///     ]
/// );
/// ```
#[inline(always)]
pub fn select_mat_rows<T>(existing_mat: &Mat<T>, row_indices: &[usize]) -> Mat<T>
where
    T: Clone,
{
    Mat::from_fn(row_indices.len(), existing_mat.ncols(), |i, j| {
        existing_mat[(row_indices[i], j)].clone()
    })
}

/// Returns the index of the minimum value, the first one on ties. `None` for an empty slice.
#[inline(always)]
pub fn argmin<T: Copy + PartialOrd>(data: &[T]) -> Option<usize> {
    let mut best: Option<(usize, T)> = None;
    for (idx, &value) in data.iter().enumerate() {
        match best {
            Some((_, min_value)) if !(value < min_value) => {}
            _ => best = Some((idx, value)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Returns the index of the maximum value, the first one on ties. `None` for an empty slice.
#[inline(always)]
pub fn argmax<T: Copy + PartialOrd>(data: &[T]) -> Option<usize> {
    let mut best: Option<(usize, T)> = None;
    for (idx, &value) in data.iter().enumerate() {
        match best {
            Some((_, max_value)) if !(value > max_value) => {}
            _ => best = Some((idx, value)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Computes the axis aligned bounding box (AABB) extents of a matrix of points.
///
/// The result is arranged as `[min_0, min_1, ..., min_n, max_0, max_1, ..., max_n]`
/// where `n` is the number of columns in the matrix. Empty for an empty matrix.
///
/// # Examples
///
/// ```
/// use faer::mat;
/// use scatterfit_kernels::get_pointarray_extents;
///
/// let points = mat![
///     [1.0, 2.0],
///     [3.0, -1.0],
///     [0.5, 4.0f64]
/// ];
/// let extents = get_pointarray_extents(&points);
/// assert_eq!(extents, vec![0.5, -1.0, 3.0, 4.0]);
/// ```
#[inline(always)]
pub fn get_pointarray_extents(points: &Mat<f64>) -> Vec<f64> {
    let ncols = points.ncols();
    if points.nrows() == 0 {
        return Vec::new();
    }

    let mut extents = vec![f64::INFINITY; ncols];
    extents.extend(std::iter::repeat_n(f64::NEG_INFINITY, ncols));

    for row in points.row_iter() {
        for (col, &item) in row.iter().enumerate() {
            extents[col] = extents[col].min(item);
            extents[col + ncols] = extents[col + ncols].max(item);
        }
    }

    extents
}

/// Calculates the euclidean distance between two points.
///
/// # Examples
///
/// ```
/// use faer::mat;
/// use scatterfit_kernels::get_distance;
///
/// let points = mat![
///     [1.0, 2.0],
///     [4.0, 6.0],
/// ];
///
/// assert_eq!(get_distance(points.row(0), points.row(1)), 5.0);
/// ```
#[inline(always)]
pub fn get_distance(target: RowRef<f64>, source: RowRef<f64>) -> f64 {
    get_distance_sq(target, source).sqrt()
}

/// Returns the squared Euclidean distance between two points.
#[inline(always)]
pub fn get_distance_sq(target: RowRef<f64>, source: RowRef<f64>) -> f64 {
    let mut dist = 0.0;
    for (t, s) in target.iter().zip(source.iter()) {
        let diff = t - s;
        dist += diff * diff;
    }
    dist
}

/// Builds a dense matrix of signed kernel values between targets (rows) and sources (columns).
#[inline(always)]
pub fn kernel_matrix<K>(target_points: &Mat<f64>, source_points: &Mat<f64>, kernel: &K) -> Mat<f64>
where
    K: RbfKernel,
{
    let m = target_points.nrows();
    let n = source_points.nrows();

    let mut a_matrix = Mat::<f64>::zeros(m, n);

    for j in 0..n {
        let source = source_points.row(j);

        for i in 0..m {
            let target = target_points.row(i);

            a_matrix[(i, j)] = kernel.system_value(get_distance(target, source));
        }
    }

    a_matrix
}

/// Builds the symmetric kernel block of a point set, adding the kernel's nugget on the diagonal.
#[inline(always)]
pub fn symmetric_kernel_matrix<K>(points: &Mat<f64>, kernel: &K) -> Mat<f64>
where
    K: RbfKernel,
{
    let n = points.nrows();
    let nugget = kernel.nugget();

    let mut a_matrix = Mat::<f64>::zeros(n, n);

    for j in 0..n {
        let source_row = points.row(j);

        for i in j..n {
            let target_row = points.row(i);
            let mut k_val = kernel.system_value(get_distance(target_row, source_row));

            if i == j {
                k_val += nugget;
            }

            // Write both symmetric entries
            a_matrix[(i, j)] = k_val;
            a_matrix[(j, i)] = k_val;
        }
    }

    a_matrix
}
