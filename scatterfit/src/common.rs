/////////////////////////////////////////////////////////////////////////////////////////////
//
// Defines shared helpers for random point generation, point sampling, and scaling utilities.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use faer::Mat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scatterfit_kernels::{argmax, get_distance, get_pointarray_extents};

/// Generate a matrix of random points in the unit hypercube.
///
/// # Parameters
/// - `n`: Number of points to generate (rows in the output matrix).
/// - `d`: Number of spatial dimensions per point (columns in the output matrix).
/// - `seed`: Optional random seed. `None` seeds from the operating system.
///
/// # Example
/// ```
/// use scatterfit::generate_random_points;
///
/// let pts = generate_random_points(100, 3, Some(42));
/// assert_eq!(pts.ncols(), 3);
/// ```
pub fn generate_random_points(n: usize, d: usize, seed: Option<u64>) -> Mat<f64> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    Mat::from_fn(n, d, |_, _| rng.random_range(0.0..1.0))
}

/// Generate points uniformly distributed on the unit sphere in 3D.
///
/// Gaussian samples are normalised, which gives a uniform distribution over the sphere.
pub fn generate_spherical_points(n: usize, seed: Option<u64>) -> Mat<f64> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut points = Mat::<f64>::zeros(n, 3);
    for i in 0..n {
        // Box-Muller from uniform samples
        let mut v = [0.0f64; 3];
        let mut norm = 0.0;
        while norm < 1e-12 {
            for x in v.iter_mut() {
                let u1: f64 = rng.random_range(f64::EPSILON..1.0);
                let u2: f64 = rng.random_range(0.0..1.0);
                *x = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
            }
            norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
        }
        for axis in 0..3 {
            points[(i, axis)] = v[axis] / norm;
        }
    }
    points
}

/// Selects a subset of points by farthest point sampling.
///
/// Starting from `seed_index`, repeatedly picks the point whose distance to the
/// already selected subset is largest.
///
/// # Arguments
/// * `points` - Matrix of point coordinates (rows are points).
/// * `num_wanted_points` - Number of points to sample, capped at the number of points.
/// * `seed_index` - Index of the initial seed point.
///
/// # Returns
/// A vector of indices into `points` representing the sampled subset.
pub fn farthest_point_sampling(
    points: &Mat<f64>,
    num_wanted_points: usize,
    seed_index: usize,
) -> Vec<usize> {
    let num_points = points.nrows();
    let num_wanted_points = num_wanted_points.min(num_points);
    if num_wanted_points == 0 {
        return Vec::new();
    }

    let mut selected_points: Vec<usize> = Vec::with_capacity(num_wanted_points);
    let mut min_dists = vec![f64::INFINITY; num_points];

    let mut last_selected = seed_index;
    selected_points.push(last_selected);
    min_dists[last_selected] = f64::NEG_INFINITY;

    for _ in 1..num_wanted_points {
        for i in 0..num_points {
            if min_dists[i] == f64::NEG_INFINITY {
                continue;
            }
            let dist = get_distance(points.row(last_selected), points.row(i));
            if dist < min_dists[i] {
                min_dists[i] = dist;
            }
        }

        let Some(farthest_idx) = argmax(&min_dists) else {
            break;
        };

        selected_points.push(farthest_idx);
        min_dists[farthest_idx] = f64::NEG_INFINITY;
        last_selected = farthest_idx;
    }

    selected_points
}

/// Compute translation and scale factors to map points into a Chebyshev cube.
///
/// The translation is the midpoint of each coordinate range and the scale
/// is half the range, with zeros replaced by `1.0` to avoid division by zero.
///
/// # Returns
/// A tuple `(translation, scale)` where each is a per-dimension factor.
pub fn get_cheb_cube_scaling_factors(point_locations: &Mat<f64>) -> (Vec<f64>, Vec<f64>) {
    let dimensions = point_locations.ncols();
    let extents = get_pointarray_extents(point_locations);

    if extents.is_empty() {
        return (vec![0.0; dimensions], vec![1.0; dimensions]);
    }

    (0..dimensions)
        .map(|d| {
            let min_coord = extents[d];
            let max_coord = extents[d + dimensions];
            let half_range = (max_coord - min_coord) / 2.0;
            let scale = match half_range == 0.0 {
                true => 1.0,
                false => half_range,
            };
            ((max_coord + min_coord) / 2.0, scale)
        })
        .unzip()
}

/// Apply translation and scaling to map points into a normalized cube.
///
/// For each coordinate `x`, applies `(x - translation_factor[d]) / scale_factor[d]`.
pub fn scale_points(points: &mut Mat<f64>, translation_factor: &[f64], scale_factor: &[f64]) {
    points.row_iter_mut().for_each(|row| {
        row.iter_mut().enumerate().for_each(|(col_idx, element)| {
            *element = (*element - translation_factor[col_idx]) / scale_factor[col_idx];
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spherical_points_have_unit_norm() {
        let points = generate_spherical_points(200, Some(1));
        for row in points.row_iter() {
            let norm = (row[0] * row[0] + row[1] * row[1] + row[2] * row[2]).sqrt();
            assert!((norm - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn farthest_point_sampling_picks_extremes() {
        let points = faer::mat![[0.0], [0.1], [0.5], [0.9], [1.0f64]];
        let picked = farthest_point_sampling(&points, 3, 0);
        assert_eq!(picked, vec![0, 4, 2]);
    }

    #[test]
    fn farthest_point_sampling_caps_request() {
        let points = generate_random_points(5, 2, Some(3));
        let mut picked = farthest_point_sampling(&points, 10, 2);
        picked.sort_unstable();
        assert_eq!(picked, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn scaling_maps_extents_to_unit_cube() {
        let mut points = faer::mat![[2.0, 5.0], [4.0, 5.0], [3.0, 5.0f64]];
        let (t, s) = get_cheb_cube_scaling_factors(&points);
        assert_eq!(t, vec![3.0, 5.0]);
        assert_eq!(s, vec![1.0, 1.0]);

        scale_points(&mut points, &t, &s);
        assert_eq!(points[(0, 0)], -1.0);
        assert_eq!(points[(1, 0)], 1.0);
        assert_eq!(points[(2, 1)], 0.0);
    }
}
