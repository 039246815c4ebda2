/////////////////////////////////////////////////////////////////////////////////////////////
//
// Exposes the public API for the Black Box Fast Multipole Method (BBFMM) crate.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Black Box Fast Multipole Method (BBFMM)
//!
//! A parallel, kernel independent fast multipole method on a uniform octree.
//!
//! The far field is approximated by tensor product Chebyshev interpolation in every
//! cell, so any smooth (non-oscillatory) kernel can be used without analytic expansions.
//! The tree geometry is fixed up front, which lets the M2L operators be reused when a
//! new set of points is attached.
//!
//! # Features:
//! - 3D uniform octree with a caller supplied bounding box and height
//! - Cached M2L operators keyed by level and cell offset
//! - Multiple right-hand sides
//!
//! # Example: Fast Matrix-Vector Product
//!
//! ```
//! use scatterfit_fmm::{BoundingBox3, FmmTree, KernelFunction};
//! use faer::{Mat, RowRef};
//! use rand::{Rng, SeedableRng};
//! use rand::rngs::StdRng;
//!
//! pub struct GaussianKernel;
//!
//! impl KernelFunction for GaussianKernel {
//!     #[inline(always)]
//!     fn evaluate(&self, target: RowRef<f64>, source: RowRef<f64>) -> f64 {
//!         let mut dist2 = 0.0;
//!         for (t, s) in target.iter().zip(source.iter()) {
//!             let diff = t - s;
//!             dist2 += diff * diff;
//!         }
//!         (-dist2 / 0.25).exp()
//!     }
//! }
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! let points = Mat::from_fn(2000, 3, |_, _| rng.random_range(-1.0..1.0));
//! let weights = Mat::from_fn(2000, 1, |_, _| rng.random_range(0.0..1.0));
//!
//! let bbox = BoundingBox3::from_points(&points).unwrap().padded(1e-3);
//!
//! let mut tree = FmmTree::new(GaussianKernel, bbox, 3, 6).unwrap();
//! tree.set_points(&points).unwrap();
//!
//! let values = tree.evaluate(weights.as_ref()).unwrap();
//! assert_eq!(values.nrows(), 2000);
//! ```

mod bbfmm;
mod chebyshev;
mod geometry;
mod traits;
mod uniform_tree;

pub use bbfmm::{FmmError, FmmTree, MAX_TREE_HEIGHT};
pub use geometry::BoundingBox3;
pub use traits::KernelFunction;
