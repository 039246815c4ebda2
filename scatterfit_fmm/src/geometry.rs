/////////////////////////////////////////////////////////////////////////////////////////////
//
// Defines the axis aligned bounding box used to bound octrees and point sets.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use faer::{Mat, RowRef};

/// An axis aligned box in three dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox3 {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundingBox3 {
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every row of `points`. Returns `None` for an empty set
    /// or when the points have fewer than three columns.
    pub fn from_points(points: &Mat<f64>) -> Option<Self> {
        if points.nrows() == 0 || points.ncols() < 3 {
            return None;
        }

        let mut bbox = Self {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
        };

        for row in points.row_iter() {
            for axis in 0..3 {
                bbox.min[axis] = bbox.min[axis].min(row[axis]);
                bbox.max[axis] = bbox.max[axis].max(row[axis]);
            }
        }

        Some(bbox)
    }

    /// Side lengths along each axis.
    #[inline(always)]
    pub fn width(&self) -> [f64; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    #[inline(always)]
    pub fn center(&self) -> [f64; 3] {
        [
            0.5 * (self.min[0] + self.max[0]),
            0.5 * (self.min[1] + self.max[1]),
            0.5 * (self.min[2] + self.max[2]),
        ]
    }

    /// Grows the box by `fraction` of its largest side on every face. Flat axes
    /// are given a non-zero thickness so the box never degenerates.
    pub fn padded(&self, fraction: f64) -> Self {
        let width = self.width();
        let largest = width.iter().cloned().fold(0.0_f64, f64::max);
        let pad = match largest > 0.0 {
            true => largest * fraction,
            false => fraction.max(f64::EPSILON),
        };

        let mut out = *self;
        for axis in 0..3 {
            out.min[axis] -= pad;
            out.max[axis] += pad;
        }
        out
    }

    /// Whether `point` lies inside the closed box.
    pub fn contains(&self, point: RowRef<f64>) -> bool {
        (0..3).all(|axis| point[axis] >= self.min[axis] && point[axis] <= self.max[axis])
    }

    /// True when every side has strictly positive, finite length.
    pub fn is_valid(&self) -> bool {
        self.width().iter().all(|w| w.is_finite() && *w > 0.0)
    }
}
