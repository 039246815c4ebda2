/////////////////////////////////////////////////////////////////////////////////////////////
//
// Defines the error type returned by solver construction and solve calls.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use scatterfit_fmm::FmmError;
use thiserror::Error;

/// Errors reported before any iteration takes place.
///
/// Running out of iterations or stalling are not errors; they are reported through
/// [`crate::SolveStatus`] on a successful [`crate::SolveReport`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolverError {
    #[error("expected {expected} values, one per point, got {found}")]
    ValueCountMismatch { expected: usize, found: usize },

    #[error("initial solution must have {expected} entries (points + trend terms), got {found}")]
    InitialSolutionLength { expected: usize, found: usize },

    #[error("solution must have {expected} entries (points + trend terms), got {found}")]
    SolutionLength { expected: usize, found: usize },

    #[error("unsupported point dimension {0}")]
    UnsupportedDimension(usize),

    #[error("unsupported trend degree {0}, expected -1, 0, 1 or 2")]
    UnsupportedTrendDegree(i32),

    #[error("trend degree {degree} is too low for the kernel, at least {minimum} is required")]
    TrendDegreeTooLow { degree: i32, minimum: i32 },

    #[error("point set cannot determine a degree {degree} trend ({num_points} points)")]
    DegeneratePointSet { degree: i32, num_points: usize },

    #[error(transparent)]
    Fmm(#[from] FmmError),
}
