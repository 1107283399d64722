/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Shared linear algebra and numeric utilities for the count models.
//
// Created on: 24 Jan 2026     Author: Tobias Kragholm
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Utilities
//!
//! Shared helpers for solving linear systems, moving between faer column
//! vectors and plain slices, and small numeric conversions.

use faer::Mat;
use faer::prelude::Solve;
use num_traits::ToPrimitive;

use crate::models::zero_inflated::ZeroInflatedError;

#[must_use]
pub fn max_abs_diff(a: &Mat<f64>, b: &Mat<f64>) -> f64 {
    let mut max = 0.0;
    for i in 0..a.nrows() {
        let diff = (a[(i, 0)] - b[(i, 0)]).abs();
        if diff > max {
            max = diff;
        }
    }
    max
}

/// Largest absolute entry of a column vector.
#[must_use]
pub fn max_abs(vector: &Mat<f64>) -> f64 {
    (0..vector.nrows()).fold(0.0, |acc: f64, i| acc.max(vector[(i, 0)].abs()))
}

/// # Errors
///
/// Returns `ZeroInflatedError::SolveFailed` if the solve produces non-finite values.
pub fn solve_linear_system(a: &Mat<f64>, b: &Mat<f64>) -> Result<Mat<f64>, ZeroInflatedError> {
    let rhs = b.clone();
    let lu = a.full_piv_lu();
    let solution = lu.solve(rhs);
    if !matrix_is_finite(&solution) {
        return Err(ZeroInflatedError::SolveFailed);
    }
    Ok(solution)
}

#[must_use]
pub fn mean_column(vector: &Mat<f64>) -> f64 {
    let mut sum = 0.0;
    for i in 0..vector.nrows() {
        sum += vector[(i, 0)];
    }
    sum / usize_to_f64(vector.nrows())
}

#[must_use]
pub fn matrix_is_finite(matrix: &Mat<f64>) -> bool {
    for i in 0..matrix.nrows() {
        for j in 0..matrix.ncols() {
            if !matrix[(i, j)].is_finite() {
                return false;
            }
        }
    }
    true
}

#[must_use]
pub fn usize_to_f64(value: usize) -> f64 {
    f64::from(u32::try_from(value).unwrap_or(u32::MAX))
}

/// Convert a non-negative integral `f64` count to `usize` (saturating at zero).
#[must_use]
pub fn count_to_usize(value: f64) -> usize {
    value.round().to_usize().unwrap_or(0)
}

#[must_use]
pub fn column_from_slice(values: &[f64]) -> Mat<f64> {
    Mat::from_fn(values.len(), 1, |i, _| values[i])
}

#[must_use]
pub fn column_to_vec(vector: &Mat<f64>) -> Vec<f64> {
    (0..vector.nrows()).map(|i| vector[(i, 0)]).collect()
}

/// Copy the strict lower triangle onto the upper triangle in place.
pub fn mirror_lower_triangle(matrix: &mut Mat<f64>) {
    for i in 0..matrix.nrows() {
        for j in (i + 1)..matrix.ncols() {
            matrix[(i, j)] = matrix[(j, i)];
        }
    }
}
