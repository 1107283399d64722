//! # Model inputs
//!
//! Defines a light-weight container for a count outcome, the count-model
//! design matrix, an optional inflation-model design matrix, and optional
//! offset or exposure columns.
//!
//! # Examples
//!
//! ```
//! use faer::Mat;
//! use zero_inflated_models::CountModelInput;
//!
//! let design_matrix = Mat::from_fn(4, 1, |_i, _j| 1.0);
//! let outcome = Mat::from_fn(4, 1, |i, _| if i < 2 { 0.0 } else { 3.0 });
//! let input = CountModelInput::new(design_matrix, outcome);
//!
//! assert!(input.validate().is_ok());
//! ```
//!
//! ```
//! use faer::Mat;
//! use zero_inflated_models::CountModelInput;
//!
//! let design_matrix = Mat::from_fn(4, 1, |_i, _j| 1.0);
//! let outcome = Mat::from_fn(4, 1, |i, _| if i == 0 { 0.5 } else { 1.0 });
//! let input = CountModelInput::new(design_matrix, outcome);
//!
//! assert!(input.validate().is_err());
//! ```

use faer::Mat;
use thiserror::Error;

use crate::utils::matrix_is_finite;

/// Errors returned when validating model inputs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("design matrix must have at least one column")]
    EmptyDesign,
    #[error("inflation design matrix must have at least one column")]
    EmptyInflationDesign,
    #[error("outcome must be a single column matrix")]
    InvalidOutcomeShape,
    #[error("design matrix rows ({rows}) must match outcome rows ({len})")]
    DimensionMismatch { rows: usize, len: usize },
    #[error("inflation design rows ({rows}) must match outcome rows ({len})")]
    InflationDimensionMismatch { rows: usize, len: usize },
    #[error("offset must be a single column matrix with the same number of rows as outcome")]
    InvalidOffsetShape,
    #[error("exposure must be a single column matrix with the same number of rows as outcome")]
    InvalidExposureShape,
    #[error("design matrix contains non-finite values")]
    NonFiniteDesign,
    #[error("outcome contains non-finite values")]
    NonFiniteOutcome,
    #[error("offset contains non-finite values")]
    NonFiniteOffset,
    #[error("exposure contains non-finite values")]
    NonFiniteExposure,
    #[error("outcome contains negative values")]
    NegativeOutcome,
    #[error("outcome contains non-integer values")]
    NonIntegerOutcome,
    #[error("exposure must be strictly positive")]
    NonPositiveExposure,
}

#[derive(Debug, Clone)]
pub struct CountModelInput {
    pub design_matrix: Mat<f64>,
    pub outcome: Mat<f64>,
    pub inflation_design: Option<Mat<f64>>,
    pub offset: Option<Mat<f64>>,
    pub exposure: Option<Mat<f64>>,
}

impl CountModelInput {
    #[must_use]
    pub const fn new(design_matrix: Mat<f64>, outcome: Mat<f64>) -> Self {
        Self {
            design_matrix,
            outcome,
            inflation_design: None,
            offset: None,
            exposure: None,
        }
    }

    #[must_use]
    pub fn with_inflation_design(mut self, inflation_design: Mat<f64>) -> Self {
        self.inflation_design = Some(inflation_design);
        self
    }

    #[must_use]
    pub fn with_offset(self, offset: Mat<f64>) -> Self {
        Self {
            offset: Some(offset),
            ..self
        }
    }

    #[must_use]
    pub fn with_exposure(self, exposure: Mat<f64>) -> Self {
        Self {
            exposure: Some(exposure),
            ..self
        }
    }

    #[must_use]
    pub const fn design_matrix(&self) -> &Mat<f64> {
        &self.design_matrix
    }

    #[must_use]
    pub const fn outcome(&self) -> &Mat<f64> {
        &self.outcome
    }

    #[must_use]
    pub const fn inflation_design(&self) -> Option<&Mat<f64>> {
        self.inflation_design.as_ref()
    }

    #[must_use]
    pub fn nobs(&self) -> usize {
        self.outcome.nrows()
    }

    /// Validate the count design matrix and outcome only.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if core inputs are malformed.
    pub fn validate_core(&self) -> Result<(), InputError> {
        if self.design_matrix.ncols() == 0 {
            return Err(InputError::EmptyDesign);
        }
        if self.outcome.ncols() != 1 {
            return Err(InputError::InvalidOutcomeShape);
        }
        if self.design_matrix.nrows() != self.outcome.nrows() {
            return Err(InputError::DimensionMismatch {
                rows: self.design_matrix.nrows(),
                len: self.outcome.nrows(),
            });
        }
        if !matrix_is_finite(&self.design_matrix) {
            return Err(InputError::NonFiniteDesign);
        }
        if !matrix_is_finite(&self.outcome) {
            return Err(InputError::NonFiniteOutcome);
        }
        if (0..self.outcome.nrows()).any(|i| self.outcome[(i, 0)] < 0.0) {
            return Err(InputError::NegativeOutcome);
        }
        if (0..self.outcome.nrows()).any(|i| self.outcome[(i, 0)].fract() != 0.0) {
            return Err(InputError::NonIntegerOutcome);
        }
        Ok(())
    }

    /// Validate shapes and values for every array, including the optional ones.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if inputs are malformed.
    pub fn validate(&self) -> Result<(), InputError> {
        self.validate_core()?;
        let n = self.outcome.nrows();
        if let Some(inflation) = &self.inflation_design {
            if inflation.ncols() == 0 {
                return Err(InputError::EmptyInflationDesign);
            }
            if inflation.nrows() != n {
                return Err(InputError::InflationDimensionMismatch {
                    rows: inflation.nrows(),
                    len: n,
                });
            }
            if !matrix_is_finite(inflation) {
                return Err(InputError::NonFiniteDesign);
            }
        }
        if let Some(offset) = &self.offset {
            if offset.ncols() != 1 || offset.nrows() != n {
                return Err(InputError::InvalidOffsetShape);
            }
            if !matrix_is_finite(offset) {
                return Err(InputError::NonFiniteOffset);
            }
        }
        if let Some(exposure) = &self.exposure {
            if exposure.ncols() != 1 || exposure.nrows() != n {
                return Err(InputError::InvalidExposureShape);
            }
            if !matrix_is_finite(exposure) {
                return Err(InputError::NonFiniteExposure);
            }
            if (0..n).any(|i| exposure[(i, 0)] <= 0.0) {
                return Err(InputError::NonPositiveExposure);
            }
        }
        Ok(())
    }

    /// Inflation design, or an intercept-only column of ones when none was given.
    #[must_use]
    pub fn inflation_design_or_intercept(&self) -> Mat<f64> {
        self.inflation_design
            .clone()
            .unwrap_or_else(|| Mat::from_fn(self.outcome.nrows(), 1, |_, _| 1.0))
    }

    /// Combined count-model offset: `offset + ln(exposure)`, zero where absent.
    #[must_use]
    pub fn combined_offset(&self) -> Mat<f64> {
        combine_offset(
            self.outcome.nrows(),
            self.offset.as_ref(),
            self.exposure.as_ref(),
        )
    }
}

/// Add an optional offset and the log of an optional exposure into one column.
#[must_use]
pub fn combine_offset(n: usize, offset: Option<&Mat<f64>>, exposure: Option<&Mat<f64>>) -> Mat<f64> {
    Mat::from_fn(n, 1, |i, _| {
        let base = offset.map_or(0.0, |o| o[(i, 0)]);
        exposure.map_or(base, |e| base + e[(i, 0)].ln())
    })
}
