//! # Prediction
//!
//! Derived quantities of a fitted zero-inflated Poisson model, for the
//! training rows or for new covariates.
//!
//! # Examples
//!
//! ```
//! use faer::Mat;
//! use zero_inflated_models::{CountModelInput, PredictionData, ZeroInflatedPoisson};
//!
//! let y = Mat::from_fn(5, 1, |i, _| [0.0, 0.0, 1.0, 2.0, 5.0][i]);
//! let x = Mat::from_fn(5, 1, |_i, _j| 1.0);
//! let model = ZeroInflatedPoisson::from_input(&CountModelInput::new(x, y)).expect("model");
//! let params = Mat::from_fn(2, 1, |i, _| if i == 0 { -1.0 } else { 0.5 });
//!
//! let prob = model
//!     .predict_named(&params, &PredictionData::default(), "prob")
//!     .expect("prediction");
//! // One column per count in 0..=max(y).
//! assert_eq!(prob.into_matrix().ncols(), 6);
//! ```

use std::fmt;
use std::str::FromStr;

use faer::Mat;

use crate::input::{InputError, combine_offset};
use crate::models::count::CountSubmodel;
use crate::models::inflation::predict_inflation;
use crate::models::matrix_ops::map_mat;
use crate::models::poisson::linear_predictor;
use crate::models::zero_inflated::{ZeroInflatedError, ZeroInflatedPoisson};
use crate::models::zipoisson::zip_log_pmf;
use crate::utils::{count_to_usize, matrix_is_finite, usize_to_f64};

/// Quantity to predict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionMode {
    /// `(1 - w) mu`.
    Mean,
    /// Count-process mean `mu`, ignoring inflation.
    PoissonMean,
    /// Count-model linear predictor.
    Linear,
    /// Mean conditional on a positive count.
    MeanNonzero,
    /// Total probability of a zero, `w + (1 - w) exp(-mu)`.
    ProbZero,
    /// Probabilities of every count in `0..=max(y)` of the training data.
    Prob,
}

impl PredictionMode {
    pub const ALL: [Self; 6] = [
        Self::Mean,
        Self::PoissonMean,
        Self::Linear,
        Self::MeanNonzero,
        Self::ProbZero,
        Self::Prob,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::PoissonMean => "poisson-mean",
            Self::Linear => "linear",
            Self::MeanNonzero => "mean-nonzero",
            Self::ProbZero => "prob-zero",
            Self::Prob => "prob",
        }
    }
}

impl fmt::Display for PredictionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PredictionMode {
    type Err = ZeroInflatedError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == value)
            .ok_or_else(|| ZeroInflatedError::InvalidPredictionMode(value.to_string()))
    }
}

/// Covariates for prediction. Missing pieces fall back to the training data.
///
/// Without a new count design the training offset and exposure are reused
/// unless new ones are given. A missing inflation design is an intercept
/// column when the model was fitted with the default inflation design.
#[derive(Debug, Clone, Default)]
pub struct PredictionData {
    pub design_matrix: Option<Mat<f64>>,
    pub inflation_design: Option<Mat<f64>>,
    pub offset: Option<Mat<f64>>,
    pub exposure: Option<Mat<f64>>,
}

impl PredictionData {
    #[must_use]
    pub fn with_design_matrix(self, design_matrix: Mat<f64>) -> Self {
        Self {
            design_matrix: Some(design_matrix),
            ..self
        }
    }

    #[must_use]
    pub fn with_inflation_design(self, inflation_design: Mat<f64>) -> Self {
        Self {
            inflation_design: Some(inflation_design),
            ..self
        }
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
}

/// Prediction output: one value per row, or one row of probabilities per row.
#[derive(Debug, Clone)]
pub enum Prediction {
    Values(Mat<f64>),
    Distribution(Mat<f64>),
}

impl Prediction {
    #[must_use]
    pub const fn values(&self) -> Option<&Mat<f64>> {
        match self {
            Self::Values(values) => Some(values),
            Self::Distribution(_) => None,
        }
    }

    #[must_use]
    pub const fn distribution(&self) -> Option<&Mat<f64>> {
        match self {
            Self::Distribution(probabilities) => Some(probabilities),
            Self::Values(_) => None,
        }
    }

    #[must_use]
    pub fn into_matrix(self) -> Mat<f64> {
        match self {
            Self::Values(matrix) | Self::Distribution(matrix) => matrix,
        }
    }
}

impl ZeroInflatedPoisson {
    /// Predict `mode` at `params` for `data`.
    ///
    /// # Errors
    ///
    /// Returns `ZeroInflatedError` if `params` has the wrong length or the
    /// prediction arrays do not match the fitted model.
    pub fn predict(
        &self,
        params: &Mat<f64>,
        data: &PredictionData,
        mode: PredictionMode,
    ) -> Result<Prediction, ZeroInflatedError> {
        let (params_infl, params_main) = self.split_params(params)?;
        let design = data
            .design_matrix
            .as_ref()
            .unwrap_or_else(|| self.count().design());
        check_columns(design, self.k_exog())?;
        let n = design.nrows();
        let offset = self.prediction_offset(data, n)?;
        let inflation_design = self.prediction_inflation_design(data, n)?;

        let eta = linear_predictor(design, &params_main, &offset);
        let mu = map_mat(&eta, f64::exp);
        let w = predict_inflation(&inflation_design, &params_infl);

        let prediction = match mode {
            PredictionMode::Linear => Prediction::Values(eta),
            PredictionMode::PoissonMean => Prediction::Values(mu),
            PredictionMode::Mean => {
                Prediction::Values(Mat::from_fn(n, 1, |i, _| (1.0 - w[(i, 0)]) * mu[(i, 0)]))
            }
            PredictionMode::ProbZero => Prediction::Values(prob_zero(&mu, &w)),
            PredictionMode::MeanNonzero => {
                let p0 = prob_zero(&mu, &w);
                Prediction::Values(Mat::from_fn(n, 1, |i, _| {
                    (1.0 - w[(i, 0)]) * mu[(i, 0)] / (1.0 - p0[(i, 0)])
                }))
            }
            PredictionMode::Prob => {
                let support = self.max_count() + 1;
                Prediction::Distribution(Mat::from_fn(n, support, |i, k| {
                    zip_log_pmf(usize_to_f64(k), mu[(i, 0)], w[(i, 0)]).exp()
                }))
            }
        };
        Ok(prediction)
    }

    /// Predict with the mode given by name.
    ///
    /// # Errors
    ///
    /// Returns `ZeroInflatedError::InvalidPredictionMode` for an unknown name,
    /// before anything is computed.
    pub fn predict_named(
        &self,
        params: &Mat<f64>,
        data: &PredictionData,
        mode: &str,
    ) -> Result<Prediction, ZeroInflatedError> {
        let mode = mode.parse::<PredictionMode>()?;
        self.predict(params, data, mode)
    }

    /// Largest count in the training outcome.
    #[must_use]
    pub fn max_count(&self) -> usize {
        let y = self.count().outcome();
        (0..y.nrows())
            .map(|i| count_to_usize(y[(i, 0)]))
            .max()
            .unwrap_or(0)
    }

    fn prediction_offset(
        &self,
        data: &PredictionData,
        n: usize,
    ) -> Result<Mat<f64>, ZeroInflatedError> {
        if data.design_matrix.is_none() && data.offset.is_none() && data.exposure.is_none() {
            return Ok(self.count().offset().clone());
        }
        if let Some(offset) = &data.offset {
            check_column_vector(offset, n)?;
            if !matrix_is_finite(offset) {
                return Err(InputError::NonFiniteOffset.into());
            }
        }
        if let Some(exposure) = &data.exposure {
            check_column_vector(exposure, n)?;
            if (0..n).any(|i| !(exposure[(i, 0)] > 0.0 && exposure[(i, 0)].is_finite())) {
                return Err(InputError::NonPositiveExposure.into());
            }
        }
        Ok(combine_offset(n, data.offset.as_ref(), data.exposure.as_ref()))
    }

    fn prediction_inflation_design(
        &self,
        data: &PredictionData,
        n: usize,
    ) -> Result<Mat<f64>, ZeroInflatedError> {
        let design = match &data.inflation_design {
            Some(design) => design.clone(),
            None if self.has_default_inflation() => Mat::from_fn(n, 1, |_, _| 1.0),
            None => self.inflation().design().clone(),
        };
        check_columns(&design, self.k_inflate())?;
        if design.nrows() != n {
            return Err(ZeroInflatedError::PredictionRowMismatch {
                expected: n,
                found: design.nrows(),
            });
        }
        Ok(design)
    }
}

fn prob_zero(mu: &Mat<f64>, w: &Mat<f64>) -> Mat<f64> {
    Mat::from_fn(mu.nrows(), 1, |i, _| {
        (1.0 - w[(i, 0)]).mul_add((-mu[(i, 0)]).exp(), w[(i, 0)])
    })
}

fn check_columns(design: &Mat<f64>, expected: usize) -> Result<(), ZeroInflatedError> {
    if design.ncols() == expected {
        Ok(())
    } else {
        Err(ZeroInflatedError::ColumnMismatch {
            expected,
            found: design.ncols(),
        })
    }
}

fn check_column_vector(vector: &Mat<f64>, n: usize) -> Result<(), ZeroInflatedError> {
    if vector.ncols() != 1 || vector.nrows() != n {
        return Err(ZeroInflatedError::PredictionRowMismatch {
            expected: n,
            found: vector.nrows(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::CountModelInput;
    use approx::assert_relative_eq;

    fn idx_to_f64(idx: usize) -> f64 {
        f64::from(u32::try_from(idx).unwrap_or(u32::MAX))
    }

    fn sample_model() -> ZeroInflatedPoisson {
        let n = 8;
        let x = Mat::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { idx_to_f64(i) / 8.0 });
        let z = Mat::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { idx_to_f64(i % 2) });
        let y = Mat::from_fn(n, 1, |i, _| [0.0, 3.0, 0.0, 1.0, 4.0, 0.0, 2.0, 1.0][i]);
        let input = CountModelInput::new(x, y)
            .with_inflation_design(z)
            .with_exposure(Mat::from_fn(n, 1, |i, _| 1.0 + idx_to_f64(i) / 4.0));
        ZeroInflatedPoisson::from_input(&input).expect("model")
    }

    fn sample_params() -> Mat<f64> {
        Mat::from_fn(4, 1, |i, _| [-0.4, 0.6, 0.3, 0.5][i])
    }

    fn values(prediction: Prediction) -> Mat<f64> {
        prediction.values().cloned().expect("vector prediction")
    }

    #[test]
    fn mode_names_round_trip() {
        for mode in PredictionMode::ALL {
            assert_eq!(mode.as_str().parse::<PredictionMode>().expect("mode"), mode);
        }
    }

    #[test]
    fn unknown_mode_is_rejected_by_name() {
        let model = sample_model();
        let err = model
            .predict_named(&sample_params(), &PredictionData::default(), "median")
            .expect_err("unknown mode");
        assert!(matches!(err, ZeroInflatedError::InvalidPredictionMode(name) if name == "median"));
    }

    #[test]
    fn predict_splits_parameters_into_blocks() {
        let model = sample_model();
        let data = PredictionData::default();
        let mean = values(model.predict(&sample_params(), &data, PredictionMode::Mean).expect("mean"));
        assert_eq!(mean.nrows(), model.nobs());
        let err = model
            .predict(&Mat::zeros(3, 1), &data, PredictionMode::Mean)
            .expect_err("short parameter vector");
        assert!(matches!(err, ZeroInflatedError::ParameterLength { expected: 4, found: 3 }));
    }

    #[test]
    fn mean_is_poisson_mean_scaled_by_non_inflation() {
        let model = sample_model();
        let params = sample_params();
        let data = PredictionData::default();
        let mean = values(model.predict(&params, &data, PredictionMode::Mean).expect("mean"));
        let mu = values(model.predict(&params, &data, PredictionMode::PoissonMean).expect("mu"));
        let w = model.inflation_probabilities(&params).expect("w");
        for i in 0..mean.nrows() {
            assert_relative_eq!(mean[(i, 0)], (1.0 - w[(i, 0)]) * mu[(i, 0)], epsilon = 1e-12);
        }
    }

    #[test]
    fn linear_predictor_includes_log_exposure() {
        let model = sample_model();
        let params = sample_params();
        let eta = values(
            model
                .predict(&params, &PredictionData::default(), PredictionMode::Linear)
                .expect("linear"),
        );
        let expected = 0.3 + 0.5 * (4.0 / 8.0) + (1.0f64 + 1.0).ln();
        assert_relative_eq!(eta[(4, 0)], expected, epsilon = 1e-12);
    }

    #[test]
    fn prob_zero_equals_first_prob_column() {
        let model = sample_model();
        let params = sample_params();
        let data = PredictionData::default();
        let p0 = values(model.predict(&params, &data, PredictionMode::ProbZero).expect("p0"));
        let prob = model
            .predict(&params, &data, PredictionMode::Prob)
            .expect("prob")
            .into_matrix();
        assert_eq!(prob.ncols(), 5);
        for i in 0..prob.nrows() {
            assert_relative_eq!(p0[(i, 0)], prob[(i, 0)], epsilon = 1e-12);
            let total: f64 = (0..prob.ncols()).map(|k| prob[(i, k)]).sum();
            assert!(total <= 1.0 + 1e-12);
        }
    }

    #[test]
    fn mean_nonzero_conditions_on_positive_count() {
        let model = sample_model();
        let params = sample_params();
        let data = PredictionData::default();
        let mean = values(model.predict(&params, &data, PredictionMode::Mean).expect("mean"));
        let p0 = values(model.predict(&params, &data, PredictionMode::ProbZero).expect("p0"));
        let conditional =
            values(model.predict(&params, &data, PredictionMode::MeanNonzero).expect("nonzero"));
        for i in 0..mean.nrows() {
            assert_relative_eq!(conditional[(i, 0)], mean[(i, 0)] / (1.0 - p0[(i, 0)]), epsilon = 1e-12);
            assert!(conditional[(i, 0)] > mean[(i, 0)]);
        }
    }

    #[test]
    fn new_covariates_use_new_rows() {
        let model = sample_model();
        let data = PredictionData::default()
            .with_design_matrix(Mat::from_fn(3, 2, |_, j| if j == 0 { 1.0 } else { 0.0 }))
            .with_inflation_design(Mat::from_fn(3, 2, |_, j| if j == 0 { 1.0 } else { 0.0 }));
        let mu = values(
            model
                .predict(&sample_params(), &data, PredictionMode::PoissonMean)
                .expect("mu"),
        );
        assert_eq!(mu.nrows(), 3);
        assert_relative_eq!(mu[(0, 0)], 0.3f64.exp(), epsilon = 1e-12);
    }

    #[test]
    fn mismatched_prediction_arrays_are_rejected() {
        let model = sample_model();
        let params = sample_params();
        let wrong_columns = PredictionData::default().with_design_matrix(Mat::zeros(3, 3));
        assert!(matches!(
            model.predict(&params, &wrong_columns, PredictionMode::Mean),
            Err(ZeroInflatedError::ColumnMismatch { expected: 2, found: 3 })
        ));
        let missing_inflation = PredictionData::default().with_design_matrix(Mat::zeros(3, 2));
        assert!(matches!(
            model.predict(&params, &missing_inflation, PredictionMode::Mean),
            Err(ZeroInflatedError::PredictionRowMismatch { expected: 3, found: 8 })
        ));
    }
}
