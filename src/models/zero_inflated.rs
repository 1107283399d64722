/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Zero-inflated mixture likelihood for count outcome data.
//
// Created on: 24 Jan 2026     Author: Tobias Kragholm
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Zero-inflated mixture likelihood
//!
//! Combines a logistic inflation process with a count process:
//! - `y = 0`: `ln(w + (1 - w) exp(L))`, a structural zero or a count-process zero.
//! - `y > 0`: `ln(1 - w) + L`, only the count process can produce it.
//!
//! `L` is the count model's log-density and `w` the structural-zero
//! probability. Parameters are always ordered `[inflation, count]`.
//!
//! The engine evaluates the log-likelihood, the analytic score and the
//! Hessian. The Hessian is closed-form when the count family provides one
//! and a finite-difference approximation of the log-likelihood otherwise.

use faer::Mat;
use thiserror::Error;

use crate::input::{CountModelInput, InputError};
use crate::models::count::{CountSubmodel, InflationTerms};
use crate::models::inflation::LogitInflation;
use crate::models::matrix_ops::rows_transpose_mul;
use crate::models::poisson::PoissonSubmodel;
use crate::utils::mirror_lower_triangle;

/// Errors returned by zero-inflated model construction, fitting, and prediction.
#[derive(Debug, Error)]
pub enum ZeroInflatedError {
    #[error("invalid model input: {0}")]
    Input(#[from] InputError),
    #[error("parameter vector has length {found}, expected k_inflate + k_exog = {expected}")]
    ParameterLength { expected: usize, found: usize },
    #[error("design matrix has {found} columns, expected {expected}")]
    ColumnMismatch { expected: usize, found: usize },
    #[error("prediction arrays have {found} rows, expected {expected}")]
    PredictionRowMismatch { expected: usize, found: usize },
    #[error(
        "unsupported prediction mode `{0}` (expected mean, poisson-mean, linear, mean-nonzero, prob-zero or prob)"
    )]
    InvalidPredictionMode(String),
    #[error("unsupported regularization method `{0}`")]
    UnsupportedRegularizationMethod(String),
    #[error("unsupported optimizer method `{0}`")]
    UnsupportedOptimizerMethod(String),
    #[error("unsupported trim mode `{0}`")]
    UnsupportedTrimMode(String),
    #[error("penalty weights must be non-negative and finite, one per parameter")]
    InvalidPenaltyWeights,
    #[error("invalid zero-inflated Poisson parameters: mu = {mu}, w = {w}")]
    InvalidDistribution { mu: f64, w: f64 },
    #[error("model failed to converge after {iterations} iterations")]
    NonConvergence { iterations: usize },
    #[error("linear solve failed")]
    SolveFailed,
    #[error("optimizer failed: {0}")]
    Optimizer(String),
}

/// Row indices split by whether the outcome is zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub zero_idx: Vec<usize>,
    pub nonzero_idx: Vec<usize>,
}

impl Partition {
    #[must_use]
    pub fn from_outcome(outcome: &Mat<f64>) -> Self {
        let (zero_idx, nonzero_idx) = (0..outcome.nrows()).partition(|&i| outcome[(i, 0)] == 0.0);
        Self {
            zero_idx,
            nonzero_idx,
        }
    }
}

/// Zero-inflated Poisson regression.
pub type ZeroInflatedPoisson = ZeroInflatedModel<PoissonSubmodel>;

/// Joint likelihood of an inflation process and a count process.
///
/// The covariates are fixed at construction; `w` and the count mean are
/// recomputed from the parameters on every evaluation.
#[derive(Debug, Clone)]
pub struct ZeroInflatedModel<C: CountSubmodel> {
    inflation: LogitInflation,
    count: C,
    partition: Partition,
    default_inflation: bool,
}

/// Per-row quantities shared by the likelihood, score and Hessian.
struct MixtureTerms {
    w: Mat<f64>,
    llf_main: Mat<f64>,
    llf: Mat<f64>,
}

impl ZeroInflatedPoisson {
    /// Build a zero-inflated Poisson model from validated inputs.
    ///
    /// A missing inflation design becomes an intercept column; offset and
    /// `ln(exposure)` are folded into the count model's linear predictor.
    ///
    /// # Errors
    ///
    /// Returns `ZeroInflatedError::Input` if the inputs are malformed.
    ///
    /// # Examples
    ///
    /// ```
    /// use faer::Mat;
    /// use zero_inflated_models::{CountModelInput, ZeroInflatedPoisson};
    ///
    /// let y = Mat::from_fn(5, 1, |i, _| [0.0, 0.0, 1.0, 2.0, 5.0][i]);
    /// let x = Mat::from_fn(5, 1, |_i, _j| 1.0);
    /// let model = ZeroInflatedPoisson::from_input(&CountModelInput::new(x, y)).expect("model");
    ///
    /// assert_eq!(model.k_inflate(), 1);
    /// assert_eq!(model.k_params(), 2);
    /// ```
    pub fn from_input(input: &CountModelInput) -> Result<Self, ZeroInflatedError> {
        input.validate()?;
        let count = PoissonSubmodel::new(
            input.design_matrix.clone(),
            input.outcome.clone(),
            input.combined_offset(),
        );
        let inflation = LogitInflation::new(input.inflation_design_or_intercept());
        let mut model = Self::new(count, inflation);
        model.default_inflation = input.inflation_design.is_none();
        Ok(model)
    }
}

impl<C: CountSubmodel> ZeroInflatedModel<C> {
    /// Combine a count process and an inflation process over the same rows.
    ///
    /// Row counts must already agree; use an input container's `validate`
    /// for user-supplied arrays.
    #[must_use]
    pub fn new(count: C, inflation: LogitInflation) -> Self {
        let partition = Partition::from_outcome(count.outcome());
        Self {
            inflation,
            count,
            partition,
            default_inflation: false,
        }
    }

    #[must_use]
    pub const fn count(&self) -> &C {
        &self.count
    }

    #[must_use]
    pub const fn inflation(&self) -> &LogitInflation {
        &self.inflation
    }

    #[must_use]
    pub const fn partition(&self) -> &Partition {
        &self.partition
    }

    /// True if the inflation design is the implicit intercept column.
    #[must_use]
    pub const fn has_default_inflation(&self) -> bool {
        self.default_inflation
    }

    #[must_use]
    pub fn k_inflate(&self) -> usize {
        self.inflation.k_inflate()
    }

    #[must_use]
    pub fn k_exog(&self) -> usize {
        self.count.k_exog()
    }

    #[must_use]
    pub fn k_params(&self) -> usize {
        self.k_inflate() + self.k_exog()
    }

    #[must_use]
    pub fn nobs(&self) -> usize {
        self.count.nobs()
    }

    /// Split `[inflation, count]` parameters into their two blocks.
    ///
    /// # Errors
    ///
    /// Returns `ZeroInflatedError::ParameterLength` if the length is not `k_params`.
    pub fn split_params(&self, params: &Mat<f64>) -> Result<(Mat<f64>, Mat<f64>), ZeroInflatedError> {
        split_params(params, self.k_inflate(), self.k_exog())
    }

    /// Structural-zero probabilities `w` at `params`.
    ///
    /// # Errors
    ///
    /// Returns `ZeroInflatedError::ParameterLength` on a malformed parameter vector.
    pub fn inflation_probabilities(&self, params: &Mat<f64>) -> Result<Mat<f64>, ZeroInflatedError> {
        let (params_infl, _) = self.split_params(params)?;
        Ok(self.inflation.predict(&params_infl))
    }

    /// Per-observation mixture log-likelihood.
    ///
    /// # Errors
    ///
    /// Returns `ZeroInflatedError::ParameterLength` on a malformed parameter vector.
    pub fn loglikeobs(&self, params: &Mat<f64>) -> Result<Mat<f64>, ZeroInflatedError> {
        let (params_infl, params_main) = self.split_params(params)?;
        Ok(self.mixture_terms(&params_infl, &params_main).llf)
    }

    /// Total mixture log-likelihood.
    ///
    /// # Errors
    ///
    /// Returns `ZeroInflatedError::ParameterLength` on a malformed parameter vector.
    pub fn loglike(&self, params: &Mat<f64>) -> Result<f64, ZeroInflatedError> {
        let llf = self.loglikeobs(params)?;
        Ok((0..llf.nrows()).map(|i| llf[(i, 0)]).sum())
    }

    /// Analytic gradient of the log-likelihood, ordered `[inflation, count]`.
    ///
    /// # Errors
    ///
    /// Returns `ZeroInflatedError::ParameterLength` on a malformed parameter vector.
    pub fn score(&self, params: &Mat<f64>) -> Result<Mat<f64>, ZeroInflatedError> {
        let (params_infl, params_main) = self.split_params(params)?;
        let MixtureTerms { w, llf_main, llf } = self.mixture_terms(&params_infl, &params_main);
        let score_main = self.count.score_obs(&params_main);
        let zero = &self.partition.zero_idx;
        let nonzero = &self.partition.nonzero_idx;

        // Count block: zero rows are damped by P(not a structural zero | y = 0).
        let k_exog = self.k_exog();
        let mut dldp = Mat::<f64>::zeros(k_exog, 1);
        for &row in zero {
            let damping = 1.0 - w[(row, 0)] / llf[(row, 0)].exp();
            for j in 0..k_exog {
                dldp[(j, 0)] += score_main[(row, j)] * damping;
            }
        }
        for &row in nonzero {
            for j in 0..k_exog {
                dldp[(j, 0)] += score_main[(row, j)];
            }
        }

        let z = self.inflation.design();
        let dldw_zero = rows_transpose_mul(z, zero, |row| {
            let wi = w[(row, 0)];
            wi * (1.0 - wi) * (1.0 - llf_main[(row, 0)].exp()) / llf[(row, 0)].exp()
        });
        let dldw_nonzero = rows_transpose_mul(z, nonzero, |row| w[(row, 0)]);

        let k_infl = self.k_inflate();
        Ok(Mat::from_fn(k_infl + k_exog, 1, |i, _| {
            if i < k_infl {
                dldw_zero[(i, 0)] - dldw_nonzero[(i, 0)]
            } else {
                dldp[(i - k_infl, 0)]
            }
        }))
    }

    /// Hessian of the log-likelihood, ordered `[inflation, count]`.
    ///
    /// Uses the count family's closed form when it has one, otherwise a
    /// finite-difference approximation of [`Self::loglike`].
    ///
    /// # Errors
    ///
    /// Returns `ZeroInflatedError::ParameterLength` on a malformed parameter vector.
    pub fn hessian(&self, params: &Mat<f64>) -> Result<Mat<f64>, ZeroInflatedError> {
        let (params_infl, params_main) = self.split_params(params)?;
        let w = self.inflation.predict(&params_infl);
        let terms = InflationTerms {
            design: self.inflation.design(),
            w: &w,
            partition: &self.partition,
        };
        match self.count.mixture_hessian(&params_main, terms) {
            Some(hessian) => Ok(hessian),
            None => self.numerical_hessian(params),
        }
    }

    /// Finite-difference Hessian of [`Self::loglike`].
    ///
    /// Second differences with step `eps^(1/4) * max(|theta_i|, 0.1)`; the lower
    /// triangle is evaluated and mirrored.
    ///
    /// # Errors
    ///
    /// Returns `ZeroInflatedError::ParameterLength` on a malformed parameter vector.
    pub fn numerical_hessian(&self, params: &Mat<f64>) -> Result<Mat<f64>, ZeroInflatedError> {
        let k = self.k_params();
        if params.nrows() != k {
            return Err(ZeroInflatedError::ParameterLength {
                expected: k,
                found: params.nrows(),
            });
        }
        let steps: Vec<f64> = (0..k)
            .map(|i| f64::EPSILON.powf(0.25) * params[(i, 0)].abs().max(0.1))
            .collect();
        let shifted = |i: usize, si: f64, j: usize, sj: f64| -> Result<f64, ZeroInflatedError> {
            let mut point = params.clone();
            point[(i, 0)] += si * steps[i];
            point[(j, 0)] += sj * steps[j];
            self.loglike(&point)
        };

        let mut hess = Mat::<f64>::zeros(k, k);
        for i in 0..k {
            for j in 0..=i {
                let value = shifted(i, 1.0, j, 1.0)? - shifted(i, 1.0, j, -1.0)?
                    - shifted(i, -1.0, j, 1.0)?
                    + shifted(i, -1.0, j, -1.0)?;
                hess[(i, j)] = value / (4.0 * steps[i] * steps[j]);
            }
        }
        mirror_lower_triangle(&mut hess);
        Ok(hess)
    }

    fn mixture_terms(&self, params_infl: &Mat<f64>, params_main: &Mat<f64>) -> MixtureTerms {
        let w = self.inflation.predict(params_infl);
        let llf_main = self.count.loglikeobs(params_main);
        let mut llf = Mat::<f64>::zeros(llf_main.nrows(), 1);
        for &row in &self.partition.zero_idx {
            let wi = w[(row, 0)];
            llf[(row, 0)] = (1.0 - wi).mul_add(llf_main[(row, 0)].exp(), wi).ln();
        }
        for &row in &self.partition.nonzero_idx {
            llf[(row, 0)] = (-w[(row, 0)]).ln_1p() + llf_main[(row, 0)];
        }
        MixtureTerms { w, llf_main, llf }
    }
}

/// Split `[inflation, count]` parameters given the block sizes.
///
/// # Errors
///
/// Returns `ZeroInflatedError::ParameterLength` if `params` does not have
/// `k_inflate + k_exog` rows.
pub fn split_params(
    params: &Mat<f64>,
    k_inflate: usize,
    k_exog: usize,
) -> Result<(Mat<f64>, Mat<f64>), ZeroInflatedError> {
    let expected = k_inflate + k_exog;
    if params.nrows() != expected || params.ncols() != 1 {
        return Err(ZeroInflatedError::ParameterLength {
            expected,
            found: params.nrows() * params.ncols(),
        });
    }
    let params_infl = Mat::from_fn(k_inflate, 1, |i, _| params[(i, 0)]);
    let params_main = Mat::from_fn(k_exog, 1, |i, _| params[(k_inflate + i, 0)]);
    Ok((params_infl, params_main))
}
