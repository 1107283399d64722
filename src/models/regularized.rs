//! # L1-regularized fitting
//!
//! Minimizes `-loglike(theta) + sum_j alpha_j |theta_j|` by proximal
//! gradient steps with backtracking, starting from the same warm start as
//! the unpenalized fit. After the solve:
//!
//! - a quality check compares each score component with its penalty weight,
//! - small parameters are trimmed to exactly zero (`auto` or `size` mode),
//! - the covariance is computed on the untrimmed parameters only.

use std::fmt;
use std::str::FromStr;

use faer::Mat;
use log::{debug, warn};

use crate::models::count::CountSubmodel;
use crate::models::mle::{covariance_from_hessian, start_params};
use crate::models::results::{EstimationKind, RegularizedSummary, ZeroInflatedResults};
use crate::models::zero_inflated::{ZeroInflatedError, ZeroInflatedModel};

const MIN_STEP: f64 = 1e-20;

/// Penalty method identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PenaltyMethod {
    L1,
}

impl PenaltyMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::L1 => "l1",
        }
    }
}

impl fmt::Display for PenaltyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PenaltyMethod {
    type Err = ZeroInflatedError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "l1" => Ok(Self::L1),
            _ => Err(ZeroInflatedError::UnsupportedRegularizationMethod(value.to_string())),
        }
    }
}

/// How parameters are set to exactly zero after the solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrimMode {
    Off,
    /// Trim where the score is clearly inside the penalty bound.
    #[default]
    Auto,
    /// Trim where the parameter is smaller than `size_trim_tol`.
    Size,
}

impl FromStr for TrimMode {
    type Err = ZeroInflatedError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "off" => Ok(Self::Off),
            "auto" => Ok(Self::Auto),
            "size" => Ok(Self::Size),
            _ => Err(ZeroInflatedError::UnsupportedTrimMode(value.to_string())),
        }
    }
}

/// Penalty weights applied to `[inflation, count]` parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum PenaltyWeights {
    /// Same weight on every parameter, intercepts included.
    Uniform(f64),
    PerParameter(Vec<f64>),
}

impl PenaltyWeights {
    /// Expand to one weight per parameter.
    ///
    /// # Errors
    ///
    /// Returns `ZeroInflatedError::InvalidPenaltyWeights` on a length mismatch or
    /// a negative or non-finite weight.
    pub fn resolve(&self, k_params: usize) -> Result<Vec<f64>, ZeroInflatedError> {
        let weights = match self {
            Self::Uniform(alpha) => vec![*alpha; k_params],
            Self::PerParameter(alpha) => alpha.clone(),
        };
        if weights.len() != k_params || weights.iter().any(|a| !a.is_finite() || *a < 0.0) {
            return Err(ZeroInflatedError::InvalidPenaltyWeights);
        }
        Ok(weights)
    }
}

/// Options for L1-regularized fitting.
#[derive(Debug, Clone)]
pub struct RegularizedOptions {
    pub alpha: PenaltyWeights,
    pub trim_mode: TrimMode,
    pub auto_trim_tol: f64,
    pub size_trim_tol: f64,
    /// Relative tolerance of the optimality check.
    pub qc_tol: f64,
    pub max_iter: usize,
    /// Stop when no parameter moves by more than this.
    pub tolerance: f64,
    /// Explicit start values ordered `[inflation, count]`.
    pub start_params: Option<Mat<f64>>,
}

impl Default for RegularizedOptions {
    fn default() -> Self {
        Self {
            alpha: PenaltyWeights::Uniform(0.0),
            trim_mode: TrimMode::Auto,
            auto_trim_tol: 0.01,
            size_trim_tol: 1e-4,
            qc_tol: 0.03,
            max_iter: 1000,
            tolerance: 1e-8,
            start_params: None,
        }
    }
}

/// Fit an L1-penalized zero-inflated model.
///
/// `method` is checked before anything else; only `"l1"` is accepted.
///
/// # Errors
///
/// Returns `ZeroInflatedError::UnsupportedRegularizationMethod` for any other
/// method, `InvalidPenaltyWeights` for malformed weights, and
/// `ParameterLength` for malformed start values.
///
/// # Examples
///
/// ```
/// use faer::Mat;
/// use zero_inflated_models::{
///     CountModelInput, RegularizedOptions, ZeroInflatedError, ZeroInflatedPoisson,
///     fit_regularized,
/// };
///
/// let y = Mat::from_fn(5, 1, |i, _| [0.0, 0.0, 1.0, 2.0, 5.0][i]);
/// let x = Mat::from_fn(5, 1, |_i, _j| 1.0);
/// let model = ZeroInflatedPoisson::from_input(&CountModelInput::new(x, y)).expect("model");
///
/// let err = fit_regularized(&model, "l2", &RegularizedOptions::default())
///     .expect_err("only l1 is supported");
/// assert!(matches!(err, ZeroInflatedError::UnsupportedRegularizationMethod(m) if m == "l2"));
/// ```
pub fn fit_regularized<C: CountSubmodel>(
    model: &ZeroInflatedModel<C>,
    method: &str,
    options: &RegularizedOptions,
) -> Result<ZeroInflatedResults, ZeroInflatedError> {
    let penalty = method.parse::<PenaltyMethod>()?;
    let k = model.k_params();
    let alpha = options.alpha.resolve(k)?;
    let start = match &options.start_params {
        Some(start) => {
            model.split_params(start)?;
            start.clone()
        }
        None => start_params(model),
    };

    let solution = proximal_gradient(model, &start, &alpha, options)?;
    if !solution.converged {
        warn!(
            "{penalty} fit did not converge after {} iterations",
            solution.iterations
        );
    }

    let mut params = solution.params;
    let score = model.score(&params)?;
    let qc_passed = quality_check(&score, &alpha, options.qc_tol);
    if !qc_passed {
        warn!("{penalty} solution failed the optimality check (qc_tol = {})", options.qc_tol);
    }

    let trimmed = trim_mask(&params, &score, &alpha, options);
    for (j, &trim) in trimmed.iter().enumerate() {
        if trim {
            params[(j, 0)] = 0.0;
        }
    }
    debug!(
        "{penalty} fit trimmed {} of {k} parameters",
        trimmed.iter().filter(|&&t| t).count()
    );

    let loglike = model.loglike(&params)?;
    let cov = restricted_covariance(&model.hessian(&params)?, &trimmed);

    Ok(ZeroInflatedResults {
        params,
        cov,
        loglike,
        k_inflate: model.k_inflate(),
        k_exog: model.k_exog(),
        nobs: model.nobs(),
        method: penalty.to_string(),
        iterations: solution.iterations,
        converged: solution.converged,
        message: solution.message,
        kind: EstimationKind::Regularized(RegularizedSummary {
            alpha,
            trimmed,
            qc_passed,
        }),
    })
}

struct ProximalSolution {
    params: Mat<f64>,
    iterations: usize,
    converged: bool,
    message: String,
}

fn proximal_gradient<C: CountSubmodel>(
    model: &ZeroInflatedModel<C>,
    start: &Mat<f64>,
    alpha: &[f64],
    options: &RegularizedOptions,
) -> Result<ProximalSolution, ZeroInflatedError> {
    let k = start.nrows();
    let mut params = start.clone();
    let mut step = 1.0_f64;

    for iteration in 1..=options.max_iter {
        let smooth = -model.loglike(&params)?;
        let score = model.score(&params)?;

        let (candidate, candidate_smooth) = loop {
            let candidate = Mat::from_fn(k, 1, |j, _| {
                soft_threshold(step.mul_add(score[(j, 0)], params[(j, 0)]), step * alpha[j])
            });
            let candidate_smooth = -model.loglike(&candidate)?;
            // Sufficient decrease of the quadratic upper bound.
            let mut bound = smooth;
            for j in 0..k {
                let diff = candidate[(j, 0)] - params[(j, 0)];
                bound += -score[(j, 0)] * diff + diff * diff / (2.0 * step);
            }
            if candidate_smooth.is_finite() && candidate_smooth <= bound {
                break (candidate, candidate_smooth);
            }
            step *= 0.5;
            if step < MIN_STEP {
                return Ok(ProximalSolution {
                    params,
                    iterations: iteration,
                    converged: false,
                    message: "step size underflow".to_string(),
                });
            }
        };

        let change = (0..k).fold(0.0f64, |acc, j| {
            acc.max((candidate[(j, 0)] - params[(j, 0)]).abs())
        });
        debug!(
            "l1 iteration {iteration}: penalized objective = {:.6}, step = {step:.3e}",
            penalized_objective(candidate_smooth, &candidate, alpha)
        );
        params = candidate;
        if change < options.tolerance {
            return Ok(ProximalSolution {
                params,
                iterations: iteration,
                converged: true,
                message: "parameter change below tolerance".to_string(),
            });
        }
        step *= 1.5;
    }

    Ok(ProximalSolution {
        params,
        iterations: options.max_iter,
        converged: false,
        message: "maximum number of iterations reached".to_string(),
    })
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        value - threshold
    } else if value < -threshold {
        value + threshold
    } else {
        0.0
    }
}

fn penalized_objective(smooth: f64, params: &Mat<f64>, alpha: &[f64]) -> f64 {
    smooth
        + alpha
            .iter()
            .enumerate()
            .map(|(j, a)| a * params[(j, 0)].abs())
            .sum::<f64>()
}

/// At an L1 optimum `|score_j| <= alpha_j`; fail if any exceeds it by more than `qc_tol`.
fn quality_check(score: &Mat<f64>, alpha: &[f64], qc_tol: f64) -> bool {
    alpha
        .iter()
        .enumerate()
        .filter(|(_, a)| **a > 0.0)
        .all(|(j, a)| (score[(j, 0)].abs() - a) / a <= qc_tol)
}

fn trim_mask(
    params: &Mat<f64>,
    score: &Mat<f64>,
    alpha: &[f64],
    options: &RegularizedOptions,
) -> Vec<bool> {
    match options.trim_mode {
        TrimMode::Off => vec![false; alpha.len()],
        TrimMode::Auto => alpha
            .iter()
            .enumerate()
            .map(|(j, &a)| a > 0.0 && (a - score[(j, 0)].abs()) / a > options.auto_trim_tol)
            .collect(),
        TrimMode::Size => (0..alpha.len())
            .map(|j| params[(j, 0)].abs() < options.size_trim_tol)
            .collect(),
    }
}

/// Covariance of the untrimmed parameters; trimmed rows and columns are NaN.
fn restricted_covariance(hessian: &Mat<f64>, trimmed: &[bool]) -> Option<Mat<f64>> {
    let kept: Vec<usize> = (0..trimmed.len()).filter(|&j| !trimmed[j]).collect();
    let k = trimmed.len();
    if kept.is_empty() {
        return Some(Mat::from_fn(k, k, |_, _| f64::NAN));
    }
    let sub = Mat::from_fn(kept.len(), kept.len(), |a, b| hessian[(kept[a], kept[b])]);
    let sub_cov = covariance_from_hessian(&sub)?;
    let mut position = vec![None; k];
    for (a, &j) in kept.iter().enumerate() {
        position[j] = Some(a);
    }
    Some(Mat::from_fn(k, k, |i, j| match (position[i], position[j]) {
        (Some(a), Some(b)) => sub_cov[(a, b)],
        _ => f64::NAN,
    }))
}
