//! # Fit results
//!
//! A single results value for standard and L1-regularized fits. The
//! estimation kind is a tag rather than a separate result type; it decides
//! how degrees of freedom are counted and which entries of the covariance
//! are defined.

use faer::Mat;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::models::zero_inflated::{ZeroInflatedError, split_params};
use crate::utils::usize_to_f64;

/// Confidence interval for a coefficient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

/// Information criteria values for a fitted model.
#[derive(Debug, Clone, Copy)]
pub struct InformationCriteria {
    pub loglik: f64,
    pub aic: f64,
    pub bic: f64,
}

/// Penalty and trimming outcome of an L1-regularized fit.
#[derive(Debug, Clone)]
pub struct RegularizedSummary {
    /// Per-parameter penalty weights.
    pub alpha: Vec<f64>,
    /// Parameters set exactly to zero by trimming.
    pub trimmed: Vec<bool>,
    /// Whether the optimality check on the penalized problem passed.
    pub qc_passed: bool,
}

impl RegularizedSummary {
    #[must_use]
    pub fn n_trimmed(&self) -> usize {
        self.trimmed.iter().filter(|&&t| t).count()
    }
}

/// How the parameters were estimated.
#[derive(Debug, Clone)]
pub enum EstimationKind {
    Standard,
    Regularized(RegularizedSummary),
}

/// Fitted zero-inflated model.
///
/// Parameters are ordered `[inflation, count]`. `cov` is the inverse of the
/// negative Hessian at the optimum, or `None` when that matrix could not be
/// inverted.
#[derive(Debug, Clone)]
pub struct ZeroInflatedResults {
    pub params: Mat<f64>,
    pub cov: Option<Mat<f64>>,
    pub loglike: f64,
    pub k_inflate: usize,
    pub k_exog: usize,
    pub nobs: usize,
    /// Name of the optimizer that produced the estimate.
    pub method: String,
    pub iterations: usize,
    pub converged: bool,
    /// Optimizer termination message.
    pub message: String,
    pub kind: EstimationKind,
}

impl ZeroInflatedResults {
    /// Inflation-model coefficients.
    #[must_use]
    pub fn params_inflation(&self) -> Mat<f64> {
        Mat::from_fn(self.k_inflate, 1, |i, _| self.params[(i, 0)])
    }

    /// Count-model coefficients.
    #[must_use]
    pub fn params_count(&self) -> Mat<f64> {
        Mat::from_fn(self.k_exog, 1, |i, _| self.params[(self.k_inflate + i, 0)])
    }

    /// Split the parameter vector into `(inflation, count)` blocks.
    ///
    /// # Errors
    ///
    /// Returns `ZeroInflatedError::ParameterLength` if the stored vector is inconsistent.
    pub fn split_params(&self) -> Result<(Mat<f64>, Mat<f64>), ZeroInflatedError> {
        split_params(&self.params, self.k_inflate, self.k_exog)
    }

    #[must_use]
    pub const fn is_regularized(&self) -> bool {
        matches!(self.kind, EstimationKind::Regularized(_))
    }

    /// Number of freely estimated parameters; trimmed parameters do not count.
    #[must_use]
    pub fn n_estimated(&self) -> usize {
        match &self.kind {
            EstimationKind::Standard => self.params.nrows(),
            EstimationKind::Regularized(summary) => self.params.nrows() - summary.n_trimmed(),
        }
    }

    /// Standard errors from the covariance diagonal.
    #[must_use]
    pub fn bse(&self) -> Option<Mat<f64>> {
        self.cov
            .as_ref()
            .map(|cov| Mat::from_fn(cov.nrows(), 1, |i, _| standard_error(cov[(i, i)])))
    }

    /// Wald intervals at level `1 - alpha`.
    #[must_use]
    pub fn conf_int(&self, alpha: f64) -> Option<Vec<ConfidenceInterval>> {
        self.cov
            .as_ref()
            .map(|cov| coefficient_confidence_intervals(&self.params, cov, alpha))
    }

    #[must_use]
    pub fn information_criteria(&self) -> InformationCriteria {
        compute_information_criteria(self.loglike, self.n_estimated(), self.nobs)
    }

    /// Fail unless the optimizer reported convergence.
    ///
    /// # Errors
    ///
    /// Returns `ZeroInflatedError::NonConvergence` if the fit did not converge.
    pub fn ensure_converged(&self) -> Result<&Self, ZeroInflatedError> {
        if self.converged {
            Ok(self)
        } else {
            Err(ZeroInflatedError::NonConvergence {
                iterations: self.iterations,
            })
        }
    }
}

/// Compute Wald confidence intervals for coefficients.
#[must_use]
pub fn coefficient_confidence_intervals(
    params: &Mat<f64>,
    cov: &Mat<f64>,
    alpha: f64,
) -> Vec<ConfidenceInterval> {
    let z = normal_quantile(1.0 - alpha / 2.0);
    (0..params.nrows())
        .map(|i| {
            let se = standard_error(cov[(i, i)]);
            ConfidenceInterval {
                lower: params[(i, 0)] - z * se,
                upper: params[(i, 0)] + z * se,
            }
        })
        .collect()
}

/// Compute AIC/BIC for a given log-likelihood, parameter count, and sample size.
#[must_use]
pub fn compute_information_criteria(loglik: f64, k: usize, n: usize) -> InformationCriteria {
    let k_f = usize_to_f64(k);
    let aic = (-2.0f64).mul_add(loglik, 2.0 * k_f);
    let bic = if n > 1 {
        (-2.0f64).mul_add(loglik, usize_to_f64(n).ln() * k_f)
    } else {
        f64::NAN
    };
    InformationCriteria { loglik, aic, bic }
}

/// Negative round-off variances map to zero; NaN (trimmed parameters) stays NaN.
fn standard_error(variance: f64) -> f64 {
    if variance < 0.0 {
        0.0
    } else {
        variance.sqrt()
    }
}

fn normal_quantile(p: f64) -> f64 {
    Normal::new(0.0, 1.0).map_or(f64::NAN, |normal| normal.inverse_cdf(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_results(converged: bool, kind: EstimationKind) -> ZeroInflatedResults {
        ZeroInflatedResults {
            params: Mat::from_fn(3, 1, |i, _| [-0.5, 0.2, 1.0][i]),
            cov: Some(Mat::from_fn(3, 3, |i, j| if i == j { 0.04 } else { 0.0 })),
            loglike: -10.0,
            k_inflate: 1,
            k_exog: 2,
            nobs: 20,
            method: "bfgs".to_string(),
            iterations: 7,
            converged,
            message: String::new(),
            kind,
        }
    }

    #[test]
    fn blocks_follow_inflation_then_count_order() {
        let results = sample_results(true, EstimationKind::Standard);
        assert_relative_eq!(results.params_inflation()[(0, 0)], -0.5);
        assert_relative_eq!(results.params_count()[(1, 0)], 1.0);
        let (infl, main) = results.split_params().expect("split");
        assert_eq!(infl.nrows(), 1);
        assert_eq!(main.nrows(), 2);
    }

    #[test]
    fn wald_interval_uses_normal_quantile() {
        let results = sample_results(true, EstimationKind::Standard);
        let intervals = results.conf_int(0.05).expect("intervals");
        let half_width = 1.959_963_984_540_054 * 0.2;
        assert_relative_eq!(intervals[2].lower, 1.0 - half_width, epsilon = 1e-6);
        assert_relative_eq!(intervals[2].upper, 1.0 + half_width, epsilon = 1e-6);
        assert_relative_eq!(results.bse().expect("bse")[(0, 0)], 0.2, epsilon = 1e-12);
    }

    #[test]
    fn information_criteria_count_only_untrimmed_parameters() {
        let standard = sample_results(true, EstimationKind::Standard);
        assert_relative_eq!(standard.information_criteria().aic, 26.0);

        let regularized = sample_results(
            true,
            EstimationKind::Regularized(RegularizedSummary {
                alpha: vec![1.0; 3],
                trimmed: vec![false, true, false],
                qc_passed: true,
            }),
        );
        assert!(regularized.is_regularized());
        assert_eq!(regularized.n_estimated(), 2);
        assert_relative_eq!(regularized.information_criteria().aic, 24.0);
        assert_relative_eq!(
            regularized.information_criteria().bic,
            20.0 + 20.0f64.ln() * 2.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn ensure_converged_reports_iterations() {
        let results = sample_results(false, EstimationKind::Standard);
        let err = results.ensure_converged().expect_err("not converged");
        assert!(matches!(err, ZeroInflatedError::NonConvergence { iterations: 7 }));
        assert!(sample_results(true, EstimationKind::Standard).ensure_converged().is_ok());
    }

    #[test]
    fn trimmed_parameters_keep_nan_standard_errors() {
        let mut results = sample_results(true, EstimationKind::Standard);
        if let Some(cov) = results.cov.as_mut() {
            cov[(1, 1)] = f64::NAN;
        }
        let bse = results.bse().expect("bse");
        assert!(bse[(0, 0)].is_finite());
        assert!(bse[(1, 0)].is_nan());
    }

    #[test]
    fn missing_covariance_has_no_intervals() {
        let mut results = sample_results(true, EstimationKind::Standard);
        results.cov = None;
        assert!(results.bse().is_none());
        assert!(results.conf_int(0.05).is_none());
    }
}
