//! # Count submodel interface
//!
//! The mixture engine only talks to the count process through
//! [`CountSubmodel`]. Every operation works per observation, because the
//! mixture needs each row's log-density before anything is summed.
//!
//! Poisson is the only family implemented. A negative binomial or
//! generalized Poisson family would implement the same trait; families
//! without a closed-form mixture Hessian leave
//! [`CountSubmodel::mixture_hessian`] at its default and the engine falls
//! back to finite differences.

use faer::Mat;

use crate::models::poisson::{PoissonFitOptions, fit_poisson};
use crate::models::zero_inflated::{Partition, ZeroInflatedError};

/// Inflation-side quantities that a closed-form mixture Hessian needs.
#[derive(Debug, Clone, Copy)]
pub struct InflationTerms<'a> {
    /// Inflation design matrix (`n x k_inflate`).
    pub design: &'a Mat<f64>,
    /// Structural-zero probabilities at the current parameters.
    pub w: &'a Mat<f64>,
    /// Zero / nonzero row partition of the outcome.
    pub partition: &'a Partition,
}

/// Count-generating process of a zero-inflated mixture.
pub trait CountSubmodel: Send + Sync {
    /// Short family name, e.g. `"poisson"`.
    fn family(&self) -> &'static str;

    /// Count design matrix (`n x k_exog`).
    fn design(&self) -> &Mat<f64>;

    /// Observed counts (`n x 1`).
    fn outcome(&self) -> &Mat<f64>;

    /// Number of count-model coefficients.
    fn k_exog(&self) -> usize {
        self.design().ncols()
    }

    fn nobs(&self) -> usize {
        self.outcome().nrows()
    }

    /// Per-observation log-density (`n x 1`).
    fn loglikeobs(&self, params_main: &Mat<f64>) -> Mat<f64>;

    /// Per-observation gradient rows (`n x k_exog`).
    fn score_obs(&self, params_main: &Mat<f64>) -> Mat<f64>;

    /// Mean of the count process (`n x 1`).
    fn predict(&self, params_main: &Mat<f64>) -> Mat<f64>;

    /// Count coefficients from a fit that ignores inflation.
    ///
    /// Defaults to a plain Poisson regression without offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the warm-start regression fails.
    fn warm_start(&self) -> Result<Mat<f64>, ZeroInflatedError> {
        let offset = Mat::zeros(self.nobs(), 1);
        fit_poisson(self.design(), self.outcome(), &offset, PoissonFitOptions::default())
            .map(|(beta, _)| beta)
    }

    /// Closed-form Hessian of the full mixture log-likelihood, ordered
    /// `[inflation, count]`, if this family provides one.
    fn mixture_hessian(
        &self,
        _params_main: &Mat<f64>,
        _inflation: InflationTerms<'_>,
    ) -> Option<Mat<f64>> {
        None
    }
}
