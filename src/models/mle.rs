//! # Maximum-likelihood driver
//!
//! Maximizes the mixture log-likelihood from a warm start.
//!
//! - Start values: the count family's plain regression for the count block,
//!   zeros for the inflation block.
//! - `newton`: Newton-Raphson on the analytic score and Hessian with step
//!   halving.
//! - `bfgs` / `lbfgs`: quasi-Newton minimization of the negative
//!   log-likelihood through `argmin` with a More-Thuente line search.
//!
//! The covariance of the estimate is the inverse of the negative Hessian at
//! the optimum.

use std::fmt;
use std::str::FromStr;

use argmin::core::{
    CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus,
};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::{BFGS, LBFGS};
use faer::Mat;
use log::{debug, warn};

use crate::input::CountModelInput;
use crate::models::count::CountSubmodel;
use crate::models::results::{EstimationKind, ZeroInflatedResults};
use crate::models::zero_inflated::{ZeroInflatedError, ZeroInflatedModel, ZeroInflatedPoisson};
use crate::utils::{column_from_slice, column_to_vec, max_abs, max_abs_diff, solve_linear_system};

const MAX_STEP_HALVINGS: usize = 30;

/// Optimization method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MleMethod {
    /// Newton-Raphson with the analytic Hessian.
    Newton,
    #[default]
    Bfgs,
    Lbfgs,
}

impl MleMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Newton => "newton",
            Self::Bfgs => "bfgs",
            Self::Lbfgs => "lbfgs",
        }
    }
}

impl fmt::Display for MleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MleMethod {
    type Err = ZeroInflatedError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "newton" => Ok(Self::Newton),
            "bfgs" => Ok(Self::Bfgs),
            "lbfgs" | "l-bfgs" => Ok(Self::Lbfgs),
            _ => Err(ZeroInflatedError::UnsupportedOptimizerMethod(value.to_string())),
        }
    }
}

/// Options for maximum-likelihood fitting.
#[derive(Debug, Clone)]
pub struct MleOptions {
    pub method: MleMethod,
    /// Maximum number of optimizer iterations.
    pub max_iter: usize,
    /// Newton stops when no coefficient moves by more than this.
    pub tolerance: f64,
    /// Every method stops once the largest score component is below this.
    pub gradient_tolerance: f64,
    /// Number of correction pairs kept by L-BFGS.
    pub lbfgs_memory: usize,
    /// Explicit start values ordered `[inflation, count]`.
    pub start_params: Option<Mat<f64>>,
}

impl Default for MleOptions {
    fn default() -> Self {
        Self {
            method: MleMethod::Bfgs,
            max_iter: 35,
            tolerance: 1e-8,
            gradient_tolerance: 1e-5,
            lbfgs_memory: 10,
            start_params: None,
        }
    }
}

/// Raw optimizer output before it is turned into results.
#[derive(Debug, Clone)]
pub struct OptimizerOutcome {
    pub params: Mat<f64>,
    pub iterations: usize,
    pub converged: bool,
    pub message: String,
}

/// Start values: warm-started count block, zero inflation block.
///
/// If the count warm start fails, the count block also starts at zero and a
/// warning is logged.
#[must_use]
pub fn start_params<C: CountSubmodel>(model: &ZeroInflatedModel<C>) -> Mat<f64> {
    let k_infl = model.k_inflate();
    let k_exog = model.k_exog();
    let params_main = match model.count().warm_start() {
        Ok(beta) => {
            debug!(
                "{} warm start for {k_exog} count coefficients succeeded",
                model.count().family()
            );
            beta
        }
        Err(err) => {
            warn!("count warm start failed ({err}); starting count coefficients at zero");
            Mat::zeros(k_exog, 1)
        }
    };
    Mat::from_fn(k_infl + k_exog, 1, |i, _| {
        if i < k_infl {
            0.0
        } else {
            params_main[(i - k_infl, 0)]
        }
    })
}

/// Fit a zero-inflated model by maximum likelihood.
///
/// Non-convergence is reported through `converged` on the results; use
/// [`ZeroInflatedResults::ensure_converged`] to turn it into an error.
///
/// # Errors
///
/// Returns `ZeroInflatedError` if explicit start values have the wrong
/// length or the optimizer fails outright.
pub fn fit<C: CountSubmodel>(
    model: &ZeroInflatedModel<C>,
    options: &MleOptions,
) -> Result<ZeroInflatedResults, ZeroInflatedError> {
    let start = match &options.start_params {
        Some(start) => {
            model.split_params(start)?;
            start.clone()
        }
        None => start_params(model),
    };

    let outcome = maximize(model, &start, options)?;
    if !outcome.converged {
        warn!(
            "{} did not converge after {} iterations: {}",
            options.method, outcome.iterations, outcome.message
        );
    }

    let loglike = model.loglike(&outcome.params)?;
    let cov = covariance_from_hessian(&model.hessian(&outcome.params)?);

    Ok(ZeroInflatedResults {
        params: outcome.params,
        cov,
        loglike,
        k_inflate: model.k_inflate(),
        k_exog: model.k_exog(),
        nobs: model.nobs(),
        method: options.method.to_string(),
        iterations: outcome.iterations,
        converged: outcome.converged,
        message: outcome.message,
        kind: EstimationKind::Standard,
    })
}

/// Build a zero-inflated Poisson model from `input` and fit it.
///
/// # Errors
///
/// Returns `ZeroInflatedError` if inputs are malformed or fitting fails.
///
/// # Examples
///
/// ```
/// use faer::Mat;
/// use zero_inflated_models::{CountModelInput, MleOptions, fit_zero_inflated_poisson};
///
/// let y = Mat::from_fn(5, 1, |i, _| [0.0, 0.0, 1.0, 2.0, 5.0][i]);
/// let x = Mat::from_fn(5, 1, |_i, _j| 1.0);
/// let input = CountModelInput::new(x, y);
///
/// let results = fit_zero_inflated_poisson(&input, &MleOptions::default()).expect("fit");
/// assert_eq!(results.params.nrows(), 2);
/// assert!(results.loglike.is_finite());
/// ```
pub fn fit_zero_inflated_poisson(
    input: &CountModelInput,
    options: &MleOptions,
) -> Result<ZeroInflatedResults, ZeroInflatedError> {
    let model = ZeroInflatedPoisson::from_input(input)?;
    fit(&model, options)
}

/// Run the selected optimizer from `start`.
///
/// # Errors
///
/// Returns `ZeroInflatedError` if the parameter length is wrong or the
/// optimizer fails outright.
pub fn maximize<C: CountSubmodel>(
    model: &ZeroInflatedModel<C>,
    start: &Mat<f64>,
    options: &MleOptions,
) -> Result<OptimizerOutcome, ZeroInflatedError> {
    model.split_params(start)?;
    let mut outcome = match options.method {
        MleMethod::Newton => newton(model, start, options)?,
        MleMethod::Bfgs => bfgs(model, start, options)?,
        MleMethod::Lbfgs => lbfgs(model, start, options)?,
    };
    if !outcome.converged {
        let score = model.score(&outcome.params)?;
        if max_abs(&score) < options.gradient_tolerance {
            outcome.converged = true;
        }
    }
    debug!(
        "{} finished after {} iterations (converged = {})",
        options.method, outcome.iterations, outcome.converged
    );
    Ok(outcome)
}

/// Inverse of the negative Hessian, or `None` if it cannot be inverted.
#[must_use]
pub fn covariance_from_hessian(hessian: &Mat<f64>) -> Option<Mat<f64>> {
    let n = hessian.nrows();
    let information = Mat::from_fn(n, n, |i, j| -hessian[(i, j)]);
    let identity = Mat::<f64>::identity(n, n);
    match solve_linear_system(&information, &identity) {
        Ok(cov) => Some(cov),
        Err(err) => {
            warn!("covariance unavailable: negative Hessian could not be inverted ({err})");
            None
        }
    }
}

fn newton<C: CountSubmodel>(
    model: &ZeroInflatedModel<C>,
    start: &Mat<f64>,
    options: &MleOptions,
) -> Result<OptimizerOutcome, ZeroInflatedError> {
    let k = start.nrows();
    let mut params = start.clone();
    let mut loglike = model.loglike(&params)?;

    for iteration in 1..=options.max_iter {
        let score = model.score(&params)?;
        let grad_norm = max_abs(&score);
        if grad_norm < options.gradient_tolerance {
            return Ok(OptimizerOutcome {
                params,
                iterations: iteration - 1,
                converged: true,
                message: "gradient below tolerance".to_string(),
            });
        }

        let hessian = model.hessian(&params)?;
        let Ok(mut direction) = solve_linear_system(&hessian, &score) else {
            warn!("singular Hessian at Newton iteration {iteration}");
            return Ok(OptimizerOutcome {
                params,
                iterations: iteration,
                converged: false,
                message: "singular Hessian".to_string(),
            });
        };
        // Away from the optimum the Hessian can be indefinite; fall back to steepest ascent.
        let ascent: f64 = (0..k).map(|i| -score[(i, 0)] * direction[(i, 0)]).sum();
        let newton_step = ascent > 0.0;
        if !newton_step {
            debug!("Newton direction is not ascending at iteration {iteration}; using the gradient");
            direction = Mat::from_fn(k, 1, |i, _| -score[(i, 0)] / (1.0 + grad_norm));
        }

        let slack = 1e-10 * (1.0 + loglike.abs());
        let mut step = 1.0_f64;
        let mut accepted = None;
        for _ in 0..MAX_STEP_HALVINGS {
            let candidate = Mat::from_fn(k, 1, |i, _| step.mul_add(-direction[(i, 0)], params[(i, 0)]));
            let candidate_loglike = model.loglike(&candidate)?;
            if candidate_loglike.is_finite() && candidate_loglike >= loglike - slack {
                accepted = Some((candidate, candidate_loglike));
                break;
            }
            step *= 0.5;
        }
        let Some((candidate, candidate_loglike)) = accepted else {
            warn!("Newton step halving failed to improve the log-likelihood at iteration {iteration}");
            return Ok(OptimizerOutcome {
                params,
                iterations: iteration,
                converged: false,
                message: "step halving failed".to_string(),
            });
        };

        let change = max_abs_diff(&candidate, &params);
        debug!(
            "newton iteration {iteration}: loglike = {candidate_loglike:.6}, max |score| = {grad_norm:.3e}, step = {step}"
        );
        params = candidate;
        loglike = candidate_loglike;
        if newton_step && change < options.tolerance {
            return Ok(OptimizerOutcome {
                params,
                iterations: iteration,
                converged: true,
                message: "parameter change below tolerance".to_string(),
            });
        }
    }

    Ok(OptimizerOutcome {
        params,
        iterations: options.max_iter,
        converged: false,
        message: "maximum number of iterations reached".to_string(),
    })
}

/// Negative log-likelihood seen by `argmin`.
struct NegativeLogLikelihood<'a, C: CountSubmodel> {
    model: &'a ZeroInflatedModel<C>,
}

impl<C: CountSubmodel> CostFunction for NegativeLogLikelihood<'_, C> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        self.model
            .loglike(&column_from_slice(params))
            .map(|loglike| -loglike)
            .map_err(argmin_error)
    }
}

impl<C: CountSubmodel> Gradient for NegativeLogLikelihood<'_, C> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, params: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
        let score = self
            .model
            .score(&column_from_slice(params))
            .map_err(argmin_error)?;
        Ok((0..score.nrows()).map(|i| -score[(i, 0)]).collect())
    }
}

fn bfgs<C: CountSubmodel>(
    model: &ZeroInflatedModel<C>,
    start: &Mat<f64>,
    options: &MleOptions,
) -> Result<OptimizerOutcome, ZeroInflatedError> {
    let k = start.nrows();
    let inv_hessian: Vec<Vec<f64>> = (0..k)
        .map(|i| (0..k).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();
    let solver = BFGS::new(MoreThuenteLineSearch::new())
        .with_tolerance_grad(options.gradient_tolerance)
        .map_err(optimizer_error)?;
    let run = Executor::new(NegativeLogLikelihood { model }, solver)
        .configure(|state| {
            state
                .param(column_to_vec(start))
                .inv_hessian(inv_hessian)
                .max_iters(iteration_limit(options.max_iter))
        })
        .run()
        .map_err(optimizer_error)?;
    outcome_from_state(run.state())
}

fn lbfgs<C: CountSubmodel>(
    model: &ZeroInflatedModel<C>,
    start: &Mat<f64>,
    options: &MleOptions,
) -> Result<OptimizerOutcome, ZeroInflatedError> {
    let solver = LBFGS::new(MoreThuenteLineSearch::new(), options.lbfgs_memory)
        .with_tolerance_grad(options.gradient_tolerance)
        .map_err(optimizer_error)?;
    let run = Executor::new(NegativeLogLikelihood { model }, solver)
        .configure(|state| {
            state
                .param(column_to_vec(start))
                .max_iters(iteration_limit(options.max_iter))
        })
        .run()
        .map_err(optimizer_error)?;
    outcome_from_state(run.state())
}

fn outcome_from_state<S>(state: &S) -> Result<OptimizerOutcome, ZeroInflatedError>
where
    S: State<Param = Vec<f64>>,
{
    let best = state
        .get_best_param()
        .ok_or_else(|| ZeroInflatedError::Optimizer("no parameters returned".to_string()))?;
    let termination = state.get_termination_status();
    let converged = matches!(
        termination,
        TerminationStatus::Terminated(TerminationReason::SolverConverged)
    );
    Ok(OptimizerOutcome {
        params: column_from_slice(best),
        iterations: usize::try_from(state.get_iter()).unwrap_or(usize::MAX),
        converged,
        message: termination.to_string(),
    })
}

fn iteration_limit(max_iter: usize) -> u64 {
    u64::try_from(max_iter).unwrap_or(u64::MAX)
}

fn argmin_error(err: ZeroInflatedError) -> argmin::core::Error {
    argmin::core::Error::msg(err.to_string())
}

#[allow(clippy::needless_pass_by_value)]
fn optimizer_error(err: argmin::core::Error) -> ZeroInflatedError {
    ZeroInflatedError::Optimizer(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::inflation::logistic_stable;
    use crate::models::zipoisson::ZiPoisson;
    use approx::assert_relative_eq;
    use rand::prelude::*;

    fn simulate(n: usize, seed: u64) -> CountModelInput {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut x = Vec::with_capacity(n);
        let mut z = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        for _ in 0..n {
            let xi: f64 = rng.random_range(-1.0..1.0);
            let zi: f64 = rng.random_range(-1.0..1.0);
            let w = logistic_stable(zi.mul_add(1.2, -0.4));
            let mu = xi.mul_add(0.7, 0.8).exp();
            let draw = ZiPoisson::new(mu, w).expect("valid distribution").sample(&mut rng);
            x.push(xi);
            z.push(zi);
            y.push(f64::from(u32::try_from(draw).unwrap_or(u32::MAX)));
        }
        let design = Mat::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { x[i] });
        let inflation = Mat::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { z[i] });
        let outcome = Mat::from_fn(n, 1, |i, _| y[i]);
        CountModelInput::new(design, outcome).with_inflation_design(inflation)
    }

    fn options(method: MleMethod) -> MleOptions {
        MleOptions {
            method,
            max_iter: 200,
            ..MleOptions::default()
        }
    }

    #[test]
    fn method_names_parse_case_insensitively() {
        assert_eq!("BFGS".parse::<MleMethod>().expect("bfgs"), MleMethod::Bfgs);
        assert_eq!("newton".parse::<MleMethod>().expect("newton"), MleMethod::Newton);
        assert_eq!("lbfgs".parse::<MleMethod>().expect("lbfgs"), MleMethod::Lbfgs);
        let err = "nm".parse::<MleMethod>().expect_err("unknown method");
        assert!(matches!(err, ZeroInflatedError::UnsupportedOptimizerMethod(name) if name == "nm"));
    }

    #[test]
    fn start_values_use_plain_poisson_and_zero_inflation() {
        let y = Mat::from_fn(6, 1, |i, _| [0.0, 1.0, 2.0, 3.0, 0.0, 6.0][i]);
        let x = Mat::from_fn(6, 1, |_i, _j| 1.0);
        let model = ZeroInflatedPoisson::from_input(&CountModelInput::new(x, y)).expect("model");
        let start = start_params(&model);
        assert_eq!(start.nrows(), 2);
        assert_relative_eq!(start[(0, 0)], 0.0);
        assert_relative_eq!(start[(1, 0)], 2.0f64.ln(), epsilon = 1e-8);
    }

    #[test]
    fn newton_reaches_a_stationary_point() {
        let input = simulate(400, 7);
        let model = ZeroInflatedPoisson::from_input(&input).expect("model");
        let results = fit(&model, &options(MleMethod::Newton)).expect("fit");
        assert!(results.converged, "{}", results.message);
        let score = model.score(&results.params).expect("score");
        assert!(max_abs(&score) < 1e-4);
        assert!(results.cov.is_some());
    }

    #[test]
    fn quasi_newton_methods_agree_with_newton() {
        let input = simulate(400, 13);
        let model = ZeroInflatedPoisson::from_input(&input).expect("model");
        let newton = fit(&model, &options(MleMethod::Newton)).expect("newton");
        for method in [MleMethod::Bfgs, MleMethod::Lbfgs] {
            let results = fit(&model, &options(method)).expect("quasi-newton");
            assert_eq!(results.method, method.as_str());
            assert_relative_eq!(results.loglike, newton.loglike, epsilon = 1e-4);
            for i in 0..newton.params.nrows() {
                assert!(
                    (results.params[(i, 0)] - newton.params[(i, 0)]).abs() < 1e-2,
                    "{method}: parameter {i} differs"
                );
            }
        }
    }

    #[test]
    fn iteration_limit_is_reported_as_non_convergence() {
        let input = simulate(200, 3);
        let model = ZeroInflatedPoisson::from_input(&input).expect("model");
        let opts = MleOptions {
            method: MleMethod::Newton,
            max_iter: 1,
            tolerance: 0.0,
            gradient_tolerance: 1e-14,
            ..MleOptions::default()
        };
        let results = fit(&model, &opts).expect("fit");
        assert!(!results.converged);
        assert!(matches!(
            results.ensure_converged(),
            Err(ZeroInflatedError::NonConvergence { iterations: 1 })
        ));
    }

    #[test]
    fn explicit_start_values_are_length_checked() {
        let input = simulate(50, 1);
        let model = ZeroInflatedPoisson::from_input(&input).expect("model");
        let opts = MleOptions {
            start_params: Some(Mat::zeros(3, 1)),
            ..MleOptions::default()
        };
        let err = fit(&model, &opts).expect_err("bad start length");
        assert!(matches!(
            err,
            ZeroInflatedError::ParameterLength { expected: 4, found: 3 }
        ));
    }

    #[test]
    fn singular_hessian_has_no_covariance() {
        let hessian = Mat::from_fn(2, 2, |_, _| -1.0);
        assert!(covariance_from_hessian(&hessian).is_none());
        let diagonal = Mat::from_fn(2, 2, |i, j| if i == j { -4.0 } else { 0.0 });
        let cov = covariance_from_hessian(&diagonal).expect("covariance");
        assert_relative_eq!(cov[(0, 0)], 0.25, epsilon = 1e-12);
    }
}
