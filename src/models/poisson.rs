/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Poisson count process for zero-inflated mixtures.
//
// Created on: 24 Jan 2026     Author: Tobias Kragholm
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Poisson count submodel
//!
//! - Log-link Poisson evaluator with offset: `mu = exp(X beta + offset)`.
//! - Closed-form Hessian of the zero-inflated Poisson log-likelihood.
//! - Plain Poisson IRLS fit, used as the warm start for the mixture.

use faer::Mat;
use statrs::function::gamma::ln_gamma;

use crate::models::count::{CountSubmodel, InflationTerms};
use crate::models::matrix_ops::map_mat;
use crate::models::zero_inflated::ZeroInflatedError;
use crate::utils::{max_abs_diff, mean_column, mirror_lower_triangle, solve_linear_system};

/// Poisson count process over a fixed design, outcome, and offset.
#[derive(Debug, Clone)]
pub struct PoissonSubmodel {
    design: Mat<f64>,
    outcome: Mat<f64>,
    offset: Mat<f64>,
}

impl PoissonSubmodel {
    /// `offset` already includes `ln(exposure)`.
    #[must_use]
    pub const fn new(design: Mat<f64>, outcome: Mat<f64>, offset: Mat<f64>) -> Self {
        Self {
            design,
            outcome,
            offset,
        }
    }

    #[must_use]
    pub const fn offset(&self) -> &Mat<f64> {
        &self.offset
    }

    /// `X beta + offset` for the training rows.
    #[must_use]
    pub fn linear_predictor(&self, params_main: &Mat<f64>) -> Mat<f64> {
        linear_predictor(&self.design, params_main, &self.offset)
    }
}

/// `X beta + offset` for an arbitrary design.
#[must_use]
pub fn linear_predictor(design: &Mat<f64>, params_main: &Mat<f64>, offset: &Mat<f64>) -> Mat<f64> {
    let eta = design * params_main;
    Mat::from_fn(eta.nrows(), 1, |i, _| eta[(i, 0)] + offset[(i, 0)])
}

/// Poisson log-pmf at integer-valued `count`.
#[must_use]
pub fn poisson_log_pmf(count: f64, mu: f64) -> f64 {
    if mu == 0.0 {
        return if count == 0.0 { 0.0 } else { f64::NEG_INFINITY };
    }
    count.mul_add(mu.ln(), -mu) - ln_gamma(count + 1.0)
}

impl CountSubmodel for PoissonSubmodel {
    fn family(&self) -> &'static str {
        "poisson"
    }

    fn design(&self) -> &Mat<f64> {
        &self.design
    }

    fn outcome(&self) -> &Mat<f64> {
        &self.outcome
    }

    fn loglikeobs(&self, params_main: &Mat<f64>) -> Mat<f64> {
        let eta = self.linear_predictor(params_main);
        Mat::from_fn(eta.nrows(), 1, |i, _| {
            let y = self.outcome[(i, 0)];
            y.mul_add(eta[(i, 0)], -eta[(i, 0)].exp()) - ln_gamma(y + 1.0)
        })
    }

    fn score_obs(&self, params_main: &Mat<f64>) -> Mat<f64> {
        let mu = self.predict(params_main);
        Mat::from_fn(self.design.nrows(), self.design.ncols(), |i, j| {
            (self.outcome[(i, 0)] - mu[(i, 0)]) * self.design[(i, j)]
        })
    }

    fn predict(&self, params_main: &Mat<f64>) -> Mat<f64> {
        map_mat(&self.linear_predictor(params_main), f64::exp)
    }

    fn warm_start(&self) -> Result<Mat<f64>, ZeroInflatedError> {
        fit_poisson(&self.design, &self.outcome, &self.offset, PoissonFitOptions::default())
            .map(|(beta, _)| beta)
    }

    fn mixture_hessian(
        &self,
        params_main: &Mat<f64>,
        inflation: InflationTerms<'_>,
    ) -> Option<Mat<f64>> {
        let mu = self.predict(params_main);
        Some(zip_hessian(&self.design, inflation, &mu))
    }
}

/// Closed-form Hessian of the zero-inflated Poisson log-likelihood.
///
/// Zero rows use `coeff = 1 + w (exp(mu) - 1)`, written through the zero-cell
/// probability `p0 = w + (1 - w) exp(-mu) = exp(-mu) coeff` so that large
/// means do not overflow. Only the lower triangle is accumulated; the cross
/// block lives in rows `k_inflate..`, columns `..k_inflate`.
fn zip_hessian(x: &Mat<f64>, inflation: InflationTerms<'_>, mu: &Mat<f64>) -> Mat<f64> {
    let z = inflation.design;
    let w = inflation.w;
    let k_infl = z.ncols();
    let k_exog = x.ncols();
    let mut hess = Mat::<f64>::zeros(k_infl + k_exog, k_infl + k_exog);

    for &row in &inflation.partition.zero_idx {
        let wi = w[(row, 0)];
        let mui = mu[(row, 0)];
        let e = (-mui).exp();
        let p0 = (1.0 - wi).mul_add(e, wi);
        let p0_sq = p0 * p0;

        let count_term = mui * (wi - 1.0) * e * wi.mul_add(-mui, p0) / p0_sq;
        let infl_term = wi
            * (1.0 - wi)
            * (2.0f64.mul_add(-wi, 1.0) * (e - e * e) - wi * wi * (1.0 - e) * (1.0 - e))
            / p0_sq;
        let cross_term = wi * (1.0 - wi) * mui * e / p0_sq;

        accumulate_row(&mut hess, x, z, row, count_term, infl_term, cross_term);
    }

    for &row in &inflation.partition.nonzero_idx {
        let wi = w[(row, 0)];
        let count_term = -mu[(row, 0)];
        let infl_term = wi * (wi - 1.0);
        accumulate_row(&mut hess, x, z, row, count_term, infl_term, 0.0);
    }

    mirror_lower_triangle(&mut hess);
    hess
}

fn accumulate_row(
    hess: &mut Mat<f64>,
    x: &Mat<f64>,
    z: &Mat<f64>,
    row: usize,
    count_term: f64,
    infl_term: f64,
    cross_term: f64,
) {
    let k_infl = z.ncols();
    let k_exog = x.ncols();

    for i in 0..k_exog {
        let xi = x[(row, i)] * count_term;
        for j in 0..=i {
            hess[(k_infl + i, k_infl + j)] += xi * x[(row, j)];
        }
    }
    for i in 0..k_infl {
        let zi = z[(row, i)] * infl_term;
        for j in 0..=i {
            hess[(i, j)] += zi * z[(row, j)];
        }
    }
    if cross_term != 0.0 {
        for j in 0..k_exog {
            let xj = x[(row, j)] * cross_term;
            for i in 0..k_infl {
                hess[(k_infl + j, i)] += xj * z[(row, i)];
            }
        }
    }
}

/// Tuning parameters for the plain Poisson IRLS fit.
#[derive(Debug, Clone, Copy)]
pub struct PoissonFitOptions {
    /// Maximum number of IRLS iterations.
    pub max_iter: usize,
    /// Convergence tolerance on coefficient changes.
    pub tolerance: f64,
    /// Lower bound on IRLS weights.
    pub min_weight: f64,
}

impl Default for PoissonFitOptions {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tolerance: 1e-8,
            min_weight: 1e-10,
        }
    }
}

/// Fit a Poisson log-link regression with offset by IRLS, ignoring inflation.
///
/// Returns the coefficients and the number of iterations used.
///
/// # Errors
///
/// Returns `ZeroInflatedError::NonConvergence` if the iteration limit is hit and
/// `ZeroInflatedError::SolveFailed` if a weighted least-squares step fails.
pub fn fit_poisson(
    x: &Mat<f64>,
    y: &Mat<f64>,
    offset: &Mat<f64>,
    options: PoissonFitOptions,
) -> Result<(Mat<f64>, usize), ZeroInflatedError> {
    let mean = mean_column(y);
    let mut mu = Mat::from_fn(y.nrows(), 1, |i, _| (0.5 * (y[(i, 0)] + mean)).max(0.1));
    let mut eta = map_mat(&mu, f64::ln);
    let mut beta = Mat::<f64>::zeros(x.ncols(), 1);

    for iteration in 0..options.max_iter {
        let weights = Mat::from_fn(mu.nrows(), 1, |i, _| mu[(i, 0)].max(options.min_weight));
        let z = Mat::from_fn(eta.nrows(), 1, |i, _| {
            eta[(i, 0)] - offset[(i, 0)] + (y[(i, 0)] - mu[(i, 0)]) / weights[(i, 0)]
        });

        let xtwx = weighted_xtx(x, &weights);
        let xtwz = weighted_xtz(x, &weights, &z);
        let beta_next = solve_linear_system(&xtwx, &xtwz)?;

        if iteration > 0 && max_abs_diff(&beta_next, &beta) < options.tolerance {
            return Ok((beta_next, iteration + 1));
        }
        beta = beta_next;
        eta = linear_predictor(x, &beta, offset);
        mu = map_mat(&eta, f64::exp);
    }

    Err(ZeroInflatedError::NonConvergence {
        iterations: options.max_iter,
    })
}

fn weighted_xtx(x: &Mat<f64>, weights: &Mat<f64>) -> Mat<f64> {
    let p = x.ncols();
    let mut xtx = Mat::<f64>::zeros(p, p);
    for i in 0..x.nrows() {
        let w = weights[(i, 0)];
        for col_i in 0..p {
            let wxi = w * x[(i, col_i)];
            for col_j in 0..p {
                xtx[(col_i, col_j)] += wxi * x[(i, col_j)];
            }
        }
    }
    xtx
}

fn weighted_xtz(x: &Mat<f64>, weights: &Mat<f64>, z: &Mat<f64>) -> Mat<f64> {
    let p = x.ncols();
    let mut xtz = Mat::<f64>::zeros(p, 1);
    for i in 0..x.nrows() {
        let wz = weights[(i, 0)] * z[(i, 0)];
        for col in 0..p {
            xtz[(col, 0)] += x[(i, col)] * wz;
        }
    }
    xtz
}
