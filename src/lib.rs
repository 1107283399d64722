#![forbid(unsafe_code)]

//! # `zero_inflated_models`
//!
//! Zero-inflated count regression for outcomes with more zeros than a
//! count distribution alone explains. Each observation is either a
//! structural zero, with probability `w = sigmoid(Z gamma)`, or a draw from
//! a count process, here Poisson with `mu = exp(X beta + offset)`.
//!
//! The likelihood engine evaluates the joint log-likelihood, its analytic
//! score, and its Hessian; the driver fits it by Newton, BFGS, or L-BFGS
//! from a plain Poisson warm start. Parameters are always ordered
//! `[gamma, beta]`.
//!
//! ```
//! use faer::Mat;
//! use zero_inflated_models::{
//!     CountModelInput, MleOptions, PredictionData, PredictionMode, ZeroInflatedPoisson, fit,
//! };
//!
//! let y = Mat::from_fn(5, 1, |i, _| [0.0, 0.0, 1.0, 2.0, 5.0][i]);
//! let x = Mat::from_fn(5, 1, |_i, _j| 1.0);
//! let model = ZeroInflatedPoisson::from_input(&CountModelInput::new(x, y)).expect("model");
//!
//! let results = fit(&model, &MleOptions::default()).expect("fit");
//! let mean = model
//!     .predict(&results.params, &PredictionData::default(), PredictionMode::Mean)
//!     .expect("prediction")
//!     .into_matrix();
//! assert_eq!(mean.nrows(), 5);
//! ```

pub mod input;
pub mod models;
pub mod utils;

pub use input::{CountModelInput, InputError, combine_offset};
pub mod matrix_ops {
    pub use crate::models::matrix_ops::*;
}

pub use models::count::{CountSubmodel, InflationTerms};
pub use models::inflation::{LARGEST_BELOW_ONE, LogitInflation, logistic_stable, predict_inflation};
pub use models::poisson::{PoissonFitOptions, PoissonSubmodel, fit_poisson, poisson_log_pmf};

pub use models::zero_inflated::{
    Partition, ZeroInflatedError, ZeroInflatedModel, ZeroInflatedPoisson, split_params,
};

pub use models::mle::{
    MleMethod, MleOptions, OptimizerOutcome, covariance_from_hessian, fit,
    fit_zero_inflated_poisson, maximize, start_params,
};

pub use models::regularized::{
    PenaltyMethod, PenaltyWeights, RegularizedOptions, TrimMode, fit_regularized,
};

pub use models::results::{
    ConfidenceInterval, EstimationKind, InformationCriteria, RegularizedSummary,
    ZeroInflatedResults, coefficient_confidence_intervals, compute_information_criteria,
};

pub use models::prediction::{Prediction, PredictionData, PredictionMode};

pub use models::zipoisson::{ZiPoisson, zip_log_pmf};
