//! # Models
//!
//! Zero-inflated count regression: a logistic structural-zero process mixed
//! with a count process. Includes the mixture likelihood, maximum-likelihood
//! and L1-regularized fitting, predictions, and the scalar zero-inflated
//! Poisson distribution.

pub mod count;
pub mod inflation;
pub mod matrix_ops;
pub mod mle;
pub mod poisson;
pub mod prediction;
pub mod regularized;
pub mod results;
pub mod zero_inflated;
pub mod zipoisson;
