//! # Inflation submodel
//!
//! Logistic evaluator for the probability that an observation is a
//! structural zero. Its coefficients are estimated jointly with the count
//! model, so this type only evaluates `w = sigmoid(Z theta_infl)`.

use faer::Mat;

/// Largest `f64` strictly below one.
pub const LARGEST_BELOW_ONE: f64 = 1.0 - f64::EPSILON / 2.0;

/// Stable logistic transform.
#[must_use]
pub fn logistic_stable(value: f64) -> f64 {
    if value >= 0.0 {
        let z = (-value).exp();
        1.0 / (1.0 + z)
    } else {
        let z = value.exp();
        z / (1.0 + z)
    }
}

/// Remap a probability that rounded to one onto the largest value below one.
#[must_use]
pub const fn clamp_below_one(probability: f64) -> f64 {
    if probability >= 1.0 {
        LARGEST_BELOW_ONE
    } else {
        probability
    }
}

/// Logistic inflation model over a fixed design matrix.
#[derive(Debug, Clone)]
pub struct LogitInflation {
    design: Mat<f64>,
}

impl LogitInflation {
    #[must_use]
    pub const fn new(design: Mat<f64>) -> Self {
        Self { design }
    }

    /// Intercept-only inflation design with `nobs` rows.
    #[must_use]
    pub fn intercept_only(nobs: usize) -> Self {
        Self::new(Mat::from_fn(nobs, 1, |_, _| 1.0))
    }

    #[must_use]
    pub const fn design(&self) -> &Mat<f64> {
        &self.design
    }

    #[must_use]
    pub fn k_inflate(&self) -> usize {
        self.design.ncols()
    }

    /// Structural-zero probabilities for the training rows, each in `[0, 1)`.
    #[must_use]
    pub fn predict(&self, params_infl: &Mat<f64>) -> Mat<f64> {
        predict_inflation(&self.design, params_infl)
    }
}

/// Structural-zero probabilities for an arbitrary inflation design.
#[must_use]
pub fn predict_inflation(design: &Mat<f64>, params_infl: &Mat<f64>) -> Mat<f64> {
    let eta = design * params_infl;
    Mat::from_fn(eta.nrows(), 1, |i, _| {
        clamp_below_one(logistic_stable(eta[(i, 0)]))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn zero_coefficients_give_even_odds() {
        let model = LogitInflation::intercept_only(3);
        let w = model.predict(&Mat::zeros(1, 1));
        for i in 0..3 {
            assert_relative_eq!(w[(i, 0)], 0.5);
        }
    }

    #[test]
    fn extreme_coefficients_stay_strictly_below_one() {
        let model = LogitInflation::intercept_only(2);
        let w = model.predict(&Mat::from_fn(1, 1, |_, _| 1.0e6));
        for i in 0..2 {
            assert!(w[(i, 0)] < 1.0);
            assert_relative_eq!(w[(i, 0)], LARGEST_BELOW_ONE);
        }
        assert!((1.0 - w[(0, 0)]).ln().is_finite());
    }

    #[test]
    fn very_negative_coefficients_approach_zero() {
        let model = LogitInflation::intercept_only(1);
        let w = model.predict(&Mat::from_fn(1, 1, |_, _| -50.0));
        assert!(w[(0, 0)] >= 0.0);
        assert!(w[(0, 0)] < 1e-20);
    }

    #[test]
    fn largest_below_one_is_the_predecessor_of_one() {
        assert!(LARGEST_BELOW_ONE < 1.0);
        assert_eq!(LARGEST_BELOW_ONE.to_bits() + 1, 1.0f64.to_bits());
    }
}
