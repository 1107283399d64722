//! # Zero-inflated Poisson distribution
//!
//! Scalar distribution with structural-zero probability `w` and Poisson
//! mean `mu`:
//!
//! - `P(0) = w + (1 - w) exp(-mu)`
//! - `P(k) = (1 - w) mu^k exp(-mu) / k!` for `k > 0`
//! - mean `(1 - w) mu`, variance `(1 - w) mu (1 + w mu)`

use rand::RngExt;
use rand::rngs::StdRng;
use statrs::function::gamma::gamma_ur;

use crate::models::poisson::poisson_log_pmf;
use crate::models::zero_inflated::ZeroInflatedError;
use crate::utils::usize_to_f64;

/// Zero-inflated Poisson distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZiPoisson {
    mu: f64,
    w: f64,
}

impl ZiPoisson {
    /// # Errors
    ///
    /// Returns `ZeroInflatedError::InvalidDistribution` unless `mu` is finite and
    /// non-negative and `0 <= w < 1`.
    pub fn new(mu: f64, w: f64) -> Result<Self, ZeroInflatedError> {
        if !mu.is_finite() || mu < 0.0 || !(0.0..1.0).contains(&w) {
            return Err(ZeroInflatedError::InvalidDistribution { mu, w });
        }
        Ok(Self { mu, w })
    }

    #[must_use]
    pub const fn mu(&self) -> f64 {
        self.mu
    }

    #[must_use]
    pub const fn w(&self) -> f64 {
        self.w
    }

    #[must_use]
    pub fn log_pmf(&self, k: u64) -> f64 {
        zip_log_pmf(count_as_f64(k), self.mu, self.w)
    }

    #[must_use]
    pub fn pmf(&self, k: u64) -> f64 {
        self.log_pmf(k).exp()
    }

    /// `P(Y <= k)`.
    #[must_use]
    pub fn cdf(&self, k: u64) -> f64 {
        let poisson_cdf = if self.mu == 0.0 {
            1.0
        } else {
            gamma_ur(count_as_f64(k) + 1.0, self.mu)
        };
        (1.0 - self.w).mul_add(poisson_cdf, self.w)
    }

    #[must_use]
    pub fn mean(&self) -> f64 {
        (1.0 - self.w) * self.mu
    }

    #[must_use]
    pub fn variance(&self) -> f64 {
        (1.0 - self.w) * self.mu * self.w.mul_add(self.mu, 1.0)
    }

    /// Draw one count by inverting the cdf.
    pub fn sample(&self, rng: &mut StdRng) -> u64 {
        let u = rng.random::<f64>();
        let mut k = 0u64;
        let mut cumulative = self.pmf(0);
        while cumulative < u {
            k += 1;
            let mass = self.pmf(k);
            // Remaining mass is below rounding; stop rather than walk forever.
            if mass == 0.0 && count_as_f64(k) > self.mu {
                break;
            }
            cumulative += mass;
        }
        k
    }

    /// Draw `n` independent counts.
    pub fn sample_n(&self, rng: &mut StdRng, n: usize) -> Vec<u64> {
        (0..n).map(|_| self.sample(rng)).collect()
    }
}

/// Zero-inflated Poisson log-pmf at integer-valued `count`.
#[must_use]
pub fn zip_log_pmf(count: f64, mu: f64, w: f64) -> f64 {
    if count == 0.0 {
        (1.0 - w).mul_add((-mu).exp(), w).ln()
    } else {
        (-w).ln_1p() + poisson_log_pmf(count, mu)
    }
}

fn count_as_f64(k: u64) -> f64 {
    usize::try_from(k).map_or(f64::INFINITY, usize_to_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;

    #[test]
    fn zero_mass_combines_both_processes() {
        let dist = ZiPoisson::new(2.0, 0.3).expect("valid");
        let expected = 0.7f64.mul_add((-2.0f64).exp(), 0.3);
        assert_relative_eq!(dist.pmf(0), expected, epsilon = 1e-12);
        assert_relative_eq!(dist.cdf(0), expected, epsilon = 1e-12);
    }

    #[test]
    fn positive_counts_are_scaled_poisson() {
        let dist = ZiPoisson::new(3.0, 0.25).expect("valid");
        let poisson = 4.5 * (-3.0f64).exp();
        assert_relative_eq!(dist.pmf(2), 0.75 * poisson, epsilon = 1e-12);
    }

    #[test]
    fn pmf_sums_to_cdf_and_one() {
        let dist = ZiPoisson::new(4.0, 0.4).expect("valid");
        let partial: f64 = (0..=6).map(|k| dist.pmf(k)).sum();
        assert_relative_eq!(partial, dist.cdf(6), epsilon = 1e-10);
        let total: f64 = (0..=60).map(|k| dist.pmf(k)).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-10);
    }

    #[test]
    fn moments_match_pmf() {
        let dist = ZiPoisson::new(2.5, 0.2).expect("valid");
        let mut mean = 0.0_f64;
        let mut second = 0.0_f64;
        for k in 0..80u64 {
            let kf = count_as_f64(k);
            mean += kf * dist.pmf(k);
            second += kf * kf * dist.pmf(k);
        }
        assert_relative_eq!(dist.mean(), mean, epsilon = 1e-9);
        assert_relative_eq!(dist.variance(), mean.mul_add(-mean, second), epsilon = 1e-9);
    }

    #[test]
    fn sample_mean_is_close_to_distribution_mean() {
        let dist = ZiPoisson::new(3.0, 0.3).expect("valid");
        let mut rng = StdRng::seed_from_u64(42);
        let draws = dist.sample_n(&mut rng, 20_000);
        let zeros = draws.iter().filter(|&&k| k == 0).count();
        let mean = draws.iter().map(|&k| count_as_f64(k)).sum::<f64>() / 20_000.0;
        assert!((mean - dist.mean()).abs() < 0.1, "sample mean {mean}");
        assert!((usize_to_f64(zeros) / 20_000.0 - dist.pmf(0)).abs() < 0.02);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(ZiPoisson::new(-1.0, 0.2).is_err());
        assert!(ZiPoisson::new(1.0, 1.0).is_err());
        assert!(ZiPoisson::new(f64::NAN, 0.2).is_err());
        assert!(ZiPoisson::new(0.0, 0.0).is_ok());
    }

    #[test]
    fn degenerate_mean_puts_all_mass_at_zero() {
        let dist = ZiPoisson::new(0.0, 0.1).expect("valid");
        assert_relative_eq!(dist.pmf(0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(dist.pmf(3), 0.0);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(dist.sample(&mut rng), 0);
    }
}
