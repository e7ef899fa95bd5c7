use rand_distr::LogNormal;

use crate::errors::SimulationError;

/// Convert mean and standard deviation to log-normal distribution parameters
/// Returns (μ, σ) for LogNormal(μ, σ) that has the given mean and stddev
///
/// For LogNormal(μ, σ):
/// - E[X] = exp(μ + σ²/2)
/// - Var[X] = (exp(σ²) - 1) * exp(2μ + σ²)
///
/// To convert from mean (m) and stddev (s):
/// - σ = sqrt(ln(1 + s²/m²))
/// - μ = ln(m) - σ²/2
fn lognormal_from_mean_stddev(mean: f64, stddev: f64) -> (f64, f64) {
    let variance = stddev * stddev;
    let sigma_squared = (1.0 + variance / (mean * mean)).ln();
    let sigma = sigma_squared.sqrt();
    let mu = mean.ln() - sigma_squared / 2.0;
    (mu, sigma)
}

/// Create a log-normal distribution from mean and standard deviation
pub fn lognormal_dist(mean: f64, stddev: f64) -> Result<LogNormal<f64>, SimulationError> {
    if !(mean > 0.0 && mean.is_finite()) {
        return Err(SimulationError::validation("lognormal.mean", format!("must be > 0, got {}", mean)));
    }
    let (mu, sigma) = lognormal_from_mean_stddev(mean, stddev);
    LogNormal::new(mu, sigma).map_err(|e| SimulationError::validation("lognormal.stddev", e.to_string()))
}

/// Seed for one step of one campaign
/// Mixes the parts with splitmix64 so neighbouring steps get unrelated streams
pub fn step_seed(base_seed: u64, campaign_id: u64, step: usize) -> u64 {
    let mut x = splitmix64(base_seed);
    x = splitmix64(x ^ campaign_id);
    splitmix64(x ^ step as u64)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use rand_distr::Distribution;

    #[test]
    fn test_lognormal_mean() {
        let dist = lognormal_dist(10.0, 3.0).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let n = 20_000;
        let mean = (0..n).map(|_| dist.sample(&mut rng)).sum::<f64>() / n as f64;
        assert!((mean - 10.0).abs() < 0.2, "mean {}", mean);
    }

    #[test]
    fn test_lognormal_rejects_bad_mean() {
        assert!(lognormal_dist(0.0, 1.0).is_err());
        assert!(lognormal_dist(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_step_seed_varies() {
        let a = step_seed(1, 101, 0);
        assert_eq!(a, step_seed(1, 101, 0));
        assert_ne!(a, step_seed(1, 101, 1));
        assert_ne!(a, step_seed(1, 102, 0));
        assert_ne!(a, step_seed(2, 101, 0));
    }
}
