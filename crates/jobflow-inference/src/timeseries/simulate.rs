//! Simulation of autoregressive processes.
//!
//! - y_t = c + φ_1 y_{t−1} + … + φ_p y_{t−p} + e_t, e_t ~ N(0, σ²)

use jobflow_core::{Error, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

/// Simulate `n` values of an AR(p) process after discarding `burn_in` draws.
///
/// Pre-sample values start at zero.
pub fn simulate_ar(
    intercept: f64,
    coefficients: &[f64],
    sigma: f64,
    n: usize,
    burn_in: usize,
    seed: u64,
) -> Result<Vec<f64>> {
    if n == 0 {
        return Err(Error::Validation("n must be > 0".to_string()));
    }
    let noise = Normal::new(0.0, sigma)
        .map_err(|e| Error::Validation(format!("invalid innovation sigma {sigma}: {e}")))?;
    if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
        return Err(Error::Validation("AR parameters must be finite".to_string()));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let p = coefficients.len();
    let mut y = vec![0.0; p];
    y.reserve(burn_in + n);
    for _ in 0..burn_in + n {
        let t = y.len();
        let ar: f64 = coefficients.iter().enumerate().map(|(i, phi)| phi * y[t - 1 - i]).sum();
        y.push(intercept + ar + noise.sample(&mut rng));
    }
    Ok(y.split_off(p + burn_in))
}
