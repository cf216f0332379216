//! Augmented Dickey–Fuller unit-root test (constant, no trend).
//!
//! Regression: `Δy_t = α + γ·y_{t−1} + Σ_{i=1..l} δ_i·Δy_{t−i} + e_t`; the
//! statistic is the t-value of `γ`. The lag `l` is chosen by AIC on a common
//! sample and the regression is refit at that lag.
//!
//! # References
//!
//! - MacKinnon (1994), "Approximate asymptotic distribution functions for
//!   unit-root and cointegration tests." *JBES* 12(2). (p-values)
//! - MacKinnon (2010), "Critical values for cointegration tests." Queen's
//!   Economics Department Working Paper 1227. (critical values)

use jobflow_core::{Error, Result, Scope, Stage};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::ols::least_squares;

const TAU_MAX: f64 = 2.74;
const TAU_MIN: f64 = -18.83;
const TAU_STAR: f64 = -1.61;
const TAU_SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038269];
const TAU_LARGE_P: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

/// Response-surface coefficients in `1/nobs` for the 1%, 5% and 10% levels.
const CRIT_2010: [[f64; 4]; 3] = [
    [-3.43035, -6.5393, -16.786, -79.433],
    [-2.86154, -2.8903, -4.234, -40.040],
    [-2.56677, -1.5384, -2.809, 0.0],
];

/// Critical values of the ADF statistic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CriticalValues {
    /// 1% level.
    pub pct1: f64,
    /// 5% level.
    pub pct5: f64,
    /// 10% level.
    pub pct10: f64,
}

/// ADF test outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AdfResult {
    /// t-statistic of the lagged level.
    pub statistic: f64,
    /// MacKinnon approximate p-value.
    pub p_value: f64,
    /// Augmentation lags used.
    pub used_lag: usize,
    /// Observations in the final regression.
    pub nobs: usize,
    /// Critical values for `nobs`.
    pub critical_values: CriticalValues,
    /// AIC of the selected lag on the common autolag sample.
    pub ic_best: f64,
}

fn polyval(coef: &[f64], x: f64) -> f64 {
    coef.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// MacKinnon (1994) approximate p-value for the constant-only ADF statistic.
pub fn mackinnon_p_value(stat: f64) -> f64 {
    if stat > TAU_MAX {
        return 1.0;
    }
    if stat < TAU_MIN {
        return 0.0;
    }
    let coefs: &[f64] = if stat <= TAU_STAR { &TAU_SMALL_P } else { &TAU_LARGE_P };
    let z = polyval(coefs, stat);
    match Normal::new(0.0, 1.0) {
        Ok(n) => n.cdf(z),
        Err(_) => f64::NAN,
    }
}

/// MacKinnon (2010) critical values for a regression with `nobs` observations.
pub fn mackinnon_critical_values(nobs: usize) -> CriticalValues {
    let inv = 1.0 / nobs as f64;
    CriticalValues {
        pct1: polyval(&CRIT_2010[0], inv),
        pct5: polyval(&CRIT_2010[1], inv),
        pct10: polyval(&CRIT_2010[2], inv),
    }
}

/// Default maximum lag: `min(⌈12·(n/100)^{1/4}⌉, n/2 − 2)`.
pub fn default_max_lag(n: usize) -> Option<usize> {
    let schwert = (12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize;
    (n / 2).checked_sub(2).map(|cap| cap.min(schwert))
}

/// Design `[1, y_{t−1}, Δy_{t−1}, …, Δy_{t−lags}]` and response `Δy_t`, using the
/// last `nobs` differences.
fn adf_design(x: &[f64], lags: usize, nobs: usize) -> (DMatrix<f64>, DVector<f64>) {
    let diff: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let first = diff.len() - nobs;
    let design = DMatrix::from_fn(nobs, lags + 2, |i, j| {
        let t = first + i;
        match j {
            0 => 1.0,
            1 => x[t],
            _ => diff[t - (j - 1)],
        }
    });
    let resp = DVector::from_fn(nobs, |i, _| diff[first + i]);
    (design, resp)
}

/// Run the test on `x` with AIC lag selection over `0..=default_max_lag(n)`.
pub fn adfuller(x: &[f64]) -> Result<AdfResult> {
    let scope = || Scope::stage(Stage::StationarityTest);
    let n = x.len();
    let max_lag = default_max_lag(n).ok_or_else(|| {
        Error::insufficient_observations(
            scope(),
            format!("ADF needs at least 4 observations, got {n}"),
        )
    })?;

    // Common sample: every candidate lag uses the last n − 1 − max_lag differences.
    let common = n - 1 - max_lag;
    let mut best: Option<(f64, usize)> = None;
    for lag in 0..=max_lag {
        let (design, resp) = adf_design(x, lag, common);
        let Some(fit) = least_squares(&design, &resp) else {
            continue;
        };
        let aic = fit.aic(lag + 2);
        if best.map_or(true, |(b, _)| aic < b) {
            best = Some((aic, lag));
        }
    }
    let (ic_best, used_lag) = best.ok_or_else(|| {
        Error::insufficient_variation(scope(), "no ADF regression could be fitted")
    })?;

    let nobs = n - 1 - used_lag;
    let (design, resp) = adf_design(x, used_lag, nobs);
    let fit = least_squares(&design, &resp).ok_or_else(|| {
        Error::insufficient_variation(scope(), "ADF regression at the selected lag is singular")
    })?;
    let se = fit.std_errors()[1];
    if !(se.is_finite() && se > 0.0) {
        return Err(Error::insufficient_variation(scope(), "ADF statistic is undefined"));
    }
    let statistic = fit.beta[1] / se;

    Ok(AdfResult {
        statistic,
        p_value: mackinnon_p_value(statistic),
        used_lag,
        nobs,
        critical_values: mackinnon_critical_values(nobs),
        ic_best,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, StandardNormal};

    fn noise(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n).map(|_| StandardNormal.sample(&mut rng)).collect()
    }

    #[test]
    fn p_value_surface() {
        assert_eq!(mackinnon_p_value(3.0), 1.0);
        assert_eq!(mackinnon_p_value(-20.0), 0.0);
        // Asymptotic 5% point maps close to 0.05.
        assert!((mackinnon_p_value(-2.86) - 0.05).abs() < 0.01);
        assert!(mackinnon_p_value(-1.0) > mackinnon_p_value(-2.0));
    }

    #[test]
    fn critical_values_at_large_n_are_asymptotic() {
        let cv = mackinnon_critical_values(1_000_000);
        assert_relative_eq!(cv.pct1, -3.43035, epsilon = 1e-4);
        assert_relative_eq!(cv.pct5, -2.86154, epsilon = 1e-4);
        assert_relative_eq!(cv.pct10, -2.56677, epsilon = 1e-4);
        let small = mackinnon_critical_values(50);
        assert!(small.pct5 < cv.pct5);
    }

    #[test]
    fn max_lag_rule() {
        assert_eq!(default_max_lag(100), Some(12));
        assert_eq!(default_max_lag(36), Some(10));
        assert_eq!(default_max_lag(20), Some(8));
        assert_eq!(default_max_lag(3), None);
    }

    #[test]
    fn white_noise_rejects_unit_root() {
        let r = adfuller(&noise(200, 7)).unwrap();
        assert!(r.statistic < r.critical_values.pct1, "{r:?}");
        assert!(r.p_value < 0.01);
    }

    #[test]
    fn random_walk_with_drift_does_not_reject() {
        let mut level = 0.0;
        let walk: Vec<f64> = noise(200, 11)
            .into_iter()
            .map(|e| {
                level += 0.5 + e;
                level
            })
            .collect();
        let r = adfuller(&walk).unwrap();
        assert!(r.p_value > 0.05, "{r:?}");
    }

    #[test]
    fn short_input() {
        assert!(matches!(
            adfuller(&[1.0, 2.0, 3.0]).unwrap_err(),
            Error::InsufficientObservations { .. }
        ));
    }
}
