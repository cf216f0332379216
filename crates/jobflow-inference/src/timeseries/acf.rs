//! Sample autocorrelation and the Ljung–Box portmanteau test.

use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Default number of lags: `min(⌊10·log10 n⌋, n − 1)`.
pub fn default_nlags(n: usize) -> usize {
    if n < 2 {
        return 0;
    }
    ((10.0 * (n as f64).log10()).floor() as usize).min(n - 1)
}

/// Sample ACF `r_0..=r_nlags` (biased denominator). `None` for a constant series.
pub fn acf(x: &[f64], nlags: usize) -> Option<Vec<f64>> {
    let n = x.len();
    if n == 0 {
        return None;
    }
    let mean = x.iter().sum::<f64>() / n as f64;
    let dev: Vec<f64> = x.iter().map(|v| v - mean).collect();
    let c0: f64 = dev.iter().map(|d| d * d).sum();
    if c0 <= 0.0 {
        return None;
    }
    let out = (0..=nlags.min(n - 1))
        .map(|k| dev[..n - k].iter().zip(&dev[k..]).map(|(a, b)| a * b).sum::<f64>() / c0)
        .collect();
    Some(out)
}

/// Ljung–Box statistic over lags `1..=lags`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LjungBox {
    /// Lags included.
    pub lags: usize,
    /// `Q = n(n+2) Σ r_k² / (n − k)`.
    pub statistic: f64,
    /// χ² degrees of freedom (`lags` minus fitted ARMA parameters).
    pub df: usize,
    /// Upper-tail χ² p-value; `None` when `df` is zero.
    pub p_value: Option<f64>,
}

/// Ljung–Box test from a precomputed ACF (`acf[0] = 1`). `fitted_params` is
/// subtracted from the degrees of freedom.
pub fn ljung_box(acf: &[f64], n: usize, fitted_params: usize) -> LjungBox {
    let lags = acf.len().saturating_sub(1);
    let nf = n as f64;
    let statistic = nf
        * (nf + 2.0)
        * (1..=lags).map(|k| acf[k] * acf[k] / (nf - k as f64)).sum::<f64>();
    let df = lags.saturating_sub(fitted_params);
    let p_value = if df == 0 {
        None
    } else {
        ChiSquared::new(df as f64).ok().map(|chi| 1.0 - chi.cdf(statistic))
    };
    LjungBox { lags, statistic, df, p_value }
}
