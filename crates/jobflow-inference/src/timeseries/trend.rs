//! Quadratic time trend `value ~ 1 + t + t²`, with `t` in months since an origin.

use chrono::NaiveDate;
use jobflow_core::types::months_between;
use jobflow_core::{Error, MonthlySeries, Result, Scope, Stage};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;

use crate::ols::least_squares;

/// Fitted quadratic trend.
#[derive(Debug, Clone, Serialize)]
pub struct TrendModel {
    /// Month the time index is counted from.
    pub origin: NaiveDate,
    /// Constant term.
    pub intercept: f64,
    /// Coefficient on `t`.
    pub linear: f64,
    /// Coefficient on `t²`.
    pub quadratic: f64,
    /// Time index of each observation.
    pub t: Vec<f64>,
    /// Trend values at the observed dates.
    pub fitted: MonthlySeries,
    /// `value − fitted`.
    pub residuals: MonthlySeries,
    /// Centered R².
    pub r_squared: f64,
}

impl TrendModel {
    /// Trend value at `date`.
    pub fn predict(&self, date: NaiveDate) -> f64 {
        let t = months_between(self.origin, date) as f64;
        self.intercept + self.linear * t + self.quadratic * t * t
    }
}

/// OLS quadratic trend of `series` on months elapsed since `origin`.
pub fn fit_quadratic_trend(
    class: &str,
    series: &MonthlySeries,
    origin: NaiveDate,
) -> Result<TrendModel> {
    let scope = || Scope::class(Stage::TrendModeler, class);
    let n = series.len();
    if n < 4 {
        return Err(Error::insufficient_observations(
            scope(),
            format!("quadratic trend needs at least 4 observations, got {n}"),
        ));
    }

    let t: Vec<f64> = series.dates().iter().map(|d| months_between(origin, *d) as f64).collect();
    let x = DMatrix::from_fn(n, 3, |i, j| t[i].powi(j as i32));
    let y = DVector::from_column_slice(series.values());
    let fit = least_squares(&x, &y)
        .ok_or_else(|| Error::insufficient_variation(scope(), "trend design is singular"))?;

    let fitted = MonthlySeries::new(series.dates().to_vec(), fit.fitted.iter().copied().collect())?;
    let residuals =
        MonthlySeries::new(series.dates().to_vec(), fit.residuals.iter().copied().collect())?;

    let y_mean = y.mean();
    let tss: f64 = y.iter().map(|v| (v - y_mean).powi(2)).sum();
    let r_squared = if tss > 0.0 { 1.0 - fit.rss / tss } else { 0.0 };

    tracing::debug!(class, n, r_squared, "quadratic trend fitted");

    Ok(TrendModel {
        origin,
        intercept: fit.beta[0],
        linear: fit.beta[1],
        quadratic: fit.beta[2],
        t,
        fitted,
        residuals,
        r_squared,
    })
}
