//! Trend and residual AR modeling of one class series.

use chrono::NaiveDate;
use jobflow_core::{Error, MonthlySeries, Result, Scope, Stage};
use serde::Serialize;

use super::adf::{AdfResult, adfuller};
use super::autoreg::{ArModel, fit_ar_grid};
use super::trend::{TrendModel, fit_quadratic_trend};

/// Trend, stationarity diagnostic and AR model for one class.
#[derive(Debug, Clone, Serialize)]
pub struct ResidualFit {
    /// Class label.
    pub class: String,
    /// Quadratic trend.
    pub trend: TrendModel,
    /// ADF test on the trend residuals; `None` if it could not be computed.
    pub adf: Option<AdfResult>,
    /// AIC-selected AR model of the trend residuals.
    pub ar: ArModel,
}

/// Fit `series ~ 1 + t + t²` (`t` in months since `origin`), test the residuals
/// for a unit root and select an AR order in `1..=max_lag` by AIC.
///
/// The AR model treats consecutive observations as adjacent even across gaps.
pub fn fit_trend_and_residual_ar(
    class: &str,
    series: &MonthlySeries,
    origin: NaiveDate,
    max_lag: usize,
) -> Result<ResidualFit> {
    if max_lag == 0 {
        return Err(Error::Validation("max_lag must be >= 1".into()));
    }
    let n = series.len();
    if n < max_lag + 2 {
        return Err(Error::insufficient_observations(
            Scope::class(Stage::TrendModeler, class),
            format!("{n} observations, need at least max_lag + 2 = {}", max_lag + 2),
        ));
    }

    let trend = fit_quadratic_trend(class, series, origin)?;
    let resid = trend.residuals.values();

    let adf = match adfuller(resid) {
        Ok(r) => Some(r),
        Err(e) => {
            tracing::warn!(class, error = %e, "ADF test skipped");
            None
        }
    };
    let ar = fit_ar_grid(resid, max_lag).map_err(|e| e.for_class(class))?;

    Ok(ResidualFit { class: class.to_string(), trend, adf, ar })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobflow_core::types::{from_month_ordinal, month_ordinal};

    fn series(values: Vec<f64>) -> (NaiveDate, MonthlySeries) {
        let origin = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap();
        let o = month_ordinal(origin);
        let dates = (0..values.len() as i64).map(|i| from_month_ordinal(o + i).unwrap()).collect();
        (origin, MonthlySeries::new(dates, values).unwrap())
    }

    #[test]
    fn minimum_length_gate() {
        let (origin, s) = series(vec![1.0, 2.0, 4.0, 3.0, 5.0, 4.0, 6.0]);
        let err = fit_trend_and_residual_ar("A", &s, origin, 6).unwrap_err();
        assert!(matches!(err, Error::InsufficientObservations { .. }));
        assert_eq!(err.scope().and_then(|s| s.class.as_deref()), Some("A"));

        assert!(matches!(
            fit_trend_and_residual_ar("A", &s, origin, 0).unwrap_err(),
            Error::Validation(_)
        ));
    }

    #[test]
    fn minimum_length_series_is_modeled() {
        let wiggly = |n: usize| -> Vec<f64> {
            (0..n)
                .map(|i| 1.0 + 0.1 * (i as f64 * 1.3).sin() + 0.05 * (i as f64 * 2.9).cos())
                .collect()
        };
        for n in [8, 9] {
            let (origin, s) = series(wiggly(n));
            let fit = fit_trend_and_residual_ar("A", &s, origin, 6).unwrap();
            assert!(!fit.ar.candidates.is_empty(), "n = {n}");
            assert!(fit.ar.candidates.iter().any(|c| c.order == 1), "n = {n}");
            assert!((1..=6).contains(&fit.ar.order()));
        }
    }

    #[test]
    fn fits_a_wiggly_series() {
        let values = (0..40)
            .map(|i| {
                let t = i as f64;
                1.0 + 0.01 * t + 0.1 * (t * 1.3).sin() + 0.05 * (t * 2.9).cos()
            })
            .collect();
        let (origin, s) = series(values);
        let fit = fit_trend_and_residual_ar("A", &s, origin, 3).unwrap();
        assert_eq!(fit.trend.residuals.len(), 40);
        assert!((1..=3).contains(&fit.ar.order()));
        assert!(fit.adf.is_some());
        assert_eq!(fit.ar.candidates.len(), 3);
    }
}
