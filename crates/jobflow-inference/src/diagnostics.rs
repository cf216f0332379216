//! Descriptive diagnostics and serializable summaries of fitted models.
//!
//! This module implements:
//! - Group summary of `net_jobs` by `(treated, post)` cell
//! - Pre-treatment comparison of treated vs control means per month (advisory)
//! - Flat per-class report of the series pipeline
//!
//! Nothing here feeds back into estimation.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use jobflow_core::RobustCovariance;
use serde::Serialize;

use crate::batch::{ClassSeriesResult, SeriesBatch};
use crate::econometrics::did::{ABSORBED_REGRESSORS, CoefficientSummary, DidModel};
use crate::econometrics::treatment::DidRow;
use crate::timeseries::adf::AdfResult;
use crate::timeseries::autoreg::OrderCandidate;

/// Count, mean and sample standard deviation of `net_jobs` in one cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupCell {
    /// Treatment-group indicator.
    pub treated: u8,
    /// Post-period indicator.
    pub post: u8,
    /// Rows in the cell.
    pub count: usize,
    /// Mean `net_jobs`.
    pub mean: f64,
    /// Standard deviation (ddof = 1); `None` for a single row.
    pub std: Option<f64>,
}

/// Summary statistics per `(treated, post)` cell, ordered by `(treated, post)`.
/// Empty cells are omitted.
pub fn group_summary(rows: &[DidRow]) -> Vec<GroupCell> {
    let mut cells: BTreeMap<(u8, u8), Vec<f64>> = BTreeMap::new();
    for r in rows {
        cells.entry((r.treated, r.post)).or_default().push(r.net_jobs as f64);
    }
    cells
        .into_iter()
        .map(|((treated, post), v)| {
            let count = v.len();
            let mean = v.iter().sum::<f64>() / count as f64;
            let std = (count > 1).then(|| {
                (v.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (count - 1) as f64).sqrt()
            });
            GroupCell { treated, post, count, mean, std }
        })
        .collect()
}

/// Treated vs control mean `net_jobs` in one pre-treatment month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreTrendPoint {
    /// Month.
    pub date: NaiveDate,
    /// Mean over treated classes, if any were observed.
    pub treated_mean: Option<f64>,
    /// Mean over control classes, if any were observed.
    pub control_mean: Option<f64>,
}

impl PreTrendPoint {
    /// `treated_mean − control_mean` when both exist.
    pub fn gap(&self) -> Option<f64> {
        Some(self.treated_mean? - self.control_mean?)
    }
}

/// Mean `net_jobs` per month for treated and control rows with `post = 0`.
pub fn pre_trend_comparison(rows: &[DidRow]) -> Vec<PreTrendPoint> {
    let mut acc: BTreeMap<NaiveDate, [(f64, usize); 2]> = BTreeMap::new();
    for r in rows.iter().filter(|r| r.post == 0) {
        let slot = &mut acc.entry(r.date).or_default()[usize::from(r.treated)];
        slot.0 += r.net_jobs as f64;
        slot.1 += 1;
    }
    let mean = |(sum, n): (f64, usize)| (n > 0).then(|| sum / n as f64);
    acc.into_iter()
        .map(|(date, [control, treated])| PreTrendPoint {
            date,
            treated_mean: mean(treated),
            control_mean: mean(control),
        })
        .collect()
}

/// Serializable view of a DiD fit.
#[derive(Debug, Clone, Serialize)]
pub struct DidReport {
    /// `treated_post` coefficient with robust inference.
    pub treatment_effect: CoefficientSummary,
    /// Classical standard error of `treated_post`.
    pub se_ols: f64,
    /// Covariance flavour.
    pub covariance_type: RobustCovariance,
    /// Confidence level of the intervals.
    pub confidence_level: f64,
    /// Regressors absorbed by the fixed effects.
    pub absorbed: Vec<String>,
    /// Observations.
    pub n_obs: usize,
    /// Estimated coefficients.
    pub n_params: usize,
    /// Centered R².
    pub r_squared: f64,
    /// Full coefficient table.
    pub coefficients: Vec<CoefficientSummary>,
}

impl DidReport {
    /// Build from a fitted model.
    pub fn from_model(model: &DidModel) -> Self {
        Self {
            treatment_effect: model.treatment_effect().clone(),
            se_ols: model.se_ols_treated_post,
            covariance_type: model.covariance_type,
            confidence_level: model.confidence_level,
            absorbed: ABSORBED_REGRESSORS.iter().map(|s| s.to_string()).collect(),
            n_obs: model.n_obs,
            n_params: model.n_params,
            r_squared: model.r_squared,
            coefficients: model.coefficients.clone(),
        }
    }
}

/// Serializable output of the series pipeline for one class.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesDetail {
    /// Normalizing constant.
    pub class_mean: f64,
    /// Seasonal factors for January..=December.
    pub profile: [f64; 12],
    /// Months interpolated in the reference grid.
    pub interpolated_months: Vec<NaiveDate>,
    /// Deseasonalized series as `(date, value)`.
    pub deseasonalized: Vec<(NaiveDate, f64)>,
    /// Trend coefficients `[intercept, t, t²]`.
    pub trend_coefficients: [f64; 3],
    /// Trend fitted values as `(date, value)`.
    pub trend_fitted: Vec<(NaiveDate, f64)>,
    /// Selected AR order.
    pub ar_order: usize,
    /// AIC of the selected order.
    pub ar_aic: f64,
    /// AR constant.
    pub ar_intercept: f64,
    /// AR lag coefficients.
    pub ar_coefficients: Vec<f64>,
    /// AIC per candidate order.
    pub ar_candidates: Vec<OrderCandidate>,
    /// Ljung–Box p-value on AR innovations.
    pub ljung_box_p_value: Option<f64>,
    /// ADF result on trend residuals.
    pub adf: Option<AdfResult>,
}

impl SeriesDetail {
    /// Build from a class result.
    pub fn from_result(r: &ClassSeriesResult) -> Self {
        let trend = &r.residual.trend;
        let ar = &r.residual.ar;
        Self {
            class_mean: r.seasonal.class_mean,
            profile: *r.seasonal.profile.factors(),
            interpolated_months: r.seasonal.interpolated_months.clone(),
            deseasonalized: r.seasonal.deseasonalized.iter().collect(),
            trend_coefficients: [trend.intercept, trend.linear, trend.quadratic],
            trend_fitted: trend.fitted.iter().collect(),
            ar_order: ar.order(),
            ar_aic: ar.aic,
            ar_intercept: ar.fit.intercept,
            ar_coefficients: ar.fit.coefficients.clone(),
            ar_candidates: ar.candidates.clone(),
            ljung_box_p_value: ar.ljung_box.and_then(|lb| lb.p_value),
            adf: r.residual.adf,
        }
    }
}

/// One line of the series report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesReportEntry {
    /// Class label.
    pub class: String,
    /// `"ok"` or `"failed"`.
    pub status: &'static str,
    /// Selected AR order.
    pub ar_order: Option<usize>,
    /// AIC of the selected order.
    pub aic: Option<f64>,
    /// ADF p-value of the trend residuals.
    pub adf_p_value: Option<f64>,
    /// Calendar month with the largest seasonal factor.
    pub peak_month: Option<u32>,
    /// `max − min` of the seasonal factors.
    pub seasonal_amplitude: Option<f64>,
    /// Failure message.
    pub error: Option<String>,
}

/// Flatten a batch into one entry per class (sorted by class).
pub fn series_report(batch: &SeriesBatch) -> Vec<SeriesReportEntry> {
    batch
        .classes
        .iter()
        .map(|(class, result)| match result {
            Ok(r) => SeriesReportEntry {
                class: class.clone(),
                status: "ok",
                ar_order: Some(r.residual.ar.order()),
                aic: Some(r.residual.ar.aic),
                adf_p_value: r.residual.adf.map(|a| a.p_value),
                peak_month: Some(r.seasonal.profile.peak_month()),
                seasonal_amplitude: Some(r.seasonal.profile.amplitude()),
                error: None,
            },
            Err(e) => SeriesReportEntry {
                class: class.clone(),
                status: "failed",
                ar_order: None,
                aic: None,
                adf_p_value: None,
                peak_month: None,
                seasonal_amplitude: None,
                error: Some(e.to_string()),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn row(day: (i32, u32), class: &str, y: i64, treated: u8, post: u8) -> DidRow {
        DidRow {
            date: NaiveDate::from_ymd_opt(day.0, day.1, 1).unwrap(),
            class: class.into(),
            net_jobs: y,
            treated,
            post,
            treated_post: treated * post,
        }
    }

    fn rows() -> Vec<DidRow> {
        vec![
            row((2020, 1), "A", 10, 0, 0),
            row((2020, 2), "A", 14, 0, 0),
            row((2020, 3), "A", 12, 0, 1),
            row((2020, 1), "B", 20, 1, 0),
            row((2020, 2), "B", 22, 1, 0),
            row((2020, 3), "B", 40, 1, 1),
            row((2020, 1), "C", 30, 1, 0),
        ]
    }

    #[test]
    fn cells_by_treated_and_post() {
        let cells = group_summary(&rows());
        assert_eq!(cells.len(), 4);
        assert_eq!((cells[0].treated, cells[0].post, cells[0].count), (0, 0, 2));
        assert_relative_eq!(cells[0].mean, 12.0);
        assert_relative_eq!(cells[0].std.unwrap(), 8.0_f64.sqrt(), epsilon = 1e-12);
        assert_eq!(cells[1].std, None);
        let t0 = &cells[2];
        assert_eq!((t0.treated, t0.post, t0.count), (1, 0, 3));
        assert_relative_eq!(t0.mean, 24.0);
    }

    #[test]
    fn pre_trends_use_pre_period_only() {
        let pts = pre_trend_comparison(&rows());
        assert_eq!(pts.len(), 2);
        assert_eq!(pts[0].treated_mean, Some(25.0));
        assert_eq!(pts[0].control_mean, Some(10.0));
        assert_eq!(pts[1].gap(), Some(8.0));
    }
}
