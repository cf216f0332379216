//! Per-class series pipeline run across all classes in parallel.
//!
//! For each class: seasonal decomposition → deseasonalized series → quadratic
//! trend → ADF → AR order search. Classes are independent; each carries its own
//! `Result`, and one failing class never aborts the others.
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ Rayon par_iter over classes                   │
//! │  ┌─────────────────────────────────────────┐  │
//! │  │ normalize → STL → profile → deseasonal. │  │
//! │  │ quadratic trend → ADF → AR(1..=max_lag) │  │
//! │  └─────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;

use chrono::NaiveDate;
use jobflow_core::{
    DEFAULT_PERIOD, Error, MonthlySeries, Panel, Result, Scope, SeriesConfig, Stage,
};
use rayon::prelude::*;

use crate::timeseries::residual::{ResidualFit, fit_trend_and_residual_ar};
use crate::timeseries::seasonal::{SeasonalConfig, SeasonalFit, decompose_class};

/// Successful path-B result for one class.
#[derive(Debug, Clone)]
pub struct ClassSeriesResult {
    /// Seasonal profile and deseasonalized series.
    pub seasonal: SeasonalFit,
    /// Trend, ADF and AR model of the deseasonalized series.
    pub residual: ResidualFit,
}

/// Results for every class of a panel.
#[derive(Debug)]
pub struct SeriesBatch {
    /// Global minimum panel date (`t = 0` of every trend).
    pub origin: NaiveDate,
    /// Per-class outcome, keyed by class label.
    pub classes: BTreeMap<String, Result<ClassSeriesResult>>,
}

impl SeriesBatch {
    /// Classes that completed.
    pub fn successes(&self) -> impl Iterator<Item = (&str, &ClassSeriesResult)> {
        self.classes.iter().filter_map(|(c, r)| r.as_ref().ok().map(|v| (c.as_str(), v)))
    }

    /// Classes that failed, with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.classes.iter().filter_map(|(c, r)| r.as_ref().err().map(|e| (c.as_str(), e)))
    }

    /// Number of classes that completed.
    pub fn n_ok(&self) -> usize {
        self.successes().count()
    }
}

/// Run the series pipeline for one class.
pub fn analyze_class(
    class: &str,
    series: &MonthlySeries,
    origin: NaiveDate,
    cfg: &SeriesConfig,
) -> Result<ClassSeriesResult> {
    let seasonal = decompose_class(class, series, &SeasonalConfig::from(cfg))?;
    let residual = fit_trend_and_residual_ar(class, &seasonal.deseasonalized, origin, cfg.max_lag)?;
    Ok(ClassSeriesResult { seasonal, residual })
}

/// Run the series pipeline for every class of `panel`.
///
/// Fails as a whole only on an empty panel or an invalid configuration.
pub fn analyze_series(panel: &Panel, cfg: &SeriesConfig) -> Result<SeriesBatch> {
    if cfg.period != DEFAULT_PERIOD {
        return Err(Error::Validation(format!(
            "series.period must be {DEFAULT_PERIOD}, got {}",
            cfg.period
        )));
    }
    if cfg.max_lag == 0 {
        return Err(Error::Validation("series.max_lag must be >= 1".into()));
    }
    let origin = panel.min_date().ok_or_else(|| {
        Error::empty_input(Scope::stage(Stage::SeasonalDecomposer), "panel has no rows")
    })?;

    let by_class: Vec<(String, MonthlySeries)> = panel.series_by_class().into_iter().collect();
    let classes: BTreeMap<String, Result<ClassSeriesResult>> = by_class
        .into_par_iter()
        .map(|(class, series)| {
            let result = analyze_class(&class, &series, origin, cfg);
            if let Err(e) = &result {
                tracing::warn!(class = %class, error = %e, "class excluded from series analysis");
            }
            (class, result)
        })
        .collect();

    let batch = SeriesBatch { origin, classes };
    tracing::info!(
        classes = batch.classes.len(),
        ok = batch.n_ok(),
        "series analysis complete"
    );
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobflow_core::PanelRow;
    use jobflow_core::types::{from_month_ordinal, month_ordinal};

    fn panel() -> Panel {
        let start = month_ordinal(NaiveDate::from_ymd_opt(2019, 1, 1).unwrap());
        let mut rows = Vec::new();
        for i in 0..36_i64 {
            let date = from_month_ordinal(start + i).unwrap();
            let season = [3, 5, 8, 6, 2, -1, -4, -6, -3, 0, 1, 2][(i % 12) as usize];
            let wobble = [0, 2, -1, 1, -2, 0, 1][(i % 7) as usize];
            rows.push(PanelRow {
                date,
                class: "long".into(),
                net_jobs: 100 + i + season + wobble,
            });
            if i >= 20 {
                rows.push(PanelRow { date, class: "short".into(), net_jobs: 50 + season });
            }
        }
        Panel::new(rows).unwrap()
    }

    #[test]
    fn one_failing_class_does_not_abort_others() {
        let batch = analyze_series(&panel(), &SeriesConfig::default()).unwrap();
        assert_eq!(batch.origin, NaiveDate::from_ymd_opt(2019, 1, 1).unwrap());
        assert_eq!(batch.classes.len(), 2);
        assert_eq!(batch.n_ok(), 1);
        let long = batch.classes["long"].as_ref().unwrap();
        assert_eq!(long.residual.trend.t[0], 0.0);
        let (class, err) = batch.failures().next().unwrap();
        assert_eq!(class, "short");
        assert!(matches!(err, Error::InsufficientHistory { .. }));
    }

    #[test]
    fn invalid_config_fails_up_front() {
        let cfg = SeriesConfig { max_lag: 0, ..SeriesConfig::default() };
        assert!(matches!(analyze_series(&panel(), &cfg).unwrap_err(), Error::Validation(_)));
        let cfg = SeriesConfig { period: 4, ..SeriesConfig::default() };
        assert!(analyze_series(&panel(), &cfg).is_err());
    }
}
