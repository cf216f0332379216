//! Per-class seasonal profiles.
//!
//! Each class series is normalized by its mean, the reference window is
//! decomposed with STL, and the seasonal component is averaged by calendar
//! month into a 12-factor [`SeasonalProfile`]. The profile is then subtracted
//! from the full normalized series.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use jobflow_core::types::{from_month_ordinal, month_ordinal};
use jobflow_core::{
    DEFAULT_PERIOD, Error, MonthlySeries, ReferenceWindow, Result, Scope, SeriesConfig, Stage,
};
use serde::Serialize;

use super::stl::{StlParams, StlResult, stl};

/// Settings for [`decompose_class`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeasonalConfig {
    /// Observations per cycle. Only 12 is accepted.
    pub period: usize,
    /// Window the profile is estimated on; `None` uses the whole series.
    pub reference_window: Option<ReferenceWindow>,
    /// Use robust STL iterations.
    pub robust: bool,
}

impl Default for SeasonalConfig {
    fn default() -> Self {
        Self { period: DEFAULT_PERIOD, reference_window: None, robust: false }
    }
}

impl From<&SeriesConfig> for SeasonalConfig {
    fn from(cfg: &SeriesConfig) -> Self {
        Self { period: cfg.period, reference_window: cfg.reference_window, robust: cfg.robust }
    }
}

/// Twelve additive seasonal factors, indexed by calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeasonalProfile {
    factors: [f64; 12],
}

impl SeasonalProfile {
    /// Wrap factors for January..=December.
    pub fn from_factors(factors: [f64; 12]) -> Self {
        Self { factors }
    }

    /// Factors for January..=December.
    pub fn factors(&self) -> &[f64; 12] {
        &self.factors
    }

    /// Factor for calendar `month` (1–12). Any other month is a validation error.
    pub fn factor(&self, month: u32) -> Result<f64> {
        match month {
            1..=12 => Ok(self.factors[(month - 1) as usize]),
            _ => Err(Error::Validation(format!("seasonal profile has no month {month}"))),
        }
    }

    /// Factor for the calendar month of `date`.
    pub fn factor_for(&self, date: NaiveDate) -> f64 {
        self.factors[date.month0() as usize]
    }

    /// Calendar month (1–12) with the largest factor; the earliest wins ties.
    pub fn peak_month(&self) -> u32 {
        let mut best = 0;
        for (i, f) in self.factors.iter().enumerate() {
            if *f > self.factors[best] {
                best = i;
            }
        }
        best as u32 + 1
    }

    /// `max − min` of the factors.
    pub fn amplitude(&self) -> f64 {
        let max = self.factors.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = self.factors.iter().copied().fold(f64::INFINITY, f64::min);
        max - min
    }
}

/// Seasonal decomposition of one class.
#[derive(Debug, Clone)]
pub struct SeasonalFit {
    /// Class label.
    pub class: String,
    /// Mean of the raw class series (the normalizing constant).
    pub class_mean: f64,
    /// Full series divided by `class_mean`.
    pub normalized: MonthlySeries,
    /// Gap-free normalized series over the reference window (input to STL).
    pub reference: MonthlySeries,
    /// Months of `reference` that were filled by interpolation.
    pub interpolated_months: Vec<NaiveDate>,
    /// STL components over `reference`.
    pub stl: StlResult,
    /// Calendar-month profile.
    pub profile: SeasonalProfile,
    /// `normalized − profile[month]` over the full series.
    pub deseasonalized: MonthlySeries,
}

impl SeasonalFit {
    /// Add the profile back to the deseasonalized series.
    pub fn reseasonalize(&self) -> MonthlySeries {
        reseasonalize(&self.deseasonalized, &self.profile)
    }
}

fn scope(class: &str) -> Scope {
    Scope::class(Stage::SeasonalDecomposer, class)
}

/// Divide by the series mean. Returns `(mean, normalized)`.
pub fn normalize(class: &str, series: &MonthlySeries) -> Result<(f64, MonthlySeries)> {
    let mean = series
        .mean()
        .ok_or_else(|| Error::empty_input(scope(class), "series has no observations"))?;
    if mean == 0.0 {
        return Err(Error::insufficient_variation(
            scope(class),
            "series mean is zero; cannot normalize",
        ));
    }
    Ok((mean, series.map(|_, v| v / mean)))
}

/// `value − profile[month(date)]`.
pub fn deseasonalize(series: &MonthlySeries, profile: &SeasonalProfile) -> MonthlySeries {
    series.map(|d, v| v - profile.factor_for(d))
}

/// `value + profile[month(date)]`.
pub fn reseasonalize(series: &MonthlySeries, profile: &SeasonalProfile) -> MonthlySeries {
    series.map(|d, v| v + profile.factor_for(d))
}

/// Gap-free monthly grid from the first to the last point, with missing months
/// linearly interpolated. Returns the grid and the filled months.
fn fill_monthly_grid(series: &MonthlySeries) -> Result<(MonthlySeries, Vec<NaiveDate>)> {
    let points: Vec<(i64, f64)> = series.iter().map(|(d, v)| (month_ordinal(d), v)).collect();
    let (Some(&(lo, _)), Some(&(hi, _))) = (points.first(), points.last()) else {
        return Ok((series.clone(), Vec::new()));
    };

    let len = (hi - lo + 1) as usize;
    let mut dates = Vec::with_capacity(len);
    let mut values = Vec::with_capacity(len);
    let mut filled = Vec::new();
    let mut next = 0;
    for ord in lo..=hi {
        let date = from_month_ordinal(ord)
            .ok_or_else(|| Error::Validation(format!("month ordinal {ord} out of range")))?;
        if points[next].0 == ord {
            values.push(points[next].1);
            next += 1;
        } else {
            let (x0, y0) = points[next - 1];
            let (x1, y1) = points[next];
            let frac = (ord - x0) as f64 / (x1 - x0) as f64;
            values.push(y0 + frac * (y1 - y0));
            filled.push(date);
        }
        dates.push(date);
    }
    Ok((MonthlySeries::new(dates, values)?, filled))
}

/// Decompose one class series.
///
/// Errors: `Validation` unless `period == 12`; `EmptyInput` for an empty series;
/// `InsufficientVariation` for a zero mean; `InsufficientHistory` when the
/// reference grid spans fewer than two periods.
pub fn decompose_class(
    class: &str,
    series: &MonthlySeries,
    cfg: &SeasonalConfig,
) -> Result<SeasonalFit> {
    if cfg.period != DEFAULT_PERIOD {
        return Err(Error::Validation(format!(
            "seasonal period must be {DEFAULT_PERIOD} (profiles are keyed by calendar month), \
             got {}",
            cfg.period
        )));
    }
    let (class_mean, normalized) = normalize(class, series)?;

    let in_window = match cfg.reference_window {
        Some(w) => normalized.window(&w),
        None => normalized.clone(),
    };
    let (reference, interpolated_months) = fill_monthly_grid(&in_window)?;
    let needed = 2 * cfg.period;
    if reference.len() < needed {
        return Err(Error::insufficient_history(
            scope(class),
            format!(
                "reference window covers {} months, need at least {needed}",
                reference.len()
            ),
        ));
    }

    let params = StlParams::new(cfg.period).robust(cfg.robust);
    let stl = stl(reference.values(), &params)?;

    let mut sums = [0.0_f64; 12];
    let mut counts = [0_usize; 12];
    for (d, s) in reference.dates().iter().zip(&stl.seasonal) {
        let m = d.month0() as usize;
        sums[m] += s;
        counts[m] += 1;
    }
    let mut factors = [0.0_f64; 12];
    for m in 0..12 {
        factors[m] = sums[m] / counts[m] as f64;
    }
    let profile = SeasonalProfile::from_factors(factors);
    let deseasonalized = deseasonalize(&normalized, &profile);

    tracing::debug!(
        class,
        reference_months = reference.len(),
        interpolated = interpolated_months.len(),
        peak_month = profile.peak_month(),
        amplitude = profile.amplitude(),
        "seasonal profile fitted"
    );

    Ok(SeasonalFit {
        class: class.to_string(),
        class_mean,
        normalized,
        reference,
        interpolated_months,
        stl,
        profile,
        deseasonalized,
    })
}

/// Decompose every class independently.
pub fn decompose(
    series_by_class: &BTreeMap<String, MonthlySeries>,
    cfg: &SeasonalConfig,
) -> BTreeMap<String, Result<SeasonalFit>> {
    series_by_class
        .iter()
        .map(|(class, series)| (class.clone(), decompose_class(class, series, cfg)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn monthly(start_year: i32, values: Vec<f64>) -> MonthlySeries {
        let start = month_ordinal(NaiveDate::from_ymd_opt(start_year, 1, 1).unwrap());
        let dates =
            (0..values.len() as i64).map(|i| from_month_ordinal(start + i).unwrap()).collect();
        MonthlySeries::new(dates, values).unwrap()
    }

    fn sine_series(months: usize) -> MonthlySeries {
        let value = |i: usize| 10.0 + 2.0 * (2.0 * PI * (((i - 1) % 12) + 1) as f64 / 12.0).sin();
        monthly(2019, (1..=months).map(value).collect())
    }

    #[test]
    fn profile_lookup_is_strict() {
        let p = SeasonalProfile::from_factors([0.0; 12]);
        assert!(p.factor(0).is_err());
        assert!(p.factor(13).is_err());
        assert_eq!(p.factor(12).unwrap(), 0.0);
    }

    #[test]
    fn profile_has_twelve_centered_factors() {
        let fit = decompose_class("A", &sine_series(48), &SeasonalConfig::default()).unwrap();
        assert_eq!(fit.profile.factors().len(), 12);
        let mean: f64 = fit.profile.factors().iter().sum::<f64>() / 12.0;
        assert!(mean.abs() < 0.01, "mean factor {mean}");
        assert_relative_eq!(fit.normalized.mean().unwrap(), 1.0, epsilon = 1e-12);
        assert_eq!(fit.profile.peak_month(), 3);
    }

    #[test]
    fn reseasonalize_round_trips() {
        let fit = decompose_class("A", &sine_series(36), &SeasonalConfig::default()).unwrap();
        let back = fit.reseasonalize();
        assert_eq!(back.dates(), fit.normalized.dates());
        for (a, b) in back.values().iter().zip(fit.normalized.values()) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn gaps_inside_window_are_interpolated() {
        let full = sine_series(36);
        let keep: Vec<usize> = (0..36).filter(|i| *i != 10 && *i != 11).collect();
        let gappy = MonthlySeries::new(
            keep.iter().map(|&i| full.dates()[i]).collect(),
            keep.iter().map(|&i| full.values()[i]).collect(),
        )
        .unwrap();
        let fit = decompose_class("A", &gappy, &SeasonalConfig::default()).unwrap();
        assert_eq!(fit.reference.len(), 36);
        assert_eq!(fit.interpolated_months, vec![full.dates()[10], full.dates()[11]]);
        // Deseasonalized output keeps the observed dates only.
        assert_eq!(fit.deseasonalized.len(), 34);
    }

    #[test]
    fn short_window_is_insufficient_history() {
        let series = sine_series(48);
        let window = ReferenceWindow::new(
            NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2020, 11, 1).unwrap(),
        )
        .unwrap();
        let cfg = SeasonalConfig { reference_window: Some(window), ..SeasonalConfig::default() };
        let err = decompose_class("A", &series, &cfg).unwrap_err();
        assert!(matches!(err, Error::InsufficientHistory { .. }), "{err}");
    }

    #[test]
    fn zero_mean_and_bad_period() {
        let zero = monthly(2019, vec![0.0; 30]);
        let err = decompose_class("A", &zero, &SeasonalConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InsufficientVariation { .. }));

        let cfg = SeasonalConfig { period: 4, ..SeasonalConfig::default() };
        assert!(matches!(
            decompose_class("A", &sine_series(36), &cfg).unwrap_err(),
            Error::Validation(_)
        ));
    }

    #[test]
    fn classes_fail_independently() {
        let mut by_class = BTreeMap::new();
        by_class.insert("long".to_string(), sine_series(36));
        by_class.insert("short".to_string(), sine_series(12));
        let out = decompose(&by_class, &SeasonalConfig::default());
        assert!(out["long"].is_ok());
        assert!(matches!(out["short"], Err(Error::InsufficientHistory { .. })));
    }
}
