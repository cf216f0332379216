//! Common data types for jobflow

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{Error, ReferenceWindow, Result};

/// Build the first-of-month date for `(year, month)`.
///
/// Month is 1-based. Out-of-range months are a validation error.
pub fn first_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| Error::Validation(format!("invalid year/month: {year}-{month:02}")))
}

/// Truncate a date to the first day of its month.
pub fn truncate_to_month(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.day0()))
}

/// Months since year 0 (`year * 12 + month0`). Differences give elapsed months.
#[inline]
pub fn month_ordinal(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

/// Inverse of [`month_ordinal`]; returns the first-of-month date.
pub fn from_month_ordinal(ordinal: i64) -> Option<NaiveDate> {
    let year = i32::try_from(ordinal.div_euclid(12)).ok()?;
    let month0 = ordinal.rem_euclid(12) as u32;
    NaiveDate::from_ymd_opt(year, month0 + 1, 1)
}

/// Whole months elapsed from `from` to `to` (negative if `to` is earlier).
#[inline]
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    month_ordinal(to) - month_ordinal(from)
}

/// One `(date, class)` cell of the employment panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelRow {
    /// First-of-month date.
    pub date: NaiveDate,
    /// Occupation exposure class label (e.g. "Top 10 aut").
    pub class: String,
    /// Hires minus separations.
    pub net_jobs: i64,
}

/// Raw per-occupation monthly flow, before aggregation to `(date, class)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyRecord {
    /// Calendar year.
    pub year: i32,
    /// Calendar month, 1-based.
    pub month: u32,
    /// Occupation exposure class label.
    pub class: String,
    /// Hires minus separations.
    pub net_jobs: i64,
}

/// Monthly series with strictly increasing first-of-month dates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySeries {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl MonthlySeries {
    /// Create a series, validating date order and finiteness.
    pub fn new(dates: Vec<NaiveDate>, values: Vec<f64>) -> Result<Self> {
        if dates.len() != values.len() {
            return Err(Error::Validation(format!(
                "series has {} dates but {} values",
                dates.len(),
                values.len()
            )));
        }
        for (i, d) in dates.iter().enumerate() {
            if d.day() != 1 {
                return Err(Error::Validation(format!("series date {d} is not first-of-month")));
            }
            if i > 0 && dates[i - 1] >= *d {
                return Err(Error::Validation(format!(
                    "series dates must be strictly increasing ({} then {})",
                    dates[i - 1],
                    d
                )));
            }
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::Validation("series must contain only finite values".to_string()));
        }
        Ok(Self { dates, values })
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the series has no points.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Dates, ascending.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Values aligned with [`Self::dates`].
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Iterate `(date, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.dates.iter().copied().zip(self.values.iter().copied())
    }

    /// Arithmetic mean of the values.
    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    /// Same dates, values transformed by `f(date, value)`.
    pub fn map(&self, mut f: impl FnMut(NaiveDate, f64) -> f64) -> Self {
        let values = self.iter().map(|(d, v)| f(d, v)).collect();
        Self { dates: self.dates.clone(), values }
    }

    /// Points inside `window` (bounds inclusive).
    pub fn window(&self, window: &ReferenceWindow) -> Self {
        let (dates, values) = self.iter().filter(|(d, _)| window.contains(*d)).unzip();
        Self { dates, values }
    }
}
