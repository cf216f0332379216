//! Analysis configuration: treatment assignment, series modeling and DiD inference.
//!
//! Read from YAML or JSON (YAML is a superset of JSON, so one parser covers both).

use std::collections::BTreeSet;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Seasonal period of a monthly series.
pub const DEFAULT_PERIOD: usize = 12;

/// Largest autoregressive order searched by default.
pub const DEFAULT_MAX_LAG: usize = 6;

/// Two-sided confidence level of reported intervals.
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

/// Heteroskedasticity-consistent covariance flavour for the DiD regression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RobustCovariance {
    /// White sandwich, no small-sample correction.
    Hc0,
    /// White sandwich scaled by `n / (n - k)`.
    Hc1,
}

impl RobustCovariance {
    /// Scale applied to the HC0 sandwich for `n` observations and `k` estimated parameters.
    pub fn small_sample_scale(self, n: usize, k: usize) -> f64 {
        match self {
            RobustCovariance::Hc0 => 1.0,
            RobustCovariance::Hc1 => n as f64 / (n as f64 - k as f64),
        }
    }
}

/// Covariance used when none is configured: HC1.
pub const DEFAULT_ROBUST_COVARIANCE: RobustCovariance = RobustCovariance::Hc1;

impl Default for RobustCovariance {
    fn default() -> Self {
        DEFAULT_ROBUST_COVARIANCE
    }
}

/// Which classes are treated and from which month on.
///
/// Immutable once built: it partitions classes into treated/control and dates into pre/post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentConfig {
    treatment_classes: BTreeSet<String>,
    treatment_start: NaiveDate,
}

impl TreatmentConfig {
    /// Build from class labels and a start date.
    pub fn new<I, S>(treatment_classes: I, treatment_start: NaiveDate) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            treatment_classes: treatment_classes.into_iter().map(Into::into).collect(),
            treatment_start,
        }
    }

    /// Build from class labels and a `YYYY-MM-DD` start date.
    pub fn parse<I, S>(treatment_classes: I, treatment_start: &str) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let start = NaiveDate::parse_from_str(treatment_start.trim(), "%Y-%m-%d").map_err(|e| {
            Error::Validation(format!("treatment_start '{treatment_start}' is not YYYY-MM-DD: {e}"))
        })?;
        Ok(Self::new(treatment_classes, start))
    }

    /// Treated class labels.
    pub fn treatment_classes(&self) -> &BTreeSet<String> {
        &self.treatment_classes
    }

    /// First post-treatment date (inclusive).
    pub fn treatment_start(&self) -> NaiveDate {
        self.treatment_start
    }

    /// Class membership in the treated group.
    pub fn is_treated(&self, class: &str) -> bool {
        self.treatment_classes.contains(class)
    }

    /// `date >= treatment_start`.
    pub fn is_post(&self, date: NaiveDate) -> bool {
        date >= self.treatment_start
    }
}

/// Inclusive date range used to fit seasonal profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceWindow {
    /// First month of the window.
    pub start: NaiveDate,
    /// Last month of the window.
    pub end: NaiveDate,
}

impl ReferenceWindow {
    /// Build a window, rejecting `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::Validation(format!(
                "reference window start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// `start <= date <= end`.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Path-B settings: seasonal decomposition and residual AR search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesConfig {
    /// Seasonal period (must be 12: profiles are keyed by calendar month).
    pub period: usize,
    /// Largest AR order searched.
    pub max_lag: usize,
    /// Seasonal fitting window; `None` means the whole panel span.
    pub reference_window: Option<ReferenceWindow>,
    /// Run STL with robustness iterations.
    pub robust: bool,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            max_lag: DEFAULT_MAX_LAG,
            reference_window: None,
            robust: false,
        }
    }
}

/// Path-A inference settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DidConfig {
    /// Robust covariance flavour.
    pub covariance: RobustCovariance,
    /// Two-sided confidence level for intervals.
    pub confidence_level: f64,
}

impl Default for DidConfig {
    fn default() -> Self {
        Self { covariance: DEFAULT_ROBUST_COVARIANCE, confidence_level: DEFAULT_CONFIDENCE_LEVEL }
    }
}

/// Top-level analysis configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Treatment assignment.
    pub treatment: TreatmentConfig,
    /// Seasonal/AR settings.
    #[serde(default)]
    pub series: SeriesConfig,
    /// DiD inference settings.
    #[serde(default)]
    pub did: DidConfig,
}

impl AnalysisConfig {
    /// Parse and validate a YAML or JSON document.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let cfg: AnalysisConfig = serde_yaml_ng::from_slice(bytes)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_slice(&bytes)
    }

    /// Semantic checks that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.series.period != DEFAULT_PERIOD {
            return Err(Error::Validation(format!(
                "period must be {DEFAULT_PERIOD} (monthly seasonality), got {}",
                self.series.period
            )));
        }
        if self.series.max_lag == 0 {
            return Err(Error::Validation("max_lag must be >= 1".to_string()));
        }
        if let Some(w) = &self.series.reference_window {
            ReferenceWindow::new(w.start, w.end)?;
        }
        let cl = self.did.confidence_level;
        if !(cl.is_finite() && cl > 0.0 && cl < 1.0) {
            return Err(Error::Validation(format!("confidence_level must be in (0, 1), got {cl}")));
        }
        Ok(())
    }
}
