//! # jobflow-inference
//!
//! Causal and time-series analysis of the employment panel.
//!
//! This crate provides:
//! - Treatment assignment and Difference-in-Differences with class and month
//!   fixed effects (HC1-robust inference)
//! - Seasonal profiles via STL, quadratic trends, ADF tests and AR order search
//! - Parallel per-class batch runs with isolated failures
//! - Descriptive diagnostics and serializable reports
//!
//! ## Architecture
//!
//! Two independent paths share only the validated [`jobflow_core::Panel`]:
//! `assign → estimate` for the causal estimate, and `analyze_series` for the
//! per-class seasonal/trend/AR models.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Per-class series pipeline over a whole panel.
pub mod batch;
/// Group summaries, pre-trend tables and report views.
pub mod diagnostics;
/// Treatment assignment, fixed-effects absorption and DiD.
pub mod econometrics;
/// STL, seasonal profiles, trends, ADF and AR models.
pub mod timeseries;

mod ols;

pub use batch::{ClassSeriesResult, SeriesBatch, analyze_class, analyze_series};
pub use diagnostics::{
    DidReport, GroupCell, PreTrendPoint, SeriesDetail, SeriesReportEntry, group_summary,
    pre_trend_comparison, series_report,
};
pub use econometrics::{DidModel, DidOptions, DidRow, assign, estimate, estimate_with};
pub use timeseries::adf::{AdfResult, adfuller};
pub use timeseries::autoreg::{AIC_TIE_TOLERANCE, ArModel, OrderCandidate, select_order};
pub use timeseries::residual::{ResidualFit, fit_trend_and_residual_ar};
pub use timeseries::seasonal::{
    SeasonalConfig, SeasonalFit, SeasonalProfile, decompose, decompose_class,
};
pub use timeseries::simulate::simulate_ar;
pub use timeseries::stl::{StlParams, StlResult, stl};
pub use timeseries::trend::TrendModel;
