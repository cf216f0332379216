//! # jobflow-core
//!
//! Shared types for jobflow: the validated employment panel, monthly series,
//! analysis configuration and the error type every stage reports through.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Analysis configuration (treatment, series, DiD inference).
pub mod config;
/// Error type and stage attribution.
pub mod error;
/// Panel reader: validation, CSV I/O, aggregation of raw records.
pub mod panel;
/// Panel rows, monthly series and month arithmetic.
pub mod types;

pub use config::{
    AnalysisConfig, DEFAULT_CONFIDENCE_LEVEL, DEFAULT_MAX_LAG, DEFAULT_PERIOD,
    DEFAULT_ROBUST_COVARIANCE, DidConfig, ReferenceWindow, RobustCovariance, SeriesConfig,
    TreatmentConfig,
};
pub use error::{Error, Result, Scope, Stage};
pub use panel::Panel;
pub use types::{MonthlyRecord, MonthlySeries, PanelRow};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
