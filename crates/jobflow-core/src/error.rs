//! Error types for jobflow

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Pipeline stage an analysis error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Panel validation and parsing.
    PanelReader,
    /// Treated/post labelling.
    TreatmentAssigner,
    /// Fixed-effects DiD regression.
    DidEstimator,
    /// Normalization + STL + seasonal profile.
    SeasonalDecomposer,
    /// Quadratic trend fit.
    TrendModeler,
    /// Augmented Dickey-Fuller test on trend residuals.
    StationarityTest,
    /// Autoregressive order selection.
    ArModeler,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::PanelReader => "panel reader",
            Stage::TreatmentAssigner => "treatment assigner",
            Stage::DidEstimator => "DiD estimator",
            Stage::SeasonalDecomposer => "seasonal decomposer",
            Stage::TrendModeler => "trend modeler",
            Stage::StationarityTest => "stationarity test",
            Stage::ArModeler => "AR modeler",
        };
        f.write_str(name)
    }
}

/// Where an error happened: the stage and, for per-class work, the class label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    /// Stage that failed.
    pub stage: Stage,
    /// Offending class, if the stage runs per class.
    pub class: Option<String>,
}

impl Scope {
    /// Scope covering a whole stage.
    pub fn stage(stage: Stage) -> Self {
        Self { stage, class: None }
    }

    /// Scope for one class inside a stage.
    pub fn class(stage: Stage, class: impl Into<String>) -> Self {
        Self { stage, class: Some(class.into()) }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.class {
            Some(class) => write!(f, "{} (class '{}')", self.stage, class),
            None => write!(f, "{}", self.stage),
        }
    }
}

/// jobflow error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reading/writing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// Configuration or argument validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// A stage received no rows/observations at all.
    #[error("empty input in {scope}: {reason}")]
    EmptyInput {
        /// Failing stage/class.
        scope: Scope,
        /// Human-readable cause.
        reason: String,
    },

    /// A regressor is constant or collinear, so the model is not identified.
    #[error("insufficient variation in {scope}: {reason}")]
    InsufficientVariation {
        /// Failing stage/class.
        scope: Scope,
        /// Human-readable cause.
        reason: String,
    },

    /// The seasonal reference window is shorter than two full periods.
    #[error("insufficient history in {scope}: {reason}")]
    InsufficientHistory {
        /// Failing stage/class.
        scope: Scope,
        /// Human-readable cause.
        reason: String,
    },

    /// Too few points for the requested autoregressive order.
    #[error("insufficient observations in {scope}: {reason}")]
    InsufficientObservations {
        /// Failing stage/class.
        scope: Scope,
        /// Human-readable cause.
        reason: String,
    },

    /// Missing fields, duplicate (date, class) pairs or unparseable values.
    #[error("malformed panel in {scope}: {reason}")]
    MalformedPanel {
        /// Failing stage/class.
        scope: Scope,
        /// Human-readable cause.
        reason: String,
    },
}

impl Error {
    /// Build an [`Error::EmptyInput`].
    pub fn empty_input(scope: Scope, reason: impl Into<String>) -> Self {
        Error::EmptyInput { scope, reason: reason.into() }
    }

    /// Build an [`Error::InsufficientVariation`].
    pub fn insufficient_variation(scope: Scope, reason: impl Into<String>) -> Self {
        Error::InsufficientVariation { scope, reason: reason.into() }
    }

    /// Build an [`Error::InsufficientHistory`].
    pub fn insufficient_history(scope: Scope, reason: impl Into<String>) -> Self {
        Error::InsufficientHistory { scope, reason: reason.into() }
    }

    /// Build an [`Error::InsufficientObservations`].
    pub fn insufficient_observations(scope: Scope, reason: impl Into<String>) -> Self {
        Error::InsufficientObservations { scope, reason: reason.into() }
    }

    /// Build an [`Error::MalformedPanel`].
    pub fn malformed_panel(scope: Scope, reason: impl Into<String>) -> Self {
        Error::MalformedPanel { scope, reason: reason.into() }
    }

    /// Stage/class the error is attributed to, if it came from an analysis stage.
    pub fn scope(&self) -> Option<&Scope> {
        match self {
            Error::EmptyInput { scope, .. }
            | Error::InsufficientVariation { scope, .. }
            | Error::InsufficientHistory { scope, .. }
            | Error::InsufficientObservations { scope, .. }
            | Error::MalformedPanel { scope, .. } => Some(scope),
            _ => None,
        }
    }

    /// Re-attribute a per-class analysis error to `class` (no-op for other variants).
    pub fn for_class(mut self, class: &str) -> Self {
        if let Error::EmptyInput { scope, .. }
        | Error::InsufficientVariation { scope, .. }
        | Error::InsufficientHistory { scope, .. }
        | Error::InsufficientObservations { scope, .. }
        | Error::MalformedPanel { scope, .. } = &mut self
        {
            scope.class = Some(class.to_string());
        }
        self
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_names_stage_and_class() {
        let err = Error::insufficient_history(
            Scope::class(Stage::SeasonalDecomposer, "Top 10 aut"),
            "reference window has 18 months, need 24",
        );
        let msg = err.to_string();
        assert!(msg.contains("seasonal decomposer"), "{msg}");
        assert!(msg.contains("Top 10 aut"), "{msg}");
        assert!(msg.contains("need 24"), "{msg}");
    }

    #[test]
    fn for_class_rewrites_scope() {
        let err = Error::insufficient_observations(Scope::stage(Stage::ArModeler), "too short")
            .for_class("Bottom 10 pct");
        assert_eq!(err.scope().and_then(|s| s.class.as_deref()), Some("Bottom 10 pct"));

        let plain = Error::Validation("bad".into()).for_class("x");
        assert!(plain.scope().is_none());
    }
}
