//! Causal inference on the employment panel.
//!
//! This module provides:
//! - **Treatment assignment**: `treated`, `post` and `treated_post` indicators.
//! - **Two-way fixed effects** absorption (class × month) by alternating
//!   projections, used to check identification of the interaction.
//! - **Difference-in-Differences** with class and month fixed effects and
//!   heteroskedasticity-robust (HC0/HC1) inference.

pub mod did;
pub mod hdfe;
pub mod treatment;

pub use did::{CoefficientSummary, DidModel, DidOptions, estimate, estimate_with};
pub use hdfe::{Absorbed, TwoWayFixedEffects};
pub use treatment::{DidRow, assign};
