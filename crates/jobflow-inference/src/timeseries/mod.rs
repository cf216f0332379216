//! Monthly series modeling: seasonal profiles, trends and residual AR models.

/// Sample ACF and Ljung–Box.
pub mod acf;
/// Augmented Dickey–Fuller test.
pub mod adf;
/// AR(p) fitting and AIC order selection.
pub mod autoreg;
/// Trend + ADF + AR pipeline for one class.
pub mod residual;
/// Calendar-month seasonal profiles.
pub mod seasonal;
/// AR process simulation.
pub mod simulate;
/// STL decomposition.
pub mod stl;
/// Quadratic trend.
pub mod trend;
