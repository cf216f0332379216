//! Autoregressive models by conditional least squares, with AIC order search.
//!
//! `y_t = c + φ_1 y_{t−1} + … + φ_p y_{t−p} + e_t`.
//!
//! Orders are compared on a common sample that holds back the first `max_lag`
//! observations, so every candidate's likelihood is computed on the same data.
//! On short series an order the common sample cannot carry is fitted on its own
//! sample instead (`hold_back = p`); orders neither sample can carry are dropped
//! and logged. The selected order is then refit on its own full conditional sample.

use jobflow_core::{Error, Result, Scope, Stage};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;

use super::acf::{LjungBox, acf, default_nlags, ljung_box};
use crate::ols::least_squares;

/// Relative AIC margin a higher order must beat the incumbent by.
pub const AIC_TIE_TOLERANCE: f64 = 1e-9;

fn scope() -> Scope {
    Scope::stage(Stage::ArModeler)
}

/// AIC of one candidate order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OrderCandidate {
    /// AR order.
    pub order: usize,
    /// `−2·llf + 2·(order + 2)`.
    pub aic: f64,
    /// Observations the AIC was computed on.
    pub nobs: usize,
}

/// Single AR(p) fit.
#[derive(Debug, Clone, Serialize)]
pub struct ArFit {
    /// Order `p`.
    pub order: usize,
    /// Constant `c`.
    pub intercept: f64,
    /// `φ_1..φ_p`.
    pub coefficients: Vec<f64>,
    /// MLE innovation variance `rss / nobs`.
    pub sigma2: f64,
    /// Log-likelihood.
    pub llf: f64,
    /// `−2·llf + 2·(p + 2)`.
    pub aic: f64,
    /// Observations used (`n − hold_back`).
    pub nobs: usize,
    /// One-step fitted values for the used observations.
    pub fitted: Vec<f64>,
    /// Innovations for the used observations.
    pub residuals: Vec<f64>,
}

/// Conditional OLS AR(`order`) with a constant, using observations `hold_back..n`.
///
/// `None` when `order` is zero, `hold_back < order`, the sample leaves no
/// residual degrees of freedom, or the lag matrix is singular.
pub fn fit_ar_conditional(y: &[f64], order: usize, hold_back: usize) -> Option<ArFit> {
    let n = y.len();
    if order == 0 || hold_back < order || n <= hold_back {
        return None;
    }
    let nobs = n - hold_back;
    if nobs <= order + 1 {
        return None;
    }

    let x = DMatrix::from_fn(nobs, order + 1, |i, j| {
        if j == 0 { 1.0 } else { y[hold_back + i - j] }
    });
    let resp = DVector::from_column_slice(&y[hold_back..]);
    let fit = least_squares(&x, &resp)?;

    let llf = fit.log_likelihood();
    Some(ArFit {
        order,
        intercept: fit.beta[0],
        coefficients: fit.beta.iter().skip(1).copied().collect(),
        sigma2: fit.rss / nobs as f64,
        llf,
        aic: fit.aic(order + 2),
        nobs,
        fitted: fit.fitted.iter().copied().collect(),
        residuals: fit.residuals.iter().copied().collect(),
    })
}

/// AR(`order`) on its own conditional sample (first `order` values held back).
pub fn fit_ar(y: &[f64], order: usize) -> Option<ArFit> {
    fit_ar_conditional(y, order, order)
}

/// Pick the AIC-minimizing order.
///
/// Candidates are scanned by ascending order; a later order replaces the
/// incumbent only if `aic < best − AIC_TIE_TOLERANCE·max(1, |best|)`, so ties
/// resolve to the smaller order. NaN AICs are ignored.
pub fn select_order(candidates: &[OrderCandidate]) -> Option<usize> {
    let mut sorted: Vec<&OrderCandidate> = candidates.iter().filter(|c| !c.aic.is_nan()).collect();
    sorted.sort_by_key(|c| c.order);

    let mut best: Option<&OrderCandidate> = None;
    for c in sorted {
        match best {
            None => best = Some(c),
            Some(b) => {
                let margin = AIC_TIE_TOLERANCE * b.aic.abs().max(1.0);
                if c.aic < b.aic - margin {
                    best = Some(c);
                }
            }
        }
    }
    best.map(|c| c.order)
}

/// Selected AR model with residual diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ArModel {
    /// Fit of the selected order on its own conditional sample.
    pub fit: ArFit,
    /// AIC of the selected order on the common sample.
    pub aic: f64,
    /// AIC of every feasible order.
    pub candidates: Vec<OrderCandidate>,
    /// ACF of the innovations, lags `0..=default_nlags(nobs)`.
    pub residual_acf: Vec<f64>,
    /// Ljung–Box test on `residual_acf` (df reduced by the AR order).
    pub ljung_box: Option<LjungBox>,
}

impl ArModel {
    /// Selected order.
    pub fn order(&self) -> usize {
        self.fit.order
    }
}

/// Fit AR(1)..=AR(`max_lag`) and keep the AIC-best order.
pub fn fit_ar_grid(y: &[f64], max_lag: usize) -> Result<ArModel> {
    if max_lag == 0 {
        return Err(Error::Validation("max_lag must be >= 1".into()));
    }
    let n = y.len();
    if n < max_lag + 2 {
        return Err(Error::insufficient_observations(
            scope(),
            format!("AR search up to lag {max_lag} needs {} observations, got {n}", max_lag + 2),
        ));
    }

    let mut candidates = Vec::with_capacity(max_lag);
    let mut own_sample = Vec::new();
    let mut skipped = Vec::new();
    for p in 1..=max_lag {
        let fit = fit_ar_conditional(y, p, max_lag).or_else(|| {
            let f = fit_ar_conditional(y, p, p);
            if f.is_some() {
                own_sample.push(p);
            }
            f
        });
        match fit {
            Some(f) => candidates.push(OrderCandidate { order: p, aic: f.aic, nobs: f.nobs }),
            None => skipped.push(p),
        }
    }
    if !own_sample.is_empty() {
        tracing::debug!(?own_sample, n, "AR orders fitted on their own sample");
    }
    if !skipped.is_empty() {
        tracing::warn!(?skipped, n, max_lag, "AR orders not estimable; left out of the search");
    }
    let order = select_order(&candidates).ok_or_else(|| {
        Error::insufficient_observations(
            scope(),
            format!("no AR order in 1..={max_lag} is estimable from {} observations", y.len()),
        )
    })?;
    let aic = candidates.iter().find(|c| c.order == order).map_or(f64::NAN, |c| c.aic);

    let fit = fit_ar(y, order).ok_or_else(|| {
        Error::insufficient_variation(scope(), format!("AR({order}) refit is singular"))
    })?;

    let nlags = default_nlags(fit.residuals.len());
    let residual_acf = acf(&fit.residuals, nlags).unwrap_or_default();
    let ljung_box = (residual_acf.len() > 1)
        .then(|| ljung_box(&residual_acf, fit.residuals.len(), order));

    tracing::debug!(order, aic, n_candidates = candidates.len(), "AR order selected");

    Ok(ArModel { fit, aic, candidates, residual_acf, ljung_box })
}
