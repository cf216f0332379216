//! Difference-in-Differences with class and month fixed effects.
//!
//! Fits `net_jobs ~ treated + post + treated_post + C(class) + C(month)` by
//! least-squares dummy variables. `treated` is spanned by the class dummies and
//! `post` by the month dummies, so both are absorbed; the identified design is
//! `[intercept, treated_post, class dummies, month dummies]` with the first class
//! and the earliest month as references.
//!
//! Inference is heteroskedasticity-robust (HC1 by default) with normal
//! critical values.
//!
//! # References
//!
//! - Angrist & Pischke, *Mostly Harmless Econometrics*, Ch. 5.
//! - MacKinnon & White (1985), "Some heteroskedasticity-consistent covariance
//!   matrix estimators with improved finite sample properties."

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use jobflow_core::{
    DEFAULT_CONFIDENCE_LEVEL, DEFAULT_ROBUST_COVARIANCE, DidConfig, Error, Result,
    RobustCovariance, Scope, Stage,
};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};

use super::hdfe::TwoWayFixedEffects;
use super::treatment::DidRow;
use crate::ols::{hc0_sandwich, least_squares};

/// Name of the interaction coefficient in the coefficient table.
pub const TREATED_POST: &str = "treated_post";

/// Regressors spanned by the fixed effects and therefore not separately estimated.
pub const ABSORBED_REGRESSORS: [&str; 2] = ["treated", "post"];

fn scope() -> Scope {
    Scope::stage(Stage::DidEstimator)
}

/// Estimation options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DidOptions {
    /// Robust covariance flavour.
    pub covariance: RobustCovariance,
    /// Two-sided confidence level of the reported intervals.
    pub confidence_level: f64,
}

impl Default for DidOptions {
    fn default() -> Self {
        Self { covariance: DEFAULT_ROBUST_COVARIANCE, confidence_level: DEFAULT_CONFIDENCE_LEVEL }
    }
}

impl From<&DidConfig> for DidOptions {
    fn from(cfg: &DidConfig) -> Self {
        Self { covariance: cfg.covariance, confidence_level: cfg.confidence_level }
    }
}

/// One row of the coefficient table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoefficientSummary {
    /// Regressor name (`Intercept`, `treated_post`, `C(class)[T.x]`, `C(month)[T.YYYY-MM]`).
    pub name: String,
    /// Point estimate.
    pub estimate: f64,
    /// Robust standard error.
    pub std_error: f64,
    /// `estimate / std_error`.
    pub z_stat: f64,
    /// Two-sided normal p-value.
    pub p_value: f64,
    /// Lower confidence bound.
    pub ci_lower: f64,
    /// Upper confidence bound.
    pub ci_upper: f64,
}

/// Fitted DiD regression. Read-only once built.
#[derive(Debug, Clone)]
pub struct DidModel {
    /// Full coefficient table in design-column order.
    pub coefficients: Vec<CoefficientSummary>,
    /// Robust covariance matrix of all coefficients.
    pub covariance: DMatrix<f64>,
    /// Covariance flavour used.
    pub covariance_type: RobustCovariance,
    /// Confidence level of the intervals.
    pub confidence_level: f64,
    /// Classical standard error of `treated_post` (for comparison only).
    pub se_ols_treated_post: f64,
    /// Reference class (absorbed into the intercept).
    pub reference_class: String,
    /// Reference month (absorbed into the intercept).
    pub reference_month: NaiveDate,
    /// Class effects relative to the reference class (reference included at 0).
    pub class_effects: Vec<(String, f64)>,
    /// Month effects relative to the reference month (reference included at 0).
    pub month_effects: Vec<(NaiveDate, f64)>,
    /// Fitted values, aligned with the input rows.
    pub fitted: Vec<f64>,
    /// Residuals, aligned with the input rows.
    pub residuals: Vec<f64>,
    /// Number of observations.
    pub n_obs: usize,
    /// Number of estimated coefficients.
    pub n_params: usize,
    /// Residual sum of squares.
    pub rss: f64,
    /// Centered R².
    pub r_squared: f64,
}

impl DidModel {
    fn index_of(&self, name: &str) -> Option<usize> {
        self.coefficients.iter().position(|c| c.name == name)
    }

    /// Coefficient row by name.
    pub fn coefficient(&self, name: &str) -> Option<&CoefficientSummary> {
        self.index_of(name).map(|i| &self.coefficients[i])
    }

    /// The causal estimate: coefficient on `treated_post`.
    pub fn treatment_effect(&self) -> &CoefficientSummary {
        // Column 1 of the design is always the interaction.
        &self.coefficients[1]
    }

    /// Residual degrees of freedom.
    pub fn df_resid(&self) -> usize {
        self.n_obs - self.n_params
    }
}

impl fmt::Display for DidModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pct = self.confidence_level * 100.0;
        writeln!(
            f,
            "DiD regression: net_jobs ~ treated + post + treated_post + C(class) + C(month)"
        )?;
        writeln!(
            f,
            "obs: {}  params: {}  df_resid: {}  R²: {:.4}  covariance: {:?}",
            self.n_obs,
            self.n_params,
            self.df_resid(),
            self.r_squared,
            self.covariance_type
        )?;
        writeln!(f, "absorbed by fixed effects: {}", ABSORBED_REGRESSORS.join(", "))?;
        writeln!(
            f,
            "{:<32} {:>12} {:>12} {:>8} {:>8} {:>12} {:>12}",
            "",
            "coef",
            "std err",
            "z",
            "P>|z|",
            format!("[{:.1}%", (100.0 - pct) / 2.0),
            format!("{:.1}%]", 100.0 - (100.0 - pct) / 2.0)
        )?;
        for c in &self.coefficients {
            writeln!(
                f,
                "{:<32} {:>12.4} {:>12.4} {:>8.3} {:>8.3} {:>12.4} {:>12.4}",
                c.name, c.estimate, c.std_error, c.z_stat, c.p_value, c.ci_lower, c.ci_upper
            )?;
        }
        Ok(())
    }
}

/// Estimate with the default options (HC1, 95%).
pub fn estimate(rows: &[DidRow]) -> Result<DidModel> {
    estimate_with(rows, &DidOptions::default())
}

/// Fit the fixed-effects DiD regression.
///
/// Fails with `EmptyInput` on no rows and with `InsufficientVariation` when
/// `treated`, `post` or `treated_post` is constant, when the interaction is
/// absorbed by the fixed effects, or when no residual degrees of freedom remain.
pub fn estimate_with(rows: &[DidRow], opts: &DidOptions) -> Result<DidModel> {
    let n = rows.len();
    if n == 0 {
        return Err(Error::empty_input(scope(), "no DiD rows to estimate on"));
    }
    let cl = opts.confidence_level;
    if !(cl.is_finite() && cl > 0.0 && cl < 1.0) {
        return Err(Error::Validation(format!("confidence_level must be in (0, 1), got {cl}")));
    }

    let indicators: [(&str, fn(&DidRow) -> u8); 3] = [
        ("treated", |r| r.treated),
        ("post", |r| r.post),
        (TREATED_POST, |r| r.treated_post),
    ];
    for (name, pick) in indicators {
        let first = pick(&rows[0]);
        if rows.iter().all(|r| pick(r) == first) {
            return Err(Error::insufficient_variation(
                scope(),
                format!("'{name}' is constant ({first}) across all {n} rows"),
            ));
        }
    }

    // Dense level indices: classes sorted by label, months ascending.
    let class_levels: BTreeMap<&str, usize> = {
        let mut m: BTreeMap<&str, usize> = rows.iter().map(|r| (r.class.as_str(), 0)).collect();
        for (i, v) in m.values_mut().enumerate() {
            *v = i;
        }
        m
    };
    let month_levels: BTreeMap<NaiveDate, usize> = {
        let mut m: BTreeMap<NaiveDate, usize> = rows.iter().map(|r| (r.date, 0)).collect();
        for (i, v) in m.values_mut().enumerate() {
            *v = i;
        }
        m
    };
    let class_idx: Vec<usize> = rows.iter().map(|r| class_levels[r.class.as_str()]).collect();
    let month_idx: Vec<usize> = rows.iter().map(|r| month_levels[&r.date]).collect();

    // Identification gate on the interaction, after absorbing both sets of effects.
    let fe = TwoWayFixedEffects::new(class_idx.clone(), month_idx.clone())?;
    let components = fe.connected_components();
    if components > 1 {
        return Err(Error::insufficient_variation(
            scope(),
            format!("class and month effects split into {components} disconnected groups"),
        ));
    }
    let tp: Vec<f64> = rows.iter().map(|r| f64::from(r.treated_post)).collect();
    let tp_within = fe.partial_out(&tp)?;
    let tp_mean = tp.iter().sum::<f64>() / n as f64;
    let ss_total: f64 = tp.iter().map(|v| (v - tp_mean).powi(2)).sum();
    let ss_within: f64 = tp_within.resid.iter().map(|v| v * v).sum();
    // An unconverged residual is not trusted here; the rank check of the full
    // design below still rejects a collinear interaction.
    if tp_within.converged && ss_within <= 1e-10 * ss_total {
        return Err(Error::insufficient_variation(
            scope(),
            "treated_post is collinear with the class and month fixed effects",
        ));
    }

    let n_class = class_levels.len();
    let n_month = month_levels.len();
    let k = 2 + (n_class - 1) + (n_month - 1);
    debug_assert_eq!(k, fe.degrees_of_freedom_absorbed() + 1);
    if n <= k {
        return Err(Error::insufficient_variation(
            scope(),
            format!("{n} rows leave no residual degrees of freedom for {k} coefficients"),
        ));
    }

    let mut x = DMatrix::<f64>::zeros(n, k);
    for (i, r) in rows.iter().enumerate() {
        x[(i, 0)] = 1.0;
        x[(i, 1)] = tp[i];
        if class_idx[i] > 0 {
            x[(i, 1 + class_idx[i])] = 1.0;
        }
        if month_idx[i] > 0 {
            x[(i, n_class + month_idx[i])] = 1.0;
        }
        debug_assert_eq!(f64::from(r.treated_post), tp[i]);
    }
    let y = DVector::from_iterator(n, rows.iter().map(|r| r.net_jobs as f64));

    let fit = least_squares(&x, &y).ok_or_else(|| {
        Error::insufficient_variation(scope(), "fixed-effects design matrix is singular")
    })?;

    let scale = opts.covariance.small_sample_scale(n, k);
    let covariance = hc0_sandwich(&x, &fit.residuals, &fit.xtx_inv) * scale;

    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| Error::Validation(format!("failed to construct normal distribution: {e}")))?;
    let z_crit = normal.inverse_cdf(0.5 + 0.5 * cl);

    let mut names = Vec::with_capacity(k);
    names.push("Intercept".to_string());
    names.push(TREATED_POST.to_string());
    names.extend(class_levels.keys().skip(1).map(|c| format!("C(class)[T.{c}]")));
    names.extend(month_levels.keys().skip(1).map(|d| format!("C(month)[T.{}]", d.format("%Y-%m"))));

    let coefficients: Vec<CoefficientSummary> = names
        .into_iter()
        .enumerate()
        .map(|(j, name)| {
            let estimate = fit.beta[j];
            let std_error = covariance[(j, j)].max(0.0).sqrt();
            let z_stat = if std_error > 0.0 { estimate / std_error } else { f64::NAN };
            let p_value = if z_stat.is_finite() {
                2.0 * (1.0 - normal.cdf(z_stat.abs()))
            } else {
                f64::NAN
            };
            CoefficientSummary {
                name,
                estimate,
                std_error,
                z_stat,
                p_value,
                ci_lower: estimate - z_crit * std_error,
                ci_upper: estimate + z_crit * std_error,
            }
        })
        .collect();

    let class_effects = class_levels
        .keys()
        .enumerate()
        .map(|(i, c)| (c.to_string(), if i == 0 { 0.0 } else { fit.beta[1 + i] }))
        .collect();
    let month_effects = month_levels
        .keys()
        .enumerate()
        .map(|(i, d)| (*d, if i == 0 { 0.0 } else { fit.beta[n_class + i] }))
        .collect();

    let y_mean = y.mean();
    let tss: f64 = y.iter().map(|v| (v - y_mean).powi(2)).sum();
    let r_squared = if tss > 0.0 { 1.0 - fit.rss / tss } else { 0.0 };
    let se_ols_treated_post = fit.std_errors()[1];

    let model = DidModel {
        coefficients,
        covariance,
        covariance_type: opts.covariance,
        confidence_level: cl,
        se_ols_treated_post,
        reference_class: class_levels.keys().next().map(|c| c.to_string()).unwrap_or_default(),
        reference_month: *month_levels.keys().next().unwrap_or(&rows[0].date),
        class_effects,
        month_effects,
        fitted: fit.fitted.iter().copied().collect(),
        residuals: fit.residuals.iter().copied().collect(),
        n_obs: n,
        n_params: k,
        rss: fit.rss,
        r_squared,
    };

    let te = model.treatment_effect();
    tracing::debug!(
        estimate = te.estimate,
        std_error = te.std_error,
        n_obs = n,
        n_params = k,
        "DiD fit complete"
    );
    Ok(model)
}
