//! Seasonal-trend decomposition by LOESS (STL).
//!
//! Inner loop: cycle-subseries smoothing, low-pass filtering of the smoothed
//! cycle, trend smoothing of the deseasonalized data. Optional outer loop with
//! bisquare robustness weights. Smoothers are evaluated at every point.
//!
//! # References
//!
//! - Cleveland, Cleveland, McRae & Terpenning (1990), "STL: A seasonal-trend
//!   decomposition procedure based on loess." *Journal of Official Statistics* 6(1).

use jobflow_core::{Error, Result};

/// Default seasonal smoother span.
pub const DEFAULT_SEASONAL_SPAN: usize = 7;

/// Inner iterations without / with robustness.
const INNER_ITER: [usize; 2] = [2, 5];
/// Outer (robustness) iterations without / with robustness.
const OUTER_ITER: [usize; 2] = [0, 15];

/// STL smoother configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StlParams {
    /// Seasonal period (observations per cycle).
    pub period: usize,
    /// Seasonal smoother span (odd, ≥ 3).
    pub seasonal: usize,
    /// Trend smoother span (odd, ≥ 3).
    pub trend: usize,
    /// Low-pass smoother span (odd, > period).
    pub low_pass: usize,
    /// Local polynomial degree of the seasonal smoother (0 or 1).
    pub seasonal_deg: usize,
    /// Local polynomial degree of the trend smoother (0 or 1).
    pub trend_deg: usize,
    /// Local polynomial degree of the low-pass smoother (0 or 1).
    pub low_pass_deg: usize,
    /// Passes of the inner loop.
    pub inner_iter: usize,
    /// Robustness passes of the outer loop.
    pub outer_iter: usize,
}

fn next_odd(x: usize) -> usize {
    if x % 2 == 0 { x + 1 } else { x }
}

impl StlParams {
    /// Default smoothers for `period`: seasonal span 7, trend span the smallest odd
    /// integer ≥ `1.5·period / (1 − 1.5/seasonal)`, low-pass the smallest odd > period.
    pub fn new(period: usize) -> Self {
        let seasonal = DEFAULT_SEASONAL_SPAN;
        let trend = (1.5 * period as f64 / (1.0 - 1.5 / seasonal as f64)).ceil() as usize;
        Self {
            period,
            seasonal,
            trend: next_odd(trend.max(3)),
            low_pass: next_odd(period + 1),
            seasonal_deg: 1,
            trend_deg: 1,
            low_pass_deg: 1,
            inner_iter: INNER_ITER[0],
            outer_iter: OUTER_ITER[0],
        }
    }

    /// Switch the iteration counts to the robust (or plain) schedule.
    pub fn robust(mut self, robust: bool) -> Self {
        let i = usize::from(robust);
        self.inner_iter = INNER_ITER[i];
        self.outer_iter = OUTER_ITER[i];
        self
    }

    fn validate(&self, n: usize) -> Result<()> {
        if self.period < 2 {
            return Err(Error::Validation(format!("STL period must be >= 2, got {}", self.period)));
        }
        for (name, span) in
            [("seasonal", self.seasonal), ("trend", self.trend), ("low_pass", self.low_pass)]
        {
            if span < 3 || span % 2 == 0 {
                return Err(Error::Validation(format!(
                    "STL {name} span must be odd and >= 3, got {span}"
                )));
            }
        }
        if self.low_pass <= self.period {
            return Err(Error::Validation(format!(
                "STL low_pass span ({}) must exceed the period ({})",
                self.low_pass, self.period
            )));
        }
        if [self.seasonal_deg, self.trend_deg, self.low_pass_deg].iter().any(|&d| d > 1) {
            return Err(Error::Validation("STL smoother degrees must be 0 or 1".into()));
        }
        if self.inner_iter == 0 {
            return Err(Error::Validation("STL needs at least one inner iteration".into()));
        }
        if n < 2 * self.period {
            return Err(Error::Validation(format!(
                "STL needs at least two full periods ({} obs), got {n}",
                2 * self.period
            )));
        }
        Ok(())
    }
}

/// Components of an STL fit. `observed = seasonal + trend + resid` elementwise.
#[derive(Debug, Clone)]
pub struct StlResult {
    /// Input series.
    pub observed: Vec<f64>,
    /// Seasonal component.
    pub seasonal: Vec<f64>,
    /// Trend component.
    pub trend: Vec<f64>,
    /// Remainder.
    pub resid: Vec<f64>,
    /// Final robustness weights (all 1 without robust iterations).
    pub weights: Vec<f64>,
}

/// Decompose `y` (equally spaced, no gaps).
pub fn stl(y: &[f64], params: &StlParams) -> Result<StlResult> {
    params.validate(y.len())?;
    if y.iter().any(|v| !v.is_finite()) {
        return Err(Error::Validation("STL input contains non-finite values".into()));
    }

    let n = y.len();
    let mut seasonal = vec![0.0; n];
    let mut trend = vec![0.0; n];
    let mut weights: Option<Vec<f64>> = None;

    for pass in 0..=params.outer_iter {
        inner_loop(y, params, weights.as_deref(), &mut seasonal, &mut trend);
        if pass == params.outer_iter {
            break;
        }
        let fit: Vec<f64> = seasonal.iter().zip(&trend).map(|(s, t)| s + t).collect();
        weights = Some(robustness_weights(y, &fit));
    }

    let resid = (0..n).map(|i| y[i] - seasonal[i] - trend[i]).collect();
    Ok(StlResult {
        observed: y.to_vec(),
        seasonal,
        trend,
        resid,
        weights: weights.unwrap_or_else(|| vec![1.0; n]),
    })
}

fn inner_loop(
    y: &[f64],
    params: &StlParams,
    rw: Option<&[f64]>,
    seasonal: &mut [f64],
    trend: &mut [f64],
) {
    let n = y.len();
    let p = params.period;
    for _ in 0..params.inner_iter {
        let detrended: Vec<f64> = y.iter().zip(trend.iter()).map(|(v, t)| v - t).collect();
        let cycle = smooth_cycle_subseries(&detrended, p, params.seasonal, params.seasonal_deg, rw);

        let filtered = moving_average(&moving_average(&moving_average(&cycle, p), p), 3);
        let low = loess_smooth(&filtered, params.low_pass, params.low_pass_deg, None);
        for i in 0..n {
            seasonal[i] = cycle[p + i] - low[i];
        }

        let deseasonalized: Vec<f64> = y.iter().zip(seasonal.iter()).map(|(v, s)| v - s).collect();
        trend.copy_from_slice(&loess_smooth(&deseasonalized, params.trend, params.trend_deg, rw));
    }
}

/// Smooth each cycle-subseries and extend it by one period at both ends.
/// Output length is `n + 2·period`, aligned so that `out[period + i]` matches `y[i]`.
fn smooth_cycle_subseries(
    y: &[f64],
    period: usize,
    span: usize,
    degree: usize,
    rw: Option<&[f64]>,
) -> Vec<f64> {
    let n = y.len();
    let mut out = vec![0.0; n + 2 * period];
    for j in 0..period {
        let sub: Vec<f64> = y[j..].iter().step_by(period).copied().collect();
        let sub_rw: Option<Vec<f64>> = rw.map(|w| w[j..].iter().step_by(period).copied().collect());
        let sub_rw = sub_rw.as_deref();
        let k = sub.len();

        let smoothed = loess_smooth(&sub, span, degree, sub_rw);
        let mut w = vec![0.0; k];
        let first = loess_at(&sub, span, degree, -1.0, 0, span.min(k) - 1, &mut w, sub_rw)
            .unwrap_or(smoothed[0]);
        let lo = k.saturating_sub(span);
        let last = loess_at(&sub, span, degree, k as f64, lo, k - 1, &mut w, sub_rw)
            .unwrap_or(smoothed[k - 1]);

        out[j] = first;
        for (m, v) in smoothed.iter().enumerate() {
            out[(m + 1) * period + j] = *v;
        }
        out[(k + 1) * period + j] = last;
    }
    out
}

fn moving_average(x: &[f64], len: usize) -> Vec<f64> {
    x.windows(len).map(|w| w.iter().sum::<f64>() / len as f64).collect()
}

/// Bisquare weights on `|y − fit|` scaled by six times the median absolute residual.
fn robustness_weights(y: &[f64], fit: &[f64]) -> Vec<f64> {
    let r: Vec<f64> = y.iter().zip(fit).map(|(a, b)| (a - b).abs()).collect();
    let mut sorted = r.clone();
    sorted.sort_by(f64::total_cmp);
    let n = r.len();
    let hi = n / 2;
    let lo = n - hi - 1;
    let cmad = 3.0 * (sorted[hi] + sorted[lo]);
    let (c1, c9) = (0.001 * cmad, 0.999 * cmad);
    r.iter()
        .map(|&ri| {
            if ri <= c1 {
                1.0
            } else if ri <= c9 {
                (1.0 - (ri / cmad).powi(2)).powi(2)
            } else {
                0.0
            }
        })
        .collect()
}

/// LOESS smooth of `y` (positions `0..n`) with a `span`-point tricube window.
pub(crate) fn loess_smooth(y: &[f64], span: usize, degree: usize, rw: Option<&[f64]>) -> Vec<f64> {
    let n = y.len();
    if n < 2 {
        return y.to_vec();
    }
    let mut out = vec![0.0; n];
    let mut w = vec![0.0; n];
    if span >= n {
        for i in 0..n {
            out[i] = loess_at(y, span, degree, i as f64, 0, n - 1, &mut w, rw).unwrap_or(y[i]);
        }
        return out;
    }

    let half = (span + 1) / 2;
    let (mut left, mut right) = (0, span - 1);
    for i in 0..n {
        if i + 1 > half && right != n - 1 {
            left += 1;
            right += 1;
        }
        out[i] = loess_at(y, span, degree, i as f64, left, right, &mut w, rw).unwrap_or(y[i]);
    }
    out
}

/// Local fit at position `xs` using points `left..=right`.
///
/// Returns `None` when every weight in the window is zero.
#[allow(clippy::too_many_arguments)]
fn loess_at(
    y: &[f64],
    span: usize,
    degree: usize,
    xs: f64,
    left: usize,
    right: usize,
    w: &mut [f64],
    rw: Option<&[f64]>,
) -> Option<f64> {
    let n = y.len();
    let range = right as f64 - left as f64;
    let mut h = (xs - left as f64).max(right as f64 - xs);
    if span > n {
        h += ((span - n) / 2) as f64;
    }
    let (h1, h9) = (0.001 * h, 0.999 * h);

    let mut total = 0.0;
    for j in left..=right {
        w[j] = 0.0;
        let r = (j as f64 - xs).abs();
        if r <= h9 {
            w[j] = if r <= h1 { 1.0 } else { (1.0 - (r / h).powi(3)).powi(3) };
            if let Some(rw) = rw {
                w[j] *= rw[j];
            }
            total += w[j];
        }
    }
    if total <= 0.0 {
        return None;
    }
    for wj in &mut w[left..=right] {
        *wj /= total;
    }

    if h > 0.0 && degree > 0 {
        let center: f64 = (left..=right).map(|j| w[j] * j as f64).sum();
        let spread: f64 = (left..=right).map(|j| w[j] * (j as f64 - center).powi(2)).sum();
        if spread.sqrt() > 0.001 * range {
            let slope = (xs - center) / spread;
            for j in left..=right {
                w[j] *= slope * (j as f64 - center) + 1.0;
            }
        }
    }
    Some((left..=right).map(|j| w[j] * y[j]).sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn default_spans_for_monthly_data() {
        let p = StlParams::new(12);
        assert_eq!(p.seasonal, 7);
        assert_eq!(p.trend, 23);
        assert_eq!(p.low_pass, 13);
        assert_eq!((p.inner_iter, p.outer_iter), (2, 0));
        let r = p.robust(true);
        assert_eq!((r.inner_iter, r.outer_iter), (5, 15));
    }

    #[test]
    fn local_linear_reproduces_lines() {
        let y: Vec<f64> = (0..20).map(|i| 3.0 - 0.5 * i as f64).collect();
        for span in [5, 7, 25] {
            let s = loess_smooth(&y, span, 1, None);
            for (a, b) in s.iter().zip(&y) {
                assert_relative_eq!(a, b, epsilon = 1e-10);
            }
        }
        let mut w = vec![0.0; 20];
        let ext = loess_at(&y, 7, 1, -1.0, 0, 6, &mut w, None).unwrap();
        assert_relative_eq!(ext, 3.5, epsilon = 1e-10);
    }

    #[test]
    fn moving_average_shortens_by_window() {
        let m = moving_average(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(m, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn components_add_up_and_separate() {
        let n = 72;
        let y: Vec<f64> = (0..n)
            .map(|i| 5.0 + 0.05 * i as f64 + (2.0 * PI * i as f64 / 12.0).sin())
            .collect();
        let fit = stl(&y, &StlParams::new(12)).unwrap();
        for i in 0..n {
            assert_relative_eq!(
                fit.seasonal[i] + fit.trend[i] + fit.resid[i],
                y[i],
                epsilon = 1e-12
            );
        }
        for i in 12..60 {
            let truth = (2.0 * PI * i as f64 / 12.0).sin();
            assert!((fit.seasonal[i] - truth).abs() < 0.05, "i={i}: {}", fit.seasonal[i]);
            assert!((fit.trend[i] - (5.0 + 0.05 * i as f64)).abs() < 0.05);
        }
        assert!(fit.weights.iter().all(|&w| w == 1.0));
    }

    #[test]
    fn robust_pass_downweights_outlier() {
        let n = 48;
        let mut y: Vec<f64> = (0..n).map(|i| (2.0 * PI * i as f64 / 12.0).cos()).collect();
        y[20] += 25.0;
        let fit = stl(&y, &StlParams::new(12).robust(true)).unwrap();
        assert!(fit.weights[20] < 0.05);
        assert!(fit.resid[20] > 15.0);
    }

    #[test]
    fn rejects_short_or_bad_input() {
        let p = StlParams::new(12);
        assert!(stl(&[1.0; 23], &p).is_err());
        let mut y = vec![1.0; 30];
        y[3] = f64::NAN;
        assert!(stl(&y, &p).is_err());
        let even = StlParams { seasonal: 8, ..p };
        assert!(stl(&[1.0; 30], &even).is_err());
    }
}
