//! Dense least squares shared by the DiD, trend, ADF and AR fits.

use nalgebra::{DMatrix, DVector};

/// Squared relative Cholesky pivot below which the design is treated as rank deficient.
const RANK_TOL: f64 = 1e-10;

/// Ordinary least squares fit `y = X β + e`.
#[derive(Debug, Clone)]
pub(crate) struct OlsFit {
    pub beta: DVector<f64>,
    pub fitted: DVector<f64>,
    pub residuals: DVector<f64>,
    pub rss: f64,
    /// `(X'X)⁻¹` in the original column scale.
    pub xtx_inv: DMatrix<f64>,
}

impl OlsFit {
    pub fn nobs(&self) -> usize {
        self.residuals.len()
    }

    pub fn n_params(&self) -> usize {
        self.beta.len()
    }

    /// Residual degrees of freedom `n - k`.
    pub fn df_resid(&self) -> usize {
        self.nobs() - self.n_params()
    }

    /// Gaussian log-likelihood at the MLE `σ² = rss / n`.
    pub fn log_likelihood(&self) -> f64 {
        let n = self.nobs() as f64;
        -0.5 * n * ((2.0 * std::f64::consts::PI).ln() + (self.rss / n).ln() + 1.0)
    }

    /// `-2 llf + 2 n_free`.
    pub fn aic(&self, n_free: usize) -> f64 {
        -2.0 * self.log_likelihood() + 2.0 * n_free as f64
    }

    /// Unbiased residual variance `rss / (n - k)`.
    pub fn sigma2(&self) -> f64 {
        let df = self.df_resid();
        if df == 0 { f64::NAN } else { self.rss / df as f64 }
    }

    /// Classical (homoskedastic) standard errors.
    pub fn std_errors(&self) -> Vec<f64> {
        let s2 = self.sigma2();
        (0..self.n_params()).map(|j| (s2 * self.xtx_inv[(j, j)]).max(0.0).sqrt()).collect()
    }
}

/// Solve OLS via Cholesky of the column-equilibrated normal matrix.
///
/// Returns `None` when there are fewer rows than columns, a column is all zero or
/// non-finite, or the columns are (numerically) linearly dependent.
pub(crate) fn least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<OlsFit> {
    let (n, k) = x.shape();
    if n == 0 || k == 0 || n < k || y.len() != n {
        return None;
    }

    // Equilibrate columns so that t and t² (or dummy blocks) share one scale.
    let mut scale = vec![0.0_f64; k];
    for j in 0..k {
        for i in 0..n {
            scale[j] = scale[j].max(x[(i, j)].abs());
        }
        if !(scale[j].is_finite() && scale[j] > 0.0) {
            return None;
        }
    }
    let mut xs = x.clone();
    for j in 0..k {
        for i in 0..n {
            xs[(i, j)] /= scale[j];
        }
    }

    let xtx = xs.transpose() * &xs;
    let chol = xtx.cholesky()?;
    let l = chol.l();
    let mut max_piv = 0.0_f64;
    let mut min_piv = f64::INFINITY;
    for j in 0..k {
        let p = l[(j, j)] * l[(j, j)];
        max_piv = max_piv.max(p);
        min_piv = min_piv.min(p);
    }
    if !(min_piv > RANK_TOL * max_piv) {
        return None;
    }

    let inv_s = chol.inverse();
    let beta_s = &inv_s * (xs.transpose() * y);

    let beta = DVector::from_fn(k, |j, _| beta_s[j] / scale[j]);
    let xtx_inv = DMatrix::from_fn(k, k, |a, b| inv_s[(a, b)] / (scale[a] * scale[b]));
    let fitted = x * &beta;
    let residuals = y - &fitted;
    let rss: f64 = residuals.iter().map(|r| r * r).sum();

    Some(OlsFit { beta, fitted, residuals, rss, xtx_inv })
}

/// White sandwich `(X'X)⁻¹ X' diag(e²) X (X'X)⁻¹` (HC0, no scaling).
pub(crate) fn hc0_sandwich(
    x: &DMatrix<f64>,
    residuals: &DVector<f64>,
    xtx_inv: &DMatrix<f64>,
) -> DMatrix<f64> {
    let (n, k) = x.shape();
    let mut xe = x.clone();
    for i in 0..n {
        let e = residuals[i];
        for j in 0..k {
            xe[(i, j)] *= e;
        }
    }
    let meat = xe.transpose() * &xe;
    xtx_inv * meat * xtx_inv
}
