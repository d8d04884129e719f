//! Augmented Dickey–Fuller stationarity test.
//!
//! Constant-only regression `dy_t = a + g*y_{t-1} + sum b_i*dy_{t-i} + e`,
//! with the lag order chosen by AIC over `0..=maxlag` where maxlag follows
//! Schwert's rule `12*(n/100)^(1/4)`. The reported statistic is the t-ratio
//! of `g`. Critical values and the approximate p-value use the MacKinnon
//! response-surface coefficients for the constant-only case.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Outcome of one ADF test.
#[derive(Debug, Clone, Serialize)]
pub struct AdfResult {
    /// The Dickey–Fuller t-statistic
    pub statistic: f64,
    /// MacKinnon approximate one-sided p-value
    pub p_value: f64,
    /// Lag order selected by AIC
    pub used_lag: usize,
    /// Effective number of observations in the final regression
    pub n_obs: usize,
    /// Critical values at the 1%, 5% and 10% levels
    pub critical_values: BTreeMap<String, f64>,
}

/// MacKinnon (2010) response-surface coefficients, constant-only case:
/// `cv = b0 + b1/n + b2/n^2 + b3/n^3`.
const CRIT_COEFFS: [(&str, [f64; 4]); 3] = [
    ("1%", [-3.43035, -6.5393, -16.786, -79.433]),
    ("5%", [-2.86154, -2.8903, -4.234, -40.040]),
    ("10%", [-2.56677, -1.5384, -2.809, 0.0]),
];

// MacKinnon (1994) p-value surface for the constant-only statistic.
const TAU_MAX: f64 = 2.74;
const TAU_MIN: f64 = -18.83;
const TAU_STAR: f64 = -1.61;
const TAU_SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038269];
const TAU_LARGE_P: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

/// Run the test on a series of non-null levels.
pub fn adf_test(values: &[f64]) -> Result<AdfResult> {
    let n = values.len();
    if n < 12 {
        return Err(Error::invalid_params(format!(
            "augmented Dickey-Fuller test needs at least 12 observations, got {n}"
        )));
    }

    // Schwert's maxlag, bounded so the selection regression keeps degrees
    // of freedom.
    let schwert = (12.0 * (n as f64 / 100.0).powf(0.25)).floor() as usize;
    let max_lag = schwert.min((n - 1) / 2 - 2);

    let diffs: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();

    // Lag selection on the common sample starting at max_lag, so AIC values
    // are comparable across candidates.
    let mut best: Option<(f64, usize)> = None;
    for lag in 0..=max_lag {
        let fit = regress(values, &diffs, lag, max_lag)?;
        let better = best.map(|(aic, _)| fit.aic < aic).unwrap_or(true);
        if better {
            best = Some((fit.aic, lag));
        }
    }
    let (_, used_lag) = best.ok_or_else(|| Error::internal("ADF lag selection failed"))?;

    // Final regression on the full usable sample for the chosen lag.
    let fit = regress(values, &diffs, used_lag, used_lag)?;
    let statistic = fit.t_gamma;
    let n_obs = fit.n_obs;

    let critical_values = CRIT_COEFFS
        .iter()
        .map(|(level, b)| {
            let nf = n_obs as f64;
            let cv = b[0] + b[1] / nf + b[2] / (nf * nf) + b[3] / (nf * nf * nf);
            ((*level).to_string(), cv)
        })
        .collect();

    Ok(AdfResult {
        statistic,
        p_value: mackinnon_pvalue(statistic),
        used_lag,
        n_obs,
        critical_values,
    })
}

struct Fit {
    t_gamma: f64,
    aic: f64,
    n_obs: usize,
}

/// OLS of `dy_t` on `[y_{t-1}, dy_{t-1}..dy_{t-lag}, 1]`, with the sample
/// starting at `start_lag` (>= `lag`) so different lag orders can share a
/// sample during selection.
fn regress(values: &[f64], diffs: &[f64], lag: usize, start_lag: usize) -> Result<Fit> {
    let k = lag + 2;
    let rows: Vec<usize> = (start_lag..diffs.len()).collect();
    let n_obs = rows.len();
    if n_obs <= k {
        return Err(Error::invalid_params(
            "not enough observations for the requested lag order",
        ));
    }

    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];

    let row_x = |i: usize| -> Vec<f64> {
        let mut x = Vec::with_capacity(k);
        x.push(values[i]);
        for j in 1..=lag {
            x.push(diffs[i - j]);
        }
        x.push(1.0);
        x
    };

    for &i in &rows {
        let x = row_x(i);
        let y = diffs[i];
        for a in 0..k {
            for b in 0..k {
                xtx[a][b] += x[a] * x[b];
            }
            xty[a] += x[a] * y;
        }
    }

    let beta = solve(&xtx, &xty)
        .ok_or_else(|| Error::internal("singular design matrix in ADF regression"))?;

    let mut rss = 0.0;
    for &i in &rows {
        let x = row_x(i);
        let fitted: f64 = x.iter().zip(&beta).map(|(a, b)| a * b).sum();
        let residual = diffs[i] - fitted;
        rss += residual * residual;
    }

    let sigma2 = rss / (n_obs - k) as f64;

    // Variance of the y_{t-1} coefficient needs the first column of
    // (X'X)^-1; solve against the unit vector instead of inverting.
    let mut e0 = vec![0.0; k];
    e0[0] = 1.0;
    let inv_col = solve(&xtx, &e0)
        .ok_or_else(|| Error::internal("singular design matrix in ADF regression"))?;
    let se_gamma = (sigma2 * inv_col[0]).sqrt();
    if se_gamma == 0.0 {
        return Err(Error::internal("degenerate ADF regression"));
    }

    let nf = n_obs as f64;
    let aic = nf * (rss / nf).ln() + 2.0 * k as f64;

    Ok(Fit {
        t_gamma: beta[0] / se_gamma,
        aic,
        n_obs,
    })
}

/// Solve `A x = b` by Gaussian elimination with partial pivoting. Returns
/// `None` when the matrix is singular to working precision.
fn solve(matrix: &[Vec<f64>], rhs: &[f64]) -> Option<Vec<f64>> {
    let n = rhs.len();
    let mut a: Vec<Vec<f64>> = matrix.iter().map(|row| {
        let mut r = row.clone();
        r.truncate(n);
        r
    }).collect();
    let mut b = rhs.to_vec();

    for col in 0..n {
        let pivot = (col..n).max_by(|&x, &y| {
            a[x][col]
                .abs()
                .partial_cmp(&a[y][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                let value = a[col][k];
                a[row][k] -= factor * value;
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for col in (row + 1)..n {
            sum -= a[row][col] * x[col];
        }
        x[row] = sum / a[row][row];
    }
    Some(x)
}

/// MacKinnon approximate p-value for the constant-only statistic.
fn mackinnon_pvalue(tau: f64) -> f64 {
    if tau > TAU_MAX {
        return 1.0;
    }
    if tau < TAU_MIN {
        return 0.0;
    }
    let z = if tau <= TAU_STAR {
        TAU_SMALL_P[0] + TAU_SMALL_P[1] * tau + TAU_SMALL_P[2] * tau * tau
    } else {
        TAU_LARGE_P[0]
            + TAU_LARGE_P[1] * tau
            + TAU_LARGE_P[2] * tau * tau
            + TAU_LARGE_P[3] * tau * tau * tau
    };
    norm_cdf(z)
}

/// Standard normal CDF via the Abramowitz & Stegun erf approximation.
fn norm_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    sign * (1.0 - poly * (-x * x).exp())
}
