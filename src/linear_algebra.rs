//! Linear algebra for the stationarity tests
//!
//! Ordinary least squares by Householder QR, with coefficient standard errors taken from the
//! triangular factor, and the Newey-West long-run variance used by KPSS.

use crate::errors::{validate_all_finite, ChangePointError, ChangePointResult};

/// Ordinary least-squares fit
#[derive(Debug, Clone, PartialEq)]
pub struct LeastSquaresFit {
    /// One coefficient per regressor column
    pub coefficients: Vec<f64>,
    pub residuals: Vec<f64>,
    /// Residual sum of squares
    pub rss: f64,
    /// Upper-triangular k×k factor of the design matrix
    r: Vec<Vec<f64>>,
}

impl LeastSquaresFit {
    /// Number of observations in the fit.
    pub fn observations(&self) -> usize {
        self.residuals.len()
    }

    /// Standard error of coefficient `j`; `None` without residual degrees of freedom.
    ///
    /// SE(βⱼ) = σ̂ ‖u‖ with Rᵀu = eⱼ, since (XᵀX)⁻¹ = R⁻¹R⁻ᵀ.
    pub fn std_error(&self, j: usize) -> Option<f64> {
        let k = self.coefficients.len();
        let dof = self.observations().checked_sub(k).filter(|&d| d > 0)?;
        if j >= k {
            return None;
        }
        let sigma2 = self.rss / dof as f64;

        let mut u = vec![0.0; k];
        for i in 0..k {
            let mut sum = if i == j { 1.0 } else { 0.0 };
            for (l, &ul) in u.iter().enumerate().take(i) {
                sum -= self.r[l][i] * ul;
            }
            u[i] = sum / self.r[i][i];
        }
        let norm_sq: f64 = u.iter().map(|v| v * v).sum();
        Some((sigma2 * norm_sq).sqrt())
    }
}

/// Regress `y` on `columns` (each a regressor of the same length as `y`).
///
/// Fails for a non-finite input, an underdetermined system or a rank-deficient design.
pub fn least_squares(columns: &[Vec<f64>], y: &[f64]) -> ChangePointResult<LeastSquaresFit> {
    let k = columns.len();
    let m = y.len();
    if k == 0 || m < k {
        return Err(ChangePointError::InsufficientData {
            required: k.max(1).saturating_sub(1),
            actual: m,
        });
    }
    validate_all_finite(y, "response")?;
    for column in columns {
        if column.len() != m {
            return Err(ChangePointError::NumericalInstability {
                message: format!("regressor of length {} against {} responses", column.len(), m),
            });
        }
        validate_all_finite(column, "regressor")?;
    }

    // Row-major design matrix
    let mut a: Vec<Vec<f64>> = (0..m).map(|i| columns.iter().map(|c| c[i]).collect()).collect();
    let mut qty = y.to_vec();

    let norm = a.iter().flatten().map(|v| v * v).sum::<f64>().sqrt();
    let rank_tol = 100.0 * f64::EPSILON * m as f64 * norm.max(1.0);

    for col in 0..k.min(m.saturating_sub(1)) {
        let mut v: Vec<f64> = (col..m).map(|i| a[i][col]).collect();
        let norm_x = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm_x < rank_tol {
            continue;
        }
        v[0] += if v[0] >= 0.0 { norm_x } else { -norm_x };
        let norm_v = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        v.iter_mut().for_each(|x| *x /= norm_v);

        for j in col..k {
            let dot: f64 = (col..m).map(|i| v[i - col] * a[i][j]).sum();
            for i in col..m {
                a[i][j] -= 2.0 * v[i - col] * dot;
            }
        }
        let dot: f64 = (col..m).map(|i| v[i - col] * qty[i]).sum();
        for i in col..m {
            qty[i] -= 2.0 * v[i - col] * dot;
        }
    }

    if let Some(i) = (0..k).find(|&i| a[i][i].abs() < rank_tol) {
        return Err(ChangePointError::NumericalInstability {
            message: format!("rank-deficient design (column {})", i),
        });
    }

    let mut coefficients = vec![0.0; k];
    for i in (0..k).rev() {
        let mut sum = qty[i];
        for j in i + 1..k {
            sum -= a[i][j] * coefficients[j];
        }
        coefficients[i] = sum / a[i][i];
    }

    let residuals: Vec<f64> = (0..m)
        .map(|i| y[i] - columns.iter().zip(&coefficients).map(|(c, b)| c[i] * b).sum::<f64>())
        .collect();
    let rss = residuals.iter().map(|r| r * r).sum();
    let r = a.into_iter().take(k).map(|row| row.into_iter().take(k).collect()).collect();

    Ok(LeastSquaresFit {
        coefficients,
        residuals,
        rss,
        r,
    })
}

/// Newey-West bandwidth floor(4 (n/100)^(2/9)), clamped to [1, n/4].
pub fn newey_west_bandwidth(n: usize) -> usize {
    if n <= 2 {
        return 1;
    }
    let raw = (4.0 * (n as f64 / 100.0).powf(2.0 / 9.0)).floor() as usize;
    raw.clamp(1, (n / 4).max(1))
}

/// Long-run variance with Bartlett weights 1 - k/(L+1).
///
/// γ₀ uses the (n - 1) denominator and γₖ the (n - k) one. The result is floored at
/// max(γ₀·1e-12, ε) so near-constant residuals cannot blow up a ratio.
pub fn newey_west_lrv(residuals: &[f64], max_lag: usize) -> ChangePointResult<f64> {
    let n = residuals.len();
    if n < 2 {
        return Err(ChangePointError::InsufficientData {
            required: 1,
            actual: n,
        });
    }

    let mean = residuals.iter().sum::<f64>() / n as f64;
    let centered: Vec<f64> = residuals.iter().map(|r| r - mean).collect();
    let variance = centered.iter().map(|x| x * x).sum::<f64>() / (n - 1) as f64;

    let bandwidth = max_lag.min(n / 4).max(1);
    let mut lrv = variance;
    for k in 1..=bandwidth.min(n - 1) {
        let weight = 1.0 - k as f64 / (bandwidth + 1) as f64;
        let autocov = (k..n).map(|i| centered[i] * centered[i - k]).sum::<f64>() / (n - k) as f64;
        lrv += 2.0 * weight * autocov;
    }

    Ok(lrv.max((variance * 1e-12).max(f64::EPSILON)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_exact_line_is_recovered() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 + 0.5 * v).collect();
        let fit = least_squares(&[vec![1.0; 10], x], &y).unwrap();

        assert_approx_eq!(fit.coefficients[0], 2.0, 1e-10);
        assert_approx_eq!(fit.coefficients[1], 0.5, 1e-10);
        assert!(fit.rss < 1e-20);
    }

    #[test]
    fn test_std_error_matches_simple_regression_formula() {
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let y = vec![1.1, 1.9, 3.2, 3.8, 5.3, 5.9];
        let fit = least_squares(&[vec![1.0; 6], x.clone()], &y).unwrap();

        // SE(slope) = sqrt(σ² / Σ(x - x̄)²)
        let x_bar = 3.5;
        let sxx: f64 = x.iter().map(|v| (v - x_bar) * (v - x_bar)).sum();
        let sigma2 = fit.rss / 4.0;
        assert_approx_eq!(fit.std_error(1).unwrap(), (sigma2 / sxx).sqrt(), 1e-10);
        assert!(fit.std_error(2).is_none());
    }

    #[test]
    fn test_collinear_design_rejected() {
        let x = vec![1.0, 2.0, 3.0, 4.0];
        let doubled: Vec<f64> = x.iter().map(|v| 2.0 * v).collect();
        let result = least_squares(&[x, doubled], &[1.0, 2.0, 3.0, 4.0]);
        assert!(matches!(result, Err(ChangePointError::NumericalInstability { .. })));
    }

    #[test]
    fn test_underdetermined_rejected() {
        let result = least_squares(&[vec![1.0], vec![2.0]], &[1.0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_bandwidth_bounds() {
        assert_eq!(newey_west_bandwidth(2), 1);
        assert_eq!(newey_west_bandwidth(100), 4);
        assert!(newey_west_bandwidth(10) <= 2);
    }

    #[test]
    fn test_lrv_bartlett_weights() {
        // γ₀ = 200/199, γ₁ = -1 with weight 1/2
        let alternating: Vec<f64> = (0..200).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert_approx_eq!(newey_west_lrv(&alternating, 1).unwrap(), 1.0 / 199.0, 1e-12);
        assert!(newey_west_lrv(&[1.0], 1).is_err());
    }

    #[test]
    fn test_lrv_of_constant_series_is_floored() {
        assert_eq!(newey_west_lrv(&[3.0; 50], 4).unwrap(), f64::EPSILON);
    }
}
