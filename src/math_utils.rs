//! Numerical helpers shared by the model, diagnostics and summaries.

/// ln(2π)
pub const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Arithmetic mean; NaN for empty input.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Sample variance (n - 1 denominator) via Welford's algorithm; 0 for fewer than two points.
pub fn calculate_variance(data: &[f64]) -> f64 {
    if data.len() <= 1 {
        return 0.0;
    }

    let mut mean = 0.0;
    let mut m2 = 0.0;
    for (i, &value) in data.iter().enumerate() {
        let count = (i + 1) as f64;
        let delta = value - mean;
        mean += delta / count;
        m2 += delta * (value - mean);
    }

    (m2 / (data.len() - 1) as f64).max(0.0)
}

/// Sample standard deviation.
pub fn sample_std(data: &[f64]) -> f64 {
    calculate_variance(data).sqrt()
}

/// ln Σ exp(xᵢ), ignoring `-inf` terms; `-inf` when every term is.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return f64::NEG_INFINITY;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Log density of Normal(mean, sd) at `x`.
pub fn normal_log_density(x: f64, mean: f64, sd: f64) -> f64 {
    let z = (x - mean) / sd;
    -0.5 * LN_2PI - sd.ln() - 0.5 * z * z
}

/// Log density of HalfNormal(scale) at `x`; `-inf` for `x <= 0`.
pub fn half_normal_log_density(x: f64, scale: f64) -> f64 {
    if x <= 0.0 {
        return f64::NEG_INFINITY;
    }
    std::f64::consts::LN_2 + normal_log_density(x, 0.0, scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_variance() {
        assert_approx_eq!(calculate_variance(&[1.0, 2.0, 3.0, 4.0]), 5.0 / 3.0);
        assert_eq!(calculate_variance(&[1.0]), 0.0);
        assert_eq!(calculate_variance(&[]), 0.0);
    }

    #[test]
    fn test_log_sum_exp() {
        assert_approx_eq!(log_sum_exp(&[0.0, 0.0]), 2f64.ln());
        assert_approx_eq!(log_sum_exp(&[1000.0, 1000.0]), 1000.0 + 2f64.ln());
        assert_approx_eq!(log_sum_exp(&[f64::NEG_INFINITY, 0.0]), 0.0);
        assert_eq!(log_sum_exp(&[f64::NEG_INFINITY]), f64::NEG_INFINITY);
    }

    #[test]
    fn test_densities() {
        assert_approx_eq!(normal_log_density(0.0, 0.0, 1.0), -0.5 * LN_2PI);
        assert_approx_eq!(
            half_normal_log_density(0.5, 1.0),
            2f64.ln() + normal_log_density(0.5, 0.0, 1.0)
        );
        assert_eq!(half_normal_log_density(-1.0, 1.0), f64::NEG_INFINITY);
    }
}
