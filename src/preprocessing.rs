//! Data preprocessing for change-point analysis
//!
//! Turns a raw [`Series`] into the near-stationary series the regime model works on (first
//! differences of log prices), keeping the mapping from transformed indices back to the raw
//! observations and their dates.
//!
//! Also hosts the exploratory checks run before modeling: augmented Dickey-Fuller and KPSS
//! stationarity tests, and a volatility-clustering profile of the returns.

use crate::{
    config::RegimeSpec,
    errors::{validate_all_finite, validate_data_length, ChangePointError, ChangePointResult},
    linear_algebra::{least_squares, newey_west_bandwidth, newey_west_lrv, LeastSquaresFit},
    math_utils::{mean, sample_std},
    series::Series,
};
use chrono::NaiveDate;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Type of financial data being analyzed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum DataKind {
    /// Raw price levels, modeled as log returns
    Prices,
    /// Already differenced returns, modeled as-is
    Returns,
}

/// A series transformed for modeling, tied to the raw series it came from.
#[derive(Debug, Clone)]
pub struct PreparedSeries {
    raw: Arc<Series>,
    values: Vec<f64>,
    offset: usize,
}

impl PreparedSeries {
    /// Transformed values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of transformed values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no transformed values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The untransformed series.
    pub fn raw(&self) -> &Series {
        &self.raw
    }

    /// Raw index of transformed index `t`.
    ///
    /// A log return at `t` is the move into raw observation `t + 1`, so it carries that date.
    pub fn raw_index(&self, t: usize) -> usize {
        t + self.offset
    }

    /// Date of transformed index `t`; clamps past the end.
    pub fn date_of(&self, t: usize) -> NaiveDate {
        let dates = self.raw.dates();
        dates[self.raw_index(t).min(dates.len() - 1)]
    }
}

/// First differences of logarithms.
pub fn log_returns(prices: &[f64]) -> ChangePointResult<Vec<f64>> {
    validate_all_finite(prices, "prices")?;
    if let Some((index, &value)) = prices.iter().enumerate().find(|(_, p)| **p <= 0.0) {
        return Err(ChangePointError::NonPositivePrice { index, value });
    }

    Ok(prices.windows(2).map(|w| (w[1] / w[0]).ln()).collect())
}

/// Transform `series` for a model with `spec`'s number of change points.
///
/// The transformed length must exceed `min_segment_length * (K + 1)` so every regime can hold
/// its minimum share of observations.
pub fn preprocess_series(
    series: Arc<Series>,
    kind: DataKind,
    spec: &RegimeSpec,
) -> ChangePointResult<PreparedSeries> {
    spec.validate()?;

    let (values, offset) = match kind {
        DataKind::Prices => (log_returns(series.values())?, 1),
        DataKind::Returns => {
            validate_all_finite(series.values(), "returns")?;
            (series.values().to_vec(), 0)
        }
    };

    validate_model_length(values.len(), spec)?;

    log::debug!(
        "Prepared {} model observations from {} raw observations ({:?})",
        values.len(),
        series.len(),
        kind
    );

    Ok(PreparedSeries {
        raw: series,
        values,
        offset,
    })
}

/// Check that `len` transformed observations leave every regime enough data.
pub fn validate_model_length(len: usize, spec: &RegimeSpec) -> ChangePointResult<()> {
    let single_break = spec.min_segment_length.saturating_mul(2);
    if len <= single_break {
        return Err(ChangePointError::InsufficientData {
            required: single_break,
            actual: len,
        });
    }

    let required = spec.required_length();
    if len <= required {
        return Err(ChangePointError::TooManyChangePoints {
            num_change_points: spec.num_change_points,
            required,
            actual: len,
        });
    }
    Ok(())
}

/// Shortest series the stationarity tests accept.
pub const MIN_STATIONARITY_LENGTH: usize = 20;

/// Significance level of the stationarity verdicts.
pub const STATIONARITY_SIGNIFICANCE: f64 = 0.05;

/// Rolling window of the volatility profile, in observations.
pub const VOLATILITY_WINDOW: usize = 30;

/// Largest lag of the absolute-return autocorrelations.
pub const VOLATILITY_MAX_LAG: usize = 20;

/// Lag-1 absolute-return autocorrelation above which volatility is called clustered.
pub const CLUSTERING_THRESHOLD: f64 = 0.1;

/// Outcome of one stationarity test
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StationarityTest {
    pub statistic: f64,
    /// Approximate p-value interpolated between tabulated critical values
    pub p_value: f64,
    /// Lagged differences (ADF) or bandwidth (KPSS) used
    pub lags: usize,
    /// (significance level, critical value)
    pub critical_values: Vec<(f64, f64)>,
}

/// Augmented Dickey-Fuller test with a constant.
///
/// Regresses Δyₜ = α + βyₜ₋₁ + Σγᵢ Δyₜ₋ᵢ + εₜ. The lag order is chosen by AIC up to the
/// Schwert bound 12 (n/100)^¼ (at most n/4) on a common sample, then refit on every usable
/// observation. The statistic is the t-ratio of β; a small p-value rejects a unit root.
pub fn augmented_dickey_fuller(data: &[f64]) -> ChangePointResult<StationarityTest> {
    validate_data_length(data, MIN_STATIONARITY_LENGTH)?;
    validate_all_finite(data, "data")?;

    let n = data.len();
    let diffs: Vec<f64> = data.windows(2).map(|w| w[1] - w[0]).collect();
    let max_lag = ((12.0 * (n as f64 / 100.0).powf(0.25)) as usize).min(n / 4);

    let mut best: Option<(f64, usize)> = None;
    for lag in 0..=max_lag {
        let fit = match adf_regression(data, &diffs, lag, max_lag) {
            Ok((_, fit)) => fit,
            Err(_) => continue,
        };
        let m = fit.observations() as f64;
        let aic = m * (fit.rss / m).ln() + 2.0 * (lag + 2) as f64;
        if aic.is_finite() && best.map_or(true, |(best_aic, _)| aic < best_aic) {
            best = Some((aic, lag));
        }
    }
    let (_, lag) = best.ok_or_else(|| ChangePointError::NumericalInstability {
        message: "ADF regression is singular at every lag order".to_string(),
    })?;

    let (statistic, _) = adf_regression(data, &diffs, lag, lag)?;
    let critical_values = adf_critical_values(n);
    let p_value = adf_p_value(statistic, &critical_values);
    log::debug!("ADF statistic {:.4} (lag {}, p = {:.3})", statistic, lag, p_value);

    Ok(StationarityTest {
        statistic,
        p_value,
        lags: lag,
        critical_values: critical_values.to_vec(),
    })
}

/// Fit the ADF regression with `lag` lagged differences, starting at `diffs[start]`.
fn adf_regression(
    data: &[f64],
    diffs: &[f64],
    lag: usize,
    start: usize,
) -> ChangePointResult<(f64, LeastSquaresFit)> {
    let rows = start..diffs.len();
    // diffs[t] = data[t + 1] - data[t], so the lagged level of diffs[t] is data[t]
    let mut columns = vec![vec![1.0; rows.len()], data[rows.clone()].to_vec()];
    for j in 1..=lag {
        columns.push(rows.clone().map(|t| diffs[t - j]).collect());
    }
    let fit = least_squares(&columns, &diffs[rows])?;
    let se = fit
        .std_error(1)
        .filter(|se| *se > 1e-12)
        .ok_or_else(|| ChangePointError::NumericalInstability {
            message: "ADF coefficient has no standard error".to_string(),
        })?;
    Ok((fit.coefficients[1] / se, fit))
}

/// MacKinnon critical values of the constant-only ADF statistic for `n` observations.
fn adf_critical_values(n: usize) -> [(f64, f64); 3] {
    let inv = 1.0 / n as f64;
    let inv2 = inv * inv;
    [
        (0.01, -3.43035 - 6.5393 * inv - 16.786 * inv2),
        (0.05, -2.86154 - 2.8903 * inv - 4.234 * inv2),
        (0.10, -2.56677 - 1.5384 * inv - 2.809 * inv2),
    ]
}

/// Linear interpolation between the critical values, and from the 10% value to 0.
fn adf_p_value(statistic: f64, critical_values: &[(f64, f64); 3]) -> f64 {
    let [(_, cv_01), (_, cv_05), (_, cv_10)] = *critical_values;
    if statistic < cv_01 {
        0.001
    } else if statistic < cv_05 {
        0.01 + 0.04 * ((statistic - cv_01) / (cv_05 - cv_01)).clamp(0.0, 1.0)
    } else if statistic < cv_10 {
        0.05 + 0.05 * ((statistic - cv_05) / (cv_10 - cv_05)).clamp(0.0, 1.0)
    } else if statistic < 0.0 {
        0.10 + 0.89 * ((statistic - cv_10) / -cv_10).clamp(0.0, 1.0)
    } else {
        0.99
    }
}

/// Level-stationarity critical values of the KPSS statistic.
const KPSS_CRITICAL_VALUES: [(f64, f64); 4] =
    [(0.10, 0.347), (0.05, 0.463), (0.025, 0.574), (0.01, 0.739)];

/// KPSS test of level stationarity.
///
/// The statistic is ΣSₜ² / (n² λ̂²) for partial sums Sₜ of the demeaned data and the
/// Newey-West long-run variance λ̂². A small p-value rejects stationarity. P-values are
/// interpolated in the critical-value table and so lie in [0.01, 0.10].
pub fn kpss_test(data: &[f64]) -> ChangePointResult<StationarityTest> {
    validate_data_length(data, MIN_STATIONARITY_LENGTH)?;
    validate_all_finite(data, "data")?;

    let n = data.len();
    let level = mean(data);
    let residuals: Vec<f64> = data.iter().map(|x| x - level).collect();

    let mut partial = 0.0;
    let s2 = residuals
        .iter()
        .map(|r| {
            partial += r;
            partial * partial
        })
        .sum::<f64>()
        / (n as f64 * n as f64);

    let mut bandwidth = newey_west_bandwidth(n);
    if n < 100 {
        bandwidth = bandwidth.min((n as f64).sqrt().ceil() as usize);
    }
    let lrv = newey_west_lrv(&residuals, bandwidth)?;
    let statistic = s2 / lrv;
    let p_value = kpss_p_value(statistic);
    log::debug!("KPSS statistic {:.4} (bandwidth {}, p = {:.3})", statistic, bandwidth, p_value);

    Ok(StationarityTest {
        statistic,
        p_value,
        lags: bandwidth,
        critical_values: KPSS_CRITICAL_VALUES.to_vec(),
    })
}

fn kpss_p_value(statistic: f64) -> f64 {
    let (first_p, first_cv) = KPSS_CRITICAL_VALUES[0];
    if statistic <= first_cv {
        return first_p;
    }
    for pair in KPSS_CRITICAL_VALUES.windows(2) {
        let ((p_lo, cv_lo), (p_hi, cv_hi)) = (pair[0], pair[1]);
        if statistic <= cv_hi {
            return p_lo + (p_hi - p_lo) * (statistic - cv_lo) / (cv_hi - cv_lo);
        }
    }
    KPSS_CRITICAL_VALUES[KPSS_CRITICAL_VALUES.len() - 1].0
}

/// Joint ADF and KPSS verdict on one series
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StationarityReport {
    pub adf: StationarityTest,
    pub kpss: StationarityTest,
}

impl StationarityReport {
    /// ADF rejects a unit root at the 5% level.
    pub fn adf_stationary(&self) -> bool {
        self.adf.p_value <= STATIONARITY_SIGNIFICANCE
    }

    /// KPSS does not reject stationarity at the 5% level.
    pub fn kpss_stationary(&self) -> bool {
        self.kpss.p_value >= STATIONARITY_SIGNIFICANCE
    }

    /// Both tests agree the series is stationary.
    pub fn stationary(&self) -> bool {
        self.adf_stationary() && self.kpss_stationary()
    }
}

/// Run both stationarity tests on `data`.
pub fn assess_stationarity(data: &[f64]) -> ChangePointResult<StationarityReport> {
    Ok(StationarityReport {
        adf: augmented_dickey_fuller(data)?,
        kpss: kpss_test(data)?,
    })
}

/// Volatility-clustering profile of a return series
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VolatilityProfile {
    pub window: usize,
    /// Sample std of each full window; entry `i` covers returns `i..i + window`
    pub rolling_std: Vec<f64>,
    /// Autocorrelation of absolute returns at lags 1, 2, ...
    pub abs_return_acf: Vec<f64>,
    /// Lag-1 absolute-return autocorrelation exceeds [`CLUSTERING_THRESHOLD`] in magnitude
    pub clustering: bool,
}

impl VolatilityProfile {
    /// Smallest and largest rolling std, if any window fit.
    pub fn rolling_std_range(&self) -> Option<(f64, f64)> {
        let first = *self.rolling_std.first()?;
        Some(
            self.rolling_std
                .iter()
                .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
        )
    }
}

/// Rolling volatility over `window` returns and absolute-return autocorrelations up to
/// `max_lag`.
pub fn volatility_profile(
    returns: &[f64],
    window: usize,
    max_lag: usize,
) -> ChangePointResult<VolatilityProfile> {
    if window < 2 {
        return Err(ChangePointError::InvalidParameter {
            parameter: "window".to_string(),
            value: window as f64,
            constraint: ">= 2".to_string(),
        });
    }
    validate_data_length(returns, window.max(max_lag + 2))?;
    validate_all_finite(returns, "returns")?;

    let rolling_std = returns.windows(window).map(sample_std).collect();
    let absolute: Vec<f64> = returns.iter().map(|r| r.abs()).collect();
    let abs_return_acf: Vec<f64> = (1..=max_lag).map(|lag| lagged_correlation(&absolute, lag)).collect();
    let clustering = abs_return_acf
        .first()
        .map_or(false, |acf| acf.abs() > CLUSTERING_THRESHOLD);

    Ok(VolatilityProfile {
        window,
        rolling_std,
        abs_return_acf,
        clustering,
    })
}

/// Pearson correlation of `data[lag..]` with `data[..n - lag]`; zero when either side is
/// constant.
fn lagged_correlation(data: &[f64], lag: usize) -> f64 {
    let (lead, trail) = (&data[lag..], &data[..data.len() - lag]);
    let (mean_lead, mean_trail) = (mean(lead), mean(trail));
    let mut cov = 0.0;
    let mut var_lead = 0.0;
    let mut var_trail = 0.0;
    for (a, b) in lead.iter().zip(trail) {
        let (da, db) = (a - mean_lead, b - mean_trail);
        cov += da * db;
        var_lead += da * da;
        var_trail += db * db;
    }
    let denom = (var_lead * var_trail).sqrt();
    if denom > 0.0 {
        cov / denom
    } else {
        0.0
    }
}
