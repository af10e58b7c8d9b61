//! Multi-regime change-point model.
//!
//! For a fixed number of change points K the model is
//!
//! ```text
//! (τ₁ < … < τ_K)  uniform over configurations whose K+1 segments hold ≥ m observations
//! μ_j ~ Normal(0, s_μ)                  j = 0..=K
//! σ_j ~ HalfNormal(s_σ)                 j = 0..=K
//! y_t ~ Normal(μ_seg(t), σ_seg(t))      seg(t) = number of τ_k ≤ t
//! ```
//!
//! Change points are stored as segment lengths (gaps). Positions are the cumulative sums of
//! the gaps, so an out-of-order configuration cannot be represented at all. Segment
//! log-likelihoods are O(1) from prefix sums, which is what makes the discrete Gibbs sweep over
//! every admissible position affordable.

use crate::{
    config::RegimeSpec,
    errors::{validate_all_finite, ChangePointError, ChangePointResult},
    math_utils::{half_normal_log_density, normal_log_density, LN_2PI},
    preprocessing::validate_model_length,
    secure_rng::ChainRng,
};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Statically typed handle to one model parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ParameterId {
    /// Location of change point k (0-based)
    ChangePoint(usize),
    /// Mean of regime j
    Mean(usize),
    /// Volatility of regime j
    Volatility(usize),
}

impl ParameterId {
    /// Whether the parameter is continuous.
    pub fn is_continuous(&self) -> bool {
        !matches!(self, Self::ChangePoint(_))
    }
}

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChangePoint(k) => write!(f, "cp_{}", k),
            Self::Mean(j) => write!(f, "mu_{}", j),
            Self::Volatility(j) => write!(f, "sigma_{}", j),
        }
    }
}

/// One point in parameter space.
#[derive(Debug, Clone, PartialEq)]
pub struct RegimeParameters {
    gaps: Vec<usize>,
    means: Vec<f64>,
    volatilities: Vec<f64>,
}

impl RegimeParameters {
    /// Build from explicit change-point positions over a series of length `len`.
    ///
    /// Positions must be strictly increasing and inside `(0, len)`.
    pub fn from_change_points(
        change_points: &[usize],
        len: usize,
        means: Vec<f64>,
        volatilities: Vec<f64>,
    ) -> ChangePointResult<Self> {
        let num_regimes = change_points.len() + 1;
        if means.len() != num_regimes || volatilities.len() != num_regimes {
            return Err(ChangePointError::InvalidParameter {
                parameter: "regime parameters".to_string(),
                value: means.len().min(volatilities.len()) as f64,
                constraint: format!("exactly {} means and volatilities", num_regimes),
            });
        }

        let mut gaps = Vec::with_capacity(num_regimes);
        let mut previous = 0;
        for &position in change_points.iter().chain(std::iter::once(&len)) {
            if position <= previous {
                return Err(ChangePointError::InvalidParameter {
                    parameter: "change_points".to_string(),
                    value: position as f64,
                    constraint: format!("strictly increasing and > {}", previous),
                });
            }
            gaps.push(position - previous);
            previous = position;
        }

        Ok(Self {
            gaps,
            means,
            volatilities,
        })
    }

    /// Number of change points.
    pub fn num_change_points(&self) -> usize {
        self.gaps.len() - 1
    }

    /// Segment lengths (K + 1 of them).
    pub fn gaps(&self) -> &[usize] {
        &self.gaps
    }

    /// Change-point positions: index of the first observation of each new regime.
    pub fn change_points(&self) -> Vec<usize> {
        self.gaps[..self.gaps.len() - 1]
            .iter()
            .scan(0, |acc, gap| {
                *acc += gap;
                Some(*acc)
            })
            .collect()
    }

    /// Position of change point `k`.
    pub fn change_point(&self, k: usize) -> usize {
        self.gaps[..=k].iter().sum()
    }

    /// Regime means.
    pub fn means(&self) -> &[f64] {
        &self.means
    }

    /// Regime volatilities.
    pub fn volatilities(&self) -> &[f64] {
        &self.volatilities
    }

    /// Half-open index range `[start, end)` of regime `j`.
    pub fn segment(&self, j: usize) -> (usize, usize) {
        let start: usize = self.gaps[..j].iter().sum();
        (start, start + self.gaps[j])
    }

    /// Move change point `k` to `position`, keeping every other change point fixed.
    ///
    /// Only the two gaps adjacent to the change point change, so the total length and the
    /// ordering are preserved. Callers keep `position` strictly between its neighbours.
    pub(crate) fn move_change_point(&mut self, k: usize, position: usize) {
        let (start, end) = (self.segment(k).0, self.segment(k + 1).1);
        debug_assert!(position > start && position < end);
        self.gaps[k] = position - start;
        self.gaps[k + 1] = end - position;
    }

    pub(crate) fn set_mean(&mut self, j: usize, value: f64) {
        self.means[j] = value;
    }

    pub(crate) fn set_volatility(&mut self, j: usize, value: f64) {
        self.volatilities[j] = value;
    }
}

/// Prefix sums of y and y² for O(1) segment statistics.
#[derive(Debug, Clone)]
struct PrefixSums {
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl PrefixSums {
    fn new(data: &[f64]) -> Self {
        let mut sum = Vec::with_capacity(data.len() + 1);
        let mut sum_sq = Vec::with_capacity(data.len() + 1);
        let (mut s, mut s2) = (0.0, 0.0);
        sum.push(s);
        sum_sq.push(s2);
        for &y in data {
            s += y;
            s2 += y * y;
            sum.push(s);
            sum_sq.push(s2);
        }
        Self { sum, sum_sq }
    }

    fn sum(&self, start: usize, end: usize) -> f64 {
        self.sum[end] - self.sum[start]
    }

    fn sum_sq(&self, start: usize, end: usize) -> f64 {
        self.sum_sq[end] - self.sum_sq[start]
    }
}

/// Explicit model value: data, priors and structural constraints.
///
/// The sampler receives it by reference; nothing about the model lives in ambient state.
#[derive(Debug, Clone)]
pub struct RegimeModel {
    spec: RegimeSpec,
    data: Vec<f64>,
    prefix: PrefixSums,
}

impl RegimeModel {
    /// Build a model for `data` (already transformed).
    pub fn new(data: &[f64], spec: &RegimeSpec) -> ChangePointResult<Self> {
        spec.validate()?;
        validate_all_finite(data, "model data")?;
        validate_model_length(data.len(), spec)?;

        Ok(Self {
            spec: spec.clone(),
            data: data.to_vec(),
            prefix: PrefixSums::new(data),
        })
    }

    /// Model configuration.
    pub fn spec(&self) -> &RegimeSpec {
        &self.spec
    }

    /// Observations.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the model holds no observations.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of change points K.
    pub fn num_change_points(&self) -> usize {
        self.spec.num_change_points
    }

    /// Number of regimes K + 1.
    pub fn num_regimes(&self) -> usize {
        self.spec.num_regimes()
    }

    /// Minimum observations per regime.
    pub fn min_segment_length(&self) -> usize {
        self.spec.min_segment_length
    }

    /// Every parameter of the model in a fixed order.
    pub fn parameter_ids(&self) -> Vec<ParameterId> {
        let k = self.num_change_points();
        let r = self.num_regimes();
        (0..k)
            .map(ParameterId::ChangePoint)
            .chain((0..r).map(ParameterId::Mean))
            .chain((0..r).map(ParameterId::Volatility))
            .collect()
    }

    /// Continuous parameters (means then volatilities).
    pub fn continuous_parameter_ids(&self) -> Vec<ParameterId> {
        self.parameter_ids()
            .into_iter()
            .filter(ParameterId::is_continuous)
            .collect()
    }

    /// Count and sum of observations in `[start, end)`.
    pub fn segment_moments(&self, start: usize, end: usize) -> (usize, f64, f64) {
        (
            end - start,
            self.prefix.sum(start, end),
            self.prefix.sum_sq(start, end),
        )
    }

    /// Log-likelihood of `[start, end)` under Normal(mean, volatility).
    pub fn segment_log_likelihood(&self, start: usize, end: usize, mean: f64, volatility: f64) -> f64 {
        if volatility <= 0.0 || !volatility.is_finite() || !mean.is_finite() {
            return f64::NEG_INFINITY;
        }
        let (n, s1, s2) = self.segment_moments(start, end);
        let n = n as f64;
        let squared_error = (s2 - 2.0 * mean * s1 + n * mean * mean).max(0.0);
        -n * (0.5 * LN_2PI + volatility.ln()) - squared_error / (2.0 * volatility * volatility)
    }

    /// Admissible positions `[lo, hi]` for change point `k` with the others held fixed.
    pub fn change_point_bounds(&self, params: &RegimeParameters, k: usize) -> (usize, usize) {
        let m = self.min_segment_length();
        let start = params.segment(k).0;
        let end = params.segment(k + 1).1;
        (start + m, end - m)
    }

    /// Whether `params` respects K, the series length and the minimum segment length.
    pub fn is_admissible(&self, params: &RegimeParameters) -> bool {
        params.gaps.len() == self.num_regimes()
            && params.means.len() == self.num_regimes()
            && params.volatilities.len() == self.num_regimes()
            && params.gaps.iter().sum::<usize>() == self.len()
            && params.gaps.iter().all(|&g| g >= self.min_segment_length())
    }

    /// Log-likelihood of all observations.
    pub fn log_likelihood(&self, params: &RegimeParameters) -> f64 {
        (0..self.num_regimes())
            .map(|j| {
                let (start, end) = params.segment(j);
                self.segment_log_likelihood(start, end, params.means[j], params.volatilities[j])
            })
            .sum()
    }

    /// Log prior density, up to the constant of the uniform change-point prior.
    pub fn log_prior(&self, params: &RegimeParameters) -> f64 {
        if !self.is_admissible(params) {
            return f64::NEG_INFINITY;
        }
        let means: f64 = params
            .means
            .iter()
            .map(|&mu| normal_log_density(mu, 0.0, self.spec.mean_prior_sd))
            .sum();
        let vols: f64 = params
            .volatilities
            .iter()
            .map(|&sigma| half_normal_log_density(sigma, self.spec.volatility_prior_scale))
            .sum();
        means + vols
    }

    /// Unnormalized log posterior density.
    pub fn log_posterior(&self, params: &RegimeParameters) -> f64 {
        let prior = self.log_prior(params);
        if !prior.is_finite() {
            return f64::NEG_INFINITY;
        }
        prior + self.log_likelihood(params)
    }

    /// Log density of log σ for regime `j` (likelihood + prior + Jacobian), other parameters fixed.
    pub(crate) fn log_volatility_target(
        &self,
        params: &RegimeParameters,
        j: usize,
        log_volatility: f64,
    ) -> f64 {
        let volatility = log_volatility.exp();
        let (start, end) = params.segment(j);
        self.segment_log_likelihood(start, end, params.means[j], volatility)
            + half_normal_log_density(volatility, self.spec.volatility_prior_scale)
            + log_volatility
    }

    /// Random admissible change-point configuration.
    ///
    /// The slack above the minimum segment lengths is split at K uniform cut points.
    pub fn sample_gaps(&self, rng: &mut ChainRng) -> Vec<usize> {
        let m = self.min_segment_length();
        let slack = self.len() - m * self.num_regimes();
        let mut cuts: Vec<usize> = (0..self.num_change_points())
            .map(|_| rng.usize(0..slack + 1))
            .collect();
        cuts.sort_unstable();

        let mut gaps = Vec::with_capacity(self.num_regimes());
        let mut previous = 0;
        for &cut in cuts.iter().chain(std::iter::once(&slack)) {
            gaps.push(m + cut - previous);
            previous = cut;
        }
        gaps
    }

    /// Overdispersed starting point: random change points, regime parameters from segment
    /// moments with jitter.
    pub fn initial_parameters(&self, rng: &mut ChainRng) -> RegimeParameters {
        let gaps = self.sample_gaps(rng);
        let mut params = RegimeParameters {
            means: vec![0.0; gaps.len()],
            volatilities: vec![0.0; gaps.len()],
            gaps,
        };

        for j in 0..self.num_regimes() {
            let (start, end) = params.segment(j);
            let (n, s1, s2) = self.segment_moments(start, end);
            let n = n as f64;
            let mean = s1 / n;
            let variance = ((s2 - n * mean * mean) / (n - 1.0).max(1.0)).max(0.0);
            let sd = variance.sqrt().max(1e-8);
            params.means[j] = mean + rng.normal(0.0, sd / n.sqrt());
            params.volatilities[j] = sd * rng.normal(0.0, 0.1).exp();
        }
        params
    }
}
