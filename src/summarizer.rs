//! Posterior summaries: change-point estimates, regime statistics, transitions and model
//! criteria.
//!
//! Everything here is a pure function of the stored draws, the model and the prepared series,
//! so summarizing the same draws twice gives bit-identical results.

use crate::{
    errors::{ChangePointError, ChangePointResult},
    math_utils::{calculate_variance, mean, sample_std},
    preprocessing::PreparedSeries,
    regime_model::{ParameterId, RegimeModel, RegimeParameters},
    sampler::DrawSet,
};
use chrono::NaiveDate;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Trading days per year used to annualize daily volatility
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Summary of one change point
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChangePointEstimate {
    /// Position among the change points (0-based)
    pub index: usize,
    /// Point estimate (lower median of the draws), in model indices
    pub location: usize,
    /// Date of the point estimate
    pub date: NaiveDate,
    /// Highest density interval bounds, in model indices (inclusive)
    pub interval: (usize, usize),
    /// Dates of the interval bounds
    pub interval_dates: (NaiveDate, NaiveDate),
    /// Interval width in days
    pub uncertainty_days: i64,
    /// Posterior mean location
    pub posterior_mean: f64,
    /// Posterior standard deviation of the location
    pub posterior_sd: f64,
}

/// Statistics of one regime
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegimeSummary {
    pub index: usize,
    /// First raw observation of the regime
    pub start_index: usize,
    /// One past the last raw observation of the regime
    pub end_index: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Number of raw observations
    pub observations: usize,
    /// Mean of the raw values in the regime
    pub mean: f64,
    /// Sample standard deviation of the raw values in the regime
    pub std: f64,
    /// Posterior mean of the regime mean parameter
    pub mean_parameter: f64,
    pub mean_parameter_sd: f64,
    /// Posterior mean of the regime volatility parameter
    pub volatility_parameter: f64,
    pub volatility_parameter_sd: f64,
    /// Annualized volatility in percent
    pub annualized_volatility_pct: f64,
    /// Calendar days from first to last observation
    pub duration_days: i64,
}

/// Change between two consecutive regimes
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegimeTransition {
    /// Change point separating the regimes
    pub change_point: usize,
    pub date: NaiveDate,
    pub from_regime: usize,
    pub to_regime: usize,
    /// Difference of posterior mean parameters
    pub mean_change: f64,
    /// Difference of posterior volatility parameters
    pub volatility_change: f64,
    /// Difference of annualized volatilities, percentage points
    pub annualized_volatility_change: f64,
    /// Percentage change of the raw-series mean; `None` when the earlier mean is zero
    pub raw_mean_change_pct: Option<f64>,
}

/// Fit criteria at the point estimates
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModelCriteria {
    pub num_change_points: usize,
    pub log_likelihood: f64,
    /// Free parameters: K locations plus a mean and a volatility per regime
    pub num_parameters: usize,
    pub aic: f64,
    pub bic: f64,
}

/// Everything summarized from one draw set
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PosteriorSummary {
    pub credible_mass: f64,
    pub change_points: Vec<ChangePointEstimate>,
    pub regimes: Vec<RegimeSummary>,
    pub transitions: Vec<RegimeTransition>,
    pub criteria: ModelCriteria,
}

/// Reduces posterior draws to estimates and regime statistics.
#[derive(Debug, Clone, Copy)]
pub struct ChangePointSummarizer {
    credible_mass: f64,
}

impl ChangePointSummarizer {
    /// Summarizer with credible intervals holding `credible_mass` of the draws.
    pub fn new(credible_mass: f64) -> ChangePointResult<Self> {
        if !(credible_mass > 0.0 && credible_mass < 1.0) {
            return Err(ChangePointError::InvalidParameter {
                parameter: "credible_mass".to_string(),
                value: credible_mass,
                constraint: "(0, 1)".to_string(),
            });
        }
        Ok(Self { credible_mass })
    }

    /// Summarize `draws` of `model`, mapping indices through `prepared`.
    pub fn summarize(
        &self,
        draws: &DrawSet,
        model: &RegimeModel,
        prepared: &PreparedSeries,
    ) -> ChangePointResult<PosteriorSummary> {
        if prepared.len() != model.len() || draws.num_change_points() != model.num_change_points()
        {
            return Err(ChangePointError::InvalidParameter {
                parameter: "draws".to_string(),
                value: draws.num_change_points() as f64,
                constraint: format!(
                    "{} change points over {} observations",
                    model.num_change_points(),
                    model.len()
                ),
            });
        }

        let change_points = (0..draws.num_change_points())
            .map(|k| self.estimate_change_point(draws, prepared, k))
            .collect::<ChangePointResult<Vec<_>>>()?;

        let regimes = summarize_regimes(draws, prepared, &change_points);
        let transitions = regime_transitions(&regimes, &change_points);
        let criteria = model_criteria(draws, model, &change_points, &regimes)?;

        log::debug!(
            "Summarized {} change points and {} regimes (log-likelihood {:.2})",
            change_points.len(),
            regimes.len(),
            criteria.log_likelihood
        );

        Ok(PosteriorSummary {
            credible_mass: self.credible_mass,
            change_points,
            regimes,
            transitions,
            criteria,
        })
    }

    fn estimate_change_point(
        &self,
        draws: &DrawSet,
        prepared: &PreparedSeries,
        k: usize,
    ) -> ChangePointResult<ChangePointEstimate> {
        let mut pooled = draws.pooled_change_points(k);
        pooled.sort_unstable();

        let missing = || ChangePointError::NumericalInstability {
            message: format!("no draws for change point {}", k),
        };
        let location = lower_median(&pooled).ok_or_else(missing)?;
        let interval =
            highest_density_interval(&pooled, self.credible_mass).ok_or_else(missing)?;

        let as_f64: Vec<f64> = pooled.iter().map(|&t| t as f64).collect();
        let interval_dates = (prepared.date_of(interval.0), prepared.date_of(interval.1));

        Ok(ChangePointEstimate {
            index: k,
            location,
            date: prepared.date_of(location),
            interval,
            interval_dates,
            uncertainty_days: (interval_dates.1 - interval_dates.0).num_days(),
            posterior_mean: mean(&as_f64),
            posterior_sd: sample_std(&as_f64),
        })
    }
}

/// Lower median of sorted values: the lower of the two middle values for even counts.
pub fn lower_median(sorted: &[usize]) -> Option<usize> {
    if sorted.is_empty() {
        return None;
    }
    Some(sorted[(sorted.len() - 1) / 2])
}

/// Shortest interval `[lo, hi]` holding at least `ceil(mass · n)` of the sorted draws.
///
/// Ties between equally short windows go to the earliest one.
pub fn highest_density_interval(sorted: &[usize], mass: f64) -> Option<(usize, usize)> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let window = ((mass * n as f64).ceil() as usize).clamp(1, n);

    let mut best = (sorted[0], sorted[window - 1]);
    for start in 1..=n - window {
        let candidate = (sorted[start], sorted[start + window - 1]);
        if candidate.1 - candidate.0 < best.1 - best.0 {
            best = candidate;
        }
    }
    Some(best)
}

/// Raw-series boundaries implied by the point estimates: 0, one per change point, raw length.
fn regime_boundaries(prepared: &PreparedSeries, change_points: &[ChangePointEstimate]) -> Vec<usize> {
    std::iter::once(0)
        .chain(change_points.iter().map(|cp| prepared.raw_index(cp.location)))
        .chain(std::iter::once(prepared.raw().len()))
        .collect()
}

fn posterior_moments(draws: &DrawSet, id: ParameterId) -> (f64, f64) {
    let values = draws.pooled(id);
    (mean(&values), calculate_variance(&values).sqrt())
}

fn summarize_regimes(
    draws: &DrawSet,
    prepared: &PreparedSeries,
    change_points: &[ChangePointEstimate],
) -> Vec<RegimeSummary> {
    let raw = prepared.raw();
    let boundaries = regime_boundaries(prepared, change_points);

    boundaries
        .windows(2)
        .enumerate()
        .map(|(j, bounds)| {
            let (start, end) = (bounds[0], bounds[1]);
            let values = &raw.values()[start..end];
            let (start_date, end_date) = (raw.dates()[start], raw.dates()[end - 1]);
            let (mean_parameter, mean_parameter_sd) = posterior_moments(draws, ParameterId::Mean(j));
            let (volatility_parameter, volatility_parameter_sd) =
                posterior_moments(draws, ParameterId::Volatility(j));

            RegimeSummary {
                index: j,
                start_index: start,
                end_index: end,
                start_date,
                end_date,
                observations: values.len(),
                mean: mean(values),
                std: sample_std(values),
                mean_parameter,
                mean_parameter_sd,
                volatility_parameter,
                volatility_parameter_sd,
                annualized_volatility_pct: annualize_volatility(volatility_parameter),
                duration_days: (end_date - start_date).num_days(),
            }
        })
        .collect()
}

/// Daily volatility expressed as annualized percent.
pub fn annualize_volatility(daily: f64) -> f64 {
    daily * TRADING_DAYS_PER_YEAR.sqrt() * 100.0
}

fn regime_transitions(
    regimes: &[RegimeSummary],
    change_points: &[ChangePointEstimate],
) -> Vec<RegimeTransition> {
    regimes
        .windows(2)
        .zip(change_points)
        .map(|(pair, cp)| {
            let (before, after) = (&pair[0], &pair[1]);
            let raw_mean_change_pct = if before.mean != 0.0 {
                Some((after.mean - before.mean) / before.mean.abs() * 100.0)
            } else {
                None
            };
            RegimeTransition {
                change_point: cp.index,
                date: cp.date,
                from_regime: before.index,
                to_regime: after.index,
                mean_change: after.mean_parameter - before.mean_parameter,
                volatility_change: after.volatility_parameter - before.volatility_parameter,
                annualized_volatility_change: after.annualized_volatility_pct
                    - before.annualized_volatility_pct,
                raw_mean_change_pct,
            }
        })
        .collect()
}

fn model_criteria(
    draws: &DrawSet,
    model: &RegimeModel,
    change_points: &[ChangePointEstimate],
    regimes: &[RegimeSummary],
) -> ChangePointResult<ModelCriteria> {
    let locations: Vec<usize> = change_points.iter().map(|cp| cp.location).collect();
    let params = RegimeParameters::from_change_points(
        &locations,
        model.len(),
        regimes.iter().map(|r| r.mean_parameter).collect(),
        regimes.iter().map(|r| r.volatility_parameter).collect(),
    )?;

    let k = draws.num_change_points();
    let num_parameters = k + 2 * (k + 1);
    let log_likelihood = model.log_likelihood(&params);
    let p = num_parameters as f64;

    Ok(ModelCriteria {
        num_change_points: k,
        log_likelihood,
        num_parameters,
        aic: 2.0 * p - 2.0 * log_likelihood,
        bic: p * (model.len() as f64).ln() - 2.0 * log_likelihood,
    })
}
