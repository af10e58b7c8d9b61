//! # Analysis Results Structures
//!
//! [`AnalysisReport`] is the complete result of one run: posterior summary, convergence
//! assessment, event associations and sampling statistics. [`AnalysisOutput`] is the compact
//! serializable contract handed to external consumers, derived from a report with
//! [`AnalysisReport::to_output`].

use crate::{
    config::RunConfig,
    diagnostics::ConvergenceReport,
    events::{Association, EventCategory, EventImpact, NearbyEvent},
    preprocessing::{StationarityReport, VolatilityProfile},
    summarizer::PosteriorSummary,
};
use chrono::NaiveDate;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Statement attached to every output: associations are correlational, not causal.
pub const CORRELATION_QUALIFIER: &str = "Change points and event associations describe statistical \
structure and temporal proximity only. An associated event coincides with a detected break; this \
does not establish that the event caused the change in prices.";

/// Sampling statistics of a run
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SamplingStats {
    /// Chains that produced draws
    pub chains: usize,
    /// Draws per chain used for diagnostics
    pub draws_per_chain: usize,
    pub total_draws: usize,
    /// Whether sampling stopped at the deadline
    pub truncated: bool,
    /// Mean acceptance rate of volatility proposals over chains and regimes
    pub mean_volatility_acceptance: f64,
    /// Updates skipped for non-finite densities
    pub rejected_non_finite: usize,
}

/// Complete result of one analysis run
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AnalysisReport {
    pub config: RunConfig,
    /// First and last raw observation dates
    pub period: (NaiveDate, NaiveDate),
    /// Raw observations
    pub observations: usize,
    /// ADF and KPSS on the raw series; `None` when the tests could not be computed
    pub level_stationarity: Option<StationarityReport>,
    /// ADF and KPSS on the modeled series
    pub input_stationarity: Option<StationarityReport>,
    /// Volatility clustering of the modeled series
    pub volatility: Option<VolatilityProfile>,
    pub summary: PosteriorSummary,
    pub convergence: ConvergenceReport,
    /// Entry `k` holds the event assigned to change point `k`
    pub associations: Vec<Option<Association>>,
    /// Entry `k` lists every event within the window of change point `k`
    pub nearby_events: Vec<Vec<NearbyEvent>>,
    /// Entry `k` compares the raw series before and after the event assigned to change point `k`
    pub event_impacts: Vec<Option<EventImpact>>,
    pub sampling: SamplingStats,
}

impl AnalysisReport {
    /// Whether the run passed the convergence gate.
    pub fn converged(&self) -> bool {
        self.convergence.converged
    }

    /// Compact output contract.
    pub fn to_output(&self) -> AnalysisOutput {
        let change_points = self
            .summary
            .change_points
            .iter()
            .zip(&self.associations)
            .map(|(cp, association)| ChangePointOutput {
                date: cp.date,
                credible_interval: [cp.interval_dates.0, cp.interval_dates.1],
                uncertainty_days: cp.uncertainty_days,
                associated_event: association.as_ref().map(|a| AssociatedEventOutput {
                    date: a.event.date,
                    category: a.event.category,
                    score: a.score,
                }),
            })
            .collect();

        let regimes = self
            .summary
            .regimes
            .iter()
            .map(|r| RegimeOutput {
                start: r.start_date,
                end: r.end_date,
                mean: r.mean,
                std: r.std,
            })
            .collect();

        AnalysisOutput {
            change_points,
            regimes,
            converged: self.convergence.converged,
            diagnostics: DiagnosticsOutput {
                max_variance_ratio: finite_or(self.convergence.max_rhat, f64::MAX),
                min_effective_sample_size: finite_or(self.convergence.min_ess, 0.0),
            },
            qualifier: CORRELATION_QUALIFIER.to_string(),
        }
    }
}

/// Event assigned to a change point, as exposed in the output contract
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AssociatedEventOutput {
    pub date: NaiveDate,
    pub category: EventCategory,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChangePointOutput {
    pub date: NaiveDate,
    pub credible_interval: [NaiveDate; 2],
    pub uncertainty_days: i64,
    pub associated_event: Option<AssociatedEventOutput>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegimeOutput {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub mean: f64,
    pub std: f64,
}

/// Convergence figures of the output contract.
///
/// Both are always finite so they serialize as JSON numbers. A variance ratio that could not
/// be computed (too few draws per chain) is reported as `f64::MAX`, and an undefined effective
/// sample size as `0.0`; `converged` is false in either case.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DiagnosticsOutput {
    pub max_variance_ratio: f64,
    pub min_effective_sample_size: f64,
}

/// Serializable result handed to external consumers
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AnalysisOutput {
    pub change_points: Vec<ChangePointOutput>,
    pub regimes: Vec<RegimeOutput>,
    pub converged: bool,
    pub diagnostics: DiagnosticsOutput,
    pub qualifier: String,
}

/// `value` when finite; otherwise `fallback`, except that positive infinity saturates to `f64::MAX`.
fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else if value == f64::INFINITY {
        f64::MAX
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finite_or_keeps_finite_values() {
        assert_eq!(finite_or(1.02, f64::MAX), 1.02);
        assert_eq!(finite_or(0.0, 5.0), 0.0);
    }

    #[test]
    fn test_finite_or_replaces_non_finite_values() {
        assert_eq!(finite_or(f64::INFINITY, 0.0), f64::MAX);
        assert_eq!(finite_or(f64::NAN, f64::MAX), f64::MAX);
        assert_eq!(finite_or(f64::NAN, 0.0), 0.0);
        assert_eq!(finite_or(f64::NEG_INFINITY, 0.0), 0.0);
    }
}
