//! # Change-Point Analysis Orchestration
//!
//! [`run_analysis`] wires the pipeline for one series:
//!
//! ```text
//! preprocess → stationarity and volatility checks → model → sample → diagnose → summarize → associate
//! ```
//!
//! Every validation happens before sampling starts. Non-convergence never fails a run; it is
//! reported on the result.
//!
//! [`ChangePointAnalyzer`] holds several named series and one event catalog, runs analyses on
//! demand and keeps the latest report per series.

use crate::{
    config::RunConfig,
    diagnostics::diagnose,
    errors::{ChangePointError, ChangePointResult},
    events::{event_window_impact, Event, EventAssociator},
    preprocessing::{
        assess_stationarity, preprocess_series, volatility_profile, VOLATILITY_MAX_LAG,
        VOLATILITY_WINDOW,
    },
    regime_model::RegimeModel,
    results::{AnalysisReport, SamplingStats},
    sampler::{DrawSet, Sampler},
    series::{Observation, Series},
    summarizer::{ChangePointSummarizer, ModelCriteria},
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Run the full pipeline on `series` against the `events` catalog.
pub fn run_analysis(
    series: Arc<Series>,
    events: &[Event],
    config: &RunConfig,
) -> ChangePointResult<AnalysisReport> {
    config.validate()?;
    let period = series.period().ok_or(ChangePointError::InsufficientData {
        required: config.regime.required_length(),
        actual: 0,
    })?;
    let observations = series.len();

    let prepared = preprocess_series(series, config.data_kind, &config.regime)?;
    let level_stationarity = exploratory("raw series stationarity", || {
        assess_stationarity(prepared.raw().values())
    });
    let input_stationarity = exploratory("model input stationarity", || {
        assess_stationarity(prepared.values())
    });
    if let Some(report) = input_stationarity.as_ref().filter(|r| !r.stationary()) {
        log::warn!(
            "Model input does not look stationary (ADF p = {:.3}, KPSS p = {:.3}); regime means may absorb a trend",
            report.adf.p_value,
            report.kpss.p_value
        );
    }
    let volatility = exploratory("volatility profile", || {
        volatility_profile(prepared.values(), VOLATILITY_WINDOW, VOLATILITY_MAX_LAG)
    });
    if volatility.as_ref().map_or(false, |v| v.clustering) {
        log::info!("Returns show volatility clustering");
    }

    let model = RegimeModel::new(prepared.values(), &config.regime)?;
    let summarizer = ChangePointSummarizer::new(config.credible_mass)?;
    let associator = EventAssociator::new(config.association)?;

    log::info!(
        "Analyzing {} observations from {} to {} with K = {}",
        observations,
        period.0,
        period.1,
        config.regime.num_change_points
    );

    let draws = Sampler::new(config.sampler.clone())?.run(&model)?;
    let convergence = diagnose(&draws, &config.diagnostics);
    let summary = summarizer.summarize(&draws, &model, &prepared)?;

    let associations = associator.associate(&summary, events);
    let nearby_events = summary
        .change_points
        .iter()
        .map(|cp| associator.events_in_window(cp.date, events))
        .collect();
    let event_impacts = associations
        .iter()
        .map(|association| {
            association.as_ref().and_then(|a| {
                event_window_impact(prepared.raw(), &a.event, config.association.window_days)
            })
        })
        .collect();

    for cp in &summary.change_points {
        log::info!(
            "Change point {} at {} (interval {} to {}, {} days)",
            cp.index,
            cp.date,
            cp.interval_dates.0,
            cp.interval_dates.1,
            cp.uncertainty_days
        );
    }

    Ok(AnalysisReport {
        config: config.clone(),
        period,
        observations,
        level_stationarity,
        input_stationarity,
        volatility,
        sampling: sampling_stats(&draws),
        summary,
        convergence,
        associations,
        nearby_events,
        event_impacts,
    })
}

/// Build a series from `observations` and run the full pipeline.
pub fn analyze(
    observations: Vec<Observation>,
    events: &[Event],
    config: &RunConfig,
) -> ChangePointResult<AnalysisReport> {
    let series = Series::new(observations)?;
    run_analysis(Arc::new(series), events, config)
}

/// Result of a check that informs the report but never fails the run.
fn exploratory<T>(what: &str, check: impl FnOnce() -> ChangePointResult<T>) -> Option<T> {
    match check() {
        Ok(value) => Some(value),
        Err(error) => {
            log::warn!("Skipping {}: {}", what, error);
            None
        }
    }
}

fn sampling_stats(draws: &DrawSet) -> SamplingStats {
    let rates: Vec<f64> = draws
        .chains()
        .iter()
        .flat_map(|chain| chain.volatility_acceptance.iter().copied())
        .collect();
    SamplingStats {
        chains: draws.num_chains(),
        draws_per_chain: draws.draws_per_chain(),
        total_draws: draws.total_draws(),
        truncated: draws.truncated(),
        mean_volatility_acceptance: crate::math_utils::mean(&rates),
        rejected_non_finite: draws.chains().iter().map(|c| c.rejected_non_finite).sum(),
    }
}

/// One candidate number of change points
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModelCandidate {
    pub num_change_points: usize,
    pub criteria: ModelCriteria,
    pub converged: bool,
}

/// Candidates ranked by BIC, best first
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModelComparison {
    pub candidates: Vec<ModelCandidate>,
}

impl ModelComparison {
    /// Candidate with the lowest BIC.
    pub fn best(&self) -> Option<&ModelCandidate> {
        self.candidates.first()
    }
}

/// Multi-series change-point analyzer.
///
/// Series and reports are shared behind locks so a single analyzer can be read from several
/// threads while analyses run.
#[derive(Debug, Default)]
pub struct ChangePointAnalyzer {
    /// Named series (deterministic ordering)
    series: Arc<RwLock<BTreeMap<String, Arc<Series>>>>,
    /// Latest report per series
    results: Arc<RwLock<BTreeMap<String, AnalysisReport>>>,
    events: Vec<Event>,
    config: RunConfig,
}

impl ChangePointAnalyzer {
    /// Analyzer with the standard configuration and an empty event catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyzer with `config` as the default run configuration.
    pub fn with_config(config: RunConfig) -> ChangePointResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    /// Default run configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Replace the default run configuration.
    pub fn set_config(&mut self, config: RunConfig) -> ChangePointResult<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Replace the event catalog. Stored reports are kept.
    pub fn set_events(&mut self, events: Vec<Event>) {
        log::debug!("Event catalog replaced with {} events", events.len());
        self.events = events;
    }

    /// Event catalog.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Register `series` under `name`.
    ///
    /// Returns true when the name is new, false when an existing series was replaced. Replacing
    /// a series discards its stored report.
    pub fn add_time_series(&mut self, name: impl Into<String>, series: Series) -> bool {
        let name = name.into();
        let len = series.len();
        let is_new = self
            .series
            .write()
            .insert(name.clone(), Arc::new(series))
            .is_none();
        if !is_new {
            self.results.write().remove(&name);
        }
        log::debug!(
            "{} series {} with {} observations",
            if is_new { "Added" } else { "Replaced" },
            name,
            len
        );
        is_new
    }

    /// Remove a series and its report. Returns whether it existed.
    pub fn remove_time_series(&mut self, name: &str) -> bool {
        let removed = self.series.write().remove(name).is_some();
        if removed {
            self.results.write().remove(name);
        }
        removed
    }

    /// Registered series names in order.
    pub fn series_names(&self) -> Vec<String> {
        self.series.read().keys().cloned().collect()
    }

    /// Shared handle to the series registered under `name`.
    pub fn get_series(&self, name: &str) -> ChangePointResult<Arc<Series>> {
        self.series
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ChangePointError::SeriesNotFound {
                name: name.to_string(),
            })
    }

    /// Analyze `name` with the default configuration and store the report.
    pub fn analyze_series(&mut self, name: &str) -> ChangePointResult<AnalysisReport> {
        let config = self.config.clone();
        self.analyze_series_with_config(name, &config)
    }

    /// Analyze `name` with `config` and store the report.
    pub fn analyze_series_with_config(
        &mut self,
        name: &str,
        config: &RunConfig,
    ) -> ChangePointResult<AnalysisReport> {
        let series = self.get_series(name)?;
        let report = run_analysis(series, &self.events, config)?;
        if !report.converged() {
            log::warn!("Analysis of {} did not converge", name);
        }
        self.results.write().insert(name.to_string(), report.clone());
        Ok(report)
    }

    /// Analyze every registered series with the default configuration.
    ///
    /// Stops at the first failure; reports of series analyzed before it are kept.
    pub fn analyze_all_series(&mut self) -> ChangePointResult<()> {
        for name in self.series_names() {
            self.analyze_series(&name)?;
        }
        Ok(())
    }

    /// Latest report of `name`.
    pub fn get_analysis_results(&self, name: &str) -> ChangePointResult<AnalysisReport> {
        self.results
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ChangePointError::SeriesNotFound {
                name: name.to_string(),
            })
    }

    /// Fit `name` with each number of change points in `counts` and rank them by BIC.
    ///
    /// Counts the series is too short for are skipped; the comparison fails only when no count
    /// could be fitted. Reports produced here are not stored.
    pub fn compare_change_point_counts(
        &self,
        name: &str,
        counts: &[usize],
    ) -> ChangePointResult<ModelComparison> {
        let series = self.get_series(name)?;
        let mut candidates = Vec::with_capacity(counts.len());
        let mut last_error = None;

        for &k in counts {
            let config = self.config.clone().with_change_points(k);
            match run_analysis(Arc::clone(&series), &[], &config) {
                Ok(report) => candidates.push(ModelCandidate {
                    num_change_points: k,
                    criteria: report.summary.criteria,
                    converged: report.converged(),
                }),
                Err(error @ ChangePointError::TooManyChangePoints { .. }) => {
                    log::warn!("Skipping K = {}: {}", k, error);
                    last_error = Some(error);
                }
                Err(error) => return Err(error),
            }
        }

        if candidates.is_empty() {
            return Err(last_error.unwrap_or_else(|| ChangePointError::InvalidParameter {
                parameter: "counts".to_string(),
                value: 0.0,
                constraint: "at least one number of change points".to_string(),
            }));
        }

        candidates.sort_by(|a, b| {
            a.criteria
                .bic
                .total_cmp(&b.criteria.bic)
                .then_with(|| a.num_change_points.cmp(&b.num_change_points))
        });
        log::info!(
            "Best number of change points for {} by BIC: {}",
            name,
            candidates[0].num_change_points
        );
        Ok(ModelComparison { candidates })
    }
}
