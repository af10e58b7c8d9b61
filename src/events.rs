//! # Event Association
//!
//! Matches detected change points with a catalog of dated market events.
//!
//! ## Scoring
//! An event is a candidate for a change point when it lies within `window_days` of it. Each
//! candidate pair scores
//!
//! ```text
//! confidence_weight(confidence) - distance_weight * |Δdays| / (window_days + 1)
//! ```
//!
//! with weights Low = 1, Medium = 2, High = 3. The distance penalty is always below 1, so a more
//! confident event wins over a less confident one at any distance, and the closer event wins
//! between equally confident ones.
//!
//! ## Assignment
//! Pairs are ranked globally by score (ties: smaller distance, then change-point order, then
//! catalog order) and assigned greedily, so every change point gets at most one event and every
//! event is used at most once.
//!
//! Associations are temporal correlations only. They carry no claim that the event caused the
//! price move.

use crate::{
    config::AssociationConfig,
    errors::ChangePointResult,
    math_utils::{mean, sample_std},
    series::Series,
    summarizer::PosteriorSummary,
};
use chrono::{Duration, NaiveDate};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Kind of market event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EventCategory {
    Geopolitical,
    Conflict,
    OpecPolicy,
    Economic,
    Sanctions,
    Pandemic,
    NaturalDisaster,
    Regulatory,
    Other,
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Geopolitical => "Geopolitical",
            Self::Conflict => "Conflict",
            Self::OpecPolicy => "OPEC Policy",
            Self::Economic => "Economic",
            Self::Sanctions => "Sanctions",
            Self::Pandemic => "Pandemic",
            Self::NaturalDisaster => "Natural Disaster",
            Self::Regulatory => "Regulatory",
            Self::Other => "Other",
        };
        f.write_str(name)
    }
}

/// Expected direction of an event's effect on prices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ImpactDirection {
    Positive,
    Negative,
    Neutral,
}

/// Confidence that an event is relevant; ordered Low < Medium < High
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

/// Catalog entry
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Event {
    pub date: NaiveDate,
    pub category: EventCategory,
    pub description: String,
    pub impact_direction: ImpactDirection,
    pub confidence: ConfidenceLevel,
}

impl Event {
    pub fn new(
        date: NaiveDate,
        category: EventCategory,
        description: impl Into<String>,
        impact_direction: ImpactDirection,
        confidence: ConfidenceLevel,
    ) -> Self {
        Self {
            date,
            category,
            description: description.into(),
            impact_direction,
            confidence,
        }
    }
}

/// Event assigned to a change point
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Association {
    /// Change point the event is assigned to
    pub change_point: usize,
    /// Position of the event in the catalog
    pub event_index: usize,
    pub event: Event,
    /// Event date minus change-point date, in days
    pub distance_days: i64,
    pub score: f64,
    /// Whether the event's direction matches the sign of the mean change across the break;
    /// `None` for neutral events or when the change is unknown
    pub direction_agrees: Option<bool>,
}

/// Event near a change point, without assignment
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NearbyEvent {
    pub event_index: usize,
    pub event: Event,
    /// Event date minus reference date, in days
    pub distance_days: i64,
}

/// Scores and assigns events to change points.
#[derive(Debug, Clone, Copy)]
pub struct EventAssociator {
    config: AssociationConfig,
}

struct Candidate {
    change_point: usize,
    event_index: usize,
    distance_days: i64,
    score: f64,
}

impl EventAssociator {
    /// Create an associator after validating `config`.
    pub fn new(config: AssociationConfig) -> ChangePointResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Association settings.
    pub fn config(&self) -> &AssociationConfig {
        &self.config
    }

    /// Weight of a confidence level.
    pub fn confidence_weight(confidence: ConfidenceLevel) -> f64 {
        match confidence {
            ConfidenceLevel::Low => 1.0,
            ConfidenceLevel::Medium => 2.0,
            ConfidenceLevel::High => 3.0,
        }
    }

    /// Penalty for an event `distance_days` away; always below 1 inside the window.
    pub fn distance_penalty(&self, distance_days: i64) -> f64 {
        self.config.distance_weight * distance_days.unsigned_abs() as f64
            / (self.config.window_days as f64 + 1.0)
    }

    /// Score of `event` at `distance_days` from a change point.
    pub fn score(&self, event: &Event, distance_days: i64) -> f64 {
        Self::confidence_weight(event.confidence) - self.distance_penalty(distance_days)
    }

    /// Assign events to change-point dates. Entry `k` holds the event of `dates[k]`, if any.
    pub fn associate_dates(&self, dates: &[NaiveDate], events: &[Event]) -> Vec<Option<Association>> {
        let window = self.config.window_days;
        let mut candidates: Vec<Candidate> = dates
            .iter()
            .enumerate()
            .flat_map(|(change_point, &date)| {
                events
                    .iter()
                    .enumerate()
                    .filter_map(move |(event_index, event)| {
                        let distance_days = (event.date - date).num_days();
                        (distance_days.abs() <= window).then(|| Candidate {
                            change_point,
                            event_index,
                            distance_days,
                            score: self.score(event, distance_days),
                        })
                    })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.distance_days.abs().cmp(&b.distance_days.abs()))
                .then_with(|| a.change_point.cmp(&b.change_point))
                .then_with(|| a.event_index.cmp(&b.event_index))
        });

        let mut assigned: Vec<Option<Association>> = vec![None; dates.len()];
        let mut event_used = vec![false; events.len()];
        for candidate in candidates {
            if assigned[candidate.change_point].is_some() || event_used[candidate.event_index] {
                continue;
            }
            event_used[candidate.event_index] = true;
            assigned[candidate.change_point] = Some(Association {
                change_point: candidate.change_point,
                event_index: candidate.event_index,
                event: events[candidate.event_index].clone(),
                distance_days: candidate.distance_days,
                score: candidate.score,
                direction_agrees: None,
            });
        }

        log::info!(
            "Associated {} of {} change points with events ({} events, ±{} days)",
            assigned.iter().filter(|a| a.is_some()).count(),
            dates.len(),
            events.len(),
            window
        );
        assigned
    }

    /// Assign events to the change points of `summary`, recording direction agreement against
    /// the raw mean change across each break.
    pub fn associate(&self, summary: &PosteriorSummary, events: &[Event]) -> Vec<Option<Association>> {
        let dates: Vec<NaiveDate> = summary.change_points.iter().map(|cp| cp.date).collect();
        let mut associations = self.associate_dates(&dates, events);

        for association in associations.iter_mut().flatten() {
            let k = association.change_point;
            let change = summary
                .regimes
                .get(k + 1)
                .zip(summary.regimes.get(k))
                .map(|(after, before)| after.mean - before.mean);
            association.direction_agrees =
                change.and_then(|c| direction_agrees(association.event.impact_direction, c));
        }
        associations
    }

    /// Every event within the window of `date`, nearest first (ties in catalog order).
    pub fn events_in_window(&self, date: NaiveDate, events: &[Event]) -> Vec<NearbyEvent> {
        let mut nearby: Vec<NearbyEvent> = events
            .iter()
            .enumerate()
            .filter_map(|(event_index, event)| {
                let distance_days = (event.date - date).num_days();
                (distance_days.abs() <= self.config.window_days).then(|| NearbyEvent {
                    event_index,
                    event: event.clone(),
                    distance_days,
                })
            })
            .collect();
        nearby.sort_by_key(|n| (n.distance_days.abs(), n.event_index));
        nearby
    }
}

/// Whether `direction` agrees with a mean change of `change`; `None` for neutral events.
pub fn direction_agrees(direction: ImpactDirection, change: f64) -> Option<bool> {
    match direction {
        ImpactDirection::Positive => Some(change > 0.0),
        ImpactDirection::Negative => Some(change < 0.0),
        ImpactDirection::Neutral => None,
    }
}

/// Count, mean and sample standard deviation of a group of observations
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WindowStats {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
}

impl WindowStats {
    fn from_values(values: &[f64]) -> Option<Self> {
        (!values.is_empty()).then(|| Self {
            count: values.len(),
            mean: mean(values),
            std: sample_std(values),
        })
    }
}

/// Raw-series behaviour around one event
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventImpact {
    pub event_date: NaiveDate,
    pub window_days: i64,
    /// Observations dated before the event
    pub pre: Option<WindowStats>,
    /// Observations dated on or after the event
    pub post: Option<WindowStats>,
    /// Post mean minus pre mean
    pub absolute_change: Option<f64>,
    /// Change of the mean relative to the pre mean, in percent
    pub pct_change: Option<f64>,
}

/// Compare the series before and after `event` within `window_days` of its date.
///
/// Returns `None` when no observation falls inside the window. A window reaching past the
/// representable calendar is clamped to the series period.
pub fn event_window_impact(series: &Series, event: &Event, window_days: i64) -> Option<EventImpact> {
    let (first, last) = series.period()?;
    let window = Duration::try_days(window_days.max(0));
    let from = window
        .and_then(|w| event.date.checked_sub_signed(w))
        .map_or(first, |d| d.max(first));
    let to = window
        .and_then(|w| event.date.checked_add_signed(w))
        .map_or(last, |d| d.min(last));
    let (start, end) = series.index_range(from, to);
    if start == end {
        return None;
    }

    let split = start + series.dates()[start..end].partition_point(|d| *d < event.date);
    let pre = WindowStats::from_values(&series.values()[start..split]);
    let post = WindowStats::from_values(&series.values()[split..end]);

    let absolute_change = pre.zip(post).map(|(pre, post)| post.mean - pre.mean);
    let pct_change = pre
        .zip(absolute_change)
        .and_then(|(pre, change)| (pre.mean != 0.0).then(|| change / pre.mean * 100.0));

    Some(EventImpact {
        event_date: event.date,
        window_days,
        pre,
        post,
        absolute_change,
        pct_change,
    })
}
