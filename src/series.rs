//! Dated price series.
//!
//! A [`Series`] is validated on construction (strictly increasing dates, finite values) and is
//! immutable afterwards. Analysis runs share it read-only through an `Arc`.

use crate::errors::{ChangePointError, ChangePointResult};
use chrono::NaiveDate;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One dated observation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Observation {
    /// Observation date
    pub date: NaiveDate,
    /// Observed value (usually a closing price)
    pub value: f64,
}

impl Observation {
    /// Create a new observation.
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Ordered, duplicate-free daily series.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl Series {
    /// Build a series, rejecting unordered or duplicate dates and non-finite values.
    pub fn new(observations: Vec<Observation>) -> ChangePointResult<Self> {
        let mut dates = Vec::with_capacity(observations.len());
        let mut values = Vec::with_capacity(observations.len());

        for (index, obs) in observations.into_iter().enumerate() {
            if let Some(&previous) = dates.last() {
                if obs.date <= previous {
                    return Err(ChangePointError::NonMonotonicDates {
                        index,
                        previous,
                        current: obs.date,
                    });
                }
            }
            if !obs.value.is_finite() {
                return Err(ChangePointError::NonFiniteValue {
                    name: "series".to_string(),
                    index,
                    value: obs.value,
                });
            }
            dates.push(obs.date);
            values.push(obs.value);
        }

        Ok(Self { dates, values })
    }

    /// Build a series from parallel date and value vectors.
    pub fn from_parts(dates: Vec<NaiveDate>, values: Vec<f64>) -> ChangePointResult<Self> {
        if dates.len() != values.len() {
            return Err(ChangePointError::InvalidParameter {
                parameter: "values".to_string(),
                value: values.len() as f64,
                constraint: format!("same length as dates ({})", dates.len()),
            });
        }
        Self::new(
            dates
                .into_iter()
                .zip(values)
                .map(|(date, value)| Observation { date, value })
                .collect(),
        )
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the series holds no observations.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Observation dates in order.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Observation values in date order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// First and last dates, if the series is non-empty.
    pub fn period(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((*self.dates.first()?, *self.dates.last()?))
    }

    /// Index range `[start, end)` of observations with dates inside `[from, to]`.
    pub fn index_range(&self, from: NaiveDate, to: NaiveDate) -> (usize, usize) {
        let start = self.dates.partition_point(|d| *d < from);
        let end = self.dates.partition_point(|d| *d <= to);
        (start, end.max(start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, day).unwrap()
    }

    #[test]
    fn test_series_accepts_ordered_dates() {
        let series = Series::new(vec![
            Observation::new(date(1), 10.0),
            Observation::new(date(2), 11.0),
            Observation::new(date(5), 12.0),
        ])
        .unwrap();

        assert_eq!(series.len(), 3);
        assert_eq!(series.period(), Some((date(1), date(5))));
        assert_eq!(series.values(), &[10.0, 11.0, 12.0]);
    }

    #[test]
    fn test_series_rejects_duplicate_dates() {
        let result = Series::new(vec![
            Observation::new(date(1), 10.0),
            Observation::new(date(1), 11.0),
        ]);
        assert!(matches!(
            result,
            Err(ChangePointError::NonMonotonicDates { index: 1, .. })
        ));
    }

    #[test]
    fn test_series_rejects_unordered_dates() {
        let result = Series::new(vec![
            Observation::new(date(3), 10.0),
            Observation::new(date(2), 11.0),
        ]);
        assert!(matches!(result, Err(ChangePointError::NonMonotonicDates { .. })));
    }

    #[test]
    fn test_series_rejects_non_finite() {
        let result = Series::new(vec![
            Observation::new(date(1), 10.0),
            Observation::new(date(2), f64::NAN),
        ]);
        assert!(matches!(
            result,
            Err(ChangePointError::NonFiniteValue { index: 1, .. })
        ));
    }

    #[test]
    fn test_index_range_is_inclusive() {
        let series = Series::from_parts(
            (1..=10).map(date).collect(),
            (1..=10).map(|v| v as f64).collect(),
        )
        .unwrap();

        assert_eq!(series.index_range(date(3), date(5)), (2, 5));
        assert_eq!(series.index_range(date(11), date(20)), (10, 10));
    }

    #[test]
    fn test_from_parts_length_mismatch() {
        let result = Series::from_parts(vec![date(1)], vec![1.0, 2.0]);
        assert!(matches!(result, Err(ChangePointError::InvalidParameter { .. })));
    }
}
