//! Synthetic regime-switching series for testing and validation.
//!
//! Series are built from consecutive blocks with known mean and volatility, so the true change
//! points are known exactly. Generation is fully determined by the seed.
//!
//! ## Available Generators
//!
//! - **Piecewise returns**: independent Normal returns, constant within each block
//! - **Price paths**: geometric paths compounding piecewise returns from an initial price
//! - **Dated series**: either of the above on calendar or business-day dates

use crate::{
    errors::{ChangePointError, ChangePointResult},
    secure_rng::ChainRng,
    series::Series,
};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand_distr::Normal;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One block of a piecewise-constant series.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegimeBlock {
    /// Number of observations in the block
    pub length: usize,
    /// Mean of every observation
    pub mean: f64,
    /// Standard deviation of every observation
    pub volatility: f64,
}

impl RegimeBlock {
    pub fn new(length: usize, mean: f64, volatility: f64) -> Self {
        Self {
            length,
            mean,
            volatility,
        }
    }
}

/// Date spacing of generated series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DateSpacing {
    /// Every calendar day
    Calendar,
    /// Monday to Friday
    Business,
}

/// Indices where each block after the first begins.
pub fn block_boundaries(blocks: &[RegimeBlock]) -> Vec<usize> {
    blocks
        .iter()
        .scan(0, |acc, block| {
            *acc += block.length;
            Some(*acc)
        })
        .take(blocks.len().saturating_sub(1))
        .collect()
}

/// Independent Normal returns, block by block.
pub fn generate_piecewise_returns(blocks: &[RegimeBlock], seed: u64) -> ChangePointResult<Vec<f64>> {
    if blocks.is_empty() {
        return Err(ChangePointError::InvalidParameter {
            parameter: "blocks".to_string(),
            value: 0.0,
            constraint: "at least one block required".to_string(),
        });
    }

    let mut rng = ChainRng::with_seed(seed);
    let mut series = Vec::with_capacity(blocks.iter().map(|b| b.length).sum());

    for block in blocks {
        let normal = Normal::new(block.mean, block.volatility).map_err(|_| {
            ChangePointError::InvalidParameter {
                parameter: "volatility".to_string(),
                value: block.volatility,
                constraint: "finite and >= 0".to_string(),
            }
        })?;
        series.extend((0..block.length).map(|_| rng.sample(&normal)));
    }

    Ok(series)
}

/// Geometric price path: `p[0] = initial`, `p[t + 1] = p[t] · exp(r[t])`.
pub fn returns_to_prices(initial: f64, returns: &[f64]) -> Vec<f64> {
    std::iter::once(initial)
        .chain(returns.iter().scan(initial, |price, r| {
            *price *= r.exp();
            Some(*price)
        }))
        .collect()
}

/// `n` consecutive dates from `start` with the given spacing.
///
/// Business spacing starts at the first weekday on or after `start`.
pub fn generate_dates(start: NaiveDate, n: usize, spacing: DateSpacing) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(n);
    let mut current = start;
    while dates.len() < n {
        let is_weekend = matches!(current.weekday(), Weekday::Sat | Weekday::Sun);
        if spacing == DateSpacing::Calendar || !is_weekend {
            dates.push(current);
        }
        current += Duration::days(1);
    }
    dates
}

/// Dated piecewise return series.
pub fn generate_return_series(
    start: NaiveDate,
    blocks: &[RegimeBlock],
    spacing: DateSpacing,
    seed: u64,
) -> ChangePointResult<Series> {
    let returns = generate_piecewise_returns(blocks, seed)?;
    let dates = generate_dates(start, returns.len(), spacing);
    Series::from_parts(dates, returns)
}

/// Dated price series whose log returns follow `blocks`.
///
/// The series holds one more observation than the blocks: the initial price.
pub fn generate_price_series(
    start: NaiveDate,
    initial_price: f64,
    blocks: &[RegimeBlock],
    spacing: DateSpacing,
    seed: u64,
) -> ChangePointResult<Series> {
    if !(initial_price > 0.0 && initial_price.is_finite()) {
        return Err(ChangePointError::NonPositivePrice {
            index: 0,
            value: initial_price,
        });
    }
    let returns = generate_piecewise_returns(blocks, seed)?;
    let prices = returns_to_prices(initial_price, &returns);
    let dates = generate_dates(start, prices.len(), spacing);
    Series::from_parts(dates, prices)
}
