//! # Analysis Configuration
//!
//! Configuration structures for a change-point run: the regime model, the sampler, the
//! convergence gate and the event association window. [`RunConfig`] bundles them and offers
//! presets for different use cases.

use crate::errors::{validate_parameter, validate_positive, ChangePointError, ChangePointResult};
use crate::preprocessing::DataKind;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default minimum number of observations per regime.
pub const DEFAULT_MIN_SEGMENT_LENGTH: usize = 50;

/// Regime model configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegimeSpec {
    /// Number of change points K (fixed, not inferred)
    pub num_change_points: usize,
    /// Minimum observations in every regime; also the margin at both series edges
    pub min_segment_length: usize,
    /// Standard deviation of the Normal(0, sd) prior on each regime mean
    pub mean_prior_sd: f64,
    /// Scale of the HalfNormal prior on each regime volatility
    pub volatility_prior_scale: f64,
}

impl Default for RegimeSpec {
    fn default() -> Self {
        Self {
            num_change_points: 3,
            min_segment_length: DEFAULT_MIN_SEGMENT_LENGTH,
            mean_prior_sd: 0.1,
            volatility_prior_scale: 0.1,
        }
    }
}

impl RegimeSpec {
    /// Spec with `num_change_points` and default priors.
    pub fn with_change_points(num_change_points: usize) -> Self {
        Self {
            num_change_points,
            ..Default::default()
        }
    }

    /// Number of regimes (K + 1), saturating at `usize::MAX`.
    pub fn num_regimes(&self) -> usize {
        self.num_change_points.saturating_add(1)
    }

    /// Length the transformed series must exceed, saturating at `usize::MAX`.
    ///
    /// A saturated requirement can never be met, so an oversized K fails length validation.
    pub fn required_length(&self) -> usize {
        self.min_segment_length.saturating_mul(self.num_regimes())
    }

    /// Check the regime settings on their own, independent of any data.
    pub fn validate(&self) -> ChangePointResult<()> {
        if self.num_change_points == 0 {
            return Err(ChangePointError::InvalidParameter {
                parameter: "num_change_points".to_string(),
                value: 0.0,
                constraint: ">= 1".to_string(),
            });
        }
        if self.min_segment_length == 0 {
            return Err(ChangePointError::InvalidParameter {
                parameter: "min_segment_length".to_string(),
                value: 0.0,
                constraint: ">= 1".to_string(),
            });
        }
        validate_positive(self.mean_prior_sd, "mean_prior_sd")?;
        validate_positive(self.volatility_prior_scale, "volatility_prior_scale")
    }
}

/// Sampler configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SamplerConfig {
    /// Number of independent chains (>= 2)
    pub chains: usize,
    /// Tuning iterations per chain, discarded
    pub tune: usize,
    /// Retained draws per chain
    pub draws_per_chain: usize,
    /// Base seed; chain seeds are derived from it
    pub seed: u64,
    /// Wall-clock budget for the whole sampling phase
    pub timeout: Option<Duration>,
    /// Target acceptance rate for volatility proposals during tuning
    pub target_acceptance: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            chains: 4,
            tune: 1000,
            draws_per_chain: 2000,
            seed: 42,
            timeout: None,
            target_acceptance: 0.44,
        }
    }
}

impl SamplerConfig {
    /// Check sampler settings.
    pub fn validate(&self) -> ChangePointResult<()> {
        if self.chains < 2 {
            return Err(ChangePointError::InvalidParameter {
                parameter: "chains".to_string(),
                value: self.chains as f64,
                constraint: ">= 2".to_string(),
            });
        }
        if self.draws_per_chain == 0 {
            return Err(ChangePointError::InvalidParameter {
                parameter: "draws_per_chain".to_string(),
                value: 0.0,
                constraint: ">= 1".to_string(),
            });
        }
        validate_parameter(self.target_acceptance, 0.05, 0.95, "target_acceptance")
    }
}

/// Thresholds of the convergence gate
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DiagnosticThresholds {
    /// Every split R-hat must be below this
    pub max_rhat: f64,
    /// Every effective sample size must exceed this
    pub min_ess: f64,
}

impl Default for DiagnosticThresholds {
    fn default() -> Self {
        Self {
            max_rhat: 1.1,
            min_ess: 400.0,
        }
    }
}

impl DiagnosticThresholds {
    /// Check thresholds.
    pub fn validate(&self) -> ChangePointResult<()> {
        validate_parameter(self.max_rhat, 1.0, f64::MAX, "max_rhat")?;
        validate_parameter(self.min_ess, 0.0, f64::MAX, "min_ess")
    }
}

/// Event association configuration
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AssociationConfig {
    /// Maximum distance in days between a change point and an event
    pub window_days: i64,
    /// Weight of the distance penalty, in (0, 1]
    pub distance_weight: f64,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            distance_weight: 1.0,
        }
    }
}

impl AssociationConfig {
    /// Check association settings.
    pub fn validate(&self) -> ChangePointResult<()> {
        if self.window_days < 0 {
            return Err(ChangePointError::InvalidParameter {
                parameter: "window_days".to_string(),
                value: self.window_days as f64,
                constraint: ">= 0".to_string(),
            });
        }
        if !(self.distance_weight > 0.0 && self.distance_weight <= 1.0) {
            return Err(ChangePointError::InvalidParameter {
                parameter: "distance_weight".to_string(),
                value: self.distance_weight,
                constraint: "(0, 1]".to_string(),
            });
        }
        Ok(())
    }
}

/// Complete configuration of one analysis run
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunConfig {
    /// How to transform the raw series
    pub data_kind: DataKind,
    /// Regime model
    pub regime: RegimeSpec,
    /// Sampler
    pub sampler: SamplerConfig,
    /// Convergence gate
    pub diagnostics: DiagnosticThresholds,
    /// Event association
    pub association: AssociationConfig,
    /// Posterior mass of change-point credible intervals
    pub credible_mass: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl RunConfig {
    /// Configuration from the fields a caller usually supplies.
    pub fn new(
        num_change_points: usize,
        window_days: i64,
        chains: usize,
        draws_per_chain: usize,
        seed: u64,
    ) -> Self {
        let mut config = Self::standard();
        config.regime.num_change_points = num_change_points;
        config.association.window_days = window_days;
        config.sampler.chains = chains;
        config.sampler.draws_per_chain = draws_per_chain;
        config.sampler.seed = seed;
        config
    }

    /// Quick: short chains for exploration and tests
    pub fn quick() -> Self {
        Self {
            sampler: SamplerConfig {
                chains: 2,
                tune: 300,
                draws_per_chain: 500,
                ..SamplerConfig::default()
            },
            ..Self::standard()
        }
    }

    /// Standard: 4 chains, 1000 tuning iterations, 2000 draws (default)
    pub fn standard() -> Self {
        Self {
            data_kind: DataKind::Prices,
            regime: RegimeSpec::default(),
            sampler: SamplerConfig::default(),
            diagnostics: DiagnosticThresholds::default(),
            association: AssociationConfig::default(),
            credible_mass: 0.95,
        }
    }

    /// Thorough: longer chains for final reporting
    pub fn thorough() -> Self {
        Self {
            sampler: SamplerConfig {
                chains: 4,
                tune: 2000,
                draws_per_chain: 4000,
                ..SamplerConfig::default()
            },
            ..Self::standard()
        }
    }

    /// Set the data kind.
    pub fn with_data_kind(mut self, data_kind: DataKind) -> Self {
        self.data_kind = data_kind;
        self
    }

    /// Set the number of change points.
    pub fn with_change_points(mut self, num_change_points: usize) -> Self {
        self.regime.num_change_points = num_change_points;
        self
    }

    /// Set the base seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.sampler.seed = seed;
        self
    }

    /// Set the sampling wall-clock budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.sampler.timeout = Some(timeout);
        self
    }

    /// Check every section.
    pub fn validate(&self) -> ChangePointResult<()> {
        self.regime.validate()?;
        self.sampler.validate()?;
        self.diagnostics.validate()?;
        self.association.validate()?;
        if !(self.credible_mass > 0.0 && self.credible_mass < 1.0) {
            return Err(ChangePointError::InvalidParameter {
                parameter: "credible_mass".to_string(),
                value: self.credible_mass,
                constraint: "(0, 1)".to_string(),
            });
        }
        Ok(())
    }
}
