//! Posterior sampling for the regime model.
//!
//! Each chain runs a Metropolis-within-Gibbs sweep:
//!
//! 1. every change point is drawn exactly from its discrete full conditional over the admissible
//!    positions between its neighbours (segment likelihoods come from prefix sums);
//! 2. every regime mean is drawn from its conjugate Normal full conditional;
//! 3. every regime volatility is updated by random-walk Metropolis on log σ, with step sizes
//!    adapted towards the target acceptance rate during tuning only.
//!
//! Chains are independent, own their generators and run in parallel when the `parallel` feature
//! is enabled. Results are always collected in chain order, so a fixed seed gives identical
//! draws whether or not chains ran concurrently.

use crate::{
    config::SamplerConfig,
    errors::{ChangePointError, ChangePointResult},
    math_utils::log_sum_exp,
    regime_model::{ParameterId, RegimeModel, RegimeParameters},
    secure_rng::ChainRng,
};
use std::time::Instant;

/// Starting points tried per chain before the chain is abandoned.
pub const MAX_INIT_ATTEMPTS: usize = 50;

const INITIAL_LOG_STEP: f64 = 0.1;
const MIN_LOG_STEP: f64 = 1e-4;
const MAX_LOG_STEP: f64 = 5.0;
const ADAPTATION_DECAY: f64 = 0.6;

/// One retained posterior draw.
#[derive(Debug, Clone, PartialEq)]
pub struct PosteriorDraw {
    /// Change-point positions, strictly increasing
    pub change_points: Vec<usize>,
    /// Regime means
    pub means: Vec<f64>,
    /// Regime volatilities
    pub volatilities: Vec<f64>,
}

impl PosteriorDraw {
    fn from_parameters(params: &RegimeParameters) -> Self {
        Self {
            change_points: params.change_points(),
            means: params.means().to_vec(),
            volatilities: params.volatilities().to_vec(),
        }
    }

    /// Value of parameter `id` in this draw.
    pub fn value(&self, id: ParameterId) -> f64 {
        match id {
            ParameterId::ChangePoint(k) => self.change_points[k] as f64,
            ParameterId::Mean(j) => self.means[j],
            ParameterId::Volatility(j) => self.volatilities[j],
        }
    }
}

/// Output of one chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutput {
    /// Index of the chain within the run
    pub chain_index: usize,
    /// Seed the chain's generator was created with
    pub seed: u64,
    /// Retained draws in order
    pub draws: Vec<PosteriorDraw>,
    /// Acceptance rate of volatility proposals over retained iterations, per regime
    pub volatility_acceptance: Vec<f64>,
    /// Final log-scale step sizes, per regime
    pub step_sizes: Vec<f64>,
    /// Whether the chain stopped at the deadline
    pub timed_out: bool,
    /// Updates skipped because the target evaluated to a non-finite value
    pub rejected_non_finite: usize,
}

/// Posterior draws of every chain of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawSet {
    chains: Vec<ChainOutput>,
    num_change_points: usize,
    truncated: bool,
}

impl DrawSet {
    /// Assemble a draw set from chain outputs.
    ///
    /// Every chain must hold at least one draw and all draws must agree on K.
    pub fn from_chains(chains: Vec<ChainOutput>) -> ChangePointResult<Self> {
        let first = chains
            .first()
            .and_then(|chain| chain.draws.first())
            .ok_or_else(|| ChangePointError::NumericalInstability {
                message: "no posterior draws were produced".to_string(),
            })?;
        let num_change_points = first.change_points.len();

        for chain in &chains {
            if chain.draws.is_empty() {
                return Err(ChangePointError::NumericalInstability {
                    message: format!("chain {} produced no draws", chain.chain_index),
                });
            }
            let consistent = chain.draws.iter().all(|d| {
                d.change_points.len() == num_change_points
                    && d.means.len() == num_change_points + 1
                    && d.volatilities.len() == num_change_points + 1
            });
            if !consistent {
                return Err(ChangePointError::InvalidParameter {
                    parameter: "draws".to_string(),
                    value: chain.chain_index as f64,
                    constraint: format!("every draw has {} change points", num_change_points),
                });
            }
        }

        let truncated = chains.iter().any(|chain| chain.timed_out);
        Ok(Self {
            chains,
            num_change_points,
            truncated,
        })
    }

    /// Chain outputs in chain order.
    pub fn chains(&self) -> &[ChainOutput] {
        &self.chains
    }

    /// Number of chains that produced draws.
    pub fn num_chains(&self) -> usize {
        self.chains.len()
    }

    /// Number of change points K.
    pub fn num_change_points(&self) -> usize {
        self.num_change_points
    }

    /// Number of regimes K + 1.
    pub fn num_regimes(&self) -> usize {
        self.num_change_points + 1
    }

    /// Draws per chain used for diagnostics: the length of the shortest chain.
    pub fn draws_per_chain(&self) -> usize {
        self.chains
            .iter()
            .map(|chain| chain.draws.len())
            .min()
            .unwrap_or(0)
    }

    /// Total number of retained draws across chains.
    pub fn total_draws(&self) -> usize {
        self.chains.iter().map(|chain| chain.draws.len()).sum()
    }

    /// Whether sampling stopped early because of the deadline.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Continuous parameters, means then volatilities.
    pub fn continuous_parameters(&self) -> Vec<ParameterId> {
        let r = self.num_regimes();
        (0..r)
            .map(ParameterId::Mean)
            .chain((0..r).map(ParameterId::Volatility))
            .collect()
    }

    /// Per-chain traces of `id`, each cut to [`Self::draws_per_chain`].
    pub fn parameter_chains(&self, id: ParameterId) -> Vec<Vec<f64>> {
        let n = self.draws_per_chain();
        self.chains
            .iter()
            .map(|chain| chain.draws[..n].iter().map(|d| d.value(id)).collect())
            .collect()
    }

    /// Every retained draw of `id`, pooled across chains.
    pub fn pooled(&self, id: ParameterId) -> Vec<f64> {
        self.chains
            .iter()
            .flat_map(|chain| chain.draws.iter().map(move |d| d.value(id)))
            .collect()
    }

    /// Every retained draw of change point `k`, pooled across chains.
    pub fn pooled_change_points(&self, k: usize) -> Vec<usize> {
        self.chains
            .iter()
            .flat_map(|chain| chain.draws.iter().map(move |d| d.change_points[k]))
            .collect()
    }
}

/// Multi-chain posterior sampler.
#[derive(Debug, Clone)]
pub struct Sampler {
    config: SamplerConfig,
}

impl Sampler {
    /// Create a sampler after validating `config`.
    pub fn new(config: SamplerConfig) -> ChangePointResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Sampler configuration.
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Run every chain against `model`.
    ///
    /// Chains that fail to initialize are dropped with a warning; the run fails only when no
    /// chain produced draws.
    pub fn run(&self, model: &RegimeModel) -> ChangePointResult<DrawSet> {
        let started = Instant::now();
        // A budget too large to represent means no deadline
        let deadline = self
            .config
            .timeout
            .and_then(|budget| started.checked_add(budget));

        log::info!(
            "Sampling {} chains ({} tuning + {} draws each, K = {}, n = {})",
            self.config.chains,
            self.config.tune,
            self.config.draws_per_chain,
            model.num_change_points(),
            model.len()
        );

        #[cfg(feature = "parallel")]
        let results: Vec<ChangePointResult<ChainOutput>> = {
            use rayon::prelude::*;
            (0..self.config.chains)
                .into_par_iter()
                .map(|chain| self.run_chain(model, chain, deadline))
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let results: Vec<ChangePointResult<ChainOutput>> = (0..self.config.chains)
            .map(|chain| self.run_chain(model, chain, deadline))
            .collect();

        let mut chains = Vec::with_capacity(results.len());
        let mut first_error = None;
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(chain) => chains.push(chain),
                Err(error) => {
                    log::warn!("Chain {} dropped: {}", index, error);
                    first_error.get_or_insert(error);
                }
            }
        }

        if chains.is_empty() {
            return Err(first_error.unwrap_or_else(|| ChangePointError::NumericalInstability {
                message: "no chain produced draws".to_string(),
            }));
        }

        let draw_set = DrawSet::from_chains(chains)?;
        if draw_set.truncated() {
            log::warn!(
                "Sampling stopped at the deadline after {:?}; {} draws retained",
                started.elapsed(),
                draw_set.total_draws()
            );
        } else {
            log::debug!(
                "Sampling finished in {:?} with {} draws",
                started.elapsed(),
                draw_set.total_draws()
            );
        }
        Ok(draw_set)
    }

    fn run_chain(
        &self,
        model: &RegimeModel,
        chain_index: usize,
        deadline: Option<Instant>,
    ) -> ChangePointResult<ChainOutput> {
        let mut rng = ChainRng::for_chain(self.config.seed, chain_index);
        let seed = rng.seed();
        let state = initialize(model, &mut rng, chain_index)?;

        let mut chain = ChainState::new(state, self.config.target_acceptance);
        let total = self.config.tune + self.config.draws_per_chain;
        let mut draws = Vec::with_capacity(self.config.draws_per_chain);
        let mut timed_out = false;

        for iteration in 0..total {
            if deadline.map_or(false, |d| Instant::now() >= d) {
                timed_out = true;
                break;
            }

            let tuning = iteration < self.config.tune;
            chain.sweep(model, &mut rng, tuning, iteration);
            if !tuning {
                draws.push(PosteriorDraw::from_parameters(&chain.params));
            }
        }

        if draws.is_empty() {
            draws.push(PosteriorDraw::from_parameters(&chain.params));
        }
        if chain.rejected_non_finite > 0 {
            log::debug!(
                "Chain {} rejected {} non-finite updates",
                chain_index,
                chain.rejected_non_finite
            );
        }

        Ok(ChainOutput {
            chain_index,
            seed,
            volatility_acceptance: chain.acceptance_rates(),
            step_sizes: chain.step_sizes.clone(),
            timed_out,
            rejected_non_finite: chain.rejected_non_finite,
            draws,
        })
    }
}

/// Draw starting points until one has finite posterior density.
fn initialize(
    model: &RegimeModel,
    rng: &mut ChainRng,
    chain_index: usize,
) -> ChangePointResult<RegimeParameters> {
    for _ in 0..MAX_INIT_ATTEMPTS {
        let params = model.initial_parameters(rng);
        if model.log_posterior(&params).is_finite() {
            return Ok(params);
        }
    }
    Err(ChangePointError::NumericalInstability {
        message: format!(
            "chain {} found no finite starting point in {} attempts",
            chain_index, MAX_INIT_ATTEMPTS
        ),
    })
}

/// Mutable state of one chain between sweeps.
struct ChainState {
    params: RegimeParameters,
    step_sizes: Vec<f64>,
    target_acceptance: f64,
    accepted: Vec<usize>,
    proposed: Vec<usize>,
    rejected_non_finite: usize,
    log_weights: Vec<f64>,
}

impl ChainState {
    fn new(params: RegimeParameters, target_acceptance: f64) -> Self {
        let regimes = params.means().len();
        Self {
            params,
            step_sizes: vec![INITIAL_LOG_STEP; regimes],
            target_acceptance,
            accepted: vec![0; regimes],
            proposed: vec![0; regimes],
            rejected_non_finite: 0,
            log_weights: Vec::new(),
        }
    }

    fn sweep(&mut self, model: &RegimeModel, rng: &mut ChainRng, tuning: bool, iteration: usize) {
        for k in 0..model.num_change_points() {
            self.update_change_point(model, rng, k);
        }
        for j in 0..model.num_regimes() {
            self.update_mean(model, rng, j);
            self.update_volatility(model, rng, j, tuning, iteration);
        }
    }

    /// Exact draw from the discrete full conditional of change point `k`.
    fn update_change_point(&mut self, model: &RegimeModel, rng: &mut ChainRng, k: usize) {
        let (lo, hi) = model.change_point_bounds(&self.params, k);
        let start = self.params.segment(k).0;
        let end = self.params.segment(k + 1).1;
        let (mu_left, mu_right) = (self.params.means()[k], self.params.means()[k + 1]);
        let (sigma_left, sigma_right) = (
            self.params.volatilities()[k],
            self.params.volatilities()[k + 1],
        );

        self.log_weights.clear();
        self.log_weights.extend((lo..=hi).map(|t| {
            let value = model.segment_log_likelihood(start, t, mu_left, sigma_left)
                + model.segment_log_likelihood(t, end, mu_right, sigma_right);
            if value.is_nan() {
                f64::NEG_INFINITY
            } else {
                value
            }
        }));

        let normalizer = log_sum_exp(&self.log_weights);
        if !normalizer.is_finite() {
            self.rejected_non_finite += 1;
            return;
        }

        let u = rng.open01();
        let mut cumulative = 0.0;
        let mut chosen = None;
        for (offset, &weight) in self.log_weights.iter().enumerate() {
            if weight == f64::NEG_INFINITY {
                continue;
            }
            chosen = Some(lo + offset);
            cumulative += (weight - normalizer).exp();
            if cumulative >= u {
                break;
            }
        }

        if let Some(position) = chosen {
            self.params.move_change_point(k, position);
        }
    }

    /// Conjugate Normal draw of the mean of regime `j`.
    fn update_mean(&mut self, model: &RegimeModel, rng: &mut ChainRng, j: usize) {
        let (start, end) = self.params.segment(j);
        let (n, sum, _) = model.segment_moments(start, end);
        let variance = self.params.volatilities()[j].powi(2);
        let prior_sd = model.spec().mean_prior_sd;

        let precision = 1.0 / (prior_sd * prior_sd) + n as f64 / variance;
        let mean = (sum / variance) / precision;
        let proposal = rng.normal(mean, precision.sqrt().recip());

        if proposal.is_finite() {
            self.params.set_mean(j, proposal);
        } else {
            self.rejected_non_finite += 1;
        }
    }

    /// Random-walk Metropolis on log σ of regime `j`.
    fn update_volatility(
        &mut self,
        model: &RegimeModel,
        rng: &mut ChainRng,
        j: usize,
        tuning: bool,
        iteration: usize,
    ) {
        let current = self.params.volatilities()[j].ln();
        let proposal = current + self.step_sizes[j] * rng.standard_normal();
        let log_ratio = model.log_volatility_target(&self.params, j, proposal)
            - model.log_volatility_target(&self.params, j, current);

        let accepted = if log_ratio.is_nan() || proposal.exp() == 0.0 {
            self.rejected_non_finite += 1;
            false
        } else {
            rng.open01().ln() < log_ratio
        };

        if accepted {
            self.params.set_volatility(j, proposal.exp());
        }

        if tuning {
            // Robbins-Monro step on log step size
            let rate = ((iteration + 1) as f64).powf(-ADAPTATION_DECAY);
            let signal = if accepted { 1.0 } else { 0.0 } - self.target_acceptance;
            self.step_sizes[j] =
                (self.step_sizes[j] * (rate * signal).exp()).clamp(MIN_LOG_STEP, MAX_LOG_STEP);
        } else {
            self.proposed[j] += 1;
            if accepted {
                self.accepted[j] += 1;
            }
        }
    }

    fn acceptance_rates(&self) -> Vec<f64> {
        self.accepted
            .iter()
            .zip(&self.proposed)
            .map(|(&a, &p)| if p == 0 { 0.0 } else { a as f64 / p as f64 })
            .collect()
    }
}
