//! # Convergence Diagnostics
//!
//! Multi-chain convergence checks for the continuous model parameters.
//!
//! ## Split R-hat
//! Each chain is cut into two halves and the between/within variance ratio is computed over all
//! halves. Values near 1 indicate the chains agree; values well above 1 indicate they explore
//! different parts of the posterior.
//!
//! ## Effective Sample Size
//! Multi-chain autocorrelation estimate with Geyer's initial monotone sequence truncation, so
//! the estimate reflects how many independent draws the correlated chains are worth.
//!
//! ## Convergence Gate
//! A run is converged only when every continuous parameter has R-hat below the threshold, every
//! effective sample size exceeds its threshold, and sampling was not cut short.

use crate::{config::DiagnosticThresholds, regime_model::ParameterId, sampler::DrawSet};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Diagnostics of one parameter
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParameterDiagnostics {
    pub parameter: ParameterId,
    pub rhat: f64,
    pub ess: f64,
}

/// Reason a run failed the convergence gate
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConvergenceWarning {
    /// Chains disagree about a parameter
    HighVarianceRatio { parameter: ParameterId, rhat: f64 },
    /// Too few effective draws of a parameter
    LowEffectiveSampleSize { parameter: ParameterId, ess: f64 },
    /// Sampling stopped at the deadline
    SamplingTruncated { draws_per_chain: usize },
}

impl fmt::Display for ConvergenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HighVarianceRatio { parameter, rhat } => {
                write!(f, "{} has R-hat {:.3}", parameter, rhat)
            }
            Self::LowEffectiveSampleSize { parameter, ess } => {
                write!(f, "{} has effective sample size {:.0}", parameter, ess)
            }
            Self::SamplingTruncated { draws_per_chain } => write!(
                f,
                "sampling stopped at the deadline with {} draws per chain",
                draws_per_chain
            ),
        }
    }
}

/// Convergence assessment of a run
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConvergenceReport {
    pub parameters: Vec<ParameterDiagnostics>,
    pub max_rhat: f64,
    pub min_ess: f64,
    pub converged: bool,
    pub warnings: Vec<ConvergenceWarning>,
}

impl ConvergenceReport {
    /// Diagnostics of `parameter`, if it was assessed.
    pub fn parameter(&self, parameter: ParameterId) -> Option<&ParameterDiagnostics> {
        self.parameters.iter().find(|d| d.parameter == parameter)
    }
}

/// Assess every continuous parameter of `draws` against `thresholds`.
pub fn diagnose(draws: &DrawSet, thresholds: &DiagnosticThresholds) -> ConvergenceReport {
    let parameters: Vec<ParameterDiagnostics> = draws
        .continuous_parameters()
        .into_iter()
        .map(|parameter| {
            let chains = draws.parameter_chains(parameter);
            ParameterDiagnostics {
                parameter,
                rhat: split_rhat(&chains),
                ess: effective_sample_size(&chains),
            }
        })
        .collect();

    let mut warnings = Vec::new();
    for d in &parameters {
        if !(d.rhat < thresholds.max_rhat) {
            warnings.push(ConvergenceWarning::HighVarianceRatio {
                parameter: d.parameter,
                rhat: d.rhat,
            });
        }
        if !(d.ess > thresholds.min_ess) {
            warnings.push(ConvergenceWarning::LowEffectiveSampleSize {
                parameter: d.parameter,
                ess: d.ess,
            });
        }
    }
    if draws.truncated() {
        warnings.push(ConvergenceWarning::SamplingTruncated {
            draws_per_chain: draws.draws_per_chain(),
        });
    }

    let max_rhat = parameters
        .iter()
        .map(|d| d.rhat)
        .fold(f64::NEG_INFINITY, f64::max);
    let min_ess = parameters.iter().map(|d| d.ess).fold(f64::INFINITY, f64::min);
    let converged = warnings.is_empty();

    if converged {
        log::info!(
            "Chains converged (max R-hat {:.4}, min ESS {:.0})",
            max_rhat,
            min_ess
        );
    } else {
        log::warn!(
            "Chains did not converge: {} warnings (max R-hat {:.4}, min ESS {:.0})",
            warnings.len(),
            max_rhat,
            min_ess
        );
        for warning in &warnings {
            log::debug!("Convergence warning: {}", warning);
        }
    }

    ConvergenceReport {
        parameters,
        max_rhat,
        min_ess,
        converged,
        warnings,
    }
}

/// Split R-hat over `chains`, each cut to the shortest chain.
///
/// Chains shorter than four draws cannot be split and fall back to the unsplit statistic, which
/// needs at least two chains of two draws; otherwise the result is infinite.
pub fn split_rhat(chains: &[Vec<f64>]) -> f64 {
    let n = chains.iter().map(Vec::len).min().unwrap_or(0);

    if n >= 4 {
        let half = n / 2;
        let halves: Vec<&[f64]> = chains
            .iter()
            .flat_map(|chain| [&chain[..half], &chain[n - half..n]])
            .collect();
        return variance_ratio(&halves);
    }

    if chains.len() >= 2 && n >= 2 {
        let whole: Vec<&[f64]> = chains.iter().map(|chain| &chain[..n]).collect();
        return variance_ratio(&whole);
    }

    f64::INFINITY
}

/// Potential scale reduction over equal-length sequences.
fn variance_ratio(sequences: &[&[f64]]) -> f64 {
    let m = sequences.len() as f64;
    let n = sequences[0].len() as f64;

    let means: Vec<f64> = sequences
        .iter()
        .map(|s| s.iter().sum::<f64>() / n)
        .collect();
    let within = sequences
        .iter()
        .zip(&means)
        .map(|(s, mean)| s.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0))
        .sum::<f64>()
        / m;

    let grand_mean = means.iter().sum::<f64>() / m;
    let between = n * means.iter().map(|x| (x - grand_mean).powi(2)).sum::<f64>() / (m - 1.0);

    if within <= 0.0 {
        return if between <= 0.0 { 1.0 } else { f64::INFINITY };
    }

    let var_plus = (n - 1.0) / n * within + between / n;
    (var_plus / within).sqrt()
}

/// Multi-chain effective sample size with Geyer's initial monotone sequence.
///
/// Chains are cut to the shortest chain. The estimate is capped at `mn·log10(mn)`; constant
/// chains report `mn`.
pub fn effective_sample_size(chains: &[Vec<f64>]) -> f64 {
    let n = chains.iter().map(Vec::len).min().unwrap_or(0);
    let m = chains.len();
    let total = (m * n) as f64;
    if m == 0 || n == 0 {
        return 0.0;
    }
    if n < 4 {
        return total;
    }

    let nf = n as f64;
    let traces: Vec<&[f64]> = chains.iter().map(|chain| &chain[..n]).collect();
    let means: Vec<f64> = traces.iter().map(|t| t.iter().sum::<f64>() / nf).collect();

    let autocovariance = |lag: usize| -> f64 {
        traces
            .iter()
            .zip(&means)
            .map(|(trace, mean)| {
                trace[..n - lag]
                    .iter()
                    .zip(&trace[lag..])
                    .map(|(a, b)| (a - mean) * (b - mean))
                    .sum::<f64>()
                    / nf
            })
            .sum::<f64>()
            / m as f64
    };

    let mean_var = autocovariance(0) * nf / (nf - 1.0);
    let mut var_plus = mean_var * (nf - 1.0) / nf;
    if m > 1 {
        let grand = means.iter().sum::<f64>() / m as f64;
        var_plus += means.iter().map(|x| (x - grand).powi(2)).sum::<f64>() / (m as f64 - 1.0);
    }
    if var_plus <= 0.0 || !var_plus.is_finite() {
        return total;
    }

    let rho = |lag: usize| 1.0 - (mean_var - autocovariance(lag)) / var_plus;

    let mut rho_hat = vec![0.0; n];
    rho_hat[0] = 1.0;
    let mut rho_even = 1.0;
    let mut rho_odd = rho(1);
    rho_hat[1] = rho_odd;

    let mut t = 1;
    while t + 5 < n && rho_even + rho_odd > 0.0 {
        rho_even = rho(t + 1);
        rho_odd = rho(t + 2);
        if rho_even + rho_odd >= 0.0 {
            rho_hat[t + 1] = rho_even;
            rho_hat[t + 2] = rho_odd;
        }
        t += 2;
    }
    let max_t = t;
    if rho_even > 0.0 {
        rho_hat[max_t + 1] = rho_even;
    }

    // Initial monotone sequence
    let mut t = 1;
    while t + 2 <= max_t {
        let next = rho_hat[t + 1] + rho_hat[t + 2];
        let current = rho_hat[t - 1] + rho_hat[t];
        if next > current {
            rho_hat[t + 1] = current / 2.0;
            rho_hat[t + 2] = rho_hat[t + 1];
        }
        t += 2;
    }

    let tau = -1.0 + 2.0 * rho_hat[..max_t].iter().sum::<f64>() + rho_hat[max_t + 1];
    let tau = tau.max(1.0 / total.log10());
    total / tau
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secure_rng::ChainRng;
    use crate::sampler::{ChainOutput, PosteriorDraw};

    fn white_noise(chains: usize, n: usize, seed: u64) -> Vec<Vec<f64>> {
        (0..chains)
            .map(|c| {
                let mut rng = ChainRng::for_chain(seed, c);
                (0..n).map(|_| rng.standard_normal()).collect()
            })
            .collect()
    }

    fn ar1(chains: usize, n: usize, phi: f64, seed: u64) -> Vec<Vec<f64>> {
        (0..chains)
            .map(|c| {
                let mut rng = ChainRng::for_chain(seed, c);
                let mut x = 0.0;
                (0..n)
                    .map(|_| {
                        x = phi * x + rng.standard_normal();
                        x
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_rhat_near_one_for_mixed_chains() {
        let chains = white_noise(4, 1000, 1);
        let rhat = split_rhat(&chains);
        assert!(rhat < 1.01, "rhat {}", rhat);
    }

    #[test]
    fn test_rhat_detects_disagreeing_chains() {
        let mut chains = white_noise(4, 500, 2);
        for x in chains[0].iter_mut() {
            *x += 5.0;
        }
        assert!(split_rhat(&chains) > 1.5);
    }

    #[test]
    fn test_rhat_detects_within_chain_drift() {
        let chains: Vec<Vec<f64>> = (0..2)
            .map(|_| (0..400).map(|i| i as f64 / 100.0).collect())
            .collect();
        assert!(split_rhat(&chains) > 1.1);
    }

    #[test]
    fn test_rhat_degenerate_cases() {
        assert_eq!(split_rhat(&[vec![1.0; 10], vec![1.0; 10]]), 1.0);
        assert_eq!(split_rhat(&[vec![1.0; 10], vec![2.0; 10]]), f64::INFINITY);
        assert_eq!(split_rhat(&[vec![1.0]]), f64::INFINITY);
        assert!(split_rhat(&[vec![1.0, 2.0, 1.5], vec![1.2, 1.8, 1.1]]).is_finite());
    }

    #[test]
    fn test_ess_of_independent_draws() {
        let chains = white_noise(4, 1000, 3);
        let ess = effective_sample_size(&chains);
        assert!(ess > 2500.0 && ess < 6000.0, "ess {}", ess);
    }

    #[test]
    fn test_ess_penalizes_autocorrelation() {
        let chains = ar1(4, 1000, 0.9, 4);
        let ess = effective_sample_size(&chains);
        // theory: 4000 * (1 - 0.9) / (1 + 0.9) ≈ 210
        assert!(ess > 100.0 && ess < 400.0, "ess {}", ess);
    }

    #[test]
    fn test_ess_is_capped() {
        let chains = white_noise(2, 50, 5);
        let total = 100.0f64;
        assert!(effective_sample_size(&chains) <= total * total.log10() + 1e-9);
    }

    fn draw_set(chains: Vec<Vec<f64>>, timed_out: bool) -> DrawSet {
        let outputs = chains
            .into_iter()
            .enumerate()
            .map(|(chain_index, values)| ChainOutput {
                chain_index,
                seed: chain_index as u64,
                draws: values
                    .iter()
                    .map(|&v| PosteriorDraw {
                        change_points: vec![100],
                        means: vec![v, -v],
                        volatilities: vec![1.0 + 0.1 * v.abs(), 1.0 + 0.05 * v.abs()],
                    })
                    .collect(),
                volatility_acceptance: vec![0.4, 0.4],
                step_sizes: vec![0.1, 0.1],
                timed_out,
                rejected_non_finite: 0,
            })
            .collect();
        DrawSet::from_chains(outputs).unwrap()
    }

    #[test]
    fn test_short_chains_do_not_converge() {
        let draws = draw_set(white_noise(2, 5, 6), false);
        let report = diagnose(&draws, &DiagnosticThresholds::default());
        assert!(!report.converged);
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, ConvergenceWarning::LowEffectiveSampleSize { .. })));
        assert_eq!(report.parameters.len(), 4);
    }

    #[test]
    fn test_truncated_run_never_converges() {
        let draws = draw_set(white_noise(4, 1000, 7), true);
        let report = diagnose(&draws, &DiagnosticThresholds::default());
        assert!(!report.converged);
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, ConvergenceWarning::SamplingTruncated { .. })));
    }

    #[test]
    fn test_report_lookup() {
        let draws = draw_set(white_noise(2, 100, 8), false);
        let report = diagnose(&draws, &DiagnosticThresholds::default());
        assert!(report.parameter(ParameterId::Mean(1)).is_some());
        assert!(report.parameter(ParameterId::ChangePoint(0)).is_none());
    }
}
