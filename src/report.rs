//! Plain-text insights report.
//!
//! Renders an [`AnalysisReport`] as a sectioned text document: summary, series diagnostics,
//! change points with their intervals, regimes, event associations, regime transitions and
//! convergence. Rendering is pure; callers decide where the text goes.

use crate::{
    preprocessing::{DataKind, StationarityReport},
    results::{AnalysisReport, CORRELATION_QUALIFIER},
};
use once_cell::sync::Lazy;
use statrs::distribution::{ContinuousCDF, Normal};
use std::fmt::Write;

const RULE_WIDTH: usize = 80;
const SECTION_WIDTH: usize = 40;

// Cached standard normal distribution for approximate location intervals
static STANDARD_NORMAL: Lazy<Normal> = Lazy::new(|| {
    Normal::new(0.0, 1.0).expect("Failed to create standard normal distribution")
});

/// Two-sided standard normal quantile for central mass `mass`.
pub fn normal_quantile(mass: f64) -> f64 {
    STANDARD_NORMAL.inverse_cdf(0.5 + mass / 2.0)
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out, "{}", title);
    let _ = writeln!(out, "{}", "-".repeat(SECTION_WIDTH));
}

fn stationarity_line(out: &mut String, label: &str, report: Option<&StationarityReport>) {
    match report {
        Some(r) => {
            let _ = writeln!(
                out,
                "{}: ADF {:.3} (p {:.3}), KPSS {:.3} (p {:.3}) -> {}",
                label,
                r.adf.statistic,
                r.adf.p_value,
                r.kpss.statistic,
                r.kpss.p_value,
                if r.stationary() { "stationary" } else { "non-stationary" }
            );
        }
        None => {
            let _ = writeln!(out, "{}: tests not available", label);
        }
    }
}

/// Render `report` as text.
pub fn render_insights_report(report: &AnalysisReport) -> String {
    let mut out = String::new();
    let summary = &report.summary;
    let mass_pct = summary.credible_mass * 100.0;

    let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
    let _ = writeln!(out, "BAYESIAN CHANGE POINT ANALYSIS - INSIGHTS REPORT");
    let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
    let _ = writeln!(out);

    section(&mut out, "SUMMARY");
    let _ = writeln!(out, "Analysis Period: {} to {}", report.period.0, report.period.1);
    let _ = writeln!(out, "Total Observations: {}", report.observations);
    let _ = writeln!(out, "Data Kind: {:?}", report.config.data_kind);
    let _ = writeln!(out, "Detected Change Points: {}", summary.change_points.len());
    let _ = writeln!(
        out,
        "Sampling: {} chains x {} draws{}",
        report.sampling.chains,
        report.sampling.draws_per_chain,
        if report.sampling.truncated {
            " (stopped at deadline)"
        } else {
            ""
        }
    );
    let _ = writeln!(out);

    section(&mut out, "SERIES DIAGNOSTICS");
    let input_label = match report.config.data_kind {
        DataKind::Prices => "Log Returns",
        DataKind::Returns => "Returns",
    };
    stationarity_line(&mut out, "Raw Series", report.level_stationarity.as_ref());
    stationarity_line(&mut out, input_label, report.input_stationarity.as_ref());
    if let Some(volatility) = &report.volatility {
        if let Some((lo, hi)) = volatility.rolling_std_range() {
            let _ = writeln!(
                out,
                "{}-observation Rolling Volatility: {:.4} to {:.4}",
                volatility.window, lo, hi
            );
        }
        if let Some(acf) = volatility.abs_return_acf.first() {
            let _ = writeln!(
                out,
                "Absolute Return Autocorrelation (lag 1): {:.4} ({} volatility clustering)",
                acf,
                if volatility.clustering { "strong" } else { "weak" }
            );
        }
    }
    let _ = writeln!(out);

    section(&mut out, "DETECTED CHANGE POINTS");
    let z = normal_quantile(summary.credible_mass);
    for cp in &summary.change_points {
        let _ = writeln!(out, "Change Point {}:", cp.index + 1);
        let _ = writeln!(out, "  Date: {}", cp.date);
        let _ = writeln!(
            out,
            "  {:.0}% Credible Interval: {} to {} ({} days)",
            mass_pct, cp.interval_dates.0, cp.interval_dates.1, cp.uncertainty_days
        );
        let _ = writeln!(
            out,
            "  Posterior Location: {:.1} ± {:.1} observations (normal approx. ±{:.1})",
            cp.posterior_mean,
            cp.posterior_sd,
            z * cp.posterior_sd
        );
        let _ = writeln!(out);
    }

    section(&mut out, "REGIME ANALYSIS");
    for regime in &summary.regimes {
        let _ = writeln!(out, "Regime {}:", regime.index);
        let _ = writeln!(out, "  Period: {} to {}", regime.start_date, regime.end_date);
        let _ = writeln!(out, "  Duration: {} days", regime.duration_days);
        let _ = writeln!(out, "  Series Mean: {:.4} (std {:.4})", regime.mean, regime.std);
        let _ = writeln!(out, "  Mean Daily Return: {:.6}", regime.mean_parameter);
        let _ = writeln!(
            out,
            "  Annualized Volatility: {:.2}%",
            regime.annualized_volatility_pct
        );
        let _ = writeln!(out);
    }

    section(&mut out, "EVENT ASSOCIATIONS");
    for (k, cp) in summary.change_points.iter().enumerate() {
        let _ = writeln!(out, "Change Point: {}", cp.date);
        match report.associations.get(k).and_then(Option::as_ref) {
            Some(association) => {
                let _ = writeln!(
                    out,
                    "  Assigned: {} ({:+} days, score {:.3})",
                    association.event.description, association.distance_days, association.score
                );
                let _ = writeln!(
                    out,
                    "    Category: {}, Impact: {:?}, Confidence: {:?}",
                    association.event.category,
                    association.event.impact_direction,
                    association.event.confidence
                );
                if let Some(agrees) = association.direction_agrees {
                    let _ = writeln!(
                        out,
                        "    Direction {} the observed change",
                        if agrees { "matches" } else { "contradicts" }
                    );
                }
            }
            None => {
                let _ = writeln!(out, "  No associated event found in window");
            }
        }
        for nearby in report.nearby_events.get(k).into_iter().flatten() {
            let _ = writeln!(
                out,
                "  {:+} days: {}",
                nearby.distance_days, nearby.event.description
            );
        }
        let _ = writeln!(out);
    }

    section(&mut out, "QUANTITATIVE IMPACT ANALYSIS");
    for transition in &summary.transitions {
        let _ = writeln!(
            out,
            "Transition from Regime {} to Regime {}:",
            transition.from_regime, transition.to_regime
        );
        let _ = writeln!(out, "  Mean Return Change: {:.6}", transition.mean_change);
        let _ = writeln!(out, "  Volatility Change: {:.6}", transition.volatility_change);
        let _ = writeln!(
            out,
            "  Annualized Volatility Change: {:.2}%",
            transition.annualized_volatility_change
        );
        if let Some(pct) = transition.raw_mean_change_pct {
            let _ = writeln!(out, "  Series Mean Change: {:+.2}%", pct);
        }
        let impact = report
            .event_impacts
            .get(transition.change_point)
            .and_then(Option::as_ref);
        if let Some(impact) = impact {
            let _ = writeln!(
                out,
                "  Around {} (±{} days):",
                impact.event_date, impact.window_days
            );
            if let (Some(pre), Some(post)) = (impact.pre, impact.post) {
                let _ = writeln!(
                    out,
                    "    Before: {:.4} over {} obs, After: {:.4} over {} obs",
                    pre.mean, pre.count, post.mean, post.count
                );
            }
            if let Some(pct) = impact.pct_change {
                let _ = writeln!(out, "    Change: {:+.2}%", pct);
            }
        }
        let _ = writeln!(out);
    }

    section(&mut out, "CONVERGENCE");
    let _ = writeln!(
        out,
        "Converged: {} (max R-hat {:.4}, min ESS {:.0})",
        if report.converged() { "yes" } else { "no" },
        report.convergence.max_rhat,
        report.convergence.min_ess
    );
    for warning in &report.convergence.warnings {
        let _ = writeln!(out, "  Warning: {}", warning);
    }
    let criteria = &summary.criteria;
    let _ = writeln!(
        out,
        "Log-likelihood {:.2}, AIC {:.2}, BIC {:.2}",
        criteria.log_likelihood, criteria.aic, criteria.bic
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "NOTE: {}", CORRELATION_QUALIFIER);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_normal_quantile() {
        assert_approx_eq!(normal_quantile(0.95), 1.959964, 1e-5);
        assert_approx_eq!(normal_quantile(0.0), 0.0, 1e-9);
    }
}
