//! Integration tests for full workflow scenarios
//!
//! These tests run the complete pipeline (preprocessing, sampling, diagnostics, summaries and
//! event association) on synthetic series with known breaks.

use bayes_breaks::{
    generators::{generate_price_series, generate_return_series, DateSpacing, RegimeBlock},
    render_insights_report, run_analysis, ChangePointAnalyzer, ConfidenceLevel,
    ConvergenceWarning, DataKind, Event, EventCategory, ImpactDirection, RunConfig, Series,
    CORRELATION_QUALIFIER,
};
use chrono::{Duration, NaiveDate};
use std::sync::Arc;

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2018, 1, 1).unwrap()
}

/// Price series whose returns shift from calm drift to a volatile decline after 300 returns.
fn oil_like_prices(seed: u64) -> Series {
    generate_price_series(
        start(),
        50.0,
        &[
            RegimeBlock::new(300, 0.0005, 0.01),
            RegimeBlock::new(300, -0.01, 0.02),
        ],
        DateSpacing::Business,
        seed,
    )
    .unwrap()
}

fn catalog(break_date: NaiveDate) -> Vec<Event> {
    vec![
        Event::new(
            break_date - Duration::days(10),
            EventCategory::Economic,
            "Inventory report",
            ImpactDirection::Positive,
            ConfidenceLevel::Low,
        ),
        Event::new(
            break_date + Duration::days(3),
            EventCategory::OpecPolicy,
            "Production quota increase",
            ImpactDirection::Negative,
            ConfidenceLevel::High,
        ),
        Event::new(
            break_date + Duration::days(45),
            EventCategory::Sanctions,
            "Export restrictions",
            ImpactDirection::Positive,
            ConfidenceLevel::Medium,
        ),
    ]
}

fn short_config(seed: u64) -> RunConfig {
    let mut config = RunConfig::new(1, 30, 2, 300, seed);
    config.sampler.tune = 200;
    config
}

/// Test scenario: analyst runs the standard configuration on a price series with one break
#[test]
fn test_complete_price_analysis_workflow() {
    let series = Arc::new(oil_like_prices(42));
    // return 300 is the move into raw observation 301
    let break_date = series.dates()[301];
    let events = catalog(break_date);

    let config = RunConfig::standard().with_change_points(1);
    let report = run_analysis(Arc::clone(&series), &events, &config).expect("analysis succeeds");

    assert!(
        report.converged(),
        "standard run should converge: {:?}",
        report.convergence.warnings
    );
    assert!(report.convergence.max_rhat < 1.1);
    assert!(report.convergence.min_ess > 400.0);
    assert_eq!(report.sampling.chains, 4);
    assert_eq!(report.sampling.draws_per_chain, 2000);

    let cp = &report.summary.change_points[0];
    assert!(
        (cp.location as i64 - 300).abs() <= 10,
        "estimated location {}",
        cp.location
    );
    assert!(cp.interval.0 <= cp.location && cp.location <= cp.interval.1);
    assert!(cp.uncertainty_days >= 0);

    // High-confidence event wins over the closer-in-rank Low one; the 45-day event is out
    let association = report.associations[0].as_ref().expect("event associated");
    assert_eq!(association.event.category, EventCategory::OpecPolicy);
    assert_eq!(association.direction_agrees, Some(true));
    assert!(report.nearby_events[0]
        .iter()
        .all(|n| n.event.category != EventCategory::Sanctions));
    let impact = report.event_impacts[0].as_ref().expect("window impact computed");
    assert_eq!(impact.event_date, association.event.date);
    assert!(impact.pre.is_some() && impact.post.is_some());

    // Regimes tile the raw series
    let regimes = &report.summary.regimes;
    assert_eq!(regimes.len(), 2);
    assert_eq!(regimes[0].start_index, 0);
    assert_eq!(regimes[0].end_index, regimes[1].start_index);
    assert_eq!(regimes[1].end_index, series.len());
    assert!(regimes[1].volatility_parameter > regimes[0].volatility_parameter);
    assert!(regimes[1].annualized_volatility_pct > regimes[0].annualized_volatility_pct);
    assert_eq!(report.summary.transitions.len(), 1);
    assert!(report.summary.transitions[0].mean_change < 0.0);
}

/// Test scenario: the same input, configuration and seed must give the same answer
#[test]
fn test_fixed_seed_reproduces_report() {
    let series = Arc::new(oil_like_prices(7));
    let events = catalog(series.dates()[301]);
    let config = short_config(11);

    let first = run_analysis(Arc::clone(&series), &events, &config).unwrap();
    let second = run_analysis(Arc::clone(&series), &events, &config).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.to_output(), second.to_output());
}

/// Test scenario: far too few draws still produce estimates but fail the gate
#[test]
fn test_short_run_is_flagged_not_failed() {
    let series = Arc::new(oil_like_prices(3));
    let mut config = RunConfig::new(1, 30, 4, 5, 1);
    config.sampler.tune = 20;

    let report = run_analysis(series, &[], &config).unwrap();
    assert!(!report.converged());
    assert_eq!(report.summary.change_points.len(), 1);
    assert_eq!(report.summary.regimes.len(), 2);
    assert!(report
        .convergence
        .warnings
        .iter()
        .any(|w| matches!(w, ConvergenceWarning::LowEffectiveSampleSize { .. })));
    assert!(!report.to_output().converged);
}

/// Test scenario: an exhausted time budget keeps partial results and reports non-convergence
#[test]
fn test_timeout_truncates_run() {
    let series = Arc::new(oil_like_prices(5));
    let config = short_config(2).with_timeout(std::time::Duration::ZERO);

    let report = run_analysis(series, &[], &config).unwrap();
    assert!(report.sampling.truncated);
    assert!(!report.converged());
    assert!(report
        .convergence
        .warnings
        .iter()
        .any(|w| matches!(w, ConvergenceWarning::SamplingTruncated { .. })));
    assert_eq!(report.summary.change_points.len(), 1);
}

/// Test scenario: an event 45 days from the detected break falls outside the 30-day window
#[test]
fn test_distant_event_is_not_associated() {
    let series = Arc::new(oil_like_prices(9));
    let config = short_config(4);
    let baseline = run_analysis(Arc::clone(&series), &[], &config).unwrap();
    let break_date = baseline.summary.change_points[0].date;

    let events = vec![Event::new(
        break_date + Duration::days(45),
        EventCategory::Pandemic,
        "Lockdowns",
        ImpactDirection::Negative,
        ConfidenceLevel::High,
    )];
    let report = run_analysis(series, &events, &config).unwrap();
    // Events do not influence sampling
    assert_eq!(report.summary.change_points[0].date, break_date);
    assert!(report.associations[0].is_none());
    assert!(report.nearby_events[0].is_empty());
    assert!(report.event_impacts[0].is_none());
    assert!(report.to_output().change_points[0].associated_event.is_none());
}

/// Test scenario: a window wider than the calendar spans the whole series without overflow
#[test]
fn test_very_wide_association_window() {
    let series = Arc::new(oil_like_prices(13));
    let events = catalog(series.dates()[301]);
    let mut config = RunConfig::new(1, 200_000_000, 2, 300, 10);
    config.sampler.tune = 200;

    let report = run_analysis(Arc::clone(&series), &events, &config).unwrap();
    let association = report.associations[0].as_ref().expect("every event is in range");
    assert!(association.score.is_finite());
    assert_eq!(report.nearby_events[0].len(), events.len());
    let impact = report.event_impacts[0].as_ref().unwrap();
    let covered = impact.pre.map_or(0, |s| s.count) + impact.post.map_or(0, |s| s.count);
    assert_eq!(covered, series.len());
    assert!(render_insights_report(&report).contains("QUANTITATIVE IMPACT ANALYSIS"));
}

/// Test scenario: three regimes in a return series
#[test]
fn test_two_breaks_in_return_series() {
    let series = generate_return_series(
        start(),
        &[
            RegimeBlock::new(250, 0.0, 0.01),
            RegimeBlock::new(250, 0.02, 0.01),
            RegimeBlock::new(250, -0.01, 0.01),
        ],
        DateSpacing::Calendar,
        21,
    )
    .unwrap();
    let config = short_config(5)
        .with_change_points(2)
        .with_data_kind(DataKind::Returns);

    let report = run_analysis(Arc::new(series), &[], &config).unwrap();
    let locations: Vec<usize> = report
        .summary
        .change_points
        .iter()
        .map(|cp| cp.location)
        .collect();
    assert!((locations[0] as i64 - 250).abs() <= 10, "{:?}", locations);
    assert!((locations[1] as i64 - 500).abs() <= 10, "{:?}", locations);
    assert!(report.summary.change_points[0].date < report.summary.change_points[1].date);
}

/// Test scenario: stationarity and volatility checks accompany the breaks
#[test]
fn test_series_diagnostics_reported() {
    let series = Arc::new(oil_like_prices(15));
    let report = run_analysis(Arc::clone(&series), &[], &short_config(12)).unwrap();

    // Price levels wander; their log returns do not have a unit root
    let levels = report.level_stationarity.as_ref().expect("level tests computed");
    assert!(!levels.stationary());
    assert!(!levels.kpss_stationary());
    let input = report.input_stationarity.as_ref().expect("input tests computed");
    assert!(input.adf_stationary(), "ADF {:?}", input.adf);

    let volatility = report.volatility.as_ref().expect("volatility profile computed");
    assert_eq!(volatility.window, 30);
    assert_eq!(volatility.rolling_std.len(), series.len() - 1 - 30 + 1);
    assert_eq!(volatility.abs_return_acf.len(), 20);

    let text = render_insights_report(&report);
    assert!(text.contains("SERIES DIAGNOSTICS"));
    assert!(text.contains("Raw Series: ADF"));
    assert!(text.contains("Log Returns: ADF"));
}

/// Test scenario: alternating calm and turbulent stretches are flagged as volatility clustering
#[test]
fn test_volatility_clustering_in_return_series() {
    let blocks: Vec<RegimeBlock> = (0..6)
        .map(|i| RegimeBlock::new(100, 0.0, if i % 2 == 0 { 0.005 } else { 0.04 }))
        .collect();
    let series = generate_return_series(start(), &blocks, DateSpacing::Calendar, 31).unwrap();
    let config = short_config(3).with_data_kind(DataKind::Returns);

    let report = run_analysis(Arc::new(series), &[], &config).unwrap();
    let volatility = report.volatility.as_ref().unwrap();
    assert!(volatility.abs_return_acf[0] > 0.1, "{:?}", volatility.abs_return_acf);
    assert!(volatility.clustering);
    assert!(render_insights_report(&report).contains("strong volatility clustering"));
}

/// Test scenario: multi-series analyzer with a shared event catalog
#[test]
fn test_analyzer_manages_several_series() {
    let mut analyzer = ChangePointAnalyzer::with_config(short_config(8)).unwrap();
    let brent = oil_like_prices(1);
    let wti = oil_like_prices(2);
    analyzer.set_events(catalog(brent.dates()[301]));
    analyzer.add_time_series("BRENT", brent);
    analyzer.add_time_series("WTI", wti);

    analyzer.analyze_all_series().unwrap();
    for name in ["BRENT", "WTI"] {
        let report = analyzer.get_analysis_results(name).unwrap();
        assert_eq!(report.summary.change_points.len(), 1);
    }
}

/// Test scenario: the insights report covers every section and carries the qualifier
#[test]
fn test_insights_report_sections() {
    let series = Arc::new(oil_like_prices(12));
    let events = catalog(series.dates()[301]);
    let report = run_analysis(series, &events, &short_config(6)).unwrap();

    let text = render_insights_report(&report);
    for heading in [
        "SERIES DIAGNOSTICS",
        "DETECTED CHANGE POINTS",
        "REGIME ANALYSIS",
        "EVENT ASSOCIATIONS",
        "QUANTITATIVE IMPACT ANALYSIS",
        "CONVERGENCE",
    ] {
        assert!(text.contains(heading), "missing {}", heading);
    }
    assert!(text.contains(CORRELATION_QUALIFIER));
    assert!(text.contains("Production quota increase"));
}

/// Test scenario: serialized output follows the published contract
#[cfg(feature = "serde")]
#[test]
fn test_output_json_contract() {
    let series = Arc::new(oil_like_prices(14));
    let events = catalog(series.dates()[301]);
    let report = run_analysis(series, &events, &short_config(9)).unwrap();
    let value = serde_json::to_value(report.to_output()).unwrap();

    let cp = &value["change_points"][0];
    let date = cp["date"].as_str().unwrap();
    assert!(NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok());
    assert_eq!(cp["credible_interval"].as_array().unwrap().len(), 2);
    assert!(cp["uncertainty_days"].is_i64());
    let event = &cp["associated_event"];
    assert!(event["date"].is_string());
    assert!(event["category"].is_string());
    assert!(event["score"].is_f64());

    let regimes = value["regimes"].as_array().unwrap();
    assert_eq!(regimes.len(), 2);
    for regime in regimes {
        for key in ["start", "end", "mean", "std"] {
            assert!(!regime[key].is_null(), "regime missing {}", key);
        }
    }
    assert!(value["converged"].is_boolean());
    assert!(value["diagnostics"]["max_variance_ratio"].is_f64());
    assert!(value["diagnostics"]["min_effective_sample_size"].is_f64());
    assert_eq!(value["qualifier"].as_str().unwrap(), CORRELATION_QUALIFIER);
}

/// Test scenario: diagnostics of a truncated or tiny run still serialize as numbers
#[cfg(feature = "serde")]
#[test]
fn test_output_json_diagnostics_stay_numeric() {
    let mut tiny = RunConfig::new(1, 30, 4, 1, 3);
    tiny.sampler.tune = 5;
    let configs = [
        short_config(2).with_timeout(std::time::Duration::ZERO),
        tiny,
    ];
    for config in configs.iter() {
        let series = Arc::new(oil_like_prices(5));
        let report = run_analysis(series, &[], config).unwrap();
        assert!(!report.converged());

        let value = serde_json::to_value(report.to_output()).unwrap();
        let diagnostics = &value["diagnostics"];
        assert!(diagnostics["max_variance_ratio"].is_f64(), "{}", diagnostics);
        assert!(diagnostics["min_effective_sample_size"].is_f64(), "{}", diagnostics);

        let text = serde_json::to_string(&report.to_output()).unwrap();
        let parsed: bayes_breaks::AnalysisOutput = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.converged, false);
    }
}
