//! End-to-end scenarios over both analysis paths.
//!
//! - DiD: effect recovery on a simulated panel, degenerate `post`
//! - Series: seasonal peak recovery, AR(2) order search, short reference window
//! - Batch: per-class isolation and round-trip of the deseasonalized series

use std::f64::consts::PI;

use chrono::NaiveDate;
use jobflow_core::types::{from_month_ordinal, month_ordinal};
use jobflow_core::{
    Error, MonthlySeries, Panel, PanelRow, ReferenceWindow, SeriesConfig, TreatmentConfig,
};
use jobflow_inference::timeseries::autoreg::fit_ar_grid;
use jobflow_inference::{
    SeasonalConfig, analyze_series, assign, decompose_class, estimate, group_summary,
    pre_trend_comparison, series_report, simulate_ar,
};

use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn month(offset: i64) -> NaiveDate {
    let base = month_ordinal(NaiveDate::from_ymd_opt(2019, 1, 1).unwrap());
    from_month_ordinal(base + offset).unwrap()
}

/// Four classes × `months` months; classes "T1"/"T2" gain `effect` from month 18.
fn simulated_panel(months: i64, effect: f64, seed: u64) -> Panel {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let eps = Normal::new(0.0, 1.5).unwrap();
    let levels = [("C1", 200.0), ("C2", 150.0), ("T1", 120.0), ("T2", 90.0)];
    let mut rows = Vec::new();
    for (class, level) in levels {
        for i in 0..months {
            let seasonal = 40.0 * (2.0 * PI * i as f64 / 12.0).sin();
            let treated = class.starts_with('T') && i >= 18;
            let y = level + 0.5 * i as f64 + seasonal
                + if treated { effect } else { 0.0 }
                + eps.sample(&mut rng);
            rows.push(PanelRow { date: month(i), class: class.into(), net_jobs: y.round() as i64 });
        }
    }
    Panel::new(rows).unwrap()
}

fn treatment() -> TreatmentConfig {
    TreatmentConfig::new(["T1", "T2"], month(18))
}

// ---------------------------------------------------------------------------
// Path A
// ---------------------------------------------------------------------------

#[test]
fn did_recovers_simulated_effect() {
    let panel = simulated_panel(36, 25.0, 17);
    let rows = assign(&panel, &treatment());
    let model = estimate(&rows).unwrap();
    let te = model.treatment_effect();

    assert!((te.estimate - 25.0).abs() < 4.0 * te.std_error, "{te:?}");
    assert!(te.ci_lower < te.estimate && te.estimate < te.ci_upper);
    assert!(te.p_value < 1e-6);
    assert_eq!(model.n_obs, 144);
    assert_eq!(model.n_params, 2 + 3 + 35);
    assert_eq!(model.reference_class, "C1");

    let cells = group_summary(&rows);
    assert_eq!(cells.iter().map(|c| c.count).sum::<usize>(), 144);
    let pre = pre_trend_comparison(&rows);
    assert_eq!(pre.len(), 18);
    assert!(pre.iter().all(|p| p.treated_mean.is_some() && p.control_mean.is_some()));
}

#[test]
fn scenario_constant_post_is_insufficient_variation() {
    // 2 classes × 36 months, treatment starting before the panel: post = 1 everywhere.
    let mut rows = Vec::new();
    for class in ["A", "B"] {
        for i in 0..36 {
            rows.push(PanelRow { date: month(i), class: class.into(), net_jobs: 10 + i });
        }
    }
    let panel = Panel::new(rows).unwrap();
    let cfg = TreatmentConfig::new(["A"], month(-1));
    let err = estimate(&assign(&panel, &cfg)).unwrap_err();
    assert!(matches!(err, Error::InsufficientVariation { .. }), "{err}");
}

#[test]
fn identical_treated_everywhere_is_insufficient_variation() {
    let panel = simulated_panel(24, 5.0, 3);
    let cfg = TreatmentConfig::new(["C1", "C2", "T1", "T2"], month(12));
    let err = estimate(&assign(&panel, &cfg)).unwrap_err();
    assert!(matches!(err, Error::InsufficientVariation { .. }), "{err}");
}

// ---------------------------------------------------------------------------
// Path B
// ---------------------------------------------------------------------------

#[test]
fn scenario_sine_profile_peaks_in_march() {
    // 10 + 2·sin(2π·month/12), months numbered from January = 1.
    let values: Vec<f64> =
        (0..36).map(|i| 10.0 + 2.0 * (2.0 * PI * ((i % 12) + 1) as f64 / 12.0).sin()).collect();
    let dates = (0..36).map(month).collect();
    let series = MonthlySeries::new(dates, values).unwrap();

    let fit = decompose_class("A", &series, &SeasonalConfig::default()).unwrap();
    assert_eq!(fit.profile.peak_month(), 3);
    let peak = fit.profile.factor(3).unwrap();
    assert!((peak - 0.2).abs() < 0.05, "peak factor {peak}");
    assert_eq!(fit.profile.factors().len(), 12);
}

#[test]
fn scenario_ar2_selected_by_aic() {
    let y = simulate_ar(0.0, &[0.6, -0.4], 1.0, 600, 200, 2024).unwrap();
    let ar = fit_ar_grid(&y, 6).unwrap();
    let aic = |p: usize| ar.candidates.iter().find(|c| c.order == p).unwrap().aic;

    assert_eq!(ar.candidates.len(), 6);
    // The second lag carries real signal.
    assert!(aic(2) < aic(1) - 10.0);
    // Order 2, or a higher order within a near-tie of it.
    assert!(ar.order() == 2 || aic(2) - ar.aic < 4.0, "order {}", ar.order());
    for p in 4..=6 {
        assert!(ar.aic <= aic(p));
    }
    assert!((ar.fit.coefficients[0] - 0.6).abs() < 0.15);
    assert!((ar.fit.coefficients[1] + 0.4).abs() < 0.15);
}

#[test]
fn scenario_short_reference_window_is_insufficient_history() {
    let panel = simulated_panel(48, 0.0, 5);
    let cfg = SeriesConfig {
        reference_window: Some(ReferenceWindow::new(month(6), month(23)).unwrap()),
        ..SeriesConfig::default()
    };
    let batch = analyze_series(&panel, &cfg).unwrap();
    assert_eq!(batch.n_ok(), 0);
    for (_, err) in batch.failures() {
        assert!(matches!(err, Error::InsufficientHistory { .. }), "{err}");
    }
}

#[test]
fn series_batch_round_trips_and_reports() {
    let mut panel_rows = simulated_panel(48, 0.0, 9).rows().to_vec();
    // A class too short for a seasonal profile.
    for i in 0..10 {
        panel_rows.push(PanelRow { date: month(i), class: "tiny".into(), net_jobs: 5 + i });
    }
    let panel = Panel::new(panel_rows).unwrap();

    let batch = analyze_series(&panel, &SeriesConfig::default()).unwrap();
    assert_eq!(batch.classes.len(), 5);
    assert_eq!(batch.n_ok(), 4);
    assert_eq!(batch.origin, month(0));

    for (_, r) in batch.successes() {
        let back = r.seasonal.reseasonalize();
        for (a, b) in back.values().iter().zip(r.seasonal.normalized.values()) {
            assert!((a - b).abs() < 1e-12);
        }
        assert_eq!(r.seasonal.profile.peak_month(), 4);
        assert!((1..=6).contains(&r.residual.ar.order()));
    }

    let report = series_report(&batch);
    assert_eq!(report.len(), 5);
    let tiny = report.iter().find(|e| e.class == "tiny").unwrap();
    assert_eq!(tiny.status, "failed");
    assert!(tiny.error.as_deref().unwrap().contains("insufficient history"));
}
