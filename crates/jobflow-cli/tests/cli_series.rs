use std::path::PathBuf;
use std::process::{Command, Output};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_jobflow"))
}

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..").canonicalize().unwrap()
}

fn fixture_path(name: &str) -> PathBuf {
    repo_root().join("tests/fixtures").join(name)
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

#[test]
fn series_contract() {
    let out = run(&[
        "series",
        "--panel",
        fixture_path("panel_small.csv").to_string_lossy().as_ref(),
        "--config",
        fixture_path("config.yaml").to_string_lossy().as_ref(),
    ]);
    assert!(
        out.status.success(),
        "series should succeed, stderr={}",
        String::from_utf8_lossy(&out.stderr)
    );

    let v: serde_json::Value =
        serde_json::from_slice(&out.stdout).expect("stdout should be valid JSON");
    assert_eq!(v["origin"], "2019-01-01");
    assert_eq!(v["n_ok"].as_u64(), Some(4));

    let classes = v["classes"].as_object().unwrap();
    assert_eq!(classes.len(), 4);
    for (class, entry) in classes {
        assert_eq!(entry["status"], "ok", "{class}: {entry}");
        let r = &entry["result"];
        let profile = r["profile"].as_array().unwrap();
        assert_eq!(profile.len(), 12);
        let sum: f64 = profile.iter().map(|x| x.as_f64().unwrap()).sum();
        assert!(sum.abs() < 0.5, "{class}: profile sum {sum}");
        assert_eq!(r["deseasonalized"].as_array().unwrap().len(), 48);
        assert_eq!(r["trend_coefficients"].as_array().unwrap().len(), 3);
        let order = r["ar_order"].as_u64().unwrap();
        assert!((1..=4).contains(&order));
        assert_eq!(r["ar_coefficients"].as_array().unwrap().len() as u64, order);
        assert_eq!(r["ar_candidates"].as_array().unwrap().len(), 4);
    }
}

#[test]
fn series_short_window_reports_failures() {
    let mut config = std::env::temp_dir();
    config.push(format!("jobflow_cli_series_{}_window.yaml", std::process::id()));
    std::fs::write(
        &config,
        "treatment:\n  treatment_classes: [\"Top 10 aut\"]\n  treatment_start: \"2021-07-01\"\n\
         series:\n  reference_window: {start: \"2019-01-01\", end: \"2020-06-01\"}\n",
    )
    .unwrap();

    let out = run(&[
        "series",
        "--panel",
        fixture_path("panel_small.csv").to_string_lossy().as_ref(),
        "--config",
        config.to_string_lossy().as_ref(),
    ]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["n_ok"].as_u64(), Some(0));
    for (_, entry) in v["classes"].as_object().unwrap() {
        assert_eq!(entry["status"], "failed");
        assert!(entry["error"].as_str().unwrap().contains("insufficient history"));
    }
    let _ = std::fs::remove_file(&config);
}

#[test]
fn run_combines_both_paths() {
    let out = run(&[
        "--threads",
        "2",
        "run",
        "--panel",
        fixture_path("panel_small.csv").to_string_lossy().as_ref(),
        "--config",
        fixture_path("config.yaml").to_string_lossy().as_ref(),
    ]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["panel"]["rows"].as_u64(), Some(192));
    assert_eq!(v["panel"]["classes"].as_array().unwrap().len(), 4);
    assert_eq!(v["panel"]["max_date"], "2022-12-01");
    assert!(v["did"]["estimate"].as_f64().unwrap() < 0.0);
    assert_eq!(v["series"]["n_ok"].as_u64(), Some(4));

    let report = v["report"].as_array().unwrap();
    assert_eq!(report.len(), 4);
    assert!(report.iter().all(|e| e["status"] == "ok"));
    assert!(report.iter().all(|e| e["peak_month"].as_u64().is_some()));
}
