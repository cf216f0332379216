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
fn aggregate_sums_records_per_class_and_month() {
    let input = fixture_path("records_small.csv");
    assert!(input.exists(), "missing fixture: {}", input.display());

    let out = run(&["aggregate", "--input", input.to_string_lossy().as_ref()]);
    assert!(
        out.status.success(),
        "aggregate should succeed, stderr={}",
        String::from_utf8_lossy(&out.stderr)
    );

    let text = String::from_utf8(out.stdout).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![
            "date,class,net_jobs",
            "2020-01-01,A,3",
            "2020-01-01,B,7",
            "2020-02-01,A,4",
            "2020-02-01,B,2",
            "2020-03-01,A,0",
            "2020-03-01,B,2",
        ]
    );
}

#[test]
fn aggregate_rejects_bad_month() {
    let mut input = std::env::temp_dir();
    input.push(format!("jobflow_cli_aggregate_{}_bad.csv", std::process::id()));
    std::fs::write(&input, "year,month,class,net_jobs\n2020,13,A,1\n").unwrap();

    let out = run(&["aggregate", "--input", input.to_string_lossy().as_ref()]);
    assert!(!out.status.success());
    let _ = std::fs::remove_file(&input);
}

#[test]
fn version_prints_name() {
    let out = run(&["version"]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).starts_with("jobflow "));
}
