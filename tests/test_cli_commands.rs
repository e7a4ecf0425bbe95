mod common;

use common::{run_cli, write_file};

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

// ============================================================================
// version
// ============================================================================

#[test]
fn version_json() {
    let output = run_cli(&["version", "--format", "json"]);
    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(parsed["name"], "signalrig");
    assert!(parsed["version"].is_string());
}

// ============================================================================
// catalog / decide
// ============================================================================

#[test]
fn catalog_lists_stock_phases() {
    let output = run_cli(&["catalog", "--format", "json"]);
    assert!(output.status.success());
    let phases: Vec<serde_json::Value> = serde_json::from_str(&stdout(&output)).unwrap();
    let names: Vec<&str> = phases.iter().map(|p| p["name"].as_str().unwrap()).collect();
    assert_eq!(
        names,
        vec!["AVENUE_OUTBOUND", "AVENUE_INBOUND", "CROSS_A", "CROSS_D"]
    );
}

#[test]
fn decide_applies_fairness() {
    let output = run_cli(&[
        "decide",
        "--counts",
        "1,5,5,0,0,0",
        "--last-phase",
        "AVENUE_OUTBOUND",
        "--streak",
        "3",
        "--format",
        "json",
    ]);
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let parsed: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(parsed["decision"]["phase_name"], "CROSS_A");
    assert_eq!(parsed["decision"]["fairness_override"], true);
    assert_eq!(parsed["traffic_level"], "high");
}

#[test]
fn decide_with_no_traffic() {
    let output = run_cli(&["decide", "--counts", "0,0,0,0,0,0"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("all lanes held red"));
}

#[test]
fn decide_rejects_bad_counts_with_usage_exit() {
    let output = run_cli(&["decide", "--counts", "1,2,3"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn decide_unknown_phase_suggests() {
    let output = run_cli(&["decide", "--counts", "1,0,0,0,0,0", "--last-phase", "CROS_D"]);
    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("did you mean 'CROSS_D'"));
}

// ============================================================================
// cycle --dry-run
// ============================================================================

#[test]
fn cycle_dry_run_prints_dual_plan() {
    let output = run_cli(&[
        "cycle",
        "--counts",
        "0,1,0,0,2,0",
        "--dry-run",
        "--format",
        "json",
    ]);
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let plan: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(plan["phase_name"], "AVENUE_INBOUND");
    assert_eq!(plan["nominal_duration_ms"], 21_000);
    let states: Vec<&str> = plan["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["state"].as_str().unwrap())
        .collect();
    assert_eq!(
        states,
        vec!["all_red", "both_green", "short_yellow", "short_red", "yellow", "red"]
    );
}

#[test]
fn cycle_dry_run_manual_phase() {
    let output = run_cli(&[
        "cycle",
        "--counts",
        "0,0,0,0,0,0",
        "--phase",
        "CROSS_A",
        "--green",
        "10",
        "--dry-run",
    ]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.starts_with("CROSS_A (green 10s, nominal 15s)"), "{text}");
}

// ============================================================================
// validate
// ============================================================================

#[test]
fn validate_good_and_bad_files() {
    let dir = tempfile::tempdir().unwrap();
    let good = write_file(dir.path(), "good.yaml", "policy:\n  max_green: 40\n");
    let bad = write_file(dir.path(), "bad.yaml", "policy:\n  per_vehicle: 0\n");

    let output = run_cli(&["validate", good.to_str().unwrap()]);
    assert!(output.status.success());

    let output = run_cli(&[
        "validate",
        "--format",
        "json",
        good.to_str().unwrap(),
        bad.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(2));
    let reports: Vec<serde_json::Value> = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(reports[0]["valid"], true);
    assert_eq!(reports[1]["valid"], false);
    assert_eq!(reports[1]["issues"][0]["path"], "policy.per_vehicle");
}

#[test]
fn validate_strict_fails_on_warnings() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(dir.path(), "short.yaml", "timing:\n  yellow: 2s\n");

    assert!(run_cli(&["validate", file.to_str().unwrap()]).status.success());
    let output = run_cli(&["validate", "--strict", file.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn validate_missing_file() {
    let output = run_cli(&["validate", "/tmp/definitely_missing_signalrig.yaml"]);
    assert_eq!(output.status.code(), Some(2));
}

// ============================================================================
// run
// ============================================================================

#[test]
fn run_with_file_feed_and_duration_stops_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let feed = write_file(dir.path(), "feed.jsonl", "[0,0,0,0,0,0]\n");
    let events = dir.path().join("events.jsonl");

    let output = run_cli(&[
        "run",
        "--feed",
        feed.to_str().unwrap(),
        "--duration",
        "300ms",
        "--events-file",
        events.to_str().unwrap(),
    ]);
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let text = std::fs::read_to_string(&events).unwrap();
    let types: Vec<String> = text
        .lines()
        .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["type"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(types, vec!["ControllerStarted", "ControllerStopped"]);
}

#[test]
fn run_with_missing_feed_is_io_error() {
    let output = run_cli(&["run", "--feed", "/tmp/definitely_missing_signalrig_feed"]);
    assert_eq!(output.status.code(), Some(3));
}
