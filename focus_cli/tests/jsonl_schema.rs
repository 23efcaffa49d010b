use assert_cmd::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[focuser]
min_focus = 0
max_focus = 1200

[scan]
coarse_step = 80
fine_step = 10
settle_frames = 2

[camera]
fps = 200
frame_timeout_ms = 20
width = 160
height = 120

[safety]
max_run_ms = 20000

[simulation]
peak = 643
depth_of_field = 40.0
latency_frames = 1
noise = 0
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn result_line(stdout: &[u8]) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(stdout);
    let line = stdout
        .lines()
        .find(|l| l.contains("\"final_position\""))
        .unwrap_or("")
        .to_string();
    assert!(
        !line.is_empty(),
        "no JSON line with final_position found; stdout was: {stdout}"
    );
    serde_json::from_str(&line).expect("valid JSON")
}

/// Validate the JSON result line of a successful session.
#[rstest]
fn json_success_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("focus_cli").unwrap();
    cmd.arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("autofocus");

    let out = cmd.assert().success().get_output().stdout.clone();
    let v = result_line(&out);

    assert!(v.get("timestamp").and_then(|x| x.as_i64()).is_some());
    assert!(v.get("duration_ms").and_then(|x| x.as_u64()).is_some());
    assert!(v.get("frames").and_then(|x| x.as_u64()).is_some_and(|n| n > 0));
    assert!(v.get("score").and_then(|x| x.as_f64()).is_some());
    assert_eq!(v.get("low_confidence").and_then(|x| x.as_bool()), Some(false));

    let pos = v.get("final_position").and_then(|x| x.as_i64()).unwrap();
    assert!((pos - 643).abs() <= 15, "landed at {pos}");

    // No zoom or window was requested.
    assert!(v["zoom"].is_null());
    assert!(v["window"].is_null());
    assert!(v.get("error").is_some());
    assert!(v["error"].is_null());
}

/// A failed session still prints a result line, with a null position and a reason.
#[rstest]
fn json_failure_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("focus_cli").unwrap();
    cmd.arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("autofocus")
        .env("FOCUS_TEST_SIM_FAULT_AFTER", "3");

    let assert = cmd.assert().code(3);
    let output = assert.get_output();
    let v = result_line(&output.stdout);

    assert!(v["final_position"].is_null());
    assert!(v["score"].is_null());
    assert_eq!(v["error"].as_str(), Some("ActuatorFault"));

    // The structured error goes to stderr.
    let stderr = String::from_utf8_lossy(&output.stderr);
    let err_line = stderr
        .lines()
        .find(|l| l.contains("\"reason\""))
        .unwrap_or_else(|| panic!("no JSON error on stderr: {stderr}"));
    let e: serde_json::Value = serde_json::from_str(err_line).expect("valid JSON");
    assert_eq!(e["reason"], "ActuatorFault");
}

/// The zoom table window is echoed back and bounds the search.
#[rstest]
fn json_reports_zoom_window() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let csv = dir.path().join("ranges.csv");
    fs::write(&csv, "zoom,start,end\n0,400,900\n10,500,1000\n").unwrap();

    let mut cmd = Command::cargo_bin("focus_cli").unwrap();
    cmd.arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("--ranges")
        .arg(&csv)
        .arg("autofocus")
        .arg("--zoom")
        .arg("0");

    let out = cmd.assert().success().get_output().stdout.clone();
    let v = result_line(&out);
    assert_eq!(v["zoom"], 0);
    assert_eq!(v["window"], serde_json::json!([400, 900]));
    let pos = v["final_position"].as_i64().unwrap();
    assert!((pos - 643).abs() <= 15, "landed at {pos}");
}
