//! Black-box tests of the `maint` binary against snapshot files.

use pretty_assertions::assert_eq;
use std::io::Write;
use std::process::{Command, Output, Stdio};
use tempfile::NamedTempFile;

fn snapshot(toml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(toml.as_bytes()).unwrap();
    file
}

fn satellite(version: &str) -> NamedTempFile {
    snapshot(&format!("[features.satellite]\nversion = \"{version}\"\n"))
}

fn maint(args: &[&str], snapshot: &NamedTempFile) -> Output {
    Command::new(env!("CARGO_BIN_EXE_maint"))
        .args(args)
        .arg("--snapshot")
        .arg(snapshot.path())
        .env("RUST_LOG", "warn")
        .stdin(Stdio::null())
        .output()
        .unwrap()
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn list_reports_applicability() {
    let snap = satellite("6.3.2");
    let output = maint(&["list", "--json"], &snap);
    assert_eq!(output.status.code(), Some(0));

    let rows = stdout_json(&output);
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| r["applicable"] == true));
    assert_eq!(rows[0]["scenario"]["label"], "pre-upgrade-check");
}

#[test]
fn list_filters_by_tag() {
    let snap = satellite("6.3.2");
    let output = maint(&["list", "--json", "--tag", "migrations"], &snap);
    let rows = stdout_json(&output);
    assert_eq!(rows.as_array().unwrap().len(), 1);
    assert_eq!(rows[0]["scenario"]["label"], "migrations");
}

#[test]
fn plan_prints_steps_in_order() {
    let snap = satellite("6.3.2");
    let output = maint(&["plan", "migrations"], &snap);
    assert_eq!(output.status.code(), Some(0));

    let text = String::from_utf8(output.stdout).unwrap();
    let ids = [
        "repositories-setup",
        "packages-unlock-versions",
        "packages-update",
        "installer-upgrade",
    ];
    let positions: Vec<usize> = ids.iter().map(|id| text.find(id).unwrap()).collect();
    let mut sorted = positions.clone();
    sorted.sort_unstable();
    assert_eq!(positions, sorted);
    assert!(text.contains("Applicable: yes"));
}

#[test]
fn run_unattended_succeeds() {
    let snap = satellite("6.3.2");
    let output = maint(&["run", "migrations", "--json", "--assume-yes"], &snap);
    assert_eq!(output.status.code(), Some(0));

    let result = stdout_json(&output);
    assert_eq!(result["status"], "succeeded");
    assert_eq!(result["steps"].as_array().unwrap().len(), 4);
}

#[test]
fn run_without_answers_is_cancelled() {
    // stdin is closed, so the installer confirmation reads as quit
    let snap = satellite("6.3.2");
    let output = maint(&["run", "migrations", "--json"], &snap);
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(stdout_json(&output)["status"], "cancelled");
}

#[test]
fn run_on_unsupported_version_is_not_applicable() {
    let snap = satellite("6.5.0");
    let output = maint(&["run", "pre-migrations", "--json", "-y"], &snap);
    assert_eq!(output.status.code(), Some(0));

    let result = stdout_json(&output);
    assert_eq!(result["status"], "not_applicable");
    assert!(result["steps"].as_array().unwrap().is_empty());
}

#[test]
fn failing_probe_fails_closed() {
    let snap = snapshot("[features.satellite]\nprobe_error = \"rpm database locked\"\n");
    let output = maint(&["run", "migrations", "--json", "-y"], &snap);
    assert_eq!(output.status.code(), Some(0));

    let result = stdout_json(&output);
    assert_eq!(result["status"], "not_applicable");
    assert!(result["not_applicable_reason"]
        .as_str()
        .unwrap()
        .contains("rpm database locked"));
}

#[test]
fn upgrade_runs_every_phase() {
    let snap = satellite("6.3.2");
    let output = maint(&["upgrade", "--json", "-y"], &snap);
    assert_eq!(output.status.code(), Some(0));

    let report = stdout_json(&output);
    assert_eq!(report["phases"].as_array().unwrap().len(), 5);
    assert_eq!(report["upgrade_in_progress"], false);
}

#[test]
fn unknown_scenario_is_an_error() {
    let snap = satellite("6.3.2");
    let output = maint(&["run", "no-such-scenario"], &snap);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("unknown scenario: no-such-scenario"));
}
