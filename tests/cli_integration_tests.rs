//! Black-box tests of the sweepx-cli binary.
use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn write_experiment(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(content.as_bytes()).expect("write");
    file
}

#[test]
fn test_run_comparison_prints_ranked_summary() {
    let file = write_experiment(
        r#"
experiment:
  name: ranked
  workers: 2
  comparison:
    params: {a: [1, 2, 3]}
    commands: ["echo ${a}"]
    repeat: 3
"#,
    );

    let assert = Command::cargo_bin("sweepx-cli")
        .expect("binary")
        .args(["run"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Starting experiments."))
        .stdout(predicate::str::contains("Comparison summary"))
        .stdout(predicate::str::contains("Time elapsed"));

    // Deterministic scores rank a=3 first.
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    let summary = stdout
        .split("Comparison summary")
        .nth(1)
        .expect("summary section");
    let best = summary.find("3.0000").expect("best mean");
    let worst = summary.find("1.0000").expect("worst mean");
    assert!(best < worst, "rows are not sorted by mean descending");
}

#[test]
fn test_run_is_deterministic_for_deterministic_commands() {
    let file = write_experiment(
        r#"
experiment:
  name: stable
  workers: 4
  comparison:
    params: {a: [5, 1, 9]}
    commands: ["echo ${a}"]
    repeat: 2
"#,
    );

    let summary_of = |path: &std::path::Path| {
        let output = Command::cargo_bin("sweepx-cli")
            .expect("binary")
            .args(["run"])
            .arg(path)
            .output()
            .expect("run");
        assert!(output.status.success());
        let stdout = String::from_utf8(output.stdout).expect("utf8");
        stdout
            .split("Comparison summary")
            .nth(1)
            .expect("summary")
            .to_string()
    };

    assert_eq!(summary_of(file.path()), summary_of(file.path()));
}

#[test]
fn test_run_optimised_prints_optimisation_summary() {
    let file = write_experiment(
        r#"
experiment:
  name: grid
  workers: 2
  optimised:
    optimiser: GridSearch
    opt_params: {gridRes: 3}
    params:
      x: "linear(0, 1)"
    commands: ["echo ${x}"]
"#,
    );

    Command::cargo_bin("sweepx-cli")
        .expect("binary")
        .args(["run"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Optimisation summary"))
        .stdout(predicate::str::contains("Optimal values"));
}

#[test]
fn test_config_error_exits_nonzero_before_running() {
    let file = write_experiment(
        r#"
experiment:
  name: broken
  optimised:
    optimiser: NoSuchOptimiser
    opt_params: {n_iterations: 5}
    params: {x: "linear(0, 1)"}
    commands: ["echo ${x}"]
"#,
    );

    Command::cargo_bin("sweepx-cli")
        .expect("binary")
        .args(["run"])
        .arg(file.path())
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Unknown optimiser"))
        .stdout(predicate::str::contains("Starting experiments.").not());
}

#[test]
fn test_check_validates_without_running() {
    let file = write_experiment(
        r#"
experiment:
  name: checked
  comparison:
    params: {a: [1]}
    commands: ["echo should-not-run; exit 1"]
"#,
    );

    Command::cargo_bin("sweepx-cli")
        .expect("binary")
        .args(["check"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"));
}

#[test]
fn test_check_reports_missing_commands() {
    let file = write_experiment(
        r#"
experiment:
  name: broken
  comparison:
    params: {a: [1]}
"#,
    );

    Command::cargo_bin("sweepx-cli")
        .expect("binary")
        .args(["check"])
        .arg(file.path())
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("commands"));
}

#[test]
fn test_missing_file_is_reported() {
    Command::cargo_bin("sweepx-cli")
        .expect("binary")
        .args(["check", "/nonexistent/experiment.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("/nonexistent/experiment.yaml"));
}

#[test]
fn test_generate_completion_emits_script() {
    Command::cargo_bin("sweepx-cli")
        .expect("binary")
        .args(["generate-completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sweepx-cli"));
}

#[test]
fn test_workers_override_flag() {
    let file = write_experiment(
        r#"
experiment:
  name: override
  workers: 1
  comparison:
    params: {a: [1, 2]}
    commands: ["echo ${a}"]
"#,
    );

    Command::cargo_bin("sweepx-cli")
        .expect("binary")
        .args(["run", "--workers", "2"])
        .arg(file.path())
        .assert()
        .success();
}
