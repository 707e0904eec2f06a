// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

const MANIFEST: &str = r#"
name: demo
tools:
  - name: sort
    description: Sort lines
    parameters:
      - { name: input, file: true }
      - { name: output, file: true }
    default_input: input
    default_output: output
    command: "sort ${input} > ${output}"
  - name: fail
    description: Always fails
    parameters: [{ name: code }]
    command: "exit ${code}"
  - name: sort-twice
    description: Sort through an intermediate file
    parameters:
      - { name: input, file: true }
      - { name: output, file: true }
    pipeline:
      jobs:
        - { id: first, tool: sort, configuration: { input: "${input}", output: tmp.txt } }
        - { id: second, tool: sort, after: [first], configuration: { input: tmp.txt, output: "${output}" } }
pipeline:
  jobs:
    - { id: all, tool: sort-twice, configuration: { input: in.txt, output: out.txt } }
"#;

fn workspace(manifest: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("toolflow.yaml"), manifest).unwrap();
    std::fs::write(dir.path().join("in.txt"), "pear\napple\nfig\n").unwrap();
    dir
}

fn toolflow(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("toolflow").unwrap();
    cmd.current_dir(dir)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("TOOLFLOW_MAX_PARALLEL")
        .env_remove("TOOLFLOW_FAIL_FAST");
    cmd
}

#[test]
fn tools_lists_declared_tools() {
    let dir = workspace(MANIFEST);
    toolflow(dir.path())
        .arg("tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("sort-twice [composite]"))
        .stdout(predicate::str::contains("Sort lines"))
        .stdout(predicate::str::contains("input (input, file)"));
}

#[test]
fn validate_accepts_manifest() {
    let dir = workspace(MANIFEST);
    toolflow(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Manifest is valid"));
}

#[test]
fn validate_reports_errors() {
    let dir = workspace(
        r#"
tools:
  - { name: dup, command: "true" }
  - { name: dup, command: "false" }
"#,
    );
    toolflow(dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Duplicate tool name: 'dup'"));
}

#[test]
fn missing_manifest_fails() {
    let dir = tempfile::tempdir().unwrap();
    toolflow(dir.path())
        .arg("tools")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Tool manifest not found"));
}

#[test]
fn graph_shows_reduced_expansion() {
    let dir = workspace(MANIFEST);
    toolflow(dir.path())
        .args(["graph", "sort-twice", "-s", "input=in.txt", "-s", "output=out.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1. first (sort)"))
        .stdout(predicate::str::contains("2. second (sort) [after: first]"));
}

#[test]
fn graph_of_manifest_pipeline_in_mermaid() {
    let dir = workspace(MANIFEST);
    toolflow(dir.path())
        .args(["graph", "-f", "mermaid"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("graph TD"))
        .stdout(predicate::str::contains("all/first"));
}

#[test]
fn dry_run_does_not_execute() {
    let dir = workspace(MANIFEST);
    toolflow(dir.path())
        .args(["run", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("all/second (sort) [after: all/first]"));
    assert!(!dir.path().join("out.txt").exists());
}

#[test]
fn run_manifest_pipeline() {
    let dir = workspace(MANIFEST);
    toolflow(dir.path())
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("demo completed"));

    let sorted = std::fs::read_to_string(dir.path().join("out.txt")).unwrap();
    assert_eq!(sorted, "apple\nfig\npear\n");
}

#[test]
fn run_single_tool_with_assignments() {
    let dir = workspace(MANIFEST);
    toolflow(dir.path())
        .args(["run", "sort", "-s", "input=in.txt", "-s", "output=sorted.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("DONE"));

    assert!(dir.path().join("sorted.txt").exists());
}

#[test]
fn run_reports_failed_job() {
    let dir = workspace(MANIFEST);
    toolflow(dir.path())
        .args(["run", "fail", "-s", "code=3"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("FAILED"));
}

#[test]
fn run_from_other_directory() {
    let dir = workspace(MANIFEST);
    let elsewhere = tempfile::tempdir().unwrap();
    toolflow(elsewhere.path())
        .arg("-C")
        .arg(dir.path())
        .args(["run", "sort-twice", "-s", "input=in.txt", "-s", "output=twice.txt"])
        .assert()
        .success();

    assert!(dir.path().join("twice.txt").exists());
}
