//! Integration tests for the `nornflow` CLI binary, run end to end against
//! real workflow/inventory YAML files in a temp directory.
//!
//! Grounded on the teacher's `tests/cli_tests.rs` (`assert_cmd` driving the
//! built binary, `tempfile::TempDir` for scratch fixtures, `predicates` for
//! output assertions) generalized from Nika's rule/workflow fixture shape
//! to NornFlow's workflow/inventory fixture shape.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn nornflow_cmd() -> Command {
    Command::cargo_bin("nornflow").unwrap()
}

fn write_inventory(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("inventory.yaml");
    fs::write(
        &path,
        r#"
hosts:
  r1:
    platform: ios
    groups: [core]
  r2:
    platform: ios
    groups: [core]
groups:
  core:
    data:
      region: us-east
"#,
    )
    .unwrap();
    path
}

fn write_workflow(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("workflow.yaml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_help_flag() {
    nornflow_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Workflow engine"));
}

#[test]
fn test_list_tasks() {
    nornflow_cmd()
        .arg("list-tasks")
        .assert()
        .success()
        .stdout(predicate::str::contains("set"))
        .stdout(predicate::str::contains("echo"))
        .stdout(predicate::str::contains("write_file"));
}

#[test]
fn test_validate_valid_workflow() {
    let temp = TempDir::new().unwrap();
    let inventory = write_inventory(temp.path());
    let workflow = write_workflow(
        temp.path(),
        r#"
workflow:
  name: smoke-test
  tasks:
    - name: echo
      args:
        msg: "hi {{ host.name }}"
"#,
    );

    nornflow_cmd()
        .arg("validate")
        .arg(&workflow)
        .arg("--inventory")
        .arg(&inventory)
        .assert()
        .success()
        .stdout(predicate::str::contains("valid"));
}

#[test]
fn test_validate_rejects_unknown_task() {
    let temp = TempDir::new().unwrap();
    let inventory = write_inventory(temp.path());
    let workflow = write_workflow(
        temp.path(),
        r#"
workflow:
  name: bad
  tasks:
    - name: does_not_exist
"#,
    );

    nornflow_cmd()
        .arg("validate")
        .arg(&workflow)
        .arg("--inventory")
        .arg(&inventory)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("task not found"));
}

#[test]
fn test_run_executes_workflow_across_hosts() {
    let temp = TempDir::new().unwrap();
    let inventory = write_inventory(temp.path());
    let workflow = write_workflow(
        temp.path(),
        r#"
workflow:
  name: backup
  tasks:
    - name: echo
      args:
        msg: "hi {{ host.name }}"
"#,
    );

    nornflow_cmd()
        .arg("run")
        .arg(&workflow)
        .arg("--inventory")
        .arg(&inventory)
        .assert()
        .success()
        .stdout(predicate::str::contains("backup"))
        .stdout(predicate::str::contains("ok"));
}

#[test]
fn test_run_dry_run_flag_avoids_file_writes() {
    let temp = TempDir::new().unwrap();
    let inventory = write_inventory(temp.path());
    let target = temp.path().join("out").join("report.txt");
    let workflow = write_workflow(
        temp.path(),
        &format!(
            r#"
workflow:
  name: report
  inventory_filters:
    hosts: [r1]
  tasks:
    - name: write_file
      args:
        filename: "{}"
        content: "hello"
"#,
            target.to_str().unwrap().replace('\\', "\\\\")
        ),
    );

    nornflow_cmd()
        .arg("run")
        .arg(&workflow)
        .arg("--inventory")
        .arg(&inventory)
        .arg("--dry-run")
        .assert()
        .success();

    assert!(!target.exists());
}

#[test]
fn test_run_reports_failure_exit_code() {
    let temp = TempDir::new().unwrap();
    let inventory = write_inventory(temp.path());
    let workflow = write_workflow(
        temp.path(),
        r#"
workflow:
  name: missing-arg
  tasks:
    - name: echo
"#,
    );

    nornflow_cmd()
        .arg("run")
        .arg(&workflow)
        .arg("--inventory")
        .arg(&inventory)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("failed"));
}

#[test]
fn test_run_reports_skipped_tasks_after_stop_on_first_error() {
    let temp = TempDir::new().unwrap();
    let inventory = write_inventory(temp.path());
    let workflow = write_workflow(
        temp.path(),
        r#"
workflow:
  name: halts-early
  failure_strategy: stop_on_first_error
  tasks:
    - name: echo
    - name: echo
      args:
        msg: "should not run"
"#,
    );

    nornflow_cmd()
        .arg("run")
        .arg(&workflow)
        .arg("--inventory")
        .arg(&inventory)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("skipped"));
}

#[test]
fn test_run_with_cli_var_override() {
    let temp = TempDir::new().unwrap();
    let inventory = write_inventory(temp.path());
    let workflow = write_workflow(
        temp.path(),
        r#"
workflow:
  name: cli-var-test
  vars:
    greeting: workflow-default
  tasks:
    - name: echo
      args:
        msg: "{{ greeting }}"
"#,
    );

    nornflow_cmd()
        .arg("run")
        .arg(&workflow)
        .arg("--inventory")
        .arg(&inventory)
        .arg("--var")
        .arg("greeting=cli-override")
        .assert()
        .success();
}
