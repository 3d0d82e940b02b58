//! Exercises the `adw` binary's `--dry-run` path, which must never touch
//! git or the database -- it only has to resolve and print a
//! `WorkflowConfig`.

use assert_cmd::Command;

#[test]
fn dry_run_with_stages_prints_resolved_config_and_exits_zero() {
    let mut cmd = Command::cargo_bin("adw").unwrap();
    cmd.args(["42", "--stages", "plan,build", "--dry-run"]);
    let output = cmd.assert().success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("dynamic_plan_build"));
    assert!(stdout.contains("\"plan\""));
    assert!(stdout.contains("\"build\""));
}

#[test]
fn missing_stage_selector_exits_nonzero() {
    let mut cmd = Command::cargo_bin("adw").unwrap();
    cmd.arg("42");
    cmd.assert().failure().code(1);
}

#[test]
fn empty_stages_list_exits_nonzero() {
    let mut cmd = Command::cargo_bin("adw").unwrap();
    cmd.args(["42", "--stages", "  ,  ", "--dry-run"]);
    cmd.assert().failure().code(1);
}
