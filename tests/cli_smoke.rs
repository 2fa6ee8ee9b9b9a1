use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn auditreg_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("auditreg"))
}

fn cmd_with_home() -> (tempfile::TempDir, Command) {
    let home = tempfile::tempdir().expect("tempdir");
    let mut cmd = auditreg_cmd();
    cmd.env("AUDITREG_HOME", home.path());
    (home, cmd)
}

fn run_ok_out(home: &tempfile::TempDir, args: &[&str]) -> String {
    let mut cmd = auditreg_cmd();
    cmd.env("AUDITREG_HOME", home.path());
    cmd.args(args);
    let out = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(out).expect("utf8 stdout")
}

#[test]
fn cycle_for_early_day_starts_previous_month() {
    let (home, _cmd) = cmd_with_home();
    let out = run_ok_out(&home, &["cycle", "--date", "2024-03-10"]);
    assert!(out.contains("start\t2024-02-16"));
    assert!(out.contains("end\t2024-03-15"));
    assert!(out.contains("label\t16/02/2024 হতে 15/03/2024"));
    assert!(out.contains("previous\t16/01/2024 হতে 15/02/2024"));
}

#[test]
fn cycle_for_late_day_starts_this_month() {
    let (home, _cmd) = cmd_with_home();
    let out = run_ok_out(&home, &["cycle", "--date", "2024-03-20"]);
    assert!(out.contains("start\t2024-03-16"));
    assert!(out.contains("end\t2024-04-15"));
    assert!(out.contains("next\t16/04/2024 হতে 15/05/2024"));
}

#[test]
fn month_picker_accepts_bengali_digits_and_prints_localized_label() {
    let (home, _cmd) = cmd_with_home();
    let out = run_ok_out(&home, &["cycle", "--month", "২০২৪-০৪", "--bn"]);
    assert!(out.contains("start\t2024-03-16"));
    assert!(out.contains("label_bn\t১৬/০৩/২০২৪ হতে ১৫/০৪/২০২৪"));
}

#[test]
fn invalid_month_is_rejected() {
    let (_home, mut cmd) = cmd_with_home();
    cmd.args(["cycle", "--month", "2024-13"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Invalid month"));
}

#[test]
fn clerk_cannot_edit_opening_balance() {
    let (_home, mut cmd) = cmd_with_home();
    cmd.args(["baseline", "set", "Dhaka WASA", "--unsettled-count", "4"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("requires the admin role"));
}

#[test]
fn empty_entry_is_rejected() {
    let (_home, mut cmd) = cmd_with_home();
    cmd.args([
        "entry",
        "add",
        "--entity",
        "Dhaka WASA",
        "--ministry",
        "LGD",
        "--issue-date",
        "2024-03-20",
        "--raised-count",
        "০",
    ]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("at least one --para"));
}

#[test]
fn config_show_masks_api_key() {
    let (home, _cmd) = cmd_with_home();
    run_ok_out(
        &home,
        &[
            "config",
            "set-remote",
            "https://example.test",
            "--api-key",
            "secret-key",
        ],
    );
    let out = run_ok_out(&home, &["config", "show"]);
    assert!(out.contains("https://example.test"));
    assert!(out.contains("settlement_entries"));
    assert!(!out.contains("secret-key"));
}
