//! Smoke tests for the `pf` binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn pf(dir: &Path) -> Command {
    let config = dir.join("promptforge.yml");
    if !config.exists() {
        let yaml = format!("library: {}\n", dir.join("library.json").display());
        fs::write(&config, yaml).unwrap();
    }

    let mut cmd = Command::cargo_bin("pf").unwrap();
    cmd.env("NO_COLOR", "1").arg("--config").arg(&config);
    cmd
}

#[test]
fn test_build_library_and_compose() {
    let temp = TempDir::new().unwrap();

    pf(temp.path())
        .args(["add-character", "Alice", "--gender", "female"])
        .assert()
        .success();
    pf(temp.path())
        .args(["add-tag", "smile", "--purpose", "expression", "--part", "smiling"])
        .assert()
        .success();
    pf(temp.path())
        .args(["add-lora", "styleX", "--weight", "0.8"])
        .assert()
        .success();

    pf(temp.path())
        .args(["compose", "Alice", "-", "smile", "styleX"])
        .assert()
        .success()
        .stdout(predicate::str::contains("smiling, <lora:styleX:0.8>, "))
        .stdout(predicate::str::contains("Alice_1"));

    // Usage count was persisted
    pf(temp.path())
        .args(["compose", "Alice", "smile"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Alice_2"));

    let library = fs::read_to_string(temp.path().join("library.json")).unwrap();
    assert!(library.contains("\"usage_count\": 2"));
}

#[test]
fn test_incompatible_tags_rejected() {
    let temp = TempDir::new().unwrap();

    pf(temp.path())
        .args(["add-character", "Alice", "--gender", "female"])
        .assert()
        .success();
    pf(temp.path())
        .args(["add-tag", "smile", "--part", "smiling"])
        .assert()
        .success();
    pf(temp.path())
        .args(["add-tag", "sad", "--part", "crying", "--incompatible", "smile"])
        .assert()
        .success();

    pf(temp.path())
        .args(["compose", "Alice", "smile", "sad"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("incompatible"));
}

#[test]
fn test_show_lists_reachable_names() {
    let temp = TempDir::new().unwrap();

    pf(temp.path())
        .args(["add-tag", "smile", "--part", "smiling"])
        .assert()
        .success();
    pf(temp.path())
        .args(["add-tag", "happy", "--ref", "smile:1.2"])
        .assert()
        .success();

    pf(temp.path())
        .args(["show", "happy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tag:smile"))
        .stdout(predicate::str::contains("happy, smile"));
}

#[test]
fn test_unknown_element_fails() {
    let temp = TempDir::new().unwrap();

    pf(temp.path())
        .args(["compose", "Nobody"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown element: Nobody"));
}
