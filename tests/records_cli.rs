#![cfg(feature = "cli")]

mod common;

use callfix::{CallRecord, FsRecordStore, RecordKey, RecordStore};
use common::run_async;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_callfix-records"))
}

fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(binary())
        .arg("--dir")
        .arg(dir)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run callfix-records")
}

fn seed(dir: &Path, name: &str, count: u32) {
    let store = FsRecordStore::new(dir);
    for index in 1..=count {
        let key = RecordKey::new(name, index).expect("key");
        let record = CallRecord::success(json!([index]), json!(index * 2));
        run_async(store.save(&key, &record)).expect("save");
    }
}

#[test]
fn list_reports_fixtures_as_json() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    seed(temp_dir.path(), "div", 3);
    seed(temp_dir.path(), "fetch", 1);

    let output = run(temp_dir.path(), &["--json", "list"]);
    assert!(output.status.success());
    let listed: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(
        listed,
        json!([
            {"name": "div", "indices": [1, 2, 3]},
            {"name": "fetch", "indices": [1]},
        ])
    );

    let output = run(temp_dir.path(), &["list", "--name", "fetch"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("fetch (1 records): 1"), "{stdout}");
    assert!(!stdout.contains("div"), "{stdout}");
}

#[test]
fn verify_flags_malformed_and_non_canonical_records() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    seed(temp_dir.path(), "div", 1);
    assert!(run(temp_dir.path(), &["verify"]).status.success());

    std::fs::write(temp_dir.path().join("div-002.json"), "{\"args\": 1}").expect("write");
    std::fs::write(
        temp_dir.path().join("div-003.json"),
        r#"{"args":[],"result":{"success":true,"data":null}}"#,
    )
    .expect("write");

    let output = run(temp_dir.path(), &["--json", "verify"]);
    assert!(!output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(report["checked"], 3);
    let issues = report["issues"].as_array().expect("issues");
    assert_eq!(issues.len(), 2);
    assert_eq!(issues[0]["record"], "div-002.json");
    assert_eq!(issues[1]["record"], "div-003.json");
    assert!(issues[1]["error"].as_str().unwrap_or_default().contains("canonical"));
}

#[test]
fn prune_deletes_records_past_keep() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    seed(temp_dir.path(), "div", 4);

    let output = run(temp_dir.path(), &["prune", "--name", "div", "--keep", "2", "--dry-run"]);
    assert!(output.status.success());
    assert!(temp_dir.path().join("div-004.json").exists());

    let output = run(temp_dir.path(), &["prune", "--name", "div", "--keep", "2"]);
    assert!(output.status.success());
    let store = FsRecordStore::new(temp_dir.path());
    assert_eq!(run_async(store.list_indices("div")).expect("list"), vec![1, 2]);
}
