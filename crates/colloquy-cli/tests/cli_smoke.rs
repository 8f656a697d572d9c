use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn init_writes_a_runnable_sample_batch() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("batch.yaml");

    Command::cargo_bin("colloquy")
        .unwrap()
        .args(["init", path.to_str().unwrap()])
        .assert()
        .success()
        .stderr(predicate::str::contains("wrote sample batch"));

    // The sample uses the fake provider, so it runs offline end to end.
    Command::cargo_bin("colloquy")
        .unwrap()
        .args(["run", path.to_str().unwrap()])
        .assert()
        .success()
        .stderr(predicate::str::contains("Summary:"))
        .stderr(predicate::str::contains("1 completed, 0 failed"));
}

#[test]
fn run_rejects_a_missing_batch_file() {
    Command::cargo_bin("colloquy")
        .unwrap()
        .args(["run", "/no/such/batch.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read batch"));
}
