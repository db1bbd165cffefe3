#![allow(deprecated)]
use ante_core::objects::ObjectKind;
use ante_core::store::{BlobKind, Store};
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;

fn ante(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("ante").unwrap();
    cmd.current_dir(dir.path())
        .env("ANTE_CONFIG", dir.path().join("ante.yaml"));
    cmd
}

/// Write a config pointing the store (and save file) into `dir`.
fn configure(dir: &TempDir) {
    let yaml = format!(
        "db_path: {}\ngame:\n  save_path: {}\n",
        dir.path().join("ante.redb").display(),
        dir.path().join("save.jkr").display()
    );
    std::fs::write(dir.path().join("ante.yaml"), yaml).unwrap();
}

/// Open the store, seed it, and close it again before the binary runs.
fn seed<F: FnOnce(&Store)>(dir: &TempDir, f: F) {
    let store = Store::open(&dir.path().join("ante.redb")).unwrap();
    f(&store);
}

fn seeded_run(dir: &TempDir) -> String {
    let mut run_id = String::new();
    seed(dir, |store| {
        let run = store.create_run("gemini").unwrap();
        store.set_current_run(&run.run_id).unwrap();
        store.record_seed(&run.run_id, "SEED1").unwrap();
        for turn in 0..3 {
            store
                .save_state(
                    &run.run_id,
                    turn,
                    json!({"game_state": {"state": "SHOP", "ante": 1}, "state_string": "", "prompt": ""}),
                    "SHOP",
                    Some(1),
                )
                .unwrap();
            store
                .save_reply(
                    &run.run_id,
                    turn,
                    json!({"action": "reroll_shop", "positions": [], "reasoning": "look for jokers"}),
                )
                .unwrap();
        }
        store
            .save_blob(&run.run_id, 1, BlobKind::Save, b"save-at-1")
            .unwrap();
        run_id = run.run_id;
    });
    run_id
}

// ---------------------------------------------------------------------------
// runs / history
// ---------------------------------------------------------------------------

#[test]
fn runs_empty_store() {
    let dir = TempDir::new().unwrap();
    configure(&dir);
    ante(&dir)
        .arg("runs")
        .assert()
        .success()
        .stdout(predicate::str::contains("No runs."));
}

#[test]
fn runs_lists_seeded_run() {
    let dir = TempDir::new().unwrap();
    configure(&dir);
    let run_id = seeded_run(&dir);

    ante(&dir)
        .arg("runs")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("{run_id}*")))
        .stdout(predicate::str::contains("SEED1"))
        .stdout(predicate::str::contains("active"));
}

#[test]
fn runs_json_output() {
    let dir = TempDir::new().unwrap();
    configure(&dir);
    let run_id = seeded_run(&dir);

    let output = ante(&dir).args(["runs", "--json"]).output().unwrap();
    assert!(output.status.success());
    let runs: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(runs[0]["run_id"], run_id.as_str());
}

#[test]
fn history_shows_actions() {
    let dir = TempDir::new().unwrap();
    configure(&dir);
    let run_id = seeded_run(&dir);

    ante(&dir)
        .args(["history", &run_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("reroll_shop"))
        .stdout(predicate::str::contains("look for jokers"));
}

#[test]
fn history_unknown_run_fails() {
    let dir = TempDir::new().unwrap();
    configure(&dir);
    ante(&dir)
        .args(["history", "deadbeef"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("deadbeef"));
}

// ---------------------------------------------------------------------------
// notes
// ---------------------------------------------------------------------------

#[test]
fn notes_list_and_filter() {
    let dir = TempDir::new().unwrap();
    configure(&dir);
    seed(&dir, |store| {
        store.write_note("Baron", ObjectKind::Joker, "Kings held.").unwrap();
        store
            .write_note("Overstock", ObjectKind::Voucher, "Extra shop slot.")
            .unwrap();
    });

    ante(&dir)
        .arg("notes")
        .assert()
        .success()
        .stdout(predicate::str::contains("Baron"))
        .stdout(predicate::str::contains("Overstock"));

    ante(&dir)
        .args(["notes", "--kind", "voucher"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Overstock"))
        .stdout(predicate::str::contains("Baron").not());
}

#[test]
fn note_history_lists_versions() {
    let dir = TempDir::new().unwrap();
    configure(&dir);
    seed(&dir, |store| {
        store.write_note("Baron", ObjectKind::Joker, "first").unwrap();
        store.write_note("Baron", ObjectKind::Joker, "second").unwrap();
    });

    ante(&dir)
        .args(["note", "joker", "Baron"])
        .assert()
        .success()
        .stdout(predicate::str::contains("second"))
        .stdout(predicate::str::contains("first").not());

    ante(&dir)
        .args(["note", "joker", "Baron", "--history"])
        .assert()
        .success()
        .stdout(predicate::str::contains("v2"))
        .stdout(predicate::str::contains("v1"));
}

#[test]
fn note_unknown_kind_fails() {
    let dir = TempDir::new().unwrap();
    configure(&dir);
    ante(&dir)
        .args(["note", "gadget", "Baron"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("gadget"));
}

// ---------------------------------------------------------------------------
// continue / purge
// ---------------------------------------------------------------------------

#[test]
fn continue_restores_save_and_truncates() {
    let dir = TempDir::new().unwrap();
    configure(&dir);
    let run_id = seeded_run(&dir);

    ante(&dir)
        .args(["continue", &run_id, "1"])
        .assert()
        .success();

    assert_eq!(std::fs::read(dir.path().join("save.jkr")).unwrap(), b"save-at-1");
    let store = Store::open(&dir.path().join("ante.redb")).unwrap();
    assert_eq!(store.next_turn(&run_id).unwrap(), 1);
}

#[test]
fn continue_without_snapshot_fails() {
    let dir = TempDir::new().unwrap();
    configure(&dir);
    let run_id = seeded_run(&dir);

    ante(&dir)
        .args(["continue", &run_id, "2"])
        .assert()
        .failure();
}

#[test]
fn purge_removes_run() {
    let dir = TempDir::new().unwrap();
    configure(&dir);
    let run_id = seeded_run(&dir);

    ante(&dir)
        .args(["purge", &run_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("purged"));

    let store = Store::open(&dir.path().join("ante.redb")).unwrap();
    assert!(store.run(&run_id).unwrap().is_none());
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

#[test]
fn invalid_config_is_reported() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("ante.yaml"), "analysis:\n  workers: 0\n").unwrap();
    ante(&dir)
        .arg("runs")
        .assert()
        .failure()
        .stderr(predicate::str::contains("analysis.workers"));
}
