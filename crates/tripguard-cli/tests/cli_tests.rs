use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

struct Env {
    dir: TempDir,
    db: PathBuf,
    config: PathBuf,
}

impl Env {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let db = dir.path().join("state").join("tripguard.db");
        let config = dir.path().join("settings.json");
        let settings = serde_json::json!({
            "kdf": { "memory_cost": 1024, "time_cost": 1, "parallelism": 1 }
        });
        fs::write(&config, serde_json::to_vec_pretty(&settings).unwrap()).unwrap();
        Self { dir, db, config }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("tripguard").unwrap();
        cmd.env("TRIPGUARD_CONFIG", &self.config)
            .env("TRIPGUARD_PASSWORD", "hunter2 ")
            .env_remove("TRIPGUARD_DB")
            .arg("--db")
            .arg(&self.db);
        cmd
    }
}

#[test]
fn add_then_verify_reports_zero_failures() {
    let env = Env::new();
    let data = env.root().join("data");
    fs::create_dir(&data).unwrap();
    fs::write(data.join("a"), b"alpha").unwrap();

    env.cmd().arg("add").arg(&data).assert().success();
    env.cmd()
        .arg("verify")
        .assert()
        .success()
        .stdout(predicate::eq("0 failed checks\n"));
}

#[test]
fn verify_exits_non_zero_on_drift() {
    let env = Env::new();
    let file = env.root().join("f");
    fs::write(&file, b"12345").unwrap();

    env.cmd()
        .args(["add", "--filechecks", "size"])
        .arg(&file)
        .assert()
        .success();
    fs::write(&file, b"123456789").unwrap();

    env.cmd()
        .arg("verify")
        .arg(&file)
        .assert()
        .failure()
        .stdout(predicate::eq("1 failed checks\n"))
        .stderr(predicate::str::contains("expected 5 actual 9"));
}

#[test]
fn duplicate_add_fails_and_rolls_back() {
    let env = Env::new();
    let one = env.root().join("one");
    let two = env.root().join("two");
    fs::write(&one, b"1").unwrap();
    fs::write(&two, b"2").unwrap();

    env.cmd().arg("add").arg(&one).assert().success();
    env.cmd()
        .arg("add")
        .arg(&two)
        .arg(&one)
        .assert()
        .failure()
        .stderr(predicate::str::contains("record exists"));

    // "two" was part of the failed batch and must not have been kept.
    env.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("one"))
        .stdout(predicate::str::contains(two.display().to_string()).not());

    env.cmd()
        .args(["add", "--skip"])
        .arg(&two)
        .arg(&one)
        .assert()
        .success();
}

#[test]
fn unknown_check_is_rejected_before_any_work() {
    let env = Env::new();
    let file = env.root().join("f");
    fs::write(&file, b"x").unwrap();

    env.cmd()
        .args(["add", "--filechecks", "size,crc32"])
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown check \"crc32\""));
}

#[test]
fn reserved_fileset_names_are_refused() {
    let env = Env::new();
    env.cmd()
        .args(["list", "--fileset", "_signatures"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("underscore prefix reserved"));
}

#[test]
fn filesets_can_be_copied_listed_and_deleted() {
    let env = Env::new();
    let file = env.root().join("f");
    fs::write(&file, b"x").unwrap();

    env.cmd()
        .args(["add", "--fileset", "etc"])
        .arg(&file)
        .assert()
        .success();
    env.cmd()
        .args(["copyset", "--fileset", "etc", "etc-copy"])
        .assert()
        .success();
    env.cmd()
        .arg("listsets")
        .assert()
        .success()
        .stdout(predicate::eq("etc\netc-copy\n"));
    env.cmd()
        .args(["deleteset", "--fileset", "etc"])
        .assert()
        .success();
    env.cmd()
        .arg("listsets")
        .assert()
        .success()
        .stdout(predicate::eq("etc-copy\n"));
}

#[test]
fn sign_and_verify_signature() {
    let env = Env::new();
    let file = env.root().join("f");
    fs::write(&file, b"x").unwrap();

    env.cmd().arg("add").arg(&file).assert().success();
    env.cmd().arg("sign").assert().success();
    env.cmd()
        .arg("sign")
        .assert()
        .failure()
        .stderr(predicate::str::contains("exists"));
    // Surrounding whitespace is not part of the password.
    env.cmd()
        .arg("verifysig")
        .env("TRIPGUARD_PASSWORD", "hunter2")
        .assert()
        .success();
    env.cmd()
        .arg("verifysig")
        .env("TRIPGUARD_PASSWORD", "hunter3")
        .assert()
        .failure()
        .stderr(predicate::str::contains("wrong password or tampered"));
}

#[test]
fn tampered_database_fails_signature_check() {
    let env = Env::new();
    let file = env.root().join("f");
    fs::write(&file, b"x").unwrap();

    env.cmd().arg("add").arg(&file).assert().success();
    env.cmd().arg("sign").assert().success();

    let conn = rusqlite::Connection::open(&env.db).unwrap();
    conn.execute("UPDATE records SET value = value || X'0a'", [])
        .unwrap();
    drop(conn);

    env.cmd()
        .arg("verifysig")
        .assert()
        .failure()
        .stderr(predicate::str::contains("contents changed or tampered"));
}

#[test]
fn unsigned_fileset_reports_missing_signature() {
    let env = Env::new();
    let file = env.root().join("f");
    fs::write(&file, b"x").unwrap();

    env.cmd().arg("add").arg(&file).assert().success();
    env.cmd()
        .arg("verifysig")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not added or tampered"));
}
