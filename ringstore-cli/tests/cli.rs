use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn cmd() -> Command {
    Command::cargo_bin("ringstorectl").unwrap()
}

#[test]
fn open_creates_a_holstore() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    let url = format!("hol:{},anything", path.display());

    cmd().arg("open").arg(&url).assert().success().stdout(predicate::str::contains("opened hol route"));
    assert!(path.exists());
}

#[test]
fn put_then_get_round_trips_through_a_ts_route() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    let url = format!("ts:{},events", path.display());

    cmd().arg("put").arg(&url).arg("hello world").assert().success().stdout(predicate::str::contains("wrote record 0"));

    cmd()
        .arg("get")
        .arg(&url)
        .arg("--count")
        .arg("1")
        .assert()
        .success()
        .stdout(predicate::str::contains("hello world"));
}

#[test]
fn tell_reports_an_empty_ring() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    let url = format!("ts:{},events", path.display());

    cmd().arg("open").arg(&url).assert().success();
    cmd().arg("tell").arg(&url).assert().success().stdout(predicate::str::contains("latest=none"));
}

#[test]
fn access_fails_against_a_missing_ring() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    cmd().arg("open").arg(format!("hol:{},k", path.display())).assert().success();

    cmd().arg("access").arg(format!("ts:{},absent", path.display())).assert().failure();
}

#[test]
fn malformed_url_is_rejected() {
    cmd().arg("tell").arg("not-a-route").assert().failure();
}
