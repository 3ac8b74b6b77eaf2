use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn blobchain() -> Command {
    Command::cargo_bin("blobchain").expect("binary is built")
}

#[test]
fn genesis_reports_pre_mined_hash() {
    blobchain()
        .arg("genesis")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"nonce\": 23833"))
        .stdout(predicate::str::contains("000030cd"));
}

#[test]
fn mine_then_inspect() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("chain.bin");

    blobchain()
        .args(["mine", "--difficulty", "4", "--per-block", "2"])
        .args(["--blob", "a", "--blob", "b", "--blob", "c"])
        .arg("--out")
        .arg(&path)
        .assert()
        .success();

    let output = blobchain()
        .arg("inspect")
        .arg("--input")
        .arg(&path)
        .output()?;
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["length"], 3);
    assert_eq!(report["valid"], true);
    assert_eq!(report["complete"], true);
    assert_eq!(report["distinct_blobs"], 3);
    Ok(())
}

#[test]
fn headers_only_chain_is_incomplete() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("skeleton.bin");

    blobchain()
        .args(["mine", "--difficulty", "4", "--blob", "x", "--headers-only"])
        .arg("--out")
        .arg(&path)
        .assert()
        .success();

    blobchain()
        .args(["inspect", "--headers-only", "--input"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"valid\": true"))
        .stdout(predicate::str::contains("\"complete\": false"));
    Ok(())
}

#[test]
fn inspect_rejects_garbage() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("junk.bin");
    std::fs::write(&path, [0xFF, 0xFF])?;

    blobchain()
        .arg("inspect")
        .arg("--input")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("decoding"));
    Ok(())
}
