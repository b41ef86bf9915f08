use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::predicate;

fn create_sketch(path: &Path, values: &[&str], extra: &[&str]) -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("kmh")?;
    cmd.arg("create")
        .args(extra)
        .arg("-o")
        .arg(path)
        .args(values);
    cmd.assert().success();
    Ok(())
}

fn cardinality_of(path: &Path) -> Result<f64, Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("kmh")?;
    cmd.arg("cardinality").arg(path);
    let output = cmd.output()?;
    assert!(output.status.success());
    let estimates: serde_json::Value = serde_json::from_reader(Cursor::new(output.stdout))?;
    let key = path.to_str().ok_or("non-utf8 path")?;
    estimates[key].as_f64().ok_or_else(|| "missing estimate".into())
}

#[test]
fn file_doesnt_exist() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("kmh")?;
    cmd.arg("info").arg("test/file/doesnt/exist.kmh");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Error opening"));

    Ok(())
}

#[test]
fn kmh_create_binary() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("kmh")?;
    cmd.arg("create").arg("-O").args(&["1", "2", "3"]);
    cmd.assert().success();

    let output = cmd.output()?.stdout;
    assert_eq!(output.len(), 16 + 3 * 4);
    // capacity 400, count 3, space size u32::MAX, seed 42
    assert_eq!(
        &output[..16],
        &[0x90u8, 0x01, 0, 0, 3, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF, 42, 0, 0, 0]
    );
    Ok(())
}

#[test]
fn kmh_create_json() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("kmh")?;
    cmd.arg("create")
        .args(&["-k", "10", "--space-size", "1000", "--seed", "7"])
        .args(&["-j", "-O"])
        .args(&["5", "-6", "seven", "8"]);
    cmd.assert().success();

    let output = Cursor::new(cmd.output()?.stdout);
    let sketch: serde_json::Value = serde_json::from_reader(output)?;
    assert_eq!(sketch["capacity"], 10);
    assert_eq!(sketch["spaceSize"], 1000);
    assert_eq!(sketch["seed"], 7);
    assert_eq!(sketch["cardinality"], 3.0);
    let digests = sketch["digests"].as_array().ok_or("digests missing")?;
    assert_eq!(digests.len(), 3);
    assert!(digests.iter().all(|d| d.as_u64().map_or(false, |d| d < 1000)));
    Ok(())
}

#[test]
fn kmh_create_needs_output() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("kmh")?;
    cmd.arg("create").arg("1");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Specify an output file"));

    let mut cmd = Command::cargo_bin("kmh")?;
    cmd.arg("create").args(&["-k", "0", "-O"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("invalid sketch parameters"));

    let mut cmd = Command::cargo_bin("kmh")?;
    cmd.arg("create").args(&["-k", "4000000000", "-O"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("capacity must be at most 10240"));
    Ok(())
}

#[test]
fn kmh_add_and_cardinality() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let base = dir.path().join("base.kmh");
    let added = dir.path().join("added.kmh");
    create_sketch(&base, &["10", "20"], &[])?;
    assert_eq!(cardinality_of(&base)?, 2.0);

    let mut cmd = Command::cargo_bin("kmh")?;
    cmd.arg("add").arg(&base).arg("30").arg("-o").arg(&added);
    cmd.assert().success();
    assert_eq!(cardinality_of(&added)?, 3.0);

    // re-adding a present value changes nothing
    let mut cmd = Command::cargo_bin("kmh")?;
    cmd.arg("add").arg(&added).arg("10").arg("-O");
    let output = cmd.output()?;
    assert!(output.status.success());
    assert_eq!(output.stdout, fs::read(&added)?);
    Ok(())
}

#[test]
fn kmh_merge() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let first = dir.path().join("first.kmh");
    let second = dir.path().join("second.kmh");
    let merged = dir.path().join("merged.kmh");
    create_sketch(&first, &["1", "2", "3"], &[])?;
    create_sketch(&second, &["3", "4"], &[])?;

    let mut cmd = Command::cargo_bin("kmh")?;
    cmd.arg("merge")
        .arg(&first)
        .arg(&second)
        .arg("-o")
        .arg(&merged);
    cmd.assert().success();
    assert_eq!(cardinality_of(&merged)?, 4.0);
    Ok(())
}

#[test]
fn kmh_merge_incompatible() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let first = dir.path().join("first.kmh");
    let second = dir.path().join("second.kmh");
    create_sketch(&first, &["1"], &[])?;
    create_sketch(&second, &["1"], &["--seed", "9"])?;

    let mut cmd = Command::cargo_bin("kmh")?;
    cmd.arg("merge").arg(&first).arg(&second).arg("-O");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("hash seed"));
    Ok(())
}

#[test]
fn kmh_dist() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let first = dir.path().join("first.kmh");
    let second = dir.path().join("second.kmh");
    create_sketch(&first, &["1", "2", "3"], &[])?;
    create_sketch(&second, &["1", "2", "3"], &[])?;

    let mut cmd = Command::cargo_bin("kmh")?;
    cmd.arg("dist").arg(&first).arg(&second);
    let output = cmd.output()?;
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_reader(Cursor::new(output.stdout))?;
    assert_eq!(report["distance"], 0.0);
    assert_eq!(report["jaccard"], 1.0);
    assert_eq!(report["matches"], 3);
    Ok(())
}

#[test]
fn kmh_info_reads_binary_and_json() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let binary = dir.path().join("sketch.kmh");
    let json = dir.path().join("sketch.json");
    create_sketch(&binary, &["1", "2"], &[])?;
    create_sketch(&json, &["1", "2"], &["-j"])?;

    let mut cmd = Command::cargo_bin("kmh")?;
    cmd.arg("info").arg(&binary).arg(&json);
    let output = cmd.output()?;
    assert!(output.status.success());
    let info: serde_json::Value = serde_json::from_reader(Cursor::new(output.stdout))?;
    let info = info.as_array().ok_or("expected a list")?;
    assert_eq!(info.len(), 2);
    assert_eq!(info[0]["digests"], info[1]["digests"]);
    assert_eq!(info[0]["capacity"], 400);
    assert_eq!(info[1]["cardinality"], 2.0);

    assert_eq!(cardinality_of(&json)?, 2.0);
    Ok(())
}

#[test]
fn kmh_cardinality_rejects_garbage() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let garbage = dir.path().join("garbage.kmh");
    fs::write(&garbage, b"not a sketch")?;

    let mut cmd = Command::cargo_bin("kmh")?;
    cmd.arg("cardinality").arg(&garbage);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("is not a valid sketch"));
    Ok(())
}

#[test]
fn kmh_info_rejects_oversized_json() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let oversized = dir.path().join("oversized.json");
    fs::write(
        &oversized,
        r#"{"capacity":4000000000,"spaceSize":1000,"seed":42,"digests":[]}"#,
    )?;

    let mut cmd = Command::cargo_bin("kmh")?;
    cmd.arg("info").arg(&oversized);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("above the limit"));
    Ok(())
}
