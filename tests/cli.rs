use assert_cmd::prelude::*;
use predicates::str::contains;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

fn content() -> NamedTempFile {
    let mut tmp = NamedTempFile::new().expect("temp content");
    tmp.write_all(&[0u8; 16]).expect("write content");
    tmp
}

#[test]
fn missing_arguments_print_usage() {
    let mut cmd = Command::cargo_bin("retros").expect("binary exists");
    cmd.assert()
        .failure()
        .code(1)
        .stderr(contains("Usage: retros <core> <content>"));
}

#[test]
fn unknown_flag_is_rejected() {
    let content = content();
    let mut cmd = Command::cargo_bin("retros").expect("binary exists");
    cmd.arg("core.so").arg(content.path()).arg("--turbo");
    cmd.assert()
        .failure()
        .code(1)
        .stderr(contains("Unknown argument: --turbo"));
}

#[test]
fn unloadable_core_exits_with_status_one() {
    let content = content();
    let mut cmd = Command::cargo_bin("retros").expect("binary exists");
    cmd.arg("/nonexistent/core_libretro.so")
        .arg(content.path())
        .arg("--headless");
    cmd.assert()
        .failure()
        .code(1)
        .stderr(contains("failed to load core /nonexistent/core_libretro.so"));
}

#[test]
fn file_that_is_not_a_core_is_refused() {
    let rom = content();
    let fake_core = content();
    let mut cmd = Command::cargo_bin("retros").expect("binary exists");
    cmd.arg(fake_core.path())
        .arg(rom.path())
        .arg("--headless")
        .arg("--frames")
        .arg("1");
    cmd.assert().failure().code(1).stderr(contains("Error:"));
}
