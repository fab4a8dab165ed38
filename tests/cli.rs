//! Tests for the pipe-run binary.

use std::fs;
use std::path::Path;
use std::process::Command;

fn fixture_path(name: &str) -> String {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("specs")
        .join(name)
        .to_string_lossy()
        .into_owned()
}

fn pipe_run() -> Command {
    Command::new(env!("CARGO_BIN_EXE_pipe-run"))
}

#[test]
fn test_writes_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("nested").join("out.jsonl");

    let status = pipe_run()
        .arg(fixture_path("hello-pipes.json"))
        .arg(fixture_path("items.jsonl"))
        .arg("-o")
        .arg(&out_path)
        .status()
        .unwrap();
    assert!(status.success());

    let output = fs::read_to_string(&out_path).unwrap();
    assert_eq!(output.lines().count(), 6);
    assert!(output.lines().next().unwrap().contains("\"title\":\"Hello Pipes\""));
}

#[test]
fn test_async_flag_matches_sync() {
    let sync = pipe_run()
        .arg(fixture_path("multi-field.json"))
        .arg(fixture_path("items.jsonl"))
        .output()
        .unwrap();
    let async_out = pipe_run()
        .arg(fixture_path("multi-field.json"))
        .arg(fixture_path("items.jsonl"))
        .arg("--async")
        .output()
        .unwrap();
    assert!(sync.status.success());
    assert!(async_out.status.success());
    assert_eq!(sync.stdout, async_out.stdout);
}

#[test]
fn test_verbose_reports_counts() {
    let output = pipe_run()
        .arg(fixture_path("empty-rules.json"))
        .arg(fixture_path("items.jsonl"))
        .arg("-v")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("6 in -> 6 out"), "{stderr}");
}

#[test]
fn test_bad_pipeline_fails() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = dir.path().join("bad.json");
    fs::write(&pipeline, r#"[{"module": "nope"}]"#).unwrap();

    let output = pipe_run()
        .arg(&pipeline)
        .arg(fixture_path("items.jsonl"))
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unknown module 'nope'"), "{stderr}");
}

#[test]
fn test_missing_input_file() {
    let output = pipe_run()
        .arg(fixture_path("hello-pipes.json"))
        .arg("/definitely/not/here.jsonl")
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error reading input file"));
}
