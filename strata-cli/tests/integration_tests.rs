//! Integration tests for the Strata CLI
//!
//! Tests end-to-end command behavior using the CLI binary.
//! Uses tempfile for isolated test directories.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

/// Get the path to the strata binary (built by cargo)
fn strata_binary() -> Command {
    Command::new(env!("CARGO_BIN_EXE_strata"))
}

/// Run strata with the given args in the specified directory
fn run_strata(dir: &Path, args: &[&str]) -> Output {
    strata_binary()
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .env_remove("STRATA_CONFIG")
        .args(args)
        .output()
        .expect("Failed to execute strata command")
}

/// Get stdout as string
fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Get stderr as string
fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

/// Parse stdout of a `--format json` invocation
fn json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        stderr(output)
    );
    serde_json::from_str(&stdout(output)).expect("stdout is not JSON")
}

/// Workspace with a local `strata.toml` and `tree/root/sub/b.txt`
fn setup_workspace() -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(
        dir.path().join("strata.toml"),
        "[output]\ndata_dir = \"out\"\nfile_prefix = \"test\"\n",
    )
    .unwrap();
    fs::create_dir_all(dir.path().join("tree/root/sub")).unwrap();
    fs::write(dir.path().join("tree/root/sub/b.txt"), b"hello").unwrap();
    dir
}

fn write_listing(dir: &Path) {
    let listing = serde_json::json!([
        {"ObjectIdentifier": "0d5bd7c4-4d3e-4bb4-b5b4-8f8e9c3a1f10", "path_display": "/Docs", ".tag": "folder"},
        {"ObjectIdentifier": "8e0f3f0a-2b1c-4d7e-9a6b-5c4d3e2f1a0b", "path_display": "/Docs/report.pdf",
         ".tag": "file", "size": 2048, "client_modified": "2024-03-01T09:00:00Z"}
    ]);
    fs::write(dir.join("listing.json"), listing.to_string()).unwrap();
}

// ============================================================================
// Help and usage
// ============================================================================

#[test]
fn test_help_lists_commands() {
    let dir = setup_workspace();
    let output = run_strata(dir.path(), &["--help"]);
    assert!(output.status.success());
    let out = stdout(&output);
    for command in ["index", "import", "ingest", "run", "codec"] {
        assert!(out.contains(command), "missing {} in help", command);
    }
}

#[test]
fn test_no_command_prints_help() {
    let dir = setup_workspace();
    let output = run_strata(dir.path(), &[]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Usage"));
}

// ============================================================================
// Pipeline commands
// ============================================================================

#[test]
fn test_run_emits_objects_edges_and_descriptor() {
    let dir = setup_workspace();
    let output = run_strata(dir.path(), &["--format", "json", "run", "tree/root"]);
    let summary = json(&output);

    let counters = &summary["ingest"]["counters"];
    assert_eq!(counters["dir_count"], 2);
    assert_eq!(counters["file_count"], 1);
    assert_eq!(counters["edge_count"], 4);
    // The walk start's real parent is outside the batch.
    assert_eq!(counters["orphan_count"], 1);
    assert_eq!(counters["output_count"], 3);

    let descriptor = summary["ingest"]["descriptor_file"].as_str().unwrap();
    assert!(dir.path().join(descriptor).exists());

    let relationships = summary["ingest"]["relationships_file"].as_str().unwrap();
    let edges = fs::read_to_string(dir.path().join(relationships)).unwrap();
    assert_eq!(edges.lines().count(), 4);
}

#[test]
fn test_sequential_walk_matches_parallel_counts() {
    let dir = setup_workspace();
    let parallel = json(&run_strata(dir.path(), &["--format", "json", "run", "tree/root"]));
    let sequential = json(&run_strata(
        dir.path(),
        &["--format", "json", "run", "tree/root", "-j", "1"],
    ));
    assert_eq!(
        parallel["ingest"]["counters"],
        sequential["ingest"]["counters"]
    );
}

#[test]
fn test_index_then_ingest() {
    let dir = setup_workspace();
    let index = json(&run_strata(
        dir.path(),
        &["--format", "json", "index", "tree/root/sub"],
    ));
    assert_eq!(index["dirs"], 1);
    assert_eq!(index["files"], 1);
    assert_eq!(index["completed"], true);

    let index_file = index["index_file"].as_str().unwrap().to_string();
    assert!(index_file.contains("test-plt="));
    assert!(index_file.contains("-svc=index-"));

    let ingest = json(&run_strata(
        dir.path(),
        &["--format", "json", "ingest", &index_file],
    ));
    let counters = &ingest["counters"];
    assert_eq!(counters["input_count"], 2);
    assert_eq!(counters["orphan_count"], 1);
    assert_eq!(counters["edge_count"], 2);
}

#[test]
fn test_import_dropbox_listing_then_ingest() {
    let dir = setup_workspace();
    write_listing(dir.path());

    let index = json(&run_strata(
        dir.path(),
        &["--format", "json", "import", "listing.json", "--provider", "dropbox"],
    ));
    assert_eq!(index["platform"], "dropbox");
    assert_eq!(index["dirs"], 1);
    assert_eq!(index["files"], 1);

    let index_file = index["index_file"].as_str().unwrap().to_string();
    let ingest = json(&run_strata(
        dir.path(),
        &["--format", "json", "ingest", &index_file],
    ));
    assert_eq!(ingest["platform"], "dropbox");
    assert_eq!(ingest["counters"]["root_count"], 1);
    assert_eq!(ingest["counters"]["edge_count"], 2);

    let objects = fs::read_to_string(dir.path().join(ingest["objects_file"].as_str().unwrap())).unwrap();
    assert!(objects.contains("https://www.dropbox.com/home/Docs/report.pdf"));
}

#[test]
fn test_ingest_requires_platform_for_unnamed_input() {
    let dir = setup_workspace();
    fs::write(dir.path().join("entries.jsonl"), "").unwrap();

    let output = run_strata(dir.path(), &["ingest", "entries.jsonl"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("--platform"));
}

#[test]
fn test_ingest_missing_input_fails() {
    let dir = setup_workspace();
    let output = run_strata(dir.path(), &["ingest", "nope.jsonl", "--platform", "linux"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("nope.jsonl"));
}

#[test]
fn test_run_in_place_skips_its_own_output() {
    let dir = setup_workspace();
    let first = json(&run_strata(dir.path(), &["--format", "json", "run", "."]));
    let second = json(&run_strata(dir.path(), &["--format", "json", "run", "."]));

    // strata.toml and tree/root/sub/b.txt; nothing under out/
    assert_eq!(first["index"]["files"], 2);
    assert_eq!(second["index"]["files"], 2);
    assert_eq!(first["index"]["dirs"], second["index"]["dirs"]);
}

#[test]
fn test_table_output_is_default() {
    let dir = setup_workspace();
    let output = run_strata(dir.path(), &["run", "tree/root"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Index complete"));
    assert!(out.contains("Ingest complete"));
    assert!(out.contains("Edges"));
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_invalid_config_warns_unless_strict() {
    let dir = setup_workspace();
    fs::write(dir.path().join("strata.toml"), "[output\nbroken").unwrap();

    let lenient = run_strata(dir.path(), &["codec", "encode", "a:b"]);
    assert!(lenient.status.success());
    assert!(stderr(&lenient).contains("Failed to parse"));

    let strict = run_strata(dir.path(), &["--strict", "codec", "encode", "a:b"]);
    assert!(!strict.status.success());
}

#[test]
fn test_explicit_config_must_exist() {
    let dir = setup_workspace();
    let output = run_strata(dir.path(), &["--config", "missing.toml", "codec", "encode", "x"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Config file not found"));
}

#[test]
fn test_config_output_format_default() {
    let dir = setup_workspace();
    fs::write(dir.path().join("strata.toml"), "[output]\nformat = \"json\"\n").unwrap();
    let output = run_strata(dir.path(), &["codec", "encode", "a:b"]);
    let value = json(&output);
    assert_eq!(value["action"], "encode");
}

// ============================================================================
// Codec utility
// ============================================================================

#[test]
fn test_codec_round_trip_via_cli() {
    let dir = setup_workspace();
    let encoded = json(&run_strata(
        dir.path(),
        &["--format", "json", "codec", "encode", "report:v2?.txt"],
    ));
    let stored = encoded["output"].as_str().unwrap().to_string();
    assert!(!stored.contains(':'));

    let decoded = json(&run_strata(
        dir.path(),
        &["--format", "json", "codec", "decode", &stored],
    ));
    assert_eq!(decoded["output"], "report:v2?.txt");
}

#[test]
fn test_codec_legacy_tokens() {
    let dir = setup_workspace();
    let value = json(&run_strata(
        dir.path(),
        &["--format", "json", "codec", "--codec", "legacy-tokens", "encode", "a|b"],
    ));
    assert_eq!(value["codec"], "legacy-tokens");
    assert_ne!(value["output"], "a|b");
}
