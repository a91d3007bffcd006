use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn ctxsync_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_ctxsync"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    // Create test files
    let files_dir = root.join("files");
    fs::create_dir_all(files_dir.join("notes")).unwrap();
    fs::write(
        files_dir.join("alpha.md"),
        "# Alpha Document\n\nThis is the alpha document about Rust programming.",
    )
    .unwrap();
    fs::write(
        files_dir.join("beta.md"),
        "# Beta Document\n\nThis document discusses Python and machine learning.",
    )
    .unwrap();
    fs::write(
        files_dir.join("notes/gamma.txt"),
        "Gamma plain text file about deployment and infrastructure.",
    )
    .unwrap();
    fs::write(files_dir.join("ignored.bin"), [0u8, 1, 2]).unwrap();

    let config_content = format!(
        r#"[sync]
batch_size = 2
batch_delay_ms = 0
staging_dir = "{root}/scratch"

[sources.filesystem.docs]
root = "{root}/files"
include_globs = ["**/*.md", "**/*.txt"]

[targets.directory.kb]
root = "{root}/kb"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("ctxsync.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_ctxsync(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ctxsync_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ctxsync binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn manifest_ids(root: &Path) -> Vec<String> {
    let content = fs::read_to_string(root.join("kb/manifest.json")).unwrap();
    let manifest: serde_json::Value = serde_json::from_str(&content).unwrap();
    manifest["documents"]
        .as_object()
        .unwrap()
        .keys()
        .cloned()
        .collect()
}

fn touch_later(path: &Path) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(60))
        .unwrap();
}

#[test]
fn test_sources_lists_connectors() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ctxsync(&config_path, &["sources"]);
    assert!(success, "sources failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("filesystem.docs"));
    assert!(stdout.contains("directory"));
}

#[test]
fn test_plan_against_empty_target() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ctxsync(&config_path, &["plan"]);
    assert!(success, "plan failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("plan kb"));
    assert!(stdout.contains("filesystem.docs:notes/gamma.txt"));
    assert!(stdout.contains("3 operations (3 create, 0 update, 0 delete, 0 skip)"));
}

#[test]
fn test_plan_json() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_ctxsync(&config_path, &["plan", "--json"]);
    assert!(success);
    let plans: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(plans[0]["target"], "kb");
    assert_eq!(plans[0]["plan"]["summary"]["create"], 3);
    assert_eq!(plans[0]["plan"]["operations"][0]["type"], "create");
}

#[test]
fn test_sync_creates_documents() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ctxsync(&config_path, &["sync"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("sync kb"));
    assert!(stdout.contains("succeeded: 3"));
    assert!(stdout.contains("ok"));

    let ids = manifest_ids(tmp.path());
    assert_eq!(
        ids,
        vec![
            "filesystem.docs:alpha.md",
            "filesystem.docs:beta.md",
            "filesystem.docs:notes/gamma.txt",
        ]
    );
    assert_eq!(fs::read_dir(tmp.path().join("kb/documents")).unwrap().count(), 3);

    // Staging is cleaned up after the run.
    let scratch = tmp.path().join("scratch");
    assert_eq!(fs::read_dir(scratch).unwrap().count(), 0);
}

#[test]
fn test_sync_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_ctxsync(&config_path, &["sync"]);
    assert!(success1, "First sync failed");

    let (stdout2, _, success2) = run_ctxsync(&config_path, &["sync"]);
    assert!(success2, "Second sync failed");
    assert!(stdout2.contains("operations: 0"));
    assert!(stdout2.contains("skipped: 3"));
}

#[test]
fn test_sync_applies_updates_and_deletes() {
    let (tmp, config_path) = setup_test_env();
    let files = tmp.path().join("files");

    run_ctxsync(&config_path, &["sync"]);

    fs::write(files.join("alpha.md"), "# Alpha v2").unwrap();
    touch_later(&files.join("alpha.md"));
    fs::remove_file(files.join("beta.md")).unwrap();

    let (plan_out, _, _) = run_ctxsync(&config_path, &["plan"]);
    assert!(plan_out.contains("3 operations (0 create, 1 update, 1 delete, 1 skip)"));

    let (stdout, stderr, success) = run_ctxsync(&config_path, &["sync"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("succeeded: 2"));

    let ids = manifest_ids(tmp.path());
    assert_eq!(
        ids,
        vec!["filesystem.docs:alpha.md", "filesystem.docs:notes/gamma.txt"]
    );
    let stored: Vec<String> = fs::read_dir(tmp.path().join("kb/documents"))
        .unwrap()
        .map(|e| fs::read_to_string(e.unwrap().path()).unwrap())
        .collect();
    assert!(stored.iter().any(|body| body == "# Alpha v2"));
    assert_eq!(stored.len(), 2);
}

#[test]
fn test_dry_run_writes_nothing() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ctxsync(&config_path, &["sync", "--dry-run"]);
    assert!(success, "dry-run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("sync kb (dry-run)"));
    assert!(stdout.contains("operations: 3"));
    assert!(!tmp.path().join("kb").exists());
    assert!(stderr.contains("Would create"));
}

#[test]
fn test_failed_operations_exit_nonzero() {
    let (tmp, config_path) = setup_test_env();

    // A file where the documents directory should be makes every upload fail.
    let kb = tmp.path().join("kb");
    fs::create_dir_all(&kb).unwrap();
    fs::write(kb.join("documents"), "not a directory").unwrap();

    let (_, stderr, success) = run_ctxsync(&config_path, &["sync"]);
    assert!(!success, "sync should fail when uploads fail");
    assert!(stderr.contains("3 of 3 operations failed against target 'kb'"));
    assert!(stderr.contains("create filesystem.docs:alpha.md"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_ctxsync(&tmp.path().join("missing.toml"), &["plan"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
