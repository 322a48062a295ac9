use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn scholar_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("scholar");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    fs::write(
        data_dir.join("content.json"),
        include_str!("../data/content.json"),
    )
    .unwrap();

    let config_content = format!(
        r#"[content]
path = "{root}/data/content.json"

[search]
debounce_ms = 50

[server]
bind = "127.0.0.1:7391"

[offline]
db_path = "{root}/data/offline.sqlite"
upstream = "http://127.0.0.1:9"
"#,
        root = root.display()
    );
    let config_path = config_dir.join("scholar.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_scholar(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(scholar_binary())
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to run scholar binary");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

#[test]
fn test_init_creates_database() {
    let (tmp, config) = setup_test_env();
    let (stdout, _, success) = run_scholar(&config, &["init"]);
    assert!(success);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/offline.sqlite").exists());

    // Idempotent
    let (_, _, success) = run_scholar(&config, &["init"]);
    assert!(success);
}

#[test]
fn test_content_summary() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, success) = run_scholar(&config, &["content"]);
    assert!(success);
    assert!(stdout.contains("Dr. Sarah Mitchell"));
    assert!(stdout.contains("search index: 18 records"), "{}", stdout);
}

#[test]
fn test_search_finds_publication() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, success) = run_scholar(&config, &["search", "memory"]);
    assert!(success);
    assert!(stdout.contains("Memory Consolidation During Sleep"));
    assert!(stdout.contains("/publications#mitchell-2023-sleep"));
    assert!(!stdout.contains("PSY 301"));
}

#[test]
fn test_search_tolerates_typos() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, success) = run_scholar(&config, &["search", "consolidaton"]);
    assert!(success);
    assert!(stdout.contains("Memory Consolidation During Sleep"));
}

#[test]
fn test_search_short_query() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, success) = run_scholar(&config, &["search", "m"]);
    assert!(success);
    assert!(stdout.contains("at least 2 characters"));
}

#[test]
fn test_search_no_results() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, success) = run_scholar(&config, &["search", "zzzz qqqq"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_search_limit() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, success) = run_scholar(&config, &["search", "sleep", "--limit", "1"]);
    assert!(success);
    assert!(stdout.contains("1. ["));
    assert!(!stdout.contains("2. ["));
}

#[test]
fn test_interactive_search_debounces_piped_lines() {
    let (_tmp, config) = setup_test_env();
    let mut child = Command::new(scholar_binary())
        .arg("--config")
        .arg(&config)
        .args(["search", "--interactive"])
        .env("RUST_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    // Written in one go: only the last query survives the debounce.
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"zzzz\nzzzz qq\ncapacity\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Capacity Limits of Working Memory Under Load"));
    assert!(!stdout.contains("No results."));
}

#[test]
fn test_cache_list_empty() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, success) = run_scholar(&config, &["cache", "list"]);
    assert!(success);
    assert!(stdout.contains("No caches."));
}

#[test]
fn test_cache_clear_nothing() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, success) = run_scholar(&config, &["cache", "clear"]);
    assert!(success);
    assert!(stdout.contains("Nothing to clear."));
}

#[test]
fn test_sync_with_empty_queue() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, success) = run_scholar(&config, &["sync", "contact-form"]);
    assert!(success);
    assert!(stdout.contains("0 delivered, 0 failed"));
}

#[test]
fn test_completions_without_config() {
    let output = Command::new(scholar_binary())
        .args(["--config", "/nonexistent/scholar.toml", "completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("scholar"));
}

#[test]
fn test_missing_config_errors() {
    let output = Command::new(scholar_binary())
        .args(["--config", "/nonexistent/scholar.toml", "content"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to read config file"));
}

#[test]
fn test_interactive_open_waits_for_pending_search() {
    let (_tmp, config) = setup_test_env();
    let mut child = Command::new(scholar_binary())
        .arg("--config")
        .arg(&config)
        .args(["search", "--interactive"])
        .env("RUST_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"capacity\n:open 1\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Search still pending"), "{}", stdout);
    assert!(!stdout.contains("open /publications"));
}
