use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn sage_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("sage");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    // Project directory the queries run from
    let project_dir = root.join("project");
    fs::create_dir_all(&project_dir).unwrap();
    fs::write(
        project_dir.join("README.md"),
        "# Demo Project\n\nA small fixture project for integration tests.",
    )
    .unwrap();
    fs::write(project_dir.join("deploy.sh"), "#!/bin/sh\necho deploy\n").unwrap();

    // Seeded shell history
    let history_path = root.join("zsh_history");
    fs::write(
        &history_path,
        ": 1700000100:0;git status\n: 1700000200:0;cargo test\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/sessions.sqlite"

[docs]
cache_dir = "{root}/docs-cache"
max_cache_mb = 10

[history]
path = "{root}/zsh_history"
recent_count = 15
"#,
        root = root.display()
    );

    let config_path = root.join("config.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_sage(config_path: &Path, cwd: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = sage_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .current_dir(cwd)
        .env_remove("OPENAI_API_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run sage binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_sage(&config_path, tmp.path(), &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("sessions.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_sage(&config_path, tmp.path(), &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_sage(&config_path, tmp.path(), &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_config_list_defaults() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_sage(&config_path, tmp.path(), &["config", "list"]);
    assert!(success);
    assert!(stdout.contains("Current configuration:"));
    assert!(stdout.contains("model:"));
    assert!(stdout.contains("mcp servers: 0 configured"));
}

#[test]
fn test_config_set_model_persists() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_sage(
        &config_path,
        tmp.path(),
        &["config", "set", "model", "gpt-4o"],
    );
    assert!(success);
    assert!(stdout.contains("Default model set to: gpt-4o"));

    let (stdout, _, success) = run_sage(&config_path, tmp.path(), &["config", "list"]);
    assert!(success);
    assert!(stdout.contains("gpt-4o"));
}

#[test]
fn test_config_set_unknown_key_fails() {
    let (tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_sage(
        &config_path,
        tmp.path(),
        &["config", "set", "frobnication", "on"],
    );
    assert!(!success, "unknown key must exit non-zero");
    assert!(stderr.contains("Unknown configuration key"));
}

#[test]
fn test_stats_runs_on_fresh_database() {
    let (tmp, config_path) = setup_test_env();

    run_sage(&config_path, tmp.path(), &["init"]);
    let (stdout, _, success) = run_sage(&config_path, tmp.path(), &["stats"]);
    assert!(success);
    assert!(stdout.contains("Interactions:  0"));
}

#[test]
fn test_show_prefs() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_sage(&config_path, tmp.path(), &["--show-prefs"]);
    assert!(success);
    assert!(stdout.contains("Detected command preferences:"));
}

#[test]
fn test_show_context_includes_history_and_files() {
    let (tmp, config_path) = setup_test_env();
    let project_dir = tmp.path().join("project");

    let (stdout, stderr, success) = run_sage(
        &config_path,
        &project_dir,
        &["--show-context", "what is in this project"],
    );
    assert!(
        success,
        "show-context failed: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("=== Assembled Context ==="));
    assert!(stdout.contains("## Recent Terminal History"));
    assert!(stdout.contains("git status"));
    assert!(stdout.contains("cargo test"));
    assert!(stdout.contains("## Current Directory Files"));
    assert!(stdout.contains("README.md"));
}

#[test]
fn test_show_context_inlines_query_mentioned_file() {
    let (tmp, config_path) = setup_test_env();
    let project_dir = tmp.path().join("project");

    let (stdout, _, success) = run_sage(
        &config_path,
        &project_dir,
        &["--show-context", "explain deploy.sh to me"],
    );
    assert!(success);
    assert!(stdout.contains("## Content of deploy.sh"));
    assert!(stdout.contains("echo deploy"));
}

#[test]
fn test_query_without_api_key_exits_nonzero() {
    let (tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_sage(
        &config_path,
        tmp.path(),
        &["--no-context", "how do I list files"],
    );
    assert!(!success, "query without API key must fail");
    assert!(stderr.contains("OPENAI_API_KEY"));
}
