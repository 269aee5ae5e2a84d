use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn devstats_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("devstats");
    path
}

fn git(repo: &Path, args: &[&str]) {
    let status = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args([
            "-c",
            "user.name=Integration Test",
            "-c",
            "user.email=test@example.com",
        ])
        .args(args)
        .status()
        .unwrap();
    assert!(status.success(), "git {:?} failed", args);
}

/// Creates a working copy with two commits for the git source to read.
fn setup_repo(root: &Path) -> PathBuf {
    let repo = root.join("repo");
    fs::create_dir_all(&repo).unwrap();
    git(&repo, &["init", "--initial-branch=main"]);

    fs::write(repo.join("README.md"), "first\n").unwrap();
    git(&repo, &["add", "."]);
    git(&repo, &["commit", "-m", "Initial commit"]);

    fs::write(repo.join("README.md"), "second\n").unwrap();
    git(&repo, &["add", "."]);
    git(&repo, &["commit", "-m", "Update readme"]);

    repo
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let repo = setup_repo(&root);

    let results_path = root.join("test-results.json");
    fs::write(
        &results_path,
        r#"[{"id": "run-1", "run_name": "nightly", "total": 10, "passed": 9, "failed": 1, "run_date": "2026-08-01T02:00:00Z"}]"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/devstats.sqlite"

[server]
bind = "127.0.0.1:7411"

[sources.git]
repo_path = "{repo}"

[sources.tests]
results_path = "{results}"
"#,
        root = root.display(),
        repo = repo.display(),
        results = results_path.display(),
    );

    let config_path = config_dir.join("devstats.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_devstats(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = devstats_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run devstats binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_devstats(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("devstats.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_devstats(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_devstats(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_sources_lists_configuration_status() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_devstats(&config_path, &["sources"]);
    assert!(success);
    for source in ["git", "tracker", "ci", "quality", "tests"] {
        assert!(stdout.contains(source), "missing source {}: {}", source, stdout);
    }
    // git and tests are configured in the test env, tracker is not.
    let tracker_line = stdout
        .lines()
        .find(|l| l.contains("tracker"))
        .expect("tracker line");
    assert!(tracker_line.contains("not configured"));
    let git_line = stdout.lines().find(|l| l.contains("git")).expect("git line");
    assert!(git_line.contains("OK"));
}

#[test]
fn test_collect_git() {
    let (_tmp, config_path) = setup_test_env();

    run_devstats(&config_path, &["init"]);
    let (stdout, stderr, success) = run_devstats(&config_path, &["collect", "git"]);
    assert!(success, "collect failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("fetched: 2"));
    assert!(stdout.contains("upserted commits: 2"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_collect_idempotent_no_duplicates() {
    let (_tmp, config_path) = setup_test_env();

    run_devstats(&config_path, &["init"]);

    let (stdout1, _, _) = run_devstats(&config_path, &["collect", "git"]);
    assert!(stdout1.contains("upserted commits: 2"));

    // Second collect reprocesses the same commits without duplicating.
    let (stdout2, _, _) = run_devstats(&config_path, &["collect", "git"]);
    assert!(stdout2.contains("upserted commits: 2"));

    let (shown, _, success) = run_devstats(&config_path, &["show", "commits"]);
    assert!(success);
    assert_eq!(
        shown.lines().count(),
        2,
        "expected exactly 2 commits, got: {}",
        shown
    );
}

#[test]
fn test_collect_unknown_source_fails() {
    let (_tmp, config_path) = setup_test_env();

    run_devstats(&config_path, &["init"]);
    let (_, stderr, success) = run_devstats(&config_path, &["collect", "nonexistent"]);
    assert!(!success, "Unknown source should fail");
    assert!(
        stderr.contains("Unknown source"),
        "Should report unknown source, got: {}",
        stderr
    );
}

#[test]
fn test_collect_test_runs() {
    let (_tmp, config_path) = setup_test_env();

    run_devstats(&config_path, &["init"]);
    let (stdout, stderr, success) = run_devstats(&config_path, &["collect", "tests"]);
    assert!(success, "collect failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("fetched: 1"));
    assert!(stdout.contains("upserted test_runs: 1"));
}

#[test]
fn test_show_commits_output() {
    let (_tmp, config_path) = setup_test_env();

    run_devstats(&config_path, &["init"]);
    run_devstats(&config_path, &["collect", "git"]);

    let (stdout, _, success) = run_devstats(&config_path, &["show", "commits"]);
    assert!(success);
    assert!(
        stdout.contains("Initial commit") && stdout.contains("Update readme"),
        "Expected both commit subjects, got: {}",
        stdout
    );
    assert!(stdout.contains("Integration Test"));
}

#[test]
fn test_show_empty_table() {
    let (_tmp, config_path) = setup_test_env();

    run_devstats(&config_path, &["init"]);
    let (stdout, _, success) = run_devstats(&config_path, &["show", "issues"]);
    assert!(success);
    assert!(stdout.contains("No issues"));
}

#[test]
fn test_show_missing_issue_fails() {
    let (_tmp, config_path) = setup_test_env();

    run_devstats(&config_path, &["init"]);
    let (_, stderr, success) = run_devstats(&config_path, &["show", "issue", "PROJ-404"]);
    assert!(!success, "missing issue should fail");
    assert!(
        stderr.contains("not found"),
        "Should report not found, got: {}",
        stderr
    );
}

#[test]
fn test_correlate_on_empty_database() {
    let (_tmp, config_path) = setup_test_env();

    run_devstats(&config_path, &["init"]);
    let (stdout, _, success) = run_devstats(&config_path, &["correlate"]);
    assert!(success);
    assert!(stdout.contains("deployments: 0"));
    assert!(stdout.contains("incidents: 0"));
}

#[test]
fn test_pipeline_runs_all_configured_sources() {
    let (_tmp, config_path) = setup_test_env();

    run_devstats(&config_path, &["init"]);
    let (stdout, stderr, success) = run_devstats(&config_path, &["pipeline"]);
    assert!(success, "pipeline failed: stdout={}, stderr={}", stdout, stderr);
    // Unconfigured sources degrade to empty collections rather than failing.
    assert!(stdout.contains("collect git"));
    assert!(stdout.contains("collect tracker"));
    assert!(stdout.contains("upserted commits: 2"));
    assert!(stdout.contains("correlate"));
}

#[test]
fn test_pipeline_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    run_devstats(&config_path, &["init"]);
    let (stdout1, _, success1) = run_devstats(&config_path, &["pipeline"]);
    assert!(success1);
    let (stdout2, _, success2) = run_devstats(&config_path, &["pipeline"]);
    assert!(success2);
    assert_eq!(
        stdout1, stdout2,
        "Repeated pipeline runs should converge to identical output"
    );
}

#[test]
fn test_missing_config_fails() {
    let (_, stderr, success) = run_devstats(Path::new("/nonexistent/devstats.toml"), &["init"]);
    assert!(!success);
    assert!(
        stderr.contains("config"),
        "Should mention the config file, got: {}",
        stderr
    );
}
