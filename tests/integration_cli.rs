//! End-to-end checks of the `plugreg` binary that need no network.

use assert_cmd::Command;
use plugreg_cli::test_utils::TestGit;
use predicates::prelude::*;
use tempfile::TempDir;

fn plugreg(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("plugreg").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("RUST_LOG")
        .env_remove("PLUGREG_CONFIG")
        .env("PLUGREG_NO_PROGRESS", "1")
        .env("XDG_CACHE_HOME", dir.path().join("cache"));
    cmd
}

#[test]
fn test_help_lists_flags() {
    let dir = TempDir::new().unwrap();
    plugreg(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--add"))
        .stdout(predicate::str::contains("--input-names"))
        .stdout(predicate::str::contains("--proc"))
        .stdout(predicate::str::contains("--no-commit"));
}

#[test]
fn test_malformed_line_fails_before_fetching() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("vim-plugin-names"), "tpope/vim-fugitive\nnoslash\n").unwrap();

    plugreg(&dir)
        .arg("--no-commit")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Invalid repository 'noslash' on line 2"))
        .stderr(predicate::str::contains("owner/repo[@branch][ as alias]"));

    assert!(!dir.path().join("generated.nix").exists());
    assert!(!dir.path().join("cache").exists());
}

#[test]
fn test_missing_input_file_fails() {
    let dir = TempDir::new().unwrap();

    plugreg(&dir)
        .args(["--no-commit", "-i", "does-not-exist"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("does-not-exist"));
}

#[test]
fn test_invalid_add_argument_is_rejected() {
    let dir = TempDir::new().unwrap();

    plugreg(&dir)
        .args(["--no-commit", "--add", "a/b/c"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid plugin 'a/b/c'"));
}

#[test]
fn test_bad_config_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("plugreg.toml");
    std::fs::write(&config, "parallel = \"many\"\n").unwrap();

    plugreg(&dir)
        .arg("--no-commit")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_commit_requires_git_repository() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("vim-plugin-names"), "tpope/vim-fugitive\n").unwrap();

    plugreg(&dir)
        .env("GIT_CEILING_DIRECTORIES", dir.path().parent().unwrap())
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("git"));
}

#[test]
fn test_malformed_line_leaves_repository_untouched() {
    let dir = TempDir::new().unwrap();
    let git = TestGit::new(dir.path());
    git.init().unwrap();
    std::fs::write(dir.path().join("vim-plugin-names"), "tpope/vim-fugitive\n/missing-owner\n").unwrap();
    git.add_all().unwrap();
    git.commit("initial").unwrap();

    plugreg(&dir)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("on line 2"));

    assert_eq!(git.log_subjects().unwrap(), vec!["initial".to_string()]);
    assert_eq!(
        std::fs::read_to_string(git.repo_path().join("vim-plugin-names")).unwrap(),
        "tpope/vim-fugitive\n/missing-owner\n"
    );
}

#[test]
fn test_quiet_run_prints_nothing() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("vim-plugin-names"), "\n").unwrap();

    plugreg(&dir)
        .args(["-q", "--no-commit"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::is_empty());

    assert!(dir.path().join("generated.nix").exists());
}
