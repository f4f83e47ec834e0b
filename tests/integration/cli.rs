//! The `rpp` binary as an administrator sees it.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn rpp(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("rpp").unwrap();
    cmd.current_dir(temp.path())
        .env_remove("RPP_CONFIG")
        .env_remove("RUST_LOG")
        .env("RPP_NO_PROGRESS", "1")
        .arg("--config")
        .arg(temp.path().join("config.toml"));
    cmd
}

#[test]
fn test_help_lists_commands() {
    let temp = TempDir::new().unwrap();
    rpp(&temp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("dropbox-code"))
        .stdout(predicate::str::contains("dropbox-path"));
}

#[test]
fn test_update_without_token_names_the_fix() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("server.properties"), "motd=hi\n").unwrap();

    rpp(&temp)
        .args(["update", "acme/pack", "main"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Missing GitHub token"))
        .stderr(predicate::str::contains("rpp github <token>"));

    let descriptor = std::fs::read_to_string(temp.path().join("server.properties")).unwrap();
    assert_eq!(descriptor, "motd=hi\n");
}

#[test]
fn test_update_requires_branch() {
    let temp = TempDir::new().unwrap();
    rpp(&temp).args(["update", "acme/pack"]).assert().failure();
}

#[test]
fn test_github_without_token_prints_instructions() {
    let temp = TempDir::new().unwrap();
    rpp(&temp)
        .arg("github")
        .assert()
        .success()
        .stdout(predicate::str::contains("https://github.com/settings/tokens"));
    assert!(!temp.path().join("config.toml").exists());
}

#[test]
fn test_dropbox_prints_authorize_url() {
    let temp = TempDir::new().unwrap();
    rpp(&temp)
        .args(["dropbox", "appkey", "appsecret"])
        .assert()
        .success()
        .stdout(predicate::str::contains("client_id=appkey"))
        .stdout(predicate::str::contains("token_access_type=offline"));
    assert!(temp.path().join("pending.toml").exists());
}

#[test]
fn test_dropbox_path_requires_linked_account() {
    let temp = TempDir::new().unwrap();
    rpp(&temp)
        .args(["dropbox-path", "/survival"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing Dropbox credentials"));
}

#[test]
fn test_status_on_fresh_install() {
    let temp = TempDir::new().unwrap();
    rpp(&temp)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("not set"))
        .stdout(predicate::str::contains("file not found"));
}
