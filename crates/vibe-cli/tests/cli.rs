use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn vibe() -> Command {
    Command::cargo_bin("vibe").unwrap()
}

#[test]
fn init_writes_a_local_config_file() {
    let dir = tempdir().unwrap();
    vibe().current_dir(dir.path()).args(["init", "--local"]).assert().success();

    let path = dir.path().join(".vibe.yaml");
    assert!(path.exists());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let dir = tempdir().unwrap();
    vibe().current_dir(dir.path()).args(["init", "--local"]).assert().success();

    vibe()
        .current_dir(dir.path())
        .args(["init", "--local"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn init_local_force_overwrites_an_existing_file() {
    let dir = tempdir().unwrap();
    vibe().current_dir(dir.path()).args(["init", "--local"]).assert().success();

    vibe()
        .current_dir(dir.path())
        .args(["init", "--local", "--force"])
        .assert()
        .success();
}

#[test]
fn bare_argument_outside_a_git_repo_fails_loudly_rather_than_silently_no_opping() {
    let dir = tempdir().unwrap();
    vibe()
        .current_dir(dir.path())
        .arg("abc123xyz")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::is_empty().not());
}

/// Sets up a throwaway git repo with an `origin` remote so
/// `CommandContext::new` can resolve a repo coordinate without touching
/// the network, and a `GITHUB_TOKEN` so backend selection picks the
/// direct backend instead of probing for the `gh` CLI.
fn repo_with_origin(dir: &std::path::Path) {
    let repo = git2::Repository::init(dir).unwrap();
    repo.remote("origin", "https://github.com/acme/widgets.git").unwrap();

    let mut index = repo.index().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let signature = git2::Signature::now("tester", "tester@example.com").unwrap();
    repo.commit(Some("HEAD"), &signature, &signature, "initial", &tree, &[]).unwrap();
}

/// Writes a `.vibe.yaml` satisfying `Config::validate_required` (git's
/// `base_branch` and `workspaces` aren't settable via env var, so tests
/// that need `CommandContext::new` to get past config validation need a
/// file on disk for those two fields).
fn write_minimal_valid_config(dir: &std::path::Path) {
    fs::write(
        dir.join(".vibe.yaml"),
        "git:\n  base_branch: main\nworkspaces:\n  - name: eng\n    folder_id: \"1\"\n",
    )
    .unwrap();
}

#[test]
fn workon_rejects_a_malformed_ticket_id_before_touching_the_network() {
    let dir = tempdir().unwrap();
    repo_with_origin(dir.path());
    write_minimal_valid_config(dir.path());

    vibe()
        .current_dir(dir.path())
        .env("GITHUB_TOKEN", "test-token")
        .env("CLICKUP_API_TOKEN", "test-token")
        .args(["workon", "not-a-valid-id"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("9 characters"));
}

#[test]
fn comment_requires_text_from_args_or_stdin() {
    let dir = tempdir().unwrap();
    repo_with_origin(dir.path());
    write_minimal_valid_config(dir.path());

    vibe()
        .current_dir(dir.path())
        .env("GITHUB_TOKEN", "test-token")
        .env("CLICKUP_API_TOKEN", "test-token")
        .arg("comment")
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("requires text"));
}
