//! The working-copy handle (spec §4.5).
//!
//! Reads go through `git2` so behaviour is deterministic and testable
//! without shelling out. Push and stash go through the `git` binary via
//! [`vibe_process`] so the user's credential helpers and hooks still
//! apply — `git2` has no equivalent for either.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use git2::{Repository, StatusOptions};
use serde::{Deserialize, Serialize};
use vibe_types::VibeError;

/// Per-path classification from `git status` (spec §4.5: "Status →
/// map(path → {modified,added,deleted,untracked})"). A path with both
/// index and worktree changes is classified by worktree state first,
/// since that's what the uncommitted-change transition cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Modified,
    Added,
    Deleted,
    Untracked,
}

/// Aggregate counts used by the uncommitted-change transition (spec
/// §4.5): tracked changes (modified/added/deleted) block a checkout and
/// prompt for a stash; untracked files are intentionally left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub modified: usize,
    pub added: usize,
    pub deleted: usize,
    pub untracked: usize,
}

impl StatusCounts {
    pub fn has_tracked_changes(&self) -> bool {
        self.modified + self.added + self.deleted > 0
    }
}

pub fn summarize(status: &BTreeMap<String, FileStatus>) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for file_status in status.values() {
        match file_status {
            FileStatus::Modified => counts.modified += 1,
            FileStatus::Added => counts.added += 1,
            FileStatus::Deleted => counts.deleted += 1,
            FileStatus::Untracked => counts.untracked += 1,
        }
    }
    counts
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub summary: String,
    pub author: String,
}

/// Timeout applied to the stash subprocess (spec §4.5).
pub const STASH_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout applied to push; generous since pushes can be slow on large
/// branches but still bounded so a hung credential prompt doesn't wedge
/// the command forever.
pub const PUSH_TIMEOUT: Duration = Duration::from_secs(120);

/// A handle onto one working copy.
pub struct WorkingCopy {
    repo: Repository,
}

impl WorkingCopy {
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path)
            .with_context(|| format!("not a git repository: {}", path.display()))?;
        Ok(Self { repo })
    }

    pub fn root_path(&self) -> Result<PathBuf> {
        self.repo
            .workdir()
            .map(Path::to_path_buf)
            .context("repository has no working directory (bare repo)")
    }

    /// The `origin` remote's URL, if configured. Feeds `withRepoFallback`
    /// and CI project-slug derivation (spec §4.1, §4.6), both of which
    /// parse this string rather than calling out to the server.
    pub fn origin_remote_url(&self) -> Result<Option<String>> {
        match self.repo.find_remote("origin") {
            Ok(remote) => Ok(remote.url().map(str::to_string)),
            Err(_) => Ok(None),
        }
    }

    pub fn current_branch(&self) -> Result<Option<String>> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(_) => return Ok(None), // unborn HEAD, e.g. empty repo
        };
        if !head.is_branch() {
            return Ok(None); // detached HEAD
        }
        Ok(head.shorthand().map(str::to_string))
    }

    pub fn branch_exists(&self, name: &str) -> Result<bool> {
        Ok(self
            .repo
            .find_branch(name, git2::BranchType::Local)
            .is_ok())
    }

    /// Create `name` pointing at the current `HEAD` commit. Does not
    /// check it out.
    pub fn create_branch(&self, name: &str) -> Result<()> {
        let head_commit = self.repo.head()?.peel_to_commit()?;
        self.repo
            .branch(name, &head_commit, false)
            .with_context(|| format!("failed to create branch {name}"))?;
        Ok(())
    }

    pub fn checkout(&self, name: &str) -> Result<()> {
        let refname = format!("refs/heads/{name}");
        let obj = self
            .repo
            .revparse_single(&refname)
            .with_context(|| format!("branch {name} does not exist"))?;
        self.repo
            .checkout_tree(&obj, None)
            .with_context(|| format!("failed to checkout {name}"))?;
        self.repo
            .set_head(&refname)
            .with_context(|| format!("failed to move HEAD to {name}"))?;
        Ok(())
    }

    /// Working-tree status, keyed by repo-relative path.
    pub fn status(&self) -> Result<BTreeMap<String, FileStatus>> {
        let mut options = StatusOptions::new();
        options.include_untracked(true).recurse_untracked_dirs(true);

        let statuses = self.repo.statuses(Some(&mut options))?;
        let mut map = BTreeMap::new();

        for entry in statuses.iter() {
            let Some(path) = entry.path() else { continue };
            let flags = entry.status();

            let classified = if flags.is_wt_new() {
                FileStatus::Untracked
            } else if flags.is_wt_deleted() || flags.is_index_deleted() {
                FileStatus::Deleted
            } else if flags.is_index_new() {
                FileStatus::Added
            } else if flags.is_wt_modified()
                || flags.is_index_modified()
                || flags.is_wt_renamed()
                || flags.is_index_renamed()
            {
                FileStatus::Modified
            } else {
                continue;
            };

            map.insert(path.to_string(), classified);
        }

        Ok(map)
    }

    /// Commits reachable from `branch` but not from `base`, newest first.
    pub fn get_commits(&self, branch: &str, base: &str) -> Result<Vec<CommitInfo>> {
        let branch_oid = self
            .repo
            .revparse_single(branch)
            .with_context(|| format!("unknown branch or ref: {branch}"))?
            .id();
        let base_oid = self
            .repo
            .revparse_single(base)
            .with_context(|| format!("unknown base ref: {base}"))?
            .id();

        let mut revwalk = self.repo.revwalk()?;
        revwalk.push(branch_oid)?;
        revwalk.hide(base_oid)?;

        let mut commits = Vec::new();
        for oid in revwalk {
            let oid = oid?;
            let commit = self.repo.find_commit(oid)?;
            commits.push(CommitInfo {
                sha: oid.to_string(),
                summary: commit.summary().unwrap_or_default().to_string(),
                author: commit.author().name().unwrap_or_default().to_string(),
            });
        }
        Ok(commits)
    }

    /// Unified textual diff from `base` to `branch`, used by the PR-creation
    /// pipeline to feed the AI prose step (spec §4.4). Computed entirely via
    /// `git2` tree comparison, no subprocess involved.
    pub fn diff(&self, branch: &str, base: &str) -> Result<String> {
        let branch_commit = self
            .repo
            .revparse_single(branch)
            .with_context(|| format!("unknown branch or ref: {branch}"))?
            .peel_to_commit()?;
        let base_commit = self
            .repo
            .revparse_single(base)
            .with_context(|| format!("unknown base ref: {base}"))?
            .peel_to_commit()?;

        let branch_tree = branch_commit.tree()?;
        let base_tree = base_commit.tree()?;

        let diff = self
            .repo
            .diff_tree_to_tree(Some(&base_tree), Some(&branch_tree), None)
            .context("failed to compute diff")?;

        let mut out = String::new();
        diff.print(git2::DiffFormat::Patch, |_delta, _hunk, line| {
            match line.origin() {
                '+' | '-' | ' ' => out.push(line.origin()),
                _ => {}
            }
            out.push_str(&String::from_utf8_lossy(line.content()));
            true
        })
        .context("failed to render diff")?;
        Ok(out)
    }

    /// `git push -u <remote> <branch>`. Delegated to the `git` binary to
    /// honour credential helpers (spec §4.5).
    pub fn push(&self, remote: &str, branch: &str) -> Result<(), VibeError> {
        let root = self.root_path().map_err(|e| VibeError::Other(e))?;
        let output = vibe_process::run_command_with_timeout(
            "git",
            &["push", "-u", remote, branch],
            &root,
            Some(PUSH_TIMEOUT),
        )
        .map_err(VibeError::Other)?;

        if output.timed_out {
            return Err(VibeError::Timeout(PUSH_TIMEOUT));
        }
        if !output.success() {
            return Err(VibeError::transient(
                "git push",
                output.combined_truncated(vibe_process::OUTPUT_TRUNCATION_LIMIT),
            ));
        }
        Ok(())
    }

    /// `git stash push -m "Auto-stash by <tool_name>"` with a 30-second
    /// timeout; untracked files are intentionally left alone. Scoped:
    /// the caller must not alter branch state unless this returns `Ok`.
    pub fn stash_push(&self, tool_name: &str) -> Result<(), VibeError> {
        let root = self.root_path().map_err(|e| VibeError::Other(e))?;
        let message = format!("Auto-stash by {tool_name}");
        let output = vibe_process::run_command_with_timeout(
            "git",
            &["stash", "push", "-m", &message],
            &root,
            Some(STASH_TIMEOUT),
        )
        .map_err(VibeError::Other)?;

        if output.timed_out {
            return Err(VibeError::Timeout(STASH_TIMEOUT));
        }
        if !output.success() {
            return Err(VibeError::Other(anyhow::anyhow!(
                "git stash failed: {}",
                output.combined_truncated(vibe_process::OUTPUT_TRUNCATION_LIMIT)
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::tempdir;

    fn init_repo(dir: &Path) {
        Command::new("git").args(["init"]).current_dir(dir).output().unwrap();
        Command::new("git")
            .args(["config", "user.email", "test@example.com"])
            .current_dir(dir)
            .output()
            .unwrap();
        Command::new("git")
            .args(["config", "user.name", "Test"])
            .current_dir(dir)
            .output()
            .unwrap();
        Command::new("git")
            .args(["commit", "--allow-empty", "-m", "init"])
            .current_dir(dir)
            .output()
            .unwrap();
    }

    #[test]
    fn open_discovers_repo_root() {
        let td = tempdir().unwrap();
        init_repo(td.path());

        let wc = WorkingCopy::open(td.path()).unwrap();
        assert_eq!(
            std::fs::canonicalize(wc.root_path().unwrap()).unwrap(),
            std::fs::canonicalize(td.path()).unwrap()
        );
    }

    #[test]
    fn current_branch_reports_head_branch() {
        let td = tempdir().unwrap();
        init_repo(td.path());

        let wc = WorkingCopy::open(td.path()).unwrap();
        let branch = wc.current_branch().unwrap();
        assert!(branch.is_some());
    }

    #[test]
    fn create_branch_then_branch_exists() {
        let td = tempdir().unwrap();
        init_repo(td.path());

        let wc = WorkingCopy::open(td.path()).unwrap();
        wc.create_branch("feature/x").unwrap();
        assert!(wc.branch_exists("feature/x").unwrap());
        assert!(!wc.branch_exists("feature/does-not-exist").unwrap());
    }

    #[test]
    fn create_and_checkout_branch() {
        let td = tempdir().unwrap();
        init_repo(td.path());

        let wc = WorkingCopy::open(td.path()).unwrap();
        wc.create_branch("feature/y").unwrap();
        wc.checkout("feature/y").unwrap();
        assert_eq!(wc.current_branch().unwrap(), Some("feature/y".to_string()));
    }

    #[test]
    fn status_reports_untracked_file() {
        let td = tempdir().unwrap();
        init_repo(td.path());
        std::fs::write(td.path().join("new.txt"), "hi").unwrap();

        let wc = WorkingCopy::open(td.path()).unwrap();
        let status = wc.status().unwrap();
        assert_eq!(status.get("new.txt"), Some(&FileStatus::Untracked));

        let counts = summarize(&status);
        assert_eq!(counts.untracked, 1);
        assert!(!counts.has_tracked_changes());
    }

    #[test]
    fn status_reports_modified_tracked_file() {
        let td = tempdir().unwrap();
        init_repo(td.path());
        std::fs::write(td.path().join("tracked.txt"), "v1").unwrap();
        Command::new("git").args(["add", "."]).current_dir(td.path()).output().unwrap();
        Command::new("git")
            .args(["commit", "-m", "add tracked"])
            .current_dir(td.path())
            .output()
            .unwrap();
        std::fs::write(td.path().join("tracked.txt"), "v2").unwrap();

        let wc = WorkingCopy::open(td.path()).unwrap();
        let status = wc.status().unwrap();
        assert_eq!(status.get("tracked.txt"), Some(&FileStatus::Modified));

        let counts = summarize(&status);
        assert!(counts.has_tracked_changes());
    }

    #[test]
    fn get_commits_excludes_base() {
        let td = tempdir().unwrap();
        init_repo(td.path());

        let wc = WorkingCopy::open(td.path()).unwrap();
        wc.create_branch("feature/z").unwrap();
        wc.checkout("feature/z").unwrap();

        Command::new("git")
            .args(["commit", "--allow-empty", "-m", "feature commit"])
            .current_dir(td.path())
            .output()
            .unwrap();

        let base_branch = wc.current_branch().unwrap(); // not used, placeholder
        let _ = base_branch;

        let commits = wc.get_commits("feature/z", "master").or_else(|_| wc.get_commits("feature/z", "main"));
        let commits = commits.unwrap();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].summary, "feature commit");
    }

    #[test]
    fn origin_remote_url_absent_on_fresh_repo() {
        let td = tempdir().unwrap();
        init_repo(td.path());

        let wc = WorkingCopy::open(td.path()).unwrap();
        assert_eq!(wc.origin_remote_url().unwrap(), None);
    }

    #[test]
    fn origin_remote_url_reports_configured_remote() {
        let td = tempdir().unwrap();
        init_repo(td.path());
        Command::new("git")
            .args(["remote", "add", "origin", "git@github.com:acme/widgets.git"])
            .current_dir(td.path())
            .output()
            .unwrap();

        let wc = WorkingCopy::open(td.path()).unwrap();
        assert_eq!(
            wc.origin_remote_url().unwrap(),
            Some("git@github.com:acme/widgets.git".to_string())
        );
    }

    #[test]
    fn diff_reports_added_line() {
        let td = tempdir().unwrap();
        init_repo(td.path());

        let wc = WorkingCopy::open(td.path()).unwrap();
        let base = wc.current_branch().unwrap().unwrap();
        wc.create_branch("feature/diff").unwrap();
        wc.checkout("feature/diff").unwrap();

        std::fs::write(td.path().join("file.txt"), "hello\n").unwrap();
        Command::new("git").args(["add", "."]).current_dir(td.path()).output().unwrap();
        Command::new("git")
            .args(["commit", "-m", "add file"])
            .current_dir(td.path())
            .output()
            .unwrap();

        let diff = wc.diff("feature/diff", &base).unwrap();
        assert!(diff.contains("+hello"));
        assert!(diff.contains("file.txt"));
    }
}
