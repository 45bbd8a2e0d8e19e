//! Git source acquisition.
//!
//! Maintains a working copy of a remote repository under the workspace and
//! reports the revision that was checked out, so ingestion can tag files
//! with it.
//!
//! # Workflow
//!
//! 1. If `<dest>/.git` is missing, `git clone --branch <branch> --single-branch`.
//! 2. Otherwise `git fetch origin <branch>` then `git reset --hard origin/<branch>`.
//! 3. `git rev-parse HEAD` gives the revision (`None` if that fails).
//!
//! Git is driven through the `git` binary, so any credentials configured
//! for it (SSH agent, credential helpers) apply here too.

use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::error::{Error, Result};

/// A checked-out working copy.
#[derive(Debug, Clone)]
pub struct Checkout {
    pub dir: PathBuf,
    pub repo_name: String,
    pub revision: Option<String>,
}

/// Derive a repository name from its URL: last path segment, `.git`
/// stripped, spaces replaced with `-`, lowercased.
pub fn repo_name_from_url(url: &str) -> String {
    let last = url
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(url);
    last.strip_suffix(".git")
        .unwrap_or(last)
        .replace(' ', "-")
        .to_lowercase()
}

/// Default checkout location for `url` under the workspace root.
pub fn default_checkout_dir(workspace_root: &Path, url: &str) -> PathBuf {
    workspace_root.join("repos").join(repo_name_from_url(url))
}

/// Clone or update `url` at `dest` and report the resulting revision.
pub async fn acquire(url: &str, branch: &str, dest: &Path) -> Result<Checkout> {
    if dest.join(".git").exists() {
        tracing::info!(url, branch, dest = %dest.display(), "updating working copy");
        git_update(dest, branch).await?;
    } else {
        tracing::info!(url, branch, dest = %dest.display(), "cloning repository");
        git_clone(url, branch, dest).await?;
    }

    let revision = head_revision(dest).await;
    Ok(Checkout {
        dir: dest.to_path_buf(),
        repo_name: repo_name_from_url(url),
        revision,
    })
}

async fn git_clone(url: &str, branch: &str, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let mut cmd = Command::new("git");
    cmd.args(["clone", "--branch", branch, "--single-branch", url])
        .arg(dest);
    run_git(cmd, "clone").await
}

async fn git_update(repo_dir: &Path, branch: &str) -> Result<()> {
    let mut fetch = Command::new("git");
    fetch.args(["fetch", "origin", branch]).current_dir(repo_dir);
    run_git(fetch, "fetch").await?;

    let mut reset = Command::new("git");
    reset
        .args(["reset", "--hard", &format!("origin/{}", branch)])
        .current_dir(repo_dir);
    run_git(reset, "reset").await
}

/// `git rev-parse HEAD`, or `None` if git cannot tell.
pub async fn head_revision(repo_dir: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(repo_dir)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!sha.is_empty()).then_some(sha)
}

async fn run_git(mut cmd: Command, what: &str) -> Result<()> {
    let output = cmd.output().await.map_err(|e| {
        Error::upstream(format!("failed to execute 'git {}'. Is git installed? {}", what, e))
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::upstream(format!(
            "git {} failed: {}",
            what,
            stderr.trim()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_name_from_url() {
        assert_eq!(repo_name_from_url("https://github.com/Org/My-Docs.git"), "my-docs");
        assert_eq!(repo_name_from_url("https://github.com/org/docs/"), "docs");
        assert_eq!(repo_name_from_url("git@github.com:org/Handbook.git"), "handbook");
        assert_eq!(repo_name_from_url("/srv/git/Team Notes"), "team-notes");
    }

    #[test]
    fn test_repo_name_strips_one_git_suffix() {
        assert_eq!(repo_name_from_url("https://example.com/a.git.git"), "a.git");
        assert_eq!(repo_name_from_url("https://example.com/dotgit"), "dotgit");
    }

    #[test]
    fn test_default_checkout_dir() {
        let dir = default_checkout_dir(Path::new("/ws"), "https://example.com/a/b.git");
        assert_eq!(dir, PathBuf::from("/ws/repos/b"));
    }

    #[tokio::test]
    async fn test_head_revision_outside_repo_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(head_revision(dir.path()).await, None);
    }
}
