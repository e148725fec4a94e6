//! Git operations via the `git` binary.
//!
//! Clones are always shallow (`--depth 1`). Authentication is environment
//! driven: when SSH keys are materialized, `GIT_SSH_COMMAND` pins the key
//! file and known-hosts list.

use std::path::Path;
use std::process::Stdio;

use maestro_core::MaestroError;
use maestro_core::text::tail_str;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Maximum stderr bytes carried into an error message.
const STDERR_TAIL_BYTES: usize = 512;

/// Run a git subcommand, mapping failure to `WorkspaceProvisionFailed`.
async fn run_git(
    args: &[&str],
    cwd: Option<&Path>,
    ssh_command: Option<&str>,
) -> Result<String, MaestroError> {
    let mut cmd = Command::new("git");
    let _ = cmd
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = cwd {
        let _ = cmd.current_dir(cwd);
    }
    if let Some(ssh) = ssh_command {
        let _ = cmd.env("GIT_SSH_COMMAND", ssh);
    }

    let output = cmd
        .output()
        .await
        .map_err(|e| MaestroError::WorkspaceProvisionFailed(format!("git spawn failed: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MaestroError::WorkspaceProvisionFailed(format!(
            "git {} failed: {}",
            args.first().unwrap_or(&""),
            tail_str(&stderr, STDERR_TAIL_BYTES)
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Shallow-clone `repo` into `dest`, optionally at `branch`.
#[instrument(skip_all, fields(repo, dest = %dest.display()))]
pub async fn clone_shallow(
    repo: &str,
    branch: Option<&str>,
    dest: &Path,
    ssh_command: Option<&str>,
) -> Result<(), MaestroError> {
    let dest_str = dest.to_string_lossy().into_owned();
    let mut args = vec!["clone", "--depth", "1"];
    if let Some(branch) = branch {
        args.push("--branch");
        args.push(branch);
    }
    args.push(repo);
    args.push(&dest_str);

    let _ = run_git(&args, None, ssh_command).await?;
    debug!(repo, "shallow clone complete");
    Ok(())
}

/// `git status --porcelain` of a workspace.
pub async fn status(workspace: &Path) -> Result<String, MaestroError> {
    run_git(&["status", "--porcelain"], Some(workspace), None).await
}

/// `git diff` of a workspace.
pub async fn diff(workspace: &Path) -> Result<String, MaestroError> {
    run_git(&["diff"], Some(workspace), None).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a local git repo fixture with one commit.
    async fn fixture_repo(dir: &Path) {
        for args in [
            vec!["init", "--initial-branch=main"],
            vec!["config", "user.email", "test@example.com"],
            vec!["config", "user.name", "Test"],
        ] {
            let _ = run_git(&args, Some(dir), None).await.unwrap();
        }
        tokio::fs::write(dir.join("README.md"), "hello\n").await.unwrap();
        let _ = run_git(&["add", "."], Some(dir), None).await.unwrap();
        let _ = run_git(&["commit", "-m", "init"], Some(dir), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn clone_shallow_local_repo() {
        let src = tempfile::tempdir().unwrap();
        fixture_repo(src.path()).await;

        let dst = tempfile::tempdir().unwrap();
        let dest = dst.path().join("clone");
        clone_shallow(&src.path().to_string_lossy(), None, &dest, None)
            .await
            .unwrap();
        assert!(dest.join("README.md").exists());
    }

    #[tokio::test]
    async fn clone_missing_repo_fails_with_provision_error() {
        let dst = tempfile::tempdir().unwrap();
        let err = clone_shallow(
            "/nonexistent/definitely/missing.git",
            None,
            &dst.path().join("clone"),
            None,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "WorkspaceProvisionFailed");
    }

    #[tokio::test]
    async fn status_reports_dirty_file() {
        let src = tempfile::tempdir().unwrap();
        fixture_repo(src.path()).await;
        tokio::fs::write(src.path().join("new.txt"), "x").await.unwrap();

        let out = status(src.path()).await.unwrap();
        assert!(out.contains("new.txt"));
    }

    #[tokio::test]
    async fn diff_reports_modification() {
        let src = tempfile::tempdir().unwrap();
        fixture_repo(src.path()).await;
        tokio::fs::write(src.path().join("README.md"), "changed\n")
            .await
            .unwrap();

        let out = diff(src.path()).await.unwrap();
        assert!(out.contains("changed"));
    }
}
