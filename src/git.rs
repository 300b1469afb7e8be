//! Low-level git subprocess plumbing: running `git`, and parsing its
//! porcelain output. Grounded in the teacher's
//! `Repository::run_command`/`Worktree::parse_porcelain_list`
//! (`git/repository/mod.rs`, `git/parse.rs`).

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::DevdeployError;
use crate::shell_exec::run;

/// Run `git <args>` in `dir`, returning trimmed stdout on success.
///
/// On failure, the error carries the trimmed stderr verbatim (falling back to
/// trimmed stdout, then the bare exit status) — this is spec.md §4.1's
/// "error carries the trimmed stderr verbatim" requirement, adapted from the
/// teacher's `Repository::run_command`.
pub fn run_command(dir: &Path, args: &[&str]) -> Result<String, DevdeployError> {
    let mut cmd = Command::new("git");
    cmd.args(args).current_dir(dir);
    let output = run(&mut cmd, Some(&dir.display().to_string()))?;

    if !output.status.success() {
        return Err(DevdeployError::from_git_output(
            format!("git {}", args.join(" ")),
            &output,
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Like `run_command`, but returns the raw `Output` even on failure so
/// callers can inspect stderr for idempotent-error matching.
pub fn run_command_output(dir: &Path, args: &[&str]) -> std::io::Result<std::process::Output> {
    let mut cmd = Command::new("git");
    cmd.args(args).current_dir(dir);
    run(&mut cmd, Some(&dir.display().to_string()))
}

/// A single block of `git worktree list --porcelain` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub head: String,
    pub branch: Option<String>,
    pub bare: bool,
    pub detached: bool,
}

impl WorktreeInfo {
    /// Parse `git worktree list --porcelain` output.
    ///
    /// Blocks start at `worktree <path>` and end at a blank line or EOF,
    /// matching the teacher's `Worktree::parse_porcelain_list`.
    pub fn parse_porcelain_list(output: &str) -> Result<Vec<Self>, DevdeployError> {
        let mut worktrees = Vec::new();
        let mut current: Option<WorktreeInfo> = None;

        for line in output.lines() {
            if line.is_empty() {
                if let Some(wt) = current.take() {
                    worktrees.push(wt);
                }
                continue;
            }

            let (key, value) = match line.split_once(' ') {
                Some((k, v)) => (k, Some(v)),
                None => (line, None),
            };

            match key {
                "worktree" => {
                    let path = value.ok_or_else(|| DevdeployError::MalformedOutput {
                        context: "git worktree list --porcelain".into(),
                        message: "worktree line missing path".into(),
                    })?;
                    current = Some(WorktreeInfo {
                        path: PathBuf::from(path),
                        head: String::new(),
                        branch: None,
                        bare: false,
                        detached: false,
                    });
                }
                "HEAD" => {
                    if let Some(wt) = current.as_mut() {
                        wt.head = value.unwrap_or_default().to_string();
                    }
                }
                "branch" => {
                    if let Some(wt) = current.as_mut() {
                        let branch_ref = value.unwrap_or_default();
                        wt.branch = Some(
                            branch_ref
                                .strip_prefix("refs/heads/")
                                .unwrap_or(branch_ref)
                                .to_string(),
                        );
                    }
                }
                "bare" => {
                    if let Some(wt) = current.as_mut() {
                        wt.bare = true;
                    }
                }
                "detached" => {
                    if let Some(wt) = current.as_mut() {
                        wt.detached = true;
                    }
                }
                _ => {}
            }
        }

        if let Some(wt) = current {
            worktrees.push(wt);
        }

        Ok(worktrees)
    }
}
