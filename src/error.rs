//! Error types for the project-resource engine.

use std::path::PathBuf;

/// Errors surfaced by the core. One flat enum, matching the teacher's
/// `GitError` shape: hand-written `Display`, no `thiserror`.
#[derive(Debug)]
pub enum DevdeployError {
    /// A project directory does not exist.
    ProjectMissing { name: String },
    /// The workspace has no main repo by this name.
    SourceRepoMissing { repo: String },
    /// `ResolveDefaultBranch` exhausted every candidate.
    DefaultBranchNotFound { repo_path: PathBuf },
    /// `EnsurePRWorktree` could not resolve the branch locally or via origin.
    BranchNotFound { branch: String },
    /// A git subprocess exited non-zero; `stderr` is preserved verbatim.
    GitSubprocessFailed { command: String, stderr: String },
    /// The forge CLI binary was absent or failed to spawn.
    ForgeUnavailable { message: String },
    /// The forge CLI exited non-zero.
    ForgeExit { command: String, stderr: String },
    /// The forge CLI's JSON output failed to decode.
    MalformedOutput { context: String, message: String },
    /// `ResolveCommonDir` found a `.git` file without a `gitdir:` prefix.
    MalformedGitFile { path: PathBuf },
    /// `ParseResourceKey` received a string that doesn't match the grammar.
    InvalidResourceKey { input: String },
}

impl DevdeployError {
    /// Build a `GitSubprocessFailed`, preferring the subprocess's stderr and
    /// falling back to the OS-level message when stderr was empty.
    pub fn from_git_output(command: impl Into<String>, output: &std::process::Output) -> Self {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = if !stderr.is_empty() {
            stderr
        } else if !stdout.is_empty() {
            stdout
        } else {
            format!("exited with {}", output.status)
        };
        DevdeployError::GitSubprocessFailed { command: command.into(), stderr }
    }
}

impl std::fmt::Display for DevdeployError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DevdeployError::ProjectMissing { name } => {
                write!(f, "project {name:?} does not exist")
            }
            DevdeployError::SourceRepoMissing { repo } => {
                write!(f, "no source repo named {repo:?} in the workspace")
            }
            DevdeployError::DefaultBranchNotFound { repo_path } => {
                write!(
                    f,
                    "could not resolve a default branch for {}",
                    repo_path.display()
                )
            }
            DevdeployError::BranchNotFound { branch } => {
                write!(f, "branch {branch:?} not found locally or on origin")
            }
            DevdeployError::GitSubprocessFailed { command, stderr } => {
                write!(f, "`{command}` failed: {stderr}")
            }
            DevdeployError::ForgeUnavailable { message } => {
                write!(f, "forge CLI unavailable: {message}")
            }
            DevdeployError::ForgeExit { command, stderr } => {
                write!(f, "`{command}` failed: {stderr}")
            }
            DevdeployError::MalformedOutput { context, message } => {
                write!(f, "malformed output from {context}: {message}")
            }
            DevdeployError::MalformedGitFile { path } => {
                write!(f, "{} is not a well-formed git worktree file", path.display())
            }
            DevdeployError::InvalidResourceKey { input } => {
                write!(f, "invalid resource key: {input:?}")
            }
        }
    }
}

impl std::error::Error for DevdeployError {}

// Mirrors the teacher's `From<io::Error> for GitError`: `run()` never embeds
// exit codes into io::Error here (we keep Output around instead), but a bare
// io::Error (e.g. ENOENT spawning the binary) still needs a conversion path.
impl From<std::io::Error> for DevdeployError {
    fn from(e: std::io::Error) -> Self {
        DevdeployError::ForgeUnavailable { message: e.to_string() }
    }
}
