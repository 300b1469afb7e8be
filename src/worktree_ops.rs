//! C1 — WorktreeOps: low-level operations against a source repository.
//!
//! Grounded in the teacher's `Repository`/`Worktree` machinery
//! (`git/repository/worktrees.rs`, `git/repository/mod.rs`) but rebuilt
//! against this spec's narrower contract.

use std::path::{Path, PathBuf};

use rand::Rng;
use tempfile::TempDir;

use crate::error::DevdeployError;
use crate::git::{self, WorktreeInfo};

/// The ordered fallback candidates tried when `origin/HEAD` can't be resolved.
const DEFAULT_BRANCH_CANDIDATES: &[&str] = &["origin/main", "main", "origin/master", "master"];

/// Ask git for the default branch of `repo_path`.
///
/// Tries the symbolic ref of `refs/remotes/origin/HEAD` first; on failure,
/// tries each of `DEFAULT_BRANCH_CANDIDATES` in order via `rev-parse --verify`.
pub fn resolve_default_branch(repo_path: &Path) -> Result<String, DevdeployError> {
    if let Ok(output) = git::run_command(repo_path, &["symbolic-ref", "refs/remotes/origin/HEAD"])
        && let Some(branch) = output.strip_prefix("refs/remotes/")
    {
        return Ok(branch.to_string());
    }

    for candidate in DEFAULT_BRANCH_CANDIDATES {
        if git::run_command(repo_path, &["rev-parse", "--verify", candidate]).is_ok() {
            return Ok(candidate.to_string());
        }
    }

    Err(DevdeployError::DefaultBranchNotFound { repo_path: repo_path.to_path_buf() })
}

/// Resolve the *common* git directory for a path that may itself be a
/// worktree, by hand-parsing the `.git` file + `commondir` convention
/// (spec.md §4.1) — the teacher instead shells out to
/// `git rev-parse --git-common-dir`, which this crate avoids so
/// `RuleInjector` can locate `info/exclude` without another subprocess call.
pub fn resolve_common_dir(worktree_path: &Path) -> Result<PathBuf, DevdeployError> {
    let dot_git = worktree_path.join(".git");

    if dot_git.is_dir() {
        return Ok(dot_git);
    }

    let contents = std::fs::read_to_string(&dot_git)
        .map_err(|_| DevdeployError::MalformedGitFile { path: dot_git.clone() })?;
    let line = contents.lines().next().unwrap_or("");
    let gitdir = line
        .strip_prefix("gitdir:")
        .ok_or_else(|| DevdeployError::MalformedGitFile { path: dot_git.clone() })?
        .trim();

    let per_worktree_gitdir = resolve_against(worktree_path, gitdir);

    let commondir_file = per_worktree_gitdir.join("commondir");
    let Ok(commondir_contents) = std::fs::read_to_string(&commondir_file) else {
        // Defensive fallback per spec.md §9: should not trigger for
        // well-formed worktrees.
        return Ok(per_worktree_gitdir);
    };

    Ok(clean_path(&resolve_against(&per_worktree_gitdir, commondir_contents.trim())))
}

fn resolve_against(base: &Path, maybe_relative: &str) -> PathBuf {
    let candidate = Path::new(maybe_relative);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}

fn clean_path(path: &Path) -> PathBuf {
    normalize_path::NormalizePath::normalize(path)
}

/// Options for [`add_worktree`].
pub struct AddWorktreeOptions<'a> {
    pub source_repo: &'a Path,
    pub worktree_path: &'a Path,
    pub branch: &'a str,
    pub base_ref: &'a str,
    pub disable_hooks: bool,
}

/// Add a worktree, creating the branch if it doesn't already exist in
/// `source_repo`. Does not modify the source repo's HEAD.
///
/// On reuse of an existing branch, merges `opts.base_ref` into the new
/// worktree (spec.md §3's "on reuse, merge the default branch into the
/// worktree without touching the source repo's HEAD") — the merge runs with
/// the worktree itself as the working directory, never the source repo.
pub fn add_worktree(opts: AddWorktreeOptions) -> Result<(), DevdeployError> {
    let hooks_dir = if opts.disable_hooks { Some(empty_hooks_dir()?) } else { None };
    let hooks_override = hooks_override_args(hooks_dir.as_ref().map(TempDir::path));
    let hooks_override: Vec<&str> = hooks_override.iter().map(String::as_str).collect();

    let branch_ref = format!("refs/heads/{}", opts.branch);
    let branch_exists =
        git::run_command(opts.source_repo, &["rev-parse", "--verify", &branch_ref]).is_ok();

    let path_str = opts.worktree_path.display().to_string();
    if branch_exists {
        let mut add_args = hooks_override.clone();
        add_args.extend(["worktree", "add", &path_str, opts.branch]);
        git::run_command(opts.source_repo, &add_args)?;

        let mut merge_args = hooks_override;
        merge_args.extend(["merge", opts.base_ref, "--no-edit"]);
        git::run_command(opts.worktree_path, &merge_args)?;
    } else {
        let mut add_args = hooks_override;
        add_args.extend(["worktree", "add", "-b", opts.branch, &path_str, opts.base_ref]);
        git::run_command(opts.source_repo, &add_args)?;
    }

    Ok(())
}

/// An empty temp directory to point `core.hooksPath` at for the duration of
/// a single git invocation, via a `-c core.hooksPath=<dir>` override
/// ([`hooks_override_args`]) rather than `git config`, which would write a
/// persistent entry into the repo's own `.git/config` and leave it dangling
/// once the directory is removed.
fn empty_hooks_dir() -> Result<TempDir, DevdeployError> {
    TempDir::new().map_err(DevdeployError::from)
}

/// `["-c", "core.hooksPath=<dir>"]` if `hooks_dir` is set, else empty —
/// prepend to a git argument list to suppress repo-local hooks for just that
/// invocation.
fn hooks_override_args(hooks_dir: Option<&Path>) -> Vec<String> {
    match hooks_dir {
        Some(dir) => vec!["-c".to_string(), format!("core.hooksPath={}", dir.display())],
        None => Vec::new(),
    }
}

const IDEMPOTENT_STDERR_MARKERS: &[&str] = &["not found", "No such file", "is not a working tree"];

/// Remove a worktree with `git worktree remove --force`.
///
/// When `idempotent` is true, swallows errors whose stderr contains any of
/// `IDEMPOTENT_STDERR_MARKERS`.
pub fn remove_worktree(
    source_repo: &Path,
    worktree_path: &Path,
    idempotent: bool,
) -> Result<(), DevdeployError> {
    let path_str = worktree_path.display().to_string();
    let output = git::run_command_output(source_repo, &["worktree", "remove", "--force", &path_str])
        .map_err(DevdeployError::from)?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    if idempotent && IDEMPOTENT_STDERR_MARKERS.iter().any(|m| stderr.contains(m)) {
        return Ok(());
    }

    Err(DevdeployError::from_git_output("git worktree remove --force", &output))
}

/// Find the first worktree checked out on `branch`, optionally skipping the
/// source repo itself (path comparison is symlink-resolved).
pub fn find_worktree_for_branch(
    source_repo: &Path,
    branch: &str,
    exclude_source: bool,
) -> Result<Option<PathBuf>, DevdeployError> {
    let output = git::run_command(source_repo, &["worktree", "list", "--porcelain"])?;
    let worktrees = WorktreeInfo::parse_porcelain_list(&output)?;

    let canonical_source = dunce::canonicalize(source_repo).ok();

    for wt in worktrees {
        if wt.branch.as_deref() != Some(branch) {
            continue;
        }
        if exclude_source {
            let canonical_wt = dunce::canonicalize(&wt.path).ok();
            if canonical_wt.is_some() && canonical_wt == canonical_source {
                continue;
            }
        }
        return Ok(Some(wt.path));
    }

    Ok(None)
}

/// Generate a 3-character lowercase-alphanumeric branch-name suffix.
/// Not cryptographic — only meant to reduce collision probability across
/// racing instances (spec.md §4.1).
pub fn random_branch_suffix() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..3)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Build the `devdeploy/<project>-<suffix>` branch name contract from
/// spec.md §4.1.
pub fn new_branch_name(normalized_project: &str) -> String {
    format!("devdeploy/{normalized_project}-{}", random_branch_suffix())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn init_repo(dir: &Path) {
        Command::new("git").arg("init").arg("-q").arg(dir).output().unwrap();
        Command::new("git")
            .args(["-C", dir.to_str().unwrap(), "config", "user.email", "t@t.com"])
            .output()
            .unwrap();
        Command::new("git")
            .args(["-C", dir.to_str().unwrap(), "config", "user.name", "t"])
            .output()
            .unwrap();
        std::fs::write(dir.join("f"), "x").unwrap();
        Command::new("git")
            .args(["-C", dir.to_str().unwrap(), "add", "."])
            .output()
            .unwrap();
        Command::new("git")
            .args(["-C", dir.to_str().unwrap(), "commit", "-q", "-m", "init"])
            .output()
            .unwrap();
    }

    #[test]
    fn random_branch_suffix_is_three_lowercase_alphanumeric_chars() {
        let suffix = random_branch_suffix();
        assert_eq!(suffix.len(), 3);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn new_branch_name_has_expected_shape() {
        let name = new_branch_name("my-project");
        assert!(name.starts_with("devdeploy/my-project-"));
    }

    #[test]
    fn resolve_common_dir_returns_dot_git_for_main_repo() {
        let tmp = tempfile::tempdir().unwrap();
        init_repo(tmp.path());
        let common = resolve_common_dir(tmp.path()).unwrap();
        assert_eq!(common, tmp.path().join(".git"));
    }

    #[test]
    fn resolve_common_dir_follows_gitdir_and_commondir_for_worktree() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source");
        std::fs::create_dir_all(&source).unwrap();
        init_repo(&source);

        let wt_path = tmp.path().join("wt");
        let out = Command::new("git")
            .args([
                "-C",
                source.to_str().unwrap(),
                "worktree",
                "add",
                "-b",
                "feature",
                wt_path.to_str().unwrap(),
            ])
            .output()
            .unwrap();
        assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

        let common = resolve_common_dir(&wt_path).unwrap();
        assert_eq!(dunce::canonicalize(&common).unwrap(), dunce::canonicalize(source.join(".git")).unwrap());
    }

    #[test]
    fn resolve_common_dir_rejects_malformed_git_file() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(".git"), "not-a-gitdir-line\n").unwrap();
        let err = resolve_common_dir(tmp.path()).unwrap_err();
        assert!(matches!(err, DevdeployError::MalformedGitFile { .. }));
    }

    #[test]
    fn add_and_remove_worktree_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        init_repo(tmp.path());

        let wt_path = tmp.path().join("wt");
        add_worktree(AddWorktreeOptions {
            source_repo: tmp.path(),
            worktree_path: &wt_path,
            branch: "feature",
            base_ref: "HEAD",
            disable_hooks: true,
        })
        .unwrap();
        assert!(wt_path.join("f").exists());

        let found = find_worktree_for_branch(tmp.path(), "feature", true).unwrap();
        assert_eq!(dunce::canonicalize(found.unwrap()).unwrap(), dunce::canonicalize(&wt_path).unwrap());

        remove_worktree(tmp.path(), &wt_path, false).unwrap();
        assert!(!wt_path.exists());

        // Idempotent removal of an already-gone worktree must not error.
        remove_worktree(tmp.path(), &wt_path, true).unwrap();
    }

    #[test]
    fn reusing_an_existing_branch_merges_base_ref_without_touching_source_head() {
        let tmp = tempfile::tempdir().unwrap();
        init_repo(tmp.path());
        // `base_ref` is resolved from inside the new worktree (not the source
        // repo), so it must be a name that means the same thing there — the
        // default branch's own name, not the literal "HEAD".
        let default_branch = git::run_command(tmp.path(), &["rev-parse", "--abbrev-ref", "HEAD"]).unwrap();

        // Create the branch once, then free it up again by removing its worktree.
        let first_wt = tmp.path().join("wt1");
        add_worktree(AddWorktreeOptions {
            source_repo: tmp.path(),
            worktree_path: &first_wt,
            branch: "feature",
            base_ref: &default_branch,
            disable_hooks: true,
        })
        .unwrap();
        remove_worktree(tmp.path(), &first_wt, false).unwrap();

        // Advance the source repo's default branch past the fork point.
        std::fs::write(tmp.path().join("new-file"), "y").unwrap();
        Command::new("git").args(["-C", tmp.path().to_str().unwrap(), "add", "."]).output().unwrap();
        Command::new("git")
            .args(["-C", tmp.path().to_str().unwrap(), "commit", "-q", "-m", "advance"])
            .output()
            .unwrap();
        let source_head_before_reuse = git::run_command(tmp.path(), &["rev-parse", "HEAD"]).unwrap();

        // Reusing "feature" (branch_exists arm) should merge the now-advanced
        // HEAD into the worktree, without moving the source repo's own HEAD.
        let second_wt = tmp.path().join("wt2");
        add_worktree(AddWorktreeOptions {
            source_repo: tmp.path(),
            worktree_path: &second_wt,
            branch: "feature",
            base_ref: &default_branch,
            disable_hooks: true,
        })
        .unwrap();

        assert!(second_wt.join("new-file").exists(), "merge should bring in the base ref's new commit");
        let source_head_after = git::run_command(tmp.path(), &["rev-parse", "HEAD"]).unwrap();
        assert_eq!(source_head_before_reuse, source_head_after, "merge must not move the source repo's HEAD");
    }
}
