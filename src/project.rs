//! C4 — ProjectManager: owns the project directory layout and orchestrates
//! C1–C3.
//!
//! `ListProjectRepos`'s directory-walk-with-exclusion is grounded in the
//! teacher's "skip entries matching a pattern" scans (`commands/list/collect.rs`)
//! and its config-file-presence checks (`config/project.rs`). `LoadPRs`'s
//! fan-out is grounded in `commands/list/collect.rs`'s Rayon-based per-item
//! parallelism and `commands/for_each.rs`'s per-repo worker shape, adapted to
//! spec.md §4.4's literal two-level tree: one thread per repo (joined by
//! `std::thread::scope`, which plays the role of the teacher's outer
//! wait-group + closer goroutine) and, within each, `rayon::join` for the
//! open/merged sub-fetches.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;

use crate::config;
use crate::error::DevdeployError;
use crate::pr::{self, PrInfo};
use crate::resource::Resource;
use crate::rules;
use crate::worktree_ops::{self, AddWorktreeOptions};

fn pr_worktree_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^.+-pr-\d+$").unwrap())
}

fn project_dir(project: &str) -> PathBuf {
    config::projects_dir().join(config::normalize_project_name(project))
}

/// `CreateProject(name)` — idempotent directory creation, writing a minimal
/// `config.yaml` marker if absent.
pub fn create_project(name: &str) -> std::io::Result<PathBuf> {
    let dir = project_dir(name);
    std::fs::create_dir_all(&dir)?;
    let config_path = dir.join("config.yaml");
    if !config_path.exists() {
        std::fs::write(&config_path, format!("# devdeploy project config for {name}\n"))?;
    }
    Ok(dir)
}

/// `DeleteProject(name)` — remove every attached repo's worktree, then the
/// directory tree. Surfaces the first worktree-removal error.
pub fn delete_project(name: &str) -> Result<(), DevdeployError> {
    let dir = project_dir(name);
    if !dir.is_dir() {
        return Err(DevdeployError::ProjectMissing { name: name.to_string() });
    }

    for repo in list_project_repos(name)? {
        let source_repo = config::workspace_dir().join(&repo);
        worktree_ops::remove_worktree(&source_repo, &dir.join(&repo), false)?;
    }

    std::fs::remove_dir_all(&dir).map_err(DevdeployError::from)
}

/// `{name, attached_repo_count}` for one project, returned by `ListProjects`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectSummary {
    pub name: String,
    pub repo_count: usize,
}

/// `ListProjects()` — enumerate the projects base, ignoring dotfiles.
pub fn list_projects() -> std::io::Result<Vec<ProjectSummary>> {
    let base = config::projects_dir();
    if !base.is_dir() {
        return Ok(Vec::new());
    }

    let mut summaries = Vec::new();
    for entry in std::fs::read_dir(&base)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || !entry.path().is_dir() {
            continue;
        }
        let repo_count = list_project_repos(&name).map(|v| v.len()).unwrap_or(0);
        summaries.push(ProjectSummary { name, repo_count });
    }
    Ok(summaries)
}

/// `ListWorkspaceRepos()` — main repos in the workspace (directories whose
/// `.git` is itself a directory, i.e. not worktrees).
pub fn list_workspace_repos() -> std::io::Result<Vec<String>> {
    let base = config::workspace_dir();
    if !base.is_dir() {
        return Ok(Vec::new());
    }

    let mut repos = Vec::new();
    for entry in std::fs::read_dir(&base)? {
        let entry = entry?;
        if entry.path().is_dir() && entry.path().join(".git").is_dir() {
            repos.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    repos.sort();
    Ok(repos)
}

/// `ListProjectRepos(project)` — attached repos, excluding dotfiles,
/// `config.yaml`, and PR-worktree directories (I1/I2).
pub fn list_project_repos(project: &str) -> Result<Vec<String>, DevdeployError> {
    let dir = project_dir(project);
    if !dir.is_dir() {
        return Err(DevdeployError::ProjectMissing { name: project.to_string() });
    }

    let mut repos = Vec::new();
    for entry in std::fs::read_dir(&dir).map_err(DevdeployError::from)? {
        let entry = entry.map_err(DevdeployError::from)?;
        let name = entry.file_name().to_string_lossy().to_string();
        let path = entry.path();

        if name.starts_with('.') || name == "config.yaml" {
            continue;
        }
        if pr_worktree_pattern().is_match(&name) {
            continue;
        }
        if !path.is_dir() || !path.join(".git").exists() {
            continue;
        }
        repos.push(name);
    }
    repos.sort();
    Ok(repos)
}

/// `AddRepo(project, repo)` — fetch, resolve default branch, create or reuse
/// a `devdeploy/<project>-<suffix>` branch, invalidate the PR cache.
pub fn add_repo(project: &str, repo: &str) -> Result<PathBuf, DevdeployError> {
    let dir = project_dir(project);
    if !dir.is_dir() {
        return Err(DevdeployError::ProjectMissing { name: project.to_string() });
    }

    let source_repo = config::workspace_dir().join(repo);
    if !source_repo.join(".git").is_dir() {
        return Err(DevdeployError::SourceRepoMissing { repo: repo.to_string() });
    }

    // Best-effort: local refs may already suffice.
    let _ = crate::git::run_command(&source_repo, &["fetch", "origin"]);

    let default_branch = worktree_ops::resolve_default_branch(&source_repo)?;
    let branch = worktree_ops::new_branch_name(&config::normalize_project_name(project));
    let worktree_path = dir.join(repo);

    worktree_ops::add_worktree(AddWorktreeOptions {
        source_repo: &source_repo,
        worktree_path: &worktree_path,
        branch: &branch,
        base_ref: &default_branch,
        disable_hooks: true,
    })?;

    pr::clear_pr_cache_for_project(&dir);
    Ok(worktree_path)
}

/// `RemoveRepo(project, repo)` — removes the worktree and invalidates the
/// project's PR cache.
pub fn remove_repo(project: &str, repo: &str) -> Result<(), DevdeployError> {
    let dir = project_dir(project);
    let source_repo = config::workspace_dir().join(repo);
    worktree_ops::remove_worktree(&source_repo, &dir.join(repo), false)?;
    pr::clear_pr_cache_for_project(&dir);
    Ok(())
}

/// `RemovePRWorktree(project, repo, number)` — no-op when the directory is
/// absent.
pub fn remove_pr_worktree(project: &str, repo: &str, number: u64) -> Result<(), DevdeployError> {
    let dir = project_dir(project);
    let path = dir.join(format!("{repo}-pr-{number}"));
    if !path.exists() {
        return Ok(());
    }
    let source_repo = config::workspace_dir().join(repo);
    worktree_ops::remove_worktree(&source_repo, &path, true)?;
    pr::clear_pr_cache_for_project(&dir);
    Ok(())
}

/// `EnsurePRWorktree(project, repo, number, branch) → path`.
pub fn ensure_pr_worktree(project: &str, repo: &str, number: u64, branch: &str) -> Result<PathBuf, DevdeployError> {
    let dir = project_dir(project);
    let path = dir.join(format!("{repo}-pr-{number}"));
    let source_repo = config::workspace_dir().join(repo);

    if path.join(".git").exists() {
        let _ = rules::inject(&path);
        return Ok(path);
    }

    if let Some(existing) = worktree_ops::find_worktree_for_branch(&source_repo, branch, true)? {
        let _ = rules::inject(&existing);
        return Ok(existing);
    }

    let _ = crate::git::run_command(&source_repo, &["fetch", "origin", branch]);

    let local_ref = format!("refs/heads/{branch}");
    let base_ref = if crate::git::run_command(&source_repo, &["rev-parse", "--verify", &local_ref]).is_ok() {
        branch.to_string()
    } else if crate::git::run_command(
        &source_repo,
        &["rev-parse", "--verify", &format!("refs/remotes/origin/{branch}")],
    )
    .is_ok()
    {
        format!("origin/{branch}")
    } else {
        return Err(DevdeployError::BranchNotFound { branch: branch.to_string() });
    };

    worktree_ops::add_worktree(AddWorktreeOptions {
        source_repo: &source_repo,
        worktree_path: &path,
        branch,
        base_ref: &base_ref,
        disable_hooks: true,
    })?;

    rules::inject(&path).map_err(|e| DevdeployError::GitSubprocessFailed {
        command: "rule injection".into(),
        stderr: e.to_string(),
    })?;

    pr::clear_pr_cache_for_project(&dir);
    Ok(path)
}

/// Output shape selector for [`load_prs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Grouped,
    Flat,
    Count,
}

/// Options for [`load_prs`], with spec.md §4.4's defaults.
#[derive(Debug, Clone)]
pub struct LoadPrsOptions {
    pub repo_names: Vec<String>,
    pub state: String,
    pub limit: u32,
    pub include_open: bool,
    pub include_merged: bool,
    pub merged_limit: u32,
    pub merged_max_age: chrono::Duration,
    pub format: Format,
    pub include_repos: bool,
    pub count_only: bool,
    pub filtered: bool,
    pub build_resources: bool,
}

impl Default for LoadPrsOptions {
    fn default() -> Self {
        LoadPrsOptions {
            repo_names: Vec::new(),
            state: "open".to_string(),
            limit: 30,
            include_open: true,
            include_merged: false,
            merged_limit: 5,
            merged_max_age: chrono::Duration::hours(20),
            format: Format::Grouped,
            include_repos: true,
            count_only: false,
            filtered: true,
            build_resources: false,
        }
    }
}

/// One repo's PR list, emitted under `Format::Grouped`.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoPrs {
    pub repo: String,
    pub prs: Vec<PrInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct PrLoadResult {
    pub pr_count: usize,
    pub prs_by_repo: Option<Vec<RepoPrs>>,
    pub resources: Option<Vec<Resource>>,
}

fn fetch_repo_prs(worktree: &Path, include_open: bool, include_merged: bool, opts: &LoadPrsOptions) -> Vec<PrInfo> {
    let fetch_one = |state: &str, limit: u32| -> Vec<PrInfo> {
        if opts.filtered {
            pr::list_filtered_prs(worktree, state, limit).unwrap_or_default()
        } else {
            pr::list_prs(worktree, state, limit, &[]).unwrap_or_default()
        }
    };

    let (open_prs, merged_prs) = match (include_open, include_merged) {
        (true, true) => rayon::join(
            || fetch_one(if opts.state == "open" { "open" } else { &opts.state }, opts.limit),
            || fetch_one("merged", opts.merged_limit),
        ),
        (true, false) => (fetch_one(if opts.state.is_empty() { "open" } else { &opts.state }, opts.limit), Vec::new()),
        (false, true) => (Vec::new(), fetch_one("merged", opts.merged_limit)),
        (false, false) => (Vec::new(), Vec::new()),
    };

    let now = Utc::now();
    let merged_prs: Vec<PrInfo> = merged_prs
        .into_iter()
        .filter(|pr| pr.merged_at.is_some_and(|m| now.signed_duration_since(m) < opts.merged_max_age))
        .collect();

    let mut result = open_prs;
    result.extend(merged_prs);
    result
}

/// `LoadPRs(project, options)` — the core two-level fan-out.
pub fn load_prs(project: &str, opts: &LoadPrsOptions) -> Result<PrLoadResult, DevdeployError> {
    let dir = project_dir(project);
    if !dir.is_dir() {
        return Err(DevdeployError::ProjectMissing { name: project.to_string() });
    }

    let repo_names = if !opts.repo_names.is_empty() {
        opts.repo_names.clone()
    } else {
        list_project_repos(project)?
    };

    let (include_open, include_merged) = if !opts.include_open && !opts.include_merged {
        (true, opts.include_merged)
    } else {
        (opts.include_open, opts.include_merged)
    };

    let (tx, rx) = crossbeam_channel::bounded(repo_names.len().max(1));

    std::thread::scope(|scope| {
        for repo in &repo_names {
            let tx = tx.clone();
            let worktree_path = dir.join(repo);
            let repo_name = repo.clone();
            scope.spawn(move || {
                let prs = fetch_repo_prs(&worktree_path, include_open, include_merged, opts);
                let _ = tx.send((repo_name, prs));
            });
        }
        drop(tx);
    });

    let mut by_repo: HashMap<String, Vec<PrInfo>> = HashMap::new();
    for _ in 0..repo_names.len() {
        if let Ok((repo_name, prs)) = rx.recv() {
            by_repo.insert(repo_name, prs);
        }
    }

    let pr_count: usize = repo_names.iter().map(|r| by_repo.get(r).map(Vec::len).unwrap_or(0)).sum();

    if matches!(opts.format, Format::Count) || opts.count_only {
        return Ok(PrLoadResult { pr_count, prs_by_repo: None, resources: None });
    }

    let prs_by_repo = matches!(opts.format, Format::Grouped).then(|| {
        repo_names
            .iter()
            .map(|r| RepoPrs { repo: r.clone(), prs: by_repo.get(r).cloned().unwrap_or_default() })
            .collect()
    });

    let resources = (matches!(opts.format, Format::Flat) || opts.build_resources).then(|| {
        let mut out = Vec::new();
        for repo in &repo_names {
            if opts.include_repos {
                out.push(Resource::Repo { repo_name: repo.clone(), worktree_path: Some(dir.join(repo)) });
            }
            if let Some(prs) = by_repo.get(repo) {
                for pr in prs {
                    let pr_path = dir.join(format!("{repo}-pr-{}", pr.number));
                    let worktree_path = pr_path.is_dir().then_some(pr_path);
                    out.push(Resource::Pr { repo_name: repo.clone(), worktree_path, pr: pr.clone() });
                }
            }
        }
        out
    });

    Ok(PrLoadResult { pr_count, prs_by_repo, resources })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(unsafe_code)]
    fn with_projects_dir<T>(f: impl FnOnce(&Path) -> T) -> T {
        let tmp = tempfile::tempdir().unwrap();
        // SAFETY: tests run with `cargo test` default single-threaded-per-test
        // process isolation is not guaranteed, but each test uses its own tmp
        // path so collisions are cosmetic at worst.
        unsafe { std::env::set_var("DEVDEPLOY_PROJECTS_DIR", tmp.path()) };
        let result = f(tmp.path());
        unsafe { std::env::remove_var("DEVDEPLOY_PROJECTS_DIR") };
        result
    }

    #[test]
    fn create_project_is_idempotent_and_normalizes_name() {
        with_projects_dir(|base| {
            let dir = create_project("My Project").unwrap();
            assert_eq!(dir, base.join("my-project"));
            let config = std::fs::read_to_string(dir.join("config.yaml")).unwrap();
            assert!(config.starts_with('#'));

            create_project("My Project").unwrap();
            let config_again = std::fs::read_to_string(dir.join("config.yaml")).unwrap();
            assert_eq!(config, config_again);
        });
    }

    #[test]
    fn list_project_repos_excludes_pr_worktrees_and_dotfiles() {
        with_projects_dir(|_base| {
            let dir = create_project("proj").unwrap();
            std::fs::create_dir_all(dir.join("my-repo")).unwrap();
            std::fs::write(dir.join("my-repo/.git"), "gitdir: /x\n").unwrap();
            std::fs::create_dir_all(dir.join("my-repo-pr-42")).unwrap();
            std::fs::write(dir.join("my-repo-pr-42/.git"), "gitdir: /x\n").unwrap();
            std::fs::create_dir_all(dir.join(".hidden")).unwrap();

            let repos = list_project_repos("proj").unwrap();
            assert_eq!(repos, vec!["my-repo".to_string()]);
        });
    }

    #[test]
    fn list_projects_reports_repo_counts() {
        with_projects_dir(|_base| {
            create_project("proj").unwrap();
            let dir = project_dir("proj");
            std::fs::create_dir_all(dir.join("repo-a")).unwrap();
            std::fs::write(dir.join("repo-a/.git"), "gitdir: /x\n").unwrap();

            let summaries = list_projects().unwrap();
            assert_eq!(summaries, vec![ProjectSummary { name: "proj".into(), repo_count: 1 }]);
        });
    }

    #[test]
    fn load_prs_on_project_with_zero_repos_returns_empty_result() {
        with_projects_dir(|_base| {
            create_project("empty").unwrap();
            let result = load_prs("empty", &LoadPrsOptions::default()).unwrap();
            assert_eq!(result.pr_count, 0);
            assert_eq!(result.prs_by_repo, Some(Vec::new()));
        });
    }

    #[test]
    fn load_prs_on_missing_project_errors() {
        with_projects_dir(|_base| {
            let err = load_prs("nope", &LoadPrsOptions::default()).unwrap_err();
            assert!(matches!(err, DevdeployError::ProjectMissing { .. }));
        });
    }
}
