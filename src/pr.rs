//! C3 — PRFetcher: forge-CLI-backed PR discovery with a TTL cache.
//!
//! `Command::new("gh")` invocation, `--json` field lists, and the
//! `parse_json` decode-with-context shape are lifted from
//! `commands/list/ci_status.rs::detect_github`. The owner-resolution
//! sub-call mirrors that file's "best-effort secondary `gh` call, `None` on
//! any failure" pattern.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{OnceLock, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::REVIEW_TEAM_SLUG;
use crate::error::DevdeployError;
use crate::shell_exec::run;

const CACHE_TTL_SECS: u64 = 45;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, Deserialize)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PrState {
    Open,
    Merged,
    Closed,
}

/// `{number, title, state, headRefName, mergedAt}`, the PR wire shape
/// (spec.md §6). Value-typed, freely cloned.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PrInfo {
    #[serde(default)]
    pub number: u64,
    #[serde(default)]
    pub title: String,
    pub state: PrState,
    #[serde(rename = "headRefName", default)]
    pub head_ref: String,
    #[serde(rename = "mergedAt", default)]
    pub merged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PrCacheKey {
    worktree: PathBuf,
    state: String,
    limit: i64,
}

#[derive(Debug, Clone)]
struct PrCacheEntry {
    prs: Vec<PrInfo>,
    cached_at: Instant,
}

fn cache() -> &'static RwLock<HashMap<PrCacheKey, PrCacheEntry>> {
    static CACHE: OnceLock<RwLock<HashMap<PrCacheKey, PrCacheEntry>>> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

fn cache_lookup(key: &PrCacheKey) -> Option<Vec<PrInfo>> {
    let guard = cache().read().unwrap();
    let entry = guard.get(key)?;
    if entry.cached_at.elapsed().as_secs() <= CACHE_TTL_SECS {
        Some(entry.prs.clone())
    } else {
        None
    }
}

fn cache_store(key: PrCacheKey, prs: Vec<PrInfo>) {
    let mut guard = cache().write().unwrap();
    guard.insert(key, PrCacheEntry { prs, cached_at: Instant::now() });
}

/// Drop every cache entry.
pub fn clear_pr_cache() {
    cache().write().unwrap().clear();
}

/// Drop every cache entry whose worktree path is under `project_dir`.
pub fn clear_pr_cache_for_project(project_dir: &Path) {
    cache().write().unwrap().retain(|key, _| !key.worktree.starts_with(project_dir));
}

fn configure_non_interactive(cmd: &mut Command) {
    cmd.stdin(Stdio::null());
    cmd.env("GH_PROMPT_DISABLED", "1");
}

fn parse_json<T: serde::de::DeserializeOwned>(bytes: &[u8], context: &str) -> Result<T, DevdeployError> {
    serde_json::from_slice(bytes).map_err(|e| DevdeployError::MalformedOutput {
        context: context.to_string(),
        message: e.to_string(),
    })
}

/// Invoke the forge CLI inside `worktree`, requesting the standard JSON
/// projection. `state = "open"` omits `--state` (gh's own default);
/// `limit = 0` omits `--limit` ("CLI default").
pub fn list_prs(
    worktree: &Path,
    state: &str,
    limit: u32,
    extra_flags: &[&str],
) -> Result<Vec<PrInfo>, DevdeployError> {
    let mut cmd = Command::new("gh");
    cmd.current_dir(worktree);
    cmd.args(["pr", "list", "--json", "number,title,state,headRefName,mergedAt"]);
    if state != "open" {
        cmd.args(["--state", state]);
    }
    if limit > 0 {
        cmd.args(["--limit", &limit.to_string()]);
    }
    cmd.args(extra_flags);
    configure_non_interactive(&mut cmd);

    let output = run(&mut cmd, Some("gh pr list")).map_err(|e| DevdeployError::ForgeUnavailable {
        message: e.to_string(),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(DevdeployError::ForgeExit { command: "gh pr list".into(), stderr });
    }

    parse_json(&output.stdout, "gh pr list")
}

/// Best-effort: resolve the repo owner login via `gh repo view`, `None` on
/// any failure (spawn failure, non-zero exit, or malformed output).
fn resolve_owner(worktree: &Path) -> Option<String> {
    let mut cmd = Command::new("gh");
    cmd.current_dir(worktree);
    cmd.args(["repo", "view", "--json", "owner", "-q", ".owner.login"]);
    configure_non_interactive(&mut cmd);

    let output = run(&mut cmd, Some("gh repo view")).ok()?;
    if !output.status.success() {
        return None;
    }
    let owner = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!owner.is_empty()).then_some(owner)
}

/// Issue the author-authored and team-review-requested queries, merge with
/// dedup by PR number (author result takes precedence on collision), and
/// serve/populate the TTL cache.
pub fn list_filtered_prs(worktree: &Path, state: &str, limit: u32) -> Result<Vec<PrInfo>, DevdeployError> {
    let key = PrCacheKey { worktree: worktree.to_path_buf(), state: state.to_string(), limit: limit as i64 };
    if let Some(cached) = cache_lookup(&key) {
        return Ok(cached);
    }

    let author_result = list_prs(worktree, state, limit, &["--author", "@me"]);

    let team_result = resolve_owner(worktree).map(|owner| {
        let search = format!("team-review-requested:{owner}/{REVIEW_TEAM_SLUG}");
        list_prs(worktree, state, limit, &["--search", &search])
    });

    let merged = match (author_result, team_result) {
        (Ok(authored), Some(Ok(team))) => Ok(merge_dedup(authored, team)),
        (Ok(authored), None) => Ok(authored),
        (Ok(authored), Some(Err(_))) => Ok(authored),
        (Err(_), Some(Ok(team))) => Ok(team),
        (Err(e), Some(Err(_))) => Err(e),
        (Err(e), None) => Err(e),
    }?;

    cache_store(key, merged.clone());
    Ok(merged)
}

/// Merge two PR lists, deduplicating by `number`; `primary` wins on
/// collision.
fn merge_dedup(primary: Vec<PrInfo>, secondary: Vec<PrInfo>) -> Vec<PrInfo> {
    let mut seen: std::collections::HashSet<u64> = primary.iter().map(|pr| pr.number).collect();
    let mut merged = primary;
    for pr in secondary {
        if seen.insert(pr.number) {
            merged.push(pr);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_dedup_prefers_primary_on_collision() {
        let primary = vec![PrInfo {
            number: 1,
            title: "primary".into(),
            state: PrState::Open,
            head_ref: "a".into(),
            merged_at: None,
        }];
        let secondary = vec![
            PrInfo { number: 1, title: "secondary".into(), state: PrState::Open, head_ref: "a".into(), merged_at: None },
            PrInfo { number: 2, title: "only-secondary".into(), state: PrState::Open, head_ref: "b".into(), merged_at: None },
        ];
        let merged = merge_dedup(primary, secondary);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].title, "primary");
        assert_eq!(merged[1].number, 2);
    }

    #[test]
    fn pr_info_treats_null_and_absent_merged_at_equivalently() {
        let with_null: PrInfo = serde_json::from_str(
            r#"{"number":1,"title":"t","state":"OPEN","headRefName":"h","mergedAt":null}"#,
        )
        .unwrap();
        let absent: PrInfo =
            serde_json::from_str(r#"{"number":1,"title":"t","state":"OPEN","headRefName":"h"}"#).unwrap();
        assert_eq!(with_null.merged_at, None);
        assert_eq!(absent.merged_at, None);
    }

    #[test]
    fn cache_round_trips_within_ttl() {
        let tmp = tempfile::tempdir().unwrap();
        let key = PrCacheKey { worktree: tmp.path().to_path_buf(), state: "open".into(), limit: 30 };
        let prs = vec![PrInfo {
            number: 7,
            title: "x".into(),
            state: PrState::Open,
            head_ref: "h".into(),
            merged_at: None,
        }];
        cache_store(key.clone(), prs.clone());
        assert_eq!(cache_lookup(&key), Some(prs));
    }

    #[test]
    fn clear_pr_cache_for_project_only_drops_matching_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        let project = tmp.path().join("proj");
        let other = tmp.path().join("other");
        let key_in_project = PrCacheKey { worktree: project.join("repo"), state: "open".into(), limit: 0 };
        let key_outside = PrCacheKey { worktree: other.join("repo"), state: "open".into(), limit: 0 };
        cache_store(key_in_project.clone(), vec![]);
        cache_store(key_outside.clone(), vec![]);

        clear_pr_cache_for_project(&project);

        assert!(cache_lookup(&key_in_project).is_none());
        assert!(cache_lookup(&key_outside).is_some());
        clear_pr_cache();
    }
}
