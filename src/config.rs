//! Environment-driven configuration, following the teacher's `WORKTRUNK_*`
//! env-override convention (see `config/user/mod.rs`) but with a much
//! smaller surface: two directories, resolved once per call so tests can
//! override them via `std::env::set_var`.

use std::path::PathBuf;

use crate::path::home_dir;

/// Team slug used by `listFilteredPRs`'s team-review-requested search.
/// A configuration constant per spec — not user-configurable in this crate.
pub const REVIEW_TEAM_SLUG: &str = "platform";

/// `DEVDEPLOY_PROJECTS_DIR`, falling back to `<home>/.devdeploy/projects`.
pub fn projects_dir() -> PathBuf {
    std::env::var_os("DEVDEPLOY_PROJECTS_DIR")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".devdeploy")
                .join("projects")
        })
}

/// `DEVDEPLOY_WORKSPACE`, falling back to `<home>/workspace`.
pub fn workspace_dir() -> PathBuf {
    std::env::var_os("DEVDEPLOY_WORKSPACE")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("workspace")
        })
}

/// `lowercase(name with spaces replaced by '-')`, per spec.md §6.
pub fn normalize_project_name(name: &str) -> String {
    name.trim().replace(' ', "-").to_lowercase()
}
