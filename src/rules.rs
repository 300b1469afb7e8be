//! C2 — RuleInjector: idempotently materializes embedded rule files and a
//! `dev-log/` directory into a worktree, and appends exclusion patterns to
//! the *common* git exclude file.
//!
//! No direct teacher module covers embedded-rule injection; grounded in the
//! general shape of the teacher's idempotent "compare-then-skip-write" file
//! materialization in `config/mod.rs`.

use std::io::Write;
use std::path::Path;

use crate::worktree_ops::resolve_common_dir;

/// Embedded `name -> content` rule files, materialized under
/// `<worktree>/.cursor/rules/<name>`.
const RULE_FILES: &[(&str, &str)] = &[
    ("project-context.mdc", include_str!("../assets/rules/project-context.mdc")),
    ("pr-workflow.mdc", include_str!("../assets/rules/pr-workflow.mdc")),
];

/// Patterns appended to the common git exclude file.
const EXCLUDE_ENTRIES: &[&str] = &[".cursor/rules/", "dev-log/"];

/// Materialize rule files, `dev-log/`, and exclude entries into
/// `worktree_path`. All three steps are idempotent.
pub fn inject(worktree_path: &Path) -> std::io::Result<()> {
    materialize_rule_files(worktree_path)?;
    ensure_dev_log(worktree_path)?;

    let common_dir = resolve_common_dir(worktree_path)
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    append_exclude_entries(&common_dir)?;

    Ok(())
}

fn materialize_rule_files(worktree_path: &Path) -> std::io::Result<()> {
    let rules_dir = worktree_path.join(".cursor").join("rules");
    std::fs::create_dir_all(&rules_dir)?;

    for (name, content) in RULE_FILES {
        let dest = rules_dir.join(name);
        if let Ok(existing) = std::fs::read(&dest)
            && existing == content.as_bytes()
        {
            continue;
        }
        std::fs::write(&dest, content)?;
    }

    Ok(())
}

fn ensure_dev_log(worktree_path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(worktree_path.join("dev-log"))
}

/// Append each entry in `EXCLUDE_ENTRIES` to `<common_dir>/info/exclude`
/// exactly if it isn't already present on a line of its own. Inserts a
/// newline before the appended block if the file doesn't already end in one.
fn append_exclude_entries(common_dir: &Path) -> std::io::Result<()> {
    let info_dir = common_dir.join("info");
    std::fs::create_dir_all(&info_dir)?;
    let exclude_path = info_dir.join("exclude");

    let existing = std::fs::read_to_string(&exclude_path).unwrap_or_default();
    let existing_lines: std::collections::HashSet<&str> = existing.lines().collect();

    let missing: Vec<&&str> = EXCLUDE_ENTRIES
        .iter()
        .filter(|entry| !existing_lines.contains(*entry))
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    let mut file = std::fs::OpenOptions::new().append(true).create(true).open(&exclude_path)?;
    if !existing.is_empty() && !existing.ends_with('\n') {
        writeln!(file)?;
    }
    for entry in missing {
        writeln!(file, "{entry}")?;
    }

    Ok(())
}
