//! `Resource` / `ResourceKey` — the tagged union and canonical identity used
//! by the flat resource list (spec.md §3), mirroring the teacher's
//! `TaskResult`/`TaskKind` tagged-enum pattern in `commands/list/collect.rs`.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::DevdeployError;
use crate::pr::PrInfo;

/// A unified display unit: a repo attachment or a PR.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Repo {
        repo_name: String,
        worktree_path: Option<PathBuf>,
    },
    Pr {
        repo_name: String,
        worktree_path: Option<PathBuf>,
        pr: PrInfo,
    },
}

impl Resource {
    pub fn key(&self) -> ResourceKey {
        match self {
            Resource::Repo { repo_name, .. } => ResourceKey::Repo { name: repo_name.clone() },
            Resource::Pr { repo_name, pr, .. } => {
                ResourceKey::Pr { repo: repo_name.clone(), number: pr.number }
            }
        }
    }
}

/// A canonical string identity for a [`Resource`].
///
/// Grammar (spec.md §6):
/// ```text
/// key   ::= "repo:" name
///         | "pr:"   name ":#" digits
/// name  ::= [^:]+
/// digits::= [0-9]+   (must parse to a positive integer)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    Repo { name: String },
    Pr { repo: String, number: u64 },
}

impl ResourceKey {
    /// I4: `IsValid() ⇔ (kind=repo ∧ name≠∅) ∨ (kind=pr ∧ name≠∅ ∧ number>0)`.
    pub fn is_valid(&self) -> bool {
        match self {
            ResourceKey::Repo { name } => !name.is_empty(),
            ResourceKey::Pr { repo, number } => !repo.is_empty() && *number > 0,
        }
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKey::Repo { name } => write!(f, "repo:{name}"),
            ResourceKey::Pr { repo, number } => write!(f, "pr:{repo}:#{number}"),
        }
    }
}

impl FromStr for ResourceKey {
    type Err = DevdeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || DevdeployError::InvalidResourceKey { input: s.to_string() };

        if let Some(rest) = trimmed.strip_prefix("repo:") {
            if rest.is_empty() || rest.contains(':') {
                return Err(invalid());
            }
            let key = ResourceKey::Repo { name: rest.to_string() };
            return key.is_valid().then_some(key).ok_or_else(invalid);
        }

        if let Some(rest) = trimmed.strip_prefix("pr:") {
            let (repo, number_part) = rest.split_once(":#").ok_or_else(invalid)?;
            if repo.is_empty() || repo.contains(':') {
                return Err(invalid());
            }
            if number_part.is_empty() || !number_part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            let number: u64 = number_part.parse().map_err(|_| invalid())?;
            let key = ResourceKey::Pr { repo: repo.to_string(), number };
            return key.is_valid().then_some(key).ok_or_else(invalid);
        }

        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_valid_keys() {
        for input in ["repo:devdeploy", "pr:grafana:#7", "pr:my-repo:#9999"] {
            let key: ResourceKey = input.parse().unwrap();
            assert_eq!(key.to_string(), input);
        }
    }

    #[test]
    fn rejects_malformed_keys() {
        for input in ["pr:devdeploy:42", "pr:devdeploy:#0", "pr:devdeploy:#-1", "invalid:x", ""] {
            assert!(input.parse::<ResourceKey>().is_err(), "expected error for {input:?}");
        }
    }

    #[test]
    fn repo_key_requires_nonempty_name() {
        assert!("repo:".parse::<ResourceKey>().is_err());
    }
}
