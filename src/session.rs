//! C5 — SessionTracker: process-wide map from `ResourceKey` to live
//! multiplexer panes.
//!
//! Single `RwLock<HashMap<..>>`, guarded with the same short-critical-section
//! discipline the teacher applies to `RepoCache`'s fields in
//! `git/repository/mod.rs` (read the map, copy out, release the lock before
//! any further work).

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::resource::ResourceKey;
use crate::utils::get_now;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaneKind {
    Shell,
    Agent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedPane {
    pub pane_id: String,
    pub kind: PaneKind,
    pub resource_key: ResourceKey,
    pub created_at: DateTime<Utc>,
}

/// A function that returns the set of pane IDs currently alive, injected so
/// `Prune` doesn't need to know how panes are queried.
pub type LivenessChecker = Box<dyn Fn() -> anyhow::Result<HashSet<String>> + Send + Sync>;

pub struct SessionTracker {
    panes: RwLock<HashMap<ResourceKey, Vec<TrackedPane>>>,
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTracker {
    pub fn new() -> Self {
        SessionTracker { panes: RwLock::new(HashMap::new()) }
    }

    /// Append a pane for `key`, timestamped at insertion.
    pub fn register(&self, key: ResourceKey, pane_id: impl Into<String>, kind: PaneKind) {
        let created_at = DateTime::from_timestamp(get_now() as i64, 0).unwrap_or_else(Utc::now);
        let pane = TrackedPane { pane_id: pane_id.into(), kind, resource_key: key.clone(), created_at };
        let mut guard = self.panes.write().unwrap();
        guard.entry(key).or_default().push(pane);
    }

    /// Remove the first pane with matching `pane_id` across all keys.
    /// Removes the key entirely once its list becomes empty.
    pub fn unregister(&self, pane_id: &str) -> bool {
        let mut guard = self.panes.write().unwrap();
        let mut found = false;
        let mut empty_key = None;

        for (key, panes) in guard.iter_mut() {
            if let Some(pos) = panes.iter().position(|p| p.pane_id == pane_id) {
                panes.remove(pos);
                found = true;
                if panes.is_empty() {
                    empty_key = Some(key.clone());
                }
                break;
            }
        }

        if let Some(key) = empty_key {
            guard.remove(&key);
        }

        found
    }

    /// Remove all panes for `key`, returning how many were removed.
    pub fn unregister_all(&self, key: &ResourceKey) -> usize {
        let mut guard = self.panes.write().unwrap();
        guard.remove(key).map(|panes| panes.len()).unwrap_or(0)
    }

    /// A copy of the panes for `key`; mutating the result never affects
    /// internal state.
    pub fn panes_for_resource(&self, key: &ResourceKey) -> Vec<TrackedPane> {
        let guard = self.panes.read().unwrap();
        guard.get(key).cloned().unwrap_or_default()
    }

    pub fn all_panes(&self) -> Vec<TrackedPane> {
        let guard = self.panes.read().unwrap();
        guard.values().flatten().cloned().collect()
    }

    pub fn count(&self) -> usize {
        let guard = self.panes.read().unwrap();
        guard.values().map(Vec::len).sum()
    }

    /// `(shells, agents)` for `key`.
    pub fn count_for_resource(&self, key: &ResourceKey) -> (usize, usize) {
        let guard = self.panes.read().unwrap();
        let Some(panes) = guard.get(key) else { return (0, 0) };
        let shells = panes.iter().filter(|p| p.kind == PaneKind::Shell).count();
        let agents = panes.iter().filter(|p| p.kind == PaneKind::Agent).count();
        (shells, agents)
    }

    /// Remove every tracked pane not present in the injected liveness
    /// checker's result. A `None` checker is a no-op returning `(0, Ok(()))`.
    pub fn prune(&self, checker: Option<&LivenessChecker>) -> anyhow::Result<usize> {
        let Some(checker) = checker else { return Ok(0) };
        let alive = checker()?;

        let mut guard = self.panes.write().unwrap();
        let mut removed = 0;
        let mut empty_keys = Vec::new();

        for (key, panes) in guard.iter_mut() {
            let before = panes.len();
            panes.retain(|p| alive.contains(&p.pane_id));
            removed += before - panes.len();
            if panes.is_empty() {
                empty_keys.push(key.clone());
            }
        }
        for key in empty_keys {
            guard.remove(&key);
        }

        Ok(removed)
    }
}
