//! The project-resource engine: git worktree orchestration, forge-CLI-backed
//! PR discovery, and multiplexer pane tracking for a multi-project developer
//! workspace.
//!
//! The library API is not stable.

pub mod config;
pub mod error;
pub mod git;
pub mod path;
pub mod pr;
pub mod project;
pub mod resource;
pub mod rules;
pub mod session;
pub mod shell_exec;
pub mod utils;
pub mod worktree_ops;

pub use error::DevdeployError;
pub use resource::{Resource, ResourceKey};
