//! Argument parsing for the `devdeploy` binary.

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "devdeploy", about = "Project-resource engine CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage projects.
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },
    /// Manage repo attachments within a project.
    Repo {
        #[command(subcommand)]
        action: RepoAction,
    },
    /// Manage PR worktrees.
    PrWorktree {
        #[command(subcommand)]
        action: PrWorktreeAction,
    },
    /// Load the PR/resource list for a project.
    Prs {
        #[command(subcommand)]
        action: PrsAction,
    },
    /// Manage tracked multiplexer panes.
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
}

#[derive(Subcommand)]
pub enum ProjectAction {
    Create { name: String },
    Delete { name: String },
    List,
}

#[derive(Subcommand)]
pub enum RepoAction {
    Add { project: String, repo: String },
    Remove { project: String, repo: String },
    List { project: String },
}

#[derive(Subcommand)]
pub enum PrWorktreeAction {
    Ensure { project: String, repo: String, number: u64, branch: String },
    Remove { project: String, repo: String, number: u64 },
}

#[derive(Subcommand)]
pub enum PrsAction {
    Load {
        project: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        #[arg(long)]
        include_merged: bool,
    },
}

#[derive(Subcommand)]
pub enum SessionsAction {
    Register { key: String, pane_id: String, #[arg(long, value_enum)] kind: PaneKindArg },
    Unregister { pane_id: String },
    List,
    Prune,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum PaneKindArg {
    Shell,
    Agent,
}
