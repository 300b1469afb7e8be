mod cli;

use clap::Parser;
use devdeploy::path::format_path_for_display;
use devdeploy::project::{self, Format, LoadPrsOptions};
use devdeploy::session::{PaneKind, SessionTracker};
use devdeploy::utils::{format_timestamp_iso8601, now_iso8601};
use devdeploy::ResourceKey;

use cli::{Cli, Command, OutputFormat, PaneKindArg, PrWorktreeAction, PrsAction, ProjectAction, RepoAction, SessionsAction};

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Project { action } => run_project(action),
        Command::Repo { action } => run_repo(action),
        Command::PrWorktree { action } => run_pr_worktree(action),
        Command::Prs { action } => run_prs(action),
        Command::Sessions { action } => run_sessions(action),
    }
}

fn run_project(action: ProjectAction) -> anyhow::Result<()> {
    match action {
        ProjectAction::Create { name } => {
            let dir = project::create_project(&name)?;
            println!("{}", format_path_for_display(&dir));
        }
        ProjectAction::Delete { name } => {
            project::delete_project(&name)?;
        }
        ProjectAction::List => {
            for summary in project::list_projects()? {
                println!("{}\t{} repo(s)", summary.name, summary.repo_count);
            }
        }
    }
    Ok(())
}

fn run_repo(action: RepoAction) -> anyhow::Result<()> {
    match action {
        RepoAction::Add { project, repo } => {
            let path = project::add_repo(&project, &repo)?;
            println!("{}", format_path_for_display(&path));
        }
        RepoAction::Remove { project, repo } => {
            project::remove_repo(&project, &repo)?;
        }
        RepoAction::List { project } => {
            for repo in project::list_project_repos(&project)? {
                println!("{repo}");
            }
        }
    }
    Ok(())
}

fn run_pr_worktree(action: PrWorktreeAction) -> anyhow::Result<()> {
    match action {
        PrWorktreeAction::Ensure { project, repo, number, branch } => {
            let path = project::ensure_pr_worktree(&project, &repo, number, &branch)?;
            println!("{}", format_path_for_display(&path));
        }
        PrWorktreeAction::Remove { project, repo, number } => {
            project::remove_pr_worktree(&project, &repo, number)?;
        }
    }
    Ok(())
}

fn run_prs(action: PrsAction) -> anyhow::Result<()> {
    match action {
        PrsAction::Load { project, format, include_merged } => {
            let opts = LoadPrsOptions {
                include_merged,
                format: match format {
                    OutputFormat::Json => Format::Flat,
                    OutputFormat::Text => Format::Grouped,
                },
                build_resources: matches!(format, OutputFormat::Json),
                ..LoadPrsOptions::default()
            };
            let result = project::load_prs(&project, &opts)?;

            match format {
                OutputFormat::Json => {
                    let resources = result.resources.unwrap_or_default();
                    println!("[{} resources]", resources.len());
                    for r in &resources {
                        println!("{:?}", r);
                    }
                }
                OutputFormat::Text => {
                    for repo_prs in result.prs_by_repo.unwrap_or_default() {
                        println!("{} ({} PRs)", repo_prs.repo, repo_prs.prs.len());
                        for pr in repo_prs.prs {
                            println!("  #{} {} [{}]", pr.number, pr.title, pr.state);
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

// A fresh, process-local tracker — this CLI exercises SessionTracker's
// contract one invocation at a time rather than running as a daemon, so
// sessions are only observable within the lifetime of a single subcommand.
fn run_sessions(action: SessionsAction) -> anyhow::Result<()> {
    let tracker = SessionTracker::new();
    match action {
        SessionsAction::Register { key, pane_id, kind } => {
            let key: ResourceKey = key.parse()?;
            let kind = match kind {
                PaneKindArg::Shell => PaneKind::Shell,
                PaneKindArg::Agent => PaneKind::Agent,
            };
            tracker.register(key, pane_id, kind);
        }
        SessionsAction::Unregister { pane_id } => {
            tracker.unregister(&pane_id);
        }
        SessionsAction::List => {
            for pane in tracker.all_panes() {
                let created_at = format_timestamp_iso8601(pane.created_at.timestamp().max(0) as u64);
                println!("{}\t{:?}\t{}\t{created_at}", pane.pane_id, pane.kind, pane.resource_key);
            }
        }
        SessionsAction::Prune => {
            let removed = tracker.prune(None)?;
            log::info!("pruned {removed} panes at {}", now_iso8601());
        }
    }
    Ok(())
}
