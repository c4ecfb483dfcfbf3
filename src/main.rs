use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::sync::{broadcast, mpsc};

use gitmind_lib::config::Settings;
use gitmind_lib::models::{FileStatus, Status, StatusEvent};
use gitmind_lib::services::git_service::find_repo_root;
use gitmind_lib::services::{
    diff_service, CancellationToken, DiffParser, FolderMonitor, GitRunner, GitStatusProvider,
    RepositoryService, StatusProvider, StatusService,
};

mod cli;

use cli::{CacheAction, Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    gitmind_lib::init_tracing();

    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Command::Watch { folder } => watch(&resolve_folder(&folder)?, &settings).await,
        Command::Status { folder, json } => status(&resolve_folder(&folder)?, json).await,
        Command::Diff {
            folder,
            commit,
            to,
            prefixes,
            launch,
        } => {
            let folder = resolve_folder(&folder)?;
            diff(&folder, &commit, to.as_deref(), prefixes, launch, &settings).await
        }
        Command::Cache { folder, action } => cache(&resolve_folder(&folder)?, action).await,
    }
}

fn load_settings(config_dir: Option<&Path>) -> Result<Settings> {
    let dir = match config_dir {
        Some(dir) => dir.to_path_buf(),
        None => match Settings::default_dir() {
            Some(dir) => dir,
            None => return Ok(Settings::default()),
        },
    };
    Settings::load(&dir).with_context(|| format!("Failed to load settings from {}", dir.display()))
}

fn resolve_folder(folder: &Path) -> Result<PathBuf> {
    find_repo_root(folder)
        .with_context(|| format!("{} is not inside a git repository", folder.display()))
}

async fn watch(folder: &Path, settings: &Settings) -> Result<()> {
    let (monitor_tx, monitor_rx) = mpsc::unbounded_channel();
    let mut monitor = FolderMonitor::with_config(monitor_tx, settings.monitor.debounce_config());
    let service = StatusService::new(Arc::new(GitStatusProvider::new(folder)));
    let repository = RepositoryService::default();

    let initial = service.on_status_trigger(Utc::now()).await?;
    println!("{}", summarize(&initial));

    let model = repository.load(folder).await?;
    println!(
        "{} commits on {} branches",
        model.commit_count(),
        model.branches.len()
    );

    let mut events = service.subscribe();
    monitor.monitor(folder)?;
    let listener = service.spawn_listener(monitor_rx);
    tracing::info!("Watching {}", folder.display());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(StatusEvent::StatusChanged(change)) => {
                    println!("[{}] {}", change.timestamp.format("%H:%M:%S"), summarize(&change.new_status));
                }
                Ok(StatusEvent::RepoChanged(timestamp)) => {
                    match repository.refresh(folder).await {
                        Ok(model) => println!(
                            "[{}] Repository changed: {} commits",
                            timestamp.format("%H:%M:%S"),
                            model.commit_count()
                        ),
                        Err(e) => tracing::warn!("Failed to refresh repository model: {}", e),
                    }
                }
                Ok(StatusEvent::FocusRequested) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Dropped {} status events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    tracing::info!("Stopping monitor for {}", folder.display());
    monitor.stop();
    listener.abort();
    Ok(())
}

async fn status(folder: &Path, json: bool) -> Result<()> {
    let status = GitStatusProvider::new(folder).get_status().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", summarize(&status));
    for file in status.files() {
        match &file.old_path {
            Some(old_path) => println!("{} {} -> {}", status_code(file.status), old_path, file.path),
            None => println!("{} {}", status_code(file.status), file.path),
        }
    }
    if let Some(message) = status.merge_message() {
        println!("\n{}", message);
    }
    Ok(())
}

async fn diff(
    folder: &Path,
    commit: &str,
    to: Option<&str>,
    with_prefixes: bool,
    launch: bool,
    settings: &Settings,
) -> Result<()> {
    let runner = GitRunner::new(folder);
    let parser = DiffParser::default();
    let token = CancellationToken::new();

    let diff = match to {
        Some(to) => {
            let patch = diff_service::range_patch(&runner, commit, to, &token).await?;
            parser.parse(None, &patch, with_prefixes).await?
        }
        None => diff_service::commit_diff(&runner, &parser, commit, with_prefixes, &token).await?,
    };

    println!("{}", diff.left_path.display());
    println!("{}", diff.right_path.display());
    for name in &diff.changed_files {
        println!("  {}", name);
    }

    if launch {
        let tool = settings
            .diff_tool
            .as_ref()
            .context("No diff tool configured")?;
        diff_service::launch_diff_tool(tool, &diff)?;
    }
    Ok(())
}

async fn cache(folder: &Path, action: CacheAction) -> Result<()> {
    let repository = RepositoryService::default();

    match action {
        CacheAction::Show => match repository.cache().try_get_repository(folder).await {
            Some(model) => println!(
                "Cache v{} written {}: {} commits, {} branches, {} merges",
                model.version,
                model.time_stamp.format("%Y-%m-%d %H:%M:%S"),
                model.commit_count(),
                model.branches.len(),
                model.merges.len()
            ),
            None => println!("No valid cache for {}", folder.display()),
        },
        CacheAction::Rebuild => {
            let model = repository.refresh(folder).await?;
            println!("Cached {} commits", model.commit_count());
        }
        CacheAction::Clear => {
            if repository.invalidate(folder).await {
                println!("Cache cleared");
            } else {
                println!("No cache to clear");
            }
        }
    }
    Ok(())
}

fn summarize(status: &Status) -> String {
    if status.is_clean() && !status.is_merging() {
        return "Working tree clean".to_string();
    }

    let mut summary = format!(
        "{} changed ({} added, {} deleted, {} renamed)",
        status.changed_count(),
        status.added_count(),
        status.deleted_count(),
        status.renamed_count()
    );
    if status.is_merging() {
        if status.is_fully_merged() {
            summary.push_str(", merge ready to commit");
        } else {
            summary.push_str(&format!(", {} conflicts", status.conflict_count()));
        }
    }
    summary
}

fn status_code(status: FileStatus) -> char {
    match status {
        FileStatus::Added => 'A',
        FileStatus::Modified => 'M',
        FileStatus::Deleted => 'D',
        FileStatus::Renamed => 'R',
        FileStatus::Conflict => 'U',
    }
}
