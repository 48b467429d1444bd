//! Headless driver for the repository monitor.
//!
//! Opens the repository given as the first argument (or the one persisted in
//! the settings file), prints a status summary on every change and exits on
//! Ctrl+C or when the watched directory disappears.

use anyhow::{Context, Result};
use git_repo_monitor::prelude::*;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SETTINGS_ENV: &str = "GIT_REPO_MONITOR_SETTINGS";

fn settings_path() -> PathBuf {
    if let Some(path) = std::env::var_os(SETTINGS_ENV) {
        return PathBuf::from(path);
    }

    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home)
            .join(".config")
            .join("git-repo-monitor")
            .join("settings.json"),
        None => PathBuf::from("git-repo-monitor.json"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("git_repo_monitor=info".parse()?))
        .init();

    let settings = Settings::load(Box::new(JsonFileStore::new(settings_path())));
    let config = MonitorConfig::from_settings(settings.values());
    let mut app = AppContext::new(settings, config)?;

    let persisted = app.take_initial_repository();
    let repo_path = match std::env::args().nth(1).map(PathBuf::from).or(persisted) {
        Some(path) => path,
        None => std::env::current_dir().context("no repository given and no working directory")?,
    };

    let changes = app
        .open_repository(&repo_path)
        .await
        .with_context(|| format!("failed to open {}", repo_path.display()))?;

    println!("Watching: {}", repo_path.display());
    if app.monitor().is_using_polling() {
        println!("Note: Using polling fallback for this path");
    }
    println!("Press Ctrl+C to exit\n");

    let mut pane = RepoStatusPaneBuilder::new(app.client()?)
        .on_refresh(Box::new(|summary: &StatusSummary| {
            let branch = summary.branch.as_deref().unwrap_or("(detached)");
            println!("[{}] {}", branch, summary);
        }))
        .on_error(Box::new(|e: &VcsError| {
            eprintln!("[status] {}", e);
        }))
        .build();

    pane.refresh().await;
    pane.setup_change_listener(changes);

    let mut health = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for Ctrl+C")?;
                println!("\nShutting down...");
                break;
            }
            _ = health.tick() => {
                if app.monitor().has_ended() {
                    eprintln!("Watched directory is no longer available");
                    break;
                }
            }
        }
    }

    // Cleanup
    pane.stop().await;
    app.shutdown();
    println!("Done!");

    Ok(())
}
