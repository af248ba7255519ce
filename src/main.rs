//! Entry point: logging, terminal setup and the operator console.

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;

mod app;
mod config;
mod events;
mod face;
mod gallery;
mod indexing;
mod jobs;
mod layout;
mod shortcuts;
mod ui;
mod worker;

/// File logging; the guard must outlive the app so buffered lines are flushed.
fn init_logging() -> Result<WorkerGuard> {
    let log_file = "face_indexer.log";
    // Stdout belongs to the TUI.
    let file_appender = tracing_appender::rolling::never(".", log_file);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to init logging: {e}"))?;
    tracing::info!("logging to {}", log_file);
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = init_logging()?;
    tracing::info!("face indexer starting");

    let mut terminal = ui::init_terminal()?;
    let res = app::run_app(&mut terminal).await;
    // Restore even when the app failed.
    ui::restore_terminal()?;

    if let Err(ref e) = res {
        tracing::error!("app error: {e:#}");
    }
    tracing::info!("face indexer exiting");
    res
}
