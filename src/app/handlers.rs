//! Key handlers for the console screens.

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::{events::Screen, shortcuts, worker::WorkerCmd};

use super::{App, request_refresh};

/// Handle one key press. Returns true when the app should exit.
pub async fn handle_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    match app.ui.screen {
        Screen::Main => handle_main_key(app, k).await,
        Screen::Detail => handle_detail_key(app, k).await,
    }
}

pub fn is_ctrl_c(k: &KeyEvent) -> bool {
    k.modifiers.contains(KeyModifiers::CONTROL) && k.code == KeyCode::Char('c')
}

async fn handle_main_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let sc = &app.shortcuts.main;

    if shortcuts::matches_shortcut(&k, &sc.quit) {
        return Ok(true);
    } else if shortcuts::matches_shortcut(&k, &sc.refresh) {
        request_refresh(app).await?;
    } else if shortcuts::matches_shortcut(&k, &sc.start) {
        send_start(app).await?;
    } else if shortcuts::matches_shortcut(&k, &sc.stop) {
        send_stop(app).await?;
    } else if shortcuts::matches_shortcut(&k, &sc.down) {
        if app.ui.selected + 1 < app.galleries.len() {
            app.ui.selected += 1;
        }
    } else if shortcuts::matches_shortcut(&k, &sc.up) {
        app.ui.selected = app.ui.selected.saturating_sub(1);
    } else if shortcuts::matches_shortcut(&k, &sc.detail) && app.selected().is_some() {
        app.ui.screen = Screen::Detail;
        app.ui.status = "Detail".into();
    }

    Ok(false)
}

async fn handle_detail_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let sc = &app.shortcuts.detail;

    if shortcuts::matches_shortcut(&k, &sc.back) {
        app.ui.screen = Screen::Main;
        app.ui.status = "Ready".into();
    } else if shortcuts::matches_shortcut(&k, &sc.start) {
        send_start(app).await?;
    } else if shortcuts::matches_shortcut(&k, &sc.stop) {
        send_stop(app).await?;
    }

    Ok(false)
}

/// Request indexing for the selected gallery.
async fn send_start(app: &mut App) -> Result<()> {
    let Some(album_code) = app.selected().map(|g| g.album_code.clone()) else {
        app.ui.status = "No gallery selected".into();
        return Ok(());
    };
    app.ui.error = None;
    app.ui.status = format!("Starting {album_code}...");
    app.worker_tx
        .send(WorkerCmd::StartIndexing { album_code })
        .await?;
    Ok(())
}

async fn send_stop(app: &mut App) -> Result<()> {
    let Some(album_code) = app.selected().map(|g| g.album_code.clone()) else {
        return Ok(());
    };
    app.worker_tx
        .send(WorkerCmd::StopIndexing { album_code })
        .await?;
    Ok(())
}
