//! Operator console: event loop, worker wiring and UI state.

mod handlers;
mod render;

use anyhow::Result;
use crossterm::event::{self, Event};
use std::{
    path::PathBuf,
    time::{Duration, Instant},
};
use tokio::sync::mpsc;

use crate::{
    config::Config,
    events::UiState,
    jobs::GalleryRow,
    shortcuts::Shortcuts,
    ui::Tui,
    worker::{self, WorkerCmd, WorkerEvent},
};

use handlers::{handle_key, is_ctrl_c};
use render::draw;

/// How often status records are re-read while a job is live.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Application state shared between input handling and rendering.
pub struct App {
    /// Config snapshot the worker was started with.
    pub cfg: Config,
    /// Selection, log and status text.
    pub ui: UiState,
    /// Galleries with their last known status records.
    pub galleries: Vec<GalleryRow>,
    /// Command channel to the background worker.
    pub worker_tx: mpsc::Sender<WorkerCmd>,
    /// Event channel from the background worker.
    pub worker_rx: mpsc::Receiver<WorkerEvent>,
    /// Key bindings.
    pub shortcuts: Shortcuts,
    /// When the gallery list was last requested.
    pub last_refresh: Instant,
}

impl App {
    pub fn selected(&self) -> Option<&GalleryRow> {
        self.galleries.get(self.ui.selected)
    }

    /// True while any listed gallery still has a live job.
    fn any_running(&self) -> bool {
        self.galleries.iter().any(|g| g.running)
    }
}

/// Run the console until the user exits.
pub async fn run_app(terminal: &mut Tui) -> Result<()> {
    // Load config or create a default file on first run.
    let cfg_path = PathBuf::from("config.toml");
    let cfg = Config::load_or_default(&cfg_path)?;
    let shortcuts = Shortcuts::load_or_default(PathBuf::from("shortcut.toml"))?;

    let (tx_cmd, rx_cmd) = mpsc::channel::<WorkerCmd>(64);
    let (tx_ev, rx_ev) = mpsc::channel::<WorkerEvent>(256);

    // The worker owns the pipeline; the console only talks to it over channels.
    let worker = tokio::spawn(worker::run(rx_cmd, tx_ev, cfg.clone()));

    let mut app = App {
        cfg,
        ui: UiState::new(),
        galleries: vec![],
        worker_tx: tx_cmd,
        worker_rx: rx_ev,
        shortcuts,
        last_refresh: Instant::now(),
    };
    if !app.cfg.face_service_configured() {
        app.ui.status = "face_service.endpoint not set in config.toml".into();
    }
    request_refresh(&mut app).await?;

    loop {
        terminal.draw(|f| draw(f, &app))?;

        // Drain worker events before handling input.
        while let Ok(ev) = app.worker_rx.try_recv() {
            handle_worker_event(&mut app, ev);
        }

        if app.any_running() && app.last_refresh.elapsed() >= POLL_INTERVAL {
            request_refresh(&mut app).await?;
        }

        // Short poll timeout keeps the UI responsive.
        if event::poll(Duration::from_millis(50))?
            && let Event::Key(k) = event::read()?
        {
            if is_ctrl_c(&k) {
                break;
            }
            if handle_key(&mut app, k).await? {
                break;
            }
        }
    }

    // The worker cancels running jobs and returns once each has recorded `failed`.
    let _ = app.worker_tx.send(WorkerCmd::Shutdown).await;
    let _ = worker.await;
    Ok(())
}

/// Apply a worker event to the UI state.
fn handle_worker_event(app: &mut App, ev: WorkerEvent) {
    match ev {
        WorkerEvent::GalleriesLoaded(rows) => {
            app.galleries = rows;
            if app.ui.selected >= app.galleries.len() {
                app.ui.selected = app.galleries.len().saturating_sub(1);
            }
        }
        WorkerEvent::Started {
            album_code,
            total_photos,
        } => {
            app.ui.error = None;
            app.ui.status = format!("Indexing {album_code} ({total_photos} photos)");
            app.ui.push_log(format!("started {album_code}: {total_photos} photos"));
            if let Some(row) = app.galleries.iter_mut().find(|g| g.album_code == album_code) {
                row.running = true;
            }
        }
        WorkerEvent::Stopped { album_code } => {
            app.ui.status = format!("Stopping {album_code}");
            app.ui.push_log(format!("stop sent to {album_code}"));
        }
        WorkerEvent::Log(s) => app.ui.push_log(s),
        WorkerEvent::Error(s) => {
            app.ui.push_log(format!("error: {s}"));
            app.ui.error = Some(s);
        }
    }
}

/// Ask the worker to reload galleries and their status records.
pub async fn request_refresh(app: &mut App) -> Result<()> {
    app.worker_tx.send(WorkerCmd::Refresh).await?;
    app.last_refresh = Instant::now();
    Ok(())
}
