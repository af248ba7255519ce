//! Background worker that owns the indexing pipeline and serves console commands.

use anyhow::{Context, Result};
use std::{path::PathBuf, sync::Arc};
use tokio::sync::mpsc;

use crate::{
    config::Config,
    face::{FaceService, HttpFaceService},
    gallery::{GalleryStore, JsonFileGalleryStore},
    indexing::{HttpPhotoFetcher, ImageTransformer, JobController, JobRegistry, Orchestrator},
    jobs::GalleryRow,
};

/// Commands sent from the UI to the worker.
#[derive(Debug)]
pub enum WorkerCmd {
    /// Reload galleries and their status records.
    Refresh,
    /// Validate and dispatch an indexing job.
    StartIndexing { album_code: String },
    /// Cancel a running job.
    StopIndexing { album_code: String },
    /// Cancel everything and exit the loop.
    Shutdown,
}

/// Events emitted by the worker for UI updates.
#[derive(Clone, Debug)]
pub enum WorkerEvent {
    /// Full gallery list loaded from the store.
    GalleriesLoaded(Vec<GalleryRow>),
    /// A job was accepted and is running in the background.
    Started { album_code: String, total_photos: u32 },
    /// A stop signal was delivered.
    Stopped { album_code: String },
    /// Informational log message.
    Log(String),
    /// User-visible error message.
    Error(String),
}

/// Collaborators the worker needs to serve commands.
pub struct Pipeline {
    pub store: Arc<dyn GalleryStore>,
    pub controller: JobController,
}

/// Wire store, face service, fetcher and registry from config.
pub fn build_pipeline(cfg: &Config) -> Result<Pipeline> {
    let store: Arc<dyn GalleryStore> =
        Arc::new(JsonFileGalleryStore::new(PathBuf::from(&cfg.store.path)));

    let faces: Option<Arc<dyn FaceService>> = if cfg.face_service_configured() {
        let svc = HttpFaceService::new(&cfg.face_service).context("face service client")?;
        Some(Arc::new(svc))
    } else {
        tracing::warn!("face service endpoint not set; indexing requests will be rejected");
        None
    };

    let fetcher = HttpPhotoFetcher::new(&cfg.fetch).context("photo fetcher")?;
    let transformer = ImageTransformer::new(cfg.transform.max_payload_bytes);

    // Jobs need some face service; an unconfigured one never gets past the controller.
    let orch_faces: Arc<dyn FaceService> = match &faces {
        Some(f) => f.clone(),
        None => Arc::new(HttpFaceService::new(&cfg.face_service).context("face service client")?),
    };
    let orchestrator = Orchestrator::new(
        store.clone(),
        orch_faces,
        Arc::new(fetcher),
        transformer,
        cfg.indexing.clone(),
    );
    let registry = JobRegistry::start(Arc::new(orchestrator));
    let controller = JobController::new(store.clone(), faces, registry, cfg.indexing.clone());

    Ok(Pipeline { store, controller })
}

/// Main worker loop: build the pipeline, then handle commands sequentially.
pub async fn run(rx: mpsc::Receiver<WorkerCmd>, tx: mpsc::Sender<WorkerEvent>, cfg: Config) {
    tracing::info!("worker started");

    // Pipeline setup is done once; failures are terminal.
    let pipeline = match build_pipeline(&cfg) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("pipeline init failed: {e:#}");
            let _ = tx
                .send(WorkerEvent::Error(format!("pipeline init failed: {e:#}")))
                .await;
            return;
        }
    };
    tracing::info!("pipeline ready");
    serve(pipeline, rx, tx).await;
}

/// Handle commands until Shutdown or a closed channel, then stop every job.
///
/// Returns only after each cancelled job has written its `failed` status.
pub async fn serve(pipeline: Pipeline, mut rx: mpsc::Receiver<WorkerCmd>, tx: mpsc::Sender<WorkerEvent>) {
    while let Some(cmd) = rx.recv().await {
        if !handle(&pipeline, cmd, &tx).await {
            break;
        }
    }
    pipeline.controller.registry().shutdown().await;
    tracing::info!("worker stopped");
}

/// Serve one command. Returns false when the loop should end.
pub async fn handle(pipeline: &Pipeline, cmd: WorkerCmd, tx: &mpsc::Sender<WorkerEvent>) -> bool {
    match cmd {
        WorkerCmd::Refresh => match load_rows(pipeline).await {
            Ok(rows) => {
                tracing::debug!(
                    running = ?pipeline.controller.registry().running(),
                    "refresh: {} galleries",
                    rows.len()
                );
                let _ = tx.send(WorkerEvent::GalleriesLoaded(rows)).await;
            }
            Err(e) => {
                tracing::error!("refresh failed: {e}");
                let _ = tx.send(WorkerEvent::Error(format!("refresh failed: {e}"))).await;
            }
        },

        WorkerCmd::StartIndexing { album_code } => {
            tracing::info!("start indexing requested: {album_code}");
            match pipeline.controller.start_indexing(&album_code).await {
                Ok(started) => {
                    let _ = tx
                        .send(WorkerEvent::Started {
                            album_code: started.album_code,
                            total_photos: started.total_photos,
                        })
                        .await;
                }
                Err(e) => {
                    tracing::warn!("start rejected for {album_code} ({}): {e}", e.http_status());
                    let _ = tx
                        .send(WorkerEvent::Error(format!("{album_code}: {e}")))
                        .await;
                }
            }
        }

        WorkerCmd::StopIndexing { album_code } => {
            if pipeline.controller.stop_indexing(&album_code) {
                let _ = tx.send(WorkerEvent::Stopped { album_code }).await;
            } else {
                let _ = tx
                    .send(WorkerEvent::Log(format!("{album_code}: no running job")))
                    .await;
            }
        }

        WorkerCmd::Shutdown => return false,
    }
    true
}

/// Gallery rows sorted by album code.
async fn load_rows(pipeline: &Pipeline) -> Result<Vec<GalleryRow>> {
    let registry = pipeline.controller.registry();
    let mut rows: Vec<GalleryRow> = pipeline
        .store
        .list_galleries()
        .await?
        .into_iter()
        .map(|g| GalleryRow {
            running: registry.is_running(&g.album_code),
            photos: g.photos.len(),
            enabled: g.face_indexing_enabled,
            status: g.indexing_status,
            album_code: g.album_code,
        })
        .collect();
    rows.sort_by(|a, b| a.album_code.to_lowercase().cmp(&b.album_code.to_lowercase()));
    Ok(rows)
}
