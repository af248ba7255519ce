//! Entry point for indexing jobs: precondition checks, then fire-and-forget dispatch.

use std::sync::Arc;
use thiserror::Error;

use super::{progress::start_patch, registry::JobRegistry};
use crate::{
    config::IndexingCfg,
    face::{FaceService, FaceServiceError, collection_id_for},
    gallery::{Gallery, GalleryStore, IndexState, IndexingStatusPatch, StoreError},
};

/// Synchronous reasons a job could not be started.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("gallery {0} not found")]
    NotFound(String),

    #[error("face indexing is disabled for gallery {0}")]
    FeatureDisabled(String),

    #[error("indexing already running for gallery {0}")]
    AlreadyRunning(String),

    #[error("face service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("could not create face collection: {0}")]
    CollectionCreateFailed(String),

    #[error("gallery store error: {0}")]
    Store(#[from] StoreError),
}

impl StartError {
    /// Status code a trigger endpoint would answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            StartError::NotFound(_) => 404,
            StartError::FeatureDisabled(_) => 403,
            StartError::AlreadyRunning(_) => 409,
            StartError::ServiceUnavailable(_) => 503,
            StartError::CollectionCreateFailed(_) => 502,
            StartError::Store(_) => 500,
        }
    }
}

/// Immediate answer to a start request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartedJob {
    pub album_code: String,
    pub collection_id: String,
    pub total_photos: u32,
}

/// Validates and launches indexing jobs.
pub struct JobController {
    store: Arc<dyn GalleryStore>,
    /// `None` when no face service endpoint is configured.
    faces: Option<Arc<dyn FaceService>>,
    registry: Arc<JobRegistry>,
    cfg: IndexingCfg,
}

impl JobController {
    pub fn new(
        store: Arc<dyn GalleryStore>,
        faces: Option<Arc<dyn FaceService>>,
        registry: Arc<JobRegistry>,
        cfg: IndexingCfg,
    ) -> Self {
        Self {
            store,
            faces,
            registry,
            cfg,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Check preconditions, mark the gallery in progress and dispatch the run.
    ///
    /// The album's registry slot is claimed before the face service is touched,
    /// so a refused request never resets a live collection. Returns as soon as
    /// the job is queued; progress is only visible through the status record.
    pub async fn start_indexing(&self, album_code: &str) -> Result<StartedJob, StartError> {
        let gallery = self
            .store
            .find_gallery_by_album_code(album_code)
            .await?
            .ok_or_else(|| StartError::NotFound(album_code.to_string()))?;
        let code = gallery.album_code.clone();

        if !gallery.face_indexing_enabled {
            return Err(StartError::FeatureDisabled(code));
        }
        let ticket = self
            .registry
            .reserve(&code)
            .ok_or_else(|| StartError::AlreadyRunning(code.clone()))?;

        let collection_id = match self.prepare(&gallery).await {
            Ok(id) => id,
            Err(e) => {
                self.registry.release(ticket);
                return Err(e);
            }
        };

        let total_photos = gallery.photos.len() as u32;
        if !self
            .registry
            .submit(ticket, collection_id.clone(), gallery.photos)
            .await
        {
            return Err(StartError::ServiceUnavailable("job dispatcher stopped".into()));
        }

        tracing::info!(album_code = %code, collection_id, total_photos, "indexing job dispatched");
        Ok(StartedJob {
            album_code: code,
            collection_id,
            total_photos,
        })
    }

    /// Service checks, collection setup and the start write. Runs with the slot held.
    async fn prepare(&self, gallery: &Gallery) -> Result<String, StartError> {
        let code = gallery.album_code.as_str();
        let faces = self
            .faces
            .as_ref()
            .ok_or_else(|| StartError::ServiceUnavailable("face service is not configured".into()))?;
        let existing = faces
            .list_collections()
            .await
            .map_err(|e| StartError::ServiceUnavailable(e.to_string()))?;

        let collection_id = collection_id_for(code);
        let exists = existing.iter().any(|c| c == &collection_id);
        let reindex = gallery.indexing_status.status != IndexState::NotStarted;
        let reset = exists && reindex && self.cfg.reset_collection_on_reindex;
        if reset {
            // The old index is about to go away; it must not be advertised as usable.
            let not_ready = IndexingStatusPatch {
                is_ready_to_send: Some(false),
                ..Default::default()
            };
            self.store.update_indexing_status(code, not_ready).await?;
        }
        ensure_collection(faces.as_ref(), &collection_id, exists, reset).await?;

        let total_photos = gallery.photos.len() as u32;
        self.store
            .update_indexing_status(code, start_patch(total_photos, self.cfg.eta_minutes_per_photo))
            .await?;
        Ok(collection_id)
    }

    /// Stop a running job. Returns false if nothing was running.
    pub fn stop_indexing(&self, album_code: &str) -> bool {
        self.registry.cancel(album_code)
    }
}

/// Make sure the collection exists, optionally resetting it first.
///
/// "Already exists" counts as success. After a create the collection must
/// show up in a fresh listing.
pub async fn ensure_collection(
    faces: &dyn FaceService,
    collection_id: &str,
    exists: bool,
    reset: bool,
) -> Result<(), StartError> {
    if exists && !reset {
        return Ok(());
    }

    if reset {
        match faces.delete_collection(collection_id).await {
            Ok(()) | Err(FaceServiceError::CollectionNotFound(_)) => {
                tracing::info!(collection_id, "collection reset for re-index");
            }
            Err(e) => return Err(StartError::CollectionCreateFailed(e.to_string())),
        }
    }

    match faces.create_collection(collection_id).await {
        Ok(()) => tracing::info!(collection_id, "collection created"),
        Err(FaceServiceError::AlreadyExists(_)) => {
            tracing::debug!(collection_id, "collection already exists")
        }
        Err(e) => return Err(StartError::CollectionCreateFailed(e.to_string())),
    }

    let listed = faces
        .list_collections()
        .await
        .map_err(|e| StartError::CollectionCreateFailed(e.to_string()))?;
    if !listed.iter().any(|c| c == collection_id) {
        return Err(StartError::CollectionCreateFailed(format!(
            "{collection_id} not visible after create"
        )));
    }
    Ok(())
}
