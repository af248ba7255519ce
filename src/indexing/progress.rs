//! Progress, ETA and terminal status written to the gallery record.

use std::{sync::Arc, time::Duration, time::Instant};

use crate::gallery::{GalleryStore, IndexState, IndexingStatusPatch};

/// Minutes for `photos` at a fixed per-photo budget, rounded up.
pub fn budget_minutes(photos: u32, minutes_per_photo: f64) -> u32 {
    // Trim float noise first so 10 * 0.3 stays 3, not 4.
    let raw = (photos as f64 * minutes_per_photo * 1e6).round() / 1e6;
    raw.ceil().max(0.0) as u32
}

/// Remaining-time estimate.
///
/// Until `warmup` photos are processed the fixed budget is used; after that
/// the measured average time per photo.
pub fn estimate_minutes(
    remaining: u32,
    processed: u32,
    elapsed: Duration,
    minutes_per_photo: f64,
    warmup: u32,
) -> u32 {
    if remaining == 0 {
        return 0;
    }
    if processed < warmup.max(1) {
        return budget_minutes(remaining, minutes_per_photo);
    }
    let secs_per_photo = elapsed.as_secs_f64() / processed as f64;
    (remaining as f64 * secs_per_photo / 60.0).ceil() as u32
}

/// Patch written when a run starts.
pub fn start_patch(total_photos: u32, minutes_per_photo: f64) -> IndexingStatusPatch {
    IndexingStatusPatch {
        status: Some(IndexState::InProgress),
        total_photos: Some(total_photos),
        indexed_photos: Some(0),
        faces_indexed: Some(0),
        is_ready_to_send: Some(false),
        estimated_time_remaining: Some(budget_minutes(total_photos, minutes_per_photo)),
    }
}

/// Tracks counts for one run and persists them. Single writer per gallery.
pub struct ProgressTracker {
    store: Arc<dyn GalleryStore>,
    album_code: String,
    total: u32,
    indexed: u32,
    faces: u32,
    started: Instant,
    minutes_per_photo: f64,
    warmup: u32,
}

impl ProgressTracker {
    pub fn new(
        store: Arc<dyn GalleryStore>,
        album_code: impl Into<String>,
        total: u32,
        minutes_per_photo: f64,
        warmup: u32,
    ) -> Self {
        Self {
            store,
            album_code: album_code.into(),
            total,
            indexed: 0,
            faces: 0,
            started: Instant::now(),
            minutes_per_photo,
            warmup,
        }
    }

    pub fn indexed_photos(&self) -> u32 {
        self.indexed
    }

    pub fn faces_indexed(&self) -> u32 {
        self.faces
    }

    pub fn eta_minutes(&self) -> u32 {
        estimate_minutes(
            self.total - self.indexed,
            self.indexed,
            self.started.elapsed(),
            self.minutes_per_photo,
            self.warmup,
        )
    }

    /// Count one processed photo and persist the new totals.
    pub async fn record_processed(&mut self, faces_added: u32) {
        // Clamp so the count can never exceed the total.
        self.indexed = (self.indexed + 1).min(self.total);
        self.faces += faces_added;
        let patch = IndexingStatusPatch {
            indexed_photos: Some(self.indexed),
            faces_indexed: Some(self.faces),
            estimated_time_remaining: Some(self.eta_minutes()),
            ..Default::default()
        };
        self.write(patch).await;
    }

    /// Refresh only the ETA.
    pub async fn touch(&self) {
        let patch = IndexingStatusPatch {
            estimated_time_remaining: Some(self.eta_minutes()),
            ..Default::default()
        };
        self.write(patch).await;
    }

    /// Terminal success.
    pub async fn complete(&self) {
        let patch = IndexingStatusPatch {
            status: Some(IndexState::Completed),
            indexed_photos: Some(self.indexed),
            faces_indexed: Some(self.faces),
            is_ready_to_send: Some(self.faces > 0),
            estimated_time_remaining: Some(0),
            ..Default::default()
        };
        self.write(patch).await;
        tracing::info!(
            album_code = %self.album_code,
            indexed = self.indexed,
            faces = self.faces,
            "indexing completed"
        );
    }

    /// Terminal failure; counts stay at their last written value.
    pub async fn fail(&self, reason: &str) {
        let patch = IndexingStatusPatch {
            status: Some(IndexState::Failed),
            is_ready_to_send: Some(false),
            estimated_time_remaining: Some(0),
            ..Default::default()
        };
        self.write(patch).await;
        tracing::error!(album_code = %self.album_code, indexed = self.indexed, "indexing failed: {reason}");
    }

    async fn write(&self, patch: IndexingStatusPatch) {
        if let Err(e) = self.store.update_indexing_status(&self.album_code, patch).await {
            tracing::warn!(album_code = %self.album_code, "status write failed: {e}");
        }
    }
}
