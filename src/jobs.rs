//! Indexing job state and the gallery rows shown by the console.

use std::time::Instant;
use uuid::Uuid;

use crate::gallery::IndexingStatus;

/// Ephemeral per-run state. Lost on restart; runs then start over from photo 0.
#[derive(Clone, Debug)]
pub struct IndexingJob {
    /// Stable id used in logs.
    pub id: Uuid,
    /// Album the job indexes.
    pub album_code: String,
    /// Zero-based batch currently being processed.
    pub batch_index: usize,
    /// Per-photo failures since the last success or business skip.
    pub consecutive_errors: u32,
    /// When the run began.
    pub started_at: Instant,
}

impl IndexingJob {
    pub fn new(album_code: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            album_code: album_code.into(),
            batch_index: 0,
            consecutive_errors: 0,
            started_at: Instant::now(),
        }
    }
}

/// One gallery as listed in the console.
#[derive(Clone, Debug)]
pub struct GalleryRow {
    pub album_code: String,
    pub photos: usize,
    /// Face indexing feature flag.
    pub enabled: bool,
    /// Last persisted status record.
    pub status: IndexingStatus,
    /// A job for this gallery is live in the registry.
    pub running: bool,
}

impl GalleryRow {
    /// Percentage of photos processed, for the progress column.
    pub fn percent(&self) -> u32 {
        if self.status.total_photos == 0 {
            return 0;
        }
        self.status.indexed_photos * 100 / self.status.total_photos
    }
}
