//! Gallery records and the store contract used by the indexing pipeline.

/// JSON file backed store.
pub mod file_store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use file_store::JsonFileGalleryStore;

/// A single photograph in a gallery.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Photo {
    pub url: String,
    pub label: String,
}

impl Photo {
    /// Photos without a usable source URL cannot be processed.
    pub fn is_malformed(&self) -> bool {
        self.url.trim().is_empty()
    }
}

/// Lifecycle of a gallery's face index.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl IndexState {
    /// Terminal states end a run.
    pub fn is_terminal(self) -> bool {
        matches!(self, IndexState::Completed | IndexState::Failed)
    }

    pub fn label(self) -> &'static str {
        match self {
            IndexState::NotStarted => "not_started",
            IndexState::InProgress => "in_progress",
            IndexState::Completed => "completed",
            IndexState::Failed => "failed",
        }
    }
}

/// Persisted progress of the face index for one gallery.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IndexingStatus {
    pub status: IndexState,
    pub total_photos: u32,
    /// Photos that reached a definitive outcome (indexed or skipped).
    pub indexed_photos: u32,
    /// Face records accepted by the face service.
    #[serde(default)]
    pub faces_indexed: u32,
    pub is_ready_to_send: bool,
    /// Minutes.
    pub estimated_time_remaining: u32,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for IndexingStatus {
    fn default() -> Self {
        Self {
            status: IndexState::NotStarted,
            total_photos: 0,
            indexed_photos: 0,
            faces_indexed: 0,
            is_ready_to_send: false,
            estimated_time_remaining: 0,
            last_updated: None,
        }
    }
}

/// Set-style partial update. `None` fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndexingStatusPatch {
    pub status: Option<IndexState>,
    pub total_photos: Option<u32>,
    pub indexed_photos: Option<u32>,
    pub faces_indexed: Option<u32>,
    pub is_ready_to_send: Option<bool>,
    pub estimated_time_remaining: Option<u32>,
}

impl IndexingStatus {
    /// Apply a patch and stamp `last_updated`.
    pub fn apply(&mut self, patch: &IndexingStatusPatch, now: DateTime<Utc>) {
        if let Some(s) = patch.status {
            self.status = s;
        }
        if let Some(n) = patch.total_photos {
            self.total_photos = n;
        }
        if let Some(n) = patch.indexed_photos {
            self.indexed_photos = n;
        }
        if let Some(n) = patch.faces_indexed {
            self.faces_indexed = n;
        }
        if let Some(b) = patch.is_ready_to_send {
            self.is_ready_to_send = b;
        }
        if let Some(m) = patch.estimated_time_remaining {
            self.estimated_time_remaining = m;
        }
        self.last_updated = Some(now);
    }
}

/// A customer gallery as seen by the pipeline.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Gallery {
    pub album_code: String,
    #[serde(default)]
    pub face_indexing_enabled: bool,
    #[serde(default)]
    pub photos: Vec<Photo>,
    #[serde(default)]
    pub indexing_status: IndexingStatus,
}

/// Case-insensitive album code key.
pub fn normalize_album_code(code: &str) -> String {
    code.trim().to_ascii_lowercase()
}

/// Gallery store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("gallery {0} not found")]
    NotFound(String),

    #[error("store io failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store data is invalid: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Persistence contract for galleries. Only the status sub-record is written.
#[async_trait]
pub trait GalleryStore: Send + Sync {
    /// Look up a gallery by album code (case-insensitive).
    async fn find_gallery_by_album_code(&self, code: &str) -> Result<Option<Gallery>, StoreError>;

    /// Apply a partial status update without a prior read by the caller.
    async fn update_indexing_status(
        &self,
        code: &str,
        patch: IndexingStatusPatch,
    ) -> Result<(), StoreError>;

    /// Every gallery, for listings.
    async fn list_galleries(&self) -> Result<Vec<Gallery>, StoreError>;
}
