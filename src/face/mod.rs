//! Face-recognition service contract.

/// HTTP gateway client.
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gallery::normalize_album_code;

pub use http::HttpFaceService;

/// Quality filter the service applies before indexing.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityFilter {
    None,
    #[default]
    Auto,
    Low,
    Medium,
    High,
}

/// One face stored in a collection.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FaceRecord {
    pub face_id: String,
    pub external_image_id: String,
    #[serde(default)]
    pub confidence: f32,
}

/// Face service failures, classified for the orchestrator.
#[derive(Debug, Error)]
pub enum FaceServiceError {
    #[error("collection {0} not found")]
    CollectionNotFound(String),

    #[error("collection {0} already exists")]
    AlreadyExists(String),

    #[error("face service throttled the request")]
    Throttled,

    #[error("image rejected by face service: {0}")]
    InvalidImage(String),

    #[error("face service unavailable: {0}")]
    Unavailable(String),

    #[error("face service error: {0}")]
    Other(String),
}

pub type FaceResult<T> = Result<T, FaceServiceError>;

/// Operations the pipeline needs from the face service.
#[async_trait]
pub trait FaceService: Send + Sync {
    async fn create_collection(&self, collection_id: &str) -> FaceResult<()>;

    async fn delete_collection(&self, collection_id: &str) -> FaceResult<()>;

    async fn list_collections(&self) -> FaceResult<Vec<String>>;

    /// Number of faces visible in the image. Persists nothing.
    async fn detect_faces(&self, image: &[u8]) -> FaceResult<usize>;

    /// Extract and persist faces tagged with `external_id`.
    async fn index_faces(
        &self,
        collection_id: &str,
        image: &[u8],
        external_id: &str,
        max_faces: u32,
        quality_filter: QualityFilter,
    ) -> FaceResult<Vec<FaceRecord>>;
}

/// Deterministic collection id for an album.
///
/// Codes are matched case-insensitively, so they are normalized first.
/// `[a-z0-9.-]` is kept as is; every other byte becomes `_xx` (lower hex).
/// `_` is the escape marker itself, which keeps distinct codes distinct.
pub fn collection_id_for(album_code: &str) -> String {
    let mut id = String::from("collection-");
    for b in normalize_album_code(album_code).bytes() {
        if b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-' {
            id.push(b as char);
        } else {
            id.push_str(&format!("_{b:02x}"));
        }
    }
    id
}

/// External id that maps an indexed face back to its photo position.
pub fn external_id_for(photo_index: usize) -> String {
    format!("photo-{photo_index}")
}
