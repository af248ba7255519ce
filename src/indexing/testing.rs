//! In-memory collaborators for pipeline tests.

use async_trait::async_trait;
use chrono::Utc;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use super::fetcher::{FetchError, PhotoSource};
use crate::face::{FaceRecord, FaceResult, FaceService, FaceServiceError, QualityFilter};
use crate::gallery::{
    Gallery, GalleryStore, IndexingStatus, IndexingStatusPatch, Photo, StoreError,
    normalize_album_code,
};

/// Gallery store that keeps a snapshot after every status write.
#[derive(Default)]
pub struct RecordingStore {
    galleries: Mutex<HashMap<String, Gallery>>,
    history: Mutex<HashMap<String, Vec<IndexingStatus>>>,
    /// When set, every status write fails.
    pub fail_writes: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store with one gallery of `photos` photos named `p{i}.jpg`.
    pub fn with_gallery(code: &str, photos: usize, enabled: bool) -> Arc<Self> {
        let store = Self::new();
        store.insert(gallery(
            code,
            enabled,
            (0..photos).map(|i| format!("p{i}.jpg")).collect(),
        ));
        store
    }

    pub fn insert(&self, g: Gallery) {
        let mut map = self.galleries.lock().unwrap();
        map.insert(normalize_album_code(&g.album_code), g);
    }

    pub async fn status(&self, code: &str) -> IndexingStatus {
        let map = self.galleries.lock().unwrap();
        map[&normalize_album_code(code)].indexing_status.clone()
    }

    /// Every status snapshot written for `code`, oldest first.
    pub fn history(&self, code: &str) -> Vec<IndexingStatus> {
        let h = self.history.lock().unwrap();
        h.get(&normalize_album_code(code)).cloned().unwrap_or_default()
    }

    pub async fn apply_now(&self, code: &str, patch: IndexingStatusPatch) {
        self.update_indexing_status(code, patch).await.unwrap();
    }
}

/// Gallery whose photo URLs are `mem://{label}`.
pub fn gallery(code: &str, enabled: bool, labels: Vec<String>) -> Gallery {
    Gallery {
        album_code: code.into(),
        face_indexing_enabled: enabled,
        photos: labels
            .into_iter()
            .map(|label| Photo {
                url: format!("mem://{label}"),
                label,
            })
            .collect(),
        indexing_status: IndexingStatus::default(),
    }
}

#[async_trait]
impl GalleryStore for RecordingStore {
    async fn find_gallery_by_album_code(&self, code: &str) -> Result<Option<Gallery>, StoreError> {
        let map = self.galleries.lock().unwrap();
        Ok(map.get(&normalize_album_code(code)).cloned())
    }

    async fn update_indexing_status(
        &self,
        code: &str,
        patch: IndexingStatusPatch,
    ) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("store offline")));
        }
        let key = normalize_album_code(code);
        let mut map = self.galleries.lock().unwrap();
        let g = map
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(code.to_string()))?;
        g.indexing_status.apply(&patch, Utc::now());
        let snapshot = g.indexing_status.clone();
        drop(map);
        self.history.lock().unwrap().entry(key).or_default().push(snapshot);
        Ok(())
    }

    async fn list_galleries(&self) -> Result<Vec<Gallery>, StoreError> {
        let map = self.galleries.lock().unwrap();
        Ok(map.values().cloned().collect())
    }
}

/// How the scripted face service misbehaves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FaceMode {
    #[default]
    Normal,
    /// Every detect/index call fails with a generic error.
    FailEverything,
    /// Index calls report the collection as deleted.
    CollectionGone,
    /// `list_collections` fails.
    Unreachable,
    /// `create_collection` reports success but nothing is created.
    SilentCreateFailure,
}

/// Face service stub. Images are keyed by their byte content as UTF-8.
#[derive(Default)]
pub struct ScriptedFaceService {
    pub mode: FaceMode,
    /// Face count per image content; missing entries use `default_faces`.
    pub faces: HashMap<String, usize>,
    pub default_faces: usize,
    pub collections: Mutex<HashSet<String>>,
    pub create_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub detect_calls: AtomicUsize,
    pub indexed: Mutex<Vec<String>>,
}

impl ScriptedFaceService {
    pub fn new(mode: FaceMode) -> Self {
        Self {
            mode,
            default_faces: 1,
            ..Default::default()
        }
    }

    pub fn with_faces(mut self, image: &str, count: usize) -> Self {
        self.faces.insert(image.to_string(), count);
        self
    }

    pub fn with_default_faces(mut self, count: usize) -> Self {
        self.default_faces = count;
        self
    }

    pub fn with_collection(self, id: &str) -> Self {
        self.collections.lock().unwrap().insert(id.to_string());
        self
    }

    pub fn detect_calls(&self) -> usize {
        self.detect_calls.load(Ordering::SeqCst)
    }

    /// External ids passed to `index_faces`, in call order.
    pub fn indexed_ids(&self) -> Vec<String> {
        self.indexed.lock().unwrap().clone()
    }

    fn faces_in(&self, image: &[u8]) -> usize {
        let key = String::from_utf8_lossy(image);
        self.faces
            .get(key.as_ref())
            .copied()
            .unwrap_or(self.default_faces)
    }
}

#[async_trait]
impl FaceService for ScriptedFaceService {
    async fn create_collection(&self, collection_id: &str) -> FaceResult<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.mode == FaceMode::SilentCreateFailure {
            return Ok(());
        }
        let mut set = self.collections.lock().unwrap();
        if !set.insert(collection_id.to_string()) {
            return Err(FaceServiceError::AlreadyExists(collection_id.to_string()));
        }
        Ok(())
    }

    async fn delete_collection(&self, collection_id: &str) -> FaceResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let mut set = self.collections.lock().unwrap();
        if !set.remove(collection_id) {
            return Err(FaceServiceError::CollectionNotFound(collection_id.to_string()));
        }
        Ok(())
    }

    async fn list_collections(&self) -> FaceResult<Vec<String>> {
        if self.mode == FaceMode::Unreachable {
            return Err(FaceServiceError::Unavailable("connection refused".into()));
        }
        Ok(self.collections.lock().unwrap().iter().cloned().collect())
    }

    async fn detect_faces(&self, image: &[u8]) -> FaceResult<usize> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        if self.mode == FaceMode::FailEverything {
            return Err(FaceServiceError::Other("internal failure".into()));
        }
        Ok(self.faces_in(image))
    }

    async fn index_faces(
        &self,
        collection_id: &str,
        image: &[u8],
        external_id: &str,
        max_faces: u32,
        _quality_filter: QualityFilter,
    ) -> FaceResult<Vec<FaceRecord>> {
        match self.mode {
            FaceMode::FailEverything => {
                return Err(FaceServiceError::Other("internal failure".into()));
            }
            FaceMode::CollectionGone => {
                return Err(FaceServiceError::CollectionNotFound(collection_id.to_string()));
            }
            _ => {}
        }
        self.indexed.lock().unwrap().push(external_id.to_string());
        let n = self.faces_in(image).min(max_faces as usize);
        Ok((0..n)
            .map(|i| FaceRecord {
                face_id: format!("{external_id}-face-{i}"),
                external_image_id: external_id.to_string(),
                confidence: 99.0,
            })
            .collect())
    }
}

/// Photo source serving `mem://{label}` as the label's bytes.
#[derive(Default)]
pub struct MemPhotoSource {
    /// Labels whose download always fails.
    pub broken: HashSet<String>,
    /// Overrides for specific labels.
    pub payloads: HashMap<String, Vec<u8>>,
    pub calls: AtomicUsize,
}

impl MemPhotoSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn broken(mut self, label: &str) -> Self {
        self.broken.insert(label.to_string());
        self
    }

    pub fn payload(mut self, label: &str, bytes: Vec<u8>) -> Self {
        self.payloads.insert(label.to_string(), bytes);
        self
    }
}

#[async_trait]
impl PhotoSource for MemPhotoSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let label = url.trim_start_matches("mem://");
        if self.broken.contains(label) {
            return Err(FetchError::Exhausted {
                attempts: 3,
                last: "connection reset".into(),
            });
        }
        Ok(self
            .payloads
            .get(label)
            .cloned()
            .unwrap_or_else(|| label.as_bytes().to_vec()))
    }
}
