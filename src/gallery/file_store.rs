//! Gallery store persisted as a single JSON file.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{io::ErrorKind, path::PathBuf};
use tokio::{
    fs,
    io::{AsyncWriteExt, BufWriter},
    sync::Mutex,
};

use super::{Gallery, GalleryStore, IndexingStatusPatch, StoreError, normalize_album_code};

/// On-disk document layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDoc {
    #[serde(default)]
    galleries: Vec<Gallery>,
}

/// Stores galleries in a local JSON file (galleries.json).
pub struct JsonFileGalleryStore {
    /// Location of the gallery document on disk.
    path: PathBuf,
    /// Serializes read-modify-write cycles on the file.
    lock: Mutex<()>,
}

impl JsonFileGalleryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Load the whole document; a missing file is an empty store.
    async fn load_doc(&self) -> Result<StoreDoc, StoreError> {
        match fs::read(&self.path).await {
            Ok(data) => {
                if data.is_empty() {
                    return Ok(StoreDoc::default());
                }
                Ok(serde_json::from_slice(&data)?)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(StoreDoc::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to a sibling temp file, then rename over the original.
    async fn save_doc(&self, doc: &StoreDoc) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let data = serde_json::to_vec_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        let file = fs::File::create(&tmp).await?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&data).await?;
        writer.flush().await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl GalleryStore for JsonFileGalleryStore {
    async fn find_gallery_by_album_code(&self, code: &str) -> Result<Option<Gallery>, StoreError> {
        let key = normalize_album_code(code);
        let _guard = self.lock.lock().await;
        let doc = self.load_doc().await?;
        Ok(doc
            .galleries
            .into_iter()
            .find(|g| normalize_album_code(&g.album_code) == key))
    }

    async fn update_indexing_status(
        &self,
        code: &str,
        patch: IndexingStatusPatch,
    ) -> Result<(), StoreError> {
        let key = normalize_album_code(code);
        let _guard = self.lock.lock().await;
        let mut doc = self.load_doc().await?;
        let gallery = doc
            .galleries
            .iter_mut()
            .find(|g| normalize_album_code(&g.album_code) == key)
            .ok_or_else(|| StoreError::NotFound(code.to_string()))?;
        gallery.indexing_status.apply(&patch, Utc::now());
        self.save_doc(&doc).await
    }

    async fn list_galleries(&self) -> Result<Vec<Gallery>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load_doc().await?.galleries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::{IndexState, IndexingStatus, Photo};

    fn gallery(code: &str) -> Gallery {
        Gallery {
            album_code: code.into(),
            face_indexing_enabled: true,
            photos: vec![Photo {
                url: "https://cdn.example/a.jpg".into(),
                label: "a.jpg".into(),
            }],
            indexing_status: IndexingStatus::default(),
        }
    }

    #[tokio::test]
    async fn missing_file_is_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileGalleryStore::new(dir.path().join("galleries.json"));
        assert!(store.list_galleries().await.unwrap().is_empty());
        assert!(
            store
                .find_gallery_by_album_code("anything")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn status_updates_persist_and_lookup_ignores_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("galleries.json");
        let doc = StoreDoc {
            galleries: vec![gallery("Wedding-42"), gallery("other")],
        };
        std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

        let store = JsonFileGalleryStore::new(&path);
        store
            .update_indexing_status(
                "WEDDING-42",
                IndexingStatusPatch {
                    status: Some(IndexState::InProgress),
                    total_photos: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // A fresh store instance sees the change on disk.
        let reopened = JsonFileGalleryStore::new(&path);
        let g = reopened
            .find_gallery_by_album_code("wedding-42")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(g.indexing_status.status, IndexState::InProgress);
        assert_eq!(g.indexing_status.total_photos, 1);
        assert!(g.indexing_status.last_updated.is_some());

        let untouched = reopened
            .find_gallery_by_album_code("other")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(untouched.indexing_status.status, IndexState::NotStarted);
    }

    #[tokio::test]
    async fn updating_unknown_gallery_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileGalleryStore::new(dir.path().join("galleries.json"));
        let err = store
            .update_indexing_status("nope", IndexingStatusPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
