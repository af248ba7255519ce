//! Config model and persistence helpers.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

/// Top-level configuration stored in `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where gallery records live.
    pub store: StoreCfg,
    /// Face-recognition gateway connection.
    pub face_service: FaceServiceCfg,
    /// Photo download behaviour.
    pub fetch: FetchCfg,
    /// Batch loop pacing and abort thresholds.
    pub indexing: IndexingCfg,
    /// Payload ceiling for the face service.
    pub transform: TransformCfg,
}

/// Gallery store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreCfg {
    /// JSON file holding every gallery.
    pub path: String,
}

/// Face service endpoint and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceServiceCfg {
    /// Base URL, e.g. `https://faces.internal:8443`. Empty disables indexing.
    pub endpoint: String,
    /// Bearer token sent with every call.
    pub api_token: String,
    /// Per-call timeout.
    pub timeout_secs: u64,
}

/// Photo fetcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchCfg {
    pub timeout_secs: u64,
    pub max_attempts: u32,
    /// Linear backoff step; attempt `n` waits `n * backoff_secs`.
    pub backoff_secs: u64,
    pub user_agent: String,
}

/// Batch orchestration knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingCfg {
    pub batch_size: usize,
    pub max_consecutive_errors: u32,
    /// Pause after a photo was indexed.
    pub success_delay_ms: u64,
    /// Pause after a photo was skipped.
    pub skip_delay_ms: u64,
    /// Pause between batches.
    pub batch_delay_ms: u64,
    /// Fixed per-photo time budget used for the initial ETA.
    pub eta_minutes_per_photo: f64,
    pub max_faces_per_image: u32,
    /// Drop and recreate the collection when a gallery is indexed again.
    pub reset_collection_on_reindex: bool,
}

/// Image transformer limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformCfg {
    /// Largest payload the face service accepts.
    pub max_payload_bytes: usize,
}

impl Config {
    /// Load from disk or create defaults when missing.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let s = fs::read_to_string(path)?;
            Ok(toml::from_str(&s)?)
        } else {
            let cfg = Self::default();
            cfg.save(path)?;
            Ok(cfg)
        }
    }

    /// Persist the config as pretty TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let s = toml::to_string_pretty(self)?;
        fs::write(path, s)?;
        Ok(())
    }

    /// True when a face service endpoint has been set.
    pub fn face_service_configured(&self) -> bool {
        !self.face_service.endpoint.trim().is_empty()
    }
}

impl IndexingCfg {
    pub fn success_delay(&self) -> Duration {
        Duration::from_millis(self.success_delay_ms)
    }

    pub fn skip_delay(&self) -> Duration {
        Duration::from_millis(self.skip_delay_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

impl Default for Config {
    /// Defaults match the face service's rate and payload limits.
    fn default() -> Self {
        Self {
            store: StoreCfg {
                path: "galleries.json".into(),
            },
            face_service: FaceServiceCfg {
                endpoint: "".into(),
                api_token: "".into(),
                timeout_secs: 30,
            },
            fetch: FetchCfg {
                timeout_secs: 60,
                max_attempts: 3,
                backoff_secs: 2,
                user_agent: "face-indexer/0.1 (+gallery face indexing)".into(),
            },
            indexing: IndexingCfg::default(),
            transform: TransformCfg {
                max_payload_bytes: 5 * 1024 * 1024,
            },
        }
    }
}

impl Default for IndexingCfg {
    fn default() -> Self {
        Self {
            batch_size: 3,
            max_consecutive_errors: 3,
            success_delay_ms: 500,
            skip_delay_ms: 200,
            batch_delay_ms: 2000,
            eta_minutes_per_photo: 0.3,
            max_faces_per_image: 10,
            reset_collection_on_reindex: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        // First load writes the default file.
        let cfg = Config::load_or_default(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.indexing.batch_size, 3);
        assert!(!cfg.face_service_configured());

        let mut edited = cfg.clone();
        edited.face_service.endpoint = "http://localhost:9000".into();
        edited.save(&path).unwrap();

        let reloaded = Config::load_or_default(&path).unwrap();
        assert!(reloaded.face_service_configured());
        assert_eq!(reloaded.transform.max_payload_bytes, 5 * 1024 * 1024);
    }
}
