//! Job registry: one background task per gallery, fed through a channel.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use uuid::Uuid;

use super::orchestrator::{CancelRx, Orchestrator, RunOutcome};
use crate::gallery::{Photo, normalize_album_code};

/// Slot held for an album between precondition checks and dispatch.
#[derive(Debug)]
pub struct JobTicket {
    pub id: Uuid,
    pub album_code: String,
    cancel: CancelRx,
}

/// Work handed to the dispatcher.
#[derive(Debug)]
struct RunRequest {
    ticket: JobTicket,
    collection_id: String,
    photos: Vec<Photo>,
}

/// Registry bookkeeping for one live job.
struct JobEntry {
    id: Uuid,
    cancel: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

type JobMap = Arc<Mutex<HashMap<String, JobEntry>>>;

/// Tracks live indexing jobs keyed by normalized album code.
pub struct JobRegistry {
    jobs: JobMap,
    tx: mpsc::Sender<RunRequest>,
}

impl JobRegistry {
    /// Create the registry and spawn its dispatcher loop.
    pub fn start(orchestrator: Arc<Orchestrator>) -> Arc<Self> {
        let (tx, rx) = mpsc::channel::<RunRequest>(64);
        let jobs: JobMap = Arc::default();
        tokio::spawn(dispatch(rx, jobs.clone(), orchestrator));
        tracing::info!("job registry started");
        Arc::new(Self { jobs, tx })
    }

    pub fn is_running(&self, album_code: &str) -> bool {
        let key = normalize_album_code(album_code);
        self.lock().contains_key(&key)
    }

    /// Album codes with a live job.
    pub fn running(&self) -> Vec<String> {
        let mut v: Vec<String> = self.lock().keys().cloned().collect();
        v.sort();
        v
    }

    /// Claim the album's slot. `None` if a job already holds it.
    pub fn reserve(&self, album_code: &str) -> Option<JobTicket> {
        let key = normalize_album_code(album_code);
        let mut jobs = self.lock();
        if jobs.contains_key(&key) {
            return None;
        }
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let id = Uuid::new_v4();
        jobs.insert(
            key,
            JobEntry {
                id,
                cancel: cancel_tx,
                handle: None,
            },
        );
        Some(JobTicket {
            id,
            album_code: album_code.to_string(),
            cancel: cancel_rx,
        })
    }

    /// Give back a slot that will never be dispatched.
    pub fn release(&self, ticket: JobTicket) {
        remove_if_current(&self.jobs, &ticket.album_code, ticket.id);
    }

    /// Hand a reserved job to the dispatcher. Returns false if the dispatcher is gone.
    pub async fn submit(&self, ticket: JobTicket, collection_id: String, photos: Vec<Photo>) -> bool {
        let album_code = ticket.album_code.clone();
        let id = ticket.id;
        let req = RunRequest {
            ticket,
            collection_id,
            photos,
        };
        if self.tx.send(req).await.is_err() {
            tracing::error!(album_code, "dispatcher stopped, job dropped");
            remove_if_current(&self.jobs, &album_code, id);
            return false;
        }
        true
    }

    /// Ask a running job to stop. Returns false if none is running.
    pub fn cancel(&self, album_code: &str) -> bool {
        let key = normalize_album_code(album_code);
        match self.lock().get(&key) {
            Some(entry) => {
                let _ = entry.cancel.send(true);
                tracing::info!(album_code, "cancel requested");
                true
            }
            None => false,
        }
    }

    /// Signal every live job to stop.
    pub fn cancel_all(&self) {
        for entry in self.lock().values() {
            let _ = entry.cancel.send(true);
        }
    }

    /// Cancel every live job and wait until each has written its final status.
    pub async fn shutdown(&self) {
        self.cancel_all();
        for code in self.running() {
            self.join(&code).await;
        }
        tracing::info!("all jobs stopped");
    }

    /// Wait until the album has no live job.
    pub async fn join(&self, album_code: &str) {
        let key = normalize_album_code(album_code);
        loop {
            let handle = {
                let mut jobs = self.lock();
                match jobs.get_mut(&key) {
                    None => return,
                    Some(entry) => entry.handle.take(),
                }
            };
            match handle {
                Some(h) => {
                    let _ = h.await;
                }
                // Not dispatched yet.
                None => tokio::time::sleep(Duration::from_millis(5)).await,
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, JobEntry>> {
        lock_jobs(&self.jobs)
    }
}

fn lock_jobs(jobs: &JobMap) -> std::sync::MutexGuard<'_, HashMap<String, JobEntry>> {
    // A poisoned map only means a panic elsewhere; the data is still usable.
    jobs.lock().unwrap_or_else(|e| e.into_inner())
}

fn remove_if_current(jobs: &JobMap, album_code: &str, id: Uuid) {
    let key = normalize_album_code(album_code);
    let mut map = lock_jobs(jobs);
    if map.get(&key).is_some_and(|e| e.id == id) {
        map.remove(&key);
    }
}

/// Dispatcher loop: spawn one task per request and remember its handle.
async fn dispatch(mut rx: mpsc::Receiver<RunRequest>, jobs: JobMap, orchestrator: Arc<Orchestrator>) {
    while let Some(req) = rx.recv().await {
        let RunRequest {
            ticket,
            collection_id,
            photos,
        } = req;
        let JobTicket {
            id,
            album_code,
            cancel,
        } = ticket;

        let task_jobs = jobs.clone();
        let orch = orchestrator.clone();
        let task_code = album_code.clone();
        let handle = tokio::spawn(async move {
            let report = orch.run(&collection_id, &task_code, &photos, cancel).await;
            match &report.outcome {
                RunOutcome::Completed => tracing::info!(album_code = %task_code, ?report, "job finished"),
                RunOutcome::Failed(reason) => {
                    tracing::warn!(album_code = %task_code, ?report, "job failed: {reason}")
                }
                RunOutcome::Cancelled => tracing::info!(album_code = %task_code, ?report, "job cancelled"),
            }
            remove_if_current(&task_jobs, &task_code, id);
        });

        let key = normalize_album_code(&album_code);
        if let Some(entry) = lock_jobs(&jobs).get_mut(&key) {
            if entry.id == id {
                entry.handle = Some(handle);
            }
        }
    }
    tracing::info!("job dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::IndexingCfg,
        gallery::{GalleryStore, IndexState},
        indexing::{
            testing::{FaceMode, MemPhotoSource, RecordingStore, ScriptedFaceService},
            transform::ImageTransformer,
        },
    };

    fn registry(store: Arc<RecordingStore>, delay_ms: u64) -> Arc<JobRegistry> {
        let orch = Orchestrator::new(
            store,
            Arc::new(ScriptedFaceService::new(FaceMode::Normal)),
            Arc::new(MemPhotoSource::new()),
            ImageTransformer::new(5 * 1024 * 1024),
            IndexingCfg {
                success_delay_ms: delay_ms,
                skip_delay_ms: 0,
                batch_delay_ms: 0,
                ..IndexingCfg::default()
            },
        );
        JobRegistry::start(Arc::new(orch))
    }

    async fn photos(store: &RecordingStore, code: &str) -> Vec<Photo> {
        store
            .find_gallery_by_album_code(code)
            .await
            .unwrap()
            .unwrap()
            .photos
    }

    #[tokio::test]
    async fn one_slot_per_album() {
        let store = RecordingStore::with_gallery("g", 1, true);
        let reg = registry(store, 0);
        let ticket = reg.reserve("G").unwrap();
        assert!(reg.is_running("g"));
        assert!(reg.reserve("g").is_none());
        reg.release(ticket);
        assert!(!reg.is_running("g"));
        assert!(reg.reserve("g").is_some());
    }

    #[tokio::test]
    async fn submitted_job_runs_and_frees_its_slot() {
        let store = RecordingStore::with_gallery("g", 4, true);
        let reg = registry(store.clone(), 0);
        let ticket = reg.reserve("g").unwrap();
        assert!(reg.submit(ticket, "collection-g".into(), photos(&store, "g").await).await);

        reg.join("g").await;
        assert!(!reg.is_running("g"));
        assert!(reg.running().is_empty());
        let st = store.status("g").await;
        assert_eq!(st.status, IndexState::Completed);
        assert_eq!(st.indexed_photos, 4);
    }

    #[tokio::test]
    async fn galleries_index_concurrently_and_cancel_independently() {
        let store = RecordingStore::with_gallery("slow", 6, true);
        store.insert(crate::indexing::testing::gallery("fast", true, vec!["x.jpg".into()]));
        let reg = registry(store.clone(), 60_000);

        let slow = reg.reserve("slow").unwrap();
        reg.submit(slow, "collection-slow".into(), photos(&store, "slow").await).await;
        let fast = reg.reserve("fast").unwrap();
        reg.submit(fast, "collection-fast".into(), photos(&store, "fast").await).await;

        reg.join("fast").await;
        assert_eq!(store.status("fast").await.status, IndexState::Completed);
        assert_eq!(reg.running(), vec!["slow".to_string()]);

        assert!(reg.cancel("slow"));
        reg.join("slow").await;
        assert_eq!(store.status("slow").await.status, IndexState::Failed);
        assert!(!reg.cancel("slow"));
    }

    #[tokio::test]
    async fn shutdown_waits_for_final_status() {
        let store = RecordingStore::with_gallery("a", 6, true);
        store.insert(crate::indexing::testing::gallery(
            "b",
            true,
            vec!["x.jpg".into(), "y.jpg".into()],
        ));
        let reg = registry(store.clone(), 60_000);
        for code in ["a", "b"] {
            let ticket = reg.reserve(code).unwrap();
            reg.submit(ticket, format!("collection-{code}"), photos(&store, code).await)
                .await;
        }

        reg.shutdown().await;
        assert!(reg.running().is_empty());
        assert_eq!(store.status("a").await.status, IndexState::Failed);
        assert_eq!(store.status("b").await.status, IndexState::Failed);
    }
}
