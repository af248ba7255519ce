//! Batch orchestrator: drives every photo through fetch, transform, detect and index.

use std::{sync::Arc, time::Duration};
use tokio::sync::watch;

use super::{
    fetcher::PhotoSource,
    progress::ProgressTracker,
    transform::ImageTransformer,
};
use crate::{
    config::IndexingCfg,
    face::{FaceService, FaceServiceError, QualityFilter, external_id_for},
    gallery::{GalleryStore, Photo},
    jobs::IndexingJob,
};

/// Receiving side of a job's stop signal. `true` means stop.
pub type CancelRx = watch::Receiver<bool>;

/// What happened to a single photo.
#[derive(Clone, Debug, PartialEq)]
pub enum PhotoOutcome {
    /// Faces were stored in the collection.
    Indexed { faces: u32 },
    /// Detect found nothing, or the quality filter dropped every face.
    NoFace,
    /// Still over the payload ceiling after extreme compression.
    Oversized { bytes: usize },
    /// Download failed after all retries.
    FetchFailed(String),
    /// Photo record has no usable URL.
    Malformed,
    /// Any other failure.
    Failed(String),
    /// Collection disappeared while the job was running.
    CollectionGone(String),
}

/// Effect of an outcome on the consecutive-error counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorStep {
    Reset,
    Keep,
    Increment,
    Fatal,
}

impl PhotoOutcome {
    pub fn error_step(&self) -> ErrorStep {
        match self {
            PhotoOutcome::Indexed { .. } | PhotoOutcome::NoFace | PhotoOutcome::Oversized { .. } => {
                ErrorStep::Reset
            }
            PhotoOutcome::FetchFailed(_) | PhotoOutcome::Malformed => ErrorStep::Keep,
            PhotoOutcome::Failed(_) => ErrorStep::Increment,
            PhotoOutcome::CollectionGone(_) => ErrorStep::Fatal,
        }
    }

    /// Skips and successes count toward `indexedPhotos`; failures do not.
    pub fn counts_as_processed(&self) -> bool {
        !matches!(
            self,
            PhotoOutcome::Failed(_) | PhotoOutcome::CollectionGone(_)
        )
    }

    fn faces(&self) -> u32 {
        match self {
            PhotoOutcome::Indexed { faces } => *faces,
            _ => 0,
        }
    }
}

/// How a run ended.
#[derive(Clone, Debug, PartialEq)]
pub enum RunOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

/// Summary of a run, for logs and tests.
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub batches_run: usize,
    pub photos_attempted: usize,
    pub indexed_photos: u32,
    pub faces_indexed: u32,
}

/// Sequential batch processor for one gallery.
pub struct Orchestrator {
    store: Arc<dyn GalleryStore>,
    faces: Arc<dyn FaceService>,
    source: Arc<dyn PhotoSource>,
    transformer: ImageTransformer,
    cfg: IndexingCfg,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn GalleryStore>,
        faces: Arc<dyn FaceService>,
        source: Arc<dyn PhotoSource>,
        transformer: ImageTransformer,
        cfg: IndexingCfg,
    ) -> Self {
        Self {
            store,
            faces,
            source,
            transformer,
            cfg,
        }
    }

    /// Process `photos` in list order. Only side effects: face records and status writes.
    pub async fn run(
        &self,
        collection_id: &str,
        album_code: &str,
        photos: &[Photo],
        mut cancel: CancelRx,
    ) -> RunReport {
        let batch_size = self.cfg.batch_size.max(1);
        let total = photos.len() as u32;
        let mut job = IndexingJob::new(album_code);
        let mut tracker = ProgressTracker::new(
            self.store.clone(),
            album_code,
            total,
            self.cfg.eta_minutes_per_photo,
            batch_size as u32,
        );
        let mut report = RunReport {
            outcome: RunOutcome::Completed,
            batches_run: 0,
            photos_attempted: 0,
            indexed_photos: 0,
            faces_indexed: 0,
        };

        let batch_count = photos.len().div_ceil(batch_size);
        tracing::info!(
            job_id = %job.id,
            album_code,
            collection_id,
            photos = photos.len(),
            batches = batch_count,
            "indexing run started"
        );

        for (batch_index, batch) in photos.chunks(batch_size).enumerate() {
            job.batch_index = batch_index;
            report.batches_run += 1;
            tracing::debug!(
                job_id = %job.id,
                album_code = %job.album_code,
                batch = job.batch_index + 1,
                of = batch_count,
                errors = job.consecutive_errors,
                "batch start"
            );

            for (offset, photo) in batch.iter().enumerate() {
                if *cancel.borrow() {
                    return self.cancelled(&tracker, report).await;
                }

                let index = batch_index * batch_size + offset;
                report.photos_attempted += 1;
                // A stop request abandons the photo mid-download or mid-call.
                let outcome = tokio::select! {
                    outcome = self.process_photo(collection_id, index, photo) => Some(outcome),
                    _ = stop_requested(&mut cancel) => None,
                };
                let Some(outcome) = outcome else {
                    return self.cancelled(&tracker, report).await;
                };
                log_outcome(album_code, index, photo, &outcome);

                if outcome.counts_as_processed() {
                    tracker.record_processed(outcome.faces()).await;
                }

                match outcome.error_step() {
                    ErrorStep::Reset => job.consecutive_errors = 0,
                    ErrorStep::Keep => {}
                    ErrorStep::Increment => job.consecutive_errors += 1,
                    ErrorStep::Fatal => {
                        let reason = match &outcome {
                            PhotoOutcome::CollectionGone(c) => format!("collection {c} deleted mid-run"),
                            other => format!("{other:?}"),
                        };
                        return self.failed(&tracker, report, reason).await;
                    }
                }

                if job.consecutive_errors >= self.cfg.max_consecutive_errors {
                    let reason = format!("{} consecutive photo failures", job.consecutive_errors);
                    return self.failed(&tracker, report, reason).await;
                }

                let last_in_batch = offset + 1 == batch.len();
                if !last_in_batch {
                    let delay = match outcome {
                        PhotoOutcome::Indexed { .. } => self.cfg.success_delay(),
                        _ => self.cfg.skip_delay(),
                    };
                    if pause(delay, &mut cancel).await {
                        return self.cancelled(&tracker, report).await;
                    }
                }
            }

            if batch_index + 1 < batch_count {
                tracker.touch().await;
                if pause(self.cfg.batch_delay(), &mut cancel).await {
                    return self.cancelled(&tracker, report).await;
                }
            }
        }

        tracker.complete().await;
        report.indexed_photos = tracker.indexed_photos();
        report.faces_indexed = tracker.faces_indexed();
        tracing::info!(
            job_id = %job.id,
            album_code = %job.album_code,
            elapsed = ?job.started_at.elapsed(),
            "indexing run finished"
        );
        report
    }

    /// Fetch → transform → detect → index for one photo. Never propagates errors.
    async fn process_photo(&self, collection_id: &str, index: usize, photo: &Photo) -> PhotoOutcome {
        if photo.is_malformed() {
            return PhotoOutcome::Malformed;
        }

        let raw = match self.source.fetch(&photo.url).await {
            Ok(b) => b,
            Err(e) => return PhotoOutcome::FetchFailed(e.to_string()),
        };

        let payload = self.transformer.transform(raw).await;
        if !self.transformer.fits(&payload) {
            return PhotoOutcome::Oversized {
                bytes: payload.len(),
            };
        }

        let detected = match self.faces.detect_faces(&payload).await {
            Ok(n) => n,
            Err(e) => return classify_face_error(e),
        };
        if detected == 0 {
            return PhotoOutcome::NoFace;
        }

        let external_id = external_id_for(index);
        match self
            .faces
            .index_faces(
                collection_id,
                &payload,
                &external_id,
                self.cfg.max_faces_per_image,
                QualityFilter::Auto,
            )
            .await
        {
            Ok(records) if records.is_empty() => PhotoOutcome::NoFace,
            Ok(records) => PhotoOutcome::Indexed {
                faces: records.len() as u32,
            },
            Err(e) => classify_face_error(e),
        }
    }

    async fn failed(&self, tracker: &ProgressTracker, mut report: RunReport, reason: String) -> RunReport {
        tracker.fail(&reason).await;
        report.indexed_photos = tracker.indexed_photos();
        report.faces_indexed = tracker.faces_indexed();
        report.outcome = RunOutcome::Failed(reason);
        report
    }

    async fn cancelled(&self, tracker: &ProgressTracker, mut report: RunReport) -> RunReport {
        tracker.fail("cancelled by operator").await;
        report.indexed_photos = tracker.indexed_photos();
        report.faces_indexed = tracker.faces_indexed();
        report.outcome = RunOutcome::Cancelled;
        report
    }
}

fn classify_face_error(e: FaceServiceError) -> PhotoOutcome {
    match e {
        FaceServiceError::CollectionNotFound(c) => PhotoOutcome::CollectionGone(c),
        other => PhotoOutcome::Failed(other.to_string()),
    }
}

fn log_outcome(album_code: &str, index: usize, photo: &Photo, outcome: &PhotoOutcome) {
    let label = photo.label.as_str();
    match outcome {
        PhotoOutcome::Indexed { faces } => {
            tracing::info!(album_code, index, label, faces, "photo indexed")
        }
        PhotoOutcome::NoFace => tracing::info!(album_code, index, label, "no face, skipped"),
        PhotoOutcome::Oversized { bytes } => {
            tracing::warn!(album_code, index, label, bytes, "still oversized, skipped")
        }
        PhotoOutcome::FetchFailed(e) => {
            tracing::warn!(album_code, index, label, "fetch failed, skipped: {e}")
        }
        PhotoOutcome::Malformed => {
            tracing::warn!(album_code, index, label, "photo has no url, skipped")
        }
        PhotoOutcome::Failed(e) => tracing::error!(album_code, index, label, "photo failed: {e}"),
        PhotoOutcome::CollectionGone(c) => {
            tracing::error!(album_code, index, label, collection = %c, "collection missing")
        }
    }
}

/// Sleep unless cancelled first. Returns true when the job should stop.
async fn pause(delay: Duration, cancel: &mut CancelRx) -> bool {
    if *cancel.borrow() {
        return true;
    }
    if delay.is_zero() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = stop_requested(cancel) => true,
    }
}

/// Resolves once a stop is requested. Never resolves if the sender is gone.
async fn stop_requested(cancel: &mut CancelRx) {
    let sender_gone = cancel.wait_for(|stop| *stop).await.is_err();
    if sender_gone {
        std::future::pending::<()>().await;
    }
}
