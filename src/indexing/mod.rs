//! Background face-indexing pipeline.

/// Start requests and precondition checks.
pub mod controller;
/// Photo downloads.
pub mod fetcher;
/// Batch loop.
pub mod orchestrator;
/// Status and ETA writes.
pub mod progress;
/// Live job bookkeeping and dispatch.
pub mod registry;
/// Shared retry policy.
pub mod retry;
/// Image shrinking.
pub mod transform;

#[cfg(test)]
pub mod testing;

pub use controller::JobController;
pub use fetcher::HttpPhotoFetcher;
pub use orchestrator::Orchestrator;
pub use registry::JobRegistry;
pub use transform::ImageTransformer;
