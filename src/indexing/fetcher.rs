//! Photo download with timeout and retries.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;

use super::retry::{Backoff, RetryPolicy};
use crate::config::FetchCfg;

/// Photo download failures.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("HTTP status {0}")]
    Status(StatusCode),

    #[error("fetch failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl FetchError {
    /// Transport errors, 5xx and 429 may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport(_) => true,
            FetchError::Status(s) => s.is_server_error() || *s == StatusCode::TOO_MANY_REQUESTS,
            FetchError::Exhausted { .. } => false,
        }
    }
}

/// Source of photo bytes.
#[async_trait]
pub trait PhotoSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Plain HTTP GET with a custom user agent.
pub struct HttpPhotoFetcher {
    http: Client,
    policy: RetryPolicy,
}

impl HttpPhotoFetcher {
    pub fn new(cfg: &FetchCfg) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(cfg.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let policy = RetryPolicy::new(
            cfg.max_attempts,
            Backoff::Linear(Duration::from_secs(cfg.backoff_secs)),
        );
        Ok(Self { http, policy })
    }

    async fn get_once(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl PhotoSource for HttpPhotoFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut attempts = 0;
        let result = self
            .policy
            .run(
                |attempt| {
                    attempts = attempt;
                    tracing::debug!(url, attempt, "fetching photo");
                    self.get_once(url)
                },
                FetchError::is_retryable,
            )
            .await;
        result.map_err(|e| FetchError::Exhausted {
            attempts,
            last: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(FetchError::Transport("reset".into()).is_retryable());
        assert!(FetchError::Status(StatusCode::BAD_GATEWAY).is_retryable());
        assert!(FetchError::Status(StatusCode::TOO_MANY_REQUESTS).is_retryable());
        assert!(!FetchError::Status(StatusCode::NOT_FOUND).is_retryable());
        assert!(!FetchError::Status(StatusCode::FORBIDDEN).is_retryable());
    }

    #[tokio::test]
    async fn unreachable_host_exhausts_to_fetch_failed() {
        let fetcher = HttpPhotoFetcher::new(&FetchCfg {
            timeout_secs: 1,
            max_attempts: 2,
            backoff_secs: 0,
            user_agent: "test".into(),
        })
        .unwrap();
        // Port 9 on localhost (discard) is closed on test machines.
        let err = fetcher.fetch("http://127.0.0.1:9/a.jpg").await.unwrap_err();
        assert!(matches!(err, FetchError::Exhausted { attempts: 2, .. }));
    }
}
