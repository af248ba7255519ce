//! JSON-over-HTTP client for the face-recognition gateway.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{FaceRecord, FaceResult, FaceService, FaceServiceError, QualityFilter};
use crate::config::FaceServiceCfg;

/// Collection list response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectionListResp {
    #[serde(default)]
    collection_ids: Vec<String>,
}

/// Create collection request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCollectionReq<'a> {
    collection_id: &'a str,
}

/// Detect request body.
#[derive(Debug, Serialize)]
struct DetectReq {
    image: String,
}

/// Detect response; only the number of faces matters here.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectResp {
    #[serde(default)]
    face_details: Vec<serde_json::Value>,
}

/// Index request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexReq<'a> {
    image: String,
    external_image_id: &'a str,
    max_faces: u32,
    quality_filter: QualityFilter,
}

/// Index response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexResp {
    #[serde(default)]
    face_records: Vec<FaceRecord>,
}

/// Face service backed by an HTTP gateway.
pub struct HttpFaceService {
    http: Client,
    endpoint: String,
    api_token: String,
}

impl HttpFaceService {
    /// Build a client from config. Fails only if the TLS backend can't start.
    pub fn new(cfg: &FaceServiceCfg) -> FaceResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| FaceServiceError::Unavailable(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            api_token: cfg.api_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    fn collection_url(&self, collection_id: &str) -> String {
        self.url(&format!(
            "/collections/{}",
            urlencoding::encode(collection_id)
        ))
    }
}

#[async_trait]
impl FaceService for HttpFaceService {
    async fn create_collection(&self, collection_id: &str) -> FaceResult<()> {
        let resp = self
            .http
            .post(self.url("/collections"))
            .bearer_auth(&self.api_token)
            .json(&CreateCollectionReq { collection_id })
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(resp, Some(collection_id)).await?;
        Ok(())
    }

    async fn delete_collection(&self, collection_id: &str) -> FaceResult<()> {
        let resp = self
            .http
            .delete(self.collection_url(collection_id))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(resp, Some(collection_id)).await?;
        Ok(())
    }

    async fn list_collections(&self) -> FaceResult<Vec<String>> {
        let resp = self
            .http
            .get(self.url("/collections"))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(transport_error)?;
        let resp = ensure_success(resp, None).await?;
        let list = resp
            .json::<CollectionListResp>()
            .await
            .map_err(decode_error)?;
        Ok(list.collection_ids)
    }

    async fn detect_faces(&self, image: &[u8]) -> FaceResult<usize> {
        let body = DetectReq {
            image: STANDARD.encode(image),
        };
        let resp = self
            .http
            .post(self.url("/detect"))
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let resp = ensure_success(resp, None).await?;
        let detected = resp.json::<DetectResp>().await.map_err(decode_error)?;
        Ok(detected.face_details.len())
    }

    async fn index_faces(
        &self,
        collection_id: &str,
        image: &[u8],
        external_id: &str,
        max_faces: u32,
        quality_filter: QualityFilter,
    ) -> FaceResult<Vec<FaceRecord>> {
        let body = IndexReq {
            image: STANDARD.encode(image),
            external_image_id: external_id,
            max_faces,
            quality_filter,
        };
        let resp = self
            .http
            .post(format!("{}/faces", self.collection_url(collection_id)))
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let resp = ensure_success(resp, Some(collection_id)).await?;
        let indexed = resp.json::<IndexResp>().await.map_err(decode_error)?;
        Ok(indexed.face_records)
    }
}

fn transport_error(e: reqwest::Error) -> FaceServiceError {
    FaceServiceError::Unavailable(e.to_string())
}

fn decode_error(e: reqwest::Error) -> FaceServiceError {
    FaceServiceError::Other(format!("invalid response: {e}"))
}

/// Convert non-2xx responses into a classified error.
async fn ensure_success(
    resp: reqwest::Response,
    collection_id: Option<&str>,
) -> FaceResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_else(|_| "".into());
    Err(classify_status(status, &body, collection_id))
}

/// Map a gateway status code onto the error taxonomy.
fn classify_status(status: StatusCode, body: &str, collection_id: Option<&str>) -> FaceServiceError {
    match (status, collection_id) {
        // Only collection-scoped calls can report a missing or duplicate collection.
        (StatusCode::NOT_FOUND, Some(c)) => FaceServiceError::CollectionNotFound(c.to_string()),
        (StatusCode::CONFLICT, Some(c)) => FaceServiceError::AlreadyExists(c.to_string()),
        _ => classify_other(status, body),
    }
}

fn classify_other(status: StatusCode, body: &str) -> FaceServiceError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => FaceServiceError::Throttled,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY | StatusCode::PAYLOAD_TOO_LARGE => {
            FaceServiceError::InvalidImage(format!("HTTP status {status}: {body}"))
        }
        s if s.is_server_error() => {
            FaceServiceError::Unavailable(format!("HTTP status {status}: {body}"))
        }
        _ => FaceServiceError::Other(format!("HTTP status {status} error: {body}")),
    }
}
