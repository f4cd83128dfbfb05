//! Object store client.
//!
//! The upload service stores source files in a MinIO-style object store;
//! the OCR stage only ever fetches them back, so the client is a thin
//! path-style HTTP GET with a bounded timeout.

use reqwest::{Client, StatusCode};
use thiserror::Error;

use crate::config::BlobStoreSettings;

/// Errors from blob store operations.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("object not found: {bucket}/{object_name}")]
    NotFound { bucket: String, object_name: String },

    #[error("blob store returned HTTP {status} for {bucket}/{object_name}")]
    Api {
        status: u16,
        bucket: String,
        object_name: String,
    },
}

/// Read-only object store client.
pub struct BlobStore {
    endpoint: String,
    client: Client,
}

impl BlobStore {
    /// Create a client against the configured endpoint.
    pub fn new(settings: &BlobStoreSettings) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(settings.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Fetch an object's bytes.
    pub async fn fetch(&self, bucket: &str, object_name: &str) -> Result<Vec<u8>, BlobError> {
        let url = format!("{}/{}/{}", self.endpoint, bucket, object_name);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BlobError::Connection(e.to_string()))?;

        match resp.status() {
            status if status.is_success() => resp
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| BlobError::Connection(e.to_string())),
            StatusCode::NOT_FOUND => Err(BlobError::NotFound {
                bucket: bucket.to_string(),
                object_name: object_name.to_string(),
            }),
            status => Err(BlobError::Api {
                status: status.as_u16(),
                bucket: bucket.to_string(),
                object_name: object_name.to_string(),
            }),
        }
    }
}
