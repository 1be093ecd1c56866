//! Upload gateway: pushes local segment files to blob storage through a
//! pre-authorized container SAS URL.

use crate::config::StorageConfig;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::StatusCode;
use std::path::Path;
use thiserror::Error;
use tokio_util::codec::{BytesCodec, FramedRead};
use tracing::info;
use url::Url;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("storage credential not configured: {0}")]
    AuthorizationMissing(String),

    #[error("blob upload rejected: HTTP {status}: {body}")]
    RemoteRejected { status: StatusCode, body: String },

    #[error("network request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid blob URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Uploads segment files as block blobs addressed under a container SAS URL.
#[derive(Debug)]
pub struct BlobUploader {
    container_base: String,
    sas_query: String,
    client: reqwest::Client,
}

impl BlobUploader {
    pub fn new(config: &StorageConfig) -> Result<Self, UploadError> {
        let sas_url = config.container_sas_url.trim();
        if sas_url.is_empty() {
            return Err(UploadError::AuthorizationMissing(
                "container SAS URL is not set".to_string(),
            ));
        }
        let (base, query) = sas_url.split_once('?').ok_or_else(|| {
            UploadError::AuthorizationMissing(
                "container SAS URL must include a SAS query string".to_string(),
            )
        })?;

        Ok(Self {
            container_base: base.trim_end_matches('/').to_string(),
            sas_query: query.to_string(),
            client: reqwest::Client::new(),
        })
    }

    /// Addressable URL for a named blob inside the container, carrying the
    /// container's SAS token.
    pub fn blob_url(&self, blob_name: &str) -> String {
        format!("{}/{}?{}", self.container_base, blob_name, self.sas_query)
    }

    /// PUT a local file as a block blob. The body is streamed from disk;
    /// the file is never buffered in memory as a whole.
    pub async fn upload(&self, local_path: &Path, blob_name: &str) -> Result<Url, UploadError> {
        let url = self.blob_url(blob_name);
        let file = tokio::fs::File::open(local_path).await?;
        let len = file.metadata().await?.len();
        let body = reqwest::Body::wrap_stream(FramedRead::new(file, BytesCodec::new()));

        let response = self
            .client
            .put(&url)
            .header("x-ms-blob-type", "BlockBlob")
            .header(CONTENT_TYPE, "video/mp4")
            .header(CONTENT_LENGTH, len)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !matches!(status, StatusCode::CREATED | StatusCode::ACCEPTED) {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::RemoteRejected { status, body });
        }

        info!("☁️ Uploaded {} ({} bytes) as {}", local_path.display(), len, blob_name);
        Ok(Url::parse(&url)?)
    }
}
