//! Typed REST client for the remote video translation service.

use super::{Iteration, Translation, VoiceKind};
use crate::config::SpeechConfig;
use async_trait::async_trait;
use reqwest::{header, StatusCode};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("network request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("service rejected the request: HTTP {status}: {body}")]
    Rejected { status: StatusCode, body: String },
}

/// Payload for creating a translation job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationRequest {
    pub display_name: String,
    pub video_file_url: String,
    pub source_locale: String,
    pub target_locale: String,
}

/// Payload for creating and starting an iteration of a translation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationRequest {
    pub voice_kind: VoiceKind,
    pub speaker_count: u32,
    pub enable_lip_sync: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle_max_char_count_per_segment: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_subtitle_in_video: Option<bool>,
}

/// Remote translation service surface. Polling reads are idempotent.
#[async_trait]
pub trait TranslationService: Send + Sync {
    async fn create_translation(
        &self,
        request: &TranslationRequest,
    ) -> Result<Translation, ServiceError>;

    async fn create_iteration(
        &self,
        translation_id: Uuid,
        request: &IterationRequest,
    ) -> Result<Iteration, ServiceError>;

    async fn get_translation(&self, id: Uuid) -> Result<Translation, ServiceError>;

    async fn get_iteration(
        &self,
        translation_id: Uuid,
        iteration_id: Uuid,
    ) -> Result<Iteration, ServiceError>;
}

/// HTTP client for the translation REST API.
///
/// The subscription key rides on every request as a default header and the
/// caller-supplied api-version is appended to every URL.
pub struct TranslationApiClient {
    client: reqwest::Client,
    base_url: String,
    api_version: String,
}

impl TranslationApiClient {
    pub fn new(config: &SpeechConfig) -> Result<Self, ServiceError> {
        let mut headers = header::HeaderMap::new();
        let mut key = header::HeaderValue::from_str(&config.subscription_key)
            .unwrap_or_else(|_| header::HeaderValue::from_static(""));
        key.set_sensitive(true);
        headers.insert("Ocp-Apim-Subscription-Key", key);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: format!(
                "https://{}.api.cognitive.microsoft.com/videotranslation",
                config.region
            ),
            api_version: config.api_version.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}?api-version={}", self.base_url, path, self.api_version)
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ServiceError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Rejected { status, body });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl TranslationService for TranslationApiClient {
    async fn create_translation(
        &self,
        request: &TranslationRequest,
    ) -> Result<Translation, ServiceError> {
        let url = self.url("/translations");
        debug!("Creating translation ({} -> {})", request.source_locale, request.target_locale);
        let response = self.client.post(&url).json(request).send().await?;
        Self::parse(response).await
    }

    async fn create_iteration(
        &self,
        translation_id: Uuid,
        request: &IterationRequest,
    ) -> Result<Iteration, ServiceError> {
        let url = self.url(&format!("/translations/{}/iterations", translation_id));
        debug!("Creating iteration for translation {}", translation_id);
        let response = self.client.post(&url).json(request).send().await?;
        Self::parse(response).await
    }

    async fn get_translation(&self, id: Uuid) -> Result<Translation, ServiceError> {
        let url = self.url(&format!("/translations/{}", id));
        let response = self.client.get(&url).send().await?;
        Self::parse(response).await
    }

    async fn get_iteration(
        &self,
        translation_id: Uuid,
        iteration_id: Uuid,
    ) -> Result<Iteration, ServiceError> {
        let url = self.url(&format!(
            "/translations/{}/iterations/{}",
            translation_id, iteration_id
        ));
        let response = self.client.get(&url).send().await?;
        Self::parse(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SpeechConfig {
        SpeechConfig {
            region: "eastus".to_string(),
            subscription_key: "key".to_string(),
            api_version: "2024-05-20-preview".to_string(),
        }
    }

    #[test]
    fn test_url_includes_api_version() {
        let client = TranslationApiClient::new(&test_config()).unwrap();
        assert_eq!(
            client.url("/translations"),
            "https://eastus.api.cognitive.microsoft.com/videotranslation/translations?api-version=2024-05-20-preview"
        );
    }

    #[test]
    fn test_iteration_request_omits_absent_subtitle_options() {
        let request = IterationRequest {
            voice_kind: VoiceKind::PersonalVoice,
            speaker_count: 1,
            enable_lip_sync: true,
            subtitle_max_char_count_per_segment: None,
            export_subtitle_in_video: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("subtitleMaxCharCountPerSegment").is_none());
        assert!(json.get("exportSubtitleInVideo").is_none());
        assert_eq!(json["voiceKind"], "PersonalVoice");
        assert_eq!(json["enableLipSync"], true);
    }
}
