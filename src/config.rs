use crate::media::OverlayStyle;
use crate::translation::VoiceKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing configuration: {0}")]
    Missing(&'static str),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Configuration for one montage run.
///
/// Constructed once at process start and passed by reference into the
/// service client, uploader and pipeline constructors; core logic never
/// reads the process environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MontageConfig {
    /// Translation service endpoint settings
    pub speech: SpeechConfig,

    /// Blob storage upload settings
    pub storage: StorageConfig,

    /// Per-job translation defaults
    pub jobs: JobConfig,

    /// Label overlay styling for translated segments
    #[serde(default)]
    pub overlay: OverlayStyle,

    /// Allowed drift between source and output duration in seconds
    #[serde(default = "default_tolerance")]
    pub tolerance_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Service region, e.g. "eastus"
    pub region: String,

    /// Subscription key for the translation service
    pub subscription_key: String,

    /// API version string passed through on every call
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Container SAS URL granting write access for segment uploads:
    /// https://<account>.blob.core.windows.net/<container>?<sas>
    pub container_sas_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Source locale of the input video
    pub source_locale: String,

    /// Voice selection for synthesized speech
    pub voice_kind: VoiceKind,

    /// Number of speakers in the source audio
    pub speaker_count: u32,

    /// Enable lip sync on translated video
    pub lip_sync_enabled: bool,

    /// Maximum characters per subtitle segment, if subtitles are requested
    #[serde(default)]
    pub subtitle_max_char_count_per_segment: Option<u32>,

    /// Burn subtitles into the translated video
    #[serde(default)]
    pub export_subtitle_in_video: Option<bool>,

    /// Seconds between job status polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Wall-clock bound on waiting for one job, in seconds
    #[serde(default = "default_job_timeout")]
    pub timeout_secs: u64,
}

fn default_api_version() -> String {
    "2024-05-20-preview".to_string()
}

fn default_tolerance() -> f64 {
    0.5
}

fn default_poll_interval() -> u64 {
    10
}

fn default_job_timeout() -> u64 {
    3600
}

impl MontageConfig {
    /// Load configuration from a TOML file, then apply environment overrides
    /// for the credential fields.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&config_str)?;
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        config.apply_env_overrides();
        Ok(config)
    }

    /// Build a configuration entirely from environment variables. Intended
    /// for running without a config file; secrets stay out of it either way.
    pub fn from_env(source_locale: &str) -> Result<Self, ConfigError> {
        let mut config = Self {
            speech: SpeechConfig {
                region: String::new(),
                subscription_key: String::new(),
                api_version: default_api_version(),
            },
            storage: StorageConfig {
                container_sas_url: String::new(),
            },
            jobs: JobConfig {
                source_locale: source_locale.to_string(),
                voice_kind: VoiceKind::PersonalVoice,
                speaker_count: 1,
                lip_sync_enabled: true,
                subtitle_max_char_count_per_segment: None,
                export_subtitle_in_video: None,
                poll_interval_secs: default_poll_interval(),
                timeout_secs: default_job_timeout(),
            },
            overlay: OverlayStyle::default(),
            tolerance_secs: default_tolerance(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("AZURE_SPEECH_KEY") {
            self.speech.subscription_key = key;
        }
        if let Ok(region) = std::env::var("AZURE_SPEECH_REGION") {
            self.speech.region = region;
        }
        if let Ok(version) = std::env::var("AZURE_SPEECH_VIDEO_API_VERSION") {
            self.speech.api_version = version;
        }
        if let Ok(sas) = std::env::var("AZURE_STORAGE_CONTAINER_SAS_URL") {
            self.storage.container_sas_url = sas;
        }
    }

    /// Validate the configuration before any remote call is made.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.speech.region.is_empty() {
            return Err(ConfigError::Missing("speech.region"));
        }
        if self.speech.subscription_key.is_empty() {
            return Err(ConfigError::Missing("speech.subscription_key"));
        }
        if self.speech.api_version.is_empty() {
            return Err(ConfigError::Missing("speech.api_version"));
        }
        if self.storage.container_sas_url.is_empty() {
            return Err(ConfigError::Missing("storage.container_sas_url"));
        }
        if self.jobs.source_locale.is_empty() {
            return Err(ConfigError::Missing("jobs.source_locale"));
        }
        if self.jobs.poll_interval_secs == 0 {
            return Err(ConfigError::Missing("jobs.poll_interval_secs"));
        }
        Ok(())
    }
}
