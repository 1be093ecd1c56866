//! Data model for the remote video translation service.
//!
//! Responses are deserialized into these fixed shapes: unknown fields are
//! ignored, missing required fields are a hard parse error.

pub mod client;
pub mod download;
pub mod orchestrator;

pub use client::{ServiceError, TranslationApiClient, TranslationService};
pub use download::{ArtifactDownloader, ArtifactKind, DownloadError, DownloadManifest};
pub use orchestrator::{CompletedJob, JobError, JobOrchestrator, JobRequest};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state shared by translations and iterations.
///
/// Legal transitions are `NotStarted -> Running -> {Succeeded, Failed,
/// Cancelled}`; there is no way out of a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition(&self, next: JobStatus) -> bool {
        match self {
            JobStatus::NotStarted => matches!(next, JobStatus::Running),
            JobStatus::Running => next.is_terminal(),
            _ => false,
        }
    }
}

/// Voice selection for synthesized speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoiceKind {
    PlatformVoice,
    PersonalVoice,
}

/// The top-level remote job for one source-to-target-locale translation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Translation {
    pub id: Uuid,
    pub source_locale: String,
    pub target_locales: Vec<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub created_date_time: Option<DateTime<Utc>>,
}

/// One execution attempt of a translation with a specific voice/subtitle
/// configuration. This crate drives only the first iteration of each
/// translation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Iteration {
    pub id: Uuid,
    pub translation_id: Uuid,
    pub voice_kind: VoiceKind,
    pub speaker_count: u32,
    pub lip_sync_enabled: bool,
    #[serde(default)]
    pub subtitle_max_char_count_per_segment: Option<u32>,
    #[serde(default)]
    pub export_subtitle_in_video: Option<bool>,
    pub status: JobStatus,
    #[serde(default)]
    pub result: Option<IterationResult>,
}

/// Artifact URLs reported by the service once an iteration succeeds.
/// Subtitle tracks are only present when subtitles were requested.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationResult {
    #[serde(default)]
    pub translated_video_file_url: Option<String>,
    #[serde(default)]
    pub source_locale_subtitle_webvtt_file_url: Option<String>,
    #[serde(default)]
    pub target_locale_subtitle_webvtt_file_url: Option<String>,
    #[serde(default)]
    pub metadata_json_webvtt_file_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::NotStarted.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_legal_transitions() {
        assert!(JobStatus::NotStarted.can_transition(JobStatus::Running));
        assert!(JobStatus::Running.can_transition(JobStatus::Succeeded));
        assert!(JobStatus::Running.can_transition(JobStatus::Failed));
        assert!(JobStatus::Running.can_transition(JobStatus::Cancelled));
        assert!(!JobStatus::NotStarted.can_transition(JobStatus::Succeeded));
    }

    #[test]
    fn test_no_exit_from_terminal_state() {
        for terminal in [JobStatus::Succeeded, JobStatus::Failed, JobStatus::Cancelled] {
            for next in [
                JobStatus::NotStarted,
                JobStatus::Running,
                JobStatus::Succeeded,
                JobStatus::Failed,
                JobStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition(next));
            }
        }
    }

    #[test]
    fn test_translation_parse_ignores_unknown_fields() {
        let json = r#"{
            "id": "c8a3e4f0-9c5d-4f7e-9a1b-2d3c4e5f6a7b",
            "sourceLocale": "en-US",
            "targetLocales": ["da-DK"],
            "status": "Running",
            "someNewField": 42
        }"#;
        let translation: Translation = serde_json::from_str(json).unwrap();
        assert_eq!(translation.source_locale, "en-US");
        assert_eq!(translation.status, JobStatus::Running);
    }

    #[test]
    fn test_translation_parse_rejects_missing_required_field() {
        let json = r#"{"id": "c8a3e4f0-9c5d-4f7e-9a1b-2d3c4e5f6a7b", "status": "Running"}"#;
        assert!(serde_json::from_str::<Translation>(json).is_err());
    }

    #[test]
    fn test_iteration_result_is_optional() {
        let json = r#"{
            "id": "11111111-2222-3333-4444-555555555555",
            "translationId": "c8a3e4f0-9c5d-4f7e-9a1b-2d3c4e5f6a7b",
            "voiceKind": "PersonalVoice",
            "speakerCount": 1,
            "lipSyncEnabled": true,
            "status": "Running"
        }"#;
        let iteration: Iteration = serde_json::from_str(json).unwrap();
        assert!(iteration.result.is_none());
        assert_eq!(iteration.voice_kind, VoiceKind::PersonalVoice);
    }
}
