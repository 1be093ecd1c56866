/// Video Translation Montage
///
/// Cuts a source video into time-bounded segments, submits selected segments
/// for remote translation/dubbing, polls the long-running jobs to completion,
/// retrieves their output artifacts, and reassembles everything into one
/// continuous montage with verified timing.

pub mod config;
pub mod media;
pub mod pipeline;
pub mod plan;
pub mod reconcile;
pub mod storage;
pub mod timecode;
pub mod translation;

// Re-export main types for easy access
pub use crate::config::MontageConfig;
pub use crate::media::{FfmpegEngine, MediaEngine, OverlayStyle};
pub use crate::pipeline::{MontageOutcome, MontagePipeline, RemoteSegmentTranslator};
pub use crate::plan::{SegmentPlan, SegmentSpec};
pub use crate::reconcile::DurationReport;
pub use crate::storage::BlobUploader;
pub use crate::translation::client::TranslationApiClient;
pub use crate::translation::download::{ArtifactDownloader, ArtifactKind, DownloadManifest};
pub use crate::translation::orchestrator::{CompletedJob, JobError, JobOrchestrator, JobRequest};
pub use crate::translation::{Iteration, JobStatus, Translation, VoiceKind};
