//! Segment pipeline: cut, translate, overlay, reassemble.
//!
//! Drives one montage run end to end. Segments are processed strictly
//! sequentially; output ordering and working-directory naming depend on the
//! plan index, and one failing segment invalidates the whole montage.

use crate::config::JobConfig;
use crate::media::{MediaEngine, MediaError, OverlayStyle};
use crate::plan::{PlanError, ResolvedSegment, SegmentPlan};
use crate::reconcile::{self, DurationReport};
use crate::storage::{BlobUploader, UploadError};
use crate::translation::download::ArtifactKind;
use crate::translation::orchestrator::{JobError, JobOrchestrator, JobRequest};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("media {stage} failed: {source}")]
    Media {
        stage: &'static str,
        #[source]
        source: MediaError,
    },

    #[error("segment {index} ({locale}): upload failed: {source}")]
    Upload {
        index: usize,
        locale: String,
        #[source]
        source: UploadError,
    },

    #[error("segment {index} ({locale}): translation failed: {source}")]
    Job {
        index: usize,
        locale: String,
        #[source]
        source: JobError,
    },

    #[error("segment {index} ({locale}): no translated artifact found")]
    ArtifactMissing { index: usize, locale: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why one segment's translation step failed; the pipeline attaches the
/// segment index and locale before surfacing it.
#[derive(Error, Debug)]
pub enum SegmentFailure {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error("translated artifact missing from download manifest")]
    ArtifactMissing,
}

/// Turns one cut segment file into a translated segment file. Seam between
/// the pipeline and the upload/orchestration machinery.
#[async_trait]
pub trait SegmentTranslator: Send + Sync {
    async fn translate(
        &self,
        cut_path: &Path,
        blob_name: &str,
        target_locale: &str,
        work_dir: &Path,
    ) -> Result<PathBuf, SegmentFailure>;
}

/// Production translator: upload the slice to blob storage, run one
/// translation job against the resulting URL, hand back the downloaded
/// translated video.
pub struct RemoteSegmentTranslator {
    uploader: BlobUploader,
    orchestrator: JobOrchestrator,
    jobs: JobConfig,
}

impl RemoteSegmentTranslator {
    pub fn new(uploader: BlobUploader, orchestrator: JobOrchestrator, jobs: JobConfig) -> Self {
        Self {
            uploader,
            orchestrator,
            jobs,
        }
    }
}

#[async_trait]
impl SegmentTranslator for RemoteSegmentTranslator {
    async fn translate(
        &self,
        cut_path: &Path,
        blob_name: &str,
        target_locale: &str,
        work_dir: &Path,
    ) -> Result<PathBuf, SegmentFailure> {
        let blob_url = self.uploader.upload(cut_path, blob_name).await?;

        let request = JobRequest {
            video_file_url: blob_url.to_string(),
            source_locale: self.jobs.source_locale.clone(),
            target_locale: target_locale.to_string(),
            voice_kind: self.jobs.voice_kind,
            speaker_count: self.jobs.speaker_count,
            lip_sync_enabled: self.jobs.lip_sync_enabled,
            subtitle_max_char_count_per_segment: self.jobs.subtitle_max_char_count_per_segment,
            export_subtitle_in_video: self.jobs.export_subtitle_in_video,
            poll_interval: Duration::from_secs(self.jobs.poll_interval_secs),
            timeout: Duration::from_secs(self.jobs.timeout_secs),
        };
        let completed = self.orchestrator.submit_and_await(&request, work_dir).await?;

        completed
            .manifest
            .get(ArtifactKind::TranslatedVideo)
            .map(Path::to_path_buf)
            .ok_or(SegmentFailure::ArtifactMissing)
    }
}

/// The resolved, ordered output of one segment; consumed by reassembly.
#[derive(Debug, Clone)]
pub struct RenderedSegment {
    pub plan_index: usize,
    pub path: PathBuf,
}

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct MontageOutcome {
    pub output_path: PathBuf,
    pub rendered_segments: usize,
    pub source_duration: f64,
    pub output_duration: f64,
    /// Drift report; out-of-tolerance drift is a warning, the montage is
    /// still delivered.
    pub drift: DurationReport,
}

/// One pipeline run owns its working directory exclusively; nothing is
/// shared across concurrent runs.
pub struct MontagePipeline {
    media: Arc<dyn MediaEngine>,
    translator: Arc<dyn SegmentTranslator>,
    overlay: OverlayStyle,
    tolerance_secs: f64,
    work_root: PathBuf,
}

impl MontagePipeline {
    pub fn new(
        media: Arc<dyn MediaEngine>,
        translator: Arc<dyn SegmentTranslator>,
        overlay: OverlayStyle,
        tolerance_secs: f64,
        work_root: PathBuf,
    ) -> Self {
        Self {
            media,
            translator,
            overlay,
            tolerance_secs,
            work_root,
        }
    }

    /// Run the full montage: probe once, process segments in plan order,
    /// concatenate, reconcile durations. On any failure no partial file is
    /// left at the final output path.
    pub async fn run(
        &self,
        source: &Path,
        plan: &SegmentPlan,
        output: Option<PathBuf>,
    ) -> Result<MontageOutcome, PipelineError> {
        // Work dirs are scoped per run so leftover artifacts from earlier
        // runs can never satisfy the locate fallback.
        let work_dir = self.work_root.join(format!("montage_{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&work_dir).await?;

        let result = self.run_in(source, plan, output, &work_dir).await;

        // Intermediate files are released after successful or aborted
        // reassembly; cleanup problems are logged, never escalated.
        if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
            warn!("Could not clean work dir {}: {}", work_dir.display(), e);
        }

        result
    }

    async fn run_in(
        &self,
        source: &Path,
        plan: &SegmentPlan,
        output: Option<PathBuf>,
        work_dir: &Path,
    ) -> Result<MontageOutcome, PipelineError> {
        // Probed exactly once per run; every unbounded end resolves against
        // this value, never a re-probe.
        let source_duration = self
            .media
            .probe_duration(source)
            .await
            .map_err(|source| PipelineError::Media { stage: "probe", source })?;
        let segments = plan.resolve(source_duration)?;

        let source_stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "source".to_string());
        let extension = source
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mp4".to_string());
        let output_path = output.unwrap_or_else(|| {
            let name = format!("TRANSLATED {}.{}", source_stem, extension);
            source.parent().unwrap_or_else(|| Path::new(".")).join(name)
        });

        info!(
            "🎬 Montage run: {} ({:.2}s, {} segments) -> {}",
            source.display(),
            source_duration,
            segments.len(),
            output_path.display()
        );

        let mut rendered: Vec<RenderedSegment> = Vec::with_capacity(segments.len());
        for segment in &segments {
            let cut_path = work_dir.join(format!("segment_{:02}_cut.{}", segment.index, extension));
            self.media
                .cut(source, segment.start_secs, segment.end_secs, &cut_path)
                .await
                .map_err(|source| PipelineError::Media { stage: "cut", source })?;

            let path = match &segment.target_locale {
                // Pass-through: the cut slice is the rendered segment.
                None => {
                    info!("✂️ Segment {:02}: original", segment.index);
                    cut_path
                }
                Some(locale) => {
                    self.render_translated(segment, locale, &cut_path, &source_stem, &extension, work_dir)
                        .await?
                }
            };
            rendered.push(RenderedSegment {
                plan_index: segment.index,
                path,
            });
        }

        let staged_output = work_dir.join(format!("montage_output.{}", extension));
        let ordered: Vec<PathBuf> = rendered.iter().map(|s| s.path.clone()).collect();
        self.media
            .concat(&ordered, &staged_output)
            .await
            .map_err(|source| PipelineError::Media { stage: "concat", source })?;
        persist(&staged_output, &output_path).await?;

        let output_duration = self
            .media
            .probe_duration(&output_path)
            .await
            .map_err(|source| PipelineError::Media { stage: "probe", source })?;
        let drift = reconcile::check(source_duration, output_duration, self.tolerance_secs);
        if drift.within_tolerance {
            info!(
                "📊 Duration {:.2}s vs {:.2}s (delta {:.2}s, within tolerance)",
                source_duration, output_duration, drift.delta
            );
        } else {
            warn!(
                "⚠️ Duration drift {:.2}s exceeds tolerance of {:.2}s",
                drift.delta, self.tolerance_secs
            );
        }

        Ok(MontageOutcome {
            output_path,
            rendered_segments: rendered.len(),
            source_duration,
            output_duration,
            drift,
        })
    }

    async fn render_translated(
        &self,
        segment: &ResolvedSegment,
        locale: &str,
        cut_path: &Path,
        source_stem: &str,
        extension: &str,
        work_dir: &Path,
    ) -> Result<PathBuf, PipelineError> {
        info!("🔄 Segment {:02}: translating to {}", segment.index, locale);
        let blob_name = format!("segment_{:02}_for_translation.{}", segment.index, extension);

        let reported = self
            .translator
            .translate(cut_path, &blob_name, locale, work_dir)
            .await
            .map_err(|failure| match failure {
                SegmentFailure::Upload(source) => PipelineError::Upload {
                    index: segment.index,
                    locale: locale.to_string(),
                    source,
                },
                SegmentFailure::Job(source) => PipelineError::Job {
                    index: segment.index,
                    locale: locale.to_string(),
                    source,
                },
                SegmentFailure::ArtifactMissing => PipelineError::ArtifactMissing {
                    index: segment.index,
                    locale: locale.to_string(),
                },
            })?;

        let translated = locate_artifact(&reported, locale, work_dir).await.ok_or(
            PipelineError::ArtifactMissing {
                index: segment.index,
                locale: locale.to_string(),
            },
        )?;

        let renamed = work_dir.join(format!(
            "{}_segment_{:02}_{}.{}",
            source_stem, segment.index, locale, extension
        ));
        tokio::fs::rename(&translated, &renamed).await?;

        let labeled = work_dir.join(format!(
            "{}_segment_{:02}_{}_labeled.{}",
            source_stem, segment.index, locale, extension
        ));
        let label = segment.label.as_deref().unwrap_or(locale);
        self.media
            .overlay(&renamed, label, &self.overlay, &labeled)
            .await
            .map_err(|source| PipelineError::Media { stage: "overlay", source })?;

        Ok(labeled)
    }
}

/// Find the downloaded translated video. The manifest path is
/// authoritative; if it is gone, fall back to the most recent file in the
/// work dir whose name carries the locale suffix. The fallback is a logged
/// heuristic, not a hard failure.
async fn locate_artifact(reported: &Path, locale: &str, work_dir: &Path) -> Option<PathBuf> {
    if tokio::fs::try_exists(reported).await.unwrap_or(false) {
        return Some(reported.to_path_buf());
    }

    let suffix = format!("- {}.mp4", locale);
    let mut candidates: Vec<(std::time::SystemTime, PathBuf)> = Vec::new();
    let mut entries = tokio::fs::read_dir(work_dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(&suffix) {
            if let Ok(meta) = entry.metadata().await {
                if let Ok(modified) = meta.modified() {
                    candidates.push((modified, entry.path()));
                }
            }
        }
    }

    if candidates.is_empty() {
        return None;
    }
    candidates.sort_by(|a, b| b.0.cmp(&a.0));
    if candidates.len() > 1 {
        warn!(
            "Ambiguous translated artifacts for {}: picking most recent of {}",
            locale,
            candidates.len()
        );
    } else {
        warn!(
            "Reported artifact {} missing, using {}",
            reported.display(),
            candidates[0].1.display()
        );
    }
    Some(candidates[0].1.clone())
}

/// Move the staged output into its final location. A rename keeps the
/// "no partial file at the final path" guarantee; when the work dir sits on
/// a different filesystem, stage the copy next to the destination first.
async fn persist(staged: &Path, destination: &Path) -> Result<(), PipelineError> {
    if tokio::fs::rename(staged, destination).await.is_ok() {
        return Ok(());
    }

    let sibling = destination.with_extension("tmp");
    tokio::fs::copy(staged, &sibling).await?;
    tokio::fs::rename(&sibling, destination).await?;
    Ok(())
}
