//! Submit/poll/terminate lifecycle for one translation job and its first
//! iteration.
//!
//! The poll loop is an explicit state machine: `PollLoop::tick` looks at a
//! status snapshot and the current instant and decides what happens next.
//! The orchestrator drives it with an injected [`Clock`], so tests run the
//! whole lifecycle without real waits.

use super::client::{IterationRequest, ServiceError, TranslationRequest, TranslationService};
use super::download::{ArtifactDownloader, DownloadError, DownloadManifest};
use super::{Iteration, JobStatus, Translation, VoiceKind};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum JobError {
    #[error("submission rejected by the translation service: {0}")]
    SubmissionRejected(String),

    #[error("translation job failed: {0}")]
    JobFailed(String),

    /// The remote job is not cancelled on local timeout; it may keep
    /// running after the caller gives up.
    #[error("timed out after {0:?} waiting for the job to reach a terminal state")]
    Timeout(Duration),

    #[error("job succeeded but artifact retrieval did not: {0}")]
    DownloadIncomplete(#[from] DownloadError),

    #[error("service call failed while polling: {0}")]
    Service(#[from] ServiceError),

    #[error("invalid job request: {0}")]
    InvalidRequest(&'static str),
}

/// Everything needed to submit one translation job and wait it out.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub video_file_url: String,
    pub source_locale: String,
    pub target_locale: String,
    pub voice_kind: VoiceKind,
    pub speaker_count: u32,
    pub lip_sync_enabled: bool,
    pub subtitle_max_char_count_per_segment: Option<u32>,
    pub export_subtitle_in_video: Option<bool>,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

/// Result of a successful job: both remote entities in their final state
/// plus the retrieved artifacts.
#[derive(Debug, Clone)]
pub struct CompletedJob {
    pub translation: Translation,
    pub iteration: Iteration,
    pub manifest: DownloadManifest,
}

/// Timer abstraction so the poll loop can be driven deterministically.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation used outside of tests.
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Status snapshot of both remote entities at one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSnapshot {
    pub translation: JobStatus,
    pub iteration: JobStatus,
}

/// What the poll loop decided to do after examining a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollDecision {
    /// Neither entity is terminal yet; wait before the next read.
    Wait(Duration),

    /// Both entities are terminal and the iteration succeeded.
    Succeeded,

    /// One of the entities reached Failed or Cancelled. Polling stops
    /// immediately, no further reads are spent.
    Failed { entity: &'static str, status: JobStatus },

    /// The deadline elapsed before both entities went terminal.
    TimedOut,
}

/// Pure poll-loop state machine. One instance covers one job.
#[derive(Debug, Clone)]
pub struct PollLoop {
    deadline: Instant,
    interval: Duration,
}

impl PollLoop {
    pub fn new(started: Instant, interval: Duration, timeout: Duration) -> Self {
        Self {
            deadline: started + timeout,
            interval,
        }
    }

    pub fn tick(&self, snapshot: JobSnapshot, now: Instant) -> PollDecision {
        // Terminal failure on either entity ends the job before any
        // timeout consideration.
        for (entity, status) in [
            ("iteration", snapshot.iteration),
            ("translation", snapshot.translation),
        ] {
            if matches!(status, JobStatus::Failed | JobStatus::Cancelled) {
                return PollDecision::Failed { entity, status };
            }
        }

        if snapshot.iteration == JobStatus::Succeeded && snapshot.translation.is_terminal() {
            return PollDecision::Succeeded;
        }

        if now >= self.deadline {
            return PollDecision::TimedOut;
        }

        PollDecision::Wait(self.interval)
    }
}

/// Owns the submit -> poll -> terminal -> retrieve sequence for one job.
pub struct JobOrchestrator {
    service: Arc<dyn TranslationService>,
    downloader: Arc<dyn ArtifactStore>,
    clock: Arc<dyn Clock>,
}

/// Artifact retrieval seam; the HTTP downloader implements it, tests stub it.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn download(
        &self,
        iteration: &Iteration,
        dest_dir: &Path,
    ) -> Result<DownloadManifest, DownloadError>;
}

#[async_trait]
impl ArtifactStore for ArtifactDownloader {
    async fn download(
        &self,
        iteration: &Iteration,
        dest_dir: &Path,
    ) -> Result<DownloadManifest, DownloadError> {
        ArtifactDownloader::download(self, iteration, dest_dir).await
    }
}

impl JobOrchestrator {
    pub fn new(service: Arc<dyn TranslationService>, downloader: Arc<dyn ArtifactStore>) -> Self {
        Self {
            service,
            downloader,
            clock: Arc::new(TokioClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Submit a translation and its first iteration, poll both to a
    /// terminal state, and retrieve the artifacts into `download_dir`.
    ///
    /// One remote job is created per call; all polling reads are
    /// idempotent. Download failure after a successful job is reported as
    /// [`JobError::DownloadIncomplete`], distinct from [`JobError::JobFailed`].
    pub async fn submit_and_await(
        &self,
        request: &JobRequest,
        download_dir: &Path,
    ) -> Result<CompletedJob, JobError> {
        if request.poll_interval.is_zero() {
            return Err(JobError::InvalidRequest("poll_interval must be positive"));
        }

        let display_name = blob_display_name(&request.video_file_url);
        let translation = self
            .service
            .create_translation(&TranslationRequest {
                display_name,
                video_file_url: request.video_file_url.clone(),
                source_locale: request.source_locale.clone(),
                target_locale: request.target_locale.clone(),
            })
            .await
            .map_err(reject_on_submit)?;
        info!(
            "🚀 Translation {} accepted ({} -> {})",
            translation.id, request.source_locale, request.target_locale
        );

        let iteration = self
            .service
            .create_iteration(
                translation.id,
                &IterationRequest {
                    voice_kind: request.voice_kind,
                    speaker_count: request.speaker_count,
                    enable_lip_sync: request.lip_sync_enabled,
                    subtitle_max_char_count_per_segment: request
                        .subtitle_max_char_count_per_segment,
                    export_subtitle_in_video: request.export_subtitle_in_video,
                },
            )
            .await
            .map_err(reject_on_submit)?;
        info!("🔁 Iteration {} started", iteration.id);

        let poll = PollLoop::new(self.clock.now(), request.poll_interval, request.timeout);
        loop {
            let translation = self.service.get_translation(translation.id).await?;
            let iteration = self
                .service
                .get_iteration(translation.id, iteration.id)
                .await?;
            let snapshot = JobSnapshot {
                translation: translation.status,
                iteration: iteration.status,
            };
            debug!(
                "Poll: translation={:?} iteration={:?}",
                snapshot.translation, snapshot.iteration
            );

            match poll.tick(snapshot, self.clock.now()) {
                PollDecision::Wait(interval) => self.clock.sleep(interval).await,
                PollDecision::Succeeded => {
                    info!("✅ Translation {} succeeded", translation.id);
                    let manifest = self.downloader.download(&iteration, download_dir).await?;
                    return Ok(CompletedJob {
                        translation,
                        iteration,
                        manifest,
                    });
                }
                PollDecision::Failed { entity, status } => {
                    warn!(
                        "❌ Translation {} ended: {} is {:?}",
                        translation.id, entity, status
                    );
                    return Err(JobError::JobFailed(format!(
                        "{} {} reached {:?} (target {})",
                        entity, translation.id, status, request.target_locale
                    )));
                }
                PollDecision::TimedOut => {
                    warn!(
                        "⏰ Translation {} still not terminal after {:?}",
                        translation.id, request.timeout
                    );
                    return Err(JobError::Timeout(request.timeout));
                }
            }
        }
    }
}

fn reject_on_submit(err: ServiceError) -> JobError {
    match err {
        ServiceError::Rejected { status, body } => {
            JobError::SubmissionRejected(format!("HTTP {}: {}", status, body))
        }
        other => JobError::Service(other),
    }
}

fn blob_display_name(url: &str) -> String {
    url.split('?')
        .next()
        .and_then(|base| base.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .unwrap_or("segment")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::IterationResult;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[test]
    fn test_tick_waits_while_running() {
        let start = Instant::now();
        let poll = PollLoop::new(start, Duration::from_secs(5), Duration::from_secs(60));
        let decision = poll.tick(
            JobSnapshot {
                translation: JobStatus::Running,
                iteration: JobStatus::Running,
            },
            start,
        );
        assert_eq!(decision, PollDecision::Wait(Duration::from_secs(5)));
    }

    #[test]
    fn test_tick_failure_beats_timeout() {
        let start = Instant::now();
        let poll = PollLoop::new(start, Duration::from_secs(5), Duration::from_secs(60));
        // Even past the deadline, a terminal failure is reported as failure.
        let decision = poll.tick(
            JobSnapshot {
                translation: JobStatus::Running,
                iteration: JobStatus::Failed,
            },
            start + Duration::from_secs(120),
        );
        assert_eq!(
            decision,
            PollDecision::Failed {
                entity: "iteration",
                status: JobStatus::Failed
            }
        );
    }

    #[test]
    fn test_tick_requires_both_entities_terminal() {
        let start = Instant::now();
        let poll = PollLoop::new(start, Duration::from_secs(5), Duration::from_secs(60));
        let decision = poll.tick(
            JobSnapshot {
                translation: JobStatus::Running,
                iteration: JobStatus::Succeeded,
            },
            start,
        );
        assert_eq!(decision, PollDecision::Wait(Duration::from_secs(5)));
    }

    #[test]
    fn test_tick_times_out() {
        let start = Instant::now();
        let poll = PollLoop::new(start, Duration::from_secs(5), Duration::from_secs(60));
        let decision = poll.tick(
            JobSnapshot {
                translation: JobStatus::Running,
                iteration: JobStatus::Running,
            },
            start + Duration::from_secs(61),
        );
        assert_eq!(decision, PollDecision::TimedOut);
    }

    /// Clock that jumps forward by the requested amount instead of sleeping.
    struct ManualClock {
        now: Mutex<Instant>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                now: Mutex::new(Instant::now()),
            }
        }
    }

    #[async_trait]
    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }

        async fn sleep(&self, duration: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += duration;
        }
    }

    /// Service returning a scripted sequence of status snapshots.
    struct ScriptedService {
        translation_id: Uuid,
        iteration_id: Uuid,
        script: Mutex<Vec<JobSnapshot>>,
        polls: Mutex<u32>,
    }

    impl ScriptedService {
        fn new(script: Vec<JobSnapshot>) -> Self {
            Self {
                translation_id: Uuid::new_v4(),
                iteration_id: Uuid::new_v4(),
                script: Mutex::new(script),
                polls: Mutex::new(0),
            }
        }

        fn current(&self) -> JobSnapshot {
            let script = self.script.lock().unwrap();
            let index = (*self.polls.lock().unwrap() as usize).min(script.len() - 1);
            script[index]
        }

        fn translation(&self, status: JobStatus) -> Translation {
            Translation {
                id: self.translation_id,
                source_locale: "en-US".to_string(),
                target_locales: vec!["da-DK".to_string()],
                status,
                created_date_time: None,
            }
        }

        fn iteration(&self, status: JobStatus) -> Iteration {
            Iteration {
                id: self.iteration_id,
                translation_id: self.translation_id,
                voice_kind: VoiceKind::PersonalVoice,
                speaker_count: 1,
                lip_sync_enabled: true,
                subtitle_max_char_count_per_segment: None,
                export_subtitle_in_video: None,
                status,
                result: Some(IterationResult::default()),
            }
        }
    }

    #[async_trait]
    impl TranslationService for ScriptedService {
        async fn create_translation(
            &self,
            _request: &TranslationRequest,
        ) -> Result<Translation, ServiceError> {
            Ok(self.translation(JobStatus::Running))
        }

        async fn create_iteration(
            &self,
            _translation_id: Uuid,
            _request: &IterationRequest,
        ) -> Result<Iteration, ServiceError> {
            Ok(self.iteration(JobStatus::Running))
        }

        async fn get_translation(&self, _id: Uuid) -> Result<Translation, ServiceError> {
            Ok(self.translation(self.current().translation))
        }

        async fn get_iteration(
            &self,
            _translation_id: Uuid,
            _iteration_id: Uuid,
        ) -> Result<Iteration, ServiceError> {
            let snapshot = self.current();
            *self.polls.lock().unwrap() += 1;
            Ok(self.iteration(snapshot.iteration))
        }
    }

    /// Artifact store returning a fixed manifest without any network.
    struct StubStore;

    #[async_trait]
    impl ArtifactStore for StubStore {
        async fn download(
            &self,
            _iteration: &Iteration,
            _dest_dir: &Path,
        ) -> Result<DownloadManifest, DownloadError> {
            Ok(DownloadManifest::default())
        }
    }

    fn request() -> JobRequest {
        JobRequest {
            video_file_url: "https://acc.blob.core.windows.net/c/seg.mp4?sv=x".to_string(),
            source_locale: "en-US".to_string(),
            target_locale: "da-DK".to_string(),
            voice_kind: VoiceKind::PersonalVoice,
            speaker_count: 1,
            lip_sync_enabled: true,
            subtitle_max_char_count_per_segment: None,
            export_subtitle_in_video: None,
            poll_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(120),
        }
    }

    fn running() -> JobSnapshot {
        JobSnapshot {
            translation: JobStatus::Running,
            iteration: JobStatus::Running,
        }
    }

    #[tokio::test]
    async fn test_succeeds_once_both_terminal() {
        let service = Arc::new(ScriptedService::new(vec![
            running(),
            running(),
            JobSnapshot {
                translation: JobStatus::Succeeded,
                iteration: JobStatus::Succeeded,
            },
        ]));
        let orchestrator = JobOrchestrator::new(service.clone(), Arc::new(StubStore))
            .with_clock(Arc::new(ManualClock::new()));

        let dir = tempfile::tempdir().unwrap();
        let completed = orchestrator
            .submit_and_await(&request(), dir.path())
            .await
            .unwrap();
        assert_eq!(completed.iteration.status, JobStatus::Succeeded);
        assert_eq!(*service.polls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_failed_iteration_stops_polling_immediately() {
        // Iteration fails on the third poll; nothing is read after that.
        let service = Arc::new(ScriptedService::new(vec![
            running(),
            running(),
            JobSnapshot {
                translation: JobStatus::Running,
                iteration: JobStatus::Failed,
            },
            running(),
        ]));
        let orchestrator = JobOrchestrator::new(service.clone(), Arc::new(StubStore))
            .with_clock(Arc::new(ManualClock::new()));

        let dir = tempfile::tempdir().unwrap();
        let err = orchestrator
            .submit_and_await(&request(), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::JobFailed(_)));
        assert_eq!(*service.polls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_timeout_while_running() {
        let service = Arc::new(ScriptedService::new(vec![running()]));
        let orchestrator = JobOrchestrator::new(service, Arc::new(StubStore))
            .with_clock(Arc::new(ManualClock::new()));

        let mut req = request();
        req.timeout = Duration::from_secs(25);
        let dir = tempfile::tempdir().unwrap();
        let err = orchestrator
            .submit_and_await(&req, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_zero_poll_interval_is_rejected() {
        let service = Arc::new(ScriptedService::new(vec![running()]));
        let orchestrator = JobOrchestrator::new(service, Arc::new(StubStore));
        let mut req = request();
        req.poll_interval = Duration::ZERO;
        let dir = tempfile::tempdir().unwrap();
        let err = orchestrator
            .submit_and_await(&req, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::InvalidRequest(_)));
    }

    #[test]
    fn test_blob_display_name_strips_sas_query() {
        assert_eq!(
            blob_display_name("https://acc.blob.core.windows.net/c/seg_01.mp4?sv=x&sig=y"),
            "seg_01.mp4"
        );
    }
}
