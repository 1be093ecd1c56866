//! Retrieval of output artifacts from a succeeded iteration.

use super::Iteration;
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("network request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("server returned an unsuccessful status code: {0}")]
    Unsuccessful(reqwest::StatusCode),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("iteration {0} has no download result")]
    NoResult(Uuid),

    #[error("required artifacts missing: {0:?}")]
    Incomplete(Vec<ArtifactKind>),
}

/// Output artifact kinds produced by a succeeded iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    TranslatedVideo,
    SourceSubtitles,
    TargetSubtitles,
    Metadata,
}

impl ArtifactKind {
    /// The translated video must always be retrievable; subtitle tracks and
    /// metadata are only present when the iteration requested them.
    pub fn is_required(&self) -> bool {
        matches!(self, ArtifactKind::TranslatedVideo)
    }

    fn stem(&self) -> &'static str {
        match self {
            ArtifactKind::TranslatedVideo => "translated_video",
            ArtifactKind::SourceSubtitles => "source_subtitles",
            ArtifactKind::TargetSubtitles => "target_subtitles",
            ArtifactKind::Metadata => "metadata",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::TranslatedVideo => "mp4",
            ArtifactKind::SourceSubtitles | ArtifactKind::TargetSubtitles => "vtt",
            ArtifactKind::Metadata => "json",
        }
    }

    /// Destination file name for this artifact, e.g.
    /// `translated_video_<iterationId>.mp4`.
    pub fn file_name(&self, iteration_id: Uuid) -> String {
        format!("{}_{}.{}", self.stem(), iteration_id, self.extension())
    }
}

/// Mapping from artifact kind to the local path it was downloaded to.
/// Built once per succeeded iteration and never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct DownloadManifest {
    files: HashMap<ArtifactKind, PathBuf>,
}

impl DownloadManifest {
    pub fn get(&self, kind: ArtifactKind) -> Option<&Path> {
        self.files.get(&kind).map(PathBuf::as_path)
    }

    pub fn kinds(&self) -> impl Iterator<Item = ArtifactKind> + '_ {
        self.files.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Downloads the typed output files of a completed iteration.
pub struct ArtifactDownloader {
    client: reqwest::Client,
}

impl ArtifactDownloader {
    pub fn new() -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;
        Ok(Self { client })
    }

    /// Retrieve every artifact the iteration reports, writing each under
    /// `dest_dir`. A kind whose URL is absent is skipped unless it is
    /// required, in which case the whole download is `Incomplete`.
    pub async fn download(
        &self,
        iteration: &Iteration,
        dest_dir: &Path,
    ) -> Result<DownloadManifest, DownloadError> {
        let result = iteration
            .result
            .as_ref()
            .ok_or(DownloadError::NoResult(iteration.id))?;

        tokio::fs::create_dir_all(dest_dir).await?;

        let sources = [
            (ArtifactKind::TranslatedVideo, &result.translated_video_file_url),
            (ArtifactKind::SourceSubtitles, &result.source_locale_subtitle_webvtt_file_url),
            (ArtifactKind::TargetSubtitles, &result.target_locale_subtitle_webvtt_file_url),
            (ArtifactKind::Metadata, &result.metadata_json_webvtt_file_url),
        ];

        let mut files = HashMap::new();
        let mut missing = Vec::new();

        for (kind, url) in sources {
            match url {
                Some(url) => {
                    let dest = dest_dir.join(kind.file_name(iteration.id));
                    self.fetch_to(url, &dest).await?;
                    info!("📥 Downloaded {:?}: {}", kind, dest.display());
                    files.insert(kind, dest);
                }
                None if kind.is_required() => missing.push(kind),
                None => debug!("Iteration {} has no {:?} artifact", iteration.id, kind),
            }
        }

        if !missing.is_empty() {
            warn!("Iteration {} is missing required artifacts: {:?}", iteration.id, missing);
            return Err(DownloadError::Incomplete(missing));
        }

        Ok(DownloadManifest { files })
    }

    async fn fetch_to(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(DownloadError::Unsuccessful(response.status()));
        }
        write_atomic(response.bytes_stream(), dest).await
    }
}

fn part_path(dest: &Path) -> PathBuf {
    dest.with_extension(match dest.extension() {
        Some(ext) => format!("{}.part", ext.to_string_lossy()),
        None => "part".to_string(),
    })
}

/// Write a byte stream to `<dest>.part` and only rename into place once the
/// stream ended cleanly. On failure the part file is removed again, so a
/// partially written file never appears at the final path.
async fn write_atomic<S, B, E>(mut stream: S, dest: &Path) -> Result<(), DownloadError>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    DownloadError: From<E>,
{
    let part = part_path(dest);
    let mut file = tokio::fs::File::create(&part).await?;

    let written: Result<(), DownloadError> = async {
        while let Some(chunk) = stream.next().await {
            file.write_all(chunk?.as_ref()).await?;
        }
        file.flush().await?;
        Ok(())
    }
    .await;
    drop(file);

    match written {
        Ok(()) => {
            tokio::fs::rename(&part, dest).await?;
            Ok(())
        }
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_file(&part).await {
                debug!("Could not remove partial file {}: {}", part.display(), cleanup);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::{IterationResult, JobStatus, VoiceKind};

    fn iteration_with_result(result: Option<IterationResult>) -> Iteration {
        Iteration {
            id: Uuid::new_v4(),
            translation_id: Uuid::new_v4(),
            voice_kind: VoiceKind::PersonalVoice,
            speaker_count: 1,
            lip_sync_enabled: true,
            subtitle_max_char_count_per_segment: None,
            export_subtitle_in_video: None,
            status: JobStatus::Succeeded,
            result,
        }
    }

    #[test]
    fn test_artifact_file_names() {
        let id = Uuid::parse_str("c8a3e4f0-9c5d-4f7e-9a1b-2d3c4e5f6a7b").unwrap();
        assert_eq!(
            ArtifactKind::TranslatedVideo.file_name(id),
            format!("translated_video_{}.mp4", id)
        );
        assert_eq!(
            ArtifactKind::SourceSubtitles.file_name(id),
            format!("source_subtitles_{}.vtt", id)
        );
        assert_eq!(
            ArtifactKind::TargetSubtitles.file_name(id),
            format!("target_subtitles_{}.vtt", id)
        );
        assert_eq!(
            ArtifactKind::Metadata.file_name(id),
            format!("metadata_{}.json", id)
        );
    }

    #[test]
    fn test_download_without_result_fails() {
        tokio_test::block_on(async {
            let downloader = ArtifactDownloader::new().unwrap();
            let iteration = iteration_with_result(None);
            let dir = tempfile::tempdir().unwrap();
            let err = downloader.download(&iteration, dir.path()).await.unwrap_err();
            assert!(matches!(err, DownloadError::NoResult(_)));
        });
    }

    #[test]
    fn test_missing_video_url_is_incomplete() {
        tokio_test::block_on(async {
            let downloader = ArtifactDownloader::new().unwrap();
            // Result present but without the one required artifact.
            let iteration = iteration_with_result(Some(IterationResult::default()));
            let dir = tempfile::tempdir().unwrap();
            let err = downloader.download(&iteration, dir.path()).await.unwrap_err();
            match err {
                DownloadError::Incomplete(kinds) => {
                    assert_eq!(kinds, vec![ArtifactKind::TranslatedVideo])
                }
                other => panic!("expected Incomplete, got {:?}", other),
            }
        });
    }

    #[test]
    fn test_streamed_write_lands_complete_file() {
        tokio_test::block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let dest = dir.path().join("translated_video_x.mp4");
            let chunks: Vec<std::result::Result<&[u8], std::io::Error>> =
                vec![Ok(b"trans"), Ok(b"lated")];

            write_atomic(futures::stream::iter(chunks), &dest).await.unwrap();

            assert_eq!(std::fs::read(&dest).unwrap(), b"translated");
            assert!(!part_path(&dest).exists());
        });
    }

    #[test]
    fn test_failed_stream_leaves_nothing_at_destination() {
        tokio_test::block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let dest = dir.path().join("translated_video_x.mp4");
            // Stream dies mid-transfer after the first chunk.
            let chunks: Vec<std::result::Result<&[u8], std::io::Error>> = vec![
                Ok(b"trans"),
                Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset",
                )),
            ];

            let err = write_atomic(futures::stream::iter(chunks), &dest)
                .await
                .unwrap_err();

            assert!(matches!(err, DownloadError::Io(_)));
            assert!(!dest.exists());
            assert!(!part_path(&dest).exists());
        });
    }
}
