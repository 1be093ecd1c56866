//! Media cut/overlay/concat/probe primitives.
//!
//! The pipeline only sees the [`MediaEngine`] trait; [`FfmpegEngine`] shells
//! out to ffmpeg/ffprobe. Cut points are exchanged as `MM:SS.mmm` strings.

use crate::timecode::format_timecode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("{tool} {operation} failed for {input}")]
    Command {
        tool: &'static str,
        operation: &'static str,
        input: String,
    },

    #[error("could not parse {tool} output: {detail}")]
    Parse { tool: &'static str, detail: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Styling for the language label burned onto translated segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayStyle {
    /// Font file for the label; ffmpeg falls back to its default when unset
    #[serde(default)]
    pub font_file: Option<PathBuf>,

    /// Font size in points
    pub font_size: u32,

    /// Horizontal position expression ("w-tw-100" = 100px from the right)
    pub x_expr: String,

    /// Vertical position expression
    pub y_expr: String,

    /// Label text color
    pub text_color: String,

    /// Opacity of the box behind the label
    pub box_opacity: f32,

    /// Border width of the box in pixels
    pub box_border: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            font_file: None,
            font_size: 48,
            x_expr: "w-tw-100".to_string(),
            y_expr: "100".to_string(),
            text_color: "white".to_string(),
            box_opacity: 0.8,
            box_border: 10,
        }
    }
}

/// The media-processing surface the pipeline depends on.
///
/// Contract: `cut` produces an isolated slice of `[start, end)`; `overlay`
/// re-encodes video while copying audio; `concat` joins parts in the given
/// order and re-encodes to one consistent codec profile; `probe_duration`
/// reports container duration in seconds.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError>;

    async fn cut(
        &self,
        source: &Path,
        start_secs: f64,
        end_secs: f64,
        output: &Path,
    ) -> Result<(), MediaError>;

    async fn overlay(
        &self,
        source: &Path,
        label: &str,
        style: &OverlayStyle,
        output: &Path,
    ) -> Result<(), MediaError>;

    async fn concat(&self, parts: &[PathBuf], output: &Path) -> Result<(), MediaError>;
}

/// ffmpeg/ffprobe-backed implementation.
pub struct FfmpegEngine;

impl FfmpegEngine {
    pub fn new() -> Self {
        Self
    }

    async fn run_ffmpeg(
        args: Vec<String>,
        operation: &'static str,
        input: &Path,
    ) -> Result<(), MediaError> {
        debug!("ffmpeg {}: {}", operation, args.join(" "));
        let status = tokio::process::Command::new("ffmpeg")
            .args(&args)
            .status()
            .await?;
        if !status.success() {
            return Err(MediaError::Command {
                tool: "ffmpeg",
                operation,
                input: input.display().to_string(),
            });
        }
        Ok(())
    }
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError> {
        let path_str = path.to_string_lossy();
        let output = tokio::process::Command::new("ffprobe")
            .args(["-v", "quiet", "-print_format", "json", "-show_format", &*path_str])
            .output()
            .await?;

        if !output.status.success() {
            return Err(MediaError::Command {
                tool: "ffprobe",
                operation: "probe",
                input: path.display().to_string(),
            });
        }

        let data: serde_json::Value =
            serde_json::from_slice(&output.stdout).map_err(|e| MediaError::Parse {
                tool: "ffprobe",
                detail: e.to_string(),
            })?;
        data["format"]["duration"]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| MediaError::Parse {
                tool: "ffprobe",
                detail: format!("no format.duration for {}", path.display()),
            })
    }

    async fn cut(
        &self,
        source: &Path,
        start_secs: f64,
        end_secs: f64,
        output: &Path,
    ) -> Result<(), MediaError> {
        // Input-side -ss/-to with stream copy keeps the slice bit-identical
        // in timing to the source.
        let args = vec![
            "-ss".to_string(),
            format_timecode(start_secs),
            "-to".to_string(),
            format_timecode(end_secs),
            "-i".to_string(),
            source.to_string_lossy().into_owned(),
            "-c".to_string(),
            "copy".to_string(),
            "-y".to_string(),
            output.to_string_lossy().into_owned(),
        ];
        Self::run_ffmpeg(args, "cut", source).await
    }

    async fn overlay(
        &self,
        source: &Path,
        label: &str,
        style: &OverlayStyle,
        output: &Path,
    ) -> Result<(), MediaError> {
        let mut drawtext = format!(
            "drawtext=text='{}':x={}:y={}:fontsize={}:fontcolor={}:box=1:boxcolor=black@{}:boxborderw={}",
            escape_drawtext(label),
            style.x_expr,
            style.y_expr,
            style.font_size,
            style.text_color,
            style.box_opacity,
            style.box_border,
        );
        if let Some(font) = &style.font_file {
            drawtext.push_str(&format!(":fontfile={}", font.display()));
        }

        // Re-encode video for the burned-in label, keep the dubbed audio
        // untouched.
        let args = vec![
            "-i".to_string(),
            source.to_string_lossy().into_owned(),
            "-vf".to_string(),
            drawtext,
            "-c:v".to_string(),
            "libx264".to_string(),
            "-c:a".to_string(),
            "copy".to_string(),
            "-preset".to_string(),
            "veryfast".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            "-y".to_string(),
            output.to_string_lossy().into_owned(),
        ];
        info!("🏷️ Overlaying '{}' on {}", label, source.display());
        Self::run_ffmpeg(args, "overlay", source).await
    }

    async fn concat(&self, parts: &[PathBuf], output: &Path) -> Result<(), MediaError> {
        let list_path = output.with_extension("concat.txt");
        let mut list = String::new();
        for part in parts {
            let absolute = std::fs::canonicalize(part)?;
            list.push_str(&format!("file '{}'\n", absolute.display()));
        }
        tokio::fs::write(&list_path, list).await?;

        // Concat demuxer with a full re-encode so joints never mix codec
        // profiles across segments.
        let args = vec![
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            list_path.to_string_lossy().into_owned(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-preset".to_string(),
            "faster".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            "-y".to_string(),
            output.to_string_lossy().into_owned(),
        ];
        info!("🔗 Concatenating {} segments", parts.len());
        let result = Self::run_ffmpeg(args, "concat", output).await;

        if let Err(e) = tokio::fs::remove_file(&list_path).await {
            debug!("Could not remove concat list {}: {}", list_path.display(), e);
        }
        result
    }
}

/// Escape characters that terminate or confuse a drawtext filter argument.
fn escape_drawtext(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace(':', "\\:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_drawtext() {
        assert_eq!(escape_drawtext("Danish"), "Danish");
        assert_eq!(escape_drawtext("it's"), "it\\'s");
        assert_eq!(escape_drawtext("a:b"), "a\\:b");
    }

    #[test]
    fn test_default_overlay_position() {
        let style = OverlayStyle::default();
        assert_eq!(style.x_expr, "w-tw-100");
        assert_eq!(style.y_expr, "100");
        assert_eq!(style.font_size, 48);
    }
}
