//! Declarative segment plans: which time ranges of the source stay as-is
//! and which get translated to which locale.

use crate::timecode::{parse_timecode, TimecodeError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("segment plan is empty")]
    Empty,

    #[error("segment {index}: {source}")]
    Timecode {
        index: usize,
        #[source]
        source: TimecodeError,
    },

    #[error("segment {0}: end must be after start")]
    EndBeforeStart(usize),

    #[error("segment {0}: only the final segment may omit its end")]
    UnboundedNotLast(usize),

    #[error("segment {0} starts before the previous segment ends")]
    Overlap(usize),

    #[error("segment {0}: target locale must not be empty")]
    EmptyLocale(usize),

    #[error("segment {0} starts at or beyond the source duration")]
    BeyondSource(usize),

    #[error("failed to read plan file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse plan file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// One record of the segment plan.
///
/// `target_locale == None` means pass-through (no translation, no overlay).
/// `end == None` is allowed only on the final record and means "to the end
/// of the source", resolved against the probed duration at run time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSpec {
    pub start: String,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub target_locale: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

impl SegmentSpec {
    pub fn passthrough(start: &str, end: &str) -> Self {
        Self {
            start: start.to_string(),
            end: Some(end.to_string()),
            target_locale: None,
            label: None,
        }
    }

    pub fn translated(start: &str, end: &str, locale: &str, label: &str) -> Self {
        Self {
            start: start.to_string(),
            end: Some(end.to_string()),
            target_locale: Some(locale.to_string()),
            label: Some(label.to_string()),
        }
    }
}

/// A segment after validation and unbounded-end resolution: boundaries in
/// seconds, strictly increasing and non-overlapping.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSegment {
    pub index: usize,
    pub start_secs: f64,
    pub end_secs: f64,
    pub target_locale: Option<String>,
    pub label: Option<String>,
}

/// Ordered list of segment records covering the output timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentPlan {
    #[serde(rename = "segment")]
    pub segments: Vec<SegmentSpec>,
}

impl SegmentPlan {
    pub fn new(segments: Vec<SegmentSpec>) -> Self {
        Self { segments }
    }

    /// Load a plan document: a TOML file with one `[[segment]]` table per
    /// record.
    pub fn from_path(path: &Path) -> Result<Self, PlanError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, PlanError> {
        Ok(toml::from_str(text)?)
    }

    /// Validate the plan and resolve the unbounded final end against the
    /// probed source duration. This happens exactly once per pipeline run;
    /// the resolved boundaries are reused for every later segment.
    pub fn resolve(&self, source_duration: f64) -> Result<Vec<ResolvedSegment>, PlanError> {
        if self.segments.is_empty() {
            return Err(PlanError::Empty);
        }

        let last = self.segments.len() - 1;
        let mut resolved = Vec::with_capacity(self.segments.len());
        let mut previous_end = 0.0_f64;

        for (index, spec) in self.segments.iter().enumerate() {
            let start_secs = parse_timecode(&spec.start)
                .map_err(|source| PlanError::Timecode { index, source })?;

            let end_secs = match &spec.end {
                Some(end) => {
                    parse_timecode(end).map_err(|source| PlanError::Timecode { index, source })?
                }
                None if index == last => source_duration,
                None => return Err(PlanError::UnboundedNotLast(index)),
            };

            if end_secs <= start_secs {
                return Err(PlanError::EndBeforeStart(index));
            }
            if index > 0 && start_secs < previous_end {
                return Err(PlanError::Overlap(index));
            }
            if start_secs >= source_duration {
                return Err(PlanError::BeyondSource(index));
            }
            if let Some(locale) = &spec.target_locale {
                if locale.trim().is_empty() {
                    return Err(PlanError::EmptyLocale(index));
                }
            }

            previous_end = end_secs;
            resolved.push(ResolvedSegment {
                index,
                start_secs,
                end_secs,
                target_locale: spec.target_locale.clone(),
                label: spec.label.clone(),
            });
        }

        Ok(resolved)
    }
}
