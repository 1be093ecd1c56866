//! Duration reconciliation between the source video and the final montage.

/// Result of comparing output duration against source duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationReport {
    /// Whether the drift is within the configured tolerance
    pub within_tolerance: bool,

    /// Absolute drift in seconds
    pub delta: f64,
}

/// Compare a reassembled output duration against the source duration.
///
/// Pure check with no side effects; a violation is reported to the caller
/// as a warning, it never fails the pipeline.
pub fn check(source_duration: f64, output_duration: f64, tolerance_seconds: f64) -> DurationReport {
    let delta = (output_duration - source_duration).abs();
    DurationReport {
        within_tolerance: delta <= tolerance_seconds,
        delta,
    }
}
