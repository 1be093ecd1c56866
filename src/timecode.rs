//! Timecode parsing and formatting for segment boundaries.
//!
//! Accepts `MM:SS`, `MM:SS.mmm` and `H:MM:SS(.mmm)`; the media tools are
//! handed back the `MM:SS.mmm` form.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimecodeError {
    #[error("invalid timecode '{0}': expected MM:SS, MM:SS.mmm or H:MM:SS")]
    Invalid(String),
}

/// Parse a timecode string into seconds.
pub fn parse_timecode(value: &str) -> Result<f64, TimecodeError> {
    let invalid = || TimecodeError::Invalid(value.to_string());

    let parts: Vec<&str> = value.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        // Two-part form carries total minutes and may run past 59, matching
        // what format_timecode emits for inputs over an hour.
        [m, s] => {
            let minutes: u64 = m.parse().map_err(|_| invalid())?;
            (0u64, minutes, *s)
        }
        [h, m, s] => {
            let hours: u64 = h.parse().map_err(|_| invalid())?;
            let minutes: u64 = m.parse().map_err(|_| invalid())?;
            if minutes >= 60 {
                return Err(invalid());
            }
            (hours, minutes, *s)
        }
        _ => return Err(invalid()),
    };

    let seconds: f64 = seconds.parse().map_err(|_| invalid())?;
    if seconds.is_sign_negative() || seconds >= 60.0 {
        return Err(invalid());
    }

    Ok(hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds)
}

/// Format seconds as `MM:SS.mmm`, the form the media primitives expect.
pub fn format_timecode(seconds: f64) -> String {
    let total_millis = (seconds * 1000.0).round() as u64;
    let minutes = total_millis / 60_000;
    let millis = total_millis % 60_000;
    format!("{:02}:{:02}.{:03}", minutes, millis / 1000, millis % 1000)
}
