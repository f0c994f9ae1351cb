//! Timestamp parsing and validation utilities.
//!
//! Submissions carry clock timestamps (`HH:MM:SS`). Internally the media
//! layer also accepts `MM:SS`, `SS` and fractional seconds so that probe
//! results and computed cut points can be expressed in the same format.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Maximum reasonable video duration (24 hours in seconds).
pub const MAX_VIDEO_DURATION_SECS: f64 = 86400.0;

static CLOCK_TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}:\d{2}:\d{2}$").expect("valid timestamp regex"));

/// Check that `ts` is a strict `HH:MM:SS` clock timestamp.
pub fn is_clock_timestamp(ts: &str) -> bool {
    CLOCK_TIMESTAMP.is_match(ts)
}

/// Parse a timestamp string to total seconds.
///
/// Supports `HH:MM:SS`, `MM:SS` and `SS`, each optionally with a
/// fractional seconds part.
///
/// # Examples
/// ```
/// use vedit_models::timestamp::parse_timestamp;
/// assert_eq!(parse_timestamp("01:30:00").unwrap(), 5400.0);
/// assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
/// assert_eq!(parse_timestamp("90").unwrap(), 90.0);
/// ```
pub fn parse_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }

    let parts: Vec<&str> = ts.split(':').collect();
    if parts.len() > 3 {
        return Err(TimestampError::InvalidFormat(ts.to_string()));
    }

    const COMPONENTS: [&str; 3] = ["hours", "minutes", "seconds"];
    let names = &COMPONENTS[COMPONENTS.len() - parts.len()..];

    let mut total = 0.0;
    for (part, name) in parts.iter().zip(names) {
        let value: f64 = part
            .parse()
            .map_err(|_| TimestampError::InvalidValue(name, part.to_string()))?;
        if value < 0.0 {
            return Err(TimestampError::Negative);
        }
        total = total * 60.0 + value;
    }

    Ok(total)
}

/// Format seconds into HH:MM:SS or HH:MM:SS.mmm string.
pub fn format_seconds(total_secs: f64) -> String {
    let hours = (total_secs / 3600.0).floor() as u32;
    let mins = ((total_secs % 3600.0) / 60.0).floor() as u32;
    let secs = total_secs % 60.0;

    if (secs - secs.floor()).abs() > 0.0001 {
        format!("{:02}:{:02}:{:06.3}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}:{:02}", hours, mins, secs.floor() as u32)
    }
}

/// A validated, non-empty `[start, end)` range in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start_secs: f64,
    pub end_secs: f64,
}

impl TimeRange {
    /// Parse and validate a start/end pair. Start must be strictly before end.
    pub fn parse(start: &str, end: &str) -> Result<Self, TimestampError> {
        let start_secs = parse_timestamp(start)?;
        let end_secs = parse_timestamp(end)?;

        if start_secs >= end_secs {
            return Err(TimestampError::StartNotBeforeEnd {
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        if end_secs > MAX_VIDEO_DURATION_SECS {
            return Err(TimestampError::ExceedsMaxDuration(MAX_VIDEO_DURATION_SECS));
        }

        Ok(Self {
            start_secs,
            end_secs,
        })
    }

    /// Length of the range in seconds.
    pub fn duration(&self) -> f64 {
        self.end_secs - self.start_secs
    }
}

/// Timestamp parsing/validation error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("Timestamp cannot be empty")]
    Empty,

    #[error("Timestamp cannot be negative")]
    Negative,

    #[error("Invalid {0} value: {1}")]
    InvalidValue(&'static str, String),

    #[error("Invalid timestamp format '{0}'. Use HH:MM:SS")]
    InvalidFormat(String),

    #[error("Start time ({start}) must be before end time ({end})")]
    StartNotBeforeEnd { start: String, end: String },

    #[error("Timestamps exceed maximum allowed duration ({} hours)", .0 / 3600.0)]
    ExceedsMaxDuration(f64),
}
