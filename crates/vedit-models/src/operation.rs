//! Edit operations a job can carry.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::aspect::AspectRatio;
use crate::timestamp::{TimeRange, TimestampError};

/// Kind of edit pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditKind {
    /// Keep a single time range
    Trim,
    /// Cut an internal range out and join the remainder
    RemoveSegment,
    /// Reframe to a target aspect ratio
    Autoflip,
}

impl EditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditKind::Trim => "trim",
            EditKind::RemoveSegment => "remove_segment",
            EditKind::Autoflip => "autoflip",
        }
    }
}

impl fmt::Display for EditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for a trim job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrimParams {
    /// Source video URL
    pub input_url: String,
    /// Start of the kept range (HH:MM:SS)
    pub start: String,
    /// End of the kept range (HH:MM:SS, exclusive)
    pub end: String,
    /// Sanitized artifact name
    pub output_name: String,
}

/// Parameters for a segment removal job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveSegmentParams {
    pub input_url: String,
    /// Start of the removed range (HH:MM:SS)
    pub remove_start: String,
    /// End of the removed range (HH:MM:SS, exclusive)
    pub remove_end: String,
    pub output_name: String,
}

/// Parameters for a reframe job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoflipParams {
    pub input_url: String,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub debug: bool,
    pub output_name: String,
}

/// An edit to perform against a remote source video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EditOperation {
    Trim(TrimParams),
    RemoveSegment(RemoveSegmentParams),
    Autoflip(AutoflipParams),
}

impl EditOperation {
    pub fn kind(&self) -> EditKind {
        match self {
            EditOperation::Trim(_) => EditKind::Trim,
            EditOperation::RemoveSegment(_) => EditKind::RemoveSegment,
            EditOperation::Autoflip(_) => EditKind::Autoflip,
        }
    }

    pub fn input_url(&self) -> &str {
        match self {
            EditOperation::Trim(p) => &p.input_url,
            EditOperation::RemoveSegment(p) => &p.input_url,
            EditOperation::Autoflip(p) => &p.input_url,
        }
    }

    pub fn output_name(&self) -> &str {
        match self {
            EditOperation::Trim(p) => &p.output_name,
            EditOperation::RemoveSegment(p) => &p.output_name,
            EditOperation::Autoflip(p) => &p.output_name,
        }
    }

    /// Check semantic ordering of the time bounds.
    ///
    /// Syntax is validated at the request boundary; this only rejects ranges
    /// that would make the engine fail ambiguously or remove nothing.
    pub fn validate(&self) -> Result<(), OperationError> {
        match self {
            EditOperation::Trim(p) => {
                TimeRange::parse(&p.start, &p.end)?;
            }
            EditOperation::RemoveSegment(p) => {
                TimeRange::parse(&p.remove_start, &p.remove_end)?;
            }
            EditOperation::Autoflip(_) => {}
        }

        if self.output_name().is_empty() {
            return Err(OperationError::MissingOutputName);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OperationError {
    #[error("Invalid time range: {0}")]
    InvalidRange(#[from] TimestampError),

    #[error("Output name is required")]
    MissingOutputName,
}
