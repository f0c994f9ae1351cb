//! Shared data models for the vedit job service.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, job states and failure details
//! - Edit operations (trim, segment removal, reframe) and their parameters
//! - Timestamp and aspect ratio parsing
//! - Output name sanitization

pub mod aspect;
pub mod job;
pub mod operation;
pub mod output_name;
pub mod timestamp;

// Re-export common types
pub use aspect::{AspectRatio, AspectRatioParseError};
pub use job::{FailureKind, Job, JobFailure, JobId, JobState, JobView, TransitionError};
pub use operation::{
    AutoflipParams, EditKind, EditOperation, OperationError, RemoveSegmentParams, TrimParams,
};
pub use output_name::{default_output_name, sanitize_output_name, OUTPUT_EXTENSION};
pub use timestamp::{format_seconds, is_clock_timestamp, parse_timestamp, TimeRange, TimestampError};
