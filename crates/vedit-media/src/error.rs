//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

use vedit_models::{FailureKind, JobFailure};

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0} not found in PATH")]
    EngineNotFound(String),

    #[error("{program} exited with status {}: {}", fmt_exit(.exit_code), .stderr.trim())]
    EngineFailed {
        program: String,
        stderr: String,
        exit_code: Option<i32>,
    },

    #[error("{program} timed out after {secs} seconds")]
    Timeout { program: String, secs: u64 },

    #[error("Download failed: {message}")]
    DownloadFailed { message: String },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),
}

fn fmt_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

impl MediaError {
    /// Create an engine failure error.
    pub fn engine_failed(
        program: impl Into<String>,
        stderr: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::EngineFailed {
            program: program.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Create a download failure error.
    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            message: message.into(),
        }
    }

    /// Failure category recorded on the job.
    pub fn kind(&self) -> FailureKind {
        match self {
            MediaError::DownloadFailed { .. } => FailureKind::Download,
            MediaError::EngineNotFound(_)
            | MediaError::EngineFailed { .. }
            | MediaError::InvalidVideo(_) => FailureKind::Engine,
            MediaError::Timeout { .. } => FailureKind::Timeout,
            MediaError::FileNotFound(_) | MediaError::Io(_) | MediaError::JsonParse(_) => {
                FailureKind::Internal
            }
        }
    }

    /// Convert into the failure detail stored in the registry.
    pub fn to_failure(&self) -> JobFailure {
        JobFailure::new(self.kind(), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_failed_message_includes_diagnostics() {
        let err = MediaError::engine_failed("ffmpeg", "Invalid data found\n", Some(1));
        assert_eq!(
            err.to_string(),
            "ffmpeg exited with status 1: Invalid data found"
        );
        assert_eq!(err.kind(), FailureKind::Engine);

        let killed = MediaError::engine_failed("bash", "", None);
        assert!(killed.to_string().contains("status signal"));
    }

    #[test]
    fn test_failure_kinds() {
        assert_eq!(
            MediaError::download_failed("HTTP 404").kind(),
            FailureKind::Download
        );
        assert_eq!(
            MediaError::Timeout {
                program: "ffmpeg".into(),
                secs: 300
            }
            .kind(),
            FailureKind::Timeout
        );
        assert_eq!(
            MediaError::FileNotFound(PathBuf::from("in.mp4")).to_failure().kind,
            FailureKind::Internal
        );
    }
}
