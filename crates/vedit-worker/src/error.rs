//! Worker error types.

use thiserror::Error;

use vedit_models::{FailureKind, JobFailure};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("{0}")]
    Validation(String),

    #[error("Job exceeded its {0} second limit")]
    JobTimeout(u64),

    #[error(transparent)]
    Media(#[from] vedit_media::MediaError),
}

impl WorkerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Failure category recorded on the job.
    pub fn kind(&self) -> FailureKind {
        match self {
            WorkerError::Validation(_) => FailureKind::Validation,
            WorkerError::JobTimeout(_) => FailureKind::Timeout,
            WorkerError::Media(e) => e.kind(),
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
    use vedit_media::MediaError;

    #[test]
    fn test_failure_detail() {
        let err = WorkerError::from(MediaError::download_failed("HTTP 404"));
        assert_eq!(err.to_failure().to_string(), "download: Download failed: HTTP 404");

        assert_eq!(WorkerError::JobTimeout(3600).kind(), FailureKind::Timeout);
        assert_eq!(
            WorkerError::validation("nothing would remain").to_failure().to_string(),
            "validation: nothing would remain"
        );
    }
}
