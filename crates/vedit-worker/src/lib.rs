//! Video edit worker.
//!
//! This crate provides:
//! - Job executor consuming the work queue
//! - Trim, segment removal and autoflip pipelines
//! - Per-job staging and artifact publication
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod pipeline;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{DeliveryOutcome, JobExecutor};
pub use logging::JobLogger;
pub use pipeline::{run_pipeline, PipelineContext, PipelineStage};
