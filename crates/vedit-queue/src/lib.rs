//! Work queue and job registry for the vedit service.
//!
//! This crate provides:
//! - At-least-once work item delivery via Redis Streams consumer groups
//! - The job registry with atomic state transitions
//! - In-memory backends with the same semantics
//! - `JobService` for submission and status lookup

pub mod config;
pub mod error;
pub mod job;
pub mod memory;
pub mod queue;
pub mod registry;
pub mod service;

pub use config::QueueConfig;
pub use error::{QueueError, QueueResult};
pub use job::{Delivery, WorkItem};
pub use memory::{MemoryQueue, MemoryRegistry};
pub use queue::{RedisWorkQueue, WorkQueue};
pub use registry::{JobChange, JobRegistry, RedisJobRegistry};
pub use service::JobService;
