//! Application state.

use std::sync::Arc;

use vedit_queue::{JobService, QueueConfig, RedisJobRegistry, RedisWorkQueue};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub jobs: JobService,
}

impl AppState {
    /// Create application state backed by Redis.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let queue_config = QueueConfig::from_env();

        let queue = RedisWorkQueue::new(queue_config.clone())?;
        queue.init().await?;
        let registry = RedisJobRegistry::new(queue_config)?;

        Ok(Self::with_service(
            config,
            JobService::new(Arc::new(queue), Arc::new(registry)),
        ))
    }

    /// Create application state around an existing job service.
    pub fn with_service(config: ApiConfig, jobs: JobService) -> Self {
        Self { config, jobs }
    }
}
