//! Queue and registry configuration.

use std::time::Duration;

/// Connection and key layout shared by the queue and the registry.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for work items
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Prefix for job hashes (`<prefix>:<job_id>`)
    pub registry_prefix: String,
    /// Expiry applied to job records; `None` keeps them forever
    pub registry_ttl: Option<Duration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "vedit:jobs".to_string(),
            consumer_group: "vedit:workers".to_string(),
            registry_prefix: "vedit:job".to_string(),
            registry_ttl: None,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            registry_prefix: std::env::var("REGISTRY_PREFIX").unwrap_or(defaults.registry_prefix),
            registry_ttl: std::env::var("REGISTRY_TTL_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }

    /// Redis key of a job record.
    pub fn job_key(&self, job_id: &str) -> String {
        format!("{}:{}", self.registry_prefix, job_id)
    }
}
