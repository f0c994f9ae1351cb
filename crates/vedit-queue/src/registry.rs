//! Job registry: authoritative job state, keyed by job ID.

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, warn};

use vedit_models::{Job, JobFailure, JobId, JobState, TransitionError};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};

/// A state change applied to a stored job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobChange {
    Start,
    Finish { output_name: String },
    Fail(JobFailure),
}

impl JobChange {
    pub fn target(&self) -> JobState {
        match self {
            JobChange::Start => JobState::Running,
            JobChange::Finish { .. } => JobState::Finished,
            JobChange::Fail(_) => JobState::Failed,
        }
    }

    /// Apply to `job`, enforcing the state machine.
    pub fn apply(&self, job: &mut Job) -> Result<(), TransitionError> {
        match self {
            JobChange::Start => job.start(),
            JobChange::Finish { output_name } => job.finish(output_name.clone()),
            JobChange::Fail(failure) => job.fail(failure.clone()),
        }
    }
}

/// Storage of job records.
///
/// Readers may run concurrently with a writer; transitions on one job are
/// serialized and rejected when they would leave a terminal state.
#[async_trait]
pub trait JobRegistry: Send + Sync {
    /// Store a new job.
    async fn create(&self, job: &Job) -> QueueResult<()>;

    /// Fetch a job, or `JobNotFound`.
    async fn get(&self, id: &JobId) -> QueueResult<Job>;

    /// Apply a state change atomically, returning the updated job.
    async fn update(&self, id: &JobId, change: JobChange) -> QueueResult<Job>;

    /// Delete a job record. Missing records are ignored.
    async fn remove(&self, id: &JobId) -> QueueResult<()>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> QueueResult<()>;

    async fn start(&self, id: &JobId) -> QueueResult<Job> {
        self.update(id, JobChange::Start).await
    }

    async fn finish(&self, id: &JobId, output_name: &str) -> QueueResult<Job> {
        self.update(
            id,
            JobChange::Finish {
                output_name: output_name.to_string(),
            },
        )
        .await
    }

    async fn fail(&self, id: &JobId, failure: JobFailure) -> QueueResult<Job> {
        self.update(id, JobChange::Fail(failure)).await
    }
}

/// Writes `data` only if the stored state still equals the state it was
/// derived from. Returns 1 on success, 0 on conflict, -1 when missing.
const COMPARE_AND_SET: &str = r#"
local current = redis.call('HGET', KEYS[1], 'state')
if not current then
    return -1
end
if current ~= ARGV[1] then
    return 0
end
redis.call('HSET', KEYS[1], 'state', ARGV[2], 'data', ARGV[3])
local ttl = tonumber(ARGV[4])
if ttl > 0 then
    redis.call('EXPIRE', KEYS[1], ttl)
end
return 1
"#;

/// Attempts before a contended transition is reported as a conflict.
const MAX_CAS_ATTEMPTS: usize = 5;

/// Job registry stored as one Redis hash per job (`state`, `data` fields).
pub struct RedisJobRegistry {
    client: redis::Client,
    config: QueueConfig,
    script: redis::Script,
}

impl RedisJobRegistry {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            config,
            script: redis::Script::new(COMPARE_AND_SET),
        })
    }

    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    async fn conn(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    fn ttl_secs(&self) -> u64 {
        self.config.registry_ttl.map(|d| d.as_secs()).unwrap_or(0)
    }
}

#[async_trait]
impl JobRegistry for RedisJobRegistry {
    async fn create(&self, job: &Job) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let key = self.config.job_key(job.id.as_str());
        let data = serde_json::to_string(job)?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset_multiple(&key, &[("state", job.state.as_str()), ("data", data.as_str())])
            .ignore();
        let ttl = self.ttl_secs();
        if ttl > 0 {
            pipe.expire(&key, ttl as i64).ignore();
        }
        pipe.query_async::<()>(&mut conn).await?;

        debug!("Registered job {}", job.id);
        Ok(())
    }

    async fn get(&self, id: &JobId) -> QueueResult<Job> {
        let mut conn = self.conn().await?;
        let data: Option<String> = conn.hget(self.config.job_key(id.as_str()), "data").await?;
        let data = data.ok_or_else(|| QueueError::not_found(id))?;
        Ok(serde_json::from_str(&data)?)
    }

    async fn update(&self, id: &JobId, change: JobChange) -> QueueResult<Job> {
        let key = self.config.job_key(id.as_str());

        for _ in 0..MAX_CAS_ATTEMPTS {
            let mut job = self.get(id).await?;
            let observed = job.state;
            change.apply(&mut job)?;

            let data = serde_json::to_string(&job)?;
            let mut conn = self.conn().await?;
            let outcome: i32 = self
                .script
                .key(&key)
                .arg(observed.as_str())
                .arg(job.state.as_str())
                .arg(&data)
                .arg(self.ttl_secs())
                .invoke_async(&mut conn)
                .await?;

            match outcome {
                1 => {
                    debug!("Job {} {} -> {}", id, observed, job.state);
                    return Ok(job);
                }
                -1 => return Err(QueueError::not_found(id)),
                _ => warn!("Job {} changed concurrently, retrying {:?}", id, change.target()),
            }
        }

        Err(QueueError::Conflict(id.to_string()))
    }

    async fn remove(&self, id: &JobId) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(self.config.job_key(id.as_str())).await?;
        Ok(())
    }

    async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vedit_models::{EditOperation, FailureKind, TrimParams};

    fn job() -> Job {
        Job::new(EditOperation::Trim(TrimParams {
            input_url: "https://example.com/v.mp4".to_string(),
            start: "00:00:01".to_string(),
            end: "00:00:02".to_string(),
            output_name: "out.mp4".to_string(),
        }))
    }

    #[test]
    fn test_change_targets() {
        assert_eq!(JobChange::Start.target(), JobState::Running);
        assert_eq!(
            JobChange::Fail(JobFailure::new(FailureKind::Engine, "x")).target(),
            JobState::Failed
        );
    }

    #[test]
    fn test_change_apply_rejects_terminal_exit() {
        let mut job = job();
        JobChange::Start.apply(&mut job).unwrap();
        JobChange::Finish {
            output_name: "out.mp4".to_string(),
        }
        .apply(&mut job)
        .unwrap();

        let err = JobChange::Start.apply(&mut job).unwrap_err();
        assert_eq!(err.from, JobState::Finished);
        assert_eq!(job.result.as_deref(), Some("out.mp4"));
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_redis_registry_lifecycle() {
        let registry = RedisJobRegistry::new(QueueConfig {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            registry_ttl: Some(std::time::Duration::from_secs(60)),
            ..QueueConfig::default()
        })
        .unwrap();

        let job = job();
        registry.create(&job).await.unwrap();
        assert_eq!(registry.get(&job.id).await.unwrap().state, JobState::Queued);

        registry.start(&job.id).await.unwrap();
        let failed = registry
            .fail(&job.id, JobFailure::new(FailureKind::Download, "HTTP 404"))
            .await
            .unwrap();
        assert_eq!(failed.state, JobState::Failed);

        // Terminal states are sticky
        assert!(matches!(
            registry.finish(&job.id, "out.mp4").await,
            Err(QueueError::Transition(_))
        ));

        registry.remove(&job.id).await.unwrap();
        assert!(matches!(
            registry.get(&job.id).await,
            Err(QueueError::JobNotFound(_))
        ));
    }
}
