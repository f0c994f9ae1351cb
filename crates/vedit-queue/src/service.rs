//! Job submission and status lookup.

use std::sync::Arc;

use tracing::{error, info};

use vedit_models::{EditOperation, Job, JobId, JobView};

use crate::error::QueueResult;
use crate::job::WorkItem;
use crate::queue::WorkQueue;
use crate::registry::JobRegistry;

/// Front door for clients: registers jobs and reports their state.
#[derive(Clone)]
pub struct JobService {
    queue: Arc<dyn WorkQueue>,
    registry: Arc<dyn JobRegistry>,
}

impl JobService {
    pub fn new(queue: Arc<dyn WorkQueue>, registry: Arc<dyn JobRegistry>) -> Self {
        Self { queue, registry }
    }

    pub fn queue(&self) -> &Arc<dyn WorkQueue> {
        &self.queue
    }

    pub fn registry(&self) -> &Arc<dyn JobRegistry> {
        &self.registry
    }

    /// Validate and register `operation`, then queue it for a worker.
    ///
    /// Returns once the job is queued; execution happens elsewhere. When the
    /// enqueue fails the registration is rolled back and the error returned.
    pub async fn submit(&self, operation: EditOperation) -> QueueResult<JobId> {
        operation.validate()?;

        let job = Job::new(operation);
        self.registry.create(&job).await?;

        if let Err(e) = self.queue.enqueue(&WorkItem::for_job(&job)).await {
            error!("Failed to enqueue job {}: {}", job.id, e);
            if let Err(cleanup) = self.registry.remove(&job.id).await {
                error!("Failed to roll back job {}: {}", job.id, cleanup);
            }
            return Err(e);
        }

        info!("Submitted {} job {}", job.kind(), job.id);
        Ok(job.id)
    }

    /// Current snapshot of a job.
    pub async fn get_state(&self, job_id: &JobId) -> QueueResult<JobView> {
        Ok(self.registry.get(job_id).await?.view())
    }

    /// Check that both backends are reachable.
    pub async fn ping(&self) -> QueueResult<()> {
        self.registry.ping().await?;
        self.queue.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use vedit_models::{EditKind, JobState, RemoveSegmentParams, TrimParams};

    use crate::error::QueueError;
    use crate::job::Delivery;
    use crate::memory::{MemoryQueue, MemoryRegistry};

    fn trim(start: &str, end: &str) -> EditOperation {
        EditOperation::Trim(TrimParams {
            input_url: "https://example.com/v.mp4".to_string(),
            start: start.to_string(),
            end: end.to_string(),
            output_name: "out.mp4".to_string(),
        })
    }

    #[tokio::test]
    async fn test_submit_registers_and_enqueues() {
        let queue = Arc::new(MemoryQueue::new());
        let registry = Arc::new(MemoryRegistry::new());
        let service = JobService::new(queue.clone(), registry.clone());

        let id = service.submit(trim("00:00:02", "00:00:04")).await.unwrap();

        let view = service.get_state(&id).await.unwrap();
        assert_eq!(view.status, JobState::Queued);
        assert_eq!(view.kind, EditKind::Trim);

        let delivered = queue.consume("c1", Duration::ZERO, 10).await.unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].item.job_id, id);
    }

    #[tokio::test]
    async fn test_submit_rejects_inverted_range() {
        let queue = Arc::new(MemoryQueue::new());
        let registry = Arc::new(MemoryRegistry::new());
        let service = JobService::new(queue.clone(), registry.clone());

        let err = service
            .submit(EditOperation::RemoveSegment(RemoveSegmentParams {
                input_url: "https://example.com/v.mp4".to_string(),
                remove_start: "00:00:05".to_string(),
                remove_end: "00:00:05".to_string(),
                output_name: "out.mp4".to_string(),
            }))
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::InvalidJob(_)));
        assert_eq!(queue.len().await.unwrap(), 0);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let service = JobService::new(
            Arc::new(MemoryQueue::new()),
            Arc::new(MemoryRegistry::new()),
        );
        assert!(matches!(
            service.get_state(&JobId::from_string("missing")).await,
            Err(QueueError::JobNotFound(_))
        ));
    }

    struct BrokenQueue;

    #[async_trait]
    impl WorkQueue for BrokenQueue {
        async fn enqueue(&self, _: &WorkItem) -> QueueResult<String> {
            Err(QueueError::enqueue_failed("stream unavailable"))
        }
        async fn consume(&self, _: &str, _: Duration, _: usize) -> QueueResult<Vec<Delivery>> {
            Ok(Vec::new())
        }
        async fn ack(&self, _: &str) -> QueueResult<()> {
            Ok(())
        }
        async fn claim_pending(&self, _: &str, _: Duration, _: usize) -> QueueResult<Vec<Delivery>> {
            Ok(Vec::new())
        }
        async fn len(&self) -> QueueResult<u64> {
            Ok(0)
        }
        async fn ping(&self) -> QueueResult<()> {
            Err(QueueError::connection_failed("down"))
        }
    }

    #[tokio::test]
    async fn test_failed_enqueue_rolls_back_registration() {
        let registry = Arc::new(MemoryRegistry::new());
        let service = JobService::new(Arc::new(BrokenQueue), registry.clone());

        let err = service.submit(trim("00:00:02", "00:00:04")).await.unwrap_err();

        assert!(matches!(err, QueueError::EnqueueFailed(_)));
        assert!(registry.is_empty().await);
        assert!(service.ping().await.is_err());
    }
}
