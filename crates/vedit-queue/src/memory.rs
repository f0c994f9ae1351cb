//! In-process queue and registry.
//!
//! Same delivery and transition semantics as the Redis backends, for tests
//! and single-process deployments.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, RwLock};

use vedit_models::{Job, JobId};

use crate::error::{QueueError, QueueResult};
use crate::job::{decode_item, Delivery, WorkItem};
use crate::queue::WorkQueue;
use crate::registry::{JobChange, JobRegistry};

#[derive(Debug)]
struct PendingEntry {
    payload: String,
    delivered_at: Instant,
    deliveries: u32,
}

#[derive(Debug, Default)]
struct QueueState {
    next_seq: u64,
    ready: VecDeque<(String, String)>,
    pending: HashMap<String, PendingEntry>,
}

/// Work queue held in memory.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw payload, bypassing serialization.
    pub async fn push_raw(&self, payload: impl Into<String>) -> String {
        let mut state = self.state.lock().await;
        state.next_seq += 1;
        let id = format!("{}-0", state.next_seq);
        state.ready.push_back((id.clone(), payload.into()));
        drop(state);
        self.notify.notify_one();
        id
    }

    /// Number of delivered but unacknowledged items.
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// How many times `message_id` has been delivered, if still pending.
    pub async fn delivery_count(&self, message_id: &str) -> Option<u32> {
        self.state
            .lock()
            .await
            .pending
            .get(message_id)
            .map(|p| p.deliveries)
    }

    async fn take_ready(&self, count: usize) -> Vec<Delivery> {
        let mut state = self.state.lock().await;
        let mut deliveries = Vec::new();

        while deliveries.len() < count {
            let Some((id, payload)) = state.ready.pop_front() else {
                break;
            };
            // Malformed items never become pending
            if let Some(item) = decode_item(&id, Some(&payload)) {
                state.pending.insert(
                    id.clone(),
                    PendingEntry {
                        payload,
                        delivered_at: Instant::now(),
                        deliveries: 1,
                    },
                );
                deliveries.push(Delivery {
                    message_id: id,
                    item,
                });
            }
        }

        deliveries
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn enqueue(&self, item: &WorkItem) -> QueueResult<String> {
        let payload = serde_json::to_string(item)?;
        Ok(self.push_raw(payload).await)
    }

    async fn consume(
        &self,
        _consumer: &str,
        block: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let deadline = tokio::time::Instant::now() + block;

        loop {
            let notified = self.notify.notified();
            let deliveries = self.take_ready(count).await;
            if !deliveries.is_empty() {
                return Ok(deliveries);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, message_id: &str) -> QueueResult<()> {
        self.state.lock().await.pending.remove(message_id);
        Ok(())
    }

    async fn claim_pending(
        &self,
        _consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut state = self.state.lock().await;
        let mut stale: Vec<String> = state
            .pending
            .iter()
            .filter(|(_, p)| p.delivered_at.elapsed() >= min_idle)
            .map(|(id, _)| id.clone())
            .collect();
        stale.sort();
        stale.truncate(count);

        let mut deliveries = Vec::new();
        for id in stale {
            let Some(entry) = state.pending.get_mut(&id) else {
                continue;
            };
            entry.delivered_at = Instant::now();
            entry.deliveries += 1;
            if let Some(item) = decode_item(&id, Some(&entry.payload)) {
                deliveries.push(Delivery {
                    message_id: id,
                    item,
                });
            }
        }

        Ok(deliveries)
    }

    async fn len(&self) -> QueueResult<u64> {
        let state = self.state.lock().await;
        Ok((state.ready.len() + state.pending.len()) as u64)
    }

    async fn ping(&self) -> QueueResult<()> {
        Ok(())
    }
}

/// Job registry held in memory.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobRegistry for MemoryRegistry {
    async fn create(&self, job: &Job) -> QueueResult<()> {
        self.jobs.write().await.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, id: &JobId) -> QueueResult<Job> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| QueueError::not_found(id))
    }

    async fn update(&self, id: &JobId, change: JobChange) -> QueueResult<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(id).ok_or_else(|| QueueError::not_found(id))?;

        // Apply to a copy so a rejected change leaves the record untouched
        let mut updated = job.clone();
        change.apply(&mut updated)?;
        *job = updated.clone();
        Ok(updated)
    }

    async fn remove(&self, id: &JobId) -> QueueResult<()> {
        self.jobs.write().await.remove(id);
        Ok(())
    }

    async fn ping(&self) -> QueueResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vedit_models::{EditOperation, FailureKind, JobFailure, JobState, TrimParams};

    fn job() -> Job {
        Job::new(EditOperation::Trim(TrimParams {
            input_url: "https://example.com/v.mp4".to_string(),
            start: "00:00:01".to_string(),
            end: "00:00:02".to_string(),
            output_name: "out.mp4".to_string(),
        }))
    }

    #[tokio::test]
    async fn test_queue_delivers_in_order_until_acked() {
        let queue = MemoryQueue::new();
        let (a, b) = (job(), job());
        queue.enqueue(&WorkItem::for_job(&a)).await.unwrap();
        queue.enqueue(&WorkItem::for_job(&b)).await.unwrap();

        let first = queue.consume("c1", Duration::ZERO, 1).await.unwrap();
        assert_eq!(first[0].item.job_id, a.id);
        let second = queue.consume("c1", Duration::ZERO, 1).await.unwrap();
        assert_eq!(second[0].item.job_id, b.id);

        assert_eq!(queue.len().await.unwrap(), 2);
        queue.ack(&first[0].message_id).await.unwrap();
        queue.ack(&second[0].message_id).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_consume_times_out_when_empty() {
        let queue = MemoryQueue::new();
        let delivered = queue
            .consume("c1", Duration::from_millis(20), 10)
            .await
            .unwrap();
        assert!(delivered.is_empty());
    }

    #[tokio::test]
    async fn test_blocked_consumer_wakes_on_enqueue() {
        let queue = Arc::new(MemoryQueue::new());
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.consume("c1", Duration::from_secs(5), 1).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(&WorkItem::for_job(&job())).await.unwrap();

        let delivered = consumer.await.unwrap().unwrap();
        assert_eq!(delivered.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_items_are_dropped() {
        let queue = MemoryQueue::new();
        queue.push_raw("{garbage").await;
        let good = job();
        queue.enqueue(&WorkItem::for_job(&good)).await.unwrap();

        let delivered = queue.consume("c1", Duration::ZERO, 10).await.unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].item.job_id, good.id);
        assert_eq!(queue.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_unacked_items_are_reclaimed() {
        let queue = MemoryQueue::new();
        queue.enqueue(&WorkItem::for_job(&job())).await.unwrap();
        let delivered = queue.consume("crashed", Duration::ZERO, 1).await.unwrap();

        let not_yet = queue
            .claim_pending("live", Duration::from_secs(60), 10)
            .await
            .unwrap();
        assert!(not_yet.is_empty());

        let claimed = queue
            .claim_pending("live", Duration::ZERO, 10)
            .await
            .unwrap();
        assert_eq!(claimed, delivered);
        assert_eq!(queue.delivery_count(&claimed[0].message_id).await, Some(2));
    }

    #[tokio::test]
    async fn test_registry_lifecycle() {
        let registry = MemoryRegistry::new();
        let job = job();
        registry.create(&job).await.unwrap();

        let running = registry.start(&job.id).await.unwrap();
        assert_eq!(running.state, JobState::Running);
        assert_eq!(running.attempts, 1);

        let done = registry.finish(&job.id, "out.mp4").await.unwrap();
        assert_eq!(done.view().result.as_deref(), Some("out.mp4"));
    }

    #[tokio::test]
    async fn test_registry_terminal_states_are_sticky() {
        let registry = MemoryRegistry::new();
        let job = job();
        registry.create(&job).await.unwrap();
        registry.start(&job.id).await.unwrap();
        registry
            .fail(&job.id, JobFailure::new(FailureKind::Engine, "exit 1"))
            .await
            .unwrap();

        assert!(matches!(
            registry.start(&job.id).await,
            Err(QueueError::Transition(_))
        ));
        assert!(matches!(
            registry.finish(&job.id, "out.mp4").await,
            Err(QueueError::Transition(_))
        ));

        let stored = registry.get(&job.id).await.unwrap();
        assert_eq!(stored.state, JobState::Failed);
        assert_eq!(stored.view().error.as_deref(), Some("engine: exit 1"));
    }

    #[tokio::test]
    async fn test_registry_unknown_job() {
        let registry = MemoryRegistry::new();
        let id = JobId::new();
        assert!(matches!(
            registry.get(&id).await,
            Err(QueueError::JobNotFound(_))
        ));
        assert!(matches!(
            registry.start(&id).await,
            Err(QueueError::JobNotFound(_))
        ));
    }
}
