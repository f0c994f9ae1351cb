//! Work queue using Redis Streams.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::job::{decode_item, Delivery, WorkItem};

/// Stream field holding the serialized work item.
const ITEM_FIELD: &str = "item";

/// At-least-once delivery of work items to a group of consumers.
///
/// A delivered item stays pending until [`WorkQueue::ack`] is called for it.
/// Items pending longer than a consumer's idle threshold can be taken over
/// with [`WorkQueue::claim_pending`]. Malformed items are dropped on read.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Append an item, returning its message ID.
    async fn enqueue(&self, item: &WorkItem) -> QueueResult<String>;

    /// Read up to `count` new items, waiting at most `block` for the first.
    async fn consume(&self, consumer: &str, block: Duration, count: usize)
        -> QueueResult<Vec<Delivery>>;

    /// Acknowledge a delivered item so it is never redelivered.
    async fn ack(&self, message_id: &str) -> QueueResult<()>;

    /// Take over items left unacknowledged for at least `min_idle`.
    async fn claim_pending(
        &self,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>>;

    /// Number of items not yet acknowledged.
    async fn len(&self) -> QueueResult<u64>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> QueueResult<()>;
}

/// Redis Streams work queue.
pub struct RedisWorkQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl RedisWorkQueue {
    /// Create a new queue client.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    async fn conn(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        // Create consumer group (ignore error if already exists)
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Decode stream entries, acknowledging the malformed ones.
    /// XPENDING filtered server-side by idle time (Redis 6.2+), so fresh
    /// entries at the head of the list cannot hide stale ones behind them.
    fn stale_pending_cmd(&self, min_idle_ms: u64, count: usize) -> redis::Cmd {
        let mut cmd = redis::cmd("XPENDING");
        cmd.arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count);
        cmd
    }

    async fn decode_entries(&self, entries: Vec<redis::streams::StreamId>) -> Vec<Delivery> {
        let mut deliveries = Vec::with_capacity(entries.len());

        for entry in entries {
            let payload: Option<String> = entry.get(ITEM_FIELD);
            match decode_item(&entry.id, payload.as_deref()) {
                Some(item) => deliveries.push(Delivery {
                    message_id: entry.id,
                    item,
                }),
                None => {
                    // Drop so it is never redelivered
                    if let Err(e) = self.ack(&entry.id).await {
                        warn!("Failed to drop malformed item {}: {}", entry.id, e);
                    }
                }
            }
        }

        deliveries
    }
}

#[async_trait]
impl WorkQueue for RedisWorkQueue {
    async fn enqueue(&self, item: &WorkItem) -> QueueResult<String> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(item)?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg(ITEM_FIELD)
            .arg(&payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::enqueue_failed(e.to_string()))?;

        info!(
            "Enqueued job {} with message ID {}",
            item.job_id, message_id
        );

        Ok(message_id)
    }

    async fn consume(
        &self,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.conn().await?;

        // Nil reply on timeout
        let reply: Option<redis::streams::StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block.as_millis() as u64)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await?;

        let entries = reply
            .map(|r| r.keys.into_iter().flat_map(|k| k.ids).collect())
            .unwrap_or_default();

        let deliveries = self.decode_entries(entries).await;
        for d in &deliveries {
            debug!("Consumed job {} ({})", d.item.job_id, d.message_id);
        }
        Ok(deliveries)
    }

    async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        // Delete the message from the stream
        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged work item: {}", message_id);
        Ok(())
    }

    async fn claim_pending(
        &self,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.conn().await?;
        let min_idle_ms = min_idle.as_millis() as u64;

        let pending: redis::streams::StreamPendingCountReply = self
            .stale_pending_cmd(min_idle_ms, count)
            .query_async(&mut conn)
            .await?;

        let stale: Vec<String> = pending.ids.into_iter().map(|p| p.id).collect();

        if stale.is_empty() {
            return Ok(Vec::new());
        }

        // XCLAIM re-checks the idle time, so racing claimers get disjoint sets
        let claimed: redis::streams::StreamClaimReply = redis::cmd("XCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg(min_idle_ms)
            .arg(&stale)
            .query_async(&mut conn)
            .await?;

        let deliveries = self.decode_entries(claimed.ids).await;
        for d in &deliveries {
            info!("Claimed pending job {} ({})", d.item.job_id, d.message_id);
        }
        Ok(deliveries)
    }

    async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
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
    use vedit_models::{EditOperation, Job, TrimParams};

    fn item() -> WorkItem {
        WorkItem::for_job(&Job::new(EditOperation::Trim(TrimParams {
            input_url: "https://example.com/v.mp4".to_string(),
            start: "00:00:01".to_string(),
            end: "00:00:02".to_string(),
            output_name: "out.mp4".to_string(),
        })))
    }

    fn test_config() -> QueueConfig {
        QueueConfig {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            stream_name: format!("vedit:test:{}", unique_suffix()),
            consumer_group: "vedit:test-workers".to_string(),
            ..QueueConfig::default()
        }
    }

    fn unique_suffix() -> String {
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default().to_string()
    }

    #[test]
    fn test_pending_scan_filters_by_idle_time() {
        let queue = RedisWorkQueue::new(test_config()).unwrap();
        let packed = queue.stale_pending_cmd(3_900_000, 5).get_packed_command();
        let packed = String::from_utf8_lossy(&packed);

        let idle = packed.find("IDLE").expect("IDLE filter");
        let start = packed.find("\r\n-\r\n").expect("range start");
        assert!(idle < start, "IDLE must precede the range: {packed}");
        assert!(packed.contains("3900000"));
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_redis_fresh_entries_are_not_claimed() {
        let queue = RedisWorkQueue::new(test_config()).unwrap();
        queue.init().await.unwrap();
        queue.enqueue(&item()).await.unwrap();
        queue
            .consume("c1", Duration::from_millis(100), 10)
            .await
            .unwrap();

        let claimed = queue
            .claim_pending("c2", Duration::from_secs(60), 10)
            .await
            .unwrap();
        assert!(claimed.is_empty());
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_redis_round_trip() {
        let queue = RedisWorkQueue::new(test_config()).unwrap();
        queue.init().await.unwrap();

        let item = item();
        let id = queue.enqueue(&item).await.unwrap();

        let delivered = queue
            .consume("c1", Duration::from_millis(100), 10)
            .await
            .unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].message_id, id);
        assert_eq!(delivered[0].item, item);

        // Unacknowledged and idle: another consumer takes it over
        let claimed = queue
            .claim_pending("c2", Duration::ZERO, 10)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);

        queue.ack(&id).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_redis_consume_times_out_empty() {
        let queue = RedisWorkQueue::new(test_config()).unwrap();
        queue.init().await.unwrap();

        let delivered = queue
            .consume("c1", Duration::from_millis(50), 10)
            .await
            .unwrap();
        assert!(delivered.is_empty());
    }
}
