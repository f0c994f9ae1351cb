//! Job executor.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};

use vedit_queue::{Delivery, JobRegistry, QueueError, WorkQueue};

use crate::logging::JobLogger;
use crate::pipeline::{run_pipeline, PipelineContext};

/// What happened to one delivered work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Pipeline succeeded and the job was recorded as finished
    Finished,
    /// Pipeline failed and the failure was recorded
    Failed,
    /// Item acknowledged without running (job already terminal or unknown)
    Skipped,
    /// Registry unavailable; item left pending for redelivery
    Deferred,
}

/// Executor that runs jobs from the queue one at a time.
pub struct JobExecutor {
    ctx: Arc<PipelineContext>,
    queue: Arc<dyn WorkQueue>,
    registry: Arc<dyn JobRegistry>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(
        ctx: Arc<PipelineContext>,
        queue: Arc<dyn WorkQueue>,
        registry: Arc<dyn JobRegistry>,
        consumer_name: impl Into<String>,
    ) -> Self {
        Self {
            ctx,
            queue,
            registry,
            consumer_name: consumer_name.into(),
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Consume and execute until `shutdown` flips to true.
    ///
    /// A job already running when shutdown is signalled is finished first.
    /// Pending items are claimed between consume calls, never while a read is
    /// in flight. Shutdown is noticed within one block period.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting job executor '{}'", self.consumer_name);

        let config = &self.ctx.config;
        let mut next_claim = tokio::time::Instant::now();

        loop {
            if *shutdown.borrow() || shutdown.has_changed().is_err() {
                info!("Shutdown signal received, stopping executor '{}'", self.consumer_name);
                break;
            }

            if tokio::time::Instant::now() >= next_claim {
                self.claim_pending().await;
                next_claim = tokio::time::Instant::now() + config.claim_interval;
            }

            match self.queue.consume(&self.consumer_name, config.block, 1).await {
                Ok(deliveries) => {
                    for delivery in deliveries {
                        self.process_delivery(delivery).await;
                    }
                }
                Err(e) => {
                    error!("Error consuming jobs: {}", e);
                    // Back off on error
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(std::time::Duration::from_secs(5)) => {}
                    }
                }
            }
        }

        info!("Job executor '{}' stopped", self.consumer_name);
    }

    /// Take over items abandoned by crashed consumers and run them.
    pub async fn claim_pending(&self) -> usize {
        let claimed = match self
            .queue
            .claim_pending(&self.consumer_name, self.ctx.config.claim_min_idle, 5)
            .await
        {
            Ok(claimed) => claimed,
            Err(e) => {
                warn!("Failed to claim pending jobs: {}", e);
                return 0;
            }
        };

        let count = claimed.len();
        if count > 0 {
            info!("Claimed {} pending jobs", count);
        }
        for delivery in claimed {
            self.process_delivery(delivery).await;
        }
        count
    }

    /// Execute one delivered item and settle it with the queue.
    ///
    /// The item is acknowledged only once the terminal state is stored, so a
    /// crash anywhere before that leads to redelivery and a fresh run.
    pub async fn process_delivery(&self, delivery: Delivery) -> DeliveryOutcome {
        let Delivery { message_id, item } = delivery;

        let job = match self.registry.get(&item.job_id).await {
            Ok(job) => job,
            Err(QueueError::JobNotFound(_)) => {
                warn!("Work item {} names unknown job {}, dropping", message_id, item.job_id);
                self.ack(&message_id).await;
                return DeliveryOutcome::Skipped;
            }
            Err(e) => {
                error!("Failed to load job {}: {}", item.job_id, e);
                return DeliveryOutcome::Deferred;
            }
        };

        if job.state.is_terminal() {
            info!("Job {} already {}, acknowledging redelivery", job.id, job.state);
            self.ack(&message_id).await;
            return DeliveryOutcome::Skipped;
        }

        let job = match self.registry.start(&job.id).await {
            Ok(job) => job,
            Err(QueueError::Transition(e)) => {
                // Finished by another consumer in the meantime
                info!("Job {} not runnable ({}), acknowledging", job.id, e);
                self.ack(&message_id).await;
                return DeliveryOutcome::Skipped;
            }
            Err(e) => {
                error!("Failed to mark job {} running: {}", job.id, e);
                return DeliveryOutcome::Deferred;
            }
        };

        let kind = job.kind().as_str();
        let logger = JobLogger::new(&job.id, job.kind());
        logger.log_start(&format!("attempt {} via {}", job.attempts, self.consumer_name));
        counter!("vedit_jobs_started_total", "kind" => kind).increment(1);

        let started = Instant::now();
        let result = run_pipeline(&self.ctx, &job, &logger)
            .instrument(logger.create_span())
            .await;
        histogram!("vedit_job_duration_seconds", "kind" => kind)
            .record(started.elapsed().as_secs_f64());

        let (recorded, outcome) = match result {
            Ok(output_name) => {
                counter!("vedit_jobs_finished_total", "kind" => kind).increment(1);
                (
                    self.registry.finish(&job.id, &output_name).await,
                    DeliveryOutcome::Finished,
                )
            }
            Err(e) => {
                let failure = e.to_failure();
                counter!("vedit_jobs_failed_total", "kind" => kind, "reason" => failure.kind.as_str())
                    .increment(1);
                (
                    self.registry.fail(&job.id, failure).await,
                    DeliveryOutcome::Failed,
                )
            }
        };

        match recorded {
            Ok(job) => {
                debug!("Job {} recorded as {}", job.id, job.state);
                self.ack(&message_id).await;
                outcome
            }
            Err(e) => {
                error!(
                    "Failed to record result of job {}: {}; leaving for redelivery",
                    job.id, e
                );
                DeliveryOutcome::Deferred
            }
        }
    }

    async fn ack(&self, message_id: &str) {
        if let Err(e) = self.queue.ack(message_id).await {
            error!("Failed to ack work item {}: {}", message_id, e);
        }
    }
}
