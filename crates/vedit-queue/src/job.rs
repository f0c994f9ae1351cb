//! Work items carried by the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vedit_models::{EditKind, Job, JobId};

/// Reference to a registered job awaiting execution.
///
/// The registry holds the authoritative job record; the item only names it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub job_id: JobId,
    pub kind: EditKind,
    pub enqueued_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn for_job(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            kind: job.kind(),
            enqueued_at: Utc::now(),
        }
    }
}

/// A work item handed to one consumer, pending until acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Stream message ID, used to acknowledge
    pub message_id: String,
    pub item: WorkItem,
}

/// Decode a raw payload, returning `None` for malformed items.
pub(crate) fn decode_item(message_id: &str, payload: Option<&str>) -> Option<WorkItem> {
    let Some(payload) = payload else {
        tracing::warn!("Work item {} has no payload, dropping", message_id);
        return None;
    };
    match serde_json::from_str::<WorkItem>(payload) {
        Ok(item) => Some(item),
        Err(e) => {
            tracing::warn!("Failed to parse work item {}: {}, dropping", message_id, e);
            None
        }
    }
}
