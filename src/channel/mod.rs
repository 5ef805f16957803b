//! Durable message channel between the enqueuer and the report orchestrator
//!
//! Messages for one report share an ordering key (the report id) and are
//! delivered in publish order. Each message carries a dedup key so a repeated
//! publish inside the dedup window is dropped. A received message stays
//! invisible for the visibility timeout; if it is neither acknowledged nor
//! released in that time it is delivered again.

use crate::error::{Error, Result};
use crate::types::ReportId;
use crate::upstream::ProjectTransaction;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

mod sqlite;

pub use sqlite::SqliteChannel;

/// Message driving a report through its lifecycle
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LifecycleMessage {
    /// Start (or resume) a queued report
    Trigger {
        /// Report to run
        #[serde(rename = "reportId")]
        report_id: ReportId,
    },
    /// One slice of the transaction listing
    Batch {
        /// Report the slice belongs to
        #[serde(rename = "reportId")]
        report_id: ReportId,
        /// Zero-based slice index
        #[serde(rename = "batchIndex")]
        batch_index: i64,
        /// Transactions of the slice
        payload: Vec<ProjectTransaction>,
    },
    /// Every slice has been published; write the artifact
    Finalize {
        /// Report to finalize
        #[serde(rename = "reportId")]
        report_id: ReportId,
    },
}

impl LifecycleMessage {
    /// Report the message refers to
    pub fn report_id(&self) -> ReportId {
        match self {
            LifecycleMessage::Trigger { report_id }
            | LifecycleMessage::Batch { report_id, .. }
            | LifecycleMessage::Finalize { report_id } => *report_id,
        }
    }

    /// Messages with the same key are delivered in order
    pub fn ordering_key(&self) -> String {
        self.report_id().to_string()
    }

    /// Key used to drop repeated publishes of the same message
    pub fn dedup_key(&self) -> String {
        match self {
            LifecycleMessage::Trigger { report_id } => format!("{}-trigger", report_id),
            LifecycleMessage::Batch {
                report_id,
                batch_index,
                ..
            } => format!("{}-batch-{}", report_id, batch_index),
            LifecycleMessage::Finalize { report_id } => format!("{}-finalize", report_id),
        }
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleMessage::Trigger { .. } => "trigger",
            LifecycleMessage::Batch { .. } => "batch",
            LifecycleMessage::Finalize { .. } => "finalize",
        }
    }
}

/// A received message, not yet decoded
#[derive(Clone, Debug)]
pub struct Envelope {
    /// Channel-assigned message id
    pub id: i64,
    /// Serialized [`LifecycleMessage`]
    pub body: String,
    /// Number of deliveries including this one
    pub receive_count: u32,
    /// Ordering key the message was published with
    pub ordering_key: String,
    /// Dedup key the message was published with
    pub dedup_key: String,
}

impl Envelope {
    /// Decode the body
    pub fn decode(&self) -> Result<LifecycleMessage> {
        serde_json::from_str(&self.body).map_err(|e| {
            Error::Channel(format!("cannot decode message {}: {}", self.id, e))
        })
    }
}

/// Outcome of [`MessageChannel::publish`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Stored under the given message id
    Published(i64),
    /// Dropped: the dedup key was already published within the window
    Deduplicated,
}

/// Dead-lettered message kept for inspection
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    /// Channel-assigned message id
    pub id: i64,
    /// Ordering key (report id)
    pub ordering_key: String,
    /// Dedup key
    pub dedup_key: String,
    /// Deliveries before the message was given up on
    pub receive_count: u32,
    /// Last failure reported by a consumer
    pub reason: Option<String>,
}

/// Durable, ordered, at-least-once message channel
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Publish a message
    async fn publish(&self, message: &LifecycleMessage) -> Result<PublishOutcome>;

    /// Take the next deliverable message, hiding it for `visibility_timeout`
    async fn receive(&self, visibility_timeout: Duration) -> Result<Option<Envelope>>;

    /// The message was handled; never deliver it again
    async fn ack(&self, envelope: &Envelope) -> Result<()>;

    /// Handling failed; make the message deliverable again after `delay`
    async fn release(&self, envelope: &Envelope, delay: Duration, reason: &str) -> Result<()>;

    /// Give up on the message
    async fn dead_letter(&self, envelope: &Envelope, reason: &str) -> Result<()>;

    /// Drop every message published for a report, returning how many were removed
    async fn purge_report(&self, id: ReportId) -> Result<u64>;

    /// Messages that were given up on
    async fn dead_letters(&self) -> Result<Vec<DeadLetter>>;
}
