//! [`MessageChannel`] stored in the service database

use super::{DeadLetter, Envelope, LifecycleMessage, MessageChannel, PublishOutcome};
use crate::db::{Database, MessageRow};
use crate::error::Result;
use crate::types::ReportId;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Message channel backed by the `messages` table
#[derive(Clone)]
pub struct SqliteChannel {
    db: Arc<Database>,
    dedup_window: Duration,
}

impl SqliteChannel {
    /// Channel on `db` that drops repeated dedup keys within `dedup_window`
    pub fn new(db: Arc<Database>, dedup_window: Duration) -> Self {
        Self { db, dedup_window }
    }
}

impl From<MessageRow> for Envelope {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            body: row.body,
            receive_count: u32::try_from(row.receive_count).unwrap_or(u32::MAX),
            ordering_key: row.ordering_key,
            dedup_key: row.dedup_key,
        }
    }
}

#[async_trait]
impl MessageChannel for SqliteChannel {
    async fn publish(&self, message: &LifecycleMessage) -> Result<PublishOutcome> {
        let body = serde_json::to_string(message)?;
        let dedup_key = message.dedup_key();

        let outcome = match self
            .db
            .insert_message(
                &message.ordering_key(),
                &dedup_key,
                &body,
                millis(self.dedup_window),
            )
            .await?
        {
            Some(id) => PublishOutcome::Published(id),
            None => {
                tracing::debug!(dedup_key = %dedup_key, "Duplicate publish dropped");
                PublishOutcome::Deduplicated
            }
        };

        Ok(outcome)
    }

    async fn receive(&self, visibility_timeout: Duration) -> Result<Option<Envelope>> {
        Ok(self
            .db
            .claim_next_message(millis(visibility_timeout))
            .await?
            .map(Envelope::from))
    }

    async fn ack(&self, envelope: &Envelope) -> Result<()> {
        self.db.ack_message(envelope.id).await
    }

    async fn release(&self, envelope: &Envelope, delay: Duration, reason: &str) -> Result<()> {
        self.db
            .release_message(envelope.id, millis(delay), reason)
            .await
    }

    async fn dead_letter(&self, envelope: &Envelope, reason: &str) -> Result<()> {
        tracing::warn!(
            message_id = envelope.id,
            dedup_key = %envelope.dedup_key,
            receive_count = envelope.receive_count,
            reason,
            "Message dead-lettered"
        );
        self.db.dead_letter_message(envelope.id, reason).await
    }

    async fn purge_report(&self, id: ReportId) -> Result<u64> {
        self.db.purge_messages(&id.to_string()).await
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        Ok(self
            .db
            .list_dead_messages()
            .await?
            .into_iter()
            .map(|row| DeadLetter {
                id: row.id,
                ordering_key: row.ordering_key,
                dedup_key: row.dedup_key,
                receive_count: u32::try_from(row.receive_count).unwrap_or(u32::MAX),
                reason: row.last_error,
            })
            .collect())
    }
}
