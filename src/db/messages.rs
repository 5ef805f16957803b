//! Message channel storage.
//!
//! Messages move `pending → inflight → acked`, or to `dead` once a consumer
//! gives up on them. An in-flight message whose visibility deadline passed is
//! eligible for delivery again.

use crate::Result;

use super::{Database, MessageRow, now_millis, query_failed};

impl Database {
    /// Store a message unless the same dedup key was published within `dedup_window_ms`
    ///
    /// Returns the new message id, or `None` when the publish was suppressed.
    /// Acked messages that fell out of the window are pruned first.
    pub async fn insert_message(
        &self,
        ordering_key: &str,
        dedup_key: &str,
        body: &str,
        dedup_window_ms: i64,
    ) -> Result<Option<i64>> {
        self.prune_acked_messages(dedup_window_ms).await?;

        let now = now_millis();

        let result = sqlx::query(
            r#"
            INSERT INTO messages (ordering_key, dedup_key, body, state, visible_at, published_at)
            SELECT ?, ?, ?, 'pending', ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM messages WHERE dedup_key = ? AND published_at > ?
            )
            "#,
        )
        .bind(ordering_key)
        .bind(dedup_key)
        .bind(body)
        .bind(now)
        .bind(now)
        .bind(dedup_key)
        .bind(now - dedup_window_ms)
        .execute(&self.pool)
        .await
        .map_err(|e| query_failed("insert message", e))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(result.last_insert_rowid()))
    }

    /// Claim the next deliverable message and hide it for `visibility_ms`
    ///
    /// A message is deliverable when it is visible and no earlier message with
    /// the same ordering key is still pending or in flight.
    pub async fn claim_next_message(&self, visibility_ms: i64) -> Result<Option<MessageRow>> {
        let now = now_millis();

        sqlx::query_as::<_, MessageRow>(
            r#"
            UPDATE messages
            SET state = 'inflight',
                receive_count = receive_count + 1,
                visible_at = ?
            WHERE id = (
                SELECT m.id FROM messages m
                WHERE m.state IN ('pending', 'inflight')
                  AND m.visible_at <= ?
                  AND NOT EXISTS (
                      SELECT 1 FROM messages earlier
                      WHERE earlier.ordering_key = m.ordering_key
                        AND earlier.id < m.id
                        AND earlier.state IN ('pending', 'inflight')
                  )
                ORDER BY m.id ASC
                LIMIT 1
            )
            RETURNING id, ordering_key, dedup_key, body, receive_count, state,
                      published_at, last_error
            "#,
        )
        .bind(now + visibility_ms)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_failed("claim message", e))
    }

    /// Mark a delivered message as processed
    pub async fn ack_message(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE messages SET state = 'acked' WHERE id = ? AND state = 'inflight'")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| query_failed("ack message", e))?;
        Ok(())
    }

    /// Delete acked messages published more than `older_than_ms` ago
    ///
    /// Dead and outstanding messages are never pruned.
    pub async fn prune_acked_messages(&self, older_than_ms: i64) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM messages WHERE state = 'acked' AND published_at <= ?")
                .bind(now_millis() - older_than_ms)
                .execute(&self.pool)
                .await
                .map_err(|e| query_failed("prune acked messages", e))?;
        Ok(result.rows_affected())
    }

    /// Return a delivered message to the queue after `delay_ms`
    pub async fn release_message(&self, id: i64, delay_ms: i64, reason: &str) -> Result<()> {
        let now = now_millis();

        sqlx::query(
            r#"
            UPDATE messages
            SET state = 'pending', visible_at = ?, last_error = ?
            WHERE id = ? AND state = 'inflight'
            "#,
        )
        .bind(now + delay_ms)
        .bind(reason)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| query_failed("release message", e))?;
        Ok(())
    }

    /// Park a message that will not be delivered again
    pub async fn dead_letter_message(&self, id: i64, reason: &str) -> Result<()> {
        sqlx::query("UPDATE messages SET state = 'dead', last_error = ? WHERE id = ?")
            .bind(reason)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| query_failed("dead-letter message", e))?;
        Ok(())
    }

    /// Remove every message sharing an ordering key; returns how many were removed
    pub async fn purge_messages(&self, ordering_key: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE ordering_key = ?")
            .bind(ordering_key)
            .execute(&self.pool)
            .await
            .map_err(|e| query_failed("purge messages", e))?;
        Ok(result.rows_affected())
    }

    /// Messages in the dead-letter state, oldest first
    pub async fn list_dead_messages(&self) -> Result<Vec<MessageRow>> {
        sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, ordering_key, dedup_key, body, receive_count, state,
                   published_at, last_error
            FROM messages
            WHERE state = 'dead'
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_failed("list dead messages", e))
    }

    /// Messages not yet acked or dead-lettered
    pub async fn count_outstanding_messages(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE state IN ('pending', 'inflight')")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| query_failed("count outstanding messages", e))
    }
}
