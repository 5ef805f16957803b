//! Database layer for mint-reports
//!
//! Handles SQLite persistence for report status records, their accumulated
//! rows, and the durable message channel.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`]: database lifecycle, schema migrations
//! - [`reports`]: status store (single-flight insert, partial updates, checkpoints)
//! - [`messages`]: message channel storage (publish, claim, ack, dead-letter)

use crate::error::{DatabaseError, Error};
use crate::types::{
    CsvRecord, ReportError, ReportId, ReportState, ReportStatus, ReportSummary,
};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};

mod messages;
mod migrations;
mod reports;

/// Current time as unix milliseconds, the unit every timestamp column uses
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn query_failed(what: &str, e: sqlx::Error) -> Error {
    Error::Database(DatabaseError::QueryFailed(format!(
        "Failed to {}: {}",
        what, e
    )))
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

/// Report status row from database, without its records
#[derive(Debug, Clone, FromRow)]
pub struct ReportRow {
    /// Report id
    pub id: ReportId,
    /// Lifecycle state as persisted
    pub status: String,
    /// Unix ms when the report was requested
    pub created_at: i64,
    /// Unix ms of the last write
    pub updated_at: Option<i64>,
    /// Unix ms of the last checkpoint
    pub heartbeat_at: Option<i64>,
    /// Completion percentage
    pub progress: i64,
    /// NFTs resolved and persisted
    pub processed_nfts: i64,
    /// NFTs declared by the listing
    pub total_nfts: i64,
    /// Number of batches the listing was split into
    pub batch_count: i64,
    /// Index of the last batch whose rows are persisted (-1 before the first)
    pub last_applied_batch: i64,
    /// Artifact URL once completed
    pub csv_path: Option<String>,
    /// Failure message once failed
    pub error_message: Option<String>,
    /// Failure code once failed
    pub error_code: Option<String>,
}

impl ReportRow {
    /// Parsed lifecycle state
    pub fn state(&self) -> ReportState {
        ReportState::parse(&self.status)
    }

    fn error(&self) -> Option<ReportError> {
        match (&self.error_message, &self.error_code) {
            (Some(message), Some(code)) => Some(ReportError {
                message: message.clone(),
                code: code.clone(),
            }),
            _ => None,
        }
    }

    /// Convert into the listing form
    pub fn into_summary(self) -> ReportSummary {
        ReportSummary {
            id: self.id,
            status: self.state(),
            created_at: millis_to_datetime(self.created_at),
            updated_at: self.updated_at.map(millis_to_datetime),
            progress: self.progress.clamp(0, 100) as u32,
            processed_nfts: self.processed_nfts.max(0) as u64,
            total_nfts: self.total_nfts.max(0) as u64,
            error: self.error(),
            csv_path: self.csv_path,
        }
    }

    /// Convert into the full status record, attaching its rows
    pub fn into_status(self, records: Vec<CsvRecord>) -> ReportStatus {
        let summary = self.into_summary();
        ReportStatus {
            id: summary.id,
            status: summary.status,
            created_at: summary.created_at,
            updated_at: summary.updated_at,
            progress: summary.progress,
            processed_nfts: summary.processed_nfts,
            total_nfts: summary.total_nfts,
            records,
            csv_path: summary.csv_path,
            error: summary.error,
        }
    }
}

/// Partial update of a status record
///
/// Only fields set to `Some` are written; `updated_at` is always refreshed.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    /// New lifecycle state
    pub status: Option<ReportState>,
    /// New completion percentage
    pub progress: Option<u32>,
    /// New declared NFT total
    pub total_nfts: Option<i64>,
    /// New batch count
    pub batch_count: Option<i64>,
    /// Set (`Some(Some)`) or clear (`Some(None)`) the artifact URL
    pub csv_path: Option<Option<String>>,
    /// Set (`Some(Some)`) or clear (`Some(None)`) the failure detail
    pub error: Option<Option<ReportError>>,
    /// Also refresh `heartbeat_at`
    pub heartbeat: bool,
}

/// Rows of one or more consecutive batches, applied atomically
#[derive(Debug, Clone)]
pub struct Checkpoint {
    /// `last_applied_batch` the caller expects to find
    pub expected_last_batch: i64,
    /// `last_applied_batch` after this checkpoint
    pub new_last_batch: i64,
    /// Rows to append, in order
    pub records: Vec<CsvRecord>,
    /// Progress to persist (never lowers the stored value)
    pub progress: u32,
}

/// Result of [`Database::apply_checkpoint`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointOutcome {
    /// Rows appended and scalars updated
    Applied,
    /// The batches were already applied; nothing written
    AlreadyApplied,
    /// An earlier batch is still missing
    OutOfOrder {
        /// The batch index that must be applied next
        expected: i64,
    },
    /// The report is not in `processing` (deleted, failed, or finalizing)
    NotActive(Option<ReportState>),
}

/// Message row from the channel table
#[derive(Debug, Clone, FromRow)]
pub struct MessageRow {
    /// Sequence number
    pub id: i64,
    /// Messages sharing this key are delivered in publish order
    pub ordering_key: String,
    /// Key used to suppress duplicate publishes
    pub dedup_key: String,
    /// Serialized message
    pub body: String,
    /// Times this message has been handed to a consumer
    pub receive_count: i64,
    /// `pending`, `inflight`, `acked` or `dead`
    pub state: String,
    /// Unix ms when the message was published
    pub published_at: i64,
    /// Last failure reported by a consumer
    pub last_error: Option<String>,
}

/// Database handle for mint-reports
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
