//! Core types for mint-reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Sentinel value written into every column of a row whose NFT could not be resolved
pub const ERROR_SENTINEL: &str = "Error";
/// Sentinel value for fields that have no meaningful value
pub const NOT_AVAILABLE: &str = "N/A";
/// Transaction id shown for NFTs that have not been minted on chain yet
pub const PENDING_TX: &str = "Pending";

/// Unique identifier for a report
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct ReportId(pub Uuid);

impl ReportId {
    /// Allocate a fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn get(&self) -> Uuid {
        self.0
    }
}

impl Default for ReportId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ReportId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ReportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl std::str::FromStr for ReportId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

// Stored as hyphenated TEXT so rows stay readable in the sqlite shell
impl sqlx::Type<sqlx::Sqlite> for ReportId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for ReportId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.to_string(), buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for ReportId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let text = <String as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(text.parse()?)
    }
}

/// Report lifecycle state
///
/// `queued → processing → completed | failed`. `finalizing` is only entered
/// by the per-batch dispatch mode while the artifact is being written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReportState {
    /// Accepted, waiting for a worker to pick up the trigger
    Queued,
    /// A worker is resolving batches
    Processing,
    /// All batches applied, the artifact is being written
    Finalizing,
    /// Artifact written, `csvPath` set
    Completed,
    /// Terminal failure, `error` set
    Failed,
}

impl ReportState {
    /// States that occupy the single-flight slot
    pub const ACTIVE: [ReportState; 3] = [
        ReportState::Queued,
        ReportState::Processing,
        ReportState::Finalizing,
    ];

    /// Persisted string form
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportState::Queued => "queued",
            ReportState::Processing => "processing",
            ReportState::Finalizing => "finalizing",
            ReportState::Completed => "completed",
            ReportState::Failed => "failed",
        }
    }

    /// Parse the persisted string form; unknown values are treated as failed
    pub fn parse(value: &str) -> Self {
        match value {
            "queued" => ReportState::Queued,
            "processing" => ReportState::Processing,
            "finalizing" => ReportState::Finalizing,
            "completed" => ReportState::Completed,
            _ => ReportState::Failed,
        }
    }

    /// Whether this state blocks a new report from being generated
    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    /// Whether the lifecycle has ended
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportState::Completed | ReportState::Failed)
    }
}

impl std::fmt::Display for ReportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One output row: a resolved transaction NFT
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CsvRecord {
    /// Field identifier from the NFT metadata (`id_long`, then `id`)
    #[serde(rename = "fieldID")]
    pub field_id: String,
    /// Upstream NFT uid
    #[serde(rename = "tokenID")]
    pub token_id: String,
    /// Mint transaction hash, or `Pending`
    #[serde(rename = "txID")]
    pub tx_id: String,
    /// Block explorer link for the mint transaction, or `N/A`
    #[serde(rename = "explorerURL")]
    pub explorer_url: String,
}

impl CsvRecord {
    /// Row standing in for an NFT that could not be resolved
    pub fn sentinel() -> Self {
        Self {
            field_id: ERROR_SENTINEL.to_string(),
            token_id: ERROR_SENTINEL.to_string(),
            tx_id: ERROR_SENTINEL.to_string(),
            explorer_url: NOT_AVAILABLE.to_string(),
        }
    }

    /// Whether this row is the unresolved-NFT sentinel
    pub fn is_sentinel(&self) -> bool {
        self.token_id == ERROR_SENTINEL && self.tx_id == ERROR_SENTINEL
    }
}

/// Failure detail stored on a failed report
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReportError {
    /// Human-readable message
    pub message: String,
    /// Machine-readable code (`UPSTREAM_API_ERROR`, `PROCESSING_ERROR`, `STALLED`, `ENQUEUE_ERROR`)
    pub code: String,
}

/// Full status record of a report, as returned to pollers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportStatus {
    /// Report id
    pub id: ReportId,
    /// Lifecycle state
    pub status: ReportState,
    /// When the report was requested
    pub created_at: DateTime<Utc>,
    /// Last write to the record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Completion percentage, 0 to 100
    pub progress: u32,
    /// NFTs resolved so far
    pub processed_nfts: u64,
    /// NFTs declared by the transaction listing
    pub total_nfts: u64,
    /// Rows accumulated so far, in processing order
    pub records: Vec<CsvRecord>,
    /// Artifact URL, only once completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_path: Option<String>,
    /// Failure detail, only once failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReportError>,
}

/// Status record without its rows, used for listings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    /// Report id
    pub id: ReportId,
    /// Lifecycle state
    pub status: ReportState,
    /// When the report was requested
    pub created_at: DateTime<Utc>,
    /// Last write to the record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Completion percentage, 0 to 100
    pub progress: u32,
    /// NFTs resolved so far
    pub processed_nfts: u64,
    /// NFTs declared by the transaction listing
    pub total_nfts: u64,
    /// Artifact URL, only once completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_path: Option<String>,
    /// Failure detail, only once failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReportError>,
}

/// Response to a successful `generate-report` call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReportResponse {
    /// Id of the queued report
    pub report_id: ReportId,
    /// Where to poll for its status
    pub status_url: String,
}

/// Event emitted during the report lifecycle
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Report accepted and trigger published
    Queued {
        /// Report ID
        id: ReportId,
    },

    /// A worker picked up the trigger and fetched the listing
    Started {
        /// Report ID
        id: ReportId,
        /// NFTs to resolve
        total_nfts: u64,
    },

    /// A checkpoint was persisted
    Progress {
        /// Report ID
        id: ReportId,
        /// Completion percentage
        progress: u32,
        /// NFTs resolved so far
        processed_nfts: u64,
        /// NFTs to resolve
        total_nfts: u64,
    },

    /// Artifact written
    Completed {
        /// Report ID
        id: ReportId,
        /// Artifact URL
        csv_path: String,
    },

    /// Report moved to `failed`
    Failed {
        /// Report ID
        id: ReportId,
        /// Failure detail as persisted
        error: ReportError,
    },

    /// Report and artifact removed
    Deleted {
        /// Report ID
        id: ReportId,
    },
}
