//! Error types for mint-reports
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (validation, busy, upstream, processing)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes
//! - Conversion of orchestration failures into the persisted `{message, code}` pair

use crate::types::{ReportError, ReportId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for mint-reports operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error code persisted when the upstream API keeps failing after all retries
pub const UPSTREAM_API_ERROR_CODE: &str = "UPSTREAM_API_ERROR";
/// Error code persisted for any other failure during a report run
pub const PROCESSING_ERROR_CODE: &str = "PROCESSING_ERROR";
/// Error code persisted by the watchdog for reports without forward progress
pub const STALLED_ERROR_CODE: &str = "STALLED";
/// Error code persisted when the trigger message could not be published
pub const ENQUEUE_ERROR_CODE: &str = "ENQUEUE_ERROR";

/// Main error type for mint-reports
///
/// Each variant includes contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "report.batch_size")
        key: Option<String>,
    },

    /// Bad caller input
    #[error("validation error: {message}")]
    Validation {
        /// What was wrong with the input
        message: String,
        /// The offending field, if any
        field: Option<String>,
    },

    /// Another report is already queued or processing
    #[error("a report is already being generated: {active}")]
    ReportAlreadyActive {
        /// The report currently holding the single-flight slot
        active: ReportId,
    },

    /// Report id does not exist
    #[error("report {0} not found")]
    ReportNotFound(ReportId),

    /// Report exists but has no downloadable artifact yet
    #[error("report {id} is not ready for download (status: {status})")]
    ReportNotReady {
        /// The report that was requested
        id: ReportId,
        /// Its current lifecycle state
        status: String,
    },

    /// The upstream minting API failed after exhausting retries
    #[error("upstream API error in {operation} after {attempts} attempts: {message}")]
    UpstreamApi {
        /// Name of the upstream operation (e.g. "nft_details")
        operation: String,
        /// Total attempts made, including the first one
        attempts: u32,
        /// HTTP status returned by the last attempt, if any
        status: Option<u16>,
        /// Message of the last failure
        message: String,
    },

    /// Any other failure while orchestrating a report run
    #[error("{0}")]
    Processing(String),

    /// A batch message arrived before its predecessor was applied
    #[error("batch {got} for report {report_id} arrived out of order (expected {expected})")]
    OutOfOrder {
        /// The report the batch belongs to
        report_id: ReportId,
        /// The batch index that must be applied next
        expected: i64,
        /// The batch index that was delivered
        got: i64,
    },

    /// Message channel error (undecodable envelope, publish failure)
    #[error("message channel error: {0}")]
    Channel(String),

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV encoding/decoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Shutdown in progress - not accepting new reports
    #[error("shutdown in progress: not accepting new reports")]
    ShuttingDown,
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

impl Error {
    /// Shorthand for a validation error on a named field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Convert an orchestration failure into the `{message, code}` pair stored on the report
    pub fn report_error(&self) -> ReportError {
        let code = match self {
            Error::UpstreamApi { .. } => UPSTREAM_API_ERROR_CODE,
            _ => PROCESSING_ERROR_CODE,
        };
        ReportError {
            message: self.to_string(),
            code: code.to_string(),
        }
    }
}

/// API error response format
///
/// Returned by API endpoints when an error occurs.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "report_already_active",
///     "message": "a report is already being generated: 6f1c...",
///     "details": { "active_report_id": "6f1c..." }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "report_not_found", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - Client error (invalid input)
            Error::Validation { .. } => 400,
            Error::Config { .. } => 400,

            // 404 Not Found
            Error::ReportNotFound(_) => 404,

            // 409 Conflict - single-flight slot taken or artifact not ready
            Error::ReportAlreadyActive { .. } => 409,
            Error::ReportNotReady { .. } => 409,
            Error::OutOfOrder { .. } => 409,

            // 422 Unprocessable Entity - report run failed
            Error::Processing(_) => 422,

            // 502 Bad Gateway - External service errors
            Error::UpstreamApi { .. } => 502,
            Error::Network(_) => 502,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,

            // 500 Internal Server Error - Server-side issues
            Error::Channel(_) => 500,
            Error::Database(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::Csv(_) => 500,
            Error::ApiServerError(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Validation { .. } => "validation_error",
            Error::ReportAlreadyActive { .. } => "report_already_active",
            Error::ReportNotFound(_) => "report_not_found",
            Error::ReportNotReady { .. } => "report_not_ready",
            Error::UpstreamApi { .. } => "upstream_api_error",
            Error::Processing(_) => "processing_error",
            Error::OutOfOrder { .. } => "out_of_order",
            Error::Channel(_) => "channel_error",
            Error::Database(_) => "database_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Csv(_) => "csv_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::ShuttingDown => "shutting_down",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Validation {
                field: Some(field), ..
            } => Some(serde_json::json!({
                "field": field,
            })),
            Error::ReportAlreadyActive { active } => Some(serde_json::json!({
                "active_report_id": active,
            })),
            Error::ReportNotFound(id) => Some(serde_json::json!({
                "report_id": id,
            })),
            Error::ReportNotReady { id, status } => Some(serde_json::json!({
                "report_id": id,
                "status": status,
            })),
            Error::UpstreamApi {
                operation,
                attempts,
                status,
                ..
            } => Some(serde_json::json!({
                "operation": operation,
                "attempts": attempts,
                "upstream_status": status,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
