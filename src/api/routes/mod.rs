//! Route handlers for the REST API
//!
//! - [`reports`]: generate, poll, download and delete reports
//! - [`system`]: health, events, OpenAPI

use crate::Result;
use crate::error::Error;
use crate::types::{ReportId, ReportState};
use serde::{Deserialize, Serialize};

mod reports;
mod system;

pub use reports::*;
pub use system::*;

/// Query parameters for GET /reports
#[derive(Debug, Default, Deserialize, Serialize, utoipa::IntoParams, utoipa::ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ListReportsQuery {
    /// Comma separated states to keep, or `active` for every in-flight state
    pub status: Option<String>,
}

impl ListReportsQuery {
    /// States to filter on, `None` when every report is wanted
    pub fn states(&self) -> Result<Option<Vec<ReportState>>> {
        let Some(raw) = self.status.as_deref().map(str::trim) else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }
        if raw.eq_ignore_ascii_case("active") {
            return Ok(Some(ReportState::ACTIVE.to_vec()));
        }

        raw.split(',')
            .map(|part| match part.trim().to_ascii_lowercase().as_str() {
                "queued" => Ok(ReportState::Queued),
                "processing" => Ok(ReportState::Processing),
                "finalizing" => Ok(ReportState::Finalizing),
                "completed" => Ok(ReportState::Completed),
                "failed" => Ok(ReportState::Failed),
                other => Err(Error::validation(
                    "status",
                    format!("unknown report state '{}'", other),
                )),
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}

/// Response for GET /report-download/:id/csv
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct DownloadResponse {
    /// Artifact URL the client is redirected to
    pub url: String,
}

/// Response for DELETE /report/:id
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct DeleteResponse {
    /// Always true; deleting an unknown report also succeeds
    pub deleted: bool,
}

/// Parse a report id from a path segment
pub(crate) fn parse_report_id(raw: &str) -> Result<ReportId> {
    raw.parse()
        .map_err(|_| Error::validation("id", format!("'{}' is not a valid report id", raw)))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn query(status: Option<&str>) -> ListReportsQuery {
        ListReportsQuery {
            status: status.map(str::to_string),
        }
    }

    #[test]
    fn test_status_filter_parsing() {
        assert_eq!(query(None).states().unwrap(), None);
        assert_eq!(query(Some(" ")).states().unwrap(), None);
        assert_eq!(
            query(Some("ACTIVE")).states().unwrap(),
            Some(ReportState::ACTIVE.to_vec())
        );
        assert_eq!(
            query(Some("completed, failed")).states().unwrap(),
            Some(vec![ReportState::Completed, ReportState::Failed])
        );
        assert!(matches!(
            query(Some("done")).states(),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_report_id_parsing() {
        let id = ReportId::new();
        assert_eq!(parse_report_id(&id.to_string()).unwrap(), id);
        assert!(matches!(
            parse_report_id("not-a-uuid"),
            Err(Error::Validation { field: Some(field), .. }) if field == "id"
        ));
    }
}
