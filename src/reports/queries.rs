//! Status reads, artifact lookup and deletion.

use crate::channel::DeadLetter;
use crate::error::{Error, Result};
use crate::types::{Event, ReportId, ReportState, ReportStatus, ReportSummary};

use super::ReportService;

impl ReportService {
    /// Full status record, including every row accumulated so far
    pub async fn get_report_status(&self, id: ReportId) -> Result<ReportStatus> {
        let (report, records) = self
            .db
            .get_report_with_records(id)
            .await?
            .ok_or(Error::ReportNotFound(id))?;
        Ok(report.into_status(records))
    }

    /// Every report, newest first, without rows
    pub async fn list_reports(&self) -> Result<Vec<ReportSummary>> {
        Ok(self
            .db
            .list_reports()
            .await?
            .into_iter()
            .map(|row| row.into_summary())
            .collect())
    }

    /// Reports in any of `states`, newest first
    pub async fn list_reports_by_status(&self, states: &[ReportState]) -> Result<Vec<ReportSummary>> {
        Ok(self
            .db
            .list_reports_by_status(states)
            .await?
            .into_iter()
            .map(|row| row.into_summary())
            .collect())
    }

    /// Artifact URL of a completed report
    pub async fn report_download_url(&self, id: ReportId) -> Result<String> {
        let report = self
            .db
            .get_report(id)
            .await?
            .ok_or(Error::ReportNotFound(id))?;

        let state = report.state();
        match (state, report.csv_path) {
            (ReportState::Completed, Some(path)) => Ok(path),
            _ => Err(Error::ReportNotReady {
                id,
                status: state.as_str().to_string(),
            }),
        }
    }

    /// Delete a report with its rows, artifact and pending messages
    ///
    /// Deleting an unknown id succeeds. Only the status-record delete can fail
    /// the call, and it runs first so a failure leaves the artifact in place.
    /// Artifact and message cleanup failures are logged.
    pub async fn delete_report(&self, id: ReportId) -> Result<()> {
        let existed = self.db.delete_report(id).await?;

        if let Err(e) = self.artifacts.delete(id).await {
            tracing::warn!(report_id = %id, error = %e, "Failed to delete report artifact");
        }

        match self.channel.purge_report(id).await {
            Ok(0) => {}
            Ok(purged) => tracing::debug!(report_id = %id, purged, "Purged report messages"),
            Err(e) => tracing::warn!(report_id = %id, error = %e, "Failed to purge report messages"),
        }

        if existed {
            tracing::info!(report_id = %id, "Report deleted");
            self.emit_event(Event::Deleted { id });
        }
        Ok(())
    }

    /// Messages the worker gave up on
    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        self.channel.dead_letters().await
    }
}
