//! Report creation with the single-flight guard.

use crate::channel::LifecycleMessage;
use crate::error::{ENQUEUE_ERROR_CODE, Error, Result};
use crate::types::{Event, GenerateReportResponse, ReportError, ReportId};

use super::ReportService;

/// Conditional inserts attempted before giving up on a contended slot
const ADMIT_ATTEMPTS: usize = 3;

impl ReportService {
    /// Queue a new report and publish its trigger
    ///
    /// Only one report may be queued, processing or finalizing at a time; a
    /// second request gets [`Error::ReportAlreadyActive`] naming the active one.
    /// If the trigger cannot be published the new report is failed with
    /// `ENQUEUE_ERROR` so it does not hold the slot.
    pub async fn generate_report(&self) -> Result<GenerateReportResponse> {
        if !self
            .accepting_new
            .load(std::sync::atomic::Ordering::SeqCst)
        {
            return Err(Error::ShuttingDown);
        }

        let id = self.admit_report().await?;

        if let Err(e) = self
            .channel
            .publish(&LifecycleMessage::Trigger { report_id: id })
            .await
        {
            tracing::error!(report_id = %id, error = %e, "Failed to publish report trigger");
            let error = ReportError {
                message: format!("Failed to enqueue report: {}", e),
                code: ENQUEUE_ERROR_CODE.to_string(),
            };
            match self.db.fail_report(id, &error).await {
                Ok(true) => self.emit_event(Event::Failed { id, error }),
                Ok(false) => {}
                Err(db_err) => {
                    tracing::error!(report_id = %id, error = %db_err, "Failed to release report slot")
                }
            }
            return Err(e);
        }

        tracing::info!(report_id = %id, "Report queued");
        self.emit_event(Event::Queued { id });

        Ok(GenerateReportResponse {
            report_id: id,
            status_url: self.status_url(id),
        })
    }

    /// Insert a queued report if no other report is active
    async fn admit_report(&self) -> Result<ReportId> {
        for _ in 0..ADMIT_ATTEMPTS {
            let id = ReportId::new();
            if self.db.insert_report_if_idle(id).await? {
                return Ok(id);
            }

            // The blocker may have finished between the two statements
            if let Some(active) = self.db.active_report().await? {
                tracing::info!(active_report_id = %active, "Report already in progress");
                return Err(Error::ReportAlreadyActive { active });
            }
        }

        Err(Error::Processing(
            "could not claim the report slot, try again".to_string(),
        ))
    }

    /// Where callers poll a report's status
    pub fn status_url(&self, id: ReportId) -> String {
        format!(
            "{}/{}",
            self.config.report.status_url_prefix.trim_end_matches('/'),
            id
        )
    }
}
