//! Startup and shutdown coordination.

use crate::error::Result;

use super::ReportService;

impl ReportService {
    /// Start the worker and, when enabled, the watchdog
    pub fn start(&self) -> Vec<tokio::task::JoinHandle<()>> {
        vec![self.start_worker(), self.start_watchdog()]
    }

    /// Whether [`ReportService::shutdown`] has been called
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Gracefully shut down the service
    ///
    /// New reports are refused from here on. The worker stops taking
    /// messages; a report run in progress stops before its next batch and its
    /// trigger is released, so the next start resumes from the last checkpoint.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.accepting_new
            .store(false, std::sync::atomic::Ordering::SeqCst);
        tracing::info!("Stopped accepting new reports");

        self.shutdown.cancel();

        let active = self.db.count_active_reports().await?;
        if active > 0 {
            tracing::info!(active, "Active report will resume on next start");
        }

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }
}
