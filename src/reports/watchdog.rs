//! Stalled report detection.

use crate::db::now_millis;
use crate::error::{Result, STALLED_ERROR_CODE};
use crate::types::{Event, ReportError, ReportId};

use super::ReportService;

impl ReportService {
    /// Start the watchdog task
    ///
    /// Every `watchdog.scan_interval` fails active reports whose last
    /// checkpoint (or last update, for reports that never started) is older
    /// than `watchdog.stale_threshold`. Returns a no-op task when disabled.
    pub fn start_watchdog(&self) -> tokio::task::JoinHandle<()> {
        let watchdog = self.config.watchdog.clone();

        if !watchdog.enabled {
            tracing::info!("Watchdog disabled, skipping stalled report detection");
            return tokio::spawn(async {});
        }

        let service = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(watchdog.scan_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = service.shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = service.reap_stalled_reports().await {
                            tracing::error!(error = %e, "Watchdog scan failed");
                        }
                    }
                }
            }
            tracing::debug!("Watchdog stopped");
        })
    }

    /// Fail every active report with no progress within the stale threshold
    ///
    /// Returns the ids of the reports that were failed.
    pub async fn reap_stalled_reports(&self) -> Result<Vec<ReportId>> {
        let threshold = self.config.watchdog.stale_threshold;
        let cutoff = now_millis() - i64::try_from(threshold.as_millis()).unwrap_or(i64::MAX);
        let error = ReportError {
            message: format!(
                "Report made no progress for {} seconds",
                threshold.as_secs()
            ),
            code: STALLED_ERROR_CODE.to_string(),
        };

        let reaped = self.db.fail_stale_reports(cutoff, &error).await?;
        for id in &reaped {
            tracing::warn!(report_id = %id, "Stalled report failed");
            self.emit_event(Event::Failed {
                id: *id,
                error: error.clone(),
            });
        }
        Ok(reaped)
    }
}
