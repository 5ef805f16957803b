//! Report lifecycle state machine.
//!
//! `queued → processing → completed | failed`, with `finalizing` between
//! processing and completed when batches are dispatched as separate messages.
//! Every persisted step is a compare-and-swap on the status record, so a
//! message delivered twice never appends rows twice or resurrects a report
//! that already reached a terminal state.

use crate::artifacts::render_csv;
use crate::channel::LifecycleMessage;
use crate::config::DispatchMode;
use crate::db::{Checkpoint, CheckpointOutcome, ReportRow, StatusUpdate};
use crate::error::{Error, Result};
use crate::types::{CsvRecord, Event, ReportId, ReportState};
use crate::upstream::ProjectTransaction;

use super::ReportService;
use super::resolve::{nft_count, progress_percent};

/// Whether a batch run should go on to write the artifact
enum RunOutcome {
    /// Every batch is applied
    Finished,
    /// Another delivery or a terminal transition took over
    Superseded,
}

impl ReportService {
    /// Handle one lifecycle message
    ///
    /// Failures are recorded on the report (status `failed` with its error
    /// code) and then returned so the channel can apply its redelivery policy.
    /// Out-of-order batches and shutdown interruptions are returned without
    /// touching the report.
    pub async fn handle_message(&self, message: LifecycleMessage) -> Result<()> {
        let id = message.report_id();
        tracing::debug!(report_id = %id, kind = message.kind(), "Handling lifecycle message");

        let result = match message {
            LifecycleMessage::Trigger { .. } => self.handle_trigger(id).await,
            LifecycleMessage::Batch {
                batch_index,
                payload,
                ..
            } => self.handle_batch(id, batch_index, payload).await,
            LifecycleMessage::Finalize { .. } => self.handle_finalize(id).await,
        };

        if let Err(e) = &result
            && !matches!(e, Error::OutOfOrder { .. } | Error::ShuttingDown)
        {
            self.record_failure(id, e).await;
        }
        result
    }

    /// Persist `error` on an active report and announce it
    pub(crate) async fn record_failure(&self, id: ReportId, error: &Error) {
        let report_error = error.report_error();
        match self.db.fail_report(id, &report_error).await {
            Ok(true) => {
                tracing::error!(
                    report_id = %id,
                    code = %report_error.code,
                    error = %report_error.message,
                    "Report failed"
                );
                self.emit_event(Event::Failed {
                    id,
                    error: report_error,
                });
            }
            Ok(false) => {
                tracing::debug!(report_id = %id, error = %error, "Failure on inactive report not recorded");
            }
            Err(db_err) => {
                tracing::error!(
                    report_id = %id,
                    error = %db_err,
                    original_error = %error,
                    "Failed to record report failure"
                );
            }
        }
    }

    async fn handle_trigger(&self, id: ReportId) -> Result<()> {
        let Some(report) = self.db.get_report(id).await? else {
            tracing::debug!(report_id = %id, "Trigger for unknown report ignored");
            return Ok(());
        };

        match report.state() {
            ReportState::Queued => {}
            ReportState::Processing => {
                tracing::info!(
                    report_id = %id,
                    last_applied_batch = report.last_applied_batch,
                    "Resuming report after redelivered trigger"
                );
            }
            state => {
                tracing::debug!(report_id = %id, state = %state, "Trigger for settled report ignored");
                return Ok(());
            }
        }

        let transactions = self.upstream.list_transactions().await?;
        if transactions.is_empty() {
            return Err(Error::Processing(
                "No transactions available for report".to_string(),
            ));
        }

        let batch_size = self.config.report.batch_size.max(1);
        let batches: Vec<&[ProjectTransaction]> = transactions.chunks(batch_size).collect();
        let total_nfts = nft_count(&transactions);

        let starting = report.state() == ReportState::Queued;
        if starting
            && !self
                .db
                .transition_report(id, &[ReportState::Queued], ReportState::Processing)
                .await?
        {
            tracing::info!(report_id = %id, "Report left the queue before it started");
            return Ok(());
        }

        self.db
            .update_report(
                id,
                &StatusUpdate {
                    total_nfts: Some(total_nfts as i64),
                    batch_count: Some(batches.len() as i64),
                    heartbeat: true,
                    ..Default::default()
                },
            )
            .await?;

        if starting {
            tracing::info!(
                report_id = %id,
                transactions = transactions.len(),
                total_nfts,
                batches = batches.len(),
                "Report processing started"
            );
            self.emit_event(Event::Started { id, total_nfts });
        } else {
            tracing::info!(
                report_id = %id,
                resume_after = report.last_applied_batch,
                total_nfts,
                "Report processing resumed"
            );
        }

        let start = usize::try_from(report.last_applied_batch + 1).unwrap_or(0);

        match self.config.report.dispatch {
            DispatchMode::InProcess => {
                let outcome = self
                    .run_batches(id, &batches, start, &report, total_nfts)
                    .await?;
                match outcome {
                    RunOutcome::Finished => self.write_artifact_and_complete(id).await,
                    RunOutcome::Superseded => Ok(()),
                }
            }
            DispatchMode::PerBatch => self.dispatch_batches(id, &batches, start).await,
        }
    }

    /// Resolve batches from `start` on, checkpointing every `checkpoint_interval` NFTs
    async fn run_batches(
        &self,
        id: ReportId,
        batches: &[&[ProjectTransaction]],
        start: usize,
        report: &ReportRow,
        total_nfts: u64,
    ) -> Result<RunOutcome> {
        let interval = self.config.report.checkpoint_interval.max(1);
        let final_index = batches.len().saturating_sub(1);

        let mut processed = report.processed_nfts.max(0) as u64;
        let mut applied = start as i64 - 1;
        let mut buffered: Vec<CsvRecord> = Vec::new();

        for (index, batch) in batches.iter().enumerate().skip(start) {
            if self.shutdown.is_cancelled() {
                tracing::info!(report_id = %id, batch = index, "Shutdown requested, pausing report");
                return Err(Error::ShuttingDown);
            }

            let rows = self.resolve_batch(id, batch).await;
            let before = processed;
            processed += rows.len() as u64;
            buffered.extend(rows);

            let crossed_interval = before / interval != processed / interval;
            if !crossed_interval && index != final_index {
                continue;
            }

            let checkpoint = Checkpoint {
                expected_last_batch: applied,
                new_last_batch: index as i64,
                records: std::mem::take(&mut buffered),
                progress: progress_percent(processed, total_nfts),
            };

            match self.db.apply_checkpoint(id, &checkpoint).await? {
                CheckpointOutcome::Applied => {
                    applied = index as i64;
                    tracing::debug!(
                        report_id = %id,
                        batch = index,
                        processed_nfts = processed,
                        progress = checkpoint.progress,
                        "Checkpoint persisted"
                    );
                    self.emit_event(Event::Progress {
                        id,
                        progress: checkpoint.progress,
                        processed_nfts: processed,
                        total_nfts,
                    });
                }
                CheckpointOutcome::AlreadyApplied => {
                    tracing::info!(report_id = %id, batch = index, "Batches already applied by another delivery");
                    return Ok(RunOutcome::Superseded);
                }
                CheckpointOutcome::OutOfOrder { expected } => {
                    return Err(Error::OutOfOrder {
                        report_id: id,
                        expected,
                        got: applied + 1,
                    });
                }
                CheckpointOutcome::NotActive(state) => {
                    tracing::info!(report_id = %id, state = ?state, "Report no longer processing, stopping");
                    return Ok(RunOutcome::Superseded);
                }
            }
        }

        Ok(RunOutcome::Finished)
    }

    /// Publish one message per remaining batch, then the finalize message
    async fn dispatch_batches(
        &self,
        id: ReportId,
        batches: &[&[ProjectTransaction]],
        start: usize,
    ) -> Result<()> {
        for (index, batch) in batches.iter().enumerate().skip(start) {
            self.channel
                .publish(&LifecycleMessage::Batch {
                    report_id: id,
                    batch_index: index as i64,
                    payload: batch.to_vec(),
                })
                .await?;
        }
        self.channel
            .publish(&LifecycleMessage::Finalize { report_id: id })
            .await?;

        tracing::info!(
            report_id = %id,
            published = batches.len().saturating_sub(start),
            "Batch messages published"
        );
        Ok(())
    }

    async fn handle_batch(
        &self,
        id: ReportId,
        index: i64,
        payload: Vec<ProjectTransaction>,
    ) -> Result<()> {
        let Some(report) = self.db.get_report(id).await? else {
            tracing::debug!(report_id = %id, batch = index, "Batch for unknown report ignored");
            return Ok(());
        };
        if report.state() != ReportState::Processing {
            tracing::debug!(report_id = %id, batch = index, state = %report.state(), "Batch for inactive report ignored");
            return Ok(());
        }
        if index <= report.last_applied_batch {
            tracing::debug!(report_id = %id, batch = index, "Duplicate batch ignored");
            return Ok(());
        }
        if index != report.last_applied_batch + 1 {
            return Err(Error::OutOfOrder {
                report_id: id,
                expected: report.last_applied_batch + 1,
                got: index,
            });
        }

        let rows = self.resolve_batch(id, &payload).await;
        let processed = report.processed_nfts.max(0) as u64 + rows.len() as u64;
        let total_nfts = report.total_nfts.max(0) as u64;
        let progress = progress_percent(processed, total_nfts);

        let checkpoint = Checkpoint {
            expected_last_batch: index - 1,
            new_last_batch: index,
            records: rows,
            progress,
        };

        match self.db.apply_checkpoint(id, &checkpoint).await? {
            CheckpointOutcome::Applied => {
                self.emit_event(Event::Progress {
                    id,
                    progress,
                    processed_nfts: processed,
                    total_nfts,
                });
                Ok(())
            }
            CheckpointOutcome::AlreadyApplied | CheckpointOutcome::NotActive(_) => {
                tracing::debug!(report_id = %id, batch = index, "Batch superseded while resolving");
                Ok(())
            }
            CheckpointOutcome::OutOfOrder { expected } => Err(Error::OutOfOrder {
                report_id: id,
                expected,
                got: index,
            }),
        }
    }

    async fn handle_finalize(&self, id: ReportId) -> Result<()> {
        let Some(report) = self.db.get_report(id).await? else {
            tracing::debug!(report_id = %id, "Finalize for unknown report ignored");
            return Ok(());
        };

        let state = report.state();
        if state.is_terminal() {
            tracing::debug!(report_id = %id, state = %state, "Finalize for settled report ignored");
            return Ok(());
        }
        if state == ReportState::Processing && report.last_applied_batch < report.batch_count - 1 {
            return Err(Error::OutOfOrder {
                report_id: id,
                expected: report.last_applied_batch + 1,
                got: report.batch_count,
            });
        }

        if !self.db.claim_for_finalize(id).await? {
            tracing::debug!(report_id = %id, state = %state, "Report not claimable for finalize");
            return Ok(());
        }

        self.write_artifact_and_complete(id).await
    }

    /// Render the accumulated rows, store the CSV and mark the report completed
    async fn write_artifact_and_complete(&self, id: ReportId) -> Result<()> {
        let records = self.db.get_report_records(id).await?;
        let bytes = render_csv(&records)?;
        let url = self.artifacts.put_csv(id, bytes).await?;

        if !self.db.complete_report(id, &url).await? {
            let state = self.db.get_report(id).await?.map(|r| r.state());
            if state != Some(ReportState::Completed) {
                tracing::warn!(report_id = %id, state = ?state, "Report left the active states, discarding artifact");
                if let Err(e) = self.artifacts.delete(id).await {
                    tracing::warn!(report_id = %id, error = %e, "Failed to discard artifact");
                }
            }
            return Ok(());
        }

        tracing::info!(report_id = %id, rows = records.len(), csv_path = %url, "Report completed");
        self.emit_event(Event::Completed { id, csv_path: url });
        Ok(())
    }
}
