//! Status store: report records and their accumulated rows.

use crate::Result;
use crate::types::{CsvRecord, ReportError, ReportId, ReportState};
use sqlx::{QueryBuilder, Sqlite};

use super::{
    Checkpoint, CheckpointOutcome, Database, ReportRow, StatusUpdate, now_millis, query_failed,
};

const REPORT_COLUMNS: &str = r#"
    id, status, created_at, updated_at, heartbeat_at, progress,
    processed_nfts, total_nfts, batch_count, last_applied_batch,
    csv_path, error_message, error_code
"#;

/// SQL list of the states holding the single-flight slot
const ACTIVE_STATES_SQL: &str = "('queued', 'processing', 'finalizing')";

impl Database {
    /// Insert a queued report unless another report is active
    ///
    /// The check and the insert are one statement, so two concurrent callers
    /// cannot both succeed. Returns `false` when an active report blocked the insert.
    pub async fn insert_report_if_idle(&self, id: ReportId) -> Result<bool> {
        let now = now_millis();

        let result = sqlx::query(&format!(
            r#"
            INSERT INTO reports (id, status, created_at, updated_at)
            SELECT ?, 'queued', ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM reports WHERE status IN {}
            )
            "#,
            ACTIVE_STATES_SQL
        ))
        .bind(id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| query_failed("insert report", e))?;

        Ok(result.rows_affected() == 1)
    }

    /// The oldest report currently holding the single-flight slot
    pub async fn active_report(&self) -> Result<Option<ReportId>> {
        sqlx::query_scalar::<_, ReportId>(&format!(
            "SELECT id FROM reports WHERE status IN {} ORDER BY created_at ASC LIMIT 1",
            ACTIVE_STATES_SQL
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_failed("query active report", e))
    }

    /// Get a report by ID
    pub async fn get_report(&self, id: ReportId) -> Result<Option<ReportRow>> {
        sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {} FROM reports WHERE id = ?",
            REPORT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_failed("get report", e))
    }

    /// Rows accumulated for a report, in append order
    pub async fn get_report_records(&self, id: ReportId) -> Result<Vec<CsvRecord>> {
        fetch_records(&self.pool, id).await
    }

    /// A report together with its rows, read from one snapshot
    ///
    /// Both reads share a transaction, so a checkpoint committing in between
    /// cannot make the row count disagree with `processed_nfts`.
    pub async fn get_report_with_records(
        &self,
        id: ReportId,
    ) -> Result<Option<(ReportRow, Vec<CsvRecord>)>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| query_failed("begin status read", e))?;

        let report = sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {} FROM reports WHERE id = ?",
            REPORT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| query_failed("get report", e))?;

        let Some(report) = report else {
            return Ok(None);
        };
        let records = fetch_records(&mut *tx, id).await?;

        tx.commit()
            .await
            .map_err(|e| query_failed("end status read", e))?;

        Ok(Some((report, records)))
    }

    /// List all reports, newest first
    pub async fn list_reports(&self) -> Result<Vec<ReportRow>> {
        sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {} FROM reports ORDER BY created_at DESC, id ASC",
            REPORT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_failed("list reports", e))
    }

    /// List reports whose state is one of `states`, newest first
    pub async fn list_reports_by_status(&self, states: &[ReportState]) -> Result<Vec<ReportRow>> {
        if states.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM reports WHERE status IN (",
            REPORT_COLUMNS
        ));
        let mut separated = query.separated(", ");
        for state in states {
            separated.push_bind(state.as_str());
        }
        separated.push_unseparated(") ORDER BY created_at DESC, id ASC");

        query
            .build_query_as::<ReportRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_failed("list reports by status", e))
    }

    /// Apply a partial update; returns whether the report exists
    pub async fn update_report(&self, id: ReportId, update: &StatusUpdate) -> Result<bool> {
        let now = now_millis();

        let mut query = QueryBuilder::<Sqlite>::new("UPDATE reports SET updated_at = ");
        query.push_bind(now);

        if let Some(status) = update.status {
            query.push(", status = ").push_bind(status.as_str());
        }
        if let Some(progress) = update.progress {
            query.push(", progress = ").push_bind(i64::from(progress.min(100)));
        }
        if let Some(total) = update.total_nfts {
            query.push(", total_nfts = ").push_bind(total);
        }
        if let Some(batch_count) = update.batch_count {
            query.push(", batch_count = ").push_bind(batch_count);
        }
        if let Some(csv_path) = &update.csv_path {
            query.push(", csv_path = ").push_bind(csv_path.clone());
        }
        if let Some(error) = &update.error {
            query
                .push(", error_message = ")
                .push_bind(error.as_ref().map(|e| e.message.clone()))
                .push(", error_code = ")
                .push_bind(error.as_ref().map(|e| e.code.clone()));
        }
        if update.heartbeat {
            query.push(", heartbeat_at = ").push_bind(now);
        }

        query.push(" WHERE id = ").push_bind(id);

        let result = query
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| query_failed("update report", e))?;

        Ok(result.rows_affected() == 1)
    }

    /// Move a report to `to` if it is currently in one of `from`
    ///
    /// Returns `false` when the report is missing or in another state.
    pub async fn transition_report(
        &self,
        id: ReportId,
        from: &[ReportState],
        to: ReportState,
    ) -> Result<bool> {
        let now = now_millis();

        let mut query = QueryBuilder::<Sqlite>::new("UPDATE reports SET status = ");
        query
            .push_bind(to.as_str())
            .push(", updated_at = ")
            .push_bind(now)
            .push(", heartbeat_at = ")
            .push_bind(now)
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" AND status IN (");
        let mut separated = query.separated(", ");
        for state in from {
            separated.push_bind(state.as_str());
        }
        separated.push_unseparated(")");

        let result = query
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| query_failed("transition report", e))?;

        Ok(result.rows_affected() == 1)
    }

    /// Claim a processing report for finalization once every batch is applied
    pub async fn claim_for_finalize(&self, id: ReportId) -> Result<bool> {
        let now = now_millis();

        let result = sqlx::query(
            r#"
            UPDATE reports
            SET status = 'finalizing', updated_at = ?, heartbeat_at = ?
            WHERE id = ?
              AND status IN ('processing', 'finalizing')
              AND last_applied_batch = batch_count - 1
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| query_failed("claim report for finalize", e))?;

        Ok(result.rows_affected() == 1)
    }

    /// Append rows and advance counters in one transaction
    ///
    /// The write only happens when `last_applied_batch` still equals
    /// `checkpoint.expected_last_batch` and the report is processing, so a
    /// redelivered batch is never appended twice.
    pub async fn apply_checkpoint(
        &self,
        id: ReportId,
        checkpoint: &Checkpoint,
    ) -> Result<CheckpointOutcome> {
        let now = now_millis();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| query_failed("begin checkpoint transaction", e))?;

        let result = sqlx::query(
            r#"
            UPDATE reports
            SET last_applied_batch = ?,
                processed_nfts = processed_nfts + ?,
                progress = MAX(progress, ?),
                updated_at = ?,
                heartbeat_at = ?
            WHERE id = ? AND status = 'processing' AND last_applied_batch = ?
            "#,
        )
        .bind(checkpoint.new_last_batch)
        .bind(checkpoint.records.len() as i64)
        .bind(i64::from(checkpoint.progress.min(100)))
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(checkpoint.expected_last_batch)
        .execute(&mut *tx)
        .await
        .map_err(|e| query_failed("advance checkpoint", e))?;

        if result.rows_affected() == 0 {
            let current: Option<(String, i64)> =
                sqlx::query_as("SELECT status, last_applied_batch FROM reports WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| query_failed("read checkpoint state", e))?;

            tx.rollback()
                .await
                .map_err(|e| query_failed("roll back checkpoint", e))?;

            return Ok(match current {
                None => CheckpointOutcome::NotActive(None),
                Some((status, last)) => {
                    let state = ReportState::parse(&status);
                    if state != ReportState::Processing {
                        CheckpointOutcome::NotActive(Some(state))
                    } else if checkpoint.new_last_batch <= last {
                        CheckpointOutcome::AlreadyApplied
                    } else {
                        CheckpointOutcome::OutOfOrder { expected: last + 1 }
                    }
                }
            });
        }

        let base: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM report_records WHERE report_id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| query_failed("count report records", e))?;

        for (offset, record) in checkpoint.records.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO report_records (
                    report_id, position, field_id, token_id, tx_id, explorer_url
                ) VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(base + offset as i64)
            .bind(&record.field_id)
            .bind(&record.token_id)
            .bind(&record.tx_id)
            .bind(&record.explorer_url)
            .execute(&mut *tx)
            .await
            .map_err(|e| query_failed("append report record", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| query_failed("commit checkpoint", e))?;

        Ok(CheckpointOutcome::Applied)
    }

    /// Mark an active report completed with its artifact URL
    ///
    /// Returns `false` if the report was deleted or already left the active states.
    pub async fn complete_report(&self, id: ReportId, csv_path: &str) -> Result<bool> {
        let now = now_millis();

        let result = sqlx::query(&format!(
            r#"
            UPDATE reports
            SET status = 'completed', csv_path = ?, progress = 100,
                error_message = NULL, error_code = NULL,
                updated_at = ?, heartbeat_at = ?
            WHERE id = ? AND status IN {}
            "#,
            ACTIVE_STATES_SQL
        ))
        .bind(csv_path)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| query_failed("complete report", e))?;

        Ok(result.rows_affected() == 1)
    }

    /// Mark an active report failed
    ///
    /// Terminal reports are left untouched; returns whether a row changed.
    pub async fn fail_report(&self, id: ReportId, error: &ReportError) -> Result<bool> {
        let now = now_millis();

        let result = sqlx::query(&format!(
            r#"
            UPDATE reports
            SET status = 'failed', error_message = ?, error_code = ?,
                csv_path = NULL, updated_at = ?
            WHERE id = ? AND status IN {}
            "#,
            ACTIVE_STATES_SQL
        ))
        .bind(&error.message)
        .bind(&error.code)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| query_failed("fail report", e))?;

        Ok(result.rows_affected() == 1)
    }

    /// Fail every active report with no sign of life since `cutoff_ms`
    ///
    /// Liveness is the heartbeat, falling back to the last update and then
    /// creation time. Returns the ids that were failed.
    pub async fn fail_stale_reports(
        &self,
        cutoff_ms: i64,
        error: &ReportError,
    ) -> Result<Vec<ReportId>> {
        let now = now_millis();

        sqlx::query_scalar::<_, ReportId>(&format!(
            r#"
            UPDATE reports
            SET status = 'failed', error_message = ?, error_code = ?, updated_at = ?
            WHERE status IN {}
              AND COALESCE(heartbeat_at, updated_at, created_at) < ?
            RETURNING id
            "#,
            ACTIVE_STATES_SQL
        ))
        .bind(&error.message)
        .bind(&error.code)
        .bind(now)
        .bind(cutoff_ms)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_failed("fail stale reports", e))
    }

    /// Delete a report and its rows; returns whether it existed
    pub async fn delete_report(&self, id: ReportId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM reports WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| query_failed("delete report", e))?;

        Ok(result.rows_affected() > 0)
    }

    /// Count the reports holding the single-flight slot
    pub async fn count_active_reports(&self) -> Result<i64> {
        sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM reports WHERE status IN {}",
            ACTIVE_STATES_SQL
        ))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| query_failed("count active reports", e))
    }
}

async fn fetch_records<'e, E>(executor: E, id: ReportId) -> Result<Vec<CsvRecord>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows: Vec<(String, String, String, String)> = sqlx::query_as(
        r#"
        SELECT field_id, token_id, tx_id, explorer_url
        FROM report_records
        WHERE report_id = ?
        ORDER BY position ASC
        "#,
    )
    .bind(id)
    .fetch_all(executor)
    .await
    .map_err(|e| query_failed("get report records", e))?;

    Ok(rows
        .into_iter()
        .map(|(field_id, token_id, tx_id, explorer_url)| CsvRecord {
            field_id,
            token_id,
            tx_id,
            explorer_url,
        })
        .collect())
}
