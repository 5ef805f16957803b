use crate::db::*;
use crate::types::{CsvRecord, ReportId};
use tempfile::NamedTempFile;


/// Open a fresh database in a temp file; keep the file alive for the test's duration
async fn open_db() -> (Database, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    (db, temp_file)
}

fn row(n: usize) -> CsvRecord {
    CsvRecord {
        field_id: format!("field-{n}"),
        token_id: format!("token-{n}"),
        tx_id: format!("tx-{n}"),
        explorer_url: format!("https://preprod.cardanoscan.io/transaction/tx-{n}"),
    }
}

/// Insert a report and move it to processing, ready for checkpoints
async fn processing_report(db: &Database) -> ReportId {
    let id = ReportId::new();
    assert!(db.insert_report_if_idle(id).await.unwrap());
    assert!(
        db.transition_report(
            id,
            &[crate::types::ReportState::Queued],
            crate::types::ReportState::Processing
        )
        .await
        .unwrap()
    );
    id
}
