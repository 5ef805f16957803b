//! Helpers for waiting on report outcomes

use mint_reports::{CsvRecord, ReportId, ReportService, ReportState, ReportStatus};
use std::time::Duration;

/// Poll until the report reaches `completed` or `failed`
pub async fn wait_for_terminal(service: &ReportService, id: ReportId) -> ReportStatus {
    tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            let status = service
                .get_report_status(id)
                .await
                .expect("report should exist");
            if status.status.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("report did not finish in time")
}

/// Read the CSV artifact of a completed report
pub async fn read_artifact(service: &ReportService, id: ReportId) -> (String, Vec<CsvRecord>) {
    let url = service
        .report_download_url(id)
        .await
        .expect("report should be downloadable");
    let path = url::Url::parse(&url)
        .expect("artifact url")
        .to_file_path()
        .expect("file artifact");
    let bytes = std::fs::read(path).expect("artifact readable");
    let rows = mint_reports::artifacts::parse_csv(&bytes).expect("artifact parses");
    (String::from_utf8(bytes).expect("utf-8 artifact"), rows)
}

/// Assert the status of a finished report
pub fn assert_state(status: &ReportStatus, expected: ReportState) {
    assert_eq!(
        status.status, expected,
        "report ended as {} with error {:?}",
        status.status, status.error
    );
}
