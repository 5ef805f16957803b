use super::test_helpers::*;
use super::*;
use crate::artifacts::parse_csv;
use crate::channel::LifecycleMessage;
use crate::error::Error;
use crate::types::{CsvRecord, Event, ReportId, ReportState};
use std::sync::atomic::Ordering;


/// Collect every event currently buffered on `rx`
fn buffered_events(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Read the artifact of a completed report back into rows
async fn artifact_rows(service: &ReportService, id: ReportId) -> Vec<CsvRecord> {
    let url = service.report_download_url(id).await.unwrap();
    let path = url::Url::parse(&url).unwrap().to_file_path().unwrap();
    parse_csv(&std::fs::read(path).unwrap()).unwrap()
}
