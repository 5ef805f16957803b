//! Report handlers.

use super::{DeleteResponse, DownloadResponse, ListReportsQuery, parse_report_id};
use crate::Result;
use crate::api::AppState;
use crate::types::{GenerateReportResponse, ReportStatus, ReportSummary};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

/// POST /generate-report - Queue a new report
#[utoipa::path(
    post,
    path = "/generate-report",
    tag = "reports",
    responses(
        (status = 202, description = "Report accepted", body = GenerateReportResponse),
        (status = 409, description = "Another report is already active", body = crate::error::ApiError),
        (status = 503, description = "Service is shutting down", body = crate::error::ApiError)
    )
)]
pub async fn generate_report(State(state): State<AppState>) -> Result<Response> {
    let accepted = state.service.generate_report().await?;
    Ok((
        StatusCode::ACCEPTED,
        [(header::LOCATION, accepted.status_url.clone())],
        Json(accepted),
    )
        .into_response())
}

/// GET /report-status/:id - Full status record
#[utoipa::path(
    get,
    path = "/report-status/{id}",
    tag = "reports",
    params(
        ("id" = String, Path, description = "Report ID")
    ),
    responses(
        (status = 200, description = "Report status", body = ReportStatus),
        (status = 400, description = "Malformed report id", body = crate::error::ApiError),
        (status = 404, description = "Report not found", body = crate::error::ApiError)
    )
)]
pub async fn get_report_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReportStatus>> {
    let id = parse_report_id(&id)?;
    Ok(Json(state.service.get_report_status(id).await?))
}

/// GET /report-download/:id/csv - Redirect to the CSV artifact
#[utoipa::path(
    get,
    path = "/report-download/{id}/csv",
    tag = "reports",
    params(
        ("id" = String, Path, description = "Report ID")
    ),
    responses(
        (status = 307, description = "Redirect to the artifact", body = DownloadResponse),
        (status = 400, description = "Malformed report id", body = crate::error::ApiError),
        (status = 404, description = "Report not found", body = crate::error::ApiError),
        (status = 409, description = "Report not completed yet", body = crate::error::ApiError)
    )
)]
pub async fn download_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let id = parse_report_id(&id)?;
    let url = state.service.report_download_url(id).await?;
    Ok((
        StatusCode::TEMPORARY_REDIRECT,
        [(header::LOCATION, url.clone())],
        Json(DownloadResponse { url }),
    )
        .into_response())
}

/// DELETE /report/:id - Remove a report and its artifact
#[utoipa::path(
    delete,
    path = "/report/{id}",
    tag = "reports",
    params(
        ("id" = String, Path, description = "Report ID")
    ),
    responses(
        (status = 200, description = "Report deleted (or never existed)", body = DeleteResponse),
        (status = 400, description = "Malformed report id", body = crate::error::ApiError),
        (status = 500, description = "Status record could not be removed", body = crate::error::ApiError)
    )
)]
pub async fn delete_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let id = parse_report_id(&id)?;
    state.service.delete_report(id).await?;
    Ok(Json(DeleteResponse { deleted: true }))
}

/// GET /reports - List reports, newest first
#[utoipa::path(
    get,
    path = "/reports",
    tag = "reports",
    params(ListReportsQuery),
    responses(
        (status = 200, description = "Report summaries", body = Vec<ReportSummary>),
        (status = 400, description = "Unknown state in filter", body = crate::error::ApiError)
    )
)]
pub async fn list_reports(
    State(state): State<AppState>,
    Query(query): Query<ListReportsQuery>,
) -> Result<Json<Vec<ReportSummary>>> {
    let reports = match query.states()? {
        Some(states) => state.service.list_reports_by_status(&states).await?,
        None => state.service.list_reports().await?,
    };
    Ok(Json(reports))
}

/// GET /dead-letters - Messages the worker gave up on
#[utoipa::path(
    get,
    path = "/dead-letters",
    tag = "reports",
    responses(
        (status = 200, description = "Dead-lettered messages", body = Vec<crate::channel::DeadLetter>)
    )
)]
pub async fn list_dead_letters(
    State(state): State<AppState>,
) -> Result<Json<Vec<crate::channel::DeadLetter>>> {
    Ok(Json(state.service.dead_letters().await?))
}
