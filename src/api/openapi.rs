//! OpenAPI documentation and schema generation
//!
//! Describes the mint-reports REST API using utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the mint-reports REST API
///
/// Served at `/openapi.json` and through Swagger UI at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "mint-reports REST API",
        version = "0.1.0",
        description = "Generate, poll, download and delete CSV reports of minted NFTs",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:6790", description = "Local development server")
    ),
    paths(
        crate::api::routes::generate_report,
        crate::api::routes::get_report_status,
        crate::api::routes::download_report,
        crate::api::routes::delete_report,
        crate::api::routes::list_reports,
        crate::api::routes::list_dead_letters,

        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        crate::types::ReportId,
        crate::types::ReportState,
        crate::types::CsvRecord,
        crate::types::ReportError,
        crate::types::ReportStatus,
        crate::types::ReportSummary,
        crate::types::GenerateReportResponse,
        crate::types::Event,
        crate::channel::DeadLetter,

        crate::api::routes::ListReportsQuery,
        crate::api::routes::DownloadResponse,
        crate::api::routes::DeleteResponse,

        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "reports", description = "Report lifecycle - Queue, poll, download and delete reports"),
        (name = "system", description = "System endpoints - Health checks, OpenAPI spec, events"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Security addon to add API key authentication scheme to OpenAPI spec
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = &mut openapi.components {
            components.add_security_scheme(
                "api_key",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new("X-Api-Key"),
                    ),
                ),
            );
        }
    }
}
