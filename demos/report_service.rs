//! Report service with the REST API
//!
//! Reads `MINT_REPORTS_*` variables (a `.env` file works too), optionally a
//! JSON config file given as the first argument, then serves the API until
//! Ctrl+C.
//!
//! ```text
//! MINT_REPORTS_PROJECT_UID=... MINT_REPORTS_UPSTREAM_API_KEY=... \
//!     cargo run --example report_service -- config.json
//!
//! curl -X POST http://localhost:6790/generate-report
//! curl http://localhost:6790/report-status/<id>
//! curl -L http://localhost:6790/report-download/<id>/csv
//! curl -N http://localhost:6790/events
//! ```

use mint_reports::{Config, ReportService, run_with_shutdown};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mint_reports=info")),
        )
        .init();

    let mut config = match std::env::args().nth(1) {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    config.apply_env_overrides();

    let service = ReportService::new(config).await?;
    let bind_address = service.get_config().server.api.bind_address;

    println!("Swagger UI:    http://{bind_address}/swagger-ui");
    println!("Events stream: http://{bind_address}/events");

    let api = service.spawn_api_server();
    run_with_shutdown(service).await?;
    api.await??;

    Ok(())
}
