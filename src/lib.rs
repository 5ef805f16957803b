//! # mint-reports
//!
//! Asynchronous CSV reports over the NFTs minted by a project on an upstream
//! minting platform.
//!
//! A caller asks for a report and immediately receives its id. A background
//! worker then pulls the project's transaction listing, resolves every NFT
//! (metadata field id, mint transaction, block explorer link) through a
//! concurrency-limited, retrying client, checkpoints progress batch by batch
//! and finally writes a CSV artifact. Only one report may be in flight at a
//! time.
//!
//! ## Quick Start
//!
//! ```no_run
//! use mint_reports::{Config, ReportService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.upstream.project_uid = "my-project".to_string();
//!     config.upstream.api_key = Some("secret".to_string());
//!
//!     let service = ReportService::new(config).await?;
//!     service.start();
//!
//!     let mut events = service.subscribe();
//!     let accepted = service.generate_report().await?;
//!     println!("poll {}", accepted.status_url);
//!
//!     while let Ok(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// CSV artifact storage
pub mod artifacts;
/// Ordered, deduplicating message channel driving the report lifecycle
pub mod channel;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Block explorer links
pub mod explorer;
/// Report service: enqueue, orchestration, worker, watchdog
pub mod reports;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Upstream minting platform client
pub mod upstream;

pub use config::Config;
pub use error::{Error, Result};
pub use reports::{ReportService, ServiceOverrides};
pub use types::{
    CsvRecord, Event, GenerateReportResponse, ReportError, ReportId, ReportState, ReportStatus,
    ReportSummary,
};

/// Run the service until SIGTERM or SIGINT, then shut it down gracefully
///
/// Starts the worker and watchdog, waits for a signal, calls
/// [`ReportService::shutdown`] and waits for the background tasks to stop.
///
/// # Example
///
/// ```no_run
/// use mint_reports::{Config, ReportService, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let service = ReportService::new(Config::default()).await?;
///     run_with_shutdown(service).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(service: ReportService) -> Result<()> {
    let tasks = service.start();

    wait_for_signal().await;
    service.shutdown().await?;

    for task in tasks {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "background task ended abnormally");
        }
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, using ctrl_c");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
