//! Report generation service split into focused submodules.
//!
//! The `ReportService` struct and its methods are organized by domain:
//! - [`enqueue`] - Single-flight report creation and trigger publish
//! - [`orchestrator`] - Lifecycle state machine driven by channel messages
//! - [`resolve`] - Turning transaction NFTs into CSV rows
//! - [`worker`] - Channel consumer loop (ack, release, dead-letter)
//! - [`watchdog`] - Failing reports that stopped making progress
//! - [`queries`] - Status reads, downloads and deletion
//! - [`lifecycle`] - Shutdown coordination

mod enqueue;
mod lifecycle;
mod orchestrator;
mod queries;
mod resolve;
mod watchdog;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use resolve::progress_percent;

use crate::artifacts::{ArtifactStore, FsArtifactStore};
use crate::channel::{MessageChannel, SqliteChannel};
use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::explorer::{Chain, Explorer};
use crate::types::Event;
use crate::upstream::{HttpMintingApi, MintingApi, RateLimitedClient};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio_util::sync::CancellationToken;

/// Replacements for the production collaborators
///
/// Anything left `None` is built from the configuration.
#[derive(Default)]
pub struct ServiceOverrides {
    /// Minting API used instead of [`HttpMintingApi`]
    pub minting_api: Option<Arc<dyn MintingApi>>,
    /// Artifact store used instead of [`FsArtifactStore`]
    pub artifacts: Option<Arc<dyn ArtifactStore>>,
    /// Message channel used instead of [`SqliteChannel`]
    pub channel: Option<Arc<dyn MessageChannel>>,
}

/// Report generation service (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct ReportService {
    /// Database instance for persistence
    /// Public for integration tests to inspect report rows
    pub db: Arc<Database>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration
    pub(crate) config: Arc<Config>,
    /// Bounded, retrying access to the minting API
    pub(crate) upstream: RateLimitedClient,
    /// Where finished CSVs are written
    pub(crate) artifacts: Arc<dyn ArtifactStore>,
    /// Lifecycle message channel
    pub(crate) channel: Arc<dyn MessageChannel>,
    /// Explorer link builder
    pub(crate) explorer: Explorer,
    /// Cancelled on shutdown; stops the worker and watchdog loops
    pub(crate) shutdown: CancellationToken,
    /// Set to false during shutdown so no new report is accepted
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl ReportService {
    /// Create a service with production collaborators
    ///
    /// Opens (and migrates) the SQLite database, builds the HTTP minting
    /// client and the filesystem artifact store.
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_overrides(config, ServiceOverrides::default()).await
    }

    /// Create a service, substituting the given collaborators
    pub async fn with_overrides(config: Config, overrides: ServiceOverrides) -> Result<Self> {
        config.validate()?;

        let db = Arc::new(Database::new(&config.persistence.database_path).await?);

        let minting_api: Arc<dyn MintingApi> = match overrides.minting_api {
            Some(api) => api,
            None => Arc::new(HttpMintingApi::new(&config.upstream)?),
        };
        let artifacts: Arc<dyn ArtifactStore> = match overrides.artifacts {
            Some(store) => store,
            None => Arc::new(FsArtifactStore::new(&config.artifacts)),
        };
        let channel: Arc<dyn MessageChannel> = match overrides.channel {
            Some(channel) => channel,
            None => Arc::new(SqliteChannel::new(db.clone(), config.channel.dedup_window)),
        };

        let explorer = Explorer::new(
            config.explorer_network(),
            Chain::parse(&config.explorer.default_chain)?,
        );

        tracing::info!(
            dispatch = ?config.report.dispatch,
            batch_size = config.report.batch_size,
            max_concurrent_requests = config.upstream.max_concurrent_requests,
            network = explorer.network().as_str(),
            "Report service initialized"
        );

        // Buffer of 1000 events; slow subscribers see RecvError::Lagged
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        Ok(Self {
            db,
            event_tx,
            upstream: RateLimitedClient::new(minting_api, &config.upstream),
            config: Arc::new(config),
            artifacts,
            channel,
            explorer,
            shutdown: CancellationToken::new(),
            accepting_new: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Subscribe to report events
    ///
    /// Each subscriber receives every event emitted after it subscribed.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Emit an event to all subscribers; dropped when nobody listens
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Spawn the REST API server in a background task
    pub fn spawn_api_server(&self) -> tokio::task::JoinHandle<Result<()>> {
        let service = Arc::new(self.clone());
        let config = self.config.clone();

        tokio::spawn(async move { crate::api::start_api_server(service, config).await })
    }
}
