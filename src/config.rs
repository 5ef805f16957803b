//! Configuration types for mint-reports

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Environment variable overriding [`UpstreamConfig::api_key`]
pub const ENV_UPSTREAM_API_KEY: &str = "MINT_REPORTS_UPSTREAM_API_KEY";
/// Environment variable overriding [`UpstreamConfig::base_url`]
pub const ENV_UPSTREAM_BASE_URL: &str = "MINT_REPORTS_UPSTREAM_BASE_URL";
/// Environment variable overriding [`UpstreamConfig::project_uid`]
pub const ENV_PROJECT_UID: &str = "MINT_REPORTS_PROJECT_UID";

/// Host fragment identifying the production minting API
const MAINNET_API_HOST: &str = "studio-api.nmkr.io";

/// Main configuration for the report service
///
/// Fields are organized into sub-configs, one per component:
/// - [`upstream`](UpstreamConfig): minting API endpoint, credentials, concurrency and retries
/// - [`report`](ReportConfig): batching, checkpointing, dispatch mode
/// - [`channel`](ChannelConfig): durable message channel tuning
/// - [`artifacts`](ArtifactConfig): where CSV files are written and served from
/// - [`explorer`](ExplorerConfig): block explorer network and default chain
/// - [`watchdog`](WatchdogConfig): stalled-report reaper
/// - [`persistence`](PersistenceConfig): SQLite database
/// - [`server`](ServerIntegrationConfig): REST API
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Upstream minting API
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Report generation behavior
    #[serde(default)]
    pub report: ReportConfig,

    /// Message channel tuning
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Artifact storage
    #[serde(default)]
    pub artifacts: ArtifactConfig,

    /// Block explorer links
    #[serde(default)]
    pub explorer: ExplorerConfig,

    /// Stalled-report watchdog
    #[serde(default)]
    pub watchdog: WatchdogConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// API and external server integration
    #[serde(default)]
    pub server: ServerIntegrationConfig,
}

impl Config {
    /// Load a configuration from a JSON file; missing sections take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
            key: None,
        })
    }

    /// Apply `MINT_REPORTS_*` environment variables on top of the loaded values
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (environment, secrets store, tests)
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ENV_UPSTREAM_API_KEY).filter(|v| !v.is_empty()) {
            self.upstream.api_key = Some(key);
        }
        if let Some(base) = lookup(ENV_UPSTREAM_BASE_URL).filter(|v| !v.is_empty()) {
            self.upstream.base_url = base;
        }
        if let Some(uid) = lookup(ENV_PROJECT_UID).filter(|v| !v.is_empty()) {
            self.upstream.project_uid = uid;
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.report.batch_size == 0 {
            return Err(config_error("report.batch_size", "batch size must be positive"));
        }
        if self.report.checkpoint_interval == 0 {
            return Err(config_error(
                "report.checkpoint_interval",
                "checkpoint interval must be positive",
            ));
        }
        if self.upstream.max_concurrent_requests == 0 {
            return Err(config_error(
                "upstream.max_concurrent_requests",
                "concurrency limit must be positive",
            ));
        }
        if self.channel.max_receive_count == 0 {
            return Err(config_error(
                "channel.max_receive_count",
                "max receive count must be positive",
            ));
        }
        url::Url::parse(&self.upstream.base_url).map_err(|e| {
            config_error(
                "upstream.base_url",
                format!("invalid base URL '{}': {}", self.upstream.base_url, e),
            )
        })?;
        if let Some(base) = &self.artifacts.public_base_url {
            url::Url::parse(base).map_err(|e| {
                config_error(
                    "artifacts.public_base_url",
                    format!("invalid public base URL '{}': {}", base, e),
                )
            })?;
        }
        crate::explorer::Chain::parse(&self.explorer.default_chain)
            .map_err(|e| config_error("explorer.default_chain", e.to_string()))?;
        Ok(())
    }

    /// The explorer network, inferred from the upstream host when not set explicitly
    pub fn explorer_network(&self) -> Network {
        self.explorer.network.unwrap_or_else(|| {
            if self.upstream.base_url.contains(MAINNET_API_HOST) {
                Network::Mainnet
            } else {
                Network::Testnet
            }
        })
    }
}

fn config_error(key: &str, message: impl Into<String>) -> Error {
    Error::Config {
        message: message.into(),
        key: Some(key.to_string()),
    }
}

/// Upstream minting API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct UpstreamConfig {
    /// API base URL (default: "https://studio-api.preprod.nmkr.io")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer API key
    #[serde(default)]
    pub api_key: Option<String>,

    /// Project whose transactions are reported on
    #[serde(default)]
    pub project_uid: String,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Maximum in-flight upstream calls (default: 5)
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Retry policy for upstream calls
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            project_uid: String::new(),
            request_timeout: default_request_timeout(),
            max_concurrent_requests: default_max_concurrent_requests(),
            retry: RetryConfig::default(),
        }
    }
}

/// Retry configuration for upstream calls
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetryConfig {
    /// Retries after the first attempt (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// How a triggered report is driven through its batches
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// The trigger handler runs every batch in one loop
    #[default]
    InProcess,
    /// The trigger handler publishes one message per batch plus a finalize message
    PerBatch,
}

/// Report generation configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ReportConfig {
    /// Source transactions per batch (default: 10)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Processed NFTs between persisted checkpoints (default: 10)
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,

    /// Dispatch mode (default: in_process)
    #[serde(default)]
    pub dispatch: DispatchMode,

    /// Prefix of the status URL returned to callers (default: "/report-status")
    #[serde(default = "default_status_url_prefix")]
    pub status_url_prefix: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            checkpoint_interval: default_checkpoint_interval(),
            dispatch: DispatchMode::default(),
            status_url_prefix: default_status_url_prefix(),
        }
    }
}

/// Durable message channel configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ChannelConfig {
    /// How long a received message stays invisible before redelivery (default: 900 seconds)
    #[serde(default = "default_visibility_timeout", with = "duration_serde")]
    pub visibility_timeout: Duration,

    /// Idle poll interval of the worker (default: 500 ms)
    #[serde(
        rename = "poll_interval_ms",
        default = "default_poll_interval",
        with = "duration_ms_serde"
    )]
    pub poll_interval: Duration,

    /// Deliveries after which a failing message is dead-lettered (default: 5)
    #[serde(default = "default_max_receive_count")]
    pub max_receive_count: u32,

    /// Window in which a repeated dedup key is not published again (default: 300 seconds)
    #[serde(default = "default_dedup_window", with = "duration_serde")]
    pub dedup_window: Duration,

    /// Delay before a failed message becomes visible again (default: 5 seconds)
    #[serde(default = "default_redelivery_delay", with = "duration_serde")]
    pub redelivery_delay: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: default_visibility_timeout(),
            poll_interval: default_poll_interval(),
            max_receive_count: default_max_receive_count(),
            dedup_window: default_dedup_window(),
            redelivery_delay: default_redelivery_delay(),
        }
    }
}

/// Artifact storage configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ArtifactConfig {
    /// Directory artifacts are written under (default: "./artifacts")
    #[serde(default = "default_artifact_dir")]
    pub directory: PathBuf,

    /// Public URL the directory is served from; `file://` URLs are returned when unset
    #[serde(default)]
    pub public_base_url: Option<String>,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            directory: default_artifact_dir(),
            public_base_url: None,
        }
    }
}

/// Blockchain network flavor used for explorer links
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production networks
    Mainnet,
    /// Public test networks (preprod, sepolia, devnet)
    Testnet,
}

impl Network {
    /// Lowercase name, as used in query strings
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        }
    }
}

/// Block explorer configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ExplorerConfig {
    /// Network; inferred from the upstream base URL when unset
    #[serde(default)]
    pub network: Option<Network>,

    /// Chain assumed when the upstream does not report one (default: "Cardano")
    #[serde(default = "default_chain")]
    pub default_chain: String,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            network: None,
            default_chain: default_chain(),
        }
    }
}

/// Stalled-report watchdog configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct WatchdogConfig {
    /// Run the watchdog alongside the worker (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Heartbeat age after which an active report is failed (default: 1800 seconds)
    #[serde(default = "default_stale_threshold", with = "duration_serde")]
    pub stale_threshold: Duration,

    /// Time between scans (default: 60 seconds)
    #[serde(default = "default_scan_interval", with = "duration_serde")]
    pub scan_interval: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_threshold: default_stale_threshold(),
            scan_interval: default_scan_interval(),
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PersistenceConfig {
    /// Database path (default: "./mint-reports.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// API and external server integration configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6790)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Optional API key for authentication
    #[serde(default)]
    pub api_key: Option<String>,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_key: None,
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

fn default_base_url() -> String {
    "https://studio-api.preprod.nmkr.io".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_concurrent_requests() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_batch_size() -> usize {
    10
}

fn default_checkpoint_interval() -> u64 {
    10
}

fn default_status_url_prefix() -> String {
    "/report-status".to_string()
}

fn default_visibility_timeout() -> Duration {
    Duration::from_secs(900)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_max_receive_count() -> u32 {
    5
}

fn default_dedup_window() -> Duration {
    Duration::from_secs(300)
}

fn default_redelivery_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("./artifacts")
}

fn default_chain() -> String {
    "Cardano".to_string()
}

fn default_stale_threshold() -> Duration {
    Duration::from_secs(1800)
}

fn default_scan_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./mint-reports.db")
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6790))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
