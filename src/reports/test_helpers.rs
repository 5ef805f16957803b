//! Shared test helpers for creating ReportService instances in tests.

use crate::artifacts::{ArtifactStore, FsArtifactStore};
use crate::config::{Config, RetryConfig};
use crate::error::Error;
use crate::reports::{ReportService, ServiceOverrides};
use crate::types::ReportId;
use crate::upstream::{MintingApi, NftDetails, ProjectTransaction, TransactionNft, UpstreamError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::tempdir;

/// In-memory minting API
#[derive(Default)]
pub(crate) struct MockMintingApi {
    pub(crate) transactions: Mutex<Vec<ProjectTransaction>>,
    pub(crate) details: Mutex<HashMap<String, NftDetails>>,
    /// NFT uids whose lookup always fails
    pub(crate) failing_uids: Mutex<HashSet<String>>,
    /// Number of upcoming listing calls that fail
    pub(crate) listing_failures: AtomicUsize,
    pub(crate) listing_calls: AtomicUsize,
    pub(crate) detail_calls: AtomicUsize,
}

impl MockMintingApi {
    /// Project of `count` confirmed transactions with `nfts_per_tx` minted NFTs each
    pub(crate) fn with_project(count: usize, nfts_per_tx: usize) -> Arc<Self> {
        let api = Self::default();
        {
            let mut transactions = api.transactions.lock().unwrap();
            let mut details = api.details.lock().unwrap();
            for t in 0..count {
                let uids: Vec<String> = (0..nfts_per_tx).map(|n| format!("nft-{t}-{n}")).collect();
                for uid in &uids {
                    details.insert(uid.clone(), minted(uid, &format!("F-{uid}")));
                }
                transactions.push(transaction(&format!("tx-{t}"), "confirmed", &uids));
            }
        }
        Arc::new(api)
    }

    pub(crate) fn fail_uid(&self, uid: &str) {
        self.failing_uids.lock().unwrap().insert(uid.to_string());
    }
}

#[async_trait]
impl MintingApi for MockMintingApi {
    async fn list_transactions(&self) -> Result<Vec<ProjectTransaction>, UpstreamError> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.listing_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.listing_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(UpstreamError {
                status: Some(503),
                message: "Service Unavailable".into(),
            });
        }
        Ok(self.transactions.lock().unwrap().clone())
    }

    async fn nft_details(&self, nft_uid: &str) -> Result<NftDetails, UpstreamError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_uids.lock().unwrap().contains(nft_uid) {
            return Err(UpstreamError {
                status: Some(500),
                message: "Internal Server Error".into(),
            });
        }
        self.details
            .lock()
            .unwrap()
            .get(nft_uid)
            .cloned()
            .ok_or_else(|| UpstreamError {
                status: Some(404),
                message: format!("NFT {nft_uid} not found"),
            })
    }
}

pub(crate) fn transaction(id: &str, state: &str, uids: &[String]) -> ProjectTransaction {
    ProjectTransaction {
        transaction_id: Some(id.to_string()),
        state: Some(state.to_string()),
        blockchain: Some("Cardano".to_string()),
        nfts: uids
            .iter()
            .map(|uid| TransactionNft {
                nft_uid: uid.clone(),
                asset_name: None,
            })
            .collect(),
    }
}

/// Minted NFT whose metadata carries `field_id` as `id_long`
pub(crate) fn minted(uid: &str, field_id: &str) -> NftDetails {
    NftDetails {
        uid: uid.to_string(),
        name: Some(field_id.to_string()),
        initial_mint_tx_hash: Some(format!("hash-{uid}")),
        minted_on_blockchain: Some("Cardano".to_string()),
        metadata: Some(serde_json::Value::String(
            serde_json::json!({ "721": { "policy": { uid: { "id_long": field_id } } } })
                .to_string(),
        )),
        asset_name: None,
        fingerprint: None,
        policy_id: None,
    }
}

/// Config pointing every path into `dir`, with fast retries and no watchdog
pub(crate) fn test_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.join("test.db");
    config.artifacts.directory = dir.join("artifacts");
    config.upstream.retry = RetryConfig {
        max_attempts: 1,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    config.channel.poll_interval = Duration::from_millis(10);
    config.channel.redelivery_delay = Duration::ZERO;
    config.channel.max_receive_count = 3;
    config.watchdog.enabled = false;
    config
}

/// Filesystem artifact store whose deletes always fail
pub(crate) struct UndeletableArtifacts {
    inner: FsArtifactStore,
    pub(crate) delete_calls: AtomicUsize,
}

impl UndeletableArtifacts {
    pub(crate) fn new(config: &Config) -> Arc<Self> {
        Arc::new(Self {
            inner: FsArtifactStore::new(&config.artifacts),
            delete_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ArtifactStore for UndeletableArtifacts {
    async fn put_csv(&self, id: ReportId, bytes: Vec<u8>) -> crate::Result<String> {
        self.inner.put_csv(id, bytes).await
    }

    async fn exists(&self, id: ReportId) -> crate::Result<bool> {
        self.inner.exists(id).await
    }

    async fn delete(&self, _id: ReportId) -> crate::Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::Io(std::io::Error::from(
            std::io::ErrorKind::PermissionDenied,
        )))
    }
}

/// Helper to create a test ReportService backed by `api`.
/// Returns the service and the tempdir (which must be kept alive).
pub(crate) async fn create_test_service_with(
    api: Arc<MockMintingApi>,
    tweak: impl FnOnce(&mut Config),
) -> (ReportService, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    tweak(&mut config);

    let service = ReportService::with_overrides(
        config,
        ServiceOverrides {
            minting_api: Some(api as Arc<dyn MintingApi>),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    (service, temp_dir)
}

/// Helper to create a test ReportService over a 23-transaction project
pub(crate) async fn create_test_service() -> (ReportService, tempfile::TempDir) {
    create_test_service_with(MockMintingApi::with_project(23, 1), |_| {}).await
}

/// Process messages until the channel has nothing deliverable
pub(crate) async fn drain(service: &ReportService) -> usize {
    let mut handled = 0;
    while service.process_next_message().await.unwrap() {
        handled += 1;
        assert!(handled < 1000, "channel never drained");
    }
    handled
}
