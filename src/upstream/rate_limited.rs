//! Concurrency-bounded, retrying wrapper around [`MintingApi`]

use super::{MintingApi, NftDetails, ProjectTransaction, UpstreamError};
use crate::config::UpstreamConfig;
use crate::error::{Error, Result};
use crate::retry::call_with_retry;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Semaphore;

/// Shared gate in front of the minting API
///
/// At most `max_concurrent_requests` calls are in flight across every clone.
/// A permit is held for one attempt only, so a call waiting out its backoff
/// does not block other callers.
#[derive(Clone)]
pub struct RateLimitedClient {
    api: Arc<dyn MintingApi>,
    gate: Arc<Semaphore>,
    config: UpstreamConfig,
}

impl RateLimitedClient {
    /// Wrap `api` with the limits from `config`
    pub fn new(api: Arc<dyn MintingApi>, config: &UpstreamConfig) -> Self {
        Self {
            api,
            gate: Arc::new(Semaphore::new(config.max_concurrent_requests.max(1))),
            config: config.clone(),
        }
    }

    /// All transactions of the configured project
    pub async fn list_transactions(&self) -> Result<Vec<ProjectTransaction>> {
        self.call("list_transactions", || self.api.list_transactions())
            .await
    }

    /// Detail record for one NFT
    pub async fn nft_details(&self, nft_uid: &str) -> Result<NftDetails> {
        self.call("nft_details", || self.api.nft_details(nft_uid))
            .await
    }

    async fn call<F, Fut, T>(&self, operation: &str, mut request: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, UpstreamError>>,
    {
        let attempts = AtomicU32::new(0);

        let result = call_with_retry(&self.config.retry, operation, || {
            attempts.fetch_add(1, Ordering::Relaxed);
            let pending = request();
            let gate = self.gate.clone();
            async move {
                let _permit = gate
                    .acquire_owned()
                    .await
                    .map_err(|_| UpstreamError::transport("request gate closed"))?;
                pending.await
            }
        })
        .await;

        result.map_err(|e| {
            let attempts = attempts.load(Ordering::Relaxed);
            tracing::error!(
                operation,
                attempts,
                status = ?e.status,
                error = %e.message,
                "Upstream call failed after retries"
            );
            Error::UpstreamApi {
                operation: operation.to_string(),
                attempts,
                status: e.status,
                message: e.message,
            }
        })
    }
}
