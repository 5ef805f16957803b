//! Upstream minting API
//!
//! [`MintingApi`] is the seam between the report pipeline and the external
//! service. [`HttpMintingApi`] talks to the real API over HTTP; every call the
//! pipeline makes goes through [`RateLimitedClient`], which bounds concurrency
//! and retries failures.

use crate::config::UpstreamConfig;
use crate::error::{Error, Result};
use crate::retry::IsRetryable;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

mod metadata;
mod rate_limited;

pub use metadata::{decode_token_uid, extract_field_id};
pub use rate_limited::RateLimitedClient;

/// Transaction states that mean the mint never happened
const FAILED_TRANSACTION_STATES: [&str; 6] = [
    "error",
    "failed",
    "canceled",
    "cancelled",
    "expired",
    "rejected",
];

/// A single failed upstream call
///
/// Every upstream failure is retryable; the rate-limited client gives up
/// after its retry budget and surfaces [`Error::UpstreamApi`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct UpstreamError {
    /// HTTP status, when a response was received
    pub status: Option<u16>,
    /// Error text from the response body, or the transport error
    pub message: String,
}

impl UpstreamError {
    /// Failure without an HTTP response
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

impl IsRetryable for UpstreamError {
    fn is_retryable(&self) -> bool {
        true
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        Self {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// One transaction of the project listing
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTransaction {
    /// Upstream transaction id
    #[serde(default, alias = "transactionid")]
    pub transaction_id: Option<String>,
    /// Upstream state, e.g. `confirmed` or `error`
    #[serde(default)]
    pub state: Option<String>,
    /// Chain the transaction was submitted to
    #[serde(default)]
    pub blockchain: Option<String>,
    /// NFTs declared by the transaction
    #[serde(
        default,
        rename = "transactionNfts",
        alias = "nfts",
        deserialize_with = "null_as_empty"
    )]
    pub nfts: Vec<TransactionNft>,
}

impl ProjectTransaction {
    /// Whether the upstream reports this transaction as failed
    pub fn is_failed(&self) -> bool {
        self.state
            .as_deref()
            .map(|s| s.trim().to_ascii_lowercase())
            .is_some_and(|s| FAILED_TRANSACTION_STATES.contains(&s.as_str()))
    }
}

/// NFT entry of a transaction
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionNft {
    /// NFT uid, possibly percent-encoded
    #[serde(alias = "nftuid", alias = "uid")]
    pub nft_uid: String,
    /// On-chain asset name
    #[serde(default, alias = "assetname")]
    pub asset_name: Option<String>,
}

/// NFT detail record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NftDetails {
    /// NFT uid
    #[serde(default)]
    pub uid: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Hash of the mint transaction, absent until minted
    #[serde(default, rename = "initialminttxhash")]
    pub initial_mint_tx_hash: Option<String>,
    /// Chain the NFT was minted on
    #[serde(default, rename = "mintedOnBlockchain")]
    pub minted_on_blockchain: Option<String>,
    /// CIP-25 metadata, either a JSON document or a string holding one
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    /// On-chain asset name
    #[serde(default, rename = "assetname")]
    pub asset_name: Option<String>,
    /// Asset fingerprint
    #[serde(default)]
    pub fingerprint: Option<String>,
    /// Minting policy id
    #[serde(default, rename = "policyid")]
    pub policy_id: Option<String>,
}

/// Operations the report pipeline needs from the minting service
#[async_trait]
pub trait MintingApi: Send + Sync {
    /// All transactions of the configured project
    async fn list_transactions(&self) -> std::result::Result<Vec<ProjectTransaction>, UpstreamError>;

    /// Detail record for one NFT
    async fn nft_details(&self, nft_uid: &str) -> std::result::Result<NftDetails, UpstreamError>;
}

/// [`MintingApi`] over HTTP with a bearer API key
pub struct HttpMintingApi {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    project_uid: String,
}

impl HttpMintingApi {
    /// Build a client for the configured endpoint
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        url::Url::parse(&config.base_url).map_err(|e| Error::Config {
            message: format!("invalid base URL '{}': {}", config.base_url, e),
            key: Some("upstream.base_url".to_string()),
        })?;
        if config.project_uid.trim().is_empty() {
            return Err(Error::Config {
                message: "project uid is required to list transactions".to_string(),
                key: Some("upstream.project_uid".to_string()),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            project_uid: config.project_uid.trim().to_string(),
        })
    }

    fn endpoint(&self, path: &str, param: &str) -> String {
        format!(
            "{}/v2/{}/{}",
            self.base_url,
            path,
            urlencoding::encode(param)
        )
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
    ) -> std::result::Result<T, UpstreamError> {
        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError {
                status: Some(status.as_u16()),
                message: error_message_from_body(&body).unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("upstream request failed")
                        .to_string()
                }),
            });
        }

        response.json::<T>().await.map_err(|e| UpstreamError {
            status: Some(status.as_u16()),
            message: format!("invalid response body: {}", e),
        })
    }
}

/// Pull `errorMessage` or `message` out of an error response body
fn error_message_from_body(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["errorMessage", "message"]
        .iter()
        .filter_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(str::trim)
        .find(|m| !m.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl MintingApi for HttpMintingApi {
    async fn list_transactions(&self) -> std::result::Result<Vec<ProjectTransaction>, UpstreamError> {
        let url = self.endpoint("GetProjectTransactions", &self.project_uid);
        tracing::debug!(url = %url, "Listing project transactions");
        self.get_json(&url).await
    }

    async fn nft_details(&self, nft_uid: &str) -> std::result::Result<NftDetails, UpstreamError> {
        let url = self.endpoint("GetNftDetailsById", nft_uid);
        self.get_json(&url).await
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> UpstreamConfig {
        UpstreamConfig {
            base_url: server.uri(),
            api_key: Some("test-key".into()),
            project_uid: "project-1".into(),
            request_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_list_transactions_sends_bearer_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/GetProjectTransactions/project-1"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "transactionid": "t1",
                    "state": "confirmed",
                    "transactionNfts": [{ "nftUid": "nft-1" }, { "nftUid": "nft%202" }]
                },
                { "transactionid": "t2", "state": "error", "transactionNfts": null }
            ])))
            .mount(&server)
            .await;

        let api = HttpMintingApi::new(&config_for(&server)).unwrap();
        let transactions = api.list_transactions().await.unwrap();

        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].transaction_id.as_deref(), Some("t1"));
        assert_eq!(transactions[0].nfts.len(), 2);
        assert_eq!(transactions[0].nfts[1].nft_uid, "nft%202");
        assert!(!transactions[0].is_failed());
        assert!(transactions[1].is_failed());
        assert!(transactions[1].nfts.is_empty());
    }

    #[tokio::test]
    async fn test_nft_details_parses_upstream_field_names() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/GetNftDetailsById/nft-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "uid": "nft-1",
                "name": "Field 7",
                "initialminttxhash": "abc123",
                "mintedOnBlockchain": "Cardano",
                "metadata": "{\"721\":{\"policy\":{\"Field7\":{\"id_long\":\"F-0007\"}}}}",
                "assetname": "Field7",
                "fingerprint": "asset1xyz",
                "policyid": "policy"
            })))
            .mount(&server)
            .await;

        let api = HttpMintingApi::new(&config_for(&server)).unwrap();
        let details = api.nft_details("nft-1").await.unwrap();

        assert_eq!(details.uid, "nft-1");
        assert_eq!(details.initial_mint_tx_hash.as_deref(), Some("abc123"));
        assert_eq!(details.minted_on_blockchain.as_deref(), Some("Cardano"));
        assert_eq!(extract_field_id(details.metadata.as_ref()), "F-0007");
    }

    #[tokio::test]
    async fn test_error_body_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/GetNftDetailsById/nft-1"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "resultState": "Error",
                "errorMessage": "Too many requests. Please try again later."
            })))
            .mount(&server)
            .await;

        let api = HttpMintingApi::new(&config_for(&server)).unwrap();
        let err = api.nft_details("nft-1").await.unwrap_err();

        assert_eq!(err.status, Some(429));
        assert_eq!(err.message, "Too many requests. Please try again later.");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_error_without_body_uses_reason_phrase() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let api = HttpMintingApi::new(&config_for(&server)).unwrap();
        let err = api.list_transactions().await.unwrap_err();

        assert_eq!(err.status, Some(503));
        assert_eq!(err.message, "Service Unavailable");
    }

    #[test]
    fn test_missing_project_uid_is_a_config_error() {
        let config = UpstreamConfig::default();
        match HttpMintingApi::new(&config) {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("upstream.project_uid"))
            }
            Err(other) => panic!("unexpected error {other:?}"),
            Ok(_) => panic!("expected config error"),
        }
    }

    #[test]
    fn test_uid_is_path_encoded() {
        let config = UpstreamConfig {
            project_uid: "p".into(),
            base_url: "https://example.test/".into(),
            ..Default::default()
        };
        let api = HttpMintingApi::new(&config).unwrap();
        assert_eq!(
            api.endpoint("GetNftDetailsById", "a b/c"),
            "https://example.test/v2/GetNftDetailsById/a%20b%2Fc"
        );
    }
}
