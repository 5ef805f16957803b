//! Wiremock stand-in for the upstream minting platform

use mint_reports::Config;
use mint_reports::config::RetryConfig;
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const PROJECT_UID: &str = "project-under-test";
pub const API_KEY: &str = "integration-key";

/// Transaction listing with `count` confirmed transactions of one NFT each
pub fn listing(count: usize) -> serde_json::Value {
    let transactions: Vec<_> = (0..count)
        .map(|t| {
            json!({
                "transactionid": format!("tx-{t}"),
                "state": "confirmed",
                "transactionNfts": [{ "nftUid": format!("nft-{t}") }]
            })
        })
        .collect();
    json!(transactions)
}

/// Answers `GetNftDetailsById/{uid}` with a minted Cardano NFT derived from the uid
struct NftDetailsResponder;

impl Respond for NftDetailsResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let uid = request
            .url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
            .to_string();

        ResponseTemplate::new(200).set_body_json(json!({
            "uid": uid,
            "name": format!("Field {uid}"),
            "initialminttxhash": format!("hash-{uid}"),
            "mintedOnBlockchain": "Cardano",
            "metadata": format!(r#"{{"721":{{"policy":{{"asset":{{"id_long":"FIELD-{uid}"}}}}}}}}"#),
        }))
    }
}

/// Mount a project listing plus a details endpoint for every uid
pub async fn mount_project(server: &MockServer, listing: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/v2/GetProjectTransactions/{PROJECT_UID}")))
        .and(header("authorization", format!("Bearer {API_KEY}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/v2/GetNftDetailsById/[^/]+$"))
        .respond_with(NftDetailsResponder)
        .mount(server)
        .await;
}

/// Config pointing at `server`, persisting under `dir`
pub fn config_for(server: &MockServer, dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.upstream.base_url = server.uri();
    config.upstream.project_uid = PROJECT_UID.to_string();
    config.upstream.api_key = Some(API_KEY.to_string());
    config.upstream.retry = RetryConfig {
        max_attempts: 1,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    config.persistence.database_path = dir.path().join("reports.db");
    config.artifacts.directory = dir.path().join("artifacts");
    config.channel.poll_interval = Duration::from_millis(10);
    config.channel.redelivery_delay = Duration::ZERO;
    config.watchdog.enabled = false;
    config
}
