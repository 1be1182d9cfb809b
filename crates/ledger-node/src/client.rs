//! `NodeClient` over plain HTTP: `GET http://{peer}/chain`.

use async_trait::async_trait;
use ledger_core::{ChainResponse, NodeClient, PeerError};
use std::time::Duration;
use tracing::debug;

pub struct HttpNodeClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl HttpNodeClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        // Peers are dialed directly, never through a proxy.
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()?;
        Ok(Self { http, timeout })
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn fetch_chain(&self, peer: &str) -> Result<ChainResponse, PeerError> {
        let url = format!("http://{peer}/chain");
        debug!("GET {}", url);
        let res = self.http.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                PeerError::Timeout {
                    peer: peer.to_string(),
                    after: self.timeout,
                }
            } else {
                PeerError::Unreachable {
                    peer: peer.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = res.status();
        if !status.is_success() {
            return Err(PeerError::InvalidResponse {
                peer: peer.to_string(),
                reason: format!("status {status}"),
            });
        }
        res.json::<ChainResponse>()
            .await
            .map_err(|e| PeerError::InvalidResponse {
                peer: peer.to_string(),
                reason: e.to_string(),
            })
    }
}
