//! HTTP Peer Client
//!
//! Fetches a single group/key from one remote peer. Any transport failure or
//! non-success status is surfaced as an error — the caller (the group
//! orchestration) treats peer errors as soft and falls back to its loader.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::BoxError;
use crate::group::PeerClient;

/// [`PeerClient`] speaking the peer HTTP protocol.
pub struct HttpPeerClient {
    /// Base URL including the pool base path, e.g.
    /// `http://peer-b:8002/_meshcache/`
    base_url: String,
    http: reqwest::Client,
}

impl HttpPeerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// Create a client reusing an existing connection pool.
    pub fn with_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn fetch(&self, group: &str, key: &str) -> Result<Bytes, BoxError> {
        let url = format!(
            "{}{}/{}",
            self.base_url,
            urlencoding::encode(group),
            urlencoding::encode(key),
        );

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("peer returned {status}").into());
        }

        Ok(response.bytes().await?)
    }
}

impl std::fmt::Debug for HttpPeerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPeerClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}
