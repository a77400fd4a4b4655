//! Transport seam: the network primitive the interceptor sits in front of

use super::types::{HttpRequest, NetworkResponse};
use crate::config::timeouts;
use crate::error::{PostcacheError, PostcacheResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Executes HTTP requests against the network
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request and collect the whole response.
    ///
    /// Non-2xx statuses are responses, not errors; only failures to obtain a
    /// response at all are `Err`.
    async fn execute(&self, request: &HttpRequest) -> PostcacheResult<NetworkResponse>;
}

pub type SharedTransport = Arc<dyn Transport>;

/// `reqwest`-backed transport
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with the default timeouts
    pub fn new() -> PostcacheResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeouts::network::connect_timeout())
            .timeout(timeouts::network::http_request_timeout())
            .user_agent(concat!("postcache/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PostcacheError::http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: &HttpRequest) -> PostcacheResult<NetworkResponse> {
        debug!("Making HTTP request: {} {}", request.method, request.url);

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let start = Instant::now();
        let response = builder.send().await?;

        let status = response.status();
        let url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = response.text().await?;

        Ok(NetworkResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            url,
            headers,
            body,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }
}
