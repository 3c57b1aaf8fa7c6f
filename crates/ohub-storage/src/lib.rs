//! Provider HTTP transport and the opportunity store capability.

mod store;

pub use store::{InMemoryOpportunityStore, OpportunityStore, PgOpportunityStore, StoreError};

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info_span, Instrument};

pub const CRATE_NAME: &str = "ohub-storage";

/// Retry budget for provider GETs. Health checks never retry.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Doubling delay before retry number `retry` (zero-based), capped at `max_delay`.
    pub fn delay_before(&self, retry: usize) -> Duration {
        let factor = u32::try_from(retry)
            .ok()
            .and_then(|shift| 1u32.checked_shl(shift))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Upstream overload and throttling are transient; other statuses are final.
    pub fn retries_status(status: StatusCode) -> bool {
        status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
    }

    pub fn retries_error(err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect()
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub retry: RetryPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// A provider GET request, independent of the HTTP client that performs it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonRequest {
    pub source_id: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
}

impl JsonRequest {
    pub fn get(source_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("malformed response body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

#[async_trait]
pub trait JsonTransport: Send + Sync {
    /// Fetch and decode a JSON document. Non-2xx statuses are errors.
    async fn get_json(&self, request: &JsonRequest) -> Result<JsonValue, FetchError>;

    /// Single-attempt reachability check bounded by `timeout`.
    async fn probe(&self, request: &JsonRequest, timeout: Duration) -> Result<(), FetchError>;
}

#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            retry: config.retry,
        })
    }

    fn build(&self, request: &JsonRequest) -> reqwest::RequestBuilder {
        let mut builder = self.client.get(&request.url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }

    async fn probe_once(&self, request: &JsonRequest, timeout: Duration) -> Result<(), FetchError> {
        let resp = self.build(request).timeout(timeout).send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: resp.url().to_string(),
            })
        }
    }

    /// One GET. The error side carries whether the failure is worth retrying.
    async fn attempt(&self, request: &JsonRequest) -> Result<JsonValue, (FetchError, bool)> {
        let resp = self.build(request).send().await.map_err(|err| {
            let retryable = RetryPolicy::retries_error(&err);
            (FetchError::Request(err), retryable)
        })?;
        let status = resp.status();
        let url = resp.url().to_string();
        if !status.is_success() {
            let retryable = RetryPolicy::retries_status(status);
            return Err((
                FetchError::HttpStatus {
                    status: status.as_u16(),
                    url,
                },
                retryable,
            ));
        }
        let body = resp
            .bytes()
            .await
            .map_err(|err| (FetchError::Request(err), false))?;
        serde_json::from_slice(&body).map_err(|source| (FetchError::Decode { url, source }, false))
    }

    async fn get_json_with_retries(&self, request: &JsonRequest) -> Result<JsonValue, FetchError> {
        let mut retry = 0usize;
        loop {
            match self.attempt(request).await {
                Ok(payload) => return Ok(payload),
                Err((err, true)) if retry < self.retry.max_retries => {
                    debug!(error = %err, retry, "retrying provider request");
                    tokio::time::sleep(self.retry.delay_before(retry)).await;
                    retry += 1;
                }
                Err((err, _)) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl JsonTransport for HttpFetcher {
    async fn get_json(&self, request: &JsonRequest) -> Result<JsonValue, FetchError> {
        let span = info_span!("http_fetch", source = %request.source_id, url = %request.url);
        self.get_json_with_retries(request).instrument(span).await
    }

    async fn probe(&self, request: &JsonRequest, timeout: Duration) -> Result<(), FetchError> {
        let span = info_span!("http_probe", source = %request.source_id, url = %request.url);
        self.probe_once(request, timeout).instrument(span).await
    }
}
