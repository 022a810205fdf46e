use crate::config::BridgeConfig;
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::header;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// A transport-level failure (no HTTP status was produced).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub message: String,
    pub retryable: bool,
}

#[async_trait]
pub trait BridgeTransport: Send + Sync {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<TransportResponse, TransportFailure>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("ReqwestTransport").finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    pub fn new() -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent("vault-desktop/bridge")
            .build()
            .map_err(|error| AppError::Internal(format!("failed to build bridge HTTP client: {error}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BridgeTransport for ReqwestTransport {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<TransportResponse, TransportFailure> {
        let mut request = self
            .client
            .get(url)
            .header(header::CONTENT_TYPE, "application/json");
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|error| TransportFailure {
            message: error.to_string(),
            retryable: !error.is_builder(),
        })?;
        let status = response.status();
        let mut body = response.text().await.map_err(|error| TransportFailure {
            message: format!("response read failed: {error}"),
            retryable: true,
        })?;
        if body.is_empty() && !status.is_success() {
            body = status.canonical_reason().unwrap_or_default().to_string();
        }

        Ok(TransportResponse {
            status: status.as_u16(),
            body,
        })
    }
}

/// Per-call overrides. `cancel` flips to `true` to abort the call, including
/// any attempt in flight and any pending backoff.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub timeout_ms: Option<u64>,
    pub retries: Option<u32>,
    pub headers: Vec<(String, String)>,
    pub cancel: Option<watch::Receiver<bool>>,
}

impl RequestOptions {
    pub fn with_cancel(cancel: watch::Receiver<bool>) -> Self {
        Self {
            cancel: Some(cancel),
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub struct BridgeClient {
    transport: Arc<dyn BridgeTransport>,
    timeout_ms: u64,
    retries: u32,
    retry_delay_ms: u64,
}

impl fmt::Debug for BridgeClient {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("BridgeClient")
            .field("timeout_ms", &self.timeout_ms)
            .field("retries", &self.retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .finish_non_exhaustive()
    }
}

impl BridgeClient {
    pub fn new(config: &BridgeConfig) -> AppResult<Self> {
        Ok(Self::with_transport(Arc::new(ReqwestTransport::new()?), config))
    }

    pub fn with_transport(transport: Arc<dyn BridgeTransport>, config: &BridgeConfig) -> Self {
        Self {
            transport,
            timeout_ms: config.timeout_ms,
            retries: config.retries,
            retry_delay_ms: config.retry_delay_ms,
        }
    }

    /// GETs `base_url + route` and decodes the JSON body.
    ///
    /// Every attempt gets its own deadline. Timeouts, 5xx responses and
    /// transport failures not marked otherwise are retried after a fixed
    /// delay until the attempt budget (`retries + 1`) is spent; the last
    /// error is returned. Client errors fail on the first attempt.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        base_url: &str,
        route: &str,
        options: &RequestOptions,
    ) -> AppResult<T> {
        let url = format!("{}{}", normalize_base_url(base_url), route);
        let timeout_ms = options.timeout_ms.unwrap_or(self.timeout_ms);
        let max_attempts = options.retries.unwrap_or(self.retries).saturating_add(1);
        let mut cancel = options.cancel.clone();

        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::debug!(route = %route, attempt, "bridge request");

            let error = match self
                .attempt::<T>(&url, route, timeout_ms, &options.headers, cancel.as_mut())
                .await
            {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !error.is_retryable() || attempt >= max_attempts {
                return Err(error);
            }
            tracing::warn!(route = %route, attempt, max_attempts, error = %error, "bridge request failed, retrying");

            let backoff = tokio::time::sleep(Duration::from_millis(self.retry_delay_ms));
            match cancel.as_mut() {
                Some(receiver) => tokio::select! {
                    _ = wait_cancelled(receiver) => return Err(cancelled(route)),
                    _ = backoff => {}
                },
                None => backoff.await,
            }
        }
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        url: &str,
        route: &str,
        timeout_ms: u64,
        headers: &[(String, String)],
        cancel: Option<&mut watch::Receiver<bool>>,
    ) -> AppResult<T> {
        // Dropping the losing future aborts the underlying connection.
        let call = tokio::time::timeout(Duration::from_millis(timeout_ms), self.transport.get(url, headers));
        let outcome = match cancel {
            Some(receiver) => tokio::select! {
                _ = wait_cancelled(receiver) => return Err(cancelled(route)),
                outcome = call => outcome,
            },
            None => call.await,
        };

        let response = match outcome {
            Err(_) => {
                return Err(AppError::UpstreamTimeout {
                    route: route.to_string(),
                    timeout_ms,
                })
            }
            Ok(Err(failure)) => {
                return Err(AppError::UpstreamUnknown {
                    route: route.to_string(),
                    message: failure.message,
                    retryable: failure.retryable,
                })
            }
            Ok(Ok(response)) => response,
        };

        if !(200..300).contains(&response.status) {
            return Err(AppError::UpstreamHttp {
                route: route.to_string(),
                status: response.status,
                body: response.body,
            });
        }

        // Syntax and EOF failures are retried; shape mismatches are not.
        serde_json::from_str(&response.body).map_err(|error| AppError::UpstreamUnknown {
            route: route.to_string(),
            message: format!("malformed JSON body: {error}"),
            retryable: !matches!(error.classify(), serde_json::error::Category::Data),
        })
    }
}

pub fn normalize_base_url(base_url: &str) -> &str {
    base_url.trim().trim_end_matches('/')
}

fn cancelled(route: &str) -> AppError {
    AppError::Cancelled(format!("bridge request cancelled on {}", route))
}

async fn wait_cancelled(receiver: &mut watch::Receiver<bool>) {
    if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
        // Sender gone without cancelling: never resolve.
        std::future::pending::<()>().await;
    }
}
