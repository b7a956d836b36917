//! HTTP request executor for the execution backend.
//!
//! This is the only place that touches `reqwest`. It owns the timeouts, the
//! bound on in-flight connections and the connect-failure retry. Status code
//! interpretation beyond "2xx or not" belongs to the protocol layer.

use crate::error::{JudgeError, JudgeResult};
use recode_common::config::JudgeConfig;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Timeout and pool limits for one transport instance
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Longest wait for a free connection slot
    pub pool_timeout: Duration,
    pub max_connections: usize,
    pub max_idle_connections: usize,
    pub max_attempts: u32,
    /// Backoff before attempt n+1 is `backoff_step * n`
    pub backoff_step: Duration,
}

impl From<&JudgeConfig> for TransportSettings {
    fn from(config: &JudgeConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
            pool_timeout: config.pool_timeout(),
            max_connections: config.max_connections,
            max_idle_connections: config.max_idle_connections,
            max_attempts: config.max_attempts.max(1),
            backoff_step: config.retry_backoff(),
        }
    }
}

/// How long a call may spend reading the response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadBudget {
    /// `read_timeout + write_timeout`
    Standard,
    /// No cap beyond the connect timeout; the backend holds the request open
    Unbounded,
}

/// A 2xx response with its body fully read
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub target: String,
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn json<T: DeserializeOwned>(&self) -> JudgeResult<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            JudgeError::malformed(
                self.target.clone(),
                format!("{} (body: {})", e, crate::error::truncate_body(&self.body)),
            )
        })
    }
}

struct SendFailure {
    connect: bool,
    cause: String,
}

impl From<reqwest::Error> for SendFailure {
    fn from(err: reqwest::Error) -> Self {
        SendFailure {
            connect: err.is_connect(),
            cause: err.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    permits: Arc<Semaphore>,
    settings: TransportSettings,
}

impl HttpTransport {
    pub fn new(config: &JudgeConfig) -> JudgeResult<Self> {
        let settings = TransportSettings::from(config);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some((key, host)) = config.auth_headers() {
            headers.insert(
                HeaderName::from_static("x-rapidapi-key"),
                header_value(key)?,
            );
            headers.insert(
                HeaderName::from_static("x-rapidapi-host"),
                header_value(host)?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(settings.connect_timeout)
            .pool_max_idle_per_host(settings.max_idle_connections)
            .build()
            .map_err(|e| JudgeError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            permits: Arc::new(Semaphore::new(settings.max_connections.max(1))),
            settings,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    /// Execute one call, retrying only when the connection could not be made.
    ///
    /// Non-2xx answers come back as `BackendRejection` on the first attempt.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
        budget: ReadBudget,
    ) -> JudgeResult<TransportResponse> {
        let url = format!("{}{}", self.base_url, path);
        let target = format!("{} {}", method, url);
        let max_attempts = self.settings.max_attempts;
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match self.send_once(method.clone(), &url, query, body, budget).await {
                Ok((status, text)) => {
                    debug!(target_url = %target, status, attempt, "backend responded");
                    if !(200..300).contains(&status) {
                        warn!(target_url = %target, status, "backend rejected request");
                        return Err(JudgeError::rejection(target, status, &text));
                    }
                    return Ok(TransportResponse {
                        target,
                        status,
                        body: text,
                    });
                }
                Err(failure) if failure.connect && attempt < max_attempts => {
                    let backoff = self.settings.backoff_step * attempt;
                    warn!(
                        target_url = %target,
                        error = %failure.cause,
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        "connection failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(failure) => {
                    warn!(
                        target_url = %target,
                        error = %failure.cause,
                        attempt,
                        "transport failure"
                    );
                    return Err(JudgeError::Transport {
                        target,
                        cause: failure.cause,
                        attempts: attempt,
                        connect: failure.connect,
                    });
                }
            }
        }
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
        budget: ReadBudget,
    ) -> Result<(u16, String), SendFailure> {
        // A pool slot that never frees up counts as a failure to connect
        let _permit = match tokio::time::timeout(self.settings.pool_timeout, self.permits.acquire())
            .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(SendFailure {
                    connect: false,
                    cause: "connection pool closed".to_string(),
                })
            }
            Err(_) => {
                return Err(SendFailure {
                    connect: true,
                    cause: format!(
                        "no free connection within {}ms",
                        self.settings.pool_timeout.as_millis()
                    ),
                })
            }
        };

        let mut request = self.client.request(method, url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        if budget == ReadBudget::Standard {
            request = request.timeout(self.settings.read_timeout + self.settings.write_timeout);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        Ok((status, text))
    }
}

fn header_value(raw: &str) -> JudgeResult<HeaderValue> {
    HeaderValue::from_str(raw)
        .map_err(|e| JudgeError::Configuration(format!("invalid header value: {}", e)))
}
