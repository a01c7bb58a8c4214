//! Remote bridge protocol
//!
//! A bridge forwards raw session-log records from a developer machine to a
//! server that cannot see the local filesystem. The wire format is
//! `POST /api/bridge` with `{"sessionId": "...", "messages": [record, ...]}`,
//! answered by `{"ok": true, "processed": n}`.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::BridgeConfig;
use crate::error::{Error, Result};

/// Path of the bridge endpoint on the server
pub const BRIDGE_PATH: &str = "/api/bridge";

/// One file's worth of new session-log records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeBatch {
    pub session_id: String,
    pub messages: Vec<Value>,
}

impl BridgeBatch {
    /// Build a batch from raw log lines, dropping lines that are not valid JSON
    pub fn from_lines<S: AsRef<str>>(session_id: impl Into<String>, lines: &[S]) -> Self {
        Self {
            session_id: session_id.into(),
            messages: lines
                .iter()
                .filter_map(|l| serde_json::from_str(l.as_ref()).ok())
                .collect(),
        }
    }

    /// Validate an untrusted request body
    pub fn from_json(body: &Value) -> Result<Self> {
        let session_id = body
            .get("sessionId")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::InvalidPayload("sessionId is required".to_string()))?;
        let messages = body
            .get("messages")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::InvalidPayload("messages must be an array".to_string()))?;
        Ok(Self {
            session_id: session_id.to_string(),
            messages: messages.clone(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Response from POST /api/bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeResponse {
    pub ok: bool,
    #[serde(default)]
    pub processed: usize,
}

/// HTTP client for a remote server's bridge endpoint
pub struct BridgeClient {
    config: BridgeConfig,
    http_client: reqwest::Client,
    base_url: String,
}

impl BridgeClient {
    pub fn new(config: BridgeConfig) -> Result<Self> {
        let base_url = config.server_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::Config("bridge.server_url is required".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(api_key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", api_key))
                    .map_err(|e| Error::Config(format!("invalid api_key: {}", e)))?,
            );
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
            base_url,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, BRIDGE_PATH)
    }

    /// Send one batch
    pub async fn send_batch(&self, batch: &BridgeBatch) -> Result<BridgeResponse> {
        let response = self
            .http_client
            .post(self.endpoint())
            .json(batch)
            .send()
            .await
            .map_err(|e| Error::Bridge(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| Error::Bridge(format!("failed to parse response: {}", e)))
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::Bridge(format!(
                "API error ({}): {}",
                status.as_u16(),
                error_text
            )))
        }
    }

    /// Send a batch, retrying transient failures (5xx, network) with
    /// exponential backoff.
    pub async fn send_batch_with_retry(&self, batch: &BridgeBatch) -> Result<BridgeResponse> {
        let mut last_error = None;
        let mut delay = Duration::from_millis(500);

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::debug!(
                    session_id = %batch.session_id,
                    "Retrying bridge batch (attempt {}/{}), waiting {:?}",
                    attempt + 1,
                    self.config.max_retries + 1,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, Duration::from_secs(30));
            }

            match self.send_batch(batch).await {
                Ok(response) => return Ok(response),
                Err(e) if is_retryable_error(&e) => {
                    tracing::warn!("Transient error sending bridge batch: {}", e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Bridge("max retries exceeded".to_string())))
    }
}

/// Blocking wrapper for use from synchronous watcher loops
pub struct SyncBridgeClient {
    inner: BridgeClient,
    runtime: tokio::runtime::Runtime,
}

impl SyncBridgeClient {
    pub fn new(config: BridgeConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Bridge(format!("failed to create runtime: {}", e)))?;
        Ok(Self {
            inner: BridgeClient::new(config)?,
            runtime,
        })
    }

    pub fn send(&self, batch: &BridgeBatch) -> Result<BridgeResponse> {
        self.runtime.block_on(self.inner.send_batch_with_retry(batch))
    }

    pub fn endpoint(&self) -> String {
        self.inner.endpoint()
    }
}

/// Whether an error is worth retrying
fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Bridge(msg) => {
            msg.starts_with("API error (5") || msg.starts_with("HTTP request failed")
        }
        _ => false,
    }
}
