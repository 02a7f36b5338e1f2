//! Transmission RPC client.
//!
//! `BandwidthClient` abstracts the torrent client for testability; tests use
//! a hand-rolled mock, production uses [`TransmissionClient`] over
//! Transmission's JSON-RPC-ish HTTP protocol:
//!
//! - every call is a POST to `{base}/transmission/rpc`
//! - a 409 response carries an `X-Transmission-Session-Id` header (CSRF
//!   protection); the client retains it and retries the request once
//! - responses are `{"result": "success", "arguments": {...}}`
//!
//! Only three methods are needed: `session-stats` for the lifetime
//! cumulative counters, `session-get` for the current alt-speed flag,
//! `session-set` to flip it.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::error::{LimiterError, Result};

/// Point-in-time view of the client's counters and throttle flag, read once
/// per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageSnapshot {
    /// Lifetime downloaded + uploaded bytes.
    pub cumulative_bytes: i64,
    /// Whether the alternate (reduced) speed limits are currently active.
    pub alt_speed_enabled: bool,
}

/// Abstracts the torrent client's RPC surface for testability.
#[async_trait]
pub trait BandwidthClient: Send + Sync {
    /// Read the cumulative transfer counters and the current throttle flag.
    async fn snapshot(&self) -> Result<UsageSnapshot>;

    /// Enable or disable the alternate speed limits.
    async fn set_alt_speed(&self, enabled: bool) -> Result<()>;
}

/// Resolved RPC endpoint: scheme/host/port plus optional credentials.
#[derive(Debug, Clone)]
pub struct RpcEndpoint {
    base: String,
    username: Option<String>,
    password: Option<String>,
}

impl RpcEndpoint {
    /// Parse a base URL like `http://localhost:9091`. The port defaults to
    /// 443 for https and 80 otherwise; the path is always
    /// `/transmission/rpc` regardless of what the URL carries.
    pub fn parse(
        raw_url: &str,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self> {
        let url = Url::parse(raw_url)
            .map_err(|e| LimiterError::Config(format!("invalid transmission url {raw_url}: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| LimiterError::Config(format!("transmission url {raw_url} has no host")))?;
        let scheme = if url.scheme() == "https" { "https" } else { "http" };
        let port = url
            .port()
            .unwrap_or(if scheme == "https" { 443 } else { 80 });
        Ok(Self {
            base: format!("{scheme}://{host}:{port}/transmission/rpc"),
            username,
            password,
        })
    }

    /// Full RPC URL.
    pub fn url(&self) -> &str {
        &self.base
    }
}

/// Production client speaking the Transmission RPC protocol over reqwest.
pub struct TransmissionClient {
    http: reqwest::Client,
    endpoint: RpcEndpoint,
    /// CSRF token learned from the first 409 response.
    session_id: Mutex<Option<String>>,
}

const SESSION_ID_HEADER: &str = "X-Transmission-Session-Id";

impl TransmissionClient {
    pub fn new(endpoint: RpcEndpoint) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            session_id: Mutex::new(None),
        }
    }

    /// Issue one RPC call, transparently handling the 409 session-id
    /// handshake with a single retry.
    async fn call(&self, method: &str, arguments: Value) -> Result<Value> {
        let body = json!({ "method": method, "arguments": arguments });
        let mut response = self.post(&body).await?;

        if response.status() == reqwest::StatusCode::CONFLICT {
            let token = response
                .headers()
                .get(SESSION_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    LimiterError::Rpc("409 response without a session id".to_string())
                })?
                .to_string();
            debug!(method, "acquired transmission session id, retrying");
            *self.session_id.lock().expect("session id lock poisoned") = Some(token);
            response = self.post(&body).await?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(LimiterError::Rpc(format!(
                "{method} failed with HTTP {status}"
            )));
        }

        let envelope: Value = response.json().await?;
        parse_envelope(method, envelope)
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response> {
        let mut request = self.http.post(self.endpoint.url()).json(body);
        if let Some(username) = &self.endpoint.username {
            request = request.basic_auth(username, self.endpoint.password.as_deref());
        }
        let token = self
            .session_id
            .lock()
            .expect("session id lock poisoned")
            .clone();
        if let Some(token) = token {
            request = request.header(SESSION_ID_HEADER, token);
        }
        Ok(request.send().await?)
    }
}

/// Unwrap `{"result": "success", "arguments": {...}}`, surfacing any other
/// `result` string as an RPC failure.
fn parse_envelope(method: &str, envelope: Value) -> Result<Value> {
    match envelope.get("result").and_then(Value::as_str) {
        Some("success") => Ok(envelope
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| json!({}))),
        Some(other) => Err(LimiterError::Rpc(format!("{method} returned: {other}"))),
        None => Err(LimiterError::Rpc(format!(
            "{method} response missing result field"
        ))),
    }
}

/// Sum of `cumulative-stats.downloadedBytes` and `.uploadedBytes`; absent
/// fields count as zero, matching a daemon with fresh stats.
fn cumulative_bytes(arguments: &Value) -> i64 {
    let stats = arguments.get("cumulative-stats");
    let field = |name: &str| {
        stats
            .and_then(|s| s.get(name))
            .and_then(Value::as_i64)
            .unwrap_or(0)
    };
    field("downloadedBytes") + field("uploadedBytes")
}

#[async_trait]
impl BandwidthClient for TransmissionClient {
    async fn snapshot(&self) -> Result<UsageSnapshot> {
        let stats = self.call("session-stats", json!({})).await?;
        let session = self
            .call("session-get", json!({ "fields": ["alt-speed-enabled"] }))
            .await?;
        let alt_speed_enabled = session
            .get("alt-speed-enabled")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(UsageSnapshot {
            cumulative_bytes: cumulative_bytes(&stats),
            alt_speed_enabled,
        })
    }

    async fn set_alt_speed(&self, enabled: bool) -> Result<()> {
        self.call("session-set", json!({ "alt-speed-enabled": enabled }))
            .await?;
        Ok(())
    }
}
