//! Transport layer for backend service connections.
//!
//! All communication with a backend goes through the [`ServiceTransport`]
//! trait: a scoped session (`connect`/`disconnect`) plus a request/response
//! call in JSON-RPC 2.0 terms. [`HttpTransport`] is the production
//! implementation; tests substitute a scripted in-process transport.

#[cfg(test)]
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// TransportKind
// ---------------------------------------------------------------------------

/// Identifies the protocol behind a transport implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// JSON-RPC 2.0 over HTTP POST.
    Http,
    /// In-process transport (tests and embedding).
    InProcess,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Http => write!(f, "http"),
            TransportKind::InProcess => write!(f, "in-process"),
        }
    }
}

// ---------------------------------------------------------------------------
// ServiceTransport
// ---------------------------------------------------------------------------

/// Low-level session to one backend service.
///
/// Implementations own connection state; callers are expected to release
/// the session with `disconnect` on every exit path, including failures.
#[async_trait]
pub trait ServiceTransport: Send + Sync {
    /// The transport protocol in use.
    fn kind(&self) -> TransportKind;

    /// Whether an active session exists.
    fn connected(&self) -> bool;

    /// Establish a session. A no-op when already connected.
    async fn connect(&mut self) -> Result<(), anyhow::Error>;

    /// Release the session. A no-op when not connected.
    async fn disconnect(&mut self) -> Result<(), anyhow::Error>;

    /// Issue one request and return the JSON-RPC `result` payload.
    async fn request(&self, method: &str, params: Value) -> Result<Value, anyhow::Error>;

    /// Stable identifier for logging, keyed by protocol and address.
    fn server_identifier(&self) -> String;
}

// ---------------------------------------------------------------------------
// HttpTransport
// ---------------------------------------------------------------------------

/// JSON-RPC 2.0 over HTTP.
///
/// Each call POSTs one request object to the endpoint address; the
/// session handshake is an `initialize` exchange.
pub struct HttpTransport {
    url: String,
    client: reqwest::Client,
    connected: bool,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Create a transport targeting `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            connected: false,
            next_id: AtomicU64::new(1),
        }
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value, anyhow::Error> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let envelope: Value = response.json().await?;

        if let Some(error) = envelope.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            anyhow::bail!("backend error {}: {}", code, message);
        }

        Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl ServiceTransport for HttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    fn connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<(), anyhow::Error> {
        if self.connected {
            return Ok(());
        }
        self.rpc(
            "initialize",
            json!({
                "protocolVersion": "2024-11-05",
                "clientInfo": {"name": "switchboard", "version": crate::VERSION},
                "capabilities": {},
            }),
        )
        .await?;
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), anyhow::Error> {
        self.connected = false;
        Ok(())
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, anyhow::Error> {
        self.rpc(method, params).await
    }

    fn server_identifier(&self) -> String {
        format!("http:{}", self.url)
    }
}

// ---------------------------------------------------------------------------
// StaticTransport (test double)
// ---------------------------------------------------------------------------

/// Scripted in-process transport for tests.
///
/// Responses are keyed by method name; unscripted methods fail. Methods in
/// the hang set never resolve, which exercises timeout handling.
#[cfg(test)]
#[derive(Default)]
pub struct StaticTransport {
    identifier: String,
    responses: HashMap<String, Value>,
    failures: HashMap<String, String>,
    hanging: HashSet<String>,
    fail_connect: Option<String>,
    connected: bool,
}

#[cfg(test)]
impl StaticTransport {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Self::default()
        }
        .with_response("initialize", json!({"protocolVersion": "2024-11-05"}))
    }

    /// Script a successful response for `method`.
    pub fn with_response(mut self, method: &str, result: Value) -> Self {
        self.responses.insert(method.to_string(), result);
        self
    }

    /// Script a failure for `method`.
    pub fn with_failure(mut self, method: &str, message: &str) -> Self {
        self.failures.insert(method.to_string(), message.to_string());
        self
    }

    /// Make `method` hang forever.
    pub fn with_hang(mut self, method: &str) -> Self {
        self.hanging.insert(method.to_string());
        self
    }

    /// Make session establishment fail.
    pub fn failing_connect(mut self, message: &str) -> Self {
        self.fail_connect = Some(message.to_string());
        self
    }

    /// Script empty enumerations for all four capability kinds.
    pub fn with_empty_listings(self) -> Self {
        self.with_response("tools/list", json!({"tools": []}))
            .with_response("resources/list", json!({"resources": []}))
            .with_response("resources/templates/list", json!({"resourceTemplates": []}))
            .with_response("prompts/list", json!({"prompts": []}))
    }
}

#[cfg(test)]
#[async_trait]
impl ServiceTransport for StaticTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::InProcess
    }

    fn connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<(), anyhow::Error> {
        if let Some(message) = &self.fail_connect {
            anyhow::bail!("{}", message.clone());
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), anyhow::Error> {
        self.connected = false;
        Ok(())
    }

    async fn request(&self, method: &str, _params: Value) -> Result<Value, anyhow::Error> {
        if self.hanging.contains(method) {
            futures::future::pending::<()>().await;
        }
        if let Some(message) = self.failures.get(method) {
            anyhow::bail!("{}", message.clone());
        }
        self.responses
            .get(method)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("method not found: {}", method))
    }

    fn server_identifier(&self) -> String {
        format!("in-process:{}", self.identifier)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
