//! Per-endpoint discovery and call client.
//!
//! A [`ServiceClient`] wraps one backend endpoint's transport. Discovery
//! opens a scoped session, independently enumerates the four capability
//! kinds (tools, resources, resource templates, prompts), and releases the
//! session on every exit path. A failed enumeration of one kind leaves
//! that kind empty and is logged as a warning; only session establishment
//! failure aborts discovery for the endpoint.
//!
//! After discovery the same client serves `tools/call` dispatch traffic,
//! with per-endpoint timeout and retry policy taken from the
//! [`ServiceEndpoint`].

use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::capability::{Capability, ServiceCapabilities};
use crate::config::ServiceEndpoint;
use crate::errors::{CallError, DiscoveryError};
use crate::transport::{HttpTransport, ServiceTransport};

/// Session and call client for one backend endpoint.
pub struct ServiceClient {
    endpoint: ServiceEndpoint,
    transport: Mutex<Box<dyn ServiceTransport>>,
}

impl ServiceClient {
    /// Create a client over an explicit transport.
    pub fn new(endpoint: ServiceEndpoint, transport: Box<dyn ServiceTransport>) -> Self {
        Self {
            endpoint,
            transport: Mutex::new(transport),
        }
    }

    /// Create a client with the production HTTP transport.
    pub fn from_endpoint(endpoint: &ServiceEndpoint) -> Self {
        Self::new(
            endpoint.clone(),
            Box::new(HttpTransport::new(&endpoint.address)),
        )
    }

    /// The service name this client talks to.
    pub fn service_name(&self) -> &str {
        &self.endpoint.name
    }

    /// The endpoint descriptor, including call policy.
    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    /// Whether the underlying transport currently holds a session.
    pub async fn is_connected(&self) -> bool {
        self.transport.lock().await.connected()
    }

    /// Release the session if one is open.
    pub async fn disconnect(&self) {
        let mut transport = self.transport.lock().await;
        if let Err(e) = transport.disconnect().await {
            log::warn!(
                "error disconnecting from '{}': {}",
                self.endpoint.name,
                e
            );
        }
    }

    // -----------------------------------------------------------------------
    // Discovery
    // -----------------------------------------------------------------------

    /// Discover everything this endpoint exposes.
    ///
    /// Returns a single [`ServiceCapabilities`] value so the registry
    /// update is all-or-nothing per service. Partial enumeration failures
    /// are noted under the `partial_failures` metadata key.
    pub async fn discover(&self) -> Result<ServiceCapabilities, DiscoveryError> {
        let name = self.endpoint.name.clone();
        let timeout = self.endpoint.timeout();
        let mut transport = self.transport.lock().await;

        match tokio::time::timeout(timeout, transport.connect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = transport.disconnect().await;
                return Err(DiscoveryError::Session {
                    service: name,
                    address: self.endpoint.address.clone(),
                    message: e.to_string(),
                });
            }
            Err(_) => {
                let _ = transport.disconnect().await;
                return Err(DiscoveryError::Session {
                    service: name,
                    address: self.endpoint.address.clone(),
                    message: format!(
                        "session establishment timed out after {}s",
                        self.endpoint.timeout_seconds
                    ),
                });
            }
        }
        log::info!("session established with '{}'", name);

        let mut caps = ServiceCapabilities::new(&name);
        let mut partial: Vec<&str> = Vec::new();

        match enumerate(&**transport, timeout, "tools/list", "tools", &name).await {
            Some(items) => {
                caps.tools
                    .extend(items.iter().filter_map(|v| Capability::tool_from_value(&name, v)));
            }
            None => partial.push("tools"),
        }

        match enumerate(&**transport, timeout, "resources/list", "resources", &name).await {
            Some(items) => {
                caps.resources.extend(
                    items
                        .iter()
                        .filter_map(|v| Capability::resource_from_value(&name, v, false)),
                );
            }
            None => partial.push("resources"),
        }

        match enumerate(
            &**transport,
            timeout,
            "resources/templates/list",
            "resourceTemplates",
            &name,
        )
        .await
        {
            Some(items) => {
                caps.resources.extend(
                    items
                        .iter()
                        .filter_map(|v| Capability::resource_from_value(&name, v, true)),
                );
            }
            None => partial.push("resource_templates"),
        }

        match enumerate(&**transport, timeout, "prompts/list", "prompts", &name).await {
            Some(items) => {
                caps.prompts
                    .extend(items.iter().filter_map(|v| Capability::prompt_from_value(&name, v)));
            }
            None => partial.push("prompts"),
        }

        caps.metadata.insert(
            "discovered_at".to_string(),
            json!(chrono::Utc::now().to_rfc3339()),
        );
        if !partial.is_empty() {
            caps.metadata
                .insert("partial_failures".to_string(), json!(partial));
        }

        let _ = transport.disconnect().await;

        log::info!(
            "discovered '{}': {} tools, {} resources, {} prompts",
            name,
            caps.tools.len(),
            caps.resources.len(),
            caps.prompts.len()
        );
        Ok(caps)
    }

    // -----------------------------------------------------------------------
    // Tool invocation
    // -----------------------------------------------------------------------

    /// Call a tool on this endpoint, reconnecting on demand.
    ///
    /// Retries transport failures and timeouts up to the endpoint's
    /// configured attempts; a definitive not-found is never retried.
    /// Timed-out attempts retry without backoff so total elapsed time stays
    /// within `retry_attempts × timeout`.
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, CallError> {
        let timeout = self.endpoint.timeout();
        let attempts = self.endpoint.retry_attempts.max(1);
        let mut transport = self.transport.lock().await;

        if !transport.connected() {
            match tokio::time::timeout(timeout, transport.connect()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    return Err(CallError::Transport {
                        message: e.to_string(),
                    })
                }
                Err(_) => {
                    return Err(CallError::Timeout {
                        seconds: self.endpoint.timeout_seconds,
                    })
                }
            }
        }

        let params = json!({"name": tool, "arguments": arguments});
        let mut last = CallError::Transport {
            message: "no attempts executed".to_string(),
        };

        for attempt in 1..=attempts {
            match tokio::time::timeout(timeout, transport.request("tools/call", params.clone()))
                .await
            {
                Ok(Ok(result)) => return Ok(extract_tool_result(result)),
                Ok(Err(e)) => {
                    let message = e.to_string();
                    if message.to_lowercase().contains("not found") {
                        return Err(CallError::NotFound { message });
                    }
                    log::warn!(
                        "tool call '{}' on '{}' failed (attempt {}/{}): {}",
                        tool,
                        self.endpoint.name,
                        attempt,
                        attempts,
                        message
                    );
                    last = CallError::Transport { message };
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_millis(100 * 2u64.pow(attempt - 1)))
                            .await;
                    }
                }
                Err(_) => {
                    log::warn!(
                        "tool call '{}' on '{}' timed out after {}s (attempt {}/{})",
                        tool,
                        self.endpoint.name,
                        self.endpoint.timeout_seconds,
                        attempt,
                        attempts
                    );
                    last = CallError::Timeout {
                        seconds: self.endpoint.timeout_seconds,
                    };
                }
            }
        }

        Err(last)
    }
}

/// Run one capability-kind enumeration, isolated from its siblings.
///
/// Returns `None` on failure after logging; the caller records the kind
/// as a partial failure and moves on.
async fn enumerate(
    transport: &dyn ServiceTransport,
    timeout: Duration,
    method: &str,
    key: &str,
    service: &str,
) -> Option<Vec<Value>> {
    match tokio::time::timeout(timeout, transport.request(method, json!({}))).await {
        Ok(Ok(result)) => Some(
            result
                .get(key)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        ),
        Ok(Err(e)) => {
            log::warn!("{} enumeration failed for '{}': {}", method, service, e);
            None
        }
        Err(_) => {
            log::warn!("{} enumeration timed out for '{}'", method, service);
            None
        }
    }
}

/// Pull the useful payload out of a `tools/call` result.
///
/// Backends respond with `{"content": [{"type": "text", "text": ...}]}`;
/// the text is decoded as JSON when possible, otherwise returned verbatim.
fn extract_tool_result(result: Value) -> Value {
    if let Some(text) = result
        .get("content")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|item| item.get("text"))
        .and_then(Value::as_str)
    {
        return serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()));
    }
    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
