//! Endpoint catalog configuration.
//!
//! Backend services are described by a static, config-supplied list of
//! [`ServiceEndpoint`] descriptors, loaded once at startup from a YAML
//! file. An endpoint is never mutated after construction; per-endpoint
//! call policy (timeout, retries, enabled flag) travels with it.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default per-call timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
/// Default retry attempts for backend calls.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

fn default_enabled() -> bool {
    true
}
fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}
fn default_retries() -> u32 {
    DEFAULT_RETRY_ATTEMPTS
}

// ---------------------------------------------------------------------------
// ServiceEndpoint
// ---------------------------------------------------------------------------

/// One configured backend service.
///
/// # Example (YAML)
///
/// ```yaml
/// endpoints:
///   - name: policy_service
///     address: http://localhost:9001/rpc
///     timeout_seconds: 10
///     retry_attempts: 2
///   - name: claims_service
///     address: http://localhost:9002/rpc
///     enabled: false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// Unique service name; also the qualification prefix in the registry.
    pub name: String,
    /// Address of the service's JSON-RPC endpoint.
    pub address: String,
    /// Disabled endpoints are skipped by discovery batches.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Maximum call attempts before a failure is terminal.
    #[serde(default = "default_retries")]
    pub retry_attempts: u32,
}

impl ServiceEndpoint {
    /// Create an endpoint with default policy.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            enabled: true,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }

    /// Builder: set the per-call timeout in seconds.
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Builder: set the retry attempts.
    pub fn with_retries(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Builder: mark the endpoint as disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

// ---------------------------------------------------------------------------
// EndpointCatalog
// ---------------------------------------------------------------------------

/// The full set of configured backend endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointCatalog {
    /// All configured endpoints, enabled or not.
    #[serde(default)]
    pub endpoints: Vec<ServiceEndpoint>,
}

impl EndpointCatalog {
    /// Build a catalog from an endpoint list.
    pub fn new(endpoints: Vec<ServiceEndpoint>) -> Self {
        Self { endpoints }
    }

    /// Parse a catalog from YAML.
    pub fn from_yaml(content: &str) -> Result<Self, anyhow::Error> {
        let catalog: Self = serde_yaml::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load and validate a catalog from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Reject duplicate or empty endpoint names/addresses.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            if endpoint.name.trim().is_empty() {
                anyhow::bail!("endpoint with empty name (address: {})", endpoint.address);
            }
            if endpoint.address.trim().is_empty() {
                anyhow::bail!("endpoint '{}' has an empty address", endpoint.name);
            }
            if !seen.insert(endpoint.name.as_str()) {
                anyhow::bail!("duplicate endpoint name '{}'", endpoint.name);
            }
        }
        Ok(())
    }

    /// Look up an endpoint by service name.
    pub fn get(&self, name: &str) -> Option<&ServiceEndpoint> {
        self.endpoints.iter().find(|e| e.name == name)
    }

    /// Iterate over enabled endpoints only.
    pub fn enabled(&self) -> impl Iterator<Item = &ServiceEndpoint> {
        self.endpoints.iter().filter(|e| e.enabled)
    }

    /// Number of configured endpoints (enabled or not).
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether the catalog has no endpoints.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
