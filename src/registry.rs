//! Capability registry.
//!
//! The registry merges every discovered capability into two namespaces:
//!
//! - `qualified` — `"service.capability"`, authoritative, one entry per
//!   discovered capability.
//! - `unqualified` — flattened short names. The first successfully
//!   registered service wins a short name; later services with a
//!   colliding name are recorded but not inserted. A name is only
//!   overwritten by its owning service's own refresh.
//!
//! The registry is the only state shared across concurrent requests.
//! Mutations run under a single write-lock critical section per service;
//! `lookup` and `summary` take read locks only. Discovery I/O never runs
//! while a lock is held.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::capability::{Capability, ServiceCapabilities};
use crate::config::EndpointCatalog;
use crate::discovery::ServiceClient;

// ---------------------------------------------------------------------------
// Summary types
// ---------------------------------------------------------------------------

/// Per-service capability counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCounts {
    pub tools: usize,
    pub resources: usize,
    pub prompts: usize,
}

/// Read-only diagnostics snapshot. Carries counts only, no payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySummary {
    pub services: BTreeMap<String, ServiceCounts>,
    pub total_capabilities: usize,
    pub collisions: usize,
}

/// A rejected unqualified-name registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameCollision {
    pub name: String,
    /// Service whose registration was rejected.
    pub attempted_service: String,
    /// Service that holds the name.
    pub winning_service: String,
}

// ---------------------------------------------------------------------------
// RegistryInner
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RegistryInner {
    qualified: HashMap<String, Capability>,
    unqualified: HashMap<String, Capability>,
    services: HashMap<String, ServiceCapabilities>,
    collisions: Vec<NameCollision>,
}

impl RegistryInner {
    fn register(&mut self, caps: ServiceCapabilities) {
        for cap in caps.all() {
            let qualified = cap.qualified_name();
            if self.qualified.contains_key(&qualified) {
                log::warn!("replacing qualified entry '{}'", qualified);
            }
            self.qualified.insert(qualified, cap.clone());

            match self.unqualified.get(&cap.name) {
                None => {
                    self.unqualified.insert(cap.name.clone(), cap.clone());
                }
                Some(existing) if existing.service == cap.service => {
                    self.unqualified.insert(cap.name.clone(), cap.clone());
                }
                Some(existing) => {
                    log::warn!(
                        "unqualified name '{}' already owned by '{}'; '{}' keeps qualified entry only",
                        cap.name,
                        existing.service,
                        cap.service
                    );
                    let recorded = self
                        .collisions
                        .iter()
                        .any(|c| c.name == cap.name && c.attempted_service == cap.service);
                    if !recorded {
                        self.collisions.push(NameCollision {
                            name: cap.name.clone(),
                            attempted_service: cap.service.clone(),
                            winning_service: existing.service.clone(),
                        });
                    }
                }
            }
        }
        self.services.insert(caps.service.clone(), caps);
    }

    /// Remove a service's entries; unqualified names are dropped only when
    /// they still point at this service. Collision records involving the
    /// service are pruned with it.
    fn remove_service(&mut self, service: &str) -> Option<ServiceCapabilities> {
        let caps = self.services.remove(service)?;
        for cap in caps.all() {
            self.qualified.remove(&cap.qualified_name());
            if self
                .unqualified
                .get(&cap.name)
                .map(|existing| existing.service == service)
                .unwrap_or(false)
            {
                self.unqualified.remove(&cap.name);
            }
        }
        self.collisions
            .retain(|c| c.attempted_service != service && c.winning_service != service);
        Some(caps)
    }

    /// Re-point vacated short names at another registered owner, if any.
    /// Owner choice is deterministic (lexicographic service order).
    fn promote_orphans(&mut self, names: &[String]) {
        for name in names {
            if self.unqualified.contains_key(name) {
                continue;
            }
            let promoted = {
                let mut owners: Vec<&Capability> = self
                    .services
                    .values()
                    .flat_map(|caps| caps.all())
                    .filter(|cap| &cap.name == name)
                    .collect();
                owners.sort_by(|a, b| a.service.cmp(&b.service));
                owners.first().map(|cap| (*cap).clone())
            };
            if let Some(cap) = promoted {
                log::info!(
                    "unqualified name '{}' now resolves to service '{}'",
                    name,
                    cap.service
                );
                self.unqualified.insert(name.clone(), cap);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CapabilityRegistry
// ---------------------------------------------------------------------------

/// In-memory catalog of every discovered capability.
pub struct CapabilityRegistry {
    catalog: EndpointCatalog,
    inner: RwLock<RegistryInner>,
    clients: RwLock<HashMap<String, Arc<ServiceClient>>>,
}

impl CapabilityRegistry {
    /// Create an empty registry over a configured endpoint catalog.
    pub fn new(catalog: EndpointCatalog) -> Self {
        Self {
            catalog,
            inner: RwLock::new(RegistryInner::default()),
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// The endpoint catalog this registry discovers against.
    pub fn catalog(&self) -> &EndpointCatalog {
        &self.catalog
    }

    /// The configured endpoint for a service, if any.
    pub fn endpoint(&self, service: &str) -> Option<crate::config::ServiceEndpoint> {
        self.catalog.get(service).cloned()
    }

    // -----------------------------------------------------------------------
    // Discovery
    // -----------------------------------------------------------------------

    /// Discover all enabled endpoints concurrently, best-effort.
    ///
    /// A failing endpoint is logged and excluded from the result map; the
    /// batch itself never fails.
    pub async fn discover_all(&self) -> HashMap<String, ServiceCapabilities> {
        let clients: Vec<Arc<ServiceClient>> = self
            .catalog
            .enabled()
            .map(|endpoint| Arc::new(ServiceClient::from_endpoint(endpoint)))
            .collect();
        self.discover_with(clients).await
    }

    /// Discovery batch over explicit clients (tests inject transports here).
    pub async fn discover_with(
        &self,
        clients: Vec<Arc<ServiceClient>>,
    ) -> HashMap<String, ServiceCapabilities> {
        let discoveries = clients.into_iter().map(|client| async move {
            let result = client.discover().await;
            (client, result)
        });
        let results = join_all(discoveries).await;

        let mut discovered = HashMap::new();
        for (client, result) in results {
            let service = client.service_name().to_string();
            match result {
                Ok(caps) => {
                    self.register(caps.clone());
                    self.clients.write().insert(service.clone(), client);
                    discovered.insert(service, caps);
                }
                Err(e) => {
                    log::warn!("discovery failed, excluding endpoint: {}", e);
                }
            }
        }
        discovered
    }

    /// Re-discover one service and swap in the result atomically.
    ///
    /// On discovery failure the previous registry state is left untouched
    /// and `false` is returned.
    pub async fn refresh(&self, service: &str) -> bool {
        let Some(endpoint) = self.catalog.get(service).filter(|e| e.enabled).cloned() else {
            log::warn!("refresh requested for unknown or disabled service '{}'", service);
            return false;
        };
        self.refresh_with(Arc::new(ServiceClient::from_endpoint(&endpoint)))
            .await
    }

    /// Refresh through an explicit client (tests inject transports here).
    pub async fn refresh_with(&self, client: Arc<ServiceClient>) -> bool {
        let service = client.service_name().to_string();
        match client.discover().await {
            Ok(caps) => {
                self.register(caps);
                self.clients.write().insert(service, client);
                true
            }
            Err(e) => {
                log::warn!("refresh failed, keeping previous state: {}", e);
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Register a service's capabilities in one critical section.
    ///
    /// An existing registration for the same service is replaced
    /// wholesale: capabilities the service no longer exposes are removed,
    /// and short names they vacated are re-pointed at another owner.
    pub fn register(&self, caps: ServiceCapabilities) {
        log::debug!(
            "registering '{}' with {} capabilities",
            caps.service,
            caps.len()
        );
        let mut inner = self.inner.write();
        let old_names: Vec<String> = inner
            .remove_service(&caps.service)
            .map(|old| old.all().map(|c| c.name.clone()).collect())
            .unwrap_or_default();
        inner.register(caps);
        inner.promote_orphans(&old_names);
    }

    /// Remove a service and everything it registered.
    ///
    /// Short names the service owned become visible under another service
    /// again only if that other registration still exists.
    pub fn unregister(&self, service: &str) -> bool {
        let removed = {
            let mut inner = self.inner.write();
            match inner.remove_service(service) {
                Some(old) => {
                    let names: Vec<String> = old.all().map(|c| c.name.clone()).collect();
                    inner.promote_orphans(&names);
                    true
                }
                None => false,
            }
        };
        if removed {
            self.clients.write().remove(service);
            log::info!("unregistered service '{}'", service);
        }
        removed
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// Resolve an unqualified capability name.
    pub fn lookup(&self, name: &str) -> Option<Capability> {
        self.inner.read().unqualified.get(name).cloned()
    }

    /// Resolve a capability within a specific service.
    pub fn lookup_qualified(&self, service: &str, name: &str) -> Option<Capability> {
        self.inner
            .read()
            .qualified
            .get(&format!("{}.{}", service, name))
            .cloned()
    }

    /// Find capabilities matching a category such as `"policy-data"`.
    ///
    /// The category is split into tokens on `-`/`_`; a capability matches
    /// when any non-generic token appears in its name or description
    /// (case-insensitive). Results are sorted by qualified name.
    pub fn find_by_category(&self, category: &str) -> Vec<Capability> {
        const GENERIC_TOKENS: &[&str] = &["data", "info"];

        let mut tokens: Vec<String> = category
            .split(['-', '_'])
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .filter(|t| !GENERIC_TOKENS.contains(&t.as_str()))
            .collect();
        if tokens.is_empty() {
            tokens = category
                .split(['-', '_'])
                .filter(|t| !t.is_empty())
                .map(str::to_lowercase)
                .collect();
        }

        let inner = self.inner.read();
        let mut matches: Vec<Capability> = inner
            .qualified
            .values()
            .filter(|cap| {
                let name = cap.name.to_lowercase();
                let description = cap.description.to_lowercase();
                tokens
                    .iter()
                    .any(|t| token_matches(&name, t) || token_matches(&description, t))
            })
            .cloned()
            .collect();
        matches.sort_by_key(|c| c.qualified_name());
        matches
    }

    /// The retained call client for a discovered service.
    pub fn client_for(&self, service: &str) -> Option<Arc<ServiceClient>> {
        self.clients.read().get(service).cloned()
    }

    /// Recorded unqualified-name collisions.
    pub fn collisions(&self) -> Vec<NameCollision> {
        self.inner.read().collisions.clone()
    }

    /// Per-service counts plus totals. Read lock only.
    pub fn summary(&self) -> RegistrySummary {
        let inner = self.inner.read();
        let services: BTreeMap<String, ServiceCounts> = inner
            .services
            .iter()
            .map(|(name, caps)| {
                (
                    name.clone(),
                    ServiceCounts {
                        tools: caps.tools.len(),
                        resources: caps.resources.len(),
                        prompts: caps.prompts.len(),
                    },
                )
            })
            .collect();
        RegistrySummary {
            total_capabilities: inner.qualified.len(),
            collisions: inner.collisions.len(),
            services,
        }
    }

    /// Total number of qualified entries.
    pub fn len(&self) -> usize {
        self.inner.read().qualified.len()
    }

    /// Whether nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.inner.read().qualified.is_empty()
    }
}

/// Substring match with plural awareness.
///
/// Regular plurals ("claim" in "claims") already match as substrings; a
/// singular token ending in `y` additionally matches its `ies` inflection
/// so "policy" reaches "get_customer_policies".
fn token_matches(text: &str, token: &str) -> bool {
    if text.contains(token) {
        return true;
    }
    token
        .strip_suffix('y')
        .map(|stem| text.contains(&format!("{}ies", stem)))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
