//! Dispatcher.
//!
//! Resolves each required capability category against the registry,
//! issues the resulting backend calls concurrently, and merges outcomes
//! into one aggregated data map keyed by category. Every call, success or
//! failure, appends exactly one [`CallRecord`].
//!
//! Unresolved categories degrade gracefully under the default lenient
//! policy and abort the whole dispatch under strict policy. Strict
//! failures are raised before any backend call is issued, so no sibling
//! call is ever cancelled by a strict abort.

use std::collections::HashMap;
use std::time::Instant;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capability::{Capability, CapabilityKind};
use crate::errors::{CallError, DispatchError};
use crate::registry::CapabilityRegistry;
use crate::trace::{CallOutcome, CallRecord, TraceAccumulator};

use super::planner::Plan;

// ---------------------------------------------------------------------------
// Policy / state
// ---------------------------------------------------------------------------

/// How unresolved categories are treated. Chosen explicitly per call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// Unresolved categories become `not_found` records; dispatch continues.
    #[default]
    Lenient,
    /// Any unresolved category aborts the whole dispatch.
    Strict,
}

/// Dispatch progression:
/// `Planned → Dispatching → (PartiallyAggregated | FullyAggregated |
/// FailedStrict) → Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    Planned,
    Dispatching,
    PartiallyAggregated,
    FullyAggregated,
    FailedStrict,
    Done,
}

impl std::fmt::Display for DispatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchState::Planned => write!(f, "planned"),
            DispatchState::Dispatching => write!(f, "dispatching"),
            DispatchState::PartiallyAggregated => write!(f, "partially_aggregated"),
            DispatchState::FullyAggregated => write!(f, "fully_aggregated"),
            DispatchState::FailedStrict => write!(f, "failed_strict"),
            DispatchState::Done => write!(f, "done"),
        }
    }
}

/// Aggregated dispatch output.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchResult {
    /// Successful call results keyed by category.
    pub data: HashMap<String, Value>,
    /// `FullyAggregated` when every category produced data, otherwise
    /// `PartiallyAggregated`.
    pub state: DispatchState,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Stateless dispatch engine; all state lives in the registry and trace.
#[derive(Debug, Default)]
pub struct Dispatcher;

impl Dispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Dispatch one plan's categories against the registry.
    ///
    /// Only a strict-policy resolution failure returns an error; call
    /// failures are absorbed into the trace and the aggregation state.
    pub async fn dispatch(
        &self,
        plan: &Plan,
        subject_id: &str,
        registry: &CapabilityRegistry,
        policy: DispatchPolicy,
        trace: &mut TraceAccumulator,
    ) -> Result<DispatchResult, DispatchError> {
        trace.event(format!("dispatch state: {}", DispatchState::Planned));

        // Resolve every category before issuing any call.
        let mut resolved: Vec<(String, Capability)> = Vec::new();
        let mut missing: Vec<String> = Vec::new();
        for category in &plan.required_capabilities {
            let candidates = registry.find_by_category(category);
            let tool = candidates
                .iter()
                .find(|c| c.kind() == CapabilityKind::Tool)
                .cloned();
            match tool {
                Some(capability) => {
                    if candidates.len() > 1 {
                        trace.event(format!(
                            "category '{}' matched {} capabilities; using '{}'",
                            category,
                            candidates.len(),
                            capability.qualified_name()
                        ));
                    }
                    resolved.push((category.clone(), capability));
                }
                None => missing.push(category.clone()),
            }
        }

        if policy == DispatchPolicy::Strict && !missing.is_empty() {
            let category = missing.remove(0);
            trace.record_call(CallRecord::not_found(&category));
            trace.event(format!(
                "dispatch state: {} (category '{}')",
                DispatchState::FailedStrict,
                category
            ));
            return Err(DispatchError::StrictPolicyFailure { category });
        }

        for category in &missing {
            trace.record_call(CallRecord::not_found(category));
            trace.event(format!(
                "no capability resolves category '{}'; continuing",
                category
            ));
        }

        trace.event(format!("dispatch state: {}", DispatchState::Dispatching));

        // Fan out one concurrent call per resolved category.
        let calls = resolved.into_iter().map(|(category, capability)| {
            let client = registry.client_for(&capability.service);
            let subject = subject_id.to_string();
            async move {
                let started = Instant::now();
                let outcome = match client {
                    Some(client) => {
                        client
                            .call_tool(&capability.name, subject_arguments(&capability, &subject))
                            .await
                    }
                    None => Err(CallError::Transport {
                        message: format!("no active session for service '{}'", capability.service),
                    }),
                };
                (category, capability, outcome, started.elapsed())
            }
        });
        let results = join_all(calls).await;

        let expected = results.len();
        let mut data = HashMap::new();
        for (category, capability, outcome, elapsed) in results {
            match outcome {
                Ok(value) => {
                    trace.record_call(CallRecord::new(
                        &capability.service,
                        &capability.name,
                        CallOutcome::Success,
                        elapsed,
                    ));
                    data.insert(category, value);
                }
                Err(e) => {
                    trace.record_call(CallRecord::new(
                        &capability.service,
                        &capability.name,
                        e.outcome(),
                        elapsed,
                    ));
                    trace.event(format!(
                        "call to '{}' failed: {}",
                        capability.qualified_name(),
                        e
                    ));
                }
            }
        }

        let state = if data.len() == expected && missing.is_empty() {
            DispatchState::FullyAggregated
        } else {
            DispatchState::PartiallyAggregated
        };
        trace.event(format!("dispatch state: {}", state));
        trace.event(format!("dispatch state: {}", DispatchState::Done));

        Ok(DispatchResult { data, state })
    }
}

/// Build call arguments from the tool's declared required parameters.
///
/// Every required parameter is filled with the subject id; tools without
/// declared requirements still receive a `subject_id` argument.
fn subject_arguments(capability: &Capability, subject_id: &str) -> Value {
    let mut arguments = serde_json::Map::new();
    for param in capability.required_params() {
        arguments.insert(param.clone(), Value::String(subject_id.to_string()));
    }
    if arguments.is_empty() {
        arguments.insert(
            "subject_id".to_string(),
            Value::String(subject_id.to_string()),
        );
    }
    Value::Object(arguments)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EndpointCatalog, ServiceEndpoint};
    use crate::discovery::ServiceClient;
    use crate::orchestration::planner::Intent;
    use crate::transport::StaticTransport;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn plan(categories: &[&str]) -> Plan {
        Plan {
            intent: Intent::PolicyInquiry,
            confidence: 0.9,
            required_capabilities: categories.iter().map(|c| c.to_string()).collect(),
            urgent: false,
        }
    }

    fn client(name: &str, transport: StaticTransport) -> Arc<ServiceClient> {
        let endpoint = ServiceEndpoint::new(name, format!("http://localhost/{}", name))
            .with_timeout(1)
            .with_retries(1);
        Arc::new(ServiceClient::new(endpoint, Box::new(transport)))
    }

    fn transport_with_tool(service: &str, tool: &str, description: &str) -> StaticTransport {
        StaticTransport::new(service)
            .with_empty_listings()
            .with_response(
                "tools/list",
                json!({"tools": [{"name": tool, "description": description}]}),
            )
            .with_response(
                "tools/call",
                json!({"content": [{"type": "text", "text": format!("{{\"from\": \"{}\"}}", service)}]}),
            )
    }

    async fn two_service_registry() -> CapabilityRegistry {
        let registry = CapabilityRegistry::new(EndpointCatalog::default());
        registry
            .discover_with(vec![
                client(
                    "policy_service",
                    transport_with_tool("policy_service", "get_policy", "Fetch one policy"),
                ),
                client(
                    "account_service",
                    transport_with_tool("account_service", "get_account", "Customer profile"),
                ),
            ])
            .await;
        registry
    }

    #[tokio::test]
    async fn test_lenient_partial_success() {
        let registry = two_service_registry().await;
        let mut trace = TraceAccumulator::new();

        let result = Dispatcher::new()
            .dispatch(
                &plan(&["policy-data", "account-profile", "billing-data"]),
                "CUST-1",
                &registry,
                DispatchPolicy::Lenient,
                &mut trace,
            )
            .await
            .unwrap();

        assert_eq!(result.state, DispatchState::PartiallyAggregated);
        assert_eq!(result.data.len(), 2);
        assert_eq!(result.data["policy-data"]["from"], "policy_service");
        assert_eq!(result.data["account-profile"]["from"], "account_service");
        assert!(!result.data.contains_key("billing-data"));

        assert_eq!(trace.count_outcome(CallOutcome::Success), 2);
        assert_eq!(trace.count_outcome(CallOutcome::NotFound), 1);
    }

    #[tokio::test]
    async fn test_strict_aborts_before_any_call() {
        let registry = two_service_registry().await;
        let mut trace = TraceAccumulator::new();

        let err = Dispatcher::new()
            .dispatch(
                &plan(&["billing-data", "policy-data"]),
                "CUST-1",
                &registry,
                DispatchPolicy::Strict,
                &mut trace,
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::StrictPolicyFailure { ref category } if category == "billing-data"
        ));
        // Only the not-found record exists; no backend call was issued.
        assert_eq!(trace.call_records.len(), 1);
        assert_eq!(trace.call_records[0].outcome, CallOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_strict_full_success() {
        let registry = two_service_registry().await;
        let mut trace = TraceAccumulator::new();

        let result = Dispatcher::new()
            .dispatch(
                &plan(&["policy-data", "account-profile"]),
                "CUST-1",
                &registry,
                DispatchPolicy::Strict,
                &mut trace,
            )
            .await
            .unwrap();

        assert_eq!(result.state, DispatchState::FullyAggregated);
        assert_eq!(result.data.len(), 2);
    }

    #[tokio::test]
    async fn test_timeout_yields_single_timeout_record() {
        let registry = CapabilityRegistry::new(EndpointCatalog::default());
        let hanging = StaticTransport::new("policy_service")
            .with_empty_listings()
            .with_response(
                "tools/list",
                json!({"tools": [{"name": "get_policy", "description": "Fetch one policy"}]}),
            )
            .with_hang("tools/call");
        registry
            .discover_with(vec![client("policy_service", hanging)])
            .await;

        let mut trace = TraceAccumulator::new();
        let started = Instant::now();
        let result = Dispatcher::new()
            .dispatch(
                &plan(&["policy-data"]),
                "CUST-1",
                &registry,
                DispatchPolicy::Lenient,
                &mut trace,
            )
            .await
            .unwrap();

        assert_eq!(result.state, DispatchState::PartiallyAggregated);
        assert!(result.data.is_empty());
        assert_eq!(trace.call_records.len(), 1);
        assert_eq!(trace.call_records[0].outcome, CallOutcome::Timeout);
        // retry_attempts=1, timeout=1s: the whole dispatch stays within bound.
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_sibling_calls_survive_one_failure() {
        let registry = CapabilityRegistry::new(EndpointCatalog::default());
        let failing = StaticTransport::new("policy_service")
            .with_empty_listings()
            .with_response(
                "tools/list",
                json!({"tools": [{"name": "get_policy", "description": "Fetch one policy"}]}),
            )
            .with_failure("tools/call", "bad gateway");
        registry
            .discover_with(vec![
                client("policy_service", failing),
                client(
                    "account_service",
                    transport_with_tool("account_service", "get_account", "Customer profile"),
                ),
            ])
            .await;

        let mut trace = TraceAccumulator::new();
        let result = Dispatcher::new()
            .dispatch(
                &plan(&["policy-data", "account-profile"]),
                "CUST-1",
                &registry,
                DispatchPolicy::Lenient,
                &mut trace,
            )
            .await
            .unwrap();

        assert_eq!(result.state, DispatchState::PartiallyAggregated);
        assert_eq!(result.data.len(), 1);
        assert!(result.data.contains_key("account-profile"));
        assert_eq!(trace.count_outcome(CallOutcome::Error), 1);
        assert_eq!(trace.count_outcome(CallOutcome::Success), 1);
    }

    #[tokio::test]
    async fn test_empty_plan_is_fully_aggregated() {
        let registry = two_service_registry().await;
        let mut trace = TraceAccumulator::new();

        let result = Dispatcher::new()
            .dispatch(
                &plan(&[]),
                "CUST-1",
                &registry,
                DispatchPolicy::Strict,
                &mut trace,
            )
            .await
            .unwrap();
        assert_eq!(result.state, DispatchState::FullyAggregated);
        assert!(result.data.is_empty());
    }

    #[test]
    fn test_subject_arguments_fill_required_params() {
        let cap = Capability::tool_from_value(
            "policy_service",
            &json!({"name": "get_policy", "inputSchema": {"required": ["customer_id", "region"]}}),
        )
        .unwrap();
        let args = subject_arguments(&cap, "CUST-7");
        assert_eq!(args["customer_id"], "CUST-7");
        assert_eq!(args["region"], "CUST-7");

        let bare = Capability::tool_from_value("svc", &json!({"name": "ping"})).unwrap();
        let args = subject_arguments(&bare, "CUST-7");
        assert_eq!(args["subject_id"], "CUST-7");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(DispatchState::PartiallyAggregated.to_string(), "partially_aggregated");
        assert_eq!(DispatchState::FailedStrict.to_string(), "failed_strict");
    }
}
