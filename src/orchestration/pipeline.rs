//! End-to-end orchestration pipeline.
//!
//! One entry point, [`Pipeline::handle`], runs plan, dispatch, and
//! synthesis for an inbound request and wraps the result in a response
//! envelope with processing-time accounting and the full trace.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::DispatchError;
use crate::registry::CapabilityRegistry;
use crate::trace::TraceAccumulator;

use super::dispatcher::{DispatchPolicy, DispatchResult, Dispatcher};
use super::planner::{Intent, Plan, Planner};
use super::synthesizer::Synthesizer;

// ---------------------------------------------------------------------------
// Request / response shapes
// ---------------------------------------------------------------------------

/// Inbound orchestration request, as posted by callers.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestrateRequest {
    /// Identifier of the subject the data calls are about.
    pub subject_id: String,
    /// Free-form natural language message.
    pub message: String,
    /// Caller-asserted urgency; OR-ed with the planner's own detection.
    #[serde(default)]
    pub urgent: bool,
    /// Fail the whole request when any required category is unresolved.
    #[serde(default)]
    pub strict: bool,
}

/// Internal normalized request carried through the pipeline and trace.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationRequest {
    pub request_type: String,
    pub subject_id: String,
    pub raw_message: String,
    pub required_capabilities: Vec<String>,
    pub intent: Option<Intent>,
    pub confidence: f64,
    pub urgent: bool,
    pub timestamp: DateTime<Utc>,
}

impl OrchestrationRequest {
    fn new(subject_id: &str, message: &str, urgent: bool) -> Self {
        Self {
            request_type: "data_request".to_string(),
            subject_id: subject_id.to_string(),
            raw_message: message.to_string(),
            required_capabilities: Vec::new(),
            intent: None,
            confidence: 0.0,
            urgent,
            timestamp: Utc::now(),
        }
    }

    /// Fold the planner's output into the request. Caller-asserted
    /// urgency is never downgraded by the plan.
    fn apply_plan(&mut self, plan: &Plan) {
        self.intent = Some(plan.intent);
        self.confidence = plan.confidence;
        self.required_capabilities = plan.required_capabilities.clone();
        self.urgent = self.urgent || plan.urgent;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
    Pending,
}

/// Caller-safe error detail; never carries internal messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// The response returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseEnvelope {
    pub status: ResponseStatus,
    pub request_id: Uuid,
    pub answer: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub processing_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// Envelope plus the normalized request and the trace accumulated while
/// producing it.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationOutcome {
    #[serde(flatten)]
    pub envelope: ResponseEnvelope,
    pub request: OrchestrationRequest,
    pub trace: TraceAccumulator,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline {
    planner: Planner,
    dispatcher: Dispatcher,
    synthesizer: Synthesizer,
    registry: Arc<CapabilityRegistry>,
}

impl Pipeline {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            planner: Planner::new(),
            dispatcher: Dispatcher::new(),
            synthesizer: Synthesizer::new(),
            registry,
        }
    }

    /// Builder: replace the default planner.
    pub fn with_planner(mut self, planner: Planner) -> Self {
        self.planner = planner;
        self
    }

    /// Builder: replace the default synthesizer.
    pub fn with_synthesizer(mut self, synthesizer: Synthesizer) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    /// Run the full plan, dispatch, synthesize sequence. Never returns an
    /// error: failures are reported inside the envelope.
    pub async fn handle(&self, req: OrchestrateRequest) -> OrchestrationOutcome {
        let started = Instant::now();
        let request_id = Uuid::new_v4();
        let mut trace = TraceAccumulator::new();

        log::info!(
            "orchestrating request {} for subject '{}'",
            request_id,
            req.subject_id
        );
        trace.event(format!("request {} accepted", request_id));

        let mut request = OrchestrationRequest::new(&req.subject_id, &req.message, req.urgent);
        let mut plan = self.planner.plan(&req.message, &mut trace).await;
        plan.urgent = plan.urgent || req.urgent;
        request.apply_plan(&plan);
        trace.reason(format!(
            "intent '{}' (confidence {:.2}) requires {:?}",
            plan.intent, plan.confidence, plan.required_capabilities
        ));

        let policy = if req.strict {
            DispatchPolicy::Strict
        } else {
            DispatchPolicy::Lenient
        };

        let dispatched = self
            .dispatcher
            .dispatch(&plan, &request.subject_id, &self.registry, policy, &mut trace)
            .await;

        let envelope = match dispatched {
            Ok(DispatchResult { data, state }) => {
                trace.event(format!("aggregation finished as {}", state));
                let answer = self.synthesizer.synthesize(&plan, &data, &mut trace).await;
                ResponseEnvelope {
                    status: ResponseStatus::Success,
                    request_id,
                    answer,
                    data: serde_json::to_value(&data).unwrap_or(Value::Null),
                    timestamp: Utc::now(),
                    processing_time_ms: started.elapsed().as_millis() as u64,
                    error: None,
                }
            }
            Err(DispatchError::StrictPolicyFailure { category }) => {
                log::warn!(
                    "request {} failed strict policy on category '{}'",
                    request_id,
                    category
                );
                ResponseEnvelope {
                    status: ResponseStatus::Error,
                    request_id,
                    answer: "I could not complete this request because a required \
                             capability is unavailable. Please try again later."
                        .to_string(),
                    data: Value::Object(serde_json::Map::new()),
                    timestamp: Utc::now(),
                    processing_time_ms: started.elapsed().as_millis() as u64,
                    error: Some(ErrorInfo {
                        code: "strict_policy_failure".to_string(),
                        message: format!("no capability resolves category '{}'", category),
                        retry_after: Some(30),
                    }),
                }
            }
        };

        log::info!(
            "request {} finished with status {:?} in {}ms",
            request_id,
            envelope.status,
            envelope.processing_time_ms
        );

        OrchestrationOutcome {
            envelope,
            request,
            trace,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
