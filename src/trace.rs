//! Per-request trace accumulator.
//!
//! Every orchestration pipeline run owns exactly one [`TraceAccumulator`].
//! It collects reasoning steps, orchestration events, and one
//! [`CallRecord`] per backend call, in append order, and is returned to
//! the caller alongside the answer. Nothing in here is shared across
//! requests, so no synchronization is needed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CallOutcome / CallRecord
// ---------------------------------------------------------------------------

/// Terminal classification of one backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Success,
    Timeout,
    Error,
    NotFound,
}

impl std::fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallOutcome::Success => write!(f, "success"),
            CallOutcome::Timeout => write!(f, "timeout"),
            CallOutcome::Error => write!(f, "error"),
            CallOutcome::NotFound => write!(f, "not_found"),
        }
    }
}

/// One backend call, success or failure. Never mutated after append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    /// Owning service, or `"-"` when no service resolved.
    pub service: String,
    /// Capability name or, for unresolved lookups, the category.
    pub target: String,
    pub outcome: CallOutcome,
    pub elapsed_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl CallRecord {
    /// Record a completed call against a concrete capability.
    pub fn new(
        service: impl Into<String>,
        target: impl Into<String>,
        outcome: CallOutcome,
        elapsed: Duration,
    ) -> Self {
        Self {
            service: service.into(),
            target: target.into(),
            outcome,
            elapsed_ms: elapsed.as_millis() as u64,
            timestamp: Utc::now(),
        }
    }

    /// Record a category that resolved to no registered capability.
    pub fn not_found(category: impl Into<String>) -> Self {
        Self::new("-", category, CallOutcome::NotFound, Duration::ZERO)
    }
}

// ---------------------------------------------------------------------------
// TraceAccumulator
// ---------------------------------------------------------------------------

/// Ordered, append-only trace of one request's lifetime.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TraceAccumulator {
    /// Planner/synthesizer reasoning steps.
    pub reasoning_steps: Vec<String>,
    /// Pipeline and dispatch state transitions.
    pub orchestration_events: Vec<String>,
    /// One record per backend call.
    pub call_records: Vec<CallRecord>,
}

impl TraceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reasoning step.
    pub fn reason(&mut self, step: impl Into<String>) {
        self.reasoning_steps.push(step.into());
    }

    /// Append an orchestration event.
    pub fn event(&mut self, event: impl Into<String>) {
        self.orchestration_events.push(event.into());
    }

    /// Append a call record.
    pub fn record_call(&mut self, record: CallRecord) {
        self.call_records.push(record);
    }

    /// Count call records with the given outcome.
    pub fn count_outcome(&self, outcome: CallOutcome) -> usize {
        self.call_records
            .iter()
            .filter(|r| r.outcome == outcome)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
