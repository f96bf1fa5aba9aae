//! # switchboard
//!
//! Dynamic capability discovery and request orchestration over JSON-RPC
//! backend services.
//!
//! Switchboard sits between a caller and an arbitrary number of
//! independently deployed backend services. At startup it discovers what
//! each configured service can do (callable tools, readable resources,
//! prompt templates), merges the results into an in-memory capability
//! registry, and then answers inbound requests by planning which
//! capability categories are needed, dispatching concurrent calls to the
//! owning services, and synthesizing the aggregated results into a final
//! response. A per-request trace accumulator records every reasoning step,
//! orchestration event, and backend call for diagnostics.

pub mod capability;
pub mod config;
pub mod discovery;
pub mod errors;
pub mod orchestration;
pub mod registry;
pub mod server;
pub mod trace;
pub mod transport;

pub use capability::{Capability, CapabilityDetail, CapabilityKind, ServiceCapabilities};
pub use config::{EndpointCatalog, ServiceEndpoint};
pub use discovery::ServiceClient;
pub use errors::{CallError, DiscoveryError, DispatchError};
pub use orchestration::dispatcher::{DispatchPolicy, DispatchResult, DispatchState, Dispatcher};
pub use orchestration::pipeline::{
    OrchestrateRequest, OrchestrationOutcome, Pipeline, ResponseEnvelope, ResponseStatus,
};
pub use orchestration::planner::{AdaptivePlanner, Intent, Plan, Planner};
pub use orchestration::synthesizer::{AdaptiveRenderer, Synthesizer};
pub use registry::{CapabilityRegistry, RegistrySummary, ServiceCounts};
pub use trace::{CallOutcome, CallRecord, TraceAccumulator};

/// Library version, taken from the crate manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
