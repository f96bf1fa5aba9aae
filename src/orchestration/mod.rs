//! Request orchestration pipeline.
//!
//! One inbound request flows through three stages, threading a single
//! [`crate::trace::TraceAccumulator`]:
//!
//! 1. **Planner** — classifies the message into an intent plus required
//!    capability categories; never fails.
//! 2. **Dispatcher** — resolves categories against the registry and calls
//!    the owning services concurrently, tolerating partial failure unless
//!    the caller opted into strict policy.
//! 3. **Synthesizer** — renders the aggregated data into the final answer;
//!    never fails.

pub mod dispatcher;
pub mod pipeline;
pub mod planner;
pub mod synthesizer;

pub use dispatcher::{DispatchPolicy, DispatchResult, DispatchState, Dispatcher};
pub use pipeline::{OrchestrateRequest, OrchestrationOutcome, Pipeline, ResponseEnvelope};
pub use planner::{AdaptivePlanner, Intent, Plan, Planner};
pub use synthesizer::{AdaptiveRenderer, Synthesizer};
