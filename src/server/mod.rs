//! HTTP surface.
//!
//! Exposes the orchestration pipeline and registry operations over a
//! small axum router. All handlers are thin: validation and status
//! mapping here, semantics in the library.

pub mod routes;

pub use routes::{app_router, AppState};
