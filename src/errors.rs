//! Error types for discovery and dispatch.
//!
//! The split mirrors how failures propagate: `DiscoveryError` is confined
//! to one endpoint within a discovery batch, `CallError` classifies a
//! single backend call, and `DispatchError` is the only dispatch failure
//! that ever reaches the caller (strict policy opt-in).

use thiserror::Error;

use crate::trace::CallOutcome;

/// A backend endpoint could not be discovered at all.
///
/// Raised only when no session can be established. Per-kind enumeration
/// failures against a reachable endpoint are warnings, not errors.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Session establishment failed.
    #[error("cannot establish session with '{service}' at {address}: {message}")]
    Session {
        service: String,
        address: String,
        message: String,
    },
}

/// Classified outcome of a single failed backend call.
#[derive(Debug, Error)]
pub enum CallError {
    /// The call exceeded the endpoint's configured timeout.
    #[error("call timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Transport-level failure (connection refused, protocol error, ...).
    #[error("transport failure: {message}")]
    Transport { message: String },

    /// The backend reported a definitive not-found. Never retried.
    #[error("target not found: {message}")]
    NotFound { message: String },
}

impl CallError {
    /// Map this error to the trace outcome it should be recorded as.
    pub fn outcome(&self) -> CallOutcome {
        match self {
            CallError::Timeout { .. } => CallOutcome::Timeout,
            CallError::Transport { .. } => CallOutcome::Error,
            CallError::NotFound { .. } => CallOutcome::NotFound,
        }
    }
}

/// Fatal dispatch failure.
///
/// Only produced when the caller explicitly opted into strict semantics;
/// under the default lenient policy unresolved categories degrade to
/// `not_found` call records instead.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A required capability category resolved to nothing under strict policy.
    #[error("strict policy: no registered capability satisfies category '{category}'")]
    StrictPolicyFailure { category: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_error_outcome_mapping() {
        assert_eq!(
            CallError::Timeout { seconds: 5 }.outcome(),
            CallOutcome::Timeout
        );
        assert_eq!(
            CallError::Transport {
                message: "refused".into()
            }
            .outcome(),
            CallOutcome::Error
        );
        assert_eq!(
            CallError::NotFound {
                message: "no such tool".into()
            }
            .outcome(),
            CallOutcome::NotFound
        );
    }

    #[test]
    fn test_error_messages() {
        let e = DiscoveryError::Session {
            service: "policy_service".into(),
            address: "http://localhost:9001".into(),
            message: "connection refused".into(),
        };
        assert!(e.to_string().contains("policy_service"));
        assert!(e.to_string().contains("connection refused"));

        let e = DispatchError::StrictPolicyFailure {
            category: "policy-data".into(),
        };
        assert!(e.to_string().contains("policy-data"));
    }
}
