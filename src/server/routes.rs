//! Route handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::orchestration::pipeline::{OrchestrateRequest, Pipeline, ResponseStatus};
use crate::registry::CapabilityRegistry;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<CapabilityRegistry>,
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        let pipeline = Arc::new(Pipeline::new(registry.clone()));
        Self { registry, pipeline }
    }

    /// Build a state around an already-constructed pipeline, for callers
    /// that attach adaptive components.
    pub fn with_pipeline(registry: Arc<CapabilityRegistry>, pipeline: Pipeline) -> Self {
        Self {
            registry,
            pipeline: Arc::new(pipeline),
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/orchestrate", post(orchestrate))
        .route("/registry/summary", get(registry_summary))
        .route("/registry/refresh/:service", post(registry_refresh))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "switchboard",
        "version": crate::VERSION,
    }))
}

async fn orchestrate(
    State(state): State<AppState>,
    Json(request): Json<OrchestrateRequest>,
) -> Response {
    if request.subject_id.trim().is_empty() {
        return bad_request("subject_id must not be empty");
    }
    if request.message.trim().is_empty() {
        return bad_request("message must not be empty");
    }

    let outcome = state.pipeline.handle(request).await;
    let status = match outcome.envelope.status {
        ResponseStatus::Error => StatusCode::CONFLICT,
        _ => StatusCode::OK,
    };
    (status, Json(outcome)).into_response()
}

async fn registry_summary(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.summary())
}

async fn registry_refresh(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Response {
    if state.registry.endpoint(&service).is_none() {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("unknown service '{}'", service)})),
        )
            .into_response();
    }

    if state.registry.refresh(&service).await {
        Json(json!({"status": "refreshed", "service": service})).into_response()
    } else {
        (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "error": format!("service '{}' could not be refreshed; previous registrations kept", service),
            })),
        )
            .into_response()
    }
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EndpointCatalog, ServiceEndpoint};
    use crate::discovery::ServiceClient;
    use crate::transport::StaticTransport;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let transport = StaticTransport::new("policy_service")
            .with_empty_listings()
            .with_response(
                "tools/list",
                json!({"tools": [{"name": "get_policy", "description": "Fetch policy data"}]}),
            )
            .with_response(
                "tools/call",
                json!({"content": [{"type": "text", "text": "{\"policy_number\": \"POL-1\"}"}]}),
            );
        let endpoint = ServiceEndpoint::new("policy_service", "http://localhost/1")
            .with_timeout(1)
            .with_retries(1);
        let registry = Arc::new(CapabilityRegistry::new(EndpointCatalog::new(vec![
            endpoint.clone(),
        ])));
        registry
            .discover_with(vec![Arc::new(ServiceClient::new(
                endpoint,
                Box::new(transport),
            ))])
            .await;
        AppState::new(registry)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app_router(test_state().await);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "switchboard");
    }

    #[tokio::test]
    async fn test_orchestrate_success() {
        let app = app_router(test_state().await);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/orchestrate")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"subject_id": "CUST-1", "message": "What does my policy cover?"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "success");
        assert!(body["answer"].as_str().unwrap().contains("POL-1"));
        assert!(body["trace"]["call_records"].as_array().is_some());
    }

    #[tokio::test]
    async fn test_orchestrate_rejects_blank_subject() {
        let app = app_router(test_state().await);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/orchestrate")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"subject_id": "  ", "message": "hello"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_orchestrate_strict_failure_maps_to_conflict() {
        let app = app_router(test_state().await);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/orchestrate")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"subject_id": "CUST-1", "message": "Why was my payment charged twice?", "strict": true}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"]["code"], "strict_policy_failure");
    }

    #[tokio::test]
    async fn test_registry_summary() {
        let app = app_router(test_state().await);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/registry/summary")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["services"]["policy_service"]["tools"], 1);
        assert_eq!(body["total_capabilities"], 1);
    }

    #[tokio::test]
    async fn test_refresh_unknown_service_is_404() {
        let app = app_router(test_state().await);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/registry/refresh/ghost_service")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
