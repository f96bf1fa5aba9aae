//! switchboard HTTP server binary.
//!
//! Starts an axum HTTP server that discovers all configured backend
//! services at startup and exposes the orchestration and registry
//! endpoints.
//!
//! # Environment Variables
//!
//! - `PORT` — HTTP port (default: 8080)
//! - `SWITCHBOARD_ENDPOINTS` — Path to the endpoint catalog YAML
//!   (default: "endpoints.yaml")
//! - `RUST_LOG` — Tracing filter (default: "info")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin server
//! ```

use std::sync::Arc;

use switchboard::server::{app_router, AppState};
use switchboard::{CapabilityRegistry, EndpointCatalog};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,switchboard=debug".into()),
        )
        .init();

    let catalog_path =
        std::env::var("SWITCHBOARD_ENDPOINTS").unwrap_or_else(|_| "endpoints.yaml".to_string());
    let catalog = match EndpointCatalog::from_file(&catalog_path) {
        Ok(catalog) => {
            tracing::info!(
                "loaded {} endpoint(s) from {}",
                catalog.len(),
                catalog_path
            );
            catalog
        }
        Err(e) => {
            tracing::warn!(
                "could not load endpoint catalog from {}: {}; starting with an empty registry",
                catalog_path,
                e
            );
            EndpointCatalog::default()
        }
    };

    let registry = Arc::new(CapabilityRegistry::new(catalog));

    // Discover every enabled backend up front. Failures are tolerated; the
    // affected services can be refreshed later.
    let discovered = registry.discover_all().await;
    let summary = registry.summary();
    tracing::info!(
        "discovery complete: {}/{} service(s) registered, {} capabilities total",
        discovered.len(),
        registry.catalog().enabled().count(),
        summary.total_capabilities
    );
    for (service, counts) in &summary.services {
        tracing::info!(
            "  {}: {} tool(s), {} resource(s), {} prompt(s)",
            service,
            counts.tools,
            counts.resources,
            counts.prompts
        );
    }

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let bind_addr = format!("0.0.0.0:{}", port);

    let app = app_router(AppState::new(registry));

    tracing::info!("switchboard server starting on {}", bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                     — liveness probe");
    tracing::info!("  POST /orchestrate                — natural-language data requests");
    tracing::info!("  GET  /registry/summary           — registered capability counts");
    tracing::info!("  POST /registry/refresh/:service  — re-discover one service");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app)
        .await
        .expect("Server failed");
}
