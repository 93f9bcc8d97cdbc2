//! Axum server setup and router construction.

use std::net::SocketAddr;

use axum::Router;
use axum::routing::{get, post};
use contest_agent::supervisor::Supervisor;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::api::{self, AppState};
use crate::sse;

/// Build the full axum router over a supervisor.
pub fn build_router(supervisor: Supervisor) -> Router {
    let state = AppState { supervisor };

    // Dashboards are usually served from another origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(api::health))
        .route("/api/agents", post(api::create_agent).get(api::list_agents))
        .route("/api/agents/stream", get(sse::stream_status))
        .route(
            "/api/agents/{id}",
            get(api::get_agent).delete(api::purge_agent),
        )
        .route("/api/agents/{id}/stop", post(api::stop_agent))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Bind the listener, serve on a background task and return the bound address.
pub async fn start_server(router: Router, bind_addr: SocketAddr) -> std::io::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;
    info!("Listening on http://{addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("Server error: {e}");
        }
    });

    Ok(addr)
}
