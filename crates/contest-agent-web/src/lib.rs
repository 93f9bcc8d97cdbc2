//! HTTP control surface for the contest-agent [`Supervisor`].
//!
//! `contest-agent-web` exposes an axum server with a small JSON API for
//! creating, inspecting and stopping agents, plus a Server-Sent Events
//! endpoint that streams status changes as they happen.
//!
//! # Quick start
//!
//! ```ignore
//! use contest_agent::prelude::*;
//! use contest_agent_web::{WebConfig, spawn_web};
//!
//! let supervisor = Supervisor::new(settings.supervisor_config(), connector, providers);
//! let addr = spawn_web(supervisor.clone(), WebConfig::default()).await?;
//! println!("Agent manager: http://{addr}");
//! ```
//!
//! # Routes
//!
//! ```text
//! POST   /api/agents              create (or reuse) an agent
//! GET    /api/agents              list, filtered by ?contest_id= and ?status=
//! GET    /api/agents/stream       SSE status stream, filtered by ?contest_id=
//! GET    /api/agents/{id}         one agent's status
//! POST   /api/agents/{id}/stop    stop a live agent
//! DELETE /api/agents/{id}         forget a finished agent
//! GET    /api/health              liveness and agent counts
//! ```

mod api;
mod server;
mod sse;

pub use api::{ApiError, AppState};
pub use server::{build_router, start_server};

use std::net::SocketAddr;

use contest_agent::supervisor::Supervisor;

/// Configuration for the web server.
pub struct WebConfig {
    /// Address to bind to. Default: `127.0.0.1:3001`.
    pub bind_addr: SocketAddr,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
        }
    }
}

/// Spawn the web server on a Tokio task and return the bound address.
///
/// The server runs until the Tokio runtime shuts down. Binding to port 0
/// picks a free port; the returned address carries the real one.
pub async fn spawn_web(supervisor: Supervisor, config: WebConfig) -> std::io::Result<SocketAddr> {
    let router = server::build_router(supervisor);
    server::start_server(router, config.bind_addr).await
}
