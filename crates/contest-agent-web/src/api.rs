//! REST API endpoint handlers.
//!
//! Thin wrappers over [`Supervisor`]: each handler extracts its inputs,
//! calls one supervisor operation and maps [`SupervisorError`] onto a status
//! code with a JSON `{code, message}` body.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use contest_agent::error::SupervisorError;
use contest_agent::supervisor::{
    AgentFilter, AgentTask, CreateAgentRequest, CreateAgentResponse, StopAgentResponse, Supervisor,
};
use contest_agent::workflow::AgentStatus;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Shared application state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Supervisor,
}

/// An error response: status code plus a machine-readable code.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    InvalidArgument(String),
    FailedPrecondition(String),
    Internal(String),
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, "NOT_FOUND", m.as_str()),
            ApiError::InvalidArgument(m) => {
                (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT", m.as_str())
            }
            ApiError::FailedPrecondition(m) => {
                (StatusCode::CONFLICT, "FAILED_PRECONDITION", m.as_str())
            }
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", m.as_str()),
        }
    }
}

impl From<SupervisorError> for ApiError {
    fn from(e: SupervisorError) -> Self {
        let message = e.to_string();
        match e {
            SupervisorError::NotFound(_) => ApiError::NotFound(message),
            SupervisorError::InvalidRequest(_) => ApiError::InvalidArgument(message),
            SupervisorError::StillRunning(_) => ApiError::FailedPrecondition(message),
            SupervisorError::Connect(_) | SupervisorError::Provider(_) => {
                ApiError::Internal(message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            warn!("{code}: {message}");
        }
        let body = ErrorBody {
            code: code.to_string(),
            message: message.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// POST /api/agents: Create an agent, or return the pair's live one.
///
/// 201 when a new agent was started, 200 when an existing one was reused.
pub async fn create_agent(
    State(app): State<AppState>,
    Json(request): Json<CreateAgentRequest>,
) -> Result<(StatusCode, Json<CreateAgentResponse>), ApiError> {
    let response = app.supervisor.create_agent(request)?;
    let status = if response.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(response)))
}

/// GET /api/agents/{id}
pub async fn get_agent(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AgentTask>, ApiError> {
    Ok(Json(app.supervisor.get_status(&id)?))
}

/// Query string for GET /api/agents.
#[derive(Deserialize, Default)]
pub struct ListQuery {
    pub contest_id: Option<String>,
    pub status: Option<String>,
}

impl ListQuery {
    fn into_filter(self) -> Result<AgentFilter, ApiError> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) => Some(s.parse::<AgentStatus>().map_err(ApiError::InvalidArgument)?),
        };
        let contest_id = self.contest_id.filter(|c| !c.trim().is_empty());
        Ok(AgentFilter { contest_id, status })
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AgentList {
    pub agents: Vec<AgentTask>,
}

/// GET /api/agents: List agents, optionally by contest and status.
pub async fn list_agents(
    State(app): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<AgentList>, ApiError> {
    let filter = query.into_filter()?;
    Ok(Json(AgentList {
        agents: app.supervisor.list_agents(&filter),
    }))
}

/// Request body for POST /api/agents/{id}/stop. The body may be omitted.
#[derive(Deserialize, Default)]
pub struct StopRequest {
    #[serde(default)]
    pub reason: String,
}

/// POST /api/agents/{id}/stop
pub async fn stop_agent(
    State(app): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<StopRequest>>,
) -> Result<Json<StopAgentResponse>, ApiError> {
    let reason = body
        .map(|Json(b)| b.reason)
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "stopped via API".to_string());
    Ok(Json(app.supervisor.stop_agent(&id, &reason)?))
}

/// DELETE /api/agents/{id}: Forget a finished agent.
///
/// 204 on success, 409 while the agent is still live.
pub async fn purge_agent(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    app.supervisor.purge_agent(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Health {
    pub status: String,
    pub agents: usize,
    pub live: usize,
}

/// GET /api/health
pub async fn health(State(app): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok".into(),
        agents: app.supervisor.agent_count(),
        live: app.supervisor.live_count(),
    })
}
