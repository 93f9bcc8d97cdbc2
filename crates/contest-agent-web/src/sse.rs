//! Server-Sent Events stream of agent status changes.
//!
//! Each connection replays the current status of every matching agent and
//! then follows live changes. A client too slow to keep up loses events
//! (the supervisor drops them rather than block agents); reconnecting
//! replays the current state.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::api::AppState;

#[derive(Deserialize, Default)]
pub struct StreamQuery {
    pub contest_id: Option<String>,
}

/// GET /api/agents/stream: `status` events, one JSON [`StatusEvent`] each.
///
/// [`StatusEvent`]: contest_agent::supervisor::StatusEvent
pub async fn stream_status(
    State(app): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let contest_id = query.contest_id.filter(|c| !c.trim().is_empty());
    debug!(contest = ?contest_id, "SSE client connected");
    let mut statuses = app.supervisor.stream_status(contest_id);

    let stream = async_stream::stream! {
        while let Some(event) = statuses.next().await {
            match serde_json::to_string(&event) {
                Ok(json) => yield Ok(Event::default().event("status").data(json)),
                Err(e) => warn!("Failed to serialize status event: {e}"),
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
