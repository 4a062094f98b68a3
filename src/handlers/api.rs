use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use tracing::info;

use crate::controller::cancel_download;
use crate::sessions::SessionInfo;
use crate::state::AppState;

pub async fn server_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "backend_url": state.settings.backend_url,
        "poll_interval_ms": state.settings.poll_interval_ms,
        "relay_port": state.settings.relay_port,
    }))
}

pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.sessions.active())
}

pub async fn cancel_session(
    Path(job_id): Path<String>,
    State(state): State<AppState>,
) -> StatusCode {
    info!("Cancel requested over relay for {}", job_id);
    if cancel_download(&state.sessions, &state.tx, &job_id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let rx = state.tx.subscribe();
    let stream = tokio_stream::wrappers::BroadcastStream::new(rx).map(|msg| match msg {
        Ok(event) => Ok(Event::default().data(event.to_json())),
        Err(_) => Ok(Event::default().comment("keepalive")),
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
