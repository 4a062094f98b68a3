mod api;
mod config;
mod console;
mod controller;
mod format;
mod handlers;
mod poller;
mod progress;
mod sessions;
mod state;
mod ui;

use axum::{
    Router,
    routing::{delete, get},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Level, error, info};

use crate::api::BackendClient;
use crate::config::Settings;
use crate::controller::Controller;
use crate::handlers::api as relay;
use crate::sessions::Sessions;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let settings = Settings::new().expect("Failed to load configuration");

    tracing_subscriber::fmt()
        .with_env_filter(&settings.log_level)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting tubechat against {}", settings.backend_url);

    let poller = settings
        .poller_config()
        .expect("Invalid poller configuration");
    let client = Arc::new(
        BackendClient::new(&settings.backend_url, settings.request_timeout())
            .expect("Invalid backend URL"),
    );
    let sessions = Sessions::new();
    let (tx, _) = broadcast::channel(100);

    let state = AppState {
        settings: settings.clone(),
        sessions: sessions.clone(),
        tx: tx.clone(),
    };

    if settings.relay_enabled {
        let app = create_app(state);
        let addr = SocketAddr::from(([0, 0, 0, 0], settings.relay_port));
        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                info!("Relay listening on http://{}", addr);
                tokio::spawn(async move {
                    if let Err(e) = axum::serve(listener, app).await {
                        error!("Relay server stopped: {}", e);
                    }
                });
            }
            Err(e) => error!("Failed to bind relay on {}: {}", addr, e),
        }
    }

    console::spawn_renderer(tx.subscribe());
    let controller = Controller::new(client, sessions.clone(), tx, poller);
    console::run(controller).await;

    sessions.cancel_all();
    info!("Bye.");
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/api/info", get(relay::server_info))
        .route("/api/sessions", get(relay::list_sessions))
        .route("/api/sessions/{job_id}", delete(relay::cancel_session))
        .route("/events", get(relay::sse_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
