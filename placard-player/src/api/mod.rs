//! Control API for a player instance
//!
//! Small REST surface used by admin tools and `placard-ctl`: inspect the
//! device registry and playback state, fan out commands, and pin quick
//! play. Commands go over the in-process bus; durable intent (the manual
//! override) is written to the shared store first so players that miss
//! the bus message converge on their next poll.

pub mod handlers;
pub mod sse;

use crate::playback::InstanceState;
use axum::routing::{get, post};
use axum::{extract::State, Json, Router};
use placard_common::bus::CommandBus;
use placard_common::catalog::Catalog;
use placard_common::registry::Registry;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// State shared across handlers
#[derive(Clone)]
pub struct AppContext {
    /// Catalog bound to the API's own consumer identity
    pub catalog: Catalog,
    pub registry: Registry,
    pub bus: CommandBus,
    pub state: Arc<InstanceState>,
    /// This instance's device id
    pub device_id: String,
}

pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest(
            "/api/v1",
            Router::new()
                .route("/devices", get(handlers::list_devices))
                .route("/devices/:id/rename", post(handlers::rename_device))
                .route("/nowplaying", get(handlers::get_now_playing))
                .route("/playback/state", get(handlers::get_playback_state))
                .route("/playback/play", post(handlers::play))
                .route("/playback/pause", post(handlers::pause))
                .route("/playback/next", post(handlers::next))
                .route("/playback/prev", post(handlers::prev))
                .route("/command", post(handlers::send_command))
                .route("/quickplay", post(handlers::quick_play))
                .route("/quickplay/media", post(handlers::quick_play_media))
                .route("/events", get(sse::events)),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// GET /health
async fn health(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "placard-player",
        "version": env!("CARGO_PKG_VERSION"),
        "deviceId": ctx.device_id,
    }))
}
