//! HTTP request handlers

use crate::api::AppContext;
use crate::playback::EngineState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use placard_common::bus::Command;
use placard_common::model::{Device, NowPlaying};
use placard_common::registry::Registry;
use placard_common::Error as StoreError;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

type ErrorResponse = (StatusCode, Json<StatusResponse>);

#[derive(Debug, Serialize)]
pub struct DeviceListResponse {
    devices: Vec<DeviceInfo>,
}

/// Registry record plus the computed liveness flag
#[derive(Debug, Serialize)]
pub struct DeviceInfo {
    #[serde(flatten)]
    device: Device,
    active: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackStateResponse {
    state: EngineState,
    #[serde(skip_serializing_if = "Option::is_none")]
    playlist_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<usize>,
    now_playing: Option<NowPlaying>,
}

/// Optional body for the playback control endpoints
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRequest {
    target_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickPlayRequest {
    playlist_id: String,
    index: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickPlayMediaRequest {
    media_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    name: String,
}

fn error_response(e: StoreError) -> ErrorResponse {
    let code = match &e {
        StoreError::Capacity { .. } => StatusCode::INSUFFICIENT_STORAGE,
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::InvalidInput(_) | StoreError::InvalidLocator(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if code == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Request failed: {}", e);
    }
    (
        code,
        Json(StatusResponse {
            status: format!("error: {e}"),
        }),
    )
}

fn ok(status: &str) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: status.to_string(),
    })
}

// ============================================================================
// Read endpoints
// ============================================================================

/// GET /api/v1/devices
pub async fn list_devices(
    State(ctx): State<AppContext>,
) -> Result<Json<DeviceListResponse>, ErrorResponse> {
    let now = placard_common::time::now_millis();
    let devices = ctx
        .registry
        .devices_by_recency()
        .await
        .map_err(error_response)?
        .into_iter()
        .map(|device| DeviceInfo {
            active: Registry::is_active(&device, now),
            device,
        })
        .collect();
    Ok(Json(DeviceListResponse { devices }))
}

/// GET /api/v1/nowplaying
///
/// The globally published snapshot, which may come from any instance
/// sharing the store. `null` when nothing has been published.
pub async fn get_now_playing(
    State(ctx): State<AppContext>,
) -> Result<Json<Option<NowPlaying>>, ErrorResponse> {
    let snapshot = ctx.catalog.now_playing().await.map_err(error_response)?;
    Ok(Json(snapshot))
}

/// GET /api/v1/playback/state
///
/// This instance's own machine state, not the global snapshot.
pub async fn get_playback_state(State(ctx): State<AppContext>) -> Json<PlaybackStateResponse> {
    let current = ctx.state.current().await;
    Json(PlaybackStateResponse {
        state: ctx.state.engine_state().await,
        playlist_id: current.as_ref().and_then(|c| c.playlist_id.clone()),
        index: current.as_ref().map(|c| c.index),
        now_playing: current.map(|c| c.snapshot),
    })
}

// ============================================================================
// Playback control
// ============================================================================

fn fan_out(ctx: &AppContext, command: Command) -> Json<StatusResponse> {
    info!("Fanning out command: {:?}", command);
    ctx.bus.send(ctx.catalog.consumer_id(), command);
    ok("sent")
}

/// POST /api/v1/playback/play
pub async fn play(
    State(ctx): State<AppContext>,
    body: Option<Json<TargetRequest>>,
) -> Json<StatusResponse> {
    let target_id = body.and_then(|Json(b)| b.target_id);
    fan_out(&ctx, Command::Play { target_id })
}

/// POST /api/v1/playback/pause
pub async fn pause(
    State(ctx): State<AppContext>,
    body: Option<Json<TargetRequest>>,
) -> Json<StatusResponse> {
    let target_id = body.and_then(|Json(b)| b.target_id);
    fan_out(&ctx, Command::Pause { target_id })
}

/// POST /api/v1/playback/next
pub async fn next(
    State(ctx): State<AppContext>,
    body: Option<Json<TargetRequest>>,
) -> Json<StatusResponse> {
    let target_id = body.and_then(|Json(b)| b.target_id);
    fan_out(&ctx, Command::Next { target_id })
}

/// POST /api/v1/playback/prev
pub async fn prev(
    State(ctx): State<AppContext>,
    body: Option<Json<TargetRequest>>,
) -> Json<StatusResponse> {
    let target_id = body.and_then(|Json(b)| b.target_id);
    fan_out(&ctx, Command::Prev { target_id })
}

/// POST /api/v1/command - fan out a raw command
pub async fn send_command(
    State(ctx): State<AppContext>,
    Json(command): Json<Command>,
) -> Json<StatusResponse> {
    fan_out(&ctx, command)
}

// ============================================================================
// Quick play
// ============================================================================

/// POST /api/v1/quickplay
///
/// Pin every player to a playlist position. The override write is the
/// durable path; the bus message is the fast one.
pub async fn quick_play(
    State(ctx): State<AppContext>,
    Json(req): Json<QuickPlayRequest>,
) -> Result<Json<StatusResponse>, ErrorResponse> {
    let playlists = ctx.catalog.playlists().await.map_err(error_response)?;
    let Some(playlist) = playlists.iter().find(|p| p.id == req.playlist_id) else {
        return Err(error_response(StoreError::NotFound(format!(
            "playlist '{}'",
            req.playlist_id
        ))));
    };
    if playlist.items.len() <= req.index {
        return Err(error_response(StoreError::InvalidInput(format!(
            "index {} out of range for playlist '{}'",
            req.index, req.playlist_id
        ))));
    }

    ctx.catalog
        .set_current_play(&req.playlist_id, req.index)
        .await
        .map_err(error_response)?;
    Ok(fan_out(
        &ctx,
        Command::SetCurrentPlay {
            playlist_id: req.playlist_id,
            index: req.index,
            target_id: None,
        },
    ))
}

/// POST /api/v1/quickplay/media
///
/// Play one media item everywhere via a throwaway single-item playlist.
pub async fn quick_play_media(
    State(ctx): State<AppContext>,
    Json(req): Json<QuickPlayMediaRequest>,
) -> Result<Json<StatusResponse>, ErrorResponse> {
    let play = ctx
        .catalog
        .quick_play_media(&req.media_id)
        .await
        .map_err(error_response)?;
    Ok(fan_out(&ctx, Command::set_current_play(&play)))
}

// ============================================================================
// Devices
// ============================================================================

/// POST /api/v1/devices/:id/rename
///
/// Patches the registry record directly so the rename shows up even when
/// the device is offline, and sends the targeted command so a live device
/// persists the name locally too.
pub async fn rename_device(
    State(ctx): State<AppContext>,
    Path(device_id): Path<String>,
    Json(req): Json<RenameRequest>,
) -> Result<Json<StatusResponse>, ErrorResponse> {
    ctx.registry
        .rename(&device_id, &req.name)
        .await
        .map_err(error_response)?;
    Ok(fan_out(
        &ctx,
        Command::Rename {
            name: req.name,
            target_id: Some(device_id),
        },
    ))
}
