//! SSE mirror of player events
//!
//! Streams state changes, now-playing updates, and received commands to
//! observers. Best effort like everything else on the push path: a slow
//! client drops events and keeps going.

use crate::api::AppContext;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

/// GET /api/v1/events
pub async fn events(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected");
    let rx = ctx.state.subscribe_events();

    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(event) => Event::default().json_data(&event).ok().map(Ok),
            Err(e) => {
                // Lagged receiver: drop the gap and continue
                warn!("SSE client lagged: {:?}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    )
}
