//! # Placard Player
//!
//! Per-instance playback runtime: resolves "what plays now" from the
//! shared state store, walks the active playlist, publishes heartbeats
//! and now-playing snapshots, and exposes a small control API.

pub mod api;
pub mod error;
pub mod heartbeat;
pub mod identity;
pub mod playback;

pub use error::{Error, Result};
