//! # Placard Common Library
//!
//! Shared code for the placard services including:
//! - Content model types (media, playlists, schedules, devices)
//! - Shared state store (SQLite and in-memory backends)
//! - Typed catalog accessors over the raw store
//! - Schedule resolution
//! - Control command bus
//! - Device registry and heartbeat bookkeeping
//! - Blob storage for locally uploaded media

pub mod blob;
pub mod bus;
pub mod catalog;
pub mod config;
pub mod error;
pub mod ids;
pub mod model;
pub mod registry;
pub mod schedule;
pub mod store;
pub mod time;

pub use error::{Error, Result};
pub use store::{ChangeFeed, ChangeNotice, ConsumerId, StateStore};
