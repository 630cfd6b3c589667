//! Playback state machine and its collaborators

pub mod engine;
pub mod source;
pub mod state;
pub mod surface;
pub mod timing;

pub use engine::{EngineConfig, PlayerEngine};
pub use state::{CurrentItem, EngineState, InstanceState, PlayerEvent};
