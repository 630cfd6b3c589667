//! Player error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the player runtime
#[derive(Error, Debug)]
pub enum Error {
    /// Error from the shared placard library (store, catalog, blobs)
    #[error(transparent)]
    Common(#[from] placard_common::Error),

    /// I/O error while persisting the device identity
    #[error("Identity error: {0}")]
    Identity(String),
}
