//! Error types for unisono-core.

use thiserror::Error;

/// Error type for unisono-core operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Unknown generator id: {0}")]
    UnknownGenerator(String),

    #[error("Generator id already registered: {0}")]
    DuplicateGenerator(String),

    #[error("Construction failed: {0}")]
    ConstructionFailed(String),
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
