//! Error types for neuralviz-core

use thiserror::Error;

/// Main error type for the neuralviz-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A caller handed the core something that is not a payload at all.
    ///
    /// Malformed *fields* are defaulted; this is reserved for structurally
    /// invalid calls (e.g. a push payload that is not a JSON object), which
    /// point at a transport bug rather than bad user data.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Bridge HTTP error
    #[error("bridge error: {0}")]
    Bridge(String),
}

/// Result type alias for neuralviz-core
pub type Result<T> = std::result::Result<T, Error>;
