//! Error types for the failure classes the preview engine tells apart.
//!
//! None of these are fatal in steady state: capture errors degrade to the
//! fallback icon and config errors degrade to in-memory state.

use thiserror::Error;

use crate::types::WindowId;

/// Failure to snapshot a window's surface.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The window no longer exists on the host.
    #[error("window 0x{0:x} is gone")]
    WindowGone(WindowId),

    /// The host returned fewer pixels than the geometry implies.
    #[error("short image for window 0x{id:x}: {got} bytes, expected {expected}")]
    ShortImage {
        id: WindowId,
        got: usize,
        expected: usize,
    },

    /// The host rejected the capture request.
    #[error("capture request failed: {0}")]
    Host(String),
}

/// Configuration persistence errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config directory could not be determined.
    #[error("config directory not found")]
    NoDirFound,

    /// Failed to read the config file.
    #[error("failed to read config file: {0}")]
    ReadFailed(#[source] std::io::Error),

    /// Failed to parse the config file.
    #[error("failed to parse config: {0}")]
    ParseFailed(#[source] serde_json::Error),

    /// The config document is valid JSON but not an object.
    #[error("config root is not a JSON object")]
    NotAnObject,

    /// Failed to serialize the config record.
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[source] serde_json::Error),

    /// Failed to write the config file.
    #[error("failed to save config: {0}")]
    SaveFailed(#[source] std::io::Error),
}
