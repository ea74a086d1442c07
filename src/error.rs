// Error types for the control core

/// Errors raised by the control core
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Malformed frame: expected {expected} bytes, got {actual}")]
    MalformedFrame { expected: usize, actual: usize },

    #[error("Invalid mode request: {0}")]
    InvalidModeRequest(u8),

    #[error("Failed to load mission plan: {0}")]
    PlanLoad(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
