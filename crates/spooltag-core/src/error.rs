use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Session start rejections
    #[error("Unknown SKU: {0}")]
    UnknownSku(String),

    #[error("A programming session is already active: {session_id}")]
    SessionAlreadyActive { session_id: String },

    // Validation errors
    #[error("Invalid SKU: {0}")]
    InvalidSku(String),

    #[error("Invalid authentication key: {0}")]
    InvalidAuthKey(String),

    #[error("Invalid tag number: {0} (must be 1 or 2)")]
    InvalidTagNumber(u8),

    #[error("Invalid payload size: expected {expected} bytes, got {actual}")]
    PayloadSize { expected: usize, actual: usize },

    // State machine errors
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing configuration key: {0}")]
    MissingConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
