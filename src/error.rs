use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Chatroom not found: {0}")]
    NotFound(String),
    #[error("No active chatroom")]
    NoActiveChatroom,
    #[error("Image could not be decoded: {0}")]
    Decode(String),
    #[error("Service call failed: {0}")]
    Service(String),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed JSON: {0}")]
    Snapshot(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
