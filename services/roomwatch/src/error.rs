//! Error types for the roomwatch service

use std::time::Duration;

/// Errors that can occur in the roomwatch service
#[derive(Debug, thiserror::Error)]
pub enum RoomwatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Measurement store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Unknown sensor: {0}")]
    UnknownSensor(String),

    #[error("Unknown building: {0}")]
    UnknownBuilding(String),

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RoomwatchError {
    /// True for the "no such id" kinds, as opposed to infrastructure failures
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RoomwatchError::UnknownSensor(_) | RoomwatchError::UnknownBuilding(_)
        )
    }
}

impl From<rusqlite::Error> for RoomwatchError {
    fn from(e: rusqlite::Error) -> Self {
        RoomwatchError::StoreUnavailable(e.to_string())
    }
}

/// Result type alias for roomwatch operations
pub type Result<T> = std::result::Result<T, RoomwatchError>;
