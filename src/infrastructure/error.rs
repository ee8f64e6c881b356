use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("network error: {0}")]
    Network(String),
    #[error("no extraction strategy yielded a complete prayer time set")]
    Resolution,
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("audio playback failed: {0}")]
    Playback(String),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}
