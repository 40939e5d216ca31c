use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Configuration problems are fatal at startup; the run never begins.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("at least one traffic class is required")]
    NoClasses,

    #[error("traffic class weights must not all be zero")]
    ZeroClassWeights,

    #[error("class `{0}`: selection must list at least one threat type")]
    EmptySelection(String),

    #[error("class `{0}`: selection weights must not all be zero")]
    ZeroSelectionWeights(String),

    #[error("class `{class}`: pacing min {min:?} must not exceed max {max:?}")]
    InvalidPacingRange {
        class: String,
        min: Duration,
        max: Duration,
    },

    #[error("`spawn_rate` must be a positive number of users per second")]
    InvalidSpawnRate,

    #[error("invalid backend host url (expected e.g. http://localhost:8000): {0}")]
    InvalidHost(String),

    #[error("unknown threat type: `{0}`")]
    UnknownThreatType(String),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
