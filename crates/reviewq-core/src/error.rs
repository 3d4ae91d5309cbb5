use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("card not found: {0}")]
    CardNotFound(String),

    #[error("invalid view bucket '{0}': must be needs_decision, waiting_on_others, handled, scheduled, or muted")]
    InvalidBucket(String),

    #[error("invalid objective status '{0}'")]
    InvalidStatus(String),

    #[error("invalid queue filter '{0}': must be all, high_risk, or low_confidence")]
    InvalidFilter(String),

    #[error("invalid risk level '{0}': must be high, medium, or low")]
    InvalidRisk(String),

    #[error("invalid mutation transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReviewError>;
