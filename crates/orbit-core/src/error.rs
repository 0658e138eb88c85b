use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrbitError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing secret: {0}")]
    MissingSecret(&'static str),

    #[error("Profile error ({path}): {reason}")]
    Profile { path: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrbitError {
    /// Fatal errors abort the run with a non-zero exit status.
    pub fn is_fatal(&self) -> bool {
        matches!(self, OrbitError::Config(_) | OrbitError::MissingSecret(_))
    }
}

pub type Result<T> = std::result::Result<T, OrbitError>;
