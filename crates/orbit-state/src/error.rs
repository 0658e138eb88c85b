use thiserror::Error;

/// Errors raised by the durable state store.
#[derive(Debug, Error)]
pub enum StateError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The database file's parent directory could not be created.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The store mutex was poisoned by a panicking holder.
    #[error("state store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StateError>;
