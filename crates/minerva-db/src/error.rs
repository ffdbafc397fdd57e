use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Store error taxonomy. `Validation` and `NotFound` are surfaced to callers
/// as rejected requests; everything else is an internal failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("database lock poisoned")]
    Poisoned,

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}
