//! Error types for importq.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("work record not found: {0}")]
    NotFound(String),

    #[error("node is not the queue owner: {0}")]
    NotLeader(String),

    #[error("duplicate handler for category: {0}")]
    DuplicateHandler(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("handler failure: {0}")]
    Handler(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
