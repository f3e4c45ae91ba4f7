use crate::store::StoreError;
use crate::validation::ValidationError;
use thiserror::Error;

/// Errors surfaced by the entity service. Each variant maps to one HTTP status.
#[derive(Error, Debug)]
pub enum EntityError {
    /// The body could not be parsed into the expected request shape.
    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    IdAlreadyExists(String),

    #[error("{0}")]
    EntityNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
