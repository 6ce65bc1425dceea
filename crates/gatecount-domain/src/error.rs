use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid count update: {0}")]
    InvalidUpdate(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Unknown role tag: {0}")]
    UnknownRole(String),

    #[error("Unknown notice kind: {0}")]
    UnknownNoticeKind(String),

    #[error("Nothing to reset: entered = {entered}, exited = {exited}")]
    NothingToReset { entered: i64, exited: i64 },

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}

pub type DomainResult<T> = Result<T, DomainError>;
