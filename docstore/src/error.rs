use axum::extract::rejection::JsonRejection;
use http::StatusCode;
use thiserror::Error;
use tokio::task::JoinError;

use crate::value::ColumnKind;

#[derive(Debug, Error)]
pub enum AppError {

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("serde error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json rejection: {0}")]
    JsonRejection(#[from] JsonRejection),

    #[error("Join: {0}")]
    JoinError(#[from] JoinError),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Malformed predicate: {0}")]
    MalformedPredicate(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_)           => StatusCode::NOT_FOUND,
            AppError::BadRequest(_)         => StatusCode::BAD_REQUEST,
            AppError::MalformedPredicate(_) => StatusCode::BAD_REQUEST,
            AppError::SchemaMismatch(_)     => StatusCode::BAD_REQUEST,
            AppError::Codec(_)              => StatusCode::BAD_REQUEST,
            AppError::DuplicateKey(_)       => StatusCode::CONFLICT,
            AppError::JsonRejection(r)      => r.status(),
            _                               => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Failure to move a value between its semantic form and its stored form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("invalid integer {0:?}")]
    InvalidInteger(String),

    #[error("invalid json for {kind:?} column: {reason}")]
    InvalidJson { kind: ColumnKind, reason: String },

    #[error("cannot store {found} in {expected:?} column")]
    KindMismatch { expected: ColumnKind, found: &'static str },

    #[error("null is not allowed in column {0}")]
    UnexpectedNull(String),
}

impl From<AppError> for axum::Error {
    fn from(val: AppError) -> Self {
        axum::Error::new(val.to_string())
    }
}
