use axum::response::{IntoResponse, Response};
use config::ConfigError;
use docstore::{AppError, AppJson, ErrorResponse};
use http::header::InvalidHeaderValue;
use http::StatusCode;
use tokio::task::JoinError;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("{0}")]
    App(#[from] AppError),

    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),

    #[error("Join error: {0}")]
    Join(#[from] JoinError),

    #[error("Unusable model reply: {0}")]
    ModelReply(String),

    #[error("Cannot scrape {url}: {reason}")]
    Scrape { url: String, reason: String },
}

impl FeedError {
    pub fn scrape(url: impl Into<String>, reason: impl Into<String>) -> Self {
        FeedError::Scrape { url: url.into(), reason: reason.into() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            FeedError::App(e)                          => e.status_code(),
            FeedError::Reqwest(_)
            | FeedError::ModelReply(_)
            | FeedError::Scrape { .. }                 => StatusCode::BAD_GATEWAY,
            _                                          => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for FeedError {
    fn into_response(self) -> Response {
        match self {
            FeedError::App(e) => e.into_response(),
            other => {
                let status = other.status_code();
                tracing::error!("{} {}", status, other);
                (status, AppJson(ErrorResponse { message: other.to_string(), code: status.as_u16() })).into_response()
            }
        }
    }
}
