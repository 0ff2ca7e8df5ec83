//! Run club question answering server
//!
//! HTTP endpoints over the answer service: `/ask`, `/search`,
//! `/leaderboard`, session reset, health and Prometheus metrics.

pub mod http;
pub mod metrics;
pub mod state;

pub use http::create_router;
pub use metrics::init_metrics;
pub use state::AppState;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use runclub_agent::AgentError;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Startup error: {0}")]
    Startup(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Config(_) | ServerError::Startup(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (StatusCode::from(self), body).into_response()
    }
}

impl From<AgentError> for ServerError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::InvalidInput(m) => ServerError::InvalidRequest(m),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<runclub_rag::RagError> for ServerError {
    fn from(err: runclub_rag::RagError) -> Self {
        ServerError::Startup(err.to_string())
    }
}

impl From<runclub_config::ConfigError> for ServerError {
    fn from(err: runclub_config::ConfigError) -> Self {
        ServerError::Config(err.to_string())
    }
}
