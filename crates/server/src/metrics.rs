//! Prometheus metrics
//!
//! The recorder is installed once at startup; `/metrics` renders the
//! handle's current snapshot.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::state::AppState;
use crate::ServerError;

/// Install the global recorder and describe the engine's metrics
pub fn init_metrics() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Startup(format!("metrics recorder: {}", e)))?;

    metrics::describe_counter!("runclub_ask_total", "Questions answered, by outcome status");
    metrics::describe_counter!(
        "runclub_provider_failures_total",
        "LLM provider calls that failed or returned nothing"
    );
    metrics::describe_counter!(
        "runclub_reranker_fallback_total",
        "Rankings that fell back to the hybrid score"
    );
    metrics::describe_histogram!(
        "runclub_retrieval_candidates",
        "Merged candidates per retrieval call"
    );

    Ok(handle)
}

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.as_ref() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics disabled\n".to_string()),
    }
}
