//! HTTP Endpoints
//!
//! REST API for the answer service.

use std::time::Duration;

use axum::{
    extract::{rejection::QueryRejection, Json, Path, Query, State},
    http::{HeaderValue, Method, StatusCode},
    routing::{delete, get},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use runclub_agent::{AskRequest, LeaderboardRequest, LeaderboardScope, LeaderboardTable};
use runclub_core::{AnswerPayload, Source};

use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::ServerError;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let server = &state.config.server;
    let cors_layer = build_cors_layer(&server.cors_origins, server.cors_enabled);
    let timeout = Duration::from_secs(server.timeout_seconds);

    Router::new()
        .route("/ask", get(ask_query).post(ask_json))
        .route("/search", get(search))
        .route("/leaderboard", get(leaderboard))
        .route("/sessions/:id", delete(clear_session))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];

    if !enabled {
        return CorsLayer::new();
    }

    if origins.is_empty() {
        tracing::info!("No CORS origins configured, allowing any origin");
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any);
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        tracing::error!("All configured CORS origins are invalid, allowing none");
        return CorsLayer::new();
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods(methods)
        .allow_headers(Any)
}

/// Query string of `GET /ask`
#[derive(Debug, Default, Deserialize)]
pub struct AskParams {
    #[serde(default)]
    pub question: String,
    pub top_k: Option<usize>,
    pub session_id: Option<String>,
    pub subject: Option<String>,
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub with_answer: Option<bool>,
}

impl From<AskParams> for AskRequest {
    fn from(params: AskParams) -> Self {
        AskRequest {
            question: params.question,
            top_k: params.top_k,
            session_id: params.session_id,
            subject: params.subject,
            month: params.month,
            year: params.year,
            with_answer: params.with_answer.unwrap_or(true),
        }
    }
}

/// Always 200; failures travel in the payload's `status`/`message`
async fn ask_query(
    State(state): State<AppState>,
    params: Result<Query<AskParams>, QueryRejection>,
) -> Json<AnswerPayload> {
    match params {
        Ok(Query(params)) => Json(state.service.ask(params.into()).await),
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Malformed /ask query string");
            Json(AnswerPayload::error(
                "",
                format!("Parameter tidak valid: {}", rejection.body_text()),
            ))
        },
    }
}

async fn ask_json(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Json<AnswerPayload> {
    Json(state.service.ask(request).await)
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<Source>,
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ServerError> {
    let top_k = params.top_k.unwrap_or(state.config.rag.top_k);
    let context = state.service.search(&params.q, top_k).await?;

    let results = AnswerPayload::default().with_sources(&context, &[]).sources;
    Ok(Json(SearchResponse {
        query: params.q,
        results,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardParams {
    pub scope: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub week: Option<u32>,
}

async fn leaderboard(
    State(state): State<AppState>,
    Query(params): Query<LeaderboardParams>,
) -> Result<Json<LeaderboardTable>, ServerError> {
    let raw_scope = params.scope.unwrap_or_default();
    let scope = LeaderboardScope::parse(&raw_scope).ok_or_else(|| {
        ServerError::InvalidRequest(format!(
            "scope must be one of all, year, month, week; got '{}'",
            raw_scope
        ))
    })?;

    let mut request = LeaderboardRequest::new(scope);
    if let Some(year) = params.year {
        request = request.with_year(year);
    }
    if let Some(month) = params.month {
        request = request.with_month(month);
    }
    if let Some(week) = params.week {
        request = request.with_week(week);
    }

    Ok(Json(state.service.leaderboard(&request).await?))
}

async fn clear_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<serde_json::Value> {
    let cleared = state.service.clear_session(&id);
    tracing::info!(session_id = %id, cleared, "Session cleared");
    Json(serde_json::json!({ "session_id": id, "cleared": cleared }))
}

/// Store reachability, reranker availability and the provider chain
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let mut checks = serde_json::Map::new();

    let store_ok = match state.service.index().count().await {
        Ok(count) => {
            checks.insert(
                "vector_store".to_string(),
                serde_json::json!({
                    "status": "ok",
                    "collection": state.config.vector_store.collection,
                    "count": count
                }),
            );
            true
        },
        Err(e) => {
            tracing::warn!(error = %e, "Health check: vector store unreachable");
            checks.insert(
                "vector_store".to_string(),
                serde_json::json!({
                    "status": "unreachable",
                    "collection": state.config.vector_store.collection,
                    "error": e.to_string()
                }),
            );
            false
        },
    };

    checks.insert(
        "reranker".to_string(),
        serde_json::json!({
            "status": if state.reranker.is_available() { "ok" } else { "disabled" },
            "enabled": state.config.reranker.enabled
        }),
    );

    let providers = state.service.synthesizer().chain().describe();
    checks.insert(
        "llm".to_string(),
        serde_json::json!({
            "status": if providers.is_empty() { "none" } else { "configured" },
            "providers": providers
        }),
    );

    checks.insert(
        "sessions".to_string(),
        serde_json::json!({ "active": state.service.sessions().len() }),
    );

    let status = if store_ok { "healthy" } else { "degraded" };
    let code = if store_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(serde_json::json!({
            "status": status,
            "version": env!("CARGO_PKG_VERSION"),
            "checks": checks
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use runclub_agent::{AnswerService, AnswerSynthesizer, InMemorySessionStore};
    use runclub_config::Settings;
    use runclub_core::StoredRecord;
    use runclub_llm::{PromptBuilder, ProviderChain};
    use runclub_rag::{
        Embedder, HybridRetriever, InMemoryIndex, QueryEncoder, QueryExpander, RagError,
        Reranker, RetrieverConfig, VectorIndex,
    };

    struct FlatEmbedder;

    #[async_trait]
    impl Embedder for FlatEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "flat"
        }
    }

    fn test_state(index: Arc<InMemoryIndex>) -> AppState {
        let index: Arc<dyn VectorIndex> = index;
        let reranker = Arc::new(Reranker::disabled());
        let retriever = Arc::new(HybridRetriever::new(
            RetrieverConfig::default(),
            QueryExpander::default(),
            Arc::new(QueryEncoder::new(Arc::new(FlatEmbedder), 16, 2)),
            index.clone(),
            reranker.clone(),
        ));
        let synthesizer =
            AnswerSynthesizer::new(Arc::new(ProviderChain::new()), PromptBuilder::default());
        let sessions = Arc::new(InMemorySessionStore::new(chrono::Duration::seconds(3600)));

        let service = AnswerService::new(retriever, index, synthesizer, sessions);
        AppState::new(Settings::default(), service, reranker)
    }

    fn seeded_index() -> Arc<InMemoryIndex> {
        let index = Arc::new(InMemoryIndex::new());
        index.upsert(
            StoredRecord::new(
                StoredRecord::subject_record_id("Budi"),
                "Budi melakukan beberapa aktivitas lari: 2025-01-05: Run sejauh 5.00 km",
            )
            .with_subject("Budi"),
            vec![1.0, 0.0],
        );
        index
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_ask_on_empty_store_is_ok_without_provider() {
        let app = create_router(test_state(Arc::new(InMemoryIndex::new())));
        let (status, body) = get_json(app, "/ask?question=siapa%20lari%2010%20km").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["provider"], "none");
        assert_eq!(body["sources"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_ask_malformed_params_still_200() {
        let app = create_router(test_state(seeded_index()));
        let (status, body) = get_json(app, "/ask?question=total&month=abc").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains("Parameter"));
    }

    #[tokio::test]
    async fn test_ask_out_of_range_top_k() {
        let app = create_router(test_state(seeded_index()));
        let (status, body) = get_json(app, "/ask?question=total%20Budi&top_k=0").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_search_returns_ranked_sources() {
        let app = create_router(test_state(seeded_index()));
        let (status, body) = get_json(app, "/search?q=lari%20Budi&top_k=3").await;

        assert_eq!(status, StatusCode::OK);
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["slot"], 1);
    }

    #[tokio::test]
    async fn test_search_rejects_empty_query() {
        let app = create_router(test_state(seeded_index()));
        let (status, body) = get_json(app, "/search?q=").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_leaderboard_scopes() {
        let app = create_router(test_state(seeded_index()));
        let (status, body) = get_json(app.clone(), "/leaderboard").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["standings"][0]["member"], "Budi");

        let (status, _) = get_json(app, "/leaderboard?scope=decade").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_clear_unknown_session() {
        let app = create_router(test_state(seeded_index()));
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/sessions/abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["cleared"], false);
    }

    #[tokio::test]
    async fn test_health_reports_store_count() {
        let app = create_router(test_state(seeded_index()));
        let (status, body) = get_json(app, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["vector_store"]["count"], 1);
        assert_eq!(body["checks"]["reranker"]["status"], "disabled");
        assert_eq!(body["checks"]["llm"]["status"], "none");
    }

    #[tokio::test]
    async fn test_metrics_disabled_without_recorder() {
        let app = create_router(test_state(seeded_index()));
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
