//! Application State
//!
//! Shared state across all handlers. Every collaborator is built once here
//! and injected into the answer service.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use runclub_agent::AnswerService;
use runclub_config::Settings;
use runclub_rag::{
    embedder_from_settings, HybridRetriever, QdrantStore, Reranker, VectorIndex, VectorStoreConfig,
};

use crate::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub service: Arc<AnswerService>,
    /// Kept for health reporting; also owned by the retriever
    pub reranker: Arc<Reranker>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Settings, service: AnswerService, reranker: Arc<Reranker>) -> Self {
        Self {
            config: Arc::new(config),
            service: Arc::new(service),
            reranker,
            metrics: None,
        }
    }

    /// Qdrant store, embedder, reranker, retriever and provider chain from settings
    pub fn from_settings(config: Settings) -> Result<Self, ServerError> {
        let index: Arc<dyn VectorIndex> = Arc::new(QdrantStore::new(VectorStoreConfig::from(
            &config.vector_store,
        ))?);
        let embedder = embedder_from_settings(&config.embedding)?;
        let reranker = Arc::new(Reranker::from_settings(&config.reranker));
        let retriever = Arc::new(HybridRetriever::from_settings(
            &config,
            index.clone(),
            embedder,
            reranker.clone(),
        ));

        let service = AnswerService::from_settings(&config, retriever, index);
        tracing::info!(
            collection = %config.vector_store.collection,
            embedding_model = %config.embedding.model,
            providers = ?service.synthesizer().chain().describe(),
            reranker = config.reranker.enabled,
            "Answer service initialized"
        );

        Ok(Self::new(config, service, reranker))
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
