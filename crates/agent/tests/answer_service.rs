//! End-to-end tests for the answer service
//!
//! Real retriever, analyzer, computation and synthesis stages over an
//! in-memory index; the embedder and the LLM backend are scripted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use parking_lot::Mutex;

use runclub_agent::{
    AnswerService, AnswerSynthesizer, AskRequest, InMemorySessionStore, LeaderboardRequest,
    LeaderboardScope, ManualClock, SessionStore, NO_DATA_ANSWER,
};
use runclub_core::{AnswerStatus, Intent, StoredRecord};
use runclub_llm::{
    FinishReason, GenerationResult, LlmBackend, LlmError, Message, PromptBuilder, ProviderChain,
};
use runclub_rag::{
    Embedder, HybridRetriever, InMemoryIndex, QueryEncoder, QueryExpander, RagError, Reranker,
    RetrieverConfig, VectorIndex,
};

struct FlatEmbedder;

#[async_trait]
impl Embedder for FlatEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(texts.iter().map(|_| vec![1.0, 0.5]).collect())
    }

    fn dimension(&self) -> usize {
        2
    }

    fn model_name(&self) -> &str {
        "flat"
    }
}

struct MockBackend {
    reply: Option<&'static str>,
    calls: AtomicUsize,
    last_prompt: Mutex<String>,
}

impl MockBackend {
    fn answering(reply: &'static str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(String::new()),
        })
    }

    fn down() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(String::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock() = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        match self.reply {
            Some(text) => Ok(GenerationResult {
                text: text.to_string(),
                tokens: 8,
                total_time_ms: 5,
                finish_reason: FinishReason::Stop,
            }),
            None => Err(LlmError::Unauthenticated("401 invalid api key".into())),
        }
    }

    async fn is_available(&self) -> bool {
        self.reply.is_some()
    }

    fn model_name(&self) -> &str {
        "llama-3.1-8b-instant"
    }

    fn backend_name(&self) -> &str {
        "groq"
    }
}

fn subject_log(name: &str, lines: &str) -> StoredRecord {
    StoredRecord::new(
        StoredRecord::subject_record_id(name),
        format!("{} melakukan beberapa aktivitas lari: {}", name, lines),
    )
    .with_subject(name)
}

fn club_index() -> Arc<InMemoryIndex> {
    let index = Arc::new(InMemoryIndex::new());
    index.upsert(
        subject_log(
            "Budi",
            "2025-01-05: Run sejauh 5.00 km - 2025-02-10: Run sejauh 3.50 km",
        ),
        vec![1.0, 0.5],
    );
    index.upsert(
        subject_log("Sari", "2025-01-03: Run sejauh 10.00 km"),
        vec![1.0, 0.4],
    );
    index
}

struct Harness {
    service: AnswerService,
    backend: Arc<MockBackend>,
    clock: Arc<ManualClock>,
}

fn harness(index: Arc<InMemoryIndex>, backend: Arc<MockBackend>) -> Harness {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 3, 12, 9, 0, 0).unwrap(),
    ));
    let index: Arc<dyn VectorIndex> = index;

    let encoder = Arc::new(QueryEncoder::new(Arc::new(FlatEmbedder), 64, 2));
    let retriever = Arc::new(HybridRetriever::new(
        RetrieverConfig::default(),
        QueryExpander::default(),
        encoder,
        index.clone(),
        Arc::new(Reranker::disabled()),
    ));

    let synthesizer = AnswerSynthesizer::new(
        Arc::new(ProviderChain::new().with_backend(backend.clone())),
        PromptBuilder::default(),
    );
    let sessions = Arc::new(InMemorySessionStore::with_clock(
        Duration::seconds(3600),
        clock.clone(),
    ));

    let service = AnswerService::new(retriever, index, synthesizer, sessions)
        .with_clock(clock.clone());

    Harness {
        service,
        backend,
        clock,
    }
}

#[tokio::test]
async fn empty_store_answers_without_model_call() {
    let h = harness(Arc::new(InMemoryIndex::new()), MockBackend::answering("unused"));

    let context = h.service.search("siapa lari 10 km?", 5).await.unwrap();
    assert!(context.is_empty());

    let payload = h.service.ask(AskRequest::new("siapa lari 10 km?")).await;
    assert_eq!(payload.status, AnswerStatus::Ok);
    assert_eq!(payload.provider, "none");
    assert_eq!(payload.answer, NO_DATA_ANSWER);
    assert!(payload.sources.is_empty());
    assert_eq!(h.backend.calls(), 0);
}

#[tokio::test]
async fn monthly_total_is_templated_when_providers_fail() {
    let h = harness(club_index(), MockBackend::down());

    let payload = h
        .service
        .ask(AskRequest::new("Berapa total km Budi bulan januari?"))
        .await;

    assert_eq!(payload.status, AnswerStatus::Ok);
    assert_eq!(payload.intent, Intent::Total);
    assert_eq!(payload.provider, "calc");
    assert!(payload.answer.contains("5.00 km dari 1 aktivitas"));
    assert_eq!(payload.filters.subjects, vec!["Budi".to_string()]);
    assert_eq!(payload.filters.month, Some(1));
    assert_eq!(payload.cited, vec![1]);
    assert_eq!(payload.sources.len(), 1);
    assert!(payload.sources[0].cited);
    assert_eq!(h.backend.calls(), 1);
}

#[tokio::test]
async fn threshold_question_reaches_model_with_facts() {
    let h = harness(
        club_index(),
        MockBackend::answering("Ya, Budi pernah lari lebih dari 4 km [1]."),
    );

    let payload = h
        .service
        .ask(AskRequest::new("Apakah Budi pernah lari 4 km?"))
        .await;

    assert_eq!(payload.intent, Intent::Threshold);
    assert_eq!(payload.provider, "groq:llama-3.1-8b-instant");
    assert_eq!(payload.cited, vec![1]);
    assert_eq!(payload.filters.target_km, Some(4.0));
    // log records carry no distance, so a distance window would have hidden them
    assert_eq!(payload.sources.len(), 1);

    let prompt = h.backend.last_prompt.lock().clone();
    assert!(prompt.contains("Fakta terhitung:"));
    assert!(prompt.contains("Ya, Budi pernah lari ≥ 4.00 km"));
}

#[tokio::test]
async fn follow_up_question_reuses_session_subject() {
    let h = harness(club_index(), MockBackend::down());

    h.service
        .ask(AskRequest::new("total Budi januari").with_session("s1"))
        .await;
    let payload = h
        .service
        .ask(AskRequest::new("berapa total di februari?").with_session("s1"))
        .await;

    assert_eq!(payload.filters.subjects, vec!["Budi".to_string()]);
    assert_eq!(payload.filters.month, Some(2));
    assert!(payload.answer.contains("3.50 km dari 1 aktivitas"));

    let state = h.service.sessions().get("s1");
    assert_eq!(state.subject.as_deref(), Some("Budi"));
    assert_eq!(state.month, Some(2));
    assert_eq!(state.last_query.as_deref(), Some("berapa total di februari?"));
}

#[tokio::test]
async fn expired_session_is_not_backfilled() {
    let h = harness(club_index(), MockBackend::down());

    h.service
        .ask(AskRequest::new("total Budi januari").with_session("s1"))
        .await;
    h.clock.advance(Duration::seconds(3601));

    let payload = h
        .service
        .ask(AskRequest::new("berapa total di februari?").with_session("s1"))
        .await;
    assert!(payload.filters.subjects.is_empty());
    assert_eq!(payload.provider, "fallback");
}

#[tokio::test]
async fn two_subjects_are_compared_and_clear_session_subject() {
    let h = harness(club_index(), MockBackend::down());

    h.service
        .ask(AskRequest::new("total Budi").with_session("s2"))
        .await;
    let payload = h
        .service
        .ask(AskRequest::new("bandingkan Budi vs Sari").with_session("s2"))
        .await;

    assert_eq!(payload.intent, Intent::Compare);
    assert_eq!(payload.provider, "calc");
    assert!(payload.answer.contains("Lebih jauh: Sari (+1.50 km)"));
    assert_eq!(payload.cited, vec![1, 2]);
    assert!(h.service.sessions().get("s2").subject.is_none());
}

#[tokio::test]
async fn superlative_without_subjects_uses_standings() {
    let h = harness(club_index(), MockBackend::down());

    let payload = h.service.ask(AskRequest::new("siapa yang paling jauh?")).await;

    assert_eq!(payload.intent, Intent::Compare);
    assert_eq!(payload.provider, "calc");
    assert!(payload.answer.contains("1. Sari: 10.00 km dari 1 aktivitas"));
    assert!(payload.answer.contains("2. Budi: 8.50 km dari 2 aktivitas"));
}

#[tokio::test]
async fn invalid_parameters_are_reported_in_payload() {
    let h = harness(club_index(), MockBackend::answering("unused"));

    let payload = h
        .service
        .ask(AskRequest::new("total Budi").with_top_k(0))
        .await;
    assert_eq!(payload.status, AnswerStatus::Error);
    assert!(payload.message.unwrap().contains("top_k"));

    let payload = h
        .service
        .ask(AskRequest::new("total Budi").with_month(13))
        .await;
    assert_eq!(payload.status, AnswerStatus::Error);
    assert_eq!(h.backend.calls(), 0);
}

#[tokio::test]
async fn explicit_parameters_override_question() {
    let h = harness(club_index(), MockBackend::down());

    let payload = h
        .service
        .ask(
            AskRequest::new("total bulan januari")
                .with_subject("sari")
                .with_month(1)
                .with_year(2025),
        )
        .await;
    assert_eq!(payload.filters.subjects, vec!["Sari".to_string()]);
    assert_eq!(payload.filters.year, Some(2025));
    assert!(payload.filters.window.is_some());
    assert!(payload.answer.contains("10.00 km"));
}

#[tokio::test]
async fn sources_only_request_skips_synthesis() {
    let h = harness(club_index(), MockBackend::answering("unused"));

    let payload = h
        .service
        .ask(AskRequest::new("lari Sari").without_answer())
        .await;
    assert!(payload.answer.is_empty());
    assert!(!payload.sources.is_empty());
    assert!(payload.sources.iter().all(|s| !s.cited));
    assert_eq!(h.backend.calls(), 0);
}

#[tokio::test]
async fn leaderboard_and_session_clear() {
    let h = harness(club_index(), MockBackend::down());

    let table = h
        .service
        .leaderboard(&LeaderboardRequest::new(LeaderboardScope::Month).with_year(2025).with_month(1))
        .await
        .unwrap();
    assert_eq!(table.scope, "januari 2025");
    assert_eq!(table.standings[0].member, "Sari");
    assert_eq!(table.standings[1].total_km, 5.0);

    h.service
        .ask(AskRequest::new("total Budi").with_session("s3"))
        .await;
    assert!(h.service.clear_session("s3"));
    assert!(h.service.sessions().get("s3").is_blank());
}
