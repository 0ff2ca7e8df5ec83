//! Answer service
//!
//! One call per question: validate → analyze → session backfill → retrieve →
//! pin subject logs → compute facts (and standings) → synthesize → remember.
//! Every outcome, including failures, is returned as an [`AnswerPayload`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Duration as TtlDuration;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use runclub_config::constants::rag;
use runclub_config::Settings;
use runclub_core::{
    AnswerPayload, AnswerStatus, AppliedFilters, CandidateRecord, FactSheet, Intent, Query,
    RankedContext, RetrieveOptions, Retriever, StoredRecord, PROVIDER_NONE,
};
use runclub_rag::VectorIndex;

use crate::analyzer::QueryAnalyzer;
use crate::compute::{ComputationEngine, Period};
use crate::entities::SubjectMatcher;
use crate::leaderboard::{Leaderboard, LeaderboardRequest, LeaderboardTable, StandingsFilter};
use crate::session_store::{Clock, InMemorySessionStore, SessionStore, SystemClock};
use crate::synthesizer::{suggestions, AnswerSynthesizer, NO_DATA_ANSWER};
use crate::AgentError;

const MIN_YEAR: i32 = 2000;
const MAX_YEAR: i32 = 2100;

/// Standings rendered into a prompt
const MAX_STANDINGS: usize = 10;

/// How long the known-subject list is reused before rescanning the store
const SUBJECT_REFRESH: Duration = Duration::from_secs(300);

/// Distance given to records pinned into context by id
const PINNED_DISTANCE: f32 = 1.0;

fn default_true() -> bool {
    true
}

/// Parameters of one question
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Overrides any subject named in the question
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub month: Option<u32>,
    #[serde(default)]
    pub year: Option<i32>,
    /// Sources only when false
    #[serde(default = "default_true")]
    pub with_answer: bool,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            with_answer: true,
            ..Default::default()
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_month(mut self, month: u32) -> Self {
        self.month = Some(month);
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn without_answer(mut self) -> Self {
        self.with_answer = false;
        self
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.question.trim().is_empty() {
            return Err(AgentError::InvalidInput("question must not be empty".into()));
        }
        if let Some(k) = self.top_k {
            if !(1..=rag::MAX_TOP_K).contains(&k) {
                return Err(AgentError::InvalidInput(format!(
                    "top_k must be between 1 and {}, got {}",
                    rag::MAX_TOP_K,
                    k
                )));
            }
        }
        if let Some(m) = self.month {
            if !(1..=12).contains(&m) {
                return Err(AgentError::InvalidInput(format!(
                    "month must be between 1 and 12, got {}",
                    m
                )));
            }
        }
        if let Some(y) = self.year {
            if !(MIN_YEAR..=MAX_YEAR).contains(&y) {
                return Err(AgentError::InvalidInput(format!(
                    "year must be between {} and {}, got {}",
                    MIN_YEAR, MAX_YEAR, y
                )));
            }
        }
        Ok(())
    }
}

struct SubjectCache {
    loaded_at: Instant,
    matcher: Arc<SubjectMatcher>,
}

pub struct AnswerService {
    retriever: Arc<dyn Retriever>,
    index: Arc<dyn VectorIndex>,
    analyzer: QueryAnalyzer,
    engine: ComputationEngine,
    leaderboard: Leaderboard,
    synthesizer: AnswerSynthesizer,
    sessions: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    subjects: RwLock<Option<SubjectCache>>,
    default_top_k: usize,
    candidate_pool: usize,
    default_session_id: String,
}

impl AnswerService {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        index: Arc<dyn VectorIndex>,
        synthesizer: AnswerSynthesizer,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        let defaults = Settings::default();
        Self {
            leaderboard: Leaderboard::new(index.clone()),
            retriever,
            index,
            analyzer: QueryAnalyzer::default(),
            engine: ComputationEngine::new(),
            synthesizer,
            sessions,
            clock: Arc::new(SystemClock),
            subjects: RwLock::new(None),
            default_top_k: defaults.rag.top_k,
            candidate_pool: defaults.rag.candidate_pool,
            default_session_id: defaults.session.default_session_id,
        }
    }

    /// Wire the service from settings around an already built retriever and index
    pub fn from_settings(
        settings: &Settings,
        retriever: Arc<dyn Retriever>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        let sessions = Arc::new(InMemorySessionStore::new(TtlDuration::seconds(
            settings.session.ttl_seconds as i64,
        )));
        let mut service = Self::new(
            retriever,
            index,
            AnswerSynthesizer::from_settings(&settings.llm),
            sessions,
        );
        service.default_top_k = settings.rag.top_k;
        service.candidate_pool = settings.rag.candidate_pool;
        service.default_session_id = settings.session.default_session_id.clone();
        service
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_analyzer(mut self, analyzer: QueryAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn with_default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k;
        self
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn synthesizer(&self) -> &AnswerSynthesizer {
        &self.synthesizer
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Answer one question; never fails, errors are carried in the payload
    pub async fn ask(&self, request: AskRequest) -> AnswerPayload {
        let question = request.question.clone();
        let (payload, status) = match self.answer(request).await {
            Ok(payload) => (payload, "ok"),
            Err(AgentError::NoRelevantContext) => (
                AnswerPayload {
                    question: question.clone(),
                    answer: NO_DATA_ANSWER.to_string(),
                    provider: PROVIDER_NONE.to_string(),
                    suggestions: suggestions(&question, false),
                    ..Default::default()
                },
                "no_context",
            ),
            Err(e) => {
                tracing::warn!(error = %e, "Question failed");
                let message = match &e {
                    AgentError::InvalidInput(m) => m.clone(),
                    _ => "Maaf, terjadi kesalahan saat memproses pertanyaan.".to_string(),
                };
                (AnswerPayload::error(question, message), "error")
            },
        };

        metrics::counter!("runclub_ask_total", "status" => status).increment(1);
        payload
    }

    async fn answer(&self, request: AskRequest) -> Result<AnswerPayload, AgentError> {
        request.validate()?;

        let now = self.clock.now();
        let session_id = request
            .session_id
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.default_session_id.clone());
        let matcher = self.known_subjects().await;

        let mut query = self.analyzer.analyze(&request.question, &matcher, now);
        self.apply_overrides(&mut query, &request, &matcher);
        self.backfill(&mut query, &session_id);

        let top_k = request.top_k.unwrap_or(self.default_top_k);
        let options = RetrieveOptions::default()
            .with_top_k(top_k)
            .with_candidate_pool(self.candidate_pool.max(top_k))
            // a threshold distance is a lower bound, not a target
            .with_distance_window(query.intent != Intent::Threshold);

        let mut context = self.retriever.retrieve(&query, &options).await?;
        self.pin_subject_logs(&query, &mut context).await;

        let mut sheet = self.engine.compute(&query, &context);
        if query.intent == Intent::Compare && query.subjects.len() < 2 {
            self.attach_standings(&query, &mut sheet).await;
        }

        self.remember(&session_id, &query);

        if context.is_empty() && sheet.is_empty() {
            return Err(AgentError::NoRelevantContext);
        }

        let filters = AppliedFilters {
            subjects: query.subjects.clone(),
            month: query.month,
            year: query.year,
            target_km: query.target_km,
            window: query.window,
        };

        if !request.with_answer {
            return Ok(AnswerPayload {
                status: AnswerStatus::Ok,
                question: request.question,
                provider: PROVIDER_NONE.to_string(),
                intent: query.intent,
                filters,
                facts: sheet.lines(),
                ..Default::default()
            }
            .with_sources(&context, &[]));
        }

        let synthesis = self.synthesizer.synthesize(&query, &context, &sheet).await;

        tracing::info!(
            intent = %query.intent,
            provider = %synthesis.provider,
            context = context.len(),
            facts = sheet.facts.len(),
            cited = ?synthesis.cited,
            "Question answered"
        );

        Ok(AnswerPayload {
            status: AnswerStatus::Ok,
            message: None,
            question: request.question,
            answer: synthesis.answer,
            provider: synthesis.provider,
            intent: query.intent,
            filters,
            cited: synthesis.cited.clone(),
            suggestions: synthesis.suggestions,
            facts: sheet.lines(),
            sources: Vec::new(),
        }
        .with_sources(&context, &synthesis.cited))
    }

    /// Ranked context for a bare search, no synthesis
    pub async fn search(&self, question: &str, top_k: usize) -> Result<RankedContext, AgentError> {
        if question.trim().is_empty() {
            return Err(AgentError::InvalidInput("q must not be empty".into()));
        }
        if !(1..=rag::MAX_TOP_K).contains(&top_k) {
            return Err(AgentError::InvalidInput(format!(
                "top_k must be between 1 and {}, got {}",
                rag::MAX_TOP_K,
                top_k
            )));
        }

        let matcher = self.known_subjects().await;
        let query = self.analyzer.analyze(question, &matcher, self.clock.now());
        let options = RetrieveOptions::default()
            .with_top_k(top_k)
            .with_candidate_pool(self.candidate_pool.max(top_k))
            .with_distance_window(query.intent != Intent::Threshold);

        Ok(self.retriever.retrieve(&query, &options).await?)
    }

    pub async fn leaderboard(&self, request: &LeaderboardRequest) -> Result<LeaderboardTable, AgentError> {
        self.leaderboard.table(request, self.clock.now()).await
    }

    /// Forget a session; true when one existed
    pub fn clear_session(&self, session_id: &str) -> bool {
        self.sessions.clear(session_id)
    }

    /// Drop the cached subject list so the next question rescans the store
    pub fn invalidate_subjects(&self) {
        *self.subjects.write() = None;
    }

    /// Distinct subject names in the store, cached for a few minutes
    pub async fn known_subjects(&self) -> Arc<SubjectMatcher> {
        let cached = self
            .subjects
            .read()
            .as_ref()
            .filter(|c| c.loaded_at.elapsed() < SUBJECT_REFRESH)
            .map(|c| c.matcher.clone());
        if let Some(matcher) = cached {
            return matcher;
        }

        match self.index.scroll_all().await {
            Ok(records) => {
                let mut names: Vec<String> = Vec::new();
                for name in records.iter().filter_map(|r| r.subject.as_deref()) {
                    let name = name.trim();
                    if !name.is_empty() && !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                        names.push(name.to_string());
                    }
                }
                tracing::debug!(subjects = names.len(), "Known subjects loaded");

                let matcher = Arc::new(SubjectMatcher::new(names));
                *self.subjects.write() = Some(SubjectCache {
                    loaded_at: Instant::now(),
                    matcher: matcher.clone(),
                });
                matcher
            },
            Err(e) => {
                tracing::warn!(error = %e, "Could not load subject names");
                Arc::new(SubjectMatcher::default())
            },
        }
    }

    fn apply_overrides(&self, query: &mut Query, request: &AskRequest, matcher: &SubjectMatcher) {
        if let Some(subject) = request.subject.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let canonical = matcher
                .known()
                .iter()
                .find(|k| k.eq_ignore_ascii_case(subject))
                .cloned()
                .unwrap_or_else(|| subject.to_string());
            query.subjects = vec![canonical];
        }

        if request.month.is_some() || request.year.is_some() {
            if request.month.is_some() {
                query.month = request.month;
            }
            if request.year.is_some() {
                query.year = request.year;
            }
            query.window = None;
            query.resolve_window();
        }
    }

    /// Fill omitted subject/month/year from the session
    fn backfill(&self, query: &mut Query, session_id: &str) {
        let state = self.sessions.get(session_id);
        if state.is_blank() {
            return;
        }

        if query.subjects.is_empty() {
            if let Some(subject) = state.subject {
                query.subjects.push(subject);
            }
        }

        // a relative window ("minggu ini") already fixes the period
        if query.window.is_none() {
            query.month = query.month.or(state.month);
            query.year = query.year.or(state.year);
            query.resolve_window();
        }

        tracing::debug!(
            session_id,
            subjects = ?query.subjects,
            month = ?query.month,
            year = ?query.year,
            "Session backfill applied"
        );
    }

    /// Make sure each subject's aggregated log is in context
    async fn pin_subject_logs(&self, query: &Query, context: &mut RankedContext) {
        let missing: Vec<String> = query
            .subjects
            .iter()
            .map(|s| StoredRecord::subject_record_id(s))
            .filter(|id| !context.contains_id(id))
            .collect();
        if missing.is_empty() {
            return;
        }

        match self.index.get_by_id(&missing).await {
            Ok(records) => {
                for record in records {
                    tracing::debug!(id = %record.id, "Pinned subject log into context");
                    context.push(CandidateRecord::new(record, PINNED_DISTANCE));
                }
            },
            Err(e) => tracing::warn!(error = %e, "Could not pin subject logs"),
        }
    }

    async fn attach_standings(&self, query: &Query, sheet: &mut FactSheet) {
        let period = Period::from_query(query);
        let (filter, scope) = if !period.is_unbounded() {
            (StandingsFilter::Period(period), period.label())
        } else if let Some(window) = query.window {
            let last_day = (window.end - TtlDuration::seconds(1)).date_naive();
            (
                StandingsFilter::Window(window),
                Some(format!("{} s.d. {}", window.start.date_naive(), last_day)),
            )
        } else {
            (StandingsFilter::All, None)
        };

        match self.leaderboard.standings(&filter).await {
            Ok(mut standings) => {
                standings.truncate(MAX_STANDINGS);
                sheet.standings = standings;
                sheet.scope = scope;
            },
            Err(e) => tracing::warn!(error = %e, "Standings unavailable"),
        }
    }

    /// Store the resolved filters for the next question in this session
    fn remember(&self, session_id: &str, query: &Query) {
        let subjects = query.subjects.clone();
        let (month, year) = (query.month, query.year);
        let raw = query.raw.clone();

        self.sessions.update(session_id, &mut |state| {
            match subjects.as_slice() {
                [one] => state.subject = Some(one.clone()),
                [_, _, ..] => state.subject = None,
                [] => {},
            }
            if month.is_some() {
                state.month = month;
            }
            if year.is_some() {
                state.year = year;
            }
            state.last_query = Some(raw.clone());
        });
    }
}
