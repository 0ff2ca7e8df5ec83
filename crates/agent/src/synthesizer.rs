//! Answer synthesis
//!
//! Numeric intents with computed facts get a guarded prompt; everything else
//! a context-only one. When every provider fails the answer is templated from
//! the facts, or extracted from the top context items.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use runclub_config::LlmSettings;
use runclub_core::{
    FactSheet, Query, RankedContext, PROVIDER_CALC, PROVIDER_FALLBACK, PROVIDER_NONE,
};
use runclub_llm::{PromptBuilder, ProviderChain};

/// Answer when nothing usable was retrieved or computed
pub const NO_DATA_ANSWER: &str = "Maaf, aku tidak menemukan data relevan di basis data untuk pertanyaan ini. \
Coba sebutkan nama anggota, jarak, atau bulan tertentu.";

const MAX_SUGGESTIONS: usize = 3;
const EXTRACTIVE_ITEMS: usize = 3;
const PREVIEW_CHARS: usize = 220;

static CITATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").expect("valid regex"));

/// Distinct `[n]` markers in `text`, ascending
pub fn parse_citations(text: &str) -> Vec<usize> {
    CITATION
        .captures_iter(text)
        .filter_map(|c| c[1].parse::<usize>().ok())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Follow-up prompts chosen from the question shape
pub fn suggestions(question: &str, has_context: bool) -> Vec<String> {
    if !has_context {
        return vec!["Mau aku cari berdasarkan minggu atau bulan tertentu?".to_string()];
    }

    let q = question.to_lowercase();
    let mut out: Vec<&str> = Vec::new();
    if q.contains("5 km") || q.contains("5km") {
        out.push("Mau bandingkan pace tercepat untuk 5 km?");
        out.push("Butuh lihat siapa paling sering lari 5 km bulan ini?");
    }
    if q.contains("siapa") {
        out.push("Tampilkan 5 nama teratas saja?");
    }
    if q.contains("tren") || q.contains("trend") {
        out.push("Batasi tren ke 4 minggu terakhir?");
    }
    if out.is_empty() {
        out.push("Butuh ringkasan mingguan klub?");
    }
    out.into_iter()
        .take(MAX_SUGGESTIONS)
        .map(str::to_string)
        .collect()
}

fn preview(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(PREVIEW_CHARS).collect();
    format!("{}...", cut.trim_end())
}

/// Top context items, one per subject, as cited bullets
pub fn extractive_answer(context: &RankedContext) -> String {
    let mut seen: HashSet<String> = HashSet::new();
    let mut bullets: Vec<String> = Vec::new();
    let mut refs = String::new();

    for (slot, candidate) in context.slots() {
        let key = candidate
            .subject()
            .map(str::to_lowercase)
            .unwrap_or_else(|| candidate.id().to_string());
        if !seen.insert(key) {
            continue;
        }
        bullets.push(format!("- {} [{}]", preview(candidate.summary()), slot));
        refs.push_str(&format!("[{}]", slot));
        if bullets.len() == EXTRACTIVE_ITEMS {
            break;
        }
    }

    format!(
        "Berdasarkan hasil terdekat:\n{}\n\nReferensi: {}.",
        bullets.join("\n"),
        refs
    )
}

/// Answer templated from computed facts, one sentence per fact
pub fn calc_answer(sheet: &FactSheet) -> String {
    let mut lines: Vec<String> = sheet
        .facts
        .iter()
        .map(|f| format!("{}. Rujukan: [{}]", f.statement, f.slot))
        .collect();
    lines.extend(sheet.notes.iter().map(|n| format!("{}.", n)));

    if !sheet.standings.is_empty() {
        let standings = FactSheet {
            standings: sheet.standings.clone(),
            scope: sheet.scope.clone(),
            ..Default::default()
        };
        lines.extend(standings.lines());
    }

    lines.join("\n")
}

/// Synthesized answer and how it was produced
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub answer: String,
    /// `<backend>:<model>`, `calc`, `fallback` or `none`
    pub provider: String,
    /// Context slots referenced by the answer text
    pub cited: Vec<usize>,
    pub suggestions: Vec<String>,
}

pub struct AnswerSynthesizer {
    chain: Arc<ProviderChain>,
    prompts: PromptBuilder,
}

impl AnswerSynthesizer {
    pub fn new(chain: Arc<ProviderChain>, prompts: PromptBuilder) -> Self {
        Self { chain, prompts }
    }

    pub fn from_settings(settings: &LlmSettings) -> Self {
        Self::new(
            Arc::new(ProviderChain::from_settings(settings)),
            PromptBuilder::from_settings(settings),
        )
    }

    pub fn chain(&self) -> &Arc<ProviderChain> {
        &self.chain
    }

    pub async fn synthesize(
        &self,
        query: &Query,
        context: &RankedContext,
        sheet: &FactSheet,
    ) -> Synthesis {
        let has_context = !context.is_empty();
        let suggestions = suggestions(&query.raw, has_context);

        if !has_context && sheet.is_empty() {
            tracing::debug!("No context and no facts, skipping generation");
            return Synthesis {
                answer: NO_DATA_ANSWER.to_string(),
                provider: PROVIDER_NONE.to_string(),
                cited: Vec::new(),
                suggestions,
            };
        }

        let rendered = self
            .prompts
            .render_context(context.iter().map(|c| c.summary()));
        let facts = sheet.lines();
        let messages = if query.intent.needs_facts() && !facts.is_empty() {
            self.prompts.guarded(&query.raw, &rendered, &facts)
        } else {
            self.prompts.grounded(&query.raw, &rendered)
        };

        let (answer, provider) = match self.chain.complete(&messages).await {
            Ok(completion) => (completion.text, completion.provider),
            Err(e) => {
                tracing::warn!(error = %e, "All providers failed, answering without a model");
                if !sheet.is_empty() {
                    (calc_answer(sheet), PROVIDER_CALC.to_string())
                } else {
                    (extractive_answer(context), PROVIDER_FALLBACK.to_string())
                }
            },
        };

        // markers outside the context are model noise
        let cited = parse_citations(&answer)
            .into_iter()
            .filter(|slot| context.slot(*slot).is_some())
            .collect();

        Synthesis {
            answer,
            provider,
            cited,
            suggestions,
        }
    }
}

impl std::fmt::Debug for AnswerSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerSynthesizer")
            .field("providers", &self.chain.describe())
            .field("max_context_chars", &self.prompts.max_context_chars())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use runclub_core::{CandidateRecord, Fact, FactKind, Intent, StoredRecord};
    use runclub_llm::{FinishReason, GenerationResult, LlmBackend, LlmError, Message};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedBackend {
        reply: Option<&'static str>,
        calls: AtomicUsize,
        last_prompt: parking_lot::Mutex<String>,
    }

    impl FixedBackend {
        fn new(reply: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
                last_prompt: parking_lot::Mutex::new(String::new()),
            })
        }
    }

    #[async_trait]
    impl LlmBackend for FixedBackend {
        async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock() = messages
                .iter()
                .map(|m| m.content.clone())
                .collect::<Vec<_>>()
                .join("\n");
            match self.reply {
                Some(text) => Ok(GenerationResult {
                    text: text.to_string(),
                    tokens: 1,
                    total_time_ms: 1,
                    finish_reason: FinishReason::Stop,
                }),
                None => Err(LlmError::Network("connection refused".into())),
            }
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "mock"
        }

        fn backend_name(&self) -> &str {
            "groq"
        }
    }

    fn synthesizer(backend: Arc<FixedBackend>) -> AnswerSynthesizer {
        AnswerSynthesizer::new(
            Arc::new(ProviderChain::new().with_backend(backend)),
            PromptBuilder::default(),
        )
    }

    fn context() -> RankedContext {
        RankedContext::new(vec![
            CandidateRecord::new(
                StoredRecord::new("1", "Budi lari 5 km pada 2025-01-05").with_subject("Budi"),
                0.1,
            ),
            CandidateRecord::new(
                StoredRecord::new("2", "Budi lari 6 km pada 2025-01-07").with_subject("Budi"),
                0.2,
            ),
            CandidateRecord::new(
                StoredRecord::new("3", "Sari lari 10 km pada 2025-01-06").with_subject("Sari"),
                0.3,
            ),
        ])
    }

    fn total_sheet() -> FactSheet {
        FactSheet {
            facts: vec![Fact {
                subject: "Budi".into(),
                kind: FactKind::Total,
                value_km: 11.0,
                activities: 2,
                slot: 1,
                statement: "Total jarak lari Budi (semua data): 11.00 km dari 2 aktivitas".into(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_citations() {
        assert_eq!(parse_citations("A [1] and B [1][3]"), vec![1, 3]);
        assert!(parse_citations("tanpa rujukan").is_empty());
        assert_eq!(parse_citations("[12] lalu [2]"), vec![2, 12]);
    }

    #[test]
    fn test_suggestions() {
        assert_eq!(suggestions("apa saja?", false).len(), 1);
        let s = suggestions("siapa lari 5km tren", true);
        assert_eq!(s.len(), 3);
        assert_eq!(s[2], "Tampilkan 5 nama teratas saja?");
        assert_eq!(suggestions("halo", true), vec!["Butuh ringkasan mingguan klub?".to_string()]);
    }

    #[test]
    fn test_extractive_one_item_per_subject() {
        let answer = extractive_answer(&context());
        assert_eq!(
            answer,
            "Berdasarkan hasil terdekat:\n- Budi lari 5 km pada 2025-01-05 [1]\n- Sari lari 10 km pada 2025-01-06 [3]\n\nReferensi: [1][3]."
        );
    }

    #[test]
    fn test_preview_is_bounded() {
        let long = "x".repeat(500);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
    }

    #[tokio::test]
    async fn test_no_context_skips_model() {
        let backend = FixedBackend::new(Some("tidak dipakai"));
        let synthesis = synthesizer(backend.clone())
            .synthesize(&Query::new("siapa lari?"), &RankedContext::empty(), &FactSheet::default())
            .await;
        assert_eq!(synthesis.provider, "none");
        assert_eq!(synthesis.answer, NO_DATA_ANSWER);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_model_answer_citations_are_authoritative() {
        let backend = FixedBackend::new(Some("Sari paling jauh [3], lihat juga [9]."));
        let synthesis = synthesizer(backend)
            .synthesize(&Query::new("siapa paling jauh?"), &context(), &FactSheet::default())
            .await;
        assert_eq!(synthesis.provider, "groq:mock");
        assert_eq!(synthesis.cited, vec![3]);
    }

    #[tokio::test]
    async fn test_guarded_prompt_carries_facts() {
        let backend = FixedBackend::new(Some("Budi total 11.00 km [1]"));
        let query = Query::new("total budi").with_intent(Intent::Total);
        synthesizer(backend.clone())
            .synthesize(&query, &context(), &total_sheet())
            .await;
        let prompt = backend.last_prompt.lock().clone();
        assert!(prompt.contains("Fakta terhitung:"));
        assert!(prompt.contains("11.00 km dari 2 aktivitas [1]"));
    }

    #[tokio::test]
    async fn test_provider_failure_uses_facts() {
        let query = Query::new("total budi").with_intent(Intent::Total);
        let synthesis = synthesizer(FixedBackend::new(None))
            .synthesize(&query, &context(), &total_sheet())
            .await;
        assert_eq!(synthesis.provider, "calc");
        assert!(synthesis.answer.ends_with("Rujukan: [1]"));
        assert_eq!(synthesis.cited, vec![1]);
    }

    #[tokio::test]
    async fn test_provider_failure_without_facts_is_extractive() {
        let synthesis = synthesizer(FixedBackend::new(None))
            .synthesize(&Query::new("siapa lari?"), &context(), &FactSheet::default())
            .await;
        assert_eq!(synthesis.provider, "fallback");
        assert_eq!(synthesis.cited, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_empty_chain_falls_back() {
        let synthesizer = AnswerSynthesizer::new(Arc::new(ProviderChain::new()), PromptBuilder::default());
        let synthesis = synthesizer
            .synthesize(&Query::new("siapa lari?"), &context(), &FactSheet::default())
            .await;
        assert_eq!(synthesis.provider, "fallback");
    }
}
