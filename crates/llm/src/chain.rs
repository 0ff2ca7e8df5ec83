//! Provider chain
//!
//! Ordered list of LLM backends tried one after another. A provider that
//! could not be constructed (missing credential, bad config) stays in the
//! chain as an unavailable slot and is skipped at call time.

use std::sync::Arc;

use runclub_config::LlmSettings;

use crate::backend::LlmBackend;
use crate::factory::{LlmFactory, LlmProvider};
use crate::prompt::Message;
use crate::LlmError;

/// Text produced by the first provider that answered
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    /// `<backend>:<model>`
    pub provider: String,
}

struct ProviderSlot {
    name: String,
    backend: Result<Arc<dyn LlmBackend>, String>,
}

#[derive(Default)]
pub struct ProviderChain {
    slots: Vec<ProviderSlot>,
}

impl ProviderChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build slots for `settings.providers` in order
    pub fn from_settings(settings: &LlmSettings) -> Self {
        let mut chain = Self::new();

        for name in &settings.providers {
            let Some(provider) = LlmProvider::from_str(name) else {
                tracing::warn!(provider = %name, "Unknown LLM provider, skipping");
                chain = chain.with_unavailable(name.clone(), "unknown provider");
                continue;
            };

            match LlmFactory::create(provider, settings) {
                Ok(backend) => {
                    tracing::info!(provider = %backend.provider_id(), "LLM provider ready");
                    chain = chain.with_backend(backend);
                },
                Err(e) => {
                    tracing::warn!(provider = %provider, error = %e, "LLM provider unavailable");
                    chain = chain.with_unavailable(provider.as_str(), e.to_string());
                },
            }
        }

        chain
    }

    pub fn with_backend(mut self, backend: Arc<dyn LlmBackend>) -> Self {
        self.slots.push(ProviderSlot {
            name: backend.backend_name().to_string(),
            backend: Ok(backend),
        });
        self
    }

    pub fn with_unavailable(mut self, name: impl Into<String>, reason: impl Into<String>) -> Self {
        self.slots.push(ProviderSlot {
            name: name.into(),
            backend: Err(reason.into()),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots that can actually be called
    pub fn available(&self) -> usize {
        self.slots.iter().filter(|s| s.backend.is_ok()).count()
    }

    /// Provider ids in priority order; unusable slots are marked
    pub fn describe(&self) -> Vec<String> {
        self.slots
            .iter()
            .map(|slot| match &slot.backend {
                Ok(backend) => backend.provider_id(),
                Err(_) => format!("{} (unavailable)", slot.name),
            })
            .collect()
    }

    /// First non-empty answer in priority order.
    ///
    /// Every failure, including rejected credentials, moves on to the next
    /// slot. Only exhaustion of the whole chain is an error.
    pub async fn complete(&self, messages: &[Message]) -> Result<Completion, LlmError> {
        if self.slots.is_empty() {
            return Err(LlmError::NoProviders);
        }

        let mut failures = Vec::new();

        for slot in &self.slots {
            let backend = match &slot.backend {
                Ok(backend) => backend,
                Err(reason) => {
                    tracing::debug!(provider = %slot.name, reason = %reason, "Skipping provider");
                    failures.push(format!("{}: {}", slot.name, reason));
                    continue;
                },
            };

            let outcome = match backend.generate(messages).await {
                Ok(result) if !result.text.trim().is_empty() => {
                    return Ok(Completion {
                        text: result.text.trim().to_string(),
                        provider: backend.provider_id(),
                    });
                },
                Ok(_) => LlmError::EmptyResponse,
                Err(e) => e,
            };

            tracing::warn!(
                provider = %backend.provider_id(),
                error = %outcome,
                auth = outcome.is_auth_error(),
                "LLM provider failed, trying next"
            );
            metrics::counter!("runclub_provider_failures_total", "provider" => slot.name.clone())
                .increment(1);
            failures.push(format!("{}: {}", slot.name, outcome));
        }

        Err(LlmError::Exhausted(failures.join("; ")))
    }
}

impl std::fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderChain")
            .field("providers", &self.describe())
            .finish()
    }
}
