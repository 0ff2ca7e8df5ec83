//! Prompt Building
//!
//! Constructs the grounded prompts for run club answers. Context items are
//! rendered as numbered `[n]` lines so the model can cite them back.

use std::fmt;

use serde::{Deserialize, Serialize};

use runclub_config::LlmSettings;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Persona and grounding rules
pub const SYSTEM_PROMPT: &str = "Kamu adalah asisten klub lari yang ramah dan relevan. \
Jawab singkat (1-3 kalimat) dalam bahasa Indonesia santai. \
Gunakan HANYA fakta dari 'Konteks'; boleh penalaran ringan (menjumlahkan, membandingkan) berbasis data. \
Jika data tidak ada di konteks, katakan dengan jujur dan tawarkan pertanyaan klarifikasi. \
Selalu sertakan rujukan [nomor] pada fakta utama.";

/// Appended when computed facts accompany the context
pub const FACT_GUARD: &str = "Bagian 'Fakta terhitung' sudah dihitung dari data. \
Salin angkanya persis, jangan menghitung ulang atau mengubah angka apa pun, \
dan pertahankan rujukan [nomor] yang menyertainya.";

/// Builds system/user message pairs under a context character budget
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_prompt: String,
    max_context_chars: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(runclub_config::constants::llm::MAX_CONTEXT_CHARS)
    }
}

impl PromptBuilder {
    pub fn new(max_context_chars: usize) -> Self {
        Self {
            system_prompt: SYSTEM_PROMPT.to_string(),
            max_context_chars,
        }
    }

    pub fn from_settings(settings: &LlmSettings) -> Self {
        Self::new(settings.max_context_chars)
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn max_context_chars(&self) -> usize {
        self.max_context_chars
    }

    /// Render `[i] text` lines, numbered from 1, until the budget is spent.
    ///
    /// A first item larger than the whole budget is cut rather than dropped.
    pub fn render_context<'a, I>(&self, items: I) -> String
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut lines: Vec<String> = Vec::new();
        let mut used = 0usize;

        for (i, text) in items.into_iter().enumerate() {
            let line = format!("[{}] {}", i + 1, text.replace('\n', " "));
            let len = line.chars().count();
            let separator = usize::from(!lines.is_empty());

            if used + separator + len > self.max_context_chars {
                if lines.is_empty() {
                    lines.push(line.chars().take(self.max_context_chars).collect());
                }
                break;
            }
            used += separator + len;
            lines.push(line);
        }

        lines.join("\n")
    }

    /// Context-only prompt
    pub fn grounded(&self, question: &str, context: &str) -> Vec<Message> {
        vec![
            Message::system(self.system_prompt.clone()),
            Message::user(format!("Konteks:\n{}\n\nPertanyaan: {}", context, question)),
        ]
    }

    /// Context plus computed facts the model must reproduce verbatim
    pub fn guarded(&self, question: &str, context: &str, facts: &[String]) -> Vec<Message> {
        if facts.is_empty() {
            return self.grounded(question, context);
        }

        let fact_lines = facts
            .iter()
            .map(|f| format!("- {}", f))
            .collect::<Vec<_>>()
            .join("\n");

        vec![
            Message::system(format!("{} {}", self.system_prompt, FACT_GUARD)),
            Message::user(format!(
                "Konteks:\n{}\n\nFakta terhitung:\n{}\n\nPertanyaan: {}",
                context, fact_lines, question
            )),
        ]
    }
}
