//! Model gateway: ordered fallback across model candidates.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::client::{ChatBackend, ChatRequest, FailureKind, DEFAULT_MAX_TOKENS};
use super::rate_limit::RateLimiter;
use crate::actions::strip_code_fences;

/// A model the gateway may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCandidate {
    pub name: String,
    pub rate_limit_per_minute: u32,
    /// Route calls through the shared [`RateLimiter`].
    pub uses_backoff: bool,
    /// Lower is tried first.
    pub priority: u32,
    pub description: String,
}

impl ModelCandidate {
    pub fn new(name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            rate_limit_per_minute: 20,
            uses_backoff: false,
            priority,
            description: String::new(),
        }
    }

    pub fn with_rate_limit(mut self, per_minute: u32) -> Self {
        self.rate_limit_per_minute = per_minute;
        self
    }

    pub fn with_backoff(mut self, uses_backoff: bool) -> Self {
        self.uses_backoff = uses_backoff;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// The free-tier models used when none are configured.
pub fn default_candidates() -> Vec<ModelCandidate> {
    vec![
        ModelCandidate::new("google/gemini-2.0-flash-exp:free", 1)
            .with_rate_limit(4)
            .with_backoff(true)
            .with_description("Primary model, strictly rate limited"),
        ModelCandidate::new("mistralai/mistral-7b-instruct:free", 2)
            .with_description("Fast fallback"),
        ModelCandidate::new("meta-llama/llama-3.2-3b-instruct:free", 3)
            .with_description("Small fallback"),
        ModelCandidate::new("deepseek/deepseek-r1-0528-qwen3-8b:free", 4)
            .with_description("Reasoning fallback"),
    ]
}

/// Candidates from a list of model names; the first one is rate limited.
pub fn candidates_from_names<S: AsRef<str>>(names: &[S]) -> Vec<ModelCandidate> {
    names
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let candidate = ModelCandidate::new(name.as_ref(), index as u32 + 1);
            if index == 0 {
                candidate.with_rate_limit(4).with_backoff(true)
            } else {
                candidate
            }
        })
        .collect()
}

/// What a completion is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// A JSON action plan; code fences are stripped.
    ActionPlan,
    /// The final natural-language answer; only trimmed.
    FinalAnswer,
}

impl CompletionMode {
    pub fn temperature(self) -> f32 {
        match self {
            Self::ActionPlan => 0.1,
            Self::FinalAnswer => 0.2,
        }
    }

    fn postprocess(self, raw: &str) -> String {
        match self {
            Self::ActionPlan => strip_code_fences(raw),
            Self::FinalAnswer => raw.trim().to_string(),
        }
    }
}

/// Calls the completion backend across candidates in priority order.
pub struct ModelGateway {
    backend: Arc<dyn ChatBackend>,
    candidates: Vec<ModelCandidate>,
    limiter: Arc<RateLimiter>,
    max_tokens: u32,
}

impl ModelGateway {
    /// Create a gateway. Candidates are sorted by priority.
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        mut candidates: Vec<ModelCandidate>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        candidates.sort_by_key(|candidate| candidate.priority);
        Self {
            backend,
            candidates,
            limiter,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn candidates(&self) -> &[ModelCandidate] {
        &self.candidates
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Ask each candidate in turn until one returns non-empty text.
    ///
    /// # Arguments
    /// * `system_prompt` - Instructions for the model.
    /// * `user_prompt` - The task-specific prompt.
    /// * `mode` - Whether an action plan or a final answer is wanted.
    ///
    /// # Returns
    /// The post-processed text, or `None` when every candidate failed.
    pub async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        mode: CompletionMode,
    ) -> Option<String> {
        for candidate in &self.candidates {
            if candidate.uses_backoff {
                self.limiter.acquire().await;
            }

            tracing::info!(
                model = %candidate.name,
                priority = candidate.priority,
                "Requesting {:?} completion",
                mode
            );
            let request = ChatRequest::new(
                &candidate.name,
                system_prompt,
                user_prompt,
                mode.temperature(),
                self.max_tokens,
            );

            match self.backend.chat(&request).await {
                Ok(content) => {
                    if candidate.uses_backoff {
                        self.limiter.record_call().await;
                    }
                    let cleaned = mode.postprocess(&content);
                    if !cleaned.is_empty() {
                        tracing::info!(model = %candidate.name, "Completion received");
                        return Some(cleaned);
                    }
                    tracing::warn!(model = %candidate.name, "Empty completion, trying next model");
                }
                Err(e) => match e.failure_kind() {
                    FailureKind::RateLimited => {
                        tracing::warn!(model = %candidate.name, "Rate limited, trying next model: {}", e)
                    }
                    FailureKind::Unauthorized => {
                        tracing::error!(model = %candidate.name, "Unauthorized, check the API key: {}", e)
                    }
                    FailureKind::QuotaExhausted => {
                        tracing::error!(model = %candidate.name, "Quota exhausted, trying next model: {}", e)
                    }
                    FailureKind::Other => {
                        tracing::warn!(model = %candidate.name, "Request failed, trying next model: {}", e)
                    }
                },
            }
        }

        tracing::error!("All {} model candidates failed", self.candidates.len());
        None
    }
}
