//! Model access: HTTP transport, rate limiting and candidate fallback.

mod client;
mod gateway;
mod rate_limit;

pub use client::{
    ChatBackend, ChatRequest, FailureKind, MessageBuilder, ModelClient, ModelConfig, ModelError,
    DEFAULT_BASE_URL, DEFAULT_MAX_RETRIES, DEFAULT_MAX_TOKENS, DEFAULT_RETRY_DELAY_SECS,
};
pub use gateway::{
    candidates_from_names, default_candidates, CompletionMode, ModelCandidate, ModelGateway,
};
pub use rate_limit::{RateLimiter, DEFAULT_MAX_CALLS, DEFAULT_MIN_WAIT, DEFAULT_WINDOW};
