//! Agent module: the planning loop and the session state it keeps.

mod context;
mod insights;
mod policy;
mod report;
mod web_agent;

pub use context::{HistoryEntry, InteractionContext, RepeatCheck, TerminationReason};
pub use insights::{extract_insight, PageInsight};
pub use policy::{CompletionPolicy, DEFAULT_INFO_KEYWORDS, DEFAULT_REPEAT_LIMIT};
pub use report::{render_summary, SessionReport, SessionStatus};
pub use web_agent::{
    stdin_clarification, AgentConfig, ClarificationCallback, WebAgent, DEFAULT_MAX_ITERATIONS,
};
