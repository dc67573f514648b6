//! Session results and the printed summary box.

use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::context::{head_chars, InteractionContext};
use crate::actions::OutcomeStatus;

const BOX_WIDTH: usize = 63;
const ANSWER_LINE_CHARS: usize = 60;
const RECENT_ACTIONS: usize = 3;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Success,
    PartialFailure,
    MaxIterationsReached,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialFailure => "partial_failure",
            Self::MaxIterationsReached => "max_iterations_reached",
            Self::Cancelled => "cancelled",
        }
    }

    /// Heading used when printing the report.
    pub fn title(self) -> &'static str {
        match self {
            Self::Success => "✅ Task completed",
            Self::PartialFailure => "⚠️ Task finished with missing information",
            Self::MaxIterationsReached => "⏱️ Iteration limit reached",
            Self::Cancelled => "🛑 Session cancelled",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a caller learns about a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub status: SessionStatus,
    pub message: String,
    pub iterations_used: u32,
    pub actions_completed: usize,
    pub final_answer: Option<String>,
    /// Rendered summary box.
    pub summary: String,
}

impl SessionReport {
    pub fn is_success(&self) -> bool {
        self.status == SessionStatus::Success
    }
}

/// Whether the answer reads like the goal was met.
fn looks_successful(ctx: &InteractionContext, answer: &str) -> bool {
    let lower = answer.to_lowercase();
    if ctx.last_error.is_some()
        || answer.contains("could not synthesize")
        || answer.contains("Max iterations reached")
    {
        return false;
    }
    let positive = ctx.info_retrieved
        || answer.contains("Goal marked as achieved")
        || lower.contains("confirm its completion")
        || lower.contains("task completed");
    let negative = lower.contains("could not be retrieved")
        || lower.contains("unable to find")
        || answer.contains("[some_information]")
        || answer.contains("[weather_information]");
    positive && !negative
}

fn border(left: char, right: char) -> String {
    format!("{left}{}{right}", "═".repeat(BOX_WIDTH))
}

fn row(content: &str) -> String {
    let width = content.chars().count();
    let padding = BOX_WIDTH.saturating_sub(width + 1);
    format!("║ {content}{}║", " ".repeat(padding))
}

fn centered(content: &str) -> String {
    let width = content.chars().count();
    let left = BOX_WIDTH.saturating_sub(width) / 2;
    let right = BOX_WIDTH.saturating_sub(width + left);
    format!("║{}{content}{}║", " ".repeat(left), " ".repeat(right))
}

/// Render the framed session summary.
///
/// # Arguments
/// * `ctx` - Final session state.
/// * `iterations_used` - Iterations the loop ran.
/// * `max_iterations` - The configured budget.
/// * `now` - Completion timestamp.
pub fn render_summary(
    ctx: &InteractionContext,
    iterations_used: u32,
    max_iterations: u32,
    now: DateTime<Local>,
) -> String {
    let answer = ctx.final_answer.as_deref().unwrap_or("Not synthesized.");
    let status = if looks_successful(ctx, answer) {
        "✅ SUCCESS"
    } else {
        "⚠️ PARTIAL/CHECK"
    };
    let history = ctx.history();

    let mut lines = vec![
        border('╔', '╗'),
        centered("🎯 WEB AGENT RESULT"),
        border('╠', '╣'),
        row(&format!("📅 Completed: {}", now.format("%Y-%m-%d %H:%M:%S"))),
        row(&format!("🎯 Goal: {}", head_chars(&ctx.user_goal, 45))),
        row(&format!("🔄 Iterations: {iterations_used:<8} Max: {max_iterations}")),
        row(&format!("⚡ Actions: {}", history.len())),
        row(&format!(
            "🌐 Final URL: {}",
            head_chars(ctx.current_page_url.as_deref().unwrap_or("N/A"), 43)
        )),
        row(&format!("📊 Status: {status}")),
        border('╠', '╣'),
        row("💬 FINAL ANSWER TO GOAL:"),
    ];

    let chars: Vec<char> = answer.chars().collect();
    for (index, chunk) in chars.chunks(ANSWER_LINE_CHARS).enumerate() {
        let text: String = chunk.iter().collect();
        let prefix = if index == 0 { ">> " } else { "   " };
        lines.push(row(&format!("{prefix}{text}")));
    }
    if chars.is_empty() {
        lines.push(row(">> "));
    }

    lines.push(border('╠', '╣'));
    lines.push(centered("📋 RECENT ACTIONS"));
    let skipped = history.len().saturating_sub(RECENT_ACTIONS);
    for (index, entry) in history[skipped..].iter().enumerate() {
        let icon = match entry.outcome.status {
            OutcomeStatus::Success => "✅",
            OutcomeStatus::Error => "❌",
        };
        lines.push(row(&format!(
            "{}. {icon} {:<25} {:<12}",
            index + 1,
            entry.action_taken.action_type,
            entry.outcome.status.to_string()
        )));
    }
    if skipped > 0 {
        lines.push(row(&format!("   ... and {skipped} more actions earlier")));
    }
    lines.push(border('╚', '╝'));

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionDescriptor, ActionOutcome};
    use crate::agent::policy::CompletionPolicy;
    use serde_json::json;

    fn finished_context() -> InteractionContext {
        let policy = CompletionPolicy::default();
        let mut ctx = InteractionContext::new("Open example.com and log in");
        ctx.record_outcome(
            ActionDescriptor::new("navigate", json!({"url": "https://example.com"})),
            ActionOutcome::success().with_url("https://example.com/"),
            &policy,
        );
        for i in 0..3 {
            ctx.record_outcome(
                ActionDescriptor::new("click_element", json!({"selector": format!("#b{i}")})),
                ActionOutcome::success(),
                &policy,
            );
        }
        ctx
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_value(SessionStatus::MaxIterationsReached).unwrap(),
            json!("max_iterations_reached")
        );
        assert_eq!(SessionStatus::PartialFailure.to_string(), "partial_failure");
    }

    #[test]
    fn test_summary_lists_recent_actions() {
        let mut ctx = finished_context();
        ctx.final_answer = Some("Task completed: logged in".to_string());

        let summary = render_summary(&ctx, 4, 25, Local::now());

        assert!(summary.contains("🔄 Iterations: 4        Max: 25"));
        assert!(summary.contains("⚡ Actions: 4"));
        assert!(summary.contains("🌐 Final URL: https://example.com/"));
        assert!(summary.contains("✅ SUCCESS"));
        assert!(summary.contains("... and 1 more actions earlier"));
        assert_eq!(summary.matches("click_element").count(), 3);
        assert!(!summary.contains("navigate "));
    }

    #[test]
    fn test_summary_flags_missing_information() {
        let mut ctx = finished_context();
        ctx.final_answer = Some("The temperature could not be retrieved.".to_string());

        let summary = render_summary(&ctx, 2, 25, Local::now());
        assert!(summary.contains("⚠️ PARTIAL/CHECK"));
    }

    #[test]
    fn test_long_answer_wraps() {
        let mut ctx = InteractionContext::new("goal");
        ctx.final_answer = Some("a".repeat(130));

        let summary = render_summary(&ctx, 1, 25, Local::now());
        let answer_lines = summary.lines().filter(|l| l.contains("aaaa")).count();
        assert_eq!(answer_lines, 3);
        assert!(!summary.contains("Not synthesized."));
    }
}
