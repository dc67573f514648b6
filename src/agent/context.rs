//! Session state threaded through the planning loop.

use std::fmt;

use serde::Serialize;

use super::policy::CompletionPolicy;
use crate::actions::{ActionDescriptor, ActionOutcome, ActionType};

/// Characters of retrieved text shown to the planner.
pub const PROMPT_TEXT_TAIL_CHARS: usize = 1000;

/// Characters of retrieved text handed to answer synthesis.
pub const SYNTHESIS_TEXT_CHARS: usize = 2000;

/// History entries shown to the planner.
pub const PROMPT_HISTORY_ENTRIES: usize = 3;

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// The model emitted `goal_achieved`.
    GoalAchieved,
    /// The same action type came up too many times in a row.
    RepeatedAction { action_type: String },
    /// Page text was captured for an information goal.
    InformationRetrieved,
    /// A screenshot was taken for a screenshot goal.
    ScreenshotTaken,
    /// The iteration budget ran out.
    MaxIterations,
    /// The caller cancelled the session.
    Cancelled,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GoalAchieved => f.write_str("goal achieved"),
            Self::RepeatedAction { action_type } => {
                write!(f, "repeated action '{action_type}'")
            }
            Self::InformationRetrieved => f.write_str("information retrieved"),
            Self::ScreenshotTaken => f.write_str("screenshot taken"),
            Self::MaxIterations => f.write_str("max iterations reached"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Result of checking an action against the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatCheck {
    /// A different type than the previous action.
    Fresh,
    /// Same type as before; the count so far.
    Repeated(u32),
    /// The repeat limit was reached.
    LoopDetected,
}

/// One executed action and what came of it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub action_taken: ActionDescriptor,
    pub outcome: ActionOutcome,
}

/// Mutable state of one session.
#[derive(Debug, Clone, Serialize)]
pub struct InteractionContext {
    pub user_goal: String,
    history: Vec<HistoryEntry>,
    pub current_page_url: Option<String>,
    pub last_error: Option<String>,
    pub last_retrieved_text: Option<String>,
    pub final_answer: Option<String>,
    pub goal_summary: Option<String>,
    pub info_retrieved: bool,
    pub screenshot_taken: bool,
    pub task_completed: bool,
    pub last_action_type: Option<String>,
    pub repeat_counter: u32,
}

impl InteractionContext {
    pub fn new(user_goal: impl Into<String>) -> Self {
        Self {
            user_goal: user_goal.into(),
            history: Vec::new(),
            current_page_url: None,
            last_error: None,
            last_retrieved_text: None,
            final_answer: None,
            goal_summary: None,
            info_retrieved: false,
            screenshot_taken: false,
            task_completed: false,
            last_action_type: None,
            repeat_counter: 0,
        }
    }

    /// Executed actions, oldest first.
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Track consecutive actions of the same type.
    ///
    /// Reaching `limit` marks the task completed with a forced summary.
    pub fn register_action(&mut self, action_type: &str, limit: u32) -> RepeatCheck {
        if self.last_action_type.as_deref() == Some(action_type) {
            self.repeat_counter += 1;
            if self.repeat_counter >= limit {
                self.task_completed = true;
                self.goal_summary = Some(format!(
                    "Task completion forced due to repeated actions. Last successful action was {action_type}."
                ));
                return RepeatCheck::LoopDetected;
            }
            RepeatCheck::Repeated(self.repeat_counter)
        } else {
            self.last_action_type = Some(action_type.to_string());
            self.repeat_counter = 1;
            RepeatCheck::Fresh
        }
    }

    /// Record the user's answer to a `clarify` action.
    pub fn record_clarification(&mut self, descriptor: ActionDescriptor, answer: &str) {
        self.history.push(HistoryEntry {
            action_taken: descriptor,
            outcome: ActionOutcome::success().with_message(format!("User: {answer}")),
        });
        self.last_retrieved_text = Some(format!("User clarification: {answer}"));
        self.info_retrieved = false;
    }

    /// Record an explicit `goal_achieved`.
    ///
    /// A placeholder summary clears the info flag; any other non-empty
    /// summary sets it.
    pub fn mark_goal_achieved(&mut self, summary: Option<String>, policy: &CompletionPolicy) {
        let summary = summary.filter(|s| !s.trim().is_empty());
        self.task_completed = true;
        if let Some(summary) = &summary {
            if policy.is_placeholder(summary) {
                tracing::warn!("Goal achieved with placeholder summary: {}", summary);
                self.info_retrieved = false;
            } else {
                self.info_retrieved = true;
            }
        }
        self.goal_summary = summary;
    }

    /// Append an executed action and update the flags from its outcome.
    ///
    /// # Returns
    /// The reason to stop when the outcome completes the goal on its own.
    pub fn record_outcome(
        &mut self,
        descriptor: ActionDescriptor,
        outcome: ActionOutcome,
        policy: &CompletionPolicy,
    ) -> Option<TerminationReason> {
        let mut completion = None;

        if outcome.is_success() {
            self.last_error = None;
            match descriptor.kind() {
                Some(ActionType::Navigate) => {
                    self.current_page_url = outcome
                        .url
                        .clone()
                        .or_else(|| descriptor.param_str("url").map(String::from));
                    self.last_retrieved_text = None;
                    self.info_retrieved = false;
                }
                Some(ActionType::GetPageTextContent) => {
                    match outcome.text_content().filter(|text| !text.is_empty()) {
                        Some(text) => {
                            self.last_retrieved_text = Some(text.to_string());
                            self.info_retrieved = true;
                            if policy.is_information_goal(&self.user_goal) {
                                self.task_completed = true;
                                self.goal_summary = Some(format!(
                                    "Successfully retrieved information: {}...",
                                    head_chars(text, 200)
                                ));
                                completion = Some(TerminationReason::InformationRetrieved);
                            }
                        }
                        None => {
                            tracing::warn!("Page text was empty, information not retrieved");
                            self.info_retrieved = false;
                        }
                    }
                }
                Some(ActionType::TakeScreenshot) => {
                    self.screenshot_taken = true;
                    if policy.is_screenshot_goal(&self.user_goal) {
                        let path = outcome
                            .filepath
                            .clone()
                            .unwrap_or_else(|| "screenshot completed".to_string());
                        self.task_completed = true;
                        self.goal_summary = Some(format!("Successfully took screenshot: {path}"));
                        self.info_retrieved = true;
                        completion = Some(TerminationReason::ScreenshotTaken);
                    }
                }
                _ => {}
            }
        } else {
            self.last_error = Some(
                outcome
                    .message
                    .clone()
                    .unwrap_or_else(|| "Unknown error".to_string()),
            );
            self.info_retrieved = false;
        }

        self.history.push(HistoryEntry {
            action_taken: descriptor,
            outcome,
        });
        completion
    }

    /// Prompt asking the planner for the next actions.
    pub fn planning_prompt(&self, iteration: u32, max_iterations: u32) -> String {
        let mut prompt = format!("User Goal: {}\n", self.user_goal);
        if iteration <= 1 {
            prompt.push_str("This is the first iteration. Browser is ready. What is the first action?");
            return prompt;
        }

        let recent = self
            .history
            .iter()
            .rev()
            .take(PROMPT_HISTORY_ENTRIES)
            .rev()
            .map(|entry| {
                let mut line = format!(
                    "Action: {} -> Result: {}",
                    entry.action_taken.action_type, entry.outcome.status
                );
                if let Some(message) = &entry.outcome.message {
                    line.push_str(&format!(" ({message})"));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n");

        let page_content = match &self.last_retrieved_text {
            Some(text) => format!(
                "Last successfully retrieved page content (last {} chars):\n{}...",
                PROMPT_TEXT_TAIL_CHARS,
                tail_chars(text, PROMPT_TEXT_TAIL_CHARS)
            ),
            None => "No page content successfully retrieved yet.".to_string(),
        };

        prompt.push_str(&format!(
            "Current page: {}\n\
             Iteration: {}/{}\n\
             Last error: {}\n\
             Information retrieved successfully so far: {}\n\
             Screenshot taken: {}\n\
             Last action: {}\n\
             Action repeat count: {}\n\
             Recent actions:\n{}\n\
             {}\n\
             What should be the next action(s)? If the information that answers the goal was retrieved, \
             use 'goal_achieved' with 'summary_of_findings' containing the ACTUAL information. \
             If a retrieval step failed, do not use 'goal_achieved' with a placeholder.\n\
             If you just took the screenshot the user asked for, or retrieved the requested information, \
             use 'goal_achieved' IMMEDIATELY.\n\
             Return ONLY a JSON array. Use \"take_screenshot\" sparingly.",
            self.current_page_url.as_deref().unwrap_or("Unknown"),
            iteration,
            max_iterations,
            self.last_error.as_deref().unwrap_or("None"),
            self.info_retrieved,
            self.screenshot_taken,
            self.last_action_type.as_deref().unwrap_or("None"),
            self.repeat_counter,
            recent,
            page_content,
        ));
        prompt
    }

    /// Prompt for the final answer, or `None` when no answer is synthesized.
    pub fn synthesis_prompt(
        &self,
        reason: &TerminationReason,
        max_iterations: u32,
    ) -> Option<String> {
        let mut prompt = format!("User's original goal: '{}'\n", self.user_goal);
        let summary = self.goal_summary.as_deref().filter(|s| !s.is_empty());
        let retrieved = self.last_retrieved_text.as_deref();

        match reason {
            TerminationReason::Cancelled => return None,
            TerminationReason::GoalAchieved => {
                match (self.info_retrieved, summary, retrieved) {
                    (true, Some(summary), _) => prompt.push_str(&format!(
                        "The agent performing the web task reported: '{summary}'\n"
                    )),
                    (true, None, Some(text)) => prompt.push_str(&format!(
                        "The following information was gathered from the last page:\n---\n{}\n---\n",
                        head_chars(text, SYNTHESIS_TEXT_CHARS)
                    )),
                    _ => prompt.push_str(
                        "The necessary information could not be successfully retrieved from the webpage.\n",
                    ),
                }
                prompt.push_str(
                    "Based on this, what is the direct answer to the user's goal? \
                     If the goal was an action, confirm its completion. If info was not found, state that.",
                );
            }
            TerminationReason::MaxIterations => {
                prompt.push_str(&format!("Task ended after {max_iterations} iterations.\n"));
                match (self.info_retrieved, retrieved) {
                    (true, Some(text)) => prompt.push_str(&format!(
                        "Information from last page:\n{}\n\n",
                        head_chars(text, SYNTHESIS_TEXT_CHARS)
                    )),
                    _ => prompt.push_str(
                        "The necessary information could not be successfully retrieved within the allowed iterations.\n",
                    ),
                }
                prompt.push_str(
                    "Answer the goal based on available info, or state what was done and that \
                     max iterations were reached and info might be missing.",
                );
            }
            TerminationReason::RepeatedAction { .. }
            | TerminationReason::InformationRetrieved
            | TerminationReason::ScreenshotTaken => {
                if let Some(summary) = summary {
                    prompt.push_str(&format!("Task completed: {summary}\n"));
                } else if self.screenshot_taken {
                    prompt.push_str("Screenshot was taken successfully.\n");
                } else if self.info_retrieved {
                    prompt.push_str(&format!(
                        "Information was retrieved: {}\n",
                        retrieved
                            .map(|text| head_chars(text, 500))
                            .unwrap_or("Content available")
                    ));
                }
                prompt.push_str("What is the direct answer to the user's goal?");
            }
        }
        Some(prompt)
    }
}

/// The first `n` characters of `text`.
pub(crate) fn head_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// The last `n` characters of `text`.
pub(crate) fn tail_chars(text: &str, n: usize) -> &str {
    let count = text.chars().count();
    if count <= n {
        return text;
    }
    match text.char_indices().nth(count - n) {
        Some((index, _)) => &text[index..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor(action_type: &str, parameters: serde_json::Value) -> ActionDescriptor {
        ActionDescriptor::new(action_type, parameters)
    }

    #[test]
    fn test_char_helpers_respect_boundaries() {
        assert_eq!(head_chars("héllo", 2), "hé");
        assert_eq!(head_chars("hi", 10), "hi");
        assert_eq!(tail_chars("héllo", 4), "éllo");
        assert_eq!(tail_chars("hi", 10), "hi");
    }

    #[test]
    fn test_repeat_detection() {
        let mut ctx = InteractionContext::new("goal");
        assert_eq!(ctx.register_action("scroll_page", 3), RepeatCheck::Fresh);
        assert_eq!(ctx.register_action("scroll_page", 3), RepeatCheck::Repeated(2));
        assert_eq!(ctx.register_action("scroll_page", 3), RepeatCheck::LoopDetected);
        assert!(ctx.task_completed);
        assert_eq!(
            ctx.goal_summary.as_deref(),
            Some("Task completion forced due to repeated actions. Last successful action was scroll_page.")
        );
    }

    #[test]
    fn test_different_action_resets_counter() {
        let mut ctx = InteractionContext::new("goal");
        ctx.register_action("scroll_page", 3);
        ctx.register_action("scroll_page", 3);
        assert_eq!(ctx.register_action("click_element", 3), RepeatCheck::Fresh);
        assert_eq!(ctx.repeat_counter, 1);
        assert_eq!(ctx.last_action_type.as_deref(), Some("click_element"));
        assert!(!ctx.task_completed);
    }

    #[test]
    fn test_navigate_success_resets_retrieved_text() {
        let policy = CompletionPolicy::default();
        let mut ctx = InteractionContext::new("open example");
        ctx.last_retrieved_text = Some("old".to_string());
        ctx.info_retrieved = true;
        ctx.last_error = Some("previous".to_string());

        let done = ctx.record_outcome(
            descriptor("navigate", json!({"url": "https://example.com"})),
            ActionOutcome::success(),
            &policy,
        );

        assert_eq!(done, None);
        assert_eq!(ctx.current_page_url.as_deref(), Some("https://example.com"));
        assert_eq!(ctx.last_retrieved_text, None);
        assert!(!ctx.info_retrieved);
        assert_eq!(ctx.last_error, None);
        assert_eq!(ctx.history().len(), 1);
    }

    #[test]
    fn test_text_capture_completes_information_goal() {
        let policy = CompletionPolicy::default();
        let mut ctx = InteractionContext::new("What is on example.com?");

        let done = ctx.record_outcome(
            descriptor("get_page_text_content", json!({})),
            ActionOutcome::success().with_result("text_content", "Example Domain"),
            &policy,
        );

        assert_eq!(done, Some(TerminationReason::InformationRetrieved));
        assert!(ctx.info_retrieved);
        assert!(ctx.task_completed);
        assert_eq!(
            ctx.goal_summary.as_deref(),
            Some("Successfully retrieved information: Example Domain...")
        );
    }

    #[test]
    fn test_text_capture_without_info_goal_continues() {
        let policy = CompletionPolicy::default();
        let mut ctx = InteractionContext::new("Log into the portal");

        let done = ctx.record_outcome(
            descriptor("get_page_text_content", json!({})),
            ActionOutcome::success().with_result("text_content", "Welcome"),
            &policy,
        );

        assert_eq!(done, None);
        assert!(ctx.info_retrieved);
        assert!(!ctx.task_completed);
    }

    #[test]
    fn test_screenshot_completes_screenshot_goal() {
        let policy = CompletionPolicy::default();
        let mut ctx = InteractionContext::new("Take a screenshot of example.com");

        let done = ctx.record_outcome(
            descriptor("take_screenshot", json!({})),
            ActionOutcome::success().with_filepath("screenshots/a.png"),
            &policy,
        );

        assert_eq!(done, Some(TerminationReason::ScreenshotTaken));
        assert!(ctx.screenshot_taken);
        assert!(ctx.info_retrieved);
        assert_eq!(
            ctx.goal_summary.as_deref(),
            Some("Successfully took screenshot: screenshots/a.png")
        );
    }

    #[test]
    fn test_failure_sets_last_error() {
        let policy = CompletionPolicy::default();
        let mut ctx = InteractionContext::new("goal");
        ctx.info_retrieved = true;

        ctx.record_outcome(
            descriptor("click_element", json!({"selector": "#x"})),
            ActionOutcome::failure("Timeout waiting for element '#x' to be visible"),
            &policy,
        );

        assert_eq!(
            ctx.last_error.as_deref(),
            Some("Timeout waiting for element '#x' to be visible")
        );
        assert!(!ctx.info_retrieved);
    }

    #[test]
    fn test_goal_achieved_placeholder_clears_info() {
        let policy = CompletionPolicy::default();
        let mut ctx = InteractionContext::new("weather?");
        ctx.info_retrieved = true;

        ctx.mark_goal_achieved(Some("It is [weather_information]".to_string()), &policy);
        assert!(!ctx.info_retrieved);
        assert!(ctx.task_completed);

        ctx.mark_goal_achieved(Some("It is 21°C".to_string()), &policy);
        assert!(ctx.info_retrieved);
    }

    #[test]
    fn test_goal_achieved_without_summary_keeps_flag() {
        let policy = CompletionPolicy::default();
        let mut ctx = InteractionContext::new("log in");
        ctx.mark_goal_achieved(Some("  ".to_string()), &policy);
        assert!(!ctx.info_retrieved);
        assert_eq!(ctx.goal_summary, None);
    }

    #[test]
    fn test_clarification_is_recorded() {
        let mut ctx = InteractionContext::new("book a table");
        ctx.info_retrieved = true;
        ctx.record_clarification(descriptor("clarify", json!({"question": "Where?"})), "Paris");

        assert_eq!(ctx.history()[0].outcome.message.as_deref(), Some("User: Paris"));
        assert_eq!(ctx.last_retrieved_text.as_deref(), Some("User clarification: Paris"));
        assert!(!ctx.info_retrieved);
    }

    #[test]
    fn test_first_planning_prompt() {
        let ctx = InteractionContext::new("find the news");
        assert_eq!(
            ctx.planning_prompt(1, 25),
            "User Goal: find the news\nThis is the first iteration. Browser is ready. What is the first action?"
        );
    }

    #[test]
    fn test_later_planning_prompt() {
        let policy = CompletionPolicy::default();
        let mut ctx = InteractionContext::new("log in");
        for i in 0..4 {
            ctx.record_outcome(
                descriptor("click_element", json!({"selector": format!("#b{i}")})),
                ActionOutcome::failure(format!("fail {i}")),
                &policy,
            );
        }
        ctx.last_retrieved_text = Some(format!("{}END", "x".repeat(2000)));

        let prompt = ctx.planning_prompt(3, 25);

        assert!(prompt.contains("Iteration: 3/25"));
        assert!(prompt.contains("Last error: fail 3"));
        assert!(!prompt.contains("(fail 0)"));
        assert!(prompt.contains("Action: click_element -> Result: error (fail 1)"));
        assert!(prompt.contains("Action: click_element -> Result: error (fail 3)"));
        assert!(prompt.contains("END..."));
        assert!(!prompt.contains(&"x".repeat(1000)));
    }

    #[test]
    fn test_synthesis_prompts() {
        let mut ctx = InteractionContext::new("weather in Paris");
        ctx.info_retrieved = true;
        ctx.goal_summary = Some("21°C and sunny".to_string());

        let prompt = ctx
            .synthesis_prompt(&TerminationReason::GoalAchieved, 25)
            .unwrap();
        assert!(prompt.contains("'21°C and sunny'"));

        ctx.info_retrieved = false;
        let prompt = ctx
            .synthesis_prompt(&TerminationReason::MaxIterations, 25)
            .unwrap();
        assert!(prompt.contains("Task ended after 25 iterations."));
        assert!(prompt.contains("could not be successfully retrieved within the allowed iterations"));

        assert_eq!(ctx.synthesis_prompt(&TerminationReason::Cancelled, 25), None);
    }
}
