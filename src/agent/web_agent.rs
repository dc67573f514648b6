//! The planning loop that drives a browser toward a user goal.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::context::{InteractionContext, RepeatCheck, TerminationReason};
use super::insights::extract_insight;
use super::policy::CompletionPolicy;
use super::report::{render_summary, SessionReport, SessionStatus};
use crate::actions::{
    validate_plan, ActionDescriptor, ActionHandler, ActionOutcome, ActionType,
    DEFAULT_CLARIFY_QUESTION, DEFAULT_MAX_WAIT,
};
use crate::browser::{BrowserDriver, ChromeDriver, ChromeOptions, DriverError};
use crate::config::{get_system_prompt, SYSTEM_PROMPT_FINAL_ANSWER};
use crate::model::{CompletionMode, ModelGateway};

/// Default iteration budget for one session.
pub const DEFAULT_MAX_ITERATIONS: u32 = 25;

/// Asks the human a question; `None` means no answer.
pub type ClarificationCallback = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Read the answer to a clarification question from stdin.
pub fn stdin_clarification() -> ClarificationCallback {
    Arc::new(|question: &str| {
        print!("\n❓ {question}\n> ");
        io::stdout().flush().ok()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer).ok()?;
        Some(answer.trim().to_string())
    })
}

/// Configuration for the [`WebAgent`].
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum number of planning iterations.
    pub max_iterations: u32,
    /// Custom planning prompt (if None, uses the dated default).
    pub system_prompt: Option<String>,
    /// Whether to print progress to stdout.
    pub verbose: bool,
    /// Upper bound for `wait_for_element` timeouts.
    pub max_wait: Duration,
    /// Pause after a failed plan request or an invalid plan.
    pub planning_retry_delay: Duration,
    /// Pause after each executed action.
    pub action_delay: Duration,
    /// Pause between iterations.
    pub iteration_delay: Duration,
    /// Auto-completion and loop-breaking rules.
    pub policy: CompletionPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            system_prompt: None,
            verbose: true,
            max_wait: DEFAULT_MAX_WAIT,
            planning_retry_delay: Duration::from_secs(2),
            action_delay: Duration::from_millis(500),
            iteration_delay: Duration::from_secs(1),
            policy: CompletionPolicy::default(),
        }
    }
}

impl AgentConfig {
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Set the planning-retry, per-action and per-iteration pauses.
    pub fn with_delays(
        mut self,
        planning_retry: Duration,
        action: Duration,
        iteration: Duration,
    ) -> Self {
        self.planning_retry_delay = planning_retry;
        self.action_delay = action;
        self.iteration_delay = iteration;
        self
    }

    pub fn with_policy(mut self, policy: CompletionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Disable progress output.
    pub fn quiet(mut self) -> Self {
        self.verbose = false;
        self
    }

    /// Get the planning system prompt (custom or dated default).
    pub fn get_system_prompt(&self) -> String {
        self.system_prompt.clone().unwrap_or_else(get_system_prompt)
    }
}

enum LoopState {
    Planning,
    Validating(String),
    Executing(VecDeque<ActionDescriptor>),
    Evaluating {
        descriptor: ActionDescriptor,
        outcome: ActionOutcome,
        remaining: VecDeque<ActionDescriptor>,
    },
    Terminated(TerminationReason),
}

/// Drives a browser toward a natural-language goal.
///
/// Each iteration asks the model gateway for a short action plan, validates
/// it and executes it, until the goal is reached, the session stalls on a
/// repeated action, the iteration budget runs out, or the caller cancels.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use web_agent::{
///     default_candidates, AgentConfig, ChromeOptions, ModelClient, ModelConfig, ModelGateway,
///     RateLimiter, WebAgent,
/// };
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = ModelClient::new(ModelConfig::default().with_api_key("sk-or-..."))?;
///     let gateway = ModelGateway::new(
///         Arc::new(client),
///         default_candidates(),
///         Arc::new(RateLimiter::default()),
///     );
///     let agent = WebAgent::new(Arc::new(gateway), AgentConfig::default());
///
///     let report = agent
///         .run_in_chrome(ChromeOptions::default(), "What is on example.com?", Default::default())
///         .await?;
///     println!("{}: {:?}", report.status, report.final_answer);
///     Ok(())
/// }
/// ```
pub struct WebAgent {
    gateway: Arc<ModelGateway>,
    config: AgentConfig,
    clarification: ClarificationCallback,
}

impl WebAgent {
    /// Create an agent that asks clarification questions on stdin.
    pub fn new(gateway: Arc<ModelGateway>, config: AgentConfig) -> Self {
        Self {
            gateway,
            config,
            clarification: stdin_clarification(),
        }
    }

    /// Replace the clarification collaborator.
    pub fn with_clarification(mut self, callback: ClarificationCallback) -> Self {
        self.clarification = callback;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Launch Chrome, run one session, then close the browser.
    ///
    /// # Returns
    /// The session report, or the launch error.
    pub async fn run_in_chrome(
        &self,
        options: ChromeOptions,
        goal: &str,
        cancel: CancellationToken,
    ) -> Result<SessionReport, DriverError> {
        let driver = ChromeDriver::launch(options).await?;
        let report = self.run_until_cancelled(&driver, goal, cancel).await;
        driver.close().await;
        Ok(report)
    }

    /// Run a session against an already open browser.
    pub async fn run(&self, driver: &dyn BrowserDriver, goal: &str) -> SessionReport {
        self.run_until_cancelled(driver, goal, CancellationToken::new())
            .await
    }

    /// Run a session that stops early once `cancel` fires.
    ///
    /// Cancellation is observed between iterations, during pauses and while
    /// waiting for a clarification answer.
    pub async fn run_until_cancelled(
        &self,
        driver: &dyn BrowserDriver,
        goal: &str,
        cancel: CancellationToken,
    ) -> SessionReport {
        let span = tracing::info_span!("session", id = %Uuid::new_v4());
        self.drive(driver, goal, &cancel).instrument(span).await
    }

    async fn drive(
        &self,
        driver: &dyn BrowserDriver,
        goal: &str,
        cancel: &CancellationToken,
    ) -> SessionReport {
        tracing::info!("Starting session for goal: {}", goal);
        if self.config.verbose {
            println!("\n🚀 Goal: {goal}");
        }

        let handler = ActionHandler::new(driver).with_max_wait(self.config.max_wait);
        let policy = &self.config.policy;
        let max_iterations = self.config.max_iterations;
        let system_prompt = self.config.get_system_prompt();

        let mut ctx = InteractionContext::new(goal);
        let mut iteration: u32 = 1;
        let mut iterations_used: u32 = 0;
        let mut state = LoopState::Planning;

        let reason = loop {
            state = match state {
                LoopState::Planning => {
                    if cancel.is_cancelled() {
                        LoopState::Terminated(TerminationReason::Cancelled)
                    } else if iteration > max_iterations {
                        LoopState::Terminated(TerminationReason::MaxIterations)
                    } else {
                        iterations_used = iteration;
                        if self.config.verbose {
                            println!("\n{}", "=".repeat(50));
                            println!("🔄 Iteration {iteration}/{max_iterations}");
                            println!("{}", "=".repeat(50));
                        }
                        let prompt = ctx.planning_prompt(iteration, max_iterations);
                        match self
                            .gateway
                            .complete(&system_prompt, &prompt, CompletionMode::ActionPlan)
                            .await
                        {
                            Some(raw) => LoopState::Validating(raw),
                            None => {
                                tracing::warn!(iteration, "No plan from any model");
                                if iteration > 1 {
                                    self.capture_diagnostic(driver, iteration).await;
                                }
                                self.pause(self.config.planning_retry_delay, cancel).await;
                                iteration += 1;
                                LoopState::Planning
                            }
                        }
                    }
                }
                LoopState::Validating(raw) => match validate_plan(&raw) {
                    Ok(actions) => {
                        tracing::info!(iteration, count = actions.len(), "Plan accepted");
                        if self.config.verbose {
                            println!("🎯 Plan ({} actions):", actions.len());
                            println!(
                                "{}",
                                serde_json::to_string_pretty(&actions).unwrap_or_default()
                            );
                        }
                        LoopState::Executing(actions.into())
                    }
                    Err(e) => {
                        tracing::warn!(iteration, "Invalid plan: {}", e);
                        tracing::debug!("Rejected plan text: {}", raw);
                        self.pause(self.config.planning_retry_delay, cancel).await;
                        iteration += 1;
                        LoopState::Planning
                    }
                },
                LoopState::Executing(mut queue) => match queue.pop_front() {
                    None => {
                        self.pause(self.config.iteration_delay, cancel).await;
                        iteration += 1;
                        LoopState::Planning
                    }
                    Some(descriptor) => {
                        let check = ctx.register_action(&descriptor.action_type, policy.repeat_limit);
                        match check {
                            RepeatCheck::LoopDetected => {
                                tracing::warn!(
                                    "Action '{}' repeated {} times, ending session",
                                    descriptor.action_type,
                                    ctx.repeat_counter
                                );
                                LoopState::Terminated(TerminationReason::RepeatedAction {
                                    action_type: descriptor.action_type,
                                })
                            }
                            RepeatCheck::Fresh | RepeatCheck::Repeated(_) => {
                                self.dispatch(&handler, &mut ctx, descriptor, queue, cancel)
                                    .await
                            }
                        }
                    }
                },
                LoopState::Evaluating {
                    descriptor,
                    outcome,
                    remaining,
                } => {
                    if self.config.verbose {
                        let icon = if outcome.is_success() { "✅" } else { "❌" };
                        println!(
                            "{icon} {}: {}",
                            descriptor.action_type,
                            outcome.message.as_deref().unwrap_or("done")
                        );
                        if let Some(text) = outcome.text_content() {
                            if let Some(insight) = extract_insight(text, &ctx.user_goal) {
                                println!("{insight}");
                            }
                        }
                    }
                    let finished = ctx.record_outcome(descriptor, outcome, policy);
                    self.pause(self.config.action_delay, cancel).await;
                    match finished {
                        Some(reason) => LoopState::Terminated(reason),
                        None => LoopState::Executing(remaining),
                    }
                }
                LoopState::Terminated(reason) => break reason,
            };
        };

        self.finish(ctx, reason, iterations_used).await
    }

    /// Route one descriptor: loop-level actions here, the rest to the executor.
    async fn dispatch(
        &self,
        handler: &ActionHandler<'_>,
        ctx: &mut InteractionContext,
        descriptor: ActionDescriptor,
        remaining: VecDeque<ActionDescriptor>,
        cancel: &CancellationToken,
    ) -> LoopState {
        match descriptor.kind() {
            Some(ActionType::Clarify) => {
                let question = descriptor
                    .param_str("question")
                    .unwrap_or(DEFAULT_CLARIFY_QUESTION)
                    .to_string();
                tracing::info!("Asking for clarification: {}", question);
                match self.ask(&question, cancel).await {
                    Some(answer) => {
                        ctx.record_clarification(descriptor, &answer);
                        LoopState::Executing(remaining)
                    }
                    None => LoopState::Terminated(TerminationReason::Cancelled),
                }
            }
            Some(ActionType::GoalAchieved) => {
                let summary = descriptor
                    .param_str("summary_of_findings")
                    .map(String::from);
                tracing::info!("Model reports goal achieved");
                ctx.mark_goal_achieved(summary, &self.config.policy);
                LoopState::Terminated(TerminationReason::GoalAchieved)
            }
            _ => {
                let outcome = handler.execute(&descriptor).await;
                LoopState::Evaluating {
                    descriptor,
                    outcome,
                    remaining,
                }
            }
        }
    }

    /// Wait for a clarification answer; `None` if the session was cancelled.
    async fn ask(&self, question: &str, cancel: &CancellationToken) -> Option<String> {
        let callback = Arc::clone(&self.clarification);
        let question = question.to_string();
        let answer = tokio::task::spawn_blocking(move || callback(&question));
        tokio::select! {
            _ = cancel.cancelled() => None,
            answer = answer => Some(answer.ok().flatten().unwrap_or_default()),
        }
    }

    async fn pause(&self, delay: Duration, cancel: &CancellationToken) {
        if delay.is_zero() {
            return;
        }
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }

    async fn capture_diagnostic(&self, driver: &dyn BrowserDriver, iteration: u32) {
        let filename = format!("debug_iter_{iteration}_stuck.png");
        match driver.screenshot(Some(&filename), false).await {
            Ok(path) => tracing::info!("Saved diagnostic screenshot to {}", path.display()),
            Err(e) => tracing::warn!("Diagnostic screenshot failed: {}", e),
        }
    }

    /// Synthesize the answer and build the report.
    async fn finish(
        &self,
        mut ctx: InteractionContext,
        reason: TerminationReason,
        iterations_used: u32,
    ) -> SessionReport {
        let max_iterations = self.config.max_iterations;
        tracing::info!(iterations_used, "Session ended: {}", reason);

        if let Some(prompt) = ctx.synthesis_prompt(&reason, max_iterations) {
            let answer = self
                .gateway
                .complete(SYSTEM_PROMPT_FINAL_ANSWER, &prompt, CompletionMode::FinalAnswer)
                .await;
            ctx.final_answer = Some(answer.unwrap_or_else(|| fallback_answer(&reason).to_string()));
        }

        let status = match reason {
            TerminationReason::MaxIterations => SessionStatus::MaxIterationsReached,
            TerminationReason::Cancelled => SessionStatus::Cancelled,
            TerminationReason::GoalAchieved if !ctx.info_retrieved => {
                SessionStatus::PartialFailure
            }
            _ => SessionStatus::Success,
        };
        let actions_completed = ctx.history().len();
        let message = match reason {
            TerminationReason::GoalAchieved => "Goal processing complete.".to_string(),
            TerminationReason::InformationRetrieved | TerminationReason::ScreenshotTaken => {
                "Task completed successfully.".to_string()
            }
            TerminationReason::RepeatedAction { .. } => {
                "Task completion forced due to repeated actions.".to_string()
            }
            TerminationReason::MaxIterations => {
                format!("Completed {actions_completed} actions in {max_iterations} iterations.")
            }
            TerminationReason::Cancelled => "Session cancelled.".to_string(),
        };

        let summary = render_summary(&ctx, iterations_used, max_iterations, Local::now());
        if self.config.verbose {
            println!("{summary}");
            if let Some(answer) = &ctx.final_answer {
                println!("\n🎉 {}", "=".repeat(48));
                println!("💬 FINAL ANSWER: {answer}");
                println!("{}\n", "=".repeat(50));
            }
        }

        SessionReport {
            status,
            message,
            iterations_used,
            actions_completed,
            final_answer: ctx.final_answer,
            summary,
        }
    }
}

/// Answer used when synthesis returns nothing.
fn fallback_answer(reason: &TerminationReason) -> &'static str {
    match reason {
        TerminationReason::GoalAchieved => {
            "Goal marked as achieved by AI, but could not synthesize a final textual answer."
        }
        TerminationReason::MaxIterations => {
            "Max iterations reached; could not synthesize a final answer."
        }
        _ => "Task completed automatically.",
    }
}
