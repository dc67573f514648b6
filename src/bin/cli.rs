//! Web Agent - LLM-driven browser automation
//!
//! This is the CLI entry point for the web-agent tool.
//! Run with: cargo run --bin web-agent [goal...]

use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use web_agent::{
    ChromeOptions, ModelClient, ModelGateway, RateLimiter, SessionReport, Settings, WebAgent,
};

const PROMPT: &str = "Goal or 'test_login'/'exit'> ";

const TEST_LOGIN_GOAL: &str = "Go to Instagram and login with username 'testuser123' and \
    password 'testpass456', then take a screenshot";

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run());
    // A stdin read left pending at the prompt must not hold up exit.
    runtime.shutdown_background();
    result
}

async fn run() -> anyhow::Result<()> {
    // Load .env file if present (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let settings = Settings::from_env()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let candidates = settings.candidates();
    let agent_config = settings.agent_config();
    let chrome_options = settings.chrome_options();

    println!("🤖 Web Agent - LLM-driven browser automation");
    println!("================================================");
    println!("Endpoint: {}", settings.base_url);
    println!(
        "Models: {}",
        candidates
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    );
    println!(
        "Browser: {}",
        if settings.headless { "headless" } else { "visible" }
    );
    println!("Max iterations: {}", agent_config.max_iterations);
    println!(
        "Retry: max {} attempts, {}s delay",
        settings.max_retries, settings.retry_delay_secs
    );
    println!("Screenshots: {}", settings.screenshot_dir.display());
    println!("================================================\n");

    let client = ModelClient::new(settings.model_config())?;
    let limiter = Arc::new(RateLimiter::default());
    let gateway = ModelGateway::new(Arc::new(client), candidates, limiter);
    let agent = WebAgent::new(Arc::new(gateway), agent_config);

    // Check if a goal is provided as argument
    let args: Vec<String> = env::args().skip(1).collect();
    if !args.is_empty() {
        let goal = args.join(" ");
        run_session(&agent, &chrome_options, &goal).await;
        return Ok(());
    }

    println!("Interactive mode. Type your goal and press Enter.");
    println!("Type 'test_login' for a demo session or 'exit' to quit.\n");

    loop {
        let input = tokio::select! {
            line = read_goal() => match line? {
                Some(line) => PromptInput::Line(line),
                None => PromptInput::Eof,
            },
            _ = tokio::signal::ctrl_c() => PromptInput::Interrupted,
        };

        match next_command(&input) {
            Command::Skip => continue,
            Command::Run(goal) => run_session(&agent, &chrome_options, goal).await,
            Command::Quit(farewell) => {
                println!("{farewell}");
                break;
            }
        }
    }

    Ok(())
}

/// What the interactive prompt produced.
#[derive(Debug)]
enum PromptInput {
    Line(String),
    Eof,
    Interrupted,
}

#[derive(Debug, PartialEq)]
enum Command<'a> {
    Skip,
    Run(&'a str),
    Quit(&'static str),
}

fn next_command(input: &PromptInput) -> Command<'_> {
    match input {
        PromptInput::Interrupted => Command::Quit("\nOperation cancelled."),
        PromptInput::Eof => Command::Quit("\nGoodbye! 👋"),
        PromptInput::Line(line) => match line.trim() {
            "" => Command::Skip,
            "exit" | "quit" => Command::Quit("Goodbye! 👋"),
            "test_login" => Command::Run(TEST_LOGIN_GOAL),
            goal => Command::Run(goal),
        },
    }
}

/// Prompt for a goal; `None` on end of input.
async fn read_goal() -> anyhow::Result<Option<String>> {
    print!("{PROMPT}");
    io::stdout().flush()?;

    let line = tokio::task::spawn_blocking(|| -> io::Result<Option<String>> {
        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        Ok((read > 0).then_some(line))
    })
    .await??;
    Ok(line)
}

/// Run one session in a fresh browser.
///
/// The first Ctrl-C cancels the session and waits for its report; a second
/// one abandons it, which drops the driver and kills Chrome.
async fn run_session(agent: &WebAgent, options: &ChromeOptions, goal: &str) {
    println!("📝 Goal: {goal}\n");

    let cancel = CancellationToken::new();
    let session = agent.run_in_chrome(options.clone(), goal, cancel.clone());
    tokio::pin!(session);

    let result = tokio::select! {
        result = &mut session => result,
        _ = tokio::signal::ctrl_c() => {
            println!("\n🛑 Cancelling session... (Ctrl-C again to abort)");
            cancel.cancel();
            tokio::select! {
                result = &mut session => result,
                _ = tokio::signal::ctrl_c() => {
                    println!("\n🛑 Session aborted.");
                    return;
                }
            }
        }
    };

    match result {
        Ok(report) => print_report(&report),
        Err(e) => eprintln!("\n❌ Failed to start the browser: {e}\n"),
    }
}

fn print_report(report: &SessionReport) {
    println!("\n{}", report.status.title());
    println!("Status: {}", report.status);
    println!("Message: {}", report.message);
    println!(
        "Iterations: {}, actions: {}",
        report.iterations_used, report.actions_completed
    );
    if let Some(answer) = &report.final_answer {
        println!("\n✅ Result: {answer}\n");
    }
}
