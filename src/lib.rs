// Copyright 2025 The Web Agent Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Web Agent
//!
//! LLM-driven browser automation.
//!
//! The agent turns a natural-language goal into a sequence of browser
//! actions. Each iteration asks a chat model for a short JSON action plan,
//! repairs and validates it, runs the actions in Chrome and feeds the
//! results back into the next prompt. When the session ends, the model
//! synthesizes a direct answer to the goal.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use web_agent::{ModelClient, ModelGateway, RateLimiter, Settings, WebAgent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::from_env()?;
//!     let client = ModelClient::new(settings.model_config())?;
//!     let gateway = ModelGateway::new(
//!         Arc::new(client),
//!         settings.candidates(),
//!         Arc::new(RateLimiter::default()),
//!     );
//!     let agent = WebAgent::new(Arc::new(gateway), settings.agent_config());
//!
//!     let report = agent
//!         .run_in_chrome(
//!             settings.chrome_options(),
//!             "What is the weather in Paris?",
//!             Default::default(),
//!         )
//!         .await?;
//!
//!     println!("{}", report.summary);
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod agent;
pub mod browser;
pub mod config;
pub mod model;
pub mod settings;

#[cfg(test)]
pub(crate) mod test_support;

pub use actions::{
    validate_plan, ActionDescriptor, ActionHandler, ActionOutcome, ActionType, BrowserAction,
    ValidationError,
};
pub use agent::{
    AgentConfig, ClarificationCallback, CompletionPolicy, InteractionContext, SessionReport,
    SessionStatus, WebAgent,
};
pub use browser::{BrowserDriver, ChromeDriver, ChromeOptions, DriverError};
pub use model::{
    default_candidates, ChatBackend, ModelCandidate, ModelClient, ModelConfig, ModelError,
    ModelGateway, RateLimiter,
};
pub use settings::{Settings, SettingsError};
