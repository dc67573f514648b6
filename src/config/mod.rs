//! Configuration module: model prompts.

mod prompts;

pub use prompts::{get_system_prompt, SYSTEM_PROMPT_FINAL_ANSWER, SYSTEM_PROMPT_PLANNER};
