//! Runtime settings for the web agent.
//! Read from the process environment (and `.env`, loaded by the binary).

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::{AgentConfig, CompletionPolicy, DEFAULT_MAX_ITERATIONS};
use crate::browser::{
    ChromeOptions, DEFAULT_ACTION_TIMEOUT, DEFAULT_NAVIGATION_TIMEOUT, DEFAULT_SCREENSHOT_DIR,
};
use crate::model::{
    candidates_from_names, default_candidates, ModelCandidate, ModelConfig, DEFAULT_BASE_URL,
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS,
};

/// Settings errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("OPENROUTER_API_KEY is not set")]
    MissingApiKey,
    #[error("{key} must be a non-negative integer, got '{value}'")]
    InvalidNumber { key: String, value: String },
    #[error("{key} must be true or false, got '{value}'")]
    InvalidBool { key: String, value: String },
    #[error("DEFAULT_TIMEOUT ({default_ms} ms) exceeds MAX_TIMEOUT ({max_ms} ms)")]
    InvalidTimeouts { default_ms: u64, max_ms: u64 },
}

/// Application settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Model API key
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Model API base URL
    pub base_url: String,
    /// Model names in fallback order; empty means the built-in list
    pub model_candidates: Vec<String>,
    /// Log level used when RUST_LOG is unset
    pub log_level: String,
    /// Run Chrome without a window
    pub headless: bool,
    /// Element wait bound in milliseconds
    pub default_timeout_ms: u64,
    /// Navigation and wait_for_element bound in milliseconds
    pub max_timeout_ms: u64,
    /// Transport retries for model requests
    pub max_retries: u32,
    /// Initial retry delay in seconds
    pub retry_delay_secs: u64,
    /// Planning iterations per session
    pub max_iterations: u32,
    /// Where screenshots are written
    pub screenshot_dir: PathBuf,
    /// Goal keywords that make text capture complete a session
    pub info_keywords: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model_candidates: Vec::new(),
            log_level: "INFO".to_string(),
            headless: false,
            default_timeout_ms: DEFAULT_ACTION_TIMEOUT.as_millis() as u64,
            max_timeout_ms: DEFAULT_NAVIGATION_TIMEOUT.as_millis() as u64,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            screenshot_dir: PathBuf::from(DEFAULT_SCREENSHOT_DIR),
            info_keywords: Vec::new(),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &mask(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model_candidates", &self.model_candidates)
            .field("log_level", &self.log_level)
            .field("headless", &self.headless)
            .field("default_timeout_ms", &self.default_timeout_ms)
            .field("max_timeout_ms", &self.max_timeout_ms)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_secs", &self.retry_delay_secs)
            .field("max_iterations", &self.max_iterations)
            .field("screenshot_dir", &self.screenshot_dir)
            .field("info_keywords", &self.info_keywords)
            .finish()
    }
}

fn mask(key: &str) -> String {
    if key.is_empty() {
        return String::new();
    }
    let tail: String = key
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("***{tail}")
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, SettingsError> {
    value
        .trim()
        .parse()
        .map_err(|_| SettingsError::InvalidNumber {
            key: key.to_string(),
            value: value.to_string(),
        })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, SettingsError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(SettingsError::InvalidBool {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load settings from a key-value map.
    pub fn from_map(values: &HashMap<String, String>) -> Result<Self, SettingsError> {
        Self::from_lookup(|key| values.get(key).cloned())
    }

    /// Load settings through `lookup`; unset and blank values keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut settings = Self::default();

        settings.api_key = get("OPENROUTER_API_KEY")
            .or_else(|| get("MODEL_API_KEY"))
            .map(|key| key.trim().to_string())
            .ok_or(SettingsError::MissingApiKey)?;

        if let Some(value) = get("MODEL_BASE_URL") {
            settings.base_url = value.trim().trim_end_matches('/').to_string();
        }
        if let Some(value) = get("MODEL_CANDIDATES") {
            settings.model_candidates = parse_list(&value);
        }
        if let Some(value) = get("LOG_LEVEL") {
            settings.log_level = value.trim().to_string();
        }
        if let Some(value) = get("DEFAULT_HEADLESS") {
            settings.headless = parse_bool("DEFAULT_HEADLESS", &value)?;
        }
        if let Some(value) = get("DEFAULT_TIMEOUT") {
            settings.default_timeout_ms = parse_number("DEFAULT_TIMEOUT", &value)?;
        }
        if let Some(value) = get("MAX_TIMEOUT") {
            settings.max_timeout_ms = parse_number("MAX_TIMEOUT", &value)?;
        }
        if let Some(value) = get("MAX_RETRIES") {
            settings.max_retries = parse_number("MAX_RETRIES", &value)?;
        }
        if let Some(value) = get("RETRY_DELAY") {
            settings.retry_delay_secs = parse_number("RETRY_DELAY", &value)?;
        }
        if let Some(value) = get("MAX_ITERATIONS") {
            settings.max_iterations = parse_number("MAX_ITERATIONS", &value)?;
        }
        if let Some(value) = get("SCREENSHOT_DIR") {
            settings.screenshot_dir = PathBuf::from(value.trim());
        }
        if let Some(value) = get("INFO_GOAL_KEYWORDS") {
            settings.info_keywords = parse_list(&value);
        }

        if settings.default_timeout_ms > settings.max_timeout_ms {
            return Err(SettingsError::InvalidTimeouts {
                default_ms: settings.default_timeout_ms,
                max_ms: settings.max_timeout_ms,
            });
        }

        Ok(settings)
    }

    /// `EnvFilter` directive for the configured level.
    pub fn log_filter(&self) -> String {
        self.log_level.to_lowercase()
    }

    /// Model candidates in fallback order.
    pub fn candidates(&self) -> Vec<ModelCandidate> {
        if self.model_candidates.is_empty() {
            default_candidates()
        } else {
            candidates_from_names(&self.model_candidates)
        }
    }

    pub fn model_config(&self) -> ModelConfig {
        ModelConfig::default()
            .with_base_url(&self.base_url)
            .with_api_key(&self.api_key)
            .with_max_retries(self.max_retries)
            .with_retry_delay(self.retry_delay_secs)
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig::default()
            .with_max_iterations(self.max_iterations)
            .with_max_wait(Duration::from_millis(self.max_timeout_ms))
            .with_policy(CompletionPolicy::default().with_info_keywords(&self.info_keywords))
    }

    pub fn chrome_options(&self) -> ChromeOptions {
        ChromeOptions::default()
            .with_headless(self.headless)
            .with_action_timeout(Duration::from_millis(self.default_timeout_ms))
            .with_navigation_timeout(Duration::from_millis(self.max_timeout_ms))
            .with_screenshot_dir(&self.screenshot_dir)
    }
}
