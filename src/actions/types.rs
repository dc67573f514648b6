//! Action vocabulary shared by the validator, the executor and the loop.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::browser::{ScrollDirection, WaitState};

/// Default pixel count for `scroll_page`.
pub const DEFAULT_SCROLL_PIXELS: i64 = 300;

/// Default timeout for `wait_for_element`, in milliseconds.
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 10_000;

/// Question asked when a `clarify` action carries none.
pub const DEFAULT_CLARIFY_QUESTION: &str = "More info needed.";

/// Action conversion errors.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Unknown action type: {0}")]
    UnknownActionType(String),
    #[error("Invalid parameters for '{action_type}': {reason}")]
    InvalidParameters { action_type: String, reason: String },
}

/// The action types the planner may emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    Navigate,
    ClickElement,
    TypeIntoElement,
    SelectDropdownOption,
    CheckCheckbox,
    UploadFile,
    HoverElement,
    ScrollPage,
    PressKey,
    WaitForElement,
    GetPageTextContent,
    GetElementAttribute,
    TakeScreenshot,
    FindElementByDescription,
    Clarify,
    GoalAchieved,
}

impl ActionType {
    pub const ALL: [ActionType; 16] = [
        Self::Navigate,
        Self::ClickElement,
        Self::TypeIntoElement,
        Self::SelectDropdownOption,
        Self::CheckCheckbox,
        Self::UploadFile,
        Self::HoverElement,
        Self::ScrollPage,
        Self::PressKey,
        Self::WaitForElement,
        Self::GetPageTextContent,
        Self::GetElementAttribute,
        Self::TakeScreenshot,
        Self::FindElementByDescription,
        Self::Clarify,
        Self::GoalAchieved,
    ];

    /// Wire name of the action type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::ClickElement => "click_element",
            Self::TypeIntoElement => "type_into_element",
            Self::SelectDropdownOption => "select_dropdown_option",
            Self::CheckCheckbox => "check_checkbox",
            Self::UploadFile => "upload_file",
            Self::HoverElement => "hover_element",
            Self::ScrollPage => "scroll_page",
            Self::PressKey => "press_key",
            Self::WaitForElement => "wait_for_element",
            Self::GetPageTextContent => "get_page_text_content",
            Self::GetElementAttribute => "get_element_attribute",
            Self::TakeScreenshot => "take_screenshot",
            Self::FindElementByDescription => "find_element_by_description",
            Self::Clarify => "clarify",
            Self::GoalAchieved => "goal_achieved",
        }
    }
}

impl FromStr for ActionType {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ActionError::UnknownActionType(s.to_string()))
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structurally valid action as produced by the plan validator.
///
/// The action type may still be unknown; typed parameters are checked only
/// when the descriptor is turned into a [`BrowserAction`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub action_type: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl ActionDescriptor {
    /// Create a descriptor. Non-object `parameters` become an empty map.
    pub fn new(action_type: impl Into<String>, parameters: Value) -> Self {
        let parameters = match parameters {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            action_type: action_type.into(),
            parameters,
        }
    }

    /// The known action type, if any.
    pub fn kind(&self) -> Option<ActionType> {
        self.action_type.parse().ok()
    }

    /// A string parameter, if present.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }

    /// Convert into a typed action.
    ///
    /// Unknown types and missing or mistyped required parameters are errors;
    /// extra parameters are ignored.
    pub fn to_action(&self) -> Result<BrowserAction, ActionError> {
        let kind: ActionType = self.action_type.parse()?;
        let tagged = json!({
            "action_type": kind.as_str(),
            "parameters": Value::Object(self.parameters.clone()),
        });
        serde_json::from_value(tagged).map_err(|e| ActionError::InvalidParameters {
            action_type: self.action_type.clone(),
            reason: e.to_string(),
        })
    }
}

fn default_checked() -> bool {
    true
}

fn default_scroll_pixels() -> i64 {
    DEFAULT_SCROLL_PIXELS
}

fn default_wait_timeout_ms() -> u64 {
    DEFAULT_WAIT_TIMEOUT_MS
}

fn default_question() -> String {
    DEFAULT_CLARIFY_QUESTION.to_string()
}

/// A typed browser action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action_type", content = "parameters", rename_all = "snake_case")]
pub enum BrowserAction {
    Navigate {
        url: String,
    },
    ClickElement {
        selector: String,
    },
    TypeIntoElement {
        selector: String,
        text: String,
    },
    SelectDropdownOption {
        selector: String,
        option_value: String,
    },
    CheckCheckbox {
        selector: String,
        #[serde(default = "default_checked")]
        checked: bool,
    },
    UploadFile {
        selector: String,
        file_path: String,
    },
    HoverElement {
        selector: String,
    },
    ScrollPage {
        direction: ScrollDirection,
        #[serde(default = "default_scroll_pixels")]
        pixels: i64,
    },
    PressKey {
        key: String,
        #[serde(default)]
        selector: Option<String>,
    },
    WaitForElement {
        selector: String,
        #[serde(default = "default_wait_timeout_ms")]
        timeout_ms: u64,
        #[serde(default)]
        state: WaitState,
    },
    GetPageTextContent {
        #[serde(default)]
        selector: Option<String>,
    },
    GetElementAttribute {
        selector: String,
        attribute: String,
    },
    TakeScreenshot {
        #[serde(default)]
        filename: Option<String>,
        #[serde(default)]
        full_page: bool,
    },
    FindElementByDescription {
        description: String,
    },
    Clarify {
        #[serde(default = "default_question")]
        question: String,
    },
    GoalAchieved {
        #[serde(default)]
        summary_of_findings: Option<String>,
    },
}

impl BrowserAction {
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::Navigate { .. } => ActionType::Navigate,
            Self::ClickElement { .. } => ActionType::ClickElement,
            Self::TypeIntoElement { .. } => ActionType::TypeIntoElement,
            Self::SelectDropdownOption { .. } => ActionType::SelectDropdownOption,
            Self::CheckCheckbox { .. } => ActionType::CheckCheckbox,
            Self::UploadFile { .. } => ActionType::UploadFile,
            Self::HoverElement { .. } => ActionType::HoverElement,
            Self::ScrollPage { .. } => ActionType::ScrollPage,
            Self::PressKey { .. } => ActionType::PressKey,
            Self::WaitForElement { .. } => ActionType::WaitForElement,
            Self::GetPageTextContent { .. } => ActionType::GetPageTextContent,
            Self::GetElementAttribute { .. } => ActionType::GetElementAttribute,
            Self::TakeScreenshot { .. } => ActionType::TakeScreenshot,
            Self::FindElementByDescription { .. } => ActionType::FindElementByDescription,
            Self::Clarify { .. } => ActionType::Clarify,
            Self::GoalAchieved { .. } => ActionType::GoalAchieved,
        }
    }
}

/// Status of an executed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Error,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// Result of executing one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filepath: Option<String>,
}

impl ActionOutcome {
    /// Create a successful outcome.
    pub fn success() -> Self {
        Self {
            status: OutcomeStatus::Success,
            message: None,
            result: None,
            url: None,
            filepath: None,
        }
    }

    /// Create a failure outcome.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Error,
            message: Some(message.into()),
            result: None,
            url: None,
            filepath: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Add one entry to the result map.
    pub fn with_result(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.result
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_filepath(mut self, filepath: impl Into<String>) -> Self {
        self.filepath = Some(filepath.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    /// Text captured by `get_page_text_content`, if any.
    pub fn text_content(&self) -> Option<&str> {
        self.result
            .as_ref()
            .and_then(|result| result.get("text_content"))
            .and_then(Value::as_str)
    }
}
