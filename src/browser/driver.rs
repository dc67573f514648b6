//! The browser driver seam.
//!
//! Everything the action executor needs from a live page goes through
//! [`BrowserDriver`]. The Chrome implementation lives in `browser::chrome`;
//! tests use a recording fake.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Browser driver errors.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Browser launch failed: {0}")]
    Launch(String),
    #[error("Timed out after {timeout_ms} ms waiting for {target}")]
    Timeout { target: String, timeout_ms: u64 },
    #[error("Element not found: {0}")]
    NotFound(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Browser operation failed: {0}")]
    Operation(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Browser session is closed")]
    Closed,
}

impl DriverError {
    /// Build a timeout error for the given target.
    pub fn timeout(target: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            target: target.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Whether this error is a wait that ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Page lifecycle event a navigation waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitUntil {
    Load,
    #[default]
    DomContentLoaded,
    NetworkIdle,
}

/// Scroll direction for `scroll_page`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    /// Horizontal and vertical offsets for a scroll of `pixels`.
    pub fn offsets(self, pixels: i64) -> (i64, i64) {
        match self {
            Self::Up => (0, -pixels),
            Self::Down => (0, pixels),
            Self::Left => (-pixels, 0),
            Self::Right => (pixels, 0),
        }
    }
}

impl fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        };
        f.write_str(name)
    }
}

/// Element state a `wait_for_element` action waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitState {
    Attached,
    Detached,
    #[default]
    Visible,
    Hidden,
}

impl WaitState {
    /// Whether an element with the given presence and visibility satisfies
    /// this state.
    pub fn is_satisfied(self, present: bool, visible: bool) -> bool {
        match self {
            Self::Attached => present,
            Self::Detached => !present,
            Self::Visible => present && visible,
            Self::Hidden => !present || !visible,
        }
    }
}

impl fmt::Display for WaitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Attached => "attached",
            Self::Detached => "detached",
            Self::Visible => "visible",
            Self::Hidden => "hidden",
        };
        f.write_str(name)
    }
}

/// What a completed navigation reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationInfo {
    /// URL the page ended up on after redirects.
    pub url: String,
    /// HTTP status of the main document, when the browser exposes it.
    pub http_status: Option<u16>,
}

/// Operations the executor performs against a live page.
///
/// Selectors accept CSS, `text=...` and `xpath=...` forms. Every method
/// reports failures as [`DriverError`]; none of them panic on page errors.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Load `url` and wait for the given lifecycle event.
    async fn navigate(&self, url: &str, wait_until: WaitUntil)
        -> Result<NavigationInfo, DriverError>;

    async fn click(&self, selector: &str) -> Result<(), DriverError>;

    /// Replace the contents of an input with `text`.
    async fn type_into(&self, selector: &str, text: &str) -> Result<(), DriverError>;

    async fn select_option(&self, selector: &str, value: &str) -> Result<(), DriverError>;

    async fn set_checkbox(&self, selector: &str, checked: bool) -> Result<(), DriverError>;

    async fn upload_file(&self, selector: &str, path: &str) -> Result<(), DriverError>;

    async fn hover(&self, selector: &str) -> Result<(), DriverError>;

    async fn scroll(&self, direction: ScrollDirection, pixels: i64) -> Result<(), DriverError>;

    /// Press a key, on the focused element when `selector` is given.
    async fn press_key(&self, key: &str, selector: Option<&str>) -> Result<(), DriverError>;

    async fn wait_for(
        &self,
        selector: &str,
        timeout: Duration,
        state: WaitState,
    ) -> Result<(), DriverError>;

    /// Visible text of the element, or of the whole page when `selector` is `None`.
    async fn get_text(&self, selector: Option<&str>) -> Result<String, DriverError>;

    /// Attribute value, `Ok(None)` when the element lacks it.
    async fn get_attribute(&self, selector: &str, name: &str)
        -> Result<Option<String>, DriverError>;

    /// Capture a PNG and return the path it was written to.
    async fn screenshot(&self, filename: Option<&str>, full_page: bool)
        -> Result<PathBuf, DriverError>;

    /// Resolve a human description ("the login button") to a selector.
    async fn find_by_description(&self, description: &str) -> Result<String, DriverError>;

    /// Release the browser. Later calls fail with [`DriverError::Closed`].
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scroll_offsets() {
        assert_eq!(ScrollDirection::Down.offsets(300), (0, 300));
        assert_eq!(ScrollDirection::Up.offsets(300), (0, -300));
        assert_eq!(ScrollDirection::Left.offsets(50), (-50, 0));
        assert_eq!(ScrollDirection::Right.offsets(50), (50, 0));
    }

    #[test]
    fn test_wait_state_satisfaction() {
        assert!(WaitState::Visible.is_satisfied(true, true));
        assert!(!WaitState::Visible.is_satisfied(true, false));
        assert!(WaitState::Hidden.is_satisfied(false, false));
        assert!(WaitState::Hidden.is_satisfied(true, false));
        assert!(WaitState::Attached.is_satisfied(true, false));
        assert!(WaitState::Detached.is_satisfied(false, false));
        assert!(!WaitState::Detached.is_satisfied(true, true));
    }

    #[test]
    fn test_wait_state_deserializes_lowercase() {
        let state: WaitState = serde_json::from_str("\"hidden\"").unwrap();
        assert_eq!(state, WaitState::Hidden);
        assert_eq!(WaitState::default(), WaitState::Visible);
    }

    #[test]
    fn test_timeout_error_message() {
        let err = DriverError::timeout("#login", Duration::from_secs(10));
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "Timed out after 10000 ms waiting for #login");
    }
}
