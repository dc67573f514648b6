//! Action handler: executes one action against the browser driver.

use std::time::Duration;

use super::types::{ActionDescriptor, ActionOutcome, BrowserAction};
use crate::browser::{BrowserDriver, DriverError, WaitState, WaitUntil};

/// Default upper bound for `wait_for_element` timeouts.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(60_000);

/// Executes actions against a [`BrowserDriver`].
///
/// Every driver error becomes an error [`ActionOutcome`]; nothing is
/// propagated to the caller.
pub struct ActionHandler<'a> {
    driver: &'a dyn BrowserDriver,
    max_wait: Duration,
}

impl<'a> ActionHandler<'a> {
    /// Create a new ActionHandler over the given driver.
    pub fn new(driver: &'a dyn BrowserDriver) -> Self {
        Self {
            driver,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }

    /// Clamp `wait_for_element` timeouts to at most `max_wait`.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// The driver actions run against.
    pub fn driver(&self) -> &'a dyn BrowserDriver {
        self.driver
    }

    /// Execute a validated action descriptor.
    ///
    /// # Arguments
    /// * `descriptor` - The action as produced by the plan validator.
    ///
    /// # Returns
    /// The outcome; unknown types and bad parameters yield error outcomes.
    pub async fn execute(&self, descriptor: &ActionDescriptor) -> ActionOutcome {
        match descriptor.to_action() {
            Ok(action) => self.execute_action(action).await,
            Err(e) => {
                tracing::warn!("Rejected action '{}': {}", descriptor.action_type, e);
                ActionOutcome::failure(e.to_string())
            }
        }
    }

    /// Execute a typed action.
    pub async fn execute_action(&self, action: BrowserAction) -> ActionOutcome {
        tracing::debug!("Executing {:?}", action);

        let outcome = match action {
            BrowserAction::Navigate { url } => self.navigate(&url).await,
            BrowserAction::ClickElement { selector } => {
                match self.driver.click(&selector).await {
                    Ok(()) => ActionOutcome::success()
                        .with_message(format!("Clicked element '{selector}'")),
                    Err(e) => element_failure("click element", &selector, WaitState::Visible, e),
                }
            }
            BrowserAction::TypeIntoElement { selector, text } => {
                match self.driver.type_into(&selector, &text).await {
                    Ok(()) => ActionOutcome::success()
                        .with_message(format!("Typed '{text}' into element '{selector}'")),
                    Err(e) => {
                        element_failure("type into element", &selector, WaitState::Visible, e)
                    }
                }
            }
            BrowserAction::SelectDropdownOption {
                selector,
                option_value,
            } => match self.driver.select_option(&selector, &option_value).await {
                Ok(()) => ActionOutcome::success().with_message(format!(
                    "Selected option '{option_value}' from dropdown '{selector}'"
                )),
                Err(e) => element_failure("select option in", &selector, WaitState::Visible, e),
            },
            BrowserAction::CheckCheckbox { selector, checked } => {
                match self.driver.set_checkbox(&selector, checked).await {
                    Ok(()) => {
                        let verb = if checked { "Checked" } else { "Unchecked" };
                        ActionOutcome::success()
                            .with_message(format!("{verb} checkbox '{selector}'"))
                    }
                    Err(e) => element_failure("set checkbox", &selector, WaitState::Visible, e),
                }
            }
            BrowserAction::UploadFile {
                selector,
                file_path,
            } => match self.driver.upload_file(&selector, &file_path).await {
                Ok(()) => ActionOutcome::success().with_message(format!(
                    "Uploaded file '{file_path}' to element '{selector}'"
                )),
                Err(e) => element_failure("upload file to", &selector, WaitState::Attached, e),
            },
            BrowserAction::HoverElement { selector } => {
                match self.driver.hover(&selector).await {
                    Ok(()) => ActionOutcome::success()
                        .with_message(format!("Hovered over element '{selector}'")),
                    Err(e) => element_failure("hover over element", &selector, WaitState::Visible, e),
                }
            }
            BrowserAction::ScrollPage { direction, pixels } => {
                match self.driver.scroll(direction, pixels).await {
                    Ok(()) => ActionOutcome::success()
                        .with_message(format!("Scrolled {direction} by {pixels} pixels")),
                    Err(e) => ActionOutcome::failure(format!("Failed to scroll page: {e}")),
                }
            }
            BrowserAction::PressKey { key, selector } => {
                match self.driver.press_key(&key, selector.as_deref()).await {
                    Ok(()) => {
                        let message = match &selector {
                            Some(selector) => format!("Pressed key '{key}' on element '{selector}'"),
                            None => format!("Pressed key '{key}'"),
                        };
                        ActionOutcome::success().with_message(message)
                    }
                    Err(e) => match &selector {
                        Some(selector) => {
                            element_failure("press key on", selector, WaitState::Visible, e)
                        }
                        None => ActionOutcome::failure(format!("Failed to press key '{key}': {e}")),
                    },
                }
            }
            BrowserAction::WaitForElement {
                selector,
                timeout_ms,
                state,
            } => {
                let timeout = Duration::from_millis(timeout_ms).min(self.max_wait);
                match self.driver.wait_for(&selector, timeout, state).await {
                    Ok(()) => ActionOutcome::success()
                        .with_message(format!("Element '{selector}' is {state}")),
                    Err(e) => element_failure("wait for element", &selector, state, e),
                }
            }
            BrowserAction::GetPageTextContent { selector } => {
                self.page_text(selector.as_deref()).await
            }
            BrowserAction::GetElementAttribute {
                selector,
                attribute,
            } => match self.driver.get_attribute(&selector, &attribute).await {
                Ok(Some(value)) => ActionOutcome::success().with_result(attribute, value),
                Ok(None) => {
                    ActionOutcome::failure(format!("Attribute '{attribute}' not found"))
                }
                Err(e) => element_failure("read attribute of", &selector, WaitState::Visible, e),
            },
            BrowserAction::TakeScreenshot {
                filename,
                full_page,
            } => match self.driver.screenshot(filename.as_deref(), full_page).await {
                Ok(path) => {
                    let path = path.display().to_string();
                    ActionOutcome::success()
                        .with_message(format!("Screenshot saved to {path}"))
                        .with_filepath(path)
                }
                Err(e) => ActionOutcome::failure(format!("Failed to take screenshot: {e}")),
            },
            BrowserAction::FindElementByDescription { description } => {
                match self.driver.find_by_description(&description).await {
                    Ok(selector) => ActionOutcome::success()
                        .with_message(format!("Found element matching '{description}'"))
                        .with_result("selector", selector),
                    Err(DriverError::NotFound(_)) => ActionOutcome::failure(format!(
                        "Element not found by description: {description}"
                    )),
                    Err(e) => ActionOutcome::failure(format!(
                        "Failed to find element by description '{description}': {e}"
                    )),
                }
            }
            BrowserAction::Clarify { .. } | BrowserAction::GoalAchieved { .. } => {
                let kind = action.action_type();
                ActionOutcome::failure(format!(
                    "Action '{kind}' is handled by the planning loop, not the browser"
                ))
            }
        };

        if outcome.is_success() {
            tracing::info!(
                "Action succeeded: {}",
                outcome.message.as_deref().unwrap_or("ok")
            );
        } else {
            tracing::warn!(
                "Action failed: {}",
                outcome.message.as_deref().unwrap_or("unknown error")
            );
        }
        outcome
    }

    async fn navigate(&self, url: &str) -> ActionOutcome {
        match self.driver.navigate(url, WaitUntil::DomContentLoaded).await {
            Ok(info) => {
                let mut outcome = ActionOutcome::success()
                    .with_message("Navigation successful")
                    .with_url(info.url);
                if let Some(status) = info.http_status {
                    outcome = outcome.with_result("http_status", status);
                }
                outcome
            }
            Err(e) if e.is_timeout() => {
                ActionOutcome::failure(format!("Navigation to '{url}' timed out: {e}"))
            }
            Err(e) => ActionOutcome::failure(format!("Navigation to '{url}' failed: {e}")),
        }
    }

    async fn page_text(&self, selector: Option<&str>) -> ActionOutcome {
        match self.driver.get_text(selector).await {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    ActionOutcome::failure("No text content found")
                } else {
                    ActionOutcome::success().with_result("text_content", text)
                }
            }
            Err(e) => match selector {
                Some(selector) => {
                    element_failure("read text of element", selector, WaitState::Visible, e)
                }
                None => ActionOutcome::failure(format!("Failed to read page text: {e}")),
            },
        }
    }
}

fn element_failure(
    verb: &str,
    selector: &str,
    state: WaitState,
    err: DriverError,
) -> ActionOutcome {
    if err.is_timeout() {
        ActionOutcome::failure(format!(
            "Timeout waiting for element '{selector}' to be {state}"
        ))
    } else {
        ActionOutcome::failure(format!("Failed to {verb} '{selector}': {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::types::OutcomeStatus;
    use crate::test_support::FakeDriver;
    use serde_json::json;

    fn descriptor(action_type: &str, parameters: serde_json::Value) -> ActionDescriptor {
        ActionDescriptor::new(action_type, parameters)
    }

    #[tokio::test]
    async fn test_navigate_reports_url_and_status() {
        let driver = FakeDriver::new();
        let handler = ActionHandler::new(&driver);

        let outcome = handler
            .execute(&descriptor("navigate", json!({"url": "https://example.com"})))
            .await;

        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.url.as_deref(), Some("https://example.com"));
        assert_eq!(outcome.result.unwrap()["http_status"], json!(200));
        assert_eq!(driver.calls(), vec!["navigate https://example.com"]);
    }

    #[tokio::test]
    async fn test_click_timeout_message() {
        let driver = FakeDriver::new().failing_selector("#missing");
        let handler = ActionHandler::new(&driver);

        let outcome = handler
            .execute(&descriptor("click_element", json!({"selector": "#missing"})))
            .await;

        assert!(!outcome.is_success());
        assert_eq!(
            outcome.message.as_deref(),
            Some("Timeout waiting for element '#missing' to be visible")
        );
    }

    #[tokio::test]
    async fn test_unknown_action_type() {
        let driver = FakeDriver::new();
        let handler = ActionHandler::new(&driver);

        let outcome = handler.execute(&descriptor("teleport", json!({}))).await;

        assert_eq!(outcome.message.as_deref(), Some("Unknown action type: teleport"));
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_parameter_is_error_outcome() {
        let driver = FakeDriver::new();
        let handler = ActionHandler::new(&driver);

        let outcome = handler
            .execute(&descriptor("type_into_element", json!({"selector": "#q"})))
            .await;

        assert!(!outcome.is_success());
        assert!(outcome.message.unwrap().contains("text"));
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn test_page_text_is_trimmed() {
        let driver = FakeDriver::new().with_page_text("  Example Domain \n");
        let handler = ActionHandler::new(&driver);

        let outcome = handler
            .execute(&descriptor("get_page_text_content", json!({})))
            .await;

        assert_eq!(outcome.text_content(), Some("Example Domain"));
    }

    #[tokio::test]
    async fn test_empty_page_text_is_error() {
        let driver = FakeDriver::new().with_page_text("   ");
        let handler = ActionHandler::new(&driver);

        let outcome = handler
            .execute(&descriptor("get_page_text_content", json!({})))
            .await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.message.as_deref(), Some("No text content found"));
    }

    #[tokio::test]
    async fn test_missing_attribute() {
        let driver = FakeDriver::new();
        let handler = ActionHandler::new(&driver);

        let outcome = handler
            .execute(&descriptor(
                "get_element_attribute",
                json!({"selector": "a", "attribute": "data-missing"}),
            ))
            .await;
        assert_eq!(
            outcome.message.as_deref(),
            Some("Attribute 'data-missing' not found")
        );

        let outcome = handler
            .execute(&descriptor(
                "get_element_attribute",
                json!({"selector": "a", "attribute": "href"}),
            ))
            .await;
        assert_eq!(outcome.result.unwrap()["href"], json!("https://example.com/"));
    }

    #[tokio::test]
    async fn test_screenshot_reports_filepath() {
        let driver = FakeDriver::new();
        let handler = ActionHandler::new(&driver);

        let outcome = handler
            .execute(&descriptor("take_screenshot", json!({"filename": "result"})))
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.filepath.as_deref(), Some("screenshots/result.png"));
        assert_eq!(
            outcome.message.as_deref(),
            Some("Screenshot saved to screenshots/result.png")
        );
    }

    #[tokio::test]
    async fn test_wait_timeout_is_clamped() {
        let driver = FakeDriver::new();
        let handler = ActionHandler::new(&driver).with_max_wait(Duration::from_secs(5));

        let outcome = handler
            .execute(&descriptor(
                "wait_for_element",
                json!({"selector": "#late", "timeout_ms": 120000, "state": "hidden"}),
            ))
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.message.as_deref(), Some("Element '#late' is hidden"));
        assert_eq!(driver.calls(), vec!["wait_for #late 5000ms hidden"]);
    }

    #[tokio::test]
    async fn test_find_by_description() {
        let driver = FakeDriver::new().with_described_element("Search");
        let handler = ActionHandler::new(&driver);

        let outcome = handler
            .execute(&descriptor(
                "find_element_by_description",
                json!({"description": "Search"}),
            ))
            .await;
        assert_eq!(outcome.result.unwrap()["selector"], json!("[aria-label*=\"Search\"]"));

        let outcome = handler
            .execute(&descriptor(
                "find_element_by_description",
                json!({"description": "Nothing like this"}),
            ))
            .await;
        assert_eq!(
            outcome.message.as_deref(),
            Some("Element not found by description: Nothing like this")
        );
    }

    #[tokio::test]
    async fn test_invalid_scroll_direction() {
        let driver = FakeDriver::new();
        let handler = ActionHandler::new(&driver);

        let outcome = handler
            .execute(&descriptor("scroll_page", json!({"direction": "sideways"})))
            .await;
        assert!(!outcome.is_success());

        let outcome = handler
            .execute(&descriptor("scroll_page", json!({"direction": "up"})))
            .await;
        assert_eq!(outcome.message.as_deref(), Some("Scrolled up by 300 pixels"));
    }

    #[tokio::test]
    async fn test_loop_actions_are_not_executed() {
        let driver = FakeDriver::new();
        let handler = ActionHandler::new(&driver);

        let outcome = handler
            .execute(&descriptor("goal_achieved", json!({"summary_of_findings": "done"})))
            .await;
        assert!(!outcome.is_success());
        assert!(driver.calls().is_empty());
    }
}
