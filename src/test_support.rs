//! In-memory collaborators for unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::browser::{
    description_candidates, screenshot_filename, BrowserDriver, DriverError, NavigationInfo,
    ScrollDirection, WaitState, WaitUntil, DEFAULT_ACTION_TIMEOUT, DEFAULT_SCREENSHOT_DIR,
};
use crate::model::{ChatBackend, ChatRequest, CompletionMode, ModelError};

/// Browser driver that records calls instead of driving a page.
pub(crate) struct FakeDriver {
    calls: Mutex<Vec<String>>,
    failing: HashSet<String>,
    described: HashSet<String>,
    page_text: String,
}

impl FakeDriver {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: HashSet::new(),
            described: HashSet::new(),
            page_text: "Example Domain".to_string(),
        }
    }

    /// Element operations on `selector` time out.
    pub(crate) fn failing_selector(mut self, selector: &str) -> Self {
        self.failing.insert(selector.to_string());
        self
    }

    pub(crate) fn with_page_text(mut self, text: &str) -> Self {
        self.page_text = text.to_string();
        self
    }

    /// `find_by_description` resolves `description`.
    pub(crate) fn with_described_element(mut self, description: &str) -> Self {
        self.described.insert(description.to_string());
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn element(&self, call: String, selector: &str) -> Result<(), DriverError> {
        self.record(call);
        if self.failing.contains(selector) {
            Err(DriverError::timeout(selector, DEFAULT_ACTION_TIMEOUT))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn navigate(
        &self,
        url: &str,
        _wait_until: WaitUntil,
    ) -> Result<NavigationInfo, DriverError> {
        self.record(format!("navigate {url}"));
        Ok(NavigationInfo {
            url: url.to_string(),
            http_status: Some(200),
        })
    }

    async fn click(&self, selector: &str) -> Result<(), DriverError> {
        self.element(format!("click {selector}"), selector)
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<(), DriverError> {
        self.element(format!("type {selector} {text}"), selector)
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<(), DriverError> {
        self.element(format!("select {selector} {value}"), selector)
    }

    async fn set_checkbox(&self, selector: &str, checked: bool) -> Result<(), DriverError> {
        self.element(format!("checkbox {selector} {checked}"), selector)
    }

    async fn upload_file(&self, selector: &str, path: &str) -> Result<(), DriverError> {
        self.element(format!("upload {selector} {path}"), selector)
    }

    async fn hover(&self, selector: &str) -> Result<(), DriverError> {
        self.element(format!("hover {selector}"), selector)
    }

    async fn scroll(&self, direction: ScrollDirection, pixels: i64) -> Result<(), DriverError> {
        self.record(format!("scroll {direction} {pixels}"));
        Ok(())
    }

    async fn press_key(&self, key: &str, selector: Option<&str>) -> Result<(), DriverError> {
        match selector {
            Some(selector) => self.element(format!("press {key} {selector}"), selector),
            None => {
                self.record(format!("press {key}"));
                Ok(())
            }
        }
    }

    async fn wait_for(
        &self,
        selector: &str,
        timeout: Duration,
        state: WaitState,
    ) -> Result<(), DriverError> {
        self.element(
            format!("wait_for {selector} {}ms {state}", timeout.as_millis()),
            selector,
        )
    }

    async fn get_text(&self, selector: Option<&str>) -> Result<String, DriverError> {
        match selector {
            Some(selector) => {
                self.element(format!("text {selector}"), selector)?;
            }
            None => self.record("text page".to_string()),
        }
        Ok(self.page_text.clone())
    }

    async fn get_attribute(
        &self,
        selector: &str,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        self.element(format!("attribute {selector} {name}"), selector)?;
        Ok((name == "href").then(|| "https://example.com/".to_string()))
    }

    async fn screenshot(
        &self,
        filename: Option<&str>,
        _full_page: bool,
    ) -> Result<PathBuf, DriverError> {
        self.record(format!("screenshot {}", filename.unwrap_or("-")));
        Ok(PathBuf::from(DEFAULT_SCREENSHOT_DIR).join(screenshot_filename(filename, Utc::now())))
    }

    async fn find_by_description(&self, description: &str) -> Result<String, DriverError> {
        self.record(format!("find {description}"));
        if self.described.contains(description) {
            Ok(description_candidates(description)[1].clone())
        } else {
            Err(DriverError::NotFound(description.to_string()))
        }
    }

    async fn close(&self) {
        self.record("close".to_string());
    }
}

type FailureFactory = Box<dyn Fn() -> ModelError + Send + Sync>;

/// Chat backend that replays canned plans and records requests.
///
/// Plan requests pop from the queue and get an empty reply once it runs
/// out; final-answer requests always get the configured answer.
pub(crate) struct ScriptedBackend {
    plans: Mutex<VecDeque<String>>,
    final_answer: String,
    failures: HashMap<String, FailureFactory>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self {
            plans: Mutex::new(VecDeque::new()),
            final_answer: String::new(),
            failures: HashMap::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_plans<I, S>(self, plans: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.plans
            .lock()
            .unwrap()
            .extend(plans.into_iter().map(Into::into));
        self
    }

    pub(crate) fn with_final_answer(mut self, answer: &str) -> Self {
        self.final_answer = answer.to_string();
        self
    }

    /// Every request to `model` fails with the error `make` builds.
    pub(crate) fn failing_model<F>(mut self, model: &str, make: F) -> Self
    where
        F: Fn() -> ModelError + Send + Sync + 'static,
    {
        self.failures.insert(model.to_string(), Box::new(make));
        self
    }

    pub(crate) fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn chat(&self, request: &ChatRequest) -> Result<String, ModelError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(make) = self.failures.get(&request.model) {
            return Err(make());
        }
        if request.temperature == CompletionMode::FinalAnswer.temperature() {
            return Ok(self.final_answer.clone());
        }
        Ok(self.plans.lock().unwrap().pop_front().unwrap_or_default())
    }
}
