//! Chrome implementation of [`BrowserDriver`] on top of `headless_chrome`.
//!
//! `headless_chrome` is a blocking API, so every operation runs on the
//! blocking pool with a clone of the tab handle.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::protocol::cdp::{Page, DOM};
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use serde_json::{json, Value};

use super::driver::{
    BrowserDriver, DriverError, NavigationInfo, ScrollDirection, WaitState, WaitUntil,
};
use super::screenshot::{save_png, screenshot_filename, DEFAULT_SCREENSHOT_DIR};
use super::selectors::{consent_probe_script, description_candidates, ProbeState, Selector};

/// Browser window size.
pub const WINDOW_SIZE: (u32, u32) = (1920, 1080);

/// Desktop user agent presented to sites.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Default timeout for element operations.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Default timeout for navigations.
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_millis(60_000);

const CONSENT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const DESCRIPTION_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const NETWORK_IDLE_QUIET: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(3600);

const NAVIGATION_STATUS_JS: &str = "(() => { \
    const entry = performance.getEntriesByType('navigation')[0]; \
    return entry && entry.responseStatus ? entry.responseStatus : 0; })()";

const PAGE_TEXT_JS: &str = "document.body ? document.body.innerText : ''";

const CLEAR_VALUE_JS: &str = "function () { if ('value' in this) { this.value = ''; } }";

const FOCUS_JS: &str = "function () { this.focus(); }";

const CHECKED_JS: &str = "function () { return !!this.checked; }";

const GET_ATTRIBUTE_JS: &str = "function (name) { return this.getAttribute(name); }";

const SELECT_OPTION_JS: &str = r#"function (value) {
  const options = Array.from(this.options || []);
  const match = options.find((o) => o.value === value)
    || options.find((o) => o.label === value || o.text.trim() === value);
  if (!match) return false;
  this.value = match.value;
  this.dispatchEvent(new Event('input', { bubbles: true }));
  this.dispatchEvent(new Event('change', { bubbles: true }));
  return true;
}"#;

const PAGE_SIZE_JS: &str = "(() => { const d = document.documentElement; \
    return JSON.stringify({ w: d.scrollWidth, h: d.scrollHeight }); })()";

/// Launch and timing options for [`ChromeDriver`].
#[derive(Debug, Clone)]
pub struct ChromeOptions {
    /// Run without a visible window.
    pub headless: bool,
    /// Upper bound for element waits.
    pub action_timeout: Duration,
    /// Upper bound for navigations.
    pub navigation_timeout: Duration,
    /// Directory screenshots are written to.
    pub screenshot_dir: PathBuf,
    /// Try to dismiss cookie/consent popups after each navigation.
    pub dismiss_consent: bool,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            headless: false,
            action_timeout: DEFAULT_ACTION_TIMEOUT,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            screenshot_dir: PathBuf::from(DEFAULT_SCREENSHOT_DIR),
            dismiss_consent: true,
        }
    }
}

impl ChromeOptions {
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub fn with_screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = dir.into();
        self
    }
}

/// A Chrome session owned by one agent run.
pub struct ChromeDriver {
    options: ChromeOptions,
    browser: Mutex<Option<Browser>>,
    tab: Mutex<Option<Arc<Tab>>>,
}

impl ChromeDriver {
    /// Start Chrome and open the working tab.
    pub async fn launch(options: ChromeOptions) -> Result<Self, DriverError> {
        let launch_options = options.clone();
        let (browser, tab) = tokio::task::spawn_blocking(move || open_browser(&launch_options))
            .await
            .map_err(|e| DriverError::Launch(format!("launch task failed: {e}")))??;

        tracing::info!(headless = options.headless, "Chrome launched");

        Ok(Self {
            options,
            browser: Mutex::new(Some(browser)),
            tab: Mutex::new(Some(tab)),
        })
    }

    /// Options this session was launched with.
    pub fn options(&self) -> &ChromeOptions {
        &self.options
    }

    fn tab(&self) -> Result<Arc<Tab>, DriverError> {
        self.tab
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(DriverError::Closed)
    }

    async fn run<T, F>(&self, op: F) -> Result<T, DriverError>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T, DriverError> + Send + 'static,
    {
        let tab = self.tab()?;
        tokio::task::spawn_blocking(move || op(&tab))
            .await
            .map_err(|e| DriverError::Operation(format!("browser task failed: {e}")))?
    }
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn navigate(
        &self,
        url: &str,
        wait_until: WaitUntil,
    ) -> Result<NavigationInfo, DriverError> {
        let url = url.to_string();
        let action_timeout = self.options.action_timeout;
        let navigation_timeout = self.options.navigation_timeout;
        let dismiss = self.options.dismiss_consent;

        self.run(move |tab| {
            let target = format!("navigation to {url}");
            tab.navigate_to(&url)
                .map_err(|e| classify(e, &target, navigation_timeout))?;

            tab.set_default_timeout(navigation_timeout);
            let navigated = tab.wait_until_navigated().map(|_| ());
            tab.set_default_timeout(action_timeout);
            navigated.map_err(|e| classify(e, &target, navigation_timeout))?;

            wait_for_lifecycle(tab, wait_until, navigation_timeout, &target)?;

            let http_status = evaluate(tab, NAVIGATION_STATUS_JS)
                .ok()
                .flatten()
                .and_then(|v| v.as_u64())
                .and_then(|status| u16::try_from(status).ok())
                .filter(|status| *status > 0);

            if dismiss {
                dismiss_consent(tab);
            }

            Ok(NavigationInfo {
                url: tab.get_url(),
                http_status,
            })
        })
        .await
    }

    async fn click(&self, selector: &str) -> Result<(), DriverError> {
        let selector = selector.to_string();
        let timeout = self.options.action_timeout;
        self.run(move |tab| {
            find_element(tab, &selector, timeout)?
                .click()
                .map_err(|e| classify(e, &selector, timeout))?;
            Ok(())
        })
        .await
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<(), DriverError> {
        let selector = selector.to_string();
        let text = text.to_string();
        let timeout = self.options.action_timeout;
        self.run(move |tab| {
            let element = find_element(tab, &selector, timeout)?;
            let _ = element.call_js_fn(CLEAR_VALUE_JS, vec![], false);
            element
                .type_into(&text)
                .map_err(|e| classify(e, &selector, timeout))?;
            Ok(())
        })
        .await
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<(), DriverError> {
        let selector = selector.to_string();
        let value = value.to_string();
        let timeout = self.options.action_timeout;
        self.run(move |tab| {
            let element = find_element(tab, &selector, timeout)?;
            let selected = element
                .call_js_fn(SELECT_OPTION_JS, vec![json!(value)], false)
                .map_err(|e| classify(e, &selector, timeout))?
                .value
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            if selected {
                Ok(())
            } else {
                Err(DriverError::NotFound(format!(
                    "option '{value}' in '{selector}'"
                )))
            }
        })
        .await
    }

    async fn set_checkbox(&self, selector: &str, checked: bool) -> Result<(), DriverError> {
        let selector = selector.to_string();
        let timeout = self.options.action_timeout;
        self.run(move |tab| {
            let element = find_element(tab, &selector, timeout)?;
            if element_checked(&element)? != checked {
                element
                    .click()
                    .map_err(|e| classify(e, &selector, timeout))?;
            }
            if element_checked(&element)? == checked {
                Ok(())
            } else {
                Err(DriverError::Operation(format!(
                    "checkbox '{selector}' did not change state"
                )))
            }
        })
        .await
    }

    async fn upload_file(&self, selector: &str, path: &str) -> Result<(), DriverError> {
        if !Path::new(path).exists() {
            return Err(DriverError::InvalidArgument(format!(
                "file does not exist: {path}"
            )));
        }

        let selector = selector.to_string();
        let path = path.to_string();
        let timeout = self.options.action_timeout;
        self.run(move |tab| {
            let element = find_element(tab, &selector, timeout)?;
            tab.call_method(DOM::SetFileInputFiles {
                files: vec![path],
                node_id: None,
                backend_node_id: None,
                object_id: Some(element.remote_object_id.clone()),
            })
            .map_err(|e| classify(e, &selector, timeout))?;
            Ok(())
        })
        .await
    }

    async fn hover(&self, selector: &str) -> Result<(), DriverError> {
        let selector = selector.to_string();
        let timeout = self.options.action_timeout;
        self.run(move |tab| {
            find_element(tab, &selector, timeout)?
                .move_mouse_over()
                .map_err(|e| classify(e, &selector, timeout))?;
            Ok(())
        })
        .await
    }

    async fn scroll(&self, direction: ScrollDirection, pixels: i64) -> Result<(), DriverError> {
        let (dx, dy) = direction.offsets(pixels);
        self.run(move |tab| {
            evaluate(tab, &format!("window.scrollBy({dx}, {dy})"))?;
            Ok(())
        })
        .await
    }

    async fn press_key(&self, key: &str, selector: Option<&str>) -> Result<(), DriverError> {
        let key = key.to_string();
        let selector = selector.map(str::to_string);
        let timeout = self.options.action_timeout;
        self.run(move |tab| {
            if let Some(selector) = &selector {
                find_element(tab, selector, timeout)?
                    .call_js_fn(FOCUS_JS, vec![], false)
                    .map_err(|e| classify(e, selector, timeout))?;
            }
            tab.press_key(&key)
                .map_err(|e| DriverError::Operation(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn wait_for(
        &self,
        selector: &str,
        timeout: Duration,
        state: WaitState,
    ) -> Result<(), DriverError> {
        let selector = selector.to_string();
        self.run(move |tab| {
            let parsed = Selector::parse(&selector);
            let deadline = Instant::now() + timeout;
            loop {
                match probe(tab, &parsed) {
                    ProbeState::Invalid => {
                        return Err(DriverError::InvalidArgument(format!(
                            "invalid selector '{selector}'"
                        )))
                    }
                    probed if state.is_satisfied(probed.present(), probed.visible()) => {
                        return Ok(())
                    }
                    _ => {}
                }
                if Instant::now() >= deadline {
                    return Err(DriverError::timeout(selector, timeout));
                }
                thread::sleep(POLL_INTERVAL);
            }
        })
        .await
    }

    async fn get_text(&self, selector: Option<&str>) -> Result<String, DriverError> {
        let selector = selector.map(str::to_string);
        let timeout = self.options.action_timeout;
        self.run(move |tab| match &selector {
            Some(selector) => find_element(tab, selector, timeout)?
                .get_inner_text()
                .map_err(|e| classify(e, selector, timeout)),
            None => Ok(evaluate(tab, PAGE_TEXT_JS)?
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default()),
        })
        .await
    }

    async fn get_attribute(
        &self,
        selector: &str,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let selector = selector.to_string();
        let name = name.to_string();
        let timeout = self.options.action_timeout;
        self.run(move |tab| {
            let element = find_element(tab, &selector, timeout)?;
            if name.eq_ignore_ascii_case("innertext") {
                return element
                    .get_inner_text()
                    .map(Some)
                    .map_err(|e| classify(e, &selector, timeout));
            }
            let value = element
                .call_js_fn(GET_ATTRIBUTE_JS, vec![json!(name)], false)
                .map_err(|e| classify(e, &selector, timeout))?
                .value;
            Ok(match value {
                Some(Value::String(s)) => Some(s),
                _ => None,
            })
        })
        .await
    }

    async fn screenshot(
        &self,
        filename: Option<&str>,
        full_page: bool,
    ) -> Result<PathBuf, DriverError> {
        let filename = screenshot_filename(filename, Utc::now());
        let dir = self.options.screenshot_dir.clone();
        self.run(move |tab| {
            let clip = if full_page { page_clip(tab)? } else { None };
            let png = tab
                .capture_screenshot(CaptureScreenshotFormatOption::Png, None, clip, true)
                .map_err(|e| DriverError::Operation(e.to_string()))?;
            Ok(save_png(&dir, &filename, &png)?)
        })
        .await
    }

    async fn find_by_description(&self, description: &str) -> Result<String, DriverError> {
        let description = description.to_string();
        self.run(move |tab| {
            let candidates: Vec<(String, Selector)> = description_candidates(&description)
                .into_iter()
                .map(|raw| {
                    let parsed = Selector::parse(&raw);
                    (raw, parsed)
                })
                .collect();

            let deadline = Instant::now() + DESCRIPTION_PROBE_TIMEOUT;
            loop {
                for (raw, parsed) in &candidates {
                    if probe(tab, parsed).visible() {
                        return Ok(raw.clone());
                    }
                }
                if Instant::now() >= deadline {
                    return Err(DriverError::NotFound(description));
                }
                thread::sleep(POLL_INTERVAL);
            }
        })
        .await
    }

    async fn close(&self) {
        let tab = self
            .tab
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let browser = self
            .browser
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if tab.is_none() && browser.is_none() {
            return;
        }

        let closed = tokio::task::spawn_blocking(move || {
            if let Some(tab) = tab {
                let _ = tab.close(false);
            }
            drop(browser);
        })
        .await;

        match closed {
            Ok(()) => tracing::info!("Chrome closed"),
            Err(e) => tracing::warn!("Failed to close Chrome cleanly: {}", e),
        }
    }
}

fn open_browser(options: &ChromeOptions) -> Result<(Browser, Arc<Tab>), DriverError> {
    let launch = LaunchOptions {
        headless: options.headless,
        window_size: Some(WINDOW_SIZE),
        args: vec![
            OsStr::new("--no-first-run"),
            OsStr::new("--no-default-browser-check"),
            OsStr::new("--disable-blink-features=AutomationControlled"),
        ],
        idle_browser_timeout: IDLE_BROWSER_TIMEOUT,
        ..Default::default()
    };

    let browser = Browser::new(launch).map_err(|e| DriverError::Launch(e.to_string()))?;
    let tab = browser
        .new_tab()
        .map_err(|e| DriverError::Launch(e.to_string()))?;
    tab.set_default_timeout(options.action_timeout);
    tab.set_user_agent(USER_AGENT, None, None)
        .map_err(|e| DriverError::Launch(e.to_string()))?;

    Ok((browser, tab))
}

fn find_element<'a>(
    tab: &'a Tab,
    selector: &str,
    timeout: Duration,
) -> Result<Element<'a>, DriverError> {
    let found = match Selector::parse(selector) {
        Selector::Css(css) => tab.wait_for_element_with_custom_timeout(&css, timeout),
        Selector::XPath(xpath) => tab.wait_for_xpath_with_custom_timeout(&xpath, timeout),
    };
    found.map_err(|e| classify(e, selector, timeout))
}

fn element_checked(element: &Element<'_>) -> Result<bool, DriverError> {
    Ok(element
        .call_js_fn(CHECKED_JS, vec![], false)
        .map_err(|e| DriverError::Operation(e.to_string()))?
        .value
        .and_then(|v| v.as_bool())
        .unwrap_or(false))
}

fn evaluate(tab: &Tab, script: &str) -> Result<Option<Value>, DriverError> {
    tab.evaluate(script, false)
        .map(|remote| remote.value)
        .map_err(|e| DriverError::Operation(e.to_string()))
}

fn probe(tab: &Tab, selector: &Selector) -> ProbeState {
    match evaluate(tab, &selector.state_probe_script()) {
        Ok(value) => ProbeState::from_value(value.as_ref()),
        Err(_) => ProbeState::Invalid,
    }
}

fn wait_for_lifecycle(
    tab: &Tab,
    wait_until: WaitUntil,
    timeout: Duration,
    target: &str,
) -> Result<(), DriverError> {
    let deadline = Instant::now() + timeout;
    loop {
        let ready_state = evaluate(tab, "document.readyState")?
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();
        let reached = match wait_until {
            WaitUntil::DomContentLoaded => ready_state == "interactive" || ready_state == "complete",
            WaitUntil::Load | WaitUntil::NetworkIdle => ready_state == "complete",
        };
        if reached {
            break;
        }
        if Instant::now() >= deadline {
            return Err(DriverError::timeout(target, timeout));
        }
        thread::sleep(POLL_INTERVAL);
    }

    if wait_until == WaitUntil::NetworkIdle {
        thread::sleep(NETWORK_IDLE_QUIET);
    }
    Ok(())
}

fn dismiss_consent(tab: &Tab) {
    let script = consent_probe_script();
    let deadline = Instant::now() + CONSENT_PROBE_TIMEOUT;
    while Instant::now() < deadline {
        match evaluate(tab, &script) {
            Ok(Some(Value::String(label))) if !label.is_empty() => {
                tracing::info!("Dismissed consent popup via '{}'", label);
                thread::sleep(Duration::from_secs(1));
                return;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("Consent probe failed: {}", e);
                return;
            }
        }
        thread::sleep(POLL_INTERVAL * 2);
    }
    tracing::debug!("No consent popup found");
}

fn page_clip(tab: &Tab) -> Result<Option<Page::Viewport>, DriverError> {
    let size = evaluate(tab, PAGE_SIZE_JS)?
        .and_then(|v| v.as_str().map(String::from))
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok());

    Ok(size.and_then(|size| {
        let width = size.get("w")?.as_f64()?;
        let height = size.get("h")?.as_f64()?;
        Some(Page::Viewport {
            x: 0.0,
            y: 0.0,
            width,
            height,
            scale: 1.0,
        })
    }))
}

fn classify(err: anyhow::Error, target: &str, timeout: Duration) -> DriverError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") || lower.contains("never came") {
        DriverError::timeout(target, timeout)
    } else if lower.contains("no element") || lower.contains("couldnt find") {
        DriverError::NotFound(target.to_string())
    } else {
        DriverError::Operation(message)
    }
}
