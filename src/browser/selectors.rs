//! Selector parsing and the page-side scripts built from selectors.
//!
//! Three selector forms are accepted:
//! - `text=Sign in`: the innermost element whose normalized text contains the needle
//! - `xpath=//button[1]` (or any selector starting with `//`): raw XPath
//! - anything else: CSS

use serde_json::Value;

/// Labels of buttons that usually dismiss cookie or consent popups.
pub const CONSENT_BUTTON_LABELS: &[&str] = &[
    "Accept",
    "Accept All",
    "Accept all",
    "I Accept",
    "OK",
    "Got it",
    "Reject",
    "Reject all",
    "Decline",
];

/// CSS selectors of well-known consent buttons.
pub const CONSENT_SELECTORS: &[&str] = &[
    "button[id*=\"accept\"]",
    "button[class*=\"accept\"]",
    "#L2AGLb",
];

/// A parsed selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Css(String),
    XPath(String),
}

impl Selector {
    /// Parse the selector forms understood by the driver.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Some(needle) = trimmed.strip_prefix("text=") {
            return Self::XPath(xpath_contains_text(strip_quotes(needle)));
        }
        if let Some(xpath) = trimmed.strip_prefix("xpath=") {
            return Self::XPath(xpath.to_string());
        }
        if trimmed.starts_with("//") || trimmed.starts_with("(//") {
            return Self::XPath(trimmed.to_string());
        }
        Self::Css(trimmed.to_string())
    }

    /// JavaScript expression that evaluates to the first matching node or `null`.
    pub fn lookup_expression(&self) -> String {
        match self {
            Self::Css(css) => format!("document.querySelector({})", js_string(css)),
            Self::XPath(xpath) => format!(
                "document.evaluate({}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
                js_string(xpath)
            ),
        }
    }

    /// Script reporting the element state as a number: `-1` invalid
    /// selector, `0` absent, `1` present but hidden, `2` visible.
    pub fn state_probe_script(&self) -> String {
        format!(
            r#"(() => {{
  let el;
  try {{ el = {lookup}; }} catch (e) {{ return -1; }}
  if (!el) return 0;
  const style = window.getComputedStyle(el);
  const rect = el.getBoundingClientRect();
  const visible = style.display !== 'none' && style.visibility !== 'hidden'
    && rect.width > 0 && rect.height > 0;
  return visible ? 2 : 1;
}})()"#,
            lookup = self.lookup_expression()
        )
    }
}

/// Element state decoded from [`Selector::state_probe_script`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Invalid,
    Absent,
    Hidden,
    Visible,
}

impl ProbeState {
    pub fn from_value(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_i64) {
            Some(2) => Self::Visible,
            Some(1) => Self::Hidden,
            Some(0) => Self::Absent,
            _ => Self::Invalid,
        }
    }

    pub fn present(self) -> bool {
        matches!(self, Self::Hidden | Self::Visible)
    }

    pub fn visible(self) -> bool {
        self == Self::Visible
    }
}

/// Candidate selectors for a human description, in the order they are tried.
pub fn description_candidates(description: &str) -> Vec<String> {
    let escaped = css_attr_escape(description);
    vec![
        format!("text={description}"),
        format!("[aria-label*=\"{escaped}\"]"),
        format!("[title*=\"{escaped}\"]"),
        format!("[placeholder*=\"{escaped}\"]"),
    ]
}

/// Script that clicks the first visible consent button and returns its
/// label, or an empty string when there is none.
pub fn consent_probe_script() -> String {
    let labels: Vec<String> = CONSENT_BUTTON_LABELS
        .iter()
        .map(|label| label.to_lowercase())
        .collect();
    let labels = serde_json::to_string(&labels).unwrap_or_else(|_| "[]".to_string());
    let selectors =
        serde_json::to_string(CONSENT_SELECTORS).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"(() => {{
  const isVisible = (el) => {{
    const style = window.getComputedStyle(el);
    const rect = el.getBoundingClientRect();
    return style.display !== 'none' && style.visibility !== 'hidden' && rect.width > 0 && rect.height > 0;
  }};
  const labels = {labels};
  const buttons = Array.from(document.querySelectorAll('button, [role="button"], input[type="button"], input[type="submit"]'));
  for (const label of labels) {{
    const match = buttons.find((b) => isVisible(b)
      && (b.innerText || b.value || '').trim().toLowerCase() === label);
    if (match) {{ match.click(); return label; }}
  }}
  for (const selector of {selectors}) {{
    const el = document.querySelector(selector);
    if (el && isVisible(el)) {{ el.click(); return selector; }}
  }}
  return '';
}})()"#
    )
}

/// XPath matching the innermost element whose text contains `text`.
pub fn xpath_contains_text(text: &str) -> String {
    let literal = xpath_literal(text);
    format!(
        "//*[contains(normalize-space(.), {literal}) and not(.//*[contains(normalize-space(.), {literal})])]"
    )
}

/// Quote `input` as an XPath string literal, using `concat()` when it
/// contains both quote kinds.
pub fn xpath_literal(input: &str) -> String {
    if !input.contains('"') {
        return format!("\"{input}\"");
    }
    if !input.contains('\'') {
        return format!("'{input}'");
    }

    let parts: Vec<String> = input
        .split('"')
        .map(|part| format!("\"{part}\""))
        .collect();
    format!("concat({})", parts.join(", '\"', "))
}

/// Escape a value for use inside a double-quoted CSS attribute selector.
pub fn css_attr_escape(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', " ")
}

fn strip_quotes(needle: &str) -> &str {
    let trimmed = needle.trim();
    for quote in ['"', '\''] {
        if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return &trimmed[1..trimmed.len() - 1];
        }
    }
    trimmed
}

fn js_string(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_css_selector() {
        assert_eq!(
            Selector::parse("  #login-form input[name='q'] "),
            Selector::Css("#login-form input[name='q']".to_string())
        );
    }

    #[test]
    fn test_parse_text_selector() {
        let Selector::XPath(xpath) = Selector::parse("text=Sign in") else {
            panic!("expected xpath");
        };
        assert!(xpath.contains("contains(normalize-space(.), \"Sign in\")"));

        // Quoted needles lose their quotes
        assert_eq!(Selector::parse("text=\"Sign in\""), Selector::parse("text=Sign in"));
    }

    #[test]
    fn test_parse_xpath_selector() {
        assert_eq!(
            Selector::parse("xpath=//button[1]"),
            Selector::XPath("//button[1]".to_string())
        );
        assert_eq!(
            Selector::parse("//a[@href]"),
            Selector::XPath("//a[@href]".to_string())
        );
    }

    #[test]
    fn test_xpath_literal_quoting() {
        assert_eq!(xpath_literal("plain"), "\"plain\"");
        assert_eq!(xpath_literal("say \"hi\""), "'say \"hi\"'");
        assert_eq!(
            xpath_literal("it's \"x\""),
            "concat(\"it's \", '\"', \"x\", '\"', \"\")"
        );
    }

    #[test]
    fn test_description_candidates_order_and_escaping() {
        let candidates = description_candidates("Search \"box\"");
        assert_eq!(candidates.len(), 4);
        assert_eq!(candidates[0], "text=Search \"box\"");
        assert_eq!(candidates[1], "[aria-label*=\"Search \\\"box\\\"\"]");
        assert!(candidates[2].starts_with("[title*="));
        assert!(candidates[3].starts_with("[placeholder*="));
    }

    #[test]
    fn test_lookup_expression_escapes_selector() {
        let expr = Selector::Css("a[title=\"x\"]".to_string()).lookup_expression();
        assert_eq!(expr, "document.querySelector(\"a[title=\\\"x\\\"]\")");
    }

    #[test]
    fn test_probe_state_decoding() {
        assert_eq!(ProbeState::from_value(Some(&Value::from(2))), ProbeState::Visible);
        assert_eq!(ProbeState::from_value(Some(&Value::from(1))), ProbeState::Hidden);
        assert_eq!(ProbeState::from_value(Some(&Value::from(0))), ProbeState::Absent);
        assert_eq!(ProbeState::from_value(None), ProbeState::Invalid);
        assert!(ProbeState::Hidden.present());
        assert!(!ProbeState::Hidden.visible());
    }

    #[test]
    fn test_consent_script_mentions_known_buttons() {
        let script = consent_probe_script();
        assert!(script.contains("\"accept all\""));
        assert!(script.contains("#L2AGLb"));
    }
}
