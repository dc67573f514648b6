//! Completion heuristics as configurable data.
//!
//! These rules decide when a session may stop without an explicit
//! `goal_achieved`. They are plain substring matches on the goal text, so
//! they are kept here where callers can tune them.

/// Goal keywords that make a successful text capture complete the session.
pub const DEFAULT_INFO_KEYWORDS: &[&str] = &[
    "search",
    "find",
    "get",
    "what",
    "weather",
    "price",
    "information",
];

/// Consecutive actions of one type that force termination.
pub const DEFAULT_REPEAT_LIMIT: u32 = 3;

/// Rules for automatic completion and loop breaking.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionPolicy {
    /// Lowercase keywords marking an information-retrieval goal.
    pub info_keywords: Vec<String>,
    /// Lowercase keyword marking a screenshot goal.
    pub screenshot_keyword: String,
    /// Opening and closing marker of a placeholder summary like `[price]`.
    pub placeholder_markers: (char, char),
    /// Same-type actions in a row that end the session.
    pub repeat_limit: u32,
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self {
            info_keywords: DEFAULT_INFO_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            screenshot_keyword: "screenshot".to_string(),
            placeholder_markers: ('[', ']'),
            repeat_limit: DEFAULT_REPEAT_LIMIT,
        }
    }
}

impl CompletionPolicy {
    /// Replace the information keywords. Empty input keeps the defaults.
    pub fn with_info_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        if !keywords.is_empty() {
            self.info_keywords = keywords;
        }
        self
    }

    pub fn with_repeat_limit(mut self, repeat_limit: u32) -> Self {
        self.repeat_limit = repeat_limit;
        self
    }

    pub fn is_information_goal(&self, goal: &str) -> bool {
        let goal = goal.to_lowercase();
        self.info_keywords.iter().any(|k| goal.contains(k.as_str()))
    }

    pub fn is_screenshot_goal(&self, goal: &str) -> bool {
        goal.to_lowercase().contains(&self.screenshot_keyword)
    }

    /// Whether a summary looks like an unfilled template.
    pub fn is_placeholder(&self, summary: &str) -> bool {
        let (open, close) = self.placeholder_markers;
        summary.contains(open) && summary.contains(close)
    }
}
