//! Quick highlights pulled from captured page text.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

const PRICE_KEYWORDS: &[&str] = &["stock", "price", "share", "nasdaq", "nyse", "trading"];
const WEATHER_KEYWORDS: &[&str] = &["weather", "temperature", "climate", "forecast"];
const INFO_KEYWORDS: &[&str] = &["search", "find", "get", "what", "information"];

const AMOUNT: &str = r"(\d{1,4}(?:,\d{3})*(?:\.\d{2})?)";

static PRICE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        format!(r"(?i)\$\s*{AMOUNT}"),
        format!(r"(?i)USD\s*{AMOUNT}"),
        r"(?i)(\d{1,4}(?:,\d{3})*\.\d{2})\s*USD".to_string(),
        format!(r"(?i)Price:\s*\$?{AMOUNT}"),
        format!(r"(?i)Current:\s*\$?{AMOUNT}"),
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid price pattern"))
    .collect()
});

static TEMPERATURE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(\d{1,3})°[CF]",
        r"(?i)(\d{1,3})\s*degrees",
        r"(?i)Temperature:\s*(\d{1,3})",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid temperature pattern"))
    .collect()
});

/// A highlight worth showing while a session runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageInsight {
    Price(String),
    Temperature(String),
    Snippet(String),
}

impl fmt::Display for PageInsight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Price(amount) => write!(f, "💰 Price found: ${amount}"),
            Self::Temperature(degrees) => write!(f, "🌡️ Temperature found: {degrees}°"),
            Self::Snippet(text) => write!(f, "📄 Information: {text}"),
        }
    }
}

fn first_capture(patterns: &[Regex], text: &str) -> Option<String> {
    patterns
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn mentions_any(goal: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| goal.contains(k))
}

/// Pick the highlight matching the kind of goal, if the text has one.
pub fn extract_insight(text: &str, goal: &str) -> Option<PageInsight> {
    let goal = goal.to_lowercase();

    if mentions_any(&goal, PRICE_KEYWORDS) {
        if let Some(amount) = first_capture(&PRICE_PATTERNS, text) {
            return Some(PageInsight::Price(amount));
        }
    }

    if mentions_any(&goal, WEATHER_KEYWORDS) {
        if let Some(degrees) = first_capture(&TEMPERATURE_PATTERNS, text) {
            return Some(PageInsight::Temperature(degrees));
        }
    }

    if mentions_any(&goal, INFO_KEYWORDS) {
        let line = text.lines().map(str::trim).find(|line| line.chars().count() > 10)?;
        let snippet: String = line.chars().take(100).collect();
        return Some(PageInsight::Snippet(format!("{snippet}...")));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_from_dollar_amount() {
        let text = "Apple Inc. (AAPL)\nLast trade $ 189.84 at close";
        assert_eq!(
            extract_insight(text, "What is the stock price of Apple?"),
            Some(PageInsight::Price("189.84".to_string()))
        );
    }

    #[test]
    fn test_price_from_usd_suffix() {
        let text = "Quote 1,234.50 USD";
        assert_eq!(
            extract_insight(text, "bitcoin price"),
            Some(PageInsight::Price("1,234.50".to_string()))
        );
    }

    #[test]
    fn test_temperature() {
        let text = "Paris\nSunny 21°C\nHumidity 40%";
        assert_eq!(
            extract_insight(text, "weather in Paris"),
            Some(PageInsight::Temperature("21".to_string()))
        );
        assert_eq!(
            extract_insight("It is 18 Degrees outside", "temperature now"),
            Some(PageInsight::Temperature("18".to_string()))
        );
    }

    #[test]
    fn test_snippet_skips_short_lines() {
        let text = "Menu\n  \n   Example Domain is for illustrative examples  \nmore";
        assert_eq!(
            extract_insight(text, "find out about example.com"),
            Some(PageInsight::Snippet(
                "Example Domain is for illustrative examples...".to_string()
            ))
        );
    }

    #[test]
    fn test_weather_goal_falls_through_to_nothing() {
        assert_eq!(extract_insight("no numbers here", "forecast"), None);
        assert_eq!(extract_insight("$5.00", "log in to my account"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            PageInsight::Price("10.00".to_string()).to_string(),
            "💰 Price found: $10.00"
        );
    }
}
