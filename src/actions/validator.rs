//! Normalizes raw model output into action descriptors.
//!
//! Models wrap JSON in markdown fences, return a bare object instead of a
//! list, or use `action`/`type` instead of `action_type`. The validator
//! repairs those shapes and rejects anything it cannot make structurally
//! valid. It does not check action types or parameters.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use super::types::ActionDescriptor;

static JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```json\s*").expect("valid fence pattern"));

static BARE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```\s*").expect("valid fence pattern"));

/// Keys accepted in place of `action_type`, in priority order.
const ACTION_TYPE_ALIASES: [&str; 2] = ["action", "type"];

/// Plan validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Malformed action plan: {0}")]
    Malformed(String),
    #[error("Action at index {index} is not an object: {found}")]
    NotAnObject { index: usize, found: String },
    #[error("Action at index {index} has no 'action_type': {raw}")]
    MissingActionType { index: usize, raw: String },
    #[error("Action at index {index} has non-object 'parameters'")]
    InvalidParameters { index: usize },
}

/// Remove markdown code fences and surrounding whitespace.
pub fn strip_code_fences(raw: &str) -> String {
    let without_json = JSON_FENCE.replace_all(raw, "");
    BARE_FENCE.replace_all(&without_json, "").trim().to_string()
}

/// Parse and repair a raw action plan.
///
/// # Arguments
/// * `raw` - Model output, possibly fenced.
///
/// # Returns
/// The descriptors in the order the model gave them.
pub fn validate_plan(raw: &str) -> Result<Vec<ActionDescriptor>, ValidationError> {
    let cleaned = strip_code_fences(raw);
    let parsed: Value =
        serde_json::from_str(&cleaned).map_err(|e| ValidationError::Malformed(e.to_string()))?;

    let items = match parsed {
        Value::Array(items) => items,
        single => vec![single],
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| repair_action(index, item))
        .collect()
}

fn repair_action(index: usize, item: Value) -> Result<ActionDescriptor, ValidationError> {
    let mut object = match item {
        Value::Object(object) => object,
        other => {
            return Err(ValidationError::NotAnObject {
                index,
                found: other.to_string(),
            })
        }
    };

    let action_type = match object.remove("action_type") {
        Some(value) => value,
        None => {
            let promoted = ACTION_TYPE_ALIASES
                .iter()
                .find_map(|alias| object.remove(*alias).map(|value| (alias, value)));
            match promoted {
                Some((alias, value)) => {
                    tracing::warn!("Action {}: renamed '{}' to 'action_type'", index, alias);
                    value
                }
                None => {
                    return Err(ValidationError::MissingActionType {
                        index,
                        raw: Value::Object(object).to_string(),
                    })
                }
            }
        }
    };
    let action_type = match action_type {
        Value::String(name) => name,
        other => other.to_string(),
    };

    let parameters = match object.remove("parameters") {
        Some(Value::Object(parameters)) => parameters,
        Some(Value::Null) => Map::new(),
        Some(_) => return Err(ValidationError::InvalidParameters { index }),
        None => {
            if !object.is_empty() {
                tracing::warn!(
                    "Action {}: moved top-level keys into 'parameters' for '{}'",
                    index,
                    action_type
                );
            }
            object
        }
    };

    Ok(ActionDescriptor {
        action_type,
        parameters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("```\n{}\n```  "), "{}");
        assert_eq!(strip_code_fences("  plain  "), "plain");
    }

    #[test]
    fn test_fenced_list_is_parsed() {
        let raw = "```json\n[{\"action_type\": \"navigate\", \"parameters\": {\"url\": \"https://example.com\"}}]\n```";
        let plan = validate_plan(raw).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].action_type, "navigate");
        assert_eq!(plan[0].param_str("url"), Some("https://example.com"));
    }

    #[test]
    fn test_single_object_is_wrapped() {
        let plan = validate_plan(r#"{"action_type": "get_page_text_content", "parameters": {}}"#)
            .unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].action_type, "get_page_text_content");
        assert!(plan[0].parameters.is_empty());
    }

    #[test]
    fn test_legacy_action_key_and_flat_parameters() {
        let plan = validate_plan(r##"[{"action": "click_element", "selector": "#go"}]"##).unwrap();
        assert_eq!(
            plan[0],
            ActionDescriptor::new("click_element", json!({"selector": "#go"}))
        );
    }

    #[test]
    fn test_type_key_is_promoted() {
        let plan = validate_plan(r#"[{"type": "scroll_page", "direction": "down"}]"#).unwrap();
        assert_eq!(plan[0].action_type, "scroll_page");
        assert_eq!(plan[0].param_str("direction"), Some("down"));
    }

    #[test]
    fn test_action_key_wins_over_type() {
        let plan =
            validate_plan(r#"[{"action": "press_key", "type": "keyboard", "key": "Enter"}]"#)
                .unwrap();
        assert_eq!(plan[0].action_type, "press_key");
        assert_eq!(plan[0].param_str("type"), Some("keyboard"));
        assert_eq!(plan[0].param_str("key"), Some("Enter"));
    }

    #[test]
    fn test_explicit_parameters_are_kept() {
        let plan = validate_plan(
            r#"[{"action_type": "navigate", "parameters": {"url": "https://a.test"}, "note": "x"}]"#,
        )
        .unwrap();
        assert_eq!(plan[0].parameters.len(), 1);
        assert_eq!(plan[0].param_str("url"), Some("https://a.test"));
    }

    #[test]
    fn test_unknown_action_type_passes() {
        let plan = validate_plan(r#"[{"action_type": "teleport", "parameters": {}}]"#).unwrap();
        assert_eq!(plan[0].action_type, "teleport");
    }

    #[test]
    fn test_empty_list_is_valid() {
        assert!(validate_plan("[]").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            validate_plan("I think we should click the button"),
            Err(ValidationError::Malformed(_))
        ));
        assert!(matches!(validate_plan(""), Err(ValidationError::Malformed(_))));
    }

    #[test]
    fn test_non_object_element() {
        assert_eq!(
            validate_plan(r#"[{"action_type": "navigate", "url": "x"}, 42]"#),
            Err(ValidationError::NotAnObject {
                index: 1,
                found: "42".to_string()
            })
        );
    }

    #[test]
    fn test_missing_action_type() {
        assert!(matches!(
            validate_plan(r##"[{"selector": "#go"}]"##),
            Err(ValidationError::MissingActionType { index: 0, .. })
        ));
    }

    #[test]
    fn test_non_object_parameters() {
        assert_eq!(
            validate_plan(r#"{"action_type": "navigate", "parameters": "https://a.test"}"#),
            Err(ValidationError::InvalidParameters { index: 0 })
        );
        let plan = validate_plan(r#"{"action_type": "clarify", "parameters": null}"#).unwrap();
        assert!(plan[0].parameters.is_empty());
    }
}
