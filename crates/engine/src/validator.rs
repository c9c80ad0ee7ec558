//! Field-level validation of produced documents.
//!
//! Each field spec names a path into the document and a list of rules. Every
//! rule is evaluated and every violation is collected; nothing short-circuits.
//! Rule kinds the validator does not know are skipped.

use bindery_types::{FieldSpec, RuleKind, ValidationIssue, ValidationResult, ValidationRule};
use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::path::get_path;

/// Validate `document` against field specs keyed by path.
///
/// - `not_empty` fails on absent, `null`, blank strings and empty lists.
/// - `matches` checks strings only, anchored at the start of the value.
/// - `in_enum` fails when the field declares an enum that lacks the value.
/// - `min_length` fails unless the value is a list of at least `n` items.
pub fn validate_fields(fields: &IndexMap<String, FieldSpec>, document: &Value) -> ValidationResult {
    let mut issues = Vec::new();
    for (field, spec) in fields {
        let value = get_path(document, field);
        for rule in &spec.validators {
            if let Some(message) = check_rule(rule, spec, value.as_ref()) {
                issues.push(ValidationIssue::new(field, &rule.id, message));
            }
        }
    }
    ValidationResult::from_issues(issues)
}

fn check_rule(rule: &ValidationRule, spec: &FieldSpec, value: Option<&Value>) -> Option<String> {
    match rule.rule {
        RuleKind::NotEmpty => is_empty(value).then(|| "not_empty failed".to_string()),
        RuleKind::Matches => {
            let pattern = rule.params.pattern.as_deref().unwrap_or_default();
            let Some(Value::String(text)) = value else {
                return None;
            };
            if pattern.is_empty() {
                return None;
            }
            match Regex::new(&format!("^(?:{pattern})")) {
                Ok(regex) if regex.is_match(text) => None,
                Ok(_) => Some(format!("matches failed: {pattern}")),
                Err(error) => Some(format!("invalid pattern '{pattern}': {error}")),
            }
        }
        RuleKind::InEnum => {
            let candidate = value.unwrap_or(&Value::Null);
            let allowed = spec.enumeration.is_empty() || spec.enumeration.contains(candidate);
            (!allowed).then(|| format!("in_enum failed: {}", display_value(candidate)))
        }
        RuleKind::MinLength => {
            let n = rule.params.n.unwrap_or(0);
            match value {
                Some(Value::Array(items)) if items.len() >= n => None,
                _ => Some(format!("min_length failed: n={n}")),
            }
        }
        RuleKind::Unknown => {
            debug!(rule_id = %rule.id, "skipping unknown validation rule");
            None
        }
    }
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
