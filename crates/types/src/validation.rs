//! Field-level validation rules and results.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One declarative rule attached to a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default = "default_rule_id")]
    pub id: String,
    #[serde(default)]
    pub rule: RuleKind,
    #[serde(default)]
    pub params: RuleParams,
}

fn default_rule_id() -> String {
    "VAL-UNKNOWN".to_string()
}

/// Rule kinds understood by the validator. Anything else deserializes to
/// [`RuleKind::Unknown`] and is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    NotEmpty,
    Matches,
    InEnum,
    MinLength,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleParams {
    /// Regular expression for `matches`.
    #[serde(default)]
    pub pattern: Option<String>,
    /// Minimum list length for `min_length`.
    #[serde(default)]
    pub n: Option<usize>,
}

/// A single rule violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Path of the offending field.
    pub field: String,
    pub rule_id: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, rule_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            rule_id: rule_id.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}: {} ({})", self.field, self.message, self.rule_id)
    }
}

/// Outcome of validating a document: every violation found in one pass.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub ok: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        Self {
            ok: issues.is_empty(),
            issues,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognised_rule_kinds_become_unknown() {
        let rules: Vec<ValidationRule> = serde_yaml::from_str(
            r#"
- id: VAL-1
  rule: not_empty
- rule: max_words
  params: { n: 3 }
"#,
        )
        .expect("rules parse");

        assert_eq!(rules[0].rule, RuleKind::NotEmpty);
        assert_eq!(rules[1].rule, RuleKind::Unknown);
        assert_eq!(rules[1].id, "VAL-UNKNOWN");
        assert_eq!(rules[1].params.n, Some(3));
    }

    #[test]
    fn result_is_ok_only_without_issues() {
        assert!(ValidationResult::from_issues(Vec::new()).ok);
        let result = ValidationResult::from_issues(vec![ValidationIssue::new("x", "VAL-1", "not_empty failed")]);
        assert!(!result.ok);
        assert_eq!(result.issues[0].to_string(), "x: not_empty failed (VAL-1)");
    }
}
