//! Validation rules and output shapes
//!
//! Rules are stored the way they are written: a kind plus an untyped parameter
//! map. `process::validate` compiles them into typed checks.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Rule dispatch kind
///
/// Unknown kinds are kept verbatim so the validation engine can report them as skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleKind {
    SumCheck,
    RequiredFields,
    RangeCheck,
    Other(String),
}

impl From<String> for RuleKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "sum_check" => RuleKind::SumCheck,
            "required" | "required_fields" => RuleKind::RequiredFields,
            "range_check" => RuleKind::RangeCheck,
            _ => RuleKind::Other(s),
        }
    }
}

impl From<RuleKind> for String {
    fn from(kind: RuleKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::SumCheck => write!(f, "sum_check"),
            RuleKind::RequiredFields => write!(f, "required"),
            RuleKind::RangeCheck => write!(f, "range_check"),
            RuleKind::Other(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Error,
    Warning,
}

/// A declarative check run against merged output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RuleKind,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub severity: Severity,
}

impl ValidationRule {
    pub fn new(id: impl Into<String>, kind: RuleKind, params: Value) -> Self {
        let id = id.into();
        let params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            name: id.clone(),
            id,
            kind,
            params,
            severity: Severity::Error,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn warning(mut self) -> Self {
        self.severity = Severity::Warning;
        self
    }

    /// Display name, falling back to the id
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Declarative structural validator for merged output (a JSON Schema document)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputShape {
    #[serde(default)]
    pub name: Option<String>,
    pub schema: Value,
}

impl OutputShape {
    pub fn new(schema: Value) -> Self {
        Self { name: None, schema }
    }

    pub fn named(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: Some(name.into()),
            schema,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rule_parses_from_config_json() {
        let rule: ValidationRule = serde_json::from_value(json!({
            "id": "totals",
            "name": "Totals add up",
            "type": "sum_check",
            "params": { "expected": "total", "operands": ["a", "-b"] },
            "severity": "warning"
        }))
        .unwrap();

        assert_eq!(rule.kind, RuleKind::SumCheck);
        assert_eq!(rule.severity, Severity::Warning);
        assert_eq!(rule.params["expected"], json!("total"));
        assert_eq!(rule.label(), "Totals add up");
    }

    #[test]
    fn unknown_kind_is_kept_verbatim() {
        let rule: ValidationRule = serde_json::from_value(json!({
            "id": "x",
            "type": "regex_match"
        }))
        .unwrap();
        assert_eq!(rule.kind, RuleKind::Other("regex_match".to_string()));
        assert_eq!(rule.severity, Severity::Error);
        assert_eq!(rule.label(), "x");
    }

    #[test]
    fn required_alias() {
        let kind: RuleKind = serde_json::from_str("\"required_fields\"").unwrap();
        assert_eq!(kind, RuleKind::RequiredFields);
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"required\"");
    }
}
