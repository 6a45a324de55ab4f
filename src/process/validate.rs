//! ValidationEngine - grade merged output against a shape and declarative rules
//!
//! Rule params are compiled once, when an execution initializes. Malformed
//! params are a configuration error, so a bad rule fails fast instead of
//! silently skipping at validation time.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::path::lookup;
use super::shape::ShapeValidator;
use crate::ast::{OutputShape, RuleKind, Severity, ValidationRule};
use crate::error::{EngineError, Result};

/// Check name recorded for the output-shape check
pub const SHAPE_CHECK_NAME: &str = "shape_validation";

const ERROR_PENALTY: i64 = 15;
const WARNING_PENALTY: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationStatus {
    Pass,
    Review,
    Fail,
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationStatus::Pass => write!(f, "PASS"),
            ValidationStatus::Review => write!(f, "REVIEW"),
            ValidationStatus::Fail => write!(f, "FAIL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passed,
    Failed,
    Skipped,
}

/// Outcome of one check, in rule order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    pub status: CheckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CheckOutcome {
    fn passed(name: &str, rule_id: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            rule_id: rule_id.map(str::to_string),
            status: CheckStatus::Passed,
            error: None,
            reason: None,
        }
    }

    fn failed(name: &str, rule_id: Option<&str>, error: String) -> Self {
        Self {
            status: CheckStatus::Failed,
            error: Some(error),
            ..Self::passed(name, rule_id)
        }
    }

    fn skipped(name: &str, rule_id: Option<&str>, reason: String) -> Self {
        Self {
            status: CheckStatus::Skipped,
            reason: Some(reason),
            ..Self::passed(name, rule_id)
        }
    }
}

/// Graded result of one validation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub quality_score: u8,
    pub checks: Vec<CheckOutcome>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    fn grade(checks: Vec<CheckOutcome>, errors: Vec<String>, warnings: Vec<String>) -> Self {
        let score = 100
            - ERROR_PENALTY * errors.len() as i64
            - WARNING_PENALTY * warnings.len() as i64;
        let status = if !errors.is_empty() {
            ValidationStatus::Fail
        } else if !warnings.is_empty() {
            ValidationStatus::Review
        } else {
            ValidationStatus::Pass
        };
        Self {
            status,
            quality_score: score.clamp(0, 100) as u8,
            checks,
            errors,
            warnings,
        }
    }

    pub fn is_fail(&self) -> bool {
        self.status == ValidationStatus::Fail
    }
}

/// SumCheck operand: a dotted path, subtracted when written with a leading `-`
#[derive(Debug, Clone, PartialEq)]
struct Operand {
    path: String,
    negate: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Check {
    Sum {
        expected: String,
        operands: Vec<Operand>,
    },
    Required {
        fields: Vec<String>,
    },
    Range {
        field: String,
        min: Option<Number>,
        max: Option<Number>,
    },
    Unsupported {
        kind: String,
    },
}

#[derive(Debug, Clone)]
struct CompiledRule {
    id: String,
    name: String,
    severity: Severity,
    check: Check,
}

impl CompiledRule {
    fn compile(rule: &ValidationRule) -> Result<Self> {
        let invalid = |reason: &str| EngineError::InvalidRule {
            rule_id: rule.id.clone(),
            reason: reason.to_string(),
        };
        let params = &rule.params;

        let check = match &rule.kind {
            RuleKind::SumCheck => {
                let expected = params
                    .get("expected")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid("'expected' must be a field path"))?
                    .to_string();
                let operands = string_list(params, "operands")
                    .ok_or_else(|| invalid("'operands' must be a list of field paths"))?
                    .into_iter()
                    .map(|op| {
                        let negate = op.starts_with('-');
                        let path = if negate { op[1..].to_string() } else { op };
                        Operand { path, negate }
                    })
                    .collect();
                Check::Sum { expected, operands }
            }
            RuleKind::RequiredFields => Check::Required {
                fields: string_list(params, "fields")
                    .ok_or_else(|| invalid("'fields' must be a list of field paths"))?,
            },
            RuleKind::RangeCheck => {
                let field = params
                    .get("field")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid("'field' must be a field path"))?
                    .to_string();
                let bound = |key: &str| -> Result<Option<Number>> {
                    match params.get(key) {
                        None | Some(Value::Null) => Ok(None),
                        Some(Value::Number(n)) => Ok(Some(n.clone())),
                        Some(_) => Err(invalid(&format!("'{}' must be a number", key))),
                    }
                };
                Check::Range {
                    field,
                    min: bound("min")?,
                    max: bound("max")?,
                }
            }
            RuleKind::Other(kind) => Check::Unsupported { kind: kind.clone() },
        };

        Ok(Self {
            id: rule.id.clone(),
            name: rule.label().to_string(),
            severity: rule.severity,
            check,
        })
    }

    fn run(&self, data: &Map<String, Value>) -> CheckOutcome {
        let (name, id) = (self.name.as_str(), Some(self.id.as_str()));
        match &self.check {
            Check::Sum { expected, operands } => match sum_check(data, expected, operands) {
                Ok(()) => CheckOutcome::passed(name, id),
                Err(msg) => CheckOutcome::failed(name, id, msg),
            },
            Check::Required { fields } => {
                let missing: Vec<&str> = fields
                    .iter()
                    .filter(|f| matches!(lookup(data, f), None | Some(Value::Null)))
                    .map(String::as_str)
                    .collect();
                if missing.is_empty() {
                    CheckOutcome::passed(name, id)
                } else {
                    CheckOutcome::failed(name, id, format!("Missing fields: {}", missing.join(", ")))
                }
            }
            Check::Range { field, min, max } => {
                let value = match lookup(data, field) {
                    None | Some(Value::Null) => {
                        return CheckOutcome::skipped(name, id, "Field not found".to_string())
                    }
                    Some(v) => v,
                };
                let Some(n) = value.as_f64() else {
                    return CheckOutcome::failed(name, id, format!("Value {} is not numeric", value));
                };
                let below = min.as_ref().and_then(Number::as_f64).is_some_and(|m| n < m);
                let above = max.as_ref().and_then(Number::as_f64).is_some_and(|m| n > m);
                if below || above {
                    CheckOutcome::failed(
                        name,
                        id,
                        format!(
                            "Value {} outside range [{}, {}]",
                            value,
                            show_bound(min),
                            show_bound(max)
                        ),
                    )
                } else {
                    CheckOutcome::passed(name, id)
                }
            }
            Check::Unsupported { kind } => {
                CheckOutcome::skipped(name, id, format!("Unknown rule type: {}", kind))
            }
        }
    }
}

fn string_list(params: &Map<String, Value>, key: &str) -> Option<Vec<String>> {
    match params.get(key) {
        None | Some(Value::Null) => Some(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(_) => None,
    }
}

fn show_bound(bound: &Option<Number>) -> String {
    bound
        .as_ref()
        .map(Number::to_string)
        .unwrap_or_else(|| "none".to_string())
}

/// Sum in integer space while every value is an integer, else in f64
#[derive(Debug, Clone, Copy, PartialEq)]
enum Total {
    Int(i64),
    Float(f64),
}

impl Total {
    fn add(self, value: &Number, negate: bool) -> Self {
        match (self, value.as_i64()) {
            (Total::Int(acc), Some(v)) => {
                let next = if negate {
                    acc.checked_sub(v)
                } else {
                    acc.checked_add(v)
                };
                match next {
                    Some(n) => Total::Int(n),
                    None => Total::Float(acc as f64).add(value, negate),
                }
            }
            (acc, _) => {
                let v = value.as_f64().unwrap_or(0.0);
                let v = if negate { -v } else { v };
                Total::Float(acc.as_f64() + v)
            }
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Total::Int(n) => n as f64,
            Total::Float(f) => f,
        }
    }

    fn matches(self, expected: &Number) -> bool {
        match (self, expected.as_i64()) {
            (Total::Int(n), Some(e)) => n == e,
            _ => expected.as_f64().is_some_and(|e| e == self.as_f64()),
        }
    }
}

impl fmt::Display for Total {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Total::Int(n) => write!(f, "{}", n),
            Total::Float(x) => write!(f, "{}", x),
        }
    }
}

fn sum_check(
    data: &Map<String, Value>,
    expected: &str,
    operands: &[Operand],
) -> std::result::Result<(), String> {
    let mut total = Total::Int(0);
    for op in operands {
        match lookup(data, &op.path) {
            None | Some(Value::Null) => {}
            Some(Value::Number(n)) => total = total.add(n, op.negate),
            Some(other) => {
                return Err(format!("Operand '{}' is not numeric: {}", op.path, other));
            }
        }
    }

    match lookup(data, expected) {
        Some(Value::Number(e)) if total.matches(e) => Ok(()),
        Some(Value::Number(e)) => Err(format!("Expected {}, calculated {}", e, total)),
        None | Some(Value::Null) => Err(format!(
            "Expected field '{}' not found, calculated {}",
            expected, total
        )),
        Some(other) => Err(format!("Expected {} is not numeric", other)),
    }
}

/// Compiled shape and rule list for one task set
#[derive(Debug)]
pub struct ValidationEngine {
    shape: Option<ShapeValidator>,
    rules: Vec<CompiledRule>,
}

impl ValidationEngine {
    /// Compile the shape and every rule's params
    pub fn new(shape: Option<&OutputShape>, rules: &[ValidationRule]) -> Result<Self> {
        let shape = shape.map(ShapeValidator::compile).transpose()?;
        let rules = rules
            .iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { shape, rules })
    }

    /// Grade merged data
    pub fn validate(&self, data: &Map<String, Value>) -> ValidationResult {
        let mut checks = Vec::with_capacity(self.rules.len() + 1);
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if let Some(shape) = &self.shape {
            match shape.check(data) {
                Ok(()) => checks.push(CheckOutcome::passed(SHAPE_CHECK_NAME, None)),
                Err(msg) => {
                    errors.push(format!("Shape '{}' validation failed: {}", shape.name(), msg));
                    checks.push(CheckOutcome::failed(SHAPE_CHECK_NAME, None, msg));
                }
            }
        }

        for rule in &self.rules {
            let outcome = rule.run(data);
            if outcome.status == CheckStatus::Failed {
                let line = format!(
                    "{}: {}",
                    rule.name,
                    outcome.error.as_deref().unwrap_or("failed")
                );
                match rule.severity {
                    Severity::Error => errors.push(line),
                    Severity::Warning => warnings.push(line),
                }
            }
            checks.push(outcome);
        }

        ValidationResult::grade(checks, errors, warnings)
    }
}

/// One-shot validation: compile then grade
pub fn validate(
    data: &Map<String, Value>,
    shape: Option<&OutputShape>,
    rules: &[ValidationRule],
) -> Result<ValidationResult> {
    Ok(ValidationEngine::new(shape, rules)?.validate(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn sum_rule(operands: Value) -> ValidationRule {
        ValidationRule::new(
            "totals",
            RuleKind::SumCheck,
            json!({"expected": "total", "operands": operands}),
        )
        .with_name("Totals add up")
    }

    #[test]
    fn sum_check_passes_when_operands_add_up() {
        let data = obj(json!({"total": 100, "a": 60, "b": 40}));
        let result = validate(&data, None, &[sum_rule(json!(["a", "b"]))]).unwrap();
        assert_eq!(result.status, ValidationStatus::Pass);
        assert_eq!(result.quality_score, 100);
        assert_eq!(result.checks[0].status, CheckStatus::Passed);
    }

    #[test]
    fn sum_check_failure_cites_expected_and_calculated() {
        let data = obj(json!({"total": 100, "a": 60, "b": 30}));
        let result = validate(&data, None, &[sum_rule(json!(["a", "b"]))]).unwrap();
        assert_eq!(result.status, ValidationStatus::Fail);
        assert_eq!(result.errors, vec!["Totals add up: Expected 100, calculated 90"]);
        assert_eq!(result.quality_score, 85);
    }

    #[test]
    fn sum_check_subtracts_and_defaults_missing_to_zero() {
        let data = obj(json!({"net": 80, "gross": 100, "tax": 20}));
        let rule = ValidationRule::new(
            "net",
            RuleKind::SumCheck,
            json!({"expected": "net", "operands": ["gross", "-tax", "discount"]}),
        );
        let result = validate(&data, None, &[rule]).unwrap();
        assert_eq!(result.status, ValidationStatus::Pass);
    }

    #[test]
    fn sum_check_mixed_int_and_float() {
        let data = obj(json!({"total": 10.5, "a": 10, "b": 0.5}));
        let result = validate(&data, None, &[sum_rule(json!(["a", "b"]))]).unwrap();
        assert_eq!(result.status, ValidationStatus::Pass);

        let data = obj(json!({"total": 10.0, "a": 4, "b": 6}));
        let result = validate(&data, None, &[sum_rule(json!(["a", "b"]))]).unwrap();
        assert_eq!(result.status, ValidationStatus::Pass);
    }

    #[test]
    fn sum_check_non_numeric_operand_fails() {
        let data = obj(json!({"total": 10, "a": "ten"}));
        let result = validate(&data, None, &[sum_rule(json!(["a"]))]).unwrap();
        assert_eq!(result.checks[0].status, CheckStatus::Failed);
    }

    #[test]
    fn required_lists_all_missing_fields() {
        let data = obj(json!({"vendor": {"name": "ACME"}, "date": null, "n": 0}));
        let rule = ValidationRule::new(
            "req",
            RuleKind::RequiredFields,
            json!({"fields": ["vendor.name", "vendor.vat", "date", "n"]}),
        );
        let result = validate(&data, None, &[rule]).unwrap();
        assert_eq!(
            result.checks[0].error.as_deref(),
            Some("Missing fields: vendor.vat, date")
        );
    }

    #[test]
    fn range_check_skips_missing_field() {
        let rule = ValidationRule::new(
            "range",
            RuleKind::RangeCheck,
            json!({"field": "amount", "min": 0, "max": 1000}),
        );
        let result = validate(&obj(json!({})), None, &[rule]).unwrap();
        assert_eq!(result.checks[0].status, CheckStatus::Skipped);
        assert_eq!(result.checks[0].reason.as_deref(), Some("Field not found"));
        assert_eq!(result.status, ValidationStatus::Pass);
    }

    #[test]
    fn range_check_with_single_bound() {
        let rule =
            ValidationRule::new("range", RuleKind::RangeCheck, json!({"field": "amount", "min": 0}))
                .warning();
        let result = validate(&obj(json!({"amount": -5})), None, &[rule.clone()]).unwrap();
        assert_eq!(result.status, ValidationStatus::Review);
        assert_eq!(result.quality_score, 95);
        assert_eq!(
            result.warnings,
            vec!["range: Value -5 outside range [0, none]"]
        );

        let result = validate(&obj(json!({"amount": 1e9})), None, &[rule]).unwrap();
        assert_eq!(result.status, ValidationStatus::Pass);
    }

    #[test]
    fn unknown_kind_is_skipped() {
        let rule = ValidationRule::new("x", RuleKind::Other("regex".into()), json!({}));
        let result = validate(&obj(json!({})), None, &[rule]).unwrap();
        assert_eq!(result.checks[0].status, CheckStatus::Skipped);
        assert_eq!(
            result.checks[0].reason.as_deref(),
            Some("Unknown rule type: regex")
        );
    }

    #[test]
    fn malformed_params_are_rejected_at_compile() {
        let missing_expected =
            ValidationRule::new("bad", RuleKind::SumCheck, json!({"operands": ["a"]}));
        let err = ValidationEngine::new(None, &[missing_expected]).unwrap_err();
        assert_eq!(err.code(), "SKR-003");

        let bad_min = ValidationRule::new(
            "bad",
            RuleKind::RangeCheck,
            json!({"field": "a", "min": "zero"}),
        );
        assert!(ValidationEngine::new(None, &[bad_min]).is_err());

        let bad_operands =
            ValidationRule::new("bad", RuleKind::SumCheck, json!({"expected": "t", "operands": [1]}));
        assert!(ValidationEngine::new(None, &[bad_operands]).is_err());
    }

    #[test]
    fn shape_failure_is_always_an_error() {
        let shape = OutputShape::new(json!({
            "type": "object",
            "required": ["invoice_number"]
        }));
        let result = validate(&obj(json!({"total": 1})), Some(&shape), &[]).unwrap();
        assert_eq!(result.status, ValidationStatus::Fail);
        assert_eq!(result.checks[0].name, SHAPE_CHECK_NAME);
        assert_eq!(result.checks[0].status, CheckStatus::Failed);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn quality_score_clamps_at_zero() {
        let rules: Vec<ValidationRule> = (0..8)
            .map(|i| {
                ValidationRule::new(
                    format!("r{}", i),
                    RuleKind::RequiredFields,
                    json!({"fields": ["missing"]}),
                )
            })
            .collect();
        let result = validate(&obj(json!({})), None, &rules).unwrap();
        assert_eq!(result.quality_score, 0);
        assert_eq!(result.errors.len(), 8);
    }
}
