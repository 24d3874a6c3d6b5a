// Domain data shapes shared across layers

pub mod dataset;

pub use dataset::{CellValue, Column, DatasetBuilder, DatasetError, TabularDataset};

use serde::{Deserialize, Serialize};

pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Semantic type a column is coerced to (mapping) or checked against (quality)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[default]
    String,
    Int,
    Float,
    Date,
}

/// String transforms selectable per mapping rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    Trim,
    Title,
    Lower,
    Upper,
}

/// One source-to-target column instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRule {
    pub source: String,
    pub target: String,
    #[serde(rename = "type", default)]
    pub value_type: ValueType,
    #[serde(default)]
    pub transform: Option<Transform>,
    #[serde(default)]
    pub date_format: Option<String>,
}

impl MappingRule {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            value_type: ValueType::String,
            transform: None,
            date_format: None,
        }
    }

    pub fn with_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_date_format(mut self, date_format: impl Into<String>) -> Self {
        self.date_format = Some(date_format.into());
        self
    }

    pub fn date_format(&self) -> &str {
        self.date_format.as_deref().unwrap_or(DEFAULT_DATE_FORMAT)
    }
}

/// A tenant's full mapping configuration; rule order is output column order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingConfig {
    pub project_id: String,
    pub rules: Vec<MappingRule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingField,
    NullValue,
    TypeMismatch,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::MissingField => "missing_field",
            IssueKind::NullValue => "null_value",
            IssueKind::TypeMismatch => "type_mismatch",
        }
    }
}

/// A single quality finding; `row == None` means the whole column is affected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub row: Option<usize>,
    pub column: String,
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QualityReport {
    pub total_rows: usize,
    pub issues: Vec<Issue>,
}

impl QualityReport {
    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }
}

/// Result of one delivery invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub status_code: u16,
    pub ok: bool,
    pub attempts: u32,
    pub response: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_deserializes_with_defaults() {
        let rule: MappingRule = serde_json::from_value(json!({
            "source": "customer_name",
            "target": "name"
        }))
        .unwrap();
        assert_eq!(rule.value_type, ValueType::String);
        assert_eq!(rule.transform, None);
        assert_eq!(rule.date_format(), DEFAULT_DATE_FORMAT);
    }

    #[test]
    fn test_unknown_transform_is_rejected() {
        let res: Result<MappingRule, _> = serde_json::from_value(json!({
            "source": "a",
            "target": "b",
            "transform": "reverse"
        }));
        assert!(res.is_err());
    }

    #[test]
    fn test_issue_serializes_kind_as_type() {
        let issue = Issue {
            row: None,
            column: "email".to_string(),
            kind: IssueKind::MissingField,
            detail: "required column absent".to_string(),
        };
        let v = serde_json::to_value(&issue).unwrap();
        assert_eq!(v["type"], "missing_field");
        assert_eq!(v["row"], serde_json::Value::Null);
    }
}
