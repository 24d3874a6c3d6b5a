use crate::domain::{CellValue, Issue, IssueKind, QualityReport, TabularDataset, ValueType};

/// Expectation for a single output column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    /// Whether the column must exist in the dataset
    pub required: bool,
    /// Type every non-empty cell is expected to have
    pub field_type: ValueType,
}

/// Ordered set of expected columns; declaration order drives issue order
#[derive(Debug, Clone)]
pub struct QualitySchema {
    fields: Vec<(String, FieldRule)>,
}

impl QualitySchema {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn field(mut self, name: impl Into<String>, required: bool, field_type: ValueType) -> Self {
        self.fields.push((name.into(), FieldRule { required, field_type }));
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldRule)> {
        self.fields.iter().map(|(n, r)| (n.as_str(), r))
    }
}

impl Default for QualitySchema {
    /// The delivery target's record layout
    fn default() -> Self {
        Self::new()
            .field("name", true, ValueType::String)
            .field("email", true, ValueType::String)
            .field("birthdate", true, ValueType::Date)
            .field("amount", false, ValueType::Float)
    }
}

/// Schema-driven validator. Reports problems, never rejects input.
#[derive(Debug, Clone, Default)]
pub struct QualityChecker {
    schema: QualitySchema,
}

impl QualityChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(schema: QualitySchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &QualitySchema {
        &self.schema
    }

    pub fn check(&self, dataset: &TabularDataset) -> QualityReport {
        let mut issues = Vec::new();

        // 1) required columns present
        for (name, rule) in self.schema.fields() {
            if rule.required && !dataset.has_column(name) {
                issues.push(Issue {
                    row: None,
                    column: name.to_string(),
                    kind: IssueKind::MissingField,
                    detail: "required column absent".to_string(),
                });
            }
        }

        // 2) row-level checks, for optional columns too
        let present: Vec<(&str, &FieldRule, &[CellValue])> = self
            .schema
            .fields()
            .filter_map(|(name, rule)| dataset.column(name).map(|c| (name, rule, c.values.as_slice())))
            .collect();

        for row in 0..dataset.row_count() {
            for (name, rule, values) in &present {
                if let Some((kind, detail)) = check_cell(&values[row], rule.field_type) {
                    issues.push(Issue {
                        row: Some(row),
                        column: name.to_string(),
                        kind,
                        detail: detail.to_string(),
                    });
                }
            }
        }

        QualityReport {
            total_rows: dataset.row_count(),
            issues,
        }
    }
}

fn check_cell(value: &CellValue, expected: ValueType) -> Option<(IssueKind, &'static str)> {
    if value.is_empty() {
        return Some((IssueKind::NullValue, "empty"));
    }
    match (expected, value) {
        (ValueType::Int, CellValue::Int(_)) => None,
        (ValueType::Int, _) => Some((IssueKind::TypeMismatch, "expected int")),
        (ValueType::Float, CellValue::Float(_)) => None,
        (ValueType::Float, _) => Some((IssueKind::TypeMismatch, "expected float")),
        // dates are already rendered to text by the mapping step
        (ValueType::Date, CellValue::String(_)) => None,
        (ValueType::Date, _) => Some((IssueKind::TypeMismatch, "expected date string")),
        (ValueType::String, _) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Column;

    fn dataset(columns: Vec<Column>) -> TabularDataset {
        TabularDataset::new(columns).unwrap()
    }

    #[test]
    fn test_empty_dataset_reports_each_required_column_once() {
        let report = QualityChecker::new().check(&TabularDataset::empty());

        assert_eq!(report.total_rows, 0);
        assert_eq!(report.issues.len(), 3);
        assert!(report.issues.iter().all(|i| i.kind == IssueKind::MissingField && i.row.is_none()));
        let cols: Vec<&str> = report.issues.iter().map(|i| i.column.as_str()).collect();
        assert_eq!(cols, vec!["name", "email", "birthdate"]);
    }

    #[test]
    fn test_missing_required_birthdate() {
        let ds = dataset(vec![
            Column::new("email", vec!["a@x".into()]),
            Column::new("name", vec!["A".into()]),
        ]);
        let report = QualityChecker::new().check(&ds);

        assert!(report
            .issues
            .iter()
            .any(|i| i.kind == IssueKind::MissingField && i.column == "birthdate"));
    }

    #[test]
    fn test_single_empty_required_value() {
        let ds = dataset(vec![
            Column::new("name", vec!["".into()]),
            Column::new("email", vec!["a@x".into()]),
            Column::new("birthdate", vec!["2000-01-01".into()]),
        ]);
        let report = QualityChecker::new().check(&ds);

        assert_eq!(
            report.issues,
            vec![Issue {
                row: Some(0),
                column: "name".to_string(),
                kind: IssueKind::NullValue,
                detail: "empty".to_string(),
            }]
        );
    }

    #[test]
    fn test_type_checks_apply_to_optional_columns() {
        let ds = dataset(vec![
            Column::new("name", vec!["A".into(), "B".into()]),
            Column::new("email", vec!["a@x".into(), "b@x".into()]),
            Column::new("birthdate", vec![CellValue::Int(1), "1990-01-01".into()]),
            Column::new("amount", vec!["12".into(), CellValue::Float(f64::NAN)]),
        ]);
        let report = QualityChecker::new().check(&ds);

        let found: Vec<(Option<usize>, &str, IssueKind, &str)> = report
            .issues
            .iter()
            .map(|i| (i.row, i.column.as_str(), i.kind, i.detail.as_str()))
            .collect();
        assert_eq!(
            found,
            vec![
                (Some(0), "birthdate", IssueKind::TypeMismatch, "expected date string"),
                (Some(0), "amount", IssueKind::TypeMismatch, "expected float"),
                (Some(1), "amount", IssueKind::NullValue, "empty"),
            ]
        );
    }

    #[test]
    fn test_schema_issues_come_before_row_issues() {
        let ds = dataset(vec![Column::new("name", vec![CellValue::Null])]);
        let report = QualityChecker::new().check(&ds);

        let kinds: Vec<IssueKind> = report.issues.iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![IssueKind::MissingField, IssueKind::MissingField, IssueKind::NullValue]
        );
    }

    #[test]
    fn test_custom_schema_int_check() {
        let checker = QualityChecker::with_schema(QualitySchema::new().field("age", false, ValueType::Int));
        let ds = dataset(vec![Column::new("age", vec![CellValue::Int(3), CellValue::Float(3.0)])]);

        let report = checker.check(&ds);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].row, Some(1));
        assert_eq!(report.issues[0].detail, "expected int");
    }
}
