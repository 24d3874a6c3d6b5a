//! Rule-driven column mapping: extract, coerce, transform, rename.

pub mod transforms;

use tracing::debug;

use crate::domain::{CellValue, DatasetBuilder, MappingConfig, MappingRule, TabularDataset};
pub use transforms::normalize_column_name;

/// Apply every rule of `config` in order and return a new dataset.
///
/// The input is left untouched. A rule whose source column is absent yields an all-null column.
/// Output names are normalized after all rules ran; when two names normalize to the same value
/// the later rule's values replace the earlier ones at the earlier column's position.
pub fn apply_mapping(dataset: &TabularDataset, config: &MappingConfig) -> TabularDataset {
    let row_count = dataset.row_count();
    let mut mapped = DatasetBuilder::new(row_count);

    for rule in &config.rules {
        let values = map_column(dataset, rule);
        mapped.set_column(rule.target.clone(), values);
    }

    let mapped = mapped.build();
    let mut normalized = DatasetBuilder::new(row_count);
    for column in mapped.columns() {
        let name = normalize_column_name(&column.name);
        if name != column.name {
            debug!(from = %column.name, to = %name, "normalized column name");
        }
        normalized.set_column(name, column.values.clone());
    }
    normalized.build()
}

fn map_column(dataset: &TabularDataset, rule: &MappingRule) -> Vec<CellValue> {
    let Some(source) = dataset.column(&rule.source) else {
        debug!(source = %rule.source, target = %rule.target, "source column absent, filling with nulls");
        return vec![CellValue::Null; dataset.row_count()];
    };

    let date_format = rule.date_format();
    source
        .values
        .iter()
        .map(|v| transforms::coerce(v, rule.value_type, date_format))
        .map(|v| match (v, rule.transform) {
            (CellValue::String(s), Some(t)) => CellValue::String(t.apply(&s)),
            (other, _) => other,
        })
        .collect()
}
