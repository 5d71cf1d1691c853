//! Projection of pooled records onto the unified schema.

use super::schema::{ColumnType, UnifiedSchema};
use crate::types::Record;
use polars::prelude::*;
use serde_json::Value;

/// Typed buffer for one output column.
enum ColumnBuilder {
    Boolean(Vec<Option<bool>>),
    Integer(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnBuilder {
    fn with_capacity(column_type: ColumnType, capacity: usize) -> Self {
        match column_type {
            ColumnType::Boolean => Self::Boolean(Vec::with_capacity(capacity)),
            ColumnType::Integer => Self::Integer(Vec::with_capacity(capacity)),
            ColumnType::Float => Self::Float(Vec::with_capacity(capacity)),
            ColumnType::Text => Self::Text(Vec::with_capacity(capacity)),
        }
    }

    /// Append a cell. Returns `false` when a non-null value did not fit the
    /// column type and was stored as null.
    fn push(&mut self, value: Option<&Value>) -> bool {
        let value = match value {
            None | Some(Value::Null) => {
                self.push_null();
                return true;
            }
            Some(v) => v,
        };

        match self {
            Self::Boolean(values) => {
                let cell = value.as_bool();
                values.push(cell);
                cell.is_some()
            }
            Self::Integer(values) => {
                let cell = as_integer(value);
                values.push(cell);
                cell.is_some()
            }
            Self::Float(values) => {
                let cell = value.as_f64();
                values.push(cell);
                cell.is_some()
            }
            Self::Text(values) => {
                values.push(Some(to_text(value)));
                true
            }
        }
    }

    fn push_null(&mut self) {
        match self {
            Self::Boolean(values) => values.push(None),
            Self::Integer(values) => values.push(None),
            Self::Float(values) => values.push(None),
            Self::Text(values) => values.push(None),
        }
    }

    fn finish(self, name: &str) -> Series {
        match self {
            Self::Boolean(values) => Series::new(name.into(), values),
            Self::Integer(values) => Series::new(name.into(), values),
            Self::Float(values) => Series::new(name.into(), values),
            Self::Text(values) => Series::new(name.into(), values),
        }
    }
}

/// Integer value of a JSON number; floats are accepted only when integral.
fn as_integer(value: &Value) -> Option<i64> {
    if let Some(i) = value.as_i64() {
        return Some(i);
    }
    value
        .as_f64()
        .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
        .map(|f| f as i64)
}

/// Canonical text of a value: strings verbatim, everything else as compact JSON.
pub(crate) fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build a table with one column per schema entry and one row per record.
///
/// Returns the table and the number of cells that did not match their
/// column's type and were stored as null.
pub(crate) fn project(records: &[Record], schema: &UnifiedSchema) -> PolarsResult<(DataFrame, usize)> {
    let mut mismatched = 0usize;
    let mut columns: Vec<Column> = Vec::with_capacity(schema.len());

    for (name, column_type) in schema.iter() {
        let mut builder = ColumnBuilder::with_capacity(column_type, records.len());
        for record in records {
            if !builder.push(record.get(name)) {
                mismatched += 1;
            }
        }
        columns.push(builder.finish(name).into_column());
    }

    Ok((DataFrame::new(columns)?, mismatched))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(values: Vec<Value>) -> Vec<Record> {
        values
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn test_missing_keys_become_null() {
        let recs = records(vec![json!({"a": 1, "b": "x"}), json!({"a": 2})]);
        let schema = UnifiedSchema::infer(&recs);
        let (df, mismatched) = project(&recs, &schema).unwrap();

        assert_eq!(df.shape(), (2, 2));
        assert_eq!(mismatched, 0);
        let b = df.column("b").unwrap().as_materialized_series();
        assert_eq!(b.null_count(), 1);
        assert!(matches!(b.get(1).unwrap(), AnyValue::Null));
    }

    #[test]
    fn test_list_column_serialized_for_every_row() {
        let recs = records(vec![
            json!({"tags": ["a", "b"]}),
            json!({"tags": 7}),
            json!({"tags": {"k": true}}),
        ]);
        let schema = UnifiedSchema::infer(&recs);
        let (df, _) = project(&recs, &schema).unwrap();

        let tags = df.column("tags").unwrap().as_materialized_series();
        assert_eq!(tags.dtype(), &DataType::String);
        let values: Vec<Option<&str>> = tags.str().unwrap().into_iter().collect();
        assert_eq!(
            values,
            vec![Some(r#"["a","b"]"#), Some("7"), Some(r#"{"k":true}"#)]
        );
    }

    #[test]
    fn test_numeric_mismatches() {
        let recs = records(vec![
            json!({"n": 1, "f": 0.5}),
            json!({"n": 2.0, "f": 3}),
            json!({"n": 2.5, "f": "x"}),
            json!({"n": "abc", "f": null}),
        ]);
        let schema = UnifiedSchema::infer(&recs);
        let (df, mismatched) = project(&recs, &schema).unwrap();

        let n: Vec<Option<i64>> = df
            .column("n")
            .unwrap()
            .as_materialized_series()
            .i64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(n, vec![Some(1), Some(2), None, None]);

        let f: Vec<Option<f64>> = df
            .column("f")
            .unwrap()
            .as_materialized_series()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(f, vec![Some(0.5), Some(3.0), None, None]);

        assert_eq!(mismatched, 3);
    }

    #[test]
    fn test_text_column_keeps_scalars_as_text() {
        let recs = records(vec![json!({"v": "123"}), json!({"v": 456}), json!({"v": false})]);
        let schema = UnifiedSchema::infer(&recs);
        let (df, mismatched) = project(&recs, &schema).unwrap();

        let v: Vec<Option<&str>> = df
            .column("v")
            .unwrap()
            .as_materialized_series()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(v, vec![Some("123"), Some("456"), Some("false")]);
        assert_eq!(mismatched, 0);
    }
}
