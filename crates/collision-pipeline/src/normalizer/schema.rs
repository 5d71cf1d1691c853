//! Unified schema inference over pooled records.

use crate::types::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Scalar type of a normalized column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Boolean,
    Integer,
    Float,
    Text,
}

impl ColumnType {
    /// Type inferred from a single value; `None` for JSON null.
    ///
    /// Priority is boolean, integer, float, then text. Lists and objects
    /// are stored as serialized text.
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(Self::Boolean),
            Value::Number(n) if n.is_i64() => Some(Self::Integer),
            Value::Number(_) => Some(Self::Float),
            Value::String(_) | Value::Array(_) | Value::Object(_) => Some(Self::Text),
        }
    }
}

/// Ordered mapping from column name to its inferred type.
///
/// Columns appear in first-seen order over the pooled records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnifiedSchema {
    columns: Vec<(String, ColumnType)>,
}

impl UnifiedSchema {
    /// Infer the schema in a single pass over `records`.
    ///
    /// A column's type comes from the first non-null value seen for it and
    /// is never revisited, so a misleading first sample fixes the type for
    /// the whole column. Columns that are null everywhere become text.
    pub fn infer(records: &[Record]) -> Self {
        let mut order: Vec<String> = Vec::new();
        let mut types: HashMap<String, Option<ColumnType>> = HashMap::new();

        for record in records {
            for (key, value) in record {
                match types.get_mut(key) {
                    Some(slot) => {
                        if slot.is_none() {
                            *slot = ColumnType::of(value);
                        }
                    }
                    None => {
                        order.push(key.clone());
                        types.insert(key.clone(), ColumnType::of(value));
                    }
                }
            }
        }

        let columns = order
            .into_iter()
            .map(|name| {
                let column_type = types
                    .get(&name)
                    .copied()
                    .flatten()
                    .unwrap_or(ColumnType::Text);
                (name, column_type)
            })
            .collect();

        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| *t)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ColumnType)> {
        self.columns.iter().map(|(n, t)| (n.as_str(), *t))
    }
}
