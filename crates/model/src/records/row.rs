use crate::core::value::{FieldValue, Value};
use serde::{Deserialize, Serialize};

/// One fetched row, keyed by the table it came from.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RowData {
    pub entity: String,
    pub field_values: Vec<FieldValue>,
}

impl RowData {
    pub fn new(entity: &str, field_values: Vec<FieldValue>) -> Self {
        RowData {
            entity: entity.to_string(),
            field_values,
        }
    }

    /// Positional access; columns may repeat so this is the unambiguous form.
    pub fn value_at(&self, index: usize) -> Value {
        self.field_values
            .get(index)
            .and_then(|f| f.value.clone())
            .unwrap_or(Value::Null)
    }
}
