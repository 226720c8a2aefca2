//! # Traits
//!
//! $$
//! \text{Report}:\ \text{result} \to \{\,k_i \mapsto v_i\,\}
//! $$
//!
//! Shared contracts for result records handed to reporting collaborators.

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// Generic key-value export for result records.
///
/// Any serializable result can be flattened into a JSON object so that
/// report writers, dashboards or tests can consume it without depending on
/// the concrete record type.
pub trait Report: Serialize {
  /// Export as a JSON value. Records that fail to serialize export `null`.
  fn to_value(&self) -> Value {
    serde_json::to_value(self).unwrap_or(Value::Null)
  }

  /// Export as a top-level key-value map.
  fn to_map(&self) -> Map<String, Value> {
    match self.to_value() {
      Value::Object(map) => map,
      other => {
        let mut map = Map::new();
        map.insert("value".to_string(), other);
        map
      }
    }
  }
}
