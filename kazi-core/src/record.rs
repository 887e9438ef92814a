//! Generic resource rows.
//!
//! Typed resources cross the datastore boundary as `Record`s: a JSON object of
//! column name to value. Conversion goes through serde so every typed struct
//! round-trips through the same representation the backends store.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::{EntityId, StorageError, Timestamp};

/// Column name → value mapping for one row.
pub type Record = Map<String, Value>;

pub const ID_COLUMN: &str = "id";
pub const CREATED_AT_COLUMN: &str = "created_at";
pub const UPDATED_AT_COLUMN: &str = "updated_at";
pub const DELETED_AT_COLUMN: &str = "deleted_at";

/// Serialize a value into a row. Anything but a JSON object is rejected.
pub fn to_record<T: Serialize>(value: &T) -> Result<Record, StorageError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StorageError::Serialization {
            reason: format!("expected a JSON object, got {}", json_kind(&other)),
        }),
        Err(e) => Err(StorageError::Serialization {
            reason: e.to_string(),
        }),
    }
}

/// Deserialize a row into a typed value.
pub fn from_record<T: DeserializeOwned>(record: Record) -> Result<T, StorageError> {
    serde_json::from_value(Value::Object(record)).map_err(|e| StorageError::Serialization {
        reason: e.to_string(),
    })
}

/// Drop every null-valued field, so absent optional inputs never overwrite
/// stored or defaulted values.
pub fn strip_nulls(mut record: Record) -> Record {
    record.retain(|_, value| !value.is_null());
    record
}

/// Read the `id` column.
pub fn record_id(record: &Record) -> Option<EntityId> {
    record
        .get(ID_COLUMN)
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
}

/// Read a timestamp column written as RFC 3339.
pub fn record_timestamp(record: &Record, column: &str) -> Option<Timestamp> {
    record
        .get(column)
        .and_then(Value::as_str)
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::new_entity_id;
    use chrono::Utc;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        id: EntityId,
        name: String,
        note: Option<String>,
    }

    #[test]
    fn test_round_trip() {
        let sample = Sample {
            id: new_entity_id(),
            name: "alpha".to_string(),
            note: None,
        };
        let record = to_record(&sample).expect("to_record");
        assert_eq!(record_id(&record), Some(sample.id));
        let back: Sample = from_record(record).expect("from_record");
        assert_eq!(back, sample);
    }

    #[test]
    fn test_to_record_rejects_non_objects() {
        let err = to_record(&vec![1, 2, 3]).expect_err("arrays are not rows");
        assert!(matches!(err, StorageError::Serialization { .. }));
    }

    #[test]
    fn test_strip_nulls() {
        let record = to_record(&json!({"a": 1, "b": null, "c": "x"})).expect("object");
        let stripped = strip_nulls(record);
        assert_eq!(stripped.len(), 2);
        assert!(!stripped.contains_key("b"));
    }

    #[test]
    fn test_record_timestamp() {
        let now = Utc::now();
        let record = to_record(&json!({"created_at": now})).expect("object");
        assert_eq!(record_timestamp(&record, CREATED_AT_COLUMN), Some(now));
        assert_eq!(record_timestamp(&record, UPDATED_AT_COLUMN), None);
    }
}
