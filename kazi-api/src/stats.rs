//! In-process aggregation over fetched rows.
//!
//! Stats are computed over a bounded window of rows, never pushed into the
//! datastore. Every summary carries its `Coverage` so callers can tell when
//! totals only reflect the first `cap` rows.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Bucket label for rows whose field is missing or null.
pub const UNKNOWN_BUCKET: &str = "unknown";

/// Rows fetched for aggregation, at most `cap` of them.
#[derive(Debug, Clone, PartialEq)]
pub struct Window<T> {
    pub items: Vec<T>,
    pub cap: usize,
    /// More rows matched than the window holds.
    pub truncated: bool,
}

impl<T> Window<T> {
    pub fn new(mut items: Vec<T>, cap: usize, truncated: bool) -> Self {
        let truncated = truncated || items.len() > cap;
        items.truncate(cap);
        Self {
            items,
            cap,
            truncated,
        }
    }

    pub fn sample_size(&self) -> usize {
        self.items.len()
    }

    pub fn coverage(&self) -> Coverage {
        Coverage {
            sample_size: self.sample_size(),
            cap: self.cap,
            truncated: self.truncated,
        }
    }
}

/// How much of the matching data a summary was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Coverage {
    pub sample_size: usize,
    pub cap: usize,
    pub truncated: bool,
}

/// Numeric bucket: values `>= min` fall here unless a later bucket matches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    pub label: &'static str,
    pub min: f64,
}

fn field_values<'a, T: Serialize>(
    rows: &'a [T],
    field: &'a str,
) -> impl Iterator<Item = Option<Value>> + 'a {
    rows.iter().map(move |row| match serde_json::to_value(row) {
        Ok(Value::Object(mut map)) => map.remove(field).filter(|v| !v.is_null()),
        _ => None,
    })
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn bucket_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Count rows per distinct value of `field`.
pub fn count_by<T: Serialize>(rows: &[T], field: &str) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for value in field_values(rows, field) {
        let key = value
            .as_ref()
            .map(bucket_key)
            .unwrap_or_else(|| UNKNOWN_BUCKET.to_string());
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

/// Rows whose `field` equals `value`.
pub fn count_where<T: Serialize>(rows: &[T], field: &str, value: &str) -> u64 {
    field_values(rows, field)
        .filter(|v| v.as_ref().and_then(Value::as_str) == Some(value))
        .count() as u64
}

/// Sum of the numeric values of `field`; non-numeric values are skipped.
pub fn sum<T: Serialize>(rows: &[T], field: &str) -> f64 {
    field_values(rows, field)
        .filter_map(|v| v.as_ref().and_then(as_number))
        .sum()
}

/// Mean of the numeric values of `field`, `None` when there are none.
pub fn average<T: Serialize>(rows: &[T], field: &str) -> Option<f64> {
    let values: Vec<f64> = field_values(rows, field)
        .filter_map(|v| v.as_ref().and_then(as_number))
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// `part / whole` as a percentage rounded to two decimals, 0 for an empty whole.
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 10_000.0).round() / 100.0
}

/// Count rows per numeric bucket. `buckets` must be sorted by `min`.
/// Values below the first bucket and non-numeric values count as unknown.
pub fn bucket<T: Serialize>(rows: &[T], field: &str, buckets: &[Bucket]) -> BTreeMap<String, u64> {
    let mut counts: BTreeMap<String, u64> =
        buckets.iter().map(|b| (b.label.to_string(), 0)).collect();
    for value in field_values(rows, field) {
        let label = value
            .as_ref()
            .and_then(as_number)
            .and_then(|n| buckets.iter().rev().find(|b| n >= b.min))
            .map(|b| b.label)
            .unwrap_or(UNKNOWN_BUCKET);
        *counts.entry(label.to_string()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows() -> Vec<Value> {
        vec![
            json!({"severity": "high", "score": 80}),
            json!({"severity": "low", "score": 20}),
            json!({"severity": "high", "score": 50.5}),
            json!({"score": null}),
        ]
    }

    #[test]
    fn test_count_by_buckets_missing_as_unknown() {
        let counts = count_by(&rows(), "severity");
        assert_eq!(counts.get("high"), Some(&2));
        assert_eq!(counts.get("low"), Some(&1));
        assert_eq!(counts.get(UNKNOWN_BUCKET), Some(&1));
        assert_eq!(counts.values().sum::<u64>(), 4);
    }

    #[test]
    fn test_sum_and_average() {
        assert_eq!(sum(&rows(), "score"), 150.5);
        let avg = average(&rows(), "score").unwrap_or_default();
        assert!((avg - 50.166).abs() < 0.01);
        assert_eq!(average::<Value>(&[], "score"), None);
    }

    #[test]
    fn test_percentage_rounds_and_handles_zero() {
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 2), 100.0);
        assert_eq!(percentage(5, 0), 0.0);
    }

    #[test]
    fn test_bucket() {
        let buckets = [
            Bucket { label: "low", min: 0.0 },
            Bucket { label: "medium", min: 40.0 },
            Bucket { label: "high", min: 70.0 },
        ];
        let counts = bucket(&rows(), "score", &buckets);
        assert_eq!(counts.get("low"), Some(&1));
        assert_eq!(counts.get("medium"), Some(&1));
        assert_eq!(counts.get("high"), Some(&1));
        assert_eq!(counts.get(UNKNOWN_BUCKET), Some(&1));
    }

    #[test]
    fn test_window_never_exceeds_cap() {
        let window = Window::new(vec![1, 2, 3, 4], 3, false);
        assert_eq!(window.sample_size(), 3);
        assert!(window.truncated);

        let coverage = Window::new(vec![1], 3, false).coverage();
        assert_eq!(coverage.sample_size, 1);
        assert!(!coverage.truncated);
    }
}
