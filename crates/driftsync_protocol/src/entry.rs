//! Change log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON object mapping column names to values.
pub type JsonMap = serde_json::Map<String, Value>;

/// The kind of row mutation an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Row was inserted.
    Insert,
    /// Row was updated.
    Update,
    /// Row was deleted (tombstone).
    Delete,
}

impl Operation {
    /// Returns the operation name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "Insert",
            Operation::Update => "Update",
            Operation::Delete => "Delete",
        }
    }
}

/// The atomic unit of change exchanged between replicas.
///
/// Entries are totally ordered by `version` within one log. The
/// `timestamp` is a best-effort wall-clock signal used only as the
/// conflict-resolution tiebreaker; clocks are not assumed synchronized
/// beyond that purpose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogEntry {
    /// Globally unique, strictly increasing version within the origin
    /// log. Assigned by the log store on append; immutable afterwards.
    pub version: i64,
    /// Name of the tracked table.
    pub table_name: String,
    /// Primary-key column(s) of the affected row as a JSON object.
    /// Composite keys are multiple fields of the same object.
    pub pk_value: JsonMap,
    /// The kind of mutation.
    pub operation: Operation,
    /// All tracked columns for Insert/Update; `None` for Delete.
    pub payload: Option<JsonMap>,
    /// Opaque identifier of the replica that produced the entry.
    pub origin: String,
    /// UTC capture time with millisecond precision.
    pub timestamp: DateTime<Utc>,
}

impl SyncLogEntry {
    /// Creates an Insert entry.
    pub fn insert(
        version: i64,
        table_name: impl Into<String>,
        pk_value: JsonMap,
        payload: JsonMap,
        origin: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            version,
            table_name: table_name.into(),
            pk_value,
            operation: Operation::Insert,
            payload: Some(payload),
            origin: origin.into(),
            timestamp,
        }
    }

    /// Creates an Update entry.
    pub fn update(
        version: i64,
        table_name: impl Into<String>,
        pk_value: JsonMap,
        payload: JsonMap,
        origin: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            version,
            table_name: table_name.into(),
            pk_value,
            operation: Operation::Update,
            payload: Some(payload),
            origin: origin.into(),
            timestamp,
        }
    }

    /// Creates a Delete entry (tombstone: identity only, no data).
    pub fn delete(
        version: i64,
        table_name: impl Into<String>,
        pk_value: JsonMap,
        origin: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            version,
            table_name: table_name.into(),
            pk_value,
            operation: Operation::Delete,
            payload: None,
            origin: origin.into(),
            timestamp,
        }
    }

    /// Returns the `version:tableName` form used to identify entries in
    /// failure reports.
    pub fn describe(&self) -> String {
        format!("{}:{}", self.version, self.table_name)
    }

    /// Returns a canonical string key identifying the affected row.
    pub fn row_key(&self) -> String {
        format!(
            "{}/{}",
            self.table_name,
            crate::canonical::to_canonical_json(&Value::Object(self.pk_value.clone()))
        )
    }

    /// Returns true if both entries target the same row of the same
    /// table.
    pub fn same_row(&self, other: &SyncLogEntry) -> bool {
        self.table_name == other.table_name && self.pk_value == other.pk_value
    }
}

/// Returns the current UTC time truncated to millisecond precision, the
/// resolution entry timestamps carry on the wire.
pub fn capture_timestamp() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pk(id: &str) -> JsonMap {
        let mut map = JsonMap::new();
        map.insert("id".into(), json!(id));
        map
    }

    fn cols(name: &str) -> JsonMap {
        let mut map = JsonMap::new();
        map.insert("name".into(), json!(name));
        map
    }

    #[test]
    fn constructors() {
        let ts = capture_timestamp();
        let insert = SyncLogEntry::insert(1, "person", pk("p1"), cols("Alice"), "origin-a", ts);
        assert_eq!(insert.operation, Operation::Insert);
        assert!(insert.payload.is_some());

        let update = SyncLogEntry::update(2, "person", pk("p1"), cols("Alice Updated"), "origin-a", ts);
        assert_eq!(update.operation, Operation::Update);

        let delete = SyncLogEntry::delete(3, "person", pk("p1"), "origin-a", ts);
        assert_eq!(delete.operation, Operation::Delete);
        assert!(delete.payload.is_none());
    }

    #[test]
    fn describe_form() {
        let entry = SyncLogEntry::delete(42, "orders", pk("o1"), "origin-a", capture_timestamp());
        assert_eq!(entry.describe(), "42:orders");
    }

    #[test]
    fn same_row_ignores_field_order() {
        let ts = capture_timestamp();
        let mut pk_a = JsonMap::new();
        pk_a.insert("a".into(), json!(1));
        pk_a.insert("b".into(), json!(2));
        let mut pk_b = JsonMap::new();
        pk_b.insert("b".into(), json!(2));
        pk_b.insert("a".into(), json!(1));

        let x = SyncLogEntry::delete(1, "t", pk_a, "o1", ts);
        let y = SyncLogEntry::delete(2, "t", pk_b, "o2", ts);
        assert!(x.same_row(&y));
    }

    #[test]
    fn wire_roundtrip() {
        let entry = SyncLogEntry::insert(
            7,
            "person",
            pk("p1"),
            cols("Alice"),
            "b7e9c3e2-0000-4000-8000-000000000001",
            capture_timestamp(),
        );

        let encoded = serde_json::to_string(&entry).unwrap();
        assert!(encoded.contains("\"tableName\""));
        assert!(encoded.contains("\"pkValue\""));

        let decoded: SyncLogEntry = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn timestamps_are_millisecond_precision() {
        let ts = capture_timestamp();
        assert_eq!(ts.timestamp_subsec_nanos() % 1_000_000, 0);
    }
}
