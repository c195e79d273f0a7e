//! Canonical JSON encoding and integrity hashing.
//!
//! Hashing requires byte-identical serialization for equal logical
//! content across platforms, so object keys are always written in
//! ascending lexicographic order with no insignificant whitespace.

use crate::entry::{JsonMap, SyncLogEntry};
use crate::error::{ProtocolError, ProtocolResult};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Serializes a JSON value canonically: object keys in ascending
/// lexicographic (byte) order, arrays in element order, no whitespace.
///
/// Equal logical content yields identical bytes regardless of the
/// insertion order the value was built with.
pub fn to_canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_escaped(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_escaped(key, out);
                out.push(':');
                // Key came out of the map; the lookup cannot miss.
                if let Some(v) = map.get(key.as_str()) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
    }
}

fn write_escaped(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Computes the integrity hash of an ordered list of change entries.
///
/// The ordered list is canonical-JSON-encoded and hashed with SHA-256;
/// the result is 64 lowercase hex characters. Pure: identical input
/// always yields identical output, and permuting the entries changes
/// the hash.
pub fn compute_batch_hash(entries: &[SyncLogEntry]) -> ProtocolResult<String> {
    let value =
        serde_json::to_value(entries).map_err(|e| ProtocolError::Serialize(e.to_string()))?;
    let canonical = to_canonical_json(&value);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Computes a hash over a full dataset for out-of-band consistency
/// audits.
///
/// `fetch_rows` returns `(pk, columns)` pairs for one table. Tables are
/// visited in sorted name order and each table's rows are sorted by
/// canonical primary key, so two stores holding the same logical data
/// hash identically regardless of iteration order.
pub fn compute_database_hash<E, F>(tables: &[String], mut fetch_rows: F) -> Result<String, E>
where
    E: From<ProtocolError>,
    F: FnMut(&str) -> Result<Vec<(JsonMap, JsonMap)>, E>,
{
    let mut names: Vec<&String> = tables.iter().collect();
    names.sort();

    let mut hasher = Sha256::new();
    for name in names {
        let mut rows: Vec<(String, String)> = fetch_rows(name)?
            .into_iter()
            .map(|(pk, columns)| {
                (
                    to_canonical_json(&Value::Object(pk)),
                    to_canonical_json(&Value::Object(columns)),
                )
            })
            .collect();
        rows.sort();

        hasher.update(name.as_bytes());
        hasher.update(b"\n");
        for (pk, columns) in rows {
            hasher.update(pk.as_bytes());
            hasher.update(b"=");
            hasher.update(columns.as_bytes());
            hasher.update(b"\n");
        }
    }

    Ok(hex::encode(hasher.finalize()))
}
