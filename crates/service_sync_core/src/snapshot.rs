//! Parsing and validation of infrastructure-state snapshots.
//!
//! A snapshot is a JSON object whose keys are logical resource names and whose
//! values carry an optional `value` block with the service attributes. Entries
//! that cannot be turned into a [`SnapshotEntry`] are skipped with a diagnostic;
//! they never prevent the valid subset from being reconciled.

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::contract::SnapshotEntry;

const NAIVE_TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot document is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("snapshot document must be a JSON object, found {found}")]
    NotAnObject { found: &'static str },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    MissingValueBlock,
    InvalidValueBlock,
    MissingServiceId,
    MissingStatus,
    InvalidField { field: String, detail: String },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingValueBlock => f.write_str("no 'value' block"),
            Self::InvalidValueBlock => f.write_str("'value' block is not an object"),
            Self::MissingServiceId => f.write_str("no 'service_id' found"),
            Self::MissingStatus => f.write_str("no 'status' found"),
            Self::InvalidField { field, detail } => write!(f, "invalid '{field}': {detail}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedEntry {
    pub key: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSnapshot {
    pub entries: Vec<SnapshotEntry>,
    pub skipped: Vec<SkippedEntry>,
}

/// Decodes raw snapshot bytes and parses them.
pub fn parse_snapshot_bytes(
    bytes: &[u8],
    offset: FixedOffset,
) -> Result<ParsedSnapshot, SnapshotError> {
    let document: Value = serde_json::from_slice(bytes)?;
    parse_snapshot(&document, offset)
}

pub fn parse_snapshot(
    document: &Value,
    offset: FixedOffset,
) -> Result<ParsedSnapshot, SnapshotError> {
    let Some(object) = document.as_object() else {
        return Err(SnapshotError::NotAnObject {
            found: json_kind(document),
        });
    };

    let mut parsed = ParsedSnapshot::default();
    let mut seen_ids = HashSet::new();
    for (key, block) in object {
        match parse_entry(key, block, offset) {
            Ok(entry) => {
                if !seen_ids.insert(entry.service_id.clone()) {
                    tracing::warn!(
                        component = "snapshot_parser",
                        event = "duplicate_service_id",
                        key = %key,
                        service_id = %entry.service_id,
                        "later entry overwrites an earlier one in the same batch"
                    );
                }
                parsed.entries.push(entry);
            }
            Err(reason) => {
                tracing::warn!(
                    component = "snapshot_parser",
                    event = "entry_skipped",
                    key = %key,
                    reason = %reason,
                    "ignoring snapshot entry"
                );
                parsed.skipped.push(SkippedEntry {
                    key: key.clone(),
                    reason,
                });
            }
        }
    }

    Ok(parsed)
}

fn parse_entry(key: &str, block: &Value, offset: FixedOffset) -> Result<SnapshotEntry, SkipReason> {
    let record = match block.get("value") {
        None | Some(Value::Null) => return Err(SkipReason::MissingValueBlock),
        Some(Value::Object(record)) if record.is_empty() => {
            return Err(SkipReason::MissingValueBlock)
        }
        Some(Value::Object(record)) => record,
        Some(_) => return Err(SkipReason::InvalidValueBlock),
    };

    let service_id = scalar_text(record.get("service_id")).ok_or(SkipReason::MissingServiceId)?;
    let status = status_field(record)?;

    Ok(SnapshotEntry {
        name: key.to_string(),
        public_ip: optional_text(key, record, "public_ip"),
        private_ip: optional_text(key, record, "private_ip"),
        service_id,
        status,
        additional_information: additional_information(record.get("additional_information")),
        created_at: optional_timestamp(key, record, "created_at", offset),
        updated_at: optional_timestamp(key, record, "updated_at", offset),
    })
}

/// `service_id` is the correlation key: the text is kept exactly as given and
/// only blank values are rejected.
fn scalar_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    (!text.trim().is_empty()).then_some(text)
}

fn status_field(record: &Map<String, Value>) -> Result<i32, SkipReason> {
    let invalid = |detail: String| SkipReason::InvalidField {
        field: "status".to_string(),
        detail,
    };

    match record.get("status") {
        None | Some(Value::Null) => Err(SkipReason::MissingStatus),
        Some(Value::Number(number)) => number
            .as_i64()
            .and_then(|raw| i32::try_from(raw).ok())
            .ok_or_else(|| invalid(format!("{number} is not a small integer"))),
        Some(Value::String(text)) => text
            .trim()
            .parse::<i32>()
            .map_err(|_| invalid(format!("'{text}' is not an integer"))),
        Some(other) => Err(invalid(format!("expected integer, found {}", json_kind(other)))),
    }
}

/// Optional text columns never cause a skip. Scalars are rendered as text, a
/// list of scalars (a Terraform list output) is joined with commas, and any
/// other shape is kept as compact JSON.
fn optional_text(key: &str, record: &Map<String, Value>, field: &str) -> Option<String> {
    let value = record.get(field)?;
    let text = match value {
        Value::Null => return None,
        Value::String(text) => return Some(text.clone()),
        Value::Number(_) | Value::Bool(_) => value.to_string(),
        Value::Array(items) if items.iter().all(is_scalar) => {
            let parts: Vec<String> = items.iter().filter_map(scalar_display).collect();
            if parts.is_empty() {
                return None;
            }
            parts.join(",")
        }
        other => other.to_string(),
    };

    tracing::warn!(
        component = "snapshot_parser",
        event = "field_coerced",
        key = %key,
        field,
        found = json_kind(value),
        stored = %text,
        "non-string value stored as text"
    );
    Some(text)
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn scalar_display(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn additional_information(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn optional_timestamp(
    key: &str,
    record: &Map<String, Value>,
    field: &str,
    offset: FixedOffset,
) -> Option<NaiveDateTime> {
    let raw = match record.get(field)? {
        Value::Null => return None,
        Value::String(text) => text,
        other => {
            tracing::warn!(
                component = "snapshot_parser",
                event = "timestamp_ignored",
                key = %key,
                field,
                found = json_kind(other),
                "timestamp is not a string; the store will assign the current time"
            );
            return None;
        }
    };

    let parsed = parse_timestamp(raw, offset);
    if parsed.is_none() {
        tracing::warn!(
            component = "snapshot_parser",
            event = "timestamp_ignored",
            key = %key,
            field,
            value = %raw,
            "unrecognised timestamp format; the store will assign the current time"
        );
    }
    parsed
}

/// Parses RFC 3339 (shifted into `offset`) or a naive wall-clock timestamp.
pub fn parse_timestamp(raw: &str, offset: FixedOffset) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(zoned) = DateTime::parse_from_rfc3339(raw) {
        return Some(zoned.with_timezone(&offset).naive_local());
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}

pub fn snapshot_fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
