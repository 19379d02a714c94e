use serde_json::Value;

use crate::contract::{EventRoute, ObjectLocator, APPLY_EVENTS_SEGMENT, DESTROY_EVENTS_SEGMENT};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    #[error("event must include a non-empty Records array")]
    MissingRecords,
    #[error("event record is missing {0}")]
    MissingField(&'static str),
}

/// Extracts the bucket and key of the first record of an object-storage
/// notification. Any further records in the batch are not read.
pub fn first_object_record(event: &Value) -> Result<ObjectLocator, RoutingError> {
    let record = event
        .get("Records")
        .and_then(Value::as_array)
        .and_then(|records| records.first())
        .ok_or(RoutingError::MissingRecords)?;

    let s3 = record.get("s3").ok_or(RoutingError::MissingField("s3"))?;
    let bucket = s3
        .pointer("/bucket/name")
        .and_then(Value::as_str)
        .ok_or(RoutingError::MissingField("s3.bucket.name"))?;
    let key = s3
        .pointer("/object/key")
        .and_then(Value::as_str)
        .ok_or(RoutingError::MissingField("s3.object.key"))?;

    Ok(ObjectLocator {
        bucket: bucket.to_string(),
        key: key.to_string(),
    })
}

pub fn classify_key(key: &str) -> EventRoute {
    if key.contains(APPLY_EVENTS_SEGMENT) {
        EventRoute::Apply
    } else if key.contains(DESTROY_EVENTS_SEGMENT) {
        EventRoute::Destroy
    } else {
        EventRoute::Ignore
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn s3_event(keys: &[&str]) -> Value {
        let records: Vec<Value> = keys
            .iter()
            .map(|key| {
                json!({
                    "eventSource": "aws:s3",
                    "s3": {
                        "bucket": {"name": "infra-state"},
                        "object": {"key": key}
                    }
                })
            })
            .collect();
        json!({ "Records": records })
    }

    #[test]
    fn classifies_keys_by_path_segment() {
        assert_eq!(classify_key("destroy-events/2024-01-01.json"), EventRoute::Destroy);
        assert_eq!(classify_key("apply-events/foo.json"), EventRoute::Apply);
        assert_eq!(classify_key("env/prod/apply-events/foo.json"), EventRoute::Apply);
        assert_eq!(classify_key("unrelated/file.json"), EventRoute::Ignore);
        assert_eq!(classify_key("apply-events"), EventRoute::Ignore);
    }

    #[test]
    fn reads_only_the_first_record() {
        let event = s3_event(&["apply-events/a.json", "destroy-events/b.json"]);

        let locator = first_object_record(&event).expect("record should parse");
        assert_eq!(locator.bucket, "infra-state");
        assert_eq!(locator.key, "apply-events/a.json");
    }

    #[test]
    fn rejects_events_without_records() {
        assert_eq!(
            first_object_record(&json!({"Records": []})),
            Err(RoutingError::MissingRecords)
        );
        assert_eq!(
            first_object_record(&json!({"detail": {}})),
            Err(RoutingError::MissingRecords)
        );
    }

    #[test]
    fn rejects_records_without_object_key() {
        let event = json!({"Records": [{"s3": {"bucket": {"name": "b"}, "object": {}}}]});
        assert_eq!(
            first_object_record(&event),
            Err(RoutingError::MissingField("s3.object.key"))
        );
    }
}
