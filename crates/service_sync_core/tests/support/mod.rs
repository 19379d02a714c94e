#![allow(dead_code)]

use chrono::{Duration, NaiveDateTime};
use serde_json::{json, Value};
use service_sync_core::contract::{ServiceRecord, SnapshotEntry, STATUS_ACTIVE};
use service_sync_core::test_helpers::reference_instant;

pub fn hours_after_reference(hours: i64) -> NaiveDateTime {
    reference_instant() + Duration::hours(hours)
}

pub fn entry(service_id: &str, name: &str) -> SnapshotEntry {
    SnapshotEntry {
        name: name.to_string(),
        public_ip: Some(format!("203.0.113.{}", name.len())),
        private_ip: Some("10.0.0.4".to_string()),
        service_id: service_id.to_string(),
        status: STATUS_ACTIVE,
        additional_information: Some(format!("{{\"owner\":\"{name}\"}}")),
        created_at: None,
        updated_at: None,
    }
}

pub fn persisted(service_id: &str, status: i32) -> ServiceRecord {
    ServiceRecord {
        name: format!("old-{service_id}"),
        public_ip: None,
        private_ip: None,
        service_id: service_id.to_string(),
        status,
        additional_information: None,
        created_at: reference_instant(),
        updated_at: reference_instant(),
    }
}

/// A snapshot document shaped like the provider's output export.
pub fn snapshot_document(services: &[(&str, &str)]) -> Value {
    let mut document = serde_json::Map::new();
    for (name, service_id) in services {
        document.insert(
            (*name).to_string(),
            json!({
                "sensitive": false,
                "type": "object",
                "value": {
                    "service_id": service_id,
                    "status": 1,
                    "public_ip": "198.51.100.7",
                    "private_ip": "10.1.0.7"
                }
            }),
        );
    }
    Value::Object(document)
}
