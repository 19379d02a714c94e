use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const STATUS_ACTIVE: i32 = 1;
pub const STATUS_DELETED: i32 = 2;

pub const APPLY_EVENTS_SEGMENT: &str = "apply-events/";
pub const DESTROY_EVENTS_SEGMENT: &str = "destroy-events/";

/// One validated record taken from a snapshot's `value` block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub name: String,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
    pub service_id: String,
    pub status: i32,
    pub additional_information: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

/// A row of the `services` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceRecord {
    pub name: String,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
    pub service_id: String,
    pub status: i32,
    pub additional_information: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl ServiceRecord {
    pub fn from_entry(entry: &SnapshotEntry, now: NaiveDateTime) -> Self {
        Self {
            name: entry.name.clone(),
            public_ip: entry.public_ip.clone(),
            private_ip: entry.private_ip.clone(),
            service_id: entry.service_id.clone(),
            status: entry.status,
            additional_information: entry.additional_information.clone(),
            created_at: entry.created_at.unwrap_or(now),
            updated_at: entry.updated_at.unwrap_or(now),
        }
    }

    /// Overwrites the mutable columns the way the upsert's update branch does.
    pub fn overwrite_from(&mut self, entry: &SnapshotEntry, now: NaiveDateTime) {
        self.name = entry.name.clone();
        self.public_ip = entry.public_ip.clone();
        self.private_ip = entry.private_ip.clone();
        self.status = entry.status;
        self.additional_information = entry.additional_information.clone();
        self.updated_at = now;
    }
}

/// Bucket and key of the object that triggered an invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectLocator {
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventRoute {
    Apply,
    Destroy,
    Ignore,
}

impl EventRoute {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::Destroy => "destroy",
            Self::Ignore => "ignore",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StepOutcome {
    Applied { rows: u64 },
    Skipped,
    Failed { error: String },
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn rows(&self) -> u64 {
        match self {
            Self::Applied { rows } => *rows,
            Self::Skipped | Self::Failed { .. } => 0,
        }
    }
}

/// Per-step result of one reconciliation. Each step is its own failure domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconcileReport {
    pub upserted: StepOutcome,
    pub marked_absent: StepOutcome,
}

impl ReconcileReport {
    pub fn skipped() -> Self {
        Self {
            upserted: StepOutcome::Skipped,
            marked_absent: StepOutcome::Skipped,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.upserted.is_failed() || self.marked_absent.is_failed()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|date| date.and_hms_opt(hour, 0, 0))
            .expect("valid timestamp")
    }

    fn entry() -> SnapshotEntry {
        SnapshotEntry {
            name: "web".to_string(),
            public_ip: Some("203.0.113.10".to_string()),
            private_ip: None,
            service_id: "svc-1".to_string(),
            status: STATUS_ACTIVE,
            additional_information: None,
            created_at: None,
            updated_at: Some(at(3)),
        }
    }

    #[test]
    fn from_entry_defaults_missing_timestamps_to_now() {
        let record = ServiceRecord::from_entry(&entry(), at(9));
        assert_eq!(record.created_at, at(9));
        assert_eq!(record.updated_at, at(3));
    }

    #[test]
    fn overwrite_keeps_created_at_and_stamps_updated_at() {
        let mut record = ServiceRecord::from_entry(&entry(), at(1));
        let mut changed = entry();
        changed.name = "web-renamed".to_string();
        changed.status = STATUS_DELETED;

        record.overwrite_from(&changed, at(10));

        assert_eq!(record.name, "web-renamed");
        assert_eq!(record.status, STATUS_DELETED);
        assert_eq!(record.created_at, at(1));
        assert_eq!(record.updated_at, at(10));
    }

    #[test]
    fn step_outcome_serializes_with_state_tag() {
        let value = serde_json::to_value(StepOutcome::Applied { rows: 3 }).expect("serializes");
        assert_eq!(value, serde_json::json!({"state": "applied", "rows": 3}));
    }
}
