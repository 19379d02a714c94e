//! In-process doubles for the store and clock seams.
//!
//! `MemoryServiceStore` applies the same row semantics as the MySQL statements,
//! so reconciliation behaviour can be exercised without a database.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{FixedOffset, NaiveDate, NaiveDateTime};

use crate::clock::{default_offset, Clock};
use crate::contract::{ServiceRecord, SnapshotEntry, STATUS_ACTIVE, STATUS_DELETED};
use crate::store::{ServiceStore, StoreError};

/// 2024-01-01 00:00:00, the default instant of [`FixedClock`].
pub fn reference_instant() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock {
    pub now: NaiveDateTime,
    pub offset: FixedOffset,
}

impl FixedClock {
    pub fn at(now: NaiveDateTime) -> Self {
        Self {
            now,
            offset: default_offset(),
        }
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        Self::at(reference_instant())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.now
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}

#[derive(Debug, Default)]
struct MemoryTable {
    rows: BTreeMap<String, ServiceRecord>,
    fail_upsert: Option<String>,
    fail_mark: Option<String>,
    writes: usize,
}

/// A `services` table kept in memory. Clones share the same table, so a test
/// can hand one clone to the code under test and inspect another.
#[derive(Debug, Clone, Default)]
pub struct MemoryServiceStore {
    table: Arc<Mutex<MemoryTable>>,
}

impl MemoryServiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: impl IntoIterator<Item = ServiceRecord>) -> Self {
        let store = Self::new();
        {
            let mut table = store.lock();
            for row in rows {
                table.rows.insert(row.service_id.clone(), row);
            }
        }
        store
    }

    pub fn rows(&self) -> Vec<ServiceRecord> {
        self.lock().rows.values().cloned().collect()
    }

    pub fn row(&self, service_id: &str) -> Option<ServiceRecord> {
        self.lock().rows.get(service_id).cloned()
    }

    /// Number of committed write transactions.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    pub fn fail_upserts_with(&self, message: impl Into<String>) {
        self.lock().fail_upsert = Some(message.into());
    }

    pub fn fail_marks_with(&self, message: impl Into<String>) {
        self.lock().fail_mark = Some(message.into());
    }

    fn lock(&self) -> MutexGuard<'_, MemoryTable> {
        // A panicking test must not hide the table from the assertions that follow.
        self.table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ServiceStore for MemoryServiceStore {
    fn upsert_services(
        &mut self,
        entries: &[SnapshotEntry],
        now: NaiveDateTime,
    ) -> Result<u64, StoreError> {
        let mut table = self.lock();
        if let Some(message) = table.fail_upsert.clone() {
            return Err(StoreError::Transaction(message));
        }

        let mut staged = table.rows.clone();
        for entry in entries {
            staged
                .entry(entry.service_id.clone())
                .and_modify(|row| row.overwrite_from(entry, now))
                .or_insert_with(|| ServiceRecord::from_entry(entry, now));
        }
        table.rows = staged;
        table.writes += 1;
        Ok(entries.len() as u64)
    }

    fn mark_absent(
        &mut self,
        keep: &BTreeSet<String>,
        now: NaiveDateTime,
    ) -> Result<u64, StoreError> {
        if keep.is_empty() {
            return Err(StoreError::EmptyExclusionSet);
        }
        let mut table = self.lock();
        if let Some(message) = table.fail_mark.clone() {
            return Err(StoreError::Transaction(message));
        }

        let mut affected = 0u64;
        for row in table.rows.values_mut() {
            if !keep.contains(&row.service_id) {
                row.status = STATUS_DELETED;
                row.updated_at = now;
                affected += 1;
            }
        }
        table.writes += 1;
        Ok(affected)
    }

    fn mark_all_deleted(&mut self, now: NaiveDateTime) -> Result<u64, StoreError> {
        let mut table = self.lock();
        if let Some(message) = table.fail_mark.clone() {
            return Err(StoreError::Transaction(message));
        }

        let mut affected = 0u64;
        for row in table.rows.values_mut() {
            if row.status == STATUS_ACTIVE {
                row.status = STATUS_DELETED;
                row.updated_at = now;
                affected += 1;
            }
        }
        table.writes += 1;
        Ok(affected)
    }
}
