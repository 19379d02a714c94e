use std::collections::BTreeSet;

use chrono::NaiveDateTime;

use crate::contract::SnapshotEntry;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("database connection unavailable: {0}")]
    Connection(String),
    #[error("transaction rolled back: {0}")]
    Transaction(String),
    #[error("refusing to mark rows absent against an empty id set")]
    EmptyExclusionSet,
}

/// Write access to the `services` table.
///
/// Every method runs in its own transaction: it either commits completely or
/// rolls back and returns an error.
pub trait ServiceStore {
    /// Inserts each entry keyed by `service_id`, or overwrites the mutable
    /// columns of an existing row and stamps `updated_at = now`. Returns the
    /// number of entries written.
    fn upsert_services(
        &mut self,
        entries: &[SnapshotEntry],
        now: NaiveDateTime,
    ) -> Result<u64, StoreError>;

    /// Sets `status = 2` and `updated_at = now` on every row whose
    /// `service_id` is not in `keep`.
    fn mark_absent(
        &mut self,
        keep: &BTreeSet<String>,
        now: NaiveDateTime,
    ) -> Result<u64, StoreError>;

    /// Sets `status = 2` and `updated_at = now` on every active row.
    fn mark_all_deleted(&mut self, now: NaiveDateTime) -> Result<u64, StoreError>;
}
