//! Reconciliation of a validated snapshot against the `services` table.
//!
//! `apply` runs two independent steps: a batched upsert of the current entries
//! and a mark-absent update for every persisted row the snapshot no longer
//! mentions. A failure in one step is recorded and the other step still runs.

use std::collections::BTreeSet;

use crate::clock::Clock;
use crate::contract::{ReconcileReport, SnapshotEntry, StepOutcome};
use crate::store::{ServiceStore, StoreError};

pub struct Reconciler<'a, S: ServiceStore, C: Clock> {
    store: &'a mut S,
    clock: &'a C,
}

impl<'a, S: ServiceStore, C: Clock> Reconciler<'a, S, C> {
    pub fn new(store: &'a mut S, clock: &'a C) -> Self {
        Self { store, clock }
    }

    pub fn apply(&mut self, entries: &[SnapshotEntry]) -> ReconcileReport {
        if entries.is_empty() {
            tracing::info!(
                component = "reconciler",
                event = "apply_skipped",
                "no valid records to process"
            );
            return ReconcileReport::skipped();
        }

        let service_ids: BTreeSet<String> = entries
            .iter()
            .map(|entry| entry.service_id.clone())
            .collect();

        tracing::info!(
            component = "reconciler",
            event = "upsert_started",
            records = entries.len(),
            "upserting snapshot records"
        );
        let upserted = step_outcome(
            "upsert",
            self.store.upsert_services(entries, self.clock.now()),
        );

        let marked_absent = self.mark_absent(&service_ids);

        ReconcileReport {
            upserted,
            marked_absent,
        }
    }

    pub fn destroy(&mut self) -> ReconcileReport {
        let marked = step_outcome(
            "mark_all_deleted",
            self.store.mark_all_deleted(self.clock.now()),
        );
        ReconcileReport {
            upserted: StepOutcome::Skipped,
            marked_absent: marked,
        }
    }

    fn mark_absent(&mut self, keep: &BTreeSet<String>) -> StepOutcome {
        // An empty exclusion list would render as `NOT IN ()`.
        if keep.is_empty() {
            return StepOutcome::Skipped;
        }
        step_outcome("mark_absent", self.store.mark_absent(keep, self.clock.now()))
    }
}

fn step_outcome(step: &str, result: Result<u64, StoreError>) -> StepOutcome {
    match result {
        Ok(rows) => {
            tracing::info!(
                component = "reconciler",
                event = "step_completed",
                step,
                rows,
                "reconciliation step committed"
            );
            StepOutcome::Applied { rows }
        }
        Err(error) => {
            tracing::error!(
                component = "reconciler",
                event = "step_failed",
                step,
                error = %error,
                "reconciliation step rolled back"
            );
            StepOutcome::Failed {
                error: error.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;
    use crate::contract::STATUS_ACTIVE;
    use crate::test_helpers::FixedClock;

    #[derive(Default)]
    struct RecordingStore {
        calls: Vec<&'static str>,
        fail_upsert: bool,
        last_keep: Option<BTreeSet<String>>,
    }

    impl ServiceStore for RecordingStore {
        fn upsert_services(
            &mut self,
            entries: &[SnapshotEntry],
            _now: NaiveDateTime,
        ) -> Result<u64, StoreError> {
            self.calls.push("upsert");
            if self.fail_upsert {
                return Err(StoreError::Transaction("duplicate key storm".to_string()));
            }
            Ok(entries.len() as u64)
        }

        fn mark_absent(
            &mut self,
            keep: &BTreeSet<String>,
            _now: NaiveDateTime,
        ) -> Result<u64, StoreError> {
            self.calls.push("mark_absent");
            self.last_keep = Some(keep.clone());
            Ok(4)
        }

        fn mark_all_deleted(&mut self, _now: NaiveDateTime) -> Result<u64, StoreError> {
            self.calls.push("mark_all_deleted");
            Ok(0)
        }
    }

    fn entry(service_id: &str) -> SnapshotEntry {
        SnapshotEntry {
            name: format!("name-{service_id}"),
            public_ip: None,
            private_ip: None,
            service_id: service_id.to_string(),
            status: STATUS_ACTIVE,
            additional_information: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn empty_apply_touches_nothing() {
        let mut store = RecordingStore::default();
        let clock = FixedClock::default();

        let report = Reconciler::new(&mut store, &clock).apply(&[]);

        assert_eq!(report, ReconcileReport::skipped());
        assert!(store.calls.is_empty());
    }

    #[test]
    fn mark_absent_runs_after_failed_upsert() {
        let mut store = RecordingStore {
            fail_upsert: true,
            ..RecordingStore::default()
        };
        let clock = FixedClock::default();

        let report = Reconciler::new(&mut store, &clock).apply(&[entry("a"), entry("b")]);

        assert!(report.upserted.is_failed());
        assert_eq!(report.marked_absent, StepOutcome::Applied { rows: 4 });
        assert_eq!(store.calls, vec!["upsert", "mark_absent"]);
        assert_eq!(
            store.last_keep,
            Some(BTreeSet::from(["a".to_string(), "b".to_string()]))
        );
    }

    #[test]
    fn destroy_with_no_active_rows_is_not_an_error() {
        let mut store = RecordingStore::default();
        let clock = FixedClock::default();

        let report = Reconciler::new(&mut store, &clock).destroy();

        assert_eq!(report.marked_absent, StepOutcome::Applied { rows: 0 });
        assert_eq!(report.upserted, StepOutcome::Skipped);
        assert!(!report.has_failures());
    }
}
