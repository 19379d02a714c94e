use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};
use service_sync_core::clock::Clock;
use service_sync_core::contract::{EventRoute, ObjectLocator, ReconcileReport};
use service_sync_core::guardian::{ConnectionGuardian, Connector};
use service_sync_core::reconcile::Reconciler;
use service_sync_core::routing::{classify_key, first_object_record};
use service_sync_core::snapshot::{parse_snapshot_bytes, snapshot_fingerprint, SkippedEntry};
use service_sync_core::store::ServiceStore;

use crate::adapters::object_store::SnapshotSource;
use crate::config::FailurePolicy;
use crate::handlers::response::{json_response, validation_error_response, ApiGatewayResponse};

pub const SUCCESS_MESSAGE: &str = "Modify database service successfully !";
pub const PARTIAL_FAILURE_MESSAGE: &str = "Modify database service finished with errors";
pub const IGNORED_MESSAGE: &str = "Event key does not match apply or destroy events, ignored";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StateEventSummary {
    pub message: String,
    pub action: EventRoute,
    pub bucket: String,
    pub object_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_fingerprint: Option<String>,
    pub valid_entries: usize,
    pub skipped_entries: Vec<SkippedEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ReconcileReport>,
}

impl StateEventSummary {
    fn new(action: EventRoute, locator: &ObjectLocator) -> Self {
        Self {
            message: SUCCESS_MESSAGE.to_string(),
            action,
            bucket: locator.bucket.clone(),
            object_key: locator.key.clone(),
            snapshot_fingerprint: None,
            valid_entries: 0,
            skipped_entries: Vec::new(),
            fetch_error: None,
            report: None,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.fetch_error.is_some()
            || self
                .report
                .as_ref()
                .map(ReconcileReport::has_failures)
                .unwrap_or(false)
    }
}

/// Handles one object-storage notification end to end.
///
/// Only the first record of the event is processed. Reconciliation failures
/// are logged and reported in the body; whether they also change the status
/// code is decided by `policy`.
pub fn handle_state_event<C>(
    event: &Value,
    snapshots: &impl SnapshotSource,
    guardian: &mut ConnectionGuardian<C>,
    clock: &impl Clock,
    policy: FailurePolicy,
) -> ApiGatewayResponse
where
    C: Connector,
    C::Connection: ServiceStore,
{
    let started_at = Instant::now();
    tracing::info!(
        component = "state_event_handler",
        event = "event_received",
        payload = %event,
        "received event"
    );

    let locator = match first_object_record(event) {
        Ok(locator) => locator,
        Err(error) => {
            tracing::warn!(
                component = "state_event_handler",
                event = "event_rejected",
                error = %error,
                "event is not an object-storage notification"
            );
            return validation_error_response(&error.to_string());
        }
    };

    let route = classify_key(&locator.key);
    if route == EventRoute::Ignore {
        tracing::info!(
            component = "state_event_handler",
            event = "event_ignored",
            object_key = %locator.key,
            "no matching event path"
        );
        let mut summary = StateEventSummary::new(route, &locator);
        summary.message = IGNORED_MESSAGE.to_string();
        return json_response(200, summary);
    }

    let store = match guardian.acquire() {
        Ok(store) => store,
        Err(error) => {
            tracing::error!(
                component = "state_event_handler",
                event = "invocation_aborted",
                object_key = %locator.key,
                error = %error,
                "database connection could not be restored"
            );
            return json_response(
                503,
                json!({
                    "error": "database_unavailable",
                    "message": error.to_string(),
                    "object_key": locator.key,
                }),
            );
        }
    };

    let mut summary = StateEventSummary::new(route, &locator);
    tracing::info!(
        component = "state_event_handler",
        event = "processing_started",
        action = route.as_str(),
        bucket = %locator.bucket,
        object_key = %locator.key,
        "processing event"
    );
    match route {
        EventRoute::Apply => apply_snapshot(&locator, snapshots, store, clock, &mut summary),
        EventRoute::Destroy => summary.report = Some(Reconciler::new(store, clock).destroy()),
        EventRoute::Ignore => {}
    }

    finish(summary, policy, started_at)
}

fn apply_snapshot<S: ServiceStore>(
    locator: &ObjectLocator,
    snapshots: &impl SnapshotSource,
    store: &mut S,
    clock: &impl Clock,
    summary: &mut StateEventSummary,
) {
    let bytes = match snapshots.read_object(&locator.bucket, &locator.key) {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::error!(
                component = "state_event_handler",
                event = "snapshot_fetch_failed",
                bucket = %locator.bucket,
                object_key = %locator.key,
                error = %error,
                "error fetching snapshot"
            );
            summary.fetch_error = Some(error);
            return;
        }
    };

    let fingerprint = snapshot_fingerprint(&bytes);
    tracing::info!(
        component = "state_event_handler",
        event = "snapshot_fetched",
        object_key = %locator.key,
        bytes = bytes.len(),
        fingerprint = %fingerprint,
        "snapshot fetched"
    );
    summary.snapshot_fingerprint = Some(fingerprint);

    let parsed = match parse_snapshot_bytes(&bytes, clock.offset()) {
        Ok(parsed) => parsed,
        Err(error) => {
            tracing::error!(
                component = "state_event_handler",
                event = "snapshot_invalid",
                object_key = %locator.key,
                error = %error,
                "snapshot could not be decoded"
            );
            summary.fetch_error = Some(error.to_string());
            return;
        }
    };

    summary.valid_entries = parsed.entries.len();
    summary.skipped_entries = parsed.skipped;
    summary.report = Some(Reconciler::new(store, clock).apply(&parsed.entries));
}

fn finish(
    mut summary: StateEventSummary,
    policy: FailurePolicy,
    started_at: Instant,
) -> ApiGatewayResponse {
    let failed = summary.has_failures();
    if failed {
        summary.message = PARTIAL_FAILURE_MESSAGE.to_string();
    }
    let status_code = if failed && !policy.report_success_on_partial_failure {
        500
    } else {
        200
    };

    tracing::info!(
        component = "state_event_handler",
        event = "processing_completed",
        action = summary.action.as_str(),
        object_key = %summary.object_key,
        failed,
        status_code,
        duration_ms = started_at.elapsed().as_millis() as u64,
        "event processed"
    );
    json_response(status_code, summary)
}
