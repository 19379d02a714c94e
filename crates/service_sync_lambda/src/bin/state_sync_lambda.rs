use std::sync::Arc;

use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;
use service_sync_core::clock::OffsetClock;
use service_sync_core::guardian::ConnectionGuardian;
use service_sync_lambda::adapters::mysql::MySqlConnector;
use service_sync_lambda::adapters::object_store::S3SnapshotSource;
use service_sync_lambda::config::{FailurePolicy, StateSyncSettings};
use service_sync_lambda::handlers::response::ApiGatewayResponse;
use service_sync_lambda::handlers::state_events::handle_state_event;
use service_sync_lambda::telemetry::init_tracing;
use tokio::sync::Mutex;

struct RuntimeDependencies {
    snapshots: S3SnapshotSource,
    // One connection per process; concurrent invocations queue on the lock.
    guardian: Mutex<ConnectionGuardian<MySqlConnector>>,
    clock: OffsetClock,
    policy: FailurePolicy,
}

async fn handle_request(
    event: LambdaEvent<Value>,
    deps: &RuntimeDependencies,
) -> Result<ApiGatewayResponse, Error> {
    let mut guardian = deps.guardian.lock().await;
    Ok(handle_state_event(
        &event.payload,
        &deps.snapshots,
        &mut *guardian,
        &deps.clock,
        deps.policy,
    ))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    let settings = StateSyncSettings::from_env()?;
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let guardian = ConnectionGuardian::connect(MySqlConnector::new(&settings.database))?;

    let deps = Arc::new(RuntimeDependencies {
        snapshots: S3SnapshotSource::new(aws_sdk_s3::Client::new(&aws_config)),
        guardian: Mutex::new(guardian),
        clock: OffsetClock::new(settings.timestamp_offset),
        policy: settings.policy,
    });

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let deps = Arc::clone(&deps);
        async move { handle_request(event, &deps).await }
    }))
    .await
}
