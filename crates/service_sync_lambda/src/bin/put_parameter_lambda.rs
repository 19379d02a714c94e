use std::sync::Arc;

use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;
use service_sync_lambda::adapters::parameter_store::SsmParameterStore;
use service_sync_lambda::config::ParameterSettings;
use service_sync_lambda::handlers::parameters::handle_put_parameter_event;
use service_sync_lambda::handlers::response::ApiGatewayResponse;
use service_sync_lambda::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    let settings = ParameterSettings::from_env();
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let store = Arc::new(SsmParameterStore::new(aws_sdk_ssm::Client::new(&aws_config)));
    let namespace: Arc<str> = Arc::from(settings.namespace);

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let store = Arc::clone(&store);
        let namespace = Arc::clone(&namespace);
        async move {
            Ok::<ApiGatewayResponse, Error>(handle_put_parameter_event(
                event.payload,
                &namespace,
                store.as_ref(),
            ))
        }
    }))
    .await
}
