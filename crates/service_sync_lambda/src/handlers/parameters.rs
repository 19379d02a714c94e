//! Get/put handlers for configuration parameters under a fixed namespace.

use serde_json::{json, Value};
use service_sync_core::parameters::{
    qualified_name, ParameterRequestError, ParameterStore, ParameterStoreError, ParameterType,
};

use crate::handlers::response::{
    json_response, message_response, normalize_apigw_event, validation_error_response,
    ApiGatewayResponse,
};

pub fn handle_get_parameter_event(
    event: &Value,
    namespace: &str,
    store: &impl ParameterStore,
) -> ApiGatewayResponse {
    let Some(name) = event
        .pointer("/queryStringParameters/parameterName")
        .and_then(Value::as_str)
    else {
        return validation_error_response(&ParameterRequestError::MissingName.to_string());
    };
    let with_decryption = truthy(event.pointer("/queryStringParameters/withDecryption"));

    let full_name = match qualified_name(namespace, name) {
        Ok(full_name) => full_name,
        Err(error) => return validation_error_response(&error.to_string()),
    };

    tracing::info!(
        component = "parameter_handler",
        event = "get_parameter",
        name = %full_name,
        with_decryption,
        "getting parameter"
    );

    match store.get_parameter(&full_name, with_decryption) {
        Ok(parameter) => json_response(
            200,
            json!({
                "message": "Parameter retrieved successfully",
                "parameter": parameter,
            }),
        ),
        Err(error) => store_error_response(&full_name, "ssm:GetParameter", &error),
    }
}

pub fn handle_put_parameter_event(
    event: Value,
    namespace: &str,
    store: &impl ParameterStore,
) -> ApiGatewayResponse {
    let payload = match normalize_apigw_event(event) {
        Ok(payload) => payload,
        Err(message) => return validation_error_response(&message),
    };

    let name = payload.get("parameter_name").and_then(Value::as_str);
    let value = payload.get("parameter_value").and_then(Value::as_str);
    let (Some(name), Some(value)) = (name, value) else {
        return validation_error_response(&ParameterRequestError::MissingNameOrValue.to_string());
    };

    let parameter_type = match payload.get("parameter_type").and_then(Value::as_str) {
        None => ParameterType::default(),
        Some(raw) => match raw.parse::<ParameterType>() {
            Ok(parameter_type) => parameter_type,
            Err(error) => return validation_error_response(&error.to_string()),
        },
    };
    let overwrite = truthy(payload.get("overwrite"));

    let full_name = match qualified_name(namespace, name) {
        Ok(full_name) => full_name,
        Err(error) => return validation_error_response(&error.to_string()),
    };

    tracing::info!(
        component = "parameter_handler",
        event = "put_parameter",
        name = %full_name,
        parameter_type = parameter_type.as_str(),
        overwrite,
        "storing parameter"
    );

    match store.put_parameter(&full_name, value, parameter_type, overwrite) {
        Ok(version) => {
            tracing::info!(
                component = "parameter_handler",
                event = "parameter_stored",
                name = %full_name,
                version,
                "parameter stored"
            );
            json_response(
                200,
                json!({
                    "message": "Parameter stored successfully",
                    "version": version,
                }),
            )
        }
        Err(error) => store_error_response(&full_name, "ssm:PutParameter", &error),
    }
}

fn store_error_response(
    name: &str,
    permission: &str,
    error: &ParameterStoreError,
) -> ApiGatewayResponse {
    tracing::error!(
        component = "parameter_handler",
        event = "parameter_store_failed",
        name,
        error = %error,
        "parameter store request failed"
    );

    match error {
        ParameterStoreError::AlreadyExists => message_response(
            409,
            &format!("Parameter '{name}' existed. Set overwrite=true to replace it."),
        ),
        ParameterStoreError::AccessDenied => {
            message_response(403, &format!("No permission for {permission}."))
        }
        ParameterStoreError::NotFound => {
            message_response(404, &format!("Parameter '{name}' not found."))
        }
        ParameterStoreError::Service { code, .. } => {
            message_response(500, &format!("Error from AWS: {code}"))
        }
        ParameterStoreError::Transport(_) => {
            message_response(500, "Unexpected error while calling the parameter store")
        }
    }
}

/// Query strings carry booleans as text; only explicit true values count.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => matches!(text.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        Some(Value::Number(number)) => number.as_i64() == Some(1),
        _ => false,
    }
}
