use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiGatewayResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: Value,
    pub body: String,
}

impl ApiGatewayResponse {
    pub fn body_json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or_else(|_| Value::String(self.body.clone()))
    }
}

pub fn json_response(status_code: u16, payload: impl Serialize) -> ApiGatewayResponse {
    let body = serde_json::to_string(&payload).unwrap_or_else(|error| {
        json!({
            "error": "serialization_error",
            "message": error.to_string(),
        })
        .to_string()
    });
    ApiGatewayResponse {
        status_code,
        headers: json!({"Content-Type": "application/json"}),
        body,
    }
}

pub fn message_response(status_code: u16, message: &str) -> ApiGatewayResponse {
    json_response(status_code, json!({ "message": message }))
}

pub fn validation_error_response(message: &str) -> ApiGatewayResponse {
    json_response(
        400,
        json!({
            "error": "validation_error",
            "message": message,
        }),
    )
}

/// Unwraps an API Gateway proxy `body`, or passes a direct invocation through.
pub fn normalize_apigw_event(event: Value) -> Result<Value, String> {
    let Some(object) = event.as_object() else {
        return Err("Request payload must be a JSON object".to_string());
    };

    let Some(body) = object.get("body") else {
        return Ok(event);
    };

    match body {
        Value::Null => Ok(json!({})),
        Value::Object(_) => Ok(body.clone()),
        Value::String(text) => {
            serde_json::from_str(text).map_err(|error| format!("Malformed JSON body: {error}"))
        }
        _ => Err("Request body must be a JSON object".to_string()),
    }
}
