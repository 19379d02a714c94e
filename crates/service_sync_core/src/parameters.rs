//! Parameter-store contract for configuration values under a fixed namespace.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PARAMETER_NAMESPACE: &str = "/betterversion/";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ParameterType {
    #[default]
    String,
    StringList,
    SecureString,
}

impl ParameterType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "String",
            Self::StringList => "StringList",
            Self::SecureString => "SecureString",
        }
    }
}

impl FromStr for ParameterType {
    type Err = ParameterRequestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "String" => Ok(Self::String),
            "StringList" => Ok(Self::StringList),
            "SecureString" => Ok(Self::SecureString),
            other => Err(ParameterRequestError::InvalidType(other.to_string())),
        }
    }
}

/// A parameter as returned by the store, serialized in the store's own casing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct StoredParameter {
    pub name: String,
    pub value: String,
    #[serde(rename = "Type")]
    pub parameter_type: Option<String>,
    pub version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified_date: Option<String>,
    #[serde(rename = "ARN", skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParameterRequestError {
    #[error("Parameter name is required.")]
    MissingName,
    #[error("Parameter name and value are required.")]
    MissingNameOrValue,
    #[error("parameter name '{0}' is not allowed")]
    InvalidName(String),
    #[error("unsupported parameter type '{0}', expected String, StringList or SecureString")]
    InvalidType(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParameterStoreError {
    #[error("parameter already exists")]
    AlreadyExists,
    #[error("access denied")]
    AccessDenied,
    #[error("parameter not found")]
    NotFound,
    #[error("service error {code}: {message}")]
    Service { code: String, message: String },
    #[error("request failed: {0}")]
    Transport(String),
}

impl ParameterStoreError {
    /// Maps a service error code onto the variants callers branch on.
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        match code {
            "ParameterAlreadyExists" => Self::AlreadyExists,
            "AccessDeniedException" => Self::AccessDenied,
            "ParameterNotFound" => Self::NotFound,
            other => Self::Service {
                code: other.to_string(),
                message: message.into(),
            },
        }
    }
}

pub trait ParameterStore {
    fn get_parameter(
        &self,
        name: &str,
        with_decryption: bool,
    ) -> Result<StoredParameter, ParameterStoreError>;

    /// Returns the version assigned to the stored value.
    fn put_parameter(
        &self,
        name: &str,
        value: &str,
        parameter_type: ParameterType,
        overwrite: bool,
    ) -> Result<i64, ParameterStoreError>;
}

/// Places `name` under `namespace`, joined by exactly one `/`.
pub fn qualified_name(namespace: &str, name: &str) -> Result<String, ParameterRequestError> {
    let relative = name.trim().trim_start_matches('/');
    if relative.is_empty() {
        return Err(ParameterRequestError::MissingName);
    }
    if relative.split('/').any(|segment| segment == "..") {
        return Err(ParameterRequestError::InvalidName(name.to_string()));
    }

    let prefix = namespace.trim().trim_end_matches('/');
    let prefix = if prefix.starts_with('/') || prefix.is_empty() {
        prefix.to_string()
    } else {
        format!("/{prefix}")
    };
    Ok(format!("{prefix}/{relative}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualifies_names_under_namespace() {
        assert_eq!(
            qualified_name(DEFAULT_PARAMETER_NAMESPACE, "db/password").as_deref(),
            Ok("/betterversion/db/password")
        );
        assert_eq!(
            qualified_name("betterversion", "/db").as_deref(),
            Ok("/betterversion/db")
        );
        assert_eq!(qualified_name("/", "flag").as_deref(), Ok("/flag"));
    }

    #[test]
    fn rejects_empty_and_traversing_names() {
        assert_eq!(
            qualified_name(DEFAULT_PARAMETER_NAMESPACE, " "),
            Err(ParameterRequestError::MissingName)
        );
        assert_eq!(
            qualified_name(DEFAULT_PARAMETER_NAMESPACE, "../other/secret"),
            Err(ParameterRequestError::InvalidName("../other/secret".to_string()))
        );
    }

    #[test]
    fn parses_parameter_types() {
        assert_eq!("SecureString".parse::<ParameterType>(), Ok(ParameterType::SecureString));
        assert!(matches!(
            "Blob".parse::<ParameterType>(),
            Err(ParameterRequestError::InvalidType(value)) if value == "Blob"
        ));
    }

    #[test]
    fn maps_service_error_codes() {
        assert_eq!(
            ParameterStoreError::from_code("ParameterAlreadyExists", ""),
            ParameterStoreError::AlreadyExists
        );
        assert_eq!(
            ParameterStoreError::from_code("ThrottlingException", "slow down"),
            ParameterStoreError::Service {
                code: "ThrottlingException".to_string(),
                message: "slow down".to_string(),
            }
        );
    }

    #[test]
    fn stored_parameter_uses_store_casing() {
        let parameter = StoredParameter {
            name: "/betterversion/flag".to_string(),
            value: "on".to_string(),
            parameter_type: Some("String".to_string()),
            version: 3,
            last_modified_date: Some("2024-01-01T00:00:00Z".to_string()),
            arn: None,
            data_type: None,
        };

        let value = serde_json::to_value(parameter).expect("serializes");
        assert_eq!(value["Name"], "/betterversion/flag");
        assert_eq!(value["Type"], "String");
        assert_eq!(value["LastModifiedDate"], "2024-01-01T00:00:00Z");
        assert!(value.get("ARN").is_none());
    }
}
