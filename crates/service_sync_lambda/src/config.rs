//! Environment-driven settings for the Lambda binaries.

use std::time::Duration;

use chrono::FixedOffset;
use service_sync_core::clock::{offset_from_hours, DEFAULT_TIMESTAMP_OFFSET_HOURS};
use service_sync_core::parameters::DEFAULT_PARAMETER_NAMESPACE;

pub const DEFAULT_DB_PORT: u16 = 3306;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be configured")]
    Missing(&'static str),
    #[error("{var}={value} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// What the state-event handler reports when a reconciliation step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailurePolicy {
    /// Step failures are logged and the handler still answers 200.
    pub report_success_on_partial_failure: bool,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            report_success_on_partial_failure: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSyncSettings {
    pub database: DatabaseSettings,
    pub timestamp_offset: FixedOffset,
    pub policy: FailurePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSettings {
    pub namespace: String,
}

impl StateSyncSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database = DatabaseSettings {
            host: required(&lookup, "DB_HOST")?,
            port: parsed_or(&lookup, "DB_PORT", DEFAULT_DB_PORT, "expected a TCP port")?,
            user: required(&lookup, "DB_USER")?,
            password: required(&lookup, "DB_PASS")?,
            database: required(&lookup, "DB_NAME")?,
            connect_timeout: Duration::from_secs(parsed_or(
                &lookup,
                "DB_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
                "expected whole seconds",
            )?),
        };

        let offset_hours: i32 = parsed_or(
            &lookup,
            "TIMESTAMP_UTC_OFFSET_HOURS",
            DEFAULT_TIMESTAMP_OFFSET_HOURS,
            "expected whole hours",
        )?;
        let timestamp_offset = offset_from_hours(offset_hours).ok_or(ConfigError::Invalid {
            var: "TIMESTAMP_UTC_OFFSET_HOURS",
            value: offset_hours.to_string(),
            reason: "offset must be within +/-23 hours",
        })?;

        let policy = FailurePolicy {
            report_success_on_partial_failure: flag_or(
                &lookup,
                "REPORT_SUCCESS_ON_PARTIAL_FAILURE",
                true,
            )?,
        };

        Ok(Self {
            database,
            timestamp_offset,
            policy,
        })
    }
}

impl ParameterSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            namespace: optional(&lookup, "PARAMETER_NAMESPACE")
                .unwrap_or_else(|| DEFAULT_PARAMETER_NAMESPACE.to_string()),
        }
    }
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Option<String> {
    lookup(var)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<String, ConfigError> {
    optional(lookup, var).ok_or(ConfigError::Missing(var))
}

fn parsed_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
    reason: &'static str,
) -> Result<T, ConfigError> {
    match optional(lookup, var) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value, reason }),
    }
}

fn flag_or(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match optional(lookup, var) {
        None => Ok(default),
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::Invalid {
                var,
                value,
                reason: "expected true or false",
            }),
        },
    }
}
