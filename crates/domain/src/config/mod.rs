mod endpoints;

pub use endpoints::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Credentials
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Identity of one streamer + application pair. Immutable once a client
/// is built from it.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    /// Streamer identity code.
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub app_id: i64,
    #[serde(default, rename = "accessKeyId")]
    pub access_key_id: String,
    #[serde(default, rename = "accessKeySecret")]
    pub access_key_secret: String,
}

impl Credentials {
    pub fn new(
        code: impl Into<String>,
        app_id: i64,
        access_key_id: impl Into<String>,
        access_key_secret: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            app_id,
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
        }
    }
}

// The secret never reaches logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("code", &self.code)
            .field("app_id", &self.app_id)
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"***")
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The JSON configuration document.
///
/// Credentials sit at the top level of the file (`code`, `app_id`,
/// `accessKeyId`, `accessKeySecret`); everything else is optional.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(flatten)]
    pub credentials: Credentials,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
}

impl Config {
    /// The document written when no config file exists yet.
    pub fn template() -> Self {
        Self::default()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let creds = &self.credentials;

        let required = [
            ("code", &creds.code),
            ("accessKeyId", &creds.access_key_id),
            ("accessKeySecret", &creds.access_key_secret),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: field.into(),
                    message: "must not be empty".into(),
                });
            }
        }

        if creds.app_id <= 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "app_id".into(),
                message: "must be a positive application id".into(),
            });
        }

        // Header values must be plain ASCII.
        if !creds.access_key_id.is_ascii() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "accessKeyId".into(),
                message: "must contain only ASCII characters".into(),
            });
        }

        if self.endpoints.api_base_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "endpoints.api_base_url".into(),
                message: "api_base_url must not be empty".into(),
            });
        }

        if self.endpoints.ws_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "endpoints.ws_url".into(),
                message: "ws_url must not be empty".into(),
            });
        }

        // The server drops sessions that miss a ~30s heartbeat window.
        let interval = self.endpoints.heartbeat_interval_secs;
        if interval == 0 || interval > 30 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "endpoints.heartbeat_interval_secs".into(),
                message: format!("{interval}s is outside the 1..=30s keepalive window"),
            });
        }

        errors
    }

    /// True when [`validate`](Self::validate) reports no hard errors.
    pub fn is_valid(&self) -> bool {
        self.validate()
            .iter()
            .all(|e| e.severity != ConfigSeverity::Error)
    }
}
