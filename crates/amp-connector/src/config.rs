//! Configuration types
//!
//! Shared configuration pieces: the validation trait, transport timeouts and
//! the credentials a caller has already acquired for a provider.

use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::ConnectorResult;

const REDACTED: &str = "***REDACTED***";

/// Trait for connector configuration.
pub trait ConnectorConfig: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Validate the configuration.
    fn validate(&self) -> ConnectorResult<()>;

    /// Create a copy with secrets replaced by placeholders (for logging).
    fn redacted(&self) -> Self;
}

/// Transport timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Connection timeout in seconds.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Read timeout in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_read_timeout() -> u64 {
    60
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connection_timeout_secs: default_connection_timeout(),
            read_timeout_secs: default_read_timeout(),
        }
    }
}

impl ConnectionSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connection_timeout(mut self, secs: u64) -> Self {
        self.connection_timeout_secs = secs;
        self
    }

    pub fn with_read_timeout(mut self, secs: u64) -> Self {
        self.read_timeout_secs = secs;
        self
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

/// Where an API key is attached to outgoing requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyLocation {
    #[default]
    Header,
    Query,
}

/// Credentials injected into every request.
///
/// Tokens are expected to be valid already; acquiring and refreshing them is
/// the caller's concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    #[default]
    None,

    /// Basic authentication (username/password).
    Basic {
        username: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        password: Option<String>,
    },

    /// API key sent in a header or query parameter.
    ApiKey {
        key: String,
        /// Header name or query parameter name, depending on `location`.
        #[serde(default = "default_api_key_name")]
        name: String,
        #[serde(default)]
        location: ApiKeyLocation,
    },

    /// Bearer token authentication.
    Bearer { token: String },
}

fn default_api_key_name() -> String {
    "X-API-Key".to_string()
}

impl AuthConfig {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        AuthConfig::Basic {
            username: username.into(),
            password: Some(password.into()),
        }
    }

    /// API key in the default `X-API-Key` header.
    pub fn api_key(key: impl Into<String>) -> Self {
        AuthConfig::ApiKey {
            key: key.into(),
            name: default_api_key_name(),
            location: ApiKeyLocation::Header,
        }
    }

    /// API key sent as the query parameter `param`.
    pub fn api_key_query(key: impl Into<String>, param: impl Into<String>) -> Self {
        AuthConfig::ApiKey {
            key: key.into(),
            name: param.into(),
            location: ApiKeyLocation::Query,
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        AuthConfig::Bearer {
            token: token.into(),
        }
    }

    /// Whether a credential is configured at all.
    pub fn has_credentials(&self) -> bool {
        match self {
            AuthConfig::None => false,
            AuthConfig::Basic { username, .. } => !username.is_empty(),
            AuthConfig::ApiKey { key, .. } => !key.is_empty(),
            AuthConfig::Bearer { token } => !token.is_empty(),
        }
    }

    pub fn redacted(&self) -> Self {
        match self {
            AuthConfig::None => AuthConfig::None,
            AuthConfig::Basic { username, .. } => AuthConfig::Basic {
                username: username.clone(),
                password: Some(REDACTED.to_string()),
            },
            AuthConfig::ApiKey { name, location, .. } => AuthConfig::ApiKey {
                key: REDACTED.to_string(),
                name: name.clone(),
                location: *location,
            },
            AuthConfig::Bearer { .. } => AuthConfig::Bearer {
                token: REDACTED.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_settings_defaults() {
        let settings = ConnectionSettings::default();
        assert_eq!(settings.connection_timeout_secs, 30);
        assert_eq!(settings.read_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_connection_settings_deserialize_partial() {
        let settings: ConnectionSettings =
            serde_json::from_str(r#"{"read_timeout_secs": 5}"#).unwrap();
        assert_eq!(settings.connection_timeout_secs, 30);
        assert_eq!(settings.read_timeout_secs, 5);
    }

    #[test]
    fn test_auth_config_redacted() {
        let redacted = AuthConfig::basic("admin", "secret").redacted();
        if let AuthConfig::Basic { username, password } = redacted {
            assert_eq!(username, "admin");
            assert_eq!(password.as_deref(), Some(REDACTED));
        } else {
            panic!("Expected Basic auth");
        }
    }

    #[test]
    fn test_auth_config_api_key_serialization() {
        let json = serde_json::to_string(&AuthConfig::api_key_query("k", "api_key")).unwrap();
        assert!(json.contains("\"type\":\"api_key\""));
        assert!(json.contains("\"location\":\"query\""));

        let parsed: AuthConfig = serde_json::from_str(r#"{"type":"api_key","key":"k"}"#).unwrap();
        match parsed {
            AuthConfig::ApiKey { name, location, .. } => {
                assert_eq!(name, "X-API-Key");
                assert_eq!(location, ApiKeyLocation::Header);
            }
            other => panic!("Expected ApiKey auth, got {other:?}"),
        }
    }

    #[test]
    fn test_has_credentials() {
        assert!(!AuthConfig::None.has_credentials());
        assert!(AuthConfig::bearer("t").has_credentials());
        assert!(!AuthConfig::bearer("").has_credentials());
    }
}
