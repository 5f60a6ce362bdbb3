//! REST Connector configuration
//!
//! Configuration types for generic HTTP providers: base URL, credentials,
//! pagination conventions and response layout.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use amp_connector::config::{AuthConfig, ConnectionSettings, ConnectorConfig};
use amp_connector::error::{ConnectorError, ConnectorResult};
use amp_connector::filter::{TimeBoundary, TimeOrder, TimestampFormat};
use amp_connector::metadata::DEFAULT_METADATA_CONCURRENCY;
use amp_connector::types::ModuleId;
use amp_connector::webhook::VerificationParams;

/// Placeholder in `base_url` replaced by the configured workspace.
pub const WORKSPACE_PLACEHOLDER: &str = "{{.workspace}}";

const REDACTED: &str = "***REDACTED***";

/// Request/response logging verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogVerbosity {
    /// No request/response logging.
    None,
    /// One line per completed request (default).
    #[default]
    Info,
    /// Requests and responses, without bodies.
    Debug,
    /// Requests and responses, with bodies.
    Trace,
}

impl LogVerbosity {
    /// Check if any logging should occur.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        *self != LogVerbosity::None
    }

    /// Check if individual requests and responses should be logged.
    #[must_use]
    pub fn log_traffic(&self) -> bool {
        *self >= LogVerbosity::Debug
    }

    /// Check if bodies should be logged.
    #[must_use]
    pub fn log_bodies(&self) -> bool {
        *self == LogVerbosity::Trace
    }
}

/// Encoding of write payloads.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum PayloadFormat {
    #[default]
    Json,
    /// SOAP-style envelope around `<ns:{operation}><ns:{object}>...`.
    XmlEnvelope { operation: String, namespace: String },
}

/// Configuration for REST connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestConfig {
    /// Provider name reported by the connector.
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Base URL for API requests (e.g., "https://api.example.com/v1").
    /// May contain `{{.workspace}}`.
    pub base_url: String,

    /// Active module of the provider.
    #[serde(default)]
    pub module: ModuleId,

    /// Tenant-specific part of the base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,

    /// Authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Connection settings (timeouts).
    #[serde(default)]
    pub connection: ConnectionSettings,

    /// Default headers to include in all requests.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub default_headers: HashMap<String, String>,

    /// Content type of request bodies; defaults to the payload encoder's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Accept header value.
    #[serde(default = "default_accept")]
    pub accept: String,

    /// Write payload encoding.
    #[serde(default)]
    pub payload: PayloadFormat,

    /// Pagination configuration.
    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Response parsing configuration.
    #[serde(default)]
    pub response: ResponseConfig,

    /// Objects described at once by `list_object_metadata` (0 = unlimited).
    #[serde(default = "default_metadata_concurrency")]
    pub metadata_concurrency: usize,

    /// Logging verbosity for request/response logging.
    #[serde(default)]
    pub log_verbosity: LogVerbosity,

    /// Signature verification of inbound webhooks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<VerificationParams>,
}

fn default_provider() -> String {
    "rest".to_string()
}

fn default_accept() -> String {
    "application/json".to_string()
}

fn default_metadata_concurrency() -> usize {
    DEFAULT_METADATA_CONCURRENCY
}

impl RestConfig {
    /// Create a new REST config with required fields.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            provider: default_provider(),
            base_url: base_url.into(),
            module: ModuleId::root(),
            workspace: None,
            auth: AuthConfig::None,
            connection: ConnectionSettings::default(),
            default_headers: HashMap::new(),
            content_type: None,
            accept: default_accept(),
            payload: PayloadFormat::Json,
            pagination: PaginationConfig::default(),
            response: ResponseConfig::default(),
            metadata_concurrency: default_metadata_concurrency(),
            log_verbosity: LogVerbosity::default(),
            webhook: None,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_module(mut self, module: impl Into<ModuleId>) -> Self {
        self.module = module.into();
        self
    }

    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    /// Set authentication.
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Set basic authentication.
    pub fn with_basic_auth(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.with_auth(AuthConfig::basic(username, password))
    }

    /// Set bearer token authentication.
    pub fn with_bearer_token(self, token: impl Into<String>) -> Self {
        self.with_auth(AuthConfig::bearer(token))
    }

    /// Set API key authentication.
    pub fn with_api_key(self, key: impl Into<String>) -> Self {
        self.with_auth(AuthConfig::api_key(key))
    }

    /// Add a default header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_payload(mut self, payload: PayloadFormat) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_pagination(mut self, pagination: PaginationConfig) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn with_response(mut self, response: ResponseConfig) -> Self {
        self.response = response;
        self
    }

    pub fn with_metadata_concurrency(mut self, concurrency: usize) -> Self {
        self.metadata_concurrency = concurrency;
        self
    }

    /// Set logging verbosity.
    pub fn with_log_verbosity(mut self, verbosity: LogVerbosity) -> Self {
        self.log_verbosity = verbosity;
        self
    }

    pub fn with_webhook(mut self, params: VerificationParams) -> Self {
        self.webhook = Some(params);
        self
    }

    /// Base URL with the workspace substituted.
    pub fn resolved_base_url(&self) -> ConnectorResult<String> {
        if !self.base_url.contains(WORKSPACE_PLACEHOLDER) {
            return Ok(self.base_url.clone());
        }
        match self.workspace.as_deref() {
            Some(workspace) if !workspace.is_empty() => {
                Ok(self.base_url.replace(WORKSPACE_PLACEHOLDER, workspace))
            }
            _ => Err(ConnectorError::missing_parameter("workspace")),
        }
    }
}

impl ConnectorConfig for RestConfig {
    fn validate(&self) -> ConnectorResult<()> {
        if self.base_url.is_empty() {
            return Err(ConnectorError::invalid_config("base_url is required"));
        }

        // Validate URL format
        let base_url = self.resolved_base_url()?;
        let url = url::Url::parse(&base_url)
            .map_err(|e| ConnectorError::invalid_config(format!("invalid base_url: {e}")))?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(ConnectorError::invalid_config(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }

        self.pagination.validate()?;

        if let Some(webhook) = &self.webhook {
            if webhook.secret.is_empty() {
                return Err(ConnectorError::invalid_config("webhook secret is empty"));
            }
        }

        Ok(())
    }

    fn redacted(&self) -> Self {
        let mut config = self.clone();
        config.auth = config.auth.redacted();
        if let Some(webhook) = config.webhook.as_mut() {
            webhook.secret = REDACTED.to_string();
        }
        config
    }
}

/// How the token of the next page is found and sent back.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum NextPageStyle {
    /// Single-page responses.
    #[default]
    None,
    /// Cursor at the dotted `path` of the body, sent back as the `param`
    /// query parameter.
    Cursor { path: String, param: String },
    /// Full URL at the dotted `path` of the body, requested verbatim.
    Url { path: String },
    /// Record offset sent as the `param` query parameter; a page shorter
    /// than the page size ends pagination.
    Offset { param: String },
}

/// Configuration for API pagination and incremental reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Query parameter carrying the page size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size_param: Option<String>,

    /// Page size used when the read does not request one.
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    /// Maximum page size.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    #[serde(default)]
    pub next_page: NextPageStyle,

    /// Query parameter carrying `since`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since_param: Option<String>,

    /// Query parameter carrying `until`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until_param: Option<String>,

    /// Format of the `since`/`until` parameters.
    #[serde(default)]
    pub timestamp_format: TimestampFormat,

    /// Query parameter set to `true` for deleted-record reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_param: Option<String>,
}

fn default_page_size() -> usize {
    100
}

fn default_max_page_size() -> usize {
    1000
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size_param: None,
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            next_page: NextPageStyle::None,
            since_param: None,
            until_param: None,
            timestamp_format: TimestampFormat::Rfc3339,
            deleted_param: None,
        }
    }
}

impl PaginationConfig {
    /// Cursor tokens at `path`, sent back as `param`.
    pub fn cursor(path: impl Into<String>, param: impl Into<String>) -> Self {
        Self::default().with_next_page(NextPageStyle::Cursor {
            path: path.into(),
            param: param.into(),
        })
    }

    /// Next-page URLs at `path`.
    pub fn next_url(path: impl Into<String>) -> Self {
        Self::default().with_next_page(NextPageStyle::Url { path: path.into() })
    }

    /// Offsets sent as `param`.
    pub fn offset(param: impl Into<String>) -> Self {
        Self::default().with_next_page(NextPageStyle::Offset {
            param: param.into(),
        })
    }

    pub fn with_next_page(mut self, style: NextPageStyle) -> Self {
        self.next_page = style;
        self
    }

    pub fn with_page_size_param(mut self, param: impl Into<String>, default_size: usize) -> Self {
        self.page_size_param = Some(param.into());
        self.default_page_size = default_size;
        self
    }

    pub fn with_since_param(mut self, param: impl Into<String>) -> Self {
        self.since_param = Some(param.into());
        self
    }

    pub fn with_until_param(mut self, param: impl Into<String>) -> Self {
        self.until_param = Some(param.into());
        self
    }

    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    pub fn with_deleted_param(mut self, param: impl Into<String>) -> Self {
        self.deleted_param = Some(param.into());
        self
    }

    /// Page size for a read that asked for `requested`.
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }

    fn validate(&self) -> ConnectorResult<()> {
        let empty = match &self.next_page {
            NextPageStyle::None => false,
            NextPageStyle::Cursor { path, param } => path.is_empty() || param.is_empty(),
            NextPageStyle::Url { path } => path.is_empty(),
            NextPageStyle::Offset { param } => param.is_empty(),
        };
        if empty {
            return Err(ConnectorError::invalid_config(
                "next-page style needs a path and/or parameter name",
            ));
        }
        if matches!(self.next_page, NextPageStyle::Offset { .. }) && self.page_size_param.is_none() {
            return Err(ConnectorError::invalid_config(
                "offset pagination needs a page size parameter",
            ));
        }
        Ok(())
    }
}

/// Configuration for parsing API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseConfig {
    /// Dotted path of the records array; `None` when the body is the array.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records_path: Option<String>,

    /// Dotted path of the ID inside a record.
    #[serde(default = "default_id_path")]
    pub id_path: String,

    /// Dotted path of the record ID in write responses; defaults to `id_path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_id_path: Option<String>,

    /// Reject reads without requested fields.
    #[serde(default)]
    pub require_fields: bool,

    /// Dotted path of the record's modification time. When set, records are
    /// filtered client-side against `since`/`until`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_field: Option<String>,

    /// Encoding of `timestamp_field`.
    #[serde(default)]
    pub timestamp_format: TimestampFormat,

    #[serde(default)]
    pub time_order: TimeOrder,

    #[serde(default)]
    pub boundary: TimeBoundary,

    /// The provider streams records newest first and stops serving in-window
    /// records at the first stale one.
    #[serde(default)]
    pub newest_first: bool,
}

fn default_id_path() -> String {
    "id".to_string()
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            records_path: None,
            id_path: default_id_path(),
            write_id_path: None,
            require_fields: false,
            timestamp_field: None,
            timestamp_format: TimestampFormat::Rfc3339,
            time_order: TimeOrder::Unordered,
            boundary: TimeBoundary::inclusive(),
            newest_first: false,
        }
    }
}

impl ResponseConfig {
    pub fn with_records_path(mut self, path: impl Into<String>) -> Self {
        self.records_path = Some(path.into());
        self
    }

    pub fn with_id_path(mut self, path: impl Into<String>) -> Self {
        self.id_path = path.into();
        self
    }

    pub fn with_write_id_path(mut self, path: impl Into<String>) -> Self {
        self.write_id_path = Some(path.into());
        self
    }

    /// Filter records by the time at `field`, ordered as `order`.
    pub fn with_time_filter(
        mut self,
        field: impl Into<String>,
        format: TimestampFormat,
        order: TimeOrder,
    ) -> Self {
        self.timestamp_field = Some(field.into());
        self.timestamp_format = format;
        self.time_order = order;
        self
    }

    pub fn with_boundary(mut self, boundary: TimeBoundary) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }
}
