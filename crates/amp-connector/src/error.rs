//! Connector error types
//!
//! Error definitions shared by every connector, with transient/permanent
//! classification for callers that implement their own retry policy.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error that can occur during connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    // Caller input
    /// A required input was absent (object name, record ID, record data).
    #[error("missing parameter: {parameter}")]
    MissingParameter { parameter: String },

    /// The caller supplied an empty list of objects.
    #[error("no objects were requested")]
    MissingObjects,

    /// The catalog has no operation for the object in the active module.
    #[error("operation {operation} is not supported for object '{object}' in module '{module}'")]
    ObjectNotSupported {
        module: String,
        object: String,
        operation: String,
    },

    /// The adapter declares no handler for the operation.
    #[error("operation not implemented: {operation}")]
    OperationNotImplemented { operation: String },

    // Provider responses
    /// The provider rejected the request (4xx).
    #[error("bad request (HTTP {status}): {message}")]
    BadRequest { status: u16, message: String },

    /// The provider failed to serve the request (5xx or unrecognised status).
    #[error("request failed (HTTP {status}): {message}")]
    RequestFailed { status: u16, message: String },

    /// Credentials were rejected.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Credentials were accepted but lack permission.
    #[error("forbidden: {message}")]
    Forbidden { message: String },

    /// No access token was available for the request.
    #[error("missing access token")]
    MissingAccessToken,

    /// The provider reported the resource as missing (404).
    #[error("not found: {message}")]
    NotFound { message: String },

    /// The provider is throttling requests.
    #[error("rate limited: {message}")]
    RateLimited { message: String },

    /// The provider returned a success status without the body we needed.
    #[error("empty response body where one was required")]
    EmptyResponse,

    /// Transport-level failure.
    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    // Memstore
    /// No record is stored under the given key.
    #[error("record not found: {object}/{id}")]
    RecordNotFound { object: String, id: String },

    /// The payload violates the object schema.
    #[error("validation failed for '{object}': {}", .errors.join("; "))]
    ValidationFailed { object: String, errors: Vec<String> },

    /// A foreign key references a record that does not exist.
    #[error("invalid foreign key {field}={value}: no '{target_object}' record with that id")]
    InvalidForeignKey {
        field: String,
        value: String,
        target_object: String,
    },

    /// Association metadata is incomplete.
    #[error("invalid association '{association}' on '{object}': {message}")]
    InvalidAssociation {
        object: String,
        association: String,
        message: String,
    },

    /// A schema could not be compiled or lacks required metadata.
    #[error("invalid schema for '{object}': {message}")]
    InvalidSchema { object: String, message: String },

    /// A subscription with this ID is already registered.
    #[error("subscription already exists: {id}")]
    SubscriptionExists { id: String },

    /// No subscription is registered under this ID.
    #[error("observer not found: {id}")]
    ObserverNotFound { id: String },

    /// A subscription was registered without any events.
    #[error("subscription events are empty")]
    SubscriptionEventsEmpty,

    /// `uniqueItems` cannot be satisfied for the property.
    #[error("cannot generate unique items for '{property}': {message}")]
    UniqueConstraint { property: String, message: String },

    /// A unique value could not be produced within the retry budget.
    #[error("could not generate a unique value for '{property}' after {attempts} attempts")]
    UniqueValue { property: String, attempts: u32 },

    // Pipeline
    /// A record timestamp could not be parsed.
    #[error("invalid timestamp in field '{field}': {value}")]
    InvalidTimestamp { field: String, value: String },

    /// The operation context was cancelled or its deadline passed.
    #[error("operation cancelled")]
    Cancelled,

    /// Connector configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Encoding or decoding of a payload failed.
    #[error("serialization error: {message}")]
    Serialization { message: String },

    /// Internal error.
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl ConnectorError {
    /// Check if this error is transient and the operation may succeed if retried.
    pub fn is_transient(&self) -> bool {
        match self {
            ConnectorError::Network { .. } | ConnectorError::RateLimited { .. } => true,
            ConnectorError::RequestFailed { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Check if this error is permanent and retry won't help.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectorError::MissingParameter { .. } => "MISSING_PARAMETER",
            ConnectorError::MissingObjects => "MISSING_OBJECTS",
            ConnectorError::ObjectNotSupported { .. } => "OBJECT_NOT_SUPPORTED",
            ConnectorError::OperationNotImplemented { .. } => "OPERATION_NOT_IMPLEMENTED",
            ConnectorError::BadRequest { .. } => "BAD_REQUEST",
            ConnectorError::RequestFailed { .. } => "REQUEST_FAILED",
            ConnectorError::Unauthorized { .. } => "UNAUTHORIZED",
            ConnectorError::Forbidden { .. } => "FORBIDDEN",
            ConnectorError::MissingAccessToken => "MISSING_ACCESS_TOKEN",
            ConnectorError::NotFound { .. } => "NOT_FOUND",
            ConnectorError::RateLimited { .. } => "RATE_LIMITED",
            ConnectorError::EmptyResponse => "EMPTY_RESPONSE",
            ConnectorError::Network { .. } => "NETWORK_ERROR",
            ConnectorError::RecordNotFound { .. } => "RECORD_NOT_FOUND",
            ConnectorError::ValidationFailed { .. } => "VALIDATION_FAILED",
            ConnectorError::InvalidForeignKey { .. } => "INVALID_FOREIGN_KEY",
            ConnectorError::InvalidAssociation { .. } => "INVALID_ASSOCIATION",
            ConnectorError::InvalidSchema { .. } => "INVALID_SCHEMA",
            ConnectorError::SubscriptionExists { .. } => "SUBSCRIPTION_EXISTS",
            ConnectorError::ObserverNotFound { .. } => "OBSERVER_NOT_FOUND",
            ConnectorError::SubscriptionEventsEmpty => "SUBSCRIPTION_EVENTS_EMPTY",
            ConnectorError::UniqueConstraint { .. } => "UNIQUE_CONSTRAINT",
            ConnectorError::UniqueValue { .. } => "UNIQUE_VALUE",
            ConnectorError::InvalidTimestamp { .. } => "INVALID_TIMESTAMP",
            ConnectorError::Cancelled => "CANCELLED",
            ConnectorError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            ConnectorError::Serialization { .. } => "SERIALIZATION_ERROR",
            ConnectorError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    // Convenience constructors

    /// Create a missing parameter error.
    pub fn missing_parameter(parameter: impl Into<String>) -> Self {
        ConnectorError::MissingParameter {
            parameter: parameter.into(),
        }
    }

    /// Create an operation-not-implemented error.
    pub fn not_implemented(operation: impl Into<String>) -> Self {
        ConnectorError::OperationNotImplemented {
            operation: operation.into(),
        }
    }

    /// Create a bad request error.
    pub fn bad_request(status: u16, message: impl Into<String>) -> Self {
        ConnectorError::BadRequest {
            status,
            message: message.into(),
        }
    }

    /// Create a request failed error.
    pub fn request_failed(status: u16, message: impl Into<String>) -> Self {
        ConnectorError::RequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Create a record not found error.
    pub fn record_not_found(object: impl Into<String>, id: impl Into<String>) -> Self {
        ConnectorError::RecordNotFound {
            object: object.into(),
            id: id.into(),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        ConnectorError::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        ConnectorError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create a network error with source.
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        ConnectorError::Serialization {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ConnectorError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error with source.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns the same error with `detail` appended to its human message.
    ///
    /// Only variants that carry a provider message are extended; every other
    /// variant is returned unchanged.
    #[must_use]
    pub fn with_detail(self, detail: &str) -> Self {
        if detail.is_empty() {
            return self;
        }
        let join = |message: String| {
            if message.is_empty() {
                detail.to_string()
            } else {
                format!("{message}: {detail}")
            }
        };
        match self {
            ConnectorError::BadRequest { status, message } => ConnectorError::BadRequest {
                status,
                message: join(message),
            },
            ConnectorError::RequestFailed { status, message } => ConnectorError::RequestFailed {
                status,
                message: join(message),
            },
            ConnectorError::Unauthorized { message } => ConnectorError::Unauthorized {
                message: join(message),
            },
            ConnectorError::Forbidden { message } => ConnectorError::Forbidden {
                message: join(message),
            },
            ConnectorError::NotFound { message } => ConnectorError::NotFound {
                message: join(message),
            },
            ConnectorError::RateLimited { message } => ConnectorError::RateLimited {
                message: join(message),
            },
            other => other,
        }
    }
}

impl From<serde_json::Error> for ConnectorError {
    fn from(err: serde_json::Error) -> Self {
        ConnectorError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;
