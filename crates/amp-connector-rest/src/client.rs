//! HTTP transport
//!
//! Thin wrapper over `reqwest` that injects credentials and default headers,
//! honours the caller's [`Context`] and turns non-2xx responses into
//! [`ConnectorError`]s through the [`ErrorInterpreter`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::{debug, info, trace, warn};
use url::Url;

use amp_connector::config::{ApiKeyLocation, AuthConfig};
use amp_connector::context::Context;
use amp_connector::error::{ConnectorError, ConnectorResult};
use amp_connector::interpreter::ErrorInterpreter;
use amp_connector::types::HttpMethod;

use crate::config::{LogVerbosity, RestConfig};

/// An encoded request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Payload {
    pub fn new(content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            bytes,
        }
    }
}

/// A request ready to be sent.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Payload>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_headers(mut self, headers: &[(String, String)]) -> Self {
        self.headers.extend(headers.iter().cloned());
        self
    }

    pub fn with_body(mut self, body: Payload) -> Self {
        self.body = Some(body);
        self
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// The body as JSON; an empty body is `null`.
    pub fn json(&self) -> ConnectorResult<Value> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&self.body).map_err(|e| {
            ConnectorError::serialization(format!("invalid JSON response body: {e}"))
        })
    }

    /// The body as JSON, failing with `EmptyResponse` when there is none.
    pub fn json_required(&self) -> ConnectorResult<Value> {
        match self.json()? {
            Value::Null => Err(ConnectorError::EmptyResponse),
            value => Ok(value),
        }
    }

    /// Header lookup, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Authenticated HTTP client of one connector instance.
pub struct HttpClient {
    client: Client,
    auth: AuthConfig,
    default_headers: Vec<(String, String)>,
    accept: String,
    verbosity: LogVerbosity,
    interpreter: ErrorInterpreter,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("auth", &self.auth.redacted())
            .field("verbosity", &self.verbosity)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    pub fn new(config: &RestConfig) -> ConnectorResult<Self> {
        let mut default_headers: Vec<(String, String)> = config
            .default_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        default_headers.sort();

        Ok(Self {
            client: Self::build_client(config)?,
            auth: config.auth.clone(),
            default_headers,
            accept: config.accept.clone(),
            verbosity: config.log_verbosity,
            interpreter: ErrorInterpreter::default(),
        })
    }

    /// Replace the error interpreter.
    pub fn with_interpreter(mut self, interpreter: ErrorInterpreter) -> Self {
        self.interpreter = interpreter;
        self
    }

    /// Build the reqwest client with configuration.
    fn build_client(config: &RestConfig) -> ConnectorResult<Client> {
        Client::builder()
            .timeout(config.connection.read_timeout())
            .connect_timeout(config.connection.connection_timeout())
            .build()
            .map_err(|e| ConnectorError::InvalidConfiguration {
                message: format!("Failed to build HTTP client: {e}"),
            })
    }

    /// Get authentication header value.
    fn auth_header(&self) -> Option<(String, String)> {
        match &self.auth {
            AuthConfig::None => None,
            AuthConfig::Basic { username, password } => {
                let credentials = format!("{}:{}", username, password.as_deref().unwrap_or(""));
                let encoded = base64_encode(&credentials);
                Some((header::AUTHORIZATION.to_string(), format!("Basic {encoded}")))
            }
            AuthConfig::Bearer { token } => {
                Some((header::AUTHORIZATION.to_string(), format!("Bearer {token}")))
            }
            AuthConfig::ApiKey {
                key,
                name,
                location: ApiKeyLocation::Header,
            } => Some((name.clone(), key.clone())),
            AuthConfig::ApiKey { .. } => None,
        }
    }

    /// Attach query-string credentials to `url`.
    fn authenticate_url(&self, mut url: Url) -> Url {
        if let AuthConfig::ApiKey {
            key,
            name,
            location: ApiKeyLocation::Query,
        } = &self.auth
        {
            url.query_pairs_mut().append_pair(name, key);
        }
        url
    }

    /// Headers of `request`, later entries replacing earlier ones of the same
    /// name: defaults, then credentials, then the request's own.
    fn request_headers(&self, request: &HttpRequest) -> ConnectorResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let accept = ("accept".to_string(), self.accept.clone());
        let content_type = request
            .body
            .as_ref()
            .map(|body| ("content-type".to_string(), body.content_type.clone()));
        let auth = self.auth_header();

        let entries = std::iter::once(&accept)
            .chain(self.default_headers.iter())
            .chain(content_type.iter())
            .chain(auth.iter())
            .chain(request.headers.iter());
        for (name, value) in entries {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ConnectorError::invalid_config(format!("invalid header name '{name}': {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                ConnectorError::invalid_config(format!("invalid value for header '{name}': {e}"))
            })?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    fn build_request(&self, request: HttpRequest) -> ConnectorResult<reqwest::RequestBuilder> {
        let headers = self.request_headers(&request)?;
        let url = self.authenticate_url(request.url);
        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), url)
            .headers(headers);
        if let Some(body) = request.body {
            builder = builder.body(body.bytes);
        }
        Ok(builder)
    }

    /// Send `request`, returning the response of a 2xx status and an
    /// interpreted error otherwise.
    pub async fn execute(&self, ctx: &Context, request: HttpRequest) -> ConnectorResult<HttpResponse> {
        let method = request.method;
        let url = redact_query(&request.url);

        if self.verbosity.log_traffic() {
            debug!(method = %method, url = %url, "Sending REST request");
        }
        if self.verbosity.log_bodies() {
            if let Some(body) = &request.body {
                trace!(body = %String::from_utf8_lossy(&body.bytes), "Request body");
            }
        }

        let started = Instant::now();
        let builder = self.build_request(request)?;
        let target = url.clone();
        let response = ctx
            .run(async move {
                let response = builder.send().await.map_err(|e| {
                    ConnectorError::network_with_source(format!("{method} {target} failed"), e)
                })?;
                let status = response.status().as_u16();
                let headers: HashMap<String, String> = response
                    .headers()
                    .iter()
                    .filter_map(|(k, v)| Some((k.to_string(), v.to_str().ok()?.to_string())))
                    .collect();
                let body = response.bytes().await.map_err(|e| {
                    ConnectorError::network_with_source("failed to read response body", e)
                })?;
                Ok(HttpResponse {
                    status,
                    content_type: headers.get(header::CONTENT_TYPE.as_str()).cloned(),
                    headers,
                    body: body.to_vec(),
                })
            })
            .await?;

        self.log_response(method, &url, &response, started.elapsed());

        if !(200..300).contains(&response.status) {
            let error = self.interpreter.interpret(
                response.status,
                response.content_type.as_deref(),
                &response.body,
            );
            warn!(
                method = %method,
                url = %url,
                status = response.status,
                error = %error,
                "REST request failed"
            );
            return Err(error);
        }

        Ok(response)
    }

    fn log_response(&self, method: HttpMethod, url: &str, response: &HttpResponse, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis() as u64;
        if self.verbosity.log_traffic() {
            debug!(
                method = %method,
                url = %url,
                status = response.status,
                headers = ?response.headers,
                elapsed_ms,
                "Received REST response"
            );
        } else if self.verbosity.is_enabled() {
            info!(method = %method, url = %url, status = response.status, elapsed_ms, "REST request completed");
        }
        if self.verbosity.log_bodies() {
            trace!(body = %String::from_utf8_lossy(&response.body), "Response body");
        }
    }
}

fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

/// URL for logs: query values are dropped since they may carry credentials.
fn redact_query(url: &Url) -> String {
    let mut redacted = url.clone();
    redacted.set_query(None);
    if url.query().is_some_and(|q| !q.is_empty()) {
        let keys: Vec<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
        format!("{redacted}?{}", keys.join("&"))
    } else {
        redacted.to_string()
    }
}

/// Base64 encode bytes to string.
fn base64_encode(data: impl AsRef<[u8]>) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine};
    STANDARD.encode(data)
}
