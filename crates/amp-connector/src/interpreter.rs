//! Provider error interpretation
//!
//! Maps non-2xx responses onto [`ConnectorError`]. The status code picks the
//! error kind; the body, when it matches a known shape, contributes the
//! provider's own message.

use std::fmt;
use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::error::ConnectorError;

/// Longest raw body excerpt used when no format matches.
const MAX_BODY_EXCERPT: usize = 256;

/// A provider error body that knows how to enrich a status-code error.
pub trait ErrorDescriptor: Send + Sync {
    /// Wrap `base` with the provider's message(s).
    fn combine_err(&self, base: ConnectorError) -> ConnectorError;
}

/// Builds a descriptor from a JSON body that has every required key.
pub type DescriptorConstructor =
    Arc<dyn Fn(&Value) -> Option<Box<dyn ErrorDescriptor>> + Send + Sync>;

/// The messages found in a provider error body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageDescriptor {
    pub messages: Vec<String>,
}

impl MessageDescriptor {
    pub fn new(messages: Vec<String>) -> Self {
        Self { messages }
    }
}

impl ErrorDescriptor for MessageDescriptor {
    fn combine_err(&self, base: ConnectorError) -> ConnectorError {
        base.with_detail(&self.messages.join("; "))
    }
}

/// One recognised error shape: all of `must_keys` are present at the top
/// level of the body.
#[derive(Clone)]
pub struct FormatTemplate {
    must_keys: Vec<String>,
    constructor: DescriptorConstructor,
}

impl FormatTemplate {
    pub fn new<I, S>(must_keys: I, constructor: DescriptorConstructor) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            must_keys: must_keys.into_iter().map(Into::into).collect(),
            constructor,
        }
    }

    /// Shape whose message is read from `message_keys`. String values and
    /// arrays of strings or `{message}` objects are collected.
    pub fn messages<I, S>(must_keys: I, message_keys: &[&str]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let message_keys: Vec<String> = message_keys.iter().map(|k| k.to_string()).collect();
        Self::new(
            must_keys,
            Arc::new(move |body: &Value| -> Option<Box<dyn ErrorDescriptor>> {
                let messages: Vec<String> = message_keys
                    .iter()
                    .filter_map(|key| body.get(key.as_str()))
                    .flat_map(collect_messages)
                    .collect();
                Some(Box::new(MessageDescriptor::new(messages)))
            }),
        )
    }

    fn matches(&self, body: &Value) -> bool {
        body.as_object()
            .is_some_and(|map| self.must_keys.iter().all(|key| map.contains_key(key)))
    }
}

impl fmt::Debug for FormatTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatTemplate")
            .field("must_keys", &self.must_keys)
            .finish_non_exhaustive()
    }
}

fn collect_messages(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) if !s.is_empty() => vec![s.clone()],
        Value::Array(items) => items.iter().flat_map(collect_messages).collect(),
        Value::Object(map) => map
            .get("message")
            .or_else(|| map.get("error_description"))
            .map(collect_messages)
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Ordered list of error shapes; the first match wins.
#[derive(Debug, Clone, Default)]
pub struct FormatSwitch {
    templates: Vec<FormatTemplate>,
}

impl FormatSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_template(mut self, template: FormatTemplate) -> Self {
        self.templates.push(template);
        self
    }

    /// Shapes used by most JSON APIs.
    pub fn common() -> Self {
        Self::new()
            .with_template(FormatTemplate::messages(["error", "error_description"], &["error_description"]))
            .with_template(FormatTemplate::messages(["errors"], &["errors"]))
            .with_template(FormatTemplate::messages(["message"], &["message"]))
            .with_template(FormatTemplate::messages(["error"], &["error"]))
            .with_template(FormatTemplate::messages(["detail"], &["detail", "title"]))
    }

    /// Descriptor built by the first template whose keys are all present.
    pub fn parse(&self, body: &Value) -> Option<Box<dyn ErrorDescriptor>> {
        self.templates
            .iter()
            .find(|template| template.matches(body))
            .and_then(|template| (template.constructor)(body))
    }
}

/// Error kind for a non-2xx status, with `message` as its text.
pub fn status_error(status: u16, message: impl Into<String>) -> ConnectorError {
    let message = message.into();
    match status {
        401 => ConnectorError::Unauthorized { message },
        403 => ConnectorError::Forbidden { message },
        404 => ConnectorError::NotFound { message },
        429 => ConnectorError::RateLimited { message },
        400..=499 => ConnectorError::BadRequest { status, message },
        _ => ConnectorError::RequestFailed { status, message },
    }
}

struct HtmlPatterns {
    title: Regex,
    paragraph: Regex,
    tag: Regex,
}

fn html_patterns() -> Option<&'static HtmlPatterns> {
    static PATTERNS: OnceLock<Option<HtmlPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(HtmlPatterns {
                title: Regex::new(r"(?is)<title[^>]*>(.*?)</title>").ok()?,
                paragraph: Regex::new(r"(?is)<p[^>]*>(.*?)</p>").ok()?,
                tag: Regex::new(r"<[^>]+>").ok()?,
            })
        })
        .as_ref()
}

fn clean_html_text(patterns: &HtmlPatterns, raw: &str) -> String {
    let stripped = patterns.tag.replace_all(raw, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Human message of an HTML error page: its `<title>`, otherwise its second
/// paragraph.
pub fn html_error_message(body: &str) -> Option<String> {
    let patterns = html_patterns()?;
    if let Some(found) = patterns.title.captures(body).and_then(|c| c.get(1)) {
        let text = clean_html_text(patterns, found.as_str());
        if !text.is_empty() {
            return Some(text);
        }
    }
    patterns
        .paragraph
        .captures_iter(body)
        .nth(1)
        .and_then(|c| c.get(1))
        .map(|m| clean_html_text(patterns, m.as_str()))
        .filter(|text| !text.is_empty())
}

fn body_excerpt(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_BODY_EXCERPT) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

/// Turns provider error responses into connector errors.
#[derive(Debug, Clone)]
pub struct ErrorInterpreter {
    json: FormatSwitch,
}

impl Default for ErrorInterpreter {
    fn default() -> Self {
        Self::new(FormatSwitch::common())
    }
}

impl ErrorInterpreter {
    pub fn new(json: FormatSwitch) -> Self {
        Self { json }
    }

    /// Error for a response with a non-2xx `status`.
    pub fn interpret(&self, status: u16, content_type: Option<&str>, body: &[u8]) -> ConnectorError {
        let base = status_error(status, "");
        let text = String::from_utf8_lossy(body);
        if text.trim().is_empty() {
            return base.with_detail(&format!("HTTP status {status}"));
        }

        let media_type = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .unwrap_or_default();

        let looks_like_html =
            text.trim_start().starts_with('<') && text.to_ascii_lowercase().contains("<html");
        if media_type.contains("html") || looks_like_html {
            if let Some(message) = html_error_message(&text) {
                return base.with_detail(&message);
            }
        }

        if let Ok(json) = serde_json::from_slice::<Value>(body) {
            if let Some(descriptor) = self.json.parse(&json) {
                return descriptor.combine_err(base);
            }
            debug!(status, "Unrecognised JSON error format");
        }

        base.with_detail(&body_excerpt(&text))
    }
}

/// Interpret a response with the common JSON shapes.
pub fn interpret_error(status: u16, content_type: Option<&str>, body: &[u8]) -> ConnectorError {
    ErrorInterpreter::default().interpret(status, content_type, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(status_error(400, ""), ConnectorError::BadRequest { status: 400, .. }));
        assert!(matches!(status_error(422, ""), ConnectorError::BadRequest { status: 422, .. }));
        assert!(matches!(status_error(401, ""), ConnectorError::Unauthorized { .. }));
        assert!(matches!(status_error(403, ""), ConnectorError::Forbidden { .. }));
        assert!(matches!(status_error(404, ""), ConnectorError::NotFound { .. }));
        assert!(matches!(status_error(429, ""), ConnectorError::RateLimited { .. }));
        assert!(matches!(status_error(409, ""), ConnectorError::BadRequest { status: 409, .. }));
        assert!(matches!(status_error(503, ""), ConnectorError::RequestFailed { status: 503, .. }));
        assert!(matches!(status_error(302, ""), ConnectorError::RequestFailed { status: 302, .. }));
    }

    #[test]
    fn test_first_matching_template_wins() {
        let err = interpret_error(
            400,
            Some("application/json"),
            br#"{"error": "invalid_grant", "error_description": "token expired"}"#,
        );
        match err {
            ConnectorError::BadRequest { message, .. } => assert_eq!(message, "token expired"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_arrays_are_joined() {
        let body = json!({"errors": [{"message": "name is required"}, "email is invalid"]});
        let err = interpret_error(422, Some("application/json"), body.to_string().as_bytes());
        assert_eq!(
            err.to_string(),
            "bad request (HTTP 422): name is required; email is invalid"
        );
    }

    #[test]
    fn test_custom_descriptor() {
        struct Coded(String);
        impl ErrorDescriptor for Coded {
            fn combine_err(&self, base: ConnectorError) -> ConnectorError {
                base.with_detail(&format!("code {}", self.0))
            }
        }

        let switch = FormatSwitch::new().with_template(FormatTemplate::new(
            ["fault", "code"],
            Arc::new(|body: &Value| -> Option<Box<dyn ErrorDescriptor>> {
                let code = body.get("code")?.as_str()?.to_string();
                Some(Box::new(Coded(code)))
            }),
        ));
        let err = ErrorInterpreter::new(switch).interpret(
            500,
            None,
            br#"{"fault": true, "code": "E42"}"#,
        );
        assert_eq!(err.to_string(), "request failed (HTTP 500): code E42");
    }

    #[test]
    fn test_html_title() {
        let page = "<html><head><title>503 Service Unavailable</title></head><body></body></html>";
        let err = interpret_error(503, Some("text/html; charset=utf-8"), page.as_bytes());
        assert!(err.is_transient());
        assert!(err.to_string().ends_with("503 Service Unavailable"));
    }

    #[test]
    fn test_html_second_paragraph() {
        let page = "<html><body><p>Oops</p><p>The <b>gateway</b> timed out</p></body></html>";
        assert_eq!(html_error_message(page).as_deref(), Some("The gateway timed out"));
    }

    #[test]
    fn test_unknown_format_uses_body_excerpt() {
        let err = interpret_error(404, Some("text/plain"), b"no such contact");
        match err {
            ConnectorError::NotFound { message } => assert_eq!(message, "no such contact"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_body() {
        let err = interpret_error(500, None, b"");
        assert_eq!(err.to_string(), "request failed (HTTP 500): HTTP status 500");
    }
}
