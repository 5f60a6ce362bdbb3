//! Inbound webhook verification
//!
//! HMAC-SHA256 signature checks for provider webhook deliveries.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{ConnectorError, ConnectorResult};

type HmacSha256 = Hmac<Sha256>;

/// An inbound webhook delivery as received by the caller's HTTP server.
#[derive(Debug, Clone, Default)]
pub struct WebhookRequest {
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub url: String,
    pub method: String,
}

impl WebhookRequest {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            method: "POST".to_string(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Header lookup, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// How the provider encodes the signature digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureEncoding {
    #[default]
    Hex,
    Base64,
}

/// Provider-specific parameters for signature verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationParams {
    /// Shared signing secret.
    pub secret: String,

    /// Header carrying the signature.
    #[serde(default = "default_signature_header")]
    pub signature_header: String,

    /// Prefix stripped from the header value (e.g. `sha256=`).
    #[serde(default)]
    pub signature_prefix: String,

    #[serde(default)]
    pub encoding: SignatureEncoding,

    /// Header carrying the delivery timestamp (Unix seconds). When set, the
    /// signed message is `{timestamp}.{body}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_header: Option<String>,

    /// Maximum accepted age of a delivery in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance_secs: Option<i64>,
}

fn default_signature_header() -> String {
    "X-Signature".to_string()
}

impl VerificationParams {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            signature_header: default_signature_header(),
            signature_prefix: String::new(),
            encoding: SignatureEncoding::Hex,
            timestamp_header: None,
            tolerance_secs: None,
        }
    }

    pub fn with_signature_header(mut self, header: impl Into<String>) -> Self {
        self.signature_header = header.into();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.signature_prefix = prefix.into();
        self
    }

    pub fn with_encoding(mut self, encoding: SignatureEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_timestamp(mut self, header: impl Into<String>, tolerance_secs: i64) -> Self {
        self.timestamp_header = Some(header.into());
        self.tolerance_secs = Some(tolerance_secs);
        self
    }
}

/// Compute the signature of `message` under `secret`.
pub fn compute_hmac_signature(
    secret: &str,
    message: &[u8],
    encoding: SignatureEncoding,
) -> ConnectorResult<String> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|e| ConnectorError::internal_with_source("invalid HMAC key", e))?;
    mac.update(message);
    let digest = mac.finalize().into_bytes();
    Ok(match encoding {
        SignatureEncoding::Hex => hex::encode(digest),
        SignatureEncoding::Base64 => BASE64.encode(digest),
    })
}

/// Verify a webhook delivery. Returns `Ok(false)` for a missing, stale or
/// mismatched signature.
pub fn verify_hmac_signature(
    request: &WebhookRequest,
    params: &VerificationParams,
) -> ConnectorResult<bool> {
    if params.secret.is_empty() {
        return Err(ConnectorError::invalid_config("webhook secret is empty"));
    }

    let Some(header) = request.header(&params.signature_header) else {
        tracing::debug!(header = %params.signature_header, "Webhook signature header missing");
        return Ok(false);
    };
    let expected = header
        .trim()
        .strip_prefix(params.signature_prefix.as_str())
        .unwrap_or(header.trim());

    let message = match &params.timestamp_header {
        Some(name) => {
            let Some(timestamp) = request.header(name) else {
                return Ok(false);
            };
            if let Some(tolerance) = params.tolerance_secs {
                let Ok(sent_at) = timestamp.trim().parse::<i64>() else {
                    return Ok(false);
                };
                if (Utc::now().timestamp() - sent_at).abs() > tolerance {
                    tracing::debug!(timestamp = sent_at, "Webhook timestamp outside tolerance");
                    return Ok(false);
                }
            }
            let mut message = Vec::with_capacity(timestamp.len() + 1 + request.body.len());
            message.extend_from_slice(timestamp.trim().as_bytes());
            message.push(b'.');
            message.extend_from_slice(&request.body);
            message
        }
        None => request.body.clone(),
    };

    let computed = compute_hmac_signature(&params.secret, &message, params.encoding)?;
    Ok(expected.as_bytes().ct_eq(computed.as_bytes()).into())
}
