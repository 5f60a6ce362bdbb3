//! Write payload encoders
//!
//! Turns a record into request bytes. JSON is the default; providers with
//! SOAP-style endpoints use [`XmlEnvelopeEncoder`].

use std::fmt::Write as _;

use serde_json::Value;

use amp_connector::error::{ConnectorError, ConnectorResult};

use crate::client::Payload;
use crate::config::PayloadFormat;

const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Encodes record data into a request body.
pub trait PayloadEncoder: Send + Sync + std::fmt::Debug {
    fn content_type(&self) -> &str;

    fn encode(&self, object: &str, data: &Value) -> ConnectorResult<Vec<u8>>;

    /// Encode into a [`Payload`], optionally overriding the content type.
    fn payload(&self, object: &str, data: &Value, content_type: Option<&str>) -> ConnectorResult<Payload> {
        let bytes = self.encode(object, data)?;
        Ok(Payload::new(content_type.unwrap_or(self.content_type()), bytes))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl PayloadEncoder for JsonEncoder {
    fn content_type(&self) -> &str {
        "application/json"
    }

    fn encode(&self, _object: &str, data: &Value) -> ConnectorResult<Vec<u8>> {
        Ok(serde_json::to_vec(data)?)
    }
}

/// SOAP 1.1 envelope whose body is `<ns:{operation}><ns:{object}>fields</ns:{object}></ns:{operation}>`.
///
/// Object fields become child elements; arrays repeat their element and
/// `null` yields an empty element.
#[derive(Debug, Clone)]
pub struct XmlEnvelopeEncoder {
    operation: String,
    namespace: String,
}

impl XmlEnvelopeEncoder {
    pub fn new(operation: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            namespace: namespace.into(),
        }
    }

    fn write_value(&self, out: &mut String, name: &str, value: &Value) -> ConnectorResult<()> {
        check_element_name(name)?;
        match value {
            Value::Array(items) => {
                for item in items {
                    self.write_value(out, name, item)?;
                }
            }
            Value::Null => {
                let _ = write!(out, "<ns:{name}/>");
            }
            Value::Object(map) => {
                let _ = write!(out, "<ns:{name}>");
                for (key, child) in map {
                    self.write_value(out, key, child)?;
                }
                let _ = write!(out, "</ns:{name}>");
            }
            Value::String(s) => {
                let _ = write!(out, "<ns:{name}>{}</ns:{name}>", xml_escape(s));
            }
            Value::Bool(_) | Value::Number(_) => {
                let _ = write!(out, "<ns:{name}>{value}</ns:{name}>");
            }
        }
        Ok(())
    }
}

impl PayloadEncoder for XmlEnvelopeEncoder {
    fn content_type(&self) -> &str {
        "text/xml; charset=utf-8"
    }

    fn encode(&self, object: &str, data: &Value) -> ConnectorResult<Vec<u8>> {
        check_element_name(&self.operation)?;
        if !data.is_object() {
            return Err(ConnectorError::serialization(
                "XML payloads must be JSON objects",
            ));
        }

        let mut out = String::with_capacity(256);
        out.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        let _ = write!(
            out,
            r#"<soapenv:Envelope xmlns:soapenv="{SOAP_ENVELOPE_NS}" xmlns:ns="{}">"#,
            xml_escape(&self.namespace)
        );
        out.push_str("<soapenv:Body>");
        let _ = write!(out, "<ns:{}>", self.operation);
        self.write_value(&mut out, object, data)?;
        let _ = write!(out, "</ns:{}>", self.operation);
        out.push_str("</soapenv:Body></soapenv:Envelope>");
        Ok(out.into_bytes())
    }
}

/// Encoder for the configured payload format.
pub fn encoder_for(format: &PayloadFormat) -> Box<dyn PayloadEncoder> {
    match format {
        PayloadFormat::Json => Box::new(JsonEncoder),
        PayloadFormat::XmlEnvelope {
            operation,
            namespace,
        } => Box::new(XmlEnvelopeEncoder::new(operation.clone(), namespace.clone())),
    }
}

fn check_element_name(name: &str) -> ConnectorResult<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.')) {
        Ok(())
    } else {
        Err(ConnectorError::serialization(format!(
            "'{name}' is not a valid XML element name"
        )))
    }
}

/// Escape special XML characters.
fn xml_escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&apos;"),
            _ => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_encoder() {
        let payload = JsonEncoder
            .payload("contacts", &json!({"name": "Acme"}), None)
            .unwrap();
        assert_eq!(payload.content_type, "application/json");
        assert_eq!(payload.bytes, br#"{"name":"Acme"}"#);
    }

    #[test]
    fn test_xml_envelope() {
        let encoder = XmlEnvelopeEncoder::new("create", "urn:crm.example.com");
        let xml = encoder
            .encode(
                "Account",
                &json!({"Name": "Smith & Co", "Tags": ["a", "b"], "Fax": null, "Employees": 12}),
            )
            .unwrap();
        let xml = String::from_utf8(xml).unwrap();

        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?><soapenv:Envelope"#));
        assert!(xml.contains(r#"xmlns:ns="urn:crm.example.com""#));
        assert!(xml.contains("<ns:create><ns:Account>"));
        assert!(xml.contains("<ns:Name>Smith &amp; Co</ns:Name>"));
        assert!(xml.contains("<ns:Tags>a</ns:Tags><ns:Tags>b</ns:Tags>"));
        assert!(xml.contains("<ns:Fax/>"));
        assert!(xml.contains("<ns:Employees>12</ns:Employees>"));
        assert!(xml.ends_with("</ns:Account></ns:create></soapenv:Body></soapenv:Envelope>"));
    }

    #[test]
    fn test_xml_nested_objects() {
        let encoder = XmlEnvelopeEncoder::new("update", "urn:x");
        let xml = encoder
            .encode("Contact", &json!({"Address": {"City": "Oslo"}}))
            .unwrap();
        let xml = String::from_utf8(xml).unwrap();
        assert!(xml.contains("<ns:Address><ns:City>Oslo</ns:City></ns:Address>"));
    }

    #[test]
    fn test_xml_rejects_invalid_names() {
        let encoder = XmlEnvelopeEncoder::new("create", "urn:x");
        assert!(encoder.encode("Account", &json!({"bad name": 1})).is_err());
        assert!(encoder.encode("1Account", &json!({})).is_err());
        assert!(encoder.encode("Account", &json!([1, 2])).is_err());
    }

    #[test]
    fn test_content_type_override() {
        let encoder = encoder_for(&PayloadFormat::XmlEnvelope {
            operation: "create".to_string(),
            namespace: "urn:x".to_string(),
        });
        let payload = encoder
            .payload("Account", &json!({}), Some("application/soap+xml"))
            .unwrap();
        assert_eq!(payload.content_type, "application/soap+xml");
        assert_eq!(encoder.content_type(), "text/xml; charset=utf-8");
    }

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape("<a href=\"x\">'&'</a>"), "&lt;a href=&quot;x&quot;&gt;&apos;&amp;&apos;&lt;/a&gt;");
    }
}
