//! Connector type definitions
//!
//! Enums and small newtypes shared by the catalog, the pipelines and the memstore.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// HTTP method for a catalog operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a product surface within a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    /// The module used by providers that expose a single surface.
    pub const ROOT: &'static str = "root";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn root() -> Self {
        Self::new(Self::ROOT)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ModuleId {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ModuleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Normalised value type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ValueType {
    String,
    Int,
    Float,
    Boolean,
    Date,
    DateTime,
    SingleSelect,
    MultiSelect,
    #[default]
    Other,
}

impl ValueType {
    /// Get all value types.
    #[must_use]
    pub fn all() -> &'static [ValueType] {
        &[
            ValueType::String,
            ValueType::Int,
            ValueType::Float,
            ValueType::Boolean,
            ValueType::Date,
            ValueType::DateTime,
            ValueType::SingleSelect,
            ValueType::MultiSelect,
            ValueType::Other,
        ]
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Boolean => "boolean",
            ValueType::Date => "date",
            ValueType::DateTime => "dateTime",
            ValueType::SingleSelect => "singleSelect",
            ValueType::MultiSelect => "multiSelect",
            ValueType::Other => "other",
        }
    }

    /// Map a JSON Schema `type`/`format` pair onto a value type.
    #[must_use]
    pub fn from_json_schema(json_type: &str, format: Option<&str>, has_enum: bool) -> Self {
        match (json_type, format) {
            ("string", _) if has_enum => ValueType::SingleSelect,
            ("string", Some("date")) => ValueType::Date,
            ("string", Some("date-time")) => ValueType::DateTime,
            ("string", _) => ValueType::String,
            ("integer", _) => ValueType::Int,
            ("number", _) => ValueType::Float,
            ("boolean", _) => ValueType::Boolean,
            ("array", _) if has_enum => ValueType::MultiSelect,
            _ => ValueType::Other,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = ParseValueTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ValueType::all()
            .iter()
            .copied()
            .find(|v| v.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseValueTypeError(s.to_string()))
    }
}

/// Error parsing a value type from string.
#[derive(Debug, Clone)]
pub struct ParseValueTypeError(String);

impl fmt::Display for ParseValueTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid value type '{}'", self.0)
    }
}

impl std::error::Error for ParseValueTypeError {}

/// Kind of record change reported to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeEventType {
    Create,
    Update,
    Delete,
}

impl ChangeEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeEventType::Create => "create",
            ChangeEventType::Update => "update",
            ChangeEventType::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_round_trip_names() {
        for vt in ValueType::all() {
            assert_eq!(vt.as_str().parse::<ValueType>().unwrap(), *vt);
        }
        assert!("decimal".parse::<ValueType>().is_err());
    }

    #[test]
    fn test_value_type_serde_names() {
        let json = serde_json::to_string(&ValueType::DateTime).unwrap();
        assert_eq!(json, "\"dateTime\"");
    }

    #[test]
    fn test_value_type_from_json_schema() {
        assert_eq!(
            ValueType::from_json_schema("string", Some("date-time"), false),
            ValueType::DateTime
        );
        assert_eq!(
            ValueType::from_json_schema("string", None, true),
            ValueType::SingleSelect
        );
        assert_eq!(ValueType::from_json_schema("object", None, false), ValueType::Other);
    }

    #[test]
    fn test_module_id_default() {
        assert_eq!(ModuleId::default().as_str(), "root");
    }
}
