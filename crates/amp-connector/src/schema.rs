//! Object metadata types
//!
//! Describes the fields of a provider object as reported by
//! `ListObjectMetadata`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConnectorError;
use crate::types::ValueType;

/// One allowed value of a select field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldValue {
    pub value: String,
    pub display_value: String,
}

impl FieldValue {
    pub fn new(value: impl Into<String>, display_value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            display_value: display_value.into(),
        }
    }
}

/// Metadata of a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMetadata {
    pub display_name: String,

    pub value_type: ValueType,

    /// The provider's own type name (e.g. `varchar`, `picklist`).
    #[serde(default)]
    pub provider_type: String,

    #[serde(default)]
    pub read_only: bool,

    /// `None` when the provider does not say.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_required: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_custom: Option<bool>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<FieldValue>,
}

impl FieldMetadata {
    pub fn new(display_name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            display_name: display_name.into(),
            value_type,
            provider_type: String::new(),
            read_only: false,
            is_required: None,
            is_custom: None,
            values: Vec::new(),
        }
    }

    pub fn with_provider_type(mut self, provider_type: impl Into<String>) -> Self {
        self.provider_type = provider_type.into();
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.is_required = Some(required);
        self
    }

    pub fn custom(mut self, custom: bool) -> Self {
        self.is_custom = Some(custom);
        self
    }

    pub fn with_values(mut self, values: Vec<FieldValue>) -> Self {
        self.values = values;
        self
    }
}

/// Metadata of an object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    pub display_name: String,

    /// Field name to field metadata.
    pub fields: HashMap<String, FieldMetadata>,

    /// Field name to display name, for quick lookups.
    pub fields_map: HashMap<String, String>,
}

impl ObjectMetadata {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            ..Default::default()
        }
    }

    /// Add a field, keeping `fields_map` in sync.
    pub fn add_field(&mut self, name: impl Into<String>, field: FieldMetadata) {
        let name = name.into();
        self.fields_map
            .insert(name.clone(), field.display_name.clone());
        self.fields.insert(name, field);
    }

    pub fn with_field(mut self, name: impl Into<String>, field: FieldMetadata) -> Self {
        self.add_field(name, field);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldMetadata> {
        self.fields.get(name)
    }

    /// Field names, sorted.
    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.fields.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Result of a metadata fan-out: successes and per-object failures.
#[derive(Debug, Default)]
pub struct ListObjectMetadataResult {
    pub result: HashMap<String, ObjectMetadata>,
    pub errors: HashMap<String, ConnectorError>,
}

impl ListObjectMetadataResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
