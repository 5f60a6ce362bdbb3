//! Object schemas
//!
//! Each object is described by a JSON Schema document. Three extension
//! keywords on property nodes carry what the store needs beyond validation:
//!
//! | Keyword | Meaning |
//! |---|---|
//! | `x-amp-id-field` | the property is the record identifier |
//! | `x-amp-updated-field` | the property is stamped with the modification time |
//! | `x-amp-association` | the property declares a relationship |
//!
//! Schemas are compiled once and immutable afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use jsonschema::{Draft, JSONSchema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use amp_connector::error::{ConnectorError, ConnectorResult};
use amp_connector::operation::Record;
use amp_connector::schema::{FieldMetadata, FieldValue, ObjectMetadata};
use amp_connector::types::ValueType;

pub const ID_FIELD_KEYWORD: &str = "x-amp-id-field";
pub const UPDATED_FIELD_KEYWORD: &str = "x-amp-updated-field";
pub const ASSOCIATION_KEYWORD: &str = "x-amp-association";

/// Kind of relationship declared by `x-amp-association`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssociationType {
    /// The property holds the ID of a `targetObject` record.
    ForeignKey,
    /// `targetObject` records point back at this record through `foreignKeyField`.
    ReverseLookup,
    /// Links are stored as `junctionObject` records.
    Junction,
}

impl fmt::Display for AssociationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AssociationType::ForeignKey => "foreignKey",
            AssociationType::ReverseLookup => "reverseLookup",
            AssociationType::Junction => "junction",
        })
    }
}

/// A relationship declared on a property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationSchema {
    #[serde(alias = "type")]
    pub association_type: AssociationType,

    #[serde(default)]
    pub target_object: String,

    /// Field of the target matched against the foreign key; the target's
    /// ID field when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_field: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key_field: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub junction_object: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub junction_from_field: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub junction_to_field: Option<String>,
}

impl AssociationSchema {
    pub fn foreign_key(target_object: impl Into<String>) -> Self {
        Self {
            association_type: AssociationType::ForeignKey,
            target_object: target_object.into(),
            target_field: None,
            foreign_key_field: None,
            junction_object: None,
            junction_from_field: None,
            junction_to_field: None,
        }
    }

    pub fn reverse_lookup(target_object: impl Into<String>, foreign_key_field: impl Into<String>) -> Self {
        Self {
            association_type: AssociationType::ReverseLookup,
            foreign_key_field: Some(foreign_key_field.into()),
            ..Self::foreign_key(target_object)
        }
    }

    pub fn junction(
        junction_object: impl Into<String>,
        from_field: impl Into<String>,
        to_field: impl Into<String>,
        target_object: impl Into<String>,
    ) -> Self {
        Self {
            association_type: AssociationType::Junction,
            junction_object: Some(junction_object.into()),
            junction_from_field: Some(from_field.into()),
            junction_to_field: Some(to_field.into()),
            ..Self::foreign_key(target_object)
        }
    }

    /// Match foreign keys against `field` of the target instead of its ID.
    pub fn with_target_field(mut self, field: impl Into<String>) -> Self {
        self.target_field = Some(field.into());
        self
    }

    /// Fail with `InvalidAssociation` when a field the type needs is absent.
    pub fn check(&self, object: &str, name: &str) -> ConnectorResult<()> {
        let invalid = |message: String| ConnectorError::InvalidAssociation {
            object: object.to_string(),
            association: name.to_string(),
            message,
        };
        if self.target_object.is_empty() {
            return Err(invalid("targetObject is required".to_string()));
        }
        let missing: Vec<&str> = match self.association_type {
            AssociationType::ForeignKey => Vec::new(),
            AssociationType::ReverseLookup => [("foreignKeyField", &self.foreign_key_field)]
                .into_iter()
                .filter(|(_, v)| v.as_deref().map_or(true, str::is_empty))
                .map(|(k, _)| k)
                .collect(),
            AssociationType::Junction => [
                ("junctionObject", &self.junction_object),
                ("junctionFromField", &self.junction_from_field),
                ("junctionToField", &self.junction_to_field),
            ]
            .into_iter()
            .filter(|(_, v)| v.as_deref().map_or(true, str::is_empty))
            .map(|(k, _)| k)
            .collect(),
        };
        if !missing.is_empty() {
            return Err(invalid(format!(
                "{} association requires {}",
                self.association_type,
                missing.join(", ")
            )));
        }
        Ok(())
    }
}

/// JSON representation of an ID or timestamp property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldKind {
    #[default]
    String,
    Integer,
    Number,
}

impl FieldKind {
    fn of(node: &Value) -> Self {
        match json_type(node) {
            Some("integer") => FieldKind::Integer,
            Some("number") => FieldKind::Number,
            _ => FieldKind::String,
        }
    }

    fn as_type(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Number => "number",
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, FieldKind::String)
    }
}

/// The declared `type` of a schema node; the first non-null entry of a type list.
pub fn json_type(node: &Value) -> Option<&str> {
    match node.get("type")? {
        Value::String(t) => Some(t.as_str()),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null"),
        _ => None,
    }
}

fn flag(node: &Value, keyword: &str) -> bool {
    match node.get(keyword) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// A compiled object schema with its extracted metadata.
pub struct ObjectSchema {
    name: String,
    document: Value,
    compiled: JSONSchema,
    id_field: String,
    id_kind: FieldKind,
    updated_field: Option<(String, FieldKind)>,
    associations: BTreeMap<String, AssociationSchema>,
}

impl fmt::Debug for ObjectSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectSchema")
            .field("name", &self.name)
            .field("id_field", &self.id_field)
            .field("updated_field", &self.updated_field)
            .field("associations", &self.associations)
            .finish_non_exhaustive()
    }
}

impl ObjectSchema {
    /// Compile `document` as JSON Schema draft 2020-12 and extract the ID,
    /// updated and association extensions of its top-level properties.
    ///
    /// Without an `x-amp-id-field` property, a property named `id` is used.
    pub fn compile(name: impl Into<String>, document: Value) -> ConnectorResult<Self> {
        let name = name.into();
        let invalid = |message: String| ConnectorError::InvalidSchema {
            object: name.clone(),
            message,
        };

        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft202012)
            .compile(&document)
            .map_err(|e| invalid(format!("schema does not compile: {e}")))?;

        let properties = document
            .get("properties")
            .and_then(Value::as_object)
            .ok_or_else(|| invalid("schema has no properties".to_string()))?;

        let mut id_field = None;
        let mut updated_field = None;
        let mut associations = BTreeMap::new();
        for (property, node) in properties {
            if flag(node, ID_FIELD_KEYWORD) {
                if let Some((existing, _)) = &id_field {
                    return Err(invalid(format!(
                        "both '{existing}' and '{property}' are marked {ID_FIELD_KEYWORD}"
                    )));
                }
                id_field = Some((property.clone(), FieldKind::of(node)));
            }
            if flag(node, UPDATED_FIELD_KEYWORD) {
                updated_field = Some((property.clone(), FieldKind::of(node)));
            }
            if let Some(raw) = node.get(ASSOCIATION_KEYWORD) {
                let association: AssociationSchema = serde_json::from_value(raw.clone()).map_err(|e| {
                    ConnectorError::InvalidAssociation {
                        object: name.clone(),
                        association: property.clone(),
                        message: e.to_string(),
                    }
                })?;
                association.check(&name, property)?;
                associations.insert(property.clone(), association);
            }
        }

        let (id_field, id_kind) = match id_field {
            Some(found) => found,
            None => {
                let node = properties
                    .get("id")
                    .ok_or_else(|| invalid(format!("no property is marked {ID_FIELD_KEYWORD}")))?;
                ("id".to_string(), FieldKind::of(node))
            }
        };

        debug!(
            object = %name,
            id_field = %id_field,
            associations = associations.len(),
            "Compiled object schema"
        );
        Ok(Self {
            name,
            document,
            compiled,
            id_field,
            id_kind,
            updated_field,
            associations,
        })
    }

    /// Compile a schema from raw JSON bytes.
    pub fn from_slice(name: impl Into<String>, bytes: &[u8]) -> ConnectorResult<Self> {
        let name = name.into();
        let document: Value = serde_json::from_slice(bytes).map_err(|e| ConnectorError::InvalidSchema {
            object: name.clone(),
            message: format!("invalid JSON: {e}"),
        })?;
        Self::compile(name, document)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    pub fn id_kind(&self) -> FieldKind {
        self.id_kind
    }

    pub fn updated_field(&self) -> Option<&str> {
        self.updated_field.as_ref().map(|(field, _)| field.as_str())
    }

    pub fn updated_kind(&self) -> Option<FieldKind> {
        self.updated_field.as_ref().map(|(_, kind)| *kind)
    }

    pub fn associations(&self) -> &BTreeMap<String, AssociationSchema> {
        &self.associations
    }

    pub fn association(&self, name: &str) -> Option<&AssociationSchema> {
        self.associations.get(name)
    }

    /// Associations whose values live in the record itself.
    pub fn foreign_keys(&self) -> impl Iterator<Item = (&String, &AssociationSchema)> {
        self.associations
            .iter()
            .filter(|(_, a)| a.association_type == AssociationType::ForeignKey)
    }

    pub fn properties(&self) -> Option<&Map<String, Value>> {
        self.document.get("properties").and_then(Value::as_object)
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties()?.get(name)
    }

    pub fn required(&self) -> Vec<&str> {
        self.document
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Validate `record` against the compiled schema.
    pub fn validate(&self, record: &Record) -> ConnectorResult<()> {
        let instance = Value::Object(record.clone());
        let errors: Vec<String> = match self.compiled.validate(&instance) {
            Ok(()) => return Ok(()),
            Err(errors) => errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{path}: {e}")
                    }
                })
                .collect(),
        };
        Err(ConnectorError::ValidationFailed {
            object: self.name.clone(),
            errors,
        })
    }

    /// The JSON value stored in the ID field for key `id`.
    pub fn id_value(&self, id: &str) -> Value {
        match self.id_kind {
            FieldKind::Integer => id.parse::<i64>().map_or_else(|_| json!(id), |n| json!(n)),
            FieldKind::Number => id.parse::<f64>().map_or_else(|_| json!(id), |n| json!(n)),
            FieldKind::String => json!(id),
        }
    }

    /// Describe the object as `ListObjectMetadata` reports it.
    pub fn to_object_metadata(&self) -> ObjectMetadata {
        let display = self
            .document
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or(&self.name);
        let required = self.required();
        let mut metadata = ObjectMetadata::new(display);

        for (name, node) in self.properties().into_iter().flatten() {
            let json_type = json_type(node).unwrap_or_default();
            let format = node.get("format").and_then(Value::as_str);
            let values = enum_values(node);
            let value_type = ValueType::from_json_schema(json_type, format, !values.is_empty());

            let display = node.get("title").and_then(Value::as_str).unwrap_or(name);
            let mut field = FieldMetadata::new(display, value_type)
                .with_provider_type(json_type)
                .required(required.contains(&name.as_str()))
                .with_values(values);

            let virtual_association = self
                .associations
                .get(name)
                .is_some_and(|a| a.association_type != AssociationType::ForeignKey);
            if name == &self.id_field
                || self.updated_field() == Some(name.as_str())
                || flag(node, "readOnly")
                || virtual_association
            {
                field = field.read_only();
            }
            metadata.add_field(name.clone(), field);
        }
        metadata
    }
}

fn enum_values(node: &Value) -> Vec<FieldValue> {
    let values = node
        .get("enum")
        .or_else(|| node.get("items").and_then(|items| items.get("enum")))
        .and_then(Value::as_array);
    values
        .into_iter()
        .flatten()
        .map(|v| {
            let text = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            FieldValue::new(text.clone(), text)
        })
        .collect()
}

/// Builds an object schema document from typed parts.
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    name: String,
    title: Option<String>,
    properties: Map<String, Value>,
    required: Vec<String>,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            properties: Map::new(),
            required: Vec::new(),
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Declare the ID property.
    pub fn id(self, field: impl Into<String>, kind: FieldKind) -> Self {
        self.property(field, json!({"type": kind.as_type(), ID_FIELD_KEYWORD: true}))
    }

    /// Declare the modification-time property. String timestamps are RFC 3339.
    pub fn updated(self, field: impl Into<String>, kind: FieldKind) -> Self {
        let node = match kind {
            FieldKind::String => json!({"type": "string", "format": "date-time", UPDATED_FIELD_KEYWORD: true}),
            other => json!({"type": other.as_type(), UPDATED_FIELD_KEYWORD: true}),
        };
        self.property(field, node)
    }

    pub fn property(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    pub fn required_property(mut self, name: impl Into<String>, schema: Value) -> Self {
        let name = name.into();
        self.required.push(name.clone());
        self.property(name, schema)
    }

    /// Declare a property carrying an association.
    pub fn association(self, name: impl Into<String>, mut schema: Value, association: AssociationSchema) -> Self {
        if let (Some(node), Ok(raw)) = (schema.as_object_mut(), serde_json::to_value(&association)) {
            node.insert(ASSOCIATION_KEYWORD.to_string(), raw);
        }
        self.property(name, schema)
    }

    pub fn document(&self) -> Value {
        let mut document = json!({
            "type": "object",
            "properties": Value::Object(self.properties.clone()),
        });
        if let Some(node) = document.as_object_mut() {
            if let Some(title) = &self.title {
                node.insert("title".to_string(), json!(title));
            }
            if !self.required.is_empty() {
                node.insert("required".to_string(), json!(self.required));
            }
        }
        document
    }

    pub fn build(self) -> ConnectorResult<ObjectSchema> {
        let document = self.document();
        ObjectSchema::compile(self.name, document)
    }
}

/// All object schemas of a store.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    objects: BTreeMap<String, Arc<ObjectSchema>>,
}

impl SchemaRegistry {
    /// Register compiled schemas, checking that every association points at
    /// a registered object.
    pub fn new<I>(schemas: I) -> ConnectorResult<Self>
    where
        I: IntoIterator<Item = ObjectSchema>,
    {
        let objects: BTreeMap<String, Arc<ObjectSchema>> = schemas
            .into_iter()
            .map(|schema| (schema.name.clone(), Arc::new(schema)))
            .collect();
        let registry = Self { objects };
        registry.check_associations()?;
        Ok(registry)
    }

    /// Compile raw JSON schema bytes keyed by object name.
    pub fn from_raw<I, K, B>(raw: I) -> ConnectorResult<Self>
    where
        I: IntoIterator<Item = (K, B)>,
        K: Into<String>,
        B: AsRef<[u8]>,
    {
        let schemas = raw
            .into_iter()
            .map(|(name, bytes)| ObjectSchema::from_slice(name, bytes.as_ref()))
            .collect::<ConnectorResult<Vec<_>>>()?;
        Self::new(schemas)
    }

    /// Compile schema documents keyed by object name.
    pub fn from_documents<I, K>(documents: I) -> ConnectorResult<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let schemas = documents
            .into_iter()
            .map(|(name, document)| ObjectSchema::compile(name, document))
            .collect::<ConnectorResult<Vec<_>>>()?;
        Self::new(schemas)
    }

    fn check_associations(&self) -> ConnectorResult<()> {
        for (object, schema) in &self.objects {
            for (name, association) in &schema.associations {
                let invalid = |message: String| ConnectorError::InvalidAssociation {
                    object: object.clone(),
                    association: name.clone(),
                    message,
                };
                if !self.objects.contains_key(&association.target_object) {
                    return Err(invalid(format!(
                        "target object '{}' has no schema",
                        association.target_object
                    )));
                }
                if let Some(junction) = &association.junction_object {
                    if !self.objects.contains_key(junction) {
                        return Err(invalid(format!("junction object '{junction}' has no schema")));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, object: &str) -> Option<&Arc<ObjectSchema>> {
        self.objects.get(object)
    }

    /// The schema of `object`, or `ObjectNotSupported` for `operation`.
    pub fn require(&self, object: &str, operation: &str) -> ConnectorResult<Arc<ObjectSchema>> {
        self.objects
            .get(object)
            .cloned()
            .ok_or_else(|| ConnectorError::ObjectNotSupported {
                module: "memstore".to_string(),
                object: object.to_string(),
                operation: operation.to_string(),
            })
    }

    pub fn object_names(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
