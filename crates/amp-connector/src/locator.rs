//! Response locators
//!
//! Small JSON queries used to find the records array, the next-page token and
//! record identifiers in provider responses.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{ConnectorError, ConnectorResult};
use crate::operation::Record;
use crate::types::ModuleId;

/// Locates the records of a response body.
pub type RecordsFunc = Arc<dyn Fn(&Value) -> ConnectorResult<Vec<Record>> + Send + Sync>;

/// Locates the next-page token of a response body; empty when exhausted.
pub type NextPageFunc = Arc<dyn Fn(&Value) -> ConnectorResult<String> + Send + Sync>;

/// A key reached by walking `nested` objects first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    pub key: String,
    pub nested: Vec<String>,
}

impl JsonPath {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            nested: Vec::new(),
        }
    }

    /// Path `key` under the objects `nested[0].nested[1]...`.
    pub fn nested<I, S>(key: impl Into<String>, nested: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key: key.into(),
            nested: nested.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a dotted path such as `paging.next.after`.
    pub fn dotted(path: &str) -> Self {
        let mut parts: Vec<String> = path.split('.').map(str::to_string).collect();
        let key = parts.pop().unwrap_or_default();
        Self { key, nested: parts }
    }

    /// The value at this path, treating `null` as absent.
    pub fn lookup<'a>(&self, node: &'a Value) -> Option<&'a Value> {
        let mut current = node;
        for zoom in &self.nested {
            current = current.get(zoom.as_str())?;
        }
        current.get(self.key.as_str()).filter(|v| !v.is_null())
    }

    /// Same as [`lookup`](Self::lookup), starting from a record.
    pub fn lookup_record<'a>(&self, record: &'a Record) -> Option<&'a Value> {
        let Some((first, rest)) = self.nested.split_first() else {
            return record.get(self.key.as_str()).filter(|v| !v.is_null());
        };
        let mut current = record.get(first.as_str())?;
        for zoom in rest {
            current = current.get(zoom.as_str())?;
        }
        current.get(self.key.as_str()).filter(|v| !v.is_null())
    }

    pub(crate) fn display(&self) -> String {
        let mut parts = self.nested.clone();
        parts.push(self.key.clone());
        parts.join(".")
    }
}

fn to_records(path: &str, value: &Value) -> ConnectorResult<Vec<Record>> {
    let items = value.as_array().ok_or_else(|| {
        ConnectorError::serialization(format!("'{path}' is not an array of records"))
    })?;
    items
        .iter()
        .map(|item| {
            item.as_object().cloned().ok_or_else(|| {
                ConnectorError::serialization(format!("'{path}' contains a non-object record"))
            })
        })
        .collect()
}

/// Records at `path`, or an empty list when the path is absent.
pub fn extract_optional_records_from_path(path: JsonPath) -> RecordsFunc {
    Arc::new(move |body: &Value| -> ConnectorResult<Vec<Record>> {
        match path.lookup(body) {
            Some(value) => to_records(&path.display(), value),
            None => Ok(Vec::new()),
        }
    })
}

/// Records at `key` under `nested`; a missing key is an error.
pub fn make_records_func<I, S>(key: impl Into<String>, nested: I) -> RecordsFunc
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let path = JsonPath::nested(key, nested);
    Arc::new(move |body: &Value| -> ConnectorResult<Vec<Record>> {
        let value = path.lookup(body).ok_or_else(|| {
            ConnectorError::serialization(format!("missing records key '{}'", path.display()))
        })?;
        to_records(&path.display(), value)
    })
}

/// Records of a body that is itself a JSON array.
pub fn records_at_root() -> RecordsFunc {
    Arc::new(|body: &Value| -> ConnectorResult<Vec<Record>> {
        match body {
            Value::Null => Ok(Vec::new()),
            other => to_records("$", other),
        }
    })
}

/// Next-page token at `path`: a string, or a number rendered as text.
pub fn make_next_page_func(path: JsonPath) -> NextPageFunc {
    Arc::new(move |body: &Value| -> ConnectorResult<String> {
        Ok(path.lookup(body).and_then(value_to_id).unwrap_or_default())
    })
}

/// A page function for providers without pagination.
pub fn no_next_page() -> NextPageFunc {
    Arc::new(|_: &Value| -> ConnectorResult<String> { Ok(String::new()) })
}

/// Render a string or JSON-number identifier. Whole numbers are emitted
/// without decimals.
pub fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                n.as_f64().map(|f| {
                    if f.fract() == 0.0 && f.abs() < 1e15 {
                        format!("{f:.0}")
                    } else {
                        f.to_string()
                    }
                })
            }
        }
        _ => None,
    }
}

/// Where a record keeps its identifier: `field` inside the `zoom` objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdFieldQuery {
    pub zoom: Vec<String>,
    pub field: String,
}

impl IdFieldQuery {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            zoom: Vec::new(),
            field: field.into(),
        }
    }

    pub fn zoomed<I, S>(zoom: I, field: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            zoom: zoom.into_iter().map(Into::into).collect(),
            field: field.into(),
        }
    }

    /// The record's identifier, or `None` when absent or not a string/number.
    pub fn extract(&self, record: &Record) -> Option<String> {
        let mut current = record.get(self.zoom.first().unwrap_or(&self.field))?;
        if self.zoom.is_empty() {
            return value_to_id(current);
        }
        for zoom in self.zoom.iter().skip(1) {
            current = current.get(zoom.as_str())?;
        }
        value_to_id(current.get(self.field.as_str())?)
    }
}

/// Per-module, per-object location of the record ID in write responses.
#[derive(Debug, Clone)]
pub struct ResponseDataLocator {
    module: ModuleId,
    paths: HashMap<ModuleId, HashMap<String, JsonPath>>,
    default_path: JsonPath,
}

impl ResponseDataLocator {
    /// Locator for `module`; unknown objects use the top-level `id` key.
    pub fn new(module: impl Into<ModuleId>) -> Self {
        Self {
            module: module.into(),
            paths: HashMap::new(),
            default_path: JsonPath::new("id"),
        }
    }

    pub fn with_default_path(mut self, path: JsonPath) -> Self {
        self.default_path = path;
        self
    }

    pub fn with_path(
        mut self,
        module: impl Into<ModuleId>,
        object: impl Into<String>,
        path: JsonPath,
    ) -> Self {
        self.paths
            .entry(module.into())
            .or_default()
            .insert(object.into(), path);
        self
    }

    fn path_for(&self, object: &str) -> &JsonPath {
        self.paths
            .get(&self.module)
            .and_then(|objects| objects.get(object))
            .unwrap_or(&self.default_path)
    }

    /// Record ID in `node`; empty when the response does not carry one.
    pub fn extract_record_id(&self, node: &Value, object: &str) -> String {
        self.path_for(object)
            .lookup(node)
            .and_then(value_to_id)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_optional_records_absent_path() {
        let func = extract_optional_records_from_path(JsonPath::new("results"));
        assert!(func(&json!({"total": 0})).unwrap().is_empty());
        assert_eq!(func(&json!({"results": [{"id": 1}, {"id": 2}]})).unwrap().len(), 2);
    }

    #[test]
    fn test_records_nested_key() {
        let func = make_records_func("items", ["data"]);
        let records = func(&json!({"data": {"items": [{"id": "a"}]}})).unwrap();
        assert_eq!(records[0]["id"], json!("a"));
        assert!(func(&json!({"data": {}})).is_err());
    }

    #[test]
    fn test_records_reject_non_objects() {
        let func = extract_optional_records_from_path(JsonPath::new("results"));
        assert!(func(&json!({"results": [1, 2]})).is_err());
        assert!(func(&json!({"results": "nope"})).is_err());
    }

    #[test]
    fn test_records_at_root() {
        assert_eq!(records_at_root()(&json!([{"a": 1}])).unwrap().len(), 1);
    }

    #[test]
    fn test_next_page_token() {
        let func = make_next_page_func(JsonPath::dotted("paging.next.after"));
        assert_eq!(func(&json!({"paging": {"next": {"after": "abc"}}})).unwrap(), "abc");
        assert_eq!(func(&json!({"paging": {"next": {"after": 200}}})).unwrap(), "200");
        assert_eq!(func(&json!({"paging": null})).unwrap(), "");
        assert_eq!(func(&json!({})).unwrap(), "");
    }

    #[test]
    fn test_value_to_id() {
        assert_eq!(value_to_id(&json!("x")).as_deref(), Some("x"));
        assert_eq!(value_to_id(&json!(42)).as_deref(), Some("42"));
        assert_eq!(value_to_id(&json!(42.0)).as_deref(), Some("42"));
        assert_eq!(value_to_id(&json!(1.5)).as_deref(), Some("1.5"));
        assert_eq!(value_to_id(&json!(true)), None);
        assert_eq!(value_to_id(&json!("")), None);
    }

    #[test]
    fn test_id_field_query() {
        let record = json!({"id": 7, "properties": {"hs_object_id": "123"}});
        let record = record.as_object().unwrap();
        assert_eq!(IdFieldQuery::new("id").extract(record).as_deref(), Some("7"));
        assert_eq!(
            IdFieldQuery::zoomed(["properties"], "hs_object_id")
                .extract(record)
                .as_deref(),
            Some("123")
        );
        assert_eq!(IdFieldQuery::new("missing").extract(record), None);
    }

    #[test]
    fn test_response_data_locator() {
        let locator = ResponseDataLocator::new("crm")
            .with_path("crm", "deals", JsonPath::nested("id", ["data"]));
        assert_eq!(locator.extract_record_id(&json!({"data": {"id": 9}}), "deals"), "9");
        assert_eq!(locator.extract_record_id(&json!({"id": "c-1"}), "contacts"), "c-1");
        assert_eq!(locator.extract_record_id(&json!({}), "contacts"), "");
    }
}
