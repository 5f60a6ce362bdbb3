//! Operation types
//!
//! Parameters and results of the read, write and delete operations.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::datautils::Set;
use crate::error::{ConnectorError, ConnectorResult};

/// A record as returned by a provider: a free-form JSON object.
pub type Record = serde_json::Map<String, Value>;

/// Input of a read operation.
#[derive(Debug, Clone, Default)]
pub struct ReadParams {
    /// Object to read (e.g. `contacts`).
    pub object_name: String,

    /// Requested fields, in request order. Dotted or `$['a']['b']` JSON
    /// paths are accepted.
    pub fields: Set<String>,

    /// Only records updated after this instant.
    pub since: Option<DateTime<Utc>>,

    /// Only records updated before this instant.
    pub until: Option<DateTime<Utc>>,

    /// Opaque continuation token from a previous [`ReadResult`].
    pub next_page: String,

    pub page_size: Option<usize>,

    /// Read deleted records instead of live ones.
    pub deleted: bool,

    /// Names of associations to expand on each row.
    pub associated_objects: Vec<String>,
}

impl ReadParams {
    pub fn new(object_name: impl Into<String>) -> Self {
        Self {
            object_name: object_name.into(),
            ..Default::default()
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            self.fields.add(field.into());
        }
        self
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_next_page(mut self, token: impl Into<String>) -> Self {
        self.next_page = token.into();
        self
    }

    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn with_deleted(mut self, deleted: bool) -> Self {
        self.deleted = deleted;
        self
    }

    pub fn with_associated_objects<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.associated_objects
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Validate the parameters; `require_fields` rejects an empty field set.
    pub fn validate(&self, require_fields: bool) -> ConnectorResult<()> {
        if self.object_name.is_empty() {
            return Err(ConnectorError::missing_parameter("objectName"));
        }
        if require_fields && self.fields.is_empty() {
            return Err(ConnectorError::missing_parameter("fields"));
        }
        if let (Some(since), Some(until)) = (self.since, self.until) {
            if since > until {
                return Err(ConnectorError::bad_request(
                    400,
                    format!("since ({since}) is after until ({until})"),
                ));
            }
        }
        Ok(())
    }
}

/// An associated record attached to a read row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Association {
    pub object_id: String,
    pub raw: Record,
}

/// One record of a read page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadResultRow {
    /// Requested fields, keyed by lower-cased name.
    pub fields: Record,

    /// The full record as the provider returned it.
    pub raw: Record,

    /// Record identifier; empty when the provider does not expose one.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub associations: HashMap<String, Vec<Association>>,
}

/// One page of a read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResult {
    pub rows: usize,
    pub data: Vec<ReadResultRow>,
    pub next_page: String,
    pub done: bool,
}

impl ReadResult {
    /// Build a page; `done` is derived from the token so the two never disagree.
    pub fn new(data: Vec<ReadResultRow>, next_page: impl Into<String>) -> Self {
        let next_page = next_page.into();
        Self {
            rows: data.len(),
            done: next_page.is_empty(),
            data,
            next_page,
        }
    }

    /// The final, empty page.
    pub fn empty() -> Self {
        Self::new(Vec::new(), "")
    }
}

/// Input of a write operation.
#[derive(Debug, Clone, Default)]
pub struct WriteParams {
    pub object_name: String,

    /// Record to update; empty means create.
    pub record_id: String,

    /// Payload; `Value::Null` means absent.
    pub record_data: Value,

    /// Extra request headers.
    pub headers: Vec<(String, String)>,
}

impl WriteParams {
    pub fn new(object_name: impl Into<String>, record_data: Value) -> Self {
        Self {
            object_name: object_name.into(),
            record_data,
            ..Default::default()
        }
    }

    pub fn with_record_id(mut self, id: impl Into<String>) -> Self {
        self.record_id = id.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn is_update(&self) -> bool {
        !self.record_id.is_empty()
    }

    pub fn validate(&self) -> ConnectorResult<()> {
        if self.object_name.is_empty() {
            return Err(ConnectorError::missing_parameter("objectName"));
        }
        let empty_create = !self.is_update()
            && self.record_data.as_object().is_some_and(serde_json::Map::is_empty);
        if self.record_data.is_null() || empty_create {
            return Err(ConnectorError::missing_parameter("recordData"));
        }
        Ok(())
    }
}

/// Outcome of a write operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResult {
    pub success: bool,

    pub record_id: String,

    /// Provider-reported errors for a partially successful write.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Value>,

    /// Record as echoed back by the provider, when it does so.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub data: Record,
}

impl WriteResult {
    pub fn succeeded(record_id: impl Into<String>, data: Record) -> Self {
        Self {
            success: true,
            record_id: record_id.into(),
            errors: Vec::new(),
            data,
        }
    }
}

/// Outcome of a batch of writes: one slot per input, in input order.
#[derive(Debug, Default)]
pub struct BatchWriteResult {
    pub results: Vec<Option<WriteResult>>,

    /// Input index to the error that write failed with.
    pub errors: HashMap<usize, ConnectorError>,
}

impl BatchWriteResult {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_some()).count()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Input of a delete operation.
#[derive(Debug, Clone, Default)]
pub struct DeleteParams {
    pub object_name: String,
    pub record_id: String,
    pub headers: Vec<(String, String)>,
}

impl DeleteParams {
    pub fn new(object_name: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            object_name: object_name.into(),
            record_id: record_id.into(),
            headers: Vec::new(),
        }
    }

    pub fn validate(&self) -> ConnectorResult<()> {
        if self.object_name.is_empty() {
            return Err(ConnectorError::missing_parameter("objectName"));
        }
        if self.record_id.is_empty() {
            return Err(ConnectorError::missing_parameter("recordId"));
        }
        Ok(())
    }
}

/// Outcome of a delete operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResult {
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_read_params_validation() {
        assert!(matches!(
            ReadParams::default().validate(false),
            Err(ConnectorError::MissingParameter { .. })
        ));

        let params = ReadParams::new("contacts");
        assert!(params.validate(false).is_ok());
        assert!(params.validate(true).is_err());
        assert!(params.with_fields(["id"]).validate(true).is_ok());
    }

    #[test]
    fn test_read_params_fields_keep_order_and_dedupe() {
        let params = ReadParams::new("contacts").with_fields(["name", "id", "name"]);
        assert_eq!(params.fields.list(), &["name", "id"]);
    }

    #[test]
    fn test_read_result_done_matches_token() {
        let last = ReadResult::new(vec![ReadResultRow::default()], "");
        assert!(last.done);
        assert_eq!(last.rows, 1);

        let more = ReadResult::new(Vec::new(), "cursor-1");
        assert!(!more.done);

        let empty = ReadResult::empty();
        assert_eq!(empty.rows, 0);
        assert!(empty.done);
        assert!(empty.next_page.is_empty());
    }

    #[test]
    fn test_write_params_validation() {
        assert!(WriteParams::new("contacts", Value::Null).validate().is_err());
        assert!(WriteParams::new("", json!({})).validate().is_err());
        assert!(matches!(
            WriteParams::new("contacts", json!({})).validate(),
            Err(ConnectorError::MissingParameter { .. })
        ));
        assert!(WriteParams::new("contacts", json!({}))
            .with_record_id("1")
            .validate()
            .is_ok());

        let params = WriteParams::new("contacts", json!({"name": "x"})).with_record_id("1");
        assert!(params.validate().is_ok());
        assert!(params.is_update());
    }

    #[test]
    fn test_delete_params_require_id() {
        assert!(DeleteParams::new("contacts", "").validate().is_err());
        assert!(DeleteParams::new("contacts", "1").validate().is_ok());
    }

    #[test]
    fn test_write_result_serialization() {
        let result = WriteResult::succeeded("42", Record::new());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json, json!({"success": true, "recordId": "42"}));
    }
}
