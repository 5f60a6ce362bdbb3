//! Record marshalling
//!
//! Turns located provider records into [`ReadResultRow`]s: projects the
//! requested fields, extracts IDs and applies provider transformations.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::datautils::Set;
use crate::error::ConnectorResult;
use crate::locator::IdFieldQuery;
use crate::operation::{ReadResultRow, Record};

/// Converts a page of records into result rows.
pub type MarshalFunc =
    Arc<dyn Fn(&[Record], &Set<String>) -> ConnectorResult<Vec<ReadResultRow>> + Send + Sync>;

/// Rewrites a record before field projection.
pub type RecordTransformer = Arc<dyn Fn(&Record) -> ConnectorResult<Record> + Send + Sync>;

/// Split a requested field into its path segments.
///
/// Accepts `$['a']['b']`, `$.a.b` and plain `a.b`.
pub fn parse_field_path(field: &str) -> Vec<String> {
    if let Some(rest) = field.strip_prefix("$[") {
        return format!("[{rest}")
            .split(']')
            .filter_map(|part| {
                let part = part.trim().strip_prefix('[')?;
                Some(part.trim_matches(|c| c == '\'' || c == '"').to_string())
            })
            .collect();
    }
    field
        .strip_prefix("$.")
        .unwrap_or(field)
        .split('.')
        .map(str::to_string)
        .collect()
}

fn lookup_path<'a>(record: &'a Record, path: &[String]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = record.get(first.as_str())?;
    for segment in rest {
        current = current.get(segment.as_str())?;
    }
    Some(current)
}

/// Project `fields` out of `record`, keyed by lower-cased name.
///
/// A field that exists verbatim as a top-level key wins over its path
/// reading; path fields are emitted under their terminal key. Missing fields
/// are skipped.
pub fn select_fields(record: &Record, fields: &Set<String>) -> Record {
    let mut selected = Record::new();
    for field in fields {
        if let Some(value) = record.get(field.as_str()) {
            selected.insert(field.to_lowercase(), value.clone());
            continue;
        }
        let path = parse_field_path(field);
        if let (Some(value), Some(terminal)) = (lookup_path(record, &path), path.last()) {
            selected.insert(terminal.to_lowercase(), value.clone());
        }
    }
    selected
}

/// Every top-level key, lower-cased.
pub fn lowercase_keys(record: &Record) -> Record {
    record
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.clone()))
        .collect()
}

/// Rows whose `fields` are the whole record.
pub fn identity() -> MarshalFunc {
    Arc::new(|records: &[Record], _fields: &Set<String>| -> ConnectorResult<Vec<ReadResultRow>> {
        Ok(records
            .iter()
            .map(|record| ReadResultRow {
                fields: lowercase_keys(record),
                raw: record.clone(),
                ..Default::default()
            })
            .collect())
    })
}

/// Rows with only the requested fields.
pub fn selected_fields() -> MarshalFunc {
    Arc::new(|records: &[Record], fields: &Set<String>| -> ConnectorResult<Vec<ReadResultRow>> {
        Ok(records
            .iter()
            .map(|record| ReadResultRow {
                fields: select_fields(record, fields),
                raw: record.clone(),
                ..Default::default()
            })
            .collect())
    })
}

/// Rows with the requested fields and the ID located by `id_query`.
pub fn with_id(id_query: IdFieldQuery) -> MarshalFunc {
    Arc::new(move |records: &[Record], fields: &Set<String>| -> ConnectorResult<Vec<ReadResultRow>> {
        Ok(records
            .iter()
            .map(|record| ReadResultRow {
                fields: select_fields(record, fields),
                raw: record.clone(),
                id: id_query.extract(record).unwrap_or_default(),
                ..Default::default()
            })
            .collect())
    })
}

/// Like [`with_id`], but fields are projected from `transform(record)`.
/// `raw` keeps the provider's original record.
pub fn with_transformer(transform: RecordTransformer, id_query: IdFieldQuery) -> MarshalFunc {
    Arc::new(move |records: &[Record], fields: &Set<String>| -> ConnectorResult<Vec<ReadResultRow>> {
        records
            .iter()
            .map(|record| {
                let transformed = transform(record)?;
                Ok(ReadResultRow {
                    fields: select_fields(&transformed, fields),
                    raw: record.clone(),
                    id: id_query
                        .extract(&transformed)
                        .or_else(|| id_query.extract(record))
                        .unwrap_or_default(),
                    ..Default::default()
                })
            })
            .collect()
    })
}

/// Transformer that moves the entries of the `container` object to the top
/// level, renamed through `names` (unmapped keys keep their own name).
///
/// Used for providers that nest custom fields under hashed keys.
pub fn promote_nested_fields(
    container: impl Into<String>,
    names: HashMap<String, String>,
) -> RecordTransformer {
    let container = container.into();
    Arc::new(move |record: &Record| -> ConnectorResult<Record> {
        let mut flattened = record.clone();
        if let Some(Value::Object(nested)) = flattened.remove(&container) {
            for (key, value) in nested {
                let name = names.get(&key).cloned().unwrap_or(key);
                flattened.insert(name, value);
            }
        }
        Ok(flattened)
    })
}
