//! Association resolution
//!
//! Foreign-key validation on write and association expansion on read. Both
//! run against a borrowed view of the record table, so callers decide which
//! lock they hold.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use amp_connector::error::{ConnectorError, ConnectorResult};
use amp_connector::locator::value_to_id;
use amp_connector::operation::{Association, Record};

use crate::schema::{AssociationSchema, AssociationType, ObjectSchema, SchemaRegistry};

/// Records of one object keyed by ID.
pub type ObjectRecords = BTreeMap<String, Record>;

/// Records of every object.
pub type RecordTable = HashMap<String, ObjectRecords>;

/// The `targetObject` record that `key` refers to.
///
/// Keys are matched against the target's ID unless the association names a
/// different `targetField`.
fn find_target<'a>(
    registry: &SchemaRegistry,
    table: &'a RecordTable,
    association: &AssociationSchema,
    key: &str,
) -> Option<&'a Record> {
    let records = table.get(&association.target_object)?;
    let id_field = registry
        .get(&association.target_object)
        .map(|schema| schema.id_field());
    match association.target_field.as_deref() {
        Some(field) if Some(field) != id_field => records
            .values()
            .find(|record| record.get(field).and_then(value_to_id).as_deref() == Some(key)),
        _ => records.get(key),
    }
}

fn record_id(schema: &ObjectSchema, record: &Record) -> Option<String> {
    record.get(schema.id_field()).and_then(value_to_id)
}

fn to_association(registry: &SchemaRegistry, object: &str, record: &Record) -> Association {
    let object_id = registry
        .get(object)
        .and_then(|schema| record_id(schema, record))
        .unwrap_or_default();
    Association {
        object_id,
        raw: record.clone(),
    }
}

/// Fail with `InvalidForeignKey` when a non-null foreign key in `record`
/// points at a record that does not exist.
pub fn check_foreign_keys(
    registry: &SchemaRegistry,
    table: &RecordTable,
    schema: &ObjectSchema,
    record: &Record,
) -> ConnectorResult<()> {
    for (field, association) in schema.foreign_keys() {
        let Some(value) = record.get(field).filter(|v| !v.is_null()) else {
            continue;
        };
        let invalid = |value: String| ConnectorError::InvalidForeignKey {
            field: field.clone(),
            value,
            target_object: association.target_object.clone(),
        };
        let key = value_to_id(value).ok_or_else(|| invalid(value.to_string()))?;
        if find_target(registry, table, association, &key).is_none() {
            return Err(invalid(key));
        }
    }
    Ok(())
}

/// Expand the associations `names` of `record`.
///
/// Missing targets are omitted; an association name the schema does not
/// declare is an `InvalidAssociation` error.
pub fn expand(
    registry: &SchemaRegistry,
    table: &RecordTable,
    schema: &ObjectSchema,
    record: &Record,
    names: &[String],
) -> ConnectorResult<HashMap<String, Vec<Association>>> {
    let mut expanded = HashMap::with_capacity(names.len());
    for name in names {
        let association = schema
            .association(name)
            .ok_or_else(|| ConnectorError::InvalidAssociation {
                object: schema.name().to_string(),
                association: name.clone(),
                message: "no such association".to_string(),
            })?;
        let related = match association.association_type {
            AssociationType::ForeignKey => foreign_key(registry, table, association, record.get(name)),
            AssociationType::ReverseLookup => reverse_lookup(registry, table, schema, association, record),
            AssociationType::Junction => junction(registry, table, schema, association, record),
        };
        expanded.insert(name.clone(), related);
    }
    Ok(expanded)
}

fn foreign_key(
    registry: &SchemaRegistry,
    table: &RecordTable,
    association: &AssociationSchema,
    value: Option<&Value>,
) -> Vec<Association> {
    value
        .and_then(value_to_id)
        .and_then(|key| find_target(registry, table, association, &key))
        .map(|target| to_association(registry, &association.target_object, target))
        .into_iter()
        .collect()
}

fn reverse_lookup(
    registry: &SchemaRegistry,
    table: &RecordTable,
    schema: &ObjectSchema,
    association: &AssociationSchema,
    record: &Record,
) -> Vec<Association> {
    let (Some(id), Some(fk)) = (record_id(schema, record), association.foreign_key_field.as_deref()) else {
        return Vec::new();
    };
    table
        .get(&association.target_object)
        .into_iter()
        .flat_map(|records| records.values())
        .filter(|target| target.get(fk).and_then(value_to_id).as_deref() == Some(id.as_str()))
        .map(|target| to_association(registry, &association.target_object, target))
        .collect()
}

fn junction(
    registry: &SchemaRegistry,
    table: &RecordTable,
    schema: &ObjectSchema,
    association: &AssociationSchema,
    record: &Record,
) -> Vec<Association> {
    let (Some(id), Some(junction_object), Some(from), Some(to)) = (
        record_id(schema, record),
        association.junction_object.as_deref(),
        association.junction_from_field.as_deref(),
        association.junction_to_field.as_deref(),
    ) else {
        return Vec::new();
    };
    table
        .get(junction_object)
        .into_iter()
        .flat_map(|links| links.values())
        .filter(|link| link.get(from).and_then(value_to_id).as_deref() == Some(id.as_str()))
        .filter_map(|link| link.get(to).and_then(value_to_id))
        .filter_map(|key| find_target(registry, table, association, &key))
        .map(|target| to_association(registry, &association.target_object, target))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::from_documents([
            (
                "account",
                json!({"type": "object", "properties": {
                    "id": {"type": "string"},
                    "code": {"type": "string"},
                    "name": {"type": "string"}
                }}),
            ),
            (
                "contact",
                json!({"type": "object", "properties": {
                    "id": {"type": "string"},
                    "account_id": {"type": ["string", "null"], "x-amp-association": {"associationType": "foreignKey", "targetObject": "account"}},
                    "account_code": {"type": "string", "x-amp-association": {"associationType": "foreignKey", "targetObject": "account", "targetField": "code"}},
                    "tags": {"type": "array", "x-amp-association": {
                        "associationType": "junction", "targetObject": "tag",
                        "junctionObject": "contactTag", "junctionFromField": "contact_id", "junctionToField": "tag_id"
                    }}
                }}),
            ),
            (
                "tag",
                json!({"type": "object", "properties": {"id": {"type": "string"}, "label": {"type": "string"}}}),
            ),
            (
                "contactTag",
                json!({"type": "object", "properties": {
                    "id": {"type": "string"}, "contact_id": {"type": "string"}, "tag_id": {"type": "string"}
                }}),
            ),
        ])
        .unwrap()
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn table(entries: &[(&str, Value)]) -> RecordTable {
        let mut table = RecordTable::new();
        for (object, value) in entries {
            let record = record(value.clone());
            let id = value_to_id(&record["id"]).unwrap();
            table.entry(object.to_string()).or_default().insert(id, record);
        }
        table
    }

    #[test]
    fn test_foreign_key_validation() {
        let registry = registry();
        let schema = registry.get("contact").unwrap();
        let table = table(&[("account", json!({"id": "acc-1", "code": "ACME"}))]);

        assert!(check_foreign_keys(&registry, &table, schema, &record(json!({"account_id": "acc-1"}))).is_ok());
        assert!(check_foreign_keys(&registry, &table, schema, &record(json!({"account_id": null}))).is_ok());
        assert!(check_foreign_keys(&registry, &table, schema, &record(json!({"account_code": "ACME"}))).is_ok());

        match check_foreign_keys(&registry, &table, schema, &record(json!({"account_id": "acc-99"}))) {
            Err(ConnectorError::InvalidForeignKey { field, value, target_object }) => {
                assert_eq!(field, "account_id");
                assert_eq!(value, "acc-99");
                assert_eq!(target_object, "account");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_junction_expansion_skips_missing_targets() {
        let registry = registry();
        let schema = registry.get("contact").unwrap();
        let table = table(&[
            ("tag", json!({"id": "t1", "label": "vip"})),
            ("contactTag", json!({"id": "j1", "contact_id": "c1", "tag_id": "t1"})),
            ("contactTag", json!({"id": "j2", "contact_id": "c1", "tag_id": "t-missing"})),
            ("contactTag", json!({"id": "j3", "contact_id": "c2", "tag_id": "t1"})),
        ]);

        let expanded = expand(&registry, &table, schema, &record(json!({"id": "c1"})), &["tags".to_string()]).unwrap();
        let tags = &expanded["tags"];
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].object_id, "t1");
        assert_eq!(tags[0].raw["label"], json!("vip"));
    }

    #[test]
    fn test_foreign_key_expansion_by_target_field() {
        let registry = registry();
        let schema = registry.get("contact").unwrap();
        let table = table(&[("account", json!({"id": "acc-1", "code": "ACME", "name": "Acme"}))]);

        let contact = record(json!({"id": "c1", "account_code": "ACME", "account_id": "gone"}));
        let names = vec!["account_code".to_string(), "account_id".to_string()];
        let expanded = expand(&registry, &table, schema, &contact, &names).unwrap();
        assert_eq!(expanded["account_code"][0].object_id, "acc-1");
        assert!(expanded["account_id"].is_empty());
    }

    #[test]
    fn test_unknown_association() {
        let registry = registry();
        let schema = registry.get("contact").unwrap();
        let result = expand(&registry, &RecordTable::new(), schema, &record(json!({"id": "c1"})), &["deals".to_string()]);
        assert!(matches!(result, Err(ConnectorError::InvalidAssociation { .. })));
    }
}
