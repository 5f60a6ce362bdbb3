//! Integration tests for the memstore connector.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use amp_connector::prelude::*;
use amp_memstore::{
    AssociationSchema, FieldKind, MemStoreConfig, MemoryConnector, RecordGenerator, SchemaBuilder,
    SchemaRegistry,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn crm_registry() -> SchemaRegistry {
    let account = SchemaBuilder::new("account")
        .title("Account")
        .id("id", FieldKind::String)
        .required_property("name", json!({"type": "string", "minLength": 1}))
        .property("industry", json!({"type": "string", "enum": ["tech", "retail", "finance"]}))
        .updated("updated", FieldKind::String)
        .build()
        .unwrap();

    let contact = SchemaBuilder::new("contact")
        .title("Contact")
        .id("id", FieldKind::String)
        .property("name", json!({"type": "string"}))
        .property("email", json!({"type": "string", "format": "email"}))
        .association(
            "account_id",
            json!({"type": ["string", "null"]}),
            AssociationSchema::foreign_key("account"),
        )
        .updated("updated", FieldKind::String)
        .build()
        .unwrap();

    let opportunity = SchemaBuilder::new("opportunity")
        .id("id", FieldKind::String)
        .property("name", json!({"type": "string"}))
        .association(
            "contacts",
            json!({"type": "array"}),
            AssociationSchema::reverse_lookup("opportunityContact", "opportunity_id"),
        )
        .association(
            "tags",
            json!({"type": "array"}),
            AssociationSchema::junction("opportunityTag", "opportunity_id", "tag_id", "tag"),
        )
        .build()
        .unwrap();

    let documents = [
        (
            "opportunityContact",
            json!({"type": "object", "properties": {
                "id": {"type": "string", "x-amp-id-field": true},
                "opportunity_id": {"type": "string"},
                "contact_id": {"type": "string"}
            }}),
        ),
        (
            "tag",
            json!({"type": "object", "properties": {
                "id": {"type": "string", "x-amp-id-field": true},
                "label": {"type": "string"}
            }}),
        ),
        (
            "opportunityTag",
            json!({"type": "object", "properties": {
                "id": {"type": "string", "x-amp-id-field": true},
                "opportunity_id": {"type": "string"},
                "tag_id": {"type": "string"}
            }}),
        ),
    ];

    let mut schemas = vec![account, contact, opportunity];
    for (name, document) in documents {
        schemas.push(amp_memstore::ObjectSchema::compile(name, document).unwrap());
    }
    SchemaRegistry::new(schemas).unwrap()
}

fn create_connector() -> MemoryConnector {
    MemoryConnector::new(MemStoreConfig::default(), crm_registry()).unwrap()
}

async fn create(connector: &MemoryConnector, object: &str, data: Value) -> WriteResult {
    connector
        .write(&Context::new(), WriteParams::new(object, data))
        .await
        .unwrap()
}

type Received = Arc<Mutex<Vec<ChangeEvent>>>;

fn recording_observer() -> (Received, Arc<dyn SubscriptionObserver>) {
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let observer = move |event: ChangeEvent| -> ConnectorResult<()> {
        sink.lock().unwrap().push(event);
        Ok(())
    };
    (received, Arc::new(observer))
}

async fn wait_for(received: &Received, count: usize) -> Vec<ChangeEvent> {
    for _ in 0..100 {
        if received.lock().unwrap().len() >= count {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    received.lock().unwrap().clone()
}

fn events_for(object: &str, events: ObjectEvents) -> SubscriptionEvents {
    HashMap::from([(object.to_string(), events)])
}

// =============================================================================
// Association Tests
// =============================================================================

#[tokio::test]
async fn test_foreign_key_expansion() {
    let connector = create_connector();
    create(&connector, "account", json!({"id": "acc-1", "name": "Acme"})).await;
    create(&connector, "contact", json!({"id": "cont-1", "account_id": "acc-1"})).await;

    let params = ReadParams::new("contact")
        .with_fields(["id", "name", "account_id"])
        .with_associated_objects(["account_id"]);
    let result = connector.read(&Context::new(), params).await.unwrap();

    assert_eq!(result.rows, 1);
    let row = &result.data[0];
    assert_eq!(row.id, "cont-1");
    assert_eq!(row.fields["account_id"], json!("acc-1"));
    let accounts = &row.associations["account_id"];
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].object_id, "acc-1");
    assert_eq!(accounts[0].raw["name"], json!("Acme"));
}

#[tokio::test]
async fn test_reverse_lookup_expansion() {
    let connector = create_connector();
    create(&connector, "opportunity", json!({"id": "opp-1", "name": "Renewal"})).await;
    create(&connector, "opportunity", json!({"id": "opp-2", "name": "Upsell"})).await;
    for (opportunity, contact) in [("opp-1", "c1"), ("opp-1", "c2"), ("opp-2", "c3")] {
        create(
            &connector,
            "opportunityContact",
            json!({"opportunity_id": opportunity, "contact_id": contact}),
        )
        .await;
    }

    let params = ReadParams::new("opportunity").with_associated_objects(["contacts"]);
    let result = connector.read(&Context::new(), params).await.unwrap();
    let row = result.data.iter().find(|row| row.id == "opp-1").unwrap();

    let contacts: HashSet<&str> = row.associations["contacts"]
        .iter()
        .filter_map(|association| association.raw["contact_id"].as_str())
        .collect();
    assert_eq!(contacts, HashSet::from(["c1", "c2"]));
}

#[tokio::test]
async fn test_junction_expansion() {
    let connector = create_connector();
    create(&connector, "opportunity", json!({"id": "opp-1"})).await;
    create(&connector, "tag", json!({"id": "t-hot", "label": "hot"})).await;
    create(&connector, "tag", json!({"id": "t-big", "label": "big"})).await;
    create(&connector, "opportunityTag", json!({"opportunity_id": "opp-1", "tag_id": "t-hot"})).await;
    create(&connector, "opportunityTag", json!({"opportunity_id": "opp-1", "tag_id": "t-gone"})).await;

    let params = ReadParams::new("opportunity").with_associated_objects(["tags", "contacts"]);
    let result = connector.read(&Context::new(), params).await.unwrap();
    let row = &result.data[0];

    let tags = &row.associations["tags"];
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].object_id, "t-hot");
    assert!(row.associations["contacts"].is_empty());
}

#[tokio::test]
async fn test_unknown_association_fails() {
    let connector = create_connector();
    create(&connector, "account", json!({"name": "Acme"})).await;

    let params = ReadParams::new("account").with_associated_objects(["owner"]);
    let result = connector.read(&Context::new(), params).await;
    assert!(matches!(result, Err(ConnectorError::InvalidAssociation { .. })));
}

#[tokio::test]
async fn test_get_associations() {
    let connector = create_connector();
    let associations = connector.get_associations("opportunity").unwrap();
    assert_eq!(
        associations.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["contacts", "tags"]
    );
    assert!(connector.get_associations("account").unwrap().is_empty());
    assert!(connector.get_associations("lead").is_err());
}

// =============================================================================
// Write Tests
// =============================================================================

#[tokio::test]
async fn test_foreign_key_validation_on_write() {
    let connector = create_connector();
    let result = connector
        .write(
            &Context::new(),
            WriteParams::new("contact", json!({"name": "X", "account_id": "acc-99"})),
        )
        .await;

    match result {
        Err(ConnectorError::InvalidForeignKey { field, value, target_object }) => {
            assert_eq!(field, "account_id");
            assert_eq!(value, "acc-99");
            assert_eq!(target_object, "account");
        }
        other => panic!("expected InvalidForeignKey, got {other:?}"),
    }
    assert!(connector.storage().get_all("contact").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_write_then_get_adds_only_id_and_timestamp() {
    let connector = create_connector();
    let result = create(&connector, "contact", json!({"name": "Ada", "email": "ada@example.com"})).await;
    assert!(result.success);
    assert!(!result.record_id.is_empty());

    let stored = connector.storage().get("contact", &result.record_id).await.unwrap();
    let keys: Vec<&str> = stored.keys().map(String::as_str).collect();
    assert_eq!(keys.len(), 4);
    for key in ["email", "id", "name", "updated"] {
        assert!(keys.contains(&key), "missing {key}");
    }
    assert_eq!(stored["id"], json!(result.record_id));
    assert_eq!(stored["name"], json!("Ada"));
    assert!(stored["updated"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn test_update_merges_and_bumps_timestamp() {
    let connector = create_connector();
    let created = create(&connector, "contact", json!({"name": "Ada", "email": "ada@example.com"})).await;
    let first = created.data["updated"].as_str().unwrap().to_string();

    let updated = connector
        .write(
            &Context::new(),
            WriteParams::new("contact", json!({"name": "Ada Lovelace"})).with_record_id(&created.record_id),
        )
        .await
        .unwrap();

    assert_eq!(updated.record_id, created.record_id);
    assert_eq!(updated.data["name"], json!("Ada Lovelace"));
    assert_eq!(updated.data["email"], json!("ada@example.com"));
    let second = updated.data["updated"].as_str().unwrap();
    assert!(second >= first.as_str());
}

#[tokio::test]
async fn test_empty_update_still_touches_record() {
    let connector = create_connector();
    let created = create(&connector, "account", json!({"name": "Acme"})).await;

    let result = connector
        .write(
            &Context::new(),
            WriteParams::new("account", json!({})).with_record_id(&created.record_id),
        )
        .await
        .unwrap();
    assert_eq!(result.data["name"], json!("Acme"));
    assert!(result.data.contains_key("updated"));
}

#[tokio::test]
async fn test_write_validation_errors() {
    let connector = create_connector();
    let ctx = Context::new();

    let empty = connector.write(&ctx, WriteParams::new("account", json!({}))).await;
    assert!(matches!(empty, Err(ConnectorError::MissingParameter { .. })));

    let invalid = connector
        .write(&ctx, WriteParams::new("account", json!({"name": "", "industry": "mining"})))
        .await;
    match invalid {
        Err(ConnectorError::ValidationFailed { object, errors }) => {
            assert_eq!(object, "account");
            assert_eq!(errors.len(), 2);
        }
        other => panic!("expected ValidationFailed, got {other:?}"),
    }

    let unknown = connector.write(&ctx, WriteParams::new("lead", json!({"name": "x"}))).await;
    assert!(matches!(unknown, Err(ConnectorError::ObjectNotSupported { .. })));

    let not_object = connector.write(&ctx, WriteParams::new("account", json!(["x"]))).await;
    assert!(matches!(not_object, Err(ConnectorError::BadRequest { .. })));
}

#[tokio::test]
async fn test_write_batch_collects_failures() {
    let connector = create_connector();
    let batch = vec![
        WriteParams::new("account", json!({"name": "Acme"})),
        WriteParams::new("account", json!({"industry": "tech"})),
        WriteParams::new("account", json!({"name": "Globex"})),
    ];
    let outcome = connector.write_batch(&Context::new(), batch).await.unwrap();

    assert_eq!(outcome.succeeded(), 2);
    assert!(outcome.results[1].is_none());
    assert!(matches!(outcome.errors[&1], ConnectorError::ValidationFailed { .. }));
}

#[tokio::test]
async fn test_create_with_existing_id_conflicts() {
    let connector = create_connector();
    let ctx = Context::new();
    create(&connector, "account", json!({"id": "acc-1", "name": "Acme"})).await;

    let duplicate = connector
        .write(&ctx, WriteParams::new("account", json!({"id": "acc-1", "name": "Globex"})))
        .await;
    assert!(matches!(
        duplicate,
        Err(ConnectorError::BadRequest { status: 409, .. })
    ));

    let stored = connector.storage().get("account", "acc-1").await.unwrap();
    assert_eq!(stored["name"], json!("Acme"));
}

// =============================================================================
// Delete Tests
// =============================================================================

#[tokio::test]
async fn test_delete_twice_fails() {
    let connector = create_connector();
    let ctx = Context::new();
    let created = create(&connector, "account", json!({"name": "Acme"})).await;

    let result = connector
        .delete(&ctx, DeleteParams::new("account", &created.record_id))
        .await
        .unwrap();
    assert!(result.success);

    let again = connector
        .delete(&ctx, DeleteParams::new("account", &created.record_id))
        .await;
    assert!(matches!(again, Err(ConnectorError::RecordNotFound { .. })));

    let missing_id = connector.delete(&ctx, DeleteParams::new("account", "")).await;
    assert!(matches!(missing_id, Err(ConnectorError::MissingParameter { .. })));
}

// =============================================================================
// Read Tests
// =============================================================================

#[tokio::test]
async fn test_read_empty_object() {
    let connector = create_connector();
    let result = connector.read(&Context::new(), ReadParams::new("account")).await.unwrap();
    assert_eq!(result.rows, 0);
    assert!(result.done);
    assert_eq!(result.next_page, "");
}

#[tokio::test]
async fn test_read_paginates_with_offsets() {
    let connector = create_connector();
    for name in ["a", "b", "c", "d", "e"] {
        create(&connector, "account", json!({"name": name})).await;
    }

    let ctx = Context::new();
    let mut seen = Vec::new();
    let mut token = String::new();
    let mut pages = 0;
    loop {
        let params = ReadParams::new("account")
            .with_fields(["name"])
            .with_page_size(2)
            .with_next_page(token.clone());
        let page = connector.read(&ctx, params).await.unwrap();
        pages += 1;
        seen.extend(page.data.iter().map(|row| row.id.clone()));
        if page.done {
            break;
        }
        assert!(!page.next_page.is_empty());
        token = page.next_page;
    }

    assert_eq!(pages, 3);
    assert_eq!(seen.len(), 5);
    assert_eq!(seen.iter().collect::<HashSet<_>>().len(), 5);
}

#[tokio::test]
async fn test_read_time_window() {
    let connector = create_connector();
    let storage = connector.storage();
    for (id, day) in [("a1", 1), ("a2", 2), ("a3", 3), ("a4", 4)] {
        let record = json!({"name": id, "updated": format!("2023-01-0{day}T00:00:00Z")});
        storage
            .load("account", id, record.as_object().cloned().unwrap())
            .await
            .unwrap();
    }

    let since = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
    let result = connector
        .read(&Context::new(), ReadParams::new("account").with_since(since))
        .await
        .unwrap();
    let ids: Vec<&str> = result.data.iter().map(|row| row.id.as_str()).collect();
    assert_eq!(ids, vec!["a2", "a3", "a4"]);

    let until = Utc.with_ymd_and_hms(2023, 1, 3, 0, 0, 0).unwrap();
    let result = connector
        .read(&Context::new(), ReadParams::new("account").with_since(since).with_until(until))
        .await
        .unwrap();
    let ids: Vec<&str> = result.data.iter().map(|row| row.id.as_str()).collect();
    assert_eq!(ids, vec!["a2", "a3"]);
}

#[tokio::test]
async fn test_read_field_selection() {
    let connector = create_connector();
    create(&connector, "contact", json!({"name": "Ada", "email": "ada@example.com"})).await;

    let params = ReadParams::new("contact").with_fields(["name"]);
    let result = connector.read(&Context::new(), params).await.unwrap();
    let row = &result.data[0];
    assert_eq!(Value::Object(row.fields.clone()), json!({"name": "Ada"}));
    assert_eq!(row.raw["email"], json!("ada@example.com"));

    let result = connector.read(&Context::new(), ReadParams::new("contact")).await.unwrap();
    assert!(result.data[0].fields.contains_key("email"));
    assert!(result.data[0].fields.contains_key("updated"));
}

#[tokio::test]
async fn test_read_deleted_returns_empty_page() {
    let connector = create_connector();
    create(&connector, "account", json!({"name": "Acme"})).await;
    let result = connector
        .read(&Context::new(), ReadParams::new("account").with_deleted(true))
        .await
        .unwrap();
    assert_eq!(result, ReadResult::empty());
}

#[tokio::test]
async fn test_read_errors() {
    let connector = create_connector();
    let ctx = Context::new();

    let unknown = connector.read(&ctx, ReadParams::new("lead")).await;
    assert!(matches!(unknown, Err(ConnectorError::ObjectNotSupported { .. })));

    let bad_token = connector.read(&ctx, ReadParams::new("account").with_next_page("abc")).await;
    assert!(matches!(bad_token, Err(ConnectorError::BadRequest { .. })));

    let cancelled = Context::new();
    cancelled.cancel();
    let result = connector.read(&cancelled, ReadParams::new("account")).await;
    assert!(matches!(result, Err(ConnectorError::Cancelled)));
}

// =============================================================================
// Metadata Tests
// =============================================================================

#[tokio::test]
async fn test_list_object_metadata() {
    let connector = create_connector();
    let objects = vec!["contact".to_string(), "lead".to_string()];
    let result = connector
        .list_object_metadata(&Context::new(), &objects)
        .await
        .unwrap();

    let contact = &result.result["contact"];
    assert_eq!(contact.display_name, "Contact");
    assert_eq!(contact.field_names(), vec!["account_id", "email", "id", "name", "updated"]);
    assert_eq!(contact.fields["updated"].value_type, ValueType::DateTime);
    assert!(contact.fields["id"].read_only);
    assert!(!contact.fields["account_id"].read_only);
    assert!(result.errors.contains_key("lead"));

    let empty = connector.list_object_metadata(&Context::new(), &[]).await;
    assert!(matches!(empty, Err(ConnectorError::MissingObjects)));
}

// =============================================================================
// Subscription Tests
// =============================================================================

#[tokio::test]
async fn test_subscription_lifecycle() {
    let connector = create_connector();
    let ctx = Context::new();
    let (_, observer) = recording_observer();
    assert_eq!(connector.subscription_count().await, 0);

    let params = SubscribeParams::new(events_for("account", ObjectEvents::all()), Arc::clone(&observer))
        .with_id("sub-1")
        .with_registration_ref("hook-7");
    let subscription = connector.subscribe(&ctx, params).await.unwrap();
    assert_eq!(subscription.status, SubscriptionStatus::Active);
    assert_eq!(subscription.registration_ref, "hook-7");
    assert_eq!(connector.subscription_count().await, 1);

    let duplicate = SubscribeParams::new(events_for("account", ObjectEvents::all()), Arc::clone(&observer))
        .with_id("sub-1");
    assert!(matches!(
        connector.subscribe(&ctx, duplicate).await,
        Err(ConnectorError::SubscriptionExists { .. })
    ));

    let id = SubscriptionId::new("sub-1");
    connector.delete_subscription(&ctx, &id).await.unwrap();
    assert_eq!(connector.subscription_count().await, 0);
    assert!(connector.get_subscription(&id).await.is_none());
    assert!(matches!(
        connector.delete_subscription(&ctx, &id).await,
        Err(ConnectorError::ObserverNotFound { .. })
    ));
}

#[tokio::test]
async fn test_subscribe_requires_events() {
    let connector = create_connector();
    let (_, observer) = recording_observer();

    let empty = SubscribeParams::new(SubscriptionEvents::new(), Arc::clone(&observer));
    assert!(matches!(
        connector.subscribe(&Context::new(), empty).await,
        Err(ConnectorError::SubscriptionEventsEmpty)
    ));

    let unknown = SubscribeParams::new(events_for("lead", ObjectEvents::all()), observer);
    assert!(matches!(
        connector.subscribe(&Context::new(), unknown).await,
        Err(ConnectorError::ObjectNotSupported { .. })
    ));
}

#[tokio::test]
async fn test_update_notifications_respect_watch_fields() {
    let connector = create_connector();
    let ctx = Context::new();
    let (received, observer) = recording_observer();

    let events = ObjectEvents::new([ChangeEventType::Create, ChangeEventType::Update]).watching(["email"]);
    connector
        .subscribe(&ctx, SubscribeParams::new(events_for("contact", events), observer))
        .await
        .unwrap();

    let created = create(&connector, "contact", json!({"name": "Ada", "email": "ada@example.com"})).await;
    let update = |data: Value| WriteParams::new("contact", data).with_record_id(&created.record_id);
    connector.write(&ctx, update(json!({"name": "Ada L."}))).await.unwrap();
    connector.write(&ctx, update(json!({"email": "ada@lovelace.dev"}))).await.unwrap();

    let events = wait_for(&received, 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let events_after = received.lock().unwrap().len();

    assert_eq!(events_after, 2);
    assert_eq!(events[0].event_type, ChangeEventType::Create);
    assert_eq!(events[0].record_id, created.record_id);
    assert_eq!(events[1].event_type, ChangeEventType::Update);
    assert!(events[1].changed_fields.contains(&"email".to_string()));
    assert_eq!(events[1].record["email"], json!("ada@lovelace.dev"));
}

#[tokio::test]
async fn test_update_subscription_keeps_observer() {
    let connector = create_connector();
    let ctx = Context::new();
    let (received, observer) = recording_observer();

    let subscription = connector
        .subscribe(
            &ctx,
            SubscribeParams::new(events_for("account", ObjectEvents::new([ChangeEventType::Create])), observer),
        )
        .await
        .unwrap();

    let updated = connector
        .update_subscription(
            &ctx,
            &subscription.id,
            events_for("account", ObjectEvents::new([ChangeEventType::Delete])),
        )
        .await
        .unwrap();
    assert_eq!(updated.id, subscription.id);

    let created = create(&connector, "account", json!({"name": "Acme"})).await;
    connector
        .delete(&ctx, DeleteParams::new("account", &created.record_id))
        .await
        .unwrap();

    let events = wait_for(&received, 1).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, ChangeEventType::Delete);
    assert_eq!(events[0].record["name"], json!("Acme"));
    assert_eq!(events[0].subscription_id, subscription.id);

    let missing = connector
        .update_subscription(&ctx, &SubscriptionId::new("nope"), events_for("account", ObjectEvents::all()))
        .await;
    assert!(matches!(missing, Err(ConnectorError::ObserverNotFound { .. })));
}

#[tokio::test]
async fn test_failing_observer_does_not_affect_others() {
    let connector = create_connector();
    let ctx = Context::new();
    let failing = |_: ChangeEvent| -> ConnectorResult<()> { Err(ConnectorError::internal("observer offline")) };
    let (received, observer) = recording_observer();

    connector
        .subscribe(&ctx, SubscribeParams::new(events_for("account", ObjectEvents::all()), Arc::new(failing)))
        .await
        .unwrap();
    connector
        .subscribe(&ctx, SubscribeParams::new(events_for("account", ObjectEvents::all()), observer))
        .await
        .unwrap();

    create(&connector, "account", json!({"name": "Acme"})).await;
    create(&connector, "account", json!({"name": "Globex"})).await;

    let events = wait_for(&received, 2).await;
    assert_eq!(events.len(), 2);
}

#[tokio::test]
async fn test_reset_removes_subscriptions_and_records() {
    let connector = create_connector();
    let (_, observer) = recording_observer();
    connector
        .subscribe(&Context::new(), SubscribeParams::new(events_for("account", ObjectEvents::all()), observer))
        .await
        .unwrap();
    create(&connector, "account", json!({"name": "Acme"})).await;

    let removed = connector.reset().await;
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].status, SubscriptionStatus::Removed);
    assert_eq!(connector.subscription_count().await, 0);

    let result = connector.read(&Context::new(), ReadParams::new("account")).await.unwrap();
    assert_eq!(result.rows, 0);
}

// =============================================================================
// Seeding Tests
// =============================================================================

#[tokio::test]
async fn test_seed_links_foreign_keys() {
    let connector = create_connector();
    let ctx = Context::new();
    let mut generator = RecordGenerator::new().with_seed(99);

    let accounts = connector.seed_with(&ctx, "account", 3, &mut generator).await.unwrap();
    let contacts = connector.seed_with(&ctx, "contact", 10, &mut generator).await.unwrap();
    assert_eq!(accounts.len(), 3);
    assert_eq!(contacts.len(), 10);

    let result = connector
        .read(&ctx, ReadParams::new("contact").with_associated_objects(["account_id"]))
        .await
        .unwrap();
    assert_eq!(result.rows, 10);
    for row in &result.data {
        let account_id = row.raw["account_id"].as_str().unwrap();
        assert!(accounts.iter().any(|id| id == account_id));
        assert_eq!(row.associations["account_id"].len(), 1);
    }
}

#[tokio::test]
async fn test_seed_without_targets_leaves_foreign_keys_empty() {
    let connector = create_connector();
    let ids = connector.seed(&Context::new(), "contact", 5).await.unwrap();
    assert_eq!(ids.len(), 5);

    for record in connector.storage().get_all("contact").await.unwrap() {
        assert!(!record.contains_key("account_id"));
    }
}

#[tokio::test]
async fn test_seed_skips_virtual_associations() {
    let connector = create_connector();
    connector.seed(&Context::new(), "opportunity", 4).await.unwrap();

    for record in connector.storage().get_all("opportunity").await.unwrap() {
        assert!(!record.contains_key("contacts"));
        assert!(!record.contains_key("tags"));
    }
}
