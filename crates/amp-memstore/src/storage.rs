//! Record storage and change dispatch
//!
//! A single read-write lock guards records and subscriptions. Reads take the
//! shared lock; every mutation takes the exclusive lock, commits, and queues
//! change events for matching subscriptions before releasing it. Each
//! subscription drains its queue on its own task, so observers never run
//! while the store is locked and commit order is preserved per subscription.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use amp_connector::datautils::format_rfc3339;
use amp_connector::error::{ConnectorError, ConnectorResult};
use amp_connector::filter::TimestampFormat;
use amp_connector::ids::SubscriptionId;
use amp_connector::operation::{Association, Record};
use amp_connector::subscription::{
    changed_fields, want_notification, ChangeEvent, SubscribeParams, SubscriptionEvents,
    SubscriptionObserver, SubscriptionResult, SubscriptionStatus,
};
use amp_connector::types::ChangeEventType;

use crate::associations::{self, RecordTable};
use crate::schema::{FieldKind, ObjectSchema, SchemaRegistry};

/// A committed mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreOutcome {
    pub event_type: ChangeEventType,

    /// The record as stored.
    pub record: Record,

    /// Fields that differ from the previous version; empty for creates.
    pub changed_fields: Vec<String>,
}

/// How a commit combines the payload with the stored record.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CommitMode {
    /// Overlay the payload on the existing record instead of replacing it.
    pub merge: bool,

    /// Stamp the updated field with the current time.
    pub touch: bool,

    /// Fail instead of overwriting an existing record.
    pub create_only: bool,
}

struct SubscriptionEntry {
    snapshot: SubscriptionResult,
    sender: mpsc::UnboundedSender<ChangeEvent>,
    token: CancellationToken,
}

#[derive(Default)]
struct StorageState {
    records: RecordTable,
    subscriptions: BTreeMap<SubscriptionId, SubscriptionEntry>,
}

impl StorageState {
    /// Queue an event for every subscription that wants it.
    fn notify(
        &self,
        event_type: ChangeEventType,
        object: &str,
        record_id: &str,
        record: &Record,
        changed: &[String],
    ) {
        let timestamp = Utc::now();
        for (id, entry) in &self.subscriptions {
            if !want_notification(event_type, object, changed, &entry.snapshot.events) {
                continue;
            }
            let event = ChangeEvent {
                subscription_id: id.clone(),
                event_type,
                object_name: object.to_string(),
                record_id: record_id.to_string(),
                record: record.clone(),
                changed_fields: changed.to_vec(),
                timestamp,
            };
            if entry.sender.send(event).is_err() {
                warn!(subscription_id = %id, object = %object, "Subscription dispatcher stopped, event dropped");
            }
        }
    }
}

/// Schema-validated in-memory record store.
pub struct Storage {
    schemas: Arc<SchemaRegistry>,
    state: RwLock<StorageState>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("objects", &self.schemas.object_names().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Storage {
    pub fn new(schemas: Arc<SchemaRegistry>) -> Self {
        Self {
            schemas,
            state: RwLock::new(StorageState::default()),
        }
    }

    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }

    /// Insert or replace `object/id`, setting the ID field and stamping the
    /// updated field with the current time.
    ///
    /// The record is validated against the schema and its foreign keys must
    /// resolve.
    pub async fn store(&self, object: &str, id: &str, record: Record) -> ConnectorResult<StoreOutcome> {
        let mode = CommitMode {
            touch: true,
            ..CommitMode::default()
        };
        self.commit(object, id, record, mode).await
    }

    /// Like [`store`](Self::store) but keeps the updated field as given, for
    /// loading fixtures with historical timestamps.
    pub async fn load(&self, object: &str, id: &str, record: Record) -> ConnectorResult<StoreOutcome> {
        self.commit(object, id, record, CommitMode::default()).await
    }

    pub(crate) async fn commit(
        &self,
        object: &str,
        id: &str,
        payload: Record,
        mode: CommitMode,
    ) -> ConnectorResult<StoreOutcome> {
        let schema = self.schemas.require(object, "write")?;
        if id.is_empty() {
            return Err(ConnectorError::missing_parameter("recordId"));
        }

        let mut state = self.state.write().await;
        let previous = state.records.get(object).and_then(|records| records.get(id));
        if mode.create_only && previous.is_some() {
            return Err(ConnectorError::bad_request(
                409,
                format!("{object} record {id} already exists"),
            ));
        }

        let mut record = match previous {
            Some(previous) if mode.merge => {
                let mut merged = previous.clone();
                merged.extend(payload);
                merged
            }
            _ => payload,
        };
        record.insert(schema.id_field().to_string(), schema.id_value(id));
        if mode.touch {
            stamp_updated(&schema, &mut record, Utc::now());
        }

        schema.validate(&record)?;
        associations::check_foreign_keys(&self.schemas, &state.records, &schema, &record)?;

        let (event_type, changed) = match previous {
            Some(previous) => (ChangeEventType::Update, changed_fields(previous, &record)),
            None => (ChangeEventType::Create, Vec::new()),
        };

        state
            .records
            .entry(object.to_string())
            .or_default()
            .insert(id.to_string(), record.clone());
        state.notify(event_type, object, id, &record, &changed);

        debug!(object = %object, id = %id, event = %event_type, "Record committed");
        Ok(StoreOutcome {
            event_type,
            record,
            changed_fields: changed,
        })
    }

    pub async fn get(&self, object: &str, id: &str) -> ConnectorResult<Record> {
        self.schemas.require(object, "read")?;
        let state = self.state.read().await;
        state
            .records
            .get(object)
            .and_then(|records| records.get(id))
            .cloned()
            .ok_or_else(|| ConnectorError::record_not_found(object, id))
    }

    /// Every record of `object`, ordered by ID.
    pub async fn get_all(&self, object: &str) -> ConnectorResult<Vec<Record>> {
        self.schemas.require(object, "read")?;
        let state = self.state.read().await;
        Ok(state
            .records
            .get(object)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    /// IDs of every record of `object`.
    pub async fn ids(&self, object: &str) -> ConnectorResult<Vec<String>> {
        self.schemas.require(object, "read")?;
        let state = self.state.read().await;
        Ok(state
            .records
            .get(object)
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default())
    }

    /// Remove `object/id` and return the removed record.
    pub async fn delete(&self, object: &str, id: &str) -> ConnectorResult<Record> {
        self.schemas.require(object, "delete")?;
        let mut state = self.state.write().await;
        let removed = state
            .records
            .get_mut(object)
            .and_then(|records| records.remove(id))
            .ok_or_else(|| ConnectorError::record_not_found(object, id))?;
        state.notify(ChangeEventType::Delete, object, id, &removed, &[]);

        debug!(object = %object, id = %id, "Record deleted");
        Ok(removed)
    }

    /// Records of `object` whose updated timestamp lies in `[since, until]`.
    ///
    /// With either bound set, records without a readable timestamp are
    /// excluded. Results are ordered by timestamp, then ID.
    pub async fn list(
        &self,
        object: &str,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> ConnectorResult<Vec<Record>> {
        let schema = self.schemas.require(object, "read")?;
        let state = self.state.read().await;
        let Some(records) = state.records.get(object) else {
            return Ok(Vec::new());
        };

        let bounded = since.is_some() || until.is_some();
        let mut selected: Vec<(Option<DateTime<Utc>>, &String, &Record)> = records
            .iter()
            .map(|(id, record)| (record_timestamp(&schema, record), id, record))
            .filter(|(timestamp, _, _)| match timestamp {
                Some(t) => since.map_or(true, |s| *t >= s) && until.map_or(true, |u| *t <= u),
                None => !bounded,
            })
            .collect();
        selected.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| compare_ids(a.1, b.1)));

        Ok(selected.into_iter().map(|(_, _, record)| record.clone()).collect())
    }

    /// Expand `names` for each of `records`, all against one snapshot.
    pub async fn expand_associations(
        &self,
        object: &str,
        records: &[Record],
        names: &[String],
    ) -> ConnectorResult<Vec<HashMap<String, Vec<Association>>>> {
        let schema = self.schemas.require(object, "read")?;
        let state = self.state.read().await;
        records
            .iter()
            .map(|record| associations::expand(&self.schemas, &state.records, &schema, record, names))
            .collect()
    }

    /// Register a subscription and start its dispatcher.
    pub async fn subscribe(&self, params: SubscribeParams) -> ConnectorResult<SubscriptionResult> {
        self.check_events(&params.events)?;
        let id = params.id.unwrap_or_else(SubscriptionId::generate);
        if id.is_empty() {
            return Err(ConnectorError::missing_parameter("subscriptionId"));
        }

        let mut state = self.state.write().await;
        if state.subscriptions.contains_key(&id) {
            return Err(ConnectorError::SubscriptionExists { id: id.to_string() });
        }

        let snapshot = SubscriptionResult {
            id: id.clone(),
            events: params.events,
            registration_ref: params.registration_ref,
            metadata: params.metadata,
            status: SubscriptionStatus::Active,
        };
        let (sender, receiver) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        tokio::spawn(dispatch_loop(id.clone(), params.observer, receiver, token.clone()));

        state.subscriptions.insert(
            id.clone(),
            SubscriptionEntry {
                snapshot: snapshot.clone(),
                sender,
                token,
            },
        );

        info!(subscription_id = %id, objects = snapshot.events.len(), "Subscription registered");
        Ok(snapshot)
    }

    /// Replace the events of a subscription, keeping its observer.
    pub async fn update_subscription(
        &self,
        id: &SubscriptionId,
        events: SubscriptionEvents,
    ) -> ConnectorResult<SubscriptionResult> {
        self.check_events(&events)?;
        let mut state = self.state.write().await;
        let entry = state
            .subscriptions
            .get_mut(id)
            .ok_or_else(|| ConnectorError::ObserverNotFound { id: id.to_string() })?;
        entry.snapshot.events = events;

        info!(subscription_id = %id, "Subscription updated");
        Ok(entry.snapshot.clone())
    }

    /// Remove a subscription; events already queued are not delivered.
    pub async fn unsubscribe(&self, id: &SubscriptionId) -> ConnectorResult<SubscriptionResult> {
        let mut state = self.state.write().await;
        let entry = state
            .subscriptions
            .remove(id)
            .ok_or_else(|| ConnectorError::ObserverNotFound { id: id.to_string() })?;
        entry.token.cancel();

        info!(subscription_id = %id, "Subscription removed");
        Ok(into_removed(entry))
    }

    pub async fn subscription_count(&self) -> usize {
        self.state.read().await.subscriptions.len()
    }

    pub async fn get_subscription(&self, id: &SubscriptionId) -> Option<SubscriptionResult> {
        let state = self.state.read().await;
        state.subscriptions.get(id).map(|entry| entry.snapshot.clone())
    }

    /// Drop every record and subscription. Returns the removed subscriptions.
    pub async fn reset(&self) -> Vec<SubscriptionResult> {
        let mut state = self.state.write().await;
        let previous = std::mem::take(&mut *state);
        drop(state);

        let removed: Vec<SubscriptionResult> = previous
            .subscriptions
            .into_values()
            .map(|entry| {
                entry.token.cancel();
                into_removed(entry)
            })
            .collect();
        info!(subscriptions = removed.len(), "Storage reset");
        removed
    }

    fn check_events(&self, events: &SubscriptionEvents) -> ConnectorResult<()> {
        if events.values().all(|wanted| wanted.events.is_empty()) {
            return Err(ConnectorError::SubscriptionEventsEmpty);
        }
        for object in events.keys() {
            self.schemas.require(object, "subscribe")?;
        }
        Ok(())
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        for entry in self.state.get_mut().subscriptions.values() {
            entry.token.cancel();
        }
    }
}

fn into_removed(entry: SubscriptionEntry) -> SubscriptionResult {
    SubscriptionResult {
        status: SubscriptionStatus::Removed,
        ..entry.snapshot
    }
}

/// Deliver queued events to `observer` until the subscription is cancelled.
async fn dispatch_loop(
    id: SubscriptionId,
    observer: Arc<dyn SubscriptionObserver>,
    mut events: mpsc::UnboundedReceiver<ChangeEvent>,
    token: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = token.cancelled() => break,
            next = events.recv() => match next {
                Some(event) => event,
                None => break,
            },
        };
        if token.is_cancelled() {
            break;
        }

        let object = event.object_name.clone();
        let event_type = event.event_type;
        if let Err(e) = observer.notify(event) {
            warn!(
                subscription_id = %id,
                object = %object,
                event = %event_type,
                error = %e,
                "Subscription observer failed"
            );
        }
    }
    debug!(subscription_id = %id, "Subscription dispatcher stopped");
}

/// Write the modification time into the object's updated field.
pub(crate) fn stamp_updated(schema: &ObjectSchema, record: &mut Record, now: DateTime<Utc>) {
    let (Some(field), Some(kind)) = (schema.updated_field(), schema.updated_kind()) else {
        return;
    };
    let value = match kind {
        FieldKind::String => json!(format_rfc3339(&now)),
        FieldKind::Integer | FieldKind::Number => json!(now.timestamp()),
    };
    record.insert(field.to_string(), value);
}

/// Read the updated timestamp of a record: RFC 3339 strings, or Unix seconds
/// as numbers or numeric strings.
fn record_timestamp(schema: &ObjectSchema, record: &Record) -> Option<DateTime<Utc>> {
    let value = record.get(schema.updated_field()?)?;
    match value {
        Value::String(_) => TimestampFormat::Rfc3339
            .parse(value)
            .or_else(|| TimestampFormat::UnixSeconds.parse(value)),
        Value::Number(_) => TimestampFormat::UnixSeconds.parse(value),
        _ => None,
    }
}

/// Numeric IDs compare numerically, everything else lexically.
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amp_connector::subscription::ObjectEvents;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use std::time::Duration;

    fn registry() -> Arc<SchemaRegistry> {
        Arc::new(
            SchemaRegistry::from_documents([(
                "contact",
                json!({"type": "object", "properties": {
                    "id": {"type": "string", "x-amp-id-field": true},
                    "name": {"type": "string"},
                    "updated": {"type": ["string", "integer"], "x-amp-updated-field": true}
                }}),
            )])
            .unwrap(),
        )
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_load_sets_id_and_get_returns_copy() {
        let storage = Storage::new(registry());
        let outcome = storage.load("contact", "c1", record(json!({"name": "Ada"}))).await.unwrap();
        assert_eq!(outcome.event_type, ChangeEventType::Create);

        let stored = storage.get("contact", "c1").await.unwrap();
        assert_eq!(Value::Object(stored), json!({"id": "c1", "name": "Ada"}));

        let outcome = storage.load("contact", "c1", record(json!({"name": "Grace"}))).await.unwrap();
        assert_eq!(outcome.event_type, ChangeEventType::Update);
        assert_eq!(outcome.changed_fields, vec!["name"]);
    }

    #[tokio::test]
    async fn test_store_stamps_updated_field() {
        let storage = Storage::new(registry());
        let before = Utc::now().timestamp();
        storage.store("contact", "c1", Record::new()).await.unwrap();

        let stored = storage.get("contact", "c1").await.unwrap();
        assert_eq!(stored["id"], json!("c1"));
        let updated = TimestampFormat::Rfc3339.parse(&stored["updated"]).unwrap();
        assert!(updated.timestamp() >= before);

        storage
            .store("contact", "c1", record(json!({"updated": "2001-01-01T00:00:00Z"})))
            .await
            .unwrap();
        let restamped = storage.get("contact", "c1").await.unwrap();
        assert_ne!(restamped["updated"], json!("2001-01-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn test_missing_records() {
        let storage = Storage::new(registry());
        assert!(matches!(
            storage.get("contact", "nope").await,
            Err(ConnectorError::RecordNotFound { .. })
        ));
        assert!(matches!(
            storage.delete("contact", "nope").await,
            Err(ConnectorError::RecordNotFound { .. })
        ));
        assert!(matches!(
            storage.get("deal", "1").await,
            Err(ConnectorError::ObjectNotSupported { .. })
        ));
        assert!(storage.get_all("contact").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_timestamp_encodings() {
        let storage = Storage::new(registry());
        storage.load("contact", "a", record(json!({"updated": "2024-01-01T00:00:00Z"}))).await.unwrap();
        storage.load("contact", "b", record(json!({"updated": 1704153600}))).await.unwrap();
        storage.load("contact", "c", record(json!({"updated": "1704240000"}))).await.unwrap();
        storage.load("contact", "d", record(json!({"name": "no timestamp"}))).await.unwrap();

        let all = storage.list("contact", None, None).await.unwrap();
        let ids: Vec<&Value> = all.iter().map(|r| &r["id"]).collect();
        assert_eq!(ids, vec![&json!("d"), &json!("a"), &json!("b"), &json!("c")]);

        let since = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let recent = storage.list("contact", Some(since), None).await.unwrap();
        let ids: Vec<&Value> = recent.iter().map(|r| &r["id"]).collect();
        assert_eq!(ids, vec![&json!("b"), &json!("c")]);
    }

    #[test]
    fn test_compare_ids() {
        assert_eq!(compare_ids("9", "10"), Ordering::Less);
        assert_eq!(compare_ids("b", "a"), Ordering::Greater);
    }

    #[tokio::test]
    async fn test_events_are_delivered_in_commit_order() {
        let storage = Storage::new(registry());
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let observer = move |event: ChangeEvent| -> ConnectorResult<()> {
            sink.lock().unwrap().push((event.event_type, event.record_id));
            Ok(())
        };

        let events = HashMap::from([("contact".to_string(), ObjectEvents::all())]);
        storage.subscribe(SubscribeParams::new(events, Arc::new(observer)).with_id("s1")).await.unwrap();

        storage.store("contact", "c1", record(json!({"name": "a"}))).await.unwrap();
        storage.store("contact", "c1", record(json!({"name": "b"}))).await.unwrap();
        storage.delete("contact", "c1").await.unwrap();

        for _ in 0..50 {
            if received.lock().unwrap().len() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let received = received.lock().unwrap().clone();
        assert_eq!(
            received,
            vec![
                (ChangeEventType::Create, "c1".to_string()),
                (ChangeEventType::Update, "c1".to_string()),
                (ChangeEventType::Delete, "c1".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_reset_removes_everything() {
        let storage = Storage::new(registry());
        let observer = |_: ChangeEvent| -> ConnectorResult<()> { Ok(()) };
        let events = HashMap::from([("contact".to_string(), ObjectEvents::all())]);
        storage.subscribe(SubscribeParams::new(events, Arc::new(observer))).await.unwrap();
        storage.store("contact", "c1", record(json!({}))).await.unwrap();

        let removed = storage.reset().await;
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].status, SubscriptionStatus::Removed);
        assert_eq!(storage.subscription_count().await, 0);
        assert!(storage.get_all("contact").await.unwrap().is_empty());
    }
}
