//! Change-notification subscriptions
//!
//! Types shared by connectors that push record changes to observers, and the
//! matching rule that decides whether a change reaches a subscription.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConnectorResult;
use crate::ids::SubscriptionId;
use crate::operation::Record;
use crate::types::ChangeEventType;

/// What a subscription wants to hear about for one object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectEvents {
    pub events: HashSet<ChangeEventType>,

    /// Update events only fire when one of these fields changed.
    #[serde(default)]
    pub watch_fields: HashSet<String>,

    /// Update events fire for any change.
    #[serde(default)]
    pub watch_fields_all: bool,
}

impl ObjectEvents {
    pub fn new<I: IntoIterator<Item = ChangeEventType>>(events: I) -> Self {
        Self {
            events: events.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Every event type, every field.
    pub fn all() -> Self {
        Self {
            events: [
                ChangeEventType::Create,
                ChangeEventType::Update,
                ChangeEventType::Delete,
            ]
            .into_iter()
            .collect(),
            watch_fields: HashSet::new(),
            watch_fields_all: true,
        }
    }

    pub fn watching<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.watch_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn watching_all(mut self) -> Self {
        self.watch_fields_all = true;
        self
    }
}

/// Object name to the events wanted for it.
pub type SubscriptionEvents = HashMap<String, ObjectEvents>;

/// A record change delivered to an observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub subscription_id: SubscriptionId,
    pub event_type: ChangeEventType,
    pub object_name: String,
    pub record_id: String,

    /// Post-change record; the deleted record for `delete`.
    pub record: Record,

    /// Fields that differ from the previous version (updates only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed_fields: Vec<String>,

    pub timestamp: DateTime<Utc>,
}

/// Receives change events.
///
/// Callbacks run on a dispatcher task, never while storage is locked; an
/// error is logged and does not affect other subscriptions.
pub trait SubscriptionObserver: Send + Sync {
    fn notify(&self, event: ChangeEvent) -> ConnectorResult<()>;
}

impl<F> SubscriptionObserver for F
where
    F: Fn(ChangeEvent) -> ConnectorResult<()> + Send + Sync,
{
    fn notify(&self, event: ChangeEvent) -> ConnectorResult<()> {
        self(event)
    }
}

/// Input of a subscribe call.
#[derive(Clone)]
pub struct SubscribeParams {
    /// Caller-chosen ID; a random one is generated when absent.
    pub id: Option<SubscriptionId>,
    pub events: SubscriptionEvents,

    /// Opaque reference to the caller's webhook registration.
    pub registration_ref: String,

    pub metadata: HashMap<String, Value>,
    pub observer: Arc<dyn SubscriptionObserver>,
}

impl SubscribeParams {
    pub fn new(events: SubscriptionEvents, observer: Arc<dyn SubscriptionObserver>) -> Self {
        Self {
            id: None,
            events,
            registration_ref: String::new(),
            metadata: HashMap::new(),
            observer,
        }
    }

    pub fn with_id(mut self, id: impl Into<SubscriptionId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_registration_ref(mut self, reference: impl Into<String>) -> Self {
        self.registration_ref = reference.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl fmt::Debug for SubscribeParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeParams")
            .field("id", &self.id)
            .field("events", &self.events)
            .field("registration_ref", &self.registration_ref)
            .finish_non_exhaustive()
    }
}

/// Lifecycle of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Removed,
}

/// Snapshot of a registered subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResult {
    pub id: SubscriptionId,
    pub events: SubscriptionEvents,
    pub registration_ref: String,
    pub metadata: HashMap<String, Value>,
    pub status: SubscriptionStatus,
}

/// Whether an `event_type` change on `object` reaches a subscription.
pub fn want_notification(
    event_type: ChangeEventType,
    object: &str,
    changed_fields: &[String],
    events: &SubscriptionEvents,
) -> bool {
    let Some(wanted) = events.get(object) else {
        return false;
    };
    if !wanted.events.contains(&event_type) {
        return false;
    }
    match event_type {
        ChangeEventType::Create | ChangeEventType::Delete => true,
        ChangeEventType::Update => {
            wanted.watch_fields_all
                || changed_fields
                    .iter()
                    .any(|field| wanted.watch_fields.contains(field))
        }
    }
}

/// Names of fields that differ between two versions of a record, including
/// fields added or removed. Sorted for stable output.
pub fn changed_fields(before: &Record, after: &Record) -> Vec<String> {
    let mut changed: Vec<String> = after
        .iter()
        .filter(|(key, value)| before.get(key.as_str()) != Some(value))
        .map(|(key, _)| key.clone())
        .chain(
            before
                .keys()
                .filter(|key| !after.contains_key(key.as_str()))
                .cloned(),
        )
        .collect();
    changed.sort_unstable();
    changed
}
