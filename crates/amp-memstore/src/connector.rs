//! Memstore connector
//!
//! Exposes [`Storage`] through the connector capability traits, so tests and
//! local development can run the same code paths they run against a REST
//! provider.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use amp_connector::config::ConnectorConfig;
use amp_connector::context::Context;
use amp_connector::error::{ConnectorError, ConnectorResult};
use amp_connector::ids::SubscriptionId;
use amp_connector::locator::{value_to_id, IdFieldQuery};
use amp_connector::marshal::{self, lowercase_keys};
use amp_connector::metadata::{fetch_object_metadata, DEFAULT_METADATA_CONCURRENCY};
use amp_connector::operation::{
    DeleteParams, DeleteResult, ReadParams, ReadResult, ReadResultRow, Record, WriteParams,
    WriteResult,
};
use amp_connector::schema::ListObjectMetadataResult;
use amp_connector::subscription::{SubscribeParams, SubscriptionEvents, SubscriptionResult};
use amp_connector::traits::{
    Connector, DeleteConnector, MetadataLister, ReadConnector, Subscriber, WriteConnector,
};
use amp_connector::types::ModuleId;

use crate::config::MemStoreConfig;
use crate::generator::RecordGenerator;
use crate::schema::{AssociationSchema, AssociationType, FieldKind, ObjectSchema, SchemaRegistry};
use crate::storage::{CommitMode, Storage};

/// In-memory connector backed by JSON Schema validated storage.
#[derive(Debug)]
pub struct MemoryConnector {
    config: MemStoreConfig,
    storage: Storage,

    /// Last generated numeric ID, so IDs stay unique within a nanosecond.
    last_numeric_id: AtomicI64,
}

impl MemoryConnector {
    pub fn new(config: MemStoreConfig, schemas: SchemaRegistry) -> ConnectorResult<Self> {
        config.validate()?;
        info!(
            provider = %config.provider,
            objects = schemas.len(),
            "Memory connector created"
        );
        Ok(Self {
            config,
            storage: Storage::new(Arc::new(schemas)),
            last_numeric_id: AtomicI64::new(0),
        })
    }

    /// Create a connector from raw JSON schema bytes keyed by object name.
    pub fn from_raw_schemas<I, K, B>(raw: I) -> ConnectorResult<Self>
    where
        I: IntoIterator<Item = (K, B)>,
        K: Into<String>,
        B: AsRef<[u8]>,
    {
        Self::new(MemStoreConfig::default(), SchemaRegistry::from_raw(raw)?)
    }

    /// Create a connector from schema documents keyed by object name.
    pub fn from_documents<I, K>(documents: I) -> ConnectorResult<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self::new(MemStoreConfig::default(), SchemaRegistry::from_documents(documents)?)
    }

    pub fn config(&self) -> &MemStoreConfig {
        &self.config
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        self.storage.schemas()
    }

    /// Associations declared by `object`, keyed by field name.
    pub fn get_associations(&self, object: &str) -> ConnectorResult<BTreeMap<String, AssociationSchema>> {
        Ok(self.schemas().require(object, "associations")?.associations().clone())
    }

    pub async fn subscription_count(&self) -> usize {
        self.storage.subscription_count().await
    }

    pub async fn get_subscription(&self, id: &SubscriptionId) -> Option<SubscriptionResult> {
        self.storage.get_subscription(id).await
    }

    /// Remove all records and subscriptions.
    pub async fn reset(&self) -> Vec<SubscriptionResult> {
        self.storage.reset().await
    }

    /// Insert `count` generated records into `object`.
    ///
    /// Foreign keys point at randomly chosen existing records of the target
    /// object, so seed targets first. Returns the new record IDs.
    pub async fn seed(&self, ctx: &Context, object: &str, count: usize) -> ConnectorResult<Vec<String>> {
        let mut generator = RecordGenerator::from_config(&self.config);
        self.seed_with(ctx, object, count, &mut generator).await
    }

    /// Like [`seed`](Self::seed) with a caller-provided generator.
    #[instrument(skip(self, ctx, generator))]
    pub async fn seed_with(
        &self,
        ctx: &Context,
        object: &str,
        count: usize,
        generator: &mut RecordGenerator,
    ) -> ConnectorResult<Vec<String>> {
        let schema = self.schemas().require(object, "seed")?;

        let mut targets: HashMap<&str, Vec<Value>> = HashMap::new();
        for (field, association) in schema.foreign_keys() {
            targets.insert(field.as_str(), self.target_keys(association).await?);
        }

        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            ctx.check()?;
            let mut record = generator.record(&schema)?;
            record.remove(schema.id_field());
            if let Some(updated) = schema.updated_field() {
                record.remove(updated);
            }
            for (name, association) in schema.associations() {
                let key = match association.association_type {
                    AssociationType::ForeignKey => targets
                        .get(name.as_str())
                        .and_then(|keys| generator.pick(keys))
                        .cloned(),
                    AssociationType::ReverseLookup | AssociationType::Junction => None,
                };
                match key {
                    Some(key) => record.insert(name.clone(), key),
                    None => record.remove(name),
                };
            }

            let id = self.new_record_id(&schema, &record);
            let mode = CommitMode {
                touch: true,
                create_only: true,
                ..CommitMode::default()
            };
            self.storage.commit(object, &id, record, mode).await?;
            ids.push(id);
        }

        info!(object = %object, count = ids.len(), "Memstore seeded");
        Ok(ids)
    }

    /// Values a foreign key into `association.target_object` may take.
    async fn target_keys(&self, association: &AssociationSchema) -> ConnectorResult<Vec<Value>> {
        let target = self.schemas().require(&association.target_object, "seed")?;
        let field = association
            .target_field
            .clone()
            .unwrap_or_else(|| target.id_field().to_string());
        Ok(self
            .storage
            .get_all(&association.target_object)
            .await?
            .into_iter()
            .filter_map(|mut record| record.remove(&field))
            .filter(|value| !value.is_null())
            .collect())
    }

    /// ID for a new record: the payload's own ID when present, otherwise a
    /// UUID for string IDs and a nanosecond timestamp for numeric ones.
    fn new_record_id(&self, schema: &ObjectSchema, payload: &Record) -> String {
        if let Some(id) = payload.get(schema.id_field()).and_then(value_to_id) {
            return id;
        }
        match schema.id_kind() {
            FieldKind::String => Uuid::new_v4().to_string(),
            FieldKind::Integer | FieldKind::Number => {
                let now = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
                let mut last = self.last_numeric_id.load(Ordering::Relaxed);
                loop {
                    let next = now.max(last.saturating_add(1));
                    match self.last_numeric_id.compare_exchange_weak(
                        last,
                        next,
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => return next.to_string(),
                        Err(current) => last = current,
                    }
                }
            }
        }
    }
}

/// Offset encoded in a page token; empty means the first page.
fn parse_offset(token: &str) -> ConnectorResult<usize> {
    if token.is_empty() {
        return Ok(0);
    }
    token
        .parse()
        .map_err(|_| ConnectorError::bad_request(400, format!("invalid page token {token:?}")))
}

impl Connector for MemoryConnector {
    fn provider(&self) -> &str {
        &self.config.provider
    }

    fn module(&self) -> &ModuleId {
        &self.config.module
    }

    fn as_reader(&self) -> Option<&dyn ReadConnector> {
        Some(self)
    }

    fn as_writer(&self) -> Option<&dyn WriteConnector> {
        Some(self)
    }

    fn as_deleter(&self) -> Option<&dyn DeleteConnector> {
        Some(self)
    }

    fn as_metadata_lister(&self) -> Option<&dyn MetadataLister> {
        Some(self)
    }

    fn as_subscriber(&self) -> Option<&dyn Subscriber> {
        Some(self)
    }
}

#[async_trait]
impl ReadConnector for MemoryConnector {
    #[instrument(skip(self, ctx, params), fields(object = %params.object_name))]
    async fn read(&self, ctx: &Context, params: ReadParams) -> ConnectorResult<ReadResult> {
        ctx.check()?;
        params.validate(false)?;
        let object = params.object_name.as_str();
        let schema = self.schemas().require(object, "read")?;

        // No tombstones are kept.
        if params.deleted {
            return Ok(ReadResult::empty());
        }

        let offset = parse_offset(&params.next_page)?;
        let page_size = self.config.page_size(params.page_size);
        let records = self.storage.list(object, params.since, params.until).await?;
        let page: Vec<Record> = records.iter().skip(offset).take(page_size).cloned().collect();
        let next = offset + page.len();
        let next_page = if next < records.len() {
            next.to_string()
        } else {
            String::new()
        };

        let id_query = IdFieldQuery::new(schema.id_field());
        let mut rows: Vec<ReadResultRow> = if params.fields.is_empty() {
            page.iter()
                .map(|record| ReadResultRow {
                    fields: lowercase_keys(record),
                    raw: record.clone(),
                    id: id_query.extract(record).unwrap_or_default(),
                    ..Default::default()
                })
                .collect()
        } else {
            marshal::with_id(id_query)(&page, &params.fields)?
        };

        if !params.associated_objects.is_empty() {
            let expanded = self
                .storage
                .expand_associations(object, &page, &params.associated_objects)
                .await?;
            for (row, associations) in rows.iter_mut().zip(expanded) {
                row.associations = associations;
            }
        }

        debug!(rows = rows.len(), offset, next_page = %next_page, "Memstore page read");
        Ok(ReadResult::new(rows, next_page))
    }
}

#[async_trait]
impl WriteConnector for MemoryConnector {
    #[instrument(skip(self, ctx, params), fields(object = %params.object_name))]
    async fn write(&self, ctx: &Context, params: WriteParams) -> ConnectorResult<WriteResult> {
        ctx.check()?;
        params.validate()?;
        let WriteParams {
            object_name,
            record_id,
            record_data,
            ..
        } = params;
        let schema = self.schemas().require(&object_name, "write")?;
        let Value::Object(payload) = record_data else {
            return Err(ConnectorError::bad_request(400, "recordData must be a JSON object"));
        };

        // Creates never overwrite: a payload ID that is already taken is a
        // conflict. Updates merge into the stored record, or insert it.
        let (id, mode) = if record_id.is_empty() {
            let id = self.new_record_id(&schema, &payload);
            (id, CommitMode { merge: false, touch: true, create_only: true })
        } else {
            (record_id, CommitMode { merge: true, touch: true, create_only: false })
        };
        let outcome = self.storage.commit(&object_name, &id, payload, mode).await?;

        info!(object = %object_name, id = %id, event = %outcome.event_type, "Memstore record written");
        Ok(WriteResult::succeeded(id, outcome.record))
    }
}

#[async_trait]
impl DeleteConnector for MemoryConnector {
    async fn delete(&self, ctx: &Context, params: DeleteParams) -> ConnectorResult<DeleteResult> {
        ctx.check()?;
        params.validate()?;
        self.storage.delete(&params.object_name, &params.record_id).await?;
        info!(object = %params.object_name, id = %params.record_id, "Memstore record deleted");
        Ok(DeleteResult { success: true })
    }
}

#[async_trait]
impl MetadataLister for MemoryConnector {
    #[instrument(skip(self, ctx, objects), fields(count = objects.len()))]
    async fn list_object_metadata(
        &self,
        ctx: &Context,
        objects: &[String],
    ) -> ConnectorResult<ListObjectMetadataResult> {
        let schemas = Arc::clone(self.storage.schemas());
        fetch_object_metadata(
            ctx,
            objects,
            DEFAULT_METADATA_CONCURRENCY,
            move |_ctx: Context, object: String| {
                let schemas = Arc::clone(&schemas);
                async move {
                    schemas
                        .require(&object, "metadata")
                        .map(|schema| schema.to_object_metadata())
                }
            },
        )
        .await
    }
}

#[async_trait]
impl Subscriber for MemoryConnector {
    async fn subscribe(
        &self,
        ctx: &Context,
        params: SubscribeParams,
    ) -> ConnectorResult<SubscriptionResult> {
        ctx.check()?;
        self.storage.subscribe(params).await
    }

    async fn update_subscription(
        &self,
        ctx: &Context,
        id: &SubscriptionId,
        events: SubscriptionEvents,
    ) -> ConnectorResult<SubscriptionResult> {
        ctx.check()?;
        self.storage.update_subscription(id, events).await
    }

    async fn delete_subscription(&self, ctx: &Context, id: &SubscriptionId) -> ConnectorResult<()> {
        ctx.check()?;
        self.storage.unsubscribe(id).await.map(|_| ())
    }
}
