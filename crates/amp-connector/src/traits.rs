//! Connector traits
//!
//! Capability-based trait definitions. A connector implements [`Connector`]
//! plus whichever capabilities its provider supports, and advertises them
//! through the `as_*` capability queries.

use async_trait::async_trait;

use crate::context::Context;
use crate::error::{ConnectorError, ConnectorResult};
use crate::ids::SubscriptionId;
use crate::operation::{
    BatchWriteResult, DeleteParams, DeleteResult, ReadParams, ReadResult, WriteParams, WriteResult,
};
use crate::schema::ListObjectMetadataResult;
use crate::subscription::{SubscribeParams, SubscriptionEvents, SubscriptionResult};
use crate::types::ModuleId;
use crate::webhook::{VerificationParams, WebhookRequest};

/// Base trait for all connectors.
pub trait Connector: Send + Sync {
    /// Provider name (e.g. `hubspot`, `memstore`).
    fn provider(&self) -> &str;

    /// Active module of the provider.
    fn module(&self) -> &ModuleId;

    fn as_reader(&self) -> Option<&dyn ReadConnector> {
        None
    }

    fn as_writer(&self) -> Option<&dyn WriteConnector> {
        None
    }

    fn as_deleter(&self) -> Option<&dyn DeleteConnector> {
        None
    }

    fn as_metadata_lister(&self) -> Option<&dyn MetadataLister> {
        None
    }

    fn as_subscriber(&self) -> Option<&dyn Subscriber> {
        None
    }

    fn as_webhook_verifier(&self) -> Option<&dyn WebhookVerifier> {
        None
    }
}

/// Capability for reading records page by page.
#[async_trait]
pub trait ReadConnector: Connector {
    /// Read one page. Pass the returned `next_page` back to continue.
    async fn read(&self, ctx: &Context, params: ReadParams) -> ConnectorResult<ReadResult>;
}

/// Capability for creating and updating records.
#[async_trait]
pub trait WriteConnector: Connector {
    /// Create a record when `params.record_id` is empty, update it otherwise.
    async fn write(&self, ctx: &Context, params: WriteParams) -> ConnectorResult<WriteResult>;

    /// Run many writes, collecting per-record failures instead of stopping.
    ///
    /// Only cancellation aborts the batch.
    async fn write_batch(
        &self,
        ctx: &Context,
        batch: Vec<WriteParams>,
    ) -> ConnectorResult<BatchWriteResult> {
        let mut outcome = BatchWriteResult::default();
        for (index, params) in batch.into_iter().enumerate() {
            ctx.check()?;
            match self.write(ctx, params).await {
                Ok(result) => outcome.results.push(Some(result)),
                Err(ConnectorError::Cancelled) => return Err(ConnectorError::Cancelled),
                Err(e) => {
                    tracing::warn!(index, error = %e, "Batch write failed for record");
                    outcome.results.push(None);
                    outcome.errors.insert(index, e);
                }
            }
        }
        Ok(outcome)
    }
}

/// Capability for deleting records.
#[async_trait]
pub trait DeleteConnector: Connector {
    async fn delete(&self, ctx: &Context, params: DeleteParams) -> ConnectorResult<DeleteResult>;
}

/// Capability for describing objects.
#[async_trait]
pub trait MetadataLister: Connector {
    /// Describe every object in `objects`. Per-object failures land in
    /// `errors`; only catastrophic failures (e.g. cancellation) are returned.
    async fn list_object_metadata(
        &self,
        ctx: &Context,
        objects: &[String],
    ) -> ConnectorResult<ListObjectMetadataResult>;
}

/// Capability for change-notification subscriptions.
#[async_trait]
pub trait Subscriber: Connector {
    async fn subscribe(
        &self,
        ctx: &Context,
        params: SubscribeParams,
    ) -> ConnectorResult<SubscriptionResult>;

    /// Replace the events of an existing subscription; its observer is kept.
    async fn update_subscription(
        &self,
        ctx: &Context,
        id: &SubscriptionId,
        events: SubscriptionEvents,
    ) -> ConnectorResult<SubscriptionResult>;

    async fn delete_subscription(&self, ctx: &Context, id: &SubscriptionId) -> ConnectorResult<()>;
}

/// Capability for verifying inbound webhook deliveries.
#[async_trait]
pub trait WebhookVerifier: Connector {
    async fn verify_webhook_message(
        &self,
        ctx: &Context,
        request: &WebhookRequest,
        params: &VerificationParams,
    ) -> ConnectorResult<bool>;
}
