//! REST Connector implementation
//!
//! Implements the connector capability traits for generic REST APIs by
//! composing per-operation adapters with the shared pipelines.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use amp_connector::catalog::{EndpointCatalog, StaticSchemas};
use amp_connector::config::ConnectorConfig;
use amp_connector::context::Context;
use amp_connector::error::{ConnectorError, ConnectorResult};
use amp_connector::metadata::fetch_object_metadata;
use amp_connector::operation::{
    DeleteParams, DeleteResult, ReadParams, ReadResult, WriteParams, WriteResult,
};
use amp_connector::schema::ListObjectMetadataResult;
use amp_connector::traits::{
    Connector, DeleteConnector, MetadataLister, ReadConnector, WebhookVerifier, WriteConnector,
};
use amp_connector::types::ModuleId;
use amp_connector::webhook::{verify_hmac_signature, VerificationParams, WebhookRequest};

use crate::adapter::{
    DefaultAdapter, DeleteAdapter, MetadataAdapter, ReadAdapter, SampledMetadata, StaticMetadata,
    WriteAdapter,
};
use crate::client::HttpClient;
use crate::config::RestConfig;
use crate::{read, write};

/// Generic connector for REST providers.
pub struct RestConnector {
    /// Configuration.
    config: RestConfig,

    /// HTTP client.
    client: Arc<HttpClient>,

    reader: Option<Arc<dyn ReadAdapter>>,
    writer: Option<Arc<dyn WriteAdapter>>,
    deleter: Option<Arc<dyn DeleteAdapter>>,
    metadata: Option<Arc<dyn MetadataAdapter>>,
}

impl std::fmt::Debug for RestConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestConnector")
            .field("config", &self.config.redacted())
            .field("reads", &self.reader.is_some())
            .field("writes", &self.writer.is_some())
            .field("deletes", &self.deleter.is_some())
            .field("metadata", &self.metadata.is_some())
            .finish()
    }
}

impl RestConnector {
    /// Create a connector whose objects live at `{base_url}/{object}`.
    pub fn new(config: RestConfig) -> ConnectorResult<Self> {
        config.validate()?;
        let catalog = DefaultAdapter::conventional_catalog(&config)?;
        Self::with_catalog(config, catalog)
    }

    /// Create a connector over an explicit endpoint catalog.
    pub fn with_catalog(config: RestConfig, catalog: EndpointCatalog) -> ConnectorResult<Self> {
        config.validate()?;
        let adapter = Arc::new(DefaultAdapter::new(&config, catalog));
        let reader: Arc<dyn ReadAdapter> = adapter.clone();
        Self::assemble(
            config,
            adapter,
            Arc::new(SampledMetadata::new(Arc::clone(&reader))),
        )
    }

    /// Create a connector from a bundled `schemas.json`: reads use the schema's
    /// paths and response keys, metadata comes from the schema, writes and
    /// deletes use `{base_url}/{object}`.
    pub fn from_static_schemas(config: RestConfig, schemas: StaticSchemas) -> ConnectorResult<Self> {
        config.validate()?;
        let catalog = DefaultAdapter::conventional_catalog(&config)?
            .with_read_registry(schemas.operation_registry());
        let records_keys = schemas
            .response_keys()
            .remove(&config.module)
            .unwrap_or_default();
        let adapter = Arc::new(DefaultAdapter::new(&config, catalog).with_records_keys(records_keys));
        let metadata = Arc::new(StaticMetadata::new(Arc::new(schemas), config.module.clone()));
        Self::assemble(config, adapter, metadata)
    }

    fn assemble(
        config: RestConfig,
        adapter: Arc<DefaultAdapter>,
        metadata: Arc<dyn MetadataAdapter>,
    ) -> ConnectorResult<Self> {
        let client = HttpClient::new(&config)?;
        info!(
            provider = %config.provider,
            module = %config.module,
            base_url = %config.base_url,
            "REST connector created"
        );
        Ok(Self {
            config,
            client: Arc::new(client),
            reader: Some(adapter.clone()),
            writer: Some(adapter.clone()),
            deleter: Some(adapter),
            metadata: Some(metadata),
        })
    }

    /// Replace the HTTP client, e.g. to install a custom error interpreter.
    pub fn with_client(mut self, client: HttpClient) -> Self {
        self.client = Arc::new(client);
        self
    }

    pub fn with_read_adapter(mut self, adapter: Arc<dyn ReadAdapter>) -> Self {
        self.reader = Some(adapter);
        self
    }

    pub fn with_write_adapter(mut self, adapter: Arc<dyn WriteAdapter>) -> Self {
        self.writer = Some(adapter);
        self
    }

    pub fn with_delete_adapter(mut self, adapter: Arc<dyn DeleteAdapter>) -> Self {
        self.deleter = Some(adapter);
        self
    }

    pub fn with_metadata_adapter(mut self, adapter: Arc<dyn MetadataAdapter>) -> Self {
        self.metadata = Some(adapter);
        self
    }

    /// Drop the write and delete capabilities.
    pub fn read_only(mut self) -> Self {
        self.writer = None;
        self.deleter = None;
        self
    }

    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    /// Verify a webhook delivery with the configured parameters.
    pub async fn verify_configured_webhook(
        &self,
        ctx: &Context,
        request: &WebhookRequest,
    ) -> ConnectorResult<bool> {
        let params = self
            .config
            .webhook
            .as_ref()
            .ok_or_else(|| ConnectorError::not_implemented("webhook verification"))?;
        self.verify_webhook_message(ctx, request, params).await
    }
}

impl Connector for RestConnector {
    fn provider(&self) -> &str {
        &self.config.provider
    }

    fn module(&self) -> &ModuleId {
        &self.config.module
    }

    fn as_reader(&self) -> Option<&dyn ReadConnector> {
        self.reader.as_ref().map(|_| self as &dyn ReadConnector)
    }

    fn as_writer(&self) -> Option<&dyn WriteConnector> {
        self.writer.as_ref().map(|_| self as &dyn WriteConnector)
    }

    fn as_deleter(&self) -> Option<&dyn DeleteConnector> {
        self.deleter.as_ref().map(|_| self as &dyn DeleteConnector)
    }

    fn as_metadata_lister(&self) -> Option<&dyn MetadataLister> {
        self.metadata.as_ref().map(|_| self as &dyn MetadataLister)
    }

    fn as_webhook_verifier(&self) -> Option<&dyn WebhookVerifier> {
        self.config
            .webhook
            .as_ref()
            .map(|_| self as &dyn WebhookVerifier)
    }
}

#[async_trait]
impl ReadConnector for RestConnector {
    async fn read(&self, ctx: &Context, params: ReadParams) -> ConnectorResult<ReadResult> {
        let adapter = self
            .reader
            .as_deref()
            .ok_or_else(|| ConnectorError::not_implemented("read"))?;
        let object = params.object_name.clone();
        let result = read::read(ctx, &self.client, adapter, params).await?;
        info!(object = %object, rows = result.rows, done = result.done, "REST read completed");
        Ok(result)
    }
}

#[async_trait]
impl WriteConnector for RestConnector {
    async fn write(&self, ctx: &Context, params: WriteParams) -> ConnectorResult<WriteResult> {
        let adapter = self
            .writer
            .as_deref()
            .ok_or_else(|| ConnectorError::not_implemented("write"))?;
        write::write(ctx, &self.client, adapter, params).await
    }
}

#[async_trait]
impl DeleteConnector for RestConnector {
    async fn delete(&self, ctx: &Context, params: DeleteParams) -> ConnectorResult<DeleteResult> {
        let adapter = self
            .deleter
            .as_deref()
            .ok_or_else(|| ConnectorError::not_implemented("delete"))?;
        write::delete(ctx, &self.client, adapter, params).await
    }
}

#[async_trait]
impl MetadataLister for RestConnector {
    #[instrument(skip(self, ctx, objects), fields(count = objects.len()))]
    async fn list_object_metadata(
        &self,
        ctx: &Context,
        objects: &[String],
    ) -> ConnectorResult<ListObjectMetadataResult> {
        let adapter = self
            .metadata
            .clone()
            .ok_or_else(|| ConnectorError::not_implemented("list object metadata"))?;
        let client = Arc::clone(&self.client);

        let result = fetch_object_metadata(
            ctx,
            objects,
            self.config.metadata_concurrency,
            move |ctx: Context, object: String| {
                let adapter = Arc::clone(&adapter);
                let client = Arc::clone(&client);
                async move { adapter.object_metadata(&ctx, &client, &object).await }
            },
        )
        .await?;

        info!(
            described = result.result.len(),
            failed = result.errors.len(),
            "REST metadata listed"
        );
        Ok(result)
    }
}

#[async_trait]
impl WebhookVerifier for RestConnector {
    async fn verify_webhook_message(
        &self,
        ctx: &Context,
        request: &WebhookRequest,
        params: &VerificationParams,
    ) -> ConnectorResult<bool> {
        ctx.check()?;
        verify_hmac_signature(request, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rest_connector_new() {
        let config = RestConfig::new("https://api.example.com/v1")
            .with_provider("acme")
            .with_bearer_token("token");
        let connector = RestConnector::new(config).unwrap();
        assert_eq!(connector.provider(), "acme");
        assert_eq!(connector.module(), &ModuleId::root());
    }

    #[test]
    fn test_rest_connector_invalid_config() {
        assert!(RestConnector::new(RestConfig::new("")).is_err());
        assert!(RestConnector::new(RestConfig::new("https://{{.workspace}}.example.com")).is_err());
    }

    #[test]
    fn test_capabilities() {
        let connector = RestConnector::new(RestConfig::new("https://api.example.com")).unwrap();
        assert!(connector.as_reader().is_some());
        assert!(connector.as_writer().is_some());
        assert!(connector.as_deleter().is_some());
        assert!(connector.as_metadata_lister().is_some());
        assert!(connector.as_subscriber().is_none());
        assert!(connector.as_webhook_verifier().is_none());

        let connector = connector.read_only();
        assert!(connector.as_reader().is_some());
        assert!(connector.as_writer().is_none());
        assert!(connector.as_deleter().is_none());
    }

    #[test]
    fn test_webhook_capability() {
        let config = RestConfig::new("https://api.example.com")
            .with_webhook(VerificationParams::new("whsec"));
        let connector = RestConnector::new(config).unwrap();
        assert!(connector.as_webhook_verifier().is_some());
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let config = RestConfig::new("https://api.example.com").with_bearer_token("super-secret");
        let connector = RestConnector::new(config).unwrap();
        let debug = format!("{connector:?}");
        assert!(debug.contains("RestConnector"));
        assert!(!debug.contains("super-secret"));
    }
}
