//! # Connector Core
//!
//! Core abstractions shared by every SaaS API connector.
//!
//! A connector exposes a uniform surface (read, write, delete, metadata,
//! subscriptions) over a heterogeneous provider API. This crate holds
//! everything that does not need an HTTP client: the data model, the
//! endpoint catalog, response locators, the incremental filter engine, the
//! concurrent metadata fan-out and the error taxonomy.
//!
//! ## Architecture
//!
//! Connectors declare capabilities through traits:
//!
//! - [`Connector`](traits::Connector) - Base trait with capability queries
//! - [`ReadConnector`](traits::ReadConnector), [`WriteConnector`](traits::WriteConnector),
//!   [`DeleteConnector`](traits::DeleteConnector) - Record operations
//! - [`MetadataLister`](traits::MetadataLister) - Object metadata
//! - [`Subscriber`](traits::Subscriber), [`WebhookVerifier`](traits::WebhookVerifier) - Change notifications
//!
//! ## Example
//!
//! ```ignore
//! use amp_connector::prelude::*;
//!
//! let ctx = Context::new();
//! let params = ReadParams::new("contacts")
//!     .with_fields(["id", "email"])
//!     .with_since(since);
//!
//! let reader = connector.as_reader().ok_or_else(|| ConnectorError::not_implemented("read"))?;
//! let mut page = reader.read(&ctx, params.clone()).await?;
//! while !page.done {
//!     page = reader.read(&ctx, params.clone().with_next_page(page.next_page)).await?;
//! }
//! ```
//!
//! ## Crate Organization
//!
//! - [`context`] - Cancellation and deadlines
//! - [`datautils`] - Sets, indexed lists, maps with fallbacks
//! - [`error`] - Error types with transient/permanent classification
//! - [`types`], [`ids`] - Enums and identifiers
//! - [`config`] - Configuration types and traits
//! - [`operation`], [`schema`] - Operation parameters, results and metadata
//! - [`catalog`], [`urlbuilder`] - Endpoint resolution
//! - [`locator`], [`marshal`], [`filter`] - Response processing
//! - [`metadata`] - Concurrent metadata fan-out
//! - [`interpreter`] - Provider error interpretation
//! - [`subscription`], [`webhook`] - Change notifications

pub mod catalog;
pub mod config;
pub mod context;
pub mod datautils;
pub mod error;
pub mod filter;
pub mod ids;
pub mod interpreter;
pub mod locator;
pub mod marshal;
pub mod metadata;
pub mod operation;
pub mod schema;
pub mod subscription;
pub mod traits;
pub mod types;
pub mod urlbuilder;
pub mod webhook;

/// Prelude module for convenient imports.
///
/// ```
/// use amp_connector::prelude::*;
/// ```
pub mod prelude {
    // IDs
    pub use crate::ids::SubscriptionId;

    // Types and enums
    pub use crate::types::{ChangeEventType, HttpMethod, ModuleId, ValueType};

    // Error handling
    pub use crate::error::{ConnectorError, ConnectorResult};

    // Context
    pub use crate::context::Context;

    // Traits
    pub use crate::traits::{
        Connector, DeleteConnector, MetadataLister, ReadConnector, Subscriber, WebhookVerifier,
        WriteConnector,
    };

    // Operations
    pub use crate::operation::{
        Association, BatchWriteResult, DeleteParams, DeleteResult, ReadParams, ReadResult,
        ReadResultRow, Record, WriteParams, WriteResult,
    };

    // Schema
    pub use crate::schema::{FieldMetadata, FieldValue, ListObjectMetadataResult, ObjectMetadata};

    // Configuration
    pub use crate::config::{ApiKeyLocation, AuthConfig, ConnectionSettings, ConnectorConfig};

    // Catalog
    pub use crate::catalog::{EndpointCatalog, OperationRegistry, OperationSpec, StaticSchemas};

    // Response processing
    pub use crate::filter::{TimeBoundary, TimeOrder, TimestampFormat};
    pub use crate::locator::{IdFieldQuery, JsonPath, ResponseDataLocator};

    // Subscriptions and webhooks
    pub use crate::subscription::{
        ChangeEvent, ObjectEvents, SubscribeParams, SubscriptionEvents, SubscriptionObserver,
        SubscriptionResult, SubscriptionStatus,
    };
    pub use crate::webhook::{VerificationParams, WebhookRequest};

    // Utilities
    pub use crate::datautils::Set;
}

// Re-export async_trait for connector implementors
pub use async_trait::async_trait;

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_imports() {
        let _id = SubscriptionId::generate();
        let _module = ModuleId::root();
        let _vt = ValueType::DateTime;
        let _params = ReadParams::new("contacts");
        let _write = WriteParams::new("contacts", serde_json::json!({"name": "Acme"}));
        let _ctx = Context::new();
        let _path = JsonPath::dotted("paging.next");
        let _fields: Set<String> = Set::new();
    }
}
