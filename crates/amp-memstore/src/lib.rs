//! # Memstore
//!
//! In-memory connector whose objects are described by JSON Schema documents.
//! It implements the same read, write, delete, metadata and subscription
//! capabilities as a real provider connector, which makes it the test double
//! for code written against `amp-connector`.
//!
//! ## Features
//!
//! - Schema validation on every write, with ID and updated-at fields stamped
//! - Foreign-key, reverse-lookup and junction associations, expanded on read
//! - Offset pagination and `since`/`until` filtering on the updated field
//! - Change subscriptions with per-subscription ordered delivery
//! - Random record generation for seeding
//!
//! ## Example
//!
//! ```ignore
//! use amp_connector::prelude::*;
//! use amp_memstore::MemoryConnector;
//! use serde_json::json;
//!
//! let connector = MemoryConnector::from_documents([(
//!     "contact",
//!     json!({"type": "object", "properties": {
//!         "id": {"type": "string", "x-amp-id-field": true},
//!         "email": {"type": "string", "format": "email"}
//!     }}),
//! )])?;
//!
//! let ctx = Context::new();
//! connector.write(&ctx, WriteParams::new("contact", json!({"email": "ada@example.com"}))).await?;
//! let page = connector.read(&ctx, ReadParams::new("contact")).await?;
//! ```

pub mod associations;
pub mod config;
pub mod connector;
pub mod generator;
pub mod schema;
pub mod storage;

// Re-exports
pub use config::MemStoreConfig;
pub use connector::MemoryConnector;
pub use generator::RecordGenerator;
pub use schema::{
    AssociationSchema, AssociationType, FieldKind, ObjectSchema, SchemaBuilder, SchemaRegistry,
};
pub use storage::{Storage, StoreOutcome};
