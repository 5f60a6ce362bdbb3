//! # REST Connector
//!
//! Generic HTTP connector built from per-operation adapters.
//!
//! Every operation runs the same pipeline: the adapter builds the request,
//! the [`HttpClient`](client::HttpClient) sends it with the configured
//! credentials, non-2xx responses are interpreted into typed errors, and
//! the adapter's handlers turn the body into a uniform result.
//!
//! ## Features
//!
//! - Authentication with already-acquired credentials (Basic, Bearer, API Key)
//! - Conventional `{base_url}/{object}` endpoints or an explicit catalog
//! - Cursor, next-URL and offset pagination
//! - Incremental reads filtered by `since`/`until`
//! - JSON and SOAP-style XML write payloads
//! - Concurrent metadata listing from a bundled schema or sample records
//! - HMAC webhook verification
//!
//! ## Example
//!
//! ```ignore
//! use amp_connector::prelude::*;
//! use amp_connector_rest::{PaginationConfig, ResponseConfig, RestConfig, RestConnector};
//!
//! let config = RestConfig::new("https://api.example.com/v1")
//!     .with_bearer_token("my-api-token")
//!     .with_pagination(PaginationConfig::cursor("paging.next", "after"))
//!     .with_response(ResponseConfig::default().with_records_path("results"));
//!
//! let connector = RestConnector::new(config)?;
//! let page = connector.read(&Context::new(), ReadParams::new("contacts")).await?;
//! ```

pub mod adapter;
pub mod client;
pub mod config;
pub mod connector;
pub mod encoder;
pub mod read;
pub mod write;

// Re-exports
pub use adapter::{
    DefaultAdapter, DeleteAdapter, MetadataAdapter, ReadAdapter, SampledMetadata, StaticMetadata,
    WriteAdapter,
};
pub use client::{HttpClient, HttpRequest, HttpResponse, Payload};
pub use config::{
    LogVerbosity, NextPageStyle, PaginationConfig, PayloadFormat, ResponseConfig, RestConfig,
};
pub use connector::RestConnector;
pub use encoder::{JsonEncoder, PayloadEncoder, XmlEnvelopeEncoder};
pub use read::ReadHandlers;
