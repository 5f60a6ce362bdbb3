//! Per-operation adapters
//!
//! An adapter is the provider-specific half of a pipeline: it builds the
//! request and picks the handlers that parse the response. [`DefaultAdapter`]
//! covers providers that follow common REST conventions and is configured
//! entirely from [`RestConfig`]; hand-written adapters implement the traits
//! directly.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use serde_json::Value;
use tracing::debug;
use url::Url;

use amp_connector::catalog::{EndpointCatalog, StaticSchemas};
use amp_connector::context::Context;
use amp_connector::datautils::Set;
use amp_connector::error::{ConnectorError, ConnectorResult};
use amp_connector::filter::{make_sorted_filter_func, make_time_filter_func, pass_through, FilterFunc};
use amp_connector::locator::{
    extract_optional_records_from_path, make_next_page_func, no_next_page, records_at_root,
    IdFieldQuery, JsonPath, NextPageFunc, RecordsFunc, ResponseDataLocator,
};
use amp_connector::marshal::{self, MarshalFunc};
use amp_connector::operation::{
    DeleteParams, DeleteResult, ReadParams, ReadResult, ReadResultRow, Record, WriteParams,
    WriteResult,
};
use amp_connector::schema::{FieldMetadata, ObjectMetadata};
use amp_connector::types::{ModuleId, ValueType};
use amp_connector::urlbuilder::UrlBuilder;

use crate::client::{HttpClient, HttpRequest, HttpResponse};
use crate::config::{NextPageStyle, PaginationConfig, ResponseConfig, RestConfig};
use crate::encoder::{encoder_for, PayloadEncoder};
use crate::read::{parse_read_body, ReadHandlers};
use crate::write::{check_delete_status, parse_write_body};

/// Builds read requests and parses read responses for one provider.
pub trait ReadAdapter: Send + Sync {
    fn build_read_request(&self, params: &ReadParams) -> ConnectorResult<HttpRequest>;

    /// Handlers for the response of the request built for `params`.
    fn read_handlers(&self, params: &ReadParams) -> ConnectorResult<ReadHandlers>;

    /// Reads must name at least one field.
    fn require_fields(&self) -> bool {
        false
    }

    fn parse_read_response(
        &self,
        ctx: &Context,
        params: &ReadParams,
        response: &HttpResponse,
    ) -> ConnectorResult<ReadResult> {
        let body = response.json()?;
        let handlers = self.read_handlers(params)?;
        parse_read_body(ctx, params, &body, &handlers)
    }
}

/// Builds create/update requests and parses their responses.
pub trait WriteAdapter: Send + Sync {
    fn build_write_request(&self, params: &WriteParams) -> ConnectorResult<HttpRequest>;

    fn parse_write_response(
        &self,
        params: &WriteParams,
        response: &HttpResponse,
    ) -> ConnectorResult<WriteResult>;
}

/// Builds delete requests.
pub trait DeleteAdapter: Send + Sync {
    fn build_delete_request(&self, params: &DeleteParams) -> ConnectorResult<HttpRequest>;

    fn parse_delete_response(
        &self,
        _params: &DeleteParams,
        response: &HttpResponse,
    ) -> ConnectorResult<DeleteResult> {
        check_delete_status(response)
    }
}

/// Describes one object.
#[async_trait]
pub trait MetadataAdapter: Send + Sync {
    async fn object_metadata(
        &self,
        ctx: &Context,
        client: &HttpClient,
        object: &str,
    ) -> ConnectorResult<ObjectMetadata>;
}

/// Adapter driven by the catalog and the pagination/response conventions of
/// a [`RestConfig`].
pub struct DefaultAdapter {
    catalog: EndpointCatalog,
    pagination: PaginationConfig,
    response: ResponseConfig,
    encoder: Box<dyn PayloadEncoder>,
    content_type: Option<String>,
    locator: ResponseDataLocator,
    id_query: IdFieldQuery,
    /// Object name to the key of its records array.
    records_keys: HashMap<String, String>,
}

impl std::fmt::Debug for DefaultAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultAdapter")
            .field("catalog", &self.catalog)
            .field("pagination", &self.pagination)
            .field("response", &self.response)
            .field("encoder", &self.encoder)
            .finish_non_exhaustive()
    }
}

impl DefaultAdapter {
    pub fn new(config: &RestConfig, catalog: EndpointCatalog) -> Self {
        let write_id_path = config
            .response
            .write_id_path
            .as_deref()
            .unwrap_or(&config.response.id_path);
        Self {
            locator: ResponseDataLocator::new(catalog.module().clone())
                .with_default_path(JsonPath::dotted(write_id_path)),
            id_query: id_field_query(&config.response.id_path),
            catalog,
            pagination: config.pagination.clone(),
            response: config.response.clone(),
            encoder: encoder_for(&config.payload),
            content_type: config.content_type.clone(),
            records_keys: HashMap::new(),
        }
    }

    /// Catalog answering every object with `{base_url}/{object}`.
    pub fn conventional_catalog(config: &RestConfig) -> ConnectorResult<EndpointCatalog> {
        Ok(EndpointCatalog::new(config.resolved_base_url()?, config.module.clone())
            .with_conventional_paths(""))
    }

    /// Read records of each object from the `responseKey` of a bundled schema.
    pub fn with_records_keys(mut self, keys: HashMap<String, String>) -> Self {
        self.records_keys = keys;
        self
    }

    /// Use a custom locator for record IDs in write responses.
    pub fn with_locator(mut self, locator: ResponseDataLocator) -> Self {
        self.locator = locator;
        self
    }

    pub fn catalog(&self) -> &EndpointCatalog {
        &self.catalog
    }

    fn first_page_url(&self, params: &ReadParams) -> ConnectorResult<UrlBuilder> {
        let mut url = self.catalog.create_read_operation(params)?.url;

        if let Some(param) = &self.pagination.page_size_param {
            url = url.set_query(param.clone(), self.pagination.page_size(params.page_size).to_string());
        }
        if let (Some(param), Some(since)) = (&self.pagination.since_param, params.since) {
            url = url.set_query(param.clone(), self.pagination.timestamp_format.format(&since));
        }
        if let (Some(param), Some(until)) = (&self.pagination.until_param, params.until) {
            url = url.set_query(param.clone(), self.pagination.timestamp_format.format(&until));
        }
        if params.deleted {
            let param = self
                .pagination
                .deleted_param
                .as_ref()
                .ok_or_else(|| ConnectorError::not_implemented("read of deleted records"))?;
            url = url.set_query(param.clone(), "true");
        }
        Ok(url)
    }

    fn records_func(&self, object: &str) -> RecordsFunc {
        if let Some(key) = self.records_keys.get(object) {
            return extract_optional_records_from_path(JsonPath::dotted(key));
        }
        match &self.response.records_path {
            Some(path) => extract_optional_records_from_path(JsonPath::dotted(path)),
            None => records_at_root(),
        }
    }

    fn next_page_func(&self, params: &ReadParams, records: &RecordsFunc) -> NextPageFunc {
        match &self.pagination.next_page {
            NextPageStyle::None => no_next_page(),
            NextPageStyle::Cursor { path, .. } | NextPageStyle::Url { path } => {
                make_next_page_func(JsonPath::dotted(path))
            }
            NextPageStyle::Offset { .. } => {
                let offset: usize = params.next_page.parse().unwrap_or(0);
                let page_size = self.pagination.page_size(params.page_size);
                let records = Arc::clone(records);
                Arc::new(move |body: &Value| -> ConnectorResult<String> {
                    let count = records(body)?.len();
                    if count < page_size {
                        return Ok(String::new());
                    }
                    Ok((offset + count).to_string())
                })
            }
        }
    }

    fn filter_func(&self, next_page: NextPageFunc) -> FilterFunc {
        let Some(field) = &self.response.timestamp_field else {
            return pass_through(next_page);
        };
        if self.response.newest_first {
            return make_sorted_filter_func(field.clone(), self.response.timestamp_format.clone(), next_page);
        }
        make_time_filter_func(
            self.response.time_order,
            self.response.boundary,
            field.clone(),
            self.response.timestamp_format.clone(),
            next_page,
        )
    }
}

impl ReadAdapter for DefaultAdapter {
    fn build_read_request(&self, params: &ReadParams) -> ConnectorResult<HttpRequest> {
        if params.next_page.is_empty() {
            return Ok(HttpRequest::get(self.first_page_url(params)?.to_url()));
        }

        let url = match &self.pagination.next_page {
            NextPageStyle::Url { .. } => {
                let base = Url::parse(self.catalog.base_url())
                    .map_err(|e| ConnectorError::invalid_config(format!("invalid base URL: {e}")))?;
                base.join(&params.next_page).map_err(|e| {
                    ConnectorError::bad_request(400, format!("invalid next page URL: {e}"))
                })?
            }
            NextPageStyle::Cursor { param, .. } | NextPageStyle::Offset { param } => self
                .first_page_url(params)?
                .set_query(param.clone(), params.next_page.clone())
                .to_url(),
            NextPageStyle::None => {
                return Err(ConnectorError::bad_request(
                    400,
                    "provider does not paginate; next page token is not accepted",
                ))
            }
        };
        debug!(object = %params.object_name, url = %url.path(), "Continuing read");
        Ok(HttpRequest::get(url))
    }

    fn read_handlers(&self, params: &ReadParams) -> ConnectorResult<ReadHandlers> {
        let records = self.records_func(&params.object_name);
        let next_page = self.next_page_func(params, &records);
        Ok(ReadHandlers {
            filter: self.filter_func(next_page),
            records,
            marshal: marshal_with_id(self.id_query.clone()),
        })
    }

    fn require_fields(&self) -> bool {
        self.response.require_fields
    }
}

impl WriteAdapter for DefaultAdapter {
    fn build_write_request(&self, params: &WriteParams) -> ConnectorResult<HttpRequest> {
        let operation = self.catalog.create_write_operation(params)?;
        let payload = self.encoder.payload(
            &params.object_name,
            &params.record_data,
            self.content_type.as_deref(),
        )?;
        Ok(HttpRequest::new(operation.method, operation.url.to_url())
            .with_body(payload)
            .with_headers(&params.headers))
    }

    fn parse_write_response(
        &self,
        params: &WriteParams,
        response: &HttpResponse,
    ) -> ConnectorResult<WriteResult> {
        // Non-JSON bodies (e.g. XML acknowledgements) carry nothing we parse.
        let body = response.json().unwrap_or(Value::Null);
        Ok(parse_write_body(params, &body, &self.locator))
    }
}

impl DeleteAdapter for DefaultAdapter {
    fn build_delete_request(&self, params: &DeleteParams) -> ConnectorResult<HttpRequest> {
        let operation = self.catalog.create_delete_operation(params)?;
        Ok(HttpRequest::new(operation.method, operation.url.to_url()).with_headers(&params.headers))
    }
}

fn id_field_query(path: &str) -> IdFieldQuery {
    let path = JsonPath::dotted(path);
    IdFieldQuery::zoomed(path.nested, path.key)
}

/// Rows with their ID; all keys are kept when no field was requested.
fn marshal_with_id(id_query: IdFieldQuery) -> MarshalFunc {
    let selected = marshal::with_id(id_query.clone());
    Arc::new(move |records: &[Record], fields: &Set<String>| -> ConnectorResult<Vec<ReadResultRow>> {
        if !fields.is_empty() {
            return selected(records, fields);
        }
        Ok(records
            .iter()
            .map(|record| ReadResultRow {
                fields: marshal::lowercase_keys(record),
                raw: record.clone(),
                id: id_query.extract(record).unwrap_or_default(),
                ..Default::default()
            })
            .collect())
    })
}

/// Metadata from a bundled `schemas.json`; no HTTP calls.
#[derive(Debug, Clone)]
pub struct StaticMetadata {
    schemas: Arc<StaticSchemas>,
    module: ModuleId,
}

impl StaticMetadata {
    pub fn new(schemas: Arc<StaticSchemas>, module: ModuleId) -> Self {
        Self { schemas, module }
    }
}

#[async_trait]
impl MetadataAdapter for StaticMetadata {
    async fn object_metadata(
        &self,
        ctx: &Context,
        _client: &HttpClient,
        object: &str,
    ) -> ConnectorResult<ObjectMetadata> {
        ctx.check()?;
        self.schemas.object_metadata(&self.module, object)
    }
}

/// Metadata inferred from a one-record sample read.
///
/// Field types follow the JSON values of the sample; an object without
/// records yields metadata without fields. A response with no body at all
/// is an `EmptyResponse` error.
pub struct SampledMetadata {
    reader: Arc<dyn ReadAdapter>,
}

impl SampledMetadata {
    pub fn new(reader: Arc<dyn ReadAdapter>) -> Self {
        Self { reader }
    }
}

#[async_trait]
impl MetadataAdapter for SampledMetadata {
    async fn object_metadata(
        &self,
        ctx: &Context,
        client: &HttpClient,
        object: &str,
    ) -> ConnectorResult<ObjectMetadata> {
        let params = ReadParams::new(object).with_page_size(1);
        let request = self.reader.build_read_request(&params)?;
        let response = client.execute(ctx, request).await?;
        let body = response.json_required()?;
        let records = (self.reader.read_handlers(&params)?.records)(&body)?;

        let mut metadata = ObjectMetadata::new(object);
        if let Some(sample) = records.first() {
            for (name, value) in sample {
                let (value_type, provider_type) = infer_value_type(value);
                metadata.add_field(
                    name.clone(),
                    FieldMetadata::new(name.clone(), value_type).with_provider_type(provider_type),
                );
            }
        } else {
            debug!(object, "No sample record; metadata has no fields");
        }
        Ok(metadata)
    }
}

/// Value type and JSON type name of a sampled value.
pub fn infer_value_type(value: &Value) -> (ValueType, &'static str) {
    match value {
        Value::Bool(_) => (ValueType::Boolean, "boolean"),
        Value::Number(n) if n.is_i64() || n.is_u64() => (ValueType::Int, "integer"),
        Value::Number(_) => (ValueType::Float, "number"),
        Value::String(s) if DateTime::parse_from_rfc3339(s).is_ok() => (ValueType::DateTime, "string"),
        Value::String(s) if NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() => (ValueType::Date, "string"),
        Value::String(_) => (ValueType::String, "string"),
        Value::Array(_) => (ValueType::Other, "array"),
        Value::Object(_) => (ValueType::Other, "object"),
        Value::Null => (ValueType::Other, "null"),
    }
}
