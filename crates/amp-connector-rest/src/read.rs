//! Read pipeline
//!
//! `build -> send -> interpret errors -> locate records -> filter -> marshal`.
//! Adapters decide how requests are built and which handlers process the
//! body; the pipeline itself is provider-agnostic.

use std::fmt;

use serde_json::Value;
use tracing::{debug, instrument};

use amp_connector::context::Context;
use amp_connector::error::ConnectorResult;
use amp_connector::filter::FilterFunc;
use amp_connector::locator::RecordsFunc;
use amp_connector::marshal::MarshalFunc;
use amp_connector::operation::{ReadParams, ReadResult};

use crate::adapter::ReadAdapter;
use crate::client::HttpClient;

/// The three stages applied to a read response body.
#[derive(Clone)]
pub struct ReadHandlers {
    pub records: RecordsFunc,
    pub filter: FilterFunc,
    pub marshal: MarshalFunc,
}

impl fmt::Debug for ReadHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadHandlers").finish_non_exhaustive()
    }
}

/// Turn a response body into a page.
///
/// A filter interrupted by cancellation or an unparsable timestamp fails the
/// page with the interrupting error.
pub fn parse_read_body(
    ctx: &Context,
    params: &ReadParams,
    body: &Value,
    handlers: &ReadHandlers,
) -> ConnectorResult<ReadResult> {
    let records = (handlers.records)(body)?;
    let located = records.len();
    let page = (handlers.filter)(ctx, params, records, body)?;
    let rows = (handlers.marshal)(&page.records, &params.fields)?;
    debug!(
        object = %params.object_name,
        located,
        kept = rows.len(),
        done = page.next_page.is_empty(),
        "Parsed read response"
    );
    Ok(ReadResult::new(rows, page.next_page))
}

/// Read one page of `params.object_name` through `adapter`.
#[instrument(skip(ctx, client, adapter, params), fields(object = %params.object_name))]
pub async fn read(
    ctx: &Context,
    client: &HttpClient,
    adapter: &dyn ReadAdapter,
    params: ReadParams,
) -> ConnectorResult<ReadResult> {
    params.validate(adapter.require_fields())?;
    ctx.check()?;

    let request = adapter.build_read_request(&params)?;
    let response = client.execute(ctx, request).await?;
    adapter.parse_read_response(ctx, &params, &response)
}
