//! Write and delete dispatch
//!
//! Create-vs-update is decided by the catalog from the record ID; the
//! adapters build the request and interpret the result.

use serde_json::Value;
use tracing::{info, instrument};

use amp_connector::context::Context;
use amp_connector::error::{ConnectorError, ConnectorResult};
use amp_connector::locator::ResponseDataLocator;
use amp_connector::operation::{DeleteParams, DeleteResult, WriteParams, WriteResult};

use crate::adapter::{DeleteAdapter, WriteAdapter};
use crate::client::{HttpClient, HttpResponse};

/// Result of a 2xx write response body.
///
/// The record ID is taken from the body when `locator` finds one and falls
/// back to the ID the write was addressed to.
pub fn parse_write_body(params: &WriteParams, body: &Value, locator: &ResponseDataLocator) -> WriteResult {
    let mut record_id = locator.extract_record_id(body, &params.object_name);
    if record_id.is_empty() {
        record_id = params.record_id.clone();
    }
    let errors = body
        .get("errors")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    WriteResult {
        success: true,
        record_id,
        errors,
        data: body.as_object().cloned().unwrap_or_default(),
    }
}

/// Deletes succeed on 200 and 204 only; the body is ignored.
pub fn check_delete_status(response: &HttpResponse) -> ConnectorResult<DeleteResult> {
    match response.status {
        200 | 204 => Ok(DeleteResult { success: true }),
        status => Err(ConnectorError::request_failed(
            status,
            format!("unexpected status {status} for delete"),
        )),
    }
}

#[instrument(skip(ctx, client, adapter, params), fields(object = %params.object_name, update = params.is_update()))]
pub async fn write(
    ctx: &Context,
    client: &HttpClient,
    adapter: &dyn WriteAdapter,
    params: WriteParams,
) -> ConnectorResult<WriteResult> {
    params.validate()?;
    ctx.check()?;

    let request = adapter.build_write_request(&params)?;
    let response = client.execute(ctx, request).await?;
    let result = adapter.parse_write_response(&params, &response)?;

    info!(
        object = %params.object_name,
        record_id = %result.record_id,
        "REST record written"
    );
    Ok(result)
}

#[instrument(skip(ctx, client, adapter, params), fields(object = %params.object_name, id = %params.record_id))]
pub async fn delete(
    ctx: &Context,
    client: &HttpClient,
    adapter: &dyn DeleteAdapter,
    params: DeleteParams,
) -> ConnectorResult<DeleteResult> {
    params.validate()?;
    ctx.check()?;

    let request = adapter.build_delete_request(&params)?;
    let response = client.execute(ctx, request).await?;
    let result = adapter.parse_delete_response(&params, &response)?;

    info!(object = %params.object_name, id = %params.record_id, "REST record deleted");
    Ok(result)
}
