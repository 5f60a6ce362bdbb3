//! Concurrent metadata fetching
//!
//! Resolves the metadata of many objects in parallel. Each object succeeds or
//! fails on its own; only cancellation (or a panicking task) fails the batch.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::context::Context;
use crate::datautils::Set;
use crate::error::{ConnectorError, ConnectorResult};
use crate::schema::{ListObjectMetadataResult, ObjectMetadata};

/// Default number of objects resolved at once.
pub const DEFAULT_METADATA_CONCURRENCY: usize = 8;

/// Fetch metadata for `objects` with at most `concurrency` tasks in flight
/// (`0` means unlimited).
///
/// `fetch` receives a child context and the object name. Its failures are
/// recorded in `errors[object]`.
pub async fn fetch_object_metadata<F, Fut>(
    ctx: &Context,
    objects: &[String],
    concurrency: usize,
    fetch: F,
) -> ConnectorResult<ListObjectMetadataResult>
where
    F: Fn(Context, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ConnectorResult<ObjectMetadata>> + Send + 'static,
{
    if objects.is_empty() {
        return Err(ConnectorError::MissingObjects);
    }
    ctx.check()?;

    let unique: Set<String> = objects.iter().cloned().collect();
    let limiter = (concurrency > 0).then(|| Arc::new(Semaphore::new(concurrency)));
    let state = Arc::new(Mutex::new(ListObjectMetadataResult::new()));
    let fetch = Arc::new(fetch);

    let mut tasks = JoinSet::new();
    for object in unique.iter().cloned() {
        let ctx = ctx.child();
        let limiter = limiter.clone();
        let state = Arc::clone(&state);
        let fetch = Arc::clone(&fetch);

        tasks.spawn(async move {
            let _permit = match limiter {
                Some(limiter) => Some(
                    ctx.run(async {
                        limiter
                            .acquire_owned()
                            .await
                            .map_err(|e| ConnectorError::internal_with_source("metadata limiter closed", e))
                    })
                    .await?,
                ),
                None => None,
            };
            ctx.check()?;

            let outcome = ctx.run(fetch(ctx.clone(), object.clone())).await;
            ctx.check()?;

            let mut state = state.lock().await;
            match outcome {
                Ok(metadata) => {
                    state.result.insert(object, metadata);
                }
                Err(ConnectorError::Cancelled) => return Err(ConnectorError::Cancelled),
                Err(e) => {
                    warn!(object = %object, error = %e, "Failed to fetch object metadata");
                    state.errors.insert(object, e);
                }
            }
            Ok(())
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let failure = match joined {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e,
            Err(e) => ConnectorError::internal_with_source("metadata task failed", e),
        };
        tasks.abort_all();
        return Err(failure);
    }

    let mut state = state.lock().await;
    let result = std::mem::take(&mut *state);
    debug!(
        fetched = result.result.len(),
        failed = result.errors.len(),
        "Object metadata fan-out complete"
    );
    Ok(result)
}
