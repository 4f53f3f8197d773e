//! Observation wrappers: structured logging, callbacks and counters around a
//! stream without changing its items.

use std::sync::Arc;

use async_stream::stream;
use futures::StreamExt;

use crate::flow::Flow;
use crate::stats::FlowStats;

/// Log every item, the completion and any failure under `label` via
/// `tracing`.
pub fn log<T>(label: impl Into<String>) -> Flow<T, T>
where
    T: std::fmt::Debug + Send + 'static,
{
    let label = label.into();
    Flow::new(format!("log({label})"), move |mut source| {
        let label = label.clone();
        Box::pin(stream! {
            while let Some(item) = source.next().await {
                match &item {
                    Ok(value) => tracing::debug!(flow = %label, item = ?value, "item"),
                    Err(e) => tracing::error!(flow = %label, error = %e, "stream failed"),
                }
                let failed = item.is_err();
                yield item;
                if failed {
                    return;
                }
            }
            tracing::debug!(flow = %label, "stream completed");
        })
    })
}

/// Invoke `inspector` with a borrowed view of every item.
pub fn inspect<T, F>(label: impl Into<String>, inspector: F) -> Flow<T, T>
where
    T: Send + 'static,
    F: Fn(&str, &T) + Send + Sync + 'static,
{
    let label = label.into();
    let inspector = Arc::new(inspector);
    Flow::new(format!("inspect({label})"), move |source| {
        let label = label.clone();
        let inspector = inspector.clone();
        source
            .map(move |item| {
                if let Ok(value) = &item {
                    inspector(&label, value);
                }
                item
            })
            .boxed()
    })
}

/// Count items, failures and completions into `stats` (and the process-wide
/// prometheus counters it feeds).
pub fn measured<T>(stats: Arc<FlowStats>) -> Flow<T, T>
where
    T: Send + 'static,
{
    Flow::new(format!("measured({})", stats.flow()), move |mut source| {
        let stats = stats.clone();
        Box::pin(stream! {
            while let Some(item) = source.next().await {
                match &item {
                    Ok(_) => stats.record_item(),
                    Err(e) => stats.record_error(e),
                }
                let failed = item.is_err();
                yield item;
                if failed {
                    return;
                }
            }
            stats.record_completion();
        })
    })
}
