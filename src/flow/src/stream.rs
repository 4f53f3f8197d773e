//! The sequence type flows consume and produce, plus small helpers for
//! building and draining one.
//!
//! An [`ItemStream`] is lazy, single-pass and pull-based: nothing runs until
//! the consumer polls, and consuming it exhausts it. Factories hand out a
//! fresh stream per run; streams themselves are never restartable.

use futures::stream::{BoxStream, StreamExt};

use crate::error::FlowError;

/// Lazily-produced sequence of items; every slot is either an item or the
/// single terminal failure of the stream.
pub type ItemStream<T> = BoxStream<'static, Result<T, FlowError>>;

/// Stream over an in-memory collection of items.
pub fn iter_stream<I>(items: I) -> ItemStream<<I as IntoIterator>::Item>
where
    I: IntoIterator,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    futures::stream::iter(items.into_iter().map(Ok)).boxed()
}

/// Stream yielding exactly one item.
pub fn single_item<T: Send + 'static>(item: T) -> ItemStream<T> {
    iter_stream(std::iter::once(item))
}

/// Stream yielding nothing.
pub fn empty_stream<T: Send + 'static>() -> ItemStream<T> {
    futures::stream::empty().boxed()
}

/// Stream that fails immediately with the given error.
pub fn failed_stream<T: Send + 'static>(error: FlowError) -> ItemStream<T> {
    futures::stream::iter(std::iter::once(Err(error))).boxed()
}

/// Drain a stream into a `Vec`, stopping at the first failure.
pub async fn collect_stream<T: Send + 'static>(
    mut stream: ItemStream<T>,
) -> Result<Vec<T>, FlowError> {
    let mut items = Vec::new();
    while let Some(item) = stream.next().await {
        items.push(item?);
    }
    Ok(items)
}

/// Drain a stream for its side effects, stopping at the first failure.
pub async fn drain_stream<T: Send + 'static>(mut stream: ItemStream<T>) -> Result<(), FlowError> {
    while let Some(item) = stream.next().await {
        item?;
    }
    Ok(())
}
