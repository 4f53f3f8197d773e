//! The `Flow` value: a named, composable description of a stream
//! transformation.
//!
//! A flow is pure description; running it wires the transformation onto a
//! source stream but performs no work until the output is polled. Composition
//! with [`Flow::pipe`] is associative and never consumes either side eagerly.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::combinator::basic;
use crate::error::FlowError;
use crate::stream::{collect_stream, ItemStream};

type Transform<In, Out> = Arc<dyn Fn(ItemStream<In>) -> ItemStream<Out> + Send + Sync>;

/// A named transformation from one item stream to another.
///
/// Flows are cheap to clone and immutable; every combinator in this crate is
/// a plain constructor returning one. The name records the combinator chain
/// for diagnostics and shows up in `tracing` events and stats labels.
pub struct Flow<In, Out> {
    name: Arc<str>,
    transform: Transform<In, Out>,
}

impl<In, Out> Clone for Flow<In, Out> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            transform: self.transform.clone(),
        }
    }
}

impl<In, Out> fmt::Debug for Flow<In, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow").field("name", &self.name).finish()
    }
}

impl<In, Out> Flow<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    /// Wrap a stream transformation under a display name.
    pub fn new<F>(name: impl Into<Arc<str>>, transform: F) -> Self
    where
        F: Fn(ItemStream<In>) -> ItemStream<Out> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            transform: Arc::new(transform),
        }
    }

    /// Display name of this flow, recording its combinator chain.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Relabel the flow without changing its behavior.
    pub fn named(self, name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            transform: self.transform,
        }
    }

    /// Apply the transformation to a source stream.
    ///
    /// Nothing is pulled from `source` until the returned stream is polled.
    pub fn run(&self, source: ItemStream<In>) -> ItemStream<Out> {
        (self.transform)(source)
    }

    /// Compose: feed this flow's output into `next`.
    pub fn pipe<Next>(self, next: Flow<Out, Next>) -> Flow<In, Next>
    where
        Next: Send + 'static,
    {
        let name = format!("{} >> {}", self.name, next.name);
        Flow::new(name, move |source| next.run(self.run(source)))
    }

    /// Map a function over the output items.
    pub fn map<F, New>(self, f: F) -> Flow<In, New>
    where
        F: Fn(Out) -> New + Send + Sync + 'static,
        New: Send + 'static,
    {
        self.pipe(basic::map(f))
    }

    /// Keep only output items matching the predicate.
    pub fn filter<F>(self, predicate: F) -> Flow<In, Out>
    where
        F: Fn(&Out) -> bool + Send + Sync + 'static,
    {
        self.pipe(basic::filter(predicate))
    }

    /// Expand each output item into a sub-stream and flatten the results.
    pub fn flat_map<F, New>(self, f: F) -> Flow<In, New>
    where
        F: Fn(Out) -> ItemStream<New> + Send + Sync + 'static,
        New: Send + 'static,
    {
        self.pipe(basic::flat_map(f))
    }

    /// Run over `source` and collect the complete output.
    pub async fn collect(&self, source: ItemStream<In>) -> Result<Vec<Out>, FlowError> {
        collect_stream(self.run(source)).await
    }

    /// Run over `source`, applying `f` to every output item.
    pub async fn for_each<F, Fut>(&self, source: ItemStream<In>, f: F) -> Result<(), FlowError>
    where
        F: Fn(Out) -> Fut,
        Fut: Future<Output = ()>,
    {
        use futures::StreamExt;
        let mut output = self.run(source);
        while let Some(item) = output.next().await {
            f(item?).await;
        }
        Ok(())
    }
}
