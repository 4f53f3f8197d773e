//! Factory constructors that lift values, functions, collections and
//! external event sources into flows.
//!
//! Factories are restartable: every [`Flow::run`] hands out a fresh stream
//! instance. The streams themselves remain single-pass. Malformed arguments
//! are rejected here, at construction time, never once a stream is running.

use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;

use crate::error::FlowError;
use crate::flow::Flow;
use crate::stream::ItemStream;

/// Default capacity of the queue between an event source's push side and its
/// pull side.
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 256;

/// Flow yielding a single value, ignoring its input.
pub fn from_value<In, T>(value: T) -> Flow<In, T>
where
    In: Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    Flow::new("from_value", move |_source| {
        crate::stream::single_item(value.clone())
    })
}

/// Flow applying a synchronous function to every input item.
pub fn from_sync_fn<In, Out, F>(f: F) -> Flow<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
    F: Fn(In) -> Out + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Flow::new("from_sync_fn", move |source| {
        let f = f.clone();
        source.map(move |item| item.map(|value| f(value))).boxed()
    })
}

/// Flow applying an async function to every input item.
pub fn from_async_fn<In, Out, F, Fut>(f: F) -> Flow<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
    F: Fn(In) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Out, FlowError>> + Send,
{
    let f = Arc::new(f);
    Flow::new("from_async_fn", move |mut source| {
        let f = f.clone();
        Box::pin(stream! {
            while let Some(item) = source.next().await {
                match item {
                    Ok(value) => yield f(value).await,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        })
    })
}

/// Finite source flow over a cloneable collection, ignoring its input.
pub fn from_iterable<In, I>(items: I) -> Flow<In, <I as IntoIterator>::Item>
where
    In: Send + 'static,
    I: IntoIterator + Clone + Send + Sync + 'static,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    Flow::new("from_iterable", move |_source| {
        crate::stream::iter_stream(items.clone())
    })
}

/// Source flow repeating `value`; `times: None` repeats indefinitely.
pub fn repeat<In, T>(value: T, times: Option<usize>) -> Flow<In, T>
where
    In: Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    Flow::new("repeat", move |_source| {
        let value = value.clone();
        match times {
            Some(n) => crate::stream::iter_stream(std::iter::repeat(value).take(n)),
            None => futures::stream::repeat_with(move || Ok(value.clone())).boxed(),
        }
    })
}

/// Integer source counting from `start` towards `stop` by `step`.
pub fn range<In>(start: i64, stop: i64, step: i64) -> Result<Flow<In, i64>, FlowError>
where
    In: Send + 'static,
{
    if step == 0 {
        return Err(FlowError::configuration("range step must be non-zero"));
    }
    Ok(Flow::new(
        format!("range({start}, {stop}, {step})"),
        move |_source| {
            let values = std::iter::successors(Some(start), move |&v| Some(v + step))
                .take_while(move |&v| if step > 0 { v < stop } else { v > stop });
            crate::stream::iter_stream(values)
        },
    ))
}

/// Source flow producing no items.
pub fn empty<In, T>() -> Flow<In, T>
where
    In: Send + 'static,
    T: Send + 'static,
{
    Flow::new("empty", |_source| crate::stream::empty_stream())
}

/// Flow passing every input item through unchanged.
pub fn identity<T>() -> Flow<T, T>
where
    T: Send + 'static,
{
    Flow::new("identity", |source| source)
}

/// Flow prepending `items` before the input stream.
pub fn start_with<T>(items: Vec<T>) -> Flow<T, T>
where
    T: Clone + Send + Sync + 'static,
{
    Flow::new("start_with", move |source| {
        crate::stream::iter_stream(items.clone()).chain(source).boxed()
    })
}

/// A push-based producer of events that can be adapted into a pull-based
/// source flow.
///
/// Subscriptions are exclusive: a source hands out its single pull stream
/// once and reports further attempts as configuration errors.
#[async_trait]
pub trait EventSource: Send + Sync {
    type Event: Send + 'static;

    /// Identifier used in diagnostics.
    fn id(&self) -> &str;

    /// Take the pull side of this source.
    async fn subscribe(&self) -> Result<ItemStream<Self::Event>, FlowError>;
}

/// Push handle paired with a [`ChannelEventSource`].
///
/// `emit` awaits on the bounded queue, so a slow consumer applies
/// backpressure to the pushing side instead of buffering without bound.
pub struct EventSourceHandle<T> {
    sender: mpsc::Sender<Result<T, FlowError>>,
}

impl<T: Send + 'static> EventSourceHandle<T> {
    /// Push one event; waits while the queue is full.
    pub async fn emit(&self, event: T) -> Result<(), FlowError> {
        self.sender
            .send(Ok(event))
            .await
            .map_err(|_| FlowError::execution("event source subscriber dropped"))
    }

    /// Push a failure; the subscriber observes it as the stream's terminal
    /// error.
    pub async fn fail(&self, error: FlowError) -> Result<(), FlowError> {
        self.sender
            .send(Err(error))
            .await
            .map_err(|_| FlowError::execution("event source subscriber dropped"))
    }
}

/// In-process event source backed by a bounded queue.
pub struct ChannelEventSource<T> {
    id: String,
    receiver: Mutex<Option<mpsc::Receiver<Result<T, FlowError>>>>,
}

impl<T: Send + 'static> ChannelEventSource<T> {
    /// Create a source and the handle used to push events into it.
    ///
    /// Dropping the handle ends the subscriber's stream.
    pub fn new(
        id: impl Into<String>,
        capacity: usize,
    ) -> Result<(Self, EventSourceHandle<T>), FlowError> {
        if capacity == 0 {
            return Err(FlowError::configuration(
                "event source queue capacity must be at least 1",
            ));
        }
        let (sender, receiver) = mpsc::channel(capacity);
        Ok((
            Self {
                id: id.into(),
                receiver: Mutex::new(Some(receiver)),
            },
            EventSourceHandle { sender },
        ))
    }
}

#[async_trait]
impl<T: Send + 'static> EventSource for ChannelEventSource<T> {
    type Event = T;

    fn id(&self) -> &str {
        &self.id
    }

    async fn subscribe(&self) -> Result<ItemStream<T>, FlowError> {
        let receiver = self.receiver.lock().await.take().ok_or_else(|| {
            FlowError::configuration(format!("event source {} already subscribed", self.id))
        })?;
        Ok(ReceiverStream::new(receiver).boxed())
    }
}

/// Adapt a push-based [`EventSource`] into a source flow.
pub fn from_event_source<In, S>(source: S) -> Flow<In, S::Event>
where
    In: Send + 'static,
    S: EventSource + 'static,
{
    let source = Arc::new(source);
    let name = format!("from_event_source({})", source.id());
    Flow::new(name, move |_input| {
        let source = source.clone();
        Box::pin(stream! {
            let mut events = match source.subscribe().await {
                Ok(events) => events,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            while let Some(event) = events.next().await {
                let failed = event.is_err();
                yield event;
                if failed {
                    return;
                }
            }
        })
    })
}
