//! Stateless per-item combinators: mapping, filtering, slicing and
//! validation. None of these spawn tasks or own timers.

use std::sync::Arc;

use async_stream::stream;
use futures::StreamExt;

use crate::error::FlowError;
use crate::flow::Flow;
use crate::stream::ItemStream;

/// Apply a function to every item.
pub fn map<In, Out, F>(f: F) -> Flow<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
    F: Fn(In) -> Out + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Flow::new("map", move |source| {
        let f = f.clone();
        source.map(move |item| item.map(|value| f(value))).boxed()
    })
}

/// Keep only items matching the predicate.
pub fn filter<T, F>(predicate: F) -> Flow<T, T>
where
    T: Send + 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    let predicate = Arc::new(predicate);
    Flow::new("filter", move |source| {
        let predicate = predicate.clone();
        source
            .filter(move |item| {
                let keep = match item {
                    Ok(value) => predicate(value),
                    // Failures always pass through to terminate downstream.
                    Err(_) => true,
                };
                futures::future::ready(keep)
            })
            .boxed()
    })
}

/// Expand every item into a sub-stream and flatten the results in order.
pub fn flat_map<In, Out, F>(f: F) -> Flow<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
    F: Fn(In) -> ItemStream<Out> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Flow::new("flat_map", move |mut source| {
        let f = f.clone();
        Box::pin(stream! {
            while let Some(item) = source.next().await {
                match item {
                    Ok(value) => {
                        let mut inner = f(value);
                        while let Some(sub) = inner.next().await {
                            let failed = sub.is_err();
                            yield sub;
                            if failed {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        })
    })
}

/// Flat-map with access to a context argument alongside the current item.
///
/// The context passed to `f` is the current item itself: branches see a
/// flattened view of the chain, not the upstream value that produced it.
/// That flattening policy is the contract of this combinator.
pub fn flat_map_ctx<T, Out, F>(f: F) -> Flow<T, Out>
where
    T: Clone + Send + 'static,
    Out: Send + 'static,
    F: Fn(T, T) -> ItemStream<Out> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    flat_map(move |item: T| f(item.clone(), item)).named("flat_map_ctx")
}

/// Pass through at most the first `n` items.
pub fn take<T>(n: usize) -> Flow<T, T>
where
    T: Send + 'static,
{
    Flow::new(format!("take({n})"), move |source| source.take(n).boxed())
}

/// Discard the first `n` items. Failures are never discarded.
pub fn skip<T>(n: usize) -> Flow<T, T>
where
    T: Send + 'static,
{
    Flow::new(format!("skip({n})"), move |source| {
        let mut remaining = n;
        source
            .filter(move |item| {
                let keep = match item {
                    Ok(_) if remaining > 0 => {
                        remaining -= 1;
                        false
                    }
                    _ => true,
                };
                futures::future::ready(keep)
            })
            .boxed()
    })
}

/// Pass items through until the predicate matches; the matching item is the
/// last one emitted.
pub fn until<T, F>(predicate: F) -> Flow<T, T>
where
    T: Send + 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    let predicate = Arc::new(predicate);
    Flow::new("until", move |mut source| {
        let predicate = predicate.clone();
        Box::pin(stream! {
            while let Some(item) = source.next().await {
                match item {
                    Ok(value) => {
                        let done = predicate(&value);
                        yield Ok(value);
                        if done {
                            return;
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        })
    })
}

/// Validate every item; a rejected item terminates the stream with a
/// [`FlowError::Validation`] carrying `message`.
pub fn guard<T, F>(predicate: F, message: impl Into<String>) -> Flow<T, T>
where
    T: std::fmt::Debug + Send + 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    let predicate = Arc::new(predicate);
    let message = message.into();
    Flow::new("guard", move |mut source| {
        let predicate = predicate.clone();
        let message = message.clone();
        Box::pin(stream! {
            while let Some(item) = source.next().await {
                match item {
                    Ok(value) if predicate(&value) => yield Ok(value),
                    Ok(value) => {
                        yield Err(FlowError::validation(format!("{message}: {value:?}")));
                        return;
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        })
    })
}

/// Collect the whole input into a single `Vec` item.
pub fn collect_all<T>() -> Flow<T, Vec<T>>
where
    T: Send + 'static,
{
    Flow::new("collect_all", |mut source| {
        Box::pin(stream! {
            let mut items = Vec::new();
            while let Some(item) = source.next().await {
                match item {
                    Ok(value) => items.push(value),
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
            yield Ok(items);
        })
    })
}

/// Observe every item with a side effect without changing the stream.
pub fn tap<T, F>(f: F) -> Flow<T, T>
where
    T: Send + 'static,
    F: Fn(&T) + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Flow::new("tap", move |source| {
        let f = f.clone();
        source
            .map(move |item| {
                if let Ok(value) = &item {
                    f(value);
                }
                item
            })
            .boxed()
    })
}
