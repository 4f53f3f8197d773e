//! Sequential accumulation combinators: batching, scans and windowing.
//! Purely single-consumer state machines; no concurrent producers here.

use std::collections::HashSet;
use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Arc;

use async_stream::stream;
use futures::StreamExt;

use crate::error::FlowError;
use crate::flow::Flow;

/// Group items into `Vec`s of `size`; a final partial batch is emitted as-is.
pub fn batch<T>(size: usize) -> Result<Flow<T, Vec<T>>, FlowError>
where
    T: Send + 'static,
{
    if size == 0 {
        return Err(FlowError::configuration("batch size must be at least 1"));
    }
    Ok(Flow::new(format!("batch({size})"), move |mut source| {
        Box::pin(stream! {
            let mut current = Vec::with_capacity(size);
            while let Some(item) = source.next().await {
                match item {
                    Ok(value) => {
                        current.push(value);
                        if current.len() >= size {
                            yield Ok(std::mem::replace(&mut current, Vec::with_capacity(size)));
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
            if !current.is_empty() {
                yield Ok(current);
            }
        })
    }))
}

/// Running accumulation emitting every intermediate value, the initial one
/// included.
pub fn scan<T, Acc, F>(initial: Acc, f: F) -> Flow<T, Acc>
where
    T: Send + 'static,
    Acc: Clone + Send + Sync + 'static,
    F: Fn(Acc, T) -> Acc + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Flow::new("scan", move |mut source| {
        let f = f.clone();
        let initial = initial.clone();
        Box::pin(stream! {
            let mut accumulator = initial;
            yield Ok(accumulator.clone());
            while let Some(item) = source.next().await {
                match item {
                    Ok(value) => {
                        accumulator = f(accumulator, value);
                        yield Ok(accumulator.clone());
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

/// Drop items whose key has been seen before.
pub fn distinct_by<T, K, F>(key_fn: F) -> Flow<T, T>
where
    T: Send + 'static,
    K: Eq + Hash + Send + 'static,
    F: Fn(&T) -> K + Send + Sync + 'static,
{
    let key_fn = Arc::new(key_fn);
    Flow::new("distinct_by", move |source| {
        let key_fn = key_fn.clone();
        let mut seen = HashSet::new();
        source
            .filter(move |item| {
                let keep = match item {
                    Ok(value) => seen.insert(key_fn(value)),
                    Err(_) => true,
                };
                futures::future::ready(keep)
            })
            .boxed()
    })
}

/// Drop repeated items.
pub fn distinct<T>() -> Flow<T, T>
where
    T: Clone + Eq + Hash + Send + 'static,
{
    distinct_by(|item: &T| item.clone()).named("distinct")
}

/// Emit `(previous, current)` for every item after the first.
pub fn pairwise<T>() -> Flow<T, (T, T)>
where
    T: Clone + Send + 'static,
{
    Flow::new("pairwise", |mut source: crate::stream::ItemStream<T>| {
        Box::pin(stream! {
            let mut previous: Option<T> = None;
            while let Some(item) = source.next().await {
                match item {
                    Ok(value) => {
                        if let Some(prev) = previous.replace(value.clone()) {
                            yield Ok((prev, value));
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

/// Sliding windows of `size` items advancing by `step`.
pub fn window<T>(size: usize, step: usize) -> Result<Flow<T, Vec<T>>, FlowError>
where
    T: Clone + Send + 'static,
{
    if size == 0 || step == 0 {
        return Err(FlowError::configuration(
            "window size and step must be at least 1",
        ));
    }
    Ok(Flow::new(
        format!("window({size}, step={step})"),
        move |mut source| {
            Box::pin(stream! {
                let mut window: VecDeque<T> = VecDeque::with_capacity(size + 1);
                let mut seen: usize = 0;
                while let Some(item) = source.next().await {
                    match item {
                        Ok(value) => {
                            window.push_back(value);
                            if window.len() > size {
                                window.pop_front();
                            }
                            seen += 1;
                            if window.len() == size && (seen - size) % step == 0 {
                                yield Ok(window.iter().cloned().collect());
                            }
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            })
        },
    ))
}
