//! Temporal combinators: time gates or delays the emission of items.
//!
//! Each active invocation owns at most one timer. Timers live inside the
//! output stream, so dropping the consumer cancels them along with any
//! collector task; nothing stays scheduled after cancellation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_stream::stream;
use futures::StreamExt;
use tokio::time::{interval, sleep_until, timeout as deadline, Instant, MissedTickBehavior};

use crate::error::FlowError;
use crate::flow::Flow;
use crate::task::TaskGuard;

fn require_interval(kind: &str, value: Duration) -> Result<(), FlowError> {
    if value.is_zero() {
        return Err(FlowError::configuration(format!(
            "{kind} interval must be non-zero"
        )));
    }
    Ok(())
}

/// Shift every item by a fixed duration.
pub fn delay<T>(duration: Duration) -> Flow<T, T>
where
    T: Send + 'static,
{
    Flow::new(format!("delay({duration:?})"), move |mut source| {
        Box::pin(stream! {
            while let Some(item) = source.next().await {
                tokio::time::sleep(duration).await;
                let failed = item.is_err();
                yield item;
                if failed {
                    return;
                }
            }
        })
    })
}

/// Trailing-edge debounce: each arrival re-arms the quiet timer and only the
/// last item of a burst is emitted, once `interval` passes with no newer
/// arrival. A pending item is flushed when the source ends.
pub fn debounce<T>(interval: Duration) -> Result<Flow<T, T>, FlowError>
where
    T: Send + 'static,
{
    require_interval("debounce", interval)?;
    Ok(Flow::new(
        format!("debounce({interval:?})"),
        move |mut source| {
            Box::pin(stream! {
                let mut pending: Option<T> = None;
                let mut deadline_at: Option<Instant> = None;
                loop {
                    tokio::select! {
                        biased;
                        item = source.next() => match item {
                            Some(Ok(value)) => {
                                pending = Some(value);
                                deadline_at = Some(Instant::now() + interval);
                            }
                            Some(Err(e)) => {
                                yield Err(e);
                                return;
                            }
                            None => {
                                if let Some(value) = pending.take() {
                                    yield Ok(value);
                                }
                                return;
                            }
                        },
                        // Single quiet timer, re-armed from the stored deadline.
                        _ = async {
                            if let Some(at) = deadline_at {
                                sleep_until(at).await;
                            }
                        }, if deadline_at.is_some() => {
                            deadline_at = None;
                            if let Some(value) = pending.take() {
                                yield Ok(value);
                            }
                        }
                    }
                }
            })
        },
    ))
}

/// Leading-edge throttle: at most one item per `interval`; items arriving
/// inside the window are dropped, not queued.
pub fn throttle<T>(interval: Duration) -> Result<Flow<T, T>, FlowError>
where
    T: Send + 'static,
{
    require_interval("throttle", interval)?;
    Ok(Flow::new(
        format!("throttle({interval:?})"),
        move |mut source| {
            Box::pin(stream! {
                let mut window_opens: Option<Instant> = None;
                while let Some(item) = source.next().await {
                    match item {
                        Ok(value) => {
                            let now = Instant::now();
                            if window_opens.map_or(true, |at| now >= at) {
                                window_opens = Some(now + interval);
                                yield Ok(value);
                            } else {
                                tracing::trace!("throttle dropped an item inside the window");
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

#[derive(Debug)]
struct SampleState<T> {
    latest: Option<Result<T, FlowError>>,
    fresh: bool,
    done: bool,
}

/// Emit the most recently seen item at fixed wall-clock ticks, independent
/// of the source's arrival rate. Ticks with no fresh item emit nothing; a
/// trailing item still goes out at the tick after the source ends.
pub fn sample<T>(period: Duration) -> Result<Flow<T, T>, FlowError>
where
    T: Send + Sync + 'static,
{
    require_interval("sample", period)?;
    Ok(Flow::new(format!("sample({period:?})"), move |mut source| {
        Box::pin(stream! {
            let state = Arc::new(Mutex::new(SampleState::<T> {
                latest: None,
                fresh: false,
                done: false,
            }));
            let shared = state.clone();
            let _collector = TaskGuard::spawn(async move {
                while let Some(item) = source.next().await {
                    let failed = item.is_err();
                    {
                        let mut guard = shared.lock().expect("sample state poisoned");
                        guard.latest = Some(item);
                        guard.fresh = true;
                        if failed {
                            guard.done = true;
                        }
                    }
                    if failed {
                        return;
                    }
                }
                shared.lock().expect("sample state poisoned").done = true;
            });

            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // first tick completes immediately

            loop {
                ticker.tick().await;
                let (sampled, finished) = {
                    let mut guard = state.lock().expect("sample state poisoned");
                    let sampled = if guard.fresh {
                        guard.fresh = false;
                        guard.latest.take()
                    } else {
                        None
                    };
                    (sampled, guard.done)
                };
                match sampled {
                    Some(Ok(value)) => yield Ok(value),
                    Some(Err(e)) => {
                        yield Err(e);
                        return;
                    }
                    None => {}
                }
                if finished {
                    return;
                }
            }
        })
    }))
}

/// Fail with [`FlowError::Timeout`] when the upstream does not produce its
/// next item within `duration`; the deadline re-arms per item, so a steady
/// multi-item stream never times out. The timeout is cancellation driven by
/// a timer: on expiry the upstream is dropped mid-pull.
pub fn timeout<T>(duration: Duration) -> Result<Flow<T, T>, FlowError>
where
    T: Send + 'static,
{
    require_interval("timeout", duration)?;
    Ok(Flow::new(
        format!("timeout({duration:?})"),
        move |mut source| {
            Box::pin(stream! {
                loop {
                    match deadline(duration, source.next()).await {
                        Ok(Some(item)) => {
                            let failed = item.is_err();
                            yield item;
                            if failed {
                                return;
                            }
                        }
                        Ok(None) => return,
                        Err(_elapsed) => {
                            yield Err(FlowError::Timeout(duration));
                            return;
                        }
                    }
                }
            })
        },
    ))
}

/// Convenience wrapper: `flow` with a per-item deadline on its output.
pub fn with_timeout<In, Out>(
    duration: Duration,
    flow: Flow<In, Out>,
) -> Result<Flow<In, Out>, FlowError>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    let gate = timeout::<Out>(duration)?;
    let name = format!("timeout({duration:?}, {})", flow.name());
    Ok(flow.pipe(gate).named(name))
}
