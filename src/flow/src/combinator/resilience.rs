//! Resilience combinators: retry, circuit breaking and error recovery.
//!
//! These wrap a flow to change its failure behavior without changing its
//! data semantics. The wrapped flow is always re-run from a single-item
//! replay stream, so the current input item is the replay point and nothing
//! more has to be buffered for an attempt to be repeatable.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::error::FlowError;
use crate::flow::Flow;
use crate::stream::single_item;

/// Caller-supplied backoff schedule: attempt number (starting at 1) to the
/// delay slept before the next attempt.
pub type BackoffFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Exponential backoff doubling from `base` per attempt.
pub fn exponential_backoff(base: Duration) -> BackoffFn {
    Arc::new(move |attempt| base.saturating_mul(1u32 << attempt.saturating_sub(1).min(16)))
}

/// Constant backoff.
pub fn fixed_backoff(delay: Duration) -> BackoffFn {
    Arc::new(move |_attempt| delay)
}

/// Re-run `flow` on failure, up to `max_attempts` total attempts per input
/// item, sleeping `backoff(attempt)` between attempts.
///
/// An attempt only counts as successful once the wrapped flow has completed
/// over the item; its outputs are buffered and emitted after that, so a
/// failing attempt never leaks partial output downstream. Exhausting all
/// attempts terminates the stream with [`FlowError::ExhaustedRetries`]
/// wrapping the final cause. Dropping the consumer cancels the in-flight
/// attempt and any pending backoff sleep immediately.
pub fn retry<In, Out>(
    max_attempts: u32,
    backoff: BackoffFn,
    flow: Flow<In, Out>,
) -> Result<Flow<In, Out>, FlowError>
where
    In: Clone + Send + Sync + 'static,
    Out: Send + 'static,
{
    if max_attempts == 0 {
        return Err(FlowError::configuration(
            "retry requires at least one attempt",
        ));
    }
    let name = format!("retry({max_attempts}, {})", flow.name());
    Ok(Flow::new(name, move |mut source: crate::stream::ItemStream<In>| {
        let flow = flow.clone();
        let backoff = backoff.clone();
        Box::pin(stream! {
            while let Some(item) = source.next().await {
                let item = match item {
                    Ok(value) => value,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                let mut attempt = 1u32;
                let outputs = loop {
                    match flow.collect(single_item(item.clone())).await {
                        Ok(outputs) => break Ok(outputs),
                        Err(e) if attempt < max_attempts => {
                            let delay = backoff(attempt);
                            tracing::debug!(
                                flow = flow.name(),
                                attempt,
                                error = %e,
                                delay_ms = delay.as_millis() as u64,
                                "retrying after failure"
                            );
                            sleep(delay).await;
                            attempt += 1;
                        }
                        Err(e) => break Err(FlowError::exhausted_retries(max_attempts, e)),
                    }
                };

                match outputs {
                    Ok(outputs) => {
                        for output in outputs {
                            yield Ok(output);
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        })
    }))
}

/// Circuit breaker tuning knobs.
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    /// Failures within `window` that trip the breaker.
    pub failure_threshold: u32,
    /// Rolling window over which failures are counted.
    pub window: Duration,
    /// Time the breaker stays open before admitting a probe.
    pub cooldown: Duration,
}

impl BreakerSettings {
    pub fn new(failure_threshold: u32, window: Duration, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            window,
            cooldown,
        }
    }

    fn validate(&self) -> Result<(), FlowError> {
        if self.failure_threshold == 0 {
            return Err(FlowError::configuration(
                "breaker failure threshold must be at least 1",
            ));
        }
        if self.window.is_zero() || self.cooldown.is_zero() {
            return Err(FlowError::configuration(
                "breaker window and cooldown must be non-zero",
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
enum CircuitState {
    Closed,
    Open { opened_at: Instant },
    HalfOpen { probe_in_flight: bool },
}

/// How an admitted call must be reported back to the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

/// The breaker state machine, exclusively owned by one combinator instance.
///
/// `Closed` passes calls through and counts failures in a rolling window;
/// hitting the threshold opens the breaker. `Open` rejects calls until the
/// cooldown elapses, then `HalfOpen` admits exactly one probe: its success
/// closes the breaker, its failure re-opens it with a fresh cooldown. Calls
/// racing the probe are rejected.
#[derive(Debug)]
struct CircuitBreaker {
    settings: BreakerSettings,
    state: CircuitState,
    failures: VecDeque<Instant>,
}

impl CircuitBreaker {
    fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            state: CircuitState::Closed,
            failures: VecDeque::new(),
        }
    }

    fn admit(&mut self, now: Instant) -> Result<Admission, FlowError> {
        match &mut self.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open { opened_at } => {
                if now.duration_since(*opened_at) >= self.settings.cooldown {
                    self.state = CircuitState::HalfOpen {
                        probe_in_flight: true,
                    };
                    tracing::info!("circuit breaker half-open; admitting probe");
                    Ok(Admission::Probe)
                } else {
                    Err(FlowError::CircuitOpen)
                }
            }
            CircuitState::HalfOpen { probe_in_flight } => {
                if *probe_in_flight {
                    // The probe slot is exclusive.
                    Err(FlowError::CircuitOpen)
                } else {
                    *probe_in_flight = true;
                    Ok(Admission::Probe)
                }
            }
        }
    }

    fn on_success(&mut self, admission: Admission) {
        match admission {
            Admission::Probe => {
                tracing::info!("circuit breaker probe succeeded; closing");
                self.state = CircuitState::Closed;
                self.failures.clear();
            }
            Admission::Normal => {
                self.failures.clear();
            }
        }
    }

    fn on_failure(&mut self, admission: Admission, now: Instant) {
        match admission {
            Admission::Probe => {
                tracing::warn!("circuit breaker probe failed; re-opening");
                self.state = CircuitState::Open { opened_at: now };
            }
            Admission::Normal => {
                self.failures.push_back(now);
                while let Some(oldest) = self.failures.front() {
                    if now.duration_since(*oldest) > self.settings.window {
                        self.failures.pop_front();
                    } else {
                        break;
                    }
                }
                if self.failures.len() as u32 >= self.settings.failure_threshold {
                    tracing::warn!(
                        failures = self.failures.len(),
                        "circuit breaker tripped open"
                    );
                    self.state = CircuitState::Open { opened_at: now };
                    self.failures.clear();
                }
            }
        }
    }
}

/// Wrap `flow` behind a circuit breaker.
///
/// Each input item is one call. The breaker state belongs to this combinator
/// instance and persists across runs of the returned flow, so repeated
/// invocations keep accumulating failure history; it is never shared with
/// any other breaker instance.
pub fn circuit_breaker<In, Out>(
    settings: BreakerSettings,
    flow: Flow<In, Out>,
) -> Result<Flow<In, Out>, FlowError>
where
    In: Clone + Send + Sync + 'static,
    Out: Send + 'static,
{
    settings.validate()?;
    let name = format!("circuit_breaker({})", flow.name());
    let breaker = Arc::new(Mutex::new(CircuitBreaker::new(settings)));
    Ok(Flow::new(name, move |mut source| {
        let flow = flow.clone();
        let breaker = breaker.clone();
        Box::pin(stream! {
            while let Some(item) = source.next().await {
                let item = match item {
                    Ok(value) => value,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                let admission = match breaker.lock().await.admit(Instant::now()) {
                    Ok(admission) => admission,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                match flow.collect(single_item(item)).await {
                    Ok(outputs) => {
                        breaker.lock().await.on_success(admission);
                        for output in outputs {
                            yield Ok(output);
                        }
                    }
                    Err(e) => {
                        breaker.lock().await.on_failure(admission, Instant::now());
                        yield Err(e);
                        return;
                    }
                }
            }
        })
    }))
}

/// Swallow the stream's first (and only) fatal error, yielding the handler's
/// fallback item instead and ending cleanly.
pub fn recover<T, F>(handler: F) -> Flow<T, T>
where
    T: Send + 'static,
    F: Fn(FlowError) -> T + Send + Sync + 'static,
{
    let handler = Arc::new(handler);
    Flow::new("recover", move |mut source| {
        let handler = handler.clone();
        Box::pin(stream! {
            while let Some(item) = source.next().await {
                match item {
                    Ok(value) => yield Ok(value),
                    Err(e) => {
                        tracing::debug!(error = %e, "recovering from stream failure");
                        yield Ok(handler(e));
                        return;
                    }
                }
            }
        })
    })
}

/// Route each item through `then_flow` when the predicate matches, through
/// `else_flow` otherwise; with no `else_flow` non-matching items are dropped.
pub fn if_then<In, Out, P>(
    predicate: P,
    then_flow: Flow<In, Out>,
    else_flow: Option<Flow<In, Out>>,
) -> Flow<In, Out>
where
    In: Clone + Send + Sync + 'static,
    Out: Send + 'static,
    P: Fn(&In) -> bool + Send + Sync + 'static,
{
    let predicate = Arc::new(predicate);
    let name = match &else_flow {
        Some(else_flow) => format!("if_then({}, {})", then_flow.name(), else_flow.name()),
        None => format!("if_then({})", then_flow.name()),
    };
    Flow::new(name, move |mut source| {
        let predicate = predicate.clone();
        let then_flow = then_flow.clone();
        let else_flow = else_flow.clone();
        Box::pin(stream! {
            while let Some(item) = source.next().await {
                let item = match item {
                    Ok(value) => value,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                let branch = if predicate(&item) {
                    Some(&then_flow)
                } else {
                    else_flow.as_ref()
                };
                let Some(branch) = branch else {
                    continue;
                };
                let mut output = branch.run(single_item(item));
                while let Some(out) = output.next().await {
                    let failed = out.is_err();
                    yield out;
                    if failed {
                        return;
                    }
                }
            }
        })
    })
}
