//! Flow combinators, grouped by the coordination they need.
//!
//! Every combinator is a plain constructor returning a [`crate::flow::Flow`];
//! there is no shared base type, combinators compose structurally via
//! [`crate::flow::Flow::pipe`]. Constructors with invalid parameters return
//! a configuration error eagerly instead of failing at run time.

pub mod aggregation;
pub mod basic;
pub mod fan_in;
pub mod observability;
pub mod resilience;
pub mod temporal;

pub use aggregation::{batch, distinct, distinct_by, pairwise, scan, window};
pub use basic::{
    collect_all, filter, flat_map, flat_map_ctx, guard, map, skip, take, tap, until,
};
pub use fan_in::{
    chain, combine_latest, merge, parallel, parallel_successful, race, zip, PartialResults,
};
pub use observability::{inspect, log, measured};
pub use resilience::{
    circuit_breaker, exponential_backoff, fixed_backoff, if_then, recover, retry, BackoffFn,
    BreakerSettings,
};
pub use temporal::{debounce, delay, sample, throttle, timeout, with_timeout};
