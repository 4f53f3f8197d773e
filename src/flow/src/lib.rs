//! Composable stream-processing engine.
//!
//! A [`Flow`] is a named, lazy transformation from one item stream to
//! another. Factories lift values, functions, collections and push-based
//! event sources into flows; combinators wrap flows with fan-in
//! coordination, resilience and time-based gating. Pipelines drive a
//! composed chain to completion over tokio tasks with drop-based,
//! transitive cancellation.

pub mod combinator;
pub mod error;
pub mod factory;
pub mod flow;
pub mod pipeline;
pub mod stats;
pub mod stream;

mod task;

pub use combinator::{BackoffFn, BreakerSettings, PartialResults};
pub use error::FlowError;
pub use factory::{ChannelEventSource, EventSource, EventSourceHandle};
pub use flow::Flow;
pub use pipeline::{Pipeline, PipelineError};
pub use stats::{FlowStats, FlowStatsSnapshot};
pub use stream::{collect_stream, drain_stream, empty_stream, iter_stream, single_item, ItemStream};
