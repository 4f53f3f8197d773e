//! Pipeline driver: pairs a flow chain with its source and pumps the output
//! into a bounded channel a consumer can drain.
//!
//! The driver is the only execution surface applications need: construct
//! flows, wire a pipeline, `start` it, drain `take_output`, `close` it.
//! Internal state (queues, breaker state, timers) never leaks out of the
//! running chain.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use futures::StreamExt;

use crate::error::FlowError;
use crate::flow::Flow;
use crate::stream::ItemStream;
use crate::task::DEFAULT_CHANNEL_CAPACITY;

/// Errors from pipeline lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("pipeline already started: {0}")]
    AlreadyStarted(String),
    #[error("pipeline driver panicked: {0}")]
    Driver(String),
}

/// A named, one-shot execution of a flow chain.
pub struct Pipeline<T> {
    id: String,
    stream: Option<ItemStream<T>>,
    output: Option<mpsc::Receiver<Result<T, FlowError>>>,
    output_tx: Option<mpsc::Sender<Result<T, FlowError>>>,
    stop: Option<watch::Sender<bool>>,
    driver: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Wrap an already-built output stream.
    pub fn new(id: impl Into<String>, stream: ItemStream<T>) -> Self {
        let (output_tx, output_rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        Self {
            id: id.into(),
            stream: Some(stream),
            output: Some(output_rx),
            output_tx: Some(output_tx),
            stop: None,
            driver: None,
        }
    }

    /// Wire `flow` onto `source` and wrap the result.
    pub fn from_flow<In: Send + 'static>(
        id: impl Into<String>,
        flow: &Flow<In, T>,
        source: ItemStream<In>,
    ) -> Self {
        Self::new(id, flow.run(source))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Hand over the consumer end of the output channel.
    pub fn take_output(&mut self) -> Option<mpsc::Receiver<Result<T, FlowError>>> {
        self.output.take()
    }

    /// Spawn the driver task pumping the chain into the output channel.
    ///
    /// The driver stops when the chain ends, after forwarding a terminal
    /// failure, when the output consumer goes away, or when [`close`] asks
    /// it to.
    ///
    /// [`close`]: Pipeline::close
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.driver.is_some() {
            return Err(PipelineError::AlreadyStarted(self.id.clone()));
        }
        let mut stream = self
            .stream
            .take()
            .ok_or_else(|| PipelineError::AlreadyStarted(self.id.clone()))?;
        let output = self
            .output_tx
            .take()
            .ok_or_else(|| PipelineError::AlreadyStarted(self.id.clone()))?;

        let (stop_tx, mut stop_rx) = watch::channel(false);
        self.stop = Some(stop_tx);
        let id = self.id.clone();
        tracing::info!(pipeline = %id, "pipeline starting");

        self.driver = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => {
                        tracing::info!(pipeline = %id, "pipeline stop requested");
                        return;
                    }
                    item = stream.next() => match item {
                        Some(item) => {
                            let failed = item.is_err();
                            if output.send(item).await.is_err() {
                                tracing::debug!(pipeline = %id, "output consumer dropped");
                                return;
                            }
                            if failed {
                                tracing::warn!(pipeline = %id, "pipeline terminated by failure");
                                return;
                            }
                        }
                        None => {
                            tracing::info!(pipeline = %id, "pipeline completed");
                            return;
                        }
                    }
                }
            }
        }));
        Ok(())
    }

    /// Ask the driver to stop and wait for it. Idempotent: closing twice is
    /// a no-op.
    pub async fn close(&mut self) -> Result<(), PipelineError> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(true);
        }
        match self.driver.take() {
            Some(driver) => driver
                .await
                .map_err(|e| PipelineError::Driver(e.to_string())),
            None => Ok(()),
        }
    }

    /// True once the driver has finished (or was never started).
    pub fn is_finished(&self) -> bool {
        self.driver.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl<T> Drop for Pipeline<T> {
    fn drop(&mut self) {
        if let Some(driver) = &self.driver {
            driver.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinator::basic;
    use crate::stream::iter_stream;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn pipeline_pumps_flow_output() {
        let flow = basic::map(|v: i64| v * 2);
        let mut pipeline = Pipeline::from_flow("double", &flow, iter_stream(vec![1, 2, 3]));
        let mut output = pipeline.take_output().expect("output");
        pipeline.start().expect("start");

        let mut got = Vec::new();
        while let Some(item) = timeout(Duration::from_secs(2), output.recv())
            .await
            .expect("recv timeout")
        {
            got.push(item.expect("item"));
        }
        assert_eq!(got, vec![2, 4, 6]);

        pipeline.close().await.expect("close");
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let flow = basic::map(|v: i64| v);
        let mut pipeline =
            Pipeline::from_flow("idempotent_close", &flow, iter_stream(vec![1]));
        pipeline.start().expect("start");
        pipeline.close().await.expect("first close");
        pipeline.close().await.expect("second close");
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let flow = basic::map(|v: i64| v);
        let mut pipeline = Pipeline::from_flow("double_start", &flow, iter_stream(vec![1]));
        pipeline.start().expect("start");
        let err = pipeline.start().unwrap_err();
        assert!(matches!(err, PipelineError::AlreadyStarted(_)));
        pipeline.close().await.expect("close");
    }
}
