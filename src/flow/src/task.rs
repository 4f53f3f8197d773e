//! Producer-task ownership and fan-in queue plumbing.
//!
//! Fan-in combinators spawn one task per source; all producers push into a
//! single bounded queue owned by the consuming stream. Dropping the consumer
//! drops its [`TaskGuard`]s, which aborts every child task, so cancellation
//! propagates top-down without any explicit signalling. Abort is idempotent.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use futures::StreamExt;

use crate::error::FlowError;
use crate::stream::ItemStream;

/// Default capacity of fan-in queues and pipeline output channels.
pub(crate) const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Owns a spawned child task and aborts it when dropped.
///
/// The guard is how a combinator's output stream keeps its producers on a
/// leash: the stream holds the guards, the consumer holds the stream, and
/// dropping either tears the whole tree down.
pub(crate) struct TaskGuard {
    handle: Option<JoinHandle<()>>,
}

impl TaskGuard {
    pub(crate) fn spawn<F>(future: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        Self {
            handle: Some(tokio::spawn(future)),
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Abort the task and wait for it to actually terminate.
    pub(crate) async fn shutdown(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

/// Spawn a producer that drains `source` into the shared fan-in queue.
///
/// Per-producer end-of-stream is signalled by dropping the sender clone when
/// the task returns; the queue as a whole ends once every producer is gone.
/// A failure is forwarded once and then the producer stops, so no item of
/// this source can trail its terminal marker. A closed queue (consumer gone)
/// stops the producer at its next push.
pub(crate) fn spawn_producer<T: Send + 'static>(
    mut source: ItemStream<T>,
    queue: mpsc::Sender<Result<T, FlowError>>,
) -> TaskGuard {
    TaskGuard::spawn(async move {
        while let Some(item) = source.next().await {
            let failed = item.is_err();
            if queue.send(item).await.is_err() {
                tracing::trace!("fan-in consumer dropped; producer stopping");
                return;
            }
            if failed {
                return;
            }
        }
    })
}
