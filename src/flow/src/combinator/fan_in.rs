//! Fan-in combinators: coordinating several concurrently-running sources
//! into one output stream.
//!
//! Every combinator here follows the same failure policy: the first failure
//! from any branch cancels every sibling task and terminates the output.
//! Per-source ordering is always preserved; cross-source ordering is only
//! what each combinator's contract states (arrival order for `merge`,
//! lockstep for `zip`, input-index order for `parallel`).

use async_stream::stream;
use futures::StreamExt;
use tokio::sync::{mpsc, watch};

use crate::error::FlowError;
use crate::flow::Flow;
use crate::stream::{collect_stream, empty_stream, iter_stream, single_item};
use crate::task::{spawn_producer, TaskGuard, DEFAULT_CHANNEL_CAPACITY};

fn composite_name<In, Out>(kind: &str, flows: &[Flow<In, Out>]) -> String
where
    In: Send + 'static,
    Out: Send + 'static,
{
    let names = flows
        .iter()
        .map(|flow| flow.name())
        .collect::<Vec<_>>()
        .join(", ");
    format!("{kind}({names})")
}

fn require_flows<In, Out>(kind: &str, flows: &[Flow<In, Out>]) -> Result<(), FlowError> {
    if flows.is_empty() {
        return Err(FlowError::configuration(format!(
            "{kind} requires at least one flow"
        )));
    }
    Ok(())
}

/// Run every flow over the same (buffered) input and yield their outputs in
/// arrival order.
///
/// One producer task is spawned per branch, all pushing into a single
/// bounded queue. The output completes once every branch has completed; the
/// first branch failure aborts all others and terminates the stream.
pub fn merge<In, Out>(flows: Vec<Flow<In, Out>>) -> Result<Flow<In, Out>, FlowError>
where
    In: Clone + Send + Sync + 'static,
    Out: Send + 'static,
{
    require_flows("merge", &flows)?;
    let name = composite_name("merge", &flows);
    Ok(Flow::new(name, move |source| {
        let flows = flows.clone();
        Box::pin(stream! {
            // Buffer the input so every branch replays the same items.
            let items = match collect_stream(source).await {
                Ok(items) => items,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let (queue, mut output) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
            let mut guards = Vec::with_capacity(flows.len());
            for flow in &flows {
                let branch = flow.run(iter_stream(items.clone()));
                guards.push(spawn_producer(branch, queue.clone()));
            }
            drop(queue);
            tracing::debug!(branches = guards.len(), "merge started");

            while let Some(item) = output.recv().await {
                match item {
                    Ok(value) => yield Ok(value),
                    Err(e) => {
                        // Dropping the guards aborts every sibling branch.
                        yield Err(e);
                        return;
                    }
                }
            }
        })
    }))
}

/// First successful result of a flow over a single item.
async fn first_result<In, Out>(flow: Flow<In, Out>, item: In) -> Result<Out, FlowError>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    let mut output = flow.run(single_item(item));
    match output.next().await {
        Some(result) => result,
        None => Err(FlowError::execution("flow produced no items")),
    }
}

async fn race_one<In, Out>(flows: &[Flow<In, Out>], item: &In) -> Result<Out, FlowError>
where
    In: Clone + Send + Sync + 'static,
    Out: Send + 'static,
{
    let (results, mut completions) = mpsc::channel(flows.len());
    let mut guards = Vec::with_capacity(flows.len());
    for flow in flows {
        let flow = flow.clone();
        let item = item.clone();
        let results = results.clone();
        guards.push(TaskGuard::spawn(async move {
            let _ = results.send(first_result(flow, item).await).await;
        }));
    }
    drop(results);

    let mut last_error = None;
    while let Some(result) = completions.recv().await {
        match result {
            Ok(winner) => {
                // Losers are aborted and joined before the winner is yielded.
                for guard in guards {
                    guard.shutdown().await;
                }
                return Ok(winner);
            }
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| FlowError::execution("all racing flows failed")))
}

/// For each input item, run every flow concurrently and yield the first
/// successful result; all losing branches are fully cancelled first.
pub fn race<In, Out>(flows: Vec<Flow<In, Out>>) -> Result<Flow<In, Out>, FlowError>
where
    In: Clone + Send + Sync + 'static,
    Out: Send + 'static,
{
    require_flows("race", &flows)?;
    let name = composite_name("race", &flows);
    Ok(Flow::new(name, move |mut source| {
        let flows = flows.clone();
        Box::pin(stream! {
            while let Some(item) = source.next().await {
                match item {
                    Ok(value) => match race_one(&flows, &value).await {
                        Ok(winner) => yield Ok(winner),
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    },
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        })
    }))
}

enum BranchReport<Out> {
    Done(usize, Vec<Out>),
    Failed(usize, FlowError),
}

fn spawn_branches<In, Out>(
    flows: &[Flow<In, Out>],
    item: &In,
) -> (Vec<TaskGuard>, mpsc::Receiver<BranchReport<Out>>)
where
    In: Clone + Send + Sync + 'static,
    Out: Send + 'static,
{
    let (reports, completions) = mpsc::channel(flows.len());
    let mut guards = Vec::with_capacity(flows.len());
    for (index, flow) in flows.iter().enumerate() {
        let flow = flow.clone();
        let item = item.clone();
        let reports = reports.clone();
        guards.push(TaskGuard::spawn(async move {
            let report = match flow.collect(single_item(item)).await {
                Ok(outputs) => BranchReport::Done(index, outputs),
                Err(e) => BranchReport::Failed(index, e),
            };
            let _ = reports.send(report).await;
        }));
    }
    (guards, completions)
}

async fn parallel_one<In, Out>(flows: &[Flow<In, Out>], item: &In) -> Result<Vec<Out>, FlowError>
where
    In: Clone + Send + Sync + 'static,
    Out: Send + 'static,
{
    let (_guards, mut completions) = spawn_branches(flows, item);

    let mut slots: Vec<Option<Vec<Out>>> = (0..flows.len()).map(|_| None).collect();
    while let Some(report) = completions.recv().await {
        match report {
            BranchReport::Done(index, outputs) => slots[index] = Some(outputs),
            // Dropping `_guards` aborts every sibling branch.
            BranchReport::Failed(_, e) => return Err(e),
        }
    }

    let mut merged = Vec::new();
    for slot in slots {
        match slot {
            Some(outputs) => merged.extend(outputs),
            None => {
                return Err(FlowError::execution(
                    "parallel branch terminated without reporting",
                ))
            }
        }
    }
    Ok(merged)
}

/// For each input item, run every flow concurrently and yield all their
/// outputs as one `Vec`, ordered by flow index regardless of completion
/// order. Any branch failure cancels the others and terminates the stream.
pub fn parallel<In, Out>(flows: Vec<Flow<In, Out>>) -> Result<Flow<In, Vec<Out>>, FlowError>
where
    In: Clone + Send + Sync + 'static,
    Out: Send + 'static,
{
    require_flows("parallel", &flows)?;
    let name = composite_name("parallel", &flows);
    Ok(Flow::new(name, move |mut source| {
        let flows = flows.clone();
        Box::pin(stream! {
            while let Some(item) = source.next().await {
                match item {
                    Ok(value) => match parallel_one(&flows, &value).await {
                        Ok(outputs) => yield Ok(outputs),
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    },
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        })
    }))
}

/// Outcome of one [`parallel_successful`] step: the outputs of the branches
/// that succeeded (in flow order) and the indices of those that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialResults<T> {
    pub results: Vec<T>,
    pub failed: Vec<usize>,
}

async fn parallel_successful_one<In, Out>(
    flows: &[Flow<In, Out>],
    item: &In,
) -> PartialResults<Out>
where
    In: Clone + Send + Sync + 'static,
    Out: Send + 'static,
{
    let (_guards, mut completions) = spawn_branches(flows, item);

    let mut slots: Vec<Option<Vec<Out>>> = (0..flows.len()).map(|_| None).collect();
    let mut failed = Vec::new();
    while let Some(report) = completions.recv().await {
        match report {
            BranchReport::Done(index, outputs) => slots[index] = Some(outputs),
            BranchReport::Failed(index, e) => {
                tracing::debug!(branch = index, error = %e, "parallel branch failed");
                failed.push(index);
            }
        }
    }

    let mut results = Vec::new();
    for (index, slot) in slots.into_iter().enumerate() {
        match slot {
            Some(outputs) => results.extend(outputs),
            None if failed.contains(&index) => {}
            None => failed.push(index),
        }
    }
    failed.sort_unstable();
    PartialResults { results, failed }
}

/// Like [`parallel`], but branch failures are suppressed: each step yields
/// the outputs of the successful branches plus the indices that failed.
pub fn parallel_successful<In, Out>(
    flows: Vec<Flow<In, Out>>,
) -> Result<Flow<In, PartialResults<Out>>, FlowError>
where
    In: Clone + Send + Sync + 'static,
    Out: Send + 'static,
{
    require_flows("parallel_successful", &flows)?;
    let name = composite_name("parallel_successful", &flows);
    Ok(Flow::new(name, move |mut source| {
        let flows = flows.clone();
        Box::pin(stream! {
            while let Some(item) = source.next().await {
                match item {
                    Ok(value) => yield Ok(parallel_successful_one(&flows, &value).await),
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        })
    }))
}

/// Pair each input item with the next item of `other`, in lockstep; ends at
/// the shorter of the two. Pulls alternate cooperatively, so no extra task
/// is spawned and a stalled side only suspends this stream.
pub fn zip<T, U>(other: Flow<(), U>) -> Flow<T, (T, U)>
where
    T: Send + 'static,
    U: Send + 'static,
{
    let name = format!("zip({})", other.name());
    Flow::new(name, move |mut source| {
        let other = other.clone();
        Box::pin(stream! {
            let mut right = other.run(empty_stream());
            loop {
                let left_item = match source.next().await {
                    Some(Ok(value)) => value,
                    Some(Err(e)) => {
                        yield Err(e);
                        return;
                    }
                    None => return,
                };
                match right.next().await {
                    Some(Ok(value)) => yield Ok((left_item, value)),
                    Some(Err(e)) => {
                        yield Err(e);
                        return;
                    }
                    None => return,
                }
            }
        })
    })
}

/// Pair each input item with the most recent item of `other`.
///
/// Nothing is emitted until `other` produces its first item; afterwards a
/// background sampler keeps only the latest value and is cancelled with the
/// output stream.
pub fn combine_latest<T, U>(other: Flow<(), U>) -> Flow<T, (T, U)>
where
    T: Send + 'static,
    U: Clone + Send + Sync + 'static,
{
    let name = format!("combine_latest({})", other.name());
    Flow::new(name, move |mut source| {
        let other = other.clone();
        Box::pin(stream! {
            let mut sampled = other.run(empty_stream());
            let first = match sampled.next().await {
                Some(Ok(value)) => value,
                Some(Err(e)) => {
                    yield Err(e);
                    return;
                }
                None => return,
            };

            let (latest, latest_rx) = watch::channel(first);
            let _sampler = TaskGuard::spawn(async move {
                while let Some(item) = sampled.next().await {
                    match item {
                        Ok(value) => {
                            if latest.send(value).is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, "combine_latest sampler stopping");
                            return;
                        }
                    }
                }
            });

            while let Some(item) = source.next().await {
                match item {
                    Ok(value) => {
                        let current = latest_rx.borrow().clone();
                        yield Ok((value, current));
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

/// Concatenate source flows: all items of the first, then the second, and so
/// on. Input is ignored.
pub fn chain<In, T>(sources: Vec<Flow<(), T>>) -> Result<Flow<In, T>, FlowError>
where
    In: Send + 'static,
    T: Send + 'static,
{
    require_flows("chain", &sources)?;
    let name = composite_name("chain", &sources);
    Ok(Flow::new(name, move |_source| {
        let sources = sources.clone();
        Box::pin(stream! {
            for source in &sources {
                let mut output = source.run(empty_stream());
                while let Some(item) = output.next().await {
                    let failed = item.is_err();
                    yield item;
                    if failed {
                        return;
                    }
                }
            }
        })
    }))
}
