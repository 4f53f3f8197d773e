//! Fan-in combinator tests: completeness, ordering, cancellation and
//! partial-success reporting under real concurrency.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::{sleep, timeout};

use flow::combinator;
use flow::factory;
use flow::{empty_stream, iter_stream, single_item, ChannelEventSource, Flow, FlowError};

/// Sets a flag when the future holding it is dropped, observed or not.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn never_completing(cancelled: Arc<AtomicBool>) -> Flow<i64, i64> {
    factory::from_async_fn(move |value: i64| {
        let cancelled = cancelled.clone();
        async move {
            let _guard = DropFlag(cancelled);
            futures::future::pending::<()>().await;
            Ok(value)
        }
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn merge_yields_the_full_multiset_with_per_source_order() {
    let merged = combinator::merge::<(), i64>(vec![
        factory::from_iterable(vec![1, 2]),
        factory::from_iterable(vec![3, 4]),
    ])
    .expect("merge");

    let out = timeout(Duration::from_secs(2), merged.collect(empty_stream()))
        .await
        .expect("merge timeout")
        .expect("merge output");

    let mut sorted = out.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![1, 2, 3, 4]);

    let position = |v: i64| out.iter().position(|&x| x == v).expect("present");
    assert!(position(1) < position(2));
    assert!(position(3) < position(4));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn merge_failure_cancels_the_other_branches() {
    let cancelled = Arc::new(AtomicBool::new(false));
    let stuck: Flow<(), i64> = {
        let cancelled = cancelled.clone();
        Flow::new("stuck", move |_source| {
            // Created as soon as the branch is wired, dropped with its task.
            let guard = DropFlag(cancelled.clone());
            Box::pin(async_stream::stream! {
                let _guard = guard;
                futures::future::pending::<()>().await;
                yield Ok(0);
            })
        })
    };
    let failing: Flow<(), i64> = Flow::new("failing", |_source| {
        flow::stream::failed_stream(FlowError::execution("source exploded"))
    });

    let merged = combinator::merge(vec![stuck, failing]).expect("merge");
    let err = timeout(Duration::from_secs(2), merged.collect(empty_stream()))
        .await
        .expect("merge timeout")
        .unwrap_err();
    assert!(matches!(err, FlowError::Execution(_)));

    // The stuck sibling's task was aborted, not abandoned.
    sleep(Duration::from_millis(50)).await;
    assert!(cancelled.load(Ordering::SeqCst));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn race_returns_the_fast_result_and_cancels_the_loser() {
    let cancelled = Arc::new(AtomicBool::new(false));
    let raced = combinator::race(vec![
        never_completing(cancelled.clone()),
        // The winner takes long enough that the loser is definitely running.
        factory::from_async_fn(|v: i64| async move {
            sleep(Duration::from_millis(50)).await;
            Ok(v + 1)
        }),
    ])
    .expect("race");

    let out = timeout(Duration::from_secs(2), raced.collect(single_item(41)))
        .await
        .expect("race timeout")
        .expect("race output");
    assert_eq!(out, vec![42]);

    // Losers are joined before race yields, so the flag is already set.
    assert!(cancelled.load(Ordering::SeqCst));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn race_tolerates_losers_failing_first() {
    let raced = combinator::race(vec![
        factory::from_async_fn(|_v: i64| async {
            Err::<i64, _>(FlowError::execution("fast failure"))
        }),
        factory::from_async_fn(|v: i64| async move {
            sleep(Duration::from_millis(50)).await;
            Ok(v + 1)
        }),
    ])
    .expect("race");

    let out = raced.collect(single_item(1)).await.expect("race output");
    assert_eq!(out, vec![2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn race_fails_only_when_every_branch_fails() {
    let raced = combinator::race(vec![
        factory::from_async_fn(|_v: i64| async {
            Err::<i64, _>(FlowError::execution("first"))
        }),
        factory::from_async_fn(|_v: i64| async {
            Err::<i64, _>(FlowError::execution("second"))
        }),
    ])
    .expect("race");

    let err = raced.collect(single_item(1)).await.unwrap_err();
    assert!(matches!(err, FlowError::Execution(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn parallel_preserves_flow_order_regardless_of_completion_order() {
    let slow_a = factory::from_async_fn(|_v: i64| async {
        sleep(Duration::from_millis(80)).await;
        Ok("a")
    });
    let fast_b = factory::from_async_fn(|_v: i64| async { Ok("b") });
    let slow_c = factory::from_async_fn(|_v: i64| async {
        sleep(Duration::from_millis(40)).await;
        Ok("c")
    });

    let paralleled = combinator::parallel(vec![slow_a, fast_b, slow_c]).expect("parallel");
    let out = timeout(
        Duration::from_secs(2),
        paralleled.collect(single_item(0)),
    )
    .await
    .expect("parallel timeout")
    .expect("parallel output");

    assert_eq!(out, vec![vec!["a", "b", "c"]]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn parallel_failure_cancels_siblings_and_propagates() {
    let cancelled = Arc::new(AtomicBool::new(false));
    let paralleled = combinator::parallel(vec![
        never_completing(cancelled.clone()),
        // Fails only after the sibling is definitely running.
        factory::from_async_fn(|_v: i64| async {
            sleep(Duration::from_millis(50)).await;
            Err::<i64, _>(FlowError::execution("branch failed"))
        }),
    ])
    .expect("parallel");

    let err = timeout(
        Duration::from_secs(2),
        paralleled.collect(single_item(1)),
    )
    .await
    .expect("parallel timeout")
    .unwrap_err();
    assert!(matches!(err, FlowError::Execution(_)));

    sleep(Duration::from_millis(50)).await;
    assert!(cancelled.load(Ordering::SeqCst));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn parallel_successful_reports_failed_branch_indices() {
    let paralleled = combinator::parallel_successful(vec![
        factory::from_sync_fn(|v: i64| v + 1),
        factory::from_async_fn(|_v: i64| async {
            Err::<i64, _>(FlowError::execution("branch down"))
        }),
        factory::from_sync_fn(|v: i64| v + 3),
    ])
    .expect("parallel_successful");

    let out = paralleled
        .collect(single_item(10))
        .await
        .expect("partial output");
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].results, vec![11, 13]);
    assert_eq!(out[0].failed, vec![1]);
}

#[tokio::test]
async fn zip_stops_at_the_shortest_source() {
    let zipped = combinator::zip(factory::from_iterable(vec![10, 20]));
    let out = zipped
        .collect(iter_stream(vec![1, 2, 3]))
        .await
        .expect("zip output");
    assert_eq!(out, vec![(1, 10), (2, 20)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zip_with_a_stalled_side_stays_cancellable() {
    let (stalled, _handle) = ChannelEventSource::<i64>::new("stalled", 4).expect("source");
    let zipped = combinator::zip(factory::from_event_source(stalled));
    let mut output = zipped.run(iter_stream(vec![1]));

    // The pull suspends on the stalled side instead of spinning or
    // deadlocking; dropping the output afterwards must tear it down.
    let pull = timeout(Duration::from_millis(100), output.next()).await;
    assert!(pull.is_err());
    drop(output);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn combine_latest_pairs_with_the_freshest_value() {
    let (main_source, main_handle) = ChannelEventSource::new("main", 8).expect("main source");
    let (other_source, other_handle) = ChannelEventSource::new("other", 8).expect("other source");

    let combined = factory::from_event_source::<(), _>(main_source)
        .pipe(combinator::combine_latest(factory::from_event_source(
            other_source,
        )));
    let mut output = combined.run(empty_stream());

    other_handle.emit(10).await.expect("emit other");
    main_handle.emit(1).await.expect("emit main");
    let first = timeout(Duration::from_secs(2), output.next())
        .await
        .expect("first timeout")
        .expect("first item")
        .expect("first ok");
    assert_eq!(first, (1, 10));

    other_handle.emit(20).await.expect("emit other");
    sleep(Duration::from_millis(50)).await;
    main_handle.emit(2).await.expect("emit main");
    let second = timeout(Duration::from_secs(2), output.next())
        .await
        .expect("second timeout")
        .expect("second item")
        .expect("second ok");
    assert_eq!(second, (2, 20));

    drop(main_handle);
    drop(other_handle);
    assert!(timeout(Duration::from_secs(2), output.next())
        .await
        .expect("end timeout")
        .is_none());
}

#[tokio::test]
async fn chain_concatenates_sources_in_order() {
    let chained = combinator::chain::<(), i64>(vec![
        factory::from_iterable(vec![1, 2]),
        factory::from_iterable(vec![3]),
        factory::from_iterable(vec![4, 5]),
    ])
    .expect("chain");
    let out = chained.collect(empty_stream()).await.expect("chain output");
    assert_eq!(out, vec![1, 2, 3, 4, 5]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn merge_runs_every_branch_over_the_same_input() {
    let calls = Arc::new(AtomicU32::new(0));
    let touch = |calls: &Arc<AtomicU32>| {
        let calls = calls.clone();
        factory::from_sync_fn(move |v: i64| {
            calls.fetch_add(1, Ordering::SeqCst);
            v
        })
    };

    let merged = combinator::merge(vec![touch(&calls), touch(&calls)]).expect("merge");
    let out = merged
        .collect(iter_stream(vec![1, 2, 3]))
        .await
        .expect("merge output");
    assert_eq!(out.len(), 6);
    assert_eq!(calls.load(Ordering::SeqCst), 6);
}
