//! Temporal combinator tests. Real timers with generous margins; every
//! await is wrapped in a timeout so a regression cannot hang the suite.

use std::time::Duration;

use futures::StreamExt;
use tokio::time::{sleep, timeout, Instant};

use flow::combinator;
use flow::factory;
use flow::{empty_stream, iter_stream, ChannelEventSource, FlowError};

/// Event-source flow plus its push handle, for arrival-controlled tests.
fn pushed_source() -> (
    flow::Flow<(), i64>,
    flow::EventSourceHandle<i64>,
) {
    let (source, handle) = ChannelEventSource::new("timed", 32).expect("source");
    (factory::from_event_source::<(), _>(source), handle)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timeout_passes_a_steady_stream() {
    let (source, handle) = pushed_source();
    let gated = source.pipe(combinator::timeout(Duration::from_millis(300)).expect("timeout"));

    let pusher = tokio::spawn(async move {
        for n in 0..4 {
            handle.emit(n).await.expect("emit");
            sleep(Duration::from_millis(50)).await;
        }
    });

    let out = timeout(Duration::from_secs(3), gated.collect(empty_stream()))
        .await
        .expect("test timeout")
        .expect("gated output");
    assert_eq!(out, vec![0, 1, 2, 3]);
    pusher.await.expect("pusher");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timeout_fires_on_a_single_long_gap() {
    let (source, handle) = pushed_source();
    let gated = source.pipe(combinator::timeout(Duration::from_millis(100)).expect("timeout"));
    let mut output = gated.run(empty_stream());

    handle.emit(1).await.expect("emit");
    let first = timeout(Duration::from_secs(2), output.next())
        .await
        .expect("first timeout")
        .expect("first item")
        .expect("first ok");
    assert_eq!(first, 1);

    // The deadline re-arms per item; no second item arrives in time.
    let tripped = timeout(Duration::from_secs(2), output.next())
        .await
        .expect("second timeout")
        .expect("second item");
    assert!(matches!(tripped, Err(FlowError::Timeout(_))));
    assert!(timeout(Duration::from_secs(2), output.next())
        .await
        .expect("end timeout")
        .is_none());

    // Late pushes land in a dead stream.
    sleep(Duration::from_millis(200)).await;
    let _ = handle.emit(2).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn debounce_collapses_a_burst_to_its_last_item() {
    let (source, handle) = pushed_source();
    let debounced = source.pipe(combinator::debounce(Duration::from_millis(120)).expect("debounce"));
    let mut output = debounced.run(empty_stream());

    let started = Instant::now();
    for n in [1, 2, 3] {
        handle.emit(n).await.expect("emit");
        sleep(Duration::from_millis(20)).await;
    }

    let emitted = timeout(Duration::from_secs(2), output.next())
        .await
        .expect("emit timeout")
        .expect("item")
        .expect("ok");
    assert_eq!(emitted, 3);
    // Quiet interval elapsed after the last arrival before anything came out.
    assert!(started.elapsed() >= Duration::from_millis(120 + 40));

    drop(handle);
    assert!(timeout(Duration::from_secs(2), output.next())
        .await
        .expect("end timeout")
        .is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn debounce_rearms_between_bursts() {
    let (source, handle) = pushed_source();
    let debounced = source.pipe(combinator::debounce(Duration::from_millis(80)).expect("debounce"));
    let mut output = debounced.run(empty_stream());

    handle.emit(1).await.expect("emit");
    handle.emit(2).await.expect("emit");
    sleep(Duration::from_millis(150)).await; // first burst flushes -> 2
    handle.emit(3).await.expect("emit");
    drop(handle); // stream end flushes the pending 3

    let mut got = Vec::new();
    while let Some(item) = timeout(Duration::from_secs(2), output.next())
        .await
        .expect("recv timeout")
    {
        got.push(item.expect("ok"));
    }
    assert_eq!(got, vec![2, 3]);
}

#[tokio::test]
async fn throttle_drops_items_inside_the_window() {
    // All five arrive back-to-back: only the first clears the gate.
    let throttled = combinator::throttle(Duration::from_millis(100)).expect("throttle");
    let out = throttled
        .collect(iter_stream(vec![1, 2, 3, 4, 5]))
        .await
        .expect("throttled output");
    assert_eq!(out, vec![1]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn throttle_passes_items_slower_than_the_rate() {
    let (source, handle) = pushed_source();
    let throttled = source.pipe(combinator::throttle(Duration::from_millis(40)).expect("throttle"));

    let pusher = tokio::spawn(async move {
        for n in 0..3 {
            handle.emit(n).await.expect("emit");
            sleep(Duration::from_millis(80)).await;
        }
    });

    let out = timeout(Duration::from_secs(3), throttled.collect(empty_stream()))
        .await
        .expect("test timeout")
        .expect("throttled output");
    assert_eq!(out, vec![0, 1, 2]);
    pusher.await.expect("pusher");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sample_emits_the_latest_item_per_tick() {
    let (source, handle) = pushed_source();
    let sampled = source.pipe(combinator::sample(Duration::from_millis(100)).expect("sample"));
    let mut output = sampled.run(empty_stream());

    // Three arrivals inside the first tick window.
    for n in [1, 2, 3] {
        handle.emit(n).await.expect("emit");
    }

    let first = timeout(Duration::from_secs(2), output.next())
        .await
        .expect("tick timeout")
        .expect("item")
        .expect("ok");
    assert_eq!(first, 3);

    drop(handle);
    // Source ended with nothing fresh: the stream finishes.
    assert!(timeout(Duration::from_secs(2), output.next())
        .await
        .expect("end timeout")
        .is_none());
}

#[tokio::test]
async fn delay_shifts_items_without_reordering() {
    let delayed = combinator::delay(Duration::from_millis(30));
    let started = Instant::now();
    let out = delayed
        .collect(iter_stream(vec![1, 2]))
        .await
        .expect("delayed output");
    assert_eq!(out, vec![1, 2]);
    assert!(started.elapsed() >= Duration::from_millis(60));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn event_source_applies_backpressure_to_the_pusher() {
    let (source, handle) = ChannelEventSource::new("tight", 1).expect("source");
    let flow = factory::from_event_source::<(), _>(source);
    let output = flow.run(empty_stream());

    handle.emit(1).await.expect("first emit fills the queue");
    // Nobody is draining: the bounded queue parks the second emit.
    let parked = timeout(Duration::from_millis(100), handle.emit(2)).await;
    assert!(parked.is_err());

    drop(output);
}
