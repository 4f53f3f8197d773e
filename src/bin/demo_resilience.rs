//! Demo program to show the resilience combinators working against flaky
//! upstreams.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use flow::combinator::{self, BreakerSettings};
use flow::factory;
use flow::{single_item, FlowError};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("\n🎯 Resilience Combinator Demo");
    println!("=============================\n");

    // A flow that fails twice per item before succeeding.
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let flaky = factory::from_async_fn(move |value: i64| {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) % 3 < 2 {
                Err(FlowError::execution("transient upstream failure"))
            } else {
                Ok(value * 10)
            }
        }
    });

    println!("🔁 retry(3) over a flow that fails twice then succeeds...");
    let retried = combinator::retry(
        3,
        combinator::fixed_backoff(Duration::from_millis(50)),
        flaky,
    )?;
    let out = retried.collect(single_item(7)).await?;
    println!("   -> {out:?}");

    println!("⚡ circuit breaker tripping on a permanently failing flow...");
    let broken = factory::from_async_fn(|_value: i64| async {
        Err::<i64, _>(FlowError::execution("dependency down"))
    });
    let guarded = combinator::circuit_breaker(
        BreakerSettings::new(3, Duration::from_secs(10), Duration::from_millis(200)),
        broken,
    )?;
    for call in 1..=4i64 {
        match guarded.collect(single_item(call)).await {
            Ok(out) => println!("   call {call}: ok {out:?}"),
            Err(e) => println!("   call {call}: {e}"),
        }
    }

    println!("🏁 race between a slow flow and a fast one...");
    let slow = factory::from_async_fn(|v: i64| async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(v)
    });
    let fast = factory::from_async_fn(|v: i64| async move { Ok(v + 1) });
    let raced = combinator::race(vec![slow, fast])?;
    let winner = raced.collect(single_item(41)).await?;
    println!("   -> winner {winner:?}");

    println!("\n✅ demo complete");
    Ok(())
}
