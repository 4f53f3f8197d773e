mod metrics;

use std::env;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;

use crate::metrics::{
    CPU_SECONDS_TOTAL_COUNTER, CPU_USAGE_GAUGE, MEMORY_USAGE_GAUGE,
    PIPELINE_OUTPUT_ITEMS_COUNTER,
};
use flow::combinator;
use flow::factory;
use flow::{ChannelEventSource, FlowStats, Pipeline};
use sysinfo::{Pid, System};
use tokio::time::{sleep, Duration};
use tracing_subscriber::EnvFilter;

const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9898";
const DEFAULT_METRICS_INTERVAL_SECS: u64 = 5;
const SOURCE_QUEUE_CAPACITY: usize = 256;
const THROTTLE_WINDOW_MS: u64 = 50;
const BATCH_SIZE: usize = 8;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    tracing::info!(
        build = %build_info::banner("rill", env!("CARGO_PKG_VERSION")),
        "starting"
    );
    init_metrics_exporter().await?;

    let emit_period_ms = env::args()
        .nth(1)
        .map(|raw| raw.parse::<u64>())
        .transpose()?
        .filter(|ms| *ms > 0)
        .unwrap_or(100);

    // Two push-based sensors feeding one merged, throttled, batched chain.
    let (fast_source, fast_handle) = ChannelEventSource::new("fast_sensor", SOURCE_QUEUE_CAPACITY)?;
    let (slow_source, slow_handle) = ChannelEventSource::new("slow_sensor", SOURCE_QUEUE_CAPACITY)?;

    let stats = Arc::new(FlowStats::new("demo_pipeline"));
    let chain = combinator::merge(vec![
        factory::from_event_source::<(), _>(fast_source),
        factory::from_event_source::<(), _>(slow_source),
    ])?
    .pipe(combinator::guard(
        |reading: &f64| reading.is_finite(),
        "non-finite reading",
    ))
    .pipe(combinator::throttle(Duration::from_millis(THROTTLE_WINDOW_MS))?)
    .pipe(combinator::batch(BATCH_SIZE)?)
    .pipe(combinator::measured(stats.clone()));

    let mut pipeline = Pipeline::from_flow("demo", &chain, flow::empty_stream());
    let mut output = pipeline
        .take_output()
        .ok_or("pipeline output unavailable")?;
    pipeline.start()?;

    tokio::spawn(async move {
        let mut n = 0u64;
        loop {
            if fast_handle.emit(n as f64 / 10.0).await.is_err() {
                break;
            }
            n += 1;
            sleep(Duration::from_millis(emit_period_ms)).await;
        }
    });
    tokio::spawn(async move {
        let mut n = 0u64;
        loop {
            if slow_handle.emit(1000.0 + n as f64).await.is_err() {
                break;
            }
            n += 1;
            sleep(Duration::from_millis(emit_period_ms * 5)).await;
        }
    });

    tokio::spawn(async move {
        while let Some(item) = output.recv().await {
            match item {
                Ok(batch) => {
                    PIPELINE_OUTPUT_ITEMS_COUNTER.inc_by(batch.len() as f64);
                    tracing::info!(
                        len = batch.len(),
                        first = batch.first().copied().unwrap_or_default(),
                        "batch drained"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "pipeline failed");
                    break;
                }
            }
        }
        tracing::info!("pipeline output closed");
    });

    tracing::info!(
        emit_period_ms,
        "demo pipeline running; press Ctrl+C to stop"
    );
    tokio::signal::ctrl_c().await?;
    tracing::info!(stats = ?stats.snapshot(), "stopping pipeline");
    pipeline.close().await?;
    Ok(())
}

async fn init_metrics_exporter() -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = env::var("METRICS_ADDR")
        .unwrap_or_else(|_| DEFAULT_METRICS_ADDR.to_string())
        .parse()?;
    let exporter = prometheus_exporter::start(addr)?;
    // Leak exporter handle so the HTTP endpoint stays alive for the duration of the process.
    Box::leak(Box::new(exporter));

    let poll_interval = env::var("METRICS_POLL_INTERVAL_SECS")
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_METRICS_INTERVAL_SECS);

    tokio::spawn(async move {
        let mut system = System::new();
        let pid = Pid::from_u32(process::id());
        loop {
            system.refresh_process(pid);
            if let Some(proc_info) = system.process(pid) {
                let cpu_usage_percent = proc_info.cpu_usage() as f64;
                CPU_USAGE_GAUGE.set(cpu_usage_percent as i64);
                let delta_secs = (cpu_usage_percent / 100.0) * poll_interval as f64;
                if delta_secs.is_finite() && delta_secs >= 0.0 {
                    CPU_SECONDS_TOTAL_COUNTER.inc_by(delta_secs);
                }
                MEMORY_USAGE_GAUGE.set(proc_info.memory() as i64);
            } else {
                CPU_USAGE_GAUGE.set(0);
                MEMORY_USAGE_GAUGE.set(0);
            }

            sleep(Duration::from_secs(poll_interval)).await;
        }
    });

    Ok(())
}
