//! Per-flow throughput counters.
//!
//! Counters are exported twice: process-wide prometheus counter vecs keyed
//! by flow name, and a per-instance atomic snapshot that tests and callers
//! can query directly without scraping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};
use serde::{Deserialize, Serialize};

static FLOW_ITEMS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "flow_items_total",
        "Items emitted by flows",
        &["flow"]
    )
    .expect("create flow items counter vec")
});

static FLOW_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "flow_errors_total",
        "Failures observed by flows",
        &["flow"]
    )
    .expect("create flow errors counter vec")
});

static FLOW_COMPLETIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "flow_completions_total",
        "Streams run to completion by flows",
        &["flow"]
    )
    .expect("create flow completions counter vec")
});

/// Counters for one measured flow instance.
#[derive(Debug)]
pub struct FlowStats {
    flow: Arc<str>,
    items: AtomicU64,
    errors: AtomicU64,
    completions: AtomicU64,
    last_error: RwLock<Option<Arc<str>>>,
}

/// Point-in-time copy of a [`FlowStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStatsSnapshot {
    pub flow: String,
    pub items: u64,
    pub errors: u64,
    pub completions: u64,
    pub last_error: Option<String>,
}

impl FlowStats {
    pub fn new(flow: impl Into<Arc<str>>) -> Self {
        Self {
            flow: flow.into(),
            items: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            completions: AtomicU64::new(0),
            last_error: RwLock::new(None),
        }
    }

    pub fn flow(&self) -> &str {
        &self.flow
    }

    pub fn record_item(&self) {
        self.items.fetch_add(1, Ordering::Relaxed);
        FLOW_ITEMS_TOTAL.with_label_values(&[&self.flow]).inc();
    }

    pub fn record_error(&self, error: &crate::error::FlowError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        FLOW_ERRORS_TOTAL.with_label_values(&[&self.flow]).inc();
        let mut guard = self.last_error.write().expect("flow stats poisoned");
        *guard = Some(Arc::<str>::from(error.to_string()));
    }

    pub fn record_completion(&self) {
        self.completions.fetch_add(1, Ordering::Relaxed);
        FLOW_COMPLETIONS_TOTAL.with_label_values(&[&self.flow]).inc();
    }

    pub fn snapshot(&self) -> FlowStatsSnapshot {
        let last_error = self
            .last_error
            .read()
            .expect("flow stats poisoned")
            .as_ref()
            .map(|e| e.to_string());
        FlowStatsSnapshot {
            flow: self.flow.to_string(),
            items: self.items.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            completions: self.completions.load(Ordering::Relaxed),
            last_error,
        }
    }
}
