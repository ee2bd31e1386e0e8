// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for entity-search.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `entity_search_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `operation`: index, delete, search, count_terms, exists, create, mapping, drop
//! - `index`: target index name
//! - `status`: success, error

use metrics::{counter, histogram};
use std::time::{Duration, Instant};

fn status(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "error"
    }
}

/// Record a single-document or index-admin operation
pub fn record_operation(operation: &str, index: &str, success: bool) {
    counter!(
        "entity_search_operations_total",
        "operation" => operation.to_string(),
        "index" => index.to_string(),
        "status" => status(success)
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(operation: &str, duration: Duration) {
    histogram!(
        "entity_search_operation_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a submitted bulk batch and its failed items
pub fn record_bulk_batch(index: &str, items: usize, failed_items: usize) {
    counter!("entity_search_bulk_batches_total", "index" => index.to_string()).increment(1);
    histogram!("entity_search_bulk_batch_size", "index" => index.to_string()).record(items as f64);
    if failed_items > 0 {
        counter!("entity_search_bulk_failed_items_total", "index" => index.to_string())
            .increment(failed_items as u64);
    }
}

/// Record a bulk batch lost to a transport failure
pub fn record_bulk_transport_failure(index: &str) {
    counter!("entity_search_bulk_transport_failures_total", "index" => index.to_string()).increment(1);
}

/// Record records skipped because they encoded to nothing
pub fn record_skipped_records(type_name: &str, count: usize) {
    if count > 0 {
        counter!("entity_search_skipped_records_total", "type" => type_name.to_string())
            .increment(count as u64);
    }
}

/// Record a search and its hit count
pub fn record_search(success: bool, hits: usize) {
    counter!("entity_search_searches_total", "status" => status(success)).increment(1);
    if success {
        histogram!("entity_search_search_results").record(hits as f64);
    }
}

/// Record decode failures of search hits
pub fn record_decode_failure(doc_type: &str) {
    counter!("entity_search_decode_failures_total", "type" => doc_type.to_string()).increment(1);
}

/// Record a rebuild attempt: "completed" or "skipped" (lock held elsewhere)
pub fn record_rebuild(outcome: &str, duration: Duration) {
    counter!("entity_search_rebuilds_total", "outcome" => outcome.to_string()).increment(1);
    histogram!("entity_search_rebuild_seconds").record(duration.as_secs_f64());
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.operation, self.start.elapsed());
    }
}
