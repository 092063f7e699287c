//! Prometheus metrics for search backend traffic.
//!
//! Adapters record every backend operation here. Metrics are process-global;
//! call [`init_metrics`] once to register them and [`gather_metrics`] to render
//! the text exposition format.
//!
//! # Example
//! ```no_run
//! use docsearch::metrics;
//!
//! metrics::init_metrics().ok();
//! println!("{}", metrics::gather_metrics());
//! ```

use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry};

use crate::search::SearchError;

const NAMESPACE: &str = "docsearch";

lazy_static! {
    /// Registry holding every search metric
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    /// Backend operations by outcome
    ///
    /// Labels: backend, operation, outcome
    pub static ref SEARCH_OPERATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("search_operations_total", "Total number of search backend operations")
            .namespace(NAMESPACE),
        &["backend", "operation", "outcome"]
    ).expect("Failed to create SEARCH_OPERATIONS_TOTAL metric");

    /// Backend operation duration in seconds, including task waits
    ///
    /// Labels: backend, operation
    pub static ref SEARCH_OPERATION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "search_operation_duration_seconds",
            "Search backend operation duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["backend", "operation"]
    ).expect("Failed to create SEARCH_OPERATION_DURATION_SECONDS metric");

    /// Time spent waiting for backend write tasks
    ///
    /// Labels: backend
    pub static ref SEARCH_TASK_WAIT_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "search_task_wait_seconds",
            "Time spent waiting for backend write tasks"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0]),
        &["backend"]
    ).expect("Failed to create SEARCH_TASK_WAIT_SECONDS metric");

    /// Search hits dropped because they could not be decoded
    ///
    /// Labels: backend, index
    pub static ref SEARCH_HITS_DROPPED_TOTAL: CounterVec = CounterVec::new(
        Opts::new("search_hits_dropped_total", "Search hits dropped during decode")
            .namespace(NAMESPACE),
        &["backend", "index"]
    ).expect("Failed to create SEARCH_HITS_DROPPED_TOTAL metric");
}

/// Register all search metrics with [`PROMETHEUS_REGISTRY`].
///
/// # Errors
/// Fails if called more than once per process.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    PROMETHEUS_REGISTRY.register(Box::new(SEARCH_OPERATIONS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SEARCH_OPERATION_DURATION_SECONDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SEARCH_TASK_WAIT_SECONDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SEARCH_HITS_DROPPED_TOTAL.clone()))?;

    tracing::info!("Search metrics registered");
    Ok(())
}

/// Record one finished backend operation.
pub fn record_operation<T>(
    backend: &str,
    operation: &str,
    elapsed: Duration,
    result: &Result<T, SearchError>,
) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(err) => err.kind().map(<&'static str>::from).unwrap_or("backend_error"),
    };
    SEARCH_OPERATIONS_TOTAL
        .with_label_values(&[backend, operation, outcome])
        .inc();
    SEARCH_OPERATION_DURATION_SECONDS
        .with_label_values(&[backend, operation])
        .observe(elapsed.as_secs_f64());
}

/// Render all registered metrics in the Prometheus text format.
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}
