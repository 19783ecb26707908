//! Metrics collection for Selkie
//!
//! TigerStyle: Explicit metric names with units, type-safe recording.
//!
//! High-level recording functions backed by OpenTelemetry when the `otel`
//! feature is enabled, no-ops otherwise. Label dimensions are capped to
//! workload type, namespace, and workload name; callers must not invent
//! further dimensions.

#[cfg(feature = "otel")]
use once_cell::sync::Lazy;
#[cfg(feature = "otel")]
use opentelemetry::metrics::Counter;
#[cfg(feature = "otel")]
use opentelemetry::{global, KeyValue};

/// Total workloads deployed
pub const METRIC_NAME_WORKLOADS_DEPLOYED_TOTAL: &str = "selkie_workloads_deployed_total";

/// Total bytes deployed
pub const METRIC_NAME_DEPLOYED_BYTES_TOTAL: &str = "selkie_deployed_bytes_total";

/// Total successful function triggers
pub const METRIC_NAME_FUNCTION_TRIGGERS_TOTAL: &str = "selkie_function_triggers_total";

/// Total failed function triggers
pub const METRIC_NAME_FUNCTION_TRIGGERS_FAILED_TOTAL: &str =
    "selkie_function_triggers_failed_total";

/// Accumulated function runtime in nanoseconds
pub const METRIC_NAME_FUNCTION_RUNTIME_NANOSECONDS_TOTAL: &str =
    "selkie_function_runtime_nanoseconds_total";

// Cached instruments (created once, reused for all recordings)
#[cfg(feature = "otel")]
static WORKLOADS_DEPLOYED_COUNTER: Lazy<Counter<u64>> = Lazy::new(|| {
    global::meter("selkie")
        .u64_counter(METRIC_NAME_WORKLOADS_DEPLOYED_TOTAL)
        .with_description("Total number of accepted workload deployments")
        .init()
});

#[cfg(feature = "otel")]
static DEPLOYED_BYTES_COUNTER: Lazy<Counter<u64>> = Lazy::new(|| {
    global::meter("selkie")
        .u64_counter(METRIC_NAME_DEPLOYED_BYTES_TOTAL)
        .with_description("Total bytes of deployed workload artifacts")
        .init()
});

#[cfg(feature = "otel")]
static FUNCTION_TRIGGERS_COUNTER: Lazy<Counter<u64>> = Lazy::new(|| {
    global::meter("selkie")
        .u64_counter(METRIC_NAME_FUNCTION_TRIGGERS_TOTAL)
        .with_description("Total successful function trigger invocations")
        .init()
});

#[cfg(feature = "otel")]
static FUNCTION_TRIGGERS_FAILED_COUNTER: Lazy<Counter<u64>> = Lazy::new(|| {
    global::meter("selkie")
        .u64_counter(METRIC_NAME_FUNCTION_TRIGGERS_FAILED_TOTAL)
        .with_description("Total failed function trigger invocations")
        .init()
});

#[cfg(feature = "otel")]
static FUNCTION_RUNTIME_NANOSECONDS_COUNTER: Lazy<Counter<u64>> = Lazy::new(|| {
    global::meter("selkie")
        .u64_counter(METRIC_NAME_FUNCTION_RUNTIME_NANOSECONDS_TOTAL)
        .with_description("Accumulated function execution runtime in nanoseconds")
        .init()
});

/// Record an accepted workload deployment
///
/// Recorded once globally (by type) and once sliced by namespace and type.
#[cfg(feature = "otel")]
pub fn record_workload_deployed(workload_type: &str, namespace: &str) {
    WORKLOADS_DEPLOYED_COUNTER.add(
        1,
        &[KeyValue::new("workload_type", workload_type.to_string())],
    );
    WORKLOADS_DEPLOYED_COUNTER.add(
        1,
        &[
            KeyValue::new("namespace", namespace.to_string()),
            KeyValue::new("workload_type", workload_type.to_string()),
        ],
    );
}

/// Record the byte size of an accepted deployment
#[cfg(feature = "otel")]
pub fn record_deployed_bytes(bytes: u64, namespace: &str) {
    DEPLOYED_BYTES_COUNTER.add(bytes, &[]);
    DEPLOYED_BYTES_COUNTER.add(bytes, &[KeyValue::new("namespace", namespace.to_string())]);
}

/// Record a successful function trigger and its runtime
#[cfg(feature = "otel")]
pub fn record_function_trigger(namespace: &str, workload_name: &str, runtime_ns: u64) {
    for attrs in trigger_attribute_sets(namespace, workload_name) {
        FUNCTION_TRIGGERS_COUNTER.add(1, &attrs);
        FUNCTION_RUNTIME_NANOSECONDS_COUNTER.add(runtime_ns, &attrs);
    }
}

/// Record a failed function trigger
#[cfg(feature = "otel")]
pub fn record_function_trigger_failed(namespace: &str, workload_name: &str) {
    for attrs in trigger_attribute_sets(namespace, workload_name) {
        FUNCTION_TRIGGERS_FAILED_COUNTER.add(1, &attrs);
    }
}

/// Attribute slices for trigger counters: global, by namespace, by name
#[cfg(feature = "otel")]
fn trigger_attribute_sets(namespace: &str, workload_name: &str) -> [Vec<KeyValue>; 3] {
    [
        vec![],
        vec![KeyValue::new("namespace", namespace.to_string())],
        vec![KeyValue::new("workload_name", workload_name.to_string())],
    ]
}

// No-op implementations when otel feature is disabled
#[cfg(not(feature = "otel"))]
pub fn record_workload_deployed(_workload_type: &str, _namespace: &str) {}

#[cfg(not(feature = "otel"))]
pub fn record_deployed_bytes(_bytes: u64, _namespace: &str) {}

#[cfg(not(feature = "otel"))]
pub fn record_function_trigger(_namespace: &str, _workload_name: &str, _runtime_ns: u64) {}

#[cfg(not(feature = "otel"))]
pub fn record_function_trigger_failed(_namespace: &str, _workload_name: &str) {}
