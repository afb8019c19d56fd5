/// Live metrics the external runner hands to the clock on every tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// Mean latency over the last interval, milliseconds.
    pub avg_latency_ms: f64,
    /// 95th percentile latency over the last interval, milliseconds.
    pub p95_latency_ms: f64,
    /// Failed requests / total requests over the last interval (0..=1).
    pub error_rate: f64,
    /// Tasks alive when the snapshot was taken.
    pub active_tasks: u64,
}
