use std::time::Duration;

use crest_core::MetricsSnapshot;
use hdrhistogram::Histogram;
use parking_lot::Mutex;

/// Latency in microseconds, up to one hour.
fn new_latency_histogram() -> anyhow::Result<Histogram<u64>> {
    Ok(Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3)?)
}

#[derive(Debug)]
struct Window {
    histogram: Histogram<u64>,
    requests: u64,
    errors: u64,
}

impl Window {
    fn new() -> anyhow::Result<Self> {
        Ok(Self {
            histogram: new_latency_histogram()?,
            requests: 0,
            errors: 0,
        })
    }

    fn record(&mut self, latency: Duration, ok: bool) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX).max(1);
        self.histogram.saturating_record(micros);
        self.requests = self.requests.saturating_add(1);
        if !ok {
            self.errors = self.errors.saturating_add(1);
        }
    }

    fn reset(&mut self) {
        self.histogram.reset();
        self.requests = 0;
        self.errors = 0;
    }

    fn error_rate(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        self.errors as f64 / self.requests as f64
    }
}

fn micros_to_ms(v: f64) -> f64 {
    v / 1_000.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct LatencySummary {
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct RequestTotals {
    pub requests: u64,
    pub errors: u64,
    pub latency: Option<LatencySummary>,
}

/// Request outcomes recorded by simulated tasks.
///
/// Keeps one window that is drained on every clock tick and one that covers the
/// whole run.
#[derive(Debug)]
pub(crate) struct RequestStats {
    interval: Mutex<Window>,
    totals: Mutex<Window>,
}

impl RequestStats {
    pub(crate) fn new() -> anyhow::Result<Self> {
        Ok(Self {
            interval: Mutex::new(Window::new()?),
            totals: Mutex::new(Window::new()?),
        })
    }

    pub(crate) fn record(&self, latency: Duration, ok: bool) {
        self.interval.lock().record(latency, ok);
        self.totals.lock().record(latency, ok);
    }

    /// Snapshot of the requests completed since the previous call, or `None` if
    /// there were none.
    pub(crate) fn take_interval(&self, active_tasks: u64) -> Option<MetricsSnapshot> {
        let mut window = self.interval.lock();
        if window.requests == 0 {
            return None;
        }

        let snapshot = MetricsSnapshot {
            avg_latency_ms: micros_to_ms(window.histogram.mean()),
            p95_latency_ms: micros_to_ms(window.histogram.value_at_quantile(0.95) as f64),
            error_rate: window.error_rate(),
            active_tasks,
        };
        window.reset();
        Some(snapshot)
    }

    pub(crate) fn totals(&self) -> RequestTotals {
        let window = self.totals.lock();
        let h = &window.histogram;
        let latency = (window.requests > 0).then(|| LatencySummary {
            mean_ms: micros_to_ms(h.mean()),
            p50_ms: micros_to_ms(h.value_at_quantile(0.50) as f64),
            p95_ms: micros_to_ms(h.value_at_quantile(0.95) as f64),
            p99_ms: micros_to_ms(h.value_at_quantile(0.99) as f64),
            max_ms: micros_to_ms(h.max() as f64),
        });

        RequestTotals {
            requests: window.requests,
            errors: window.errors,
            latency,
        }
    }
}
