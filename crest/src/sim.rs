//! In-process task runner with synthetic requests.
//!
//! Each virtual user is a tokio task that optionally meets the others at a
//! rendezvous barrier, then "sends" a request whose latency grows with the number
//! of running tasks. That feedback loop is enough to exercise every shape,
//! including the adaptive one, without a system under test.

mod stats;
mod task;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crest_core::{LoadRunner, MetricsSnapshot, RunControl};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub(crate) use stats::{LatencySummary, RequestTotals};
use stats::RequestStats;
use task::{RENDEZVOUS_GROUP, RendezvousCounters, TaskContext};

#[derive(Debug, Clone, Copy)]
pub(crate) struct SimOptions {
    pub think_time: Duration,
    pub base_latency: Duration,
    pub latency_per_user: Duration,
    /// Probability in `0..=1`.
    pub error_rate: f64,
    /// Clock cadence; `apply` is expected once per cadence.
    pub cadence: Duration,
    /// Tasks meet in groups of up to this many before each request.
    pub rendezvous: Option<u64>,
}

#[derive(Debug, Clone)]
pub(crate) struct ProgressUpdate {
    pub elapsed: Duration,
    pub target: u64,
    pub spawn_rate: f64,
    pub running: u64,
    pub active: u64,
    pub metrics: Option<MetricsSnapshot>,
    pub requests_total: u64,
    pub errors_total: u64,
}

pub(crate) type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RendezvousReport {
    pub capacity: u64,
    pub complete: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub immediate: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct RunReport {
    pub requests: RequestTotals,
    pub peak_tasks: u64,
    pub rendezvous: Option<RendezvousReport>,
    pub last_tick_failure: Option<String>,
}

struct Task {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Pool {
    running: Vec<Task>,
    retired: Vec<JoinHandle<()>>,
    next_id: u64,
    peak: u64,
    /// Fractional spawn allowance carried to the next tick.
    carry: f64,
    barrier_capacity: Option<u64>,
}

pub(crate) struct SimulatedRunner {
    options: SimOptions,
    control: Arc<RunControl>,
    stats: Arc<RequestStats>,
    active: Arc<AtomicU64>,
    rendezvous: Option<Arc<RendezvousCounters>>,
    pool: Mutex<Pool>,
    last_metrics: Mutex<Option<MetricsSnapshot>>,
    last_failure: Mutex<Option<String>>,
    progress: Option<ProgressFn>,
    started: Instant,
}

impl SimulatedRunner {
    pub(crate) fn new(
        options: SimOptions,
        control: Arc<RunControl>,
        progress: Option<ProgressFn>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            options,
            control,
            stats: Arc::new(RequestStats::new()?),
            active: Arc::new(AtomicU64::new(0)),
            rendezvous: options
                .rendezvous
                .map(|_| Arc::new(RendezvousCounters::default())),
            pool: Mutex::new(Pool::default()),
            last_metrics: Mutex::new(None),
            last_failure: Mutex::new(None),
            progress,
            started: Instant::now(),
        })
    }

    pub(crate) fn running(&self) -> u64 {
        self.pool.lock().running.len() as u64
    }

    fn spawn_task(&self, id: u64) -> Task {
        let stop = Arc::new(AtomicBool::new(false));
        let ctx = TaskContext {
            id,
            stop: stop.clone(),
            options: self.options,
            control: self.control.clone(),
            stats: self.stats.clone(),
            active: self.active.clone(),
            rendezvous: self.rendezvous.clone(),
        };
        Task {
            stop,
            handle: tokio::spawn(ctx.run()),
        }
    }

    /// Keeps the barrier no larger than the running population so a shrinking
    /// pool never waits on tasks that are gone.
    fn resize_barrier(&self, pool: &mut Pool) {
        let Some(wanted) = self.options.rendezvous else {
            return;
        };
        let capacity = wanted.min(pool.running.len() as u64);
        if pool.barrier_capacity == Some(capacity) {
            return;
        }

        let capacity_i64 = i64::try_from(capacity).unwrap_or(i64::MAX);
        match self
            .control
            .groups()
            .configure(RENDEZVOUS_GROUP, capacity_i64)
        {
            Ok(_) => {
                debug!(capacity, "rendezvous resized");
                pool.barrier_capacity = Some(capacity);
            }
            Err(err) => warn!(error = %err, "failed to resize rendezvous"),
        }
    }

    fn emit_progress(&self, target: u64, spawn_rate: f64, running: u64) {
        let Some(progress) = &self.progress else {
            return;
        };
        let totals = self.stats.totals();
        progress(ProgressUpdate {
            elapsed: self.started.elapsed(),
            target,
            spawn_rate,
            running,
            active: self.active.load(Ordering::Acquire),
            metrics: *self.last_metrics.lock(),
            requests_total: totals.requests,
            errors_total: totals.errors,
        });
    }

    /// Stops every task and waits up to `grace` for them to exit.
    pub(crate) async fn finish(&self, grace: Duration) -> RunReport {
        self.shutdown();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut self.pool.lock().retired);
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let joined = tokio::time::timeout(grace, async {
            for handle in handles {
                let _ = handle.await;
            }
        })
        .await;
        if joined.is_err() {
            warn!(grace = ?grace, "tasks did not stop in time; aborting");
            for abort in aborts {
                abort.abort();
            }
        }

        let peak_tasks = self.pool.lock().peak;
        let rendezvous = self.rendezvous.as_ref().map(|c| RendezvousReport {
            capacity: self.options.rendezvous.unwrap_or(0),
            complete: c.complete.load(Ordering::Relaxed),
            timed_out: c.timed_out.load(Ordering::Relaxed),
            cancelled: c.cancelled.load(Ordering::Relaxed),
            immediate: c.immediate.load(Ordering::Relaxed),
        });

        RunReport {
            requests: self.stats.totals(),
            peak_tasks,
            rendezvous,
            last_tick_failure: self.last_failure.lock().clone(),
        }
    }
}

impl LoadRunner for SimulatedRunner {
    fn metrics(&self) -> Option<MetricsSnapshot> {
        let snapshot = self
            .stats
            .take_interval(self.active.load(Ordering::Acquire));
        *self.last_metrics.lock() = snapshot;
        snapshot
    }

    fn apply(&self, users: u64, spawn_rate: f64) {
        let running = {
            let mut pool = self.pool.lock();
            pool.retired.retain(|h| !h.is_finished());

            let running = pool.running.len() as u64;
            let diff = users.abs_diff(running);
            if diff == 0 {
                pool.carry = 0.0;
            } else {
                let budget = spawn_rate * self.options.cadence.as_secs_f64() + pool.carry;
                let allowed = budget.floor();
                let n = diff.min(allowed as u64);
                pool.carry = if n < diff { budget - allowed } else { 0.0 };

                if users > running {
                    for _ in 0..n {
                        let id = pool.next_id;
                        pool.next_id += 1;
                        let task = self.spawn_task(id);
                        pool.running.push(task);
                    }
                } else {
                    for _ in 0..n {
                        if let Some(task) = pool.running.pop() {
                            task.stop.store(true, Ordering::Release);
                            pool.retired.push(task.handle);
                        }
                    }
                }
            }

            let now = pool.running.len() as u64;
            pool.peak = pool.peak.max(now);
            self.resize_barrier(&mut pool);
            now
        };

        self.emit_progress(users, spawn_rate, running);
    }

    fn shutdown(&self) {
        let mut pool = self.pool.lock();
        let stopped = pool.running.len();
        let tasks = std::mem::take(&mut pool.running);
        for task in tasks {
            task.stop.store(true, Ordering::Release);
            pool.retired.push(task.handle);
        }
        pool.carry = 0.0;
        info!(stopped, "simulated runner shut down");
    }

    fn tick_failed(&self, elapsed: Duration, message: &str) {
        warn!(elapsed = ?elapsed, error = %message, "holding task count after failed tick");
        *self.last_failure.lock() = Some(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> SimOptions {
        SimOptions {
            think_time: Duration::from_millis(100),
            base_latency: Duration::from_millis(10),
            latency_per_user: Duration::ZERO,
            error_rate: 0.0,
            cadence: Duration::from_secs(1),
            rendezvous: None,
        }
    }

    fn runner(options: SimOptions) -> (SimulatedRunner, Arc<RunControl>) {
        let control = Arc::new(RunControl::default());
        match SimulatedRunner::new(options, control.clone(), None) {
            Ok(v) => (v, control),
            Err(err) => panic!("failed to create runner: {err}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn spawn_rate_limits_growth_per_tick() {
        let (r, _control) = runner(options());

        r.apply(10, 4.0);
        assert_eq!(r.running(), 4);
        r.apply(10, 4.0);
        assert_eq!(r.running(), 8);
        r.apply(10, 4.0);
        assert_eq!(r.running(), 10);

        // Fractional rates accumulate across ticks.
        r.apply(0, 0.5);
        assert_eq!(r.running(), 10);
        r.apply(0, 0.5);
        assert_eq!(r.running(), 9);

        r.finish(Duration::from_secs(5)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn tasks_produce_metrics() {
        let (r, _control) = runner(options());

        r.apply(3, 100.0);
        tokio::time::sleep(Duration::from_secs(2)).await;

        let snapshot = match r.metrics() {
            Some(v) => v,
            None => panic!("expected metrics after two seconds of load"),
        };
        assert!(snapshot.avg_latency_ms >= 8.0 && snapshot.avg_latency_ms <= 12.5);
        assert_eq!(snapshot.error_rate, 0.0);
        assert_eq!(snapshot.active_tasks, 3);

        let report = r.finish(Duration::from_secs(5)).await;
        assert_eq!(report.peak_tasks, 3);
        assert!(report.requests.requests > 0);
        assert_eq!(report.requests.errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rendezvous_tracks_running_population() {
        let (r, control) = runner(SimOptions {
            rendezvous: Some(4),
            ..options()
        });

        r.apply(2, 100.0);
        assert_eq!(
            control.groups().group(RENDEZVOUS_GROUP).snapshot().capacity,
            Some(2)
        );
        r.apply(6, 100.0);
        assert_eq!(
            control.groups().group(RENDEZVOUS_GROUP).snapshot().capacity,
            Some(4)
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        control.stop();
        let report = r.finish(Duration::from_secs(5)).await;

        match report.rendezvous {
            Some(rv) => {
                assert_eq!(rv.capacity, 4);
                assert!(rv.complete > 0, "{rv:?}");
            }
            None => panic!("expected rendezvous report"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn tick_failures_are_reported() {
        let (r, _control) = runner(options());
        r.tick_failed(Duration::from_secs(3), "boom");
        let report = r.finish(Duration::from_secs(1)).await;
        assert_eq!(report.last_tick_failure.as_deref(), Some("boom"));
    }
}
