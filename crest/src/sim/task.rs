use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crest_core::{Release, RunControl};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use super::SimOptions;
use super::stats::RequestStats;

pub(crate) const RENDEZVOUS_GROUP: &str = "tasks";

#[derive(Debug, Default)]
pub(crate) struct RendezvousCounters {
    pub complete: AtomicU64,
    pub timed_out: AtomicU64,
    pub cancelled: AtomicU64,
    pub immediate: AtomicU64,
}

impl RendezvousCounters {
    fn record(&self, release: Release) {
        let counter = match release {
            Release::Complete => &self.complete,
            Release::TimedOut => &self.timed_out,
            Release::Cancelled => &self.cancelled,
            Release::Immediate => &self.immediate,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Decrements the live-task gauge however the task ends.
struct ActiveGuard(Arc<AtomicU64>);

impl ActiveGuard {
    fn enter(active: Arc<AtomicU64>) -> Self {
        active.fetch_add(1, Ordering::AcqRel);
        Self(active)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Everything one simulated virtual user needs.
pub(crate) struct TaskContext {
    pub id: u64,
    pub stop: Arc<AtomicBool>,
    pub options: SimOptions,
    pub control: Arc<RunControl>,
    pub stats: Arc<RequestStats>,
    pub active: Arc<AtomicU64>,
    pub rendezvous: Option<Arc<RendezvousCounters>>,
}

impl TaskContext {
    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire) || self.control.is_stopped()
    }

    fn latency(&self, rng: &mut StdRng) -> Duration {
        let active = self.active.load(Ordering::Acquire) as u32;
        let load = self.options.latency_per_user.saturating_mul(active);
        let nominal = self.options.base_latency.saturating_add(load);
        nominal.mul_f64(rng.gen_range(0.8..1.2))
    }

    /// Sleeps for `d`, returning `false` if the run stopped first.
    async fn pause(&self, d: Duration) -> bool {
        if d.is_zero() {
            return true;
        }
        tokio::select! {
            biased;
            () = self.control.stopped() => false,
            () = tokio::time::sleep(d) => true,
        }
    }

    pub(crate) async fn run(self) {
        let _active = ActiveGuard::enter(self.active.clone());
        let mut rng = StdRng::from_entropy();
        debug!(task = self.id, "task started");

        while !self.should_stop() {
            if let Some(counters) = &self.rendezvous {
                match self
                    .control
                    .groups()
                    .arrive(RENDEZVOUS_GROUP, None)
                    .await
                {
                    Ok(arrival) => counters.record(arrival.release),
                    Err(err) => warn!(task = self.id, error = %err, "rendezvous failed"),
                }
                if self.should_stop() {
                    break;
                }
            }

            let latency = self.latency(&mut rng);
            let ok = !rng.gen_bool(self.options.error_rate);
            if !self.pause(latency).await {
                break;
            }
            self.stats.record(latency, ok);

            if !self.pause(self.options.think_time).await {
                break;
            }
        }

        debug!(task = self.id, "task stopped");
    }
}
