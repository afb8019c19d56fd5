use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::control::RunControl;
use crate::error::{Error, Result};
use crate::metrics::MetricsSnapshot;
use crate::shape::{LoadShape, Tick};

/// The task-control side of a run, driven by [`ShapeClock`].
pub trait LoadRunner: Send + Sync {
    /// Metrics for the interval since the previous tick. `None` before any data exists.
    fn metrics(&self) -> Option<MetricsSnapshot>;

    /// Converge to `users` running tasks, starting or stopping about `spawn_rate` per second.
    fn apply(&self, users: u64, spawn_rate: f64);

    /// The shape has finished; stop all tasks.
    fn shutdown(&self);

    /// A tick failed. The previous target stays in effect.
    fn tick_failed(&self, _elapsed: Duration, _message: &str) {}
}

#[derive(Debug, Clone, Copy)]
pub struct ClockOptions {
    pub cadence: Duration,
    /// Hard ceiling applied to every target, whatever the shape asks for.
    pub max_users: Option<u64>,
}

impl Default for ClockOptions {
    fn default() -> Self {
        Self {
            cadence: Duration::from_secs(1),
            max_users: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockExit {
    /// The shape returned `Tick::Stop`; the runner was shut down.
    ShapeStopped,
    /// The run was stopped through [`RunControl`].
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSummary {
    pub ticks: u64,
    pub failed_ticks: u64,
    pub last_target: Option<u64>,
    pub elapsed: Duration,
    pub exit: ClockExit,
}

/// Fires [`LoadShape::tick`] at a fixed cadence and forwards each decision to a
/// [`LoadRunner`].
///
/// Ticks never overlap. A slow tick delays the next one instead of causing a burst.
#[derive(Debug, Clone)]
pub struct ShapeClock {
    options: ClockOptions,
}

impl ShapeClock {
    pub fn new(options: ClockOptions) -> Result<Self> {
        if options.cadence.is_zero() {
            return Err(Error::InvalidCadence);
        }
        Ok(Self { options })
    }

    pub fn cadence(&self) -> Duration {
        self.options.cadence
    }

    pub async fn run<R>(&self, shape: &mut LoadShape, runner: &R, control: &RunControl) -> ClockSummary
    where
        R: LoadRunner + ?Sized,
    {
        let started = Instant::now();
        let mut interval = tokio::time::interval(self.options.cadence);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            shape = %shape.kind(),
            cadence = ?self.options.cadence,
            time_limit = ?shape.time_limit(),
            "shape clock started"
        );

        let mut ticks = 0u64;
        let mut failed_ticks = 0u64;
        let mut last_target = None;

        let exit = loop {
            tokio::select! {
                biased;
                () = control.stopped() => break ClockExit::Cancelled,
                _ = interval.tick() => {}
            }

            let elapsed = started.elapsed();
            ticks += 1;

            let outcome = catch_unwind(AssertUnwindSafe(|| {
                let metrics = runner.metrics();
                shape.tick(elapsed, metrics.as_ref())
            }));

            match outcome {
                Ok(Tick::Stop) => {
                    info!(elapsed = ?elapsed, "shape finished");
                    runner.shutdown();
                    break ClockExit::ShapeStopped;
                }
                Ok(Tick::Target { users, spawn_rate }) => {
                    let users = match self.options.max_users {
                        Some(cap) => users.min(cap),
                        None => users,
                    };
                    debug!(elapsed = ?elapsed, users, spawn_rate, "tick");
                    runner.apply(users, spawn_rate);
                    last_target = Some(users);
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(elapsed = ?elapsed, error = %message, "tick failed; holding previous target");
                    failed_ticks += 1;
                    runner.tick_failed(elapsed, &message);
                }
            }
        };

        let elapsed = started.elapsed();
        if exit == ClockExit::Cancelled {
            info!(elapsed = ?elapsed, ticks, "shape clock cancelled");
        }

        ClockSummary {
            ticks,
            failed_ticks,
            last_target,
            elapsed,
            exit,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "tick panicked".to_string()
    }
}
