use std::time::Duration;

use super::{Tick, validate_spawn_rate};
use crate::adaptive::{AdaptiveFeedback, Sample};
use crate::config::AdaptiveConfig;
use crate::error::{Error, Result};
use crate::metrics::MetricsSnapshot;

/// Metric-driven shape: the target follows [`AdaptiveFeedback`].
#[derive(Debug, Clone)]
pub struct Adaptive {
    feedback: AdaptiveFeedback,
    spawn_rate: f64,
    time_limit: Option<Duration>,
}

impl Adaptive {
    pub fn new(config: AdaptiveConfig) -> Result<Self> {
        if config.time_limit.is_some_and(|limit| limit.is_zero()) {
            return Err(Error::InvalidDuration("time_limit"));
        }

        Ok(Self {
            feedback: AdaptiveFeedback::new(&config)?,
            spawn_rate: validate_spawn_rate(config.spawn_rate)?,
            time_limit: config.time_limit,
        })
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit
    }

    pub fn feedback(&self) -> &AdaptiveFeedback {
        &self.feedback
    }

    pub fn tick(&mut self, elapsed: Duration, metrics: Option<&MetricsSnapshot>) -> Tick {
        if self.time_limit.is_some_and(|limit| elapsed >= limit) {
            return Tick::Stop;
        }

        let users = match metrics {
            Some(snapshot) => {
                self.feedback
                    .decide(Sample::from_snapshot(elapsed, snapshot))
                    .target
            }
            None => self.feedback.current_target(),
        };

        Tick::Target {
            users,
            spawn_rate: self.spawn_rate,
        }
    }
}
