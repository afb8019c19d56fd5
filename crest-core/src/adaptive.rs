//! Additive-increase / multiplicative-decrease controller behind the adaptive shape.
//!
//! The controller keeps a bounded window of recent samples. A target only moves up
//! after `samples` consecutive samples under both thresholds, and moves down by
//! `ceil(step * backoff_factor)` as soon as one sample breaches either of them, so
//! recovery downward is always faster than growth upward.

use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::{AdaptiveConfig, Thresholds};
use crate::error::{Error, Result};
use crate::metrics::MetricsSnapshot;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Run time at which the sample was taken.
    pub at: Duration,
    pub avg_latency_ms: f64,
    pub error_rate: f64,
}

impl Sample {
    #[must_use]
    pub fn from_snapshot(at: Duration, snapshot: &MetricsSnapshot) -> Self {
        Self {
            at,
            avg_latency_ms: snapshot.avg_latency_ms,
            error_rate: snapshot.error_rate,
        }
    }

    fn is_valid(&self) -> bool {
        self.avg_latency_ms.is_finite()
            && self.avg_latency_ms >= 0.0
            && self.error_rate.is_finite()
            && (0.0..=1.0).contains(&self.error_rate)
    }

    fn breaches(&self, thresholds: &Thresholds) -> bool {
        self.avg_latency_ms >= thresholds.latency_ms || self.error_rate >= thresholds.error_rate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Window not yet filled with `samples` entries.
    WarmingUp,
    Hold,
    Increase,
    Decrease,
    /// Malformed sample dropped; previous target kept.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub target: u64,
    pub change: Change,
}

#[derive(Debug, Clone)]
pub struct AdaptiveFeedback {
    min_users: u64,
    max_users: u64,
    step: u64,
    decrease: u64,
    samples: usize,
    window_size: usize,
    thresholds: Thresholds,

    window: VecDeque<Sample>,
    current_target: u64,
    good_streak: usize,
}

impl AdaptiveFeedback {
    pub fn new(config: &AdaptiveConfig) -> Result<Self> {
        if config.min_users > config.max_users {
            return Err(Error::InvalidRange {
                min: config.min_users,
                max: config.max_users,
            });
        }
        if !(config.min_users..=config.max_users).contains(&config.base_users) {
            return Err(Error::InvalidUsers {
                field: "base_users",
                value: config.base_users,
                min: config.min_users,
                max: config.max_users,
            });
        }
        if config.step == 0 {
            return Err(Error::InvalidStepSize);
        }
        if !config.backoff_factor.is_finite() || config.backoff_factor <= 1.0 {
            return Err(Error::InvalidBackoff(config.backoff_factor));
        }
        if config.samples == 0 || config.samples > config.window_size {
            return Err(Error::InvalidSamples {
                samples: config.samples,
                window_size: config.window_size,
            });
        }
        let thresholds = config.thresholds;
        if !thresholds.latency_ms.is_finite() || thresholds.latency_ms <= 0.0 {
            return Err(Error::InvalidThreshold("latency_threshold"));
        }
        if !thresholds.error_rate.is_finite() || thresholds.error_rate <= 0.0 {
            return Err(Error::InvalidThreshold("error_threshold"));
        }

        let decrease = (config.step as f64 * config.backoff_factor).ceil() as u64;

        Ok(Self {
            min_users: config.min_users,
            max_users: config.max_users,
            step: config.step,
            decrease,
            samples: config.samples,
            window_size: config.window_size,
            thresholds,
            window: VecDeque::with_capacity(config.window_size),
            current_target: config.base_users,
            good_streak: 0,
        })
    }

    pub fn current_target(&self) -> u64 {
        self.current_target
    }

    pub fn window(&self) -> impl Iterator<Item = &Sample> {
        self.window.iter()
    }

    /// Feeds one sample and returns the next target.
    pub fn decide(&mut self, sample: Sample) -> Decision {
        if !sample.is_valid() {
            debug!(
                at = ?sample.at,
                avg_latency_ms = sample.avg_latency_ms,
                error_rate = sample.error_rate,
                "discarding malformed metrics sample"
            );
            return self.decision(Change::Discarded);
        }

        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(sample);

        let breached = sample.breaches(&self.thresholds);
        if breached {
            self.good_streak = 0;
        } else {
            self.good_streak += 1;
        }

        if self.window.len() < self.samples {
            return self.decision(Change::WarmingUp);
        }

        if breached {
            let next = self
                .current_target
                .saturating_sub(self.decrease)
                .max(self.min_users);
            return self.apply(next, Change::Decrease, &sample);
        }

        if self.good_streak >= self.samples {
            self.good_streak = 0;
            let next = self
                .current_target
                .saturating_add(self.step)
                .min(self.max_users);
            return self.apply(next, Change::Increase, &sample);
        }

        self.decision(Change::Hold)
    }

    fn apply(&mut self, next: u64, change: Change, sample: &Sample) -> Decision {
        if next == self.current_target {
            return self.decision(Change::Hold);
        }

        info!(
            from = self.current_target,
            to = next,
            avg_latency_ms = sample.avg_latency_ms,
            error_rate = sample.error_rate,
            ?change,
            "adaptive target adjusted"
        );
        self.current_target = next;
        self.decision(change)
    }

    fn decision(&self, change: Change) -> Decision {
        Decision {
            target: self.current_target,
            change,
        }
    }
}
