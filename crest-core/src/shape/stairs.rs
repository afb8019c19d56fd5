use std::time::Duration;

use super::{Tick, validate_spawn_rate};
use crate::config::{StairStep, StairsConfig};
use crate::error::{Error, Result};

/// Holds each step's user count for the step's duration, in order.
#[derive(Debug, Clone)]
pub struct Stairs {
    steps: Vec<StairStep>,
    spawn_rate: f64,
    cumulative_ends: Vec<Duration>,
}

impl Stairs {
    pub fn new(config: StairsConfig) -> Result<Self> {
        if config.steps.is_empty() {
            return Err(Error::EmptySteps);
        }
        let spawn_rate = validate_spawn_rate(config.spawn_rate)?;

        let mut cumulative_ends = Vec::with_capacity(config.steps.len());
        let mut acc = Duration::ZERO;
        for (index, step) in config.steps.iter().enumerate() {
            if step.duration.is_zero() {
                return Err(Error::InvalidStep { index });
            }
            if let Some(rate) = step.spawn_rate {
                validate_spawn_rate(rate)?;
            }
            acc = acc.saturating_add(step.duration);
            cumulative_ends.push(acc);
        }

        Ok(Self {
            steps: config.steps,
            spawn_rate,
            cumulative_ends,
        })
    }

    pub fn steps(&self) -> &[StairStep] {
        &self.steps
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Index of the step active at `elapsed`; a step ends exactly at its boundary.
    pub fn step_index_at(&self, elapsed: Duration) -> Option<usize> {
        let idx = self.cumulative_ends.partition_point(|end| *end <= elapsed);
        (idx < self.steps.len()).then_some(idx)
    }

    pub fn tick(&self, elapsed: Duration) -> Tick {
        let Some(idx) = self.step_index_at(elapsed) else {
            return Tick::Stop;
        };

        let step = &self.steps[idx];
        Tick::Target {
            users: step.users,
            spawn_rate: step.spawn_rate.unwrap_or(self.spawn_rate),
        }
    }
}
