//! Load shapes: functions of elapsed run time (and, for the adaptive shape, live
//! metrics) that decide how many virtual users should be running.
//!
//! Every shape is a variant of the closed [`LoadShape`] enum and is driven through
//! [`LoadShape::tick`]. Elapsed time is always supplied by the caller, so a shape can
//! be replayed deterministically in tests.

mod adaptive;
mod composite;
mod ramp;
mod random;
mod spike;
mod stairs;
mod wave;

use std::time::Duration;

pub use adaptive::Adaptive;
pub use composite::Composite;
pub use ramp::RampUpDown;
pub use random::RandomShape;
pub use spike::Spike;
pub use stairs::Stairs;
pub use wave::Wave;

use crate::config::{ShapeConfig, ShapeKind};
use crate::error::{Error, Result};
use crate::metrics::MetricsSnapshot;

/// Result of one shape tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    /// Converge to `users` running tasks, starting/stopping about `spawn_rate` per second.
    Target { users: u64, spawn_rate: f64 },
    /// The shape is done. Terminal for the shape instance.
    Stop,
}

impl Tick {
    #[must_use]
    pub fn users(&self) -> Option<u64> {
        match self {
            Self::Target { users, .. } => Some(*users),
            Self::Stop => None,
        }
    }

    #[must_use]
    pub fn is_stop(&self) -> bool {
        matches!(self, Self::Stop)
    }
}

#[derive(Debug, Clone)]
pub enum LoadShape {
    Wave(Wave),
    Spike(Spike),
    Stairs(Stairs),
    RampUpDown(RampUpDown),
    Adaptive(Adaptive),
    Composite(Composite),
    Random(RandomShape),
}

impl LoadShape {
    /// Validates `config` and builds the matching shape.
    pub fn from_config(config: ShapeConfig) -> Result<Self> {
        Ok(match config {
            ShapeConfig::Wave(c) => Self::Wave(Wave::new(c)?),
            ShapeConfig::Spike(c) => Self::Spike(Spike::new(c)?),
            ShapeConfig::Stairs(c) => Self::Stairs(Stairs::new(c)?),
            ShapeConfig::RampUpDown(c) => Self::RampUpDown(RampUpDown::new(c)?),
            ShapeConfig::Adaptive(c) => Self::Adaptive(Adaptive::new(c)?),
            ShapeConfig::Composite(c) => Self::Composite(Composite::new(c)?),
            ShapeConfig::Random(c) => Self::Random(RandomShape::new(c)?),
        })
    }

    #[must_use]
    pub fn kind(&self) -> ShapeKind {
        match self {
            Self::Wave(_) => ShapeKind::Wave,
            Self::Spike(_) => ShapeKind::Spike,
            Self::Stairs(_) => ShapeKind::Stairs,
            Self::RampUpDown(_) => ShapeKind::RampUpDown,
            Self::Adaptive(_) => ShapeKind::Adaptive,
            Self::Composite(_) => ShapeKind::Composite,
            Self::Random(_) => ShapeKind::Random,
        }
    }

    /// Decision for run time `elapsed`.
    ///
    /// Once `Tick::Stop` is returned the instance must not be ticked again.
    pub fn tick(&mut self, elapsed: Duration, metrics: Option<&MetricsSnapshot>) -> Tick {
        match self {
            Self::Wave(s) => s.tick(elapsed),
            Self::Spike(s) => s.tick(elapsed),
            Self::Stairs(s) => s.tick(elapsed),
            Self::RampUpDown(s) => s.tick(elapsed),
            Self::Adaptive(s) => s.tick(elapsed, metrics),
            Self::Composite(s) => s.tick(elapsed, metrics),
            Self::Random(s) => s.tick(elapsed),
        }
    }

    /// Total run time after which the shape stops, if it is bounded.
    #[must_use]
    pub fn time_limit(&self) -> Option<Duration> {
        match self {
            Self::Wave(s) => Some(s.time_limit()),
            Self::Spike(s) => Some(s.time_limit()),
            Self::Stairs(s) => Some(s.total_duration()),
            Self::RampUpDown(s) => Some(s.total_duration()),
            Self::Adaptive(s) => s.time_limit(),
            Self::Composite(s) => s.time_limit(),
            Self::Random(s) => Some(s.time_limit()),
        }
    }
}

/// Nearest integer, ties rounding up. Negative inputs map to 0.
pub(crate) fn round_users(value: f64) -> u64 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    (value + 0.5).floor() as u64
}

pub(crate) fn validate_spawn_rate(rate: f64) -> Result<f64> {
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err(Error::InvalidSpawnRate(rate))
    }
}

pub(crate) fn validate_range(min: u64, max: u64) -> Result<()> {
    if min > max {
        return Err(Error::InvalidRange { min, max });
    }
    Ok(())
}

pub(crate) fn validate_positive(value: Duration, field: &'static str) -> Result<Duration> {
    if value.is_zero() {
        return Err(Error::InvalidDuration(field));
    }
    Ok(value)
}
