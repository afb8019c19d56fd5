use std::time::Duration;

use crate::error::{Error, Result};

/// Shape name as used by CLI flags and config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display)]
#[strum(ascii_case_insensitive)]
pub enum ShapeKind {
    #[strum(to_string = "wave", serialize = "sine")]
    Wave,

    #[strum(to_string = "spike")]
    Spike,

    #[strum(to_string = "stairs", serialize = "stair-step", serialize = "stages")]
    Stairs,

    #[strum(to_string = "ramp-up-down", serialize = "ramp")]
    RampUpDown,

    #[strum(to_string = "adaptive")]
    Adaptive,

    #[strum(to_string = "composite")]
    Composite,

    #[strum(to_string = "random")]
    Random,
}

impl ShapeKind {
    /// Parses a shape name, mapping failures to [`Error::UnknownShape`].
    pub fn parse(name: &str) -> Result<Self> {
        name.trim()
            .parse()
            .map_err(|_| Error::UnknownShape(name.to_string()))
    }

    /// Parameter set with stock values, for callers that only override a few fields.
    #[must_use]
    pub fn default_config(self) -> ShapeConfig {
        match self {
            Self::Wave => ShapeConfig::Wave(WaveConfig::default()),
            Self::Spike => ShapeConfig::Spike(SpikeConfig::default()),
            Self::Stairs => ShapeConfig::Stairs(StairsConfig::default()),
            Self::RampUpDown => ShapeConfig::RampUpDown(RampUpDownConfig::default()),
            Self::Adaptive => ShapeConfig::Adaptive(AdaptiveConfig::default()),
            Self::Composite => ShapeConfig::Composite(CompositeConfig::default()),
            Self::Random => ShapeConfig::Random(RandomConfig::default()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WaveConfig {
    pub min_users: u64,
    pub max_users: u64,
    pub period: Duration,
    pub spawn_rate: f64,
    pub time_limit: Duration,
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self {
            min_users: 10,
            max_users: 100,
            period: Duration::from_secs(300),
            spawn_rate: 10.0,
            time_limit: Duration::from_secs(1800),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpikeConfig {
    pub base_users: u64,
    pub spike_users: u64,
    pub spike_duration: Duration,
    pub spike_interval: Duration,
    pub spawn_rate: f64,
    pub time_limit: Duration,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            base_users: 50,
            spike_users: 200,
            spike_duration: Duration::from_secs(60),
            spike_interval: Duration::from_secs(300),
            spawn_rate: 20.0,
            time_limit: Duration::from_secs(1800),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StairStep {
    pub users: u64,
    pub duration: Duration,
    /// Falls back to [`StairsConfig::spawn_rate`] when unset.
    pub spawn_rate: Option<f64>,
}

impl StairStep {
    #[must_use]
    pub fn new(users: u64, duration: Duration) -> Self {
        Self {
            users,
            duration,
            spawn_rate: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StairsConfig {
    pub steps: Vec<StairStep>,
    pub spawn_rate: f64,
}

impl Default for StairsConfig {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            spawn_rate: 10.0,
        }
    }
}

/// Upper bound on the number of steps [`StairsConfig::ladder`] generates.
pub const MAX_LADDER_STEPS: u64 = 10_000;

impl StairsConfig {
    /// Evenly spaced staircase: starts at `start_users`, adds `step_users` every
    /// `step_duration`, and tops out at `max_users`.
    pub fn ladder(
        start_users: u64,
        step_users: u64,
        step_duration: Duration,
        max_users: u64,
        spawn_rate: f64,
    ) -> Result<Self> {
        if step_users == 0 {
            return Err(Error::InvalidStepSize);
        }
        if start_users > max_users {
            return Err(Error::InvalidRange {
                min: start_users,
                max: max_users,
            });
        }
        if step_duration.is_zero() {
            return Err(Error::InvalidDuration("step_duration"));
        }

        let total_steps = (max_users - start_users)
            .div_ceil(step_users)
            .saturating_add(1);
        if total_steps > MAX_LADDER_STEPS {
            return Err(Error::TooManySteps {
                steps: total_steps,
                max: MAX_LADDER_STEPS,
            });
        }
        let steps = (0..total_steps)
            .map(|i| {
                let users = start_users
                    .saturating_add(i.saturating_mul(step_users))
                    .min(max_users);
                StairStep::new(users, step_duration)
            })
            .collect();

        Ok(Self { steps, spawn_rate })
    }
}

#[derive(Debug, Clone)]
pub struct RampUpDownConfig {
    pub target_users: u64,
    pub ramp_up_time: Duration,
    pub hold_time: Duration,
    pub ramp_down_time: Duration,
    pub spawn_rate: f64,
}

impl Default for RampUpDownConfig {
    fn default() -> Self {
        Self {
            target_users: 100,
            ramp_up_time: Duration::from_secs(300),
            hold_time: Duration::from_secs(600),
            ramp_down_time: Duration::from_secs(300),
            spawn_rate: 10.0,
        }
    }
}

/// Ceilings above which a metrics sample counts as a breach.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub latency_ms: f64,
    /// Failed requests / total requests (0..=1).
    pub error_rate: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            latency_ms: 1000.0,
            error_rate: 0.05,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdaptiveConfig {
    pub base_users: u64,
    pub min_users: u64,
    pub max_users: u64,
    /// Additive increase per good streak.
    pub step: u64,
    /// Decrease is `ceil(step * backoff_factor)`.
    pub backoff_factor: f64,
    /// Consecutive good samples required before an increase (`k`).
    pub samples: usize,
    /// Rolling window length.
    pub window_size: usize,
    pub thresholds: Thresholds,
    pub spawn_rate: f64,
    pub time_limit: Option<Duration>,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            base_users: 10,
            min_users: 1,
            max_users: 200,
            step: 5,
            backoff_factor: 2.0,
            samples: 3,
            window_size: 30,
            thresholds: Thresholds::default(),
            spawn_rate: 10.0,
            time_limit: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhaseConfig {
    /// Offset from test start at which the phase becomes eligible.
    pub start: Duration,
    /// Window length; `None` keeps the phase active until its shape stops.
    pub duration: Option<Duration>,
    pub shape: ShapeConfig,
}

#[derive(Debug, Clone, Default)]
pub struct CompositeConfig {
    pub phases: Vec<PhaseConfig>,
}

#[derive(Debug, Clone)]
pub struct RandomConfig {
    pub min_users: u64,
    pub max_users: u64,
    pub change_interval: Duration,
    pub spawn_rate: f64,
    pub time_limit: Duration,
    /// Fixed seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for RandomConfig {
    fn default() -> Self {
        Self {
            min_users: 10,
            max_users: 100,
            change_interval: Duration::from_secs(60),
            spawn_rate: 10.0,
            time_limit: Duration::from_secs(1800),
            seed: None,
        }
    }
}

/// A named shape plus its parameters, as selected at test start.
#[derive(Debug, Clone)]
pub enum ShapeConfig {
    Wave(WaveConfig),
    Spike(SpikeConfig),
    Stairs(StairsConfig),
    RampUpDown(RampUpDownConfig),
    Adaptive(AdaptiveConfig),
    Composite(CompositeConfig),
    Random(RandomConfig),
}

impl ShapeConfig {
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
}
