use std::f64::consts::TAU;
use std::time::Duration;

use super::{Tick, round_users, validate_positive, validate_range, validate_spawn_rate};
use crate::config::WaveConfig;
use crate::error::Result;

/// Sine wave between `min_users` and `max_users`.
#[derive(Debug, Clone)]
pub struct Wave {
    min_users: u64,
    max_users: u64,
    period: Duration,
    spawn_rate: f64,
    time_limit: Duration,
}

impl Wave {
    pub fn new(config: WaveConfig) -> Result<Self> {
        validate_range(config.min_users, config.max_users)?;
        Ok(Self {
            min_users: config.min_users,
            max_users: config.max_users,
            period: validate_positive(config.period, "period")?,
            spawn_rate: validate_spawn_rate(config.spawn_rate)?,
            time_limit: validate_positive(config.time_limit, "time_limit")?,
        })
    }

    pub fn time_limit(&self) -> Duration {
        self.time_limit
    }

    pub fn tick(&self, elapsed: Duration) -> Tick {
        if elapsed >= self.time_limit {
            return Tick::Stop;
        }

        let phase = elapsed.as_secs_f64() / self.period.as_secs_f64();
        let wave = (TAU * phase).sin();
        let range = (self.max_users - self.min_users) as f64;
        let users = round_users(self.min_users as f64 + range * (1.0 + wave) / 2.0);

        Tick::Target {
            users: users.clamp(self.min_users, self.max_users),
            spawn_rate: self.spawn_rate,
        }
    }
}
