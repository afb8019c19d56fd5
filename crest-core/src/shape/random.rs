use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Tick, validate_positive, validate_range, validate_spawn_rate};
use crate::config::RandomConfig;
use crate::error::Result;

/// Draws a fresh user count in `[min_users, max_users]` once per `change_interval`.
///
/// The first interval runs at `min_users`. Draws are made lazily when a tick lands
/// in a new interval, so skipped intervals never consume randomness.
#[derive(Debug, Clone)]
pub struct RandomShape {
    min_users: u64,
    max_users: u64,
    change_interval: Duration,
    spawn_rate: f64,
    time_limit: Duration,

    rng: StdRng,
    window: u128,
    current: u64,
}

impl RandomShape {
    pub fn new(config: RandomConfig) -> Result<Self> {
        validate_range(config.min_users, config.max_users)?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            min_users: config.min_users,
            max_users: config.max_users,
            change_interval: validate_positive(config.change_interval, "change_interval")?,
            spawn_rate: validate_spawn_rate(config.spawn_rate)?,
            time_limit: validate_positive(config.time_limit, "time_limit")?,
            rng,
            window: 0,
            current: config.min_users,
        })
    }

    pub fn time_limit(&self) -> Duration {
        self.time_limit
    }

    pub fn tick(&mut self, elapsed: Duration) -> Tick {
        if elapsed >= self.time_limit {
            return Tick::Stop;
        }

        let window = elapsed.as_nanos() / self.change_interval.as_nanos();
        if window != self.window {
            self.window = window;
            self.current = self.rng.gen_range(self.min_users..=self.max_users);
        }

        Tick::Target {
            users: self.current,
            spawn_rate: self.spawn_rate,
        }
    }
}
