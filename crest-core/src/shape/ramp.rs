use std::time::Duration;

use super::{Tick, round_users, validate_positive, validate_spawn_rate};
use crate::config::RampUpDownConfig;
use crate::error::Result;

/// Linear ramp to `target_users`, hold, linear ramp back to zero.
#[derive(Debug, Clone)]
pub struct RampUpDown {
    target_users: u64,
    ramp_up_time: Duration,
    hold_time: Duration,
    ramp_down_time: Duration,
    spawn_rate: f64,
}

impl RampUpDown {
    pub fn new(config: RampUpDownConfig) -> Result<Self> {
        let total = config
            .ramp_up_time
            .saturating_add(config.hold_time)
            .saturating_add(config.ramp_down_time);
        validate_positive(total, "ramp_up_time + hold_time + ramp_down_time")?;

        Ok(Self {
            target_users: config.target_users,
            ramp_up_time: config.ramp_up_time,
            hold_time: config.hold_time,
            ramp_down_time: config.ramp_down_time,
            spawn_rate: validate_spawn_rate(config.spawn_rate)?,
        })
    }

    pub fn total_duration(&self) -> Duration {
        self.ramp_up_time
            .saturating_add(self.hold_time)
            .saturating_add(self.ramp_down_time)
    }

    pub fn tick(&self, elapsed: Duration) -> Tick {
        if elapsed >= self.total_duration() {
            return Tick::Stop;
        }

        let target = self.target_users as f64;
        let hold_end = self.ramp_up_time.saturating_add(self.hold_time);

        let users = if elapsed < self.ramp_up_time {
            let progress = elapsed.as_secs_f64() / self.ramp_up_time.as_secs_f64();
            round_users(target * progress)
        } else if elapsed < hold_end {
            self.target_users
        } else {
            let down = elapsed.saturating_sub(hold_end).as_secs_f64();
            let progress = 1.0 - down / self.ramp_down_time.as_secs_f64();
            round_users(target * progress)
        };

        Tick::Target {
            users: users.min(self.target_users),
            spawn_rate: self.spawn_rate,
        }
    }
}
