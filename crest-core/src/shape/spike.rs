use std::time::Duration;

use super::{Tick, validate_positive, validate_spawn_rate};
use crate::config::SpikeConfig;
use crate::error::Result;

/// Periodic bursts on top of a base load.
#[derive(Debug, Clone)]
pub struct Spike {
    base_users: u64,
    spike_users: u64,
    spike_duration: Duration,
    spike_interval: Duration,
    spawn_rate: f64,
    time_limit: Duration,
}

impl Spike {
    pub fn new(config: SpikeConfig) -> Result<Self> {
        Ok(Self {
            base_users: config.base_users,
            spike_users: config.spike_users,
            spike_duration: validate_positive(config.spike_duration, "spike_duration")?,
            spike_interval: validate_positive(config.spike_interval, "spike_interval")?,
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

        let position = elapsed.as_nanos() % self.spike_interval.as_nanos();
        let users = if position < self.spike_duration.as_nanos() {
            self.spike_users
        } else {
            self.base_users
        };

        Tick::Target {
            users,
            spawn_rate: self.spawn_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn spike() -> Spike {
        match Spike::new(SpikeConfig {
            base_users: 20,
            spike_users: 100,
            spike_duration: Duration::from_secs(10),
            spike_interval: Duration::from_secs(60),
            spawn_rate: 50.0,
            time_limit: Duration::from_secs(180),
        }) {
            Ok(v) => v,
            Err(err) => panic!("invalid spike: {err}"),
        }
    }

    #[test]
    fn spikes_at_the_start_of_each_interval() {
        let s = spike();
        let at = |secs: u64| s.tick(Duration::from_secs(secs)).users();

        assert_eq!(at(0), Some(100));
        assert_eq!(at(9), Some(100));
        assert_eq!(at(10), Some(20));
        assert_eq!(at(59), Some(20));
        assert_eq!(at(60), Some(100));
        assert_eq!(at(125), Some(20));
        assert_eq!(at(180), None);
    }

    #[test]
    fn carries_spawn_rate() {
        match spike().tick(Duration::from_secs(1)) {
            Tick::Target { spawn_rate, .. } => assert_eq!(spawn_rate, 50.0),
            Tick::Stop => panic!("unexpected stop"),
        }
    }

    #[test]
    fn rejects_zero_interval() {
        assert!(matches!(
            Spike::new(SpikeConfig {
                spike_interval: Duration::ZERO,
                ..SpikeConfig::default()
            }),
            Err(Error::InvalidDuration("spike_interval"))
        ));
    }
}
