use std::time::Duration;

use super::{LoadShape, Tick};
use crate::config::CompositeConfig;
use crate::error::{Error, Result};
use crate::metrics::MetricsSnapshot;

#[derive(Debug, Clone)]
struct Phase {
    start: Duration,
    end: Option<Duration>,
    shape: LoadShape,
    finished: bool,
}

impl Phase {
    fn expired(&self, elapsed: Duration) -> bool {
        self.end.is_some_and(|end| elapsed >= end)
    }
}

/// Sequence of sub-shapes, each active inside its own window.
///
/// The most recently started phase that has neither stopped nor outlived its
/// window drives the tick, with elapsed time translated to the phase's local
/// clock. Between windows the last target is held.
#[derive(Debug, Clone)]
pub struct Composite {
    phases: Vec<Phase>,
    last: Option<Tick>,
}

impl Composite {
    pub fn new(config: CompositeConfig) -> Result<Self> {
        let Some(first) = config.phases.first() else {
            return Err(Error::InvalidPhases("at least one phase is required"));
        };
        if !first.start.is_zero() {
            return Err(Error::InvalidPhases("the first phase must start at 0"));
        }
        if config
            .phases
            .windows(2)
            .any(|pair| pair[1].start < pair[0].start)
        {
            return Err(Error::InvalidPhases("phase starts must be in order"));
        }
        if config
            .phases
            .iter()
            .any(|p| p.duration.is_some_and(|d| d.is_zero()))
        {
            return Err(Error::InvalidPhases("phase durations must be positive"));
        }

        let mut phases = Vec::with_capacity(config.phases.len());
        for phase in config.phases {
            phases.push(Phase {
                start: phase.start,
                end: phase.duration.map(|d| phase.start.saturating_add(d)),
                shape: LoadShape::from_config(phase.shape)?,
                finished: false,
            });
        }

        Ok(Self { phases, last: None })
    }

    /// Known end of the last phase, if every bound on it is static.
    pub fn time_limit(&self) -> Option<Duration> {
        let last = self.phases.last()?;
        let own = last
            .shape
            .time_limit()
            .map(|limit| last.start.saturating_add(limit));
        match (last.end, own) {
            (Some(end), Some(own)) => Some(end.min(own)),
            (end, own) => end.or(own),
        }
    }

    pub fn tick(&mut self, elapsed: Duration, metrics: Option<&MetricsSnapshot>) -> Tick {
        for phase in &mut self.phases {
            if !phase.finished && phase.expired(elapsed) {
                phase.finished = true;
            }
        }

        let last_idx = self.phases.len() - 1;
        if self.phases[last_idx].finished {
            return Tick::Stop;
        }

        // Latest started phase first; fall back to earlier ones if it stops on this tick.
        let mut candidates: Vec<usize> = self
            .phases
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.finished && p.start <= elapsed)
            .map(|(idx, _)| idx)
            .collect();

        while let Some(idx) = candidates.pop() {
            let phase = &mut self.phases[idx];
            let local = elapsed.saturating_sub(phase.start);
            match phase.shape.tick(local, metrics) {
                Tick::Stop => {
                    phase.finished = true;
                    if idx == last_idx {
                        return Tick::Stop;
                    }
                }
                tick => {
                    self.last = Some(tick);
                    return tick;
                }
            }
        }

        // Gap between windows.
        self.last.unwrap_or(Tick::Target {
            users: 0,
            spawn_rate: 1.0,
        })
    }
}
