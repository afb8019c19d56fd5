use std::time::Duration;

use anyhow::Context as _;
use crest_core::{
    AdaptiveConfig, CompositeConfig, PhaseConfig, RampUpDownConfig, RandomConfig, ShapeConfig,
    ShapeKind, SpikeConfig, StairStep, StairsConfig, Thresholds, WaveConfig,
};

use crate::cli::ShapeArgs;
use crate::shape_yaml::load_shape_yaml;

// Stairs ladder used when neither explicit steps nor ladder parameters are given.
const LADDER_START_USERS: u64 = 10;
const LADDER_STEP_USERS: u64 = 20;
const LADDER_STEP_DURATION: Duration = Duration::from_secs(120);
const LADDER_MAX_USERS: u64 = 200;

/// Shape parameters as written by a user, before defaults are filled in.
///
/// Both the CLI flags and YAML documents produce this; a field left `None` takes
/// the shape's stock value.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ShapeParams {
    pub min_users: Option<u64>,
    pub max_users: Option<u64>,
    pub period: Option<Duration>,
    pub spawn_rate: Option<f64>,
    pub time_limit: Option<Duration>,
    pub base_users: Option<u64>,
    pub spike_users: Option<u64>,
    pub spike_duration: Option<Duration>,
    pub spike_interval: Option<Duration>,
    pub target_users: Option<u64>,
    pub ramp_up: Option<Duration>,
    pub hold: Option<Duration>,
    pub ramp_down: Option<Duration>,
    pub step: Option<u64>,
    pub step_duration: Option<Duration>,
    pub steps: Vec<StairStep>,
    pub latency_threshold: Option<f64>,
    pub error_threshold: Option<f64>,
    pub samples: Option<usize>,
    pub window_size: Option<usize>,
    pub backoff_factor: Option<f64>,
    pub change_interval: Option<Duration>,
    pub seed: Option<u64>,
}

impl ShapeParams {
    /// `over` wins wherever it sets a value.
    #[must_use]
    pub(crate) fn merge(self, over: ShapeParams) -> ShapeParams {
        ShapeParams {
            min_users: over.min_users.or(self.min_users),
            max_users: over.max_users.or(self.max_users),
            period: over.period.or(self.period),
            spawn_rate: over.spawn_rate.or(self.spawn_rate),
            time_limit: over.time_limit.or(self.time_limit),
            base_users: over.base_users.or(self.base_users),
            spike_users: over.spike_users.or(self.spike_users),
            spike_duration: over.spike_duration.or(self.spike_duration),
            spike_interval: over.spike_interval.or(self.spike_interval),
            target_users: over.target_users.or(self.target_users),
            ramp_up: over.ramp_up.or(self.ramp_up),
            hold: over.hold.or(self.hold),
            ramp_down: over.ramp_down.or(self.ramp_down),
            step: over.step.or(self.step),
            step_duration: over.step_duration.or(self.step_duration),
            steps: if over.steps.is_empty() {
                self.steps
            } else {
                over.steps
            },
            latency_threshold: over.latency_threshold.or(self.latency_threshold),
            error_threshold: over.error_threshold.or(self.error_threshold),
            samples: over.samples.or(self.samples),
            window_size: over.window_size.or(self.window_size),
            backoff_factor: over.backoff_factor.or(self.backoff_factor),
            change_interval: over.change_interval.or(self.change_interval),
            seed: over.seed.or(self.seed),
        }
    }

    pub(crate) fn build(
        &self,
        kind: ShapeKind,
        phases: Vec<PhaseConfig>,
    ) -> crest_core::Result<ShapeConfig> {
        Ok(match kind {
            ShapeKind::Wave => {
                let d = WaveConfig::default();
                ShapeConfig::Wave(WaveConfig {
                    min_users: self.min_users.unwrap_or(d.min_users),
                    max_users: self.max_users.unwrap_or(d.max_users),
                    period: self.period.unwrap_or(d.period),
                    spawn_rate: self.spawn_rate.unwrap_or(d.spawn_rate),
                    time_limit: self.time_limit.unwrap_or(d.time_limit),
                })
            }
            ShapeKind::Spike => {
                let d = SpikeConfig::default();
                ShapeConfig::Spike(SpikeConfig {
                    base_users: self.base_users.unwrap_or(d.base_users),
                    spike_users: self.spike_users.unwrap_or(d.spike_users),
                    spike_duration: self.spike_duration.unwrap_or(d.spike_duration),
                    spike_interval: self.spike_interval.unwrap_or(d.spike_interval),
                    spawn_rate: self.spawn_rate.unwrap_or(d.spawn_rate),
                    time_limit: self.time_limit.unwrap_or(d.time_limit),
                })
            }
            ShapeKind::Stairs => {
                let spawn_rate = self
                    .spawn_rate
                    .unwrap_or(StairsConfig::default().spawn_rate);
                if self.steps.is_empty() {
                    ShapeConfig::Stairs(StairsConfig::ladder(
                        self.min_users.unwrap_or(LADDER_START_USERS),
                        self.step.unwrap_or(LADDER_STEP_USERS),
                        self.step_duration.unwrap_or(LADDER_STEP_DURATION),
                        self.max_users.unwrap_or(LADDER_MAX_USERS),
                        spawn_rate,
                    )?)
                } else {
                    ShapeConfig::Stairs(StairsConfig {
                        steps: self.steps.clone(),
                        spawn_rate,
                    })
                }
            }
            ShapeKind::RampUpDown => {
                let d = RampUpDownConfig::default();
                ShapeConfig::RampUpDown(RampUpDownConfig {
                    target_users: self.target_users.unwrap_or(d.target_users),
                    ramp_up_time: self.ramp_up.unwrap_or(d.ramp_up_time),
                    hold_time: self.hold.unwrap_or(d.hold_time),
                    ramp_down_time: self.ramp_down.unwrap_or(d.ramp_down_time),
                    spawn_rate: self.spawn_rate.unwrap_or(d.spawn_rate),
                })
            }
            ShapeKind::Adaptive => {
                let d = AdaptiveConfig::default();
                ShapeConfig::Adaptive(AdaptiveConfig {
                    base_users: self.base_users.unwrap_or(d.base_users),
                    min_users: self.min_users.unwrap_or(d.min_users),
                    max_users: self.max_users.unwrap_or(d.max_users),
                    step: self.step.unwrap_or(d.step),
                    backoff_factor: self.backoff_factor.unwrap_or(d.backoff_factor),
                    samples: self.samples.unwrap_or(d.samples),
                    window_size: self.window_size.unwrap_or(d.window_size),
                    thresholds: Thresholds {
                        latency_ms: self.latency_threshold.unwrap_or(d.thresholds.latency_ms),
                        error_rate: self.error_threshold.unwrap_or(d.thresholds.error_rate),
                    },
                    spawn_rate: self.spawn_rate.unwrap_or(d.spawn_rate),
                    time_limit: self.time_limit.or(d.time_limit),
                })
            }
            ShapeKind::Composite => ShapeConfig::Composite(CompositeConfig { phases }),
            ShapeKind::Random => {
                let d = RandomConfig::default();
                ShapeConfig::Random(RandomConfig {
                    min_users: self.min_users.unwrap_or(d.min_users),
                    max_users: self.max_users.unwrap_or(d.max_users),
                    change_interval: self.change_interval.unwrap_or(d.change_interval),
                    spawn_rate: self.spawn_rate.unwrap_or(d.spawn_rate),
                    time_limit: self.time_limit.unwrap_or(d.time_limit),
                    seed: self.seed.or(d.seed),
                })
            }
        })
    }
}

impl From<&ShapeArgs> for ShapeParams {
    fn from(args: &ShapeArgs) -> Self {
        Self {
            min_users: args.min_users,
            max_users: args.max_users,
            period: args.period,
            spawn_rate: args.spawn_rate,
            time_limit: args.time_limit,
            base_users: args.base_users,
            spike_users: args.spike_users,
            spike_duration: args.spike_duration,
            spike_interval: args.spike_interval,
            target_users: args.target_users,
            ramp_up: args.ramp_up,
            hold: args.hold,
            ramp_down: args.ramp_down,
            step: args.step,
            step_duration: args.step_duration,
            steps: args.steps.clone(),
            latency_threshold: args.latency_threshold,
            error_threshold: args.error_threshold,
            samples: args.samples,
            window_size: args.window_size,
            backoff_factor: args.backoff_factor,
            change_interval: args.change_interval,
            seed: args.seed,
        }
    }
}

/// Turns `--shape`/`--config` plus parameter flags into a shape configuration.
///
/// Flags override values from the YAML file. Validation happens later, when the
/// shape is built.
pub(crate) async fn resolve_shape(args: &ShapeArgs) -> anyhow::Result<ShapeConfig> {
    let overrides = ShapeParams::from(args);

    if let Some(path) = &args.config {
        let doc = load_shape_yaml(path).await?;
        return doc
            .into_config(overrides)
            .with_context(|| format!("invalid shape file: {}", path.display()));
    }

    let Some(name) = &args.shape else {
        anyhow::bail!("either --shape or --config is required");
    };
    let kind = ShapeKind::parse(name)?;
    if kind == ShapeKind::Composite {
        anyhow::bail!("composite shapes need phases; describe them in a YAML file (--config)");
    }
    Ok(overrides.build(kind, Vec::new())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(kind: ShapeKind, params: &ShapeParams) -> ShapeConfig {
        match params.build(kind, Vec::new()) {
            Ok(v) => v,
            Err(err) => panic!("build failed: {err}"),
        }
    }

    #[test]
    fn unset_fields_take_stock_values() {
        match build(ShapeKind::Wave, &ShapeParams::default()) {
            ShapeConfig::Wave(c) => {
                assert_eq!(c.min_users, 10);
                assert_eq!(c.max_users, 100);
                assert_eq!(c.period, Duration::from_secs(300));
            }
            other => panic!("expected wave, got {other:?}"),
        }
    }

    #[test]
    fn merge_prefers_overrides() {
        let base = ShapeParams {
            min_users: Some(1),
            max_users: Some(9),
            steps: vec![StairStep::new(1, Duration::from_secs(1))],
            ..ShapeParams::default()
        };
        let over = ShapeParams {
            max_users: Some(50),
            ..ShapeParams::default()
        };

        let merged = base.merge(over);
        assert_eq!(merged.min_users, Some(1));
        assert_eq!(merged.max_users, Some(50));
        assert_eq!(merged.steps.len(), 1);
    }

    #[test]
    fn stairs_without_steps_build_a_ladder() {
        match build(ShapeKind::Stairs, &ShapeParams::default()) {
            ShapeConfig::Stairs(c) => {
                assert_eq!(c.steps.len(), 11);
                assert_eq!(c.steps[0].users, 10);
                assert_eq!(c.steps[10].users, 200);
                assert_eq!(c.steps[0].duration, Duration::from_secs(120));
            }
            other => panic!("expected stairs, got {other:?}"),
        }

        let params = ShapeParams {
            min_users: Some(5),
            step: Some(5),
            max_users: Some(12),
            step_duration: Some(Duration::from_secs(10)),
            ..ShapeParams::default()
        };
        match build(ShapeKind::Stairs, &params) {
            ShapeConfig::Stairs(c) => {
                let users: Vec<u64> = c.steps.iter().map(|s| s.users).collect();
                assert_eq!(users, vec![5, 10, 12]);
            }
            other => panic!("expected stairs, got {other:?}"),
        }
    }

    #[test]
    fn adaptive_thresholds_map_through() {
        let params = ShapeParams {
            latency_threshold: Some(300.0),
            error_threshold: Some(0.02),
            samples: Some(4),
            ..ShapeParams::default()
        };
        match build(ShapeKind::Adaptive, &params) {
            ShapeConfig::Adaptive(c) => {
                assert_eq!(c.thresholds.latency_ms, 300.0);
                assert_eq!(c.thresholds.error_rate, 0.02);
                assert_eq!(c.samples, 4);
                assert_eq!(c.time_limit, None);
            }
            other => panic!("expected adaptive, got {other:?}"),
        }
    }
}
