use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use crest_core::{PhaseConfig, ShapeConfig, ShapeKind, StairStep};
use serde::Deserialize;

use crate::shape_params::ShapeParams;

/// One shape document:
///
/// ```yaml
/// shape: ramp-up-down
/// target-users: 50
/// ramp-up: 2m
/// hold: 10m
/// ramp-down: 1m
/// ```
///
/// Composite shapes list their sub-shapes under `phases`, each with a `start`
/// offset, an optional `duration`, and the same keys as a top-level document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct ShapeDocYaml {
    pub shape: String,

    #[serde(default, alias = "start-users")]
    pub min_users: Option<u64>,
    #[serde(default)]
    pub max_users: Option<u64>,
    #[serde(default)]
    pub period: Option<YamlDuration>,
    #[serde(default)]
    pub spawn_rate: Option<f64>,
    #[serde(default)]
    pub time_limit: Option<YamlDuration>,

    #[serde(default)]
    pub base_users: Option<u64>,
    #[serde(default)]
    pub spike_users: Option<u64>,
    #[serde(default)]
    pub spike_duration: Option<YamlDuration>,
    #[serde(default)]
    pub spike_interval: Option<YamlDuration>,

    #[serde(default)]
    pub target_users: Option<u64>,
    #[serde(default, alias = "ramp-up-time")]
    pub ramp_up: Option<YamlDuration>,
    #[serde(default, alias = "hold-time")]
    pub hold: Option<YamlDuration>,
    #[serde(default, alias = "ramp-down-time")]
    pub ramp_down: Option<YamlDuration>,

    #[serde(default, alias = "step-users")]
    pub step: Option<u64>,
    #[serde(default)]
    pub step_duration: Option<YamlDuration>,
    #[serde(default)]
    pub steps: Vec<StepYaml>,

    #[serde(default)]
    pub latency_threshold: Option<f64>,
    #[serde(default)]
    pub error_threshold: Option<f64>,
    #[serde(default)]
    pub samples: Option<usize>,
    #[serde(default)]
    pub window_size: Option<usize>,
    #[serde(default)]
    pub backoff_factor: Option<f64>,

    #[serde(default)]
    pub change_interval: Option<YamlDuration>,
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub phases: Vec<PhaseYaml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct StepYaml {
    pub users: u64,
    pub duration: YamlDuration,
    #[serde(default)]
    pub spawn_rate: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct PhaseYaml {
    #[serde(default)]
    pub start: YamlDuration,
    #[serde(default)]
    pub duration: Option<YamlDuration>,
    #[serde(flatten)]
    pub shape: ShapeDocYaml,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl<'de> serde::de::Visitor<'de> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v < 0 {
                    return Err(E::custom("duration must not be negative"));
                }
                Ok(YamlDuration(Duration::from_secs(v as u64)))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() || v < 0.0 {
                    return Err(E::custom("duration must be a finite, non-negative number"));
                }
                Duration::try_from_secs_f64(v)
                    .map(YamlDuration)
                    .map_err(E::custom)
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v.trim()).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_str(&v)
            }
        }

        deserializer.deserialize_any(V)
    }
}

impl ShapeDocYaml {
    fn params(&self) -> ShapeParams {
        let d = |v: Option<YamlDuration>| v.map(YamlDuration::into_inner);
        ShapeParams {
            min_users: self.min_users,
            max_users: self.max_users,
            period: d(self.period),
            spawn_rate: self.spawn_rate,
            time_limit: d(self.time_limit),
            base_users: self.base_users,
            spike_users: self.spike_users,
            spike_duration: d(self.spike_duration),
            spike_interval: d(self.spike_interval),
            target_users: self.target_users,
            ramp_up: d(self.ramp_up),
            hold: d(self.hold),
            ramp_down: d(self.ramp_down),
            step: self.step,
            step_duration: d(self.step_duration),
            steps: self
                .steps
                .iter()
                .map(|s| StairStep {
                    users: s.users,
                    duration: s.duration.into_inner(),
                    spawn_rate: s.spawn_rate,
                })
                .collect(),
            latency_threshold: self.latency_threshold,
            error_threshold: self.error_threshold,
            samples: self.samples,
            window_size: self.window_size,
            backoff_factor: self.backoff_factor,
            change_interval: d(self.change_interval),
            seed: self.seed,
        }
    }

    /// Builds the configuration, letting `overrides` win over the document's own values.
    ///
    /// Overrides apply to the top-level shape only; composite phases keep what the
    /// file says.
    pub(crate) fn into_config(self, overrides: ShapeParams) -> anyhow::Result<ShapeConfig> {
        let kind = ShapeKind::parse(&self.shape)?;
        let params = self.params().merge(overrides);

        let mut phases = Vec::with_capacity(self.phases.len());
        for (idx, phase) in self.phases.into_iter().enumerate() {
            let shape = phase
                .shape
                .into_config(ShapeParams::default())
                .with_context(|| format!("phase #{idx}"))?;
            phases.push(PhaseConfig {
                start: phase.start.into_inner(),
                duration: phase.duration.map(YamlDuration::into_inner),
                shape,
            });
        }

        Ok(params.build(kind, phases)?)
    }
}

pub fn looks_like_yaml_path(raw: &str) -> bool {
    let p = Path::new(raw);
    matches!(
        p.extension().and_then(|s| s.to_str()).map(|s| s.to_ascii_lowercase()),
        Some(ext) if ext == "yml" || ext == "yaml"
    )
}

pub(crate) async fn load_shape_yaml(path: &Path) -> anyhow::Result<ShapeDocYaml> {
    if !looks_like_yaml_path(&path.to_string_lossy()) {
        anyhow::bail!(
            "shape file must have a .yaml or .yml extension: {}",
            path.display()
        );
    }

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read shape YAML: {}", path.display()))?;

    serde_yaml::from_slice(&bytes)
        .with_context(|| format!("failed to parse YAML: {}", path.display()))
}
