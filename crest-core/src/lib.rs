mod adaptive;
mod clock;
mod config;
mod control;
mod error;
mod metrics;

pub mod shape;

pub use adaptive::{AdaptiveFeedback, Change, Decision, Sample};
pub use clock::{ClockExit, ClockOptions, ClockSummary, LoadRunner, ShapeClock};
pub use config::{
    AdaptiveConfig, CompositeConfig, PhaseConfig, RampUpDownConfig, RandomConfig, ShapeConfig,
    ShapeKind, SpikeConfig, StairStep, StairsConfig, Thresholds, WaveConfig,
};
pub use control::RunControl;
pub use error::{Error, Result};
pub use metrics::MetricsSnapshot;
pub use shape::{LoadShape, Tick};

pub use crest_shared::{Arrival, Release, RendezvousBarrier, RendezvousError, RendezvousGroups};
