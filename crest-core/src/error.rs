pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors. All of them are raised while building a shape or clock,
/// before any load is generated; nothing here is returned from a tick.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(
        "unknown shape `{0}` (expected `wave`, `spike`, `stairs`, `ramp-up-down`, `adaptive`, `composite`, or `random`)"
    )]
    UnknownShape(String),

    #[error("`min_users` ({min}) must be <= `max_users` ({max})")]
    InvalidRange { min: u64, max: u64 },

    #[error("`{field}` ({value}) must be within [{min}, {max}]")]
    InvalidUsers {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("`{0}` must be a positive duration")]
    InvalidDuration(&'static str),

    #[error("`spawn_rate` must be a positive, finite number (got {0})")]
    InvalidSpawnRate(f64),

    #[error("`steps` must be a non-empty list of {{ users, duration }}")]
    EmptySteps,

    #[error("step #{index} must have a positive duration")]
    InvalidStep { index: usize },

    #[error("`step` must be a positive integer")]
    InvalidStepSize,

    #[error("stairs ladder would have {steps} steps (at most {max} allowed)")]
    TooManySteps { steps: u64, max: u64 },

    #[error("`backoff_factor` must be a finite number > 1 (got {0})")]
    InvalidBackoff(f64),

    #[error("`{0}` must be a positive, finite number")]
    InvalidThreshold(&'static str),

    #[error("`samples` ({samples}) must be >= 1 and <= `window_size` ({window_size})")]
    InvalidSamples { samples: usize, window_size: usize },

    #[error("invalid composite phases: {0}")]
    InvalidPhases(&'static str),

    #[error("`cadence` must be a positive duration")]
    InvalidCadence,

    #[error(transparent)]
    Rendezvous(#[from] crest_shared::RendezvousError),
}
