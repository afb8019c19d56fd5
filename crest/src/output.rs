use std::time::Duration;

use crest_core::{ClockSummary, ShapeKind};

use crate::cli::OutputFormat;
use crate::sim::{ProgressFn, RunReport};

mod human;
mod json;

#[derive(Debug, Clone, Copy)]
pub(crate) struct RunHeader {
    pub shape: ShapeKind,
    pub time_limit: Option<Duration>,
    pub cadence: Duration,
    pub max_users_cap: Option<u64>,
    pub rendezvous: Option<u64>,
    pub rendezvous_timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub(crate) struct RunOutcome {
    pub clock: ClockSummary,
    pub report: RunReport,
    pub interrupted: bool,
}

/// One sample of a dry run. `target` is `None` once the shape has stopped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PlanPoint {
    pub at: Duration,
    pub target: Option<(u64, f64)>,
}

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, header: &RunHeader);
    fn progress(&self, header: &RunHeader) -> Option<ProgressFn>;
    fn print_summary(&self, outcome: &RunOutcome) -> anyhow::Result<()>;
    fn print_plan(&self, shape: ShapeKind, points: &[PlanPoint]) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
