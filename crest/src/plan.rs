//! Dry run: samples a shape on a fixed grid without starting any task.

use std::time::Duration;

use crest_core::{LoadShape, Tick};

use crate::cli::PlanArgs;
use crate::exit_codes::ExitCode;
use crate::output::{self, PlanPoint};
use crate::run_error::RunError;
use crate::shape_params::resolve_shape;

/// Sampling horizon for shapes that never stop on their own.
const UNBOUNDED_HORIZON: Duration = Duration::from_secs(600);

/// Samples `shape` at `0, every, 2*every, ...` up to and including `until`.
///
/// Sampling ends early at the first `Stop`, which is kept as the last point.
/// No metrics are fed, so adaptive shapes hold their base user count.
pub(crate) fn sample(shape: &mut LoadShape, every: Duration, until: Duration) -> Vec<PlanPoint> {
    let mut points = Vec::new();
    if every.is_zero() {
        return points;
    }

    let mut at = Duration::ZERO;
    while at <= until {
        match shape.tick(at, None) {
            Tick::Target { users, spawn_rate } => points.push(PlanPoint {
                at,
                target: Some((users, spawn_rate)),
            }),
            Tick::Stop => {
                points.push(PlanPoint { at, target: None });
                break;
            }
        }
        match at.checked_add(every) {
            Some(next) => at = next,
            None => break,
        }
    }
    points
}

pub async fn plan(args: PlanArgs) -> Result<ExitCode, RunError> {
    if args.every.is_zero() {
        return Err(RunError::invalid(anyhow::anyhow!(
            "--every must be a positive duration"
        )));
    }

    let config = resolve_shape(&args.shape)
        .await
        .map_err(RunError::invalid)?;
    let mut shape = LoadShape::from_config(config).map_err(RunError::invalid)?;

    // One sample past the limit so the stop shows up.
    let until = args
        .until
        .or_else(|| shape.time_limit().map(|t| t.saturating_add(args.every)))
        .unwrap_or(UNBOUNDED_HORIZON);
    let kind = shape.kind();
    let points = sample(&mut shape, args.every, until);

    output::formatter(args.output)
        .print_plan(kind, &points)
        .map_err(RunError::runtime)?;
    Ok(ExitCode::Success)
}
