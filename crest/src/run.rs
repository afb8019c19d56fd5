use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crest_core::{ClockOptions, LoadShape, RendezvousGroups, RunControl, ShapeClock};
use tracing::{debug, info};

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output::{self, RunHeader, RunOutcome};
use crate::run_error::RunError;
use crate::shape_params::resolve_shape;
use crate::sim::{SimOptions, SimulatedRunner};

/// How long stopped tasks get to finish their current request.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let config = resolve_shape(&args.shape)
        .await
        .map_err(RunError::invalid)?;
    let mut shape = LoadShape::from_config(config).map_err(RunError::invalid)?;
    let clock = ShapeClock::new(ClockOptions {
        cadence: args.cadence,
        max_users: args.max_users_cap,
    })
    .map_err(RunError::invalid)?;

    let groups = match args.rendezvous_timeout {
        Some(t) => RendezvousGroups::with_timeout(t),
        None => RendezvousGroups::default(),
    };
    let control = Arc::new(RunControl::new(Arc::new(groups)));

    let header = RunHeader {
        shape: shape.kind(),
        time_limit: shape.time_limit(),
        cadence: clock.cadence(),
        max_users_cap: args.max_users_cap,
        rendezvous: args.rendezvous,
        rendezvous_timeout: args.rendezvous_timeout,
    };
    let out = output::formatter(args.output);
    out.print_header(&header);

    let runner = SimulatedRunner::new(
        SimOptions {
            think_time: args.sim.think_time,
            base_latency: args.sim.base_latency,
            latency_per_user: args.sim.latency_per_user,
            error_rate: args.sim.error_rate,
            cadence: clock.cadence(),
            rendezvous: args.rendezvous,
        },
        control.clone(),
        out.progress(&header),
    )
    .map_err(RunError::runtime)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let signal = {
        let control = control.clone();
        let interrupted = interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received; stopping");
                interrupted.store(true, Ordering::Release);
                control.stop();
            }
        })
    };

    info!(shape = %header.shape, cadence = ?header.cadence, "run started");
    let summary = clock.run(&mut shape, &runner, &control).await;
    signal.abort();
    control.stop();

    debug!(?summary, running = runner.running(), "clock finished");
    let report = runner.finish(SHUTDOWN_GRACE).await;

    let interrupted = interrupted.load(Ordering::Acquire);
    out.print_summary(&RunOutcome {
        clock: summary,
        report,
        interrupted,
    })
    .map_err(RunError::runtime)?;

    Ok(if interrupted {
        ExitCode::Interrupted
    } else {
        ExitCode::Success
    })
}
