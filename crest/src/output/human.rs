use std::sync::Arc;

use crest_core::ShapeKind;

mod format;
mod progress;
mod summary;

use format::{format_clock, format_ms, format_pct};
use progress::HumanProgress;
use summary::{render, render_header, render_plan};

use super::{OutputFormatter, PlanPoint, RunHeader, RunOutcome};
use crate::sim::{ProgressFn, ProgressUpdate};

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, header: &RunHeader) {
        print!("{}", render_header(header));
    }

    fn progress(&self, header: &RunHeader) -> Option<ProgressFn> {
        let progress = self.progress.clone();
        let total = header.time_limit;

        Some(Arc::new(move |u: ProgressUpdate| {
            let mut message = format!(
                "elapsed={} users={}/{} active={}",
                format_clock(u.elapsed),
                u.running,
                u.target,
                u.active
            );
            if let Some(m) = u.metrics {
                message.push_str(&format!(
                    " avg={} p95={} errors={}",
                    format_ms(m.avg_latency_ms),
                    format_ms(m.p95_latency_ms),
                    format_pct(m.error_rate)
                ));
            }
            message.push_str(&format!(" requests={}", u.requests_total));

            progress.update(total, u.elapsed, message);
        }))
    }

    fn print_summary(&self, outcome: &RunOutcome) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(outcome));
        Ok(())
    }

    fn print_plan(&self, shape: ShapeKind, points: &[PlanPoint]) -> anyhow::Result<()> {
        print!("{}", render_plan(shape, points));
        Ok(())
    }
}
