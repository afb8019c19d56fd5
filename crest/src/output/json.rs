use serde::Serialize;
use std::io::Write as _;
use std::sync::Arc;

use crest_core::{ClockExit, ShapeKind};

use super::{OutputFormatter, PlanPoint, RunHeader, RunOutcome};
use crate::sim::{ProgressFn, ProgressUpdate};

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _header: &RunHeader) {}

    fn progress(&self, _header: &RunHeader) -> Option<ProgressFn> {
        Some(Arc::new(move |u: ProgressUpdate| {
            let line = build_tick_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, outcome: &RunOutcome) -> anyhow::Result<()> {
        let line = build_summary_line(outcome);
        emit_json_line(&line);
        Ok(())
    }

    fn print_plan(&self, shape: ShapeKind, points: &[PlanPoint]) -> anyhow::Result<()> {
        for p in points {
            emit_json_line(&build_plan_line(shape, p));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonTickLine {
    pub kind: &'static str,
    pub elapsed_secs: f64,
    pub target_users: u64,
    pub spawn_rate: f64,
    pub running_tasks: u64,
    pub active_tasks: u64,

    pub latency_avg_ms: Option<f64>,
    pub latency_p95_ms: Option<f64>,
    pub error_rate: Option<f64>,

    pub requests_total: u64,
    pub errors_total: u64,
}

fn build_tick_line(u: &ProgressUpdate) -> JsonTickLine {
    JsonTickLine {
        kind: "tick",
        elapsed_secs: u.elapsed.as_secs_f64(),
        target_users: u.target,
        spawn_rate: u.spawn_rate,
        running_tasks: u.running,
        active_tasks: u.active,
        latency_avg_ms: u.metrics.map(|m| m.avg_latency_ms),
        latency_p95_ms: u.metrics.map(|m| m.p95_latency_ms),
        error_rate: u.metrics.map(|m| m.error_rate),
        requests_total: u.requests_total,
        errors_total: u.errors_total,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonLatency {
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonRendezvous {
    pub capacity: u64,
    pub complete: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub immediate: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub exit: &'static str,
    pub interrupted: bool,
    pub elapsed_secs: f64,
    pub ticks: u64,
    pub failed_ticks: u64,
    pub last_target: Option<u64>,
    pub peak_tasks: u64,

    pub requests_total: u64,
    pub errors_total: u64,
    pub latency: Option<JsonLatency>,
    pub rendezvous: Option<JsonRendezvous>,
    pub last_tick_failure: Option<String>,
}

fn build_summary_line(o: &RunOutcome) -> JsonSummaryLine {
    let req = &o.report.requests;

    JsonSummaryLine {
        kind: "summary",
        exit: match o.clock.exit {
            ClockExit::ShapeStopped => "shape_stopped",
            ClockExit::Cancelled => "cancelled",
        },
        interrupted: o.interrupted,
        elapsed_secs: o.clock.elapsed.as_secs_f64(),
        ticks: o.clock.ticks,
        failed_ticks: o.clock.failed_ticks,
        last_target: o.clock.last_target,
        peak_tasks: o.report.peak_tasks,
        requests_total: req.requests,
        errors_total: req.errors,
        latency: req.latency.map(|l| JsonLatency {
            mean_ms: l.mean_ms,
            p50_ms: l.p50_ms,
            p95_ms: l.p95_ms,
            p99_ms: l.p99_ms,
            max_ms: l.max_ms,
        }),
        rendezvous: o.report.rendezvous.map(|r| JsonRendezvous {
            capacity: r.capacity,
            complete: r.complete,
            timed_out: r.timed_out,
            cancelled: r.cancelled,
            immediate: r.immediate,
        }),
        last_tick_failure: o.report.last_tick_failure.clone(),
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonPlanLine {
    pub kind: &'static str,
    pub shape: String,
    pub elapsed_secs: f64,
    pub stop: bool,
    pub users: Option<u64>,
    pub spawn_rate: Option<f64>,
}

fn build_plan_line(shape: ShapeKind, p: &PlanPoint) -> JsonPlanLine {
    JsonPlanLine {
        kind: "plan",
        shape: shape.to_string(),
        elapsed_secs: p.at.as_secs_f64(),
        stop: p.target.is_none(),
        users: p.target.map(|(users, _)| users),
        spawn_rate: p.target.map(|(_, rate)| rate),
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::time::Duration;

    use crest_core::{ClockSummary, MetricsSnapshot};

    use crate::sim::{RendezvousReport, RunReport};

    fn to_value<T: Serialize>(line: &T) -> Value {
        match serde_json::to_value(line) {
            Ok(v) => v,
            Err(err) => panic!("to_value failed: {err}"),
        }
    }

    #[test]
    fn tick_line_carries_metrics_when_present() {
        let mut update = ProgressUpdate {
            elapsed: Duration::from_millis(2_500),
            target: 20,
            spawn_rate: 5.0,
            running: 15,
            active: 14,
            metrics: None,
            requests_total: 100,
            errors_total: 2,
        };

        let v = to_value(&build_tick_line(&update));
        assert_eq!(v.get("kind").and_then(Value::as_str), Some("tick"));
        assert_eq!(v.get("elapsed_secs").and_then(Value::as_f64), Some(2.5));
        assert_eq!(v.get("target_users").and_then(Value::as_u64), Some(20));
        assert!(v.get("latency_avg_ms").is_some_and(Value::is_null));

        update.metrics = Some(MetricsSnapshot {
            avg_latency_ms: 40.0,
            p95_latency_ms: 90.0,
            error_rate: 0.02,
            active_tasks: 14,
        });
        let v = to_value(&build_tick_line(&update));
        assert_eq!(v.get("latency_p95_ms").and_then(Value::as_f64), Some(90.0));
        assert_eq!(v.get("error_rate").and_then(Value::as_f64), Some(0.02));
    }

    #[test]
    fn summary_line_reports_exit_and_rendezvous() {
        let outcome = RunOutcome {
            clock: ClockSummary {
                ticks: 10,
                failed_ticks: 0,
                last_target: Some(4),
                elapsed: Duration::from_secs(9),
                exit: ClockExit::Cancelled,
            },
            report: RunReport {
                rendezvous: Some(RendezvousReport {
                    capacity: 4,
                    complete: 12,
                    ..RendezvousReport::default()
                }),
                ..RunReport::default()
            },
            interrupted: true,
        };

        let v = to_value(&build_summary_line(&outcome));
        assert_eq!(v.get("kind").and_then(Value::as_str), Some("summary"));
        assert_eq!(v.get("exit").and_then(Value::as_str), Some("cancelled"));
        assert_eq!(v.get("interrupted").and_then(Value::as_bool), Some(true));
        assert!(v.get("latency").is_some_and(Value::is_null));
        assert_eq!(
            v.pointer("/rendezvous/complete").and_then(Value::as_u64),
            Some(12)
        );
    }

    #[test]
    fn plan_line_marks_stop() {
        let point = PlanPoint {
            at: Duration::from_secs(30),
            target: None,
        };
        let v = to_value(&build_plan_line(ShapeKind::Spike, &point));
        assert_eq!(v.get("shape").and_then(Value::as_str), Some("spike"));
        assert_eq!(v.get("stop").and_then(Value::as_bool), Some(true));
        assert!(v.get("users").is_some_and(Value::is_null));
    }
}
