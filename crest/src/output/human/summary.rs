use std::fmt::Write as _;

use crest_core::{ClockExit, ShapeKind};

use super::format::*;
use crate::output::{PlanPoint, RunHeader, RunOutcome};

pub(crate) fn render_header(h: &RunHeader) -> String {
    let mut out = String::new();
    let limit = h
        .time_limit
        .map_or_else(|| "none".to_string(), format_duration_single);
    writeln!(
        &mut out,
        "shape: {} time_limit={limit} cadence={}",
        h.shape,
        format_duration_single(h.cadence)
    )
    .ok();
    if let Some(cap) = h.max_users_cap {
        writeln!(&mut out, "max users cap: {cap}").ok();
    }
    if let Some(n) = h.rendezvous {
        let timeout = h
            .rendezvous_timeout
            .map_or_else(|| "none".to_string(), format_duration_single);
        writeln!(&mut out, "rendezvous: groups of {n} (timeout {timeout})").ok();
    }
    out.push('\n');
    out
}

pub(crate) fn render(o: &RunOutcome) -> String {
    let mut out = String::new();
    let clock = &o.clock;
    let report = &o.report;

    let ended = match (o.interrupted, clock.exit) {
        (true, _) => "interrupted",
        (false, ClockExit::ShapeStopped) => "shape finished",
        (false, ClockExit::Cancelled) => "stopped",
    };

    out.push_str("summary\n");
    writeln!(
        &mut out,
        "  run: {} ({ended})",
        format_clock(clock.elapsed)
    )
    .ok();
    writeln!(
        &mut out,
        "  ticks: {} (failed {})",
        clock.ticks, clock.failed_ticks
    )
    .ok();
    if let Some(target) = clock.last_target {
        writeln!(&mut out, "  last target: {target}").ok();
    }
    writeln!(&mut out, "  peak tasks: {}", report.peak_tasks).ok();

    let req = &report.requests;
    let error_ratio = if req.requests == 0 {
        0.0
    } else {
        req.errors as f64 / req.requests as f64
    };
    writeln!(
        &mut out,
        "  requests: {} (failed {}, {})",
        req.requests,
        req.errors,
        format_pct(error_ratio)
    )
    .ok();

    if let Some(l) = &req.latency {
        writeln!(
            &mut out,
            "  latency: mean {} p50 {} p95 {} p99 {} max {}",
            format_ms(l.mean_ms),
            format_ms(l.p50_ms),
            format_ms(l.p95_ms),
            format_ms(l.p99_ms),
            format_ms(l.max_ms)
        )
        .ok();
    }

    if let Some(rv) = &report.rendezvous {
        writeln!(
            &mut out,
            "  rendezvous ({}): released {} timed out {} cancelled {} immediate {}",
            rv.capacity, rv.complete, rv.timed_out, rv.cancelled, rv.immediate
        )
        .ok();
    }

    if let Some(msg) = &report.last_tick_failure {
        writeln!(&mut out, "  last tick failure: {msg}").ok();
    }

    out
}

pub(crate) fn render_plan(shape: ShapeKind, points: &[PlanPoint]) -> String {
    let mut out = String::new();
    writeln!(&mut out, "plan: {shape}").ok();
    writeln!(&mut out, "{:>10}  {:>8}  {:>10}", "elapsed", "users", "spawn/s").ok();

    for p in points {
        match p.target {
            Some((users, rate)) => writeln!(
                &mut out,
                "{:>10}  {users:>8}  {:>10}",
                format_clock(p.at),
                format_rate(rate)
            )
            .ok(),
            None => writeln!(&mut out, "{:>10}  {:>8}", format_clock(p.at), "stop").ok(),
        };
    }

    out
}
