use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crest_core::{
    AdaptiveConfig, ClockExit, ClockOptions, LoadRunner, LoadShape, MetricsSnapshot, Release,
    RunControl, ShapeClock, ShapeConfig, StairStep, StairsConfig, Thresholds,
};
use parking_lot::Mutex;

#[derive(Default)]
struct RecordingRunner {
    applied: Mutex<Vec<(Duration, u64)>>,
    failures: Mutex<Vec<String>>,
    shutdowns: AtomicU64,
    metrics_calls: AtomicU64,
    /// Metrics returned from the given call index onwards.
    script: Mutex<Vec<(u64, MetricsSnapshot)>>,
    panic_on_call: Option<u64>,
    started: Mutex<Option<tokio::time::Instant>>,
}

impl RecordingRunner {
    fn panicking_on(call: u64) -> Self {
        Self {
            panic_on_call: Some(call),
            ..Self::default()
        }
    }

    fn users(&self) -> Vec<u64> {
        self.applied.lock().iter().map(|(_, users)| *users).collect()
    }
}

impl LoadRunner for RecordingRunner {
    fn metrics(&self) -> Option<MetricsSnapshot> {
        let call = self.metrics_calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_call == Some(call) {
            panic!("metrics source exploded");
        }
        self.script
            .lock()
            .iter()
            .rev()
            .find(|(from, _)| call >= *from)
            .map(|(_, snapshot)| *snapshot)
    }

    fn apply(&self, users: u64, _spawn_rate: f64) {
        let started = *self
            .started
            .lock()
            .get_or_insert_with(tokio::time::Instant::now);
        self.applied.lock().push((started.elapsed(), users));
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }

    fn tick_failed(&self, _elapsed: Duration, message: &str) {
        self.failures.lock().push(message.to_string());
    }
}

fn stairs(steps: &[(u64, u64)]) -> LoadShape {
    let steps = steps
        .iter()
        .map(|(users, secs)| StairStep::new(*users, Duration::from_secs(*secs)))
        .collect();
    LoadShape::from_config(ShapeConfig::Stairs(StairsConfig {
        steps,
        spawn_rate: 1.0,
    }))
    .unwrap_or_else(|e| panic!("expected valid stairs: {e}"))
}

fn clock(max_users: Option<u64>) -> ShapeClock {
    ShapeClock::new(ClockOptions {
        cadence: Duration::from_secs(1),
        max_users,
    })
    .unwrap_or_else(|e| panic!("expected valid clock: {e}"))
}

fn healthy() -> MetricsSnapshot {
    MetricsSnapshot {
        avg_latency_ms: 50.0,
        p95_latency_ms: 90.0,
        error_rate: 0.0,
        active_tasks: 0,
    }
}

#[tokio::test(start_paused = true)]
async fn forwards_ticks_in_order_and_shuts_down_on_stop() {
    let runner = RecordingRunner::default();
    let control = RunControl::default();
    let mut shape = stairs(&[(5, 2), (8, 2)]);

    let summary = clock(None).run(&mut shape, &runner, &control).await;

    assert_eq!(runner.users(), vec![5, 5, 8, 8]);
    let at: Vec<Duration> = runner.applied.lock().iter().map(|(at, _)| *at).collect();
    assert_eq!(
        at,
        (0..4).map(Duration::from_secs).collect::<Vec<_>>(),
        "ticks should fire once per cadence"
    );
    assert_eq!(runner.shutdowns.load(Ordering::SeqCst), 1);
    assert_eq!(summary.exit, ClockExit::ShapeStopped);
    assert_eq!(summary.ticks, 5);
    assert_eq!(summary.last_target, Some(8));
    assert_eq!(summary.elapsed, Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn caps_targets_at_max_users() {
    let runner = RecordingRunner::default();
    let control = RunControl::default();
    let mut shape = stairs(&[(50, 2), (10, 1)]);

    clock(Some(20)).run(&mut shape, &runner, &control).await;

    assert_eq!(runner.users(), vec![20, 20, 10]);
}

#[tokio::test(start_paused = true)]
async fn stop_signal_ends_the_loop_and_releases_barriers() {
    let runner = RecordingRunner::default();
    let control = RunControl::default();
    let mut shape = LoadShape::from_config(ShapeConfig::Adaptive(AdaptiveConfig::default()))
        .unwrap_or_else(|e| panic!("expected valid adaptive: {e}"));
    if let Err(e) = control.groups().configure("login", 4) {
        panic!("expected valid capacity: {e}");
    }

    let shape_clock = clock(None);
    let (summary, arrival, ()) = tokio::join!(
        shape_clock.run(&mut shape, &runner, &control),
        control.groups().arrive("login", None),
        async {
            tokio::time::sleep(Duration::from_millis(5_500)).await;
            control.stop();
        },
    );

    assert_eq!(summary.exit, ClockExit::Cancelled);
    assert_eq!(summary.ticks, 6);
    assert_eq!(runner.shutdowns.load(Ordering::SeqCst), 0);
    match arrival {
        Ok(arrival) => assert_eq!(arrival.release, Release::Cancelled),
        Err(e) => panic!("unexpected rendezvous error: {e}"),
    }

    // No more ticks after the stop.
    let before = runner.applied.lock().len();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(runner.applied.lock().len(), before);
}

#[tokio::test(start_paused = true)]
async fn failed_tick_holds_previous_target() {
    let runner = RecordingRunner::panicking_on(2);
    let control = RunControl::default();
    let mut shape = stairs(&[(5, 2), (8, 3)]);

    let summary = clock(None).run(&mut shape, &runner, &control).await;

    assert_eq!(runner.users(), vec![5, 5, 8, 8]);
    assert_eq!(
        runner.failures.lock().as_slice(),
        ["metrics source exploded".to_string()]
    );
    assert_eq!(summary.failed_ticks, 1);
    assert_eq!(summary.exit, ClockExit::ShapeStopped);
}

#[tokio::test(start_paused = true)]
async fn adaptive_shape_follows_runner_metrics() {
    let runner = RecordingRunner::default();
    {
        let breach = MetricsSnapshot {
            avg_latency_ms: 900.0,
            ..healthy()
        };
        let mut script = runner.script.lock();
        script.push((0, healthy()));
        script.push((4, breach));
    }
    let control = RunControl::default();
    let mut shape = LoadShape::from_config(ShapeConfig::Adaptive(AdaptiveConfig {
        base_users: 10,
        min_users: 1,
        max_users: 100,
        step: 5,
        backoff_factor: 2.0,
        samples: 2,
        window_size: 10,
        thresholds: Thresholds {
            latency_ms: 500.0,
            error_rate: 0.05,
        },
        spawn_rate: 5.0,
        time_limit: Some(Duration::from_secs(6)),
    }))
    .unwrap_or_else(|e| panic!("expected valid adaptive: {e}"));

    let summary = clock(None).run(&mut shape, &runner, &control).await;

    // warm-up, +5, hold, +5, breach -10, breach -10
    assert_eq!(runner.users(), vec![10, 15, 15, 20, 10, 1]);
    assert_eq!(summary.exit, ClockExit::ShapeStopped);
}
